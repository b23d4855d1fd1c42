//! Column schema for the exported text file
//!
//! The header and every data row are produced from the same ordering, see
//! [`crate::Sample::fields`].

/// Number of exported columns
pub const COLUMN_COUNT: usize = 14;

/// Field delimiter used for both header and rows
pub const SEPARATOR: &str = ", ";

/// Export column names, in emission order
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "timestamp",
    "temperature_gpu",
    "power_draw_w",
    "power_limit_w",
    "utilization_gpu",
    "utilization_memory",
    "memory_used_mib",
    "memory_free_mib",
    "clocks_throttle_reasons_active",
    "clocks_current_sm_mhz",
    "clocks_applications_graphics_mhz",
    "clocks_current_memory_mhz",
    "clocks_max_memory_mhz",
    "pstate",
];

/// The header line, without the trailing newline
pub fn header_line() -> String {
    COLUMNS.join(SEPARATOR)
}
