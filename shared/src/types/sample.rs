//! Sample record definitions
//!
//! A [`Sample`] is one poll tick: a timestamp plus every tracked metric,
//! stored in the raw units the monitoring library reports.

use crate::types::schema::{COLUMN_COUNT, SEPARATOR};
use serde::{Deserialize, Serialize};

/// Timestamp in nanoseconds since UNIX epoch
pub type Timestamp = u64;

/// Milliwatts per exported watt
pub const MILLIWATTS_PER_WATT: u32 = 1_000;

/// Bytes per exported megabyte (decimal)
pub const BYTES_PER_MEGABYTE: u64 = 1_000_000;

/// Raw metric values read from one device in one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    /// GPU die temperature in °C
    pub temperature_c: u32,

    /// Current power draw in milliwatts
    pub power_usage_mw: u32,

    /// Enforced power limit in milliwatts
    pub power_limit_mw: u32,

    /// GPU utilization percent (0-100)
    pub utilization_gpu: u32,

    /// Memory controller utilization percent (0-100)
    pub utilization_memory: u32,

    /// Device memory in use, bytes
    pub memory_used_bytes: u64,

    /// Device memory free, bytes
    pub memory_free_bytes: u64,

    /// Active clock throttle reasons bitmask, undecoded
    pub throttle_reasons: u64,

    /// Current SM clock, MHz
    pub clock_sm_mhz: u32,

    /// Graphics application clock target, MHz
    pub clock_graphics_app_mhz: u32,

    /// Current memory clock, MHz
    pub clock_memory_mhz: u32,

    /// Memory application clock target, MHz
    pub clock_memory_max_mhz: u32,

    /// Performance state ordinal (P0 = 0 ... P15 = 15, 32 = unknown)
    pub performance_state: u32,
}

/// One complete record of all tracked metrics at one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Captured at tick start
    pub timestamp: Timestamp,

    /// Metric values for this tick
    pub metrics: DeviceMetrics,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Timestamp, metrics: DeviceMetrics) -> Self {
        Self { timestamp, metrics }
    }

    /// Exported values in column order, with unit conversions applied.
    ///
    /// Power is truncated to whole watts and memory to whole decimal megabytes.
    /// The throttle bitmask and performance state are passed through raw.
    pub fn fields(&self) -> [u64; COLUMN_COUNT] {
        let m = &self.metrics;
        [
            self.timestamp,
            u64::from(m.temperature_c),
            u64::from(m.power_usage_mw / MILLIWATTS_PER_WATT),
            u64::from(m.power_limit_mw / MILLIWATTS_PER_WATT),
            u64::from(m.utilization_gpu),
            u64::from(m.utilization_memory),
            m.memory_used_bytes / BYTES_PER_MEGABYTE,
            m.memory_free_bytes / BYTES_PER_MEGABYTE,
            m.throttle_reasons,
            u64::from(m.clock_sm_mhz),
            u64::from(m.clock_graphics_app_mhz),
            u64::from(m.clock_memory_mhz),
            u64::from(m.clock_memory_max_mhz),
            u64::from(m.performance_state),
        ]
    }

    /// Render this sample as one export row (no trailing separator, no newline)
    pub fn to_row(&self) -> String {
        self.fields()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> DeviceMetrics {
        DeviceMetrics {
            temperature_c: 61,
            power_usage_mw: 74_999,
            power_limit_mw: 250_000,
            utilization_gpu: 97,
            utilization_memory: 40,
            memory_used_bytes: 3_999_999,
            memory_free_bytes: 12_000_000_001,
            throttle_reasons: 0x4,
            clock_sm_mhz: 1_815,
            clock_graphics_app_mhz: 1_590,
            clock_memory_mhz: 6_800,
            clock_memory_max_mhz: 7_001,
            performance_state: 2,
        }
    }

    #[test]
    fn test_fields_apply_truncating_conversions() {
        let sample = Sample::new(42, metrics());
        let fields = sample.fields();

        assert_eq!(fields[0], 42);
        assert_eq!(fields[2], 74); // 74_999 mW
        assert_eq!(fields[3], 250);
        assert_eq!(fields[6], 3); // 3_999_999 B
        assert_eq!(fields[7], 12_000);
        assert_eq!(fields[8], 4);
        assert_eq!(fields[13], 2);
    }

    #[test]
    fn test_row_format() {
        let sample = Sample::new(1_700_000_000_000_000_000, metrics());
        let row = sample.to_row();

        assert_eq!(
            row,
            "1700000000000000000, 61, 74, 250, 97, 40, 3, 12000, 4, 1815, 1590, 6800, 7001, 2"
        );
        assert!(!row.ends_with(SEPARATOR));
        assert_eq!(row.split(SEPARATOR).count(), COLUMN_COUNT);
    }

    #[test]
    fn test_zero_metrics_row() {
        let row = Sample::new(0, DeviceMetrics::default()).to_row();
        assert_eq!(row, vec!["0"; COLUMN_COUNT].join(SEPARATOR));
    }
}
