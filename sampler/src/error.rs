//! Error types for the sampler

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// One metric read issued per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    PowerUsage,
    PowerLimit,
    Utilization,
    MemoryInfo,
    ThrottleReasons,
    ClockSm,
    ClockGraphicsApp,
    ClockMemory,
    ClockMemoryMax,
    PerformanceState,
}

impl Metric {
    /// Every read, in the order a tick issues them
    pub const ALL: [Metric; 11] = [
        Metric::Temperature,
        Metric::PowerUsage,
        Metric::PowerLimit,
        Metric::Utilization,
        Metric::MemoryInfo,
        Metric::ThrottleReasons,
        Metric::ClockSm,
        Metric::ClockGraphicsApp,
        Metric::ClockMemory,
        Metric::ClockMemoryMax,
        Metric::PerformanceState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::PowerUsage => "power_usage",
            Metric::PowerLimit => "power_limit",
            Metric::Utilization => "utilization",
            Metric::MemoryInfo => "memory_info",
            Metric::ThrottleReasons => "throttle_reasons",
            Metric::ClockSm => "clock_sm",
            Metric::ClockGraphicsApp => "clock_graphics_app",
            Metric::ClockMemory => "clock_memory",
            Metric::ClockMemoryMax => "clock_memory_max",
            Metric::PerformanceState => "performance_state",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a device handle
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The monitoring library could not be initialized.
    #[error("monitoring library initialization failed: {0}")]
    Init(String),

    /// The requested device index does not exist.
    #[error("device index {index} out of range ({count} device(s) present)")]
    InvalidIndex { index: u32, count: u32 },

    /// The device name query failed.
    #[error("device name query failed: {0}")]
    Name(String),

    /// The device handle could not be resolved during a tick.
    #[error("device handle lost: {0}")]
    Lost(String),

    /// A single metric read failed.
    #[error("{metric} read failed: {message}")]
    Read { metric: Metric, message: String },

    /// A tick's reads took longer than the configured bound.
    #[error("metric reads took {elapsed:?}, limit is {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },

    /// Releasing the monitoring session failed.
    #[error("monitoring library shutdown failed: {0}")]
    Shutdown(String),

    /// The handle was used after `close`.
    #[error("device handle already closed")]
    Closed,

    /// No hardware backend was compiled in.
    #[error("hardware monitoring support not compiled in (enable the `nvml` feature)")]
    Unavailable,
}

impl DeviceError {
    pub fn read(metric: Metric, message: impl fmt::Display) -> Self {
        DeviceError::Read {
            metric,
            message: message.to_string(),
        }
    }
}

/// Errors raised by the sampler lifecycle
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sampler already started")]
    AlreadyStarted,

    #[error("sampler is not running")]
    NotRunning,

    #[error("samples already exported")]
    AlreadyExported,

    #[error("failed to spawn polling thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("polling thread panicked")]
    WorkerPanicked,

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;
