//! Configuration types for the sampler

use crate::buffer::DEFAULT_CAPACITY;
use crate::error::{Result, SamplerError};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Default delay between ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Default delay honored by `StopHandle::stop` before signalling
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default bound on one tick's metric reads
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Sampler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Zero-based device index
    pub device_index: u32,

    /// Output file, truncated on open
    pub output_path: PathBuf,

    /// Sleep between ticks
    #[serde(deserialize_with = "de_duration")]
    pub tick_interval: Duration,

    /// Delay `StopHandle::stop` waits before signalling the loop
    #[serde(deserialize_with = "de_duration")]
    pub grace_period: Duration,

    /// Pre-sized sample buffer capacity
    pub initial_capacity: usize,

    /// A tick whose reads take longer than this is discarded
    #[serde(deserialize_with = "de_duration")]
    pub read_timeout: Duration,

    /// Stop polling on the first read timeout instead of skipping the tick
    pub fail_on_timeout: bool,

    /// Stop polling on its own after this many ticks (None = until stopped)
    pub max_ticks: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            output_path: PathBuf::from("gpu_stats.csv"),
            tick_interval: DEFAULT_TICK_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            initial_capacity: DEFAULT_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            fail_on_timeout: false,
            max_ticks: None,
        }
    }
}

impl SamplerConfig {
    /// Default configuration writing to `output_path`
    pub fn with_output(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    /// Minimum number of ticks the grace period allows, absent read failures
    pub fn min_ticks_during_grace(&self) -> u64 {
        if self.tick_interval.is_zero() {
            return 0;
        }
        (self.grace_period.as_nanos() / self.tick_interval.as_nanos()) as u64
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(SamplerError::Config(
                "tick interval must be greater than 0".to_string(),
            ));
        }

        if self.initial_capacity == 0 {
            return Err(SamplerError::Config(
                "initial capacity must be greater than 0".to_string(),
            ));
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(SamplerError::Config("output path is empty".to_string()));
        }

        if self.read_timeout.is_zero() {
            return Err(SamplerError::Config(
                "read timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_ticks == Some(0) {
            return Err(SamplerError::Config(
                "max ticks must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Accept "250ms" / "2s" / "5m" strings, or a bare integer number of seconds.
fn de_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Secs(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => smitrace_shared::utils::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {:?}: {}", s, e))),
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
    }
}
