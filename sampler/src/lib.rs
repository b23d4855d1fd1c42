//! Fixed-rate GPU telemetry sampler
//!
//! This library polls one accelerator at millisecond granularity on a
//! dedicated thread, buffers every sample in memory and, on teardown,
//! writes them to a delimited text file with a header row.
//!
//! ```no_run
//! # #[cfg(feature = "nvml")]
//! # fn main() -> smitrace_sampler::Result<()> {
//! use smitrace_sampler::{Sampler, SamplerConfig};
//!
//! let mut sampler = Sampler::open(SamplerConfig::with_output("out.csv"))?;
//! sampler.start()?;
//! // ... run the workload ...
//! sampler.stop()?;
//! let summary = sampler.finish()?;
//! println!("{} rows -> {}", summary.rows, summary.path.display());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "nvml"))]
//! # fn main() {}
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod sampler;
pub mod stop;

pub use buffer::SampleBuffer;
pub use config::SamplerConfig;
pub use device::{DeviceHandle, FakeDevice};
pub use error::{DeviceError, Metric, Result, SamplerError};
pub use export::{ExportSummary, Exporter};
pub use sampler::{Sampler, SamplerState, SamplerStats};
pub use stop::StopHandle;

#[cfg(feature = "nvml")]
pub use device::{list_devices, NvmlDevice};
