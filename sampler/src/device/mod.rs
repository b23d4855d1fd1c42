//! Device handle abstraction
//!
//! A [`DeviceHandle`] is the sampler's only view of the monitoring library:
//! one session bound to one physical device, read once per tick.

pub mod fake;
#[cfg(feature = "nvml")]
pub mod nvml;

pub use fake::FakeDevice;
#[cfg(feature = "nvml")]
pub use nvml::{list_devices, NvmlDevice};

use crate::error::DeviceError;
use smitrace_shared::DeviceMetrics;

/// Session with one accelerator
pub trait DeviceHandle: Send + 'static {
    /// Zero-based device index this handle was opened for
    fn index(&self) -> u32;

    /// Device name, informational only
    fn name(&self) -> &str;

    /// Read every tracked metric.
    ///
    /// Reads are issued one after another; there is no atomic snapshot, so
    /// values may come from slightly different instants within one tick.
    fn read_all(&mut self) -> Result<DeviceMetrics, DeviceError>;

    /// Release the session. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), DeviceError>;
}

impl<D: DeviceHandle + ?Sized> DeviceHandle for Box<D> {
    fn index(&self) -> u32 {
        (**self).index()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn read_all(&mut self) -> Result<DeviceMetrics, DeviceError> {
        (**self).read_all()
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        (**self).close()
    }
}
