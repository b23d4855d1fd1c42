//! NVML-backed device handle

use crate::device::DeviceHandle;
use crate::error::{DeviceError, Metric};
use nvml_wrapper::enum_wrappers::device::{Clock, ClockId, PerformanceState, TemperatureSensor};
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use smitrace_shared::DeviceMetrics;
use tracing::{debug, info, warn};

/// Ordinal NVML uses for an unknown performance state
pub const PSTATE_UNKNOWN: u32 = 32;

/// NVML session bound to one device.
///
/// Owns the library handle, so `nvmlInit`/`nvmlShutdown` are scoped to this
/// value. Only one live instance should exist per process.
pub struct NvmlDevice {
    nvml: Option<Nvml>,
    index: u32,
    name: String,
}

impl NvmlDevice {
    /// Initialize NVML and resolve `index` to a device
    pub fn open(index: u32) -> Result<Self, DeviceError> {
        let nvml = Nvml::init().map_err(|e| DeviceError::Init(e.to_string()))?;

        let count = nvml
            .device_count()
            .map_err(|e| DeviceError::Init(e.to_string()))?;
        if index >= count {
            return Err(DeviceError::InvalidIndex { index, count });
        }

        let name = {
            let device = nvml
                .device_by_index(index)
                .map_err(|e| DeviceError::Init(e.to_string()))?;
            device.name().map_err(|e| DeviceError::Name(e.to_string()))?
        };

        info!("NVML initialized: {} (device {} of {})", name, index, count);

        Ok(Self {
            nvml: Some(nvml),
            index,
            name,
        })
    }

    fn device(&self) -> Result<Device<'_>, DeviceError> {
        let nvml = self.nvml.as_ref().ok_or(DeviceError::Closed)?;
        nvml.device_by_index(self.index)
            .map_err(|e| DeviceError::Lost(e.to_string()))
    }
}

fn read<T>(metric: Metric, result: Result<T, NvmlError>) -> Result<T, DeviceError> {
    result.map_err(|e| DeviceError::read(metric, e))
}

/// Map a performance state to NVML's ordinal (P0 = 0 ... P15 = 15)
pub fn pstate_ordinal(state: PerformanceState) -> u32 {
    match state {
        PerformanceState::Zero => 0,
        PerformanceState::One => 1,
        PerformanceState::Two => 2,
        PerformanceState::Three => 3,
        PerformanceState::Four => 4,
        PerformanceState::Five => 5,
        PerformanceState::Six => 6,
        PerformanceState::Seven => 7,
        PerformanceState::Eight => 8,
        PerformanceState::Nine => 9,
        PerformanceState::Ten => 10,
        PerformanceState::Eleven => 11,
        PerformanceState::Twelve => 12,
        PerformanceState::Thirteen => 13,
        PerformanceState::Fourteen => 14,
        PerformanceState::Fifteen => 15,
        PerformanceState::Unknown => PSTATE_UNKNOWN,
    }
}

impl DeviceHandle for NvmlDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn read_all(&mut self) -> Result<DeviceMetrics, DeviceError> {
        let device = self.device()?;

        let temperature_c = read(
            Metric::Temperature,
            device.temperature(TemperatureSensor::Gpu),
        )?;
        let power_usage_mw = read(Metric::PowerUsage, device.power_usage())?;
        let power_limit_mw = read(Metric::PowerLimit, device.enforced_power_limit())?;
        let utilization = read(Metric::Utilization, device.utilization_rates())?;
        let memory = read(Metric::MemoryInfo, device.memory_info())?;
        let throttle_reasons = read(Metric::ThrottleReasons, device.current_throttle_reasons())?;
        let clock_sm_mhz = read(Metric::ClockSm, device.clock(Clock::SM, ClockId::Current))?;
        let clock_graphics_app_mhz = read(
            Metric::ClockGraphicsApp,
            device.clock(Clock::Graphics, ClockId::TargetAppClock),
        )?;
        let clock_memory_mhz = read(
            Metric::ClockMemory,
            device.clock(Clock::Memory, ClockId::Current),
        )?;
        let clock_memory_max_mhz = read(
            Metric::ClockMemoryMax,
            device.clock(Clock::Memory, ClockId::TargetAppClock),
        )?;
        let performance_state = read(Metric::PerformanceState, device.performance_state())?;

        Ok(DeviceMetrics {
            temperature_c,
            power_usage_mw,
            power_limit_mw,
            utilization_gpu: utilization.gpu,
            utilization_memory: utilization.memory,
            memory_used_bytes: memory.used,
            memory_free_bytes: memory.free,
            throttle_reasons: throttle_reasons.bits(),
            clock_sm_mhz,
            clock_graphics_app_mhz,
            clock_memory_mhz,
            clock_memory_max_mhz,
            performance_state: pstate_ordinal(performance_state),
        })
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        match self.nvml.take() {
            Some(nvml) => {
                debug!("Shutting down NVML for device {}", self.index);
                nvml.shutdown()
                    .map_err(|e| DeviceError::Shutdown(e.to_string()))
            }
            None => Ok(()),
        }
    }
}

impl Drop for NvmlDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("NVML shutdown for device {} failed: {}", self.index, e);
        }
    }
}

/// Enumerate visible devices as `(index, name)`.
pub fn list_devices() -> Result<Vec<(u32, String)>, DeviceError> {
    let nvml = Nvml::init().map_err(|e| DeviceError::Init(e.to_string()))?;
    let count = nvml
        .device_count()
        .map_err(|e| DeviceError::Init(e.to_string()))?;

    let mut devices = Vec::with_capacity(count as usize);
    for index in 0..count {
        let device = nvml
            .device_by_index(index)
            .map_err(|e| DeviceError::Init(e.to_string()))?;
        let name = device.name().map_err(|e| DeviceError::Name(e.to_string()))?;
        devices.push((index, name));
    }

    Ok(devices)
}
