//! Deterministic in-process device
//!
//! Produces metrics derived from the read counter, with scriptable read
//! failures and stalls. Used by tests and by `smitrace record --fake`.

use crate::device::DeviceHandle;
use crate::error::{DeviceError, Metric};
use smitrace_shared::DeviceMetrics;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted device handle
#[derive(Debug)]
pub struct FakeDevice {
    index: u32,
    name: String,
    reads: u64,
    fail_on: BTreeSet<u64>,
    stall_on: BTreeMap<u64, Duration>,
    fail_close: bool,
    closed: bool,
    closes: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: format!("Fake GPU {}", index),
            reads: 0,
            fail_on: BTreeSet::new(),
            stall_on: BTreeMap::new(),
            fail_close: false,
            closed: false,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the given reads (1-based read numbers)
    pub fn fail_on_reads(mut self, reads: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on.extend(reads);
        self
    }

    /// Block for `stall` before answering read number `read`
    pub fn stall_on_read(mut self, read: u64, stall: Duration) -> Self {
        self.stall_on.insert(read, stall);
        self
    }

    /// Make `close` report a shutdown error
    pub fn fail_on_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Counter of `close` calls that actually released the session
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }

    /// Number of reads attempted so far
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Metrics reported for read number `read`.
    ///
    /// `power_usage_mw` is `100_000 + read`, so every read is distinguishable.
    pub fn metrics_for(read: u64) -> DeviceMetrics {
        let r = read as u32;
        DeviceMetrics {
            temperature_c: 40 + r % 45,
            power_usage_mw: 100_000u32.wrapping_add(r),
            power_limit_mw: 250_000,
            utilization_gpu: r % 101,
            utilization_memory: r.wrapping_mul(3) % 101,
            memory_used_bytes: 1_000_000_000 + read * 1_000,
            memory_free_bytes: 15_000_000_000u64.saturating_sub(read * 1_000),
            throttle_reasons: if read % 2 == 0 { 0 } else { 0x4 },
            clock_sm_mhz: 1_000 + r % 1_000,
            clock_graphics_app_mhz: 1_590,
            clock_memory_mhz: 6_800,
            clock_memory_max_mhz: 7_001,
            performance_state: if r % 101 > 50 { 0 } else { 2 },
        }
    }
}

impl DeviceHandle for FakeDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn read_all(&mut self) -> Result<DeviceMetrics, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }

        self.reads += 1;
        let read = self.reads;

        if let Some(stall) = self.stall_on.get(&read) {
            std::thread::sleep(*stall);
        }

        if self.fail_on.contains(&read) {
            // Rotate through metrics so failures name different reads
            let metric = Metric::ALL[(read as usize) % Metric::ALL.len()];
            return Err(DeviceError::read(metric, format!("injected failure on read {}", read)));
        }

        Ok(Self::metrics_for(read))
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);

        if self.fail_close {
            return Err(DeviceError::Shutdown("injected shutdown failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_are_deterministic() {
        let mut device = FakeDevice::new(0);
        assert_eq!(device.read_all().unwrap(), FakeDevice::metrics_for(1));
        assert_eq!(device.read_all().unwrap(), FakeDevice::metrics_for(2));
        assert_eq!(device.reads(), 2);
    }

    #[test]
    fn test_injected_failure() {
        let mut device = FakeDevice::new(0).fail_on_reads([2]);
        assert!(device.read_all().is_ok());
        assert!(matches!(device.read_all(), Err(DeviceError::Read { .. })));
        assert_eq!(device.read_all().unwrap(), FakeDevice::metrics_for(3));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut device = FakeDevice::new(1);
        let closes = device.close_counter();

        device.close().unwrap();
        device.close().unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(matches!(device.read_all(), Err(DeviceError::Closed)));
    }

    #[test]
    fn test_failing_close_reports_once() {
        let mut device = FakeDevice::new(0).fail_on_close();
        assert!(matches!(device.close(), Err(DeviceError::Shutdown(_))));
        assert!(device.close().is_ok());
    }
}
