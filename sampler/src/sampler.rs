//! Fixed-rate polling loop and sampler lifecycle
//!
//! A [`Sampler`] owns one device handle, the sample buffer and the output
//! file. `start` moves the device and buffer onto a dedicated polling
//! thread; the controller ends collection through a [`StopHandle`]; teardown
//! joins the thread, releases the device and exports every sample.

use crate::buffer::SampleBuffer;
use crate::config::SamplerConfig;
use crate::device::DeviceHandle;
use crate::error::{DeviceError, Result, SamplerError};
use crate::export::{ExportSummary, Exporter};
use crate::stop::StopHandle;
use smitrace_shared::utils::time::MonotonicClock;
use smitrace_shared::Sample;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Name of the polling thread
pub const POLL_THREAD_NAME: &str = "smitrace-poll";

/// Read failures logged individually before switching to debug level
const MAX_LOGGED_FAILURES: u64 = 10;

/// Lifecycle state, as seen by the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Constructed, not yet started
    Idle,
    /// Polling thread active
    Running,
    /// Waiting for the polling thread to exit
    Stopping,
    /// Polling finished; terminal
    Stopped,
}

/// Polling counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Loop iterations that attempted a read
    pub ticks: u64,
    /// Samples appended to the buffer
    pub recorded: u64,
    /// Ticks skipped because a metric read failed
    pub failed_reads: u64,
    /// Ticks skipped because reads exceeded the read timeout
    pub timed_out_reads: u64,
}

impl SamplerStats {
    pub fn skipped(&self) -> u64 {
        self.failed_reads + self.timed_out_reads
    }
}

/// What the polling thread hands back when it exits
struct PollOutcome<D> {
    device: D,
    buffer: SampleBuffer,
    stats: SamplerStats,
    fatal: Option<DeviceError>,
}

/// State moved onto the polling thread
struct PollLoop<D> {
    device: D,
    buffer: SampleBuffer,
    stats: SamplerStats,
    stop: StopHandle,
    clock: MonotonicClock,
    tick_interval: Duration,
    read_timeout: Duration,
    fail_on_timeout: bool,
    max_ticks: Option<u64>,
}

impl<D: DeviceHandle> PollLoop<D> {
    fn run(mut self) -> PollOutcome<D> {
        info!(
            "Sampling {} (device {}) every {:?}",
            self.device.name(),
            self.device.index(),
            self.tick_interval
        );

        let mut fatal = None;
        let mut next_tick = Instant::now();

        while !self.stop.is_stop_requested() {
            self.stats.ticks += 1;
            let tick = self.stats.ticks;

            if let Err(e) = self.tick() {
                let is_timeout = matches!(e, DeviceError::Timeout { .. });
                self.record_failure(tick, &e);
                if is_timeout && self.fail_on_timeout {
                    error!("Tick {} exceeded the read timeout, stopping: {}", tick, e);
                    fatal = Some(e);
                    break;
                }
            }

            if self.max_ticks.is_some_and(|max| tick >= max) {
                debug!("Reached {} ticks", tick);
                break;
            }

            // Ticks are due on a fixed schedule; a late tick runs without sleeping
            next_tick += self.tick_interval;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                thread::yield_now();
            }
        }

        info!(
            "Polling stopped after {} ticks ({} recorded, {} failed, {} timed out)",
            self.stats.ticks,
            self.stats.recorded,
            self.stats.failed_reads,
            self.stats.timed_out_reads
        );

        PollOutcome {
            device: self.device,
            buffer: self.buffer,
            stats: self.stats,
            fatal,
        }
    }

    /// One tick: timestamp, read every metric, append. A failed tick appends nothing.
    fn tick(&mut self) -> std::result::Result<(), DeviceError> {
        let timestamp = self.clock.now_nanos();
        let started = Instant::now();

        let metrics = self.device.read_all()?;

        let elapsed = started.elapsed();
        if elapsed > self.read_timeout {
            return Err(DeviceError::Timeout {
                elapsed,
                limit: self.read_timeout,
            });
        }

        self.buffer.push(Sample::new(timestamp, metrics));
        self.stats.recorded += 1;
        Ok(())
    }

    fn record_failure(&mut self, tick: u64, err: &DeviceError) {
        if matches!(err, DeviceError::Timeout { .. }) {
            self.stats.timed_out_reads += 1;
        } else {
            self.stats.failed_reads += 1;
        }

        let failures = self.stats.skipped();
        if failures <= MAX_LOGGED_FAILURES {
            warn!("Tick {} skipped: {}", tick, err);
            if failures == MAX_LOGGED_FAILURES {
                warn!("Further read failures will be logged at debug level");
            }
        } else {
            debug!("Tick {} skipped: {}", tick, err);
        }
    }
}

/// Fixed-rate telemetry sampler for one device
pub struct Sampler<D: DeviceHandle> {
    config: SamplerConfig,
    state: SamplerState,
    device: Option<D>,
    buffer: Option<SampleBuffer>,
    stats: SamplerStats,
    exporter: Option<Exporter>,
    stop: StopHandle,
    worker: Option<JoinHandle<PollOutcome<D>>>,
}

#[cfg(feature = "nvml")]
impl Sampler<crate::device::NvmlDevice> {
    /// Open the NVML device at `config.device_index`, then create the sampler.
    ///
    /// The device is opened before the output file, so a device failure
    /// leaves no file behind.
    pub fn open(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        let device = crate::device::NvmlDevice::open(config.device_index)?;
        Self::new(device, config)
    }
}

impl<D: DeviceHandle> Sampler<D> {
    /// Create a sampler around an already-open device.
    ///
    /// Truncates the output file and writes the header. On failure the
    /// device is closed and nothing is left half-built.
    pub fn new(mut device: D, config: SamplerConfig) -> Result<Self> {
        let exporter = match config
            .validate()
            .and_then(|_| Exporter::create(&config.output_path))
        {
            Ok(exporter) => exporter,
            Err(e) => {
                if let Err(close_err) = device.close() {
                    warn!("Failed to release device {}: {}", device.index(), close_err);
                }
                return Err(e);
            }
        };

        info!(
            "Sampler ready: {} (device {}) -> {}",
            device.name(),
            device.index(),
            exporter.path().display()
        );

        Ok(Self {
            buffer: Some(SampleBuffer::with_capacity(config.initial_capacity)),
            stop: StopHandle::new(config.grace_period),
            state: SamplerState::Idle,
            device: Some(device),
            stats: SamplerStats::default(),
            exporter: Some(exporter),
            worker: None,
            config,
        })
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    /// Polling counters; final once the sampler is stopped
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Controller end of the stop flag, usable from any thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Buffered samples, or `None` while the polling thread owns them
    pub fn samples(&self) -> Option<&[Sample]> {
        if self.worker.is_some() {
            return None;
        }
        self.buffer.as_ref().map(|b| b.as_slice())
    }

    /// Start polling on a dedicated thread. Only valid once, from `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SamplerState::Idle {
            return Err(SamplerError::AlreadyStarted);
        }
        let device = self.device.take().ok_or(SamplerError::AlreadyStarted)?;
        let buffer = self
            .buffer
            .take()
            .unwrap_or_else(|| SampleBuffer::with_capacity(self.config.initial_capacity));

        let poller = PollLoop {
            device,
            buffer,
            stats: SamplerStats::default(),
            stop: self.stop.clone(),
            clock: MonotonicClock::new(),
            tick_interval: self.config.tick_interval,
            read_timeout: self.config.read_timeout,
            fail_on_timeout: self.config.fail_on_timeout,
            max_ticks: self.config.max_ticks,
        };

        let worker = thread::Builder::new()
            .name(POLL_THREAD_NAME.to_string())
            .spawn(move || poller.run())
            .map_err(|e| {
                // The device went down with the closure
                self.state = SamplerState::Stopped;
                SamplerError::Spawn(e)
            })?;

        self.worker = Some(worker);
        self.state = SamplerState::Running;
        Ok(())
    }

    /// Wait out the grace period, signal the loop, and wait for it to exit
    pub fn stop(&mut self) -> Result<()> {
        if self.state != SamplerState::Running {
            return Err(SamplerError::NotRunning);
        }
        debug!(
            "Collecting at least {} more ticks during the {:?} grace period",
            self.config.min_ticks_during_grace(),
            self.stop.grace_period()
        );
        self.stop.stop();
        self.join()
    }

    /// Wait for the polling thread to exit.
    ///
    /// Returns once another thread has signalled the stop handle or the
    /// loop reached `max_ticks`. A no-op if polling is not running.
    pub fn join(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.state = SamplerState::Stopping;

        let outcome = worker.join();
        self.state = SamplerState::Stopped;
        let outcome = outcome.map_err(|_| SamplerError::WorkerPanicked)?;

        self.device = Some(outcome.device);
        self.buffer = Some(outcome.buffer);
        self.stats = outcome.stats;

        match outcome.fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Stop if still running, release the device and export every sample
    pub fn finish(mut self) -> Result<ExportSummary> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<ExportSummary> {
        if self.worker.is_some() {
            self.stop.request_stop();
            if let Err(e) = self.join() {
                warn!("Polling ended with an error: {}", e);
            }
        }
        self.state = SamplerState::Stopped;

        // Shutdown errors are reported but never block the flush
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.close() {
                warn!("Failed to release device {}: {}", device.index(), e);
            }
        }

        let mut exporter = self.exporter.take().ok_or(SamplerError::AlreadyExported)?;
        debug_assert!(self.buffer.iter().all(|b| b.is_time_ordered()));
        let samples = self.buffer.as_ref().map(|b| b.as_slice()).unwrap_or(&[]);
        let rows = exporter.write_body(samples)?;
        let path = exporter.finish()?;

        debug!("Wrote {} samples to {}", rows, path.display());

        Ok(ExportSummary {
            path,
            rows,
            stats: self.stats,
        })
    }
}

impl<D: DeviceHandle> Drop for Sampler<D> {
    fn drop(&mut self) {
        if self.exporter.is_none() {
            return;
        }
        if let Err(e) = self.teardown() {
            error!(
                "Failed to export samples to {}: {}",
                self.config.output_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FakeDevice;

    fn config(dir: &tempfile::TempDir) -> SamplerConfig {
        SamplerConfig {
            grace_period: Duration::from_millis(20),
            ..SamplerConfig::with_output(dir.path().join("stats.csv"))
        }
    }

    #[test]
    fn test_new_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = Sampler::new(FakeDevice::new(0), config(&dir)).unwrap();

        assert_eq!(sampler.state(), SamplerState::Idle);
        assert_eq!(sampler.samples().map(|s| s.len()), Some(0));
        assert!(dir.path().join("stats.csv").exists());
    }

    #[test]
    fn test_second_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = Sampler::new(FakeDevice::new(0), config(&dir)).unwrap();

        sampler.start().unwrap();
        assert_eq!(sampler.state(), SamplerState::Running);
        assert!(matches!(sampler.start(), Err(SamplerError::AlreadyStarted)));

        sampler.stop_handle().request_stop();
        sampler.join().unwrap();
        assert_eq!(sampler.state(), SamplerState::Stopped);
        assert!(matches!(sampler.start(), Err(SamplerError::AlreadyStarted)));
    }

    #[test]
    fn test_stop_before_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = Sampler::new(FakeDevice::new(0), config(&dir)).unwrap();
        assert!(matches!(sampler.stop(), Err(SamplerError::NotRunning)));
    }

    #[test]
    fn test_samples_hidden_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = Sampler::new(FakeDevice::new(0), config(&dir)).unwrap();

        sampler.start().unwrap();
        assert!(sampler.samples().is_none());

        sampler.stop().unwrap();
        assert!(sampler.samples().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn test_invalid_config_closes_device() {
        let dir = tempfile::tempdir().unwrap();
        let device = FakeDevice::new(0);
        let closes = device.close_counter();

        let bad = SamplerConfig {
            tick_interval: Duration::ZERO,
            ..config(&dir)
        };
        assert!(matches!(Sampler::new(device, bad), Err(SamplerError::Config(_))));
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!dir.path().join("stats.csv").exists());
    }

    #[test]
    fn test_finish_without_start_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = Sampler::new(FakeDevice::new(0), config(&dir)).unwrap();

        let summary = sampler.finish().unwrap();
        assert_eq!(summary.rows, 0);
        assert_eq!(summary.stats, SamplerStats::default());

        let contents = std::fs::read_to_string(&summary.path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_export_leaves_confirmation_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let summary = tracing::subscriber::with_default(subscriber, || {
            let mut sampler = Sampler::new(
                FakeDevice::new(0),
                SamplerConfig {
                    max_ticks: Some(5),
                    ..config(&dir)
                },
            )
            .unwrap();
            sampler.start().unwrap();
            sampler.join().unwrap();
            sampler.finish().unwrap()
        });
        assert_eq!(summary.rows, 5);

        // Teardown runs on this thread; none of its lines reach INFO
        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Sampler ready"));
        assert!(!logs.contains("Writing"));
        assert!(!logs.contains("Wrote"));
    }
}
