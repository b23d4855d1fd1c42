//! Record command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use smitrace_sampler::{DeviceHandle, FakeDevice, Sampler, SamplerConfig};
use smitrace_shared::utils::parse_duration;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Prefix for configuration environment variables (e.g. `SMITRACE_TICK_INTERVAL`)
const ENV_PREFIX: &str = "SMITRACE";

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Zero-based index of the GPU to sample
    #[arg(short, long)]
    pub device: Option<u32>,

    /// Output file (truncated if it exists)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// How long to record before stopping (e.g., "30s", "5m"); runs until Ctrl-C if omitted
    #[arg(short = 't', long)]
    pub duration: Option<String>,

    /// Extra collection time honored by stop (e.g., "2s")
    #[arg(long)]
    pub grace: Option<String>,

    /// Delay between ticks (e.g., "1ms")
    #[arg(short, long)]
    pub interval: Option<String>,

    /// Discard a tick whose reads take longer than this (e.g., "100ms")
    #[arg(long)]
    pub read_timeout: Option<String>,

    /// Stop recording on the first read timeout instead of skipping the tick
    #[arg(long)]
    pub fail_on_timeout: bool,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sample a synthetic device instead of real hardware
    #[arg(long)]
    pub fake: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Layer defaults, the config file, `SMITRACE_*` variables and CLI flags
pub fn load_config(args: &RecordArgs) -> Result<SamplerConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

    let mut sampler_config: SamplerConfig = builder
        .build()
        .context("Failed to load configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    if let Some(device) = args.device {
        sampler_config.device_index = device;
    }
    if let Some(output) = &args.output {
        sampler_config.output_path = output.clone();
    }
    if let Some(grace) = &args.grace {
        sampler_config.grace_period = parse_duration(grace).context("Failed to parse grace period")?;
    }
    if let Some(interval) = &args.interval {
        sampler_config.tick_interval = parse_duration(interval).context("Failed to parse interval")?;
    }
    if let Some(timeout) = &args.read_timeout {
        sampler_config.read_timeout =
            parse_duration(timeout).context("Failed to parse read timeout")?;
    }
    if args.fail_on_timeout {
        sampler_config.fail_on_timeout = true;
    }
    if args.max_ticks.is_some() {
        sampler_config.max_ticks = args.max_ticks;
    }

    sampler_config.validate().context("Invalid configuration")?;
    Ok(sampler_config)
}

#[cfg(feature = "nvml")]
fn open_hardware(index: u32) -> Result<Box<dyn DeviceHandle>> {
    let device = smitrace_sampler::NvmlDevice::open(index)
        .with_context(|| format!("Failed to open GPU {}", index))?;
    Ok(Box::new(device))
}

#[cfg(not(feature = "nvml"))]
fn open_hardware(_index: u32) -> Result<Box<dyn DeviceHandle>> {
    Err(smitrace_sampler::DeviceError::Unavailable).context("Use --fake to record without a GPU")
}

/// Open the device first so a device failure leaves no output file behind
fn open_sampler(config: SamplerConfig, fake: bool) -> Result<Sampler<Box<dyn DeviceHandle>>> {
    let device: Box<dyn DeviceHandle> = if fake {
        Box::new(FakeDevice::new(config.device_index))
    } else {
        open_hardware(config.device_index)?
    };

    Sampler::new(device, config).context("Failed to create sampler")
}

async fn wait_for(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

pub async fn run(args: RecordArgs) -> Result<()> {
    let config = load_config(&args)?;
    let duration = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()
        .context("Failed to parse duration")?;

    let mut sampler = open_sampler(config, args.fake)?;
    let stop = sampler.stop_handle();
    sampler.start().context("Failed to start sampling")?;

    let target = sampler.output_path().display().to_string();
    match duration {
        Some(d) => info!("Recording to {} for {:?} (Ctrl-C to stop early)", target, d),
        None => info!("Recording to {} until Ctrl-C", target),
    }

    // The polling thread owns collection; this task is the controller
    let mut poller = tokio::task::spawn_blocking(move || {
        let joined = sampler.join();
        (sampler, joined)
    });

    let finished = tokio::select! {
        res = &mut poller => Some(res),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping");
            None
        }
        _ = wait_for(duration) => None,
    };

    let (sampler, joined) = match finished {
        Some(res) => res.context("Polling task failed")?,
        None => {
            tokio::task::spawn_blocking(move || stop.stop())
                .await
                .context("Stop task failed")?;
            poller.await.context("Polling task failed")?
        }
    };

    if let Err(e) = joined {
        warn!("Polling ended with an error: {}", e);
    }

    let summary = tokio::task::spawn_blocking(move || sampler.finish())
        .await
        .context("Export task failed")?
        .context("Failed to write samples")?;

    if summary.stats.skipped() > 0 {
        output::warning(&format!(
            "{} of {} ticks skipped ({} failed reads, {} timeouts)",
            summary.stats.skipped(),
            summary.stats.ticks,
            summary.stats.failed_reads,
            summary.stats.timed_out_reads
        ));
    }
    output::success(&format!(
        "Writing NVIDIA-SMI data -> {} ({} samples)",
        summary.path.display(),
        summary.rows
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RecordArgs {
        RecordArgs {
            device: None,
            output: None,
            duration: None,
            grace: None,
            interval: None,
            read_timeout: None,
            fail_on_timeout: false,
            max_ticks: None,
            config: None,
            fake: true,
            verbose: false,
        }
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(&args()).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(1));
        assert_eq!(config.grace_period, Duration::from_secs(2));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("smitrace.toml");
        std::fs::write(
            &file,
            "device_index = 3\noutput_path = \"from_file.csv\"\ntick_interval = \"10ms\"\n",
        )
        .unwrap();

        let config = load_config(&RecordArgs {
            config: Some(file),
            device: Some(1),
            grace: Some("250ms".to_string()),
            max_ticks: Some(42),
            ..args()
        })
        .unwrap();

        assert_eq!(config.device_index, 1);
        assert_eq!(config.output_path, PathBuf::from("from_file.csv"));
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert_eq!(config.max_ticks, Some(42));
    }

    #[test]
    fn test_invalid_flag_rejected() {
        let result = load_config(&RecordArgs {
            interval: Some("0ms".to_string()),
            ..args()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_interval_above_default_read_timeout() {
        let config = load_config(&RecordArgs {
            interval: Some("200ms".to_string()),
            ..args()
        })
        .unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(200));
        assert_eq!(config.read_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_read_timeout_flags() {
        let config = load_config(&RecordArgs {
            read_timeout: Some("25ms".to_string()),
            fail_on_timeout: true,
            ..args()
        })
        .unwrap();
        assert_eq!(config.read_timeout, Duration::from_millis(25));
        assert!(config.fail_on_timeout);

        let zero = load_config(&RecordArgs {
            read_timeout: Some("0ms".to_string()),
            ..args()
        });
        assert!(zero.is_err());
    }

    #[tokio::test]
    async fn test_record_fake_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.csv");

        run(RecordArgs {
            output: Some(path.clone()),
            grace: Some("0s".to_string()),
            max_ticks: Some(20),
            ..args()
        })
        .await
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 21);
        assert_eq!(
            contents.lines().next(),
            Some(smitrace_shared::header_line().as_str())
        );
    }
}
