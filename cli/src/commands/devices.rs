//! Devices command implementation

use crate::output;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(feature = "nvml")]
pub fn run(_args: DevicesArgs) -> Result<()> {
    use anyhow::Context;

    let devices = smitrace_sampler::list_devices().context("Failed to enumerate GPUs")?;
    if devices.is_empty() {
        output::warning("No GPUs found");
        return Ok(());
    }

    for (index, name) in &devices {
        output::device(*index, name);
    }
    Ok(())
}

#[cfg(not(feature = "nvml"))]
pub fn run(_args: DevicesArgs) -> Result<()> {
    output::warning("Built without NVML support; only the fake device is available");
    Err(smitrace_sampler::DeviceError::Unavailable.into())
}
