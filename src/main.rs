//! fpgaflash - SPI flash programmer for FPGA boards behind a serial bridge
//!
//! The board carries a NOR flash chip, an FPGA that configures itself from
//! it, and a microcontroller exposing the SPI bus and the FPGA's
//! reset/done pins as single-byte commands over a serial port. This binary
//! wraps the protocol stack in `fpgaflash-core` with argument parsing,
//! file I/O, and progress reporting.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, DeviceArgs};
use fpgaflash_core::transport::serial::SerialTransport;
use fpgaflash_core::{Bridge, Transport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG still wins; -v/-vv only raise the default.
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(cli.verbose)),
    )
    .init();

    match cli.command {
        Commands::Probe { device } => {
            let mut bridge = open_bridge(&device)?;
            commands::probe::run_probe(&mut bridge)
        }
        Commands::Read {
            device,
            output,
            start,
            length,
        } => {
            let mut bridge = open_bridge(&device)?;
            commands::read::run_read(&mut bridge, &output, start, length)
        }
        Commands::Write {
            device,
            input,
            verify,
            verify_fatal,
            byte_wise,
            passthrough,
        } => {
            let mut bridge = open_bridge(&device)?;
            commands::write::run_write(
                &mut bridge,
                &input,
                commands::write::WriteArgs {
                    verify,
                    verify_fatal,
                    byte_wise,
                    passthrough,
                },
            )
        }
    }
}

/// Map the repeatable -v flag onto a default log filter
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Open the bridge on a serial port, or on the emulator for dry runs
fn open_bridge(device: &DeviceArgs) -> Result<Bridge<Box<dyn Transport>>, Box<dyn std::error::Error>> {
    if device.port == "dummy" {
        #[cfg(feature = "dummy")]
        {
            log::info!("Using the in-memory board emulator");
            return Ok(Bridge::new(
                Box::new(fpgaflash_dummy::DummyBridge::new_default()) as Box<dyn Transport>,
            ));
        }
        #[cfg(not(feature = "dummy"))]
        return Err("this build has no emulator support (dummy feature disabled)".into());
    }

    let transport = SerialTransport::open(&device.port, device.baud)?;
    Ok(Bridge::new(Box::new(transport) as Box<dyn Transport>))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_default_filter() {
        assert_eq!(default_log_filter(0), "info");
        assert_eq!(default_log_filter(1), "debug");
        assert_eq!(default_log_filter(2), "trace");
        assert_eq!(default_log_filter(5), "trace");
    }
}
