//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "fpgaflash")]
#[command(author, version, about = "SPI flash programmer for FPGA boards behind a serial bridge", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Bridge connection options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Serial device of the bridge (e.g. /dev/ttyUSB0), or "dummy" for the
    /// in-memory board emulator
    #[arg(short, long)]
    pub port: String,

    /// Baud rate of the serial link
    #[arg(short, long, default_value_t = 38400)]
    pub baud: u32,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the expected flash chip answers
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Read flash contents to a file
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Program a BIN image into flash and bring the FPGA up on it
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Input BIN file path
        #[arg(short, long)]
        input: PathBuf,

        /// Read each programmed page back and report mismatches
        #[arg(long)]
        verify: bool,

        /// Treat a verify mismatch as fatal instead of a warning
        #[arg(long, requires = "verify")]
        verify_fatal: bool,

        /// Program byte-at-a-time instead of with bulk page frames (slow,
        /// for debugging the bridge)
        #[arg(long)]
        byte_wise: bool,

        /// Hand the serial line to the FPGA design after programming
        #[arg(long)]
        passthrough: bool,
    },
}
