//! fpgaflash-core - protocol stack for the serial SPI bridge programmer
//!
//! The target board carries a SPI NOR flash chip, an FPGA that configures
//! itself from it, and a microcontroller exposing the SPI bus and the
//! FPGA's reset/done pins over a serial byte protocol. This crate layers:
//!
//! - [`transport`] - the raw byte channel (serial port, or anything
//!   implementing [`Transport`])
//! - [`bridge`] - the bridge's framing primitives and the byte-at-a-time
//!   transaction engine
//! - [`flash`] - the SPI flash command driver, with byte-wise and bulk
//!   transfer paths
//! - [`fpga`] - reset/configuration-done sequencing
//! - [`program`] - the full-image programming orchestrator
//!
//! Everything is synchronous and single-threaded: one request, one blocking
//! deadline-bounded response, no overlap between transactions.

pub mod bridge;
pub mod error;
pub mod flash;
pub mod fpga;
pub mod image;
pub mod program;
pub mod spi;
pub mod transport;

pub use bridge::Bridge;
pub use error::{Error, Result};
pub use transport::Transport;

#[cfg(test)]
pub(crate) mod testutil;
