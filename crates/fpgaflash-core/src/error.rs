//! Error types for fpgaflash-core

use thiserror::Error;

/// Errors raised by the bridge protocol stack
#[derive(Debug, Error)]
pub enum Error {
    /// The bridge did not answer a single-byte exchange within the read deadline
    #[error("timed out waiting for a response from the bridge")]
    TransportTimeout,

    /// A bulk transfer returned fewer bytes than the frame promises
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// Address does not fit in the flash's 24-bit address space
    #[error("invalid address 0x{0:08X}: exceeds 24-bit range")]
    InvalidAddress(u32),

    /// The chip's JEDEC ID does not match the expected part
    #[error("chip ID mismatch: expected {expected:02x?}, got {found:02x?}")]
    IdMismatch { expected: [u8; 3], found: [u8; 3] },

    /// Status register bits disagree with an operation's precondition
    #[error(
        "unexpected status 0x{status:02X} (wanted WEL={expect_wel}, WIP={expect_wip})"
    )]
    UnexpectedStatus {
        status: u8,
        expect_wel: bool,
        expect_wip: bool,
    },

    /// An FPGA control command was not echoed back verbatim
    #[error("bridge echo mismatch for command 0x{sent:02X}: got 0x{received:02X}")]
    EchoMismatch { sent: u8, received: u8 },

    /// The FPGA did not report configuration-done within the attempt ceiling
    #[error("FPGA not done after {attempts} status polls")]
    FpgaTimeout { attempts: u32 },

    /// A fast page program returned the wrong acknowledgement byte
    #[error("fast program ack mismatch: expected 0x{expected:02X}, got 0x{got:02X}")]
    AckMismatch { expected: u8, got: u8 },

    /// Read-back after programming did not match the written data
    #[error("verify mismatch at page 0x{addr:06X}")]
    VerifyMismatch { addr: u32 },

    /// A caller-imposed deadline on the write-completion poll expired
    #[error("write completion poll exceeded its deadline")]
    WaitDeadline,

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge protocol operations
pub type Result<T> = std::result::Result<T, Error>;
