//! Bridge wire protocol
//!
//! The microcontroller on the other end of the serial line is a transparent
//! SPI bridge with a handful of single-byte commands. This module implements
//! the framing primitives (chip-select control, single-byte exchange, bulk
//! page transfers, echoed FPGA control bytes) and the byte-at-a-time
//! transaction engine built on top of them.

use crate::error::{Error, Result};
use crate::spi::PAGE_SIZE;
use crate::transport::Transport;

/// Bridge command bytes
pub mod wire {
    /// Lower the flash chip-select line; no response
    pub const CS_LOW: u8 = b'l';
    /// Raise the flash chip-select line; no response
    pub const CS_HIGH: u8 = b'r';
    /// Exchange one byte over SPI; followed by the byte, answered by one byte
    pub const EXCHANGE: u8 = b'b';
    /// Fast page program; followed by opcode + 3 address bytes + 256 data
    /// bytes, answered by ACCEPTED then COMPLETE
    pub const FAST_PROGRAM: u8 = b'f';
    /// Fast page read; followed by opcode + 3 address bytes, answered by
    /// 256 data bytes
    pub const FAST_READ: u8 = b'g';
    /// Assert FPGA reset; echoed back
    pub const FPGA_RESET: u8 = b'q';
    /// Release FPGA reset; echoed back
    pub const FPGA_RUN: u8 = b'w';
    /// Poll FPGA configuration-done; answered by DONE or NOT_DONE
    pub const FPGA_POLL: u8 = b'e';
    /// Release the flash from deep power-down; echoed back
    pub const FLASH_WAKE: u8 = b't';
    /// Hand the serial line to the FPGA design; echoed back
    pub const PASSTHROUGH: u8 = b'z';

    /// First fast-program acknowledgement: frame accepted
    pub const ACK_ACCEPTED: u8 = b'a';
    /// Second fast-program acknowledgement: program complete
    pub const ACK_COMPLETE: u8 = b'd';

    /// FPGA poll response: configuration not done yet
    pub const FPGA_NOT_DONE: u8 = 0x00;
    /// FPGA poll response: configuration done
    pub const FPGA_DONE: u8 = 0x01;
}

/// Number of redundant chip-select raises sent after a transport failure
const CS_RECOVERY_RAISES: usize = 4;

/// Connection to the SPI bridge
///
/// Owns the transport exclusively; every protocol layer above reaches the
/// wire through this struct.
pub struct Bridge<T: Transport> {
    pub(crate) transport: T,
}

impl<T: Transport> Bridge<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Lower the chip-select line
    pub fn select(&mut self) -> Result<()> {
        self.transport.write(&[wire::CS_LOW])
    }

    /// Raise the chip-select line
    pub fn deselect(&mut self) -> Result<()> {
        self.transport.write(&[wire::CS_HIGH])
    }

    /// Exchange one byte over SPI
    ///
    /// On a missing response or a hard read failure the chip-select line is
    /// forced high before the error surfaces, so the flash is back in a
    /// known state even if an in-flight operation was torn.
    pub fn exchange(&mut self, out: u8) -> Result<u8> {
        self.transport.write(&[wire::EXCHANGE, out])?;

        let mut buf = [0u8; 1];
        let n = match self.transport.read(&mut buf) {
            Ok(n) => n,
            Err(err) => {
                self.force_deselect();
                return Err(err);
            }
        };
        if n != 1 {
            self.force_deselect();
            return Err(Error::TransportTimeout);
        }
        Ok(buf[0])
    }

    /// Raise chip-select redundantly after a transport failure
    ///
    /// Sent four times: earlier raises may themselves have been lost in a
    /// partially-failed exchange, and redundant raises are harmless.
    fn force_deselect(&mut self) {
        for _ in 0..CS_RECOVERY_RAISES {
            let _ = self.transport.write(&[wire::CS_HIGH]);
        }
    }

    /// Run one SPI transaction byte-at-a-time under a single chip-select
    ///
    /// Sends the command byte and argument bytes, then clocks out
    /// `read_len` zero bytes to collect the response. Chip-select is
    /// deasserted on every exit path; a failed exchange raises it
    /// defensively before its error propagates.
    pub fn transact(&mut self, cmd: u8, args: &[u8], read_len: usize) -> Result<Vec<u8>> {
        self.select()?;
        self.exchange(cmd)?;
        for &b in args {
            self.exchange(b)?;
        }
        let mut back = Vec::with_capacity(read_len);
        for _ in 0..read_len {
            back.push(self.exchange(0)?);
        }
        self.deselect()?;
        Ok(back)
    }

    /// Send one bulk page-program frame and wait for both acknowledgements
    ///
    /// The bridge clocks the whole frame to the flash itself and answers
    /// `ACK_ACCEPTED` when the frame is taken and `ACK_COMPLETE` once the
    /// program operation has finished, so no status polling is needed on
    /// this path.
    pub fn bulk_program(&mut self, cmd: u8, addr: [u8; 3], data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut frame = Vec::with_capacity(5 + PAGE_SIZE);
        frame.push(wire::FAST_PROGRAM);
        frame.push(cmd);
        frame.extend_from_slice(&addr);
        frame.extend_from_slice(data);
        self.transport.write(&frame)?;

        let mut ack = [0u8; 2];
        let n = self.transport.read(&mut ack)?;
        if n != ack.len() {
            return Err(Error::ShortRead {
                expected: ack.len(),
                got: n,
            });
        }
        if ack[0] != wire::ACK_ACCEPTED {
            return Err(Error::AckMismatch {
                expected: wire::ACK_ACCEPTED,
                got: ack[0],
            });
        }
        if ack[1] != wire::ACK_COMPLETE {
            return Err(Error::AckMismatch {
                expected: wire::ACK_COMPLETE,
                got: ack[1],
            });
        }
        Ok(())
    }

    /// Send one bulk page-read frame and collect exactly one page
    pub fn bulk_read_page(&mut self, cmd: u8, addr: [u8; 3]) -> Result<[u8; PAGE_SIZE]> {
        let mut frame = [0u8; 5];
        frame[0] = wire::FAST_READ;
        frame[1] = cmd;
        frame[2..5].copy_from_slice(&addr);
        self.transport.write(&frame)?;

        let mut page = [0u8; PAGE_SIZE];
        let n = self.transport.read(&mut page)?;
        if n != PAGE_SIZE {
            return Err(Error::ShortRead {
                expected: PAGE_SIZE,
                got: n,
            });
        }
        Ok(page)
    }

    /// Send a control byte the bridge echoes back verbatim
    pub fn command_echo(&mut self, cmd: u8) -> Result<()> {
        let received = self.command_poll(cmd)?;
        if received != cmd {
            return Err(Error::EchoMismatch {
                sent: cmd,
                received,
            });
        }
        Ok(())
    }

    /// Send a control byte and return its single response byte
    pub fn command_poll(&mut self, cmd: u8) -> Result<u8> {
        self.transport.write(&[cmd])?;
        let mut buf = [0u8; 1];
        let n = self.transport.read(&mut buf)?;
        if n != 1 {
            return Err(Error::TransportTimeout);
        }
        Ok(buf[0])
    }
}
