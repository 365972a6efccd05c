//! Transport layer abstraction for bridge communication
//!
//! The bridge is a byte-oriented request/response device, so the transport
//! only needs blocking writes and deadline-bounded reads.

use crate::error::Result;

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Write all bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes within the transport's read deadline
    ///
    /// Returns the number of bytes actually read. A count smaller than
    /// `buf.len()` means the deadline elapsed first; the caller decides
    /// whether that is a timeout or a short read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Flush any buffered output
    fn flush(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use crate::error::Error;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::Read;
    use std::time::Duration;

    /// Default per-read deadline, matching the bridge's worst-case latency
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

    /// Serial port transport
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialTransport {
        /// Open a serial port at the given baud rate (8N1, no flow control)
        pub fn open(device: &str, baud: u32) -> Result<Self> {
            let port = serialport::new(device, baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(DEFAULT_READ_TIMEOUT)
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud);

            Ok(Self { port })
        }

        /// Set the read deadline
        pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.port.set_timeout(timeout)?;
            Ok(())
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            use std::io::Write;
            self.port.write_all(data)?;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut filled = 0;
            while filled < buf.len() {
                match self.port.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::WouldBlock =>
                    {
                        break
                    }
                    Err(e) => return Err(Error::Io(e)),
                }
            }
            Ok(filled)
        }

        fn flush(&mut self) -> Result<()> {
            use std::io::Write;
            self.port.flush()?;
            Ok(())
        }
    }
}
