//! Scripted in-memory transport for unit tests

use crate::error::Result;
use crate::transport::Transport;
use std::collections::VecDeque;

/// Transport that records everything written and replays a scripted
/// response byte stream. Running out of scripted bytes looks like a read
/// deadline elapsing.
pub struct ScriptedTransport {
    pub written: Vec<u8>,
    pub responses: VecDeque<u8>,
    pub fail_reads: bool,
}

impl ScriptedTransport {
    pub fn with_responses(responses: &[u8]) -> Self {
        Self {
            written: Vec::new(),
            responses: responses.iter().copied().collect(),
            fail_reads: false,
        }
    }

    /// Make every read fail hard, as if the port vanished mid-session
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::with_responses(&[])
        }
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.fail_reads {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        let mut filled = 0;
        while filled < buf.len() {
            match self.responses.pop_front() {
                Some(b) => {
                    buf[filled] = b;
                    filled += 1;
                }
                None => break,
            }
        }
        Ok(filled)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
