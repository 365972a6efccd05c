//! FPGA reset/configuration sequencing
//!
//! The bridge holds the FPGA's reset line and sees its DONE pin. Programming
//! the flash only works with the FPGA in reset (the SPI bus is shared), and
//! a run ends by releasing reset and waiting for the FPGA to reconfigure
//! itself from the freshly written image.

use crate::bridge::{wire, Bridge};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Total configuration-done poll attempts before giving up
///
/// Unlike flash erase/program, FPGA configuration is expected to finish
/// quickly; a hang here means real failure, so the bound is small and fixed.
pub const DONE_POLL_ATTEMPTS: u32 = 21;

/// Assert the FPGA's reset line
pub fn enter_reset<T: Transport>(bridge: &mut Bridge<T>) -> Result<()> {
    bridge.command_echo(wire::FPGA_RESET)
}

/// Release the FPGA's reset line, letting it reconfigure from flash
pub fn exit_reset<T: Transport>(bridge: &mut Bridge<T>) -> Result<()> {
    bridge.command_echo(wire::FPGA_RUN)
}

/// Release the flash chip from deep power-down
///
/// The board powers the flash down once the FPGA has configured; it must be
/// woken before any flash command will be honored.
pub fn release_flash_power_down<T: Transport>(bridge: &mut Bridge<T>) -> Result<()> {
    bridge.command_echo(wire::FLASH_WAKE)
}

/// Hand the serial line over to the FPGA design
///
/// Terminal for the session: after the echo comes back, no further protocol
/// traffic through this bridge is valid.
pub fn enter_passthrough<T: Transport>(bridge: &mut Bridge<T>) -> Result<()> {
    bridge.command_echo(wire::PASSTHROUGH)
}

/// Poll until the FPGA reports configuration-done
///
/// Returns the number of polls it took. Any response byte other than the
/// two defined poll answers is a protocol violation.
pub fn wait_done<T: Transport>(bridge: &mut Bridge<T>, max_attempts: u32) -> Result<u32> {
    for attempt in 1..=max_attempts {
        match bridge.command_poll(wire::FPGA_POLL)? {
            wire::FPGA_DONE => {
                log::debug!("FPGA done after {} status polls", attempt);
                return Ok(attempt);
            }
            wire::FPGA_NOT_DONE => continue,
            other => {
                return Err(Error::EchoMismatch {
                    sent: wire::FPGA_POLL,
                    received: other,
                })
            }
        }
    }
    Err(Error::FpgaTimeout {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedTransport;

    fn bridge(responses: &[u8]) -> Bridge<ScriptedTransport> {
        Bridge::new(ScriptedTransport::with_responses(responses))
    }

    #[test]
    fn reset_commands_echo() {
        let mut b = bridge(&[b'q', b'w', b't', b'z']);
        enter_reset(&mut b).unwrap();
        exit_reset(&mut b).unwrap();
        release_flash_power_down(&mut b).unwrap();
        enter_passthrough(&mut b).unwrap();
    }

    #[test]
    fn reset_echo_mismatch() {
        let mut b = bridge(&[b'w']);
        let err = enter_reset(&mut b).unwrap_err();
        assert!(matches!(
            err,
            Error::EchoMismatch {
                sent: b'q',
                received: b'w'
            }
        ));
    }

    #[test]
    fn wait_done_counts_polls() {
        let mut responses = vec![wire::FPGA_NOT_DONE; 4];
        responses.push(wire::FPGA_DONE);
        let mut b = bridge(&responses);
        assert_eq!(wait_done(&mut b, DONE_POLL_ATTEMPTS).unwrap(), 5);
    }

    #[test]
    fn wait_done_times_out_at_attempt_ceiling() {
        // Twenty-one busy answers exhaust the fixed bound.
        let responses = vec![wire::FPGA_NOT_DONE; DONE_POLL_ATTEMPTS as usize];
        let mut b = bridge(&responses);
        let err = wait_done(&mut b, DONE_POLL_ATTEMPTS).unwrap_err();
        assert!(matches!(err, Error::FpgaTimeout { attempts: 21 }));
        // Exactly 21 poll bytes went out.
        assert_eq!(b.transport.written.len(), 21);
    }

    #[test]
    fn wait_done_rejects_garbage_response() {
        let mut b = bridge(&[0x55]);
        let err = wait_done(&mut b, DONE_POLL_ATTEMPTS).unwrap_err();
        assert!(matches!(
            err,
            Error::EchoMismatch {
                sent: wire::FPGA_POLL,
                received: 0x55
            }
        ));
    }
}
