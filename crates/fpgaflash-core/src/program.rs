//! Programming orchestrator
//!
//! Drives a full-image write: FPGA reset bracketing, identity gate, the
//! per-sector erase cadence, per-page blank skipping, optional read-back
//! verification, and the final configuration-done poll.

use std::time::Duration;

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::flash::{self, TransferPath};
use crate::fpga;
use crate::image::{self, Image};
use crate::spi::SECTOR_SIZE;
use crate::transport::Transport;

/// What to do when a read-back does not match the written page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerifyPolicy {
    /// Log the mismatch and keep going
    #[default]
    Warn,
    /// Abort the run
    Fatal,
}

/// Options for a programming run
#[derive(Clone, Debug)]
pub struct ProgramOptions {
    /// Read each programmed page back and compare; `None` disables
    pub verify: Option<VerifyPolicy>,
    /// Wire shape for page programs
    pub path: TransferPath,
    /// Hand the serial line to the FPGA design after the done poll
    pub passthrough: bool,
    /// Optional per-wait budget for erase and byte-wise program
    /// completion polls
    pub wait_budget: Option<Duration>,
    /// Configuration-done poll attempt ceiling
    pub done_poll_attempts: u32,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            verify: None,
            path: TransferPath::default(),
            passthrough: false,
            wait_budget: None,
            done_poll_attempts: fpga::DONE_POLL_ATTEMPTS,
        }
    }
}

/// Progress callbacks for a programming run
///
/// All methods have empty defaults; a reporter implements what it shows.
pub trait ProgramProgress {
    fn image_prepared(&mut self, raw_len: usize, padded_len: usize) {
        let _ = (raw_len, padded_len);
    }
    fn erasing_sector(&mut self, addr: u32) {
        let _ = addr;
    }
    fn page_skipped(&mut self, addr: u32) {
        let _ = addr;
    }
    fn page_programmed(&mut self, addr: u32) {
        let _ = addr;
    }
    fn verify_mismatch(&mut self, addr: u32) {
        let _ = addr;
    }
    fn fpga_done(&mut self, polls: u32) {
        let _ = polls;
    }
}

/// Progress sink that reports nothing
pub struct NullProgress;

impl ProgramProgress for NullProgress {}

/// Counters summarizing a programming run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramStats {
    pub sectors_erased: usize,
    pub pages_programmed: usize,
    pub pages_skipped: usize,
    pub verify_mismatches: usize,
    pub done_polls: u32,
}

/// Program a padded image into flash and bring the FPGA up on it
///
/// Aborts on the first fatal error; the flash may be left partially
/// programmed and the FPGA in reset. No rollback is attempted.
pub fn program_image<T: Transport>(
    bridge: &mut Bridge<T>,
    image: &Image,
    options: &ProgramOptions,
    progress: &mut dyn ProgramProgress,
) -> Result<ProgramStats> {
    let mut stats = ProgramStats::default();

    log::info!(
        "Programming {} bytes ({} raw + padding): {} pages, {} sectors",
        image.len(),
        image.raw_len(),
        image.pages(),
        image.sectors()
    );
    progress.image_prepared(image.raw_len(), image.len());

    // The SPI bus is shared with the FPGA: hold it in reset and wake the
    // flash before any command.
    fpga::enter_reset(bridge)?;
    fpga::release_flash_power_down(bridge)?;

    flash::verify_id(bridge)?;

    for page_index in 0..image.pages() {
        let addr = (page_index * crate::spi::PAGE_SIZE) as u32;

        if addr as usize % SECTOR_SIZE == 0 {
            log::info!("Erasing sector 0x{:06X}", addr);
            progress.erasing_sector(addr);
            flash::erase_sector(bridge, addr, options.wait_budget)?;
            stats.sectors_erased += 1;
        }

        let page = image.page_at(addr);
        if image::is_blank(page) {
            log::debug!("Skipping blank page 0x{:06X}", addr);
            progress.page_skipped(addr);
            stats.pages_skipped += 1;
            continue;
        }

        flash::program_page(bridge, addr, page, options.path, options.wait_budget)?;
        stats.pages_programmed += 1;
        progress.page_programmed(addr);

        if let Some(policy) = options.verify {
            let back = flash::read_page_fast(bridge, addr)?;
            if back != *page {
                stats.verify_mismatches += 1;
                progress.verify_mismatch(addr);
                match policy {
                    VerifyPolicy::Warn => {
                        log::warn!("Verify mismatch at page 0x{:06X}", addr);
                    }
                    VerifyPolicy::Fatal => return Err(Error::VerifyMismatch { addr }),
                }
            }
        }
    }

    fpga::exit_reset(bridge)?;
    stats.done_polls = fpga::wait_done(bridge, options.done_poll_attempts)?;
    progress.fpga_done(stats.done_polls);

    if options.passthrough {
        log::info!("Handing serial line to the FPGA design");
        fpga::enter_passthrough(bridge)?;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::wire;
    use crate::spi::opcodes;
    use crate::testutil::ScriptedTransport;

    #[test]
    fn empty_image_still_sequences_fpga() {
        // Reset echo, wake echo, ID transaction, run echo, done poll.
        let mut bridge = Bridge::new(ScriptedTransport::with_responses(&[
            b'q',
            b't',
            0x00,
            0xC2,
            0x20,
            0x12,
            b'w',
            wire::FPGA_DONE,
        ]));
        let stats = program_image(
            &mut bridge,
            &Image::new(Vec::new()),
            &ProgramOptions::default(),
            &mut NullProgress,
        )
        .unwrap();
        assert_eq!(stats, ProgramStats {
            done_polls: 1,
            ..ProgramStats::default()
        });
        assert_eq!(bridge.transport.written[0], b'q');
        assert_eq!(bridge.transport.written[1], b't');
        assert_eq!(*bridge.transport.written.last().unwrap(), b'e');
    }

    #[test]
    fn wait_budget_reaches_byte_wise_program_polls() {
        use crate::flash::TransferPath;
        use crate::spi::PAGE_SIZE;
        use std::time::Duration;

        // Reset echo, wake echo, ID transaction.
        let mut responses = vec![b'q', b't', 0x00, 0xC2, 0x20, 0x12];
        // Sector erase completing on its first poll.
        responses.extend_from_slice(&[0x00, 0x00, 0x02]);
        responses.extend_from_slice(&[0x00; 4]);
        responses.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        // Byte-wise page program whose completion poll stays busy.
        responses.extend_from_slice(&[0x00, 0x00, 0x02]);
        responses.extend(std::iter::repeat(0x00).take(4 + PAGE_SIZE));
        responses.extend_from_slice(&[0x00, 0x03]);

        let mut bridge = Bridge::new(ScriptedTransport::with_responses(&responses));
        let options = ProgramOptions {
            path: TransferPath::ByteWise,
            wait_budget: Some(Duration::ZERO),
            ..ProgramOptions::default()
        };
        let err = program_image(
            &mut bridge,
            &Image::new(vec![0x00; 1]),
            &options,
            &mut NullProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::WaitDeadline));
    }

    #[test]
    fn id_mismatch_aborts_before_destructive_commands() {
        let mut bridge = Bridge::new(ScriptedTransport::with_responses(&[
            b'q', b't', 0x00, 0xC2, 0x20, 0x13,
        ]));
        let err = program_image(
            &mut bridge,
            &Image::new(vec![0x00; 5000]),
            &ProgramOptions::default(),
            &mut NullProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::IdMismatch { .. }));

        // Neither an erase nor a page program ever hit the wire.
        let written = &bridge.transport.written;
        assert!(!written
            .windows(2)
            .any(|w| w == [wire::EXCHANGE, opcodes::SE]));
        assert!(!written.windows(2).any(|w| w == [wire::EXCHANGE, opcodes::PP]));
        assert!(!written.contains(&wire::FAST_PROGRAM));
    }
}
