//! Flash command driver
//!
//! Implements the SPI flash command set on top of the bridge, in two
//! interchangeable wire shapes: the byte-at-a-time transaction engine and
//! the bulk fast path. Both produce the same logical effect; the fast path
//! collapses hundreds of serial round trips into one frame.
//!
//! Completion contract: `erase_sector` waits for the chip itself;
//! `program_page_bytewise` does not, so its callers follow up with
//! `wait_ready`. The bulk program path gets completion signaling from the
//! bridge's acknowledgement pair instead.

use std::time::{Duration, Instant};

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::spi::{self, opcodes, Status, PAGE_SIZE};
use crate::transport::Transport;

/// JEDEC ID of the one chip this tool programs (Macronix MX25 series)
pub const JEDEC_ID: [u8; 3] = [0xC2, 0x20, 0x12];

/// Wire shape used for page-sized transfers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferPath {
    /// One bridge round trip per SPI byte
    ByteWise,
    /// One bulk frame per page
    #[default]
    Bulk,
}

/// Read the chip's 3-byte JEDEC ID
pub fn read_jedec_id<T: Transport>(bridge: &mut Bridge<T>) -> Result<[u8; 3]> {
    let id = bridge.transact(opcodes::RDID, &[], 3)?;
    Ok([id[0], id[1], id[2]])
}

/// Read the ID and fail unless the expected chip is present
///
/// Run once per session before any destructive command.
pub fn verify_id<T: Transport>(bridge: &mut Bridge<T>) -> Result<[u8; 3]> {
    let found = read_jedec_id(bridge)?;
    if found != JEDEC_ID {
        return Err(Error::IdMismatch {
            expected: JEDEC_ID,
            found,
        });
    }
    log::debug!(
        "Chip ID {:02x} {:02x} {:02x} verified",
        found[0],
        found[1],
        found[2]
    );
    Ok(found)
}

/// Read the status register
pub fn read_status<T: Transport>(bridge: &mut Bridge<T>) -> Result<Status> {
    let back = bridge.transact(opcodes::RDSR, &[], 1)?;
    Ok(Status::from_byte(back[0]))
}

/// Read the status register and compare the two observed bits
fn status_matches<T: Transport>(
    bridge: &mut Bridge<T>,
    expect_wel: bool,
    expect_wip: bool,
) -> Result<(bool, Status)> {
    let status = read_status(bridge)?;
    let matches =
        status.write_enabled() == expect_wel && status.write_in_progress() == expect_wip;
    Ok((matches, status))
}

/// Read the status register and fail unless both observed bits match
pub fn expect_status<T: Transport>(
    bridge: &mut Bridge<T>,
    expect_wel: bool,
    expect_wip: bool,
) -> Result<()> {
    let (matches, status) = status_matches(bridge, expect_wel, expect_wip)?;
    if !matches {
        return Err(Error::UnexpectedStatus {
            status: status.bits(),
            expect_wel,
            expect_wip,
        });
    }
    Ok(())
}

/// Set the write-enable latch and verify it actually took effect
///
/// The chip silently ignores erase/program commands without the latch, so
/// proceeding on an unverified latch risks silently losing data.
pub fn write_enable<T: Transport>(bridge: &mut Bridge<T>) -> Result<()> {
    bridge.transact(opcodes::WREN, &[], 0)?;
    expect_status(bridge, true, false)
}

/// Clear the write-enable latch
pub fn write_disable<T: Transport>(bridge: &mut Bridge<T>) -> Result<()> {
    bridge.transact(opcodes::WRDI, &[], 0)?;
    // Best-effort confirmation that the latch cleared.
    let status = read_status(bridge)?;
    if status.write_enabled() {
        log::warn!("WEL still set after write disable (status 0x{:02X})", status.bits());
    }
    Ok(())
}

/// Wait until the chip reports its erase/program finished
///
/// Unbounded busy-poll by design: erase/program duration varies by chip and
/// completion is signaled only through the status register. A caller that
/// needs to regain control can pass a `budget`; expiry fails with
/// `WaitDeadline` and the flash should be treated as indeterminate.
pub fn wait_ready<T: Transport>(bridge: &mut Bridge<T>, budget: Option<Duration>) -> Result<()> {
    let deadline = budget.map(|d| Instant::now() + d);
    loop {
        let (busy, _) = status_matches(bridge, true, true)?;
        if !busy {
            break;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(Error::WaitDeadline);
            }
        }
    }
    // The latch self-clears when the operation completes.
    expect_status(bridge, false, false)
}

/// Read one page through the byte-wise transaction engine
pub fn read_page_bytewise<T: Transport>(
    bridge: &mut Bridge<T>,
    addr: u32,
) -> Result<[u8; PAGE_SIZE]> {
    let addr_bytes = spi::encode_address(addr)?;
    let data = bridge.transact(opcodes::READ, &addr_bytes, PAGE_SIZE)?;
    data.try_into().map_err(|data: Vec<u8>| Error::ShortRead {
        expected: PAGE_SIZE,
        got: data.len(),
    })
}

/// Read one page through the bulk fast path
pub fn read_page_fast<T: Transport>(bridge: &mut Bridge<T>, addr: u32) -> Result<[u8; PAGE_SIZE]> {
    let addr_bytes = spi::encode_address(addr)?;
    bridge.bulk_read_page(opcodes::READ, addr_bytes)
}

/// Read one page through the selected path
pub fn read_page<T: Transport>(
    bridge: &mut Bridge<T>,
    addr: u32,
    path: TransferPath,
) -> Result<[u8; PAGE_SIZE]> {
    match path {
        TransferPath::ByteWise => read_page_bytewise(bridge, addr),
        TransferPath::Bulk => read_page_fast(bridge, addr),
    }
}

/// Program one page through the byte-wise transaction engine
///
/// Does not wait for completion; the caller calls `wait_ready` before the
/// next destructive command.
pub fn program_page_bytewise<T: Transport>(
    bridge: &mut Bridge<T>,
    addr: u32,
    data: &[u8; PAGE_SIZE],
) -> Result<()> {
    let addr_bytes = spi::encode_address(addr)?;
    write_enable(bridge)?;
    let mut args = Vec::with_capacity(3 + PAGE_SIZE);
    args.extend_from_slice(&addr_bytes);
    args.extend_from_slice(data);
    bridge.transact(opcodes::PP, &args, 0)?;
    Ok(())
}

/// Program one page through the bulk fast path
///
/// The bridge waits for the chip itself and acknowledges completion, so no
/// status polling follows.
pub fn program_page_fast<T: Transport>(
    bridge: &mut Bridge<T>,
    addr: u32,
    data: &[u8; PAGE_SIZE],
) -> Result<()> {
    let addr_bytes = spi::encode_address(addr)?;
    write_enable(bridge)?;
    bridge.bulk_program(opcodes::PP, addr_bytes, data)
}

/// Program one page through the selected path, honoring its completion
/// contract
///
/// `wait_budget` bounds the byte-wise completion poll; the bulk path gets
/// completion from the bridge's acknowledgement pair and ignores it.
pub fn program_page<T: Transport>(
    bridge: &mut Bridge<T>,
    addr: u32,
    data: &[u8; PAGE_SIZE],
    path: TransferPath,
    wait_budget: Option<Duration>,
) -> Result<()> {
    match path {
        TransferPath::ByteWise => {
            program_page_bytewise(bridge, addr, data)?;
            wait_ready(bridge, wait_budget)
        }
        TransferPath::Bulk => program_page_fast(bridge, addr, data),
    }
}

/// Erase the 4 KiB sector containing `addr` and wait for completion
///
/// The address is expected to be sector-aligned by the caller's iteration;
/// the chip erases the whole containing sector either way.
pub fn erase_sector<T: Transport>(
    bridge: &mut Bridge<T>,
    addr: u32,
    wait_budget: Option<Duration>,
) -> Result<()> {
    let addr_bytes = spi::encode_address(addr)?;
    write_enable(bridge)?;
    bridge.transact(opcodes::SE, &addr_bytes, 0)?;
    wait_ready(bridge, wait_budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::wire;
    use crate::testutil::ScriptedTransport;

    fn bridge(responses: &[u8]) -> Bridge<ScriptedTransport> {
        Bridge::new(ScriptedTransport::with_responses(responses))
    }

    #[test]
    fn verify_id_accepts_expected_chip() {
        // One discarded response for the command exchange, then the ID.
        let mut b = bridge(&[0x00, 0xC2, 0x20, 0x12]);
        assert_eq!(verify_id(&mut b).unwrap(), JEDEC_ID);
    }

    #[test]
    fn verify_id_rejects_one_bit_off() {
        let mut b = bridge(&[0x00, 0xC2, 0x20, 0x13]);
        let err = verify_id(&mut b).unwrap_err();
        assert!(matches!(
            err,
            Error::IdMismatch {
                found: [0xC2, 0x20, 0x13],
                ..
            }
        ));
    }

    #[test]
    fn write_enable_verifies_latch() {
        // WREN exchange, then a status read returning WEL set.
        let mut b = bridge(&[0x00, 0x00, 0x02]);
        write_enable(&mut b).unwrap();
    }

    #[test]
    fn write_enable_fails_if_latch_missing() {
        let mut b = bridge(&[0x00, 0x00, 0x00]);
        let err = write_enable(&mut b).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedStatus {
                status: 0x00,
                expect_wel: true,
                expect_wip: false,
            }
        ));
    }

    #[test]
    fn write_disable_is_best_effort() {
        // WRDI exchange, then the confirming status read shows WEL clear.
        let mut b = bridge(&[0x00, 0x00, 0x00]);
        write_disable(&mut b).unwrap();

        // A stuck latch is logged, not fatal.
        let mut b = bridge(&[0x00, 0x00, 0x02]);
        write_disable(&mut b).unwrap();
    }

    #[test]
    fn wait_ready_polls_until_wip_clears() {
        // Two busy polls (0x03), then idle, then the confirming read.
        let mut b = bridge(&[0, 0x03, 0, 0x03, 0, 0x00, 0, 0x00]);
        wait_ready(&mut b, None).unwrap();
    }

    #[test]
    fn wait_ready_requires_latch_to_self_clear() {
        // WIP cleared but WEL stuck set: the confirming read must fail.
        let mut b = bridge(&[0, 0x03, 0, 0x02, 0, 0x02]);
        let err = wait_ready(&mut b, None).unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 0x02, .. }));
    }

    #[test]
    fn wait_ready_deadline_expires() {
        let mut b = bridge(&[0, 0x03, 0, 0x03]);
        let err = wait_ready(&mut b, Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, Error::WaitDeadline));
    }

    #[test]
    fn erase_sector_sequences_enable_command_wait() {
        let mut b = bridge(&[
            0x00, // WREN command exchange
            0x00, 0x02, // status: WEL set
            0x00, 0x00, 0x00, 0x00, // SE command + 3 address bytes
            0x00, 0x03, // busy
            0x00, 0x00, // idle
            0x00, 0x00, // latch self-cleared
        ]);
        erase_sector(&mut b, 0x1000, None).unwrap();

        // The erase transaction carries the sector address big-endian.
        let written = &b.transport.written;
        let pos = written
            .windows(2)
            .position(|w| w == [wire::EXCHANGE, opcodes::SE])
            .unwrap();
        assert_eq!(written[pos + 3], 0x00);
        assert_eq!(written[pos + 5], 0x10);
        assert_eq!(written[pos + 7], 0x00);
    }

    #[test]
    fn program_page_fast_enables_write_first() {
        let mut b = bridge(&[
            0x00, // WREN
            0x00, 0x02, // status: WEL set
            wire::ACK_ACCEPTED,
            wire::ACK_COMPLETE,
        ]);
        let data = [0xA5; PAGE_SIZE];
        program_page(&mut b, 0x2000, &data, TransferPath::Bulk, None).unwrap();

        let written = &b.transport.written;
        let frame = written
            .windows(5)
            .position(|w| w == [wire::FAST_PROGRAM, opcodes::PP, 0x00, 0x20, 0x00])
            .unwrap();
        assert_eq!(written.len() - frame, 5 + PAGE_SIZE);
    }

    #[test]
    fn program_page_bytewise_honors_wait_budget() {
        // WREN, the latch confirmation, the 260-byte program transaction,
        // then a completion poll that stays busy forever.
        let mut responses = vec![0x00, 0x00, 0x02];
        responses.extend(std::iter::repeat(0x00).take(4 + PAGE_SIZE));
        responses.extend_from_slice(&[0x00, 0x03]);
        let mut b = bridge(&responses);
        let err = program_page(
            &mut b,
            0x2000,
            &[0xA5; PAGE_SIZE],
            TransferPath::ByteWise,
            Some(Duration::ZERO),
        )
        .unwrap_err();
        assert!(matches!(err, Error::WaitDeadline));
    }

    #[test]
    fn program_page_rejects_out_of_range_address() {
        let mut b = bridge(&[]);
        let err =
            program_page(&mut b, 0x0100_0000, &[0u8; PAGE_SIZE], TransferPath::Bulk, None)
                .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(0x0100_0000)));
        // Validation failed before any wire traffic.
        assert!(b.transport.written.is_empty());
    }
}
