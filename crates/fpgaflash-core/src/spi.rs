//! SPI flash opcodes, geometry, addressing and status decoding

use crate::error::{Error, Result};
use bitflags::bitflags;

/// Programming granularity in bytes
pub const PAGE_SIZE: usize = 256;
/// Erase granularity in bytes; one sector is 16 pages
pub const SECTOR_SIZE: usize = 4096;
/// Value of an erased flash byte
pub const ERASED_BYTE: u8 = 0xFF;
/// Highest address representable in the 3-byte address phase (16 MiB space)
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Flash command opcodes used by the bridge
///
/// This is the JEDEC subset the chip behind the bridge needs; nothing
/// beyond it is issued.
pub mod opcodes {
    /// Read JEDEC ID (manufacturer + device ID)
    pub const RDID: u8 = 0x9F;
    /// Read Status Register 1
    pub const RDSR: u8 = 0x05;
    /// Write Enable - required before any write/erase operation
    pub const WREN: u8 = 0x06;
    /// Write Disable - clears WEL bit in status register
    pub const WRDI: u8 = 0x04;
    /// Read Data
    pub const READ: u8 = 0x03;
    /// Page Program (256 bytes)
    pub const PP: u8 = 0x02;
    /// Sector Erase (4 KiB)
    pub const SE: u8 = 0x20;
}

bitflags! {
    /// Status register snapshot
    ///
    /// Only WIP and WEL are interpreted; the remaining bits are carried
    /// through untouched.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Write In Progress - an erase/program is still executing
        const WIP = 1 << 0;
        /// Write Enable Latch - set by WREN, cleared when a write completes
        const WEL = 1 << 1;
    }
}

impl Status {
    /// Decode a raw status register byte
    pub fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    pub fn write_in_progress(&self) -> bool {
        self.contains(Self::WIP)
    }

    pub fn write_enabled(&self) -> bool {
        self.contains(Self::WEL)
    }
}

/// Encode a flash address into the 3-byte big-endian wire form
///
/// Fails before any wire traffic if the address does not fit in 24 bits.
pub fn encode_address(addr: u32) -> Result<[u8; 3]> {
    if addr > MAX_ADDRESS {
        return Err(Error::InvalidAddress(addr));
    }
    Ok([(addr >> 16) as u8, (addr >> 8) as u8, addr as u8])
}

/// Decode a 3-byte big-endian address back into a u32
pub fn decode_address(bytes: [u8; 3]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        for addr in [0u32, 0x12, 0x7F00, 0x07F000, MAX_ADDRESS] {
            let encoded = encode_address(addr).unwrap();
            assert_eq!(decode_address(encoded), addr);
        }
    }

    #[test]
    fn address_is_big_endian() {
        assert_eq!(encode_address(0x07F000).unwrap(), [0x07, 0xF0, 0x00]);
    }

    #[test]
    fn address_top_byte_rejected() {
        for addr in [0x0100_0000u32, 0x8000_0000, u32::MAX] {
            assert!(matches!(
                encode_address(addr),
                Err(Error::InvalidAddress(a)) if a == addr
            ));
        }
    }

    #[test]
    fn status_decode() {
        let st = Status::from_byte(0x03);
        assert!(st.write_enabled());
        assert!(st.write_in_progress());

        let st = Status::from_byte(0x00);
        assert!(!st.write_enabled());
        assert!(!st.write_in_progress());

        assert!(Status::from_byte(0x02).write_enabled());
        assert!(!Status::from_byte(0x02).write_in_progress());
        assert!(Status::from_byte(0x01).write_in_progress());
        assert!(!Status::from_byte(0x01).write_enabled());
    }

    #[test]
    fn status_keeps_unobserved_bits() {
        assert_eq!(Status::from_byte(0xFC).bits(), 0xFC);
    }
}
