//! Flash image preparation

use crate::spi::{ERASED_BYTE, PAGE_SIZE, SECTOR_SIZE};

/// A binary image padded out to erase granularity
///
/// Padding bytes are the erased value, so padded pages are skipped as blank
/// during programming; the padding exists only so the image covers whole
/// sectors.
pub struct Image {
    data: Vec<u8>,
    raw_len: usize,
}

impl Image {
    /// Take ownership of raw image bytes and pad to the next sector boundary
    pub fn new(mut data: Vec<u8>) -> Self {
        let raw_len = data.len();
        let padded_len = raw_len.next_multiple_of(SECTOR_SIZE);
        data.resize(padded_len, ERASED_BYTE);
        Self { data, raw_len }
    }

    /// Length of the original input, before padding
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Padded length; always a whole number of sectors
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sectors(&self) -> usize {
        self.data.len() / SECTOR_SIZE
    }

    pub fn pages(&self) -> usize {
        self.data.len() / PAGE_SIZE
    }

    /// The page starting at `addr` (must be page-aligned and in range)
    pub fn page_at(&self, addr: u32) -> &[u8; PAGE_SIZE] {
        let start = addr as usize;
        self.data[start..start + PAGE_SIZE]
            .try_into()
            .unwrap_or_else(|_| unreachable!("pages are exactly {} bytes", PAGE_SIZE))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Whether a page holds only erased bytes
pub fn is_blank(page: &[u8]) -> bool {
    page.iter().all(|&b| b == ERASED_BYTE)
}
