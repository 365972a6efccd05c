//! fpgaflash-dummy - in-memory bridge and flash emulator
//!
//! Emulates the serial-to-SPI bridge together with the NOR flash chip and
//! FPGA pins behind it. Useful for testing the whole protocol stack and for
//! dry runs without hardware.

use std::collections::VecDeque;

use fpgaflash_core::bridge::wire;
use fpgaflash_core::error::Result;
use fpgaflash_core::spi::{opcodes, ERASED_BYTE, SECTOR_SIZE};
use fpgaflash_core::Transport;

/// Configuration for the emulated board
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC ID the emulated chip reports
    pub jedec_id: [u8; 3],
    /// Flash size in bytes
    pub size: usize,
    /// Status reads that report busy after a byte-wise erase/program
    pub busy_status_reads: u32,
    /// Done polls answered "not done" after FPGA reset is released
    pub done_poll_busy: u32,
    /// Whether the flash starts in deep power-down, as on the real board
    pub start_powered_down: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            jedec_id: [0xC2, 0x20, 0x12],
            size: 512 * 1024,
            busy_status_reads: 2,
            done_poll_busy: 3,
            start_powered_down: true,
        }
    }
}

enum Pending {
    None,
    /// Waiting for the data byte of an exchange
    Exchange,
    /// Collecting a fast-program frame body (opcode + address + page)
    FastProgram(Vec<u8>),
    /// Collecting a fast-read frame body (opcode + address)
    FastRead(Vec<u8>),
}

const FAST_PROGRAM_BODY: usize = 1 + 3 + 256;
const FAST_READ_BODY: usize = 1 + 3;

/// Emulated bridge, flash chip, and FPGA pins
pub struct DummyBridge {
    config: DummyConfig,
    out: VecDeque<u8>,
    pending: Pending,

    // Flash chip state
    mem: Vec<u8>,
    selected: bool,
    txn: Vec<u8>,
    write_enabled: bool,
    busy_reads: u32,
    powered_down: bool,

    // FPGA pins
    fpga_in_reset: bool,
    done_countdown: u32,
    passthrough: bool,

    // Fault injection and bookkeeping
    drop_responses: u32,
    force_never_done: bool,
    corrupt_programs: bool,
    erase_ops: Vec<u32>,
    program_ops: Vec<u32>,
}

impl DummyBridge {
    pub fn new(config: DummyConfig) -> Self {
        let mem = vec![ERASED_BYTE; config.size];
        let powered_down = config.start_powered_down;
        Self {
            config,
            out: VecDeque::new(),
            pending: Pending::None,
            mem,
            selected: false,
            txn: Vec::new(),
            write_enabled: false,
            busy_reads: 0,
            powered_down,
            fpga_in_reset: false,
            done_countdown: 0,
            passthrough: false,
            drop_responses: 0,
            force_never_done: false,
            corrupt_programs: false,
            erase_ops: Vec::new(),
            program_ops: Vec::new(),
        }
    }

    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.mem
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// Sector-erase addresses, in issue order
    pub fn erase_ops(&self) -> &[u32] {
        &self.erase_ops
    }

    /// Page-program addresses, in issue order
    pub fn program_ops(&self) -> &[u32] {
        &self.program_ops
    }

    pub fn in_passthrough(&self) -> bool {
        self.passthrough
    }

    pub fn fpga_in_reset(&self) -> bool {
        self.fpga_in_reset
    }

    /// Swallow the next `n` response bytes, emulating a flaky serial link
    pub fn drop_responses(&mut self, n: u32) {
        self.drop_responses = n;
    }

    /// Answer every done poll with "not done"
    pub fn force_never_done(&mut self) {
        self.force_never_done = true;
    }

    /// Flip a bit in every programmed page, so read-back never matches
    pub fn corrupt_programmed_pages(&mut self) {
        self.corrupt_programs = true;
    }

    fn push(&mut self, byte: u8) {
        if self.drop_responses > 0 {
            self.drop_responses -= 1;
            return;
        }
        self.out.push_back(byte);
    }

    fn feed(&mut self, byte: u8) {
        if self.passthrough {
            // The line belongs to the FPGA design now.
            return;
        }

        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::Exchange => {
                let response = self.spi_transfer(byte);
                self.push(response);
            }
            Pending::FastProgram(mut body) => {
                body.push(byte);
                if body.len() == FAST_PROGRAM_BODY {
                    self.run_fast_program(&body);
                } else {
                    self.pending = Pending::FastProgram(body);
                }
            }
            Pending::FastRead(mut body) => {
                body.push(byte);
                if body.len() == FAST_READ_BODY {
                    self.run_fast_read(&body);
                } else {
                    self.pending = Pending::FastRead(body);
                }
            }
            Pending::None => match byte {
                wire::CS_LOW => self.spi_select(),
                wire::CS_HIGH => self.spi_deselect(),
                wire::EXCHANGE => self.pending = Pending::Exchange,
                wire::FAST_PROGRAM => self.pending = Pending::FastProgram(Vec::new()),
                wire::FAST_READ => self.pending = Pending::FastRead(Vec::new()),
                wire::FPGA_RESET => {
                    self.fpga_in_reset = true;
                    self.push(wire::FPGA_RESET);
                }
                wire::FPGA_RUN => {
                    self.fpga_in_reset = false;
                    self.done_countdown = self.config.done_poll_busy;
                    self.push(wire::FPGA_RUN);
                }
                wire::FPGA_POLL => {
                    let answer = self.poll_done();
                    self.push(answer);
                }
                wire::FLASH_WAKE => {
                    self.powered_down = false;
                    self.push(wire::FLASH_WAKE);
                }
                wire::PASSTHROUGH => {
                    self.push(wire::PASSTHROUGH);
                    self.passthrough = true;
                }
                other => log::warn!("dummy: unknown bridge command 0x{:02X}", other),
            },
        }
    }

    fn poll_done(&mut self) -> u8 {
        if self.fpga_in_reset || self.force_never_done {
            return wire::FPGA_NOT_DONE;
        }
        if self.done_countdown > 0 {
            self.done_countdown -= 1;
            return wire::FPGA_NOT_DONE;
        }
        wire::FPGA_DONE
    }

    fn run_fast_program(&mut self, body: &[u8]) {
        self.spi_select();
        for &b in body {
            self.spi_transfer(b);
        }
        self.spi_deselect();
        // The bridge waits out the program internally before acknowledging.
        self.busy_reads = 0;
        self.push(wire::ACK_ACCEPTED);
        self.push(wire::ACK_COMPLETE);
    }

    fn run_fast_read(&mut self, body: &[u8]) {
        self.spi_select();
        for &b in body {
            self.spi_transfer(b);
        }
        for _ in 0..256 {
            let b = self.spi_transfer(0);
            self.push(b);
        }
        self.spi_deselect();
    }

    // ---- Flash chip model ----

    fn spi_select(&mut self) {
        self.selected = true;
        self.txn.clear();
    }

    fn spi_deselect(&mut self) {
        if self.selected {
            self.execute_txn();
        }
        self.selected = false;
        self.txn.clear();
    }

    /// Clock one byte to the chip, returning what it shifts back
    fn spi_transfer(&mut self, byte: u8) -> u8 {
        if !self.selected || self.powered_down {
            return 0xFF;
        }

        let pos = self.txn.len();
        self.txn.push(byte);
        if pos == 0 {
            return 0xFF;
        }

        match self.txn[0] {
            opcodes::RDID if (1..=3).contains(&pos) => self.config.jedec_id[pos - 1],
            opcodes::RDSR => self.status_byte(),
            opcodes::READ if pos >= 4 => {
                let base = address_of(&self.txn) as usize;
                self.mem.get(base + pos - 4).copied().unwrap_or(ERASED_BYTE)
            }
            _ => 0xFF,
        }
    }

    fn status_byte(&mut self) -> u8 {
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            return 0x03;
        }
        (self.write_enabled as u8) << 1
    }

    /// Commands take effect on the rising chip-select edge
    fn execute_txn(&mut self) {
        if self.powered_down || self.txn.is_empty() {
            return;
        }
        match self.txn[0] {
            opcodes::WREN => self.write_enabled = true,
            opcodes::WRDI => self.write_enabled = false,
            opcodes::PP if self.txn.len() >= 4 => {
                if !self.write_enabled {
                    log::warn!("dummy: page program without write enable, ignored");
                    return;
                }
                let base = address_of(&self.txn);
                self.program_ops.push(base);
                for (i, &b) in self.txn[4..].iter().enumerate() {
                    // Programming wraps within the 256-byte page and can
                    // only clear bits, like the real chip.
                    let a = ((base & !0xFF) | (base.wrapping_add(i as u32) & 0xFF)) as usize;
                    if let Some(cell) = self.mem.get_mut(a) {
                        *cell &= b;
                    }
                }
                if self.corrupt_programs {
                    if let Some(cell) = self.mem.get_mut(base as usize) {
                        *cell ^= 0x01;
                    }
                }
                self.write_enabled = false;
                self.busy_reads = self.config.busy_status_reads;
            }
            opcodes::SE if self.txn.len() >= 4 => {
                if !self.write_enabled {
                    log::warn!("dummy: sector erase without write enable, ignored");
                    return;
                }
                let sector = address_of(&self.txn) & !(SECTOR_SIZE as u32 - 1);
                self.erase_ops.push(sector);
                let start = sector as usize;
                let end = (start + SECTOR_SIZE).min(self.mem.len());
                if start < self.mem.len() {
                    self.mem[start..end].fill(ERASED_BYTE);
                }
                self.write_enabled = false;
                self.busy_reads = self.config.busy_status_reads;
            }
            _ => {}
        }
    }
}

/// Big-endian 3-byte address from a command buffer
fn address_of(txn: &[u8]) -> u32 {
    ((txn[1] as u32) << 16) | ((txn[2] as u32) << 8) | (txn[3] as u32)
}

impl Transport for DummyBridge {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        for &b in data {
            self.feed(b);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.out.pop_front() {
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

impl Transport for &mut DummyBridge {
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
