//! Cartridge image, header parsing and memory bank controller (MBC)
//! emulation.
//!
//! The controller variant is picked once from the header when a ROM is
//! loaded, never per access. Each variant keeps its raw bank registers; the
//! effective ROM bank seen by the bus is always reduced modulo the total
//! bank count, so a bank-select write can never address past the end of the
//! image.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::state::{StateError, StateReader, StateWriter};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
/// Fixed external RAM allocation, 16 banks of 8 KiB.
pub const EXTERNAL_RAM_SIZE: usize = 0x20000;

/// Header offsets.
const HDR_TITLE_START: usize = 0x134;
const HDR_TITLE_END: usize = 0x143; // exclusive; 15 bytes
const HDR_CGB_FLAG: usize = 0x143;
const HDR_CART_TYPE: usize = 0x147;
const HDR_ROM_SIZE: usize = 0x148;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    /// Plain 32 KiB cartridge, no banking hardware.
    None,
    Mbc1,
    Mbc3,
    Mbc5,
}

impl MbcKind {
    /// Decode the cartridge-type header byte. Unrecognized hardware degrades
    /// to no controller rather than failing; games that only need plain ROM
    /// access still run.
    pub fn from_header(cart_type: u8) -> Self {
        match cart_type {
            0x00 => MbcKind::None,
            0x01..=0x03 => MbcKind::Mbc1,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            other => {
                log::warn!("unrecognized cartridge type {other:#04X}, treating as no MBC");
                MbcKind::None
            }
        }
    }

    pub fn has_ram(self) -> bool {
        !matches!(self, MbcKind::None)
    }
}

/// Decode the ROM-size header byte into a bank count. A few oversized
/// cartridges use the odd pseudo-bank-count codes at 0x52-0x54.
pub fn rom_bank_count(size_code: u8) -> usize {
    match size_code {
        0x00 => 2,
        0x01 => 4,
        0x02 => 8,
        0x03 => 16,
        0x04 => 32,
        0x05 => 64,
        0x06 => 128,
        0x07 => 256,
        0x08 => 512,
        0x52 => 72,
        0x53 => 80,
        0x54 => 96,
        other => {
            log::warn!("unrecognized ROM size code {other:#04X}");
            0
        }
    }
}

/// Raw bank registers for the active controller variant.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MbcRegs {
    None,
    Mbc1 {
        /// Low 5 bits of the ROM bank (0x2000-0x3FFF writes).
        rom_low: u8,
        /// High 2 bits of the ROM bank (0x4000-0x5FFF writes in ROM mode).
        rom_high: u8,
        ram_bank: u8,
        /// Banking-mode latch: false = ROM addressing, true = RAM addressing.
        ram_mode: bool,
    },
    Mbc3 {
        rom_bank: u8,
        /// Raw RAM-bank register; values >= 0x08 address the RTC instead.
        ram_bank: u8,
        rtc_selected: bool,
    },
    Mbc5 {
        /// 9-bit ROM bank, split across the 0x2000/0x3000 write windows.
        rom_bank: u16,
        ram_bank: u8,
    },
}

impl MbcRegs {
    fn initial(kind: MbcKind) -> Self {
        match kind {
            MbcKind::None => MbcRegs::None,
            MbcKind::Mbc1 => MbcRegs::Mbc1 {
                rom_low: 1,
                rom_high: 0,
                ram_bank: 0,
                ram_mode: false,
            },
            MbcKind::Mbc3 => MbcRegs::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                rtc_selected: false,
            },
            MbcKind::Mbc5 => MbcRegs::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
            },
        }
    }
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub kind: MbcKind,
    pub rom_banks: usize,
    pub title: String,
    pub cgb: bool,
    pub ram_enabled: bool,
    /// Unflushed external RAM writes since the last persistence flush.
    pub dirty_bytes: u32,
    regs: MbcRegs,
}

impl Cartridge {
    /// The "no game pak inserted" state: no controller, and the visible ROM
    /// window reads as open bus (two banks of 0xFF).
    pub fn empty() -> Self {
        Self {
            rom: vec![0xFF; 2 * ROM_BANK_SIZE],
            ram: vec![0xFF; EXTERNAL_RAM_SIZE],
            kind: MbcKind::None,
            rom_banks: 2,
            title: String::new(),
            cgb: false,
            ram_enabled: false,
            dirty_bytes: 0,
            regs: MbcRegs::None,
        }
    }

    /// Build a cartridge from a raw ROM image, deriving the controller,
    /// bank count, title and CGB mode from the header.
    pub fn load(data: &[u8]) -> Self {
        let kind = MbcKind::from_header(header_byte(data, HDR_CART_TYPE));
        let rom_banks = rom_bank_count(header_byte(data, HDR_ROM_SIZE));

        // Allocate whole banks and zero-fill the tail so short dumps still
        // present a full final bank.
        let banks = (data.len().div_ceil(ROM_BANK_SIZE)).max(2);
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[..data.len()].copy_from_slice(data);

        let cgb_flag = header_byte(data, HDR_CGB_FLAG);

        Self {
            rom,
            ram: vec![0xFF; EXTERNAL_RAM_SIZE],
            kind,
            rom_banks,
            title: decode_title(data),
            cgb: cgb_flag & 0x80 != 0 || cgb_flag == 0xC0,
            ram_enabled: false,
            dirty_bytes: 0,
            regs: MbcRegs::initial(kind),
        }
    }

    /// Reset the banking state to power-on. External RAM contents and the
    /// dirty counter survive a reset; they belong to the persistence layer.
    pub fn reset(&mut self) {
        self.ram_enabled = false;
        self.regs = MbcRegs::initial(self.kind);
    }

    /// Effective ROM bank mapped at 0x4000-0x7FFF.
    pub fn rom_bank(&self) -> usize {
        let raw = match &self.regs {
            MbcRegs::None => 1,
            MbcRegs::Mbc1 { rom_low, rom_high, .. } => {
                (((*rom_high as usize) & 0x03) << 5) | (*rom_low as usize)
            }
            MbcRegs::Mbc3 { rom_bank, .. } => *rom_bank as usize,
            MbcRegs::Mbc5 { rom_bank, .. } => *rom_bank as usize,
        };
        if self.rom_banks > 0 { raw % self.rom_banks } else { 0 }
    }

    /// Currently selected external RAM bank.
    pub fn ram_bank(&self) -> usize {
        match &self.regs {
            MbcRegs::None => 0,
            MbcRegs::Mbc1 {
                ram_bank, ram_mode, ..
            } => {
                if *ram_mode {
                    (*ram_bank & 0x03) as usize
                } else {
                    0
                }
            }
            MbcRegs::Mbc3 { ram_bank, .. } => (*ram_bank & 0x07) as usize,
            MbcRegs::Mbc5 { ram_bank, .. } => (*ram_bank & 0x0F) as usize,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let offset = self.rom_bank() * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0xA000..=0xBFFF => self.read_ram(addr),
            _ => 0xFF,
        }
    }

    fn read_ram(&self, addr: u16) -> u8 {
        if self.kind == MbcKind::None {
            // No RAM chip present on a plain cartridge.
            return 0x00;
        }
        if !self.ram_enabled {
            return 0xFF;
        }
        if let MbcRegs::Mbc3 {
            rtc_selected: true,
            ram_bank,
            ..
        } = &self.regs
        {
            return rtc_register(*ram_bank);
        }
        let idx = self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000);
        self.ram.get(idx).copied().unwrap_or(0xFF)
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.write_control(addr, val),
            0xA000..=0xBFFF => self.write_ram(addr, val),
            _ => {}
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match (&mut self.regs, addr) {
            // No banking hardware: the whole control range is a no-op.
            (MbcRegs::None, _) => {}

            (MbcRegs::Mbc1 { .. }, 0x0000..=0x1FFF) => {
                self.ram_enabled = val & 0x0F == 0x0A;
            }
            (MbcRegs::Mbc1 { rom_low, .. }, 0x2000..=0x3FFF) => {
                // MBC1 does not remap a zero select to bank 1 here; MBC3
                // does. Real-hardware divergence, kept deliberately.
                *rom_low = val & 0x1F;
            }
            (
                MbcRegs::Mbc1 {
                    rom_high,
                    ram_bank,
                    ram_mode,
                    ..
                },
                0x4000..=0x5FFF,
            ) => {
                if *ram_mode {
                    *ram_bank = val & 0x03;
                } else {
                    *rom_high = val & 0x03;
                }
            }
            (MbcRegs::Mbc1 { ram_mode, .. }, 0x6000..=0x7FFF) => {
                *ram_mode = val & 0x01 != 0;
            }

            (MbcRegs::Mbc3 { .. }, 0x0000..=0x1FFF) => {
                self.ram_enabled = val & 0x0F == 0x0A;
            }
            (MbcRegs::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = if val == 0 { 1 } else { val };
            }
            (
                MbcRegs::Mbc3 {
                    ram_bank,
                    rtc_selected,
                    ..
                },
                0x4000..=0x5FFF,
            ) => {
                *ram_bank = val;
                *rtc_selected = val >= 0x08;
            }
            // RTC latch window; the clock stub has nothing to latch.
            (MbcRegs::Mbc3 { .. }, 0x6000..=0x7FFF) => {}

            (MbcRegs::Mbc5 { .. }, 0x0000..=0x1FFF) => {
                // MBC5 matches the exact value, not the low nibble.
                self.ram_enabled = val == 0x0A;
            }
            (MbcRegs::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcRegs::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8);
            }
            (MbcRegs::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }

            _ => {}
        }
    }

    fn write_ram(&mut self, addr: u16, val: u8) {
        if self.kind == MbcKind::None || !self.ram_enabled {
            return;
        }
        if let MbcRegs::Mbc3 {
            rtc_selected: true, ..
        } = &self.regs
        {
            // RTC registers are a read-only wall-clock stub.
            return;
        }
        let idx = self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000);
        if let Some(b) = self.ram.get_mut(idx) {
            *b = val;
            self.dirty_bytes += 1;
        }
    }

    /// State slice: common fields first, then the variant's own registers.
    /// Field order is a binary contract shared with `deserialize`.
    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_bool(self.ram_enabled);
        w.put_u32(self.dirty_bytes);
        let (rom_bank, ram_bank) = match &self.regs {
            MbcRegs::None => (1, 0),
            MbcRegs::Mbc1 {
                rom_low,
                rom_high,
                ram_bank,
                ..
            } => (
                ((*rom_high as u32 & 0x03) << 5) | *rom_low as u32,
                *ram_bank as u32,
            ),
            MbcRegs::Mbc3 {
                rom_bank, ram_bank, ..
            } => (*rom_bank as u32, *ram_bank as u32),
            MbcRegs::Mbc5 { rom_bank, ram_bank } => (*rom_bank as u32, *ram_bank as u32),
        };
        w.put_u32(rom_bank);
        w.put_u32(ram_bank);
        match &self.regs {
            MbcRegs::None | MbcRegs::Mbc5 { .. } => {}
            MbcRegs::Mbc1 { ram_mode, .. } => w.put_u8(*ram_mode as u8),
            MbcRegs::Mbc3 { rtc_selected, .. } => w.put_bool(*rtc_selected),
        }
    }

    pub fn deserialize(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enabled = r.get_bool()?;
        self.dirty_bytes = r.get_u32()?;
        let rom_bank = r.get_u32()?;
        let ram_bank = r.get_u32()?;
        self.regs = match self.kind {
            MbcKind::None => MbcRegs::None,
            MbcKind::Mbc1 => MbcRegs::Mbc1 {
                rom_low: (rom_bank & 0x1F) as u8,
                rom_high: ((rom_bank >> 5) & 0x03) as u8,
                ram_bank: ram_bank as u8,
                ram_mode: r.get_u8()? != 0,
            },
            MbcKind::Mbc3 => MbcRegs::Mbc3 {
                rom_bank: rom_bank as u8,
                ram_bank: ram_bank as u8,
                rtc_selected: r.get_bool()?,
            },
            MbcKind::Mbc5 => MbcRegs::Mbc5 {
                rom_bank: (rom_bank & 0x1FF) as u16,
                ram_bank: ram_bank as u8,
            },
        };
        Ok(())
    }
}

fn header_byte(data: &[u8], offset: usize) -> u8 {
    data.get(offset).copied().unwrap_or(0)
}

fn decode_title(data: &[u8]) -> String {
    let end = HDR_TITLE_END.min(data.len());
    let start = HDR_TITLE_START.min(end);
    let mut slice = &data[start..end];
    if let Some(pos) = slice.iter().position(|&b| b == 0) {
        slice = &slice[..pos];
    }
    String::from_utf8_lossy(slice).trim().to_string()
}

/// MBC3 RTC stub: seconds/minutes/hours track the host wall clock; the day
/// counter and control registers are constants. No latch command and no
/// persistent clock state are modeled.
fn rtc_register(reg: u8) -> u8 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    match reg {
        0x08 => (now % 60) as u8,
        0x09 => ((now / 60) % 60) as u8,
        0x0A => ((now / 3600) % 24) as u8,
        0x0B => 0,
        0x0C => 1,
        _ => 0xFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(cart_type: u8, size_code: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[HDR_CART_TYPE] = cart_type;
        rom[HDR_ROM_SIZE] = size_code;
        rom
    }

    #[test]
    fn header_selects_controller_and_bank_count() {
        assert_eq!(MbcKind::from_header(0x00), MbcKind::None);
        assert_eq!(MbcKind::from_header(0x01), MbcKind::Mbc1);
        assert_eq!(MbcKind::from_header(0x10), MbcKind::Mbc3);
        assert_eq!(MbcKind::from_header(0x19), MbcKind::Mbc5);
        assert_eq!(MbcKind::from_header(0x1E), MbcKind::Mbc5);
        // Unknown hardware degrades to no controller.
        assert_eq!(MbcKind::from_header(0xFC), MbcKind::None);

        assert_eq!(rom_bank_count(0x00), 2);
        assert_eq!(rom_bank_count(0x08), 512);
        assert_eq!(rom_bank_count(0x52), 72);
        assert_eq!(rom_bank_count(0x53), 80);
        assert_eq!(rom_bank_count(0x54), 96);
        assert_eq!(rom_bank_count(0x77), 0);
    }

    #[test]
    fn title_is_decoded_and_nul_trimmed() {
        let mut rom = rom_with(0x00, 0x00);
        rom[HDR_TITLE_START..HDR_TITLE_START + 6].copy_from_slice(b"POCKET");
        let cart = Cartridge::load(&rom);
        assert_eq!(cart.title, "POCKET");
    }

    #[test]
    fn cgb_flag_detection() {
        let mut rom = rom_with(0x00, 0x00);
        rom[HDR_CGB_FLAG] = 0x80;
        assert!(Cartridge::load(&rom).cgb);
        rom[HDR_CGB_FLAG] = 0xC0;
        assert!(Cartridge::load(&rom).cgb);
        rom[HDR_CGB_FLAG] = 0x00;
        assert!(!Cartridge::load(&rom).cgb);
    }

    #[test]
    fn effective_rom_bank_stays_in_range() {
        // 8-bank MBC1 image; slam every possible select value at it.
        let mut cart = Cartridge::load(&rom_with(0x01, 0x02));
        for v in 0..=0xFFu8 {
            cart.write(0x2000, v);
            assert!(cart.rom_bank() < 8, "low write {v:#04X}");
            cart.write(0x4000, v);
            assert!(cart.rom_bank() < 8, "high write {v:#04X}");
        }

        let mut cart = Cartridge::load(&rom_with(0x11, 0x02));
        for v in 0..=0xFFu8 {
            cart.write(0x2000, v);
            assert!(cart.rom_bank() < 8, "MBC3 write {v:#04X}");
        }

        let mut cart = Cartridge::load(&rom_with(0x19, 0x02));
        for v in 0..=0xFFu8 {
            cart.write(0x2000, v);
            assert!(cart.rom_bank() < 8);
            cart.write(0x3000, v);
            assert!(cart.rom_bank() < 8);
        }
    }

    #[test]
    fn mbc1_and_mbc3_diverge_on_zero_bank_select() {
        let mut mbc1 = Cartridge::load(&rom_with(0x01, 0x02));
        mbc1.write(0x2000, 0x00);
        assert_eq!(mbc1.rom_bank(), 0);

        let mut mbc3 = Cartridge::load(&rom_with(0x11, 0x02));
        mbc3.write(0x2000, 0x00);
        assert_eq!(mbc3.rom_bank(), 1);
    }

    #[test]
    fn mbc1_mode_latch_routes_the_0x4000_window() {
        let mut cart = Cartridge::load(&rom_with(0x01, 0x05)); // 64 banks
        cart.write(0x2000, 0x01);
        cart.write(0x4000, 0x01); // ROM mode: high bits
        assert_eq!(cart.rom_bank(), 0x21);
        assert_eq!(cart.ram_bank(), 0);

        cart.write(0x6000, 0x01); // RAM mode
        cart.write(0x4000, 0x02);
        assert_eq!(cart.ram_bank(), 2);
    }

    #[test]
    fn mbc5_nine_bit_bank_and_exact_ram_enable() {
        let mut cart = Cartridge::load(&rom_with(0x19, 0x08)); // 512 banks
        cart.write(0x2000, 0x34);
        cart.write(0x3000, 0x01);
        assert_eq!(cart.rom_bank(), 0x134);
        // Bank 0 is a legal MBC5 selection.
        cart.write(0x2000, 0x00);
        cart.write(0x3000, 0x00);
        assert_eq!(cart.rom_bank(), 0);

        cart.write(0x0000, 0x1A); // low nibble 0xA but not exactly 0x0A
        assert!(!cart.ram_enabled);
        cart.write(0x0000, 0x0A);
        assert!(cart.ram_enabled);
    }

    #[test]
    fn ram_writes_require_enable_and_count_dirty_bytes() {
        let mut cart = Cartridge::load(&rom_with(0x03, 0x00)); // MBC1+RAM+BAT
        cart.write(0xA000, 0x55);
        assert_eq!(cart.read(0xA000), 0xFF);
        assert_eq!(cart.dirty_bytes, 0);

        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x55);
        assert_eq!(cart.read(0xA000), 0x55);
        assert_eq!(cart.dirty_bytes, 1);
        cart.write(0xA001, 0x66);
        assert_eq!(cart.dirty_bytes, 2);
    }

    #[test]
    fn null_controller_ignores_control_writes_and_reads_ram_as_zero() {
        let mut cart = Cartridge::load(&rom_with(0x00, 0x00));
        cart.write(0x2000, 0x05);
        assert_eq!(cart.rom_bank(), 1);
        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x77);
        assert_eq!(cart.read(0xA000), 0x00);
        assert_eq!(cart.dirty_bytes, 0);
    }

    #[test]
    fn mbc3_rtc_stub_day_registers_are_constant() {
        let mut cart = Cartridge::load(&rom_with(0x10, 0x02));
        cart.write(0x0000, 0x0A);
        cart.write(0x4000, 0x0B);
        assert_eq!(cart.read(0xA000), 0);
        cart.write(0x4000, 0x0C);
        assert_eq!(cart.read(0xA000), 1);
        cart.write(0x4000, 0x08);
        assert!(cart.read(0xA000) < 60);
        cart.write(0x4000, 0x0A);
        assert!(cart.read(0xA000) < 24);
        // RTC writes are dropped, not stored into RAM.
        cart.write(0xA000, 0x12);
        assert_eq!(cart.dirty_bytes, 0);
    }

    #[test]
    fn state_slice_round_trips_per_variant() {
        let mut cart = Cartridge::load(&rom_with(0x01, 0x05));
        cart.write(0x0000, 0x0A);
        cart.write(0x2000, 0x13);
        cart.write(0x4000, 0x01);
        cart.write(0x6000, 0x01);
        cart.write(0x4000, 0x02);
        cart.write(0xA000, 0x99);

        let mut w = StateWriter::new();
        cart.serialize(&mut w);
        let bytes = w.into_bytes();

        let mut restored = Cartridge::load(&rom_with(0x01, 0x05));
        let mut r = StateReader::new(&bytes);
        restored.deserialize(&mut r).unwrap();
        assert_eq!(restored.ram_enabled, cart.ram_enabled);
        assert_eq!(restored.dirty_bytes, cart.dirty_bytes);
        assert_eq!(restored.rom_bank(), cart.rom_bank());
        assert_eq!(restored.ram_bank(), cart.ram_bank());
        assert_eq!(restored.regs, cart.regs);
    }
}
