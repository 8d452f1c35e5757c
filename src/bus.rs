//! The 16-bit memory bus: sole arbiter of the CPU's address space.
//!
//! Reads and writes dispatch on the top nibble of the address, with the 0xF
//! nibble sub-dispatched across echo RAM, OAM, the hardware I/O window, high
//! RAM and the interrupt-enable register. Cartridge ranges delegate to the
//! active MBC; VRAM, OAM and most I/O registers delegate to the injected
//! collaborators. A sparse cheat overlay takes precedence over every normal
//! decode path on reads.

use std::collections::HashMap;

use crate::cartridge::Cartridge;
use crate::devices::{HwioPort, NullPort, NullSound, NullSramStore, NullVideo, SoundChip, SramStore, VideoBus};
use crate::interrupts::Interrupts;
use crate::state::{StateError, StateReader, StateWriter};
use crate::timer::Timer;

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;
const HRAM_SIZE: usize = 0x80;
const BOOT_ROM_SIZE: usize = 0x100;

pub struct Bus {
    pub cart: Cartridge,
    wram: [[u8; WRAM_BANK_SIZE]; WRAM_BANKS],
    /// Selected 0xD000 bank, 1-7. Zero writes are coerced to 1.
    wram_bank: u8,
    hram: [u8; HRAM_SIZE],
    boot_rom: [u8; BOOT_ROM_SIZE],
    boot_loaded: bool,
    boot_enabled: bool,
    /// CGB hardware mode, derived from the cartridge header unless forced.
    pub cgb: bool,
    forced_mode: Option<bool>,
    /// KEY1 speed-switch stub: only the prepare bit is writable and no
    /// switch ever happens.
    key1: u8,
    cheats: HashMap<u16, u8>,
    pub ints: Interrupts,
    pub timer: Timer,
    video: Box<dyn VideoBus>,
    sound: Box<dyn SoundChip>,
    joypad: Box<dyn HwioPort>,
    serial: Box<dyn HwioPort>,
    sram: Box<dyn SramStore>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_devices(
            Box::new(NullVideo),
            Box::new(NullSound),
            Box::new(NullPort),
            Box::new(NullPort),
            Box::new(NullSramStore),
        )
    }

    /// Hardware mode pinned regardless of what cartridge headers say.
    pub fn new_with_mode(cgb: bool) -> Self {
        let mut bus = Self::new();
        bus.forced_mode = Some(cgb);
        bus.cgb = cgb;
        bus
    }

    pub fn with_devices(
        video: Box<dyn VideoBus>,
        sound: Box<dyn SoundChip>,
        joypad: Box<dyn HwioPort>,
        serial: Box<dyn HwioPort>,
        sram: Box<dyn SramStore>,
    ) -> Self {
        Self {
            cart: Cartridge::empty(),
            wram: [[0; WRAM_BANK_SIZE]; WRAM_BANKS],
            wram_bank: 1,
            hram: [0; HRAM_SIZE],
            boot_rom: [0; BOOT_ROM_SIZE],
            boot_loaded: false,
            boot_enabled: false,
            cgb: false,
            forced_mode: None,
            key1: 0,
            cheats: HashMap::new(),
            ints: Interrupts::new(),
            timer: Timer::new(),
            video,
            sound,
            joypad,
            serial,
            sram,
        }
    }

    /// Reset hardware registers and scratch RAM to power-on. Cartridge RAM
    /// contents survive; they belong to the persistence layer, not the
    /// console. Cheats survive too, they are host debug state.
    pub fn reset(&mut self) {
        self.wram = [[0; WRAM_BANK_SIZE]; WRAM_BANKS];
        self.wram_bank = 1;
        self.hram = [0; HRAM_SIZE];
        self.boot_enabled = self.boot_loaded;
        self.key1 = 0;
        self.ints = Interrupts::new();
        self.timer = Timer::new();
        self.cart.reset();
    }

    /// Load a new cartridge image: rebuild the MBC from the header, pick the
    /// hardware mode, reset the system, then pull any persisted SRAM image
    /// keyed by the cartridge title.
    pub fn replace_rom(&mut self, data: &[u8]) {
        self.cart = Cartridge::load(data);
        self.cgb = self.forced_mode.unwrap_or(self.cart.cgb);
        self.reset();
        if self.cart.kind.has_ram() {
            if let Some(image) = self.sram.load(&self.cart.title) {
                // Zero first so a short image doesn't leave 0xFF tails mixed
                // with restored data.
                self.cart.ram.fill(0);
                let n = image.len().min(self.cart.ram.len());
                self.cart.ram[..n].copy_from_slice(&image[..n]);
            }
        }
    }

    /// Simulate pulling the game pak: no controller, open-bus ROM window.
    pub fn yank_game_pak(&mut self) {
        self.cart = Cartridge::empty();
    }

    /// Flush external RAM through the persistence store, but only when
    /// something was actually written since the last flush.
    pub fn save_game_sram(&mut self) {
        if self.cart.dirty_bytes > 0 {
            self.sram.save(&self.cart.title, &self.cart.ram);
            self.cart.dirty_bytes = 0;
        }
    }

    pub fn load_boot_rom(&mut self, data: &[u8]) {
        let n = data.len().min(BOOT_ROM_SIZE);
        self.boot_rom[..n].copy_from_slice(&data[..n]);
        self.boot_loaded = true;
        self.boot_enabled = true;
    }

    pub fn boot_rom_active(&self) -> bool {
        self.boot_loaded && self.boot_enabled
    }

    /// One-way overlay latch, also reachable via a 0xFF50 write.
    pub fn disable_boot_rom(&mut self) {
        self.boot_enabled = false;
    }

    pub fn set_cheat(&mut self, addr: u16, value: u8) {
        self.cheats.insert(addr, value);
    }

    pub fn clear_cheat(&mut self, addr: u16) {
        self.cheats.remove(&addr);
    }

    pub fn clear_cheats(&mut self) {
        self.cheats.clear();
    }

    /// Advance time-driven hardware by `cycles` CPU cycles.
    pub fn tick(&mut self, cycles: u32) {
        self.timer.step(cycles, &mut self.ints);
    }

    fn wram_index(&self) -> usize {
        if self.cgb { self.wram_bank as usize } else { 1 }
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        if let Some(&patched) = self.cheats.get(&addr) {
            return patched;
        }
        match addr >> 12 {
            0x0..=0x7 => {
                if self.boot_rom_active() && addr < 0x100 {
                    self.boot_rom[addr as usize]
                } else {
                    self.cart.read(addr)
                }
            }
            0x8 | 0x9 => self.video.read(addr),
            0xA | 0xB => self.cart.read(addr),
            0xC => self.wram[0][addr as usize & 0xFFF],
            0xD => self.wram[self.wram_index()][addr as usize & 0xFFF],
            0xE => self.wram[0][addr as usize & 0xFFF],
            _ => match addr {
                0xF000..=0xFDFF => self.wram[self.wram_index()][addr as usize & 0xFFF],
                0xFE00..=0xFE9F => self.video.read_oam(addr),
                0xFEA0..=0xFEFF => 0xFF,
                0xFF00..=0xFF7F => self.read_hwio(addr),
                0xFF80..=0xFFFE => self.hram[addr as usize - 0xFF80],
                _ => self.ints.read_ie(),
            },
        }
    }

    /// Little-endian 16-bit convenience read.
    pub fn read16(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr >> 12 {
            0x0..=0x7 => self.cart.write(addr, value),
            0x8 | 0x9 => self.video.write(addr, value),
            0xA | 0xB => self.cart.write(addr, value),
            0xC => self.wram[0][addr as usize & 0xFFF] = value,
            0xD => self.wram[self.wram_index()][addr as usize & 0xFFF] = value,
            0xE => self.wram[0][addr as usize & 0xFFF] = value,
            _ => match addr {
                0xF000..=0xFDFF => self.wram[self.wram_index()][addr as usize & 0xFFF] = value,
                0xFE00..=0xFE9F => self.video.write_oam(addr, value),
                0xFEA0..=0xFEFF => {}
                0xFF00..=0xFF7F => self.write_hwio(addr, value),
                0xFF80..=0xFFFE => self.hram[addr as usize - 0xFF80] = value,
                _ => self.ints.write_ie(value),
            },
        }
    }

    fn read_hwio(&mut self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read_hwio(addr),
            0xFF01..=0xFF02 => self.serial.read_hwio(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.ints.read_if(),
            0xFF10..=0xFF3F | 0xFF76..=0xFF77 => self.sound.read_hwio(addr),
            0xFF4D => {
                if self.cgb {
                    0x7E | self.key1
                } else {
                    0xFF
                }
            }
            0xFF40..=0xFF4F | 0xFF51..=0xFF55 | 0xFF68..=0xFF6C => self.video.read_hwio(addr),
            0xFF70 => {
                if self.cgb {
                    0xF8 | self.wram_bank
                } else {
                    0xFF
                }
            }
            _ => 0xFF,
        }
    }

    fn write_hwio(&mut self, addr: u16, value: u8) {
        match addr {
            0xFF00 => self.joypad.write_hwio(addr, value),
            0xFF01..=0xFF02 => self.serial.write_hwio(addr, value),
            0xFF04..=0xFF07 => self.timer.write(addr, value),
            0xFF0F => self.ints.write_if(value),
            0xFF10..=0xFF3F | 0xFF76..=0xFF77 => self.sound.write_hwio(addr, value),
            0xFF4D => {
                if self.cgb {
                    self.key1 = (self.key1 & 0x80) | (value & 0x01);
                }
            }
            0xFF50 => {
                if value & 0x01 != 0 {
                    self.boot_enabled = false;
                }
            }
            0xFF40..=0xFF4F | 0xFF51..=0xFF55 | 0xFF68..=0xFF6C => {
                self.video.write_hwio(addr, value)
            }
            0xFF70 => {
                if self.cgb {
                    let bank = value & 0x07;
                    self.wram_bank = if bank == 0 { 1 } else { bank };
                }
            }
            _ => {}
        }
    }

    /// Bus state slice. Field order is a binary contract: WRAM banks (8 in
    /// CGB mode, 2 in DMG), bank index, HRAM, boot ROM, the two boot flags,
    /// then the MBC's own slice.
    pub fn serialize(&self, w: &mut StateWriter) {
        let banks = if self.cgb { 8 } else { 2 };
        for bank in &self.wram[..banks] {
            w.put_bytes(bank, WRAM_BANK_SIZE);
        }
        w.put_u8(self.wram_bank);
        w.put_bytes(&self.hram, HRAM_SIZE);
        w.put_bytes(&self.boot_rom, BOOT_ROM_SIZE);
        w.put_bool(self.boot_enabled);
        w.put_bool(self.boot_loaded);
        self.cart.serialize(w);
    }

    pub fn deserialize(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let banks = if self.cgb { 8 } else { 2 };
        for i in 0..banks {
            self.wram[i].copy_from_slice(r.get_bytes(WRAM_BANK_SIZE)?);
        }
        // Constrain the bank index exactly like a 0xFF70 write, so a
        // corrupt or hand-edited stream cannot index past the bank array.
        let bank = r.get_u8()? & 0x07;
        self.wram_bank = if bank == 0 { 1 } else { bank };
        self.hram.copy_from_slice(r.get_bytes(HRAM_SIZE)?);
        self.boot_rom.copy_from_slice(r.get_bytes(BOOT_ROM_SIZE)?);
        self.boot_enabled = r.get_bool()?;
        self.boot_loaded = r.get_bool()?;
        self.cart.deserialize(r)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
