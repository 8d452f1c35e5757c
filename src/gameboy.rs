//! Top-level console facade wiring the CPU to the bus.

use crate::bus::Bus;
use crate::cpu::{Cpu, StepEvent};
use crate::devices::{HwioPort, SoundChip, SramStore, VideoBus};
use crate::fault::EmulationFault;
use crate::state::{StateError, StateReader, StateWriter};

pub struct GameBoy {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl GameBoy {
    /// A console with open-bus collaborators, enough to run CPU/bus/MBC
    /// behavior headless.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
        }
    }

    /// Pin the hardware mode instead of deriving it from cartridge headers.
    pub fn new_with_mode(cgb: bool) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new_with_mode(cgb),
        }
    }

    pub fn with_devices(
        video: Box<dyn VideoBus>,
        sound: Box<dyn SoundChip>,
        joypad: Box<dyn HwioPort>,
        serial: Box<dyn HwioPort>,
        sram: Box<dyn SramStore>,
    ) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::with_devices(video, sound, joypad, serial, sram),
        }
    }

    /// Hardware reset. The loaded cartridge and boot image stay in place.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
    }

    pub fn load_rom(&mut self, data: &[u8]) {
        self.bus.replace_rom(data);
        self.cpu.reset();
    }

    pub fn load_boot_rom(&mut self, data: &[u8]) {
        self.bus.load_boot_rom(data);
    }

    pub fn step(&mut self) -> Result<StepEvent, EmulationFault> {
        self.cpu.step(&mut self.bus)
    }

    /// Flush cartridge RAM through the persistence store if it is dirty.
    pub fn save_sram(&mut self) {
        self.bus.save_game_sram();
    }

    pub fn set_breakpoint(&mut self, addr: u16) {
        self.cpu.breakpoints.set(addr);
    }

    pub fn clear_breakpoint(&mut self, addr: u16) {
        self.cpu.breakpoints.clear(addr);
    }

    pub fn toggle_breakpoint(&mut self, addr: u16) -> bool {
        self.cpu.breakpoints.toggle(addr)
    }

    /// Capture the full mutable hardware state. Walk order is Bus (with the
    /// MBC slice) then CPU, interrupt controller and timer; it is a binary
    /// contract with `load_state`. Cartridge RAM is not part of a save
    /// state, it travels through the SRAM store instead.
    pub fn save_state(&self) -> Vec<u8> {
        let mut w = StateWriter::new();
        self.bus.serialize(&mut w);
        self.cpu.serialize(&mut w);
        self.bus.ints.serialize(&mut w);
        self.bus.timer.serialize(&mut w);
        w.into_bytes()
    }

    /// Restore a snapshot produced by [`save_state`](Self::save_state). On a
    /// decode error the machine is reset to power-on rather than left with a
    /// partially applied snapshot; the loaded cartridge and boot image stay
    /// in place either way.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), StateError> {
        let mut r = StateReader::new(data);
        let result = self
            .bus
            .deserialize(&mut r)
            .and_then(|()| self.cpu.deserialize(&mut r))
            .and_then(|()| self.bus.ints.deserialize(&mut r))
            .and_then(|()| self.bus.timer.deserialize(&mut r));
        if result.is_err() {
            self.reset();
        }
        result
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
