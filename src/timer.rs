//! Divider/timer unit (DIV, TIMA, TMA, TAC).

use crate::interrupts::Interrupts;
use crate::state::{StateError, StateReader, StateWriter};

/// CPU cycles per DIV increment (16384 Hz at the 4 MiHz master clock).
const DIV_PERIOD: u32 = 256;

/// CPU cycles per TIMA increment for each TAC speed encoding.
const TIMA_PERIODS: [u32; 4] = [1024, 16, 64, 256];

pub struct Timer {
    /// Free-running divider register.
    pub div: u8,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control: bit 2 running, bits 0-1 speed select.
    pub tac: u8,
    div_acc: u32,
    tima_acc: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            div_acc: 0,
            tima_acc: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            // Any write clears DIV regardless of the written value.
            0xFF04 => {
                self.div = 0;
                self.div_acc = 0;
            }
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & 0x07,
            _ => {}
        }
    }

    fn running(&self) -> bool {
        self.tac & 0x04 != 0
    }

    fn tima_period(&self) -> u32 {
        TIMA_PERIODS[(self.tac & 0x03) as usize]
    }

    /// Advance the timer by `cycles` CPU cycles, raising the timer interrupt
    /// through the controller on each TIMA overflow.
    pub fn step(&mut self, cycles: u32, ints: &mut Interrupts) {
        self.div_acc += cycles;
        while self.div_acc >= DIV_PERIOD {
            self.div_acc -= DIV_PERIOD;
            self.div = self.div.wrapping_add(1);
        }

        if !self.running() {
            return;
        }
        let period = self.tima_period();
        self.tima_acc += cycles;
        while self.tima_acc >= period {
            self.tima_acc -= period;
            if self.tima == 0xFF {
                self.tima = self.tma;
                ints.attempt_timer();
            } else {
                self.tima += 1;
            }
        }
    }

    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_u8(self.div);
        w.put_u8(self.tima);
        w.put_u8(self.tma);
        w.put_u8(self.tac);
        w.put_u32(self.div_acc);
        w.put_u32(self.tima_acc);
    }

    pub fn deserialize(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.div = r.get_u8()?;
        self.tima = r.get_u8()?;
        self.tma = r.get_u8()?;
        self.tac = r.get_u8()?;
        self.div_acc = r.get_u32()?;
        self.tima_acc = r.get_u32()?;
        Ok(())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
