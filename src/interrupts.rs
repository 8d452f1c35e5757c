//! Interrupt controller: the IF/IE flag register pair and the IME gate.
//!
//! Interrupt requests are masked at the source, not just at dispatch time:
//! an `attempt_*` call only latches the requested bit when the matching
//! enabled bit is already set. Dispatch picks exactly one source in fixed
//! priority order and clears IME, so handlers are not re-entered unless they
//! re-enable interrupts themselves.

use crate::state::{StateError, StateReader, StateWriter};

/// A single interrupt line, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSource {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl IntSource {
    pub const fn bit(self) -> u8 {
        match self {
            IntSource::VBlank => 0x01,
            IntSource::LcdStat => 0x02,
            IntSource::Timer => 0x04,
            IntSource::Serial => 0x08,
            IntSource::Joypad => 0x10,
        }
    }

    /// Fixed hardware vector jumped to when this source is serviced.
    pub const fn vector(self) -> u16 {
        match self {
            IntSource::VBlank => 0x40,
            IntSource::LcdStat => 0x48,
            IntSource::Timer => 0x50,
            IntSource::Serial => 0x58,
            IntSource::Joypad => 0x60,
        }
    }
}

/// One five-line flag set (either IF or IE), with a packed-byte view for the
/// hardware register and named fields for everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntFlags {
    pub vblank: bool,
    pub lcd_stat: bool,
    pub timer: bool,
    pub serial: bool,
    pub joypad: bool,
}

impl IntFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            vblank: bits & 0x01 != 0,
            lcd_stat: bits & 0x02 != 0,
            timer: bits & 0x04 != 0,
            serial: bits & 0x08 != 0,
            joypad: bits & 0x10 != 0,
        }
    }

    pub fn to_bits(self) -> u8 {
        (self.vblank as u8)
            | (self.lcd_stat as u8) << 1
            | (self.timer as u8) << 2
            | (self.serial as u8) << 3
            | (self.joypad as u8) << 4
    }

    pub fn any(self) -> bool {
        self.to_bits() != 0
    }

    fn get(&self, source: IntSource) -> bool {
        match source {
            IntSource::VBlank => self.vblank,
            IntSource::LcdStat => self.lcd_stat,
            IntSource::Timer => self.timer,
            IntSource::Serial => self.serial,
            IntSource::Joypad => self.joypad,
        }
    }

    fn set(&mut self, source: IntSource, value: bool) {
        match source {
            IntSource::VBlank => self.vblank = value,
            IntSource::LcdStat => self.lcd_stat = value,
            IntSource::Timer => self.timer = value,
            IntSource::Serial => self.serial = value,
            IntSource::Joypad => self.joypad = value,
        }
    }
}

const PRIORITY: [IntSource; 5] = [
    IntSource::VBlank,
    IntSource::LcdStat,
    IntSource::Timer,
    IntSource::Serial,
    IntSource::Joypad,
];

#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    pub requested: IntFlags,
    pub enabled: IntFlags,
    /// IME. Not memory-mapped; toggled by EI/DI/RETI and interrupt entry.
    pub master_enabled: bool,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// IF register view (unused high bits read back set, like hardware).
    pub fn read_if(&self) -> u8 {
        0xE0 | self.requested.to_bits()
    }

    pub fn write_if(&mut self, value: u8) {
        self.requested = IntFlags::from_bits(value);
    }

    /// IE register view.
    pub fn read_ie(&self) -> u8 {
        self.enabled.to_bits()
    }

    pub fn write_ie(&mut self, value: u8) {
        self.enabled = IntFlags::from_bits(value);
    }

    fn attempt(&mut self, source: IntSource) {
        if self.enabled.get(source) {
            self.requested.set(source, true);
        }
    }

    pub fn attempt_vblank(&mut self) {
        self.attempt(IntSource::VBlank);
    }

    pub fn attempt_lcd_stat(&mut self) {
        self.attempt(IntSource::LcdStat);
    }

    pub fn attempt_timer(&mut self) {
        self.attempt(IntSource::Timer);
    }

    pub fn attempt_serial(&mut self) {
        self.attempt(IntSource::Serial);
    }

    pub fn attempt_joypad(&mut self) {
        self.attempt(IntSource::Joypad);
    }

    /// True if any line is requested, regardless of IE or IME. This is the
    /// HALT wake condition: a pending request un-halts the CPU even with
    /// interrupts fully disabled.
    pub fn any_requested(&self) -> bool {
        self.requested.any()
    }

    /// True if dispatch would occur on the next service check.
    pub fn dispatch_ready(&self) -> bool {
        self.master_enabled && (self.requested.to_bits() & self.enabled.to_bits()) != 0
    }

    /// Pick the highest-priority requested-and-enabled source, clear its
    /// requested bit and IME, and hand it to the CPU for vectoring. Returns
    /// `None` when nothing is dispatchable.
    pub fn acknowledge(&mut self) -> Option<IntSource> {
        if !self.dispatch_ready() {
            return None;
        }
        for source in PRIORITY {
            if self.requested.get(source) && self.enabled.get(source) {
                self.master_enabled = false;
                self.requested.set(source, false);
                return Some(source);
            }
        }
        None
    }

    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_u8(self.requested.to_bits());
        w.put_u8(self.enabled.to_bits());
        w.put_bool(self.master_enabled);
    }

    pub fn deserialize(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.requested = IntFlags::from_bits(r.get_u8()?);
        self.enabled = IntFlags::from_bits(r.get_u8()?);
        self.master_enabled = r.get_bool()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_is_masked_by_enable() {
        for source in PRIORITY {
            let mut ints = Interrupts::new();
            ints.attempt(source);
            assert!(
                !ints.requested.get(source),
                "{source:?} latched while disabled"
            );

            ints.enabled.set(source, true);
            ints.attempt(source);
            assert!(ints.requested.get(source), "{source:?} lost while enabled");
        }
    }

    #[test]
    fn acknowledge_honors_priority_and_clears_one_bit() {
        let mut ints = Interrupts::new();
        ints.write_ie(0x1F);
        ints.attempt_timer();
        ints.attempt_vblank();
        ints.attempt_joypad();
        ints.master_enabled = true;

        assert_eq!(ints.acknowledge(), Some(IntSource::VBlank));
        assert!(!ints.master_enabled);
        // Remaining requests stay latched for later dispatch.
        assert!(ints.requested.timer);
        assert!(ints.requested.joypad);

        // IME was cleared, so nothing more dispatches until re-enabled.
        assert_eq!(ints.acknowledge(), None);
        ints.master_enabled = true;
        assert_eq!(ints.acknowledge(), Some(IntSource::Timer));
        ints.master_enabled = true;
        assert_eq!(ints.acknowledge(), Some(IntSource::Joypad));
    }

    #[test]
    fn if_register_reads_with_high_bits_set() {
        let mut ints = Interrupts::new();
        assert_eq!(ints.read_if(), 0xE0);
        ints.write_if(0xFF);
        assert_eq!(ints.read_if(), 0xFF);
        assert_eq!(ints.requested.to_bits(), 0x1F);
    }

    #[test]
    fn flag_bits_round_trip() {
        for bits in 0..0x20u8 {
            assert_eq!(IntFlags::from_bits(bits).to_bits(), bits);
        }
    }
}
