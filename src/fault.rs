use thiserror::Error;

/// Fatal emulation-core fault.
///
/// These indicate a bug in the emulator (or an attempt to execute garbage),
/// not guest-program behavior: continuing after one of them would produce
/// meaningless machine state, so [`crate::cpu::Cpu::step`] surfaces them as
/// errors instead of recovering. Out-of-range register values cannot occur
/// here (the register file is `u8`/`u16`), so the invalid-opcode class is the
/// one that remains observable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmulationFault {
    /// The CPU fetched an opcode with no defined encoding
    /// (0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD).
    #[error("invalid opcode {opcode:#04X} at PC {pc:#06X}")]
    InvalidOpcode { pc: u16, opcode: u8 },
}

impl EmulationFault {
    /// Program counter of the faulting instruction.
    pub fn pc(&self) -> u16 {
        match self {
            EmulationFault::InvalidOpcode { pc, .. } => *pc,
        }
    }
}
