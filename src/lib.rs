//! Instruction-level Game Boy / Game Boy Color emulation core.
//!
//! This crate contains the platform-agnostic machine logic: SM83 CPU, memory
//! bus, cartridge mappers, timer and interrupt controller, plus the
//! save-state serializer. Rendering, audio synthesis and host I/O are
//! injected through the [`devices`] traits and live outside this crate; the
//! [`gameboy`] facade wires everything into a single steppable machine.

/// Breakpoint set consulted by the CPU step loop.
pub mod breakpoints;

/// 16-bit memory bus and hardware register routing.
pub mod bus;

/// Cartridge mappers (MBC) and header handling.
pub mod cartridge;

/// SM83 CPU core.
pub mod cpu;

/// Collaborator traits (video, sound, joypad/serial ports, SRAM stores).
pub mod devices;

/// Fatal emulation-core faults.
pub mod fault;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod gameboy;

/// Interrupt request/enable registers and dispatch priority.
pub mod interrupts;

/// Save-state byte-stream primitives.
pub mod state;

/// Divider/timer unit.
pub mod timer;

pub use cpu::StepEvent;
pub use fault::EmulationFault;
pub use gameboy::GameBoy;
pub use state::StateError;
