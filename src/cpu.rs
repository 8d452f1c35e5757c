//! SM83 CPU core: fetch/decode/execute, interrupt servicing and cycle
//! accounting.
//!
//! Decode is a single jump-table `match` over the opcode byte. The two
//! regular 64-entry blocks (0x40-0x7F loads, 0x80-0xBF ALU) and the whole
//! 0xCB page are handled by range arms over nibble-decoded operands; the
//! remaining irregular opcodes get explicit arms. Every memory access ticks
//! the bus 4 cycles as a side effect, so handlers only add the cycles that
//! go beyond that baseline (taken branches, 16-bit ALU, stack traffic).

use crate::bus::Bus;
use crate::fault::EmulationFault;
use crate::breakpoints::Breakpoints;
use crate::state::{StateError, StateReader, StateWriter};

pub const FLAG_Z: u8 = 0x80;
pub const FLAG_N: u8 = 0x40;
pub const FLAG_H: u8 = 0x20;
pub const FLAG_C: u8 = 0x10;

/// What a `step()` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// One instruction executed (or one halted-state cycle burned).
    Executed,
    /// PC sits on a registered breakpoint; nothing was executed. The next
    /// `step()` call runs through it.
    Breakpoint,
}

pub struct Cpu {
    pub a: u8,
    /// Flags live in bits 7-4; the low nibble always reads zero.
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub halted: bool,
    /// EI takes effect one instruction late; this carries it across steps.
    ime_scheduled: bool,
    pub cycles: u64,
    pub total_instructions: u64,
    /// First-step latch for the cartridge-only post-boot register setup.
    started: bool,
    /// Lets the step after a breakpoint hit execute instead of re-stopping.
    resume: bool,
    pub breakpoints: Breakpoints,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
            halted: false,
            ime_scheduled: false,
            cycles: 0,
            total_instructions: 0,
            started: false,
            resume: false,
            breakpoints: Breakpoints::new(),
        }
    }

    /// Power-on state. Breakpoints are host debug state and survive.
    pub fn reset(&mut self) {
        self.a = 0;
        self.f = 0;
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.e = 0;
        self.h = 0;
        self.l = 0;
        self.sp = 0;
        self.pc = 0;
        self.halted = false;
        self.ime_scheduled = false;
        self.cycles = 0;
        self.total_instructions = 0;
        self.started = false;
        self.resume = false;
    }

    // Register pairs, big-endian packing (high register first).

    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | (self.f & 0xF0) as u16
    }

    pub fn set_af(&mut self, v: u16) {
        self.a = (v >> 8) as u8;
        self.f = (v as u8) & 0xF0;
    }

    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    pub fn set_bc(&mut self, v: u16) {
        self.b = (v >> 8) as u8;
        self.c = v as u8;
    }

    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    pub fn set_de(&mut self, v: u16) {
        self.d = (v >> 8) as u8;
        self.e = v as u8;
    }

    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    pub fn set_hl(&mut self, v: u16) {
        self.h = (v >> 8) as u8;
        self.l = v as u8;
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.f |= mask;
        } else {
            self.f &= !mask;
        }
    }

    // Timed memory access. Each call is one machine cycle on the bus.

    fn tick(&mut self, bus: &mut Bus, cycles: u32) {
        bus.tick(cycles);
        self.cycles += cycles as u64;
    }

    fn read8(&mut self, bus: &mut Bus, addr: u16) -> u8 {
        self.tick(bus, 4);
        bus.read(addr)
    }

    fn write8(&mut self, bus: &mut Bus, addr: u16, value: u8) {
        self.tick(bus, 4);
        bus.write(addr, value);
    }

    fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        let v = self.read8(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    fn push16(&mut self, bus: &mut Bus, value: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, (value >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, value as u8);
    }

    fn pop16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.read8(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// 8-bit operand decode: B,C,D,E,H,L,(HL),A. Index 6 goes through
    /// memory and carries the access tax.
    fn read_reg(&mut self, bus: &mut Bus, idx: usize) -> u8 {
        match idx {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => {
                let hl = self.hl();
                self.read8(bus, hl)
            }
            _ => self.a,
        }
    }

    fn write_reg(&mut self, bus: &mut Bus, idx: usize, value: u8) {
        match idx {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => {
                let hl = self.hl();
                self.write8(bus, hl, value);
            }
            _ => self.a = value,
        }
    }

    /// 16-bit operand decode for the 0x?1/0x?3/0x?9/0x?B patterns:
    /// BC,DE,HL,SP.
    fn pair(&self, idx: usize) -> u16 {
        match idx {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl(),
            _ => self.sp,
        }
    }

    fn set_pair(&mut self, idx: usize, value: u16) {
        match idx {
            0 => self.set_bc(value),
            1 => self.set_de(value),
            2 => self.set_hl(value),
            _ => self.sp = value,
        }
    }

    /// Condition decode: NZ, Z, NC, C.
    fn condition(&self, idx: u8) -> bool {
        match idx {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }

    /// Execute one step: at most one instruction plus at most one serviced
    /// interrupt.
    pub fn step(&mut self, bus: &mut Bus) -> Result<StepEvent, EmulationFault> {
        // Cartridge-only operation: no boot image means we start from the
        // documented post-boot state.
        if !self.started {
            self.started = true;
            if !bus.boot_rom_active() {
                self.init_post_boot(bus);
            }
        }

        if !self.resume && self.breakpoints.contains(self.pc) {
            self.resume = true;
            return Ok(StepEvent::Breakpoint);
        }
        self.resume = false;

        // An EI scheduled by the previous instruction raises IME only once
        // this one has completed, never earlier.
        let ei_pending = self.ime_scheduled;

        if !self.halted {
            let pc = self.pc;
            let opcode = self.fetch8(bus);
            self.execute(bus, pc, opcode)?;
            self.total_instructions += 1;
        } else {
            // A halted core still burns time so the timer keeps running.
            self.tick(bus, 4);
        }

        // DI in the instruction after EI cancels the pending enable, so the
        // flag is re-checked here.
        if ei_pending && self.ime_scheduled {
            self.ime_scheduled = false;
            bus.ints.master_enabled = true;
        }

        // Any requested interrupt wakes the core, IME and IE notwithstanding.
        if self.halted && bus.ints.any_requested() {
            self.halted = false;
        }

        self.service_interrupt(bus);
        Ok(StepEvent::Executed)
    }

    fn init_post_boot(&mut self, bus: &mut Bus) {
        self.a = 0x11;
        self.f = FLAG_Z | FLAG_H | FLAG_C;
        self.set_bc(0x0013);
        self.set_de(0x00D8);
        self.set_hl(0x014D);
        self.sp = 0xFFFE;
        self.pc = 0x100;
        bus.disable_boot_rom();
    }

    fn service_interrupt(&mut self, bus: &mut Bus) {
        if !bus.ints.dispatch_ready() {
            return;
        }
        if let Some(source) = bus.ints.acknowledge() {
            self.halted = false;
            self.tick(bus, 12);
            let pc = self.pc;
            self.push16(bus, pc);
            self.pc = source.vector();
        }
    }

    fn execute(&mut self, bus: &mut Bus, pc: u16, opcode: u8) -> Result<(), EmulationFault> {
        match opcode {
            0x00 => {} // NOP
            0x10 => {
                // STOP: speed switching is stubbed, so just swallow the
                // operand byte.
                self.fetch8(bus);
            }
            0x76 => self.halted = true, // HALT, carved out of the load block

            // LD r,r' block.
            0x40..=0x7F => {
                let src = (opcode & 0x07) as usize;
                let dst = ((opcode >> 3) & 0x07) as usize;
                let v = self.read_reg(bus, src);
                self.write_reg(bus, dst, v);
            }

            // ALU block, family from bits 5-3.
            0x80..=0xBF => {
                let v = self.read_reg(bus, (opcode & 0x07) as usize);
                self.alu(((opcode >> 3) & 0x07) as u8, v);
            }

            // ALU with immediate operand.
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let v = self.fetch8(bus);
                self.alu(((opcode >> 3) & 0x07) as u8, v);
            }

            // INC r / DEC r / LD r,n8.
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let idx = ((opcode >> 3) & 0x07) as usize;
                let v = self.read_reg(bus, idx);
                let r = self.inc8(v);
                self.write_reg(bus, idx, r);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let idx = ((opcode >> 3) & 0x07) as usize;
                let v = self.read_reg(bus, idx);
                let r = self.dec8(v);
                self.write_reg(bus, idx, r);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let idx = ((opcode >> 3) & 0x07) as usize;
                let v = self.fetch8(bus);
                self.write_reg(bus, idx, v);
            }

            // 16-bit loads and arithmetic, pair from bits 5-4.
            0x01 | 0x11 | 0x21 | 0x31 => {
                let v = self.fetch16(bus);
                self.set_pair(((opcode >> 4) & 0x03) as usize, v);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let idx = ((opcode >> 4) & 0x03) as usize;
                let v = self.pair(idx).wrapping_add(1);
                self.set_pair(idx, v);
                self.tick(bus, 4);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let idx = ((opcode >> 4) & 0x03) as usize;
                let v = self.pair(idx).wrapping_sub(1);
                self.set_pair(idx, v);
                self.tick(bus, 4);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let v = self.pair(((opcode >> 4) & 0x03) as usize);
                self.add_hl(v);
                self.tick(bus, 4);
            }

            // Indirect A loads.
            0x02 => {
                let addr = self.bc();
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0x12 => {
                let addr = self.de();
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0x0A => {
                let addr = self.bc();
                self.a = self.read8(bus, addr);
            }
            0x1A => {
                let addr = self.de();
                self.a = self.read8(bus, addr);
            }
            0x22 => {
                let addr = self.hl();
                let a = self.a;
                self.write8(bus, addr, a);
                self.set_hl(addr.wrapping_add(1));
            }
            0x32 => {
                let addr = self.hl();
                let a = self.a;
                self.write8(bus, addr, a);
                self.set_hl(addr.wrapping_sub(1));
            }
            0x2A => {
                let addr = self.hl();
                self.a = self.read8(bus, addr);
                self.set_hl(addr.wrapping_add(1));
            }
            0x3A => {
                let addr = self.hl();
                self.a = self.read8(bus, addr);
                self.set_hl(addr.wrapping_sub(1));
            }
            0x08 => {
                // LD (n16),SP
                let addr = self.fetch16(bus);
                let sp = self.sp;
                self.write8(bus, addr, sp as u8);
                self.write8(bus, addr.wrapping_add(1), (sp >> 8) as u8);
            }
            0xEA => {
                let addr = self.fetch16(bus);
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.a = self.read8(bus, addr);
            }
            0xE0 => {
                let addr = 0xFF00 | self.fetch8(bus) as u16;
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0xF0 => {
                let addr = 0xFF00 | self.fetch8(bus) as u16;
                self.a = self.read8(bus, addr);
            }
            0xE2 => {
                let addr = 0xFF00 | self.c as u16;
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0xF2 => {
                let addr = 0xFF00 | self.c as u16;
                self.a = self.read8(bus, addr);
            }
            0xF8 => {
                // LD HL,SP+e8
                let v = self.sp_offset(bus);
                self.set_hl(v);
                self.tick(bus, 4);
            }
            0xF9 => {
                self.sp = self.hl();
                self.tick(bus, 4);
            }
            0xE8 => {
                // ADD SP,e8
                self.sp = self.sp_offset(bus);
                self.tick(bus, 8);
            }

            // Rotates on A; these always clear Z.
            0x07 => {
                let c = self.a >> 7;
                self.a = self.a.rotate_left(1);
                self.f = if c != 0 { FLAG_C } else { 0 };
            }
            0x0F => {
                let c = self.a & 1;
                self.a = self.a.rotate_right(1);
                self.f = if c != 0 { FLAG_C } else { 0 };
            }
            0x17 => {
                let carry_in = self.flag(FLAG_C) as u8;
                let c = self.a >> 7;
                self.a = (self.a << 1) | carry_in;
                self.f = if c != 0 { FLAG_C } else { 0 };
            }
            0x1F => {
                let carry_in = (self.flag(FLAG_C) as u8) << 7;
                let c = self.a & 1;
                self.a = (self.a >> 1) | carry_in;
                self.f = if c != 0 { FLAG_C } else { 0 };
            }

            0x27 => self.daa(),
            0x2F => {
                self.a = !self.a;
                self.set_flag(FLAG_N, true);
                self.set_flag(FLAG_H, true);
            }
            0x37 => {
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, true);
            }
            0x3F => {
                let c = self.flag(FLAG_C);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, !c);
            }

            // Relative jumps. The displacement byte is always fetched.
            0x18 => {
                let e = self.fetch8(bus) as i8;
                self.pc = self.pc.wrapping_add(e as u16);
                self.tick(bus, 4);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let e = self.fetch8(bus) as i8;
                if self.condition((opcode >> 3) & 0x03) {
                    self.pc = self.pc.wrapping_add(e as u16);
                    self.tick(bus, 4);
                }
            }

            // Absolute jumps.
            0xC3 => {
                self.pc = self.fetch16(bus);
                self.tick(bus, 4);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let addr = self.fetch16(bus);
                if self.condition((opcode >> 3) & 0x03) {
                    self.pc = addr;
                    self.tick(bus, 4);
                }
            }
            0xE9 => self.pc = self.hl(),

            // Calls and returns.
            0xCD => {
                let addr = self.fetch16(bus);
                self.tick(bus, 4);
                let pc = self.pc;
                self.push16(bus, pc);
                self.pc = addr;
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let addr = self.fetch16(bus);
                if self.condition((opcode >> 3) & 0x03) {
                    self.tick(bus, 4);
                    let pc = self.pc;
                    self.push16(bus, pc);
                    self.pc = addr;
                }
            }
            0xC9 => {
                self.pc = self.pop16(bus);
                self.tick(bus, 4);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                self.tick(bus, 4);
                if self.condition((opcode >> 3) & 0x03) {
                    self.pc = self.pop16(bus);
                    self.tick(bus, 4);
                }
            }
            0xD9 => {
                // RETI enables IME immediately, no EI-style delay.
                self.pc = self.pop16(bus);
                self.tick(bus, 4);
                bus.ints.master_enabled = true;
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.tick(bus, 4);
                let pc = self.pc;
                self.push16(bus, pc);
                self.pc = (opcode & 0x38) as u16;
            }

            // Stack ops, pair decode here is BC,DE,HL,AF.
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let v = self.pop16(bus);
                match (opcode >> 4) & 0x03 {
                    0 => self.set_bc(v),
                    1 => self.set_de(v),
                    2 => self.set_hl(v),
                    _ => self.set_af(v),
                }
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let v = match (opcode >> 4) & 0x03 {
                    0 => self.bc(),
                    1 => self.de(),
                    2 => self.hl(),
                    _ => self.af(),
                };
                self.tick(bus, 4);
                self.push16(bus, v);
            }

            0xF3 => {
                bus.ints.master_enabled = false;
                self.ime_scheduled = false;
            }
            0xFB => self.ime_scheduled = true,

            0xCB => self.execute_cb(bus),

            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                return Err(EmulationFault::InvalidOpcode { pc, opcode });
            }
        }
        Ok(())
    }

    /// The 0xCB page is fully algorithmic: operand register from the low
    /// three bits, operation family from the upper ranges, bit index from
    /// bits 5-3.
    fn execute_cb(&mut self, bus: &mut Bus) {
        let op = self.fetch8(bus);
        let idx = (op & 0x07) as usize;
        match op {
            0x00..=0x3F => {
                let v = self.read_reg(bus, idx);
                let r = match op >> 3 {
                    0 => self.rlc(v),
                    1 => self.rrc(v),
                    2 => self.rl(v),
                    3 => self.rr(v),
                    4 => self.sla(v),
                    5 => self.sra(v),
                    6 => self.swap(v),
                    _ => self.srl(v),
                };
                self.write_reg(bus, idx, r);
            }
            0x40..=0x7F => {
                let bit = (op >> 3) & 0x07;
                let v = self.read_reg(bus, idx);
                self.set_flag(FLAG_Z, v & (1 << bit) == 0);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, true);
            }
            0x80..=0xBF => {
                let bit = (op >> 3) & 0x07;
                let v = self.read_reg(bus, idx);
                self.write_reg(bus, idx, v & !(1 << bit));
            }
            _ => {
                let bit = (op >> 3) & 0x07;
                let v = self.read_reg(bus, idx);
                self.write_reg(bus, idx, v | (1 << bit));
            }
        }
    }

    /// ADD/ADC/SUB/SBC/AND/XOR/OR/CP against A, family from opcode bits 5-3.
    fn alu(&mut self, family: u8, v: u8) {
        match family {
            0 => self.add_a(v, false),
            1 => self.add_a(v, true),
            2 => self.sub_a(v, false, true),
            3 => self.sub_a(v, true, true),
            4 => {
                self.a &= v;
                self.f = if self.a == 0 { FLAG_Z | FLAG_H } else { FLAG_H };
            }
            5 => {
                self.a ^= v;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            6 => {
                self.a |= v;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            _ => self.sub_a(v, false, false),
        }
    }

    fn add_a(&mut self, v: u8, with_carry: bool) {
        let carry = (with_carry && self.flag(FLAG_C)) as u8;
        let a = self.a;
        let r = a.wrapping_add(v).wrapping_add(carry);
        self.set_flag(FLAG_Z, r == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (a & 0x0F) + (v & 0x0F) + carry > 0x0F);
        self.set_flag(FLAG_C, a as u16 + v as u16 + carry as u16 > 0xFF);
        self.a = r;
    }

    /// SUB/SBC, and CP when `store` is false.
    fn sub_a(&mut self, v: u8, with_carry: bool, store: bool) {
        let carry = (with_carry && self.flag(FLAG_C)) as u8;
        let a = self.a;
        let r = a.wrapping_sub(v).wrapping_sub(carry);
        self.set_flag(FLAG_Z, r == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, (a & 0x0F) < (v & 0x0F) + carry);
        self.set_flag(FLAG_C, (a as u16) < v as u16 + carry as u16);
        if store {
            self.a = r;
        }
    }

    fn inc8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.set_flag(FLAG_Z, r == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, v & 0x0F == 0x0F);
        r
    }

    fn dec8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.set_flag(FLAG_Z, r == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, v & 0x0F == 0);
        r
    }

    /// ADD HL,rr. Half-carry comes from the low 12 bits; Z is untouched.
    fn add_hl(&mut self, v: u16) {
        let hl = self.hl();
        let r = hl.wrapping_add(v);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (hl & 0x0FFF) + (v & 0x0FFF) > 0x0FFF);
        self.set_flag(FLAG_C, hl as u32 + v as u32 > 0xFFFF);
        self.set_hl(r);
    }

    /// SP + signed immediate, shared by ADD SP,e8 and LD HL,SP+e8. Flags
    /// come from the unsigned low-byte addition.
    fn sp_offset(&mut self, bus: &mut Bus) -> u16 {
        let e = self.fetch8(bus);
        let sp = self.sp;
        self.set_flag(FLAG_Z, false);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (sp & 0x0F) + (e as u16 & 0x0F) > 0x0F);
        self.set_flag(FLAG_C, (sp & 0xFF) + (e as u16 & 0xFF) > 0xFF);
        sp.wrapping_add(e as i8 as u16)
    }

    fn daa(&mut self) {
        let mut a = self.a;
        let mut carry = self.flag(FLAG_C);
        if !self.flag(FLAG_N) {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.flag(FLAG_H) || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.flag(FLAG_H) {
                a = a.wrapping_sub(0x06);
            }
        }
        self.set_flag(FLAG_Z, a == 0);
        self.set_flag(FLAG_H, false);
        self.set_flag(FLAG_C, carry);
        self.a = a;
    }

    // CB-page shift/rotate families. Unlike the A-register rotates these
    // compute Z.

    fn rlc(&mut self, v: u8) -> u8 {
        let r = v.rotate_left(1);
        self.set_shift_flags(r, v >> 7 != 0);
        r
    }

    fn rrc(&mut self, v: u8) -> u8 {
        let r = v.rotate_right(1);
        self.set_shift_flags(r, v & 1 != 0);
        r
    }

    fn rl(&mut self, v: u8) -> u8 {
        let r = (v << 1) | self.flag(FLAG_C) as u8;
        self.set_shift_flags(r, v >> 7 != 0);
        r
    }

    fn rr(&mut self, v: u8) -> u8 {
        let r = (v >> 1) | ((self.flag(FLAG_C) as u8) << 7);
        self.set_shift_flags(r, v & 1 != 0);
        r
    }

    fn sla(&mut self, v: u8) -> u8 {
        let r = v << 1;
        self.set_shift_flags(r, v >> 7 != 0);
        r
    }

    fn sra(&mut self, v: u8) -> u8 {
        let r = (v >> 1) | (v & 0x80);
        self.set_shift_flags(r, v & 1 != 0);
        r
    }

    fn swap(&mut self, v: u8) -> u8 {
        let r = v.rotate_left(4);
        self.set_shift_flags(r, false);
        r
    }

    fn srl(&mut self, v: u8) -> u8 {
        let r = v >> 1;
        self.set_shift_flags(r, v & 1 != 0);
        r
    }

    fn set_shift_flags(&mut self, result: u8, carry: bool) {
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, carry);
    }

    /// CPU state slice. Counters are split into LE 32-bit halves, low word
    /// first. Field order is a binary contract.
    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_u8(self.a);
        w.put_u8(self.f);
        w.put_u8(self.b);
        w.put_u8(self.c);
        w.put_u8(self.d);
        w.put_u8(self.e);
        w.put_u8(self.h);
        w.put_u8(self.l);
        w.put_u16(self.sp);
        w.put_u16(self.pc);
        w.put_bool(self.halted);
        w.put_bool(self.ime_scheduled);
        w.put_u32(self.cycles as u32);
        w.put_u32((self.cycles >> 32) as u32);
        w.put_u32(self.total_instructions as u32);
        w.put_u32((self.total_instructions >> 32) as u32);
        w.put_bool(self.started);
    }

    pub fn deserialize(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.a = r.get_u8()?;
        self.f = r.get_u8()? & 0xF0;
        self.b = r.get_u8()?;
        self.c = r.get_u8()?;
        self.d = r.get_u8()?;
        self.e = r.get_u8()?;
        self.h = r.get_u8()?;
        self.l = r.get_u8()?;
        self.sp = r.get_u16()?;
        self.pc = r.get_u16()?;
        self.halted = r.get_bool()?;
        self.ime_scheduled = r.get_bool()?;
        let lo = r.get_u32()? as u64;
        let hi = r.get_u32()? as u64;
        self.cycles = (hi << 32) | lo;
        let lo = r.get_u32()? as u64;
        let hi = r.get_u32()? as u64;
        self.total_instructions = (hi << 32) | lo;
        self.started = r.get_bool()?;
        self.resume = false;
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
