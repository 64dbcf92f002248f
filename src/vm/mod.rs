//! The sandboxed ZPAQL bytecode interpreter.
//!
//! A program is a flat byte vector. Instructions are 1-3 bytes: an opcode
//! byte, optionally followed by an operand selecting a register/memory
//! source, optionally followed by an immediate or jump-target byte(s).
//! This crate's own writer (`vm::asm`) is the only producer of programs,
//! so the encoding below is an internal contract between the assembler
//! and the interpreter, not a wire-compatible clone of any external ISA.
//!
//! Dispatch is a single `match` over the opcode byte inside one
//! function per invocation: rustc lowers a dense, contiguous-
//! discriminant `match` like this one to a jump table, so there is no
//! virtual-call indirection per opcode.

pub mod asm;

use thiserror::Error;

/// Errors raised by the VM itself (a subset folds into
/// [`crate::error::IntegrityError`] at call sites).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    #[error("ZPAQL jump to {target} out of bounds for program of length {len}")]
    JumpOutOfBounds { target: usize, len: usize },
    #[error("ZPAQL program executed an ERROR instruction at pc {0}")]
    Error(usize),
    #[error("ZPAQL program ran past its end without HALT")]
    RanOff,
    #[error("unknown opcode {0:#04x} at pc {1}")]
    UnknownOpcode(u8, usize),
}

/// Which memory geometry a VM instance was sized for: HCOMP sizes its `H`
/// array with `hh`/`hm`, PCOMP sizes it with `ph`/`pm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Hcomp,
    Pcomp,
}

/// One-byte operand-source selector shared by arithmetic, comparison, and
/// register-auxiliary instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Src {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    MB = 4,
    MC = 5,
    MD = 6,
    Imm = 7,
}

impl Src {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b & 0x7 {
            0 => Src::A,
            1 => Src::B,
            2 => Src::C,
            3 => Src::D,
            4 => Src::MB,
            5 => Src::MC,
            6 => Src::MD,
            7 => Src::Imm,
            _ => return None,
        })
    }
}

/// Opcode bytes. Values not listed here are reserved and fault the VM
/// with [`VmError::UnknownOpcode`] at runtime, the same way
/// out-of-bounds jumps and divide-by-zero are runtime faults rather
/// than assembly-time errors.
#[allow(non_upper_case_globals)]
mod op {
    pub const HALT: u8 = 0x00;
    pub const ERROR: u8 = 0x01;
    pub const OUT: u8 = 0x02;
    pub const HASH: u8 = 0x03;
    pub const HASHD: u8 = 0x04;
    pub const JMP: u8 = 0x05;
    pub const JT: u8 = 0x06;
    pub const JF: u8 = 0x07;
    pub const LJ: u8 = 0x08;
    pub const A_EQ_R: u8 = 0x09;
    pub const R_EQ_A: u8 = 0x0A;
    pub const A_EQ_0: u8 = 0x0B;
    pub const A_EQ_B: u8 = 0x0C;
    pub const A_EQ_C: u8 = 0x0D;
    pub const A_EQ_D: u8 = 0x0E;
    pub const A_EQ_MB: u8 = 0x0F;
    pub const A_EQ_MC: u8 = 0x10;
    pub const A_EQ_MD: u8 = 0x11;
    pub const B_EQ_A: u8 = 0x12;
    pub const C_EQ_A: u8 = 0x13;
    pub const D_EQ_A: u8 = 0x14;
    pub const MB_EQ_A: u8 = 0x15;
    pub const MC_EQ_A: u8 = 0x16;
    pub const MD_EQ_A: u8 = 0x17;
    pub const SWAP_B: u8 = 0x18;
    pub const INC_A: u8 = 0x19;
    pub const DEC_A: u8 = 0x1A;
    pub const NOT_A: u8 = 0x1B;
    pub const CMP_EQ: u8 = 0x1C; // operand: Src
    pub const CMP_LT: u8 = 0x1D;
    pub const CMP_GT: u8 = 0x1E;
    pub const ADD: u8 = 0x1F; // operand: Src [+imm]
    pub const SUB: u8 = 0x20;
    pub const MUL: u8 = 0x21;
    pub const DIV: u8 = 0x22;
    pub const MOD: u8 = 0x23;
    pub const AND: u8 = 0x24;
    pub const ANDNOT: u8 = 0x25;
    pub const OR: u8 = 0x26;
    pub const XOR: u8 = 0x27;
    pub const SHL: u8 = 0x28;
    pub const SHR: u8 = 0x29;
    pub const SWAP_C: u8 = 0x2A;
}

/// State of one VM instance. `a`/`pc` reset on every [`Vm::run`]; the
/// rest persists across segments within a block.
pub struct Vm {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub f: bool,
    pub pc: u16,
    pub r: Box<[u32; 256]>,
    pub h: Vec<u32>,
    pub m: Vec<u8>,
    role: Role,
}

impl Vm {
    /// Build a zeroed VM sized for `hbits`/`mbits` (`hh`/`hm` for HCOMP,
    /// `ph`/`pm` for PCOMP), both powers of two expressed as log2.
    pub fn new(role: Role, hbits: u8, mbits: u8) -> Self {
        Self {
            a: 0,
            b: 0,
            c: 0,
            d: 0,
            f: false,
            pc: 0,
            r: Box::new([0u32; 256]),
            h: vec![0u32; 1usize << hbits],
            m: vec![0u8; 1usize << mbits],
            role,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn m_idx(&self, addr: u32) -> usize {
        if self.m.is_empty() {
            0
        } else {
            addr as usize % self.m.len()
        }
    }

    fn h_idx(&self, addr: u32) -> usize {
        if self.h.is_empty() {
            0
        } else {
            addr as usize % self.h.len()
        }
    }

    fn read_src(&self, prog: &[u8], pc: &mut usize) -> Result<(u32, Src), VmError> {
        let byte = *prog
            .get(*pc)
            .ok_or(VmError::JumpOutOfBounds { target: *pc, len: prog.len() })?;
        *pc += 1;
        let src = Src::from_byte(byte).ok_or(VmError::UnknownOpcode(byte, *pc - 1))?;
        let v = match src {
            Src::A => self.a,
            Src::B => self.b,
            Src::C => self.c,
            Src::D => self.d,
            Src::MB => self.m[self.m_idx(self.b)] as u32,
            Src::MC => self.m[self.m_idx(self.c)] as u32,
            Src::MD => self.h[self.h_idx(self.d)],
            Src::Imm => {
                let imm = *prog
                    .get(*pc)
                    .ok_or(VmError::JumpOutOfBounds { target: *pc, len: prog.len() })?;
                *pc += 1;
                imm as u32
            }
        };
        Ok((v, src))
    }

    /// Run `prog` starting at `start` on one input byte. `A := input` and
    /// `PC := start` are set first; execution continues until `HALT`,
    /// `ERROR`, or an `OUT` sink for PCOMP. `out` collects bytes emitted
    /// by `OUT` (only meaningful in [`Role::Pcomp`]).
    pub fn run(&mut self, prog: &[u8], start: u16, input: u32, out: &mut Vec<u8>) -> Result<(), VmError> {
        self.a = input;
        self.pc = start;
        let mut pc = self.pc as usize;
        loop {
            let op = *prog
                .get(pc)
                .ok_or(VmError::JumpOutOfBounds { target: pc, len: prog.len() })?;
            let at = pc;
            pc += 1;
            match op {
                op::HALT => break,
                op::ERROR => return Err(VmError::Error(at)),
                op::OUT => {
                    out.push((self.a & 0xFF) as u8);
                }
                op::HASH => {
                    let mb = self.m[self.m_idx(self.b)] as u32;
                    self.a = (self.a.wrapping_add(mb).wrapping_add(512)).wrapping_mul(773);
                }
                op::HASHD => {
                    let idx = self.h_idx(self.d);
                    self.h[idx] = (self.h[idx].wrapping_add(self.a).wrapping_add(512)).wrapping_mul(773);
                }
                op::JMP | op::JT | op::JF => {
                    let rel = *prog
                        .get(pc)
                        .ok_or(VmError::JumpOutOfBounds { target: pc, len: prog.len() })?
                        as i8;
                    pc += 1;
                    let take = match op {
                        op::JMP => true,
                        op::JT => self.f,
                        _ => !self.f,
                    };
                    if take {
                        let target = (pc as i64) + (rel as i64);
                        if target < 0 || target as usize > prog.len() {
                            return Err(VmError::JumpOutOfBounds { target: target.max(0) as usize, len: prog.len() });
                        }
                        pc = target as usize;
                    }
                }
                op::LJ => {
                    let lo = *prog
                        .get(pc)
                        .ok_or(VmError::JumpOutOfBounds { target: pc, len: prog.len() })?;
                    let hi = *prog
                        .get(pc + 1)
                        .ok_or(VmError::JumpOutOfBounds { target: pc + 1, len: prog.len() })?;
                    pc += 2;
                    let target = u16::from_le_bytes([lo, hi]) as usize;
                    if target > prog.len() {
                        return Err(VmError::JumpOutOfBounds { target, len: prog.len() });
                    }
                    pc = target;
                }
                op::A_EQ_R => {
                    let n = *prog
                        .get(pc)
                        .ok_or(VmError::JumpOutOfBounds { target: pc, len: prog.len() })?;
                    pc += 1;
                    self.a = self.r[n as usize];
                }
                op::R_EQ_A => {
                    let n = *prog
                        .get(pc)
                        .ok_or(VmError::JumpOutOfBounds { target: pc, len: prog.len() })?;
                    pc += 1;
                    self.r[n as usize] = self.a;
                }
                op::A_EQ_0 => self.a = 0,
                op::A_EQ_B => self.a = self.b,
                op::A_EQ_C => self.a = self.c,
                op::A_EQ_D => self.a = self.d,
                op::A_EQ_MB => self.a = self.m[self.m_idx(self.b)] as u32,
                op::A_EQ_MC => self.a = self.m[self.m_idx(self.c)] as u32,
                op::A_EQ_MD => self.a = self.h[self.h_idx(self.d)],
                op::B_EQ_A => self.b = self.a,
                op::C_EQ_A => self.c = self.a,
                op::D_EQ_A => self.d = self.a,
                op::MB_EQ_A => {
                    let idx = self.m_idx(self.b);
                    self.m[idx] = (self.a & 0xFF) as u8;
                }
                op::MC_EQ_A => {
                    let idx = self.m_idx(self.c);
                    self.m[idx] = (self.a & 0xFF) as u8;
                }
                op::MD_EQ_A => {
                    let idx = self.h_idx(self.d);
                    self.h[idx] = self.a;
                }
                op::SWAP_B => std::mem::swap(&mut self.a, &mut self.b),
                op::SWAP_C => std::mem::swap(&mut self.a, &mut self.c),
                op::INC_A => self.a = self.a.wrapping_add(1),
                op::DEC_A => self.a = self.a.wrapping_sub(1),
                op::NOT_A => self.a = !self.a,
                op::CMP_EQ | op::CMP_LT | op::CMP_GT => {
                    let (v, _) = self.read_src(prog, &mut pc)?;
                    self.f = match op {
                        op::CMP_EQ => self.a == v,
                        op::CMP_LT => self.a < v,
                        _ => self.a > v,
                    };
                }
                op::ADD | op::SUB | op::MUL | op::DIV | op::MOD | op::AND | op::ANDNOT | op::OR
                | op::XOR | op::SHL | op::SHR => {
                    let (v, _) = self.read_src(prog, &mut pc)?;
                    self.a = match op {
                        op::ADD => self.a.wrapping_add(v),
                        op::SUB => self.a.wrapping_sub(v),
                        op::MUL => self.a.wrapping_mul(v),
                        op::DIV => if v == 0 { 0 } else { self.a / v },
                        op::MOD => if v == 0 { 0 } else { self.a % v },
                        op::AND => self.a & v,
                        op::ANDNOT => self.a & !v,
                        op::OR => self.a | v,
                        op::XOR => self.a ^ v,
                        op::SHL => self.a.wrapping_shl(v & 31),
                        op::SHR => self.a.wrapping_shr(v & 31),
                        _ => unreachable!(),
                    };
                }
                other => return Err(VmError::UnknownOpcode(other, at)),
            }
            self.pc = pc as u16;
        }
        Ok(())
    }
}
