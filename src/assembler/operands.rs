//! Operand descriptors and the per-statement staging buffer.
//!
//! At parse time an operand may still be ambiguous: a bare literal or symbol
//! is either memory-direct or an immediate, and `%sym` stands for a whole
//! PC-relative access whose exact mode depends on the instruction. Staged
//! operands therefore carry the ambiguity as a variant; `resolve` commits
//! them against the instruction's syntax class and returns the flat
//! descriptor the encoder works from.

use crate::assembler::assembler_errors::AsmError;
use crate::isa::{AddrMode, InstrInfo, PC_REGISTER};

/// A 16-bit literal or a symbol name.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Lit(u16),
    Sym(String),
}

/// A staged operand, as the parser callbacks delivered it.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Bare `lit`/`sym` in data syntax; memory-direct or immediate.
    DataOrMem(Value),
    /// `*lit`/`*sym`; memory-direct in jump syntax.
    JmpMemDirect(Value),
    /// `$lit`/`$sym`.
    Immediate(Value),
    /// `R` or `*R`.
    RegDirect { reg: u8, jmp: bool },
    /// `[R]` or `*[R]`.
    RegIndirect { reg: u8, jmp: bool },
    /// `[R + lit/sym]` or `*[R + lit/sym]`.
    RegOffset { reg: u8, off: Value, jmp: bool },
    /// `%sym`.
    PcRel(String),
}

/// An operand committed to a single addressing mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub mode: AddrMode,
    pub jmp: bool,
    pub reg: Option<u8>,
    /// The inline word, for modes that carry one.
    pub payload: Option<Value>,
    /// Declared `%sym` at parse time; forces a PC_REL relocation.
    pub pc_rel: bool,
}

impl Operand {
    /// Commits this operand against `info`'s syntax class, then checks the
    /// class and the per-position addressing-mode mask.
    pub fn resolve(&self, info: &InstrInfo, position: usize) -> Result<Resolved, AsmError> {
        let resolved = match self {
            Operand::DataOrMem(val) => Resolved {
                // Ambiguous syntax: jump instructions read a bare value as
                // an immediate target, data instructions as memory-direct.
                mode: if info.jmp_syntax {
                    AddrMode::Immed
                } else {
                    AddrMode::MemDir
                },
                jmp: info.jmp_syntax,
                reg: None,
                payload: Some(val.clone()),
                pc_rel: false,
            },
            Operand::JmpMemDirect(val) => Resolved {
                mode: AddrMode::MemDir,
                jmp: true,
                reg: None,
                payload: Some(val.clone()),
                pc_rel: false,
            },
            Operand::Immediate(val) => Resolved {
                mode: AddrMode::Immed,
                jmp: false,
                reg: None,
                payload: Some(val.clone()),
                pc_rel: false,
            },
            Operand::RegDirect { reg, jmp } => Resolved {
                mode: AddrMode::RegDir,
                jmp: *jmp,
                reg: Some(*reg),
                payload: None,
                pc_rel: false,
            },
            Operand::RegIndirect { reg, jmp } => Resolved {
                mode: AddrMode::RegInd,
                jmp: *jmp,
                reg: Some(*reg),
                payload: None,
                pc_rel: false,
            },
            Operand::RegOffset { reg, off, jmp } => Resolved {
                mode: AddrMode::RegIndOff,
                jmp: *jmp,
                reg: Some(*reg),
                payload: Some(off.clone()),
                pc_rel: false,
            },
            Operand::PcRel(sym) => Resolved {
                // A jump lands on the address, a data access goes through
                // it; both are offsets from the program counter.
                mode: if info.jmp_syntax {
                    AddrMode::RegDirOff
                } else {
                    AddrMode::RegIndOff
                },
                jmp: info.jmp_syntax,
                reg: Some(PC_REGISTER),
                payload: Some(Value::Sym(sym.clone())),
                pc_rel: true,
            },
        };

        if resolved.jmp != info.jmp_syntax {
            return Err(AsmError::SyntaxClassMismatch {
                expected_jump: info.jmp_syntax,
            });
        }
        if (info.arg_modes[position] & resolved.mode.mask_bit()) == 0 {
            return Err(AsmError::InvalidAddrMode { position });
        }
        Ok(resolved)
    }

    /// The symbol this operand references, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Operand::DataOrMem(Value::Sym(s))
            | Operand::JmpMemDirect(Value::Sym(s))
            | Operand::Immediate(Value::Sym(s))
            | Operand::RegOffset {
                off: Value::Sym(s), ..
            }
            | Operand::PcRel(s) => Some(s),
            _ => None,
        }
    }
}

/// Staging area for the 0–2 operands of the statement being assembled.
#[derive(Debug, Default)]
pub struct OperandBuffer {
    ops: Vec<Operand>,
}

impl OperandBuffer {
    pub fn new() -> OperandBuffer {
        OperandBuffer { ops: vec![] }
    }

    pub fn push(&mut self, op: Operand) -> Result<(), AsmError> {
        if self.ops.len() == 2 {
            return Err(AsmError::TooManyOperands);
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> u8 {
        self.ops.len() as u8
    }

    pub fn get(&self, idx: usize) -> Option<&Operand> {
        self.ops.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operand> {
        self.ops.iter()
    }
}
