//! Parsers for the operand forms of both syntax classes.
//!
//! Data syntax: `$v`, `v`, `%sym`, `R`, `[R]`, `[R + v]`.
//! Jump syntax marks the same memory forms with `*`: `*v`, `*R`, `*[R]`,
//! `*[R + v]`; a bare `v` stays ambiguous until the instruction is known.
//!
//! Registers are recognized lexically; a bare identifier that is not a
//! register name is a symbol reference. Identifiers inside brackets are
//! taken as register names and validated by the assembler.

use nom::multispace;
use nom::types::CompleteStr;

use crate::assembler::operands::Value;
use crate::assembler::symbol_parsers::{symbol_name, value};
use crate::isa::register_code;

/// One parsed operand, mirroring the staging callbacks one to one. The
/// register is still a name here; the assembler resolves and validates it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOperand {
    Immed(Value),
    MemDirOrJmpImmed(Value, bool),
    PcRel(String),
    RegDir(String, bool),
    RegInd(String, bool),
    RegIndOff(String, Value, bool),
}

fn classify_bare(v: Value, jmp: bool) -> ParsedOperand {
    match v {
        Value::Sym(ref name) if register_code(name).is_some() => {
            ParsedOperand::RegDir(name.clone(), jmp)
        }
        v => ParsedOperand::MemDirOrJmpImmed(v, jmp),
    }
}

named!(immed<CompleteStr, ParsedOperand>,
    map!(preceded!(char!('$'), value), ParsedOperand::Immed)
);

named!(pc_rel<CompleteStr, ParsedOperand>,
    map!(preceded!(char!('%'), symbol_name), ParsedOperand::PcRel)
);

/// `[R]` or `[R + v]`, without the syntax-class marker.
named!(ind_body<CompleteStr, (String, Option<Value>)>,
    do_parse!(
        char!('[') >>
        opt!(multispace) >>
        reg: symbol_name >>
        opt!(multispace) >>
        off: opt!(preceded!(pair!(char!('+'), opt!(multispace)), value)) >>
        opt!(multispace) >>
        char!(']') >>
        ((reg, off))
    )
);

fn build_ind((reg, off): (String, Option<Value>), jmp: bool) -> ParsedOperand {
    match off {
        Some(off) => ParsedOperand::RegIndOff(reg, off, jmp),
        None => ParsedOperand::RegInd(reg, jmp),
    }
}

named!(data_ind<CompleteStr, ParsedOperand>,
    map!(ind_body, |body| build_ind(body, false))
);

named!(data_bare<CompleteStr, ParsedOperand>,
    map!(value, |v| classify_bare(v, false))
);

named!(jmp_form<CompleteStr, ParsedOperand>,
    preceded!(
        char!('*'),
        alt!(
            map!(ind_body, |body| build_ind(body, true)) |
            map!(value, |v| classify_bare(v, true))
        )
    )
);

named!(pub operand<CompleteStr, ParsedOperand>,
    alt!(
        immed |
        pc_rel |
        jmp_form |
        data_ind |
        data_bare
    )
);
