use nom::multispace;
use nom::types::CompleteStr;

use crate::assembler::operand_parsers::{operand, ParsedOperand};
use crate::assembler::symbol_parsers::symbol_name;

/// An instruction statement: a mnemonic and its comma-separated operands.
/// The mnemonic is looked up by the assembler, not here, so an unknown name
/// fails with a proper diagnostic instead of a parse error.
#[derive(Debug, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub args: Vec<ParsedOperand>,
}

named!(operand_list<CompleteStr, Vec<ParsedOperand>>,
    separated_nonempty_list!(
        delimited!(opt!(multispace), char!(','), opt!(multispace)),
        operand
    )
);

named!(pub instruction<CompleteStr, Instruction>,
    do_parse!(
        name: symbol_name >>
        args: opt!(preceded!(multispace, operand_list)) >>
        (Instruction {
            name,
            args: args.unwrap_or_else(Vec::new),
        })
    )
);
