use nom::alpha1;
use nom::multispace;
use nom::types::CompleteStr;

use crate::assembler::operands::Value;
use crate::assembler::symbol_parsers::value;

/// A directive statement: `.name` and its comma-separated arguments.
/// Argument shape is checked by the assembler against the directive table.
#[derive(Debug, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<Value>,
}

named!(arg_list<CompleteStr, Vec<Value>>,
    separated_nonempty_list!(
        delimited!(opt!(multispace), char!(','), opt!(multispace)),
        value
    )
);

named!(pub directive<CompleteStr, Directive>,
    do_parse!(
        char!('.') >>
        name: alpha1 >>
        args: opt!(preceded!(multispace, arg_list)) >>
        (Directive {
            name: name.to_string(),
            args: args.unwrap_or_else(Vec::new),
        })
    )
);
