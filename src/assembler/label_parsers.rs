use nom::multispace;
use nom::types::CompleteStr;

use crate::assembler::symbol_parsers::symbol_name;

/// A label declaration, `name:`. Several may precede one statement.
named!(pub label_declaration<CompleteStr, String>,
    do_parse!(
        opt!(multispace) >>
        name: symbol_name >>
        char!(':') >>
        opt!(multispace) >>
        (name)
    )
);
