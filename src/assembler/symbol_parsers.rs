use nom::types::CompleteStr;

use crate::assembler::literal_parsers::literal;
use crate::assembler::operands::Value;

/// An identifier: letters, digits and underscores.
named!(pub symbol_name<CompleteStr, String>,
    map!(
        take_while1!(|c: char| c.is_alphanumeric() || c == '_'),
        |s: CompleteStr| s.to_string()
    )
);

/// A literal-or-symbol value, as it appears in operands and directive
/// argument lists. Literals win the ambiguity against digit-only names.
named!(pub value<CompleteStr, Value>,
    alt!(
        map!(literal, Value::Lit) |
        map!(symbol_name, Value::Sym)
    )
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbol_name() {
        let result = symbol_name(CompleteStr("counter_2"));
        assert_eq!(result, Ok((CompleteStr(""), "counter_2".to_string())));

        let result = symbol_name(CompleteStr("x: rest"));
        assert_eq!(result, Ok((CompleteStr(": rest"), "x".to_string())));

        let result = symbol_name(CompleteStr(""));
        assert_eq!(result.is_ok(), false);
    }

    #[test]
    fn test_parse_value() {
        let result = value(CompleteStr("10"));
        assert_eq!(result, Ok((CompleteStr(""), Value::Lit(10))));

        let result = value(CompleteStr("0x2A"));
        assert_eq!(result, Ok((CompleteStr(""), Value::Lit(42))));

        let result = value(CompleteStr("start"));
        assert_eq!(result, Ok((CompleteStr(""), Value::Sym("start".to_string()))));
    }
}
