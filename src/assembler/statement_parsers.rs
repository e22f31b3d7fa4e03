use nom::multispace;
use nom::types::CompleteStr;

use crate::assembler::directive_parsers::{directive, Directive};
use crate::assembler::instruction_parsers::{instruction, Instruction};
use crate::assembler::label_parsers::label_declaration;

#[derive(Debug, PartialEq)]
pub enum StmtBody {
    Instr(Instruction),
    Dir(Directive),
}

/// One source statement: any number of leading labels, then at most one
/// instruction or directive. A line holding only labels is valid; the
/// labels bind to the statement that follows.
#[derive(Debug, PartialEq)]
pub struct Statement {
    pub labels: Vec<String>,
    pub body: Option<StmtBody>,
}

named!(pub statement<CompleteStr, Statement>,
    do_parse!(
        labels: many0!(label_declaration) >>
        opt!(multispace) >>
        body: opt!(alt!(
            map!(directive, StmtBody::Dir) |
            map!(instruction, StmtBody::Instr)
        )) >>
        opt!(multispace) >>
        (Statement { labels, body })
    )
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::operand_parsers::ParsedOperand;

    #[test]
    fn test_parse_plain_instruction() {
        let (rest, stmt) = statement(CompleteStr("halt")).unwrap();
        assert_eq!(rest, CompleteStr(""));
        assert!(stmt.labels.is_empty());
        match stmt.body {
            Some(StmtBody::Instr(ins)) => assert_eq!(ins.name, "halt"),
            other => panic!("expected instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_labeled_instruction() {
        let (rest, stmt) = statement(CompleteStr("start: ldr r0, x")).unwrap();
        assert_eq!(rest, CompleteStr(""));
        assert_eq!(stmt.labels, vec!["start".to_string()]);
        match stmt.body {
            Some(StmtBody::Instr(ins)) => {
                assert_eq!(ins.name, "ldr");
                assert_eq!(ins.args.len(), 2);
                assert_eq!(ins.args[0], ParsedOperand::RegDir("r0".to_string(), false));
            }
            other => panic!("expected instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiple_labels() {
        let (_, stmt) = statement(CompleteStr("a: b: .word 1")).unwrap();
        assert_eq!(stmt.labels, vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(stmt.body, Some(StmtBody::Dir(_))));
    }

    #[test]
    fn test_parse_bare_label_line() {
        let (rest, stmt) = statement(CompleteStr("loop:")).unwrap();
        assert_eq!(rest, CompleteStr(""));
        assert_eq!(stmt.labels, vec!["loop".to_string()]);
        assert!(stmt.body.is_none());
    }

    #[test]
    fn test_parse_directive_line() {
        let (_, stmt) = statement(CompleteStr(".section text")).unwrap();
        match stmt.body {
            Some(StmtBody::Dir(dir)) => assert_eq!(dir.name, "section"),
            other => panic!("expected directive, got {:?}", other),
        }
    }
}
