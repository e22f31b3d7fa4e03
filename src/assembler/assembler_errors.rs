//! Error taxonomy and the diagnostic sink.
//!
//! Every failure an assembly run can produce belongs to one of four classes
//! (syntax, symbol, section, file), which decide both the message prefix and
//! the process exit code.

use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Syntax,
    Symbol,
    Section,
    File,
}

#[derive(Debug)]
pub enum AsmError {
    // Syntax
    MalformedStatement,
    UnknownInstruction(String),
    UnknownDirective(String),
    OperandCount { expected: u8, given: u8 },
    TooManyOperands,
    InvalidRegister(String),
    SyntaxClassMismatch { expected_jump: bool },
    InvalidAddrMode { position: usize },
    DirectiveArgs { dir: String, expected: &'static str },
    LabelNotAllowed(String),

    // Symbol
    UndefinedSymbol(String),
    DuplicateSymbol(String),
    ExternalDefined(String),
    PcRelAbsolute(String),

    // Section
    NotInSection(String),
    DuplicateSection(String),

    // File
    Io { path: String, source: io::Error },
    MissingInput,
    MissingOutput,

    /// Summary returned by `run` when any statement failed.
    TranslationFailed { errors: u32 },
}

impl AsmError {
    pub fn class(&self) -> ErrorClass {
        use self::AsmError::*;
        match self {
            MalformedStatement
            | UnknownInstruction(_)
            | UnknownDirective(_)
            | OperandCount { .. }
            | TooManyOperands
            | InvalidRegister(_)
            | SyntaxClassMismatch { .. }
            | InvalidAddrMode { .. }
            | DirectiveArgs { .. }
            | LabelNotAllowed(_) => ErrorClass::Syntax,
            UndefinedSymbol(_) | DuplicateSymbol(_) | ExternalDefined(_) | PcRelAbsolute(_) => {
                ErrorClass::Symbol
            }
            NotInSection(_) | DuplicateSection(_) => ErrorClass::Section,
            Io { .. } | MissingInput | MissingOutput => ErrorClass::File,
            TranslationFailed { .. } => ErrorClass::Syntax,
        }
    }

    /// Process exit code for this error: 1 for anything wrong with the
    /// translation unit, 2 for anything wrong with the files around it.
    pub fn exit_code(&self) -> i32 {
        match self.class() {
            ErrorClass::File => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::AsmError::*;
        match self {
            MalformedStatement => write!(f, "malformed statement"),
            UnknownInstruction(name) => write!(f, "invalid instruction name: {}", name),
            UnknownDirective(name) => write!(f, "invalid directive name: .{}", name),
            OperandCount { expected, given } => write!(
                f,
                "instruction takes {} operand(s), but {} were provided",
                expected, given
            ),
            TooManyOperands => write!(f, "too many operands"),
            InvalidRegister(name) => write!(f, "invalid register: {}", name),
            SyntaxClassMismatch { expected_jump } => write!(
                f,
                "expected {} operand syntax",
                if *expected_jump { "jump" } else { "data" }
            ),
            InvalidAddrMode { position } => write!(
                f,
                "invalid addressing mode for {} operand",
                if *position == 0 { "first" } else { "second" }
            ),
            DirectiveArgs { dir, expected } => {
                write!(f, ".{} expects {}", dir, expected)
            }
            LabelNotAllowed(dir) => write!(f, ".{} cannot be labeled", dir),
            UndefinedSymbol(name) => write!(f, "undefined symbol: {}", name),
            DuplicateSymbol(name) => write!(f, "symbol already defined: {}", name),
            ExternalDefined(name) => {
                write!(f, "symbol declared extern cannot be defined: {}", name)
            }
            PcRelAbsolute(name) => write!(
                f,
                "pc-relative reference to local absolute symbol: {}",
                name
            ),
            NotInSection(what) => write!(f, "{} not in any section", what),
            DuplicateSection(name) => write!(f, "section already defined: {}", name),
            Io { path, source } => write!(f, "cannot open file: {}: {}", path, source),
            MissingInput => write!(f, "no input file provided"),
            MissingOutput => write!(f, "no output file provided"),
            TranslationFailed { errors } => {
                write!(f, "assembly failed with {} error(s)", errors)
            }
        }
    }
}

impl Error for AsmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AsmError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for AsmError {
    fn from(source: io::Error) -> AsmError {
        AsmError::Io {
            path: String::new(),
            source,
        }
    }
}

/// Collects and formats diagnostics against the current source location.
///
/// Messages are printed to stderr immediately; the counters drive the sticky
/// `had_error` behavior of the passes.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    file: String,
    line: u32,
    col: u32,
    errors: u32,
    warnings: u32,
}

impl DiagnosticSink {
    pub fn new(file: &str) -> DiagnosticSink {
        DiagnosticSink {
            file: file.to_string(),
            line: 0,
            col: 1,
            errors: 0,
            warnings: 0,
        }
    }

    pub fn locate(&mut self, line: u32, col: u32) {
        self.line = line;
        self.col = col;
    }

    pub fn error(&mut self, err: &AsmError) {
        let prefix = match err.class() {
            ErrorClass::Syntax => "syntax error",
            _ => "error",
        };
        let msg = format!(
            "{}:{}:{}: {}, {}",
            self.file, self.line, self.col, prefix, err
        );
        error!("{}", msg);
        eprintln!("{}", msg);
        self.errors += 1;
    }

    pub fn warning(&mut self, msg: &str) {
        let msg = format!("{}:{}:{}: warning, {}", self.file, self.line, self.col, msg);
        warn!("{}", msg);
        eprintln!("{}", msg);
        self.warnings += 1;
    }

    pub fn had_error(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings
    }
}
