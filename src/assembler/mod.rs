//! The two-pass translation engine.
//!
//! The statement parser drives the assembler through per-statement
//! callbacks: zero or more `label` calls, operand or argument staging calls,
//! then exactly one `instr` or `dir` commit. Pass 1 advances the location
//! counter and builds the symbol index; pass 2 re-runs the same statements
//! and emits machine code and relocation records into the section buffers.
//! A failed statement is reported, per-statement state is dropped and the
//! driver resumes at the next line.

use std::fs::{self, File};

use nom::types::CompleteStr;

use crate::assembler::assembler_errors::{AsmError, DiagnosticSink};
use crate::assembler::obj_writer::{ObjectWriter, StrTab};
use crate::assembler::operand_parsers::ParsedOperand;
use crate::assembler::operands::{Operand, OperandBuffer, Resolved, Value};
use crate::assembler::sections::{RelEntry, RelTag, SectionStore};
use crate::assembler::statement_parsers::{statement, Statement, StmtBody};
use crate::assembler::symbols::{SymbolIndex, SymbolKind};
use crate::isa::{
    dir_info, instr_info, mode_mask, register_code, DirArgs, InstrInfo, RegIndUpdate, SP_REGISTER,
};

pub mod assembler_errors;
pub mod directive_parsers;
pub mod instruction_parsers;
pub mod label_parsers;
pub mod literal_parsers;
pub mod obj_writer;
pub mod operand_parsers;
pub mod operands;
pub mod sections;
pub mod statement_parsers;
pub mod symbol_parsers;
pub mod symbols;

/// RegDescr nibble for an unused register slot.
const NO_REG: u8 = 0xF;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Pass {
    First,
    Second,
}

pub struct Assembler {
    pass: Pass,
    /// Location counter: bytes the current statement's section holds so far.
    lc: u16,
    sections: SectionStore,
    symbols: SymbolIndex,
    strtab: StrTab,
    operands: OperandBuffer,
    dir_args: Vec<Value>,
    reg_ind_update: RegIndUpdate,
    /// The current statement carries at least one leading label.
    labeled: bool,
    /// An explicit `.end` was seen; the rest of the input is ignored.
    ended: bool,
    sink: DiagnosticSink,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            pass: Pass::First,
            lc: 0,
            sections: SectionStore::new(),
            symbols: SymbolIndex::new(),
            strtab: StrTab::new(),
            operands: OperandBuffer::new(),
            dir_args: vec![],
            reg_ind_update: RegIndUpdate::None,
            labeled: false,
            ended: false,
            sink: DiagnosticSink::new(""),
        }
    }

    /// Assembles `input` into `output`. The output file is removed again if
    /// anything fails after it was created.
    pub fn run(&mut self, input: &str, output: &str) -> Result<(), AsmError> {
        let source = fs::read_to_string(input).map_err(|source| AsmError::Io {
            path: input.to_string(),
            source,
        })?;
        let out_file = File::create(output).map_err(|source| AsmError::Io {
            path: output.to_string(),
            source,
        })?;

        let res = self.translate(input, &source).and_then(|()| {
            ObjectWriter::new(out_file)
                .write(&mut self.sections, &self.symbols, &mut self.strtab)
                .map_err(|source| AsmError::Io {
                    path: output.to_string(),
                    source,
                })
        });
        if res.is_err() {
            let _ = fs::remove_file(output);
        }
        res
    }

    /// Runs both passes over `source`. On success the section store, symbol
    /// index and string table hold everything the object writer needs.
    pub fn translate(&mut self, filename: &str, source: &str) -> Result<(), AsmError> {
        self.sink = DiagnosticSink::new(filename);
        self.sections.clear();
        self.symbols.clear();
        self.strtab = StrTab::new();

        self.begin_pass(Pass::First);
        self.run_pass(source);
        self.finish_first_pass();
        if self.sink.had_error() {
            return Err(AsmError::TranslationFailed {
                errors: self.sink.error_count(),
            });
        }

        self.begin_pass(Pass::Second);
        self.run_pass(source);
        if self.sink.had_error() {
            return Err(AsmError::TranslationFailed {
                errors: self.sink.error_count(),
            });
        }

        info!(
            "translation complete: {} section(s), {} symbol table entries",
            self.sections.iter().count(),
            self.symbols.table_len()
        );
        Ok(())
    }

    pub fn sections(&self) -> &SectionStore {
        &self.sections
    }

    pub fn symbols(&self) -> &SymbolIndex {
        &self.symbols
    }

    fn begin_pass(&mut self, pass: Pass) {
        self.pass = pass;
        self.lc = 0;
        self.operands.clear();
        self.dir_args.clear();
        self.reg_ind_update = RegIndUpdate::None;
        self.labeled = false;
        self.ended = false;
        self.sections.leave();
        debug!("starting {:?} pass", pass);
    }

    fn run_pass(&mut self, source: &str) {
        for (idx, raw_line) in source.lines().enumerate() {
            if self.ended {
                break;
            }
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }
            let col = (line.len() - line.trim_start().len()) as u32 + 1;
            self.sink.locate(idx as u32 + 1, col);

            match statement(CompleteStr(stripped)) {
                Ok((rest, stmt)) if rest.trim().is_empty() => {
                    if let Err(err) = self.dispatch(stmt) {
                        self.fail(err);
                    }
                }
                _ => self.fail(AsmError::MalformedStatement),
            }
        }
        if !self.ended {
            // end of input counts as an implicit .end
            self.close_section();
        }
    }

    /// Reports the error and drops the failed statement's staged state, so
    /// the next line starts clean.
    fn fail(&mut self, err: AsmError) {
        self.sink.error(&err);
        self.operands.clear();
        self.dir_args.clear();
        self.labeled = false;
    }

    fn finish_first_pass(&mut self) {
        for name in self.symbols.unresolved() {
            self.fail(AsmError::UndefinedSymbol(name));
        }
        if !self.sink.had_error() {
            let dropped = self.symbols.materialize(&mut self.strtab);
            for name in dropped {
                self.sink
                    .warning(&format!("ignoring .global of undefined symbol: {}", name));
            }
        }
    }

    /// Replays one parsed statement as the callback sequence.
    fn dispatch(&mut self, stmt: Statement) -> Result<(), AsmError> {
        for label in &stmt.labels {
            self.label(label)?;
        }
        match stmt.body {
            Some(StmtBody::Instr(ins)) => {
                for arg in ins.args {
                    match arg {
                        ParsedOperand::Immed(val) => self.instr_arg_immed(val)?,
                        ParsedOperand::MemDirOrJmpImmed(val, jmp) => {
                            self.instr_arg_memdir_or_jmp_immed(val, jmp)?
                        }
                        ParsedOperand::PcRel(sym) => self.instr_arg_pc_rel(sym)?,
                        ParsedOperand::RegDir(reg, jmp) => self.instr_arg_regdir(&reg, jmp)?,
                        ParsedOperand::RegInd(reg, jmp) => self.instr_arg_regind(&reg, jmp)?,
                        ParsedOperand::RegIndOff(reg, off, jmp) => {
                            self.instr_arg_regind_off(&reg, off, jmp)?
                        }
                    }
                }
                self.instr(&ins.name)
            }
            Some(StmtBody::Dir(dir)) => {
                for arg in dir.args {
                    self.dir_arg(arg)?;
                }
                self.dir(&dir.name)
            }
            None => Ok(()),
        }
    }

    // ---- parser callbacks ------------------------------------------------

    fn label(&mut self, name: &str) -> Result<(), AsmError> {
        let section = match self.sections.current_name() {
            Some(name) => name.to_string(),
            None => return Err(AsmError::NotInSection("label".to_string())),
        };
        if self.pass == Pass::First {
            self.symbols.define_label(name, self.lc, &section)?;
        }
        self.labeled = true;
        Ok(())
    }

    fn instr_arg_immed(&mut self, val: Value) -> Result<(), AsmError> {
        self.operands.push(Operand::Immediate(val))
    }

    fn instr_arg_memdir_or_jmp_immed(&mut self, val: Value, jmp_syntax: bool) -> Result<(), AsmError> {
        let op = if jmp_syntax {
            Operand::JmpMemDirect(val)
        } else {
            Operand::DataOrMem(val)
        };
        self.operands.push(op)
    }

    fn instr_arg_pc_rel(&mut self, sym: String) -> Result<(), AsmError> {
        self.operands.push(Operand::PcRel(sym))
    }

    fn instr_arg_regdir(&mut self, reg: &str, jmp_syntax: bool) -> Result<(), AsmError> {
        let reg = register_code(reg).ok_or_else(|| AsmError::InvalidRegister(reg.to_string()))?;
        self.operands.push(Operand::RegDirect {
            reg,
            jmp: jmp_syntax,
        })
    }

    fn instr_arg_regind(&mut self, reg: &str, jmp_syntax: bool) -> Result<(), AsmError> {
        let reg = register_code(reg).ok_or_else(|| AsmError::InvalidRegister(reg.to_string()))?;
        self.operands.push(Operand::RegIndirect {
            reg,
            jmp: jmp_syntax,
        })
    }

    fn instr_arg_regind_off(&mut self, reg: &str, off: Value, jmp_syntax: bool) -> Result<(), AsmError> {
        let reg = register_code(reg).ok_or_else(|| AsmError::InvalidRegister(reg.to_string()))?;
        self.operands.push(Operand::RegOffset {
            reg,
            off,
            jmp: jmp_syntax,
        })
    }

    fn instr(&mut self, name: &str) -> Result<(), AsmError> {
        let res = self.instr_inner(name);
        self.operands.clear();
        self.labeled = false;
        res
    }

    fn dir_arg(&mut self, arg: Value) -> Result<(), AsmError> {
        self.dir_args.push(arg);
        Ok(())
    }

    fn dir(&mut self, name: &str) -> Result<(), AsmError> {
        let res = self.dir_inner(name);
        self.dir_args.clear();
        self.labeled = false;
        res
    }

    // ---- instructions ----------------------------------------------------

    fn instr_inner(&mut self, name: &str) -> Result<(), AsmError> {
        if self.sections.current().is_none() {
            return Err(AsmError::NotInSection("instruction".to_string()));
        }

        self.reg_ind_update = RegIndUpdate::None;

        // push Rx -> str Rx, [sp] with pre-decrement
        // pop Rx  -> ldr Rx, [sp] with post-increment
        let mut name = name;
        let plain_reg = self.operands.len() == 1
            && matches!(
                self.operands.get(0),
                Some(Operand::RegDirect { jmp: false, .. })
            );
        if plain_reg && (name == "push" || name == "pop") {
            if name == "push" {
                name = "str";
                self.reg_ind_update = RegIndUpdate::PreDec;
            } else {
                name = "ldr";
                self.reg_ind_update = RegIndUpdate::PostInc;
            }
            self.operands.push(Operand::RegIndirect {
                reg: SP_REGISTER,
                jmp: false,
            })?;
        }

        let info =
            instr_info(name).ok_or_else(|| AsmError::UnknownInstruction(name.to_string()))?;
        if info.num_args != self.operands.len() {
            return Err(AsmError::OperandCount {
                expected: info.num_args,
                given: self.operands.len(),
            });
        }

        let mut resolved = Vec::with_capacity(info.num_args as usize);
        for (position, op) in self.operands.iter().enumerate() {
            resolved.push(op.resolve(&info, position)?);
        }

        match self.pass {
            Pass::First => self.instr_first_pass(&info, &resolved),
            Pass::Second => self.instr_second_pass(&info, &resolved),
        }
    }

    fn instr_first_pass(&mut self, info: &InstrInfo, resolved: &[Resolved]) -> Result<(), AsmError> {
        let mut size: u16 = 1; // InstrDescr
        if info.num_args > 0 {
            size += 1; // RegDescr
            if !info.is_one_reg_form() && !info.is_two_reg_form() {
                size += 1; // AddrMode
            }
        }
        for op in resolved {
            if op.mode.has_payload() {
                size += 2; // DataHigh + DataLow
            }
            if let Some(Value::Sym(name)) = &op.payload {
                self.symbols.mark_used(name);
            }
        }
        self.lc = self.lc.wrapping_add(size);
        Ok(())
    }

    fn instr_second_pass(&mut self, info: &InstrInfo, resolved: &[Resolved]) -> Result<(), AsmError> {
        let base = match self.sections.current() {
            Some(sec) => sec.data.len(),
            None => return Err(AsmError::NotInSection("instruction".to_string())),
        };

        let mut bytes = vec![info.opcode]; // InstrDescr
        let mut reloc = None;

        if info.num_args > 0 {
            if info.is_one_reg_form() {
                let reg_d = resolved[0].reg.unwrap_or(NO_REG);
                bytes.push(reg_d << 4 | NO_REG);
            } else if info.is_two_reg_form() {
                let reg_d = resolved[0].reg.unwrap_or(NO_REG);
                let reg_s = resolved[1].reg.unwrap_or(NO_REG);
                bytes.push(reg_d << 4 | reg_s);
            } else {
                // long form: an optional destination register, then the
                // operand carrying the addressing mode
                let (reg_d, op) = if info.arg_modes[0] == mode_mask::REGDIR {
                    (resolved[0].reg.unwrap_or(NO_REG), &resolved[1])
                } else {
                    (NO_REG, &resolved[0])
                };
                let reg_s = op.reg.unwrap_or(NO_REG);
                bytes.push(reg_d << 4 | reg_s); // RegDescr
                bytes.push(self.reg_ind_update.code() << 4 | op.mode.code()); // AddrMode
                if let Some(payload) = &op.payload {
                    let offset = (base + bytes.len()) as u16;
                    let (value, rel) =
                        self.payload_value(payload, op.pc_rel, RelTag::Sym16Be, offset)?;
                    // instruction payloads are big-endian
                    bytes.push((value >> 8) as u8); // DataHigh
                    bytes.push(value as u8); // DataLow
                    reloc = rel;
                }
            }
        }

        if let Some(sec) = self.sections.current_mut() {
            sec.data.extend_from_slice(&bytes);
            if let Some(rel) = reloc {
                sec.rel.push(rel);
            }
        }
        Ok(())
    }

    /// The inline word for a literal-or-symbol payload, plus the relocation
    /// record it needs, if any. Labels relocate against their section
    /// symbol, externals and global absolutes against their own entry.
    fn payload_value(
        &mut self,
        val: &Value,
        pc_rel: bool,
        abs_tag: RelTag,
        offset: u16,
    ) -> Result<(u16, Option<RelEntry>), AsmError> {
        let name = match val {
            Value::Lit(value) => return Ok((*value, None)),
            Value::Sym(name) => name.clone(),
        };
        let (kind, external, value, table_id, section) = match self.symbols.get(&name) {
            Some(sym) => (
                sym.kind,
                sym.external,
                sym.value,
                sym.table_id,
                sym.section.clone(),
            ),
            None => return Err(AsmError::UndefinedSymbol(name)),
        };

        let tag = if pc_rel { RelTag::PcRel } else { abs_tag };
        let target = match kind {
            SymbolKind::Label | SymbolKind::Section => match section {
                Some(sec_name) => Some(self.symbols.section_symbol_id(&sec_name, &mut self.strtab)),
                None => return Err(AsmError::UndefinedSymbol(name)),
            },
            SymbolKind::Undefined => {
                if !external {
                    return Err(AsmError::UndefinedSymbol(name));
                }
                Some(table_id)
            }
            SymbolKind::Absolute => {
                if pc_rel {
                    if table_id == 0 {
                        return Err(AsmError::PcRelAbsolute(name));
                    }
                    Some(table_id)
                } else {
                    None
                }
            }
        };
        Ok((value, target.map(|sym| RelEntry { tag, offset, sym })))
    }

    // ---- directives ------------------------------------------------------

    fn dir_inner(&mut self, name: &str) -> Result<(), AsmError> {
        let info = dir_info(name).ok_or_else(|| AsmError::UnknownDirective(name.to_string()))?;
        if self.labeled && !info.labels_allowed {
            return Err(AsmError::LabelNotAllowed(name.to_string()));
        }
        if info.needs_section && self.sections.current().is_none() {
            return Err(AsmError::NotInSection(format!(".{}", name)));
        }
        self.check_dir_args(name, info.args)?;

        match name {
            "global" => self.dir_global(),
            "extern" => self.dir_extern(),
            "section" => self.dir_section(),
            "word" => self.dir_word(),
            "skip" => self.dir_skip(),
            "equ" => self.dir_equ(),
            "end" => self.dir_end(),
            _ => Ok(()),
        }
    }

    fn check_dir_args(&self, dir: &str, shape: DirArgs) -> Result<(), AsmError> {
        let args = &self.dir_args;
        let is_sym = |arg: &Value| matches!(arg, Value::Sym(_));
        let is_lit = |arg: &Value| matches!(arg, Value::Lit(_));
        let (ok, expected) = match shape {
            DirArgs::SymbolList => (
                !args.is_empty() && args.iter().all(is_sym),
                "a list of symbols",
            ),
            DirArgs::Symbol => (args.len() == 1 && is_sym(&args[0]), "a single symbol"),
            DirArgs::ValueList => (!args.is_empty(), "a list of literals or symbols"),
            DirArgs::Literal => (args.len() == 1 && is_lit(&args[0]), "a single literal"),
            DirArgs::SymbolLiteral => (
                args.len() == 2 && is_sym(&args[0]) && is_lit(&args[1]),
                "a symbol and a literal",
            ),
            DirArgs::None => (args.is_empty(), "no arguments"),
        };
        if ok {
            Ok(())
        } else {
            Err(AsmError::DirectiveArgs {
                dir: dir.to_string(),
                expected,
            })
        }
    }

    fn dir_global(&mut self) -> Result<(), AsmError> {
        if self.pass == Pass::First {
            for arg in &self.dir_args {
                if let Value::Sym(name) = arg {
                    self.symbols.declare_global(name);
                }
            }
        }
        Ok(())
    }

    fn dir_extern(&mut self) -> Result<(), AsmError> {
        if self.pass == Pass::First {
            for arg in &self.dir_args {
                if let Value::Sym(name) = arg {
                    self.symbols.declare_external(name)?;
                }
            }
        }
        Ok(())
    }

    fn dir_section(&mut self) -> Result<(), AsmError> {
        let name = match self.dir_args.first() {
            Some(Value::Sym(name)) => format!(".{}", name),
            _ => {
                return Err(AsmError::DirectiveArgs {
                    dir: "section".to_string(),
                    expected: "a single symbol",
                })
            }
        };
        self.close_section();
        match self.pass {
            Pass::First => self.sections.open(&name)?,
            Pass::Second => self.sections.reopen(&name),
        }
        self.lc = 0;
        Ok(())
    }

    fn dir_word(&mut self) -> Result<(), AsmError> {
        match self.pass {
            Pass::First => {
                for arg in &self.dir_args {
                    if let Value::Sym(name) = arg {
                        self.symbols.mark_used(name);
                    }
                }
                self.lc = self.lc.wrapping_add(2 * self.dir_args.len() as u16);
                Ok(())
            }
            Pass::Second => {
                let args = self.dir_args.clone();
                for arg in &args {
                    let offset = self.sections.current().map(|s| s.data.len()).unwrap_or(0) as u16;
                    let (value, rel) = self.payload_value(arg, false, RelTag::Sym16, offset)?;
                    if let Some(sec) = self.sections.current_mut() {
                        // data words are little-endian
                        sec.data.push(value as u8);
                        sec.data.push((value >> 8) as u8);
                        if let Some(rel) = rel {
                            sec.rel.push(rel);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn dir_skip(&mut self) -> Result<(), AsmError> {
        let count = match self.dir_args.first() {
            Some(Value::Lit(count)) => *count,
            _ => {
                return Err(AsmError::DirectiveArgs {
                    dir: "skip".to_string(),
                    expected: "a single literal",
                })
            }
        };
        match self.pass {
            Pass::First => self.lc = self.lc.wrapping_add(count),
            Pass::Second => {
                if let Some(sec) = self.sections.current_mut() {
                    let new_len = sec.data.len() + count as usize;
                    sec.data.resize(new_len, 0);
                }
            }
        }
        Ok(())
    }

    fn dir_equ(&mut self) -> Result<(), AsmError> {
        if self.pass == Pass::First {
            let (name, value) = match (self.dir_args.get(0), self.dir_args.get(1)) {
                (Some(Value::Sym(name)), Some(Value::Lit(value))) => (name.clone(), *value),
                _ => {
                    return Err(AsmError::DirectiveArgs {
                        dir: "equ".to_string(),
                        expected: "a symbol and a literal",
                    })
                }
            };
            self.symbols.define_absolute(&name, value)?;
        }
        Ok(())
    }

    fn dir_end(&mut self) -> Result<(), AsmError> {
        self.close_section();
        self.ended = true;
        Ok(())
    }

    /// Finalizes the section being filled, recording its size in pass 1.
    fn close_section(&mut self) {
        if self.pass == Pass::First {
            let lc = self.lc;
            if let Some(sec) = self.sections.current_mut() {
                sec.size = lc;
                debug!("section {} closed at {} bytes", sec.name, lc);
            }
        }
        self.sections.leave();
        self.lc = 0;
    }
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::AddrMode;

    fn assemble(src: &str) -> Assembler {
        let mut asm = Assembler::new();
        asm.translate("test.s", src).unwrap();
        asm
    }

    fn assemble_err(src: &str) -> AsmError {
        let mut asm = Assembler::new();
        asm.translate("test.s", src).unwrap_err()
    }

    fn section_data<'a>(asm: &'a Assembler, name: &str) -> &'a [u8] {
        &asm.sections().get(name).unwrap().data
    }

    #[test]
    fn test_empty_translation() {
        let asm = assemble(".end");
        assert_eq!(asm.sections().iter().count(), 0);
        assert_eq!(asm.symbols().table_len(), 1); // null entry only
    }

    #[test]
    fn test_single_instruction() {
        let asm = assemble(
            ".section text
               halt
             .end",
        );
        let sec = asm.sections().get(".text").unwrap();
        assert_eq!(sec.data, vec![0x00]);
        assert_eq!(sec.size, 1);
        assert!(sec.rel.is_empty());
        assert_eq!(asm.symbols().table_len(), 1);
    }

    #[test]
    fn test_two_register_add() {
        let asm = assemble(
            ".section text
               add r1, r2
             .end",
        );
        assert_eq!(section_data(&asm, ".text"), &[0x70, 0x12]);
    }

    #[test]
    fn test_labeled_load_with_relocation() {
        let asm = assemble(
            ".section data
             x: .word 5
             .section text
             .global start
             start: ldr r0, x
             .end",
        );
        assert_eq!(section_data(&asm, ".data"), &[0x05, 0x00]);
        assert_eq!(section_data(&asm, ".text"), &[0xA0, 0x0F, 0x04, 0x00, 0x00]);

        // the relocation targets the .data section symbol, not x
        let text = asm.sections().get(".text").unwrap();
        assert_eq!(text.rel.len(), 1);
        assert_eq!(text.rel[0].tag, RelTag::Sym16Be);
        assert_eq!(text.rel[0].offset, 3);
        let data_sym = asm.symbols().get(".data").unwrap();
        assert_eq!(data_sym.kind, SymbolKind::Section);
        assert_eq!(text.rel[0].sym, data_sym.table_id);

        // start is a materialized global label, x stays local
        let start = asm.symbols().get("start").unwrap();
        assert_eq!(start.table_id, 1);
        assert!(start.global);
        assert_eq!(asm.symbols().get("x").unwrap().table_id, 0);
    }

    #[test]
    fn test_extern_call() {
        let asm = assemble(
            ".extern printf
             .section text
               call printf
             .end",
        );
        // jump syntax commits the bare symbol to an immediate target
        assert_eq!(section_data(&asm, ".text"), &[0x30, 0xFF, 0x00, 0x00, 0x00]);

        let text = asm.sections().get(".text").unwrap();
        assert_eq!(text.rel.len(), 1);
        assert_eq!(text.rel[0].tag, RelTag::Sym16Be);
        assert_eq!(text.rel[0].offset, 3);

        let printf = asm.symbols().get("printf").unwrap();
        assert_eq!(printf.kind, SymbolKind::Undefined);
        assert!(printf.external);
        assert!(printf.used);
        assert_eq!(text.rel[0].sym, printf.table_id);
        assert_eq!(printf.table_id, 1);
    }

    #[test]
    fn test_duplicate_label_fails() {
        let err = assemble_err(
            ".section text
             foo: halt
             foo: halt
             .end",
        );
        assert!(matches!(err, AsmError::TranslationFailed { .. }));
    }

    #[test]
    fn test_push_pop_rewrite() {
        // push R == str R, [sp] with pre-decrement
        // pop R  == ldr R, [sp] with post-increment
        let asm = assemble(
            ".section text
               push r3
               pop r3
             .end",
        );
        assert_eq!(
            section_data(&asm, ".text"),
            &[0xB0, 0x36, 0x12, 0xA0, 0x36, 0x42]
        );
    }

    #[test]
    fn test_one_reg_and_zero_arg_forms() {
        let asm = assemble(
            ".section text
               int r1
               not psw
               iret
               ret
             .end",
        );
        assert_eq!(
            section_data(&asm, ".text"),
            &[0x10, 0x1F, 0x80, 0x8F, 0x20, 0x40]
        );
    }

    #[test]
    fn test_jump_operand_forms() {
        let asm = assemble(
            ".section text
               jmp 0x100
               jmp *0x100
               jmp *r3
               jmp *[r3]
               jmp *[r3 + 2]
             .end",
        );
        assert_eq!(
            section_data(&asm, ".text"),
            &[
                0x50, 0xFF, 0x00, 0x01, 0x00, // immediate target
                0x50, 0xFF, 0x04, 0x01, 0x00, // memory-direct
                0x50, 0xF3, 0x01, // register-direct
                0x50, 0xF3, 0x02, // register-indirect
                0x50, 0xF3, 0x03, 0x00, 0x02, // register-indirect with offset
            ]
        );
    }

    #[test]
    fn test_data_operand_forms() {
        let asm = assemble(
            ".section text
               ldr r1, $0x1234
               ldr r1, 0x1234
               ldr r1, r2
               ldr r1, [r2]
               ldr r1, [r2 + 6]
             .end",
        );
        assert_eq!(
            section_data(&asm, ".text"),
            &[
                0xA0, 0x1F, 0x00, 0x12, 0x34, // immediate, big-endian payload
                0xA0, 0x1F, 0x04, 0x12, 0x34, // memory-direct
                0xA0, 0x12, 0x01, // register-direct
                0xA0, 0x12, 0x02, // register-indirect
                0xA0, 0x12, 0x03, 0x00, 0x06, // register-indirect with offset
            ]
        );
    }

    #[test]
    fn test_pc_relative_forms() {
        let asm = assemble(
            ".section text
             start: jmp %start
               ldr r0, %start
             .end",
        );
        let text = asm.sections().get(".text").unwrap();
        assert_eq!(
            text.data,
            vec![
                0x50,
                0xF0 | 7,
                AddrMode::RegDirOff.code(),
                0x00,
                0x00,
                0xA0,
                0x07,
                AddrMode::RegIndOff.code(),
                0x00,
                0x00,
            ]
        );
        assert_eq!(text.rel.len(), 2);
        assert!(text.rel.iter().all(|rel| rel.tag == RelTag::PcRel));
        assert_eq!(text.rel[0].offset, 3);
        assert_eq!(text.rel[1].offset, 8);
        // both target the .text section symbol
        let text_sym = asm.symbols().get(".text").unwrap().table_id;
        assert!(text.rel.iter().all(|rel| rel.sym == text_sym));
    }

    #[test]
    fn test_word_endianness_vs_instruction_payload() {
        // the asymmetry is deliberate: .word is little-endian, instruction
        // payloads are big-endian
        let asm = assemble(
            ".section data
               .word 0x1234
             .section text
               ldr r0, $0x1234
             .end",
        );
        assert_eq!(section_data(&asm, ".data"), &[0x34, 0x12]);
        assert_eq!(section_data(&asm, ".text")[3..], [0x12, 0x34]);
    }

    #[test]
    fn test_round_trip_sizes() {
        let asm = assemble(
            ".section data
             buf: .skip 6
                  .word 1, 2, 3
             .section text
             start: ldr r0, buf
                    add r0, r1
                    push r0
                    jmp %start
             .end",
        );
        for sec in asm.sections().iter() {
            assert_eq!(
                sec.size as usize,
                sec.data.len(),
                "pass-1 size of {} disagrees with emitted bytes",
                sec.name
            );
        }
    }

    #[test]
    fn test_label_value_stability() {
        let asm = assemble(
            ".section text
               halt
             mid: add r1, r2
             late: .word 1
             .end",
        );
        assert_eq!(asm.symbols().get("mid").unwrap().value, 1);
        assert_eq!(asm.symbols().get("late").unwrap().value, 3);
        assert_eq!(section_data(&asm, ".text").len(), 5);
    }

    #[test]
    fn test_relocation_completeness() {
        let asm = assemble(
            ".extern ext
             .equ seven, 7
             .section data
             x: .word 5
             .section text
             start: ldr r0, x
               ldr r1, $ext
               jmp %start
               .word start
               .word 9
               .word seven
             .end",
        );
        // exactly four words need fixing up: the cross-section label, the
        // external, the pc-relative form and the label word; literals and
        // absolutes resolve inline
        let text = asm.sections().get(".text").unwrap();
        assert_eq!(text.rel.len(), 4);
        assert!(asm.sections().get(".data").unwrap().rel.is_empty());

        let ext_id = asm.symbols().get("ext").unwrap().table_id;
        let data_id = asm.symbols().get(".data").unwrap().table_id;
        let text_id = asm.symbols().get(".text").unwrap().table_id;
        assert_eq!(ext_id, 1);
        assert_eq!(data_id, 2);
        assert_eq!(text_id, 3);

        assert_eq!(text.rel[0], RelEntry { tag: RelTag::Sym16Be, offset: 3, sym: data_id });
        assert_eq!(text.rel[1], RelEntry { tag: RelTag::Sym16Be, offset: 8, sym: ext_id });
        assert_eq!(text.rel[2], RelEntry { tag: RelTag::PcRel, offset: 13, sym: text_id });
        assert_eq!(text.rel[3], RelEntry { tag: RelTag::Sym16, offset: 15, sym: text_id });

        // inline values: label addresses and zero for the external
        assert_eq!(text.data[15], 0x00); // start is at 0
        assert_eq!(text.data[17], 9);
        assert_eq!(text.data[19], 7);
    }

    #[test]
    fn test_global_absolute_is_materialized() {
        let asm = assemble(
            ".equ limit, 0x40
             .global limit
             .section data
               .word limit
             .end",
        );
        let limit = asm.symbols().get("limit").unwrap();
        assert_eq!(limit.kind, SymbolKind::Absolute);
        assert_eq!(limit.table_id, 1);
        assert_eq!(section_data(&asm, ".data"), &[0x40, 0x00]);
        // absolutes resolve inline, no relocation
        assert!(asm.sections().get(".data").unwrap().rel.is_empty());
    }

    #[test]
    fn test_skip_reserves_zeros() {
        let asm = assemble(
            ".section data
             buf: .skip 4
               .word 1
             .end",
        );
        assert_eq!(section_data(&asm, ".data"), &[0, 0, 0, 0, 1, 0]);
        assert_eq!(asm.symbols().get("buf").unwrap().value, 0);
    }

    #[test]
    fn test_comments_blank_lines_and_implicit_end() {
        let asm = assemble(
            "# a whole-line comment

             .section text
               halt   # trailing comment",
        );
        let sec = asm.sections().get(".text").unwrap();
        assert_eq!(sec.data, vec![0x00]);
        assert_eq!(sec.size, 1);
    }

    #[test]
    fn test_bare_label_line_binds_forward() {
        let asm = assemble(
            ".section text
             loop:
               halt
             .end",
        );
        assert_eq!(asm.symbols().get("loop").unwrap().value, 0);
    }

    #[test]
    fn test_statements_after_end_are_ignored() {
        let asm = assemble(
            ".section text
               halt
             .end
             garbage that would not parse",
        );
        assert_eq!(section_data(&asm, ".text"), &[0x00]);
    }

    #[test]
    fn test_undefined_symbol_fails() {
        assert!(matches!(
            assemble_err(
                ".section text
                   ldr r0, nowhere
                 .end"
            ),
            AsmError::TranslationFailed { .. }
        ));
    }

    #[test]
    fn test_forward_reference_is_fine() {
        let asm = assemble(
            ".section text
               jmp done
             done: halt
             .end",
        );
        // done is at 5; the inline value carries the section-local address
        assert_eq!(section_data(&asm, ".text"), &[0x50, 0xFF, 0x00, 0x00, 0x05, 0x00]);
    }

    #[test]
    fn test_section_required_errors() {
        assert!(matches!(
            assemble_err("halt\n.end"),
            AsmError::TranslationFailed { .. }
        ));
        assert!(matches!(
            assemble_err("x: .end"),
            AsmError::TranslationFailed { .. }
        ));
        assert!(matches!(
            assemble_err(".word 1\n.end"),
            AsmError::TranslationFailed { .. }
        ));
    }

    #[test]
    fn test_duplicate_section_fails() {
        assert!(matches!(
            assemble_err(
                ".section text
                 .section data
                 .section text
                 .end"
            ),
            AsmError::TranslationFailed { .. }
        ));
    }

    #[test]
    fn test_extern_define_conflicts() {
        assert!(assemble_err(
            ".extern foo
             .section text
             foo: halt
             .end"
        )
        .exit_code()
            == 1);
        assert!(assemble_err(
            ".equ foo, 1
             .extern foo
             .end"
        )
        .exit_code()
            == 1);
    }

    #[test]
    fn test_syntax_errors() {
        // unknown mnemonic
        assert!(assemble_err(".section text\nmov r0, r1\n.end").exit_code() == 1);
        // wrong operand count
        assert!(assemble_err(".section text\nadd r1\n.end").exit_code() == 1);
        // store to an immediate
        assert!(assemble_err(".section text\nstr r1, $5\n.end").exit_code() == 1);
        // data instruction with jump operand syntax
        assert!(assemble_err(".section text\nadd r1, *r2\n.end").exit_code() == 1);
        // invalid register inside brackets
        assert!(assemble_err(".section text\nldr r1, [r9]\n.end").exit_code() == 1);
        // labeled .global
        assert!(assemble_err(".section text\nx: .global y\n.end").exit_code() == 1);
        // malformed line
        assert!(assemble_err(".section text\nldr r1,\n.end").exit_code() == 1);
    }

    #[test]
    fn test_error_recovery_reports_every_line() {
        let mut asm = Assembler::new();
        let err = asm
            .translate(
                "test.s",
                ".section text
                 mov r0, r1
                 frob r2
                 halt
                 .end",
            )
            .unwrap_err();
        match err {
            AsmError::TranslationFailed { errors } => assert_eq!(errors, 2),
            other => panic!("expected TranslationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_run_writes_and_removes_output() {
        use std::io::Read;

        let dir = std::env::temp_dir();
        let src_path = dir.join("ssasm_test_ok.s");
        let obj_path = dir.join("ssasm_test_ok.o");
        fs::write(&src_path, ".section text\n  halt\n.end\n").unwrap();

        let mut asm = Assembler::new();
        asm.run(src_path.to_str().unwrap(), obj_path.to_str().unwrap())
            .unwrap();
        let mut bytes = vec![];
        File::open(&obj_path)
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes[..6], obj_writer::MAGIC);

        // a failing run must not leave the output behind
        let bad_src = dir.join("ssasm_test_bad.s");
        let bad_obj = dir.join("ssasm_test_bad.o");
        fs::write(&bad_src, ".section text\nfoo: halt\nfoo: halt\n.end\n").unwrap();
        let mut asm = Assembler::new();
        assert!(asm
            .run(bad_src.to_str().unwrap(), bad_obj.to_str().unwrap())
            .is_err());
        assert!(!bad_obj.exists());

        let _ = fs::remove_file(src_path);
        let _ = fs::remove_file(obj_path);
        let _ = fs::remove_file(bad_src);
    }

    #[test]
    fn test_missing_input_is_a_file_error() {
        let mut asm = Assembler::new();
        let err = asm
            .run("/no/such/ssasm_input.s", "/tmp/ssasm_unused.o")
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
