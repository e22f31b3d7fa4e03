//! Symbol records and the symbol index.
//!
//! Symbols are created lazily on first mention and mutated by definitions,
//! `.global`/`.extern` declarations and use-tracking. At the end of pass 1
//! the index is filtered down to the entries that belong in the emitted
//! symbol table; section symbols join lazily in pass 2, on the first
//! relocation that needs them.

use crate::assembler::assembler_errors::AsmError;
use crate::assembler::obj_writer::StrTab;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Undefined,
    Absolute,
    Label,
    Section,
}

#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub defined: bool,
    pub global: bool,
    pub external: bool,
    pub used: bool,
    pub value: u16,
    /// Defining section, for labels and section symbols.
    pub section: Option<String>,
    /// Index in the emitted symbol table; 0 while (or if never) materialized.
    pub table_id: u32,
    /// Offset of the name in the string section, once materialized.
    pub name_off: u32,
}

impl Symbol {
    fn new(name: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Undefined,
            defined: false,
            global: false,
            external: false,
            used: false,
            value: 0,
            section: None,
            table_id: 0,
            name_off: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolIndex {
    symbols: Vec<Symbol>,
    /// Names of materialized symbols, in table-id order (id 0 is the
    /// reserved null entry and has no name here).
    table: Vec<String>,
}

impl SymbolIndex {
    pub fn new() -> SymbolIndex {
        SymbolIndex {
            symbols: vec![],
            table: vec![],
        }
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.table.clear();
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    fn entry(&mut self, name: &str) -> &mut Symbol {
        let idx = match self.symbols.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.symbols.push(Symbol::new(name));
                self.symbols.len() - 1
            }
        };
        &mut self.symbols[idx]
    }

    /// Defines `name` as a label at `value` inside `section`.
    pub fn define_label(&mut self, name: &str, value: u16, section: &str) -> Result<(), AsmError> {
        let sym = self.entry(name);
        if sym.defined {
            return Err(AsmError::DuplicateSymbol(name.to_string()));
        }
        if sym.external {
            return Err(AsmError::ExternalDefined(name.to_string()));
        }
        sym.kind = SymbolKind::Label;
        sym.defined = true;
        sym.value = value;
        sym.section = Some(section.to_string());
        Ok(())
    }

    /// Defines `name` as an absolute symbol (`.equ`).
    pub fn define_absolute(&mut self, name: &str, value: u16) -> Result<(), AsmError> {
        let sym = self.entry(name);
        if sym.defined {
            return Err(AsmError::DuplicateSymbol(name.to_string()));
        }
        if sym.external {
            return Err(AsmError::ExternalDefined(name.to_string()));
        }
        sym.kind = SymbolKind::Absolute;
        sym.defined = true;
        sym.value = value;
        Ok(())
    }

    pub fn declare_global(&mut self, name: &str) {
        self.entry(name).global = true;
    }

    pub fn declare_external(&mut self, name: &str) -> Result<(), AsmError> {
        let sym = self.entry(name);
        if sym.defined {
            return Err(AsmError::ExternalDefined(name.to_string()));
        }
        sym.external = true;
        Ok(())
    }

    pub fn mark_used(&mut self, name: &str) {
        self.entry(name).used = true;
    }

    /// Symbols that are used but neither defined nor declared extern. Every
    /// entry here is a pass-1 error; pass 2 relies on this list being empty.
    pub fn unresolved(&self) -> Vec<String> {
        self.symbols
            .iter()
            .filter(|s| s.used && !s.defined && !s.external)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Filters the index into the emitted symbol table, assigning table ids
    /// and string-section name offsets. Returns the names of `.global`
    /// declarations that never got a definition (reported as warnings).
    pub fn materialize(&mut self, strtab: &mut StrTab) -> Vec<String> {
        let mut dropped_globals = vec![];
        let mut table = vec![];
        for sym in &mut self.symbols {
            match sym.kind {
                SymbolKind::Undefined => {
                    if sym.external {
                        if !sym.used {
                            continue; // imported but never referenced
                        }
                    } else {
                        if sym.global {
                            dropped_globals.push(sym.name.clone());
                        }
                        continue;
                    }
                }
                SymbolKind::Absolute | SymbolKind::Label => {
                    if !sym.global {
                        continue; // locals resolve inline in pass 2
                    }
                }
                // Section symbols only join through section_symbol_id.
                SymbolKind::Section => continue,
            }
            sym.table_id = table.len() as u32 + 1;
            sym.name_off = strtab.add(&sym.name);
            table.push(sym.name.clone());
        }
        self.table = table;
        dropped_globals
    }

    /// Table id of the section symbol for `section`, synthesizing it on
    /// first use. The name offset is shared with the section-header-table
    /// entry for the same section.
    pub fn section_symbol_id(&mut self, section: &str, strtab: &mut StrTab) -> u32 {
        if let Some(sym) = self.symbols.iter().find(|s| {
            s.kind == SymbolKind::Section && s.name == section
        }) {
            return sym.table_id;
        }
        let table_id = self.table.len() as u32 + 1;
        let mut sym = Symbol::new(section);
        sym.kind = SymbolKind::Section;
        sym.defined = true;
        sym.section = Some(section.to_string());
        sym.table_id = table_id;
        sym.name_off = strtab.add(section);
        self.symbols.push(sym);
        self.table.push(section.to_string());
        table_id
    }

    /// Materialized symbols in table-id order, null entry excluded.
    pub fn table_entries(&self) -> impl Iterator<Item = &Symbol> {
        let mut entries: Vec<&Symbol> = self.symbols.iter().filter(|s| s.table_id != 0).collect();
        entries.sort_by_key(|s| s.table_id);
        entries.into_iter()
    }

    pub fn table_len(&self) -> usize {
        self.table.len() + 1 // plus the null entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation_and_definition() {
        let mut index = SymbolIndex::new();
        index.mark_used("x");
        let sym = index.get("x").unwrap();
        assert_eq!(sym.kind, SymbolKind::Undefined);
        assert!(sym.used);
        assert!(!sym.defined);

        index.define_label("x", 4, ".text").unwrap();
        let sym = index.get("x").unwrap();
        assert_eq!(sym.kind, SymbolKind::Label);
        assert_eq!(sym.value, 4);
        assert_eq!(sym.section.as_deref(), Some(".text"));
    }

    #[test]
    fn test_duplicate_definition() {
        let mut index = SymbolIndex::new();
        index.define_label("foo", 0, ".text").unwrap();
        assert!(index.define_label("foo", 2, ".text").is_err());
        assert!(index.define_absolute("foo", 7).is_err());
    }

    #[test]
    fn test_extern_defined_conflict() {
        let mut index = SymbolIndex::new();
        index.declare_external("printf").unwrap();
        assert!(index.define_label("printf", 0, ".text").is_err());

        let mut index = SymbolIndex::new();
        index.define_absolute("seven", 7).unwrap();
        assert!(index.declare_external("seven").is_err());
    }

    #[test]
    fn test_unresolved() {
        let mut index = SymbolIndex::new();
        index.mark_used("a");
        index.mark_used("b");
        index.declare_external("b").unwrap();
        index.define_label("c", 0, ".text").unwrap();
        assert_eq!(index.unresolved(), vec!["a".to_string()]);
    }

    #[test]
    fn test_materialize_filters() {
        let mut index = SymbolIndex::new();
        let mut strtab = StrTab::new();

        // local label: dropped
        index.define_label("loc", 0, ".text").unwrap();
        // global label: kept
        index.define_label("start", 2, ".text").unwrap();
        index.declare_global("start");
        // local absolute: dropped
        index.define_absolute("seven", 7).unwrap();
        // used external: kept
        index.declare_external("printf").unwrap();
        index.mark_used("printf");
        // unused external: dropped
        index.declare_external("scanf").unwrap();
        // .global without definition: dropped with a warning
        index.declare_global("ghost");

        let dropped = index.materialize(&mut strtab);
        assert_eq!(dropped, vec!["ghost".to_string()]);

        assert_eq!(index.get("loc").unwrap().table_id, 0);
        assert_eq!(index.get("seven").unwrap().table_id, 0);
        assert_eq!(index.get("scanf").unwrap().table_id, 0);
        assert_eq!(index.get("ghost").unwrap().table_id, 0);
        assert_eq!(index.get("start").unwrap().table_id, 1);
        assert_eq!(index.get("printf").unwrap().table_id, 2);
        assert_eq!(index.table_len(), 3);
    }

    #[test]
    fn test_section_symbol_is_synthesized_once() {
        let mut index = SymbolIndex::new();
        let mut strtab = StrTab::new();
        index.materialize(&mut strtab);

        let id1 = index.section_symbol_id(".data", &mut strtab);
        let id2 = index.section_symbol_id(".data", &mut strtab);
        assert_eq!(id1, 1);
        assert_eq!(id1, id2);
        assert_eq!(index.table_len(), 2);

        let sym = index.get(".data").unwrap();
        assert_eq!(sym.kind, SymbolKind::Section);
        assert!(!sym.global);
    }
}
