//! Serialization of the object-file layout.
//!
//! On disk: header, then each section's bytes immediately followed by its
//! relocation section when non-empty, then the symbol table, the string
//! section and the section header table. The header goes out first with
//! placeholder offsets and is rewritten once the table offsets are known.
//! Everything is little-endian; the big-endian instruction payloads are
//! already baked into the section bytes by the encoder.

use std::collections::HashMap;
use std::io::{self, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::assembler::sections::SectionStore;
use crate::assembler::symbols::{SymbolIndex, SymbolKind};

pub const MAGIC: [u8; 6] = [0x04, 0x0F, b'O', b'B', b'J', 0x00];
pub const HEADER_SIZE: u8 = 16;
pub const SHT_ENTRY_SIZE: u8 = 14;
pub const SYM_ENTRY_SIZE: usize = 10;
pub const REL_ENTRY_SIZE: usize = 8;

/// Section kinds in the section header table.
pub mod sht_kind {
    pub const NULL: u8 = 0;
    pub const DATA: u8 = 1;
    pub const REL: u8 = 2;
    pub const SYMTAB: u8 = 3;
    pub const STRTAB: u8 = 4;
}

/// The string (names) section: null-terminated names, starting with a
/// single null byte so that offset 0 means "no name". Adding the same name
/// twice returns the original offset.
#[derive(Debug)]
pub struct StrTab {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StrTab {
    pub fn new() -> StrTab {
        StrTab {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }

    pub fn add(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        if let Some(&off) = self.offsets.get(name) {
            return off;
        }
        let off = self.data.len() as u32;
        self.data.extend_from_slice(name.as_bytes());
        self.data.push(0);
        self.offsets.insert(name.to_string(), off);
        off
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl Default for StrTab {
    fn default() -> StrTab {
        StrTab::new()
    }
}

struct ShtEntry {
    kind: u8,
    name_off: u32,
    offset: u32,
    size: u32,
}

impl ShtEntry {
    fn null() -> ShtEntry {
        ShtEntry {
            kind: sht_kind::NULL,
            name_off: 0,
            offset: 0,
            size: 0,
        }
    }
}

pub struct ObjectWriter<W: Write + Seek> {
    out: W,
}

impl<W: Write + Seek> ObjectWriter<W> {
    pub fn new(out: W) -> ObjectWriter<W> {
        ObjectWriter { out }
    }

    fn pos(&mut self) -> io::Result<u32> {
        Ok(self.out.seek(SeekFrom::Current(0))? as u32)
    }

    fn write_header(&mut self, sht_offset: u32, sht_len: u16, str_entry: u16) -> io::Result<()> {
        self.out.write_all(&MAGIC)?;
        self.out.write_u8(HEADER_SIZE)?;
        self.out.write_u8(SHT_ENTRY_SIZE)?;
        self.out.write_u32::<LittleEndian>(sht_offset)?;
        self.out.write_u16::<LittleEndian>(sht_len)?;
        self.out.write_u16::<LittleEndian>(str_entry)?;
        Ok(())
    }

    /// Serializes the whole object file and rewrites the header.
    pub fn write(
        mut self,
        sections: &mut SectionStore,
        symbols: &SymbolIndex,
        strtab: &mut StrTab,
    ) -> io::Result<()> {
        self.write_header(0, 0, 0)?;

        // Slot every section (and its rel section) in the header table up
        // front; symbol entries need the indices before the table is written.
        let mut next_id: u16 = 1;
        for sec in sections.iter_mut() {
            sec.table_id = next_id;
            next_id += 1;
            if !sec.rel.is_empty() {
                next_id += 1;
            }
            sec.name_off = strtab.add(&sec.name);
        }
        let symtab_id = next_id;
        let strtab_id = next_id + 1;

        let mut entries = vec![ShtEntry::null()];

        for sec in sections.iter() {
            let offset = self.pos()?;
            self.out.write_all(&sec.data)?;
            entries.push(ShtEntry {
                kind: sht_kind::DATA,
                name_off: sec.name_off,
                offset,
                size: sec.data.len() as u32,
            });
            if !sec.rel.is_empty() {
                let rel_offset = self.pos()?;
                for rel in &sec.rel {
                    self.out.write_u8(rel.tag.code())?;
                    self.out.write_u8(0)?;
                    self.out.write_u16::<LittleEndian>(rel.offset)?;
                    self.out.write_u32::<LittleEndian>(rel.sym)?;
                }
                entries.push(ShtEntry {
                    kind: sht_kind::REL,
                    name_off: strtab.add(&format!("{}.rel", sec.name)),
                    offset: rel_offset,
                    size: (sec.rel.len() * REL_ENTRY_SIZE) as u32,
                });
            }
        }

        debug_assert_eq!(entries.len() as u16, symtab_id);

        let sym_offset = self.pos()?;
        self.out.write_all(&[0u8; SYM_ENTRY_SIZE])?;
        for sym in symbols.table_entries() {
            let shndx = sym
                .section
                .as_ref()
                .and_then(|name| sections.get(name))
                .map(|sec| sec.table_id)
                .unwrap_or(0);
            let kind = match sym.kind {
                SymbolKind::Undefined => 0,
                SymbolKind::Absolute => 1,
                SymbolKind::Label => 2,
                SymbolKind::Section => 3,
            };
            let bind = if sym.kind == SymbolKind::Section { 0 } else { 1 };
            self.out.write_u32::<LittleEndian>(sym.name_off)?;
            self.out.write_u16::<LittleEndian>(sym.value)?;
            self.out.write_u16::<LittleEndian>(shndx)?;
            self.out.write_u8(kind)?;
            self.out.write_u8(bind)?;
        }
        entries.push(ShtEntry {
            kind: sht_kind::SYMTAB,
            name_off: 0,
            offset: sym_offset,
            size: (symbols.table_len() * SYM_ENTRY_SIZE) as u32,
        });

        let str_offset = self.pos()?;
        self.out.write_all(strtab.as_bytes())?;
        entries.push(ShtEntry {
            kind: sht_kind::STRTAB,
            name_off: 0,
            offset: str_offset,
            size: strtab.len() as u32,
        });

        let sht_offset = self.pos()?;
        for entry in &entries {
            self.out.write_u8(entry.kind)?;
            self.out.write_u8(0)?;
            self.out.write_u32::<LittleEndian>(entry.name_off)?;
            self.out.write_u32::<LittleEndian>(entry.offset)?;
            self.out.write_u32::<LittleEndian>(entry.size)?;
        }

        self.out.seek(SeekFrom::Start(0))?;
        self.write_header(sht_offset, entries.len() as u16, strtab_id)?;
        self.out.flush()
    }
}
