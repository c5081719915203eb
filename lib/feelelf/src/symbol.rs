use crate::{
    config::DecodeOptions,
    error::{ElfError, Result},
    header::Class,
    section::{self, SectionHeader, SectionType},
    source::ByteSource,
};
use bit_field::BitField;
use log::debug;
use scroll_derive::Pread;
use std::{
    fmt,
    io::{Read, Seek},
};

/// Which symbol table to read.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    /// `.symtab`, the full table used by the static linker.
    Static,

    /// `.dynsym`, the subset needed by the dynamic linker.
    Dynamic,
}

impl SymbolKind {
    /// The section holding the names of this kind of symbol.
    pub fn string_table_name(self) -> &'static str {
        match self {
            SymbolKind::Static => ".strtab",
            SymbolKind::Dynamic => ".dynstr",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolBinding {
    /// Only visible inside the object file that defines it.
    Local,

    /// Global symbol - visible to all object files.
    Global,

    /// Global scope, but with a lower precedence than global symbols.
    Weak,

    /// A global symbol that the dynamic linker makes unique across the whole process.
    GnuUnique,

    /// `STB_NUM`, the count of generic bindings. No symbol should have it.
    Num,

    /// Environment-specific use.
    Os(u8),

    /// Processor-specific use.
    Proc(u8),

    Unknown(u8),
}

impl fmt::Display for SymbolBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolBinding::Local => write!(f, "LOCAL"),
            SymbolBinding::Global => write!(f, "GLOBAL"),
            SymbolBinding::Weak => write!(f, "WEAK"),
            SymbolBinding::GnuUnique => write!(f, "UNIQUE"),
            SymbolBinding::Num => write!(f, "NUM"),
            SymbolBinding::Os(value) => write!(f, "<OS specific>: {}", value),
            SymbolBinding::Proc(value) => write!(f, "<processor specific>: {}", value),
            SymbolBinding::Unknown(value) => write!(f, "<unknown>: {}", value),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolType {
    NoType,
    Object,
    Func,
    Section,
    File,
    Common,
    Tls,

    /// An indirect function, resolved by calling it at load time.
    GnuIfunc,

    /// `STT_NUM`, the count of generic types.
    Num,

    Os(u8),
    Proc(u8),
    Unknown(u8),
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolType::NoType => write!(f, "NOTYPE"),
            SymbolType::Object => write!(f, "OBJECT"),
            SymbolType::Func => write!(f, "FUNC"),
            SymbolType::Section => write!(f, "SECTION"),
            SymbolType::File => write!(f, "FILE"),
            SymbolType::Common => write!(f, "COMMON"),
            SymbolType::Tls => write!(f, "TLS"),
            SymbolType::GnuIfunc => write!(f, "IFUNC"),
            SymbolType::Num => write!(f, "NUM"),
            SymbolType::Os(value) => write!(f, "<OS specific>: {}", value),
            SymbolType::Proc(value) => write!(f, "<processor specific>: {}", value),
            SymbolType::Unknown(value) => write!(f, "<unknown>: {}", value),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolVisibility {
    Default,
    Internal,
    Hidden,
    Protected,
}

impl fmt::Display for SymbolVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolVisibility::Default => write!(f, "DEFAULT"),
            SymbolVisibility::Internal => write!(f, "INTERNAL"),
            SymbolVisibility::Hidden => write!(f, "HIDDEN"),
            SymbolVisibility::Protected => write!(f, "PROTECTED"),
        }
    }
}

pub fn symbol_binding(info: u8) -> SymbolBinding {
    let binding = info.get_bits(4..8);
    match binding {
        0 => SymbolBinding::Local,
        1 => SymbolBinding::Global,
        2 => SymbolBinding::Weak,
        3 => SymbolBinding::Num,
        10 => SymbolBinding::GnuUnique,
        11..=12 => SymbolBinding::Os(binding),
        13..=15 => SymbolBinding::Proc(binding),
        _ => SymbolBinding::Unknown(binding),
    }
}

pub fn symbol_type(info: u8) -> SymbolType {
    let symbol_type = info.get_bits(0..4);
    match symbol_type {
        0 => SymbolType::NoType,
        1 => SymbolType::Object,
        2 => SymbolType::Func,
        3 => SymbolType::Section,
        4 => SymbolType::File,
        5 => SymbolType::Common,
        6 => SymbolType::Tls,
        7 => SymbolType::Num,
        10 => SymbolType::GnuIfunc,
        11..=12 => SymbolType::Os(symbol_type),
        13..=15 => SymbolType::Proc(symbol_type),
        _ => SymbolType::Unknown(symbol_type),
    }
}

pub fn symbol_visibility(other: u8) -> SymbolVisibility {
    match other.get_bits(0..2) {
        0 => SymbolVisibility::Default,
        1 => SymbolVisibility::Internal,
        2 => SymbolVisibility::Hidden,
        _ => SymbolVisibility::Protected,
    }
}

/// 32-bit symbol. `value` and `size` come before `info` in this layout.
#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Symbol32 {
    pub name: u32,
    pub value: u32,
    pub size: u32,
    pub info: u8,
    pub other: u8,
    pub section_table_index: u16,
}

impl Symbol32 {
    pub const SIZE: usize = 16;
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Symbol64 {
    /// The offset into the string table, in bytes, to the symbol name. If this is `0`, the symbol
    /// doesn't have a name.
    pub name: u32,
    pub info: u8,
    pub other: u8,
    pub section_table_index: u16,
    pub value: u64,
    pub size: u64,
}

impl Symbol64 {
    pub const SIZE: usize = 24;
}

#[derive(Clone, Copy, Debug)]
pub enum Symbol {
    Symbol32(Symbol32),
    Symbol64(Symbol64),
}

impl Symbol {
    pub fn name_offset(&self) -> u32 {
        match self {
            Symbol::Symbol32(symbol) => symbol.name,
            Symbol::Symbol64(symbol) => symbol.name,
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            Symbol::Symbol32(symbol) => u64::from(symbol.value),
            Symbol::Symbol64(symbol) => symbol.value,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Symbol::Symbol32(symbol) => u64::from(symbol.size),
            Symbol::Symbol64(symbol) => symbol.size,
        }
    }

    pub fn info(&self) -> u8 {
        match self {
            Symbol::Symbol32(symbol) => symbol.info,
            Symbol::Symbol64(symbol) => symbol.info,
        }
    }

    pub fn other(&self) -> u8 {
        match self {
            Symbol::Symbol32(symbol) => symbol.other,
            Symbol::Symbol64(symbol) => symbol.other,
        }
    }

    pub fn section_index(&self) -> u16 {
        match self {
            Symbol::Symbol32(symbol) => symbol.section_table_index,
            Symbol::Symbol64(symbol) => symbol.section_table_index,
        }
    }

    pub fn binding(&self) -> SymbolBinding {
        symbol_binding(self.info())
    }

    pub fn symbol_type(&self) -> SymbolType {
        symbol_type(self.info())
    }

    pub fn visibility(&self) -> SymbolVisibility {
        symbol_visibility(self.other())
    }
}

/// Read the static (`SYMTAB`-typed) or dynamic (`.dynsym`) symbol table. A file without the table has no
/// symbols of that kind, which isn't an error.
pub fn symbols<R>(
    source: &mut ByteSource<R>,
    class: Class,
    sections: &[SectionHeader],
    names: &[String],
    kind: SymbolKind,
    options: &DecodeOptions,
) -> Result<Vec<Symbol>>
where
    R: Read + Seek,
{
    let table = match kind {
        SymbolKind::Static => sections.iter().find(|section| section.section_type() == SectionType::SymTab),
        SymbolKind::Dynamic => section::find_by_name(sections, names, ".dynsym"),
    };
    let table = match table {
        Some(table) => table,
        None => return Ok(Vec::new()),
    };

    if options.strict_table_types && kind == SymbolKind::Dynamic && table.section_type() != SectionType::DynSym {
        return Err(ElfError::InvalidSymbolTable);
    }

    let record_size = match class {
        Class::Elf32 => Symbol32::SIZE,
        Class::Elf64 => Symbol64::SIZE,
    };
    let table_name = match kind {
        SymbolKind::Static => ".symtab",
        SymbolKind::Dynamic => ".dynsym",
    };
    let count = table.entry_count(table_name, record_size)?;
    let entry_size = table.entry_size();

    let symbols: Vec<Symbol> = match class {
        Class::Elf32 => source
            .read_table::<Symbol32>(table.offset(), count, entry_size)?
            .into_iter()
            .map(Symbol::Symbol32)
            .collect(),
        Class::Elf64 => source
            .read_table::<Symbol64>(table.offset(), count, entry_size)?
            .into_iter()
            .map(Symbol::Symbol64)
            .collect(),
    };

    debug!("Read {} symbols from {}", symbols.len(), table_name);
    Ok(symbols)
}

#[test]
fn test_symbol_info() {
    // GLOBAL FUNC
    assert_eq!(symbol_type(0x12), SymbolType::Func);
    assert_eq!(symbol_binding(0x12), SymbolBinding::Global);

    // WEAK OBJECT
    assert_eq!(symbol_type(0x21), SymbolType::Object);
    assert_eq!(symbol_binding(0x21), SymbolBinding::Weak);

    assert_eq!(symbol_type(0x0a), SymbolType::GnuIfunc);
    assert_eq!(symbol_binding(0xa0), SymbolBinding::GnuUnique);
    assert_eq!(symbol_type(0x0b), SymbolType::Os(11));
    assert_eq!(symbol_type(0x0d), SymbolType::Proc(13));
    assert_eq!(symbol_binding(0xf0), SymbolBinding::Proc(15));
    assert_eq!(symbol_type(0x08), SymbolType::Unknown(8));
    assert_eq!(symbol_binding(0x40), SymbolBinding::Unknown(4));
    assert_eq!(symbol_type(0x07), SymbolType::Num);
    assert_eq!(symbol_type(0x07).to_string(), "NUM");
    assert_eq!(symbol_binding(0x30), SymbolBinding::Num);
    assert_eq!(symbol_binding(0x30).to_string(), "NUM");
}

#[test]
fn test_symbol_visibility() {
    assert_eq!(symbol_visibility(0), SymbolVisibility::Default);
    assert_eq!(symbol_visibility(2), SymbolVisibility::Hidden);
    // Only the low two bits carry the visibility
    assert_eq!(symbol_visibility(0xf3), SymbolVisibility::Protected);
    assert_eq!(SymbolVisibility::Internal.to_string(), "INTERNAL");
}
