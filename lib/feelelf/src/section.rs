use crate::{
    config::DecodeOptions,
    error::{ElfError, Result},
    header::{Class, FileHeader},
    source::ByteSource,
    symbol::SymbolKind,
};
use bit_field::BitField;
use log::debug;
use scroll_derive::Pread;
use std::{
    fmt,
    io::{Read, Seek},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectionType {
    /// The first section in a valid ELF's section table will be a null section. It does not detail
    /// a real section.
    Null,

    /// Contains information defined by the program.
    ProgBits,

    /// Contains a symbol table.
    SymTab,

    /// Contains a string table.
    StrTab,

    /// Contains "Rela"-type relocations.
    Rela,

    /// Contains a symbol hash table.
    Hash,

    /// Contains tables used during dynamic linking.
    Dynamic,

    /// Contains note information.
    Note,

    /// Defines a section as containing uninitialized space. This section does not take up any
    /// space in the file and is usually loaded with `0`s during program loading.
    NoBits,

    /// Contains "Rel"-type relocations.
    Rel,

    /// Reserved, with no defined semantics.
    ShLib,

    /// Contains a dynamic loader symbol table.
    DynSym,

    InitArray,
    FiniArray,
    PreinitArray,
    Group,
    SymTabShndx,

    GnuAttributes,
    GnuHash,
    GnuLibList,
    Checksum,
    SunwMove,
    SunwComdat,
    SunwSyminfo,
    GnuVerdef,
    GnuVerneed,
    GnuVersym,

    /// A section with type `0x60000000` through `0x6fffffff` inclusive is defined to be
    /// environment-specific.
    Os(u32),

    /// A section with type `0x70000000` through `0x7fffffff` inclusive is defined to be
    /// processor-specific.
    Proc(u32),

    /// A section with type `0x80000000` through `0x8fffffff` inclusive is reserved for applications.
    User(u32),

    Unknown(u32),
}

impl From<u32> for SectionType {
    fn from(section_type: u32) -> SectionType {
        match section_type {
            0 => SectionType::Null,
            1 => SectionType::ProgBits,
            2 => SectionType::SymTab,
            3 => SectionType::StrTab,
            4 => SectionType::Rela,
            5 => SectionType::Hash,
            6 => SectionType::Dynamic,
            7 => SectionType::Note,
            8 => SectionType::NoBits,
            9 => SectionType::Rel,
            10 => SectionType::ShLib,
            11 => SectionType::DynSym,
            14 => SectionType::InitArray,
            15 => SectionType::FiniArray,
            16 => SectionType::PreinitArray,
            17 => SectionType::Group,
            18 => SectionType::SymTabShndx,
            0x6ffffff5 => SectionType::GnuAttributes,
            0x6ffffff6 => SectionType::GnuHash,
            0x6ffffff7 => SectionType::GnuLibList,
            0x6ffffff8 => SectionType::Checksum,
            0x6ffffffa => SectionType::SunwMove,
            0x6ffffffb => SectionType::SunwComdat,
            0x6ffffffc => SectionType::SunwSyminfo,
            0x6ffffffd => SectionType::GnuVerdef,
            0x6ffffffe => SectionType::GnuVerneed,
            0x6fffffff => SectionType::GnuVersym,
            0x60000000..=0x6fffffff => SectionType::Os(section_type),
            0x70000000..=0x7fffffff => SectionType::Proc(section_type),
            0x80000000..=0x8fffffff => SectionType::User(section_type),
            other => SectionType::Unknown(other),
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionType::Null => "NULL",
            SectionType::ProgBits => "PROGBITS",
            SectionType::SymTab => "SYMTAB",
            SectionType::StrTab => "STRTAB",
            SectionType::Rela => "RELA",
            SectionType::Hash => "HASH",
            SectionType::Dynamic => "DYNAMIC",
            SectionType::Note => "NOTE",
            SectionType::NoBits => "NOBITS",
            SectionType::Rel => "REL",
            SectionType::ShLib => "SHLIB",
            SectionType::DynSym => "DYNSYM",
            SectionType::InitArray => "INIT_ARRAY",
            SectionType::FiniArray => "FINI_ARRAY",
            SectionType::PreinitArray => "PREINIT_ARRAY",
            SectionType::Group => "GROUP",
            SectionType::SymTabShndx => "SYMTAB_SHNDX",
            SectionType::GnuAttributes => "GNU_ATTRIBUTES",
            SectionType::GnuHash => "GNU_HASH",
            SectionType::GnuLibList => "GNU_LIBLIST",
            SectionType::Checksum => "CHECKSUM",
            SectionType::SunwMove => "SUNW_move",
            SectionType::SunwComdat => "SUNW_COMDAT",
            SectionType::SunwSyminfo => "SUNW_syminfo",
            SectionType::GnuVerdef => "VERDEF",
            SectionType::GnuVerneed => "VERNEED",
            SectionType::GnuVersym => "VERSYM",
            SectionType::Os(value) => return write!(f, "LOOS+{:#x}", value - 0x60000000),
            SectionType::Proc(value) => return write!(f, "LOPROC+{:#x}", value - 0x70000000),
            SectionType::User(value) => return write!(f, "LOUSER+{:#x}", value - 0x80000000),
            SectionType::Unknown(value) => return write!(f, "{}", crate::unknown(*value)),
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Section32 {
    pub name: u32,
    pub section_type: u32,
    pub flags: u32,
    pub address: u32,
    pub offset: u32,
    pub size: u32,
    pub link: u32,
    pub info: u32,
    pub alignment: u32,
    pub entry_size: u32,
}

impl Section32 {
    pub const SIZE: usize = 40;
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Section64 {
    pub name: u32,
    pub section_type: u32,
    pub flags: u64,
    pub address: u64,
    pub offset: u64,
    pub size: u64,

    /// Some sections are 'linked' to another section. This field contains the index of the linked
    /// section.
    pub link: u32,

    /// Can contain extra information about a section.
    pub info: u32,
    pub alignment: u64,

    /// If this section contains a table, this is the size of one entry
    pub entry_size: u64,
}

impl Section64 {
    pub const SIZE: usize = 64;
}

#[derive(Clone, Copy, Debug)]
pub enum SectionHeader {
    Section32(Section32),
    Section64(Section64),
}

macro_rules! widened {
    ($section:expr, $field:ident) => {
        match $section {
            SectionHeader::Section32(section) => u64::from(section.$field),
            SectionHeader::Section64(section) => section.$field,
        }
    };
}

impl SectionHeader {
    /// The offset of this section's name in the section-header string table.
    pub fn name_offset(&self) -> u32 {
        match self {
            SectionHeader::Section32(section) => section.name,
            SectionHeader::Section64(section) => section.name,
        }
    }

    pub fn raw_type(&self) -> u32 {
        match self {
            SectionHeader::Section32(section) => section.section_type,
            SectionHeader::Section64(section) => section.section_type,
        }
    }

    pub fn section_type(&self) -> SectionType {
        SectionType::from(self.raw_type())
    }

    pub fn flags(&self) -> u64 {
        widened!(self, flags)
    }

    pub fn address(&self) -> u64 {
        widened!(self, address)
    }

    pub fn offset(&self) -> u64 {
        widened!(self, offset)
    }

    pub fn size(&self) -> u64 {
        widened!(self, size)
    }

    pub fn link(&self) -> u32 {
        match self {
            SectionHeader::Section32(section) => section.link,
            SectionHeader::Section64(section) => section.link,
        }
    }

    pub fn info(&self) -> u32 {
        match self {
            SectionHeader::Section32(section) => section.info,
            SectionHeader::Section64(section) => section.info,
        }
    }

    pub fn alignment(&self) -> u64 {
        widened!(self, alignment)
    }

    pub fn entry_size(&self) -> u64 {
        widened!(self, entry_size)
    }

    /// Number of entries, for sections that hold a table. Fails if the declared entry size can't hold a record
    /// of `record_size` bytes.
    pub(crate) fn entry_count(&self, name: &str, record_size: usize) -> Result<u64> {
        let entry_size = self.entry_size();
        if entry_size == 0 || entry_size < record_size as u64 {
            return Err(ElfError::InvalidEntrySize { table: name.to_string(), entry_size });
        }
        Ok(self.size() / entry_size)
    }

    /// Whether this section contains writable data
    pub fn is_writable(&self) -> bool {
        self.flags().get_bit(0)
    }

    /// Whether this section should be allocated into the memory image of the program
    pub fn is_allocated(&self) -> bool {
        self.flags().get_bit(1)
    }

    /// Whether this section contains executable instructions
    pub fn is_executable(&self) -> bool {
        self.flags().get_bit(2)
    }

    /// The flags as `readelf` prints them, e.g. `"WA"`.
    pub fn flags_string(&self) -> String {
        section_flags(self.flags())
    }
}

/// Render a section's flags with the letters `readelf` uses.
pub fn section_flags(flags: u64) -> String {
    const LETTERS: [(usize, char); 11] = [
        (0, 'W'),
        (1, 'A'),
        (2, 'X'),
        (4, 'M'),
        (5, 'S'),
        (6, 'I'),
        (7, 'L'),
        (8, 'O'),
        (9, 'G'),
        (10, 'T'),
        (11, 'C'),
    ];

    let mut rendered: String = LETTERS.iter().filter(|(bit, _)| flags.get_bit(*bit)).map(|(_, c)| c).collect();
    if flags.get_bits(20..28) != 0 {
        rendered.push('o');
    }
    if flags.get_bit(31) {
        rendered.push('E');
    }
    if flags.get_bits(28..31) != 0 {
        rendered.push('p');
    }
    rendered
}

/// Read the section header table. Entry `0` is kept, even though it is always the null section, so that indices
/// stored elsewhere in the file (`link`, `info`, symbol section indices) can be used directly.
pub fn load_section_headers<R>(source: &mut ByteSource<R>, header: &FileHeader) -> Result<Vec<SectionHeader>>
where
    R: Read + Seek,
{
    let offset = header.section_header_offset();
    let count = u64::from(header.number_of_section_headers());
    if offset == 0 || count == 0 {
        return Ok(Vec::new());
    }

    let entry_size = u64::from(header.section_header_entry_size());
    let record_size = match header.class() {
        Class::Elf32 => Section32::SIZE,
        Class::Elf64 => Section64::SIZE,
    } as u64;
    if entry_size < record_size {
        return Err(ElfError::InvalidEntrySize { table: "section header table".to_string(), entry_size });
    }

    let headers: Vec<SectionHeader> = match header.class() {
        Class::Elf32 => source
            .read_table::<Section32>(offset, count, entry_size)?
            .into_iter()
            .map(SectionHeader::Section32)
            .collect(),
        Class::Elf64 => source
            .read_table::<Section64>(offset, count, entry_size)?
            .into_iter()
            .map(SectionHeader::Section64)
            .collect(),
    };

    debug!("Loaded {} section headers from {:#x}", headers.len(), offset);
    Ok(headers)
}

/// Resolve a name in the string table held by section `string_table_index` (normally the header's
/// `e_shstrndx`).
pub fn section_name<R>(
    source: &mut ByteSource<R>,
    sections: &[SectionHeader],
    string_table_index: usize,
    name_offset: u32,
    options: &DecodeOptions,
) -> Result<String>
where
    R: Read + Seek,
{
    /*
     * Index `0` is `SHN_UNDEF`, which is used to signal that the file has no section name string table.
     */
    let string_table = match sections.get(string_table_index) {
        Some(section) if string_table_index != 0 => section,
        _ => return Err(ElfError::MissingStringTable(".shstrtab")),
    };

    read_name(source, string_table, name_offset, options)
}

/// Read the NUL-terminated string `name_offset` bytes into `string_table`.
fn read_name<R>(
    source: &mut ByteSource<R>,
    string_table: &SectionHeader,
    name_offset: u32,
    options: &DecodeOptions,
) -> Result<String>
where
    R: Read + Seek,
{
    let offset = string_table
        .offset()
        .checked_add(u64::from(name_offset))
        .ok_or(ElfError::TruncatedName { offset: string_table.offset() })?;
    source.read_str(offset, options.max_name_length)
}

/// Resolve every section's name, in section-table order.
pub fn section_names<R>(
    source: &mut ByteSource<R>,
    header: &FileHeader,
    sections: &[SectionHeader],
    options: &DecodeOptions,
) -> Result<Vec<String>>
where
    R: Read + Seek,
{
    let string_table_index = usize::from(header.string_table_index());
    sections
        .iter()
        .map(|section| section_name(source, sections, string_table_index, section.name_offset(), options))
        .collect()
}

/// Resolve every section's name for a scan that looks sections up by name. A section whose name can't be resolved
/// is given an empty name, so it never matches, instead of failing the whole scan.
pub fn lookup_names<R>(
    source: &mut ByteSource<R>,
    header: &FileHeader,
    sections: &[SectionHeader],
    options: &DecodeOptions,
) -> Vec<String>
where
    R: Read + Seek,
{
    let string_table_index = usize::from(header.string_table_index());
    sections
        .iter()
        .enumerate()
        .map(|(index, section)| {
            section_name(source, sections, string_table_index, section.name_offset(), options).unwrap_or_else(|err| {
                debug!("Skipping section {} in name lookups: {}", index, err);
                String::new()
            })
        })
        .collect()
}

/// Find the first section called `name`. `names` must be the resolved names of `sections`, in the same order.
pub fn find_by_name<'s>(sections: &'s [SectionHeader], names: &[String], name: &str) -> Option<&'s SectionHeader> {
    sections.iter().zip(names).find(|(_, section_name)| *section_name == name).map(|(section, _)| section)
}

/// Resolve a symbol's name in `.strtab` (for static symbols) or `.dynstr` (for dynamic symbols).
pub fn symbol_name<R>(
    source: &mut ByteSource<R>,
    sections: &[SectionHeader],
    names: &[String],
    kind: SymbolKind,
    name_offset: u32,
    options: &DecodeOptions,
) -> Result<String>
where
    R: Read + Seek,
{
    let table_name = kind.string_table_name();
    let string_table =
        find_by_name(sections, names, table_name).ok_or(ElfError::MissingStringTable(table_name))?;

    if options.strict_table_types && string_table.section_type() != SectionType::StrTab {
        return Err(ElfError::InvalidStringTable);
    }

    read_name(source, string_table, name_offset, options)
}

#[test]
fn test_section_flags() {
    assert_eq!(section_flags(0x3), "WA");
    assert_eq!(section_flags(0x6), "AX");
    assert_eq!(section_flags(0x30), "MS");
    assert_eq!(section_flags(0x42), "AI");
    assert_eq!(section_flags(0x402), "AT");
    assert_eq!(section_flags(0x0010_0000), "o");
    assert_eq!(section_flags(0x8000_0000), "E");
    assert_eq!(section_flags(0x1000_0002), "Ap");
    assert_eq!(section_flags(0), "");
}

#[test]
fn test_section_type() {
    assert_eq!(SectionType::from(2).to_string(), "SYMTAB");
    assert_eq!(SectionType::from(0x6ffffff6).to_string(), "GNU_HASH");
    assert_eq!(SectionType::from(0x6fffffff).to_string(), "VERSYM");
    assert_eq!(SectionType::from(0x70000003), SectionType::Proc(0x70000003));
    assert_eq!(SectionType::from(0x80000001).to_string(), "LOUSER+0x1");
    assert_eq!(SectionType::from(12).to_string(), "unknown (0xc)");
}

#[test]
fn test_string_table_offset_overflow() {
    let mut source = ByteSource::new(std::io::Cursor::new(vec![0u8; 64])).unwrap();
    let string_table = Section64 {
        name: 0,
        section_type: 3,
        flags: 0,
        address: 0,
        offset: u64::MAX - 2,
        size: 0x20,
        link: 0,
        info: 0,
        alignment: 1,
        entry_size: 0,
    };
    let sections = [
        SectionHeader::Section64(Section64 { offset: 0, ..string_table }),
        SectionHeader::Section64(string_table),
    ];

    assert!(matches!(
        section_name(&mut source, &sections, 1, 0x10, &DecodeOptions::default()),
        Err(ElfError::TruncatedName { offset }) if offset == u64::MAX - 2
    ));
    // In range of the offset, but not of the image
    assert!(matches!(
        section_name(&mut source, &sections, 1, 0, &DecodeOptions::default()),
        Err(ElfError::TruncatedName { .. })
    ));
}
