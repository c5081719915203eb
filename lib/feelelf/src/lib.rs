//! `feelelf` decodes ELF32 and ELF64 images from any seekable byte source. The file header and both header tables
//! are decoded up front; everything that lives behind an offset (names, symbols, notes, relocations, dynamic
//! entries) is read on demand, each read seeking to where it needs to be and putting the cursor back afterwards.
//!
//! ```no_run
//! use feelelf::{symbol::SymbolKind, ElfFile};
//!
//! let mut elf = ElfFile::open("/bin/true")?;
//! println!("{} for {}", elf.header().file_class(), elf.header().machine());
//! for symbol in elf.symbols(SymbolKind::Dynamic)? {
//!     println!("{}", elf.symbol_name(SymbolKind::Dynamic, symbol.name_offset())?);
//! }
//! # Ok::<(), feelelf::ElfError>(())
//! ```

pub mod config;
pub mod dynamic;
pub mod error;
pub mod header;
pub mod note;
pub mod program;
pub mod relocation;
pub mod section;
pub mod source;
pub mod symbol;

pub use crate::{
    config::DecodeOptions,
    error::{ElfError, Result},
    header::{Class, FileHeader},
};

use crate::{
    dynamic::DynamicEntry,
    note::Note,
    program::ProgramHeader,
    relocation::RelocationSection,
    section::{SectionHeader, SectionType},
    source::ByteSource,
    symbol::{Symbol, SymbolKind},
};
use log::{debug, warn};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{self, BufReader, Read, Seek},
    path::{Path, PathBuf},
};

/// A decoded ELF image. The byte source is owned, so nothing else can move its cursor between reads.
pub struct ElfFile<R> {
    source: ByteSource<R>,
    options: DecodeOptions,
    header: FileHeader,
    program_headers: Vec<ProgramHeader>,
    section_headers: Vec<SectionHeader>,
}

impl ElfFile<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ElfFile<BufReader<File>>> {
        ElfFile::open_with(path, DecodeOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: DecodeOptions) -> Result<ElfFile<BufReader<File>>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ElfError::FileNotFound(path.to_path_buf()),
            _ => ElfError::Io(err),
        })?;

        debug!("Opened {}", path.display());
        ElfFile::from_reader_with(BufReader::new(file), options)
    }
}

impl<R> ElfFile<R>
where
    R: Read + Seek,
{
    pub fn from_reader(reader: R) -> Result<ElfFile<R>> {
        ElfFile::from_reader_with(reader, DecodeOptions::default())
    }

    /// Decode the file header and both header tables. Nothing is returned unless all of them decode, so a
    /// caller never sees a partially-constructed file.
    pub fn from_reader_with(reader: R, options: DecodeOptions) -> Result<ElfFile<R>> {
        let mut source = ByteSource::new(reader)?;
        let class = header::detect_class(&mut source)?;
        let header = header::decode_header(&mut source, class)?;
        let program_headers = program::load_program_headers(&mut source, &header)?;
        let section_headers = section::load_section_headers(&mut source, &header)?;

        Ok(ElfFile { source, options, header, program_headers, section_headers })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn class(&self) -> Class {
        self.header.class()
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn program_headers(&self) -> &[ProgramHeader] {
        &self.program_headers
    }

    pub fn section_headers(&self) -> &[SectionHeader] {
        &self.section_headers
    }

    pub fn section_header(&self, index: usize) -> Result<&SectionHeader> {
        self.section_headers.get(index).ok_or(ElfError::InvalidSectionIndex(index))
    }

    /// Give back the underlying reader. Its cursor is where it was when the file was decoded.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Resolve a section's name in the section name string table (`e_shstrndx`).
    pub fn section_name(&mut self, section: &SectionHeader) -> Result<String> {
        section::section_name(
            &mut self.source,
            &self.section_headers,
            usize::from(self.header.string_table_index()),
            section.name_offset(),
            &self.options,
        )
    }

    /// The names of every section, in section-table order.
    pub fn section_names(&mut self) -> Result<Vec<String>> {
        section::section_names(&mut self.source, &self.header, &self.section_headers, &self.options)
    }

    /// Section names for finding sections by name. Sections whose names can't be resolved are left out of the
    /// search.
    fn lookup_names(&mut self) -> Vec<String> {
        section::lookup_names(&mut self.source, &self.header, &self.section_headers, &self.options)
    }

    pub fn section_by_name(&mut self, name: &str) -> Result<Option<SectionHeader>> {
        let names = self.lookup_names();
        Ok(section::find_by_name(&self.section_headers, &names, name).copied())
    }

    /// The contents of a section. `NOBITS` sections (e.g. `.bss`) and the null section occupy no space in the
    /// file, and have no contents.
    pub fn section_data(&mut self, section: &SectionHeader) -> Result<Vec<u8>> {
        match section.section_type() {
            SectionType::Null | SectionType::NoBits => Ok(Vec::new()),
            _ => self.source.read_bytes(section.offset(), section.size()),
        }
    }

    /// Resolve a symbol's name in `.strtab` or `.dynstr`, depending on `kind`.
    pub fn symbol_name(&mut self, kind: SymbolKind, name_offset: u32) -> Result<String> {
        let names = self.lookup_names();
        section::symbol_name(&mut self.source, &self.section_headers, &names, kind, name_offset, &self.options)
    }

    /// The static table is found by its `SYMTAB` type, so it can be read even when section names can't.
    pub fn symbols(&mut self, kind: SymbolKind) -> Result<Vec<Symbol>> {
        let names = match kind {
            SymbolKind::Static => Vec::new(),
            SymbolKind::Dynamic => self.lookup_names(),
        };
        symbol::symbols(&mut self.source, self.header.class(), &self.section_headers, &names, kind, &self.options)
    }

    /// Every note in every `.note*` section, keyed by section name.
    pub fn notes(&mut self) -> Result<BTreeMap<String, Vec<Note>>> {
        let names = self.lookup_names();
        note::notes(&mut self.source, &self.section_headers, &names)
    }

    /// Every relocation in every `.rel*` section, keyed by section name.
    pub fn relocations(&mut self) -> Result<BTreeMap<String, RelocationSection>> {
        let names = self.lookup_names();
        relocation::relocations(&mut self.source, &self.header, &self.section_headers, &names)
    }

    pub fn dynamic_entries(&mut self) -> Result<Vec<DynamicEntry>> {
        dynamic::dynamic_entries(&mut self.source, self.header.class(), &self.section_headers)
    }
}

impl<R> fmt::Debug for ElfFile<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElfFile")
            .field("header", &self.header)
            .field("program_headers", &self.program_headers.len())
            .field("section_headers", &self.section_headers.len())
            .finish()
    }
}

/// Decode each file on its own. A file that fails to decode is reported in its slot and doesn't stop the others
/// from being decoded.
pub fn open_many<I, P>(paths: I) -> Vec<(PathBuf, Result<ElfFile<BufReader<File>>>)>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|path| {
            let path = path.as_ref().to_path_buf();
            let elf = ElfFile::open(&path);
            if let Err(ref err) = elf {
                warn!("Failed to decode {}: {}", path.display(), err);
            }
            (path, elf)
        })
        .collect()
}

/// Render a value with no symbolic name.
pub(crate) fn unknown<T: fmt::LowerHex>(value: T) -> Cow<'static, str> {
    format!("unknown ({:#x})", value).into()
}

/// Extract a null-terminated string from a fixed-size field, such as a note's name. Invalid UTF-8 is replaced
/// rather than rejected.
pub(crate) fn from_utf8_null_terminated(bytes: &[u8]) -> String {
    let null_terminator_index = bytes.iter().position(|&c| c == b'\0').unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[0..null_terminator_index]).into_owned()
}
