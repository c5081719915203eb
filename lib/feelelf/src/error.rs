use std::{fmt, io, path::PathBuf};

pub type Result<T> = core::result::Result<T, ElfError>;

#[derive(Debug)]
#[non_exhaustive]
pub enum ElfError {
    /*
     * Errors that can be produced opening a file.
     */
    FileNotFound(PathBuf),
    Io(io::Error),

    /*
     * Errors that can be produced parsing the identification block and header.
     */
    /// The magic number at the beginning of the file (should be `0x7f, 'E', 'L', 'F'`) is incorrect, or the file
    /// is too short to hold it.
    NotAnElfFile,
    /// The class byte (`e_ident[4]`) is not `1` (32-bit) or `2` (64-bit).
    UnsupportedClass(u8),
    /// The data encoding byte (`e_ident[5]`) is not `1` (little-endian) or `2` (big-endian).
    UnsupportedEncoding(u8),

    /*
     * Errors that can be produced reading records and strings.
     */
    /// Fewer bytes were available at `offset` than a fixed-size read required.
    TruncatedRead { offset: u64, wanted: u64 },
    /// No NUL terminator was found for the string starting at `offset`.
    TruncatedName { offset: u64 },
    /// A record was long enough, but `scroll` could not decode it.
    Malformed(scroll::Error),

    /*
     * Errors that can be produced resolving sections.
     */
    /// A string table needed for name resolution is absent.
    MissingStringTable(&'static str),
    /// A table's declared entry size is zero, or too small to hold one record.
    InvalidEntrySize { table: String, entry_size: u64 },
    InvalidSectionIndex(usize),
    /// The section that should hold symbols does not have a symbol-table type.
    InvalidSymbolTable,
    /// The section that should hold names does not have the `STRTAB` type.
    InvalidStringTable,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfError::FileNotFound(path) => write!(f, "'{}': No such file", path.display()),
            ElfError::Io(err) => write!(f, "I/O error: {}", err),
            ElfError::NotAnElfFile => write!(f, "Not an ELF file - it has the wrong magic bytes at the start"),
            ElfError::UnsupportedClass(class) => write!(f, "Unsupported ELF class: {:#x}", class),
            ElfError::UnsupportedEncoding(encoding) => write!(f, "Unsupported data encoding: {:#x}", encoding),
            ElfError::TruncatedRead { offset, wanted } => {
                write!(f, "Truncated read: wanted {} bytes at offset {:#x}", wanted, offset)
            }
            ElfError::TruncatedName { offset } => write!(f, "Unterminated string at offset {:#x}", offset),
            ElfError::Malformed(err) => write!(f, "Malformed record: {}", err),
            ElfError::MissingStringTable(name) => write!(f, "Missing string table: {}", name),
            ElfError::InvalidEntrySize { table, entry_size } => {
                write!(f, "Invalid entry size {} for {}", entry_size, table)
            }
            ElfError::InvalidSectionIndex(index) => write!(f, "Section index {} is out of range", index),
            ElfError::InvalidSymbolTable => write!(f, "Symbol table section does not have a symbol table type"),
            ElfError::InvalidStringTable => write!(f, "String table section does not have the STRTAB type"),
        }
    }
}

impl std::error::Error for ElfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ElfError::Io(err) => Some(err),
            ElfError::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ElfError {
    fn from(err: io::Error) -> ElfError {
        ElfError::Io(err)
    }
}

impl From<scroll::Error> for ElfError {
    fn from(err: scroll::Error) -> ElfError {
        ElfError::Malformed(err)
    }
}
