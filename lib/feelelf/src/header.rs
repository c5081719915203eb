use crate::{
    error::{ElfError, Result},
    source::ByteSource,
};
use log::debug;
use scroll::Endian;
use scroll_derive::Pread;
use std::{
    borrow::Cow,
    fmt,
    io::{Read, Seek},
};

pub const MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const IDENT_SIZE: usize = 16;

const CLASS_INDEX: usize = 4;
const DATA_INDEX: usize = 5;
const VERSION_INDEX: usize = 6;
const OS_ABI_INDEX: usize = 7;
const ABI_VERSION_INDEX: usize = 8;

/// Whether the file uses the 32-bit or 64-bit layout. This is decided once, from the identification block, and
/// selects the layout of every structure read afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    pub fn from_byte(class: u8) -> Result<Class> {
        match class {
            1 => Ok(Class::Elf32),
            2 => Ok(Class::Elf64),
            other => Err(ElfError::UnsupportedClass(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Class::Elf32 => "ELF32",
            Class::Elf64 => "ELF64",
        }
    }
}

/// The byte order of multi-byte fields.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Encoding {
    Little,
    Big,
}

impl Encoding {
    pub fn from_byte(encoding: u8) -> Result<Encoding> {
        match encoding {
            1 => Ok(Encoding::Little),
            2 => Ok(Encoding::Big),
            other => Err(ElfError::UnsupportedEncoding(other)),
        }
    }

    pub fn endian(self) -> Endian {
        match self {
            Encoding::Little => Endian::Little,
            Encoding::Big => Endian::Big,
        }
    }
}

/// The first 16 bytes of the file, `e_ident`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Identification(pub [u8; IDENT_SIZE]);

impl Identification {
    pub fn is_elf(&self) -> bool {
        self.0[0..4] == MAGIC
    }

    pub fn class(&self) -> Result<Class> {
        Class::from_byte(self.0[CLASS_INDEX])
    }

    pub fn encoding(&self) -> Result<Encoding> {
        Encoding::from_byte(self.0[DATA_INDEX])
    }

    pub fn version(&self) -> u8 {
        self.0[VERSION_INDEX]
    }

    pub fn os_abi(&self) -> u8 {
        self.0[OS_ABI_INDEX]
    }

    pub fn abi_version(&self) -> u8 {
        self.0[ABI_VERSION_INDEX]
    }
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Header32 {
    pub ident: [u8; 16],
    pub file_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry_point: u32,
    pub program_header_offset: u32,
    pub section_header_offset: u32,
    pub flags: u32,
    pub header_size: u16,
    pub program_header_entry_size: u16,
    pub number_of_program_headers: u16,
    pub section_header_entry_size: u16,
    pub number_of_section_headers: u16,

    /// This is the section index of the string table that contains the names of the sections.
    pub string_table_index: u16,
}

impl Header32 {
    pub const SIZE: usize = 52;
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Header64 {
    pub ident: [u8; 16],
    pub file_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry_point: u64,
    pub program_header_offset: u64,
    pub section_header_offset: u64,
    pub flags: u32,
    pub header_size: u16,
    pub program_header_entry_size: u16,
    pub number_of_program_headers: u16,
    pub section_header_entry_size: u16,
    pub number_of_section_headers: u16,
    pub string_table_index: u16,
}

impl Header64 {
    pub const SIZE: usize = 64;
}

/// The ELF file header, in whichever layout the file's class selects.
#[derive(Clone, Copy, Debug)]
pub enum FileHeader {
    Elf32(Header32),
    Elf64(Header64),
}

/// Read a field that has the same width in both layouts.
macro_rules! field {
    ($header:expr, $field:ident) => {
        match $header {
            FileHeader::Elf32(header) => header.$field,
            FileHeader::Elf64(header) => header.$field,
        }
    };
}

impl FileHeader {
    pub fn class(&self) -> Class {
        match self {
            FileHeader::Elf32(_) => Class::Elf32,
            FileHeader::Elf64(_) => Class::Elf64,
        }
    }

    pub fn identification(&self) -> Identification {
        Identification(field!(self, ident))
    }

    /// `"ELF32"` or `"ELF64"`.
    pub fn file_class(&self) -> &'static str {
        self.class().name()
    }

    pub fn encoding(&self) -> Result<Encoding> {
        self.identification().encoding()
    }

    pub fn data_encoding(&self) -> Cow<'static, str> {
        match self.identification().0[DATA_INDEX] {
            0 => "None".into(),
            1 => "2's complement, little endian".into(),
            2 => "2's complement, big endian".into(),
            other => crate::unknown(other),
        }
    }

    pub fn file_version(&self) -> Cow<'static, str> {
        match self.identification().version() {
            0 => "0 (Invalid)".into(),
            1 => "1 (Current)".into(),
            other => crate::unknown(other),
        }
    }

    pub fn os_abi(&self) -> Cow<'static, str> {
        os_abi_name(self.identification().os_abi())
    }

    pub fn abi_version(&self) -> u8 {
        self.identification().abi_version()
    }

    pub fn object_type(&self) -> ObjectType {
        ObjectType::from(field!(self, file_type))
    }

    pub fn machine(&self) -> Machine {
        Machine(field!(self, machine))
    }

    pub fn version(&self) -> u32 {
        field!(self, version)
    }

    pub fn entry_point(&self) -> u64 {
        match self {
            FileHeader::Elf32(header) => u64::from(header.entry_point),
            FileHeader::Elf64(header) => header.entry_point,
        }
    }

    pub fn program_header_offset(&self) -> u64 {
        match self {
            FileHeader::Elf32(header) => u64::from(header.program_header_offset),
            FileHeader::Elf64(header) => header.program_header_offset,
        }
    }

    pub fn section_header_offset(&self) -> u64 {
        match self {
            FileHeader::Elf32(header) => u64::from(header.section_header_offset),
            FileHeader::Elf64(header) => header.section_header_offset,
        }
    }

    pub fn flags(&self) -> u32 {
        field!(self, flags)
    }

    pub fn header_size(&self) -> u16 {
        field!(self, header_size)
    }

    pub fn program_header_entry_size(&self) -> u16 {
        field!(self, program_header_entry_size)
    }

    pub fn number_of_program_headers(&self) -> u16 {
        field!(self, number_of_program_headers)
    }

    pub fn section_header_entry_size(&self) -> u16 {
        field!(self, section_header_entry_size)
    }

    pub fn number_of_section_headers(&self) -> u16 {
        field!(self, number_of_section_headers)
    }

    pub fn string_table_index(&self) -> u16 {
        field!(self, string_table_index)
    }
}

/// Read the identification block and check the magic. On success, the source's byte order is set from the data
/// encoding byte, so every later read decodes fields correctly.
pub fn identify<R>(source: &mut ByteSource<R>) -> Result<Identification>
where
    R: Read + Seek,
{
    if source.len() < MAGIC.len() as u64 {
        return Err(ElfError::NotAnElfFile);
    }
    if source.read_bytes(0, MAGIC.len() as u64)? != MAGIC {
        return Err(ElfError::NotAnElfFile);
    }

    let mut ident = [0u8; IDENT_SIZE];
    ident.copy_from_slice(&source.read_bytes(0, IDENT_SIZE as u64)?);
    let ident = Identification(ident);

    source.set_endian(ident.encoding()?.endian());
    Ok(ident)
}

/// Check the magic and work out whether the file is 32- or 64-bit.
pub fn detect_class<R>(source: &mut ByteSource<R>) -> Result<Class>
where
    R: Read + Seek,
{
    let class = identify(source)?.class()?;
    debug!("Detected {} image", class.name());
    Ok(class)
}

/// Decode the file header, in the layout for `class`. This always reads from the start of the file, so it can be
/// called again safely.
pub fn decode_header<R>(source: &mut ByteSource<R>, class: Class) -> Result<FileHeader>
where
    R: Read + Seek,
{
    Ok(match class {
        Class::Elf32 => FileHeader::Elf32(source.read_record::<Header32>(0, Header32::SIZE)?),
        Class::Elf64 => FileHeader::Elf64(source.read_record::<Header64>(0, Header64::SIZE)?),
    })
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ObjectType {
    None,
    Relocatable,
    Executable,
    SharedObject,
    Core,

    /// Types `0xfe00` through `0xfeff` inclusive are environment-specific.
    Os(u16),

    /// Types `0xff00` through `0xffff` inclusive are processor-specific.
    Proc(u16),

    Unknown(u16),
}

impl From<u16> for ObjectType {
    fn from(file_type: u16) -> ObjectType {
        match file_type {
            0 => ObjectType::None,
            1 => ObjectType::Relocatable,
            2 => ObjectType::Executable,
            3 => ObjectType::SharedObject,
            4 => ObjectType::Core,
            0xfe00..=0xfeff => ObjectType::Os(file_type),
            0xff00..=0xffff => ObjectType::Proc(file_type),
            other => ObjectType::Unknown(other),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::None => write!(f, "No file type"),
            ObjectType::Relocatable => write!(f, "Relocatable file"),
            ObjectType::Executable => write!(f, "Executable file"),
            ObjectType::SharedObject => write!(f, "Shared object file"),
            ObjectType::Core => write!(f, "Core file"),
            ObjectType::Os(value) => write!(f, "OS specific ({:#x})", value),
            ObjectType::Proc(value) => write!(f, "Processor specific ({:#x})", value),
            ObjectType::Unknown(value) => write!(f, "{}", crate::unknown(*value)),
        }
    }
}

/// The target architecture, `e_machine`. This is kept as the raw code because there are far more machines than
/// we can name; unnamed ones still round-trip.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Machine(pub u16);

impl Machine {
    pub const NONE: Machine = Machine(0);
    pub const M32: Machine = Machine(1);
    pub const SPARC: Machine = Machine(2);
    pub const I386: Machine = Machine(3);
    pub const M68K: Machine = Machine(4);
    pub const M88K: Machine = Machine(5);
    pub const I860: Machine = Machine(7);
    pub const MIPS: Machine = Machine(8);
    pub const PARISC: Machine = Machine(15);
    pub const SPARC32PLUS: Machine = Machine(18);
    pub const PPC: Machine = Machine(20);
    pub const PPC64: Machine = Machine(21);
    pub const S390: Machine = Machine(22);
    pub const ARM: Machine = Machine(40);
    pub const SH: Machine = Machine(42);
    pub const SPARCV9: Machine = Machine(43);
    pub const IA_64: Machine = Machine(50);
    pub const X86_64: Machine = Machine(62);
    pub const VAX: Machine = Machine(75);
    pub const AARCH64: Machine = Machine(183);
    pub const RISCV: Machine = Machine(243);

    pub fn name(self) -> Cow<'static, str> {
        match self {
            Machine::NONE => "An unknown machine".into(),
            Machine::M32 => "AT&T WE 32100".into(),
            Machine::SPARC => "Sun Microsystems SPARC".into(),
            Machine::I386 => "Intel 80386".into(),
            Machine::M68K => "Motorola 68000".into(),
            Machine::M88K => "Motorola 88000".into(),
            Machine::I860 => "Intel 80860".into(),
            Machine::MIPS => "MIPS RS3000 (big-endian only)".into(),
            Machine::PARISC => "HP/PA".into(),
            Machine::SPARC32PLUS => "SPARC with enhanced instruction set".into(),
            Machine::PPC => "PowerPC".into(),
            Machine::PPC64 => "PowerPC 64-bit".into(),
            Machine::S390 => "IBM S/390".into(),
            Machine::ARM => "Advanced RISC Machines".into(),
            Machine::SH => "Renesas SuperH".into(),
            Machine::SPARCV9 => "SPARC v9 64-bit".into(),
            Machine::IA_64 => "Intel Itanium".into(),
            Machine::X86_64 => "AMD x86-64".into(),
            Machine::VAX => "DEC Vax".into(),
            Machine::AARCH64 => "ARM AArch64".into(),
            Machine::RISCV => "RISC-V".into(),
            Machine(other) => crate::unknown(other),
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub fn os_abi_name(os_abi: u8) -> Cow<'static, str> {
    match os_abi {
        0 => "UNIX System V ABI".into(),
        1 => "HP-UX".into(),
        2 => "NetBSD".into(),
        3 => "Object uses GNU ELF extensions".into(),
        6 => "Sun Solaris".into(),
        7 => "IBM AIX".into(),
        8 => "SGI Irix".into(),
        9 => "FreeBSD".into(),
        10 => "Compaq TRU64 UNIX".into(),
        11 => "Novell Modesto".into(),
        12 => "OpenBSD".into(),
        64 => "ARM EABI".into(),
        97 => "ARM".into(),
        255 => "Standalone (embedded) application".into(),
        other => crate::unknown(other),
    }
}

#[test]
fn test_object_type() {
    assert_eq!(ObjectType::from(2), ObjectType::Executable);
    assert_eq!(ObjectType::from(0xfe10), ObjectType::Os(0xfe10));
    assert_eq!(ObjectType::from(0xff00).to_string(), "Processor specific (0xff00)");
    assert_eq!(ObjectType::from(9).to_string(), "unknown (0x9)");
}

#[test]
fn test_lookup_fallbacks() {
    assert_eq!(Machine(62).name(), "AMD x86-64");
    assert_eq!(Machine(0x1234).name(), "unknown (0x1234)");
    assert_eq!(os_abi_name(3), "Object uses GNU ELF extensions");
    assert_eq!(os_abi_name(200), "unknown (0xc8)");
}

#[test]
fn test_identification() {
    let mut ident = [0u8; IDENT_SIZE];
    ident[..4].copy_from_slice(&MAGIC);
    ident[CLASS_INDEX] = 2;
    ident[DATA_INDEX] = 2;
    let ident = Identification(ident);

    assert!(ident.is_elf());
    assert_eq!(ident.class().unwrap(), Class::Elf64);
    assert_eq!(ident.encoding().unwrap().endian(), Endian::Big);
    assert!(matches!(Class::from_byte(3), Err(ElfError::UnsupportedClass(3))));
    assert!(matches!(Encoding::from_byte(0), Err(ElfError::UnsupportedEncoding(0))));
}
