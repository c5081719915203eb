use crate::{
    error::{ElfError, Result},
    header::{Class, FileHeader},
    source::ByteSource,
};
use bit_field::BitField;
use log::debug;
use scroll_derive::Pread;
use std::{
    fmt,
    io::{Read, Seek},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SegmentType {
    Null,
    Load,
    Dynamic,
    Interp,
    Note,
    Shlib,
    Phdr,
    Tls,

    /// `PT_NUM`, the count of generic segment types.
    Num,

    GnuEhFrame,
    GnuStack,
    GnuRelro,
    GnuProperty,
    SunwBss,
    SunwStack,

    /// A segment with type `0x60000000` through `0x6fffffff` inclusive is defined to be
    /// environment-specific.
    Os(u32),

    /// A segment with type `0x70000000` through `0x7fffffff` inclusive is defined to be
    /// processor-specific.
    Proc(u32),

    Unknown(u32),
}

impl From<u32> for SegmentType {
    fn from(segment_type: u32) -> SegmentType {
        match segment_type {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interp,
            4 => SegmentType::Note,
            5 => SegmentType::Shlib,
            6 => SegmentType::Phdr,
            7 => SegmentType::Tls,
            8 => SegmentType::Num,
            0x6474e550 => SegmentType::GnuEhFrame,
            0x6474e551 => SegmentType::GnuStack,
            0x6474e552 => SegmentType::GnuRelro,
            0x6474e553 => SegmentType::GnuProperty,
            0x6ffffffa => SegmentType::SunwBss,
            0x6ffffffb => SegmentType::SunwStack,
            0x60000000..=0x6fffffff => SegmentType::Os(segment_type),
            0x70000000..=0x7fffffff => SegmentType::Proc(segment_type),
            other => SegmentType::Unknown(other),
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentType::Null => write!(f, "NULL"),
            SegmentType::Load => write!(f, "LOAD"),
            SegmentType::Dynamic => write!(f, "DYNAMIC"),
            SegmentType::Interp => write!(f, "INTERP"),
            SegmentType::Note => write!(f, "NOTE"),
            SegmentType::Shlib => write!(f, "SHLIB"),
            SegmentType::Phdr => write!(f, "PHDR"),
            SegmentType::Tls => write!(f, "TLS"),
            SegmentType::Num => write!(f, "NUM"),
            SegmentType::GnuEhFrame => write!(f, "GNU_EH_FRAME"),
            SegmentType::GnuStack => write!(f, "GNU_STACK"),
            SegmentType::GnuRelro => write!(f, "GNU_RELRO"),
            SegmentType::GnuProperty => write!(f, "GNU_PROPERTY"),
            SegmentType::SunwBss => write!(f, "SUNWBSS"),
            SegmentType::SunwStack => write!(f, "SUNWSTACK"),
            SegmentType::Os(value) => write!(f, "LOOS+{:#x}", value - 0x60000000),
            SegmentType::Proc(value) => write!(f, "LOPROC+{:#x}", value - 0x70000000),
            SegmentType::Unknown(value) => write!(f, "{}", crate::unknown(*value)),
        }
    }
}

/// 32-bit program header. `flags` comes after `mem_size` in this layout.
#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Segment32 {
    pub segment_type: u32,
    pub offset: u32,
    pub virtual_address: u32,
    pub physical_address: u32,
    pub file_size: u32,
    pub mem_size: u32,
    pub flags: u32,
    pub alignment: u32,
}

impl Segment32 {
    pub const SIZE: usize = 32;
}

/// 64-bit program header. `flags` comes straight after `segment_type` in this layout.
#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Segment64 {
    pub segment_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub virtual_address: u64,
    pub physical_address: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub alignment: u64,
}

impl Segment64 {
    pub const SIZE: usize = 56;
}

#[derive(Clone, Copy, Debug)]
pub enum ProgramHeader {
    Segment32(Segment32),
    Segment64(Segment64),
}

impl ProgramHeader {
    pub fn raw_type(&self) -> u32 {
        match self {
            ProgramHeader::Segment32(segment) => segment.segment_type,
            ProgramHeader::Segment64(segment) => segment.segment_type,
        }
    }

    pub fn segment_type(&self) -> SegmentType {
        SegmentType::from(self.raw_type())
    }

    pub fn flags(&self) -> u32 {
        match self {
            ProgramHeader::Segment32(segment) => segment.flags,
            ProgramHeader::Segment64(segment) => segment.flags,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            ProgramHeader::Segment32(segment) => u64::from(segment.offset),
            ProgramHeader::Segment64(segment) => segment.offset,
        }
    }

    pub fn virtual_address(&self) -> u64 {
        match self {
            ProgramHeader::Segment32(segment) => u64::from(segment.virtual_address),
            ProgramHeader::Segment64(segment) => segment.virtual_address,
        }
    }

    pub fn physical_address(&self) -> u64 {
        match self {
            ProgramHeader::Segment32(segment) => u64::from(segment.physical_address),
            ProgramHeader::Segment64(segment) => segment.physical_address,
        }
    }

    pub fn file_size(&self) -> u64 {
        match self {
            ProgramHeader::Segment32(segment) => u64::from(segment.file_size),
            ProgramHeader::Segment64(segment) => segment.file_size,
        }
    }

    pub fn mem_size(&self) -> u64 {
        match self {
            ProgramHeader::Segment32(segment) => u64::from(segment.mem_size),
            ProgramHeader::Segment64(segment) => segment.mem_size,
        }
    }

    pub fn alignment(&self) -> u64 {
        match self {
            ProgramHeader::Segment32(segment) => u64::from(segment.alignment),
            ProgramHeader::Segment64(segment) => segment.alignment,
        }
    }

    pub fn is_executable(&self) -> bool {
        self.flags().get_bit(0)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().get_bit(1)
    }

    pub fn is_readable(&self) -> bool {
        self.flags().get_bit(2)
    }

    /// The flags as `readelf` prints them, e.g. `"RW"`.
    pub fn flags_string(&self) -> String {
        segment_flags(self.flags())
    }
}

/// Render the permission bits of a segment's flags. Letters are always in the order read, write, execute; letters
/// for unset bits are left out entirely. OS- and processor-specific bits are ignored.
pub fn segment_flags(flags: u32) -> String {
    let mut rendered = String::with_capacity(3);
    if flags.get_bit(2) {
        rendered.push('R');
    }
    if flags.get_bit(1) {
        rendered.push('W');
    }
    if flags.get_bit(0) {
        rendered.push('X');
    }
    rendered
}

/// Read the program header table. Relocatable objects usually don't have one, and an offset of `0` produces an
/// empty table.
pub fn load_program_headers<R>(source: &mut ByteSource<R>, header: &FileHeader) -> Result<Vec<ProgramHeader>>
where
    R: Read + Seek,
{
    let offset = header.program_header_offset();
    let count = u64::from(header.number_of_program_headers());
    if offset == 0 || count == 0 {
        return Ok(Vec::new());
    }

    let entry_size = u64::from(header.program_header_entry_size());
    let record_size = match header.class() {
        Class::Elf32 => Segment32::SIZE,
        Class::Elf64 => Segment64::SIZE,
    } as u64;
    if entry_size < record_size {
        return Err(ElfError::InvalidEntrySize { table: "program header table".to_string(), entry_size });
    }

    let headers: Vec<ProgramHeader> = match header.class() {
        Class::Elf32 => source
            .read_table::<Segment32>(offset, count, entry_size)?
            .into_iter()
            .map(ProgramHeader::Segment32)
            .collect(),
        Class::Elf64 => source
            .read_table::<Segment64>(offset, count, entry_size)?
            .into_iter()
            .map(ProgramHeader::Segment64)
            .collect(),
    };

    debug!("Loaded {} program headers from {:#x}", headers.len(), offset);
    Ok(headers)
}

#[test]
fn test_segment_flags() {
    assert_eq!(segment_flags(0b110), "RW");
    assert_eq!(segment_flags(0b111), "RWX");
    assert_eq!(segment_flags(0b101), "RX");
    assert_eq!(segment_flags(0b001), "X");
    assert_eq!(segment_flags(0), "");
    assert_eq!(segment_flags(0x0ff0_0004), "R");
}

#[test]
fn test_segment_type() {
    assert_eq!(SegmentType::from(1).to_string(), "LOAD");
    assert_eq!(SegmentType::from(0x6474e551).to_string(), "GNU_STACK");
    assert_eq!(SegmentType::from(0x6ffffffb).to_string(), "SUNWSTACK");
    assert_eq!(SegmentType::from(0x60000010), SegmentType::Os(0x60000010));
    assert_eq!(SegmentType::from(0x60000010).to_string(), "LOOS+0x10");
    assert_eq!(SegmentType::from(0x70000001).to_string(), "LOPROC+0x1");
    assert_eq!(SegmentType::from(8), SegmentType::Num);
    assert_eq!(SegmentType::from(8).to_string(), "NUM");
    assert_eq!(SegmentType::from(9).to_string(), "unknown (0x9)");
    assert_eq!(SegmentType::from(0x1234).to_string(), "unknown (0x1234)");
}
