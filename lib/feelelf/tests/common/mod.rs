//! Builds small, synthetic ELF images in memory. Section `0` is always the null section, the user's sections
//! follow in order, and `.shstrtab` comes last.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use tempfile::{NamedTempFile, TempDir};

pub const EM_386: u16 = 3;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOTE: u32 = 7;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;
pub const SHT_DYNSYM: u32 = 11;

pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;

/// Encodes integers with the image's width and byte order.
#[derive(Clone, Copy, Debug)]
pub struct Encoder {
    pub is_64: bool,
    pub big_endian: bool,
}

impl Encoder {
    pub fn half(&self, out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    pub fn word(&self, out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    pub fn xword(&self, out: &mut Vec<u8>, value: u64) {
        out.extend_from_slice(&if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    /// An address-sized field: 4 bytes in a 32-bit image, 8 in a 64-bit one.
    pub fn addr(&self, out: &mut Vec<u8>, value: u64) {
        if self.is_64 {
            self.xword(out, value);
        } else {
            self.word(out, value as u32);
        }
    }

    pub fn symbol_size(&self) -> u64 {
        if self.is_64 {
            24
        } else {
            16
        }
    }

    pub fn symbol(&self, name: u32, info: u8, other: u8, section_index: u16, value: u64, size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        self.word(&mut out, name);
        if self.is_64 {
            out.push(info);
            out.push(other);
            self.half(&mut out, section_index);
            self.xword(&mut out, value);
            self.xword(&mut out, size);
        } else {
            self.word(&mut out, value as u32);
            self.word(&mut out, size as u32);
            out.push(info);
            out.push(other);
            self.half(&mut out, section_index);
        }
        out
    }

    pub fn relocation_size(&self, with_addend: bool) -> u64 {
        match (self.is_64, with_addend) {
            (false, false) => 8,
            (false, true) => 12,
            (true, false) => 16,
            (true, true) => 24,
        }
    }

    /// A relocation record. `info` is written as-is, so callers pack the symbol and type themselves.
    pub fn relocation(&self, offset: u64, info: u64, addend: Option<i64>) -> Vec<u8> {
        let mut out = Vec::new();
        self.addr(&mut out, offset);
        self.addr(&mut out, info);
        if let Some(addend) = addend {
            self.addr(&mut out, addend as u64);
        }
        out
    }

    pub fn dynamic(&self, tag: i64, value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        self.addr(&mut out, tag as u64);
        self.addr(&mut out, value);
        out
    }

    /// A note record, with its name and descriptor padded to 4 bytes.
    pub fn note(&self, name: &[u8], note_type: u32, desc: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        self.word(&mut out, name.len() as u32);
        self.word(&mut out, desc.len() as u32);
        self.word(&mut out, note_type);
        out.extend_from_slice(name);
        pad_to(&mut out, 4);
        out.extend_from_slice(desc);
        pad_to(&mut out, 4);
        out
    }

    pub fn words(&self, words: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        for &word in words {
            self.word(&mut out, word);
        }
        out
    }
}

pub fn pad_to(out: &mut Vec<u8>, alignment: usize) {
    while out.len() % alignment != 0 {
        out.push(0);
    }
}

#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub section_type: u32,
    pub flags: u64,
    pub address: u64,
    pub data: Vec<u8>,
    pub size: Option<u64>,
    pub entry_size: u64,
    pub link: u32,
    pub info: u32,
}

impl Section {
    pub fn new(name: &str, section_type: u32) -> Section {
        Section {
            name: name.to_string(),
            section_type,
            flags: 0,
            address: 0,
            data: Vec::new(),
            size: None,
            entry_size: 0,
            link: 0,
            info: 0,
        }
    }

    pub fn data(mut self, data: Vec<u8>) -> Section {
        self.data = data;
        self
    }

    pub fn flags(mut self, flags: u64) -> Section {
        self.flags = flags;
        self
    }

    pub fn address(mut self, address: u64) -> Section {
        self.address = address;
        self
    }

    /// Override the size written into the header. For `NOBITS` sections this is the only size there is.
    pub fn size(mut self, size: u64) -> Section {
        self.size = Some(size);
        self
    }

    pub fn entry_size(mut self, entry_size: u64) -> Section {
        self.entry_size = entry_size;
        self
    }

    pub fn link(mut self, link: u32) -> Section {
        self.link = link;
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub segment_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub virtual_address: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub alignment: u64,
}

impl Segment {
    pub fn new(segment_type: u32, flags: u32) -> Segment {
        Segment { segment_type, flags, offset: 0, virtual_address: 0, file_size: 0, mem_size: 0, alignment: 0 }
    }
}

#[derive(Clone, Debug)]
pub struct ImageBuilder {
    pub encoder: Encoder,
    pub object_type: u16,
    pub machine: u16,
    pub entry_point: u64,
    pub segments: Vec<Segment>,
    pub sections: Vec<Section>,
    pub with_string_table: bool,
}

impl ImageBuilder {
    pub fn new(is_64: bool, big_endian: bool) -> ImageBuilder {
        ImageBuilder {
            encoder: Encoder { is_64, big_endian },
            object_type: ET_EXEC,
            machine: if is_64 { EM_X86_64 } else { EM_386 },
            entry_point: 0,
            segments: Vec::new(),
            sections: Vec::new(),
            with_string_table: true,
        }
    }

    pub fn elf64() -> ImageBuilder {
        ImageBuilder::new(true, false)
    }

    pub fn elf32() -> ImageBuilder {
        ImageBuilder::new(false, false)
    }

    pub fn machine(mut self, machine: u16) -> ImageBuilder {
        self.machine = machine;
        self
    }

    pub fn object_type(mut self, object_type: u16) -> ImageBuilder {
        self.object_type = object_type;
        self
    }

    pub fn entry_point(mut self, entry_point: u64) -> ImageBuilder {
        self.entry_point = entry_point;
        self
    }

    pub fn segment(mut self, segment: Segment) -> ImageBuilder {
        self.segments.push(segment);
        self
    }

    pub fn section(mut self, section: Section) -> ImageBuilder {
        self.sections.push(section);
        self
    }

    /// Leave out `.shstrtab`, and set `e_shstrndx` to `SHN_UNDEF`.
    pub fn without_string_table(mut self) -> ImageBuilder {
        self.with_string_table = false;
        self
    }

    fn header_size(&self) -> u64 {
        if self.encoder.is_64 {
            64
        } else {
            52
        }
    }

    fn program_header_size(&self) -> u64 {
        if self.encoder.is_64 {
            56
        } else {
            32
        }
    }

    fn section_header_size(&self) -> u64 {
        if self.encoder.is_64 {
            64
        } else {
            40
        }
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_offsets().0
    }

    /// Build the image, also returning the program and section header table offsets.
    pub fn build_with_offsets(&self) -> (Vec<u8>, u64, u64) {
        let e = self.encoder;

        let mut sections = self.sections.clone();
        if self.with_string_table {
            sections.push(Section::new(".shstrtab", SHT_STRTAB));
        }

        let mut string_table = vec![0u8];
        let mut name_offsets = Vec::new();
        for section in &sections {
            name_offsets.push(string_table.len() as u32);
            string_table.extend_from_slice(section.name.as_bytes());
            string_table.push(0);
        }
        if self.with_string_table {
            if let Some(last) = sections.last_mut() {
                last.data = string_table;
            }
        }

        let program_header_offset = if self.segments.is_empty() { 0 } else { self.header_size() };
        let mut body = Vec::new();
        let body_start = self.header_size() + self.program_header_size() * self.segments.len() as u64;

        let mut section_offsets = Vec::new();
        for section in &sections {
            pad_to(&mut body, 8);
            section_offsets.push(body_start + body.len() as u64);
            if section.section_type != SHT_NOBITS {
                body.extend_from_slice(&section.data);
            }
        }
        pad_to(&mut body, 8);
        let section_header_offset = body_start + body.len() as u64;

        let mut out = Vec::new();

        // Identification
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        out.push(if e.is_64 { 2 } else { 1 });
        out.push(if e.big_endian { 2 } else { 1 });
        out.push(1);
        out.push(0);
        out.push(0);
        out.extend_from_slice(&[0; 7]);

        e.half(&mut out, self.object_type);
        e.half(&mut out, self.machine);
        e.word(&mut out, 1);
        e.addr(&mut out, self.entry_point);
        e.addr(&mut out, program_header_offset);
        e.addr(&mut out, section_header_offset);
        e.word(&mut out, 0);
        e.half(&mut out, self.header_size() as u16);
        e.half(&mut out, self.program_header_size() as u16);
        e.half(&mut out, self.segments.len() as u16);
        e.half(&mut out, self.section_header_size() as u16);
        e.half(&mut out, sections.len() as u16 + 1);
        e.half(&mut out, if self.with_string_table { sections.len() as u16 } else { 0 });
        assert_eq!(out.len() as u64, self.header_size());

        for segment in &self.segments {
            e.word(&mut out, segment.segment_type);
            if e.is_64 {
                e.word(&mut out, segment.flags);
            }
            e.addr(&mut out, segment.offset);
            e.addr(&mut out, segment.virtual_address);
            e.addr(&mut out, segment.virtual_address);
            e.addr(&mut out, segment.file_size);
            e.addr(&mut out, segment.mem_size);
            if !e.is_64 {
                e.word(&mut out, segment.flags);
            }
            e.addr(&mut out, segment.alignment);
        }
        assert_eq!(out.len() as u64, body_start);

        out.extend_from_slice(&body);

        // The null section
        out.extend(std::iter::repeat(0).take(self.section_header_size() as usize));
        for ((section, name_offset), offset) in sections.iter().zip(name_offsets).zip(section_offsets) {
            e.word(&mut out, name_offset);
            e.word(&mut out, section.section_type);
            e.addr(&mut out, section.flags);
            e.addr(&mut out, section.address);
            e.addr(&mut out, offset);
            e.addr(&mut out, section.size.unwrap_or(section.data.len() as u64));
            e.word(&mut out, section.link);
            e.word(&mut out, section.info);
            e.addr(&mut out, 1);
            e.addr(&mut out, section.entry_size);
        }

        (out, program_header_offset, section_header_offset)
    }

    pub fn cursor(&self) -> Cursor<Vec<u8>> {
        Cursor::new(self.build())
    }
}

/// A temporary file holding `contents`. It is removed again when dropped.
pub fn temp_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

/// An empty temporary directory, for paths that must not exist. Keep it alive for as long as the path is used.
pub fn empty_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}
