//! Relocation sections. The meaning of a relocation's type code depends on the target architecture, so the
//! name table is picked from the file header's `e_machine`, never from the section itself.

pub mod aarch64;
pub mod i386;
pub mod x86_64;

use crate::{
    error::Result,
    header::{Class, FileHeader, Machine},
    section::{SectionHeader, SectionType},
    source::ByteSource,
};
use bit_field::BitField;
use log::debug;
use scroll_derive::Pread;
use std::{
    collections::BTreeMap,
    io::{Read, Seek},
};

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Rel32 {
    pub offset: u32,
    pub info: u32,
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Rela32 {
    pub offset: u32,
    pub info: u32,
    pub addend: i32,
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Rel64 {
    pub offset: u64,
    pub info: u64,
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Rela64 {
    pub offset: u64,
    pub info: u64,
    pub addend: i64,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Relocation {
    pub offset: u64,
    pub info: u64,

    /// Only `RELA` sections carry an explicit addend.
    pub addend: Option<i64>,
    pub symbol_index: u32,
    pub relocation_type: u32,
    pub type_name: &'static str,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RelocationSection {
    pub name: String,
    pub offset: u64,
    pub with_addends: bool,
    pub entries: Vec<Relocation>,
}

/// Name a relocation type for the given machine. Types on machines we have no table for are all `"Unknown"`.
pub fn relocation_type_name(machine: Machine, relocation_type: u32) -> &'static str {
    match machine {
        Machine::I386 => i386::name(relocation_type),
        Machine::X86_64 => x86_64::name(relocation_type),
        Machine::AARCH64 => aarch64::name(relocation_type),
        _ => "Unknown",
    }
}

/// Split `r_info` into the symbol index and the relocation type. 32-bit files pack the type into the low byte;
/// 64-bit files give it the whole low word.
pub fn split_info(class: Class, info: u64) -> (u32, u32) {
    match class {
        Class::Elf32 => (info.get_bits(8..32) as u32, info.get_bits(0..8) as u32),
        Class::Elf64 => (info.get_bits(32..64) as u32, info.get_bits(0..32) as u32),
    }
}

fn relocation(header: &FileHeader, offset: u64, info: u64, addend: Option<i64>) -> Relocation {
    let (symbol_index, relocation_type) = split_info(header.class(), info);
    Relocation {
        offset,
        info,
        addend,
        symbol_index,
        relocation_type,
        type_name: relocation_type_name(header.machine(), relocation_type),
    }
}

/// Decode every section whose name starts with `.rel` (which covers `.rela` too), keyed by section name. `NOBITS`
/// sections such as `.relro_padding` share the prefix but hold nothing, and are skipped.
pub fn relocations<R>(
    source: &mut ByteSource<R>,
    header: &FileHeader,
    sections: &[SectionHeader],
    names: &[String],
) -> Result<BTreeMap<String, RelocationSection>>
where
    R: Read + Seek,
{
    let mut relocations = BTreeMap::new();

    for (section, name) in sections.iter().zip(names) {
        if !name.starts_with(".rel") || section.section_type() == SectionType::NoBits {
            continue;
        }

        // The section type decides whether there are addends; fall back to the name if the type is unusual
        let with_addends = match section.section_type() {
            SectionType::Rel => false,
            SectionType::Rela => true,
            _ => name.starts_with(".rela"),
        };

        let record_size = match (header.class(), with_addends) {
            (Class::Elf32, false) => 8,
            (Class::Elf32, true) => 12,
            (Class::Elf64, false) => 16,
            (Class::Elf64, true) => 24,
        };
        let count = section.entry_count(name, record_size)?;
        let entry_size = section.entry_size();
        let offset = section.offset();

        let entries: Vec<Relocation> = match (header.class(), with_addends) {
            (Class::Elf32, false) => source
                .read_table::<Rel32>(offset, count, entry_size)?
                .into_iter()
                .map(|rel| relocation(header, u64::from(rel.offset), u64::from(rel.info), None))
                .collect(),
            (Class::Elf32, true) => source
                .read_table::<Rela32>(offset, count, entry_size)?
                .into_iter()
                .map(|rela| {
                    relocation(header, u64::from(rela.offset), u64::from(rela.info), Some(i64::from(rela.addend)))
                })
                .collect(),
            (Class::Elf64, false) => source
                .read_table::<Rel64>(offset, count, entry_size)?
                .into_iter()
                .map(|rel| relocation(header, rel.offset, rel.info, None))
                .collect(),
            (Class::Elf64, true) => source
                .read_table::<Rela64>(offset, count, entry_size)?
                .into_iter()
                .map(|rela| relocation(header, rela.offset, rela.info, Some(rela.addend)))
                .collect(),
        };

        debug!("Read {} relocations from {}", entries.len(), name);
        relocations.insert(name.clone(), RelocationSection { name: name.clone(), offset, with_addends, entries });
    }

    Ok(relocations)
}

#[test]
fn test_machine_selects_table() {
    assert_eq!(relocation_type_name(Machine::X86_64, 2), "R_X86_64_PC32");
    assert_eq!(relocation_type_name(Machine::I386, 2), "R_386_PC32");
    assert_eq!(relocation_type_name(Machine::AARCH64, 1026), "R_AARCH64_JUMP_SLOT");
    assert_eq!(relocation_type_name(Machine::X86_64, 41), "R_X86_64_GOTPCRELX");
    assert_eq!(relocation_type_name(Machine::I386, 12), "Unknown");
    assert_eq!(relocation_type_name(Machine::RISCV, 2), "Unknown");
}

#[test]
fn test_split_info() {
    assert_eq!(split_info(Class::Elf32, 0x0000_0507), (5, 7));
    assert_eq!(split_info(Class::Elf64, 0x0000_0003_0000_0402), (3, 0x402));
}
