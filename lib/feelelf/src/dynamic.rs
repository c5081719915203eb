//! The `.dynamic` section, as raw `(tag, value)` pairs. Tags are not interpreted.

use crate::{
    error::Result,
    header::Class,
    section::{SectionHeader, SectionType},
    source::ByteSource,
};
use log::debug;
use scroll_derive::Pread;
use std::io::{Read, Seek};

/// The tag that terminates the dynamic array.
pub const DT_NULL: i64 = 0;

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Dyn32 {
    pub tag: i32,
    pub value: u32,
}

#[derive(Clone, Copy, Debug, Pread)]
#[repr(C)]
pub struct Dyn64 {
    pub tag: i64,
    pub value: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DynamicEntry {
    pub tag: i64,
    pub value: u64,
}

/// Read the entries of the first `DYNAMIC` section, stopping after the first `DT_NULL`. Files that aren't
/// dynamically linked have no entries.
pub fn dynamic_entries<R>(
    source: &mut ByteSource<R>,
    class: Class,
    sections: &[SectionHeader],
) -> Result<Vec<DynamicEntry>>
where
    R: Read + Seek,
{
    let section = match sections.iter().find(|section| section.section_type() == SectionType::Dynamic) {
        Some(section) => section,
        None => return Ok(Vec::new()),
    };

    let record_size = match class {
        Class::Elf32 => 8,
        Class::Elf64 => 16,
    };
    let count = section.entry_count(".dynamic", record_size)?;
    let entry_size = section.entry_size();

    let mut entries: Vec<DynamicEntry> = match class {
        Class::Elf32 => source
            .read_table::<Dyn32>(section.offset(), count, entry_size)?
            .into_iter()
            .map(|entry| DynamicEntry { tag: i64::from(entry.tag), value: u64::from(entry.value) })
            .collect(),
        Class::Elf64 => source
            .read_table::<Dyn64>(section.offset(), count, entry_size)?
            .into_iter()
            .map(|entry| DynamicEntry { tag: entry.tag, value: entry.value })
            .collect(),
    };

    if let Some(end) = entries.iter().position(|entry| entry.tag == DT_NULL) {
        entries.truncate(end + 1);
    }

    debug!("Read {} dynamic entries", entries.len());
    Ok(entries)
}
