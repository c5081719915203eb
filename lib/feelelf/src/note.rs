use crate::{
    error::Result,
    section::{SectionHeader, SectionType},
    source::ByteSource,
};
use log::{debug, warn};
use scroll::{Endian, Pread};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    io::{Read, Seek},
};

/// Size of the fixed part of a note: name size, descriptor size and type, each a 4-byte word.
const NOTE_HEADER_SIZE: u64 = 12;

pub const NT_GNU_ABI_TAG: u32 = 1;
pub const NT_GNU_HWCAP: u32 = 2;
pub const NT_GNU_BUILD_ID: u32 = 3;
pub const NT_GNU_GOLD_VERSION: u32 = 4;
pub const NT_GNU_PROPERTY_TYPE_0: u32 = 5;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Note {
    pub name_size: u32,
    pub desc_size: u32,
    pub note_type: u32,

    /// The note's owner, e.g. `"GNU"`, without its terminator.
    pub name: String,
    pub desc: Vec<u8>,

    /// The descriptor as 4-byte words. A descriptor that isn't a whole number of words has its last word padded
    /// with zeroes.
    pub words: Vec<u32>,
}

impl Note {
    pub fn interpret(&self) -> GnuNote {
        match self.note_type {
            NT_GNU_ABI_TAG if self.words.len() >= 4 => GnuNote::AbiTag {
                os: AbiTagOs::from(self.words[0]),
                major: self.words[1],
                minor: self.words[2],
                subminor: self.words[3],
            },
            NT_GNU_HWCAP => GnuNote::HwCap,
            NT_GNU_BUILD_ID => GnuNote::BuildId(self.desc.clone()),
            NT_GNU_GOLD_VERSION => GnuNote::GoldVersion,
            NT_GNU_PROPERTY_TYPE_0 => GnuNote::PropertyType0,
            note_type => GnuNote::Unknown { note_type, words: self.words.clone() },
        }
    }
}

/// The operating system named by word 0 of an `NT_GNU_ABI_TAG` note.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AbiTagOs {
    /// GNU userspace on the Linux kernel.
    Gnu,
    Hurd,
    Solaris2,
    FreeBsd,
    Unknown(u32),
}

impl From<u32> for AbiTagOs {
    fn from(os: u32) -> AbiTagOs {
        match os {
            0 => AbiTagOs::Gnu,
            1 => AbiTagOs::Hurd,
            2 => AbiTagOs::Solaris2,
            3 => AbiTagOs::FreeBsd,
            other => AbiTagOs::Unknown(other),
        }
    }
}

impl fmt::Display for AbiTagOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiTagOs::Gnu => write!(f, "GNU"),
            AbiTagOs::Hurd => write!(f, "Hurd"),
            AbiTagOs::Solaris2 => write!(f, "Solaris2"),
            AbiTagOs::FreeBsd => write!(f, "FreeBSD"),
            AbiTagOs::Unknown(os) => write!(f, "{}", crate::unknown(*os)),
        }
    }
}

/// A note, interpreted according to its type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GnuNote {
    AbiTag { os: AbiTagOs, major: u32, minor: u32, subminor: u32 },
    HwCap,
    BuildId(Vec<u8>),
    GoldVersion,
    PropertyType0,
    Unknown { note_type: u32, words: Vec<u32> },
}

impl GnuNote {
    pub fn type_name(&self) -> Cow<'static, str> {
        match self {
            GnuNote::AbiTag { .. } => "NT_GNU_ABI_TAG".into(),
            GnuNote::HwCap => "NT_GNU_HWCAP".into(),
            GnuNote::BuildId(_) => "NT_GNU_BUILD_ID".into(),
            GnuNote::GoldVersion => "NT_GNU_GOLD_VERSION".into(),
            GnuNote::PropertyType0 => "NT_GNU_PROPERTY_TYPE_0".into(),
            GnuNote::Unknown { note_type, .. } => format!("Unknown note type: ({:#x})", note_type).into(),
        }
    }

    /// The ABI version of an ABI tag, as `major.minor.subminor`.
    pub fn abi_version(&self) -> Option<String> {
        match self {
            GnuNote::AbiTag { major, minor, subminor, .. } => Some(format!("{}.{}.{}", major, minor, subminor)),
            _ => None,
        }
    }
}

impl fmt::Display for GnuNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GnuNote::AbiTag { os, major, minor, subminor } => {
                write!(f, "OS: {}, ABI: {}.{}.{}", os, major, minor, subminor)
            }
            GnuNote::BuildId(id) => {
                write!(f, "Build ID: ")?;
                id.iter().try_for_each(|byte| write!(f, "{:02x}", byte))
            }
            GnuNote::Unknown { words, .. } => {
                write!(f, "{}", self.type_name())?;
                words.iter().try_for_each(|word| write!(f, " {:08x}", word))
            }
            _ => write!(f, "{}", self.type_name()),
        }
    }
}

/// Iterates over the notes packed into a note section. Each note's name and descriptor are padded to a 4-byte
/// boundary.
pub struct NoteIter<'a> {
    data: &'a [u8],
    endian: Endian,
}

impl<'a> NoteIter<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> NoteIter<'a> {
        NoteIter { data, endian }
    }
}

impl<'a> Iterator for NoteIter<'a> {
    type Item = Note;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let name_size = self.data.pread_with::<u32>(0, self.endian).ok();
        let desc_size = self.data.pread_with::<u32>(4, self.endian).ok();
        let note_type = self.data.pread_with::<u32>(8, self.endian).ok();
        let (name_size, desc_size, note_type) = match (name_size, desc_size, note_type) {
            (Some(name_size), Some(desc_size), Some(note_type)) => (name_size, desc_size, note_type),
            _ => {
                warn!("Ignoring {} trailing bytes in note section", self.data.len());
                return None;
            }
        };

        // Calculate the offsets to the description and next entry
        let desc_offset = align_up(NOTE_HEADER_SIZE + u64::from(name_size), 4);
        let desc_end = desc_offset + u64::from(desc_size);
        let next_entry_offset = align_up(desc_end, 4);

        // We treat incomplete entries as missing. The padding after the last descriptor may be missing.
        if (self.data.len() as u64) < desc_end {
            warn!("Note of type {:#x} runs past the end of its section", note_type);
            self.data = &[];
            return None;
        }

        let name_end = (NOTE_HEADER_SIZE + u64::from(name_size)) as usize;
        let name = crate::from_utf8_null_terminated(&self.data[(NOTE_HEADER_SIZE as usize)..name_end]);
        let desc = self.data[(desc_offset as usize)..(desc_end as usize)].to_vec();
        let words = desc_words(&desc, self.endian);

        let next_entry_offset = usize::min(next_entry_offset as usize, self.data.len());
        self.data = &self.data[next_entry_offset..];
        Some(Note { name_size, desc_size, note_type, name, desc, words })
    }
}

fn desc_words(desc: &[u8], endian: Endian) -> Vec<u32> {
    desc.chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            word[..].pread_with::<u32>(0, endian).unwrap_or(0)
        })
        .collect()
}

fn align_up(offset: u64, alignment: u64) -> u64 {
    if offset % alignment == 0 {
        offset
    } else {
        offset + alignment - (offset % alignment)
    }
}

/// Decode every section whose name starts with `.note`, keyed by section name.
pub fn notes<R>(
    source: &mut ByteSource<R>,
    sections: &[SectionHeader],
    names: &[String],
) -> Result<BTreeMap<String, Vec<Note>>>
where
    R: Read + Seek,
{
    let mut notes: BTreeMap<String, Vec<Note>> = BTreeMap::new();

    for (section, name) in sections.iter().zip(names) {
        if !name.starts_with(".note") || section.section_type() == SectionType::NoBits {
            continue;
        }

        let data = source.read_bytes(section.offset(), section.size())?;
        let found: Vec<Note> = NoteIter::new(&data, source.endian()).collect();
        debug!("Found {} notes in {}", found.len(), name);
        notes.entry(name.clone()).or_default().extend(found);
    }

    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_bytes(name: &[u8], note_type: u32, desc: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(name.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&note_type.to_le_bytes());
        bytes.extend_from_slice(name);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes.extend_from_slice(desc);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
    }

    #[test]
    fn padded_names() {
        /*
         * "GNU\0" needs no padding, but "Go\0" and "FreeBSD\0\0" do. The second note is only found if the
         * padding after the first one's name is skipped.
         */
        let mut data = note_bytes(b"Go\0", 4, &[0xaa, 0xbb, 0xcc, 0xdd]);
        data.extend(note_bytes(b"GNU\0", NT_GNU_BUILD_ID, &[0xde, 0xad, 0xbe, 0xef, 0x01]));

        let notes: Vec<Note> = NoteIter::new(&data, Endian::Little).collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].name, "Go");
        assert_eq!(notes[0].words, vec![0xddcc_bbaa]);
        assert_eq!(notes[1].name, "GNU");
        assert_eq!(notes[1].desc_size, 5);
        assert_eq!(notes[1].words, vec![0xefbe_adde, 0x01]);
        assert_eq!(notes[1].interpret().to_string(), "Build ID: deadbeef01");
    }

    #[test]
    fn abi_tag() {
        let desc: Vec<u8> = [0u32, 3, 2, 0].iter().flat_map(|word| word.to_le_bytes()).collect();
        let data = note_bytes(b"GNU\0", NT_GNU_ABI_TAG, &desc);
        let note = NoteIter::new(&data, Endian::Little).next().unwrap();

        let interpreted = note.interpret();
        assert_eq!(interpreted, GnuNote::AbiTag { os: AbiTagOs::Gnu, major: 3, minor: 2, subminor: 0 });
        assert_eq!(interpreted.abi_version().as_deref(), Some("3.2.0"));
        assert_eq!(interpreted.to_string(), "OS: GNU, ABI: 3.2.0");
        assert_eq!(interpreted.type_name(), "NT_GNU_ABI_TAG");
    }

    #[test]
    fn unknown_and_truncated() {
        let mut data = note_bytes(b"XYZ\0", 0x99, &[1, 0, 0, 0]);
        let note = NoteIter::new(&data, Endian::Little).next().unwrap();
        assert_eq!(note.interpret().to_string(), "Unknown note type: (0x99) 00000001");

        // Cut the descriptor short - the note is dropped rather than read past the end.
        data.truncate(data.len() - 2);
        assert_eq!(NoteIter::new(&data, Endian::Little).count(), 0);
    }
}
