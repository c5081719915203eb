mod common;

use common::*;
use feelelf::{
    header,
    program::{self, SegmentType},
    section::{self, SectionType},
    source::ByteSource,
    DecodeOptions,
    ElfError,
    ElfFile,
};
use std::io::Cursor;

fn text_and_data(builder: ImageBuilder) -> ImageBuilder {
    builder
        .section(Section::new(".text", SHT_PROGBITS).flags(0x6).address(0x1000).data(vec![0x90, 0x90, 0xc3]))
        .section(Section::new(".data", SHT_PROGBITS).flags(0x3).address(0x2000).data(vec![1, 2, 3, 4, 5, 6, 7, 8]))
}

#[test]
fn no_program_headers() {
    let image = text_and_data(ImageBuilder::elf64().object_type(ET_REL)).build();
    let mut source = ByteSource::new(Cursor::new(image)).unwrap();
    let class = header::detect_class(&mut source).unwrap();
    let header = header::decode_header(&mut source, class).unwrap();

    assert_eq!(header.program_header_offset(), 0);
    assert!(program::load_program_headers(&mut source, &header).unwrap().is_empty());
}

#[test]
fn segments() {
    let mut text = Segment::new(PT_LOAD, 0b101);
    text.offset = 0x1000;
    text.virtual_address = 0x40_1000;
    text.file_size = 0x234;
    text.mem_size = 0x234;
    text.alignment = 0x1000;

    for builder in vec![ImageBuilder::elf32(), ImageBuilder::elf64()] {
        let image =
            builder.segment(text).segment(Segment::new(PT_LOAD, 0b110)).segment(Segment::new(PT_NOTE, 0b111)).build();
        let elf = ElfFile::from_reader(Cursor::new(image)).unwrap();
        let segments = elf.program_headers();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].segment_type(), SegmentType::Load);
        assert_eq!(segments[0].offset(), 0x1000);
        assert_eq!(segments[0].virtual_address(), 0x40_1000);
        assert_eq!(segments[0].file_size(), 0x234);
        assert_eq!(segments[0].alignment(), 0x1000);
        assert_eq!(segments[0].flags_string(), "RX");
        assert!(segments[0].is_executable() && !segments[0].is_writable());

        assert_eq!(segments[1].flags_string(), "RW");
        assert_eq!(segments[2].segment_type().to_string(), "NOTE");
        assert_eq!(segments[2].flags_string(), "RWX");
    }
}

#[test]
fn section_names_by_offset() {
    let image = text_and_data(ImageBuilder::elf64()).build();
    let mut source = ByteSource::new(Cursor::new(image)).unwrap();
    let class = header::detect_class(&mut source).unwrap();
    let header = header::decode_header(&mut source, class).unwrap();
    let sections = section::load_section_headers(&mut source, &header).unwrap();
    let string_table_index = usize::from(header.string_table_index());
    let options = DecodeOptions::default();

    // `.shstrtab` holds "\0.text\0.data\0.shstrtab\0"
    assert_eq!(section::section_name(&mut source, &sections, string_table_index, 1, &options).unwrap(), ".text");
    assert_eq!(section::section_name(&mut source, &sections, string_table_index, 7, &options).unwrap(), ".data");
    assert_eq!(section::section_name(&mut source, &sections, string_table_index, 9, &options).unwrap(), "ata");

    assert!(matches!(
        section::section_name(&mut source, &sections, 0, 1, &options),
        Err(ElfError::MissingStringTable(".shstrtab"))
    ));
    assert!(matches!(
        section::section_name(&mut source, &sections, 42, 1, &options),
        Err(ElfError::MissingStringTable(".shstrtab"))
    ));
}

#[test]
fn section_headers() {
    let mut elf = ElfFile::from_reader(text_and_data(ImageBuilder::elf32()).cursor()).unwrap();
    let sections = elf.section_headers().to_vec();

    // Index 0 is kept as the null section
    assert_eq!(sections.len(), 4);
    assert_eq!(sections[0].section_type(), SectionType::Null);
    assert_eq!(sections[1].section_type(), SectionType::ProgBits);
    assert_eq!(sections[1].address(), 0x1000);
    assert_eq!(sections[1].size(), 3);
    assert_eq!(sections[1].flags_string(), "AX");
    assert!(sections[1].is_executable() && sections[1].is_allocated() && !sections[1].is_writable());
    assert_eq!(sections[2].flags_string(), "WA");
    assert_eq!(sections[3].section_type().to_string(), "STRTAB");

    assert_eq!(elf.section_name(&sections[2]).unwrap(), ".data");
    assert_eq!(elf.section_names().unwrap(), vec!["", ".text", ".data", ".shstrtab"]);
    assert_eq!(elf.section_data(&sections[1]).unwrap(), vec![0x90, 0x90, 0xc3]);
    assert!(matches!(elf.section_header(4), Err(ElfError::InvalidSectionIndex(4))));

    let data = elf.section_by_name(".data").unwrap().unwrap();
    assert_eq!(data.address(), 0x2000);
    assert!(elf.section_by_name(".bss").unwrap().is_none());
}

#[test]
fn nobits_has_no_data() {
    let image = ImageBuilder::elf64().section(Section::new(".bss", SHT_NOBITS).flags(0x3).size(0x1000)).build();
    let mut elf = ElfFile::from_reader(Cursor::new(image)).unwrap();
    let bss = elf.section_by_name(".bss").unwrap().unwrap();

    assert_eq!(bss.size(), 0x1000);
    assert!(elf.section_data(&bss).unwrap().is_empty());
}

#[test]
fn missing_section_name_table() {
    let image = text_and_data(ImageBuilder::elf64()).without_string_table().build();
    let mut elf = ElfFile::from_reader(Cursor::new(image)).unwrap();

    assert_eq!(elf.section_headers().len(), 3);
    assert!(matches!(elf.section_names(), Err(ElfError::MissingStringTable(".shstrtab"))));
}

#[test]
fn name_length_limit() {
    let long_name = ".text.a_rather_long_section_name_for_a_function";
    let image = ImageBuilder::elf64().section(Section::new(long_name, SHT_PROGBITS)).build();

    let mut elf = ElfFile::from_reader(Cursor::new(image.clone())).unwrap();
    assert_eq!(elf.section_names().unwrap()[1], long_name);

    let options = DecodeOptions::new().max_name_length(16);
    let mut elf = ElfFile::from_reader_with(Cursor::new(image), options).unwrap();
    assert!(matches!(elf.section_names(), Err(ElfError::TruncatedName { .. })));
}

#[test]
fn cursor_is_left_alone() {
    let mut cursor = text_and_data(ImageBuilder::elf64()).cursor();
    cursor.set_position(5);

    let mut elf = ElfFile::from_reader(cursor).unwrap();
    elf.section_names().unwrap();
    let text = elf.section_headers()[1];
    elf.section_data(&text).unwrap();
    elf.notes().unwrap();

    assert_eq!(elf.into_inner().position(), 5);
}
