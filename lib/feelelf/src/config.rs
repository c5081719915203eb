//! Options that change how strictly an image is decoded. Everything defaults to the permissive behaviour, so
//! `DecodeOptions::default()` accepts anything a linker would plausibly produce.

#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    /// The maximum number of bytes scanned for a NUL terminator when resolving a section or symbol name. Names
    /// longer than this are reported as truncated. `None` scans up to the end of the file.
    pub max_name_length: Option<usize>,

    /// When set, sections that are looked up by name (`.dynsym`, `.strtab`, `.dynstr`) must also carry
    /// the matching section type.
    pub strict_table_types: bool,
}

impl DecodeOptions {
    pub fn new() -> DecodeOptions {
        DecodeOptions::default()
    }

    pub fn max_name_length(mut self, max_name_length: usize) -> DecodeOptions {
        self.max_name_length = Some(max_name_length);
        self
    }

    pub fn strict_table_types(mut self, strict: bool) -> DecodeOptions {
        self.strict_table_types = strict;
        self
    }
}
