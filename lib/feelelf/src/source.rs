use crate::error::{ElfError, Result};
use core::cmp;
use log::trace;
use scroll::{ctx::TryFromCtx, Endian, Pread};
use std::io::{self, Read, Seek, SeekFrom};

/// Strings are scanned for their terminator in chunks of this many bytes.
const STRING_CHUNK_SIZE: usize = 64;

/// A seekable view over the bytes of an ELF image.
///
/// Every read is positioned: the cursor is moved to the requested offset, the bytes are read, and the cursor is
/// then put back where it was before the read. Reads therefore never depend on each other, and a caller that
/// holds the underlying reader sees its cursor unchanged. The `&mut self` receivers mean only one read can be in
/// flight on a source at a time.
pub struct ByteSource<R> {
    inner: R,
    length: u64,
    endian: Endian,
}

impl<R> ByteSource<R>
where
    R: Read + Seek,
{
    pub fn new(mut inner: R) -> Result<ByteSource<R>> {
        /*
         * Find the length of the image without disturbing wherever the caller left the cursor.
         */
        let position = inner.stream_position()?;
        let length = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;

        Ok(ByteSource { inner, length, endian: Endian::Little })
    }

    /// The total length of the image, in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The byte order used to decode multi-byte fields. This is little-endian until the identification block has
    /// been read.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub(crate) fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Seek to `offset`, run `f`, and restore the cursor, even if `f` failed.
    fn scoped<T, F>(&mut self, offset: u64, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut R) -> io::Result<T>,
    {
        let saved = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let result = f(&mut self.inner);
        self.inner.seek(SeekFrom::Start(saved))?;
        result
    }

    /// Read exactly `length` bytes starting at `offset`.
    pub fn read_bytes(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let truncated = || ElfError::TruncatedRead { offset, wanted: length };
        let image_length = self.length;
        offset.checked_add(length).filter(|&end| end <= image_length).ok_or_else(truncated)?;

        // A length that fits in the image may still not fit in memory on narrower targets
        let buffer_length = usize::try_from(length).map_err(|_| truncated())?;

        trace!("Reading {} bytes at {:#x}", length, offset);
        let mut buffer = vec![0; buffer_length];
        self.scoped(offset, |inner| inner.read_exact(&mut buffer)).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => truncated(),
            _ => ElfError::Io(err),
        })?;

        Ok(buffer)
    }

    /// Read one fixed-size record of `size` bytes from `offset`, decoded with the image's byte order.
    pub fn read_record<T>(&mut self, offset: u64, size: usize) -> Result<T>
    where
        T: for<'a> TryFromCtx<'a, Endian, Error = scroll::Error>,
    {
        let bytes = self.read_bytes(offset, size as u64)?;
        Ok(bytes.pread_with::<T>(0, self.endian)?)
    }

    /// Read a table of `count` records, each `entry_size` bytes apart, starting at `offset`. Each entry is decoded
    /// from its first bytes, so entries may be larger than the record itself.
    pub fn read_table<T>(&mut self, offset: u64, count: u64, entry_size: u64) -> Result<Vec<T>>
    where
        T: for<'a> TryFromCtx<'a, Endian, Error = scroll::Error>,
    {
        let length = count
            .checked_mul(entry_size)
            .ok_or(ElfError::TruncatedRead { offset, wanted: u64::MAX })?;
        let bytes = self.read_bytes(offset, length)?;
        let endian = self.endian;

        (0..count)
            .map(|index| -> Result<T> { Ok(bytes.pread_with::<T>((index * entry_size) as usize, endian)?) })
            .collect()
    }

    /// Read a NUL-terminated string starting at `offset`. Invalid UTF-8 is replaced rather than rejected, as names
    /// are only ever displayed.
    pub fn read_str(&mut self, offset: u64, max_length: Option<usize>) -> Result<String> {
        let mut bytes = Vec::new();
        let mut position = offset;

        loop {
            if position >= self.length {
                return Err(ElfError::TruncatedName { offset });
            }

            let chunk_length = cmp::min(STRING_CHUNK_SIZE as u64, self.length - position);
            let chunk = self.read_bytes(position, chunk_length)?;
            let terminator = chunk.iter().position(|&c| c == b'\0');
            bytes.extend_from_slice(&chunk[..terminator.unwrap_or(chunk.len())]);

            if max_length.map_or(false, |max| bytes.len() > max) {
                return Err(ElfError::TruncatedName { offset });
            }

            if terminator.is_some() {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }

            position += chunk_length;
        }
    }
}
