use crate::error::{Error, Result};
use crate::res::chunk::{Chunk, ChunkType};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Minimum size of a `ResStringPool_header`, common chunk header included.
pub const STRING_POOL_HEADER_SIZE: usize = 28;

/// A styled range of characters within a string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StyleSpan {
    /// Index of the span's tag name (for example `b`) in the same pool.
    pub name: u32,
    pub first_char: u32,
    pub last_char: u32,
}

impl StyleSpan {
    pub const END: u32 = 0xffff_ffff;

    fn read(r: &mut impl Read) -> Result<Option<Self>> {
        let name = r.read_u32::<LittleEndian>()?;
        if name == Self::END {
            return Ok(None);
        }
        let first_char = r.read_u32::<LittleEndian>()?;
        let last_char = r.read_u32::<LittleEndian>()?;
        Ok(Some(Self {
            name,
            first_char,
            last_char,
        }))
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct StringPoolHeader {
    string_count: u32,
    style_count: u32,
    flags: u32,
    strings_start: u32,
    styles_start: u32,
}

impl StringPoolHeader {
    const SORTED_FLAG: u32 = 1 << 0;
    const UTF8_FLAG: u32 = 1 << 8;

    fn read(r: &mut impl Read) -> Result<Self> {
        let string_count = r.read_u32::<LittleEndian>()?;
        let style_count = r.read_u32::<LittleEndian>()?;
        let flags = r.read_u32::<LittleEndian>()?;
        let strings_start = r.read_u32::<LittleEndian>()?;
        let styles_start = r.read_u32::<LittleEndian>()?;
        Ok(Self {
            string_count,
            style_count,
            flags,
            strings_start,
            styles_start,
        })
    }
}

/// A decoded string pool. Strings are addressed by their position in the pool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringPool {
    strings: Vec<String>,
    styles: Vec<Vec<StyleSpan>>,
    flags: u32,
}

impl StringPool {
    pub fn decode(chunk: &Chunk) -> Result<Self> {
        chunk.expect(ChunkType::StringPool, STRING_POOL_HEADER_SIZE)?;
        let header = StringPoolHeader::read(&mut chunk.cursor_at(8)?)?;
        let utf8 = header.flags & StringPoolHeader::UTF8_FLAG != 0;

        let mut offsets = chunk.cursor_at(chunk.header_size())?;
        let mut string_offsets = Vec::with_capacity(header.string_count.min(0x10000) as usize);
        for _ in 0..header.string_count {
            string_offsets.push(offsets.read_u32::<LittleEndian>()?);
        }
        let mut style_offsets = Vec::with_capacity(header.style_count.min(0x10000) as usize);
        for _ in 0..header.style_count {
            style_offsets.push(offsets.read_u32::<LittleEndian>()?);
        }

        let mut strings = Vec::with_capacity(string_offsets.len());
        for (i, offset) in string_offsets.iter().enumerate() {
            let pos = absolute(header.strings_start, *offset)?;
            let mut r = chunk.cursor_at(pos)?;
            let s = if utf8 {
                read_utf8(&mut r)
            } else {
                read_utf16(&mut r)
            };
            let s = s.map_err(|err| match err {
                Error::MalformedChunk(msg) => {
                    Error::MalformedChunk(format!("string {} of pool: {}", i, msg))
                }
                err => err,
            })?;
            strings.push(s);
        }

        let mut styles = Vec::with_capacity(style_offsets.len());
        for offset in &style_offsets {
            let pos = absolute(header.styles_start, *offset)?;
            let mut r = chunk.cursor_at(pos)?;
            let mut spans = vec![];
            while let Some(span) = StyleSpan::read(&mut r)? {
                spans.push(span);
            }
            styles.push(spans);
        }

        log::trace!(
            "string pool: {} strings, {} styles, utf8={}",
            strings.len(),
            styles.len(),
            utf8
        );
        Ok(Self {
            strings,
            styles,
            flags: header.flags,
        })
    }

    /// Builds a pool from owned strings, without styles.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strings: strings.into_iter().map(Into::into).collect(),
            styles: vec![],
            flags: StringPoolHeader::UTF8_FLAG,
        }
    }

    /// Looks up an optional index: `-1` is the absent marker.
    pub fn get(&self, index: i32) -> Result<Option<&str>> {
        if index == -1 {
            return Ok(None);
        }
        if index < 0 {
            return Err(Error::IndexOutOfRange {
                index: index as i64,
                count: self.strings.len(),
            });
        }
        self.string(index as u32).map(Some)
    }

    pub fn string(&self, index: u32) -> Result<&str> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or(Error::IndexOutOfRange {
                index: index as i64,
                count: self.strings.len(),
            })
    }

    /// Spans styling the string at `index`. Strings past the style table
    /// are unstyled.
    pub fn styles(&self, index: u32) -> &[StyleSpan] {
        self.styles
            .get(index as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn position(&self, s: &str) -> Option<u32> {
        self.strings.iter().position(|x| x == s).map(|i| i as u32)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & StringPoolHeader::UTF8_FLAG != 0
    }

    pub fn is_sorted(&self) -> bool {
        self.flags & StringPoolHeader::SORTED_FLAG != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

fn absolute(start: u32, offset: u32) -> Result<usize> {
    start
        .checked_add(offset)
        .map(|pos| pos as usize)
        .ok_or_else(|| {
            Error::MalformedChunk(format!(
                "string offset {:#x} + {:#x} overflows",
                start, offset
            ))
        })
}

/// One or two byte length, high bit marks the long form.
fn read_utf8_len(r: &mut Cursor<&[u8]>) -> Result<usize> {
    let first = r.read_u8()? as usize;
    if first & 0x80 != 0 {
        let second = r.read_u8()? as usize;
        Ok(((first & 0x7f) << 8) | second)
    } else {
        Ok(first)
    }
}

/// One or two u16 length, high bit marks the long form.
fn read_utf16_len(r: &mut Cursor<&[u8]>) -> Result<usize> {
    let first = r.read_u16::<LittleEndian>()? as usize;
    if first & 0x8000 != 0 {
        let second = r.read_u16::<LittleEndian>()? as usize;
        Ok(((first & 0x7fff) << 16) | second)
    } else {
        Ok(first)
    }
}

fn read_utf8(r: &mut Cursor<&[u8]>) -> Result<String> {
    let _chars = read_utf8_len(r)?;
    let bytes = read_utf8_len(r)?;
    let start = r.position() as usize;
    let data = *r.get_ref();
    let end = start
        .checked_add(bytes)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            Error::MalformedChunk(format!(
                "utf-8 string of {} bytes at {:#x} runs past the pool",
                bytes, start
            ))
        })?;
    Ok(String::from_utf8_lossy(&data[start..end]).into_owned())
}

fn read_utf16(r: &mut Cursor<&[u8]>) -> Result<String> {
    let units = read_utf16_len(r)?;
    let remaining = r.get_ref().len() - r.position() as usize;
    if units.saturating_mul(2) > remaining {
        return Err(Error::MalformedChunk(format!(
            "utf-16 string of {} units at {:#x} runs past the pool",
            units,
            r.position()
        )));
    }
    let mut buf = Vec::with_capacity(units);
    for _ in 0..units {
        buf.push(r.read_u16::<LittleEndian>()?);
    }
    Ok(String::from_utf16_lossy(&buf))
}
