use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::Cursor;

/// Size of the `ResChunk_header` that starts every chunk.
pub const CHUNK_HEADER_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum ChunkType {
    Null = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,
    XmlStartNamespace = 0x0100,
    XmlEndNamespace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCdata = 0x0104,
    XmlLastChunk = 0x017f,
    XmlResourceMap = 0x0180,
    TablePackage = 0x0200,
    TableType = 0x0201,
    TableTypeSpec = 0x0202,
    TableLibrary = 0x0203,
    TableOverlayable = 0x0204,
    TableOverlayablePolicy = 0x0205,
    TableStagedAlias = 0x0206,
}

impl ChunkType {
    pub fn from_u16(ty: u16) -> Option<Self> {
        Some(match ty {
            ty if ty == ChunkType::Null as u16 => ChunkType::Null,
            ty if ty == ChunkType::StringPool as u16 => ChunkType::StringPool,
            ty if ty == ChunkType::Table as u16 => ChunkType::Table,
            ty if ty == ChunkType::Xml as u16 => ChunkType::Xml,
            ty if ty == ChunkType::XmlStartNamespace as u16 => ChunkType::XmlStartNamespace,
            ty if ty == ChunkType::XmlEndNamespace as u16 => ChunkType::XmlEndNamespace,
            ty if ty == ChunkType::XmlStartElement as u16 => ChunkType::XmlStartElement,
            ty if ty == ChunkType::XmlEndElement as u16 => ChunkType::XmlEndElement,
            ty if ty == ChunkType::XmlCdata as u16 => ChunkType::XmlCdata,
            ty if ty == ChunkType::XmlLastChunk as u16 => ChunkType::XmlLastChunk,
            ty if ty == ChunkType::XmlResourceMap as u16 => ChunkType::XmlResourceMap,
            ty if ty == ChunkType::TablePackage as u16 => ChunkType::TablePackage,
            ty if ty == ChunkType::TableType as u16 => ChunkType::TableType,
            ty if ty == ChunkType::TableTypeSpec as u16 => ChunkType::TableTypeSpec,
            ty if ty == ChunkType::TableLibrary as u16 => ChunkType::TableLibrary,
            ty if ty == ChunkType::TableOverlayable as u16 => ChunkType::TableOverlayable,
            ty if ty == ChunkType::TableOverlayablePolicy as u16 => {
                ChunkType::TableOverlayablePolicy
            }
            ty if ty == ChunkType::TableStagedAlias as u16 => ChunkType::TableStagedAlias,
            _ => return None,
        })
    }
}

/// One framed chunk: a `ResChunk_header` plus the bytes it covers.
///
/// The slice is bounded to `size`, so any cursor obtained from the chunk
/// cannot read into a sibling.
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    /// Type identifier for this chunk. The meaning of this value depends
    /// on the containing chunk.
    ty: u16,
    /// Size of the chunk header (in bytes). Adding this value to the address
    /// of the chunk allows you to find its associated data (if any).
    header_size: u16,
    /// Total size of this chunk (in bytes), including any child chunks.
    size: u32,
    /// Offset of the chunk relative to the start of its parent chunk, or of
    /// the buffer for top-level chunks.
    offset: usize,
    bytes: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn ty(&self) -> u16 {
        self.ty
    }

    pub fn kind(&self) -> Option<ChunkType> {
        ChunkType::from_u16(self.ty)
    }

    pub fn header_size(&self) -> usize {
        self.header_size as usize
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The whole chunk, header included.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The type-specific part of the header that follows the common 8 bytes.
    pub fn header(&self) -> &'a [u8] {
        &self.bytes[CHUNK_HEADER_SIZE..self.header_size()]
    }

    /// Everything after the header.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[self.header_size()..]
    }

    /// A cursor over the chunk bytes, positioned at `pos` (relative to the
    /// start of the chunk).
    pub fn cursor_at(&self, pos: usize) -> Result<Cursor<&'a [u8]>> {
        if pos > self.bytes.len() {
            return Err(Error::MalformedChunk(format!(
                "offset {:#x} outside chunk {:#06x} of {} bytes",
                pos,
                self.ty,
                self.bytes.len()
            )));
        }
        let mut cursor = Cursor::new(self.bytes);
        cursor.set_position(pos as u64);
        Ok(cursor)
    }

    /// Fails unless this chunk has the given type and a header of at least
    /// `min_header` bytes.
    pub fn expect(&self, kind: ChunkType, min_header: usize) -> Result<()> {
        if self.ty != kind as u16 {
            return Err(Error::MalformedChunk(format!(
                "expected {:?} chunk, found type {:#06x}",
                kind, self.ty
            )));
        }
        if self.header_size() < min_header {
            return Err(Error::MalformedChunk(format!(
                "{:?} header of {} bytes, expected at least {}",
                kind, self.header_size, min_header
            )));
        }
        Ok(())
    }

    /// A reader over the chunks nested in this chunk's body. Offsets of the
    /// children are relative to the start of this chunk.
    pub fn children(&self) -> ChunkReader<'a> {
        ChunkReader {
            data: self.body(),
            pos: 0,
            base: self.header_size(),
            failed: false,
        }
    }
}

/// Cursor over a sequence of sibling chunks.
#[derive(Clone, Debug)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
            failed: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads the next chunk header and advances past the whole chunk,
    /// regardless of what its payload contains.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        let rest = &self.data[self.pos..];
        if rest.len() < CHUNK_HEADER_SIZE {
            return Err(Error::MalformedChunk(format!(
                "{} trailing bytes at offset {:#x} cannot hold a chunk header",
                rest.len(),
                self.base + self.pos
            )));
        }
        let ty = LittleEndian::read_u16(&rest[0..2]);
        let header_size = LittleEndian::read_u16(&rest[2..4]);
        let size = LittleEndian::read_u32(&rest[4..8]);
        if (header_size as usize) < CHUNK_HEADER_SIZE || header_size as u32 > size {
            return Err(Error::MalformedChunk(format!(
                "chunk {:#06x} at offset {:#x} has header size {} and total size {}",
                ty,
                self.base + self.pos,
                header_size,
                size
            )));
        }
        if size as usize > rest.len() {
            return Err(Error::MalformedChunk(format!(
                "chunk {:#06x} at offset {:#x} claims {} bytes but only {} remain",
                ty,
                self.base + self.pos,
                size,
                rest.len()
            )));
        }
        let chunk = Chunk {
            ty,
            header_size,
            size,
            offset: self.base + self.pos,
            bytes: &rest[..size as usize],
        };
        self.pos += size as usize;
        Ok(Some(chunk))
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
