//! Encoders for resource chunk streams.
//!
//! These produce the same layouts the decoders in this crate read: string
//! pools, complete `resources.arsc` tables and binary XML documents.

use crate::error::{Error, Result};
use crate::res::chunk::{ChunkType, CHUNK_HEADER_SIZE};
use crate::res::config::Configuration;
use crate::res::string_pool::StyleSpan;
use crate::res::table::{
    ENTRY_FLAG_COMPACT, ENTRY_FLAG_COMPLEX, NO_ENTRY, TYPE_FLAG_OFFSET16, TYPE_FLAG_SPARSE,
};
use crate::res::value::{ResId, Value};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Cursor, Seek, SeekFrom, Write};

/// Writes a chunk header placeholder and back-patches it once the header
/// and body have been written.
pub struct ChunkWriter {
    ty: ChunkType,
    start_chunk: u64,
    end_header: u64,
}

impl ChunkWriter {
    pub fn start_chunk<W: Seek + Write>(ty: ChunkType, w: &mut W) -> Result<Self> {
        let start_chunk = w.stream_position()?;
        w.write_all(&[0; CHUNK_HEADER_SIZE])?;
        Ok(Self {
            ty,
            start_chunk,
            end_header: 0,
        })
    }

    pub fn start(&self) -> u64 {
        self.start_chunk
    }

    pub fn end_header<W: Seek + Write>(&mut self, w: &mut W) -> Result<()> {
        self.end_header = w.stream_position()?;
        Ok(())
    }

    /// Patches the header and returns the chunk's start and end positions.
    pub fn end_chunk<W: Seek + Write>(self, w: &mut W) -> Result<(u64, u64)> {
        if self.end_header < self.start_chunk + CHUNK_HEADER_SIZE as u64 {
            return Err(Error::Internal(format!(
                "{:?} chunk closed before its header",
                self.ty
            )));
        }
        let end_chunk = w.stream_position()?;
        w.seek(SeekFrom::Start(self.start_chunk))?;
        w.write_u16::<LittleEndian>(self.ty as u16)?;
        w.write_u16::<LittleEndian>((self.end_header - self.start_chunk) as u16)?;
        w.write_u32::<LittleEndian>((end_chunk - self.start_chunk) as u32)?;
        w.seek(SeekFrom::Start(end_chunk))?;
        Ok((self.start_chunk, end_chunk))
    }
}

fn pad4<W: Seek + Write>(w: &mut W) -> Result<()> {
    while w.stream_position()? % 4 != 0 {
        w.write_u8(0)?;
    }
    Ok(())
}

fn write_utf8_len(w: &mut impl Write, len: usize) -> Result<()> {
    if len > 0x7fff {
        return Err(Error::Internal(format!("utf-8 length {} too long", len)));
    }
    if len > 0x7f {
        w.write_u8(0x80 | (len >> 8) as u8)?;
    }
    w.write_u8(len as u8)?;
    Ok(())
}

fn write_utf16_len(w: &mut impl Write, len: usize) -> Result<()> {
    if len > 0x7fff_ffff {
        return Err(Error::Internal(format!("utf-16 length {} too long", len)));
    }
    if len > 0x7fff {
        w.write_u16::<LittleEndian>(0x8000 | (len >> 16) as u16)?;
    }
    w.write_u16::<LittleEndian>(len as u16)?;
    Ok(())
}

/// Writes a complete string pool chunk. `styles[i]` styles `strings[i]`.
pub fn write_string_pool<W, S>(
    w: &mut W,
    strings: &[S],
    styles: &[Vec<StyleSpan>],
    utf8: bool,
) -> Result<()>
where
    W: Seek + Write,
    S: AsRef<str>,
{
    let mut chunk = ChunkWriter::start_chunk(ChunkType::StringPool, w)?;
    w.write_all(&[0; 20])?;
    chunk.end_header(w)?;
    let offsets_start = w.stream_position()?;
    for _ in 0..strings.len() + styles.len() {
        w.write_u32::<LittleEndian>(0)?;
    }

    let mut offsets = Vec::with_capacity(strings.len() + styles.len());
    let strings_start = w.stream_position()?;
    for string in strings {
        let string = string.as_ref();
        offsets.push(w.stream_position()? - strings_start);
        if utf8 {
            write_utf8_len(w, string.chars().count())?;
            write_utf8_len(w, string.len())?;
            w.write_all(string.as_bytes())?;
            w.write_u8(0)?;
        } else {
            let units = string.encode_utf16().collect::<Vec<_>>();
            write_utf16_len(w, units.len())?;
            for unit in units {
                w.write_u16::<LittleEndian>(unit)?;
            }
            w.write_u16::<LittleEndian>(0)?;
        }
    }
    pad4(w)?;

    let styles_start = w.stream_position()?;
    for style in styles {
        offsets.push(w.stream_position()? - styles_start);
        for span in style {
            w.write_u32::<LittleEndian>(span.name)?;
            w.write_u32::<LittleEndian>(span.first_char)?;
            w.write_u32::<LittleEndian>(span.last_char)?;
        }
        w.write_u32::<LittleEndian>(StyleSpan::END)?;
    }
    let (start_chunk, end_chunk) = chunk.end_chunk(w)?;

    w.seek(SeekFrom::Start(start_chunk + CHUNK_HEADER_SIZE as u64))?;
    w.write_u32::<LittleEndian>(strings.len() as u32)?;
    w.write_u32::<LittleEndian>(styles.len() as u32)?;
    w.write_u32::<LittleEndian>(if utf8 { 1 << 8 } else { 0 })?;
    w.write_u32::<LittleEndian>((strings_start - start_chunk) as u32)?;
    let styles_start = if styles.is_empty() {
        0
    } else {
        (styles_start - start_chunk) as u32
    };
    w.write_u32::<LittleEndian>(styles_start)?;
    w.seek(SeekFrom::Start(offsets_start))?;
    for offset in offsets {
        w.write_u32::<LittleEndian>(offset as u32)?;
    }
    w.seek(SeekFrom::Start(end_chunk))?;
    Ok(())
}

fn intern(pool: &mut Vec<String>, s: &str) -> u32 {
    match pool.iter().position(|x| x == s) {
        Some(i) => i as u32,
        None => {
            pool.push(s.to_string());
            (pool.len() - 1) as u32
        }
    }
}

/// Builds a complete `resources.arsc` image.
#[derive(Clone, Debug, Default)]
pub struct TableBuilder {
    strings: Vec<String>,
    packages: Vec<PackageBuilder>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s` in the global pool and returns its index.
    pub fn string(&mut self, s: &str) -> u32 {
        intern(&mut self.strings, s)
    }

    pub fn package(&mut self, package: PackageBuilder) {
        self.packages.push(package);
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut w = Cursor::new(vec![]);
        let mut chunk = ChunkWriter::start_chunk(ChunkType::Table, &mut w)?;
        w.write_u32::<LittleEndian>(self.packages.len() as u32)?;
        chunk.end_header(&mut w)?;
        write_string_pool(&mut w, &self.strings, &[], true)?;
        for package in &self.packages {
            package.write(&mut w)?;
        }
        chunk.end_chunk(&mut w)?;
        Ok(w.into_inner())
    }
}

/// One package of a table. Type and key names are interned on demand.
#[derive(Clone, Debug)]
pub struct PackageBuilder {
    id: u8,
    name: String,
    types: Vec<String>,
    keys: Vec<String>,
    libraries: Vec<(u8, String)>,
    chunks: Vec<TypeBuilder>,
}

impl PackageBuilder {
    pub fn new(id: u8, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            types: vec![],
            keys: vec![],
            libraries: vec![],
            chunks: vec![],
        }
    }

    /// The 1-based type id for `name`.
    pub fn type_id(&mut self, name: &str) -> u8 {
        (intern(&mut self.types, name) + 1) as u8
    }

    pub fn key(&mut self, name: &str) -> u32 {
        intern(&mut self.keys, name)
    }

    pub fn library(&mut self, id: u8, name: &str) {
        self.libraries.push((id, name.to_string()));
    }

    /// Adds a type chunk. A spec chunk is emitted ahead of the first chunk
    /// of each type.
    pub fn push(&mut self, ty: TypeBuilder) {
        self.chunks.push(ty);
    }

    fn write<W: Seek + Write>(&self, w: &mut W) -> Result<()> {
        let mut chunk = ChunkWriter::start_chunk(ChunkType::TablePackage, w)?;
        let package_start = chunk.start();
        w.write_u32::<LittleEndian>(self.id as u32)?;
        let mut name = [0u16; 128];
        for (slot, c) in name.iter_mut().zip(self.name.encode_utf16().take(127)) {
            *slot = c;
        }
        for c in name {
            w.write_u16::<LittleEndian>(c)?;
        }
        let offsets_pos = w.stream_position()?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(self.types.len() as u32)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(self.keys.len() as u32)?;
        w.write_u32::<LittleEndian>(0)?;
        chunk.end_header(w)?;

        let type_strings = w.stream_position()? - package_start;
        write_string_pool(w, &self.types, &[], false)?;
        let key_strings = w.stream_position()? - package_start;
        write_string_pool(w, &self.keys, &[], true)?;

        if !self.libraries.is_empty() {
            let mut lib = ChunkWriter::start_chunk(ChunkType::TableLibrary, w)?;
            w.write_u32::<LittleEndian>(self.libraries.len() as u32)?;
            lib.end_header(w)?;
            for (id, name) in &self.libraries {
                w.write_u32::<LittleEndian>(*id as u32)?;
                let mut buf = [0u16; 128];
                for (slot, c) in buf.iter_mut().zip(name.encode_utf16().take(127)) {
                    *slot = c;
                }
                for c in buf {
                    w.write_u16::<LittleEndian>(c)?;
                }
            }
            lib.end_chunk(w)?;
        }

        let mut emitted = vec![];
        for ty in &self.chunks {
            if !emitted.contains(&ty.id) {
                emitted.push(ty.id);
                let siblings = self.chunks.iter().filter(|t| t.id == ty.id);
                let entry_count = siblings.clone().map(|t| t.entries.len()).max().unwrap_or(0);
                let mut spec = ChunkWriter::start_chunk(ChunkType::TableTypeSpec, w)?;
                w.write_u8(ty.id)?;
                w.write_u8(0)?;
                w.write_u16::<LittleEndian>(siblings.count() as u16)?;
                w.write_u32::<LittleEndian>(entry_count as u32)?;
                spec.end_header(w)?;
                for _ in 0..entry_count {
                    w.write_u32::<LittleEndian>(0)?;
                }
                spec.end_chunk(w)?;
            }
            ty.write(w)?;
        }
        let (_, end) = chunk.end_chunk(w)?;

        w.seek(SeekFrom::Start(offsets_pos))?;
        w.write_u32::<LittleEndian>(type_strings as u32)?;
        w.seek(SeekFrom::Current(4))?;
        w.write_u32::<LittleEndian>(key_strings as u32)?;
        w.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

/// How a type chunk lays out its entry offsets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EntryLayout {
    /// One `u32` offset per entry.
    #[default]
    Dense,
    /// One `u16` offset (in words) per entry.
    Offset16,
    /// `(index, offset)` pairs for present entries only.
    Sparse,
}

/// One configuration of one type.
#[derive(Clone, Debug)]
pub struct TypeBuilder {
    pub id: u8,
    pub config: Configuration,
    pub layout: EntryLayout,
    pub entries: Vec<Option<EntryBuilder>>,
}

impl TypeBuilder {
    pub fn new(id: u8, config: Configuration) -> Self {
        Self {
            id,
            config,
            layout: EntryLayout::Dense,
            entries: vec![],
        }
    }

    pub fn with_layout(mut self, layout: EntryLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Places `entry` at `index`, leaving holes as absent entries.
    pub fn entry(mut self, index: u16, entry: EntryBuilder) -> Self {
        let index = index as usize;
        if self.entries.len() <= index {
            self.entries.resize(index + 1, None);
        }
        self.entries[index] = Some(entry);
        self
    }

    fn write<W: Seek + Write>(&self, w: &mut W) -> Result<()> {
        let mut data = vec![];
        let mut offsets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match entry {
                Some(entry) => {
                    offsets.push(Some(data.len() as u32));
                    entry.write(&mut data)?;
                }
                None => offsets.push(None),
            }
        }

        let flags = match self.layout {
            EntryLayout::Dense => 0,
            EntryLayout::Offset16 => TYPE_FLAG_OFFSET16,
            EntryLayout::Sparse => TYPE_FLAG_SPARSE,
        };
        let entry_count = match self.layout {
            EntryLayout::Sparse => offsets.iter().flatten().count(),
            _ => offsets.len(),
        };

        let mut chunk = ChunkWriter::start_chunk(ChunkType::TableType, w)?;
        w.write_u8(self.id)?;
        w.write_u8(flags)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(entry_count as u32)?;
        let entries_start_pos = w.stream_position()?;
        w.write_u32::<LittleEndian>(0)?;
        self.config.write(w)?;
        chunk.end_header(w)?;

        for (index, offset) in offsets.iter().enumerate() {
            match (self.layout, offset) {
                (EntryLayout::Dense, Some(offset)) => w.write_u32::<LittleEndian>(*offset)?,
                (EntryLayout::Dense, None) => w.write_u32::<LittleEndian>(NO_ENTRY)?,
                (EntryLayout::Offset16, Some(offset)) => {
                    w.write_u16::<LittleEndian>((offset / 4) as u16)?
                }
                (EntryLayout::Offset16, None) => w.write_u16::<LittleEndian>(0xffff)?,
                (EntryLayout::Sparse, Some(offset)) => {
                    w.write_u16::<LittleEndian>(index as u16)?;
                    w.write_u16::<LittleEndian>((offset / 4) as u16)?;
                }
                (EntryLayout::Sparse, None) => {}
            }
        }
        pad4(w)?;
        let entries_start = w.stream_position()? - chunk.start();
        w.write_all(&data)?;
        let (_, end) = chunk.end_chunk(w)?;

        w.seek(SeekFrom::Start(entries_start_pos))?;
        w.write_u32::<LittleEndian>(entries_start as u32)?;
        w.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryData {
    Simple(Value),
    Complex {
        parent: ResId,
        map: Vec<(ResId, Value)>,
    },
    /// The key and value type packed into the entry header.
    Compact(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntryBuilder {
    pub key: u32,
    pub flags: u16,
    pub data: EntryData,
}

impl EntryBuilder {
    pub fn simple(key: u32, value: Value) -> Self {
        Self {
            key,
            flags: 0,
            data: EntryData::Simple(value),
        }
    }

    pub fn complex(key: u32, parent: ResId, map: Vec<(ResId, Value)>) -> Self {
        Self {
            key,
            flags: ENTRY_FLAG_COMPLEX,
            data: EntryData::Complex { parent, map },
        }
    }

    pub fn compact(key: u16, value: Value) -> Self {
        Self {
            key: key as u32,
            flags: ENTRY_FLAG_COMPACT,
            data: EntryData::Compact(value),
        }
    }

    fn write(&self, w: &mut impl Write) -> Result<()> {
        match &self.data {
            EntryData::Simple(value) => {
                w.write_u16::<LittleEndian>(8)?;
                w.write_u16::<LittleEndian>(self.flags & !ENTRY_FLAG_COMPLEX)?;
                w.write_u32::<LittleEndian>(self.key)?;
                value.write(w)?;
            }
            EntryData::Complex { parent, map } => {
                w.write_u16::<LittleEndian>(16)?;
                w.write_u16::<LittleEndian>(self.flags | ENTRY_FLAG_COMPLEX)?;
                w.write_u32::<LittleEndian>(self.key)?;
                w.write_u32::<LittleEndian>((*parent).into())?;
                w.write_u32::<LittleEndian>(map.len() as u32)?;
                for (name, value) in map {
                    w.write_u32::<LittleEndian>((*name).into())?;
                    value.write(w)?;
                }
            }
            EntryData::Compact(value) => {
                let key = u16::try_from(self.key).map_err(|_| {
                    Error::Internal(format!("compact entry key {} exceeds u16", self.key))
                })?;
                let (ty, data) = value.to_raw();
                w.write_u16::<LittleEndian>(key)?;
                w.write_u16::<LittleEndian>(ENTRY_FLAG_COMPACT | ((ty as u16) << 8))?;
                w.write_u32::<LittleEndian>(data)?;
            }
        }
        Ok(())
    }
}

/// The value of an attribute written by [`XmlBuilder`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttrValue<'a> {
    /// A string, stored both as raw value and as typed string.
    String(&'a str),
    /// A typed value without raw text.
    Typed(Value),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct XmlAttr<'a> {
    pub namespace: Option<&'a str>,
    pub name: &'a str,
    pub value: AttrValue<'a>,
}

impl<'a> XmlAttr<'a> {
    pub fn new(namespace: Option<&'a str>, name: &'a str, value: AttrValue<'a>) -> Self {
        Self {
            namespace,
            name,
            value,
        }
    }
}

#[derive(Clone, Debug)]
enum XmlEvent {
    StartNamespace {
        prefix: u32,
        uri: u32,
    },
    EndNamespace {
        prefix: u32,
        uri: u32,
    },
    StartElement {
        namespace: Option<u32>,
        name: u32,
        attributes: Vec<(Option<u32>, u32, Option<u32>, Value)>,
    },
    EndElement {
        namespace: Option<u32>,
        name: u32,
    },
    Cdata {
        data: u32,
    },
}

/// Builds a binary XML document from a stream of events.
#[derive(Clone, Debug, Default)]
pub struct XmlBuilder {
    strings: Vec<String>,
    resource_ids: Vec<u32>,
    events: Vec<XmlEvent>,
}

impl XmlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the pool with attribute names mapped to resource ids, in order.
    /// Names are not deduplicated, so two ids may share a name.
    pub fn with_resource_names(names: &[(&str, u32)]) -> Self {
        Self {
            strings: names.iter().map(|(name, _)| name.to_string()).collect(),
            resource_ids: names.iter().map(|(_, id)| *id).collect(),
            events: vec![],
        }
    }

    pub fn string(&mut self, s: &str) -> u32 {
        intern(&mut self.strings, s)
    }

    pub fn start_namespace(&mut self, prefix: &str, uri: &str) {
        let prefix = self.string(prefix);
        let uri = self.string(uri);
        self.events.push(XmlEvent::StartNamespace { prefix, uri });
    }

    pub fn end_namespace(&mut self, prefix: &str, uri: &str) {
        let prefix = self.string(prefix);
        let uri = self.string(uri);
        self.events.push(XmlEvent::EndNamespace { prefix, uri });
    }

    pub fn start_element(&mut self, namespace: Option<&str>, name: &str, attrs: &[XmlAttr]) {
        let namespace = namespace.map(|ns| self.string(ns));
        let name = self.string(name);
        let attributes = attrs
            .iter()
            .map(|attr| {
                let namespace = attr.namespace.map(|ns| self.string(ns));
                let name = self.string(attr.name);
                let (raw, value) = match attr.value {
                    AttrValue::String(s) => {
                        let index = self.string(s);
                        (Some(index), Value::String(index))
                    }
                    AttrValue::Typed(value) => (None, value),
                };
                (namespace, name, raw, value)
            })
            .collect();
        self.events.push(XmlEvent::StartElement {
            namespace,
            name,
            attributes,
        });
    }

    pub fn end_element(&mut self, namespace: Option<&str>, name: &str) {
        let namespace = namespace.map(|ns| self.string(ns));
        let name = self.string(name);
        self.events.push(XmlEvent::EndElement { namespace, name });
    }

    pub fn cdata(&mut self, text: &str) {
        let data = self.string(text);
        self.events.push(XmlEvent::Cdata { data });
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut w = Cursor::new(vec![]);
        let mut chunk = ChunkWriter::start_chunk(ChunkType::Xml, &mut w)?;
        chunk.end_header(&mut w)?;
        write_string_pool(&mut w, &self.strings, &[], true)?;
        if !self.resource_ids.is_empty() {
            let mut map = ChunkWriter::start_chunk(ChunkType::XmlResourceMap, &mut w)?;
            map.end_header(&mut w)?;
            for id in &self.resource_ids {
                w.write_u32::<LittleEndian>(*id)?;
            }
            map.end_chunk(&mut w)?;
        }
        for (line, event) in self.events.iter().enumerate() {
            write_node(&mut w, line as u32 + 1, event)?;
        }
        chunk.end_chunk(&mut w)?;
        Ok(w.into_inner())
    }
}

fn opt(index: Option<u32>) -> u32 {
    index.unwrap_or(NO_ENTRY)
}

fn write_node<W: Seek + Write>(w: &mut W, line: u32, event: &XmlEvent) -> Result<()> {
    let ty = match event {
        XmlEvent::StartNamespace { .. } => ChunkType::XmlStartNamespace,
        XmlEvent::EndNamespace { .. } => ChunkType::XmlEndNamespace,
        XmlEvent::StartElement { .. } => ChunkType::XmlStartElement,
        XmlEvent::EndElement { .. } => ChunkType::XmlEndElement,
        XmlEvent::Cdata { .. } => ChunkType::XmlCdata,
    };
    let mut chunk = ChunkWriter::start_chunk(ty, w)?;
    w.write_u32::<LittleEndian>(line)?;
    w.write_u32::<LittleEndian>(NO_ENTRY)?;
    chunk.end_header(w)?;
    match event {
        XmlEvent::StartNamespace { prefix, uri } | XmlEvent::EndNamespace { prefix, uri } => {
            w.write_u32::<LittleEndian>(*prefix)?;
            w.write_u32::<LittleEndian>(*uri)?;
        }
        XmlEvent::StartElement {
            namespace,
            name,
            attributes,
        } => {
            w.write_u32::<LittleEndian>(opt(*namespace))?;
            w.write_u32::<LittleEndian>(*name)?;
            w.write_u16::<LittleEndian>(20)?;
            w.write_u16::<LittleEndian>(20)?;
            w.write_u16::<LittleEndian>(attributes.len() as u16)?;
            w.write_u16::<LittleEndian>(0)?;
            w.write_u16::<LittleEndian>(0)?;
            w.write_u16::<LittleEndian>(0)?;
            for (namespace, name, raw, value) in attributes {
                w.write_u32::<LittleEndian>(opt(*namespace))?;
                w.write_u32::<LittleEndian>(*name)?;
                w.write_u32::<LittleEndian>(opt(*raw))?;
                value.write(w)?;
            }
        }
        XmlEvent::EndElement { namespace, name } => {
            w.write_u32::<LittleEndian>(opt(*namespace))?;
            w.write_u32::<LittleEndian>(*name)?;
        }
        XmlEvent::Cdata { data } => {
            w.write_u32::<LittleEndian>(*data)?;
            Value::Null.write(w)?;
        }
    }
    chunk.end_chunk(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::res::chunk::ChunkReader;

    #[test]
    fn chunk_writer_patches_header() {
        let mut w = Cursor::new(vec![]);
        let mut chunk = ChunkWriter::start_chunk(ChunkType::XmlResourceMap, &mut w).unwrap();
        chunk.end_header(&mut w).unwrap();
        w.write_u32::<LittleEndian>(0x0101_0000).unwrap();
        assert_eq!(chunk.end_chunk(&mut w).unwrap(), (0, 12));
        let bytes = w.into_inner();
        let parsed = ChunkReader::new(&bytes).next_chunk().unwrap().unwrap();
        assert_eq!(parsed.kind(), Some(ChunkType::XmlResourceMap));
        assert_eq!(parsed.header_size(), 8);
        assert_eq!(parsed.body(), &[0, 0, 1, 1]);
    }

    #[test]
    fn chunk_closed_without_header_is_an_error() {
        let mut w = Cursor::new(vec![]);
        let chunk = ChunkWriter::start_chunk(ChunkType::Xml, &mut w).unwrap();
        assert!(matches!(chunk.end_chunk(&mut w), Err(Error::Internal(_))));
    }

    #[test]
    fn string_pool_is_aligned() {
        let mut w = Cursor::new(vec![]);
        write_string_pool(&mut w, &["a", "bc"], &[], true).unwrap();
        assert_eq!(w.get_ref().len() % 4, 0);
    }

    #[test]
    fn spec_precedes_each_new_type() {
        let mut package = PackageBuilder::new(0x7f, "com.example");
        let string = package.type_id("string");
        let key = package.key("app_name");
        package.push(
            TypeBuilder::new(string, Configuration::default())
                .entry(0, EntryBuilder::simple(key, Value::IntDec(1))),
        );
        package.push(
            TypeBuilder::new(string, Configuration::default().with_sdk_version(21))
                .entry(0, EntryBuilder::simple(key, Value::IntDec(2))),
        );
        let mut table = TableBuilder::new();
        table.package(package);
        let bytes = table.build().unwrap();

        let root = ChunkReader::new(&bytes).next_chunk().unwrap().unwrap();
        let package = root
            .children()
            .filter_map(|c| c.ok())
            .find(|c| c.kind() == Some(ChunkType::TablePackage))
            .unwrap();
        let kinds = package
            .children()
            .map(|c| c.unwrap().kind().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            [
                ChunkType::StringPool,
                ChunkType::StringPool,
                ChunkType::TableTypeSpec,
                ChunkType::TableType,
                ChunkType::TableType,
            ]
        );
    }
}
