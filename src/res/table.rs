use crate::error::{Error, Result};
use crate::res::chunk::{Chunk, ChunkReader, ChunkType};
use crate::res::config::Configuration;
use crate::res::resolve::{Resolved, Resolver};
use crate::res::string_pool::StringPool;
use crate::res::value::{ResId, Value};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// Offset of an absent entry in a dense entry table.
pub const NO_ENTRY: u32 = 0xffff_ffff;
/// Absent entry in a 16-bit entry table.
const NO_ENTRY16: u16 = 0xffff;

pub const TYPE_FLAG_SPARSE: u8 = 0x01;
pub const TYPE_FLAG_OFFSET16: u8 = 0x02;

pub const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
pub const ENTRY_FLAG_PUBLIC: u16 = 0x0002;
pub const ENTRY_FLAG_WEAK: u16 = 0x0004;
pub const ENTRY_FLAG_COMPACT: u16 = 0x0008;

const TABLE_HEADER_SIZE: usize = 12;
/// Packages written before `type_id_offset` existed have 284 byte headers.
const PACKAGE_HEADER_MIN_SIZE: usize = 284;
const TYPE_SPEC_HEADER_SIZE: usize = 16;
/// Header up to and including the size field of the configuration.
const TYPE_HEADER_MIN_SIZE: usize = 24;
const LIBRARY_HEADER_SIZE: usize = 12;

/// The value held by an entry.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryValue {
    Simple(Value),
    /// A style or attribute set: named slots plus an optional parent to
    /// inherit unset slots from.
    Complex {
        parent: ResId,
        map: Vec<(ResId, Value)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// Index into the owning package's key pool.
    pub key: u32,
    pub flags: u16,
    pub value: EntryValue,
}

impl Entry {
    pub fn is_complex(&self) -> bool {
        matches!(self.value, EntryValue::Complex { .. })
    }

    pub fn is_public(&self) -> bool {
        self.flags & ENTRY_FLAG_PUBLIC != 0
    }

    pub fn is_weak(&self) -> bool {
        self.flags & ENTRY_FLAG_WEAK != 0
    }
}

/// One entry for one configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub config: Configuration,
    pub entry: Entry,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeSpec {
    pub id: u8,
    pub entry_count: u32,
    /// Per-entry mask of the configuration axes the entry varies over.
    pub flags: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    pub id: u8,
    /// Configurations of this type in declaration order.
    pub configs: Vec<Configuration>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    pub id: u8,
    pub name: String,
    pub type_strings: StringPool,
    pub key_strings: StringPool,
    pub specs: Vec<TypeSpec>,
    pub types: Vec<Type>,
    /// Shared library packages referenced through dynamic ids.
    pub libraries: Vec<(u8, String)>,
}

impl Package {
    /// Name of the type with the given 1-based id, e.g. `drawable`.
    pub fn type_name(&self, type_id: u8) -> Option<&str> {
        let index = (type_id as u32).checked_sub(1)?;
        self.type_strings.string(index).ok()
    }

    pub fn spec(&self, type_id: u8) -> Option<&TypeSpec> {
        self.specs.iter().find(|spec| spec.id == type_id)
    }

    fn check_type(&self, type_id: u8) -> Result<()> {
        if type_id == 0 || type_id as usize > self.type_strings.len() {
            return Err(Error::UnknownType {
                package: self.id,
                type_id,
            });
        }
        Ok(())
    }
}

/// A decoded `resources.arsc`, indexed by resource id.
#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    strings: StringPool,
    packages: Vec<Package>,
    index: HashMap<ResId, Vec<Candidate>>,
}

impl ResourceTable {
    /// Decodes the table chunk at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let chunk = ChunkReader::new(bytes)
            .next_chunk()?
            .ok_or_else(|| Error::MalformedChunk("empty resource table".to_string()))?;
        Self::decode_chunk(&chunk)
    }

    pub fn decode_chunk(chunk: &Chunk) -> Result<Self> {
        chunk.expect(ChunkType::Table, TABLE_HEADER_SIZE)?;
        let package_count = chunk.cursor_at(8)?.read_u32::<LittleEndian>()?;
        log::trace!("table: {} packages declared", package_count);

        let mut table = Self::default();
        let mut strings = None;
        for child in chunk.children() {
            let child = child?;
            match child.kind() {
                Some(ChunkType::StringPool) if strings.is_none() => {
                    strings = Some(StringPool::decode(&child)?);
                }
                Some(ChunkType::TablePackage) => {
                    let package = decode_package(&child, &mut table.index)?;
                    log::trace!(
                        "package {:#04x} {:?}: {} types",
                        package.id,
                        package.name,
                        package.types.len()
                    );
                    table.packages.push(package);
                }
                _ => log::trace!("skipping table chunk {:#06x}", child.ty()),
            }
        }
        table.strings = strings.unwrap_or_default();
        if table.packages.len() != package_count as usize {
            log::warn!(
                "table declares {} packages but holds {}",
                package_count,
                table.packages.len()
            );
        }
        Ok(table)
    }

    /// The global value string pool.
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// The first package declared with `id`.
    pub fn package(&self, id: u8) -> Result<&Package> {
        self.packages
            .iter()
            .find(|package| package.id == id)
            .ok_or(Error::UnknownPackage(id))
    }

    /// Id of the first declared package, which stands in for package `0`.
    pub fn default_package_id(&self) -> Option<u8> {
        self.packages.first().map(|package| package.id)
    }

    /// Every entry registered for `id`, in declaration order.
    pub fn candidates(&self, id: ResId) -> &[Candidate] {
        self.index.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: ResId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ResId> + '_ {
        self.index.keys().copied()
    }

    /// The key of `id` within its package's key pool.
    pub fn key_name(&self, id: ResId) -> Option<&str> {
        let candidate = self.candidates(id).first()?;
        self.packages
            .iter()
            .filter(|package| package.id == id.package())
            .find_map(|package| package.key_strings.string(candidate.entry.key).ok())
    }

    /// `type/key` for `id`, such as `drawable/icon`.
    pub fn entry_name(&self, id: ResId) -> Option<String> {
        let key = self.key_name(id)?;
        let ty = self.package(id.package()).ok()?.type_name(id.type_id())?;
        Some(format!("{}/{}", ty, key))
    }

    /// Resolves `id` for `target` with the default reference depth.
    pub fn resolve(&self, id: ResId, target: Option<&Configuration>) -> Result<Resolved> {
        let mut resolver = Resolver::new(self);
        if let Some(target) = target {
            resolver = resolver.with_target(*target);
        }
        resolver.resolve(id)
    }
}

fn read_name(r: &mut impl Read) -> Result<String> {
    let mut name = [0u16; 128];
    for c in name.iter_mut() {
        *c = r.read_u16::<LittleEndian>()?;
    }
    let len = name.iter().position(|c| *c == 0).unwrap_or(name.len());
    Ok(String::from_utf16_lossy(&name[..len]))
}

/// Decodes the pool starting `offset` bytes into the package chunk.
fn pool_at(chunk: &Chunk, offset: u32) -> Result<StringPool> {
    if offset == 0 {
        return Ok(StringPool::default());
    }
    let bytes = chunk.bytes().get(offset as usize..).ok_or_else(|| {
        Error::MalformedChunk(format!(
            "string pool offset {:#x} outside package of {} bytes",
            offset,
            chunk.size()
        ))
    })?;
    let pool = ChunkReader::new(bytes)
        .next_chunk()?
        .ok_or_else(|| Error::MalformedChunk(format!("no string pool at {:#x}", offset)))?;
    StringPool::decode(&pool)
}

fn decode_package(chunk: &Chunk, index: &mut HashMap<ResId, Vec<Candidate>>) -> Result<Package> {
    chunk.expect(ChunkType::TablePackage, PACKAGE_HEADER_MIN_SIZE)?;
    let mut r = chunk.cursor_at(8)?;
    let id = r.read_u32::<LittleEndian>()?;
    let id = u8::try_from(id)
        .map_err(|_| Error::MalformedChunk(format!("package id {:#x} exceeds 8 bits", id)))?;
    let name = read_name(&mut r)?;
    let type_strings = r.read_u32::<LittleEndian>()?;
    let _last_public_type = r.read_u32::<LittleEndian>()?;
    let key_strings = r.read_u32::<LittleEndian>()?;
    let _last_public_key = r.read_u32::<LittleEndian>()?;

    let mut package = Package {
        id,
        name,
        type_strings: pool_at(chunk, type_strings)?,
        key_strings: pool_at(chunk, key_strings)?,
        specs: vec![],
        types: vec![],
        libraries: vec![],
    };

    for child in chunk.children() {
        let child = child?;
        match child.kind() {
            Some(ChunkType::StringPool) => {}
            Some(ChunkType::TableTypeSpec) => {
                let spec = decode_type_spec(&child, &package)?;
                log::trace!(
                    "type spec {:?} ({:#04x}): {} entries",
                    package.type_name(spec.id).unwrap_or_default(),
                    spec.id,
                    spec.entry_count
                );
                package.specs.retain(|s| s.id != spec.id);
                package.specs.push(spec);
            }
            Some(ChunkType::TableType) => {
                let (type_id, config) = decode_type(&child, &package, index)?;
                log::trace!(
                    "type {:?} ({:#04x}) for {}",
                    package.type_name(type_id).unwrap_or_default(),
                    type_id,
                    config
                );
                match package.types.iter_mut().find(|ty| ty.id == type_id) {
                    Some(ty) => ty.configs.push(config),
                    None => package.types.push(Type {
                        id: type_id,
                        configs: vec![config],
                    }),
                }
            }
            Some(ChunkType::TableLibrary) => {
                package.libraries.extend(decode_library(&child)?);
            }
            _ => log::trace!("skipping package chunk {:#06x}", child.ty()),
        }
    }
    Ok(package)
}

fn decode_type_spec(chunk: &Chunk, package: &Package) -> Result<TypeSpec> {
    chunk.expect(ChunkType::TableTypeSpec, TYPE_SPEC_HEADER_SIZE)?;
    let mut r = chunk.cursor_at(8)?;
    let id = r.read_u8()?;
    let _res0 = r.read_u8()?;
    let _types_count = r.read_u16::<LittleEndian>()?;
    let entry_count = r.read_u32::<LittleEndian>()?;
    package.check_type(id)?;

    let mut r = chunk.cursor_at(chunk.header_size())?;
    let available = chunk.body().len() / 4;
    if entry_count as usize > available {
        return Err(Error::MalformedChunk(format!(
            "type spec {:#04x} declares {} entries but holds {}",
            id, entry_count, available
        )));
    }
    let mut flags = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        flags.push(r.read_u32::<LittleEndian>()?);
    }
    Ok(TypeSpec {
        id,
        entry_count,
        flags,
    })
}

/// Reads the entry table of a type chunk as `(entry index, offset)` pairs,
/// skipping absent entries.
fn entry_offsets(
    r: &mut Cursor<&[u8]>,
    flags: u8,
    entry_count: u32,
) -> Result<Vec<(u32, u32)>> {
    let mut offsets = vec![];
    for i in 0..entry_count {
        if flags & TYPE_FLAG_SPARSE != 0 {
            let index = r.read_u16::<LittleEndian>()? as u32;
            let offset = r.read_u16::<LittleEndian>()? as u32 * 4;
            offsets.push((index, offset));
        } else if flags & TYPE_FLAG_OFFSET16 != 0 {
            let offset = r.read_u16::<LittleEndian>()?;
            if offset != NO_ENTRY16 {
                offsets.push((i, offset as u32 * 4));
            }
        } else {
            let offset = r.read_u32::<LittleEndian>()?;
            if offset != NO_ENTRY {
                offsets.push((i, offset));
            }
        }
    }
    Ok(offsets)
}

fn decode_type(
    chunk: &Chunk,
    package: &Package,
    index: &mut HashMap<ResId, Vec<Candidate>>,
) -> Result<(u8, Configuration)> {
    chunk.expect(ChunkType::TableType, TYPE_HEADER_MIN_SIZE)?;
    let mut r = chunk.cursor_at(8)?;
    let type_id = r.read_u8()?;
    let flags = r.read_u8()?;
    let _reserved = r.read_u16::<LittleEndian>()?;
    let entry_count = r.read_u32::<LittleEndian>()?;
    let entries_start = r.read_u32::<LittleEndian>()?;
    let config = Configuration::read(&mut Cursor::new(&chunk.bytes()[20..chunk.header_size()]))?;

    package.check_type(type_id)?;
    let spec = package.spec(type_id).ok_or(Error::UnknownType {
        package: package.id,
        type_id,
    })?;

    let width = if flags & TYPE_FLAG_SPARSE == 0 && flags & TYPE_FLAG_OFFSET16 != 0 {
        2
    } else {
        4
    };
    if entry_count as usize > chunk.body().len() / width {
        return Err(Error::MalformedChunk(format!(
            "type {:#04x} declares {} entries in {} bytes",
            type_id,
            entry_count,
            chunk.body().len()
        )));
    }
    let mut r = chunk.cursor_at(chunk.header_size())?;
    let offsets = entry_offsets(&mut r, flags, entry_count)?;

    for (entry_index, offset) in offsets {
        let invalid = Error::InvalidEntryOffset {
            type_id,
            index: entry_index,
            offset,
        };
        if entry_index >= spec.entry_count || entry_index > u16::MAX as u32 {
            return Err(invalid);
        }
        let pos = entries_start as usize + offset as usize;
        if pos < chunk.header_size() || pos + 8 > chunk.size() {
            return Err(invalid);
        }
        let entry = decode_entry(chunk, pos)?;
        let id = ResId::new(package.id, type_id, entry_index as u16);
        index.entry(id).or_default().push(Candidate { config, entry });
    }
    Ok((type_id, config))
}

fn decode_entry(chunk: &Chunk, pos: usize) -> Result<Entry> {
    let mut r = chunk.cursor_at(pos)?;
    let size = r.read_u16::<LittleEndian>()?;
    let flags = r.read_u16::<LittleEndian>()?;
    if flags & ENTRY_FLAG_COMPACT != 0 {
        let data = r.read_u32::<LittleEndian>()?;
        let ty = (flags >> 8) as u8;
        return Ok(Entry {
            key: size as u32,
            flags: flags & 0x00ff,
            value: EntryValue::Simple(Value::from_raw(ty, data)),
        });
    }
    let key = r.read_u32::<LittleEndian>()?;
    if flags & ENTRY_FLAG_COMPLEX != 0 {
        let parent = ResId::from(r.read_u32::<LittleEndian>()?);
        let count = r.read_u32::<LittleEndian>()?;
        let mut r = chunk.cursor_at(pos + size as usize)?;
        let mut map: Vec<(ResId, Value)> = vec![];
        for _ in 0..count {
            let name = ResId::from(r.read_u32::<LittleEndian>()?);
            let value = Value::read(&mut r)?;
            match map.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => map.push((name, value)),
            }
        }
        Ok(Entry {
            key,
            flags,
            value: EntryValue::Complex { parent, map },
        })
    } else {
        let mut r = chunk.cursor_at(pos + size as usize)?;
        Ok(Entry {
            key,
            flags,
            value: EntryValue::Simple(Value::read(&mut r)?),
        })
    }
}

fn decode_library(chunk: &Chunk) -> Result<Vec<(u8, String)>> {
    chunk.expect(ChunkType::TableLibrary, LIBRARY_HEADER_SIZE)?;
    let count = chunk.cursor_at(8)?.read_u32::<LittleEndian>()?;
    let mut r = chunk.cursor_at(chunk.header_size())?;
    let mut libraries = vec![];
    for _ in 0..count {
        let id = r.read_u32::<LittleEndian>()?;
        let id = u8::try_from(id).map_err(|_| {
            Error::MalformedChunk(format!("library package id {:#x} exceeds 8 bits", id))
        })?;
        let name = read_name(&mut r)?;
        libraries.push((id, name));
    }
    Ok(libraries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::res::writer::{EntryBuilder, EntryLayout, PackageBuilder, TableBuilder, TypeBuilder};

    fn string_table(layout: EntryLayout, present: &[u16], count: u16) -> ResourceTable {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "com.example");
        let ty = package.type_id("integer");
        let mut builder = TypeBuilder::new(ty, Configuration::default()).with_layout(layout);
        for i in 0..count {
            let key = package.key(&format!("value{}", i));
            if present.contains(&i) {
                builder = builder.entry(i, EntryBuilder::simple(key, Value::IntDec(i as i32 * 10)));
            }
        }
        // Pad the type to `count` entries.
        builder.entries.resize(count as usize, None);
        package.push(builder);
        table.package(package);
        ResourceTable::decode(&table.build().unwrap()).unwrap()
    }

    fn id(entry: u16) -> ResId {
        ResId::new(0x7f, 1, entry)
    }

    #[test]
    fn no_entry_is_not_indexed() {
        for layout in [EntryLayout::Dense, EntryLayout::Offset16, EntryLayout::Sparse] {
            let table = string_table(layout, &[0, 1, 2, 4], 5);
            assert!(table.candidates(id(3)).is_empty(), "{:?}", layout);
            for i in [0, 1, 2, 4] {
                let candidates = table.candidates(id(i));
                assert_eq!(candidates.len(), 1);
                assert_eq!(
                    candidates[0].entry.value,
                    EntryValue::Simple(Value::IntDec(i as i32 * 10))
                );
            }
            assert!(matches!(
                table.resolve(id(3), None),
                Err(Error::ResourceNotFound(_))
            ));
        }
    }

    #[test]
    fn names_and_packages() {
        let table = string_table(EntryLayout::Dense, &[0, 1], 2);
        assert_eq!(table.default_package_id(), Some(0x7f));
        assert_eq!(table.package(0x7f).unwrap().name, "com.example");
        assert!(matches!(table.package(0x01), Err(Error::UnknownPackage(0x01))));
        assert_eq!(table.entry_name(id(1)).as_deref(), Some("integer/value1"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn complex_entries_keep_last_write() {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        let style = package.type_id("style");
        let key = package.key("Theme");
        let attr = ResId::from(0x0101_0000);
        package.push(TypeBuilder::new(style, Configuration::default()).entry(
            0,
            EntryBuilder::complex(
                key,
                ResId::from(0x0103_0000),
                vec![(attr, Value::IntDec(1)), (attr, Value::IntDec(2))],
            ),
        ));
        table.package(package);
        let table = ResourceTable::decode(&table.build().unwrap()).unwrap();
        let candidate = &table.candidates(ResId::new(0x7f, style, 0))[0];
        assert_eq!(
            candidate.entry.value,
            EntryValue::Complex {
                parent: ResId::from(0x0103_0000),
                map: vec![(attr, Value::IntDec(2))],
            }
        );
    }

    #[test]
    fn compact_entries() {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        let color = package.type_id("color");
        let key = package.key("accent") as u16;
        package.push(
            TypeBuilder::new(color, Configuration::default())
                .entry(0, EntryBuilder::compact(key, Value::ColorArgb8(0xff11_2233))),
        );
        table.package(package);
        let table = ResourceTable::decode(&table.build().unwrap()).unwrap();
        let entry = &table.candidates(ResId::new(0x7f, color, 0))[0].entry;
        assert_eq!(entry.key, key as u32);
        assert_eq!(entry.value, EntryValue::Simple(Value::ColorArgb8(0xff11_2233)));
        assert_eq!(table.entry_name(ResId::new(0x7f, color, 0)).as_deref(), Some("color/accent"));
    }

    #[test]
    fn type_outside_pool_is_unknown() {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        package.type_id("string");
        package.push(TypeBuilder::new(5, Configuration::default()));
        table.package(package);
        let err = ResourceTable::decode(&table.build().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownType {
                package: 0x7f,
                type_id: 5
            }
        ));
    }

    #[test]
    fn entry_offset_outside_chunk_is_invalid() {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        let ty = package.type_id("integer");
        let key = package.key("x");
        package.push(
            TypeBuilder::new(ty, Configuration::default())
                .entry(0, EntryBuilder::simple(key, Value::IntDec(1))),
        );
        table.package(package);
        let mut bytes = table.build().unwrap();
        // The only entry offset is the first u32 after the type header,
        // which closes the image: 84 byte header, 4 byte offset, 16 byte entry.
        let offset_pos = bytes.len() - 16 - 4;
        bytes[offset_pos..offset_pos + 4].copy_from_slice(&0x100u32.to_le_bytes());
        let err = ResourceTable::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEntryOffset {
                index: 0,
                offset: 0x100,
                ..
            }
        ));
    }

    #[test]
    fn libraries_are_recorded() {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        package.library(0x02, "com.example.shared");
        table.package(package);
        let table = ResourceTable::decode(&table.build().unwrap()).unwrap();
        assert_eq!(
            table.packages()[0].libraries,
            vec![(0x02, "com.example.shared".to_string())]
        );
    }

    #[test]
    fn wide_library_id_is_malformed() {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        package.library(0x02, "com.example.shared");
        table.package(package);
        let mut bytes = table.build().unwrap();
        let name: Vec<u8> = "com.example.shared"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        let at = bytes
            .windows(name.len())
            .position(|w| w == name.as_slice())
            .unwrap();
        bytes[at - 4..at].copy_from_slice(&0x0102u32.to_le_bytes());
        let err = ResourceTable::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedChunk(_)), "{:?}", err);
    }

    #[test]
    fn truncated_table_is_malformed() {
        let bytes = string_table_bytes();
        let err = ResourceTable::decode(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, Error::MalformedChunk(_)));
    }

    fn string_table_bytes() -> Vec<u8> {
        let mut table = TableBuilder::new();
        let mut package = PackageBuilder::new(0x7f, "app");
        let ty = package.type_id("string");
        let key = package.key("app_name");
        let value = table.string("Example");
        package.push(
            TypeBuilder::new(ty, Configuration::default())
                .entry(0, EntryBuilder::simple(key, Value::String(value))),
        );
        table.package(package);
        table.build().unwrap()
    }

    #[test]
    fn table_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ResourceTable>();
    }
}
