//! Binary XML (`AXML`) decoding and rendering back to text.

use crate::error::{Error, Result};
use crate::res::chunk::{Chunk, ChunkReader, ChunkType};
use crate::res::config::Configuration;
use crate::res::resolve::{Resolver, MAX_REFERENCE_DEPTH};
use crate::res::string_pool::StringPool;
use crate::res::table::{ResourceTable, NO_ENTRY};
use crate::res::value::{ResId, Value};
use byteorder::{LittleEndian, ReadBytesExt};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// `ResXMLTree_node`: the common header plus line number and comment.
const NODE_HEADER_SIZE: usize = 16;
const ATTRIBUTE_SIZE: usize = 20;
const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

fn index(raw: u32) -> Option<u32> {
    if raw == NO_ENTRY {
        None
    } else {
        Some(raw)
    }
}

/// A `xmlns` declaration in scope for the element that follows it.
#[derive(Clone, Debug, PartialEq)]
pub struct NamespaceDecl {
    pub prefix: Option<u32>,
    pub uri: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub namespace: Option<u32>,
    pub name: u32,
    /// The id the resource map assigns to the name slot.
    pub name_resource: Option<ResId>,
    /// The original string value, when the compiler kept one.
    pub raw_value: Option<u32>,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub namespace: Option<u32>,
    pub name: u32,
    pub line: u32,
    pub attributes: Vec<Attribute>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Text {
    pub data: u32,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(Text),
    Namespace(NamespaceDecl),
}

/// A decoded binary XML document. The document owns its string pool and
/// resource map, so it outlives the input bytes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlDocument {
    strings: StringPool,
    resource_map: Vec<u32>,
    nodes: Vec<XmlNode>,
}

/// Options for [`XmlDocument::render`].
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions<'a> {
    /// Table used to resolve reference values. Without one, references
    /// render as `@0x…`.
    pub table: Option<&'a ResourceTable>,
    pub config: Option<&'a Configuration>,
    /// Spaces per nesting level; `0` writes everything on one line.
    pub indent: usize,
    pub max_depth: usize,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        Self {
            table: None,
            config: None,
            indent: 2,
            max_depth: MAX_REFERENCE_DEPTH,
        }
    }
}

impl<'a> RenderOptions<'a> {
    pub fn with_table(table: &'a ResourceTable) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    fn resolver(&self) -> Option<Resolver<'a>> {
        let table = self.table?;
        let mut resolver = Resolver::new(table).with_max_depth(self.max_depth);
        if let Some(config) = self.config {
            resolver = resolver.with_target(*config);
        }
        Some(resolver)
    }
}

/// True when `bytes` look like a text XML document rather than a chunk
/// stream.
pub fn is_plain_text(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map_or(false, |b| *b == b'<')
}

/// Decodes a binary XML document.
pub fn decode(bytes: &[u8]) -> Result<XmlDocument> {
    if is_plain_text(bytes) {
        return Err(Error::PlainTextManifest);
    }
    let root = ChunkReader::new(bytes)
        .next_chunk()?
        .ok_or_else(|| Error::MalformedChunk("empty xml document".to_string()))?;
    root.expect(ChunkType::Xml, 8)?;

    let mut doc = XmlDocument::default();
    let mut strings = None;
    let mut stack: Vec<Element> = vec![];
    for child in root.children() {
        let child = child?;
        match child.kind() {
            Some(ChunkType::StringPool) if strings.is_none() => {
                strings = Some(StringPool::decode(&child)?);
            }
            Some(ChunkType::XmlResourceMap) => {
                let mut r = child.cursor_at(child.header_size())?;
                for _ in 0..child.body().len() / 4 {
                    doc.resource_map.push(r.read_u32::<LittleEndian>()?);
                }
            }
            Some(ChunkType::XmlStartNamespace) => {
                let (prefix, uri) = read_pair(&child, ChunkType::XmlStartNamespace)?;
                let uri = uri.ok_or_else(|| {
                    Error::MalformedChunk("namespace declaration without uri".to_string())
                })?;
                push(
                    &mut stack,
                    &mut doc.nodes,
                    XmlNode::Namespace(NamespaceDecl { prefix, uri }),
                );
            }
            Some(ChunkType::XmlEndNamespace) => {
                read_pair(&child, ChunkType::XmlEndNamespace)?;
            }
            Some(ChunkType::XmlStartElement) => {
                let element = read_element(&child, &doc.resource_map)?;
                log::trace!("start element {} at line {}", element.name, element.line);
                stack.push(element);
            }
            Some(ChunkType::XmlEndElement) => {
                let (namespace, name) = read_pair(&child, ChunkType::XmlEndElement)?;
                let pool = strings.as_ref();
                let found = || qualified_name(pool, namespace, name.unwrap_or(NO_ENTRY));
                let element = stack.pop().ok_or_else(|| Error::UnbalancedElement {
                    expected: "no open element".to_string(),
                    found: format!("</{}>", found()),
                })?;
                if element.namespace != namespace || Some(element.name) != name {
                    return Err(Error::UnbalancedElement {
                        expected: qualified_name(pool, element.namespace, element.name),
                        found: format!("</{}>", found()),
                    });
                }
                push(&mut stack, &mut doc.nodes, XmlNode::Element(element));
            }
            Some(ChunkType::XmlCdata) => {
                child.expect(ChunkType::XmlCdata, NODE_HEADER_SIZE)?;
                let mut r = child.cursor_at(child.header_size())?;
                let data = r.read_u32::<LittleEndian>()?;
                let value = Value::read(&mut r)?;
                push(&mut stack, &mut doc.nodes, XmlNode::Text(Text { data, value }));
            }
            _ => log::trace!("skipping xml chunk {:#06x}", child.ty()),
        }
    }
    if let Some(open) = stack.pop() {
        return Err(Error::UnbalancedElement {
            expected: qualified_name(strings.as_ref(), open.namespace, open.name),
            found: "end of document".to_string(),
        });
    }
    doc.strings = strings.unwrap_or_default();
    Ok(doc)
}

/// Decodes `bytes` and renders them with the default options.
pub fn decode_to_string(bytes: &[u8], table: Option<&ResourceTable>) -> Result<String> {
    let opts = RenderOptions {
        table,
        ..RenderOptions::default()
    };
    decode(bytes)?.render(&opts)
}

fn push(stack: &mut [Element], nodes: &mut Vec<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => nodes.push(node),
    }
}

fn qualified_name(strings: Option<&StringPool>, namespace: Option<u32>, name: u32) -> String {
    let lookup = |i: u32| {
        strings
            .and_then(|pool| pool.string(i).ok())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", i))
    };
    match namespace {
        Some(ns) => format!("{{{}}}{}", lookup(ns), lookup(name)),
        None => lookup(name),
    }
}

/// Reads the two indices that make up namespace and end element bodies.
fn read_pair(chunk: &Chunk, kind: ChunkType) -> Result<(Option<u32>, Option<u32>)> {
    chunk.expect(kind, NODE_HEADER_SIZE)?;
    let mut r = chunk.cursor_at(chunk.header_size())?;
    let first = r.read_u32::<LittleEndian>()?;
    let second = r.read_u32::<LittleEndian>()?;
    Ok((index(first), index(second)))
}

fn read_element(chunk: &Chunk, resource_map: &[u32]) -> Result<Element> {
    chunk.expect(ChunkType::XmlStartElement, NODE_HEADER_SIZE)?;
    let line = chunk.cursor_at(8)?.read_u32::<LittleEndian>()?;
    let body = chunk.header_size();
    let mut r = chunk.cursor_at(body)?;
    let namespace = index(r.read_u32::<LittleEndian>()?);
    let name = r.read_u32::<LittleEndian>()?;
    let attribute_start = r.read_u16::<LittleEndian>()? as usize;
    let attribute_size = r.read_u16::<LittleEndian>()? as usize;
    let attribute_count = r.read_u16::<LittleEndian>()? as usize;
    if attribute_count > 0 && attribute_size < ATTRIBUTE_SIZE {
        return Err(Error::MalformedChunk(format!(
            "attribute size {} is below {}",
            attribute_size, ATTRIBUTE_SIZE
        )));
    }
    if name == NO_ENTRY {
        return Err(Error::MalformedChunk(format!(
            "element at line {} has no name",
            line
        )));
    }

    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let mut r = chunk.cursor_at(body + attribute_start + i * attribute_size)?;
        let namespace = index(r.read_u32::<LittleEndian>()?);
        let name = r.read_u32::<LittleEndian>()?;
        let raw_value = index(r.read_u32::<LittleEndian>()?);
        let value = Value::read(&mut r)?;
        attributes.push(Attribute {
            namespace,
            name,
            name_resource: resource_map.get(name as usize).map(|id| ResId::from(*id)),
            raw_value,
            value,
        });
    }
    Ok(Element {
        namespace,
        name,
        line,
        attributes,
        children: vec![],
    })
}

impl XmlDocument {
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn resource_map(&self) -> &[u32] {
        &self.resource_map
    }

    pub fn nodes(&self) -> &[XmlNode] {
        &self.nodes
    }

    /// The first top-level element.
    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn string(&self, index: u32) -> Result<&str> {
        self.strings.string(index)
    }

    pub fn element_name(&self, element: &Element) -> Result<&str> {
        self.strings.string(element.name)
    }

    /// The local name of an attribute. Obfuscated documents leave names
    /// empty; those are recovered from the resource map, through the table
    /// when one is given, else as `attr_0x…`.
    pub fn attribute_name(&self, attr: &Attribute, table: Option<&ResourceTable>) -> String {
        match self.strings.string(attr.name) {
            Ok(name) if !name.is_empty() => return name.to_string(),
            _ => {}
        }
        match attr.name_resource {
            Some(id) => table
                .and_then(|table| table.key_name(id))
                .map(str::to_string)
                .unwrap_or_else(|| format!("attr_{}", id)),
            None => format!("attr_{}", attr.name),
        }
    }

    /// Renders an attribute value as text, resolving references through the
    /// table in `opts`. A reference that fails to resolve renders as
    /// `@0x…`.
    pub fn attribute_text(&self, attr: &Attribute, opts: &RenderOptions) -> String {
        if let Some(id) = attr.value.reference() {
            if let (Some(resolver), Some(package)) = (
                opts.resolver(),
                opts.table.and_then(ResourceTable::default_package_id),
            ) {
                match resolver.resolve(id.or_package(package)) {
                    Ok(resolved) => return resolved.text,
                    Err(err) => log::debug!("leaving {} unresolved: {}", id, err),
                }
            }
            return attr.value.to_string();
        }
        match (attr.value, attr.raw_value) {
            (Value::Null, Some(raw)) => self
                .strings
                .string(raw)
                .map(str::to_string)
                .unwrap_or_default(),
            (value, _) => value.render(Some(&self.strings)),
        }
    }

    /// Renders the document as text XML.
    pub fn render(&self, opts: &RenderOptions) -> Result<String> {
        let mut writer = if opts.indent > 0 {
            Writer::new_with_indent(Vec::new(), b' ', opts.indent)
        } else {
            Writer::new(Vec::new())
        };
        let mut renderer = Renderer {
            doc: self,
            opts,
            scope: vec![],
            pending: vec![],
        };
        write_event(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        )?;
        renderer.nodes(&mut writer, &self.nodes)?;
        String::from_utf8(writer.into_inner())
            .map_err(|err| Error::Internal(format!("rendered xml is not utf-8: {}", err)))
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|err| Error::Internal(format!("failed to write xml: {}", err)))
}

struct Renderer<'d, 'o> {
    doc: &'d XmlDocument,
    opts: &'o RenderOptions<'o>,
    /// Declared `(prefix, uri)` pairs, innermost last.
    scope: Vec<(String, String)>,
    /// Declarations to attach to the next element.
    pending: Vec<(String, String)>,
}

impl Renderer<'_, '_> {
    fn lookup(&self, index: u32) -> String {
        self.doc
            .strings
            .string(index)
            .map(str::to_string)
            .unwrap_or_else(|_| format!("#{}", index))
    }

    /// `prefix:name` for a namespaced name, or just `name`.
    fn qualify(&self, namespace: Option<u32>, name: String) -> String {
        let Some(namespace) = namespace else {
            return name;
        };
        let uri = self.lookup(namespace);
        match self.scope.iter().rev().find(|(_, u)| *u == uri) {
            Some((prefix, _)) if !prefix.is_empty() => format!("{}:{}", prefix, name),
            Some(_) => name,
            None => {
                log::debug!("namespace {:?} of {} is not declared", uri, name);
                name
            }
        }
    }

    fn nodes(&mut self, writer: &mut Writer<Vec<u8>>, nodes: &[XmlNode]) -> Result<()> {
        for node in nodes {
            match node {
                XmlNode::Namespace(decl) => {
                    let prefix = decl.prefix.map(|p| self.lookup(p)).unwrap_or_default();
                    let uri = self.lookup(decl.uri);
                    self.scope.push((prefix.clone(), uri.clone()));
                    self.pending.push((prefix, uri));
                }
                XmlNode::Text(text) => {
                    let content = self.lookup(text.data);
                    write_event(writer, Event::Text(BytesText::new(&content)))?;
                }
                XmlNode::Element(element) => self.element(writer, element)?,
            }
        }
        Ok(())
    }

    fn element(&mut self, writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
        let name = self.qualify(element.namespace, self.lookup(element.name));
        let mut start = BytesStart::new(name.as_str());
        for (prefix, uri) in self.pending.drain(..) {
            let key = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", prefix)
            };
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for attr in &element.attributes {
            let key = self.qualify(attr.namespace, self.doc.attribute_name(attr, self.opts.table));
            let value = self.doc.attribute_text(attr, self.opts);
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let scope_len = self.scope.len();
        if element.children.is_empty() {
            write_event(writer, Event::Empty(start))?;
        } else {
            write_event(writer, Event::Start(start))?;
            self.nodes(writer, &element.children)?;
            write_event(writer, Event::End(BytesEnd::new(name.as_str())))?;
        }
        self.scope.truncate(scope_len);
        Ok(())
    }
}
