//! Android compiled resource formats: the chunk framing shared by binary XML
//! and `resources.arsc`, the decoders built on it, and matching encoders.

pub mod chunk;
pub mod config;
pub mod resolve;
pub mod string_pool;
pub mod table;
pub mod value;
pub mod writer;
pub mod xml;

pub use chunk::{Chunk, ChunkReader, ChunkType};
pub use config::Configuration;
pub use resolve::{Resolved, Resolver, MAX_REFERENCE_DEPTH};
pub use string_pool::{StringPool, StyleSpan};
pub use table::{Candidate, Entry, EntryValue, Package, ResourceTable, Type, TypeSpec};
pub use value::{ResId, Value, ValueType};
pub use writer::{
    AttrValue, ChunkWriter, EntryBuilder, EntryData, EntryLayout, PackageBuilder, TableBuilder,
    TypeBuilder, XmlAttr, XmlBuilder,
};
pub use xml::{
    decode as decode_xml, Attribute, Element, NamespaceDecl, RenderOptions, Text, XmlDocument,
    XmlNode,
};
