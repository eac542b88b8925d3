//! Error kinds produced while decoding chunk streams and resolving resources.

use crate::res::ResId;
use thiserror::Error;

/// The error type for every decode and resolve operation in this crate.
///
/// Framing and structural variants abort the enclosing decode. Resolution
/// variants ([`Error::ResourceNotFound`], [`Error::CyclicStyleReference`],
/// [`Error::ReferenceTooDeep`]) only concern the identifier being resolved.
#[derive(Debug, Error)]
pub enum Error {
    /// A chunk header or a read inside a chunk violated the framing bounds.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// A string pool was indexed outside of its range.
    #[error("string index {index} out of range (pool holds {count} strings)")]
    IndexOutOfRange { index: i64, count: usize },

    /// No package with this id exists in the table.
    #[error("unknown package {0:#04x}")]
    UnknownPackage(u8),

    /// A type chunk names a type that the package never declared.
    #[error("unknown type {type_id:#04x} in package {package:#04x}")]
    UnknownType { package: u8, type_id: u8 },

    /// An entry offset points outside of its type chunk.
    #[error("invalid entry offset {offset:#x} for entry {index} of type {type_id:#04x}")]
    InvalidEntryOffset {
        type_id: u8,
        index: u32,
        offset: u32,
    },

    /// The identifier is valid but the table holds no entry for it.
    #[error("resource {0} not found")]
    ResourceNotFound(ResId),

    /// A style parent chain revisited a style.
    #[error("cyclic style reference through {0}")]
    CyclicStyleReference(ResId),

    /// A reference chain exceeded the hop limit.
    #[error("reference chain starting at {id} exceeds {limit} hops")]
    ReferenceTooDeep { id: ResId, limit: usize },

    /// An end element did not close the innermost open element.
    #[error("unbalanced element: expected </{expected}>, found {found}")]
    UnbalancedElement { expected: String, found: String },

    /// The input is a plain-text XML document rather than a binary chunk stream.
    #[error("manifest is plain text XML, not binary XML")]
    PlainTextManifest,

    /// An internal invariant failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // Every cursor in this crate reads from an in-memory slice, so the only
        // io failure is running off the end of the bounded chunk.
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::MalformedChunk("read past the end of the chunk".to_string())
            }
            _ => Error::Internal(err.to_string()),
        }
    }
}

/// A convenience `Result` type alias using the crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
