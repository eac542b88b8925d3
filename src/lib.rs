//! Decoding of the compiled formats inside Android packages.
//!
//! [`res`] holds the format layer: chunk framing, string pools, the
//! `resources.arsc` table with configuration matching, and binary XML.
//! [`apk`] puts it to work on an archive.

pub mod apk;
pub mod core;
pub mod error;
pub mod res;

pub use apk::manifest::Manifest;
pub use apk::{parse_apk, ApkInfo, ApkParser};
pub use crate::core::config::ParserConfig;
pub use error::{Error, Result};
pub use res::{Configuration, ResId, ResourceTable, Resolver, Value, XmlDocument};
