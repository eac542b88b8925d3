//! Locating the launcher icon's raster bytes.
//!
//! The manifest names the icon either as a file path or as a resource id.
//! A resource has one file per configuration, and an adaptive icon is an XML
//! file whose foreground names yet another drawable. [`IconResolver`] walks
//! that chain as an explicit loop over [`IconState`], so a cycle in the
//! archive ends in an error instead of a stack overflow.

use crate::core::config::MAX_ICON_DEPTH;
use crate::res::config::{Configuration, DENSITY_ANY, DENSITY_MEDIUM, DENSITY_NONE};
use crate::res::table::{EntryValue, ResourceTable};
use crate::res::value::{ResId, Value};
use crate::res::xml::{self, Element, XmlDocument};
use crate::res::Resolver;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;

/// `android:icon`.
pub const ATTR_ICON: u32 = 0x0101_0002;
/// `android:drawable`.
pub const ATTR_DRAWABLE: u32 = 0x0101_0199;

const RASTER_EXTENSIONS: &[&str] = &[".png", ".webp", ".jpg", ".jpeg"];

pub fn is_raster(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    RASTER_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IconState {
    Resource(ResId),
    File(String),
}

impl IconState {
    /// Reads the manifest's `android:icon` text: `@0x…` for a reference the
    /// renderer could not resolve, a path otherwise.
    pub fn from_manifest(icon: &str) -> Self {
        match icon.parse::<ResId>() {
            Ok(id) if icon.starts_with('@') => IconState::Resource(id),
            _ => IconState::File(icon.to_string()),
        }
    }
}

/// The resource named by `<application android:icon>` in a decoded
/// manifest, before any configuration was picked for it.
pub fn icon_reference(doc: &XmlDocument, default_package: Option<u8>) -> Option<ResId> {
    let root = doc.root()?;
    let application = root
        .elements()
        .find(|e| matches!(doc.element_name(e), Ok("application")))?;
    let id = application
        .attributes
        .iter()
        .find(|a| {
            a.name_resource == Some(ResId::from(ATTR_ICON))
                || matches!(doc.string(a.name), Ok("icon"))
        })?
        .value
        .reference()?;
    Some(id.or_package(default_package.unwrap_or(id.package())))
}

/// The raster file an icon chain ended at.
#[derive(Clone, Debug, PartialEq)]
pub struct IconFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

pub struct IconResolver<'a> {
    table: Option<&'a ResourceTable>,
    target: Option<Configuration>,
    max_depth: usize,
}

impl<'a> IconResolver<'a> {
    pub fn new(table: Option<&'a ResourceTable>) -> Self {
        Self {
            table,
            target: None,
            max_depth: MAX_ICON_DEPTH,
        }
    }

    pub fn with_target(mut self, target: Option<Configuration>) -> Self {
        self.target = target;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Follows `start` to a raster file, reading archive entries through
    /// `read`.
    pub fn resolve<F>(&self, start: IconState, mut read: F) -> Result<IconFile>
    where
        F: FnMut(&str) -> Result<Vec<u8>>,
    {
        let mut visited = HashSet::new();
        let mut state = start;
        loop {
            if visited.len() >= self.max_depth {
                bail!("icon chain is deeper than {} steps", self.max_depth);
            }
            if !visited.insert(state.clone()) {
                bail!("icon chain loops back to {:?}", state);
            }
            log::debug!("icon step {:?}", state);
            state = match state {
                IconState::Resource(id) => IconState::File(self.file_for(id)?),
                IconState::File(path) if is_raster(&path) => {
                    let bytes = read(&path)?;
                    return Ok(IconFile { path, bytes });
                }
                IconState::File(path) if path.ends_with(".xml") => {
                    let bytes = read(&path)?;
                    let doc = xml::decode(&bytes)
                        .with_context(|| format!("Failed to decode icon drawable {}", path))?;
                    self.foreground(&doc)
                        .with_context(|| format!("Unsupported icon drawable {}", path))?
                }
                IconState::File(path) => bail!("{} is not an image", path),
            };
        }
    }

    fn table(&self) -> Result<&'a ResourceTable> {
        self.table
            .ok_or_else(|| anyhow!("icon is a resource but the archive has no resource table"))
    }

    /// The file behind a drawable resource. Raster files win, the denser
    /// the better; otherwise the entry picked for the target configuration.
    fn file_for(&self, id: ResId) -> Result<String> {
        let table = self.table()?;
        let raster = table
            .candidates(id)
            .iter()
            .filter_map(|candidate| match candidate.entry.value {
                EntryValue::Simple(Value::String(index)) => table
                    .strings()
                    .string(index)
                    .ok()
                    .filter(|path| is_raster(path))
                    .map(|path| (density_rank(candidate.config.density), path)),
                _ => None,
            })
            // Ties keep the first declared.
            .fold(None, |best: Option<(u32, &str)>, (rank, path)| match best {
                Some((best_rank, _)) if best_rank >= rank => best,
                _ => Some((rank, path)),
            });
        if let Some((_, path)) = raster {
            return Ok(path.to_string());
        }

        let mut resolver = Resolver::new(table);
        if let Some(target) = self.target {
            resolver = resolver.with_target(target);
        }
        let resolved = resolver.resolve(id)?;
        match resolved.value {
            Value::String(_) => Ok(resolved.text),
            other => bail!("{} resolves to {:?}, not a file", id, other),
        }
    }

    /// The next state named by an adaptive icon's foreground layer.
    fn foreground(&self, doc: &XmlDocument) -> Result<IconState> {
        let root = doc.root().ok_or_else(|| anyhow!("empty document"))?;
        let root_name = doc.element_name(root)?;
        if root_name != "adaptive-icon" {
            bail!("<{}> is not an adaptive icon", root_name);
        }
        let foreground = root
            .elements()
            .find(|e| matches!(doc.element_name(e), Ok("foreground")))
            .ok_or_else(|| anyhow!("adaptive icon has no foreground"))?;
        self.drawable(doc, foreground)
    }

    fn drawable(&self, doc: &XmlDocument, element: &Element) -> Result<IconState> {
        let attr = element
            .attributes
            .iter()
            .find(|a| {
                a.name_resource == Some(ResId::from(ATTR_DRAWABLE))
                    || matches!(doc.string(a.name), Ok("drawable"))
            })
            .ok_or_else(|| anyhow!("foreground has no drawable"))?;
        if let Some(id) = attr.value.reference() {
            let package = self
                .table
                .and_then(ResourceTable::default_package_id)
                .unwrap_or(id.package());
            return Ok(IconState::Resource(id.or_package(package)));
        }
        let path = match (attr.value, attr.raw_value) {
            (Value::String(index), _) | (_, Some(index)) => doc.string(index)?,
            (other, None) => bail!("foreground drawable is {:?}", other),
        };
        Ok(IconState::from_manifest(path))
    }
}

fn density_rank(density: u16) -> u32 {
    match density {
        0 => DENSITY_MEDIUM as u32,
        DENSITY_ANY | DENSITY_NONE => 0,
        d => d as u32,
    }
}
