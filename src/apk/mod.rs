//! Reading an APK: the zip container, its resource table, the manifest and
//! the launcher icon.

pub mod icon;
pub mod manifest;

use crate::core::config::ParserConfig;
use crate::error::Error;
use crate::res::config::Configuration;
use crate::res::table::ResourceTable;
use crate::res::xml::{self, RenderOptions, XmlDocument};
use anyhow::{Context, Result};
use icon::{icon_reference, IconFile, IconResolver, IconState};
use image::DynamicImage;
use manifest::Manifest;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
pub const RESOURCES_ENTRY: &str = "resources.arsc";

/// Everything [`parse_apk`] extracts.
pub struct ApkInfo {
    pub manifest: Manifest,
    pub icon: Option<DynamicImage>,
}

pub struct ApkParser<R> {
    zip: ZipArchive<R>,
    resources: Option<ResourceTable>,
    target: Option<Configuration>,
    config: ParserConfig,
}

impl ApkParser<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, config: ParserConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("While opening file `{}`", path.display()))?;
        Self::new(BufReader::new(file), config)
    }
}

impl<R: Read + Seek> ApkParser<R> {
    /// Opens the archive and decodes `resources.arsc` once. Without a usable
    /// table, parsing goes on with references left unresolved.
    pub fn new(reader: R, config: ParserConfig) -> Result<Self> {
        let mut zip = ZipArchive::new(reader).context("Failed to open APK as zip")?;
        let resources = match zip_entries(&mut zip, RESOURCES_ENTRY)?.first() {
            Some(bytes) => match ResourceTable::decode(bytes) {
                Ok(table) => {
                    log::debug!(
                        "{} holds {} resources in {} packages",
                        RESOURCES_ENTRY,
                        table.len(),
                        table.packages().len()
                    );
                    Some(table)
                }
                Err(err) => {
                    log::warn!("Failed to parse {}: {}", RESOURCES_ENTRY, err);
                    None
                }
            },
            None => {
                log::warn!("{} not found, references stay unresolved", RESOURCES_ENTRY);
                None
            }
        };
        let target = config.target.configuration();
        Ok(Self {
            zip,
            resources,
            target,
            config,
        })
    }

    pub fn resources(&self) -> Option<&ResourceTable> {
        self.resources.as_ref()
    }

    pub fn target(&self) -> Option<&Configuration> {
        self.target.as_ref()
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// The contents of every entry named exactly `name`. Archives may carry
    /// duplicates, and readers disagree on which one counts.
    pub fn entries(&mut self, name: &str) -> Result<Vec<Vec<u8>>> {
        zip_entries(&mut self.zip, name)
    }

    /// The first entry named `name`.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        read_first(&mut self.zip, name)
    }

    pub fn render_options(&self) -> RenderOptions<'_> {
        RenderOptions {
            table: self
                .resources
                .as_ref()
                .filter(|_| self.config.render.resolve_references),
            config: self.target.as_ref(),
            indent: self.config.render.indent,
            max_depth: self.config.limits.max_reference_depth,
        }
    }

    /// Decodes the binary XML entry `name`, trying each entry of that name
    /// until one decodes.
    pub fn parse_xml_document(&mut self, name: &str) -> Result<XmlDocument> {
        let candidates = self.entries(name)?;
        anyhow::ensure!(!candidates.is_empty(), "Failed to find {} in APK!", name);
        decode_first(&candidates).map_err(|err| match err {
            Error::PlainTextManifest => anyhow::Error::new(err),
            err => anyhow::Error::new(err).context(format!("Failed to parse {}, last error", name)),
        })
    }

    /// Decodes and renders the binary XML entry `name` as text XML.
    pub fn parse_xml(&mut self, name: &str) -> Result<String> {
        let doc = self.parse_xml_document(name)?;
        let text = doc
            .render(&self.render_options())
            .with_context(|| format!("Failed to render {}", name))?;
        Ok(text)
    }

    /// The typed manifest, plus the decoded document when the manifest was
    /// binary.
    pub fn parse_manifest(&mut self) -> Result<(Manifest, Option<XmlDocument>)> {
        match self.parse_xml_document(MANIFEST_ENTRY) {
            Ok(doc) => {
                let text = doc.render(&self.render_options())?;
                let manifest = Manifest::from_xml(&text)?;
                Ok((manifest, Some(doc)))
            }
            Err(err) if is_plain_text(&err) => {
                log::info!("{} is plain text", MANIFEST_ENTRY);
                let bytes = self.read_entry(MANIFEST_ENTRY)?;
                let manifest = Manifest::from_xml(&String::from_utf8_lossy(&bytes))?;
                Ok((manifest, None))
            }
            Err(err) => Err(err),
        }
    }

    /// Follows the manifest's icon to a raster file. With the decoded
    /// document at hand and a table to look it up in, the chain starts from
    /// the icon resource itself so every density is considered; otherwise
    /// from the rendered attribute text.
    pub fn icon_file(
        &mut self,
        manifest: &Manifest,
        doc: Option<&XmlDocument>,
    ) -> Result<Option<IconFile>> {
        let reference = match (doc, self.resources.as_ref()) {
            (Some(doc), Some(table)) => icon_reference(doc, table.default_package_id()),
            _ => None,
        };
        let start = match reference {
            Some(id) => IconState::Resource(id),
            None => match manifest.application.icon.as_deref() {
                Some(icon) => IconState::from_manifest(icon),
                None => return Ok(None),
            },
        };
        let Self {
            zip,
            resources,
            target,
            config,
        } = self;
        let resolver = IconResolver::new(resources.as_ref())
            .with_target(*target)
            .with_max_depth(config.limits.max_icon_depth);
        let file = resolver.resolve(start, |name| read_first(zip, name))?;
        Ok(Some(file))
    }

    /// Decodes the manifest's icon.
    pub fn parse_icon(
        &mut self,
        manifest: &Manifest,
        doc: Option<&XmlDocument>,
    ) -> Result<Option<DynamicImage>> {
        let Some(file) = self.icon_file(manifest, doc)? else {
            return Ok(None);
        };
        let image = image::load_from_memory(&file.bytes)
            .with_context(|| format!("Failed to decode icon {}", file.path))?;
        Ok(Some(image))
    }

    /// Manifest and icon. An icon that cannot be found or decoded is logged
    /// and left out.
    pub fn parse(&mut self) -> Result<ApkInfo> {
        let (manifest, doc) = self.parse_manifest()?;
        let icon = match self.parse_icon(&manifest, doc.as_ref()) {
            Ok(icon) => icon,
            Err(err) => {
                log::warn!("No icon: {:#}", err);
                None
            }
        };
        Ok(ApkInfo { manifest, icon })
    }
}

/// Parses the APK at `path` with settings from the working directory.
pub fn parse_apk(path: impl AsRef<Path>) -> Result<ApkInfo> {
    let config = crate::core::config::parse_config(crate::core::config::CONFIG_FILE);
    ApkParser::open(path, config)?.parse()
}

/// Whether `err` reports a plain text document.
pub fn is_plain_text(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::PlainTextManifest))
}

/// Decodes the first candidate that decodes, or returns the last error.
fn decode_first(candidates: &[Vec<u8>]) -> crate::error::Result<XmlDocument> {
    let mut last_err = Error::Internal("no candidates".to_string());
    for (i, bytes) in candidates.iter().enumerate() {
        match xml::decode(bytes) {
            Ok(doc) => return Ok(doc),
            Err(err) => {
                log::debug!("candidate {} does not decode: {}", i, err);
                last_err = err;
            }
        }
    }
    Err(last_err)
}

fn zip_entries<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<Vec<Vec<u8>>> {
    let mut entries = vec![];
    for i in 0..zip.len() {
        let mut f = zip.by_index(i)?;
        if f.name() != name {
            continue;
        }
        let mut buf = Vec::with_capacity(f.size() as usize);
        f.read_to_end(&mut buf)
            .with_context(|| format!("While reading `{}`", name))?;
        entries.push(buf);
    }
    Ok(entries)
}

fn read_first<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    zip_entries(zip, name)?
        .into_iter()
        .next()
        .with_context(|| format!("Failed to find {} in APK!", name))
}
