use crate::res::config::{
    Configuration, ORIENTATION_LAND, ORIENTATION_PORT, ORIENTATION_SQUARE,
};
use crate::res::MAX_REFERENCE_DEPTH;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "apkinfo.toml";

pub const MAX_ICON_DEPTH: usize = 8;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ParserConfig {
    /// Every group carries `#[serde(default)]`: an omitted or partial group
    /// must not discard the groups that did parse.
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// The device resources are resolved for. Empty means "no preferences".
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    pub locale: Option<String>,
    pub density: Option<u16>,
    pub sdk_version: Option<u16>,
    /// `port`, `land` or `square`.
    pub orientation: Option<String>,
}

impl TargetConfig {
    pub fn is_empty(&self) -> bool {
        self.locale.is_none()
            && self.density.is_none()
            && self.sdk_version.is_none()
            && self.orientation.is_none()
    }

    /// The target as a configuration, or `None` for no preferences. Values
    /// that do not parse are dropped with a warning.
    pub fn configuration(&self) -> Option<Configuration> {
        if self.is_empty() {
            return None;
        }
        let mut config = Configuration::default();
        if let Some(locale) = &self.locale {
            match config.with_locale(locale) {
                Ok(c) => config = c,
                Err(err) => log::warn!("ignoring target locale: {}", err),
            }
        }
        if let Some(density) = self.density {
            config = config.with_density(density);
        }
        if let Some(sdk_version) = self.sdk_version {
            config = config.with_sdk_version(sdk_version);
        }
        if let Some(orientation) = &self.orientation {
            match parse_orientation(orientation) {
                Some(o) => config = config.with_orientation(o),
                None => log::warn!("ignoring unknown orientation {:?}", orientation),
            }
        }
        Some(config)
    }
}

pub fn parse_orientation(orientation: &str) -> Option<u8> {
    match orientation.trim().to_ascii_lowercase().as_str() {
        "port" | "portrait" => Some(ORIENTATION_PORT),
        "land" | "landscape" => Some(ORIENTATION_LAND),
        "square" => Some(ORIENTATION_SQUARE),
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RenderConfig {
    #[serde(default = "default_indent")]
    pub indent: usize,
    #[serde(default = "default_resolve_references")]
    pub resolve_references: bool,
}

fn default_indent() -> usize {
    2
}

fn default_resolve_references() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            resolve_references: default_resolve_references(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_max_reference_depth")]
    pub max_reference_depth: usize,
    #[serde(default = "default_max_icon_depth")]
    pub max_icon_depth: usize,
}

fn default_max_reference_depth() -> usize {
    MAX_REFERENCE_DEPTH
}

fn default_max_icon_depth() -> usize {
    MAX_ICON_DEPTH
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_reference_depth: default_max_reference_depth(),
            max_icon_depth: default_max_icon_depth(),
        }
    }
}

/// Strict parse of a settings document.
pub fn parse_config_str(content: &str) -> Result<ParserConfig, toml::de::Error> {
    toml::from_str::<ParserConfig>(content)
}

/// Reads settings from `path`. A missing or malformed file yields the
/// defaults so that a broken file never stops a parse.
pub fn parse_config(path: impl AsRef<Path>) -> ParserConfig {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::debug!("no settings at {}: {}", path.display(), err);
            return ParserConfig::default();
        }
    };
    match parse_config_str(&content) {
        Ok(config) => config,
        Err(err) => {
            // Config malformed, use the default config and the user can fix it
            log::warn!("ignoring malformed settings {}: {}", path.display(), err);
            ParserConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::res::config::DENSITY_XXHIGH;
    use std::fs;
    use tempfile::tempdir;

    fn with_config_file(content: &str, f: impl Fn(String)) {
        let dir = tempdir().unwrap();
        let file_path = format!("{}/{}", dir.path().to_str().unwrap(), CONFIG_FILE);
        fs::write(&file_path, content).unwrap();
        f(file_path)
    }

    #[test]
    fn should_read_every_group() {
        with_config_file(
            r#"
                [target]
                locale = "en-US"
                density = 480
                sdk_version = 33
                orientation = "port"

                [render]
                indent = 4
                resolve_references = false

                [limits]
                max_reference_depth = 5
                max_icon_depth = 3
            "#,
            |path| {
                let config = parse_config(path);
                assert_eq!(config.target.locale.as_deref(), Some("en-US"));
                assert_eq!(config.render.indent, 4);
                assert!(!config.render.resolve_references);
                assert_eq!(config.limits.max_reference_depth, 5);
                assert_eq!(config.limits.max_icon_depth, 3);

                let target = config.target.configuration().unwrap();
                assert_eq!(target.locale().as_deref(), Some("en-US"));
                assert_eq!(target.density, DENSITY_XXHIGH);
                assert_eq!(target.sdk_version, 33);
                assert_eq!(target.orientation, ORIENTATION_PORT);
            },
        );
    }

    #[test]
    fn should_default_missing_groups_and_keys() {
        with_config_file(
            r#"
                [render]
                indent = 0
            "#,
            |path| {
                let config = parse_config(path);
                assert_eq!(config.render.indent, 0);
                assert!(config.render.resolve_references);
                assert_eq!(config.limits, LimitsConfig::default());
                assert!(config.target.configuration().is_none());
            },
        );
    }

    #[test]
    fn should_fall_back_on_malformed_file() {
        with_config_file("[render\nindent = ", |path| {
            assert_eq!(parse_config(path), ParserConfig::default());
        });
        assert!(parse_config_str("[render\nindent = ").is_err());
    }

    #[test]
    fn should_fall_back_on_missing_file() {
        let dir = tempdir().unwrap();
        let config = parse_config(dir.path().join("missing.toml"));
        assert_eq!(config, ParserConfig::default());
    }

    #[test]
    fn should_drop_unparsable_target_values() {
        let config = parse_config_str(
            r#"
                [target]
                locale = "x"
                orientation = "sideways"
                sdk_version = 21
            "#,
        )
        .unwrap();
        let target = config.target.configuration().unwrap();
        assert_eq!(target.locale(), None);
        assert_eq!(target.orientation, 0);
        assert_eq!(target.sdk_version, 21);
    }
}
