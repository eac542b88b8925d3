use anyhow::{Context, Result};
use apkparser::apk::{ApkParser, MANIFEST_ENTRY};
use apkparser::core::config::{parse_config, ParserConfig, CONFIG_FILE, VERSION};
use apkparser::res::config::{
    DENSITY_ANY, DENSITY_HIGH, DENSITY_LOW, DENSITY_MEDIUM, DENSITY_TV, DENSITY_XHIGH,
    DENSITY_XXHIGH, DENSITY_XXXHIGH,
};
use apkparser::res::{ResId, Resolver};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    global: GlobalArgs,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Settings file, `apkinfo.toml` in the working directory by default
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Target locale, e.g. `en-US`
    #[clap(long, global = true)]
    locale: Option<String>,
    /// Target density in dpi or as a qualifier such as `xhdpi`
    #[clap(long, global = true, value_parser = parse_density)]
    density: Option<u16>,
    /// Target platform version
    #[clap(long, global = true)]
    sdk: Option<u16>,
    /// More logging; repeat for more
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl GlobalArgs {
    fn parser_config(&self) -> ParserConfig {
        let mut config = parse_config(self.config.as_deref().unwrap_or(Path::new(CONFIG_FILE)));
        if let Some(locale) = &self.locale {
            config.target.locale = Some(locale.clone());
        }
        if let Some(density) = self.density {
            config.target.density = Some(density);
        }
        if let Some(sdk) = self.sdk {
            config.target.sdk_version = Some(sdk);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the manifest as XML, or typed as JSON
    Manifest {
        apk: PathBuf,
        #[clap(long)]
        json: bool,
    },
    /// Print any binary XML entry as text
    Xml {
        apk: PathBuf,
        entry: String,
        /// Leave resource references as `@0x…`
        #[clap(long)]
        raw: bool,
    },
    /// Resolve a resource id and list its candidates
    Resolve { apk: PathBuf, id: ResId },
    /// Extract the launcher icon
    Icon { apk: PathBuf, out: PathBuf },
}

fn parse_density(s: &str) -> Result<u16, String> {
    let density = match s.trim_end_matches("dpi") {
        "l" => DENSITY_LOW,
        "m" => DENSITY_MEDIUM,
        "tv" => DENSITY_TV,
        "h" => DENSITY_HIGH,
        "xh" => DENSITY_XHIGH,
        "xxh" => DENSITY_XXHIGH,
        "xxxh" => DENSITY_XXXHIGH,
        "any" => DENSITY_ANY,
        other => other
            .parse()
            .map_err(|_| format!("`{}` is not a density", s))?,
    };
    Ok(density)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.global.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // RUST_LOG overrides
    env_logger::Builder::new()
        .filter_module("apkparser", level)
        .filter_module("apkinfo", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    let config = cli.global.parser_config();
    cli.command.run(config)
}

impl Commands {
    fn run(self, mut config: ParserConfig) -> Result<()> {
        match self {
            Self::Manifest { apk, json } => {
                let mut parser = ApkParser::open(&apk, config)?;
                if json {
                    let (manifest, _) = parser.parse_manifest()?;
                    println!("{}", serde_json::to_string_pretty(&manifest)?);
                } else {
                    match parser.parse_xml(MANIFEST_ENTRY) {
                        Ok(text) => println!("{}", text),
                        Err(err) if apkparser::apk::is_plain_text(&err) => {
                            let bytes = parser.read_entry(MANIFEST_ENTRY)?;
                            println!("{}", String::from_utf8_lossy(&bytes));
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            Self::Xml { apk, entry, raw } => {
                if raw {
                    config.render.resolve_references = false;
                }
                let mut parser = ApkParser::open(&apk, config)?;
                println!("{}", parser.parse_xml(&entry)?);
            }
            Self::Resolve { apk, id } => {
                let parser = ApkParser::open(&apk, config)?;
                let table = parser
                    .resources()
                    .context("The APK has no usable resources.arsc")?;
                let mut resolver = Resolver::new(table)
                    .with_max_depth(parser.config().limits.max_reference_depth);
                if let Some(target) = parser.target() {
                    resolver = resolver.with_target(*target);
                }
                let name = table.entry_name(id).unwrap_or_else(|| id.to_string());
                for candidate in table.candidates(id) {
                    println!("  [{}] {:?}", candidate.config, candidate.entry.value);
                }
                let resolved = resolver.resolve(id)?;
                println!("{} {} = {}", id, name, resolved.text);
            }
            Self::Icon { apk, out } => {
                let mut parser = ApkParser::open(&apk, config)?;
                let (manifest, doc) = parser.parse_manifest()?;
                let icon = parser
                    .parse_icon(&manifest, doc.as_ref())?
                    .context("The manifest declares no icon")?;
                icon.save(&out)
                    .with_context(|| format!("While writing `{}`", out.display()))?;
                log::info!("icon written to {}", out.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn densities_parse_by_name_or_number() {
        assert_eq!(parse_density("xhdpi"), Ok(DENSITY_XHIGH));
        assert_eq!(parse_density("anydpi"), Ok(DENSITY_ANY));
        assert_eq!(parse_density("213"), Ok(DENSITY_TV));
        assert!(parse_density("huge").is_err());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "apkinfo",
            "--config",
            "/nonexistent/apkinfo.toml",
            "--locale",
            "fr",
            "--density",
            "hdpi",
            "resolve",
            "app.apk",
            "0x7f010000",
        ]);
        let config = cli.global.parser_config();
        assert_eq!(config.target.locale.as_deref(), Some("fr"));
        assert_eq!(config.target.density, Some(DENSITY_HIGH));
        assert!(matches!(cli.command, Commands::Resolve { id, .. } if id == ResId::from(0x7f01_0000)));
    }
}
