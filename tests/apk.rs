use apkparser::apk::manifest::ANDROID_NS;
use apkparser::apk::{is_plain_text, ApkParser, MANIFEST_ENTRY, RESOURCES_ENTRY};
use apkparser::core::config::{parse_config_str, ParserConfig};
use apkparser::res::config::{DENSITY_MEDIUM, DENSITY_XXHIGH};
use apkparser::res::writer::{
    AttrValue, EntryBuilder, PackageBuilder, TableBuilder, TypeBuilder, XmlAttr, XmlBuilder,
};
use apkparser::res::{Configuration, ResId, Value};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

const ATTR_THEME: u32 = 0x0101_0000;
const ATTR_LABEL: u32 = 0x0101_0001;
const ATTR_ICON: u32 = 0x0101_0002;
const ATTR_NAME: u32 = 0x0101_0003;
const ATTR_MIN_SDK: u32 = 0x0101_020c;
const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;

const ICON_PATH: &str = "res/mipmap-mdpi/ic_launcher.png";

struct Ids {
    app_name: ResId,
    icon: ResId,
    theme: ResId,
}

/// `string/app_name` (default and `fr`), `mipmap/ic_launcher` and
/// `style/AppTheme`.
fn resources() -> (Vec<u8>, Ids) {
    let mut table = TableBuilder::new();
    let mut package = PackageBuilder::new(0x7f, "com.example.app");
    let string = package.type_id("string");
    let mipmap = package.type_id("mipmap");
    let style = package.type_id("style");

    let app_name = package.key("app_name");
    for (config, text) in [
        (Configuration::default(), "Example"),
        (Configuration::default().with_locale("fr").unwrap(), "Exemple"),
    ] {
        let value = Value::String(table.string(text));
        package.push(TypeBuilder::new(string, config).entry(0, EntryBuilder::simple(app_name, value)));
    }

    let ic_launcher = package.key("ic_launcher");
    let icon_path = Value::String(table.string(ICON_PATH));
    package.push(
        TypeBuilder::new(mipmap, Configuration::default().with_density(DENSITY_MEDIUM))
            .entry(0, EntryBuilder::simple(ic_launcher, icon_path)),
    );

    let app_theme = package.key("AppTheme");
    package.push(TypeBuilder::new(style, Configuration::default()).entry(
        0,
        EntryBuilder::complex(
            app_theme,
            ResId::from(0x0103_0005),
            vec![(ResId::from(0x0101_0098), Value::Bool(true))],
        ),
    ));

    table.package(package);
    let ids = Ids {
        app_name: ResId::new(0x7f, string, 0),
        icon: ResId::new(0x7f, mipmap, 0),
        theme: ResId::new(0x7f, style, 0),
    };
    (table.build().unwrap(), ids)
}

fn manifest(ids: &Ids) -> Vec<u8> {
    let ns = Some(ANDROID_NS);
    let mut xml = XmlBuilder::with_resource_names(&[
        ("theme", ATTR_THEME),
        ("label", ATTR_LABEL),
        ("icon", ATTR_ICON),
        ("name", ATTR_NAME),
        ("minSdkVersion", ATTR_MIN_SDK),
        ("versionCode", ATTR_VERSION_CODE),
        ("versionName", ATTR_VERSION_NAME),
    ]);
    xml.start_namespace("android", ANDROID_NS);
    xml.start_element(
        None,
        "manifest",
        &[
            XmlAttr::new(ns, "versionCode", AttrValue::Typed(Value::IntDec(7))),
            XmlAttr::new(ns, "versionName", AttrValue::String("1.0")),
            XmlAttr::new(None, "package", AttrValue::String("com.example.app")),
        ],
    );
    xml.start_element(
        None,
        "uses-sdk",
        &[XmlAttr::new(ns, "minSdkVersion", AttrValue::Typed(Value::IntDec(21)))],
    );
    xml.end_element(None, "uses-sdk");
    xml.start_element(
        None,
        "application",
        &[
            XmlAttr::new(ns, "theme", AttrValue::Typed(Value::Reference(ids.theme))),
            XmlAttr::new(ns, "label", AttrValue::Typed(Value::Reference(ids.app_name))),
            XmlAttr::new(ns, "icon", AttrValue::Typed(Value::Reference(ids.icon))),
        ],
    );
    xml.start_element(
        None,
        "activity",
        &[XmlAttr::new(ns, "name", AttrValue::String(".MainActivity"))],
    );
    xml.start_element(None, "intent-filter", &[]);
    xml.start_element(
        None,
        "action",
        &[XmlAttr::new(ns, "name", AttrValue::String("android.intent.action.MAIN"))],
    );
    xml.end_element(None, "action");
    xml.start_element(
        None,
        "category",
        &[XmlAttr::new(
            ns,
            "name",
            AttrValue::String("android.intent.category.LAUNCHER"),
        )],
    );
    xml.end_element(None, "category");
    xml.end_element(None, "intent-filter");
    xml.end_element(None, "activity");
    xml.end_element(None, "application");
    xml.end_element(None, "manifest");
    xml.end_namespace("android", ANDROID_NS);
    xml.build().unwrap()
}

fn png() -> Vec<u8> {
    png_sized(3, 2)
}

fn png_sized(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([0x3d, 0xdc, 0x84, 0xff]),
    ));
    let mut out = Cursor::new(vec![]);
    image
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

fn zip(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(vec![]));
    for (name, bytes) in entries {
        zip.start_file(name, FileOptions::default()).unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn apk() -> Vec<u8> {
    let (arsc, ids) = resources();
    zip(vec![
        (MANIFEST_ENTRY, manifest(&ids)),
        (RESOURCES_ENTRY, arsc),
        (ICON_PATH, png()),
    ])
}

fn parser(bytes: Vec<u8>, config: ParserConfig) -> ApkParser<Cursor<Vec<u8>>> {
    ApkParser::new(Cursor::new(bytes), config).unwrap()
}

#[test]
fn parses_manifest_and_icon() {
    let mut parser = parser(apk(), ParserConfig::default());
    assert_eq!(parser.resources().unwrap().len(), 3);

    let info = parser.parse().unwrap();
    let manifest = info.manifest;
    assert_eq!(manifest.package.as_deref(), Some("com.example.app"));
    assert_eq!(manifest.version_code, Some(7));
    assert_eq!(manifest.version_name.as_deref(), Some("1.0"));
    assert_eq!(manifest.uses_sdk.min_sdk_version, Some(21));
    assert_eq!(manifest.application.label.as_deref(), Some("Example"));
    assert_eq!(manifest.application.icon.as_deref(), Some(ICON_PATH));
    assert_eq!(manifest.application.theme.as_deref(), Some("@style/AppTheme"));
    assert!(manifest.application.activities[0].is_launcher());

    let icon = info.icon.unwrap();
    assert_eq!((icon.width(), icon.height()), (3, 2));
}

#[test]
fn target_locale_selects_translation() {
    let config = parse_config_str("[target]\nlocale = \"fr-FR\"").unwrap();
    let mut parser = parser(apk(), config);
    let (manifest, doc) = parser.parse_manifest().unwrap();
    assert!(doc.is_some());
    assert_eq!(manifest.application.label.as_deref(), Some("Exemple"));
}

#[test]
fn raw_rendering_keeps_references() {
    let (_, ids) = resources();
    let config = parse_config_str("[render]\nresolve_references = false").unwrap();
    let mut parser = parser(apk(), config);
    let text = parser.parse_xml(MANIFEST_ENTRY).unwrap();
    assert!(
        text.contains(&format!("android:label=\"@{}\"", ids.app_name)),
        "{}",
        text
    );
}

#[test]
fn missing_table_leaves_references_unresolved() {
    let (_, ids) = resources();
    let bytes = zip(vec![(MANIFEST_ENTRY, manifest(&ids))]);
    let mut parser = parser(bytes, ParserConfig::default());
    assert!(parser.resources().is_none());
    let (manifest, _) = parser.parse_manifest().unwrap();
    assert_eq!(
        manifest.application.icon.as_deref(),
        Some(format!("@{}", ids.icon).as_str())
    );
    // The icon needs the table, so it is left out rather than failing.
    let info = parser.parse().unwrap();
    assert!(info.icon.is_none());
}

#[test]
fn corrupt_table_is_tolerated() {
    let (_, ids) = resources();
    let bytes = zip(vec![
        (MANIFEST_ENTRY, manifest(&ids)),
        (RESOURCES_ENTRY, vec![0x02, 0x00, 0x0c, 0x00, 0xff, 0xff, 0x00, 0x00]),
    ]);
    let mut parser = parser(bytes, ParserConfig::default());
    assert!(parser.resources().is_none());
    assert!(parser.parse_manifest().is_ok());
}

#[test]
fn densest_icon_is_chosen() {
    const MDPI: &str = "res/mipmap-mdpi/ic_launcher.png";
    const XXHDPI: &str = "res/mipmap-xxhdpi/ic_launcher.png";
    let mut table = TableBuilder::new();
    let mut package = PackageBuilder::new(0x7f, "com.example.app");
    let mipmap = package.type_id("mipmap");
    let ic_launcher = package.key("ic_launcher");
    for (density, path) in [(DENSITY_MEDIUM, MDPI), (DENSITY_XXHIGH, XXHDPI)] {
        let value = Value::String(table.string(path));
        package.push(
            TypeBuilder::new(mipmap, Configuration::default().with_density(density))
                .entry(0, EntryBuilder::simple(ic_launcher, value)),
        );
    }
    table.package(package);
    let ids = Ids {
        app_name: ResId::new(0x7f, 0x10, 0),
        icon: ResId::new(0x7f, mipmap, 0),
        theme: ResId::new(0x7f, 0x11, 0),
    };
    let bytes = zip(vec![
        (MANIFEST_ENTRY, manifest(&ids)),
        (RESOURCES_ENTRY, table.build().unwrap()),
        (MDPI, png_sized(1, 1)),
        (XXHDPI, png_sized(3, 3)),
    ]);
    let mut parser = parser(bytes, ParserConfig::default());

    // Rendering picks one configuration; the icon looks at all of them.
    let (manifest, doc) = parser.parse_manifest().unwrap();
    assert_eq!(manifest.application.icon.as_deref(), Some(MDPI));
    let file = parser.icon_file(&manifest, doc.as_ref()).unwrap().unwrap();
    assert_eq!(file.path, XXHDPI);

    let icon = parser.parse().unwrap().icon.unwrap();
    assert_eq!((icon.width(), icon.height()), (3, 3));
}

#[test]
fn plain_text_manifest_is_read_directly() {
    let text = format!(
        r#"<manifest xmlns:android="{}" package="com.example.text">
  <application android:icon="icon.png" android:label="Text"/>
</manifest>"#,
        ANDROID_NS
    );
    let bytes = zip(vec![(MANIFEST_ENTRY, text.into_bytes()), ("icon.png", png())]);
    let mut parser = parser(bytes, ParserConfig::default());

    let err = parser.parse_xml(MANIFEST_ENTRY).unwrap_err();
    assert!(is_plain_text(&err));

    let (manifest, doc) = parser.parse_manifest().unwrap();
    assert!(doc.is_none());
    assert_eq!(manifest.package.as_deref(), Some("com.example.text"));
    let icon = parser.parse_icon(&manifest, None).unwrap().unwrap();
    assert_eq!(icon.width(), 3);
}

#[test]
fn missing_entry_is_reported() {
    let mut parser = parser(zip(vec![("classes.dex", b"dex".to_vec())]), ParserConfig::default());
    let err = parser.parse_xml("res/layout/main.xml").unwrap_err();
    assert!(err.to_string().contains("Failed to find res/layout/main.xml"));
}

#[test]
fn undecodable_entry_reports_last_error() {
    let mut parser = parser(
        zip(vec![("res/layout/main.xml", vec![0x03, 0x00, 0x08])]),
        ParserConfig::default(),
    );
    let err = parser.parse_xml("res/layout/main.xml").unwrap_err();
    assert!(!is_plain_text(&err));
    assert!(err
        .to_string()
        .starts_with("Failed to parse res/layout/main.xml"));
}

#[test]
fn opens_apk_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.apk");
    std::fs::write(&path, apk()).unwrap();
    let info = apkparser::parse_apk(&path).unwrap();
    assert_eq!(info.manifest.application.label.as_deref(), Some("Example"));
    assert!(info.icon.is_some());
}
