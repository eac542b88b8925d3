//! Typed view of a decoded `AndroidManifest.xml`.

use anyhow::{bail, Context, Result};
use roxmltree::{Document, Node};
use serde::Serialize;

pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

fn attr(node: Node, name: &str) -> Option<String> {
    node.attribute((ANDROID_NS, name)).map(str::to_string)
}

/// Booleans may be written as `true`/`false` or as integers.
fn bool_attr(node: Node, name: &str) -> Option<bool> {
    let value = node.attribute((ANDROID_NS, name))?.trim();
    match value {
        "true" => Some(true),
        "false" => Some(false),
        other => parse_int(other).map(|i| i != 0),
    }
}

fn int_attr(node: Node, name: &str) -> Option<i32> {
    parse_int(node.attribute((ANDROID_NS, name))?)
}

fn parse_int(value: &str) -> Option<i32> {
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|v| v as i32),
        None => value.parse().ok(),
    }
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &'static str) -> Option<Node<'a, 'input>> {
    children(node, tag).next()
}

fn names(node: Node, tag: &'static str) -> Vec<String> {
    children(node, tag).filter_map(|n| attr(n, "name")).collect()
}

/// Android [manifest element](https://developer.android.com/guide/topics/manifest/manifest-element).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub package: Option<String>,
    pub version_code: Option<i32>,
    pub version_name: Option<String>,
    pub compile_sdk_version: Option<i32>,
    pub compile_sdk_version_codename: Option<String>,
    pub application: Application,
    pub instrumentation: Option<Instrumentation>,
    pub uses_sdk: UsesSdk,
    pub uses_permissions: Vec<UsesPermission>,
}

impl Manifest {
    /// Types a text manifest. Attributes that are absent or do not parse
    /// are left unset.
    pub fn from_xml(text: &str) -> Result<Self> {
        let doc = Document::parse(text).context("Failed to parse manifest XML")?;
        let root = doc.root_element();
        if root.tag_name().name() != "manifest" {
            bail!("root element is <{}>, not <manifest>", root.tag_name().name());
        }
        Ok(Self {
            package: root.attribute("package").map(str::to_string),
            version_code: int_attr(root, "versionCode"),
            version_name: attr(root, "versionName"),
            compile_sdk_version: int_attr(root, "compileSdkVersion"),
            compile_sdk_version_codename: attr(root, "compileSdkVersionCodename"),
            application: child(root, "application")
                .map(Application::from_node)
                .unwrap_or_default(),
            instrumentation: child(root, "instrumentation").map(Instrumentation::from_node),
            uses_sdk: child(root, "uses-sdk")
                .map(UsesSdk::from_node)
                .unwrap_or_default(),
            uses_permissions: children(root, "uses-permission")
                .map(UsesPermission::from_node)
                .collect(),
        })
    }
}

/// Android [application element](https://developer.android.com/guide/topics/manifest/application-element).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub allow_task_reparenting: Option<bool>,
    pub allow_backup: Option<bool>,
    pub backup_agent: Option<String>,
    pub debuggable: Option<bool>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub has_code: Option<bool>,
    pub hardware_accelerated: Option<bool>,
    pub icon: Option<String>,
    pub kill_after_restore: Option<bool>,
    pub large_heap: Option<bool>,
    pub label: Option<String>,
    pub logo: Option<String>,
    pub manage_space_activity: Option<String>,
    pub name: Option<String>,
    pub permission: Option<String>,
    pub persistent: Option<bool>,
    pub process: Option<String>,
    pub restore_any_version: Option<bool>,
    pub required_account_type: Option<String>,
    pub restricted_account_type: Option<String>,
    pub supports_rtl: Option<bool>,
    pub task_affinity: Option<String>,
    pub test_only: Option<bool>,
    pub theme: Option<String>,
    pub ui_options: Option<String>,
    pub vm_safe_mode: Option<bool>,
    pub activities: Vec<Activity>,
    pub activity_aliases: Vec<ActivityAlias>,
    pub meta_data: Vec<MetaData>,
}

impl Application {
    fn from_node(node: Node) -> Self {
        Self {
            allow_task_reparenting: bool_attr(node, "allowTaskReparenting"),
            allow_backup: bool_attr(node, "allowBackup"),
            backup_agent: attr(node, "backupAgent"),
            debuggable: bool_attr(node, "debuggable"),
            description: attr(node, "description"),
            enabled: bool_attr(node, "enabled"),
            has_code: bool_attr(node, "hasCode"),
            hardware_accelerated: bool_attr(node, "hardwareAccelerated"),
            icon: attr(node, "icon"),
            kill_after_restore: bool_attr(node, "killAfterRestore"),
            large_heap: bool_attr(node, "largeHeap"),
            label: attr(node, "label"),
            logo: attr(node, "logo"),
            manage_space_activity: attr(node, "manageSpaceActivity"),
            name: attr(node, "name"),
            permission: attr(node, "permission"),
            persistent: bool_attr(node, "persistent"),
            process: attr(node, "process"),
            restore_any_version: bool_attr(node, "restoreAnyVersion"),
            required_account_type: attr(node, "requiredAccountType"),
            restricted_account_type: attr(node, "restrictedAccountType"),
            supports_rtl: bool_attr(node, "supportsRtl"),
            task_affinity: attr(node, "taskAffinity"),
            test_only: bool_attr(node, "testOnly"),
            theme: attr(node, "theme"),
            ui_options: attr(node, "uiOptions"),
            vm_safe_mode: bool_attr(node, "vmSafeMode"),
            activities: children(node, "activity").map(Activity::from_node).collect(),
            activity_aliases: children(node, "activity-alias")
                .map(ActivityAlias::from_node)
                .collect(),
            meta_data: children(node, "meta-data").map(MetaData::from_node).collect(),
        }
    }
}

/// Android [activity element](https://developer.android.com/guide/topics/manifest/activity-element).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub name: Option<String>,
    pub label: Option<String>,
    pub theme: Option<String>,
    pub screen_orientation: Option<String>,
    pub intent_filters: Vec<IntentFilter>,
}

impl Activity {
    fn from_node(node: Node) -> Self {
        Self {
            name: attr(node, "name"),
            label: attr(node, "label"),
            theme: attr(node, "theme"),
            screen_orientation: attr(node, "screenOrientation"),
            intent_filters: children(node, "intent-filter")
                .map(IntentFilter::from_node)
                .collect(),
        }
    }

    /// Whether an intent filter declares `MAIN` + `LAUNCHER`.
    pub fn is_launcher(&self) -> bool {
        self.intent_filters.iter().any(|filter| {
            filter.actions.iter().any(|a| a == "android.intent.action.MAIN")
                && filter
                    .categories
                    .iter()
                    .any(|c| c == "android.intent.category.LAUNCHER")
        })
    }
}

/// Android [activity-alias element](https://developer.android.com/guide/topics/manifest/activity-alias-element).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAlias {
    pub name: Option<String>,
    pub label: Option<String>,
    pub target_activity: Option<String>,
    pub intent_filters: Vec<IntentFilter>,
}

impl ActivityAlias {
    fn from_node(node: Node) -> Self {
        Self {
            name: attr(node, "name"),
            label: attr(node, "label"),
            target_activity: attr(node, "targetActivity"),
            intent_filters: children(node, "intent-filter")
                .map(IntentFilter::from_node)
                .collect(),
        }
    }
}

/// Android [intent filter element](https://developer.android.com/guide/topics/manifest/intent-filter-element),
/// reduced to action and category names.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IntentFilter {
    pub actions: Vec<String>,
    pub categories: Vec<String>,
}

impl IntentFilter {
    fn from_node(node: Node) -> Self {
        Self {
            actions: names(node, "action"),
            categories: names(node, "category"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetaData {
    pub name: Option<String>,
    pub value: Option<String>,
}

impl MetaData {
    fn from_node(node: Node) -> Self {
        Self {
            name: attr(node, "name"),
            value: attr(node, "value"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrumentation {
    pub name: Option<String>,
    pub target_package: Option<String>,
    pub handle_profiling: Option<bool>,
    pub functional_test: Option<bool>,
}

impl Instrumentation {
    fn from_node(node: Node) -> Self {
        Self {
            name: attr(node, "name"),
            target_package: attr(node, "targetPackage"),
            handle_profiling: bool_attr(node, "handleProfiling"),
            functional_test: bool_attr(node, "functionalTest"),
        }
    }
}

/// Android [uses-sdk element](https://developer.android.com/guide/topics/manifest/uses-sdk-element).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsesSdk {
    pub min_sdk_version: Option<i32>,
    pub target_sdk_version: Option<i32>,
    pub max_sdk_version: Option<i32>,
}

impl UsesSdk {
    fn from_node(node: Node) -> Self {
        Self {
            min_sdk_version: int_attr(node, "minSdkVersion"),
            target_sdk_version: int_attr(node, "targetSdkVersion"),
            max_sdk_version: int_attr(node, "maxSdkVersion"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsesPermission {
    pub name: Option<String>,
    pub max_sdk_version: Option<i32>,
}

impl UsesPermission {
    fn from_node(node: Node) -> Self {
        Self {
            name: attr(node, "name"),
            max_sdk_version: int_attr(node, "maxSdkVersion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.example.app"
    android:versionCode="42"
    android:versionName="1.2.3"
    android:compileSdkVersion="0x21">
  <uses-sdk android:minSdkVersion="21" android:targetSdkVersion="33"/>
  <uses-permission android:name="android.permission.INTERNET"/>
  <uses-permission android:name="android.permission.WRITE_EXTERNAL_STORAGE" android:maxSdkVersion="28"/>
  <instrumentation android:name=".Test" android:targetPackage="com.example.app" android:functionalTest="false"/>
  <application android:label="Example" android:icon="res/mipmap/ic_launcher.png"
      android:debuggable="true" android:allowBackup="-1" android:hasCode="0">
    <activity android:name=".MainActivity" android:screenOrientation="1">
      <intent-filter>
        <action android:name="android.intent.action.MAIN"/>
        <category android:name="android.intent.category.LAUNCHER"/>
      </intent-filter>
    </activity>
    <activity-alias android:name=".Alias" android:targetActivity=".MainActivity"/>
    <meta-data android:name="key" android:value="value"/>
  </application>
</manifest>"#;

    #[test]
    fn types_a_full_manifest() {
        let manifest = Manifest::from_xml(MANIFEST).unwrap();
        assert_eq!(manifest.package.as_deref(), Some("com.example.app"));
        assert_eq!(manifest.version_code, Some(42));
        assert_eq!(manifest.version_name.as_deref(), Some("1.2.3"));
        assert_eq!(manifest.compile_sdk_version, Some(33));
        assert_eq!(manifest.uses_sdk.min_sdk_version, Some(21));
        assert_eq!(manifest.uses_sdk.target_sdk_version, Some(33));
        assert_eq!(manifest.uses_sdk.max_sdk_version, None);
        assert_eq!(manifest.uses_permissions.len(), 2);
        assert_eq!(manifest.uses_permissions[1].max_sdk_version, Some(28));

        let instrumentation = manifest.instrumentation.unwrap();
        assert_eq!(instrumentation.functional_test, Some(false));

        let app = &manifest.application;
        assert_eq!(app.label.as_deref(), Some("Example"));
        assert_eq!(app.icon.as_deref(), Some("res/mipmap/ic_launcher.png"));
        assert_eq!(app.debuggable, Some(true));
        assert_eq!(app.allow_backup, Some(true));
        assert_eq!(app.has_code, Some(false));
        assert_eq!(app.activities.len(), 1);
        assert!(app.activities[0].is_launcher());
        assert_eq!(
            app.activity_aliases[0].target_activity.as_deref(),
            Some(".MainActivity")
        );
        assert_eq!(app.meta_data[0].value.as_deref(), Some("value"));
    }

    #[test]
    fn rejects_other_roots() {
        assert!(Manifest::from_xml("<resources/>").is_err());
        assert!(Manifest::from_xml("not xml").is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let manifest = Manifest::from_xml(MANIFEST).unwrap();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["versionCode"], 42);
        assert_eq!(json["usesSdk"]["minSdkVersion"], 21);
    }
}
