// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

fn manifest(mounts: Vec<MountSpec>) -> RuntimeManifest {
    RuntimeManifest {
        name: "python-3.11-ml".to_string(),
        version: "1.0".to_string(),
        description: None,
        mounts,
        environment: Default::default(),
    }
}

fn mount(source: &str, target: &str) -> MountSpec {
    MountSpec {
        source: source.to_string(),
        target: target.to_string(),
        readonly: false,
    }
}

#[test]
fn plain_mounts_validate() {
    let m = manifest(vec![
        mount("usr", "/usr"),
        mount("opt/python", "/opt/python"),
    ]);
    assert!(m.validate().is_ok());
}

#[parameterized(
    absolute_source = { "/etc/passwd" },
    parent_escape = { "../outside" },
    nested_escape = { "usr/../../outside" },
)]
fn escaping_sources_are_rejected(source: &str) {
    let m = manifest(vec![mount(source, "/target")]);
    assert!(matches!(m.validate(), Err(ManifestError::InvalidMount(_))));
}

#[test]
fn relative_target_is_rejected() {
    let m = manifest(vec![mount("usr", "usr")]);
    assert!(matches!(
        m.validate(),
        Err(ManifestError::RelativeTarget(_))
    ));
}

#[test]
fn empty_name_is_rejected() {
    let mut m = manifest(vec![]);
    m.name = String::new();
    assert_eq!(m.validate(), Err(ManifestError::EmptyName));
}

#[test]
fn normalize_resolves_dot_and_dotdot() {
    assert_eq!(
        normalize_within_root("a/./b/../c"),
        Some(std::path::PathBuf::from("a/c"))
    );
    assert_eq!(normalize_within_root("a/.."), Some(std::path::PathBuf::new()));
    assert_eq!(normalize_within_root("a/../.."), None);
}

#[test]
fn manifest_parses_from_yaml_shape() {
    // The registry feeds serde_yaml output through this type; exercise the
    // serde field names via JSON, which shares the data model.
    let json = r#"{
        "name": "python-3.11-ml",
        "version": "1.0",
        "mounts": [{"source": "usr", "target": "/usr", "readonly": true}],
        "environment": {"PYTHONHOME": "/opt/python"}
    }"#;
    let m: RuntimeManifest = serde_json::from_str(json).unwrap();
    assert_eq!(m.mounts.len(), 1);
    assert!(m.mounts[0].readonly);
    assert_eq!(m.environment.get("PYTHONHOME").map(String::as_str), Some("/opt/python"));
    assert!(m.validate().is_ok());
}
