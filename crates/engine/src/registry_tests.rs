// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::MountSpec;

fn manifest(name: &str) -> RuntimeManifest {
    RuntimeManifest {
        name: name.to_string(),
        version: "1.0".to_string(),
        description: None,
        mounts: vec![MountSpec {
            source: "usr".to_string(),
            target: "/usr".to_string(),
            readonly: true,
        }],
        environment: Default::default(),
    }
}

#[test]
fn register_lookup_roundtrip() {
    let registry = RuntimeRegistry::new();
    registry.register(manifest("python-3.11-ml")).unwrap();
    let found = registry.lookup("python-3.11-ml").unwrap();
    assert_eq!(found.version, "1.0");
    assert!(registry.contains("python-3.11-ml"));
}

#[test]
fn duplicate_registration_is_rejected() {
    let registry = RuntimeRegistry::new();
    registry.register(manifest("py")).unwrap();
    assert!(matches!(
        registry.register(manifest("py")),
        Err(EngineError::DuplicateName(_))
    ));
}

#[test]
fn escaping_mount_is_rejected() {
    let registry = RuntimeRegistry::new();
    let mut bad = manifest("bad");
    bad.mounts[0].source = "../host".to_string();
    assert!(matches!(
        registry.register(bad),
        Err(EngineError::InvalidRequest(_))
    ));
    assert!(!registry.contains("bad"));
}

#[test]
fn lookup_missing_is_unknown_runtime() {
    let registry = RuntimeRegistry::new();
    assert!(matches!(
        registry.lookup("ghost"),
        Err(EngineError::UnknownRuntime(_))
    ));
}

#[test]
fn list_is_ordered_by_name() {
    let registry = RuntimeRegistry::new();
    registry.register(manifest("zig")).unwrap();
    registry.register(manifest("ada")).unwrap();
    registry.register(manifest("moo")).unwrap();
    let names: Vec<String> = registry.list().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["ada", "moo", "zig"]);
}

#[test]
fn unregister_removes() {
    let registry = RuntimeRegistry::new();
    registry.register(manifest("py")).unwrap();
    registry.unregister("py").unwrap();
    assert!(!registry.contains("py"));
    assert!(matches!(
        registry.unregister("py"),
        Err(EngineError::NotFound(_))
    ));
}
