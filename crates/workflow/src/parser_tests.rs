// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::RequiredState;

const CHAIN: &str = r#"
version: "1.0"
name: chain
jobs:
  a:
    command: [sleep, "1"]
  b:
    command: [echo, b]
    dependsOn: [a]
"#;

#[test]
fn parses_a_simple_chain() {
    let template = parse_template(CHAIN).unwrap();
    assert_eq!(template.name, "chain");
    assert_eq!(template.jobs.len(), 2);
    let b = &template.jobs["b"];
    assert_eq!(b.depends_on.len(), 1);
    assert_eq!(b.depends_on[0].step, "a");
    assert_eq!(b.depends_on[0].required, RequiredState::Completed);
}

#[test]
fn parses_full_step_fields() {
    let yaml = r#"
version: "1.0"
name: full
description: everything at once
jobs:
  train:
    command: [python, train.py]
    dependsOn: ["prep:COMPLETED"]
    resources:
      maxCpu: 400
      maxMemory: 8GB
      maxIobps: 10000000
      cpuCores: "0-3"
    runtime: python-3.11-ml
    network: bridge
    volumes: [models]
    envVars:
      EPOCHS: "10"
    workdir: /work
    retries: 2
    timeout: 1h
  prep:
    command: [python, prep.py]
"#;
    let template = parse_template(yaml).unwrap();
    let train = &template.jobs["train"];
    assert_eq!(train.retries, 2);
    assert_eq!(train.runtime.as_deref(), Some("python-3.11-ml"));
    assert_eq!(train.env_vars.get("EPOCHS").map(String::as_str), Some("10"));
    assert_eq!(train.resources.to_request().unwrap().cores_needed(), 4);
}

#[test]
fn rejects_bad_yaml() {
    assert!(matches!(parse_template(": not yaml"), Err(ParseError::Yaml(_))));
}

#[test]
fn rejects_unsupported_version() {
    let yaml = "version: \"2.0\"\nname: x\njobs:\n  a:\n    command: [true]\n";
    assert!(matches!(
        parse_template(yaml),
        Err(ParseError::UnsupportedVersion(_))
    ));
}

#[test]
fn rejects_empty_jobs() {
    let yaml = "version: \"1.0\"\nname: x\njobs: {}\n";
    assert!(matches!(parse_template(yaml), Err(ParseError::NoJobs)));
}

#[test]
fn rejects_unknown_reference() {
    let yaml = r#"
version: "1.0"
name: x
jobs:
  b:
    command: [echo]
    dependsOn: [ghost]
"#;
    match parse_template(yaml) {
        Err(ParseError::UnknownReference { step, reference }) => {
            assert_eq!(step, "b");
            assert_eq!(reference, "ghost");
        }
        other => panic!("expected UnknownReference, got {other:?}"),
    }
}

#[test]
fn rejects_self_reference() {
    let yaml = r#"
version: "1.0"
name: x
jobs:
  a:
    command: [echo]
    dependsOn: [a]
"#;
    assert!(matches!(
        parse_template(yaml),
        Err(ParseError::SelfReference { .. })
    ));
}

#[test]
fn rejects_empty_command() {
    let yaml = "version: \"1.0\"\nname: x\njobs:\n  a:\n    command: []\n";
    assert!(matches!(
        parse_template(yaml),
        Err(ParseError::EmptyCommand { .. })
    ));
}

#[test]
fn rejects_invalid_step_resources() {
    let yaml = r#"
version: "1.0"
name: x
jobs:
  a:
    command: [echo]
    resources:
      maxMemory: banana
"#;
    assert!(matches!(
        parse_template(yaml),
        Err(ParseError::InvalidStep { .. })
    ));
}
