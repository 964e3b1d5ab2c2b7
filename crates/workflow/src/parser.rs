// SPDX-License-Identifier: MIT

//! Workflow YAML parsing and reference validation.

use thiserror::Error;

use crate::template::{WorkflowTemplate, SUPPORTED_VERSIONS};

/// Errors from template parsing and validation.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported workflow version: {0}")]
    UnsupportedVersion(String),
    #[error("workflow has no jobs")]
    NoJobs,
    #[error("step {step}: empty command")]
    EmptyCommand { step: String },
    #[error("step {step}: dependsOn references unknown step {reference}")]
    UnknownReference { step: String, reference: String },
    #[error("step {step}: depends on itself")]
    SelfReference { step: String },
    #[error("step {step}: {message}")]
    InvalidStep { step: String, message: String },
}

/// Parse and validate a workflow template from YAML bytes.
///
/// Validation covers structure only: version, non-empty commands, and that
/// every `dependsOn` names a declared step. Cycle detection is a separate
/// pass ([`crate::dag::topo_sort`]) so the caller can distinguish
/// `ParseError` from `CycleDetected`.
pub fn parse_template(yaml: &str) -> Result<WorkflowTemplate, ParseError> {
    let template: WorkflowTemplate = serde_yaml::from_str(yaml)?;

    if !SUPPORTED_VERSIONS.contains(&template.version.as_str()) {
        return Err(ParseError::UnsupportedVersion(template.version));
    }
    if template.jobs.is_empty() {
        return Err(ParseError::NoJobs);
    }

    for (name, step) in &template.jobs {
        if step.command.is_empty() || step.command[0].is_empty() {
            return Err(ParseError::EmptyCommand { step: name.clone() });
        }
        if let Err(e) = step.resources.to_request() {
            return Err(ParseError::InvalidStep {
                step: name.clone(),
                message: e.to_string(),
            });
        }
        if let Err(e) = step.timeout_duration() {
            return Err(ParseError::InvalidStep {
                step: name.clone(),
                message: e.to_string(),
            });
        }
        for dep in &step.depends_on {
            if dep.step == *name {
                return Err(ParseError::SelfReference { step: name.clone() });
            }
            if !template.jobs.contains_key(&dep.step) {
                return Err(ParseError::UnknownReference {
                    step: name.clone(),
                    reference: dep.step.clone(),
                });
            }
        }
    }

    tracing::debug!(
        name = %template.name,
        steps = template.jobs.len(),
        "parsed workflow template"
    );
    Ok(template)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
