// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joblet-workflow: workflow template parsing and DAG validation.
//!
//! A workflow template is a YAML document naming steps and the dependency
//! edges between them. Parsing produces a [`WorkflowTemplate`]; validation
//! checks every `dependsOn` reference and topologically sorts the steps,
//! rejecting cycles. Translating steps into engine jobs is the resolver's
//! business, not this crate's.

pub mod dag;
pub mod parser;
pub mod template;

pub use dag::{topo_sort, CycleDetected};
pub use parser::{parse_template, ParseError};
pub use template::{DependsOn, StepResources, StepSpec, StepUploads, WorkflowTemplate};
