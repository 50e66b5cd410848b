//! Prompt module for LLM-based operations.
//!
//! This module provides the prompt templates for each pipeline stage.
//! Templates use `{placeholder}` markers filled by the `build_*` functions.

pub mod categorise;
pub mod combine;
pub mod description;
pub mod extraction;

/// Fill `{name}` placeholders in a template
pub(crate) fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}
