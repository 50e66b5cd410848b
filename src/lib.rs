//! # rustmonograph
//!
//! Taxonomic monograph pipeline: PDF treatments and specimen matrices to
//! structured trait data, and trait data back to generated descriptions,
//! using a local Ollama model for the text steps.
//!
//! ## Modules
//!
//! - [`treatments`] - Description paragraphs from a monograph PDF
//! - [`appendix`] - Trait definitions from the appendix text
//! - [`sentences`] - Sentence splitting and subject categorisation
//! - [`extraction`] - Sentences to a wide trait matrix
//! - [`supplementary`] - Specimen matrix aggregation
//! - [`description`] - Trait data to one sentence per code
//! - [`combine`] - Per-taxon description assembly
//! - [`llm`] - Ollama client and prompt runner
//! - [`table`] - Header-addressed CSV tables
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustmonograph::appendix::{parse_appendix_file, AppendixKind};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let traits = parse_appendix_file(Path::new("appendix_1.txt"), AppendixKind::Quantitative)?;
//!     println!("Parsed {} traits", traits.len());
//!     Ok(())
//! }
//! ```

pub mod appendix;
pub mod combine;
pub mod config;
pub mod description;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod prompts;
pub mod sentences;
pub mod supplementary;
pub mod table;
pub mod treatments;

pub use error::{MonographError, Result};
