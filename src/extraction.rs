//! Trait extraction: categorised sentences to a wide trait matrix.
//!
//! For every taxon and appendix subject the matching sentences form a
//! paragraph, and the LLM encodes that paragraph into `{code: value}` JSON.
//! Replies are merged per taxon into one record.

use crate::appendix::AppendixEntry;
use crate::error::Result;
use crate::llm::{merge_json_object, ChatModel, Prompt, PromptRunner};
use crate::prompts::extraction::{self, PromptStyle};
use crate::sentences::CategorisedSentence;
use crate::table::{unique_in_order, Table};
use serde::Serialize;
use tracing::{debug, info};

/// Appendix rows sent together in one qualitative prompt
pub const RULES_BATCH_SIZE: usize = 8;

#[derive(Debug, Serialize)]
struct RuleRecord<'a> {
    code: &'a str,
    rules: &'a str,
}

/// Which appendix drives the extraction
#[derive(Debug, Clone, Copy)]
pub enum ExtractionKind {
    /// One few-shot prompt per measurement code
    Quantitative,
    /// Batched rule scoring in the given style
    Qualitative(PromptStyle),
}

/// Sentences that carry a subject
fn categorised(sentences: &[CategorisedSentence]) -> Vec<&CategorisedSentence> {
    let kept: Vec<_> = sentences
        .iter()
        .filter(|s| !s.subject_extract.trim().is_empty())
        .collect();
    if kept.len() < sentences.len() {
        debug!(dropped = sentences.len() - kept.len(), "Dropped uncategorised sentences");
    }
    kept
}

/// Space-joined sentences of one taxon and subject
fn subject_paragraph(
    sentences: &[&CategorisedSentence],
    taxon: &str,
    subject: &str,
    numeric_only: bool,
) -> String {
    sentences
        .iter()
        .filter(|s| s.taxon_name == taxon && s.subject_extract == subject)
        .filter(|s| !numeric_only || s.sentence.chars().any(|c| c.is_ascii_digit()))
        .map(|s| s.sentence.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prompts for one taxon, subject by subject
fn taxon_prompts(
    kind: ExtractionKind,
    sentences: &[&CategorisedSentence],
    appendix: &[AppendixEntry],
    taxon: &str,
) -> Result<Vec<Prompt>> {
    let mut prompts = Vec::new();

    for subject in unique_in_order(appendix.iter().map(|e| e.subject_extract.as_str())) {
        let numeric_only = matches!(kind, ExtractionKind::Quantitative);
        let paragraph = subject_paragraph(sentences, taxon, subject, numeric_only);
        if paragraph.is_empty() {
            debug!(taxon = %taxon, subject = %subject, "No sentences for subject");
            continue;
        }
        let entries: Vec<&AppendixEntry> = appendix
            .iter()
            .filter(|e| e.subject_extract == subject)
            .collect();

        match kind {
            ExtractionKind::Quantitative => {
                for entry in entries {
                    prompts.push(Prompt::new(
                        format!("{} / {}", taxon, entry.code),
                        extraction::SYSTEM_PROMPT,
                        extraction::build_quantitative_prompt(&paragraph, &entry.code),
                    ));
                }
            }
            ExtractionKind::Qualitative(style) => {
                for (i, batch) in entries.chunks(RULES_BATCH_SIZE).enumerate() {
                    let records: Vec<RuleRecord<'_>> = batch
                        .iter()
                        .map(|e| RuleRecord {
                            code: &e.code,
                            rules: &e.description,
                        })
                        .collect();
                    let rules_batch = serde_json::to_string(&records)?;
                    prompts.push(Prompt::new(
                        format!("{} / {} batch {}", taxon, subject, i + 1),
                        extraction::SYSTEM_PROMPT,
                        extraction::build_qualitative_prompt(style, &paragraph, &rules_batch),
                    ));
                }
            }
        }
    }
    Ok(prompts)
}

/// Extract trait values for every taxon.
///
/// Output has one row per taxon (first-seen order) with `taxon_name` first,
/// then every appendix code, then any other keys the replies produced.
/// Codes that were never asked for still get an empty column.
pub async fn extract_traits<M: ChatModel>(
    runner: &PromptRunner<'_, M>,
    kind: ExtractionKind,
    sentences: &[CategorisedSentence],
    appendix: &[AppendixEntry],
) -> Result<Table> {
    let sentences = categorised(sentences);
    let taxa = unique_in_order(sentences.iter().map(|s| s.taxon_name.as_str()));
    info!(taxa = taxa.len(), traits = appendix.len(), "Extracting traits");

    let mut records = Vec::with_capacity(taxa.len());
    for (i, taxon) in taxa.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, taxa.len(), taxon);
        let prompts = taxon_prompts(kind, &sentences, appendix, taxon)?;
        let outputs = runner.run(&prompts).await;

        let mut record = vec![("taxon_name".to_string(), taxon.to_string())];
        for output in outputs.into_iter().flatten() {
            merge_json_object(&output, &mut record);
        }
        records.push(record);
    }

    let codes: Vec<&str> = appendix.iter().map(|e| e.code.as_str()).collect();
    records_to_table(&codes, &records)
}

/// Lay ordered records out as a table; missing cells are empty
fn records_to_table(codes: &[&str], records: &[Vec<(String, String)>]) -> Result<Table> {
    let headers = unique_in_order(
        std::iter::once("taxon_name")
            .chain(codes.iter().copied())
            .chain(records.iter().flatten().map(|(k, _)| k.as_str())),
    );
    let mut table = Table::new(headers.iter().copied());
    for record in records {
        let row = headers
            .iter()
            .map(|h| {
                record
                    .iter()
                    .find(|(k, _)| k == h)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .collect();
        table.push_row(row)?;
    }
    Ok(table)
}
