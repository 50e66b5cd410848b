//! Final description assembly.
//!
//! Sentences from both appendices are grouped by taxon and subject. A
//! subject with several sentences is condensed by the LLM into one clause;
//! the result is ordered the way a monograph describes a plant.

use crate::appendix::SUBJECT_ORDER;
use crate::description::DescriptionSentence;
use crate::error::Result;
use crate::llm::{ChatModel, Prompt, PromptRunner};
use crate::prompts::combine;
use crate::table::{unique_in_order, CsvRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Whole description of one taxon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonDescription {
    pub taxon_name: String,
    pub output_sentence: String,
}

impl CsvRecord for TaxonDescription {
    const HEADERS: &'static [&'static str] = &["taxon_name", "output_sentence"];
}

/// Position of a subject in description order; unknown subjects sort last
pub fn subject_rank(subject: &str) -> usize {
    SUBJECT_ORDER
        .iter()
        .position(|s| *s == subject)
        .unwrap_or(SUBJECT_ORDER.len())
}

/// Sort by taxon name, then subject order; ties keep their input order
pub fn sort_sentences(rows: &mut [DescriptionSentence]) {
    rows.sort_by(|a, b| {
        a.taxon_name
            .cmp(&b.taxon_name)
            .then_with(|| subject_rank(&a.subject).cmp(&subject_rank(&b.subject)))
    });
}

/// Merge the sentences of each taxon and subject into one.
///
/// A lone sentence is kept verbatim; two or more are combined by the LLM.
pub async fn combine_sentences<M: ChatModel>(
    runner: &PromptRunner<'_, M>,
    sentences: &[DescriptionSentence],
) -> Result<Vec<DescriptionSentence>> {
    let sentences: Vec<&DescriptionSentence> = sentences
        .iter()
        .filter(|s| !s.output_sentence.trim().is_empty())
        .collect();
    let taxa = unique_in_order(sentences.iter().map(|s| s.taxon_name.as_str()));
    let subjects = unique_in_order(sentences.iter().map(|s| s.subject.as_str()));

    let mut rows = Vec::new();
    let mut pending: Vec<(usize, Prompt)> = Vec::new();
    for taxon in &taxa {
        for subject in &subjects {
            let group: Vec<&str> = sentences
                .iter()
                .filter(|s| s.taxon_name == *taxon && s.subject == *subject)
                .map(|s| s.output_sentence.as_str())
                .collect();
            let output_sentence = match group.as_slice() {
                [] => continue,
                [only] => only.to_string(),
                _ => {
                    let prompt = combine::build_user_prompt(&serde_json::to_string(&group)?);
                    pending.push((
                        rows.len(),
                        Prompt::new(format!("{} / {}", taxon, subject), combine::SYSTEM_PROMPT, prompt),
                    ));
                    String::new()
                }
            };
            rows.push(DescriptionSentence {
                taxon_name: taxon.to_string(),
                output_sentence,
                subject: subject.to_string(),
            });
        }
    }

    info!(
        groups = rows.len(),
        combined = pending.len(),
        "Combining sentences"
    );
    let prompts: Vec<Prompt> = pending.iter().map(|(_, p)| p.clone()).collect();
    let outputs = runner.run(&prompts).await;
    for ((idx, prompt), output) in pending.iter().zip(outputs) {
        match output {
            Some(text) => rows[*idx].output_sentence = text.trim().to_string(),
            None => warn!(label = %prompt.label, "No combined sentence"),
        }
    }

    rows.retain(|r| !r.output_sentence.trim().is_empty());
    sort_sentences(&mut rows);
    Ok(rows)
}

/// Join each taxon's sentences, in their current order, with a space
pub fn join_by_taxon(rows: &[DescriptionSentence]) -> Vec<TaxonDescription> {
    unique_in_order(rows.iter().map(|r| r.taxon_name.as_str()))
        .into_iter()
        .map(|taxon| TaxonDescription {
            taxon_name: taxon.to_string(),
            output_sentence: rows
                .iter()
                .filter(|r| r.taxon_name == taxon)
                .map(|r| r.output_sentence.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedModel;

    fn row(taxon: &str, sentence: &str, subject: &str) -> DescriptionSentence {
        DescriptionSentence {
            taxon_name: taxon.to_string(),
            output_sentence: sentence.to_string(),
            subject: subject.to_string(),
        }
    }

    #[test]
    fn test_subject_rank() {
        assert_eq!(subject_rank("Stem"), 0);
        assert_eq!(subject_rank("Seed"), 14);
        assert_eq!(subject_rank("Anthers"), SUBJECT_ORDER.len());
    }

    #[tokio::test]
    async fn test_combine_orders_and_merges() {
        let sentences = vec![
            row("Calamus beta", "Seeds 1 per fruit.", "Seed"),
            row("Calamus beta", "Stems 8 m long.", "Stem"),
            row("Calamus alpha", "Fruits red.", "Fruit"),
            row("Calamus alpha", "Anthers yellow.", "Anthers"),
            row("Calamus alpha", "Stems clustered.", "Stem"),
            row("Calamus alpha", "Stems 3 m long.", "Stem"),
            row("Calamus alpha", " ", "Leaf"),
        ];
        let model = ScriptedModel::new("unused")
            .on(r#"["Stems clustered.","Stems 3 m long."]"#, " Stems clustered, 3 m long.\n");
        let runner = PromptRunner::new(&model, 2);

        let rows = combine_sentences(&runner, &sentences).await.unwrap();
        let got: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.taxon_name.as_str(), r.output_sentence.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Calamus alpha", "Stems clustered, 3 m long."),
                ("Calamus alpha", "Fruits red."),
                ("Calamus alpha", "Anthers yellow."),
                ("Calamus beta", "Stems 8 m long."),
                ("Calamus beta", "Seeds 1 per fruit."),
            ]
        );
        // Single sentences never reach the model
        assert_eq!(model.prompts().len(), 1);

        let joined = join_by_taxon(&rows);
        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined[1].output_sentence,
            "Stems 8 m long. Seeds 1 per fruit."
        );
    }

    #[tokio::test]
    async fn test_failed_combination_is_dropped() {
        let sentences = vec![
            row("Calamus alpha", "Stems clustered.", "Stem"),
            row("Calamus alpha", "Stems 3 m long.", "Stem"),
            row("Calamus alpha", "Fruits red.", "Fruit"),
        ];
        let model = ScriptedModel::new("unused").fail_on("Stems clustered.");
        let runner = PromptRunner::new(&model, 1);
        let rows = combine_sentences(&runner, &sentences).await.unwrap();
        assert_eq!(rows, vec![row("Calamus alpha", "Fruits red.", "Fruit")]);
    }
}
