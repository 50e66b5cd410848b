//! Sentence splitting and subject categorisation.
//!
//! Treatment paragraphs are split into sentences, and each sentence is
//! assigned one of the appendix subjects by the LLM so later stages can
//! gather the text about one plant part.

use crate::appendix::AppendixEntry;
use crate::llm::{ChatModel, Prompt, PromptRunner};
use crate::prompts::categorise;
use crate::table::{unique_in_order, CsvRecord};
use crate::treatments::Treatment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Abbreviations whose trailing period never ends a sentence
const ABBREVIATIONS: &[&str] = &["subsp", "var", "ca"];

/// One sentence of a treatment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceRow {
    pub taxon_name: String,
    pub sentence: String,
    /// Sentences in this taxon's treatment
    pub sentence_count: usize,
    /// 1-based position within the treatment
    pub sentence_position: usize,
}

impl CsvRecord for SentenceRow {
    const HEADERS: &'static [&'static str] =
        &["taxon_name", "sentence", "sentence_count", "sentence_position"];
}

/// A sentence with its subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorisedSentence {
    pub taxon_name: String,
    pub sentence: String,
    pub sentence_count: usize,
    pub sentence_position: usize,
    #[serde(default)]
    pub subject_extract: String,
    #[serde(default)]
    pub subject_gen: String,
}

impl CsvRecord for CategorisedSentence {
    const HEADERS: &'static [&'static str] = &[
        "taxon_name",
        "sentence",
        "sentence_count",
        "sentence_position",
        "subject_extract",
        "subject_gen",
    ];
}

fn ends_with_abbreviation(text: &str) -> bool {
    let word = text
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    ABBREVIATIONS.iter().any(|a| word.eq_ignore_ascii_case(a))
}

/// Split a paragraph into sentences.
///
/// A period ends a sentence when followed by whitespace and an uppercase
/// letter, or by the end of the text.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, &(pos, c)) in chars.iter().enumerate() {
        if c != '.' {
            continue;
        }
        let rest = &chars[i + 1..];
        let at_end = rest.iter().all(|(_, ch)| ch.is_whitespace());
        let before_capital = rest.first().map(|(_, ch)| ch.is_whitespace()).unwrap_or(false)
            && rest
                .iter()
                .find(|(_, ch)| !ch.is_whitespace())
                .map(|(_, ch)| ch.is_uppercase())
                .unwrap_or(false);
        if !(at_end || before_capital) || ends_with_abbreviation(&text[start..pos]) {
            continue;
        }

        let sentence = text[start..=pos].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = pos + 1;
        if at_end {
            break;
        }
    }

    let tail = text.get(start..).unwrap_or_default().trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Split every treatment into numbered sentence rows
pub fn split_treatments(treatments: &[Treatment]) -> Vec<SentenceRow> {
    let mut rows = Vec::new();
    for treatment in treatments {
        let sentences = split_sentences(&treatment.treatment);
        let count = sentences.len();
        debug!(taxon = %treatment.taxon_name, sentences = count, "Split treatment");
        rows.extend(sentences.into_iter().enumerate().map(|(i, sentence)| SentenceRow {
            taxon_name: treatment.taxon_name.clone(),
            sentence,
            sentence_count: count,
            sentence_position: i + 1,
        }));
    }
    rows
}

/// Match a categorisation reply against the allowed subjects
pub fn match_subject<'a>(reply: &str, subjects: &[&'a str]) -> Option<&'a str> {
    let answer = reply.trim().trim_end_matches('.').trim().trim_matches('"');
    subjects
        .iter()
        .find(|s| s.eq_ignore_ascii_case(answer))
        .copied()
}

/// Ask the LLM for the subject of every sentence.
///
/// Replies that are not one of the appendix subjects are logged and leave the
/// sentence uncategorised.
pub async fn categorise_sentences<M: ChatModel>(
    runner: &PromptRunner<'_, M>,
    rows: &[SentenceRow],
    appendix: &[AppendixEntry],
) -> Vec<CategorisedSentence> {
    let subjects = unique_in_order(appendix.iter().map(|e| e.subject_extract.as_str()));
    let subject_list: Vec<String> = subjects.iter().map(|s| s.to_string()).collect();
    let mut generalised: HashMap<&str, &str> = HashMap::new();
    for entry in appendix {
        generalised
            .entry(entry.subject_extract.as_str())
            .or_insert(entry.subject_gen.as_str());
    }

    let prompts: Vec<Prompt> = rows
        .iter()
        .map(|row| {
            Prompt::new(
                format!("{} #{}", row.taxon_name, row.sentence_position),
                categorise::SYSTEM_PROMPT,
                categorise::build_user_prompt(&row.sentence, &subject_list),
            )
        })
        .collect();
    let outputs = runner.run(&prompts).await;

    let mut uncategorised = 0;
    let categorised = rows
        .iter()
        .zip(outputs)
        .map(|(row, output)| {
            let subject = output.as_deref().and_then(|reply| {
                let matched = match_subject(reply, &subjects);
                if matched.is_none() {
                    warn!(reply = %reply, sentence = %row.sentence, "Subject not found");
                }
                matched
            });
            if subject.is_none() {
                uncategorised += 1;
            }
            let subject_extract = subject.unwrap_or_default().to_string();
            let subject_gen = generalised
                .get(subject_extract.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default();
            CategorisedSentence {
                taxon_name: row.taxon_name.clone(),
                sentence: row.sentence.clone(),
                sentence_count: row.sentence_count,
                sentence_position: row.sentence_position,
                subject_extract,
                subject_gen,
            }
        })
        .collect::<Vec<_>>();

    info!(
        sentences = rows.len(),
        uncategorised,
        "Categorised sentences"
    );
    categorised
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedModel;

    #[test]
    fn test_split_sentences() {
        let text = "Stems clustered, climbing, to 3.5 m long. Leaf sheaths green. Pinnae 12 per side.";
        assert_eq!(
            split_sentences(text),
            vec![
                "Stems clustered, climbing, to 3.5 m long.",
                "Leaf sheaths green.",
                "Pinnae 12 per side."
            ]
        );
    }

    #[test]
    fn test_split_keeps_abbreviations_and_lowercase_continuations() {
        let text = "Stems ca. 2 m long, as in subsp. Borneensis. Fruits globose. seeds 1";
        assert_eq!(
            split_sentences(text),
            vec![
                "Stems ca. 2 m long, as in subsp. Borneensis.",
                "Fruits globose. seeds 1"
            ]
        );
    }

    #[test]
    fn test_split_keeps_varieties_and_trailing_decimals() {
        let text = "As in var. Major the stems are 2.5 m. Seeds 0.8.";
        assert_eq!(
            split_sentences(text),
            vec!["As in var. Major the stems are 2.5 m.", "Seeds 0.8."]
        );
    }

    #[test]
    fn test_split_treatments_numbers_sentences() {
        let treatments = vec![Treatment {
            taxon_name: "Calamus acanthospathus".to_string(),
            treatment: "Stems clustered. Fruits ovoid.".to_string(),
        }];
        let rows = split_treatments(&treatments);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].sentence_count, 2);
        assert_eq!(rows[1].sentence_position, 2);
        assert_eq!(rows[1].sentence, "Fruits ovoid.");
    }

    #[test]
    fn test_match_subject() {
        let subjects = ["Stems", "Pinnae"];
        assert_eq!(match_subject(" pinnae.\n", &subjects), Some("Pinnae"));
        assert_eq!(match_subject("Flowers", &subjects), None);
    }

    #[tokio::test]
    async fn test_categorise_sentences() {
        let appendix = vec![
            AppendixEntry {
                code: "stemlength".to_string(),
                subject_extract: "Stem".to_string(),
                subject_gen: "Stem".to_string(),
                ..Default::default()
            },
            AppendixEntry {
                code: "numpin".to_string(),
                subject_extract: "Pinnae".to_string(),
                subject_gen: "Pinna".to_string(),
                ..Default::default()
            },
        ];
        let rows = split_treatments(&[Treatment {
            taxon_name: "Calamus a".to_string(),
            treatment: "Stems 3 m long. Pinnae 5 per side. Flowers unknown.".to_string(),
        }]);
        let model = ScriptedModel::new("Flowers")
            .on("\"Stems 3 m long.\"", "stem")
            .on("\"Pinnae 5 per side.\"", "Pinnae.");
        let runner = PromptRunner::new(&model, 2);

        let out = categorise_sentences(&runner, &rows, &appendix).await;
        assert_eq!(out[0].subject_extract, "Stem");
        assert_eq!(out[1].subject_extract, "Pinnae");
        assert_eq!(out[1].subject_gen, "Pinna");
        assert_eq!(out[2].subject_extract, "");
        assert!(model.prompts()[0].contains("categories Stem,Pinnae."));
    }
}
