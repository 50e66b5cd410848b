//! Description generation: formatted trait data to sentences.
//!
//! One sentence is generated per taxon and trait code. Quantitative codes
//! always use the measurement prompt. Qualitative codes are reconciled first:
//! a code with no value produces nothing, a single value is matched against
//! its rules, and a code whose specimens disagree is described from the
//! dominant value and how often it was seen.

use crate::appendix::AppendixEntry;
use crate::config::TraitLayout;
use crate::error::{MonographError, Result};
use crate::llm::{ChatModel, Prompt, PromptRunner};
use crate::prompts::description::{self, MultiValueMaterials};
use crate::supplementary::MultiValueRow;
use crate::table::{unique_in_order, CsvRecord, Table, TidyValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Subject given to fruit colour sentences
pub const FRUIT_SUBJECT: &str = "Fruit";

/// One generated sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionSentence {
    pub taxon_name: String,
    pub output_sentence: String,
    pub subject: String,
}

impl CsvRecord for DescriptionSentence {
    const HEADERS: &'static [&'static str] = &["taxon_name", "output_sentence", "subject"];
}

#[derive(Debug, Serialize)]
struct DefinitionRecord<'a> {
    code: &'a str,
    description: &'a str,
    unit: &'a str,
}

#[derive(Debug, Serialize)]
struct RuleRecord<'a> {
    code: &'a str,
    rules: &'a str,
}

#[derive(Debug, Serialize)]
struct ValueRecord<'a> {
    code: &'a str,
    value: &'a str,
}

/// How a qualitative code is described for one taxon
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation<'a> {
    /// No value scored; no sentence
    Absent,
    /// One value; match it against the rules
    Single,
    /// Specimens disagree; describe the dominant value
    Multiple(&'a MultiValueRow),
    /// Several values but no multi-value row to describe them with
    Unresolved,
}

/// Decide how to describe the scored values of one taxon and code
pub fn reconcile<'a>(values: &[&str], multi: Option<&'a MultiValueRow>) -> Reconciliation<'a> {
    if values.iter().all(|v| v.trim().is_empty()) {
        Reconciliation::Absent
    } else if values.iter().any(|v| v.contains(',')) {
        match multi {
            Some(row) => Reconciliation::Multiple(row),
            None => Reconciliation::Unresolved,
        }
    } else {
        Reconciliation::Single
    }
}

/// Clean a measurement sentence; replies without any number are dropped
pub fn clean_quantitative_output(output: &str) -> String {
    if !output.chars().any(|c| c.is_ascii_digit()) {
        return String::new();
    }
    if output.contains("Number of pinnae") {
        return output.replace(".0", "");
    }
    output.to_string()
}

/// Reply cleanup for rule-matching sentences
pub struct OutputCleaner {
    quoted: Regex,
    json_tail: Regex,
    state_marker: Regex,
}

impl OutputCleaner {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|e| MonographError::Parse(e.to_string()));
        Ok(Self {
            quoted: compile(r"'(.*?)'")?,
            json_tail: compile(r#"\d"\}\s*(.*)"#)?,
            state_marker: compile(r"\(\d\)")?,
        })
    }

    /// Apply the cleaning rules in order and trim the result
    pub fn clean(&self, output: &str) -> String {
        if output.contains("not as above") || output.contains("empty string") {
            return String::new();
        }
        let mut text = output.to_string();
        if let Some(caps) = self.quoted.captures(&text) {
            text = caps[1].to_string();
        }
        if let Some(caps) = self.json_tail.captures(&text) {
            text = caps[1].to_string();
        }
        text = self.state_marker.replace_all(&text, "").into_owned();
        if text.contains(r#""value": ""}"#) {
            return String::new();
        }
        text.trim().to_string()
    }
}

/// First appendix entry of each distinct code that has a data column
fn described_entries<'a>(appendix: &'a [AppendixEntry], data: &Table) -> Vec<&'a AppendixEntry> {
    unique_in_order(appendix.iter().map(|e| e.code.as_str()))
        .into_iter()
        .filter(|code| {
            let present = data.has_column(code);
            if !present {
                debug!(code = %code, "Code not in data, skipping");
            }
            present
        })
        .filter_map(|code| appendix.iter().find(|e| e.code == code))
        .collect()
}

/// Tidy values of the described codes, keyed by taxon and code
fn tidy_lookup(tidy: &[TidyValue]) -> HashMap<(&str, &str), Vec<&str>> {
    let mut lookup: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
    for value in tidy {
        lookup
            .entry((value.taxon_name.as_str(), value.code.as_str()))
            .or_default()
            .push(value.value.as_str());
    }
    lookup
}

/// Send the prompts and keep the non-blank cleaned replies
async fn collect_sentences<M: ChatModel>(
    runner: &PromptRunner<'_, M>,
    jobs: Vec<(Prompt, String, String)>,
    clean: impl Fn(&str) -> String,
) -> Vec<DescriptionSentence> {
    let prompts: Vec<Prompt> = jobs.iter().map(|(p, _, _)| p.clone()).collect();
    let outputs = runner.run(&prompts).await;

    jobs.into_iter()
        .zip(outputs)
        .filter_map(|((_, taxon_name, subject), output)| {
            let sentence = clean(&output?);
            (!sentence.trim().is_empty()).then_some(DescriptionSentence {
                taxon_name,
                output_sentence: sentence,
                subject,
            })
        })
        .collect()
}

/// Generate measurement sentences from appendix 1 and the formatted data
pub async fn describe_quantitative<M: ChatModel>(
    runner: &PromptRunner<'_, M>,
    appendix: &[AppendixEntry],
    data: &Table,
) -> Result<Vec<DescriptionSentence>> {
    let entries = described_entries(appendix, data);
    let codes: Vec<String> = entries.iter().map(|e| e.code.clone()).collect();
    let tidy = data.melt("taxon_name", &codes)?;
    let lookup = tidy_lookup(&tidy);

    let mut jobs = Vec::new();
    for taxon in data.unique("taxon_name")? {
        for entry in &entries {
            let values = lookup
                .get(&(taxon.as_str(), entry.code.as_str()))
                .cloned()
                .unwrap_or_default();
            if values.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            let definition = serde_json::to_string(&[DefinitionRecord {
                code: &entry.code,
                description: &entry.description,
                unit: &entry.unit,
            }])?;
            let value_records: Vec<ValueRecord<'_>> = values
                .iter()
                .map(|v| ValueRecord {
                    code: &entry.code,
                    value: v,
                })
                .collect();
            let values_json = serde_json::to_string(&value_records)?;
            jobs.push((
                Prompt::new(
                    format!("{} / {}", taxon, entry.code),
                    description::QUANTITATIVE_SYSTEM_PROMPT,
                    description::build_quantitative_prompt(&definition, &values_json),
                ),
                taxon.clone(),
                entry.subject_gen.clone(),
            ));
        }
    }

    info!(prompts = jobs.len(), codes = entries.len(), "Describing quantitative traits");
    Ok(collect_sentences(runner, jobs, clean_quantitative_output).await)
}

/// Generate rule-matching sentences from appendix 2, the formatted data and
/// the multi-value table, followed by the fruit colour sentences.
pub async fn describe_qualitative<M: ChatModel>(
    runner: &PromptRunner<'_, M>,
    appendix: &[AppendixEntry],
    data: &Table,
    multi_value: &[MultiValueRow],
    layout: &TraitLayout,
) -> Result<Vec<DescriptionSentence>> {
    let entries: Vec<&AppendixEntry> = described_entries(appendix, data)
        .into_iter()
        .filter(|e| e.code != layout.fruit_colour)
        .collect();
    let codes: Vec<String> = entries.iter().map(|e| e.code.clone()).collect();

    let trailing_zero = Regex::new(r"\.0\b").map_err(|e| MonographError::Parse(e.to_string()))?;
    let tidy: Vec<TidyValue> = data
        .melt("taxon_name", &codes)?
        .into_iter()
        .map(|mut t| {
            t.value = trailing_zero.replace_all(&t.value, "").into_owned();
            t
        })
        .collect();
    let lookup = tidy_lookup(&tidy);
    let multi: HashMap<(&str, &str), &MultiValueRow> = multi_value
        .iter()
        .map(|m| ((m.taxon_name.as_str(), m.code.as_str()), m))
        .collect();

    let mut jobs = Vec::new();
    let (mut absent, mut unresolved) = (0usize, 0usize);
    for taxon in data.unique("taxon_name")? {
        for entry in &entries {
            let key = (taxon.as_str(), entry.code.as_str());
            let values = lookup.get(&key).cloned().unwrap_or_default();
            let rules = serde_json::to_string(&[RuleRecord {
                code: &entry.code,
                rules: &entry.description,
            }])?;

            let user = match reconcile(&values, multi.get(&key).copied()) {
                Reconciliation::Absent => {
                    absent += 1;
                    continue;
                }
                Reconciliation::Unresolved => {
                    debug!(taxon = %taxon, code = %entry.code, "No multi-value row");
                    unresolved += 1;
                    continue;
                }
                Reconciliation::Single => {
                    let value_records: Vec<ValueRecord<'_>> = values
                        .iter()
                        .map(|v| ValueRecord {
                            code: &entry.code,
                            value: v,
                        })
                        .collect();
                    description::build_single_value_prompt(&rules, &serde_json::to_string(&value_records)?)
                }
                Reconciliation::Multiple(row) => {
                    let values_json = serde_json::to_string(&[ValueRecord {
                        code: &row.code,
                        value: &row.value,
                    }])?;
                    description::build_multi_value_prompt(&MultiValueMaterials {
                        rules_json: &rules,
                        values_json: &values_json,
                        frequency: row.frequency,
                        num_specimens_scored: row.num_specimens_scored,
                        other_values: &row.other_values,
                    })
                }
            };
            jobs.push((
                Prompt::new(
                    format!("{} / {}", taxon, entry.code),
                    description::QUALITATIVE_SYSTEM_PROMPT,
                    user,
                ),
                taxon.clone(),
                entry.subject_gen.clone(),
            ));
        }
    }

    info!(
        prompts = jobs.len(),
        absent,
        unresolved,
        "Describing qualitative traits"
    );
    let cleaner = OutputCleaner::new()?;
    let mut sentences = collect_sentences(runner, jobs, |o| cleaner.clean(o)).await;
    sentences.extend(fruit_colour_sentences(data, &layout.fruit_colour)?);
    Ok(sentences)
}

/// Fruit colour values become sentences as they are
pub fn fruit_colour_sentences(data: &Table, column: &str) -> Result<Vec<DescriptionSentence>> {
    let taxa = data.column("taxon_name")?;
    let colours = data.column(column)?;
    Ok(taxa
        .into_iter()
        .zip(colours)
        .filter(|(_, colour)| !colour.trim().is_empty())
        .map(|(taxon, colour)| DescriptionSentence {
            taxon_name: taxon.to_string(),
            output_sentence: colour.to_string(),
            subject: FRUIT_SUBJECT.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedModel;

    fn entry(code: &str, description: &str, unit: &str, subject: &str) -> AppendixEntry {
        AppendixEntry {
            code: code.to_string(),
            description: description.to_string(),
            unit: unit.to_string(),
            subject_gen: subject.to_string(),
            ..Default::default()
        }
    }

    fn data() -> Table {
        Table::from_reader(
            "\
taxon_name,numpin,stemlength,solclu,embryo,frucol
Calamus alpha,12(10-14),,\"0, 1\",1.0,red
Calamus beta,8,3.5,0,,
"
            .as_bytes(),
        )
        .unwrap()
    }

    fn multi_row() -> MultiValueRow {
        MultiValueRow {
            taxon_name: "Calamus alpha".to_string(),
            code: "solclu".to_string(),
            value: "1".to_string(),
            frequency: 3,
            num_specimens: 4,
            num_specimens_scored: 4,
            other_values: "0".to_string(),
        }
    }

    #[test]
    fn test_reconcile() {
        let row = multi_row();
        assert_eq!(reconcile(&["", " "], Some(&row)), Reconciliation::Absent);
        assert_eq!(reconcile(&["0, 1"], Some(&row)), Reconciliation::Multiple(&row));
        assert_eq!(reconcile(&["0, 1"], None), Reconciliation::Unresolved);
        assert_eq!(reconcile(&["1"], None), Reconciliation::Single);
    }

    #[test]
    fn test_clean_quantitative_output() {
        assert_eq!(clean_quantitative_output("Stem length is unknown."), "");
        assert_eq!(
            clean_quantitative_output("Number of pinnae is 12.0(10.0-14.0)."),
            "Number of pinnae is 12(10-14)."
        );
        assert_eq!(clean_quantitative_output("Stem length 3.0 m."), "Stem length 3.0 m.");
    }

    #[test]
    fn test_output_cleaner() {
        let cleaner = OutputCleaner::new().unwrap();
        assert_eq!(cleaner.clean("Leaf sheath spines not as above."), "");
        assert_eq!(cleaner.clean("The output would be 'stems clustered' only."), "stems clustered");
        assert_eq!(
            cleaner.clean(r#"{"code":"solclu","value":"1"} Stems clustered (1)."#),
            "Stems clustered ."
        );
        assert_eq!(cleaner.clean(r#"{"code": "seeded", "value": ""}"#), "");
        assert_eq!(cleaner.clean("  Fruits globose.\n"), "Fruits globose.");
    }

    #[tokio::test]
    async fn test_describe_quantitative() {
        let appendix = vec![
            entry("numpin", "Number of pinnae", "", "Pinna"),
            entry("stemlength", "Stem length", "m", "Stem"),
            entry("rachislen", "Rachis length", "cm", "Petioles and rachises"),
        ];
        let model = ScriptedModel::new("Blank.")
            .on(r#""value":"12(10-14)""#, "Number of pinnae is 12.0(10.0-14.0).")
            .on(r#""value":"8""#, "Number of pinnae is 8.")
            .on(r#""value":"3.5""#, "Stem length is 3.5 m.");
        let runner = PromptRunner::new(&model, 2);

        let out = describe_quantitative(&runner, &appendix, &data()).await.unwrap();
        // Empty stem length for alpha sends no prompt; rachislen is not in the data
        assert_eq!(model.prompts().len(), 3);
        assert_eq!(
            out,
            vec![
                DescriptionSentence {
                    taxon_name: "Calamus alpha".to_string(),
                    output_sentence: "Number of pinnae is 12(10-14).".to_string(),
                    subject: "Pinna".to_string(),
                },
                DescriptionSentence {
                    taxon_name: "Calamus beta".to_string(),
                    output_sentence: "Number of pinnae is 8.".to_string(),
                    subject: "Pinna".to_string(),
                },
                DescriptionSentence {
                    taxon_name: "Calamus beta".to_string(),
                    output_sentence: "Stem length is 3.5 m.".to_string(),
                    subject: "Stem".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_qualitative() {
        let appendix = vec![
            entry("solclu", "Stems solitary (0); stems clustered (1)", "", "Stem"),
            entry("embryo", "Embryo basal (0); embryo lateral (1)", "", "Seed"),
        ];
        let model = ScriptedModel::new("not as above")
            .on("- frequency: 3\n", "Stems clustered, rarely solitary.")
            .on(r#"{"code":"embryo","value":"1"}"#, "'Embryo lateral (1)'")
            .on(r#"{"code":"solclu","value":"0"}"#, "Stems solitary (0).");
        let runner = PromptRunner::new(&model, 1);

        let out = describe_qualitative(
            &runner,
            &appendix,
            &data(),
            &[multi_row()],
            &TraitLayout::default(),
        )
        .await
        .unwrap();

        let sentences: Vec<(&str, &str, &str)> = out
            .iter()
            .map(|s| (s.taxon_name.as_str(), s.output_sentence.as_str(), s.subject.as_str()))
            .collect();
        assert_eq!(
            sentences,
            vec![
                ("Calamus alpha", "Stems clustered, rarely solitary.", "Stem"),
                ("Calamus alpha", "Embryo lateral", "Seed"),
                ("Calamus beta", "Stems solitary .", "Stem"),
                ("Calamus alpha", "red", "Fruit"),
            ]
        );
        // Beta has no embryo value, so only three prompts were sent
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_multi_value_without_row_is_skipped() {
        let appendix = vec![entry("solclu", "Stems solitary (0); stems clustered (1)", "", "Stem")];
        let model = ScriptedModel::new("Stems clustered.");
        let runner = PromptRunner::new(&model, 1);
        let out = describe_qualitative(&runner, &appendix, &data(), &[], &TraitLayout::default())
            .await
            .unwrap();
        assert_eq!(model.prompts().len(), 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].taxon_name, "Calamus beta");
    }
}
