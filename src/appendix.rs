//! Appendix parsing: trait definitions from the monograph appendices.
//!
//! Appendix I lists quantitative variables ("12. Stem length (m); data taken
//! from labels. (stemlength)"), Appendix II qualitative ones with their
//! scoring rules ("3. Stems solitary (0); stems clustered (1). (solclu)").

use crate::error::{MonographError, Result};
use crate::table::CsvRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Which appendix a text file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendixKind {
    Quantitative,
    Qualitative,
}

/// One trait definition row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppendixEntry {
    #[serde(default)]
    pub number: u32,
    /// Trait wording (appendix 1) or scoring rules (appendix 2)
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub subject_extract: String,
    #[serde(default)]
    pub subject_gen: String,
}

impl CsvRecord for AppendixEntry {
    const HEADERS: &'static [&'static str] = &[
        "number",
        "description",
        "unit",
        "source",
        "code",
        "extra",
        "subject_extract",
        "subject_gen",
    ];
}

/// Standardised subjects in description order
pub const SUBJECT_ORDER: &[&str] = &[
    "Stem",
    "Leaf",
    "Ocrea",
    "Flagellum",
    "Petioles and rachises",
    "Pinna",
    "Inflorescence",
    "Peduncle",
    "Prophyll",
    "Partial inflorescence",
    "Rachilla",
    "Staminate structures",
    "Pistillate structures",
    "Fruit",
    "Seed",
];

/// Raw subject prefixes (lowercase) and their standardised subject.
/// First match wins, so longer prefixes come first.
const TERM_MAP: &[(&str, &str)] = &[
    ("pistillate partial", "Partial inflorescence"),
    ("staminate partial", "Partial inflorescence"),
    ("partial", "Partial inflorescence"),
    ("staminate", "Staminate structures"),
    ("pistillate", "Pistillate structures"),
    ("neuter", "Pistillate structures"),
    ("rachilla", "Rachilla"),
    ("proximalmost", "Pinna"),
    ("distalmost", "Pinna"),
    ("pinna", "Pinna"),
    ("fruiting", "Fruit"),
    ("fruit", "Fruit"),
    ("seed", "Seed"),
    ("endosperm", "Seed"),
    ("embryo", "Seed"),
    ("stem", "Stem"),
    ("leaf", "Leaf"),
    ("leaves", "Leaf"),
    ("sheath", "Leaf"),
    ("knee", "Leaf"),
    ("eophyll", "Leaf"),
    ("ocrea", "Ocrea"),
    ("flagell", "Flagellum"),
    ("petiole", "Petioles and rachises"),
    ("rachis", "Petioles and rachises"),
    ("cirr", "Petioles and rachises"),
    ("inflorescence", "Inflorescence"),
    ("primary", "Inflorescence"),
    ("bract", "Inflorescence"),
    ("peduncle", "Peduncle"),
    ("prophyll", "Prophyll"),
];

/// Map a raw subject onto [`SUBJECT_ORDER`]; unknown subjects are kept as-is
pub fn standardise_subject(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    TERM_MAP
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, subject)| subject.to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Join wrapped physical lines into one line per numbered entry
pub fn join_entries(text: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        let starts_entry = line
            .split_once('.')
            .map(|(head, _)| !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);

        if starts_entry {
            if !current.is_empty() {
                entries.push(std::mem::take(&mut current));
            }
            current = line.to_string();
        } else {
            current.push(' ');
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        entries.push(current);
    }
    entries
}

fn entry_pattern(kind: AppendixKind) -> Result<Regex> {
    let pattern = match kind {
        AppendixKind::Quantitative => {
            r"^(?P<number>\d+)\.\s+(?P<description>[\w\s,\-]+)(?:\s+\((?P<unit>\w+)\))?;\s+data taken from\s+(?P<source>[\w\s,]+)\.\s+\((?P<code>\w+)\)"
        }
        AppendixKind::Qualitative => {
            r"^(?P<number>\d+)\.\s*(?P<description>.+?)\.\s*\((?P<code>[a-z]+)\)(?:\.\s(?P<extra>.*))?$"
        }
    };
    Regex::new(pattern).map_err(|e| MonographError::Parse(e.to_string()))
}

/// Words that open multi-word subjects, longest first
fn multi_word_starts(kind: AppendixKind) -> &'static [&'static str] {
    match kind {
        AppendixKind::Quantitative => &["Staminate", "Pistillate"],
        AppendixKind::Qualitative => &[
            "Pistillate partial",
            "Pistillate",
            "Partial",
            "Staminate",
            "Neuter",
            "Rachilla-subtending",
            "Proximalmost",
            "Distalmost",
            "Fruiting",
        ],
    }
}

/// Raw subject of a trait description
pub fn extract_subject(description: &str, kind: AppendixKind) -> String {
    if description.contains("pinna") {
        return "Pinnae".to_string();
    }
    if description.to_lowercase().contains("rachis apices") {
        return "Rachis".to_string();
    }
    if kind == AppendixKind::Qualitative && description.contains("dorsal seed surfaces") {
        return "Seeds".to_string();
    }

    let words: Vec<&str> = description.split(' ').collect();
    for start in multi_word_starts(kind) {
        if description.starts_with(start) {
            let take = start.split(' ').count() + 1;
            return words[..take.min(words.len())].join(" ");
        }
    }
    words.first().map(|w| w.to_string()).unwrap_or_default()
}

/// Parse appendix text into trait definitions
pub fn parse_appendix(text: &str, kind: AppendixKind) -> Result<Vec<AppendixEntry>> {
    let pattern = entry_pattern(kind)?;

    join_entries(text)
        .into_iter()
        .map(|entry| {
            let caps = pattern
                .captures(&entry)
                .ok_or_else(|| MonographError::Parse(format!("Unrecognised appendix entry: {}", entry)))?;
            let field = |name: &str| {
                caps.name(name)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default()
            };
            let number = field("number")
                .parse::<u32>()
                .map_err(|e| MonographError::Parse(format!("Bad entry number in {}: {}", entry, e)))?;
            let description = field("description");
            let subject_extract = extract_subject(&description, kind);
            let subject_gen = standardise_subject(&subject_extract);

            Ok(AppendixEntry {
                number,
                unit: field("unit"),
                source: field("source"),
                code: field("code"),
                extra: field("extra"),
                description,
                subject_extract,
                subject_gen,
            })
        })
        .collect()
}

/// Parse an appendix text file and log how many traits each subject has
pub fn parse_appendix_file(path: &Path, kind: AppendixKind) -> Result<Vec<AppendixEntry>> {
    let text = std::fs::read_to_string(path)?;
    let entries = parse_appendix(&text, kind)?;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &entries {
        *counts.entry(entry.subject_gen.as_str()).or_default() += 1;
    }
    for (subject, count) in &counts {
        info!(subject = %subject, traits = count, "Appendix subject");
    }
    info!(path = %path.display(), entries = entries.len(), "Parsed appendix");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{read_records, write_records};

    const APPENDIX_1: &str = "\
1. Stem length (m); data taken from labels. (stemlength)
2. Number of pinnae per side of rachis; data taken
from specimens. (numpin)
3. Staminate rachilla length (cm); data taken from specimens. (srachlen)
";

    const APPENDIX_2: &str = "\
1. Stems solitary (0); stems clustered (1). (solclu)
2. Pistillate partial inflorescences with rachillae (0);
without (1). (ppinfl). Scored on adult plants.
3. Fruits ovoid (0); fruits globose (1). (frushape)
";

    #[test]
    fn test_join_entries() {
        let entries = join_entries(APPENDIX_1);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[1],
            "2. Number of pinnae per side of rachis; data taken from specimens. (numpin)"
        );
    }

    #[test]
    fn test_parse_quantitative() {
        let entries = parse_appendix(APPENDIX_1, AppendixKind::Quantitative).unwrap();
        assert_eq!(entries[0].code, "stemlength");
        assert_eq!(entries[0].unit, "m");
        assert_eq!(entries[0].source, "labels");
        assert_eq!(entries[0].subject_extract, "Stem");
        assert_eq!(entries[0].subject_gen, "Stem");

        assert_eq!(entries[1].unit, "");
        assert_eq!(entries[1].subject_extract, "Pinnae");
        assert_eq!(entries[1].subject_gen, "Pinna");

        assert_eq!(entries[2].subject_extract, "Staminate rachilla");
        assert_eq!(entries[2].subject_gen, "Staminate structures");
    }

    #[test]
    fn test_parse_qualitative() {
        let entries = parse_appendix(APPENDIX_2, AppendixKind::Qualitative).unwrap();
        assert_eq!(entries[0].description, "Stems solitary (0); stems clustered (1)");
        assert_eq!(entries[0].code, "solclu");
        assert_eq!(entries[1].code, "ppinfl");
        assert_eq!(entries[1].extra, "Scored on adult plants.");
        assert_eq!(entries[1].subject_extract, "Pistillate partial inflorescences");
        assert_eq!(entries[1].subject_gen, "Partial inflorescence");
        assert_eq!(entries[2].subject_gen, "Fruit");
    }

    #[test]
    fn test_unparseable_entry_is_an_error() {
        let err = parse_appendix("1. Something without a code", AppendixKind::Qualitative).unwrap_err();
        assert!(matches!(err, MonographError::Parse(_)));
    }

    #[test]
    fn test_extract_subject_keyword_rules() {
        assert_eq!(
            extract_subject("Spines on rachis apices length", AppendixKind::Quantitative),
            "Rachis"
        );
        assert_eq!(
            extract_subject("Leaf Rachis Apices with grapnels (0); without (1)", AppendixKind::Qualitative),
            "Rachis"
        );

        let seeds = "Endosperm of dorsal seed surfaces homogeneous (0); ruminate (1)";
        assert_eq!(extract_subject(seeds, AppendixKind::Qualitative), "Seeds");
        assert_eq!(extract_subject(seeds, AppendixKind::Quantitative), "Endosperm");
    }

    #[test]
    fn test_extract_subject_multi_word_prefixes() {
        assert_eq!(
            extract_subject("Rachilla-subtending bracts tubular (0); flat (1)", AppendixKind::Qualitative),
            "Rachilla-subtending bracts"
        );
        assert_eq!(
            extract_subject("Proximalmost rachillae reflexed (0); not reflexed (1)", AppendixKind::Qualitative),
            "Proximalmost rachillae"
        );
        // Qualitative-only prefixes fall back to the first word for appendix 1
        assert_eq!(
            extract_subject("Fruiting perianth length", AppendixKind::Quantitative),
            "Fruiting"
        );
        assert_eq!(extract_subject("Neuter", AppendixKind::Qualitative), "Neuter");
    }

    #[test]
    fn test_standardise_unknown_subject() {
        assert_eq!(standardise_subject("Anthers"), "Anthers");
        assert_eq!(standardise_subject("Leaf sheaths"), "Leaf");
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendix_2.csv");
        let entries = parse_appendix(APPENDIX_2, AppendixKind::Qualitative).unwrap();
        write_records(&entries, &path).unwrap();
        assert_eq!(read_records::<AppendixEntry>(&path).unwrap(), entries);
    }
}
