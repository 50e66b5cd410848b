//! Taxonomic treatment extraction from a monograph PDF.
//!
//! The PDF text is split into lines, page furniture is stripped, and every
//! line is labelled with its enclosing section, taxon treatment and treatment
//! subsection by filling markers down. The description subsection of each
//! treatment becomes one paragraph per taxon.

use crate::config::MonographLayout;
use crate::error::{MonographError, Result};
use crate::table::CsvRecord;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Section headings in document order
const SECTION_HEADINGS: &[(Section, &str)] = &[
    (Section::Abstract, "Abstract"),
    (Section::Introduction, "Introduction"),
    (Section::MaterialsAndMethods, "Materials and Methods"),
    (Section::Distribution, "Distribution"),
    (Section::Morphology, "Morphology"),
    (Section::TaxonomicTreatment, "Taxonomic Treatment"),
    (Section::Acknowledgements, "Acknowledgements"),
    (Section::References, "References"),
    (Section::Appendix1, "Appendix I. Quantitative variables"),
    (Section::Appendix2, "Appendix II. Qualitative Variables"),
    (Section::Appendix3, "Appendix III. Excluded and Uncertain Names"),
    (Section::Appendix4, "Appendix IV . Species by Region/Island/Country"),
    (Section::Appendix6, "Appendix VI. Plates"),
];

/// Top-level section of the monograph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Abstract,
    Introduction,
    MaterialsAndMethods,
    Distribution,
    Morphology,
    TaxonomicTreatment,
    Acknowledgements,
    References,
    Appendix1,
    Appendix2,
    Appendix3,
    Appendix4,
    Appendix6,
}

/// Subsection within a taxon treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsection {
    NomenclaturalDetails,
    Description,
    Distribution,
    TaxonomicNotes,
    SubspecificVariation,
    KeyToSubspecies,
}

/// Treatment number and name, e.g. `12a` / `Calamus x subsp. y`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonId {
    pub number: String,
    pub name: String,
}

/// One labelled line of the monograph
#[derive(Debug, Clone)]
pub struct MonographLine {
    pub page: u32,
    pub text: String,
    pub cleaned: String,
    pub section: Option<Section>,
    pub taxon: Option<TaxonId>,
    pub subsection: Option<Subsection>,
}

/// Description paragraph for one taxon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub taxon_name: String,
    pub treatment: String,
}

impl CsvRecord for Treatment {
    const HEADERS: &'static [&'static str] = &["taxon_name", "treatment"];
}

/// Compiled patterns for one monograph layout
pub struct TreatmentParser {
    layout: MonographLayout,
    sections: Vec<(Section, Regex)>,
    species_start: Regex,
    infraspecies_start: Regex,
    acknowledgements: Regex,
    subsections: Vec<(Subsection, Regex)>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| MonographError::Parse(e.to_string()))
}

impl TreatmentParser {
    pub fn new(layout: MonographLayout) -> Result<Self> {
        let sections = SECTION_HEADINGS
            .iter()
            .map(|(section, heading)| {
                RegexBuilder::new(&format!(r"^{}\s*$", regex::escape(heading)))
                    .case_insensitive(true)
                    .build()
                    .map(|re| (*section, re))
                    .map_err(|e| MonographError::Parse(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let genus = regex::escape(&layout.genus);
        let species_start = compile(&format!(
            r"^(?P<number>[0-9]+)\s*\.\s+(?P<name>{genus}\s+[a-z]+)\s+.*$"
        ))?;
        let infraspecies_start = compile(&format!(
            r"^(?P<number>[0-9]+[a-z])\s*\.\s+(?P<name>{genus}\s+[a-z]+\s+subsp\.\s+[a-z]+).*$"
        ))?;

        let subsections = [
            (Subsection::NomenclaturalDetails, format!(r"^[0-9]+[a-z]?\s*\.\s+{genus}")),
            (Subsection::Description, r"^\s*(Stems|Pinnae)".to_string()),
            (Subsection::Distribution, r"^\s*Distribution".to_string()),
            (Subsection::TaxonomicNotes, r"^\s*Taxonomic notes".to_string()),
            (Subsection::SubspecificVariation, r"^\s*Subspecific variation".to_string()),
            (Subsection::KeyToSubspecies, r"^\s*Key to the subspecies of".to_string()),
        ]
        .into_iter()
        .map(|(sub, pattern)| compile(&pattern).map(|re| (sub, re)))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layout,
            sections,
            species_start,
            infraspecies_start,
            acknowledgements: compile(r"^Acknowledgements\s*$")?,
            subsections,
        })
    }

    /// Strip running headers from a line
    pub fn clean_line(&self, line: &str, page: u32) -> String {
        let author_header = format!("{} {}", self.layout.author_header, page);
        if line.starts_with(&author_header) && line.contains(&self.layout.copyright) {
            return line
                .split(self.layout.copyright.as_str())
                .nth(1)
                .unwrap_or_default()
                .to_string();
        }
        if line.starts_with(&self.layout.running_title) {
            let marker = format!("•   {}", page);
            return match line.split(marker.as_str()).nth(1) {
                Some(rest) => rest.to_string(),
                None => {
                    warn!(page, line, "Running title without page marker");
                    line.to_string()
                }
            };
        }
        line.to_string()
    }

    /// Treatment number and name from a treatment start line
    pub fn treatment_start(&self, line: &str) -> Option<TaxonId> {
        self.infraspecies_start
            .captures(line)
            .or_else(|| self.species_start.captures(line))
            .map(|caps| TaxonId {
                number: caps["number"].to_string(),
                name: caps["name"].to_string(),
            })
    }

    /// Split pages into lines and label every line
    pub fn label_pages(&self, pages: &[(u32, String)]) -> Vec<MonographLine> {
        let mut lines: Vec<MonographLine> = pages
            .iter()
            .flat_map(|(page, text)| {
                text.split('\n').map(move |line| MonographLine {
                    page: *page,
                    text: line.to_string(),
                    cleaned: String::new(),
                    section: None,
                    taxon: None,
                    subsection: None,
                })
            })
            .collect();

        for line in &mut lines {
            line.cleaned = self.clean_line(&line.text, line.page);
        }

        self.label_sections(&mut lines);
        self.label_treatments(&mut lines);
        self.label_subsections(&mut lines);
        lines
    }

    fn label_sections(&self, lines: &mut [MonographLine]) {
        let mut current = None;
        for line in lines {
            if let Some((section, _)) = self.sections.iter().find(|(_, re)| re.is_match(&line.cleaned)) {
                current = Some(*section);
            }
            line.section = current;
        }
    }

    fn label_treatments(&self, lines: &mut [MonographLine]) {
        let mut current: Option<TaxonId> = None;
        for line in lines {
            if self.acknowledgements.is_match(&line.cleaned) {
                current = None;
            } else if let Some(id) = self.treatment_start(&line.cleaned) {
                debug!(number = %id.number, name = %id.name, "Treatment start");
                current = Some(id);
            }
            line.taxon = current.clone();
        }
    }

    fn label_subsections(&self, lines: &mut [MonographLine]) {
        let mut current = None;
        for line in lines {
            if line.section == Some(Section::TaxonomicTreatment) {
                if let Some((sub, _)) = self
                    .subsections
                    .iter()
                    .rev()
                    .find(|(_, re)| re.is_match(&line.cleaned))
                {
                    current = Some(*sub);
                }
            }
            line.subsection = current;
        }
    }

    /// Join description lines per taxon, sorted by taxon name.
    ///
    /// An empty `species` list keeps every taxon.
    pub fn treatments(&self, lines: &[MonographLine], species: &[String]) -> Vec<Treatment> {
        let allow: HashSet<&str> = species.iter().map(String::as_str).collect();
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for line in lines {
            let Some(taxon) = &line.taxon else { continue };
            if line.subsection != Some(Subsection::Description)
                || line.cleaned.ends_with(&self.layout.publisher_mark)
            {
                continue;
            }
            if !allow.is_empty() && !allow.contains(taxon.name.as_str()) {
                continue;
            }
            grouped.entry(taxon.name.as_str()).or_default().push(&line.cleaned);
        }

        grouped
            .into_iter()
            .map(|(name, parts)| Treatment {
                taxon_name: name.to_string(),
                treatment: parts.join(" "),
            })
            .collect()
    }
}

/// Read the text of every page, keyed by 1-based page number
pub fn read_pdf_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let doc = lopdf::Document::load(path)?;
    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        let text = doc.extract_text(&[*page_number])?;
        pages.push((*page_number, text));
    }
    info!(path = %path.display(), pages = pages.len(), "Read PDF");
    Ok(pages)
}

/// Extract description paragraphs from a monograph PDF
pub fn extract_treatments(
    path: &Path,
    layout: MonographLayout,
    species: &[String],
) -> Result<Vec<Treatment>> {
    let parser = TreatmentParser::new(layout)?;
    let pages = read_pdf_pages(path)?;
    let lines = parser.label_pages(&pages);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for line in &lines {
        if let Some(taxon) = &line.taxon {
            *counts.entry(format!("{} {}", taxon.number, taxon.name)).or_default() += 1;
        }
    }
    for (taxon, count) in &counts {
        debug!(taxon = %taxon, lines = count, "Lines per treatment");
    }
    info!(treatments = counts.len(), "Labelled monograph lines");

    Ok(parser.treatments(&lines, species))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TreatmentParser {
        TreatmentParser::new(MonographLayout::default()).unwrap()
    }

    #[test]
    fn test_clean_line_headers() {
        let p = parser();
        assert_eq!(
            p.clean_line("HENDERSON 12 © 2020 Magnolia PressStems clustered", 12),
            "Stems clustered"
        );
        assert_eq!(
            p.clean_line("A REVISION OF CALAMUS Phytotaxa 445 (1) © 2020 Magnolia Press •   13pinnae 5", 13),
            "pinnae 5"
        );
        assert_eq!(p.clean_line("A REVISION OF CALAMUS no marker", 13), "A REVISION OF CALAMUS no marker");
        assert_eq!(p.clean_line("Stems solitary", 3), "Stems solitary");
    }

    #[test]
    fn test_treatment_start() {
        let p = parser();
        let id = p.treatment_start("12. Calamus concolor Blume, Rumphia 3: 1847.").unwrap();
        assert_eq!(id.number, "12");
        assert_eq!(id.name, "Calamus concolor");

        let id = p
            .treatment_start("12a. Calamus concolor subsp. minor Henderson, subsp. nov.")
            .unwrap();
        assert_eq!(id.number, "12a");
        assert_eq!(id.name, "Calamus concolor subsp. minor");

        assert!(p.treatment_start("Calamus concolor is common").is_none());
    }

    fn sample_pages() -> Vec<(u32, String)> {
        vec![
            (1, "Introduction\nSome history of Calamus.".to_string()),
            (
                2,
                [
                    "Taxonomic Treatment",
                    "1. Calamus concolor Blume, Rumphia 3: 1847.",
                    "Type: Indonesia.",
                    "Stems clustered, climbing, 3.0 m long.",
                    "pinnae 5(5–6) per side of rachis.",
                    "Distribution:—Borneo.",
                    "2. Calamus disjunctus Henderson, sp. nov.",
                    "Stems solitary.",
                    "Printed by Magnolia Press",
                    "Taxonomic notes:—Distinct.",
                    "Acknowledgements",
                    "Stems of thanks to the herbaria.",
                ]
                .join("\n"),
            ),
        ]
    }

    #[test]
    fn test_labels_sections_and_subsections() {
        let p = parser();
        let lines = p.label_pages(&sample_pages());
        assert_eq!(lines[0].section, Some(Section::Introduction));
        assert_eq!(lines[2].section, Some(Section::TaxonomicTreatment));
        assert_eq!(lines[3].subsection, Some(Subsection::NomenclaturalDetails));
        assert_eq!(lines[5].subsection, Some(Subsection::Description));
        assert_eq!(lines[6].subsection, Some(Subsection::Description));
        assert_eq!(lines[7].subsection, Some(Subsection::Distribution));
        let last = lines.last().unwrap();
        assert_eq!(last.section, Some(Section::Acknowledgements));
        assert!(last.taxon.is_none());
    }

    #[test]
    fn test_treatments_join_description_lines() {
        let p = parser();
        let lines = p.label_pages(&sample_pages());
        let treatments = p.treatments(&lines, &[]);
        assert_eq!(
            treatments,
            vec![
                Treatment {
                    taxon_name: "Calamus concolor".to_string(),
                    treatment: "Stems clustered, climbing, 3.0 m long. pinnae 5(5–6) per side of rachis."
                        .to_string(),
                },
                Treatment {
                    taxon_name: "Calamus disjunctus".to_string(),
                    treatment: "Stems solitary.".to_string(),
                },
            ]
        );

        let only = p.treatments(&lines, &["Calamus disjunctus".to_string()]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].taxon_name, "Calamus disjunctus");
    }
}
