//! Specimen matrix formatting.
//!
//! The supplementary data has one row per herbarium specimen. This module
//! aggregates it per taxon into the formatted trait table used for
//! description generation, plus a table of qualitative codes whose
//! specimens disagree.

use crate::config::TraitLayout;
use crate::error::{MonographError, Result};
use crate::table::{CsvRecord, Table};
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Specimen metadata columns that carry no trait data
pub const METADATA_COLUMNS: &[&str] = &[
    "Subspecies",
    "Preliminary",
    "Collector",
    "Colnumber",
    "Herbarium",
    "Group",
    "Country",
    "Area",
    "Status",
    "Latitude",
    "Dlatitude",
    "Longitude",
    "Dlongitude",
    "Elevation",
];

/// Qualitative code whose specimens were scored with more than one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiValueRow {
    pub taxon_name: String,
    pub code: String,
    /// Most common value
    pub value: String,
    /// Specimens with the most common value
    pub frequency: u32,
    pub num_specimens: u32,
    pub num_specimens_scored: u32,
    /// Remaining values, sorted and comma separated
    pub other_values: String,
}

impl CsvRecord for MultiValueRow {
    const HEADERS: &'static [&'static str] = &[
        "taxon_name",
        "code",
        "value",
        "frequency",
        "num_specimens",
        "num_specimens_scored",
        "other_values",
    ];
}

/// Output of [`format_supplementary`]
#[derive(Debug, Clone)]
pub struct FormattedSupplementary {
    pub formatted: Table,
    pub multi_value: Vec<MultiValueRow>,
}

/// Read the specimen matrix from a spreadsheet (first sheet) or a CSV file
pub fn read_specimen_matrix(path: &Path) -> Result<Table> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        return Table::read_csv(path);
    }

    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MonographError::Validation(format!("{} has no worksheets", path.display())))??;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| MonographError::Validation(format!("{} is empty", path.display())))?
        .iter()
        .map(|c| cell_text(c).trim().to_string())
        .collect();

    let mut table = Table::new(headers);
    for row in rows {
        table.push_row(row.iter().map(cell_text).collect())?;
    }
    debug!(path = %path.display(), specimens = table.len(), "Read specimen matrix");
    Ok(table)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Print a number, dropping the fraction of whole values
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // Also covers -0.0 from rounding small negatives
        return "0".to_string();
    }
    format!("{}", value)
}

/// Round to `decimals` places, halves to even
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Numbers first in numeric order, then text in text order
fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn sorted_distinct<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut distinct: Vec<&str> = values.into_iter().filter(|v| !v.trim().is_empty()).collect();
    distinct.sort_by(|a, b| compare_values(a, b));
    distinct.dedup();
    distinct
}

/// `mean(min-max)`, or just `mean` when there is no range
fn summarise_measurements(values: &[f64], decimals: i32) -> String {
    if values.is_empty() {
        return String::new();
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let [mean, min, max] = [mean, min, max].map(|v| format_number(round_to(v, decimals)));
    if mean == min && min == max {
        mean
    } else {
        format!("{}({}-{})", mean, min, max)
    }
}

/// Most common value; ties go to the smallest
fn mode<'a>(values: &[&'a str]) -> Option<(&'a str, u32)> {
    let mut counts: Vec<(&'a str, u32)> = Vec::new();
    for &value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    counts
        .into_iter()
        .max_by(|(va, na), (vb, nb)| na.cmp(nb).then_with(|| compare_values(vb, va)))
}

/// Trimmed cells of one column for a group of specimen rows
fn specimen_cells<'t>(table: &Table, specimens: &[&'t Vec<String>], code: &str) -> Result<Vec<&'t str>> {
    let idx = table.column_index(code)?;
    Ok(specimens.iter().map(|r| r[idx].trim()).collect())
}

/// Drop metadata, name the taxon column and lower-case the headers
fn prepare(mut table: Table, genus: &str) -> Result<Table> {
    table.drop_columns(METADATA_COLUMNS);
    table.rename_column("Species", "taxon_name");
    table.lowercase_headers();

    let initial = genus.chars().next().map(|c| format!("{}. ", c));
    if let Some(abbreviation) = initial {
        let expanded = format!("{} ", genus);
        table.map_column("taxon_name", |name| match name.strip_prefix(abbreviation.as_str()) {
            Some(rest) => format!("{}{}", expanded, rest),
            None => name.to_string(),
        })?;
    }
    Ok(table)
}

/// Aggregate the specimen matrix per taxon.
///
/// Measurements become `mean(min-max)`, scored codes become their sorted
/// distinct values, and codes whose specimens disagree are listed in
/// `multi_value` with the dominant value and its frequency.
pub fn format_supplementary(
    raw: Table,
    layout: &TraitLayout,
    genus: &str,
) -> Result<FormattedSupplementary> {
    let table = prepare(raw, genus)?;

    let quantitative: Vec<String> = table
        .columns_between("taxon_name", &layout.quantitative_last)?
        .into_iter()
        .skip(1)
        .collect();
    let qualitative = table.columns_between(&layout.qualitative_first, &layout.qualitative_last)?;
    let fruit_colour = layout.fruit_colour.as_str();
    table.column_index(fruit_colour)?;

    // Specimen rows per taxon, taxa in sorted order
    let taxon_idx = table.column_index("taxon_name")?;
    let mut groups: BTreeMap<&str, Vec<&Vec<String>>> = BTreeMap::new();
    for row in table.rows() {
        groups.entry(row[taxon_idx].as_str()).or_default().push(row);
    }

    let mut headers = vec!["taxon_name".to_string()];
    headers.extend(quantitative.iter().cloned());
    headers.extend(qualitative.iter().cloned());
    headers.push(fruit_colour.to_string());
    let mut formatted = Table::new(headers);
    let mut multi_value = Vec::new();

    for (taxon, specimens) in &groups {
        let cells = |code: &str| specimen_cells(&table, specimens, code);

        let mut row = vec![taxon.to_string()];
        for code in &quantitative {
            let numbers: Vec<f64> = cells(code.as_str())?
                .into_iter()
                .filter_map(|v| v.parse::<f64>().ok())
                .collect();
            let decimals = if *code == layout.count_code { 0 } else { 1 };
            row.push(summarise_measurements(&numbers, decimals));
        }

        for code in &qualitative {
            let scored: Vec<&str> = cells(code.as_str())?.into_iter().filter(|v| !v.is_empty()).collect();
            row.push(sorted_distinct(scored.iter().copied()).join(", "));

            if let Some((value, frequency)) = mode(&scored) {
                let others: Vec<&str> = sorted_distinct(scored.iter().copied())
                    .into_iter()
                    .filter(|v| *v != value)
                    .collect();
                if !others.is_empty() {
                    multi_value.push(MultiValueRow {
                        taxon_name: taxon.to_string(),
                        code: code.clone(),
                        value: value.to_string(),
                        frequency,
                        num_specimens: specimens.len() as u32,
                        num_specimens_scored: scored.len() as u32,
                        other_values: others.join(", "),
                    });
                }
            }
        }

        row.push(sorted_distinct(cells(fruit_colour)?).join(", "));
        formatted.push_row(row)?;
    }

    info!(
        taxa = formatted.len(),
        quantitative = quantitative.len(),
        qualitative = qualitative.len(),
        multi_value = multi_value.len(),
        "Formatted supplementary data"
    );
    Ok(FormattedSupplementary {
        formatted,
        multi_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{read_records, write_records};

    const MATRIX: &str = "\
Species,Collector,numpin,fruitdiam,solclu,embryo,frucol,Elevation
C. alpha,Smith,12,1.04,1,0,red,100
C. alpha,Jones,14,1.36,1,1,brown,200
C. alpha,Lee,13,,0,1,red,
Calamus beta,Smith,8,2,0,,,50
";

    fn formatted() -> FormattedSupplementary {
        let raw = Table::from_reader(MATRIX.as_bytes()).unwrap();
        format_supplementary(raw, &TraitLayout::default(), "Calamus").unwrap()
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn test_summarise_measurements() {
        assert_eq!(summarise_measurements(&[], 1), "");
        assert_eq!(summarise_measurements(&[2.0, 2.0], 1), "2");
        assert_eq!(summarise_measurements(&[1.04, 1.36], 1), "1.2(1-1.4)");
        assert_eq!(summarise_measurements(&[12.0, 14.0, 13.0], 0), "13(12-14)");
    }

    #[test]
    fn test_rounding_halves_to_even() {
        assert_eq!(summarise_measurements(&[12.0, 13.0], 0), "12(12-13)");
        assert_eq!(summarise_measurements(&[1.25, 1.25], 1), "1.2");
    }

    #[test]
    fn test_sorted_distinct_puts_numbers_before_text() {
        assert_eq!(
            sorted_distinct(["1a", "10", "9", "b", "9", " "]),
            vec!["9", "10", "1a", "b"]
        );
        assert_eq!(compare_values("9", "1a"), Ordering::Less);
        assert_eq!(compare_values("1a", "10"), Ordering::Greater);
    }

    #[test]
    fn test_mode_breaks_ties_to_smallest() {
        assert_eq!(mode(&["1", "0", "1"]), Some(("1", 2)));
        assert_eq!(mode(&["2", "1"]), Some(("1", 1)));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn test_formatted_table() {
        let out = formatted();
        let table = &out.formatted;
        assert_eq!(
            table.headers(),
            &["taxon_name", "numpin", "fruitdiam", "solclu", "embryo", "frucol"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows()[0],
            vec!["Calamus alpha", "13(12-14)", "1.2(1-1.4)", "0, 1", "0, 1", "brown, red"]
        );
        assert_eq!(table.rows()[1], vec!["Calamus beta", "8", "2", "0", "", ""]);
    }

    #[test]
    fn test_multi_value_rows() {
        let out = formatted();
        assert_eq!(out.multi_value.len(), 2);
        assert_eq!(
            out.multi_value[0],
            MultiValueRow {
                taxon_name: "Calamus alpha".to_string(),
                code: "solclu".to_string(),
                value: "1".to_string(),
                frequency: 2,
                num_specimens: 3,
                num_specimens_scored: 3,
                other_values: "0".to_string(),
            }
        );
        assert_eq!(out.multi_value[1].code, "embryo");
        assert_eq!(out.multi_value[1].value, "1");
    }

    #[test]
    fn test_missing_bound_column_is_reported() {
        let raw = Table::from_reader("Species,numpin\nC. alpha,3\n".as_bytes()).unwrap();
        let err = format_supplementary(raw, &TraitLayout::default(), "Calamus").unwrap_err();
        assert!(matches!(err, MonographError::Validation(_)));
    }

    #[test]
    fn test_read_specimen_matrix_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.CSV");
        std::fs::write(&path, MATRIX.replacen("Species,Collector", " Species , Collector ", 1)).unwrap();

        let raw = read_specimen_matrix(&path).unwrap();
        assert_eq!(raw.len(), 4);
        assert_eq!(raw.headers()[0], "Species");
        assert_eq!(raw.headers()[1], "Collector");

        let out = format_supplementary(raw, &TraitLayout::default(), "Calamus").unwrap();
        assert_eq!(out.formatted.rows()[0][0], "Calamus alpha");
    }

    #[test]
    fn test_empty_multi_value_csv_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.csv");
        let rows: Vec<MultiValueRow> = Vec::new();
        write_records(&rows, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.trim_end(),
            "taxon_name,code,value,frequency,num_specimens,num_specimens_scored,other_values"
        );
        assert!(read_records::<MultiValueRow>(&path).unwrap().is_empty());
    }

    #[test]
    fn test_header_constant_matches_serialized_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.csv");
        write_records(&formatted().multi_value, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), MultiValueRow::HEADERS.join(","));
    }

    #[test]
    fn test_multi_value_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.csv");
        let rows = formatted().multi_value;
        write_records(&rows, &path).unwrap();
        assert_eq!(read_records::<MultiValueRow>(&path).unwrap(), rows);
    }
}
