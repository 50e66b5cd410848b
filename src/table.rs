//! Header-addressed string tables.
//!
//! Wide, schema-less CSV files (trait matrices, extraction output) are handled
//! as a `Table`: a header row plus rows of string cells. Empty string stands
//! for a missing value. Fixed-schema files use serde records instead.

use crate::error::{MonographError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use tracing::debug;

/// In-memory table of string cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// One long-format cell produced by [`Table::melt`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TidyValue {
    pub taxon_name: String,
    pub code: String,
    pub value: String,
}

impl Table {
    /// Create an empty table with the given headers
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Read a CSV file with a header row
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        debug!(path = %path.display(), rows = table.len(), "Read table");
        Ok(table)
    }

    /// Read CSV data with a header row from any reader
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut table = Self::new(headers);
        for record in rdr.records() {
            let record = record?;
            table.push_row(record.iter().map(str::to_string).collect())?;
        }
        Ok(table)
    }

    /// Write the table as CSV
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)?;
        println!("Saved: {:?}", path);
        Ok(())
    }

    /// Write the table as CSV to any writer
    pub fn to_writer<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Index of a column, or a validation error naming it
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| MonographError::Validation(format!("Missing column: {}", name)))
    }

    /// All values of a column in row order
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Cell at `row` in column `name`
    pub fn value(&self, row: usize, name: &str) -> Result<&str> {
        let idx = self.column_index(name)?;
        self.rows
            .get(row)
            .map(|r| r[idx].as_str())
            .ok_or_else(|| MonographError::Validation(format!("Row {} out of range", row)))
    }

    /// Append a row; short rows are padded, long rows rejected
    pub fn push_row(&mut self, mut row: Vec<String>) -> Result<()> {
        if row.len() > self.headers.len() {
            return Err(MonographError::Validation(format!(
                "Row has {} cells but table has {} columns",
                row.len(),
                self.headers.len()
            )));
        }
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    /// Remove the named columns; names not present are ignored
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self.headers.iter().map(|h| !names.contains(&h.as_str())).collect();
        let filter = |cells: &mut Vec<String>| {
            let mut flags = keep.iter();
            cells.retain(|_| *flags.next().unwrap_or(&true));
        };
        filter(&mut self.headers);
        for row in &mut self.rows {
            filter(row);
        }
    }

    /// Rename a column if present
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(h) = self.headers.iter_mut().find(|h| h.as_str() == from) {
            *h = to.to_string();
        }
    }

    pub fn lowercase_headers(&mut self) {
        for h in &mut self.headers {
            *h = h.to_lowercase();
        }
    }

    /// Apply `f` to every cell of a column
    pub fn map_column(&mut self, name: &str, f: impl Fn(&str) -> String) -> Result<()> {
        let idx = self.column_index(name)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    /// Inclusive run of headers from `first` to `last`
    pub fn columns_between(&self, first: &str, last: &str) -> Result<Vec<String>> {
        let start = self.column_index(first)?;
        let end = self.column_index(last)?;
        if end < start {
            return Err(MonographError::Validation(format!(
                "Column {} comes before {}",
                last, first
            )));
        }
        Ok(self.headers[start..=end].to_vec())
    }

    /// Distinct values of a column in first-seen order
    pub fn unique(&self, name: &str) -> Result<Vec<String>> {
        Ok(unique_in_order(self.column(name)?)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Wide to long: one `(id, code, value)` per row and value column
    pub fn melt(&self, id_column: &str, value_columns: &[String]) -> Result<Vec<TidyValue>> {
        let id_idx = self.column_index(id_column)?;
        let indices = value_columns
            .iter()
            .map(|c| self.column_index(c).map(|i| (c, i)))
            .collect::<Result<Vec<_>>>()?;

        // Column-major, matching the row order of a melted data frame
        let mut tidy = Vec::with_capacity(self.rows.len() * indices.len());
        for (code, idx) in indices {
            for row in &self.rows {
                tidy.push(TidyValue {
                    taxon_name: row[id_idx].clone(),
                    code: code.clone(),
                    value: row[idx].clone(),
                });
            }
        }
        Ok(tidy)
    }
}

/// Fixed-schema row written with [`write_records`]
pub trait CsvRecord: Serialize {
    /// Column names, in field order
    const HEADERS: &'static [&'static str];
}

/// Write serde records as CSV with a header row.
///
/// The header is written even when there are no rows, so later stages can
/// always open the file.
pub fn write_records<T: CsvRecord>(rows: &[T], path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    if rows.is_empty() {
        wtr.write_record(T::HEADERS)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    println!("Saved: {:?}", path);
    Ok(())
}

/// Read serde records from a CSV file with a header row
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let rows = rdr
        .deserialize::<T>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    debug!(path = %path.display(), rows = rows.len(), "Read records");
    Ok(rows)
}

/// Distinct values in first-seen order
pub fn unique_in_order<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(*v)).collect()
}
