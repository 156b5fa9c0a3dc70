use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::TableFormat;
use crate::error::PrepError;
use crate::fs_util;
use crate::xlsx;

/// A metadata sheet: one header row plus string cells.
///
/// Every row holds exactly `columns.len()` cells; loaders pad or truncate and
/// record the difference as a [`ShapeProblem`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeProblem {
    /// Row had fewer cells than the header and was padded.
    Short { line: usize, cells: usize },
    /// Row had more cells than the header; the extra cells were dropped.
    Long { line: usize, cells: usize },
    /// A quoted cell opened on this record never closed; the quote was read as text.
    UnterminatedQuote { line: usize },
}

impl ShapeProblem {
    pub fn line(&self) -> usize {
        match self {
            ShapeProblem::Short { line, .. }
            | ShapeProblem::Long { line, .. }
            | ShapeProblem::UnterminatedQuote { line } => *line,
        }
    }
}

/// Records split from delimited text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelimitedText {
    pub records: Vec<Vec<String>>,
    /// 1-based record numbers holding an opening quote that never closed.
    pub unterminated: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    pub format: TableFormat,
    pub path: PathBuf,
    pub shape: Vec<ShapeProblem>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn read(path: &Path) -> Result<LoadedTable, PrepError> {
        let format = TableFormat::from_path(path)?;
        let parsed = match format {
            TableFormat::Tsv | TableFormat::Csv => {
                let bytes = fs::read(path).map_err(|err| PrepError::TableRead {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })?;
                let text = decode_utf8(path, bytes)?;
                let delimiter = if format == TableFormat::Csv { ',' } else { '\t' };
                split_records(&text, delimiter)
            }
            TableFormat::Xlsx => DelimitedText {
                records: xlsx::read_first_sheet(path)?,
                unterminated: Vec::new(),
            },
        };
        let (table, mut shape) = Self::from_records(parsed.records)
            .ok_or_else(|| PrepError::EmptyTable(path.to_path_buf()))?;
        if !parsed.unterminated.is_empty() {
            tracing::warn!(
                path = %path.display(),
                lines = ?parsed.unterminated,
                "unterminated quote; read as literal text"
            );
            shape.extend(
                parsed
                    .unterminated
                    .into_iter()
                    .map(|line| ShapeProblem::UnterminatedQuote { line }),
            );
            shape.sort_by_key(ShapeProblem::line);
        }
        tracing::debug!(
            path = %path.display(),
            rows = table.rows.len(),
            columns = table.columns.len(),
            "loaded table"
        );
        Ok(LoadedTable {
            table,
            format,
            path: path.to_path_buf(),
            shape,
        })
    }

    /// Builds a table from raw records; the first non-blank record is the header.
    /// Line numbers in shape problems are 1-based record positions.
    pub fn from_records(records: Vec<Vec<String>>) -> Option<(Table, Vec<ShapeProblem>)> {
        let mut iter = records
            .into_iter()
            .enumerate()
            .filter(|(_, record)| record.iter().any(|cell| !cell.trim().is_empty()));
        let (_, header) = iter.next()?;
        let columns = header
            .into_iter()
            .enumerate()
            .map(|(idx, cell)| {
                let name = cell.trim().trim_start_matches('\u{feff}').to_string();
                if name.is_empty() {
                    format!("column_{}", idx + 1)
                } else {
                    name
                }
            })
            .collect::<Vec<_>>();

        let width = columns.len();
        let mut shape = Vec::new();
        let mut rows = Vec::new();
        for (idx, record) in iter {
            let cells = record.len();
            let mut row = record
                .into_iter()
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>();
            if cells < width {
                shape.push(ShapeProblem::Short {
                    line: idx + 1,
                    cells,
                });
                row.resize(width, String::new());
            } else if cells > width {
                // Trailing empty cells are a common spreadsheet export artifact.
                if row[width..].iter().any(|cell| !cell.is_empty()) {
                    shape.push(ShapeProblem::Long {
                        line: idx + 1,
                        cells,
                    });
                }
                row.truncate(width);
            }
            rows.push(row);
        }
        Some((Table { columns, rows }, shape))
    }

    pub fn write(&self, path: &Path, format: TableFormat) -> Result<(), PrepError> {
        let content = match format {
            TableFormat::Tsv => self.to_delimited('\t').into_bytes(),
            TableFormat::Csv => self.to_delimited(',').into_bytes(),
            TableFormat::Xlsx => xlsx::write_sheet(self)?,
        };
        fs_util::write_bytes_atomic(path, &content)
    }

    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut out = String::new();
        push_record(&mut out, &self.columns, delimiter);
        for row in &self.rows {
            push_record(&mut out, row, delimiter);
        }
        out
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Returns the trimmed cell value, or `""` when the column is absent.
    pub fn get(&self, row: usize, column: &str) -> &str {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|cells| cells.get(idx)))
            .map(|value| value.as_str())
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) {
        let idx = self.ensure_column(column, "");
        if let Some(cells) = self.rows.get_mut(row) {
            cells[idx] = value.into();
        }
    }

    /// Adds the column if missing and returns its index. Existing rows get `fill`.
    pub fn ensure_column(&mut self, name: &str, fill: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.to_string());
        }
        self.columns.len() - 1
    }

    pub fn column_values(&self, name: &str) -> Vec<&str> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|row| row[idx].as_str()).collect(),
            None => Vec::new(),
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String], &[String]) -> bool,
    {
        let columns = &self.columns;
        self.rows.retain(|row| keep(columns, row));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rejects input that is not UTF-8, naming the first offending line.
fn decode_utf8(path: &Path, bytes: Vec<u8>) -> Result<String, PrepError> {
    String::from_utf8(bytes).map_err(|err| {
        let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|byte| **byte == b'\n').count() + 1;
        PrepError::TableRead {
            path: path.to_path_buf(),
            message: format!(
                "line {line} is not valid UTF-8; re-save the file as UTF-8 (e.g. \"CSV UTF-8\" in Excel)"
            ),
        }
    })
}

/// Splits delimited text into records, honouring RFC 4180 double quotes.
///
/// A quote that is still open at the end of the input is re-read as a
/// literal character, so the rows after it are kept; its record number is
/// returned in [`DelimitedText::unterminated`].
pub fn split_records(text: &str, delimiter: char) -> DelimitedText {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut literal_quotes = BTreeSet::new();
    let mut unterminated = Vec::new();
    loop {
        match parse_delimited(text, delimiter, &literal_quotes) {
            Ok(records) => {
                unterminated.sort_unstable();
                return DelimitedText {
                    records,
                    unterminated,
                };
            }
            Err(open) => {
                literal_quotes.insert(open.offset);
                unterminated.push(open.record);
            }
        }
    }
}

struct OpenQuote {
    offset: usize,
    record: usize,
}

fn parse_delimited(
    text: &str,
    delimiter: char,
    literal_quotes: &BTreeSet<usize>,
) -> Result<Vec<Vec<String>>, OpenQuote> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut open: Option<OpenQuote> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if open.is_some() {
            match ch {
                '"' if chars.peek().map(|(_, next)| *next) == Some('"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => open = None,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.trim().is_empty() && !literal_quotes.contains(&offset) => {
                field.clear();
                open = Some(OpenQuote {
                    offset,
                    record: records.len() + 1,
                });
            }
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ if ch == delimiter => record.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    if let Some(open) = open {
        return Err(open);
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn push_record(out: &mut String, cells: &[String], delimiter: char) {
    for (idx, cell) in cells.iter().enumerate() {
        if idx > 0 {
            out.push(delimiter);
        }
        let needs_quotes = cell.contains(delimiter)
            || cell.contains('"')
            || cell.contains('\n')
            || cell.contains('\r');
        if needs_quotes {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn csv_quotes_and_escapes() {
        let parsed = split_records("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n", ',');
        assert!(parsed.unterminated.is_empty());
        assert_eq!(parsed.records, records(&[&["a", "b"], &["x, y", "say \"hi\""]]));
    }

    #[test]
    fn tsv_keeps_commas_and_handles_crlf() {
        let parsed = split_records("sample_name\tgeo_loc_name\r\ns1\tUSA: Ohio, Cincinnati\r\n", '\t');
        assert_eq!(
            parsed.records,
            records(&[&["sample_name", "geo_loc_name"], &["s1", "USA: Ohio, Cincinnati"]])
        );
    }

    #[test]
    fn unclosed_quote_is_read_as_text() {
        let parsed = split_records("sample_name\ttitle\ns1\t\"gut sample\ns2\tstool\n", '\t');
        assert_eq!(parsed.unterminated, vec![2]);
        assert_eq!(
            parsed.records,
            records(&[&["sample_name", "title"], &["s1", "\"gut sample"], &["s2", "stool"]])
        );
    }

    #[test]
    fn short_rows_are_padded_and_recorded() {
        let (table, shape) =
            Table::from_records(records(&[&["a", "b", "c"], &["1"], &[""], &["1", "2", "3"]]))
                .unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["1", "", ""]);
        assert_eq!(shape, vec![ShapeProblem::Short { line: 2, cells: 1 }]);
    }

    #[test]
    fn long_rows_with_trailing_blanks_are_not_malformed() {
        let (table, shape) =
            Table::from_records(records(&[&["a"], &["1", "", ""], &["2", "extra"]])).unwrap();
        assert_eq!(table.rows, vec![vec!["1".to_string()], vec!["2".to_string()]]);
        assert_eq!(shape, vec![ShapeProblem::Long { line: 3, cells: 2 }]);
    }

    #[test]
    fn ensure_column_fills_existing_rows() {
        let mut table = Table::new(vec!["sample_name".to_string()]);
        table.rows.push(vec!["s1".to_string()]);
        let idx = table.ensure_column("filetype", "fastq");
        assert_eq!(idx, 1);
        assert_eq!(table.get(0, "filetype"), "fastq");
        assert_eq!(table.ensure_column("filetype", "bam"), 1);
    }

    #[test]
    fn delimited_output_quotes_when_needed() {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        table.rows.push(vec!["x,y".to_string(), "plain".to_string()]);
        assert_eq!(table.to_delimited(','), "a,b\n\"x,y\",plain\n");
        assert_eq!(table.to_delimited('\t'), "a\tb\nx,y\tplain\n");
    }
}
