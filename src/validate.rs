//! The validation engine.
//!
//! A table passes through a fixed sequence of steps. Each step may rewrite
//! the table in place and reports what it did as [`Issue`]s:
//!
//! 1. load-time shape problems (short rows, long rows);
//! 2. removal of rows without a `sample_name`;
//! 3. missing required and expected columns;
//! 4. field normalization;
//! 5. empty required cells;
//! 6. conditional requirements (paired reads, host-associated samples);
//! 7. duplicate samples and files.
//!
//! [`cross_check`] then compares sample names between the two tables.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{LibraryLayout, SampleSource, TableKind};
use crate::normalize::{self, Normalized};
use crate::report::Issue;
use crate::schema::{self, ColumnRule, Schema};
use crate::table::{ShapeProblem, Table};

/// File names present in the sequence directory, used to confirm inferred mates.
pub type FileListing = BTreeSet<String>;

pub struct Validator {
    schema: Schema,
}

impl Validator {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn validate_sample(
        &self,
        table: &mut Table,
        shape: &[ShapeProblem],
        listing: Option<&FileListing>,
    ) -> Vec<Issue> {
        self.validate(TableKind::Sample, table, shape, listing)
    }

    pub fn validate_bioproject(&self, table: &mut Table, shape: &[ShapeProblem]) -> Vec<Issue> {
        self.validate(TableKind::Bioproject, table, shape, None)
    }

    fn validate(
        &self,
        kind: TableKind,
        table: &mut Table,
        shape: &[ShapeProblem],
        listing: Option<&FileListing>,
    ) -> Vec<Issue> {
        let mut issues = shape_issues(kind, shape);

        if !table.has_column("sample_name") {
            tracing::warn!(table = %kind, "sample_name column missing");
            issues.push(Issue::error(
                Some(kind),
                "table has no sample_name column; no further checks possible",
            ));
            return issues;
        }

        issues.extend(drop_unnamed_rows(kind, table));
        issues.extend(self.add_missing_columns(kind, table));
        issues.extend(self.normalize_fields(kind, table));
        issues.extend(self.fill_required(kind, table));
        issues.extend(match kind {
            TableKind::Sample => check_layout(table, listing),
            TableKind::Bioproject => check_host(table),
        });
        issues.extend(duplicate_samples(kind, table));
        if kind == TableKind::Sample {
            issues.extend(duplicate_files(table));
        }

        tracing::info!(
            table = %kind,
            rows = table.len(),
            issues = issues.len(),
            "validated table"
        );
        issues
    }

    fn add_missing_columns(&self, kind: TableKind, table: &mut Table) -> Vec<Issue> {
        let mut issues = Vec::new();
        for column in self.schema.required(kind) {
            if table.has_column(column) {
                continue;
            }
            match self.schema.default_for(column) {
                Some(default) => {
                    table.ensure_column(column, default);
                    issues.push(
                        Issue::warning(
                            Some(kind),
                            format!("added missing column, filled with default '{default}'"),
                        )
                        .with_column(*column),
                    );
                }
                None => {
                    table.ensure_column(column, "");
                    issues.push(
                        Issue::warning(Some(kind), "added missing required column")
                            .with_column(*column),
                    );
                }
            }
        }
        for column in self.schema.expected(kind) {
            if !table.has_column(column) {
                table.ensure_column(column, "");
                issues.push(
                    Issue::info(Some(kind), "added empty expected column").with_column(*column),
                );
            }
        }
        issues
    }

    fn normalize_fields(&self, kind: TableKind, table: &mut Table) -> Vec<Issue> {
        let mut issues = Vec::new();
        let columns = table.columns.clone();
        for column in &columns {
            let Some(rule) = schema::column_rule(column) else {
                continue;
            };
            let vocabulary = self.schema.vocabulary(column).unwrap_or_default();
            for row in 0..table.len() {
                let raw = table.get(row, column).to_string();
                if raw.trim().is_empty() {
                    continue;
                }
                let normalized = match rule {
                    ColumnRule::Date => normalize::collection_date(&raw),
                    ColumnRule::LatLon => normalize::lat_lon(&raw),
                    ColumnRule::GeoLocName => normalize::geo_loc_name(&raw),
                    ColumnRule::LibraryLayout => normalize::library_layout(&raw),
                    ColumnRule::SampleSource => normalize::sample_source(&raw),
                    ColumnRule::Vocabulary => normalize::vocabulary(&raw, vocabulary.as_slice()),
                };
                let sample = table.get(row, "sample_name").to_string();
                match normalized {
                    Normalized::Unchanged { .. } => {}
                    Normalized::Rewritten { value, note } => {
                        let message = match note {
                            Some(note) => format!("'{raw}' -> '{value}' ({note})"),
                            None => format!("'{raw}' -> '{value}'"),
                        };
                        table.set(row, column, value);
                        issues.push(
                            Issue::fix(Some(kind), message)
                                .with_sample(sample)
                                .with_column(column.as_str()),
                        );
                    }
                    Normalized::Invalid { reason } => {
                        tracing::debug!(sample = %sample, column = %column, %reason, "invalid value");
                        issues.push(
                            Issue::error(Some(kind), format!("invalid value '{raw}': {reason}"))
                                .with_sample(sample)
                                .with_column(column.as_str()),
                        );
                    }
                }
            }
        }
        issues
    }

    fn fill_required(&self, kind: TableKind, table: &mut Table) -> Vec<Issue> {
        let mut issues = Vec::new();
        for column in self.schema.required(kind) {
            let empty_rows = (0..table.len())
                .filter(|row| table.get(*row, column).is_empty())
                .collect::<Vec<_>>();
            if empty_rows.is_empty() {
                continue;
            }
            if *column == "library_ID" {
                for row in &empty_rows {
                    let sample = table.get(*row, "sample_name").to_string();
                    table.set(*row, column, sample);
                }
                issues.push(
                    Issue::fix(
                        Some(kind),
                        format!("filled {} empty cell(s) from sample_name", empty_rows.len()),
                    )
                    .with_column(*column),
                );
            } else if let Some(default) = self.schema.default_for(column) {
                for row in &empty_rows {
                    table.set(*row, column, default);
                }
                issues.push(
                    Issue::fix(
                        Some(kind),
                        format!(
                            "filled {} empty cell(s) with default '{default}'",
                            empty_rows.len()
                        ),
                    )
                    .with_column(*column),
                );
            } else {
                for row in &empty_rows {
                    issues.push(
                        Issue::error(Some(kind), "required value is empty")
                            .with_sample(table.get(*row, "sample_name"))
                            .with_column(*column),
                    );
                }
            }
        }
        issues
    }
}

fn shape_issues(kind: TableKind, shape: &[ShapeProblem]) -> Vec<Issue> {
    shape
        .iter()
        .map(|problem| match problem {
            ShapeProblem::Short { line, cells } => Issue::warning(
                Some(kind),
                format!("line {line} has only {cells} cell(s); padded with empty values"),
            ),
            ShapeProblem::Long { line, cells } => Issue::error(
                Some(kind),
                format!("line {line} has {cells} cells, more than the header; extra cells dropped"),
            ),
            ShapeProblem::UnterminatedQuote { line } => Issue::error(
                Some(kind),
                format!("line {line} opens a quoted cell that is never closed; the quote was kept as text"),
            ),
        })
        .collect()
}

fn drop_unnamed_rows(kind: TableKind, table: &mut Table) -> Vec<Issue> {
    let before = table.len();
    let Some(idx) = table.column_index("sample_name") else {
        return Vec::new();
    };
    table.retain_rows(|_, row| !row[idx].trim().is_empty());
    let removed = before - table.len();
    if removed == 0 {
        return Vec::new();
    }
    vec![Issue::fix(
        Some(kind),
        format!("removed {removed} row(s) with an empty sample_name"),
    )]
}

/// Mate file name for an R1 file (`_R1_`, `_R1.`, `_1.`), directory kept.
pub fn infer_mate(filename: &str) -> Option<String> {
    let split = filename.rfind(['/', '\\']).map(|idx| idx + 1).unwrap_or(0);
    let (dir, name) = filename.split_at(split);
    for (first, second) in [("_R1_", "_R2_"), ("_R1.", "_R2."), ("_1.", "_2.")] {
        if let Some(pos) = name.rfind(first) {
            return Some(format!(
                "{dir}{}{second}{}",
                &name[..pos],
                &name[pos + first.len()..]
            ));
        }
    }
    None
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn check_layout(table: &mut Table, listing: Option<&FileListing>) -> Vec<Issue> {
    let kind = Some(TableKind::Sample);
    let mut issues = Vec::new();
    for row in 0..table.len() {
        let sample = table.get(row, "sample_name").to_string();
        let layout = table.get(row, "library_layout").parse::<LibraryLayout>();
        let filename2 = table.get(row, "filename2").to_string();
        match layout {
            Ok(LibraryLayout::Paired) if filename2.is_empty() => {
                let mate = infer_mate(table.get(row, "filename")).filter(|mate| {
                    listing.is_none_or(|files| files.contains(base_name(mate)))
                });
                match mate {
                    Some(mate) => {
                        issues.push(
                            Issue::fix(kind, format!("inferred R2 file '{mate}'"))
                                .with_sample(sample.as_str())
                                .with_column("filename2"),
                        );
                        table.set(row, "filename2", mate);
                    }
                    None => issues.push(
                        Issue::error(kind, "paired layout requires a second read file")
                            .with_sample(sample.as_str())
                            .with_column("filename2"),
                    ),
                }
            }
            Ok(LibraryLayout::Single) if !filename2.is_empty() => issues.push(
                Issue::warning(kind, format!("single layout but filename2 is set ('{filename2}')"))
                    .with_sample(sample.as_str())
                    .with_column("filename2"),
            ),
            _ => {}
        }
    }
    issues
}

fn check_host(table: &Table) -> Vec<Issue> {
    (0..table.len())
        .filter(|row| {
            table.get(*row, "sample_source").parse::<SampleSource>()
                == Ok(SampleSource::HostAssociated)
                && table.get(*row, "host").is_empty()
        })
        .map(|row| {
            Issue::error(
                Some(TableKind::Bioproject),
                "host-associated sample requires a host",
            )
            .with_sample(table.get(row, "sample_name"))
            .with_column("host")
        })
        .collect()
}

fn duplicate_samples(kind: TableKind, table: &Table) -> Vec<Issue> {
    let mut counts = BTreeMap::<&str, usize>::new();
    for name in table.column_values("sample_name") {
        *counts.entry(name).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, count)| {
            Issue::error(Some(kind), format!("sample_name appears {count} times"))
                .with_sample(name)
                .with_column("sample_name")
        })
        .collect()
}

fn duplicate_files(table: &Table) -> Vec<Issue> {
    let mut owners = BTreeMap::<&str, Vec<&str>>::new();
    for column in schema::FILE_COLUMNS {
        let Some(idx) = table.column_index(column) else {
            continue;
        };
        let name_idx = table.column_index("sample_name");
        for row in &table.rows {
            let value = row[idx].as_str();
            if value.is_empty() {
                continue;
            }
            let sample = name_idx.map(|idx| row[idx].as_str()).unwrap_or("");
            owners.entry(value).or_default().push(sample);
        }
    }
    owners
        .into_iter()
        .filter(|(_, samples)| samples.len() > 1)
        .map(|(file, samples)| {
            Issue::error(
                Some(TableKind::Sample),
                format!(
                    "file '{file}' is referenced {} times (samples: {})",
                    samples.len(),
                    samples.join(", ")
                ),
            )
        })
        .collect()
}

/// Sample names present in one table but not the other, both directions, sorted.
pub fn cross_check(sample: &Table, bioproject: &Table) -> Vec<Issue> {
    let names = |table: &Table| -> BTreeSet<String> {
        table
            .column_values("sample_name")
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    };
    let in_sample = names(sample);
    let in_bioproject = names(bioproject);

    let mut issues = Vec::new();
    for name in in_sample.difference(&in_bioproject) {
        issues.push(
            Issue::error(None, "in the sample table but not in the bioproject table")
                .with_sample(name.as_str()),
        );
    }
    for name in in_bioproject.difference(&in_sample) {
        issues.push(
            Issue::error(None, "in the bioproject table but not in the sample table")
                .with_sample(name.as_str()),
        );
    }
    if issues.is_empty() {
        issues.push(Issue::info(
            None,
            format!("{} sample(s) match between tables", in_sample.len()),
        ));
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.rows.push(row.iter().map(|c| c.to_string()).collect());
        }
        table
    }

    #[test]
    fn mate_inference_patterns() {
        assert_eq!(
            infer_mate("reads/S1_R1_001.fastq.gz").as_deref(),
            Some("reads/S1_R2_001.fastq.gz")
        );
        assert_eq!(infer_mate("S1_R1.fq").as_deref(), Some("S1_R2.fq"));
        assert_eq!(infer_mate("S1_1.fastq").as_deref(), Some("S1_2.fastq"));
        assert_eq!(infer_mate("S1.fastq"), None);
    }

    #[test]
    fn paired_mate_requires_listing_match() {
        let mut t = table(
            &["sample_name", "library_layout", "filename"],
            &[&["s1", "paired", "s1_R1.fastq.gz"]],
        );
        let listing = FileListing::from(["s1_R1.fastq.gz".to_string()]);
        let issues = check_layout(&mut t, Some(&listing));
        assert_eq!(issues[0].severity, Severity::Error);

        let listing = FileListing::from(["s1_R2.fastq.gz".to_string()]);
        let issues = check_layout(&mut t, Some(&listing));
        assert_eq!(issues[0].severity, Severity::Fix);
        assert_eq!(t.get(0, "filename2"), "s1_R2.fastq.gz");
    }

    #[test]
    fn duplicate_file_references_are_reported_once() {
        let t = table(
            &["sample_name", "filename", "filename2"],
            &[&["s1", "a.fq", "b.fq"], &["s2", "a.fq", "c.fq"]],
        );
        let issues = duplicate_files(&t);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("'a.fq'"));
        assert!(issues[0].message.contains("s1, s2"));
    }
}
