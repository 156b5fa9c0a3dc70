use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::domain::TableKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Fix,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Fix => "fix",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub table: Option<TableKind>,
    pub sample: Option<String>,
    pub column: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, table: Option<TableKind>, message: impl Into<String>) -> Self {
        Self {
            severity,
            table,
            sample: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn error(table: Option<TableKind>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, table, message)
    }

    pub fn warning(table: Option<TableKind>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, table, message)
    }

    pub fn fix(table: Option<TableKind>, message: impl Into<String>) -> Self {
        Self::new(Severity::Fix, table, message)
    }

    pub fn info(table: Option<TableKind>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, table, message)
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        let sample = sample.into();
        if !sample.is_empty() {
            self.sample = Some(sample);
        }
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sample, &self.column) {
            (Some(sample), Some(column)) => write!(f, "[{sample}] {column}: {}", self.message),
            (Some(sample), None) => write!(f, "[{sample}] {}", self.message),
            (None, Some(column)) => write!(f, "{column}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub fixes: usize,
    pub infos: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// Submitter contact from the configuration, echoed in the header.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub contact: BTreeMap<String, String>,
    pub issues: Vec<Issue>,
    pub summary: Summary,
    pub written: Vec<PathBuf>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warning => self.summary.warnings += 1,
            Severity::Fix => self.summary.fixes += 1,
            Severity::Info => self.summary.infos += 1,
        }
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn record_write(&mut self, path: PathBuf) {
        self.written.push(path);
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.summary.errors,
            Severity::Warning => self.summary.warnings,
            Severity::Fix => self.summary.fixes,
            Severity::Info => self.summary.infos,
        }
    }

    /// Issues grouped by table (cross-table issues under `None`), then severity.
    pub fn grouped(&self) -> BTreeMap<Option<TableKind>, BTreeMap<Severity, Vec<&Issue>>> {
        let mut groups: BTreeMap<Option<TableKind>, BTreeMap<Severity, Vec<&Issue>>> =
            BTreeMap::new();
        for issue in &self.issues {
            groups
                .entry(issue.table)
                .or_default()
                .entry(issue.severity)
                .or_default()
                .push(issue);
        }
        groups
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("SRA metadata validation report\n");
        for (key, value) in &self.contact {
            out.push_str(&format!("  {key}: {value}\n"));
        }
        for (table, by_severity) in self.grouped() {
            let title = table.map(|kind| kind.as_str()).unwrap_or("cross-check");
            out.push_str(&format!("\n== {title} ==\n"));
            for (severity, issues) in by_severity {
                out.push_str(&format!("{} ({}):\n", severity, issues.len()));
                for issue in issues {
                    out.push_str(&format!("  - {issue}\n"));
                }
            }
        }
        if !self.written.is_empty() {
            out.push_str("\nWritten:\n");
            for path in &self.written {
                out.push_str(&format!("  {}\n", path.display()));
            }
        }
        out.push_str(&format!(
            "\nSummary: {} error(s), {} warning(s), {} fix(es), {} info\n",
            self.summary.errors, self.summary.warnings, self.summary.fixes, self.summary.infos
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_pushed_issues() {
        let mut report = Report::new();
        report.push(Issue::fix(Some(TableKind::Sample), "filled defaults"));
        report.push(
            Issue::error(Some(TableKind::Bioproject), "invalid date")
                .with_sample("s1")
                .with_column("collection_date"),
        );
        assert!(report.has_errors());
        assert_eq!(report.count(Severity::Fix), 1);
        assert_eq!(report.count(Severity::Warning), 0);
    }

    #[test]
    fn text_groups_by_table_and_lists_writes() {
        let mut report = Report::new();
        report.push(Issue::error(None, "sample s3 missing from bioproject"));
        report.push(
            Issue::warning(Some(TableKind::Sample), "short row")
                .with_sample("s1")
                .with_column("filename2"),
        );
        report.record_write(PathBuf::from("out/validated_sample.txt"));

        let text = report.render_text();
        let sample_pos = text.find("== sample ==").unwrap();
        let cross_pos = text.find("== cross-check ==").unwrap();
        assert!(cross_pos < sample_pos);
        assert!(text.contains("[s1] filename2: short row"));
        assert!(text.contains("out/validated_sample.txt"));
        assert!(text.contains("1 error(s), 1 warning(s)"));
    }
}
