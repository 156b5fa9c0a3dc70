use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::domain::TableKind;
use crate::error::PrepError;
use crate::fs_util;
use crate::report::Issue;
use crate::schema::FILE_COLUMNS;
use crate::table::Table;

pub const SEQUENCE_EXTENSIONS: &[&str] = &[".fastq", ".fq", ".fastq.gz", ".fq.gz", ".bam", ".sff"];

pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;
    /// Sequence files under `dir`, sorted.
    fn list_sequence_files(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, PrepError>;
    fn check_gzip(&self, path: &Path) -> Result<(), PrepError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn list_sequence_files(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, PrepError> {
        Ok(fs_util::list_files(dir, recursive)?
            .into_iter()
            .filter(|path| is_sequence_file(path))
            .collect())
    }

    fn check_gzip(&self, path: &Path) -> Result<(), PrepError> {
        let bytes = fs_util::validate_gzip(path)?;
        tracing::debug!(path = %path.display(), bytes, "gzip stream ok");
        Ok(())
    }
}

pub fn is_sequence_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    SEQUENCE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Absolute paths are kept; relative ones are joined to `base_dir`.
pub fn resolve(base_dir: Option<&Path>, value: &str) -> PathBuf {
    let path = Path::new(value.trim());
    let joined = match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    joined.components().collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingFile {
    pub sample: String,
    pub column: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorruptFile {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileCheckResult {
    pub found: Vec<PathBuf>,
    pub missing: Vec<MissingFile>,
    pub orphans: Vec<PathBuf>,
    pub corrupt: Vec<CorruptFile>,
}

impl FileCheckResult {
    pub fn missing_by_sample(&self) -> BTreeMap<String, Vec<PathBuf>> {
        let mut grouped = BTreeMap::<String, Vec<PathBuf>>::new();
        for missing in &self.missing {
            grouped
                .entry(missing.sample.clone())
                .or_default()
                .push(missing.path.clone());
        }
        grouped
    }

    pub fn issues(&self) -> Vec<Issue> {
        let kind = Some(TableKind::Sample);
        let mut issues = Vec::new();
        for missing in &self.missing {
            issues.push(
                Issue::error(kind, format!("file not found: {}", missing.path.display()))
                    .with_sample(missing.sample.as_str())
                    .with_column(missing.column.as_str()),
            );
        }
        for corrupt in &self.corrupt {
            issues.push(Issue::error(
                kind,
                format!("corrupt gzip file {}: {}", corrupt.path.display(), corrupt.message),
            ));
        }
        for orphan in &self.orphans {
            issues.push(Issue::warning(
                kind,
                format!("sequence file not referenced by any sample: {}", orphan.display()),
            ));
        }
        if self.missing.is_empty() && self.corrupt.is_empty() {
            issues.push(Issue::info(
                kind,
                format!("all {} referenced file(s) found", self.found.len()),
            ));
        }
        issues
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileCheckOptions {
    pub recursive: bool,
    pub check_gzip: bool,
}

pub struct FileCheck<'a, F: FileSystem> {
    fs: &'a F,
    options: FileCheckOptions,
}

impl<'a, F: FileSystem> FileCheck<'a, F> {
    pub fn new(fs: &'a F, options: FileCheckOptions) -> Self {
        Self { fs, options }
    }

    pub fn run(&self, table: &Table, base_dir: Option<&Path>) -> Result<FileCheckResult, PrepError> {
        let mut result = FileCheckResult::default();
        // Each path is checked once; every reference to a missing path is recorded.
        let mut checked = BTreeMap::<PathBuf, bool>::new();

        for (row, cells) in table.rows.iter().enumerate() {
            for column in FILE_COLUMNS {
                let Some(idx) = table.column_index(column) else {
                    continue;
                };
                let value = cells[idx].trim();
                if value.is_empty() {
                    continue;
                }
                let path = resolve(base_dir, value);
                let exists = match checked.get(&path) {
                    Some(exists) => *exists,
                    None => {
                        let exists = self.fs.exists(&path);
                        checked.insert(path.clone(), exists);
                        if exists {
                            result.found.push(path.clone());
                        }
                        exists
                    }
                };
                if !exists {
                    let sample = table.get(row, "sample_name").to_string();
                    tracing::warn!(sample = %sample, column = %column, path = %path.display(), "missing file");
                    result.missing.push(MissingFile {
                        sample,
                        column: column.to_string(),
                        path,
                    });
                }
            }
        }

        if self.options.check_gzip {
            for path in &result.found {
                if !path.to_string_lossy().to_ascii_lowercase().ends_with(".gz") {
                    continue;
                }
                if let Err(err) = self.fs.check_gzip(path) {
                    tracing::warn!(path = %path.display(), "gzip check failed");
                    result.corrupt.push(CorruptFile {
                        path: path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if let Some(dir) = base_dir {
            result.orphans = self
                .fs
                .list_sequence_files(dir, self.options.recursive)?
                .into_iter()
                .map(|path| path.components().collect::<PathBuf>())
                .filter(|path| !checked.contains_key(path))
                .collect();
        }

        tracing::info!(
            found = result.found.len(),
            missing = result.missing.len(),
            orphans = result.orphans.len(),
            corrupt = result.corrupt.len(),
            "checked files"
        );
        Ok(result)
    }
}

/// Removes every sample with a missing file from both tables.
pub fn drop_incomplete(
    sample: &mut Table,
    bioproject: Option<&mut Table>,
    result: &FileCheckResult,
) -> Vec<Issue> {
    let incomplete = result.missing_by_sample();
    if incomplete.is_empty() {
        return Vec::new();
    }
    let keep = |columns: &[String], row: &[String]| {
        columns
            .iter()
            .position(|column| column == "sample_name")
            .is_none_or(|idx| !incomplete.contains_key(&row[idx]))
    };
    sample.retain_rows(keep);
    if let Some(bioproject) = bioproject {
        bioproject.retain_rows(keep);
    }
    incomplete
        .iter()
        .map(|(name, paths)| {
            Issue::fix(
                None,
                format!("removed sample with {} missing file(s)", paths.len()),
            )
            .with_sample(name.as_str())
        })
        .collect()
}

/// Resolved paths of every referenced file, in table order, without duplicates.
pub fn upload_list(table: &Table, base_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for cells in &table.rows {
        for column in FILE_COLUMNS {
            let Some(idx) = table.column_index(column) else {
                continue;
            };
            let value = cells[idx].trim();
            if value.is_empty() {
                continue;
            }
            let path = resolve(base_dir, value);
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }
    files
}

pub fn write_upload_list(path: &Path, files: &[PathBuf]) -> Result<(), PrepError> {
    let mut content = String::new();
    for file in files {
        let file = Utf8PathBuf::from_path_buf(file.clone()).map_err(|path| {
            PrepError::Filesystem(format!("non-utf8 file path: {}", path.display()))
        })?;
        content.push_str(file.as_str());
        content.push('\n');
    }
    fs_util::write_bytes_atomic(path, content.as_bytes())
}
