use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{FieldKind, TableFormat, TableKind};
use crate::error::PrepError;
use crate::files::{self, FileCheck, FileCheckOptions, FileCheckResult, FileSystem};
use crate::normalize::{self, Normalized};
use crate::report::{Issue, Report};
use crate::schema::Schema;
use crate::table::{LoadedTable, Table};
use crate::template::{self, ReadSet};
use crate::validate::{self, FileListing, Validator};

#[derive(Debug, Clone, Default)]
pub struct ValidateRequest {
    pub sample: Option<PathBuf>,
    pub bioproject: Option<PathBuf>,
    pub sample_output: Option<PathBuf>,
    pub bioproject_output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub sequence_dir: Option<PathBuf>,
    pub check_files: bool,
    pub recursive: bool,
    pub check_gzip: bool,
    pub drop_incomplete: bool,
    pub file_list: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub kind: TableKind,
    pub input: PathBuf,
    pub format: TableFormat,
    pub rows: usize,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub tables: Vec<TableSummary>,
    pub files: Option<FileCheckResult>,
    pub report: Report,
}

#[derive(Debug, Clone, Default)]
pub struct FilesRequest {
    pub sample: PathBuf,
    pub sequence_dir: Option<PathBuf>,
    pub recursive: bool,
    pub check_gzip: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesResult {
    pub files: FileCheckResult,
    pub report: Report,
}

#[derive(Debug, Clone)]
pub struct TemplateRequest {
    pub dir: PathBuf,
    pub recursive: bool,
    pub output_dir: Option<PathBuf>,
    pub format: TableFormat,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResult {
    pub read_sets: Vec<ReadSet>,
    pub sample_output: PathBuf,
    pub bioproject_output: PathBuf,
    pub report: Report,
}

#[derive(Debug, Clone)]
pub struct FileListRequest {
    pub sample: PathBuf,
    pub sequence_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileListResult {
    pub output: PathBuf,
    pub files: Vec<PathBuf>,
    pub written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizeResult {
    pub kind: FieldKind,
    pub input: String,
    #[serde(flatten)]
    pub outcome: Normalized,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<F: FileSystem> {
    fs: F,
    validator: Validator,
    config: ResolvedConfig,
}

impl<F: FileSystem> App<F> {
    pub fn new(fs: F, config: ResolvedConfig) -> Self {
        let validator = Validator::new(Schema::from_config(&config));
        Self {
            fs,
            validator,
            config,
        }
    }

    pub fn validate(
        &self,
        request: ValidateRequest,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, PrepError> {
        if request.sample.is_none() && request.bioproject.is_none() {
            return Err(PrepError::NothingToValidate);
        }
        let start = Instant::now();
        let mut report = self.new_report();

        let mut sample = load(request.sample.as_deref(), sink)?;
        let mut bioproject = load(request.bioproject.as_deref(), sink)?;

        // Mates are confirmed against the sample table's own directory when
        // no sequence dir is configured.
        let sequence_dir = self
            .sequence_dir(request.sequence_dir.as_deref())
            .or_else(|| sample.as_ref().and_then(|loaded| parent_dir(&loaded.path)));
        let listing = match &sequence_dir {
            Some(dir) => match self.listing(dir, request.recursive) {
                Ok(listing) => Some(listing),
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "sequence dir not listed; mates inferred by name only"
                    );
                    None
                }
            },
            None => None,
        };

        sink.event(ProgressEvent {
            message: "phase=Validate; normalizing and checking fields".to_string(),
            elapsed: Some(start.elapsed()),
        });
        if let Some(loaded) = sample.as_mut() {
            report.extend(self.validator.validate_sample(
                &mut loaded.table,
                &loaded.shape,
                listing.as_ref(),
            ));
        }
        if let Some(loaded) = bioproject.as_mut() {
            report.extend(
                self.validator
                    .validate_bioproject(&mut loaded.table, &loaded.shape),
            );
        }
        if let (Some(sample), Some(bioproject)) = (&sample, &bioproject) {
            report.extend(validate::cross_check(&sample.table, &bioproject.table));
        }

        let mut file_check = None;
        if request.check_files
            && let Some(loaded) = sample.as_mut()
        {
            sink.event(ProgressEvent {
                message: "phase=Files; checking referenced files".to_string(),
                elapsed: Some(start.elapsed()),
            });
            let base_dir = sequence_dir.clone();
            let check = FileCheck::new(
                &self.fs,
                FileCheckOptions {
                    recursive: request.recursive,
                    check_gzip: request.check_gzip,
                },
            );
            let result = check.run(&loaded.table, base_dir.as_deref())?;
            report.extend(result.issues());
            if request.drop_incomplete {
                report.extend(files::drop_incomplete(
                    &mut loaded.table,
                    bioproject.as_mut().map(|loaded| &mut loaded.table),
                    &result,
                ));
            }
            file_check = Some(result);
        }

        let mut tables = Vec::new();
        for (kind, loaded, explicit) in [
            (TableKind::Sample, &sample, request.sample_output.as_deref()),
            (
                TableKind::Bioproject,
                &bioproject,
                request.bioproject_output.as_deref(),
            ),
        ] {
            let Some(loaded) = loaded else {
                continue;
            };
            let output = output_path(kind, loaded, explicit, request.output_dir.as_deref())?;
            if request.dry_run {
                tracing::info!(path = %output.display(), "dry run; not writing");
            } else {
                let format = TableFormat::from_path(&output)?;
                loaded.table.write(&output, format)?;
                tracing::info!(table = %kind, path = %output.display(), "wrote validated table");
                report.record_write(output.clone());
            }
            tables.push(TableSummary {
                kind,
                input: loaded.path.clone(),
                format: loaded.format,
                rows: loaded.table.len(),
                output: (!request.dry_run).then_some(output),
            });
        }

        if let (Some(path), Some(loaded)) = (&request.file_list, &sample) {
            let base_dir = sequence_dir.clone().or_else(|| parent_dir(&loaded.path));
            let list = files::upload_list(&loaded.table, base_dir.as_deref());
            if !request.dry_run {
                files::write_upload_list(path, &list)?;
                report.record_write(path.clone());
            }
            report.push(Issue::info(
                Some(TableKind::Sample),
                format!("{} file(s) in upload list", list.len()),
            ));
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} error(s), {} warning(s), {} fix(es)",
                report.summary.errors, report.summary.warnings, report.summary.fixes
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(ValidateResult {
            tables,
            files: file_check,
            report,
        })
    }

    pub fn check_files(
        &self,
        request: FilesRequest,
        sink: &dyn ProgressSink,
    ) -> Result<FilesResult, PrepError> {
        let start = Instant::now();
        let loaded =
            load(Some(request.sample.as_path()), sink)?.ok_or(PrepError::NothingToValidate)?;
        let base_dir = self
            .sequence_dir(request.sequence_dir.as_deref())
            .or_else(|| parent_dir(&loaded.path));

        sink.event(ProgressEvent {
            message: "phase=Files; checking referenced files".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let check = FileCheck::new(
            &self.fs,
            FileCheckOptions {
                recursive: request.recursive,
                check_gzip: request.check_gzip,
            },
        );
        let files = check.run(&loaded.table, base_dir.as_deref())?;
        let mut report = self.new_report();
        report.extend(files.issues());
        Ok(FilesResult { files, report })
    }

    pub fn template(
        &self,
        request: TemplateRequest,
        sink: &dyn ProgressSink,
    ) -> Result<TemplateResult, PrepError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Scan; {}", request.dir.display()),
            elapsed: None,
        });
        let files = template::collect_sequence_files(&self.fs, &request.dir, request.recursive)?;
        let read_sets = template::detect_pairs(&files);
        let templates = template::build_templates(&read_sets, &request.dir, self.validator.schema());

        let output_dir = request.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let ext = request.format.extension();
        let sample_output = output_dir.join(format!("sample-metadata-template.{ext}"));
        let bioproject_output = output_dir.join(format!("bioproject-metadata-template.{ext}"));

        let mut report = self.new_report();
        report.push(Issue::info(
            None,
            format!(
                "{} read set(s): {} paired, {} single",
                read_sets.len(),
                read_sets.iter().filter(|set| set.second.is_some()).count(),
                read_sets.iter().filter(|set| set.second.is_none()).count()
            ),
        ));
        if !request.dry_run {
            templates.sample.write(&sample_output, request.format)?;
            templates
                .bioproject
                .write(&bioproject_output, request.format)?;
            report.record_write(sample_output.clone());
            report.record_write(bioproject_output.clone());
        }
        sink.event(ProgressEvent {
            message: "phase=Done; templates ready".to_string(),
            elapsed: Some(start.elapsed()),
        });

        Ok(TemplateResult {
            read_sets,
            sample_output,
            bioproject_output,
            report,
        })
    }

    pub fn file_list(
        &self,
        request: FileListRequest,
        sink: &dyn ProgressSink,
    ) -> Result<FileListResult, PrepError> {
        let loaded =
            load(Some(request.sample.as_path()), sink)?.ok_or(PrepError::NothingToValidate)?;
        let base_dir = self
            .sequence_dir(request.sequence_dir.as_deref())
            .or_else(|| parent_dir(&loaded.path));
        let files = files::upload_list(&loaded.table, base_dir.as_deref());
        if !request.dry_run {
            files::write_upload_list(&request.output, &files)?;
            tracing::info!(path = %request.output.display(), files = files.len(), "wrote upload list");
        }
        Ok(FileListResult {
            output: request.output,
            files,
            written: !request.dry_run,
        })
    }

    pub fn normalize_value(&self, kind: FieldKind, raw: &str) -> NormalizeResult {
        let outcome = match kind {
            FieldKind::Date => normalize::collection_date(raw),
            FieldKind::LatLon => normalize::lat_lon(raw),
            FieldKind::GeoLocName => normalize::geo_loc_name(raw),
            FieldKind::LibraryLayout => normalize::library_layout(raw),
            FieldKind::SampleSource => normalize::sample_source(raw),
        };
        NormalizeResult {
            kind,
            input: raw.to_string(),
            outcome,
        }
    }

    fn new_report(&self) -> Report {
        Report {
            contact: self.config.contact.clone(),
            ..Report::default()
        }
    }

    fn sequence_dir(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.config.sequence_dir.clone())
    }

    fn listing(&self, dir: &Path, recursive: bool) -> Result<FileListing, PrepError> {
        Ok(self
            .fs
            .list_sequence_files(dir, recursive)?
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }
}

fn load(path: Option<&Path>, sink: &dyn ProgressSink) -> Result<Option<LoadedTable>, PrepError> {
    let Some(path) = path else {
        return Ok(None);
    };
    sink.event(ProgressEvent {
        message: format!("phase=Load; {}", path.display()),
        elapsed: None,
    });
    Table::read(path).map(Some)
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent().map(|parent| {
        if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        }
    })
}

/// Explicit path, else `<output_dir>/validated_<kind>.<ext>`, else
/// `<stem>_validated.<ext>` next to the input. The input format is kept.
pub fn output_path(
    kind: TableKind,
    loaded: &LoadedTable,
    explicit: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<PathBuf, PrepError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let ext = loaded.format.extension();
    if let Some(dir) = output_dir {
        return Ok(dir.join(format!("validated_{}.{ext}", kind.as_str())));
    }
    let stem = loaded
        .path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| PrepError::Filesystem(format!("no file name in {}", loaded.path.display())))?;
    let original_ext = loaded
        .path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| ext.to_string());
    Ok(loaded
        .path
        .with_file_name(format!("{stem}_validated.{original_ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder(RefCell<Vec<String>>);

    impl ProgressSink for Recorder {
        fn event(&self, event: ProgressEvent) {
            self.0.borrow_mut().push(event.message);
        }
    }

    fn loaded(path: &str, format: TableFormat) -> LoadedTable {
        LoadedTable {
            table: Table::default(),
            format,
            path: PathBuf::from(path),
            shape: Vec::new(),
        }
    }

    #[test]
    fn output_path_precedence() {
        let table = loaded("meta/sample.txt", TableFormat::Tsv);
        assert_eq!(
            output_path(TableKind::Sample, &table, Some(Path::new("x.csv")), None).unwrap(),
            PathBuf::from("x.csv")
        );
        assert_eq!(
            output_path(TableKind::Sample, &table, None, Some(Path::new("out"))).unwrap(),
            PathBuf::from("out/validated_sample.txt")
        );
        assert_eq!(
            output_path(TableKind::Bioproject, &table, None, None).unwrap(),
            PathBuf::from("meta/sample_validated.txt")
        );
    }

    #[test]
    fn validate_without_inputs_is_rejected() {
        let app = App::new(files::LocalFileSystem, ResolvedConfig::default());
        let sink = Recorder(RefCell::new(Vec::new()));
        let err = app.validate(ValidateRequest::default(), &sink).unwrap_err();
        assert!(matches!(err, PrepError::NothingToValidate));
        assert!(sink.0.borrow().is_empty());
    }
}
