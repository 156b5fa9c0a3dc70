use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PrepError {
    #[error("unsupported table format: {0}")]
    #[diagnostic(help("use tab-delimited .txt/.tsv, .csv or .xlsx"))]
    UnsupportedFormat(String),

    #[error("failed to read table {path}: {message}")]
    TableRead { path: PathBuf, message: String },

    #[error("table {0} has no header row")]
    EmptyTable(PathBuf),

    #[error("malformed spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid field kind: {0}")]
    #[diagnostic(help(
        "use one of date, lat-lon, geo-loc-name, library-layout, sample-source (column names such as collection_date also work)"
    ))]
    InvalidFieldKind(String),

    #[error("nothing to validate")]
    #[diagnostic(help("pass --sample and/or --bioproject"))]
    NothingToValidate,

    #[error("no sequence files found in {0}")]
    NoSequenceFiles(String),

    #[error("validation failed with {errors} error(s)")]
    #[diagnostic(help("see the report above; fix the listed entries and run again"))]
    ValidationFailed { errors: usize },
}
