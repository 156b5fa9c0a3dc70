use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PrepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Tsv,
    Csv,
    Xlsx,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, PrepError> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "tsv" => Ok(TableFormat::Tsv),
            "csv" => Ok(TableFormat::Csv),
            "xlsx" => Ok(TableFormat::Xlsx),
            _ => Err(PrepError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Tsv => "txt",
            TableFormat::Csv => "csv",
            TableFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::Tsv => write!(f, "tsv"),
            TableFormat::Csv => write!(f, "csv"),
            TableFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Which metadata sheet a table plays in a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Sample,
    Bioproject,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Sample => "sample",
            TableKind::Bioproject => "bioproject",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryLayout {
    Paired,
    Single,
}

impl LibraryLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryLayout::Paired => "paired",
            LibraryLayout::Single => "single",
        }
    }
}

impl fmt::Display for LibraryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryLayout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paired" | "pair" | "pe" => Ok(LibraryLayout::Paired),
            "single" | "se" => Ok(LibraryLayout::Single),
            _ => Err(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSource {
    #[serde(rename = "environmental")]
    Environmental,
    #[serde(rename = "host-associated")]
    HostAssociated,
}

impl SampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleSource::Environmental => "environmental",
            SampleSource::HostAssociated => "host-associated",
        }
    }
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "environmental" | "environment" => Ok(SampleSource::Environmental),
            "host-associated" | "host" | "host associated" => Ok(SampleSource::HostAssociated),
            _ => Err(value.to_string()),
        }
    }
}

/// Field kinds accepted by `sra-prep normalize`. Column names such as
/// `collection_date` parse to their kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Date,
    LatLon,
    GeoLocName,
    LibraryLayout,
    SampleSource,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Date => write!(f, "date"),
            FieldKind::LatLon => write!(f, "lat-lon"),
            FieldKind::GeoLocName => write!(f, "geo-loc-name"),
            FieldKind::LibraryLayout => write!(f, "library-layout"),
            FieldKind::SampleSource => write!(f, "sample-source"),
        }
    }
}

impl FromStr for FieldKind {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "date" | "collection-date" => Ok(FieldKind::Date),
            "lat-lon" => Ok(FieldKind::LatLon),
            "geo-loc-name" => Ok(FieldKind::GeoLocName),
            "library-layout" => Ok(FieldKind::LibraryLayout),
            "sample-source" => Ok(FieldKind::SampleSource),
            _ => Err(PrepError::InvalidFieldKind(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn table_format_from_extension() {
        assert_eq!(
            TableFormat::from_path(Path::new("meta/sample.TXT")).unwrap(),
            TableFormat::Tsv
        );
        assert_eq!(
            TableFormat::from_path(Path::new("bioproject.csv")).unwrap(),
            TableFormat::Csv
        );
        let err = TableFormat::from_path(Path::new("old.xls")).unwrap_err();
        assert_matches!(err, PrepError::UnsupportedFormat(_));
    }

    #[test]
    fn layout_aliases() {
        assert_eq!("PE".parse::<LibraryLayout>().unwrap(), LibraryLayout::Paired);
        assert_eq!(" se ".parse::<LibraryLayout>().unwrap(), LibraryLayout::Single);
        assert!("mate".parse::<LibraryLayout>().is_err());
    }

    #[test]
    fn field_kind_accepts_column_names() {
        assert_eq!("collection_date".parse::<FieldKind>().unwrap(), FieldKind::Date);
        assert_eq!("lat_lon".parse::<FieldKind>().unwrap(), FieldKind::LatLon);
        let err = "depth".parse::<FieldKind>().unwrap_err();
        assert_matches!(err, PrepError::InvalidFieldKind(_));
    }
}
