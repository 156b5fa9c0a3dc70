use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::LibraryLayout;
use crate::error::PrepError;
use crate::files::FileSystem;
use crate::schema::{BIOPROJECT_EXPECTED, BIOPROJECT_REQUIRED, SAMPLE_REQUIRED, Schema};
use crate::table::Table;

const FASTQ_EXTENSIONS: &[&str] = &[".fastq.gz", ".fq.gz", ".fastq", ".fq"];

/// First-read marker and the matching second-read marker.
const PAIR_MARKERS: &[(&str, &str)] = &[
    ("_R1_", "_R2_"),
    ("_R1.", "_R2."),
    ("_1.", "_2."),
    ("_forward", "_reverse"),
    ("_f.", "_r."),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadSet {
    pub sample: String,
    pub first: PathBuf,
    pub second: Option<PathBuf>,
}

impl ReadSet {
    pub fn layout(&self) -> LibraryLayout {
        if self.second.is_some() {
            LibraryLayout::Paired
        } else {
            LibraryLayout::Single
        }
    }
}

pub fn collect_sequence_files<F: FileSystem>(
    fs: &F,
    dir: &Path,
    recursive: bool,
) -> Result<Vec<PathBuf>, PrepError> {
    let files = fs
        .list_sequence_files(dir, recursive)?
        .into_iter()
        .filter(|path| is_fastq(path))
        .collect::<Vec<_>>();
    if files.is_empty() {
        return Err(PrepError::NoSequenceFiles(dir.display().to_string()));
    }
    tracing::info!(dir = %dir.display(), files = files.len(), "collected FASTQ files");
    Ok(files)
}

fn is_fastq(path: &Path) -> bool {
    let name = file_name(path).to_ascii_lowercase();
    FASTQ_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pairs first/second read files that share a directory; everything else is single.
pub fn detect_pairs(files: &[PathBuf]) -> Vec<ReadSet> {
    let available = files.iter().collect::<HashSet<_>>();
    let mut consumed = HashSet::new();
    let mut sets = Vec::new();

    for file in files {
        if consumed.contains(file) {
            continue;
        }
        let name = file_name(file);
        let Some(mate_name) = mate_name(&name) else {
            continue;
        };
        let mate = file.with_file_name(mate_name);
        if available.contains(&mate) && !consumed.contains(&mate) {
            consumed.insert(file.clone());
            consumed.insert(mate.clone());
            sets.push(ReadSet {
                sample: sample_name_for(file),
                first: file.clone(),
                second: Some(mate),
            });
        }
    }
    for file in files {
        if consumed.contains(file) {
            continue;
        }
        sets.push(ReadSet {
            sample: sample_name_for(file),
            first: file.clone(),
            second: None,
        });
    }
    sets.sort_by(|a, b| a.first.cmp(&b.first));
    tracing::debug!(
        paired = sets.iter().filter(|set| set.second.is_some()).count(),
        total = sets.len(),
        "detected read sets"
    );
    sets
}

fn mate_name(name: &str) -> Option<String> {
    PAIR_MARKERS.iter().find_map(|(first, second)| {
        name.rfind(first).map(|pos| {
            format!("{}{second}{}", &name[..pos], &name[pos + first.len()..])
        })
    })
}

/// File name cut before the pair marker, or with the sequence extension removed.
pub fn sample_name_for(path: &Path) -> String {
    let name = file_name(path);
    let marker = PAIR_MARKERS
        .iter()
        .flat_map(|(first, second)| [*first, *second])
        .filter_map(|marker| name.rfind(marker))
        .min();
    if let Some(pos) = marker.filter(|pos| *pos > 0) {
        return name[..pos].to_string();
    }
    let lowered = name.to_ascii_lowercase();
    let extension = FASTQ_EXTENSIONS
        .iter()
        .chain(&[".bam", ".sff"])
        .find(|ext| lowered.ends_with(**ext))
        .map(|ext| ext.len());
    match extension {
        Some(len) => name[..name.len() - len].to_string(),
        None => name,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Templates {
    pub sample: Table,
    pub bioproject: Table,
}

/// Builds both metadata sheets; file names are written relative to `dir`.
pub fn build_templates(sets: &[ReadSet], dir: &Path, schema: &Schema) -> Templates {
    let relative = |path: &Path| {
        path.strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    };

    let mut sample_columns = SAMPLE_REQUIRED
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    sample_columns.push("filename2".to_string());
    let mut sample = Table::new(sample_columns);

    for set in sets {
        let row = sample
            .columns
            .iter()
            .map(|column| match column.as_str() {
                "sample_name" | "library_ID" => set.sample.clone(),
                "title" => format!("Metagenome from {}", set.sample),
                "library_layout" => set.layout().to_string(),
                "filename" => relative(&set.first),
                "filename2" => set.second.as_deref().map(relative).unwrap_or_default(),
                other => schema.default_for(other).unwrap_or_default().to_string(),
            })
            .collect();
        sample.rows.push(row);
    }

    let bioproject_columns = BIOPROJECT_REQUIRED
        .iter()
        .chain(BIOPROJECT_EXPECTED)
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    let mut bioproject = Table::new(bioproject_columns);
    let mut seen = BTreeSet::new();
    for set in sets {
        if !seen.insert(set.sample.as_str()) {
            continue;
        }
        let row = bioproject
            .columns
            .iter()
            .map(|column| match column.as_str() {
                "sample_name" => set.sample.clone(),
                other => schema.default_for(other).unwrap_or_default().to_string(),
            })
            .collect();
        bioproject.rows.push(row);
    }

    tracing::info!(
        samples = sample.len(),
        biosamples = bioproject.len(),
        "built metadata templates"
    );
    Templates { sample, bioproject }
}
