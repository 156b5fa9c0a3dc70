//! The static rule set for SRA metagenome submissions.

use std::collections::BTreeMap;

use crate::config::ResolvedConfig;
use crate::domain::TableKind;

pub const LIBRARY_STRATEGIES: &[&str] = &[
    "WGA",
    "WGS",
    "WXS",
    "RNA-Seq",
    "miRNA-Seq",
    "WCS",
    "CLONE",
    "POOLCLONE",
    "AMPLICON",
    "CLONEEND",
    "FINISHING",
    "ChIP-Seq",
    "MNase-Seq",
    "DNase-Hypersensitivity",
    "Bisulfite-Seq",
    "Tn-Seq",
    "EST",
    "FL-cDNA",
    "CTS",
    "MRE-Seq",
    "MeDIP-Seq",
    "MBD-Seq",
    "Synthetic-Long-Read",
    "ATAC-seq",
    "ChIA-PET",
    "FAIRE-seq",
    "Hi-C",
    "ncRNA-Seq",
    "RAD-Seq",
    "RIP-Seq",
    "SELEX",
    "ssRNA-seq",
    "Targeted-Capture",
    "Tethered Chromatin Conformation Capture",
    "DIP-Seq",
    "GBS",
    "Inverse rRNA",
    "NOMe-Seq",
    "Ribo-seq",
    "VALIDATION",
    "OTHER",
];

pub const LIBRARY_SOURCES: &[&str] = &[
    "GENOMIC",
    "TRANSCRIPTOMIC",
    "METAGENOMIC",
    "METATRANSCRIPTOMIC",
    "SYNTHETIC",
    "VIRAL RNA",
    "GENOMIC SINGLE CELL",
    "TRANSCRIPTOMIC SINGLE CELL",
    "OTHER",
];

pub const LIBRARY_SELECTIONS: &[&str] = &[
    "RANDOM",
    "PCR",
    "RANDOM PCR",
    "RT-PCR",
    "HMPR",
    "MF",
    "CF-S",
    "CF-M",
    "CF-H",
    "CF-T",
    "MDA",
    "MSLL",
    "cDNA",
    "ChIP",
    "MNase",
    "DNAse",
    "Hybrid Selection",
    "Reduced Representation",
    "Restriction Digest",
    "5-methylcytidine antibody",
    "MBD2 protein methyl-CpG binding domain",
    "CAGE",
    "RACE",
    "size fractionation",
    "Padlock probes capture method",
    "other",
    "unspecified",
    "cDNA_oligo_dT",
    "cDNA_randomPriming",
    "Inverse rRNA",
    "Oligo-dT",
    "PolyA",
    "repeat fractionation",
];

pub const PLATFORMS: &[&str] = &[
    "ABI_SOLID",
    "BGISEQ",
    "CAPILLARY",
    "COMPLETE_GENOMICS",
    "DNBSEQ",
    "ELEMENT",
    "GENAPSYS",
    "GENEMIND",
    "HELICOS",
    "ILLUMINA",
    "ION_TORRENT",
    "OXFORD_NANOPORE",
    "PACBIO_SMRT",
    "TAPESTRI",
    "ULTIMA",
    "VELA_DIAGNOSTICS",
];

pub const INSTRUMENT_MODELS: &[&str] = &[
    "Illumina NovaSeq X",
    "Illumina NovaSeq 6000",
    "Illumina HiSeq X",
    "Illumina HiSeq 2500",
    "Illumina HiSeq 2000",
    "Illumina HiSeq 1500",
    "Illumina HiSeq 1000",
    "Illumina MiSeq",
    "Illumina MiniSeq",
    "Illumina NextSeq 500",
    "Illumina NextSeq 550",
    "Illumina NextSeq 1000",
    "Illumina NextSeq 2000",
    "Illumina iSeq 100",
    "MinION",
    "GridION",
    "PromethION",
    "PacBio RS",
    "PacBio RS II",
    "PacBio Sequel",
    "PacBio Sequel II",
    "PacBio Revio",
    "Ion Torrent PGM",
    "Ion Torrent S5",
    "Ion Torrent S5 XL",
    "Ion Torrent Genexus",
    "unspecified",
];

pub const FILETYPES: &[&str] = &[
    "fastq",
    "bam",
    "srf",
    "sff",
    "PacBio_HDF5",
    "CompleteGenomics_native",
    "OxfordNanopore_native",
];

pub const BUILTIN_DEFAULTS: &[(&str, &str)] = &[
    ("library_strategy", "WGS"),
    ("library_source", "METAGENOMIC"),
    ("library_selection", "RANDOM"),
    ("library_layout", "paired"),
    ("platform", "ILLUMINA"),
    ("instrument_model", "Illumina NovaSeq X"),
    ("filetype", "fastq"),
    ("design_description", "Metagenomic sequencing"),
    ("organism", "metagenome"),
    ("collection_date", "not collected"),
    ("geo_loc_name", "not collected"),
    ("lat_lon", "not collected"),
];

pub const SAMPLE_REQUIRED: &[&str] = &[
    "sample_name",
    "library_ID",
    "title",
    "library_strategy",
    "library_source",
    "library_selection",
    "library_layout",
    "platform",
    "instrument_model",
    "design_description",
    "filetype",
    "filename",
];

pub const BIOPROJECT_REQUIRED: &[&str] = &[
    "sample_name",
    "organism",
    "collection_date",
    "geo_loc_name",
    "lat_lon",
];

pub const BIOPROJECT_EXPECTED: &[&str] = &[
    "bioproject_id",
    "sample_source",
    "host",
    "isolation_source",
    "env_biome",
    "env_feature",
    "env_material",
];

pub const FILE_COLUMNS: &[&str] = &[
    "filename",
    "filename2",
    "filepath",
    "filepath2",
    "file1",
    "file2",
];

/// How a column's values are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRule {
    Date,
    LatLon,
    GeoLocName,
    LibraryLayout,
    SampleSource,
    Vocabulary,
}

pub fn column_rule(column: &str) -> Option<ColumnRule> {
    match column {
        "collection_date" => Some(ColumnRule::Date),
        "lat_lon" => Some(ColumnRule::LatLon),
        "geo_loc_name" => Some(ColumnRule::GeoLocName),
        "library_layout" => Some(ColumnRule::LibraryLayout),
        "sample_source" => Some(ColumnRule::SampleSource),
        "library_strategy" | "library_source" | "library_selection" | "platform"
        | "instrument_model" | "filetype" => Some(ColumnRule::Vocabulary),
        _ => None,
    }
}

/// Rule set with configuration applied: defaults merged, instrument list extended.
#[derive(Debug, Clone)]
pub struct Schema {
    defaults: BTreeMap<String, String>,
    instrument_models: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            defaults: BUILTIN_DEFAULTS
                .iter()
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect(),
            instrument_models: INSTRUMENT_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Schema {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut schema = Self::default();
        for (column, value) in &config.default_values {
            schema.defaults.insert(column.clone(), value.clone());
        }
        for model in &config.instrument_models {
            if !schema.instrument_models.iter().any(|known| known == model) {
                schema.instrument_models.push(model.clone());
            }
        }
        schema
    }

    pub fn default_for(&self, column: &str) -> Option<&str> {
        self.defaults
            .get(column)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn required(&self, kind: TableKind) -> &'static [&'static str] {
        match kind {
            TableKind::Sample => SAMPLE_REQUIRED,
            TableKind::Bioproject => BIOPROJECT_REQUIRED,
        }
    }

    pub fn expected(&self, kind: TableKind) -> &'static [&'static str] {
        match kind {
            TableKind::Sample => &[],
            TableKind::Bioproject => BIOPROJECT_EXPECTED,
        }
    }

    /// Controlled vocabulary for `column`, if it has one.
    pub fn vocabulary(&self, column: &str) -> Option<Vec<&str>> {
        let terms: &[&str] = match column {
            "library_strategy" => LIBRARY_STRATEGIES,
            "library_source" => LIBRARY_SOURCES,
            "library_selection" => LIBRARY_SELECTIONS,
            "platform" => PLATFORMS,
            "filetype" => FILETYPES,
            "instrument_model" => {
                return Some(self.instrument_models.iter().map(String::as_str).collect());
            }
            _ => return None,
        };
        Some(terms.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_overrides_defaults_and_extends_instruments() {
        let mut config = ResolvedConfig::default();
        config
            .default_values
            .insert("organism".to_string(), "human gut metagenome".to_string());
        config.instrument_models.push("Custom Sequencer".to_string());
        config.instrument_models.push("MinION".to_string());

        let schema = Schema::from_config(&config);
        assert_eq!(schema.default_for("organism"), Some("human gut metagenome"));
        assert_eq!(schema.default_for("platform"), Some("ILLUMINA"));
        let models = schema.vocabulary("instrument_model").unwrap();
        assert!(models.contains(&"Custom Sequencer"));
        assert_eq!(models.iter().filter(|m| **m == "MinION").count(), 1);
    }

    #[test]
    fn every_defaulted_vocabulary_column_accepts_its_default() {
        let schema = Schema::default();
        for (column, value) in BUILTIN_DEFAULTS {
            if let Some(terms) = schema.vocabulary(column) {
                assert!(terms.contains(value), "{column}={value}");
            }
        }
    }
}
