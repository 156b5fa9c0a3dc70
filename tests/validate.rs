use sra_prep::config::ResolvedConfig;
use sra_prep::domain::TableKind;
use sra_prep::report::{Issue, Severity};
use sra_prep::schema::Schema;
use sra_prep::table::{ShapeProblem, Table};
use sra_prep::validate::{Validator, cross_check};

fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    let mut table = Table::new(columns.iter().map(|column| column.to_string()).collect());
    for row in rows {
        table
            .rows
            .push(row.iter().map(|cell| cell.to_string()).collect());
    }
    table
}

fn errors(issues: &[Issue]) -> Vec<&Issue> {
    issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .collect()
}

fn validator() -> Validator {
    Validator::new(Schema::default())
}

#[test]
fn missing_columns_are_added_with_defaults() {
    let mut sample = table(
        &["sample_name", "title", "filename", "filename2"],
        &[&["s1", "Soil 1", "s1_R1.fq", "s1_R2.fq"]],
    );
    let issues = validator().validate_sample(&mut sample, &[], None);

    assert!(errors(&issues).is_empty(), "{issues:?}");
    assert_eq!(sample.get(0, "library_ID"), "s1");
    assert_eq!(sample.get(0, "platform"), "ILLUMINA");
    assert_eq!(sample.get(0, "instrument_model"), "Illumina NovaSeq X");
    assert_eq!(sample.get(0, "library_layout"), "paired");
    let added = issues
        .iter()
        .filter(|issue| issue.severity == Severity::Warning)
        .count();
    assert_eq!(added, 9);
}

#[test]
fn config_defaults_fill_empty_cells() {
    let mut config = ResolvedConfig::default();
    config
        .default_values
        .insert("organism".to_string(), "soil metagenome".to_string());
    let validator = Validator::new(Schema::from_config(&config));

    let mut bioproject = table(
        &[
            "sample_name",
            "organism",
            "collection_date",
            "geo_loc_name",
            "lat_lon",
        ],
        &[&["s1", "", "", "", ""], &["s2", "", "2020", "Kenya", "1 S 36 E"]],
    );
    let issues = validator.validate_bioproject(&mut bioproject, &[]);

    assert!(errors(&issues).is_empty(), "{issues:?}");
    assert_eq!(bioproject.column_values("organism"), vec!["soil metagenome"; 2]);
    assert_eq!(bioproject.get(0, "collection_date"), "not collected");
    assert_eq!(bioproject.get(1, "collection_date"), "2020");
    assert!(issues.iter().any(|issue| {
        issue.severity == Severity::Fix
            && issue.column.as_deref() == Some("organism")
            && issue.message.contains("filled 2 empty cell(s)")
    }));
}

#[test]
fn invalid_values_name_sample_column_and_value() {
    let mut bioproject = table(
        &[
            "sample_name",
            "organism",
            "collection_date",
            "geo_loc_name",
            "lat_lon",
        ],
        &[&["s9", "metagenome", "sometime", "USA", "north"]],
    );
    let issues = validator().validate_bioproject(&mut bioproject, &[]);
    let errors = errors(&issues);

    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].sample.as_deref(), Some("s9"));
    assert_eq!(errors[0].column.as_deref(), Some("collection_date"));
    assert!(errors[0].message.contains("'sometime'"));
    assert_eq!(errors[1].column.as_deref(), Some("lat_lon"));
}

#[test]
fn conditional_requirements() {
    let mut sample = table(
        &[
            "sample_name",
            "title",
            "library_layout",
            "filename",
            "filename2",
        ],
        &[
            &["p1", "t", "paired", "p1.fastq.gz", ""],
            &["u1", "t", "single", "u1.fastq.gz", "u1_extra.fastq.gz"],
        ],
    );
    let issues = validator().validate_sample(&mut sample, &[], None);

    let paired = issues
        .iter()
        .find(|issue| issue.sample.as_deref() == Some("p1"))
        .unwrap();
    assert_eq!(paired.severity, Severity::Error);
    let single = issues
        .iter()
        .find(|issue| issue.sample.as_deref() == Some("u1"))
        .unwrap();
    assert_eq!(single.severity, Severity::Warning);

    let mut bioproject = table(
        &["sample_name", "sample_source", "host"],
        &[&["h1", "host associated", ""], &["h2", "environment", ""]],
    );
    let issues = validator().validate_bioproject(&mut bioproject, &[]);
    let host_errors = errors(&issues)
        .into_iter()
        .filter(|issue| issue.column.as_deref() == Some("host"))
        .collect::<Vec<_>>();
    assert_eq!(host_errors.len(), 1);
    assert_eq!(host_errors[0].sample.as_deref(), Some("h1"));
    assert_eq!(bioproject.get(1, "sample_source"), "environmental");
}

#[test]
fn duplicates_and_shape_problems() {
    let mut sample = table(
        &["sample_name", "title", "filename", "filename2"],
        &[
            &["s1", "t", "a_R1.fq", "a_R2.fq"],
            &["s1", "t", "b_R1.fq", "b_R2.fq"],
            &["s2", "t", "b_R1.fq", "c_R2.fq"],
        ],
    );
    let shape = [
        ShapeProblem::Short { line: 2, cells: 3 },
        ShapeProblem::Long { line: 4, cells: 6 },
    ];
    let issues = validator().validate_sample(&mut sample, &shape, None);

    assert_eq!(issues[0].severity, Severity::Warning);
    assert_eq!(issues[1].severity, Severity::Error);
    let errors = errors(&issues);
    assert!(errors.iter().any(|issue| {
        issue.column.as_deref() == Some("sample_name") && issue.message.contains("2 times")
    }));
    assert!(errors
        .iter()
        .any(|issue| issue.message.contains("'b_R1.fq' is referenced 2 times")));
}

#[test]
fn table_without_sample_name_stops_early() {
    let mut sample = table(&["name"], &[&["s1"]]);
    let issues = validator().validate_sample(&mut sample, &[], None);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Error);
    assert_eq!(sample.columns, vec!["name"]);
}

#[test]
fn cross_check_reports_both_directions_sorted() {
    let sample = table(&["sample_name"], &[&["s3"], &["s1"], &["s2"]]);
    let bioproject = table(&["sample_name"], &[&["s2"], &["s4"], &["s1"]]);
    let issues = cross_check(&sample, &bioproject);

    let samples = issues
        .iter()
        .map(|issue| issue.sample.as_deref().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(samples, vec!["s3", "s4"]);
    assert!(issues.iter().all(|issue| issue.table.is_none()));
    assert!(issues[0].message.contains("not in the bioproject table"));

    let matching = cross_check(&sample, &sample);
    assert_eq!(matching[0].severity, Severity::Info);
    assert_eq!(matching[0].table, None::<TableKind>);
}
