use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use sra_prep::files::{
    FileCheck, FileCheckOptions, LocalFileSystem, drop_incomplete, upload_list, write_upload_list,
};
use sra_prep::report::Severity;
use sra_prep::table::Table;

fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

fn sample_table(rows: &[[&str; 3]]) -> Table {
    let mut table = Table::new(vec![
        "sample_name".to_string(),
        "filename".to_string(),
        "filename2".to_string(),
    ]);
    for row in rows {
        table.rows.push(row.iter().map(|cell| cell.to_string()).collect());
    }
    table
}

fn seed_reads(dir: &Path) {
    let reads = gzip(&b"@r1\nACGT\n+\nIIII\n".repeat(50));
    fs::write(dir.join("s1_R1.fastq.gz"), &reads).unwrap();
    fs::write(dir.join("s1_R2.fastq.gz"), &reads[..reads.len() / 2]).unwrap();
    fs::write(dir.join("s2_R1.fastq.gz"), &reads).unwrap();
    fs::write(dir.join("leftover.fq"), b"@r\nA\n+\nI\n").unwrap();
    fs::write(dir.join("notes.txt"), b"not a read file").unwrap();
}

#[test]
fn local_check_finds_missing_corrupt_and_orphaned_files() {
    let temp = tempfile::tempdir().unwrap();
    seed_reads(temp.path());
    let table = sample_table(&[
        ["s1", "s1_R1.fastq.gz", "s1_R2.fastq.gz"],
        ["s2", "s2_R1.fastq.gz", "s2_R2.fastq.gz"],
    ]);

    let options = FileCheckOptions {
        recursive: false,
        check_gzip: true,
    };
    let result = FileCheck::new(&LocalFileSystem, options)
        .run(&table, Some(temp.path()))
        .unwrap();

    assert_eq!(result.found.len(), 3);
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].sample, "s2");
    assert_eq!(result.missing[0].column, "filename2");
    assert_eq!(result.corrupt.len(), 1);
    assert!(result.corrupt[0].path.ends_with("s1_R2.fastq.gz"));
    assert_eq!(result.orphans, vec![temp.path().join("leftover.fq")]);

    let issues = result.issues();
    let count = |severity| issues.iter().filter(|issue| issue.severity == severity).count();
    assert_eq!(count(Severity::Error), 2);
    assert_eq!(count(Severity::Warning), 1);
    assert_eq!(count(Severity::Info), 0);
}

#[test]
fn gzip_is_only_checked_on_request() {
    let temp = tempfile::tempdir().unwrap();
    seed_reads(temp.path());
    let table = sample_table(&[["s1", "s1_R1.fastq.gz", "s1_R2.fastq.gz"]]);

    let result = FileCheck::new(&LocalFileSystem, FileCheckOptions::default())
        .run(&table, Some(temp.path()))
        .unwrap();
    assert!(result.corrupt.is_empty());
    assert!(result.missing.is_empty());
    let issues = result.issues();
    assert!(issues
        .iter()
        .any(|issue| issue.message == "all 2 referenced file(s) found"));
}

#[test]
fn incomplete_samples_leave_both_tables() {
    let temp = tempfile::tempdir().unwrap();
    seed_reads(temp.path());
    let mut sample = sample_table(&[
        ["s1", "s1_R1.fastq.gz", "s1_R2.fastq.gz"],
        ["s2", "s2_R1.fastq.gz", "s2_R2.fastq.gz"],
        ["s3", "s3_R1.fastq.gz", ""],
    ]);
    let mut bioproject = Table::new(vec!["sample_name".to_string()]);
    for name in ["s1", "s2", "s3"] {
        bioproject.rows.push(vec![name.to_string()]);
    }

    let result = FileCheck::new(&LocalFileSystem, FileCheckOptions::default())
        .run(&sample, Some(temp.path()))
        .unwrap();
    let issues = drop_incomplete(&mut sample, Some(&mut bioproject), &result);

    assert_eq!(sample.column_values("sample_name"), vec!["s1"]);
    assert_eq!(bioproject.column_values("sample_name"), vec!["s1"]);
    let dropped = issues
        .iter()
        .map(|issue| (issue.severity, issue.sample.as_deref().unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(dropped, vec![(Severity::Fix, "s2"), (Severity::Fix, "s3")]);
}

#[test]
fn upload_list_is_written_one_path_per_line() {
    let temp = tempfile::tempdir().unwrap();
    let table = sample_table(&[
        ["s1", "s1_R1.fastq.gz", "s1_R2.fastq.gz"],
        ["s2", "/archive/s2.fastq.gz", ""],
    ]);
    let files = upload_list(&table, Some(Path::new("/data/run1")));
    let output = temp.path().join("lists").join("file_list.txt");
    write_upload_list(&output, &files).unwrap();

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "/data/run1/s1_R1.fastq.gz\n/data/run1/s1_R2.fastq.gz\n/archive/s2.fastq.gz\n"
    );
}

#[test]
fn shared_missing_file_drops_every_sample_that_references_it() {
    let temp = tempfile::tempdir().unwrap();
    seed_reads(temp.path());
    let mut sample = sample_table(&[
        ["s1", "missing.fq", "s1_R1.fastq.gz"],
        ["s2", "missing.fq", "s2_R1.fastq.gz"],
        ["s3", "leftover.fq", ""],
    ]);

    let result = FileCheck::new(&LocalFileSystem, FileCheckOptions::default())
        .run(&sample, Some(temp.path()))
        .unwrap();
    let owners = result
        .missing
        .iter()
        .map(|missing| missing.sample.as_str())
        .collect::<Vec<_>>();
    assert_eq!(owners, vec!["s1", "s2"]);
    assert_eq!(result.found.len(), 3);

    let issues = drop_incomplete(&mut sample, None, &result);
    assert_eq!(issues.len(), 2);
    assert_eq!(sample.column_values("sample_name"), vec!["s3"]);
    assert_eq!(
        upload_list(&sample, Some(temp.path())),
        vec![temp.path().join("leftover.fq")]
    );
}
