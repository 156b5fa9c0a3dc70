use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use sra_prep::config::{Config, ConfigLoader};
use sra_prep::error::PrepError;
use sra_prep::schema::Schema;

#[test]
fn explicit_config_file_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("submission.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "default_values": {"organism": "marine sediment metagenome"},
            "instrument_models": ["Element AVITI"],
            "sequence_dir": "/data/reads",
            "contact": {"name": "Sequencing Core", "email": "core@example.org"}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.source.as_deref(), Some(path.as_path()));
    assert_eq!(resolved.sequence_dir.as_deref(), Some(Path::new("/data/reads")));
    assert_eq!(resolved.contact["email"], "core@example.org");

    let schema = Schema::from_config(&resolved);
    assert_eq!(schema.default_for("organism"), Some("marine sediment metagenome"));
    assert!(schema
        .vocabulary("instrument_model")
        .unwrap()
        .contains(&"Element AVITI"));
}

#[test]
fn empty_default_values_fall_back_to_builtins() {
    let config = Config {
        default_values: [("platform".to_string(), "  ".to_string())].into(),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config);
    let schema = Schema::from_config(&resolved);
    assert_eq!(schema.default_for("platform"), Some("ILLUMINA"));
}

#[test]
fn missing_config_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(PrepError::ConfigRead(p)) if p == path
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, r#"{"default_values": ["not", "a", "map"]}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(PrepError::ConfigParse(message)) if message.contains("broken.json")
    );
}
