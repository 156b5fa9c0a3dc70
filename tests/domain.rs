use assert_matches::assert_matches;

use sra_prep::domain::{FieldKind, LibraryLayout, SampleSource, TableFormat};
use sra_prep::error::PrepError;

#[test]
fn parse_field_kind_aliases() {
    let kind: FieldKind = "collection_date".parse().unwrap();
    assert_eq!(kind, FieldKind::Date);
    let kind: FieldKind = "Geo_Loc_Name".parse().unwrap();
    assert_eq!(kind, FieldKind::GeoLocName);
    assert_eq!(FieldKind::LatLon.to_string(), "lat-lon");
}

#[test]
fn parse_field_kind_invalid() {
    let err = "depth".parse::<FieldKind>().unwrap_err();
    assert_matches!(err, PrepError::InvalidFieldKind(_));
}

#[test]
fn layouts_and_sources_accept_lab_spellings() {
    assert_eq!("PE".parse::<LibraryLayout>(), Ok(LibraryLayout::Paired));
    assert_eq!(" Single ".parse::<LibraryLayout>(), Ok(LibraryLayout::Single));
    assert!("interleaved".parse::<LibraryLayout>().is_err());
    assert_eq!(
        "Host Associated".parse::<SampleSource>(),
        Ok(SampleSource::HostAssociated)
    );
    assert_eq!(SampleSource::Environmental.to_string(), "environmental");
}

#[test]
fn output_extensions() {
    assert_eq!(TableFormat::Tsv.extension(), "txt");
    assert_eq!(TableFormat::Xlsx.extension(), "xlsx");
    let err = TableFormat::from_path("reads.fastq".as_ref()).unwrap_err();
    assert_matches!(err, PrepError::UnsupportedFormat(_));
}
