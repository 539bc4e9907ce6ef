use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use compendium_atlas::config::{ConfigLoader, WorldMapLocation};
use compendium_atlas::domain::SampleColumns;
use compendium_atlas::error::AtlasError;

#[test]
fn resolves_file_relative_to_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compendium.json");
    fs::write(
        &path,
        r#"{
            "taxonomic": "data/taxa.csv.gz",
            "tags": "data/tags.csv",
            "world_map": "https://example.org/world.geojson",
            "record_url": "https://zenodo.org/api/records/1",
            "bins": 20,
            "reads_domain": [1, 1000],
            "sample_columns": {"sample": 0, "project": 1, "country_code": 3, "region": 4}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    assert_eq!(resolved.taxonomic, root.join("data/taxa.csv.gz"));
    assert_eq!(resolved.samples, root.join("sample_metadata.tsv"));
    assert_eq!(resolved.tags, Some(root.join("data/tags.csv")));
    assert_eq!(resolved.output_dir, root.join("public"));
    assert_eq!(
        resolved.world_map,
        WorldMapLocation::Url("https://example.org/world.geojson".to_string())
    );
    assert_eq!(
        resolved.record_url.as_deref(),
        Some("https://zenodo.org/api/records/1")
    );
    assert_eq!(resolved.aggregate.bins, 20);
    assert_eq!(resolved.aggregate.reads_domain, (1.0, 1000.0));
    assert_eq!(
        resolved.aggregate.sample_columns,
        SampleColumns {
            sample: 0,
            project: 1,
            country_code: 3,
            region: 4,
        }
    );
}

#[test]
fn explicit_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(AtlasError::ConfigRead(_))
    );
}

#[test]
fn invalid_json_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compendium.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(AtlasError::ConfigParse(_))
    );
}

#[test]
fn descending_reads_domain_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compendium.json");
    fs::write(&path, r#"{"reads_domain": [100, 1]}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(AtlasError::ConfigParse(_))
    );
}
