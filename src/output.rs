use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::aggregate::Aggregates;
use crate::domain::Metadata;
use crate::error::AtlasError;
use crate::search::SearchEntry;
use crate::world;

pub const SEARCH_LIST_FILE: &str = "search-list.json";

/// Writes `bytes` to a temp file beside `dest`, then moves it into place.
pub fn write_atomic(dest: &Utf8Path, bytes: &[u8]) -> Result<(), AtlasError> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".compendium-artifact")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
    temp.write_all(bytes)
        .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
    Ok(())
}

/// One file written by the build.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub name: String,
    pub path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: Utf8PathBuf,
    pretty: bool,
}

impl ArtifactWriter {
    pub fn new(dir: Utf8PathBuf, pretty: bool) -> Self {
        Self { dir, pretty }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn encode<T: Serialize>(&self, name: &str, value: &T, pretty: bool) -> Result<Vec<u8>, AtlasError> {
        let encoded = if pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|err| AtlasError::Serialize(format!("{name}: {err}")))
    }

    fn write<T: Serialize>(&self, name: &str, value: &T, pretty: bool) -> Result<Artifact, AtlasError> {
        let bytes = self.encode(name, value, pretty)?;
        let path = self.dir.join(format!("{name}.json"));
        write_atomic(&path, &bytes)?;
        tracing::info!(artifact = name, bytes = bytes.len(), "wrote {path}");
        Ok(Artifact {
            name: name.to_string(),
            path: path.to_string(),
            bytes: bytes.len() as u64,
        })
    }

    /// Writes every aggregate table, the metadata summary and the search list.
    pub fn write_all(
        &self,
        aggregates: &Aggregates,
        metadata: &Metadata,
        search_list: &[SearchEntry],
    ) -> Result<Vec<Artifact>, AtlasError> {
        let pretty = self.pretty;
        Ok(vec![
            self.write("by-project", &aggregates.by_project, pretty)?,
            self.write("by-phylum", &aggregates.by_phylum, pretty)?,
            self.write("by-class", &aggregates.by_class, pretty)?,
            self.write("by-country", &world::to_collection(&aggregates.by_country)?, pretty)?,
            self.write("by-region", &world::to_collection(&aggregates.by_region)?, pretty)?,
            self.write("by-reads", &aggregates.by_reads, pretty)?,
            self.write("by-tag", &aggregates.by_tag, pretty)?,
            self.write("by-tag-value", &aggregates.by_tag_value, pretty)?,
            self.write("metadata", metadata, true)?,
            self.write("search-list", &search_list, pretty)?,
        ])
    }
}

pub fn read_search_list(dir: &Utf8Path) -> Result<Vec<SearchEntry>, AtlasError> {
    let path = dir.join(SEARCH_LIST_FILE);
    if !path.as_std_path().exists() {
        return Err(AtlasError::MissingInput(path.into_std_path_buf()));
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| AtlasError::Filesystem(format!("read {path}: {err}")))?;
    serde_json::from_str(&content)
        .map_err(|err| AtlasError::Filesystem(format!("parse {path}: {err}")))
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("a.json");
        write_atomic(&path, b"[1]").unwrap();
        write_atomic(&path, b"[2]").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "[2]");
    }

    #[test]
    fn writes_named_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let writer = ArtifactWriter::new(root.clone(), false);
        let list = vec![SearchEntry::named("Firmicutes")];
        let artifacts = writer
            .write_all(&Aggregates::default(), &Metadata::default(), &list)
            .unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "by-project",
                "by-phylum",
                "by-class",
                "by-country",
                "by-region",
                "by-reads",
                "by-tag",
                "by-tag-value",
                "metadata",
                "search-list",
            ]
        );
        let country: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(root.join("by-country.json").as_std_path()).unwrap(),
        )
        .unwrap();
        assert_eq!(country["type"], "FeatureCollection");
        let metadata = fs::read_to_string(root.join("metadata.json").as_std_path()).unwrap();
        assert!(metadata.contains('\n'));
        assert_eq!(read_search_list(&root).unwrap(), list);
    }
}
