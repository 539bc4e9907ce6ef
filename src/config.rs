use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateOptions;
use crate::domain::SampleColumns;
use crate::error::AtlasError;
use crate::histogram;
use crate::world::NATURAL_EARTH_URL;

pub const DEFAULT_CONFIG: &str = "compendium.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub taxonomic: Option<String>,
    #[serde(default)]
    pub samples: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub region_lookup: Option<String>,
    #[serde(default)]
    pub world_map: Option<String>,
    #[serde(default)]
    pub record_url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub bins: Option<usize>,
    #[serde(default)]
    pub row_limit: Option<usize>,
    #[serde(default)]
    pub reads_domain: Option<(f64, f64)>,
    #[serde(default)]
    pub sample_columns: Option<SampleColumns>,
}

/// Where the world map comes from: downloaded, or read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldMapLocation {
    Url(String),
    File(Utf8PathBuf),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub taxonomic: Utf8PathBuf,
    pub samples: Utf8PathBuf,
    pub tags: Option<Utf8PathBuf>,
    pub region_lookup: Utf8PathBuf,
    pub world_map: WorldMapLocation,
    pub record_url: Option<String>,
    pub output_dir: Utf8PathBuf,
    pub aggregate: AggregateOptions,
}

impl ResolvedConfig {
    /// Local input files, in the order they are read.
    pub fn inputs(&self) -> Vec<&Utf8PathBuf> {
        let mut inputs = vec![&self.taxonomic, &self.samples];
        inputs.extend(self.tags.as_ref());
        inputs.push(&self.region_lookup);
        if let WorldMapLocation::File(path) = &self.world_map {
            inputs.push(path);
        }
        inputs
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AtlasError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG),
        };

        if path.is_none() && !config_path.exists() {
            return Err(AtlasError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AtlasError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AtlasError::ConfigParse(err.to_string()))?;

        let base = config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Self::resolve_config(config, base)
    }

    /// Applies defaults and anchors relative paths at `base`.
    pub fn resolve_config(config: Config, base: &Path) -> Result<ResolvedConfig, AtlasError> {
        let base = Utf8PathBuf::from_path_buf(base.to_path_buf())
            .map_err(|path| AtlasError::ConfigParse(format!("non UTF-8 path: {}", path.display())))?;
        let anchor = |value: &str| {
            let path = Utf8PathBuf::from(value);
            if path.is_absolute() || base.as_str() == "." {
                path
            } else {
                base.join(path)
            }
        };

        let world_map = match config.world_map.as_deref() {
            None => WorldMapLocation::Url(NATURAL_EARTH_URL.to_string()),
            Some(value) if value.starts_with("http://") || value.starts_with("https://") => {
                WorldMapLocation::Url(value.to_string())
            }
            Some(value) => WorldMapLocation::File(anchor(value)),
        };

        let defaults = AggregateOptions::default();
        let bins = config.bins.unwrap_or(histogram::DEFAULT_BINS);
        if bins == 0 {
            return Err(AtlasError::ConfigParse("bins must be at least 1".to_string()));
        }
        let reads_domain = config.reads_domain.unwrap_or(defaults.reads_domain);
        if !(reads_domain.0 <= reads_domain.1) {
            return Err(AtlasError::ConfigParse(format!(
                "reads_domain must be ascending, got [{}, {}]",
                reads_domain.0, reads_domain.1
            )));
        }

        Ok(ResolvedConfig {
            taxonomic: anchor(config.taxonomic.as_deref().unwrap_or("taxonomic_table.csv")),
            samples: anchor(config.samples.as_deref().unwrap_or("sample_metadata.tsv")),
            tags: config.tags.as_deref().map(anchor),
            region_lookup: anchor(
                config
                    .region_lookup
                    .as_deref()
                    .unwrap_or("country-to-region.json"),
            ),
            world_map,
            record_url: config.record_url,
            output_dir: anchor(config.output_dir.as_deref().unwrap_or("public")),
            aggregate: AggregateOptions {
                bins,
                row_limit: config.row_limit.unwrap_or(defaults.row_limit),
                reads_domain,
                sample_columns: config.sample_columns.unwrap_or_default(),
            },
        })
    }
}
