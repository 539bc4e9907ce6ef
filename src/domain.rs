use std::collections::BTreeMap;
use std::fmt;

use geo::Geometry;
use serde::{Deserialize, Serialize};

/// One line of a delimited file, split into cells.
pub type Row = Vec<String>;

const MISSING_SEGMENT: &str = "NA";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonRank {
    pub kingdom: String,
    pub phylum: String,
    pub class: String,
}

impl TaxonRank {
    /// Parses a `Kingdom.Phylum.Class` column name. `NA` segments are blanked.
    pub fn parse(column: &str) -> Self {
        let mut parts = column.trim().split('.').map(|part| {
            let part = part.trim();
            if part == MISSING_SEGMENT {
                String::new()
            } else {
                part.to_string()
            }
        });
        Self {
            kingdom: parts.next().unwrap_or_default(),
            phylum: parts.next().unwrap_or_default(),
            class: parts.next().unwrap_or_default(),
        }
    }

    pub fn name(&self) -> &str {
        [&self.class, &self.phylum, &self.kingdom]
            .into_iter()
            .find(|part| !part.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl fmt::Display for TaxonRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kingdom, self.phylum, self.class)
    }
}

/// Positional layout of the sample metadata file. Negative indices count from
/// the end of the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleColumns {
    pub sample: isize,
    pub project: isize,
    pub country_code: isize,
    pub region: isize,
}

impl Default for SampleColumns {
    fn default() -> Self {
        Self {
            sample: 0,
            project: 1,
            country_code: -2,
            region: -1,
        }
    }
}

impl SampleColumns {
    pub fn record(&self, row: &[String]) -> SampleRecord {
        let sample = resolve(row.len(), self.sample);
        let project = resolve(row.len(), self.project);
        // Columns counted from the end never fall back onto the id columns
        // of a short row.
        let trailing = |index: isize| {
            let resolved = resolve(row.len(), index);
            if index < 0 && resolved.is_some() && (resolved == sample || resolved == project) {
                ""
            } else {
                cell(row, resolved)
            }
        };
        SampleRecord {
            sample: cell(row, sample).to_string(),
            project: cell(row, project).to_string(),
            country_code: trailing(self.country_code).to_uppercase(),
            region: trailing(self.region).to_string(),
            reads: 0.0,
        }
    }
}

fn resolve(len: usize, index: isize) -> Option<usize> {
    if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        Some(index as usize)
    }
}

fn cell(row: &[String], index: Option<usize>) -> &str {
    index
        .and_then(|index| row.get(index))
        .map(|cell| cell.trim())
        .unwrap_or("")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRecord {
    pub sample: String,
    pub project: String,
    pub country_code: String,
    pub region: String,
    pub reads: f64,
}

/// Sample tally with an overall total plus per-country-code and per-region
/// breakdowns, serialized as one flat object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub total: u64,
    #[serde(flatten)]
    pub by_key: BTreeMap<String, u64>,
}

impl SampleCounts {
    /// Counts one sample under `total` and once under each distinct key.
    pub fn increment(&mut self, keys: &[&str]) {
        self.total += 1;
        for (position, key) in keys.iter().enumerate() {
            if key.is_empty() || *key == "total" || keys[..position].contains(key) {
                continue;
            }
            *self.by_key.entry((*key).to_string()).or_default() += 1;
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        if key == "total" {
            return self.total;
        }
        self.by_key.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonAggregate {
    pub kingdom: String,
    pub phylum: String,
    pub class: String,
    pub samples: SampleCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoProperties {
    pub region: String,
    pub country: String,
    pub code: String,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub properties: GeoProperties,
    pub geometry: Option<Geometry<f64>>,
}

impl GeoFeature {
    /// Display name: the country, or the region for dissolved features.
    pub fn name(&self) -> &str {
        let props = &self.properties;
        [&props.country, &props.region, &props.code]
            .into_iter()
            .find(|part| !part.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAggregate {
    pub project: String,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub samples: SampleCounts,
    pub min: f64,
    pub max: f64,
    pub mid: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Medians {
    pub total: f64,
    #[serde(flatten)]
    pub by_key: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadsHistogram {
    pub histogram: Vec<HistogramBin>,
    pub median: Medians,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAggregate {
    pub tag: String,
    pub projects: u64,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValueAggregate {
    pub tag: String,
    pub value: String,
    pub project: String,
    pub samples: u64,
}

/// Volatile fields supplied by the external record lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub version: String,
    pub date: String,
    pub downloads: u64,
    pub views: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub projects: u64,
    pub samples: u64,
    pub phyla: u64,
    pub classes: u64,
    pub countries: u64,
    pub regions: u64,
    pub tags: u64,
    pub version: String,
    pub date: String,
    pub downloads: u64,
    pub views: u64,
    pub size: u64,
    pub uncompressed: u64,
    pub compiled: String,
}
