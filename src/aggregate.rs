use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crate::dissolve::Dissolver;
use crate::domain::{
    GeoFeature, ProjectAggregate, ReadsHistogram, Row, SampleColumns, SampleRecord, TaxonAggregate,
    TaxonRank, TagAggregate, TagValueAggregate,
};
use crate::histogram::{self, SampleReads};
use crate::tags::TagAccumulator;
use crate::throttle::Throttle;

/// Leading identifier columns of the taxonomic table (sample, project).
const TAXONOMIC_ID_COLUMNS: usize = 2;

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub bins: usize,
    pub row_limit: usize,
    pub reads_domain: (f64, f64),
    pub sample_columns: SampleColumns,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            bins: histogram::DEFAULT_BINS,
            row_limit: 100_000_000,
            reads_domain: histogram::DEFAULT_DOMAIN,
            sample_columns: SampleColumns::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub by_project: Vec<ProjectAggregate>,
    pub by_phylum: Vec<TaxonAggregate>,
    pub by_class: Vec<TaxonAggregate>,
    pub by_country: Vec<GeoFeature>,
    pub by_region: Vec<GeoFeature>,
    pub by_reads: ReadsHistogram,
    pub by_tag: Vec<TagAggregate>,
    pub by_tag_value: Vec<TagValueAggregate>,
}

/// Taxon of each data column of the taxonomic table, from its header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonHeader(Vec<TaxonRank>);

impl TaxonHeader {
    pub fn from_row(row: &[String]) -> Self {
        Self(
            row.iter()
                .skip(TAXONOMIC_ID_COLUMNS)
                .map(|column| TaxonRank::parse(column))
                .collect(),
        )
    }

    pub fn rank(&self, column: usize) -> Option<&TaxonRank> {
        column
            .checked_sub(TAXONOMIC_ID_COLUMNS)
            .and_then(|index| self.0.get(index))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses a count cell. Missing, non-numeric and non-finite cells are zero.
pub fn parse_count(cell: &str) -> f64 {
    match cell.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        _ => 0.0,
    }
}

/// Country and region features seeded from the world map.
#[derive(Debug, Default)]
pub struct GeoTables {
    countries: Vec<GeoFeature>,
    country_index: HashMap<String, usize>,
    regions: Vec<GeoFeature>,
    region_index: HashMap<String, usize>,
    dissolved: HashSet<String>,
}

impl GeoTables {
    pub fn seed(world: &[GeoFeature], dissolver: &dyn Dissolver) -> Self {
        let mut tables = Self::default();
        for (position, feature) in world.iter().enumerate() {
            let code = feature.properties.code.clone();
            if !code.is_empty() {
                if tables.country_index.contains_key(&code) {
                    tracing::debug!(code = %code, "skipping repeated country feature");
                    continue;
                }
                tables
                    .country_index
                    .insert(code.clone(), tables.countries.len());
            }
            tables.countries.push(feature.clone());

            let country_key = if code.is_empty() {
                format!("#{position}")
            } else {
                code.clone()
            };
            tables.merge_region(feature, country_key, dissolver);
        }
        tables
    }

    fn merge_region(&mut self, feature: &GeoFeature, country_key: String, dissolver: &dyn Dissolver) {
        let region = feature.properties.region.clone();
        if region.is_empty() {
            // standalone: the country stands in for its own region
            if self.dissolved.insert(country_key.clone()) {
                self.region_index.insert(country_key, self.regions.len());
                self.regions.push(feature.clone());
            }
            return;
        }

        match self.region_index.get(&region).copied() {
            None => {
                let mut representative = feature.clone();
                representative.properties.country.clear();
                representative.properties.code.clear();
                self.region_index.insert(region, self.regions.len());
                self.regions.push(representative);
                self.dissolved.insert(country_key);
            }
            Some(index) => {
                if !self.dissolved.insert(country_key) {
                    return;
                }
                let existing = &mut self.regions[index];
                existing.geometry = match (existing.geometry.take(), feature.geometry.as_ref()) {
                    (Some(current), Some(next)) => match dissolver.dissolve(&[&current, next]) {
                        Ok(merged) => Some(merged),
                        Err(err) => {
                            tracing::warn!(region = %existing.properties.region, "keeping undissolved geometry: {err}");
                            Some(current)
                        }
                    },
                    (None, next) => next.cloned(),
                    (current, None) => current,
                };
            }
        }
    }

    /// Region key a sample is filed under: its own region, else its
    /// country's region, else the country code for regionless countries.
    pub fn region_key(&self, record: &SampleRecord) -> String {
        if !record.region.is_empty() {
            return record.region.clone();
        }
        self.country(&record.country_code)
            .map(|feature| feature.properties.region.as_str())
            .filter(|region| !region.is_empty())
            .unwrap_or(&record.country_code)
            .to_string()
    }

    pub fn country(&self, code: &str) -> Option<&GeoFeature> {
        self.country_index
            .get(code)
            .map(|index| &self.countries[*index])
    }

    pub fn region(&self, key: &str) -> Option<&GeoFeature> {
        self.region_index.get(key).map(|index| &self.regions[*index])
    }

    fn count(&mut self, code: &str, region_key: &str) {
        if let Some(index) = self.country_index.get(code) {
            self.countries[*index].properties.samples += 1;
        }
        if let Some(index) = self.region_index.get(region_key) {
            self.regions[*index].properties.samples += 1;
        }
    }

    pub fn into_sorted(self) -> (Vec<GeoFeature>, Vec<GeoFeature>) {
        (sort_features(self.countries), sort_features(self.regions))
    }
}

/// Breakdown keys for one sample. A regionless country is filed under its
/// own code, which appears once.
fn sample_keys(code: &str, region_key: &str) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    for key in [code, region_key] {
        if !key.is_empty() && !keys.iter().any(|existing| existing == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

fn sort_features(mut features: Vec<GeoFeature>) -> Vec<GeoFeature> {
    features.sort_by(|a, b| {
        Reverse(a.properties.samples)
            .cmp(&Reverse(b.properties.samples))
            .then_with(|| a.name().cmp(b.name()))
    });
    features
}

#[derive(Debug, Default)]
struct TaxonTable {
    entries: HashMap<String, TaxonAggregate>,
}

impl TaxonTable {
    fn count(&mut self, name: &str, rank: TaxonRank, keys: &[&str]) {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| TaxonAggregate {
                kingdom: rank.kingdom,
                phylum: rank.phylum,
                class: rank.class,
                samples: Default::default(),
            })
            .samples
            .increment(keys);
    }

    fn into_sorted<F>(self, name: F) -> Vec<TaxonAggregate>
    where
        F: Fn(&TaxonAggregate) -> &str,
    {
        let mut entries: Vec<TaxonAggregate> = self
            .entries
            .into_values()
            .filter(|entry| !name(entry).is_empty())
            .collect();
        entries.sort_by(|a, b| {
            Reverse(a.samples.total)
                .cmp(&Reverse(b.samples.total))
                .then_with(|| name(a).cmp(name(b)))
        });
        entries
    }
}

#[derive(Debug, Default)]
struct ProjectTable {
    index: HashMap<String, usize>,
    entries: Vec<ProjectAggregate>,
}

impl ProjectTable {
    fn push(&mut self, project: &str, sample: &str) {
        let index = match self.index.get(project) {
            Some(index) => *index,
            None => {
                self.index.insert(project.to_string(), self.entries.len());
                self.entries.push(ProjectAggregate {
                    project: project.to_string(),
                    samples: Vec::new(),
                });
                self.entries.len() - 1
            }
        };
        self.entries[index].samples.push(sample.to_string());
    }

    fn into_sorted(self) -> Vec<ProjectAggregate> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| {
            Reverse(a.samples.len())
                .cmp(&Reverse(b.samples.len()))
                .then_with(|| a.project.cmp(&b.project))
        });
        entries
    }
}

/// Single synchronized pass over the taxonomic and sample metadata tables.
pub struct Aggregator<'a> {
    options: AggregateOptions,
    dissolver: &'a dyn Dissolver,
}

impl<'a> Aggregator<'a> {
    pub fn new(options: AggregateOptions, dissolver: &'a dyn Dissolver) -> Self {
        Self { options, dissolver }
    }

    pub fn run<T, M, G>(&self, taxonomic: T, metadata: M, world: &[GeoFeature], tags: Option<G>) -> Aggregates
    where
        T: IntoIterator<Item = Row>,
        M: IntoIterator<Item = Row>,
        G: IntoIterator<Item = Row>,
    {
        tracing::info!(features = world.len(), "seeding countries and regions");
        let mut geo = GeoTables::seed(world, self.dissolver);

        let mut taxonomic = taxonomic.into_iter();
        let mut metadata = metadata.into_iter();
        let header = taxonomic
            .next()
            .map(|row| TaxonHeader::from_row(&row))
            .unwrap_or_default();
        metadata.next();
        tracing::info!(taxa = header.len(), "parsed taxonomic header");

        let mut projects = ProjectTable::default();
        let mut phyla = TaxonTable::default();
        let mut classes = TaxonTable::default();
        let mut reads = Vec::new();
        let mut throttle = Throttle::default();
        let mut row_index = 0usize;

        loop {
            let (taxa_row, meta_row) = (taxonomic.next(), metadata.next());
            if taxa_row.is_none() && meta_row.is_none() {
                break;
            }
            if row_index >= self.options.row_limit {
                tracing::error!(row_limit = self.options.row_limit, "row limit reached, stopping pass");
                break;
            }
            if throttle.ready() {
                tracing::info!(row = row_index, "aggregating");
            }
            row_index += 1;

            let mut record = match &meta_row {
                Some(meta) => self.options.sample_columns.record(meta),
                None => {
                    tracing::debug!(row = row_index, "taxonomic row without sample metadata");
                    let cell = |index: usize| {
                        taxa_row
                            .as_ref()
                            .and_then(|row| row.get(index))
                            .cloned()
                            .unwrap_or_default()
                    };
                    SampleRecord {
                        sample: cell(0),
                        project: cell(1),
                        ..SampleRecord::default()
                    }
                }
            };
            let region_key = geo.region_key(&record);
            if meta_row.is_some() {
                geo.count(&record.country_code, &region_key);
            }
            if record.project.is_empty() {
                tracing::debug!(sample = %record.sample, "sample without project");
            } else {
                projects.push(&record.project, &record.sample);
            }

            let Some(taxa_row) = taxa_row else {
                continue;
            };
            let sample_keys = sample_keys(&record.country_code, &region_key);
            let keys: Vec<&str> = sample_keys.iter().map(String::as_str).collect();
            let mut phylum_counted: HashSet<&str> = HashSet::new();
            let mut class_counted: HashSet<&str> = HashSet::new();
            for (column, cell) in taxa_row.iter().enumerate().skip(TAXONOMIC_ID_COLUMNS) {
                let value = parse_count(cell);
                if value <= 0.0 {
                    continue;
                }
                record.reads += value;
                let Some(rank) = header.rank(column) else {
                    continue;
                };
                if phylum_counted.insert(rank.phylum.as_str()) {
                    let phylum_rank = TaxonRank {
                        class: String::new(),
                        ..rank.clone()
                    };
                    phyla.count(&rank.phylum, phylum_rank, &keys);
                }
                if class_counted.insert(rank.class.as_str()) {
                    classes.count(&rank.class, rank.clone(), &keys);
                }
            }
            reads.push(SampleReads {
                reads: record.reads,
                keys: sample_keys,
            });
        }
        tracing::info!(rows = row_index, samples = reads.len(), "finished aggregation pass");

        let by_reads = histogram::reads_histogram(&reads, self.options.bins, self.options.reads_domain);

        let tag_tables = match tags {
            Some(tags) => {
                let mut accumulator = TagAccumulator::new();
                accumulator.consume(tags, self.options.row_limit);
                tracing::info!(rows = accumulator.rows(), "aggregated tags");
                accumulator.finish()
            }
            None => Default::default(),
        };

        let (by_country, by_region) = geo.into_sorted();
        Aggregates {
            by_project: projects.into_sorted(),
            by_phylum: phyla.into_sorted(|entry| entry.phylum.as_str()),
            by_class: classes.into_sorted(|entry| entry.class.as_str()),
            by_country,
            by_region,
            by_reads,
            by_tag: tag_tables.by_tag,
            by_tag_value: tag_tables.by_tag_value,
        }
    }
}
