use chrono::{SecondsFormat, Utc};

use crate::aggregate::Aggregates;
use crate::domain::{GeoFeature, Metadata, Provenance, TaxonAggregate};

fn counted_taxa(entries: &[TaxonAggregate]) -> u64 {
    entries.iter().filter(|entry| entry.samples.total > 0).count() as u64
}

fn counted_features(features: &[GeoFeature]) -> u64 {
    features
        .iter()
        .filter(|feature| feature.properties.samples > 0)
        .count() as u64
}

/// Summary counts over the finished tables, merged with provenance from the
/// record lookup. `uncompressed` is the byte size of the local inputs.
pub fn derive_metadata(aggregates: &Aggregates, provenance: &Provenance, uncompressed: u64) -> Metadata {
    Metadata {
        projects: aggregates.by_project.len() as u64,
        samples: aggregates
            .by_project
            .iter()
            .map(|project| project.samples.len() as u64)
            .sum(),
        phyla: counted_taxa(&aggregates.by_phylum),
        classes: counted_taxa(&aggregates.by_class),
        countries: counted_features(&aggregates.by_country),
        regions: counted_features(&aggregates.by_region),
        tags: aggregates.by_tag.len() as u64,
        version: provenance.version.clone(),
        date: provenance.date.clone(),
        downloads: provenance.downloads,
        views: provenance.views,
        size: provenance.size,
        uncompressed,
        compiled: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}
