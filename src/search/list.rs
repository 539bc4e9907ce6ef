use super::{EntryKind, SearchEntry};
use crate::aggregate::Aggregates;
use crate::domain::GeoFeature;

/// Flattens the aggregate tables into one searchable list, in table order.
pub fn search_list(aggregates: &Aggregates) -> Vec<SearchEntry> {
    let mut list = Vec::new();

    for project in &aggregates.by_project {
        list.push(SearchEntry::new(
            &project.project,
            EntryKind::Project,
            project.samples.len() as u64,
        ));
    }
    for project in &aggregates.by_project {
        for sample in &project.samples {
            let mut entry = SearchEntry::new(sample, EntryKind::Sample, 1);
            entry.project = Some(project.project.clone());
            list.push(entry);
        }
    }
    for phylum in &aggregates.by_phylum {
        list.push(SearchEntry::new(
            &phylum.phylum,
            EntryKind::Phylum,
            phylum.samples.total,
        ));
    }
    for class in &aggregates.by_class {
        list.push(SearchEntry::new(
            &class.class,
            EntryKind::Class,
            class.samples.total,
        ));
    }
    list.extend(features(&aggregates.by_country, EntryKind::Country));
    list.extend(features(&aggregates.by_region, EntryKind::Region));
    for tag in &aggregates.by_tag {
        list.push(SearchEntry::new(&tag.tag, EntryKind::Tag, tag.samples));
    }
    for tag in &aggregates.by_tag_value {
        let mut entry = SearchEntry::new(&tag.tag, EntryKind::TagValue, tag.samples);
        entry.value = Some(tag.value.clone());
        entry.project = Some(tag.project.clone());
        list.push(entry);
    }

    list
}

fn features(features: &[GeoFeature], kind: EntryKind) -> impl Iterator<Item = SearchEntry> + '_ {
    features
        .iter()
        .filter(|feature| !feature.name().is_empty())
        .map(move |feature| SearchEntry::new(feature.name(), kind, feature.properties.samples))
}

/// Keeps entries of the given kinds; an empty filter keeps everything.
pub fn filter_by_kind(list: &[SearchEntry], kinds: &[EntryKind]) -> Vec<SearchEntry> {
    list.iter()
        .filter(|entry| {
            kinds.is_empty() || entry.kind.is_some_and(|kind| kinds.contains(&kind))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        GeoProperties, ProjectAggregate, SampleCounts, TagValueAggregate, TaxonAggregate,
    };

    fn aggregates() -> Aggregates {
        Aggregates {
            by_project: vec![ProjectAggregate {
                project: "P1".to_string(),
                samples: vec!["S1".to_string(), "S2".to_string()],
            }],
            by_phylum: vec![TaxonAggregate {
                kingdom: "Bacteria".to_string(),
                phylum: "Firmicutes".to_string(),
                class: String::new(),
                samples: SampleCounts {
                    total: 2,
                    ..SampleCounts::default()
                },
            }],
            by_region: vec![GeoFeature {
                properties: GeoProperties {
                    region: "Europe".to_string(),
                    country: String::new(),
                    code: String::new(),
                    samples: 4,
                },
                geometry: None,
            }],
            by_tag_value: vec![TagValueAggregate {
                tag: "host".to_string(),
                value: "human".to_string(),
                project: "P1".to_string(),
                samples: 2,
            }],
            ..Aggregates::default()
        }
    }

    #[test]
    fn projects_every_table() {
        let list = search_list(&aggregates());
        let kinds: Vec<EntryKind> = list.iter().filter_map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntryKind::Project,
                EntryKind::Sample,
                EntryKind::Sample,
                EntryKind::Phylum,
                EntryKind::Region,
                EntryKind::TagValue,
            ]
        );
        assert_eq!(list[0].samples, 2);
        assert_eq!(list[1].project.as_deref(), Some("P1"));
        assert_eq!(list[4].name, "Europe");
        assert_eq!(list[5].value.as_deref(), Some("human"));
    }

    #[test]
    fn filters_by_kind() {
        let list = search_list(&aggregates());
        assert_eq!(filter_by_kind(&list, &[]).len(), list.len());
        let phyla = filter_by_kind(&list, &[EntryKind::Phylum]);
        assert_eq!(phyla.len(), 1);
        assert_eq!(phyla[0].name, "Firmicutes");
    }
}
