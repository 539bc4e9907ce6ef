use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Row, TagAggregate, TagValueAggregate};

#[derive(Debug, Default)]
pub struct TagTables {
    pub by_tag: Vec<TagAggregate>,
    pub by_tag_value: Vec<TagValueAggregate>,
}

/// Accumulates the tag table (`project, _, sample, tag, value`).
#[derive(Debug, Default)]
pub struct TagAccumulator {
    projects: BTreeMap<String, BTreeSet<String>>,
    samples: BTreeMap<String, BTreeSet<String>>,
    values: BTreeMap<(String, String, String), u64>,
    rows: usize,
}

impl TagAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: &[String]) {
        let cell = |index: usize| row.get(index).map(|cell| cell.trim()).unwrap_or("");
        let (project, sample, tag, value) = (cell(0), cell(2), cell(3), cell(4));
        if tag.is_empty() {
            return;
        }
        self.rows += 1;
        if !project.is_empty() {
            self.projects
                .entry(tag.to_string())
                .or_default()
                .insert(project.to_string());
        }
        if !sample.is_empty() {
            self.samples
                .entry(tag.to_string())
                .or_default()
                .insert(sample.to_string());
        }
        *self
            .values
            .entry((tag.to_string(), value.to_string(), project.to_string()))
            .or_default() += 1;
    }

    /// Skips the header row, then accumulates at most `row_limit` rows.
    pub fn consume<I>(&mut self, rows: I, row_limit: usize)
    where
        I: IntoIterator<Item = Row>,
    {
        let mut rows = rows.into_iter();
        if rows.next().is_none() {
            return;
        }
        for (index, row) in rows.enumerate() {
            if index >= row_limit {
                tracing::error!(row_limit, "tag table exceeded row limit, stopping");
                break;
            }
            self.push(&row);
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> TagTables {
        let tags: BTreeSet<&String> = self.projects.keys().chain(self.samples.keys()).collect();
        let mut by_tag: Vec<TagAggregate> = tags
            .into_iter()
            .map(|tag| TagAggregate {
                tag: tag.clone(),
                projects: self.projects.get(tag).map_or(0, |set| set.len() as u64),
                samples: self.samples.get(tag).map_or(0, |set| set.len() as u64),
            })
            .collect();
        by_tag.sort_by(|a, b| {
            Reverse(a.samples)
                .cmp(&Reverse(b.samples))
                .then_with(|| a.tag.cmp(&b.tag))
        });

        let mut by_tag_value: Vec<TagValueAggregate> = self
            .values
            .into_iter()
            .map(|((tag, value, project), samples)| TagValueAggregate {
                tag,
                value,
                project,
                samples,
            })
            .collect();
        by_tag_value.sort_by(|a, b| {
            Reverse(a.samples)
                .cmp(&Reverse(b.samples))
                .then_with(|| a.tag.cmp(&b.tag))
                .then_with(|| a.value.cmp(&b.value))
                .then_with(|| a.project.cmp(&b.project))
        });

        TagTables {
            by_tag,
            by_tag_value,
        }
    }
}
