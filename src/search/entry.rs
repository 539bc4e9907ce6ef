use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entry the matcher can read string fields from.
pub trait Searchable: Clone + Send + Sync + 'static {
    fn field(&self, key: &str) -> Option<Cow<'_, str>>;

    /// Flags an entry that only the fuzzy pass matched.
    fn mark_fuzzy(&mut self);

    fn name(&self) -> Cow<'_, str> {
        self.field("name").unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Project,
    Sample,
    Phylum,
    Class,
    Country,
    Region,
    Tag,
    #[serde(rename = "Tag Value")]
    TagValue,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Project => "Project",
            EntryKind::Sample => "Sample",
            EntryKind::Phylum => "Phylum",
            EntryKind::Class => "Class",
            EntryKind::Country => "Country",
            EntryKind::Region => "Region",
            EntryKind::Tag => "Tag",
            EntryKind::TagValue => "Tag Value",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    pub samples: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<bool>,
}

impl SearchEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind, samples: u64) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            samples,
            value: None,
            project: None,
            fuzzy: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            samples: 0,
            value: None,
            project: None,
            fuzzy: None,
        }
    }

    pub fn is_fuzzy(&self) -> bool {
        self.fuzzy.unwrap_or(false)
    }
}

impl Searchable for SearchEntry {
    fn field(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            "name" => Some(Cow::Borrowed(&self.name)),
            "type" => self.kind.map(|kind| Cow::Borrowed(kind.as_str())),
            "samples" => Some(Cow::Owned(self.samples.to_string())),
            "value" => self.value.as_deref().map(Cow::Borrowed),
            "project" => self.project.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn mark_fuzzy(&mut self) {
        self.fuzzy = Some(true);
    }
}

/// Arbitrary JSON objects, as received over the request protocol.
impl Searchable for Value {
    fn field(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(value) => Some(Cow::Borrowed(value)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    fn mark_fuzzy(&mut self) {
        if let Value::Object(map) = self {
            map.insert("fuzzy".to_string(), Value::Bool(true));
        }
    }
}
