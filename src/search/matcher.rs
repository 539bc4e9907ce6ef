use std::collections::HashSet;
use std::sync::Arc;

use super::{CancelToken, SearchError, Searchable};

pub const DEFAULT_THRESHOLD: f64 = 0.25;
const GRAM_SIZE: usize = 3;

pub type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Coarse progress reporting: "Starting", then "N% done" at each whole
/// percent of the list.
#[derive(Clone, Default)]
pub struct Progress {
    callback: Option<ProgressFn>,
}

impl Progress {
    pub fn new(callback: Option<ProgressFn>) -> Self {
        Self { callback }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn report(&self, status: &str) {
        if let Some(callback) = &self.callback {
            callback(status);
        }
    }

    fn tick(&self, index: usize, total: usize) {
        if self.callback.is_none() || total == 0 {
            return;
        }
        let step = (total / 100).max(1);
        if index % step == 0 {
            self.report(&format!("{}% done", index * 100 / total));
        }
    }
}

/// Lower-cases and collapses runs of underscores and whitespace into single
/// spaces.
pub fn normalize(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    let mut pending_space = false;
    for ch in value.chars() {
        if ch == '_' || ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !normalized.is_empty() {
            normalized.push(' ');
        }
        pending_space = false;
        normalized.extend(ch.to_lowercase());
    }
    normalized
}

fn haystack<T: Searchable>(entry: &T, keys: &[String]) -> String {
    let joined = keys
        .iter()
        .map(|key| entry.field(key).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ");
    normalize(&joined)
}

/// Overlapping `n`-character substrings, with `n - 1` spaces of padding on
/// both ends.
pub fn n_grams(value: &str, n: usize) -> HashSet<String> {
    let pad = " ".repeat(n.saturating_sub(1));
    let padded: Vec<char> = format!("{pad}{value}{pad}").chars().collect();
    if n == 0 || padded.len() < n {
        return HashSet::new();
    }
    padded
        .windows(n)
        .map(|window| window.iter().collect())
        .collect()
}

/// Jaccard similarity of the two strings' n-gram sets.
pub fn n_gram_similarity(a: &str, b: &str, n: usize) -> f64 {
    if a == b {
        return 1.0;
    }
    let a = n_grams(a, n);
    let b = n_grams(b, n);
    let common = a.intersection(&b).count();
    let total = a.union(&b).count();
    if total == 0 {
        return 0.0;
    }
    common as f64 / total as f64
}

fn scan<T, F>(
    list: &[T],
    token: &CancelToken,
    progress: &Progress,
    mut keep: F,
) -> Result<Vec<T>, SearchError>
where
    T: Searchable,
    F: FnMut(&T) -> bool,
{
    progress.report("Starting");
    let mut matches = Vec::new();
    for (index, entry) in list.iter().enumerate() {
        token.check()?;
        progress.tick(index, list.len());
        if keep(entry) {
            matches.push(entry.clone());
        }
    }
    token.check()?;
    progress.report("100% done");
    Ok(matches)
}

/// Case-insensitive substring match of `query` against the joined `keys`.
pub fn exact_search<T: Searchable>(
    list: &[T],
    keys: &[String],
    query: &str,
    token: &CancelToken,
    progress: &Progress,
) -> Result<Vec<T>, SearchError> {
    let needle = normalize(query);
    scan(list, token, progress, |entry| {
        haystack(entry, keys).contains(&needle)
    })
}

/// Entries whose trigram similarity to `query` exceeds `threshold`.
pub fn fuzzy_search<T: Searchable>(
    list: &[T],
    keys: &[String],
    query: &str,
    threshold: f64,
    token: &CancelToken,
    progress: &Progress,
) -> Result<Vec<T>, SearchError> {
    let needle = normalize(query);
    scan(list, token, progress, |entry| {
        n_gram_similarity(&haystack(entry, keys), &needle, GRAM_SIZE) > threshold
    })
}
