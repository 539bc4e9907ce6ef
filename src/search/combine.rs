use std::collections::HashSet;

use super::Searchable;

/// Exact matches first, then fuzzy matches not already present by name,
/// each flagged as fuzzy.
pub fn combine<T: Searchable>(exact: Vec<T>, fuzzy: Vec<T>) -> Vec<T> {
    let seen: HashSet<String> = exact.iter().map(|entry| entry.name().into_owned()).collect();
    let mut combined = exact;
    for mut entry in fuzzy {
        if seen.contains(entry.name().as_ref()) {
            continue;
        }
        entry.mark_fuzzy();
        combined.push(entry);
    }
    combined
}
