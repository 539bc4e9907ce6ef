use std::io::Cursor;
use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use compendium_atlas::search::protocol::serve;
use compendium_atlas::search::{
    CancelToken, EntryKind, SearchEntry, SearchError, SearchJob, SearchOp, SearchSession, combine,
    spawn,
};

fn phyla() -> Vec<SearchEntry> {
    ["Proteobacteria", "Firmicutes", "Bacteroidota", "Actinobacteriota"]
        .iter()
        .enumerate()
        .map(|(index, name)| SearchEntry::new(*name, EntryKind::Phylum, 10 - index as u64))
        .collect()
}

#[test]
fn session_combines_exact_then_fuzzy() {
    let mut session = SearchSession::new(Arc::new(phyla()), vec!["name".to_string()], 0.25);
    session.submit("bacteri");
    let results = session.results().unwrap();
    let names: Vec<&str> = results.matches.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["Proteobacteria", "Actinobacteriota", "Bacteroidota"]);
    let fuzzy: Vec<bool> = results.matches.iter().map(SearchEntry::is_fuzzy).collect();
    assert_eq!(fuzzy, vec![false, false, true]);
}

#[test]
fn combine_keeps_exact_order_and_flags_fuzzy() {
    let exact = vec![json!({"name": "X"})];
    let fuzzy = vec![json!({"name": "X"}), json!({"name": "Y"})];
    assert_eq!(
        combine(exact, fuzzy),
        vec![json!({"name": "X"}), json!({"name": "Y", "fuzzy": true})]
    );
}

#[test]
fn cancelled_search_never_resolves_with_matches() {
    let list: Vec<Value> = (0..100_000)
        .map(|index| json!({"name": format!("sample {index}")}))
        .collect();
    let token = CancelToken::new();
    let task = spawn(
        SearchJob {
            op: SearchOp::Fuzzy,
            list: Arc::new(list),
            keys: vec!["name".to_string()],
            query: "sample 4".to_string(),
            threshold: 0.25,
        },
        token.clone(),
        None,
    );
    token.cancel("Stale fuzzy search: sample 4");
    assert_matches!(
        task.wait(),
        Err(SearchError::Cancelled(reason)) if reason == "Stale fuzzy search: sample 4"
    );
}

#[test]
fn serves_requests_over_ndjson() {
    let requests = [
        json!({"id": "a", "op": "exact", "list": [{"name": "Firmicutes", "samples": 3}], "keys": ["name"], "query": "FIRMI"}),
        json!({"id": "b", "op": "fuzzy", "list": [{"name": "Firmicutes"}, {"name": "Archaea"}], "keys": ["name"], "query": "Firmicute"}),
    ];
    let input = requests
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    let mut output = Vec::new();
    serve(Cursor::new(input.into_bytes()), &mut output).unwrap();

    let mut responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    responses.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    assert_eq!(
        responses,
        vec![
            json!({"id": "a", "matches": [{"name": "Firmicutes", "samples": 3}]}),
            json!({"id": "b", "matches": [{"name": "Firmicutes"}]}),
        ]
    );
}
