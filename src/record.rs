use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::Provenance;
use crate::error::AtlasError;

/// Source of the dataset's published-record provenance.
pub trait RecordClient: Send + Sync {
    fn fetch_provenance(&self) -> Result<Provenance, AtlasError>;
}

impl<T: RecordClient + ?Sized> RecordClient for Box<T> {
    fn fetch_provenance(&self) -> Result<Provenance, AtlasError> {
        (**self).fetch_provenance()
    }
}

#[derive(Clone)]
pub struct RecordHttpClient {
    client: Client,
    url: String,
}

impl RecordHttpClient {
    pub fn new(url: impl Into<String>) -> Result<Self, AtlasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("compendium-atlas/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AtlasError::Filesystem(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AtlasError::RecordHttp(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RecordClient for RecordHttpClient {
    fn fetch_provenance(&self) -> Result<Provenance, AtlasError> {
        tracing::info!(url = %self.url, "fetching record provenance");
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| AtlasError::RecordHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "record request failed".to_string());
            return Err(AtlasError::RecordStatus { status, message });
        }
        let raw: Value = response
            .json()
            .map_err(|err| AtlasError::RecordParse(err.to_string()))?;
        parse_record(&raw)
    }
}

/// Record used when the lookup is skipped.
#[derive(Debug, Clone, Default)]
pub struct StaticRecord(pub Provenance);

impl RecordClient for StaticRecord {
    fn fetch_provenance(&self) -> Result<Provenance, AtlasError> {
        Ok(self.0.clone())
    }
}

fn text_at<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(raw, |value, key| value.get(*key))
        .and_then(Value::as_str)
}

fn count_at(raw: &Value, path: &[&str]) -> u64 {
    path.iter()
        .try_fold(raw, |value, key| value.get(*key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Extracts provenance from a Zenodo-style record document.
pub fn parse_record(raw: &Value) -> Result<Provenance, AtlasError> {
    if !raw.is_object() {
        return Err(AtlasError::RecordParse("record is not a JSON object".to_string()));
    }
    let size = raw
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|file| file.get("size").and_then(Value::as_u64))
                .sum::<u64>()
        })
        .unwrap_or(0);
    Ok(Provenance {
        version: text_at(raw, &["metadata", "version"])
            .unwrap_or_default()
            .to_string(),
        date: text_at(raw, &["metadata", "publication_date"])
            .unwrap_or_default()
            .to_string(),
        downloads: count_at(raw, &["stats", "downloads"]),
        views: count_at(raw, &["stats", "views"]),
        size,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_zenodo_record() {
        let raw = json!({
            "metadata": {"version": "v3", "publication_date": "2023-11-02"},
            "stats": {"downloads": 120, "views": 450},
            "files": [{"key": "a.csv.gz", "size": 1000}, {"key": "b.tsv.gz", "size": 24}]
        });
        let provenance = parse_record(&raw).unwrap();
        assert_eq!(provenance.version, "v3");
        assert_eq!(provenance.date, "2023-11-02");
        assert_eq!(provenance.downloads, 120);
        assert_eq!(provenance.views, 450);
        assert_eq!(provenance.size, 1024);
    }

    #[test]
    fn missing_fields_default() {
        let provenance = parse_record(&json!({})).unwrap();
        assert_eq!(provenance, Provenance::default());
    }

    #[test]
    fn rejects_non_object() {
        assert_matches!(parse_record(&json!([1, 2])), Err(AtlasError::RecordParse(_)));
    }
}
