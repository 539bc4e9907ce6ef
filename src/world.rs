use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{GeoFeature, GeoProperties};
use crate::error::AtlasError;

/// https://www.naturalearthdata.com/downloads/110m-cultural-vectors/
pub const NATURAL_EARTH_URL: &str =
    "https://rawgit.com/nvkelso/natural-earth-vector/master/geojson/ne_110m_admin_0_countries.geojson";

const NULL_SENTINEL: &str = "-99";
const CODE_KEYS: [&str; 4] = ["ISO_A2_EH", "ISO_A2", "ADM0_ISO", "ADM0_A3"];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}']+").unwrap());

/// Static country code to region table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionLookup(BTreeMap<String, String>);

impl RegionLookup {
    pub fn load(path: &Path) -> Result<Self, AtlasError> {
        if !path.exists() {
            return Err(AtlasError::MissingInput(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)
            .map_err(|err| AtlasError::Filesystem(format!("read {}: {err}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AtlasError> {
        let raw: BTreeMap<String, JsonValue> = serde_json::from_str(content)
            .map_err(|err| AtlasError::RegionLookupParse(err.to_string()))?;
        let table = raw
            .into_iter()
            .filter_map(|(code, region)| {
                region
                    .as_str()
                    .map(|region| (code.trim().to_uppercase(), region.trim().to_string()))
            })
            .collect();
        Ok(Self(table))
    }

    pub fn region(&self, code: &str) -> &str {
        self.0.get(code).map(String::as_str).unwrap_or("")
    }
}

impl FromIterator<(String, String)> for RegionLookup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(code, region)| (code.to_uppercase(), region))
                .collect(),
        )
    }
}

fn clean(value: Option<&JsonValue>) -> &str {
    match value {
        Some(JsonValue::String(value)) if value.trim() != NULL_SENTINEL => value.trim(),
        _ => "",
    }
}

/// Title-cases words split on punctuation, whitespace and lower-to-upper
/// case changes ("fooBar-baz" becomes "Foo Bar Baz").
pub fn start_case(value: &str) -> String {
    let mut words = Vec::new();
    for token in WORD.find_iter(value) {
        let mut word = String::new();
        let mut previous_lower = false;
        for ch in token.as_str().chars() {
            if ch.is_uppercase() && previous_lower && !word.is_empty() {
                words.push(std::mem::take(&mut word));
            }
            previous_lower = ch.is_lowercase() || ch.is_numeric();
            word.push(ch);
        }
        if !word.is_empty() {
            words.push(word);
        }
    }
    words
        .into_iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Replaces dataset-specific map properties with `{region, country, code,
/// samples: 0}`. Applying it to its own output yields the same properties.
pub fn normalize_properties(properties: &JsonObject, lookup: &RegionLookup) -> GeoProperties {
    let code = CODE_KEYS
        .iter()
        .map(|key| clean(properties.get(*key)))
        .chain(std::iter::once(clean(properties.get("code"))))
        .find(|value| !value.is_empty())
        .unwrap_or("")
        .to_uppercase();
    let name = match clean(properties.get("NAME")) {
        "" => clean(properties.get("country")),
        name => name,
    };
    let region = lookup.region(&code).to_string();
    GeoProperties {
        region,
        country: start_case(name),
        code,
        samples: 0,
    }
}

pub fn normalize_collection(
    collection: FeatureCollection,
    lookup: &RegionLookup,
) -> Result<Vec<GeoFeature>, AtlasError> {
    let empty = JsonObject::new();
    collection
        .features
        .into_iter()
        .map(|feature| {
            let properties =
                normalize_properties(feature.properties.as_ref().unwrap_or(&empty), lookup);
            let geometry = feature
                .geometry
                .map(Geometry::<f64>::try_from)
                .transpose()
                .map_err(|err| AtlasError::WorldMapParse(err.to_string()))?;
            Ok(GeoFeature {
                properties,
                geometry,
            })
        })
        .collect()
}

pub fn parse_collection(text: &str) -> Result<FeatureCollection, AtlasError> {
    let geojson = text
        .parse::<GeoJson>()
        .map_err(|err| AtlasError::WorldMapParse(err.to_string()))?;
    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(AtlasError::WorldMapParse(
            "expected a feature collection, found a bare geometry".to_string(),
        )),
    }
}

pub fn to_collection(features: &[GeoFeature]) -> Result<FeatureCollection, AtlasError> {
    let features = features
        .iter()
        .map(|feature| {
            let properties = match serde_json::to_value(&feature.properties)
                .map_err(|err| AtlasError::Serialize(err.to_string()))?
            {
                JsonValue::Object(map) => map,
                _ => JsonObject::new(),
            };
            Ok(Feature {
                bbox: None,
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, AtlasError>>()?;
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub trait WorldMapSource: Send + Sync {
    /// Raw GeoJSON text of the world map.
    fn fetch_world_map(&self) -> Result<String, AtlasError>;

    /// Stable identifier used as the cache key.
    fn key(&self) -> String;
}

impl<T: WorldMapSource + ?Sized> WorldMapSource for Box<T> {
    fn fetch_world_map(&self) -> Result<String, AtlasError> {
        (**self).fetch_world_map()
    }

    fn key(&self) -> String {
        (**self).key()
    }
}

#[derive(Clone)]
pub struct WorldMapHttpClient {
    client: Client,
    url: String,
}

impl WorldMapHttpClient {
    pub fn new(url: impl Into<String>) -> Result<Self, AtlasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("compendium-atlas/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AtlasError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| AtlasError::WorldMapHttp(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl WorldMapSource for WorldMapHttpClient {
    fn fetch_world_map(&self) -> Result<String, AtlasError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| AtlasError::WorldMapHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "world map request failed".to_string());
            return Err(AtlasError::WorldMapStatus { status, message });
        }
        response
            .text()
            .map_err(|err| AtlasError::WorldMapHttp(err.to_string()))
    }

    fn key(&self) -> String {
        self.url.clone()
    }
}

#[derive(Debug, Clone)]
pub struct WorldMapFile {
    path: Utf8PathBuf,
}

impl WorldMapFile {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl WorldMapSource for WorldMapFile {
    fn fetch_world_map(&self) -> Result<String, AtlasError> {
        if !self.path.as_std_path().exists() {
            return Err(AtlasError::MissingInput(self.path.clone().into_std_path_buf()));
        }
        fs::read_to_string(self.path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(format!("read {}: {err}", self.path)))
    }

    fn key(&self) -> String {
        self.path.to_string()
    }
}

/// On-disk cache of normalized world maps, one GeoJSON file per source.
#[derive(Debug, Clone)]
pub struct WorldMapCache {
    root: Utf8PathBuf,
}

impl WorldMapCache {
    pub fn new() -> Result<Self, AtlasError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.cache_dir().join("compendium-atlas").join("world"))
                    .ok()
            })
            .ok_or_else(|| {
                AtlasError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Utf8PathBuf {
        let name: String = key
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '.' { ch } else { '_' })
            .collect();
        let name = name.trim_start_matches(['.', '_']);
        self.root.join(format!("{name}.normalized.json"))
    }

    pub fn load(&self, key: &str) -> Option<Vec<GeoFeature>> {
        let path = self.path_for(key);
        let text = fs::read_to_string(path.as_std_path()).ok()?;
        let collection = parse_collection(&text).ok()?;
        collection
            .features
            .into_iter()
            .map(|feature| {
                let properties: GeoProperties =
                    serde_json::from_value(JsonValue::Object(feature.properties?)).ok()?;
                let geometry = match feature.geometry {
                    Some(geometry) => Some(Geometry::<f64>::try_from(geometry).ok()?),
                    None => None,
                };
                Some(GeoFeature {
                    properties,
                    geometry,
                })
            })
            .collect()
    }

    pub fn store(&self, key: &str, features: &[GeoFeature]) -> Result<(), AtlasError> {
        let collection = to_collection(features)?;
        let bytes = serde_json::to_vec(&collection)
            .map_err(|err| AtlasError::Serialize(err.to_string()))?;
        crate::output::write_atomic(&self.path_for(key), &bytes)
    }
}

/// Loads and normalizes the world map, reusing the cache unless `refresh`.
pub fn load_world_map(
    source: &dyn WorldMapSource,
    lookup: &RegionLookup,
    cache: Option<&WorldMapCache>,
    refresh: bool,
) -> Result<Vec<GeoFeature>, AtlasError> {
    let key = source.key();
    if let Some(cache) = cache.filter(|_| !refresh) {
        if let Some(features) = cache.load(&key) {
            tracing::info!(features = features.len(), "using cached world map");
            return Ok(features);
        }
    }
    let text = source.fetch_world_map()?;
    let features = normalize_collection(parse_collection(&text)?, lookup)?;
    if let Some(cache) = cache {
        if let Err(err) = cache.store(&key, &features) {
            tracing::warn!("failed to cache world map: {err}");
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn props(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn lookup() -> RegionLookup {
        [("FR".to_string(), "Europe".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn start_case_words() {
        assert_eq!(start_case("united states of america"), "United States Of America");
        assert_eq!(start_case("--foo-bar--"), "Foo Bar");
        assert_eq!(start_case("fooBar"), "Foo Bar");
        assert_eq!(start_case("FRANCE"), "FRANCE");
        assert_eq!(start_case("Côte d'Ivoire"), "Côte D'Ivoire");
        assert_eq!(start_case(""), "");
    }

    #[test]
    fn code_skips_sentinels() {
        let properties = props(json!({
            "ISO_A2_EH": "-99",
            "ISO_A2": "-99",
            "ADM0_ISO": "fr",
            "NAME": "france",
        }));
        let normalized = normalize_properties(&properties, &lookup());
        assert_eq!(normalized.code, "FR");
        assert_eq!(normalized.country, "France");
        assert_eq!(normalized.region, "Europe");
        assert_eq!(normalized.samples, 0);
    }

    #[test]
    fn unknown_code_has_empty_region() {
        let properties = props(json!({"ADM0_A3": "KOS", "NAME": "Kosovo", "ISO_A2": 5}));
        let normalized = normalize_properties(&properties, &lookup());
        assert_eq!(normalized.code, "KOS");
        assert_eq!(normalized.region, "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = props(json!({"ISO_A2": "fr", "NAME": "france", "POP_EST": 1}));
        let once = normalize_properties(&raw, &lookup());
        let again_raw = match serde_json::to_value(&once).unwrap() {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        };
        let twice = normalize_properties(&again_raw, &lookup());
        assert_eq!(once, twice);
    }

    #[test]
    fn collection_round_trips_geometry() {
        let text = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"ISO_A2": "FR", "NAME": "France"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
            }]
        })
        .to_string();
        let features = normalize_collection(parse_collection(&text).unwrap(), &lookup()).unwrap();
        assert_eq!(features.len(), 1);
        assert!(matches!(features[0].geometry, Some(Geometry::Polygon(_))));

        let collection = to_collection(&features).unwrap();
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["features"][0]["properties"]["region"], "Europe");
        assert_eq!(value["features"][0]["geometry"]["type"], "Polygon");
    }

    #[test]
    fn cache_keeps_regions() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let cache = WorldMapCache::new_with_root(root);
        let features = vec![GeoFeature {
            properties: GeoProperties {
                region: "Europe".to_string(),
                country: "France".to_string(),
                code: "FR".to_string(),
                samples: 0,
            },
            geometry: None,
        }];
        cache.store("https://example.org/world.geojson", &features).unwrap();
        let loaded = cache.load("https://example.org/world.geojson").unwrap();
        assert_eq!(loaded, features);
        assert!(cache.load("other").is_none());
    }
}
