use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AtlasError {
    #[error("missing config file compendium.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("world map request failed: {0}")]
    WorldMapHttp(String),

    #[error("world map source returned status {status}: {message}")]
    WorldMapStatus { status: u16, message: String },

    #[error("failed to parse world map: {0}")]
    WorldMapParse(String),

    #[error("failed to parse region lookup: {0}")]
    RegionLookupParse(String),

    #[error("record request failed: {0}")]
    RecordHttp(String),

    #[error("record API returned status {status}: {message}")]
    RecordStatus { status: u16, message: String },

    #[error("failed to parse record: {0}")]
    RecordParse(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("failed to serialize {0}")]
    Serialize(String),

    #[error("search cancelled: {0}")]
    Cancelled(String),

    #[error("search failed: {0}")]
    Search(String),
}
