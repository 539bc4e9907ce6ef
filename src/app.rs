use std::fs;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::aggregate::{Aggregates, Aggregator};
use crate::config::ResolvedConfig;
use crate::dissolve::PolygonUnion;
use crate::domain::{Metadata, Provenance};
use crate::error::AtlasError;
use crate::metadata::derive_metadata;
use crate::output::{Artifact, ArtifactWriter};
use crate::record::RecordClient;
use crate::search::search_list;
use crate::stream::FileRowStream;
use crate::world::{RegionLookup, WorldMapCache, WorldMapSource, load_world_map};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Skip the external record lookup; provenance fields stay empty.
    pub skip_record: bool,
    /// Re-download the world map even when a cached copy exists.
    pub refresh_world: bool,
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub output_dir: String,
    pub artifacts: Vec<Artifact>,
    pub metadata: Metadata,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct App<W: WorldMapSource, R: RecordClient> {
    world: W,
    record: R,
    cache: Option<WorldMapCache>,
}

impl<W: WorldMapSource, R: RecordClient> App<W, R> {
    pub fn new(world: W, record: R, cache: Option<WorldMapCache>) -> Self {
        Self {
            world,
            record,
            cache,
        }
    }

    /// Runs the whole pipeline: world map, one aggregation pass, provenance,
    /// then every artifact into the output directory.
    pub fn build(
        &self,
        config: &ResolvedConfig,
        options: &BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, AtlasError> {
        let started = Instant::now();
        let (aggregates, provenance) = self.aggregate(config, options, sink)?;

        let uncompressed = input_bytes(config)?;
        let metadata = derive_metadata(&aggregates, &provenance, uncompressed);
        let list = search_list(&aggregates);

        emit(sink, format!("phase=Write; artifacts to {}", config.output_dir), None);
        let writer = ArtifactWriter::new(config.output_dir.clone(), options.pretty);
        let artifacts = writer.write_all(&aggregates, &metadata, &list)?;

        let elapsed = started.elapsed();
        emit(sink, "phase=Done; build complete".to_string(), Some(elapsed));
        Ok(BuildResult {
            output_dir: config.output_dir.to_string(),
            artifacts,
            metadata,
            elapsed_ms: elapsed.as_millis(),
        })
    }

    /// Everything up to writing: aggregate tables plus provenance.
    pub fn aggregate(
        &self,
        config: &ResolvedConfig,
        options: &BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<(Aggregates, Provenance), AtlasError> {
        emit(sink, format!("phase=Resolve; region lookup {}", config.region_lookup), None);
        let lookup = RegionLookup::load(config.region_lookup.as_std_path())?;

        emit(sink, format!("phase=World; loading {}", self.world.key()), None);
        let started = Instant::now();
        let world = load_world_map(&self.world, &lookup, self.cache.as_ref(), options.refresh_world)?;
        emit(
            sink,
            format!("phase=World; {} features", world.len()),
            Some(started.elapsed()),
        );

        let taxonomic = FileRowStream::open(config.taxonomic.as_std_path())?;
        let samples = FileRowStream::open(config.samples.as_std_path())?;
        let tags = config
            .tags
            .as_ref()
            .map(|path| FileRowStream::open(path.as_std_path()))
            .transpose()?;

        emit(sink, format!("phase=Aggregate; streaming {}", config.taxonomic), None);
        let started = Instant::now();
        let dissolver = PolygonUnion;
        let aggregates = Aggregator::new(config.aggregate.clone(), &dissolver)
            .run(taxonomic, samples, &world, tags);
        emit(
            sink,
            format!(
                "phase=Aggregate; {} projects, {} phyla, {} classes",
                aggregates.by_project.len(),
                aggregates.by_phylum.len(),
                aggregates.by_class.len()
            ),
            Some(started.elapsed()),
        );

        let provenance = if options.skip_record {
            emit(sink, "phase=Record; skipped".to_string(), None);
            Provenance::default()
        } else {
            emit(sink, "phase=Record; fetching provenance".to_string(), None);
            self.record.fetch_provenance()?
        };
        Ok((aggregates, provenance))
    }
}

fn emit(sink: &dyn ProgressSink, message: String, elapsed: Option<Duration>) {
    sink.event(ProgressEvent { message, elapsed });
}

fn input_bytes(config: &ResolvedConfig) -> Result<u64, AtlasError> {
    config.inputs().into_iter().try_fold(0u64, |total, path| {
        let meta = fs::metadata(path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(format!("stat {path}: {err}")))?;
        Ok(total + meta.len())
    })
}
