use std::io::{self, BufReader};
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use compendium_atlas::app::{App, BuildOptions, BuildResult, LogSink};
use compendium_atlas::config::{ConfigLoader, WorldMapLocation};
use compendium_atlas::error::AtlasError;
use compendium_atlas::output::{JsonOutput, read_search_list};
use compendium_atlas::record::{RecordClient, RecordHttpClient, StaticRecord};
use compendium_atlas::search::{
    DEFAULT_THRESHOLD, EntryKind, ProgressFn, SearchEntry, SearchSession, filter_by_kind, protocol,
};
use compendium_atlas::world::{WorldMapCache, WorldMapFile, WorldMapHttpClient, WorldMapSource};

#[derive(Parser)]
#[command(name = "compendium")]
#[command(about = "Aggregate a microbiome sample compendium into JSON artifacts and search them")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the aggregation pipeline and write all artifacts")]
    Build(BuildArgs),
    #[command(about = "Search the built entity list")]
    Search(SearchArgs),
    #[command(about = "Answer newline-delimited JSON search requests on stdin")]
    ServeSearch,
}

#[derive(Args)]
struct BuildArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    no_record: bool,

    #[arg(long)]
    pretty: bool,

    #[arg(long, help = "Re-download the world map instead of using the cache")]
    refresh: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    query: String,

    #[arg(long, default_value = "public")]
    dir: String,

    #[arg(long = "type", value_parser = parse_kind)]
    kinds: Vec<EntryKind>,

    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(long)]
    json: bool,
}

fn parse_kind(value: &str) -> Result<EntryKind, String> {
    let normalized = value.to_ascii_lowercase().replace(['-', '_', ' '], "");
    match normalized.as_str() {
        "project" => Ok(EntryKind::Project),
        "sample" => Ok(EntryKind::Sample),
        "phylum" => Ok(EntryKind::Phylum),
        "class" => Ok(EntryKind::Class),
        "country" => Ok(EntryKind::Country),
        "region" => Ok(EntryKind::Region),
        "tag" => Ok(EntryKind::Tag),
        "tagvalue" => Ok(EntryKind::TagValue),
        _ => Err(format!("unknown entry type: {value}")),
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(atlas) = report.downcast_ref::<AtlasError>() {
            return ExitCode::from(map_exit_code(atlas));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AtlasError) -> u8 {
    match error {
        AtlasError::MissingConfig | AtlasError::ConfigRead(_) | AtlasError::MissingInput(_) => 2,
        AtlasError::WorldMapHttp(_)
        | AtlasError::WorldMapStatus { .. }
        | AtlasError::RecordHttp(_)
        | AtlasError::RecordStatus { .. }
        | AtlasError::RecordParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => run_build(args),
        Commands::Search(args) => run_search(args),
        Commands::ServeSearch => {
            let input = BufReader::new(io::stdin());
            let mut output = io::stdout().lock();
            protocol::serve(input, &mut output)?;
            Ok(())
        }
    }
}

fn run_build(args: BuildArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;

    let world: Box<dyn WorldMapSource> = match &config.world_map {
        WorldMapLocation::Url(url) => Box::new(WorldMapHttpClient::new(url.clone())?),
        WorldMapLocation::File(path) => Box::new(WorldMapFile::new(path.clone())),
    };
    let mut skip_record = args.no_record;
    let record: Box<dyn RecordClient> = match &config.record_url {
        Some(url) if !skip_record => Box::new(RecordHttpClient::new(url.clone())?),
        _ => {
            if !skip_record {
                tracing::warn!("no record_url configured; provenance fields stay empty");
            }
            skip_record = true;
            Box::new(StaticRecord::default())
        }
    };
    let cache = match WorldMapCache::new() {
        Ok(cache) => Some(cache),
        Err(err) => {
            tracing::warn!("world map cache disabled: {err}");
            None
        }
    };

    let app = App::new(world, record, cache);
    let options = BuildOptions {
        skip_record,
        refresh_world: args.refresh,
        pretty: args.pretty,
    };
    let result = app.build(&config, &options, &LogSink)?;
    if args.json {
        JsonOutput::print_json(&result).into_diagnostic()?;
    } else {
        print_build_summary(&result);
    }
    Ok(())
}

fn print_build_summary(result: &BuildResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    let metadata = &result.metadata;
    println!("{cyan}compendium build ({} ms){reset}", result.elapsed_ms);
    println!(
        "{green}{} projects, {} samples, {} phyla, {} classes, {} countries, {} regions, {} tags{reset}",
        metadata.projects,
        metadata.samples,
        metadata.phyla,
        metadata.classes,
        metadata.countries,
        metadata.regions,
        metadata.tags
    );
    for artifact in &result.artifacts {
        println!("  {} ({} bytes)", artifact.path, artifact.bytes);
    }
}

fn run_search(args: SearchArgs) -> miette::Result<()> {
    let dir = Utf8PathBuf::from(&args.dir);
    let list = filter_by_kind(&read_search_list(&dir)?, &args.kinds);
    tracing::debug!(entries = list.len(), "loaded search list");

    let progress: ProgressFn = Arc::new(|status: &str| tracing::debug!("search: {status}"));
    let mut session = SearchSession::new(
        Arc::new(list),
        vec!["name".to_string(), "value".to_string()],
        args.threshold,
    )
    .with_progress(progress);
    session.submit(&args.query);
    let results = session.results().map_err(AtlasError::from)?;
    let matches: Vec<SearchEntry> = results.matches.into_iter().take(args.limit).collect();

    if args.json {
        JsonOutput::print_json(&matches).into_diagnostic()?;
        return Ok(());
    }
    if matches.is_empty() {
        println!("no matches for \"{}\"", results.query);
        return Ok(());
    }
    for entry in &matches {
        let kind = entry.kind.map(|kind| kind.as_str()).unwrap_or("");
        let label = match &entry.value {
            Some(value) => format!("{} = {}", entry.name, value),
            None => entry.name.clone(),
        };
        let marker = if entry.is_fuzzy() { " ~" } else { "" };
        println!("{label}\t{kind}\t{}{marker}", entry.samples);
    }
    Ok(())
}
