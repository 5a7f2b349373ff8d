use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use locality_georef::config::GeoreferenceConfig;
use locality_georef::georeferencer::{process as process_record, CoordType, ExportedResult, Georeferencer, JobStatus, PlaceType};
use locality_georef::record::{Coordinates, Determination, HintField, LocalityRecord};
use locality_georef::server::{self, AppState};

/// georef: resolve specimen locality descriptions to a geometry, an
/// uncertainty radius and a citation.
///
/// Examples:
///   georef run --records specimens.json --output results.json
///   georef run --records specimens.json --workers 4 --limit 500
///   georef resolve "5 km N of Springfield" --state-province Illinois --country "United States"
///   georef serve --port 3000
#[derive(Parser)]
#[command(name = "georef", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to ~/.georef/config.json when present.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Georeference a batch of records (JSON array of objects).
    Run(RunArgs),
    /// Georeference a single locality description.
    Resolve(ResolveArgs),
    /// Serve the HTTP API.
    Serve(ServeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Input records: a JSON array of raw key/value objects.
    #[arg(long, short = 'r')]
    records: PathBuf,

    /// Write exported results here instead of stdout.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Worker threads for resolution.
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Job file used to resume interrupted batches.
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Record field holding the identifier.
    #[arg(long)]
    id_key: Option<String>,

    /// Attempt records with too little locality context.
    #[arg(long)]
    allow_sparse: bool,

    /// Drop out-of-range coordinates and resolve the description instead.
    #[arg(long)]
    allow_invalid_coords: bool,

    /// Only records whose coordinates are "marine" or "terrestrial".
    #[arg(long, value_parser = parse_coord_type)]
    coord_type: Option<CoordType>,

    /// Only records whose coordinates were "georeferenced" or "measured".
    #[arg(long, value_parser = parse_place_type)]
    place_type: Option<PlaceType>,

    /// Leave records without coordinates out of the batch.
    #[arg(long)]
    require_coords: bool,

    /// Leave failed records out of the exported results.
    #[arg(long)]
    exclude_failed: bool,

    /// Eligible records to pass over before processing.
    #[arg(long)]
    skip: Option<usize>,

    /// Records to process in this run.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct ResolveArgs {
    /// Verbatim locality text, e.g. "5 km N of Springfield".
    text: String,

    #[arg(long)]
    municipality: Option<String>,

    #[arg(long)]
    county: Option<String>,

    #[arg(long)]
    state_province: Option<String>,

    #[arg(long)]
    country: Option<String>,

    #[arg(long)]
    continent: Option<String>,

    #[arg(long)]
    water_body: Option<String>,

    #[arg(long)]
    ocean: Option<String>,

    /// Existing latitude (-90 to 90).
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Existing longitude (-180 to 180).
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Declared coordinate uncertainty in meters.
    #[arg(long)]
    precision_m: Option<f64>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, short = 'p', default_value_t = 3000)]
    port: u16,
}

fn parse_coord_type(s: &str) -> Result<CoordType, String> {
    s.parse()
}

fn parse_place_type(s: &str) -> Result<PlaceType, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = GeoreferenceConfig::load(cli.config.as_deref()).unwrap_or_else(|e| fail(e));

    match cli.command {
        Command::Run(args) => {
            apply_overrides(&mut config, &args);
            run_batch(&config, &args);
        }
        Command::Resolve(args) => resolve_one(&config, &args),
        Command::Serve(args) => serve(&config, &args),
    }
}

fn init_tracing(verbose: u8) {
    let result = if std::env::var_os("RUST_LOG").is_some() {
        fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        let level = match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };
    if result.is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", err);
    process::exit(1);
}

fn apply_overrides(config: &mut GeoreferenceConfig, args: &RunArgs) {
    let policy = &mut config.policy;
    if let Some(id_key) = &args.id_key {
        policy.id_key = id_key.clone();
    }
    policy.allow_sparse |= args.allow_sparse;
    policy.allow_invalid_coords |= args.allow_invalid_coords;
    policy.require_coords |= args.require_coords;
    if args.exclude_failed {
        policy.include_failed = false;
    }
    if let Some(coord_type) = args.coord_type {
        policy.coord_type = coord_type;
    }
    if let Some(place_type) = args.place_type {
        policy.place_type = place_type;
    }
    if let Some(skip) = args.skip {
        policy.skip = skip;
    }
    if args.limit.is_some() {
        policy.limit = args.limit;
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            fail("--workers must be at least 1");
        }
        config.workers = workers;
    }
    if let Some(jobs) = &args.jobs {
        config.jobs_path = Some(jobs.clone());
    }
}

fn read_records(path: &Path, id_key: &str) -> Vec<LocalityRecord> {
    let data = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read {}: {}", path.display(), e)));
    let rows: Vec<Map<String, Value>> = serde_json::from_str(&data)
        .unwrap_or_else(|e| fail(format!("{} is not a JSON array of objects: {}", path.display(), e)));
    rows.iter()
        .enumerate()
        .map(|(n, row)| LocalityRecord::from_raw(row, id_key, n))
        .collect()
}

// ── run ─────────────────────────────────────────────────────────

fn run_batch(config: &GeoreferenceConfig, args: &RunArgs) {
    let records = read_records(&args.records, &config.policy.id_key);
    let chain = config.build_chain().unwrap_or_else(|e| fail(e));
    let jobs = config.open_jobs().unwrap_or_else(|e| fail(e));

    let mut georeferencer = Georeferencer::new(Arc::new(chain), config.policy.clone(), jobs);
    let summary = if config.workers > 1 {
        georeferencer.georeference_parallel(&records, config.workers)
    } else {
        georeferencer.georeference(&records)
    }
    .unwrap_or_else(|e| fail(format!("cannot write job file: {}", e)));

    eprintln!(
        "  {} matched, {} exhausted, {} skipped, {} already done",
        summary.matched, summary.exhausted, summary.skipped, summary.resumed
    );

    if let Some(cache) = georeferencer.chain().context().index().cache() {
        if let Err(e) = cache.flush() {
            tracing::warn!("cannot persist result cache: {}", e);
        }
    }

    let exported = georeferencer.export();
    let json = serde_json::to_string_pretty(&exported).unwrap_or_else(|e| fail(e));
    match &args.output {
        Some(path) => {
            fs::write(path, json).unwrap_or_else(|e| fail(format!("cannot write {}: {}", path.display(), e)));
            eprintln!("  {} result(s) written to {}", exported.len(), path.display());
        }
        None => println!("{}", json),
    }
}

// ── resolve ─────────────────────────────────────────────────────

fn resolve_one(config: &GeoreferenceConfig, args: &ResolveArgs) {
    let mut record = LocalityRecord::new("cli", args.text.trim());
    let hints = [
        (HintField::Municipality, &args.municipality),
        (HintField::County, &args.county),
        (HintField::StateProvince, &args.state_province),
        (HintField::Country, &args.country),
        (HintField::Continent, &args.continent),
        (HintField::WaterBody, &args.water_body),
        (HintField::Ocean, &args.ocean),
    ];
    for (field, value) in hints {
        if let Some(value) = value {
            record = record.with_hint(field, value.clone());
        }
    }
    match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => {
            record = record.with_coordinates(Coordinates {
                lat,
                lon,
                determination: Determination::Unknown,
                precision_m: args.precision_m,
                datum: None,
            });
        }
        (None, None) => {}
        _ => fail("provide both --lat and --lon"),
    }

    let chain = config.build_chain().unwrap_or_else(|e| fail(e));
    let entry = process_record(&chain, &config.policy, &record, 0);
    if let Some(cache) = chain.context().index().cache() {
        if let Err(e) = cache.flush() {
            tracing::warn!("cannot persist result cache: {}", e);
        }
    }

    let exported = ExportedResult::from(&entry);
    let json = serde_json::to_string_pretty(&exported).unwrap_or_else(|e| fail(e));
    println!("{}", json);
    if entry.status != JobStatus::Matched {
        process::exit(1);
    }
}

// ── serve ───────────────────────────────────────────────────────

fn serve(config: &GeoreferenceConfig, args: &ServeArgs) {
    let chain = config.build_chain().unwrap_or_else(|e| fail(e));
    let state = AppState {
        chain: Arc::new(chain),
        policy: config.policy.clone(),
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("cannot start runtime: {}", e)));
    if let Err(e) = runtime.block_on(server::start(&args.host, args.port, state)) {
        fail(format!("server stopped: {}", e));
    }
}
