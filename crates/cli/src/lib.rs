use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mealrec_catalog::TagManifest;
use mealrec_filter::UserProfile;
use mealrec_protocol::{
    serialize_json, serialize_json_pretty, ConstraintOverrides, ErrorEnvelope, FilterResponse,
    RecommendationRequest, RecommendationResponse,
};
use mealrec_recommend::{
    Collaborators, MemoryPersistenceSink, PersistenceSink, RecommendError, RecommendationService,
};
use mealrec_scoring::{GenerativeScoringService, HttpScoringService, LocalScoringService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod settings;
pub mod stores;

use stores::{FileManifestProvider, FileUserStore, JsonlPersistenceSink};

/// Exit code for a clean "no candidates" / "no recommendations" answer.
pub const EXIT_NO_RESULTS: i32 = 2;

#[derive(Parser)]
#[command(name = "mealrec")]
#[command(about = "Constraint-filtered, model-ranked meal recommendations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML config file (see RecommendConfig)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter the catalog against a profile and print the candidate pool
    Filter(FilterArgs),

    /// Run a full recommendation pass for one user
    Recommend(RecommendArgs),

    /// Print JSON schemas of the request and response types
    Schema(SchemaArgs),
}

#[derive(Args)]
struct CatalogArgs {
    /// Meal manifest JSON (archetypes -> meals -> tags)
    #[arg(long)]
    manifest: PathBuf,

    /// Tag dictionary JSON
    #[arg(long)]
    tags: PathBuf,
}

#[derive(Args)]
struct FilterArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Profile JSON ({"selected_tags": {...}, "disliked_tags": {...}})
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Constraint overrides as inline JSON
    #[arg(long)]
    overrides: Option<String>,

    /// Meal ids to exclude
    #[arg(long, value_delimiter = ',')]
    declined: Vec<String>,

    /// Maximum number of candidates to return
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct RecommendArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Users JSON keyed by user id ({"u1": {"profile": {...}, "feedback": {...}}})
    #[arg(long)]
    users: Option<PathBuf>,

    #[arg(long)]
    user: String,

    /// Full RecommendationRequest as inline JSON; flags below override its fields
    #[arg(long)]
    request: Option<String>,

    #[arg(long)]
    session: Option<String>,

    #[arg(long)]
    count: Option<usize>,

    /// Global scoring deadline; 0 waits for every archetype
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Append persisted results to this JSON-lines file
    #[arg(long)]
    persist: Option<PathBuf>,

    /// Score locally instead of calling the remote model
    #[arg(long)]
    offline: bool,

    /// Pause between the local scorer's streamed fragments
    #[arg(long, default_value_t = 0, requires = "offline")]
    offline_delay_ms: u64,

    /// Chat-completions endpoint (overrides MEALREC_SCORING_URL)
    #[arg(long)]
    scoring_url: Option<String>,

    /// Model name (overrides MEALREC_SCORING_MODEL)
    #[arg(long)]
    scoring_model: Option<String>,
}

#[derive(Args)]
struct SchemaArgs {
    #[arg(value_enum, default_value = "all")]
    target: SchemaTarget,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaTarget {
    All,
    FilterResponse,
    RecommendationRequest,
    RecommendationResponse,
    Error,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let code = match cli.command {
        Commands::Filter(ref args) => run_filter(&cli, args).await?,
        Commands::Recommend(ref args) => run_recommend(&cli, args).await?,
        Commands::Schema(ref args) => run_schema(args)?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serialize_json_pretty(value)?
    } else {
        serialize_json(value)?
    };
    println!("{out}");
    Ok(())
}

fn load_tags(path: &Path) -> Result<Arc<TagManifest>> {
    let tags = TagManifest::load(path)
        .with_context(|| format!("Failed to load tag dictionary {}", path.display()))?;
    Ok(Arc::new(tags))
}

fn build_service(
    cli: &Cli,
    catalog: &CatalogArgs,
    users: FileUserStore,
    scoring: Arc<dyn GenerativeScoringService>,
    sink: Arc<dyn PersistenceSink>,
) -> Result<RecommendationService> {
    let config = settings::load_config(cli.config.as_deref())?;
    let users = Arc::new(users);
    let collaborators = Collaborators {
        manifests: Arc::new(FileManifestProvider::new(&catalog.manifest)),
        profiles: users.clone(),
        feedback: users,
        scoring,
        sink,
    };
    RecommendationService::new(config, load_tags(&catalog.tags)?, collaborators)
        .context("Failed to build recommendation service")
}

async fn run_filter(cli: &Cli, args: &FilterArgs) -> Result<i32> {
    let profile: UserProfile = match &args.profile {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid profile {}", path.display()))?
        }
        None => UserProfile::default(),
    };
    let overrides: Option<ConstraintOverrides> = args
        .overrides
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("Invalid --overrides JSON")?;

    let service = build_service(
        cli,
        &args.catalog,
        FileUserStore::default(),
        Arc::new(LocalScoringService::new()),
        Arc::new(MemoryPersistenceSink::new()),
    )?;
    let response: FilterResponse = service
        .filter(&profile, overrides.as_ref(), &args.declined, args.limit)
        .await
        .context("Filter failed")?;
    print_json(&response, cli.pretty)?;
    Ok(0)
}

async fn run_recommend(cli: &Cli, args: &RecommendArgs) -> Result<i32> {
    let mut request: RecommendationRequest = match &args.request {
        Some(raw) => serde_json::from_str(raw).context("Invalid --request JSON")?,
        None => RecommendationRequest::default(),
    };
    if args.session.is_some() {
        request.session_id = args.session.clone();
    }
    if args.count.is_some() {
        request.count = args.count;
    }
    if args.deadline_ms.is_some() {
        request.deadline_ms = args.deadline_ms;
    }

    let users = match &args.users {
        Some(path) => FileUserStore::load(path)?,
        None => FileUserStore::default(),
    };
    let scoring: Arc<dyn GenerativeScoringService> = if args.offline {
        Arc::new(
            LocalScoringService::new().with_delay(Duration::from_millis(args.offline_delay_ms)),
        )
    } else {
        let config = settings::scoring_config(args.scoring_url.clone(), args.scoring_model.clone());
        log::info!("Scoring with {} at {}", config.model, config.url);
        Arc::new(HttpScoringService::new(config).context("Failed to build HTTP client")?)
    };
    let sink: Arc<dyn PersistenceSink> = match &args.persist {
        Some(path) => Arc::new(JsonlPersistenceSink::new(path)),
        None => Arc::new(MemoryPersistenceSink::new()),
    };

    let service = build_service(cli, &args.catalog, users, scoring, sink)?;
    let outcome = service.run_recommendation(&args.user, request).await;

    // Late archetypes still get persisted before the process exits.
    let reports = service.tracker().drain().await;
    if !reports.is_empty() {
        log::info!("Finalised {} background run(s)", reports.len());
    }

    match outcome {
        Ok(response) => {
            print_json(&response, cli.pretty)?;
            Ok(0)
        }
        Err(err) => {
            log::warn!("Recommendation failed: {err}");
            print_json(&err.to_envelope(), cli.pretty)?;
            Ok(match err {
                RecommendError::NoCandidates | RecommendError::NoRecommendations => {
                    EXIT_NO_RESULTS
                }
                _ => 1,
            })
        }
    }
}

fn run_schema(args: &SchemaArgs) -> Result<i32> {
    let schemas = match args.target {
        SchemaTarget::All => serde_json::json!({
            "filter_response": schemars::schema_for!(FilterResponse),
            "recommendation_request": schemars::schema_for!(RecommendationRequest),
            "recommendation_response": schemars::schema_for!(RecommendationResponse),
            "error": schemars::schema_for!(ErrorEnvelope),
        }),
        SchemaTarget::FilterResponse => serde_json::to_value(schemars::schema_for!(FilterResponse))?,
        SchemaTarget::RecommendationRequest => {
            serde_json::to_value(schemars::schema_for!(RecommendationRequest))?
        }
        SchemaTarget::RecommendationResponse => {
            serde_json::to_value(schemars::schema_for!(RecommendationResponse))?
        }
        SchemaTarget::Error => serde_json::to_value(schemars::schema_for!(ErrorEnvelope))?,
    };
    print_json(&schemas, true)?;
    Ok(0)
}
