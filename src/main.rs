//! CLI entry point for the semantic code-retrieval index.
//!
//! Provides commands for initializing an index, saving code units,
//! similarity search, and aggregate counts. Requests are JSON documents
//! read from a file or stdin; results are JSON on stdout.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use semcode::config::{CONFIG_FILE_NAME, EmbeddingProvider};
use semcode::error::{IndexError, SearchError};
use semcode::vector::VectorDimension;
use semcode::{
    BulkSaveRequest, EmbeddingGenerator, FastEmbedGenerator, HashingEmbeddingGenerator,
    PersistentUnitStore, SaveRequest, SearchQuery, Settings, SimilaritySearcher, UnitIndexer,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "semcode",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic code-retrieval index",
    long_about = "Index code units as embeddings and retrieve the most similar ones.",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to a custom semcode.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index directory and write a default configuration
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Save one code unit (JSON from FILE or stdin when omitted)
    Save {
        /// JSON request file; reads stdin when omitted or "-"
        input: Option<PathBuf>,
    },

    /// Save every method of a class in one batch
    SaveBatch {
        /// JSON request file; reads stdin when omitted or "-"
        input: Option<PathBuf>,
    },

    /// Find stored units similar to a code snippet
    Search {
        /// JSON query file; reads stdin when omitted or "-"
        input: Option<PathBuf>,

        /// Group results by class with constructor resolution
        #[arg(long)]
        grouped: bool,

        /// Maximum number of results, overriding the query and config
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Count indexed units
    Count {
        /// Only count units depending on the given class
        #[arg(long)]
        dependent_class: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Serialize)]
struct SaveResponse {
    status: semcode::SaveOutcome,
}

#[derive(Serialize)]
struct CountResponse {
    total_units: usize,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: String,
    status_code: &'a str,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Top-level CLI failure: the message plus the stable status code when the
/// error family defines one.
enum CliError {
    Index(IndexError),
    Search(SearchError),
    Other(String),
}

impl From<IndexError> for CliError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

impl From<SearchError> for CliError {
    fn from(e: SearchError) -> Self {
        Self::Search(e)
    }
}

impl From<semcode::StoreError> for CliError {
    fn from(e: semcode::StoreError) -> Self {
        Self::Index(IndexError::Store(e))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(format!("IO error: {e}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(format!("Invalid JSON request: {e}"))
    }
}

fn report_error(error: &CliError) {
    let response = match error {
        CliError::Index(e) => ErrorResponse {
            error: e.to_string(),
            status_code: e.status_code(),
        },
        CliError::Search(e) => ErrorResponse {
            error: e.to_string(),
            status_code: e.status_code(),
        },
        CliError::Other(message) => ErrorResponse {
            error: message.clone(),
            status_code: "ERROR",
        },
    };
    match serde_json::to_string(&response) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{}", response.error),
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(cli.config)?;

    match cli.command {
        Commands::Init { force } => init(&settings, force),
        Commands::Save { input } => {
            let request: SaveRequest = read_json_input(input)?;
            let indexer = build_indexer(&settings)?;
            let outcome = indexer.save_unit(request)?;
            print_json(&SaveResponse { status: outcome })
        }
        Commands::SaveBatch { input } => {
            let request: BulkSaveRequest = read_json_input(input)?;
            let indexer = build_indexer(&settings)?;
            let report = indexer.save_units(request)?;
            print_json(&report)
        }
        Commands::Search {
            input,
            grouped,
            limit,
        } => {
            let mut query: SearchQuery = read_json_input(input)?;
            if limit.is_some() {
                query.max_neighbours = limit;
            }
            let searcher = build_searcher(&settings)?;
            if grouped {
                print_json(&searcher.search_grouped(&query)?)
            } else {
                print_json(&searcher.search(&query)?)
            }
        }
        Commands::Count { dependent_class } => {
            let indexer = build_indexer(&settings)?;
            let total_units = indexer.count_units(dependent_class.as_deref())?;
            print_json(&CountResponse { total_units })
        }
        Commands::Config => {
            let toml = toml::to_string_pretty(&settings)
                .map_err(|e| CliError::Other(format!("Failed to render configuration: {e}")))?;
            print!("{toml}");
            Ok(())
        }
    }
}

fn init(settings: &Settings, force: bool) -> Result<(), CliError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        return Err(CliError::Other(format!(
            "{CONFIG_FILE_NAME} already exists. Use --force to overwrite"
        )));
    }

    settings.save(&config_path)?;
    open_store(settings)?;
    println!(
        "Initialized index at {} with configuration {}",
        settings.index_path.display(),
        config_path.display()
    );
    Ok(())
}

fn load_settings(config: Option<PathBuf>) -> Result<Settings, CliError> {
    let result = match config {
        Some(path) => Settings::load_from(&path),
        None => Settings::load(),
    };
    result.map_err(|e| CliError::Other(format!("Failed to load configuration: {e}")))
}

fn build_indexer(settings: &Settings) -> Result<UnitIndexer<PersistentUnitStore>, CliError> {
    let store = open_store(settings)?;
    let embeddings = build_generator(settings)?;
    Ok(UnitIndexer::with_config(
        store,
        embeddings,
        Box::new(semcode::unit::JavaMethodExtractor::new()),
        &settings.indexing,
    ))
}

fn build_searcher(
    settings: &Settings,
) -> Result<SimilaritySearcher<PersistentUnitStore>, CliError> {
    let store = open_store(settings)?;
    let embeddings = build_generator(settings)?;
    Ok(SimilaritySearcher::with_config(
        store,
        embeddings,
        settings.search.clone(),
    ))
}

fn open_store(settings: &Settings) -> Result<Arc<PersistentUnitStore>, CliError> {
    let dimension = VectorDimension::new(settings.embedding.dimension)
        .map_err(|e| CliError::Other(format!("Invalid embedding dimension: {e}")))?;
    let model_name = configured_model_name(settings);

    let store = PersistentUnitStore::open_or_create(&settings.index_path, dimension, &model_name)?;
    if store.model_name() != model_name {
        // Vectors from different models are not comparable
        warn!(
            "Index was built with model '{}' but '{}' is configured; results will be unreliable",
            store.model_name(),
            model_name
        );
    }
    Ok(Arc::new(store))
}

fn build_generator(settings: &Settings) -> Result<Arc<dyn EmbeddingGenerator>, CliError> {
    match settings.embedding.provider {
        EmbeddingProvider::Fastembed => {
            let generator = FastEmbedGenerator::with_progress(
                &settings.embedding.model,
                settings.model_cache_dir(),
                true,
            )
            .map_err(|e| CliError::Other(e.to_string()))?;
            Ok(Arc::new(generator))
        }
        EmbeddingProvider::Hashing => {
            let dimension = VectorDimension::new(settings.embedding.dimension)
                .map_err(|e| CliError::Other(format!("Invalid embedding dimension: {e}")))?;
            Ok(Arc::new(HashingEmbeddingGenerator::with_dimension(
                dimension,
            )))
        }
    }
}

fn configured_model_name(settings: &Settings) -> String {
    match settings.embedding.provider {
        EmbeddingProvider::Fastembed => settings.embedding.model.clone(),
        EmbeddingProvider::Hashing => "hashing".to_string(),
    }
}

fn read_json_input<T: DeserializeOwned>(input: Option<PathBuf>) -> Result<T, CliError> {
    let text = match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Other(format!("Failed to serialize response: {e}")))?;
    println!("{json}");
    Ok(())
}
