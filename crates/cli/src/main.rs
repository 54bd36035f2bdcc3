mod commands;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pams_core::{
    config::LoggingConfig, load_config, load_config_from_env, validate_config, Config,
    EventNotifier, SqliteDatasetCatalog, SqliteTaskStore, TaskOrchestrator, TaskStatus,
};

/// Default config file, used when neither `--config` nor `PAMS_CONFIG` is set.
const DEFAULT_CONFIG_FILE: &str = "pams.toml";

#[derive(Debug, Parser)]
#[command(name = "pams", version, about = "Run analyses over registered genome datasets")]
struct Cli {
    /// Configuration file (falls back to PAMS_CONFIG, then pams.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage registered datasets
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// Submit an analysis and follow it until it finishes
    Submit {
        /// Analysis type, e.g. annotation, mlst, phylogeny
        analysis_type: String,

        /// Dataset ids to analyze
        #[arg(required = true)]
        dataset_ids: Vec<String>,

        /// Analyzer parameter as key=value (value parsed as JSON when possible)
        #[arg(short, long = "param", value_parser = commands::parse_param)]
        params: Vec<(String, serde_json::Value)>,

        /// Print Prometheus metrics to stderr when the task finishes
        #[arg(long)]
        metrics: bool,
    },

    /// List tasks, newest first
    Tasks {
        /// Only tasks with this status
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Maximum number of tasks to list
        #[arg(short, long, default_value_t = 100)]
        limit: i64,
    },

    /// Show one task as JSON
    Show {
        task_id: String,
    },

    /// Task counts by status
    Stats {
        /// Print in Prometheus text format instead of JSON
        #[arg(long)]
        metrics: bool,
    },
}

#[derive(Debug, Subcommand)]
enum DatasetCommand {
    /// Register a dataset
    Add {
        id: String,

        /// Display name (defaults to the id)
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        strain: Option<String>,

        /// Path to the assembly file
        #[arg(long)]
        file: Option<String>,
    },

    /// List registered datasets
    List,
}

/// Stores and orchestrator wired from one configuration.
pub struct App {
    pub catalog: Arc<SqliteDatasetCatalog>,
    pub orchestrator: TaskOrchestrator,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let db_path = &config.database.path;

        let task_store = Arc::new(
            SqliteTaskStore::new(db_path)
                .with_context(|| format!("Failed to open task store at {:?}", db_path))?,
        );
        info!("Task store initialized");

        let catalog = Arc::new(
            SqliteDatasetCatalog::new(db_path)
                .with_context(|| format!("Failed to open dataset catalog at {:?}", db_path))?,
        );
        info!("Dataset catalog initialized");

        let registry = config.analyzers.simulated_registry();
        info!(
            "Registered analyzers: {}",
            registry
                .types()
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let orchestrator = TaskOrchestrator::new(
            config.orchestrator.clone(),
            task_store,
            catalog.clone(),
            registry,
            config.output.root.clone(),
        )
        .with_notifier(EventNotifier::new(config.events.capacity));

        Ok(Self {
            catalog,
            orchestrator,
        })
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized yet.
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load(cli.config)?;
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config.logging);
    info!("Database path: {:?}", config.database.path);
    info!("Output root: {:?}", config.output.root);

    let app = App::new(config)?;

    match cli.command {
        Command::Dataset(DatasetCommand::Add {
            id,
            name,
            strain,
            file,
        }) => commands::add_dataset(&app, id, name, strain, file),
        Command::Dataset(DatasetCommand::List) => commands::list_datasets(&app),
        Command::Submit {
            analysis_type,
            dataset_ids,
            params,
            metrics,
        } => commands::submit(&app, analysis_type, dataset_ids, params, metrics).await,
        Command::Tasks { status, limit } => commands::list_tasks(&app, status, limit),
        Command::Show { task_id } => commands::show_task(&app, &task_id),
        Command::Stats { metrics } => commands::stats(&app, metrics),
    }
}

/// Resolve the config file and load it.
///
/// An explicitly named file must exist. Without one, a missing default file
/// means built-in defaults plus `PAMS_` environment overrides.
fn load(explicit: Option<PathBuf>) -> Result<Config> {
    let explicit = explicit.or_else(|| std::env::var("PAMS_CONFIG").ok().map(PathBuf::from));

    match explicit {
        Some(path) => load_config(&path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.exists() {
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))
            } else {
                load_config_from_env().context("Failed to load config from environment")
            }
        }
    }
}

/// Logs go to stderr; stdout carries command output.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
