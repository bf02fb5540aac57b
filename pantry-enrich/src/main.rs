//! pantry-enrich - ingredient resolution and enrichment CLI
//!
//! Startup follows the shared pantry sequence: resolve the root folder,
//! make sure it exists, open (or create) the database, then run one
//! subcommand. Results are printed to stdout as JSON; logs go to stderr.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pantry_common::config::{read_startup_config, RootFolderInitializer, RootFolderResolver, TomlConfig};
use pantry_common::models::RecordSource;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pantry_enrich::config::{resolve_enrichment_parameters, validate_setting, ParameterOverrides};
use pantry_enrich::enrichment::{checkpoint, CheckpointStore};
use pantry_enrich::{enrich, import_reference, EnrichOptions, EnrichmentContext, Normalizer, ReferenceData};

/// Command-line arguments for pantry-enrich
#[derive(Parser, Debug)]
#[command(name = "pantry-enrich")]
#[command(about = "Canonical ingredient resolution, allergen tagging and batch enrichment")]
#[command(version)]
struct Cli {
    /// Root folder holding pantry.db
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Database file (overrides <root-folder>/pantry.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// TOML config file (default: ~/.config/pantry/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import curated reference data (built-in file unless one is given)
    ImportReference {
        file: Option<PathBuf>,
        /// Import even if the stored version is the same or newer
        #[arg(long)]
        force: bool,
    },

    /// Enrich a record table in resumable batches
    Enrich(EnrichArgs),

    /// Resolve free text to a canonical ingredient
    Resolve {
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Tag allergens in free text
    Tag {
        #[arg(required = true)]
        text: Vec<String>,
        /// Allergens already known (comma-separated)
        #[arg(long, value_delimiter = ',')]
        existing: Vec<String>,
    },

    /// List substitutes of a canonical ingredient
    Substitutes {
        canonical: String,
        /// Allergens to avoid (comma-separated)
        #[arg(long, value_delimiter = ',')]
        avoid: Vec<String>,
    },

    /// Map messy text (or a record's description) to a canonical, tier corrected
    Correct {
        canonical: String,
        #[arg(long, conflicts_with = "record", required_unless_present = "record")]
        text: Option<String>,
        #[arg(long)]
        record: Option<i64>,
        #[arg(long, default_value = "catalog")]
        source: RecordSource,
    },

    /// Inspect or clear enrichment checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Inspect or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Args, Debug)]
struct EnrichArgs {
    /// Record table to enrich: catalog or recipes
    #[arg(long, default_value = "catalog")]
    source: RecordSource,
    /// Checkpoint job name (default: enrich-<source>)
    #[arg(long)]
    job: Option<String>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    similarity_threshold: Option<f64>,
    #[arg(long)]
    min_key_length: Option<usize>,
    /// Create canonical ingredients for unmatched names (true/false)
    #[arg(long)]
    create_missing: Option<bool>,
    /// Ignore existing checkpoints and start from the first record
    #[arg(long)]
    restart: bool,
    /// Stop each worker after this many batches
    #[arg(long)]
    max_batches: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// Show checkpoints (all jobs unless one is named)
    Show { job: Option<String> },
    /// Delete a job's checkpoints
    Reset { job: String },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

#[derive(Serialize)]
struct ResolveOutput {
    text: String,
    key: String,
    #[serde(flatten)]
    resolution: pantry_enrich::Resolution,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn init_tracing(toml_config: &TomlConfig) {
    let fallback = if toml_config.logging.level.trim().is_empty() {
        "pantry_enrich=info,pantry_common=info".to_string()
    } else {
        toml_config.logging.level.clone()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open_database(cli: &Cli, toml_config: &TomlConfig) -> Result<SqlitePool> {
    // Step 1: Resolve root folder
    let root_folder = RootFolderResolver::new("pantry-enrich")
        .with_cli_arg(cli.root_folder.clone())
        .with_toml_config(toml_config.clone())
        .resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 3: Open or create database
    let db_path = cli.database.clone().unwrap_or_else(|| initializer.database_path());
    info!("Database: {}", db_path.display());
    pantry_common::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

async fn load_context(pool: &SqlitePool, toml_config: &TomlConfig, overrides: &ParameterOverrides) -> Result<EnrichmentContext> {
    let params = resolve_enrichment_parameters(pool, toml_config, overrides)
        .await
        .context("Failed to resolve enrichment parameters")?;
    let normalizer = Normalizer::with_boilerplate(&toml_config.boilerplate_tokens);
    EnrichmentContext::load(pool, normalizer, params)
        .await
        .context("Failed to load reference data")
}

fn label_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (toml_config, config_source) = read_startup_config(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;
    init_tracing(&toml_config);
    config_source.log();

    let pool = open_database(&cli, &toml_config).await?;

    match cli.command {
        Command::ImportReference { file, force } => {
            let data = match &file {
                Some(path) => ReferenceData::from_file(path)
                    .with_context(|| format!("Failed to read reference data {}", path.display()))?,
                None => ReferenceData::builtin().context("Built-in reference data is invalid")?,
            };
            let summary = import_reference(&pool, &data, force)
                .await
                .context("Reference import failed")?;
            print_json(&summary)?;
        }

        Command::Enrich(args) => {
            let overrides = ParameterOverrides {
                batch_size: args.batch_size,
                workers: args.workers,
                similarity_threshold: args.similarity_threshold,
                min_key_length: args.min_key_length,
                create_missing_canonicals: args.create_missing,
            };
            let ctx = load_context(&pool, &toml_config, &overrides).await?;

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                signal_token.cancel();
            });

            let mut options = EnrichOptions::new(args.source);
            if let Some(job) = args.job {
                options.job_name = job;
            }
            options.restart = args.restart;
            options.max_batches = args.max_batches;
            options.cancel = cancel;

            let report = enrich(&pool, &ctx, options).await.context("Enrichment failed")?;
            if !report.completed {
                warn!(job = %report.job_name, "Run incomplete; rerun the same job to resume");
            }
            print_json(&report)?;
        }

        Command::Resolve { text } => {
            let text = text.join(" ");
            let mut ctx = load_context(&pool, &toml_config, &ParameterOverrides::default()).await?;
            let key = ctx.normalizer().normalize(&text);
            let resolution = ctx.resolve_text(&pool, &text).await.context("Resolution failed")?;
            print_json(&ResolveOutput { text, key, resolution })?;
        }

        Command::Tag { text, existing } => {
            let ctx = load_context(&pool, &toml_config, &ParameterOverrides::default()).await?;
            let tags = ctx.tag_allergens(&text.join(" "), &label_set(&existing));
            print_json(&tags)?;
        }

        Command::Substitutes { canonical, avoid } => {
            let ctx = load_context(&pool, &toml_config, &ParameterOverrides::default()).await?;
            let substitutes = ctx
                .find_substitutes(&pool, &canonical, &label_set(&avoid))
                .await
                .with_context(|| format!("Failed to list substitutes of '{}'", canonical))?;
            print_json(&substitutes)?;
        }

        Command::Correct { canonical, text, record, source } => {
            let mut ctx = load_context(&pool, &toml_config, &ParameterOverrides::default()).await?;
            let resolution = match (record, text) {
                (Some(id), _) => ctx
                    .apply_correction(&pool, source, id, &canonical)
                    .await
                    .with_context(|| format!("Failed to correct {} record {}", source, id))?,
                (None, Some(text)) => ctx
                    .correct_text(&pool, &text, &canonical)
                    .await
                    .with_context(|| format!("Failed to correct '{}'", text))?,
                (None, None) => bail!("Either --text or --record is required"),
            };
            print_json(&resolution)?;
        }

        Command::Checkpoint { action } => match action {
            CheckpointAction::Show { job } => match job {
                Some(job) => print_json(&CheckpointStore::new(pool.clone(), job).list().await?)?,
                None => {
                    let rows = checkpoint::list_all(&pool).await?;
                    let rows: Vec<serde_json::Value> = rows
                        .into_iter()
                        .map(|r| {
                            serde_json::json!({
                                "job_name": r.job_name,
                                "partition_index": r.partition_index,
                                "partition_count": r.partition_count,
                                "last_id": r.last_id,
                                "counters": serde_json::from_str::<serde_json::Value>(&r.counters)
                                    .unwrap_or(serde_json::Value::String(r.counters.clone())),
                                "updated_at": r.updated_at,
                            })
                        })
                        .collect();
                    print_json(&rows)?;
                }
            },
            CheckpointAction::Reset { job } => {
                let removed = CheckpointStore::new(pool.clone(), job.clone()).reset().await?;
                print_json(&serde_json::json!({ "job_name": job, "removed": removed }))?;
            }
        },

        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let settings: serde_json::Map<String, serde_json::Value> = pantry_common::db::list_settings(&pool)
                    .await?
                    .into_iter()
                    .map(|(k, v)| (k, v.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null)))
                    .collect();
                print_json(&settings)?;
            }
            SettingsAction::Set { key, value } => {
                validate_setting(&key, &value)?;
                pantry_common::db::set_setting(&pool, &key, value.trim()).await?;
                info!(key = %key, value = %value.trim(), "Setting updated");
            }
        },
    }

    pool.close().await;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current batch");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing current batch");
        },
    }
}
