//! rxmatch - match a prescription drug name against a local catalog.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rxmatch_core::{
    CatalogDrug, CatalogScan, DisabledEmbedder, DrugQuery, Embedder, GeminiEmbedder,
    SafetyContext, SearchConfig, SearchOrchestrator, SqliteCatalog, StrategyDeps, SynonymTable,
};

#[derive(Parser)]
#[command(name = "rxmatch")]
#[command(about = "Multi-strategy drug name matching")]
struct Args {
    /// JSON config file (defaults plus RXMATCH_* environment otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite catalog path
    #[arg(long, global = true, env = "RXMATCH_CATALOG_PATH")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the catalog for one drug
    Search {
        /// Drug name as written on the prescription
        drug_name: String,

        /// Strength (e.g., "500mg")
        #[arg(long, short = 's')]
        strength: Option<String>,

        /// Prescriber directions (e.g., "take 1 tablet by mouth daily")
        #[arg(long, short = 'i')]
        instructions: Option<String>,

        /// Safety assessment as a JSON object
        #[arg(long)]
        safety_context: Option<String>,

        /// Rows each strategy may return
        #[arg(long)]
        limit: Option<usize>,

        /// Synonym file (CSV or TSV)
        #[arg(long, env = "RXMATCH_SYNONYMS_PATH")]
        synonyms: Option<PathBuf>,

        /// Include per-strategy reports in the output
        #[arg(long)]
        detailed: bool,
    },
    /// Load catalog rows from a JSON array of drugs
    Import {
        /// JSON file to import
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rxmatch_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SearchConfig::from_env()?,
    };
    if args.catalog.is_some() {
        config.catalog_path = args.catalog.clone();
    }

    let catalog = Arc::new(open_catalog(&config)?);

    match args.command {
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let drugs: Vec<CatalogDrug> = serde_json::from_str(&text)?;
            let written = catalog.upsert_drugs(&drugs)?;
            info!(written, total = catalog.count()?, "catalog import complete");
        }
        Command::Search {
            drug_name,
            strength,
            instructions,
            safety_context,
            limit,
            synonyms,
            detailed,
        } => {
            if synonyms.is_some() {
                config.synonyms_path = synonyms;
            }
            let synonyms = match &config.synonyms_path {
                Some(path) => SynonymTable::load(path),
                None => SynonymTable::default(),
            };

            let embedder: Arc<dyn Embedder> = match &config.gemini_api_key {
                Some(key) => Arc::new(GeminiEmbedder::new(key.clone(), config.embedding_timeout())?),
                None => {
                    warn!("no Gemini API key, embedding strategies disabled");
                    Arc::new(DisabledEmbedder)
                }
            };
            let index = Arc::new(CatalogScan::new(catalog.clone()).with_cap(config.embedding_scan_cap));

            let deps = StrategyDeps {
                catalog,
                synonyms: Arc::new(synonyms),
                embedder,
                index,
            };

            let mut query = DrugQuery::new(drug_name);
            query.strength = strength;
            query.instructions = instructions;
            if let Some(raw) = safety_context {
                let context: SafetyContext =
                    serde_json::from_str(&raw).context("safety context must be a JSON object")?;
                query.safety_context = Some(context);
            }

            let limit = limit.unwrap_or(config.limit_per_method);
            let orchestrator = SearchOrchestrator::with_defaults(&deps, config);
            let outcome = orchestrator.search_detailed(&query, limit).await;

            let output = if detailed {
                serde_json::to_string_pretty(&outcome)?
            } else {
                serde_json::to_string_pretty(&outcome.candidates)?
            };
            println!("{output}");
        }
    }

    Ok(())
}

fn open_catalog(config: &SearchConfig) -> Result<SqliteCatalog> {
    match &config.catalog_path {
        Some(path) => SqliteCatalog::open(path)
            .with_context(|| format!("opening catalog {}", path.display())),
        None => {
            warn!("no catalog path configured, using an empty in-memory catalog");
            Ok(SqliteCatalog::open_in_memory()?)
        }
    }
}
