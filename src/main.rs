use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use proxylens::api::blocked::BlockedPatternCache;
use proxylens::api::client::{HttpBackend, LogBackend};
use proxylens::api::query::PAGE_SIZE;
use proxylens::filter::preferences::FilePreferenceStore;
use proxylens::filter::store::FilterStore;
use proxylens::logs::export::{DirectorySaver, ExportCoordinator};
use proxylens::logs::session::LogSession;
use proxylens::models::config::AppConfig;
use proxylens::models::filter::{ContentBucket, FilterPatch};
use proxylens::models::log_record::{LogRecord, Source};
use proxylens::models::rule::RuleTarget;
use proxylens::rules::json_path::NodeKey;
use proxylens::rules::seed::seed_from_record;
use proxylens::utils::logging;
use proxylens::utils::output::RowPrinter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Explore proxy logs and seed rewrite rules")]
struct Args {
    /// Base URL of the proxy backend
    #[clap(short, long, default_value = "http://127.0.0.1:8080")]
    backend: String,

    /// File holding persisted filter preferences
    #[clap(long, default_value = "proxylens-prefs.json")]
    prefs: PathBuf,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow matching logs live until Ctrl-C
    Tail {
        #[clap(flatten)]
        filter: FilterArgs,

        /// Number of pages to load up front
        #[clap(long, default_value = "1")]
        pages: usize,
    },

    /// Inspect or edit the persisted filter
    Filter {
        #[clap(subcommand)]
        action: FilterAction,
    },

    /// Export every record matching the persisted filter
    Export {
        /// Directory the export file is written to
        #[clap(long)]
        out_dir: Option<PathBuf>,
    },

    /// Build a JSON-path rule seed from a captured record
    SeedRule {
        /// JSON file holding one log record
        #[clap(long)]
        record: PathBuf,

        /// Keys from the selected node up to the root label, as a JSON array
        /// (e.g. '["id", 0, "items", "root"]')
        #[clap(long)]
        key_path: String,

        /// Body the node was selected in (request, response, both)
        #[clap(long, default_value = "response")]
        target: RuleTarget,
    },

    /// List blocked URL patterns
    Blocked,
}

#[derive(Subcommand, Debug)]
enum FilterAction {
    /// Print the persisted filter
    Show,
    /// Change persisted filter dimensions
    Set(FilterArgs),
    /// Restore defaults
    Reset,
}

#[derive(clap::Args, Debug, Default)]
struct FilterArgs {
    /// URL search (`a;!b||c`)
    #[clap(long)]
    search: Option<String>,

    /// Request body search
    #[clap(long)]
    request_search: Option<String>,

    /// Response body search
    #[clap(long)]
    response_search: Option<String>,

    /// Source whitelist, comma-separated
    #[clap(long, value_delimiter = ',')]
    sources: Option<Vec<Source>>,

    /// Method whitelist, comma-separated
    #[clap(long, value_delimiter = ',')]
    methods: Option<Vec<String>>,

    /// Content-type whitelist, comma-separated
    #[clap(long, value_delimiter = ',')]
    file_types: Option<Vec<ContentBucket>>,

    /// Only requests touched by a rewrite rule
    #[clap(long)]
    request_rewritten_only: Option<bool>,

    /// Only responses touched by a rewrite rule
    #[clap(long)]
    response_rewritten_only: Option<bool>,

    /// Include protocol-housekeeping frames
    #[clap(long)]
    show_ws_connections: Option<bool>,
}

impl FilterArgs {
    fn into_patch(self) -> FilterPatch {
        FilterPatch {
            url_search: self.search,
            request_search: self.request_search,
            response_search: self.response_search,
            sources: self.sources.map(|s| s.into_iter().collect()),
            methods: self.methods.map(|m| m.into_iter().collect()),
            file_types: self.file_types.map(|t| t.into_iter().collect()),
            request_rewritten_only: self.request_rewritten_only,
            response_rewritten_only: self.response_rewritten_only,
            show_ws_connections: self.show_ws_connections,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger with specified level
    logging::init_logger(logging::get_log_level(&args.log_level));

    debug!("Starting proxylens v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig {
        backend_url: args.backend,
        prefs_path: args.prefs,
        ..AppConfig::default()
    };

    match args.command {
        Command::Tail { filter, pages } => tail(&config, filter.into_patch(), pages).await,
        Command::Filter { action } => edit_filter(&config, action),
        Command::Export { out_dir } => export(&config, out_dir).await,
        Command::SeedRule { record, key_path, target } => seed_rule(record, &key_path, target),
        Command::Blocked => blocked(&config).await,
    }
}

fn load_store(config: &AppConfig) -> FilterStore {
    let prefs = Arc::new(FilePreferenceStore::open(&config.prefs_path));
    FilterStore::load(prefs)
}

fn backend(config: &AppConfig) -> Result<Arc<dyn LogBackend>> {
    let backend = HttpBackend::new(&config.backend_url)?;
    Ok(Arc::new(backend))
}

/// Live view: print new rows as the session window changes
async fn tail(config: &AppConfig, patch: FilterPatch, pages: usize) -> Result<()> {
    let mut store = load_store(config);
    if !patch.is_empty() {
        store.update(patch);
    }

    info!("Following {} with filter {:?}", config.backend_url, store.state());

    let session = LogSession::new(backend(config)?, store, config.timing);
    let (handle, task) = session.spawn();
    let mut snapshots = handle.subscribe();

    let mut printer = RowPrinter::new();
    let mut printed = HashSet::new();
    let wanted = pages.max(1) * PAGE_SIZE;

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => {
                let snapshot = match snapshot {
                    Ok(snapshot) => snapshot,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Display fell behind, skipped {} updates", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                // An emptied window means the logs were reset upstream
                if snapshot.items.is_empty() {
                    printed.clear();
                }

                for record in &snapshot.items {
                    if printed.insert(record.id.clone()) {
                        printer.print(record)?;
                    }
                }
                printer.print_summary(snapshot.items.len(), snapshot.total, snapshot.has_more)?;

                if snapshot.has_more && snapshot.items.len() < wanted {
                    handle.load_more();
                }
            }
            _ = &mut interrupted => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    handle.shutdown();
    task.await.context("log session task failed")?;
    Ok(())
}

fn edit_filter(config: &AppConfig, action: FilterAction) -> Result<()> {
    let mut store = load_store(config);

    let state = match action {
        FilterAction::Show => store.state().clone(),
        FilterAction::Set(args) => store.update(args.into_patch()),
        FilterAction::Reset => store.reset(),
    };

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn export(config: &AppConfig, out_dir: Option<PathBuf>) -> Result<()> {
    let store = load_store(config);
    let out_dir = out_dir.unwrap_or_else(|| config.export_dir.clone());
    let coordinator = ExportCoordinator::new(backend(config)?);

    let (artifact, path) = coordinator
        .export(store.state(), &DirectorySaver::new(out_dir))
        .await
        .context("export failed")?;

    println!("Exported {} records to {}", artifact.record_count, path.display());
    Ok(())
}

fn seed_rule(record: PathBuf, key_path: &str, target: RuleTarget) -> Result<()> {
    let contents = std::fs::read_to_string(&record)
        .with_context(|| format!("failed to read {}", record.display()))?;
    let record: LogRecord = serde_json::from_str(&contents).context("record file is not a log record")?;
    let key_path: Vec<NodeKey> = serde_json::from_str(key_path).context("key path must be a JSON array")?;

    let mut seed = None;
    if !seed_from_record(&record, &key_path, target, |s| seed = Some(s)) {
        return Err(anyhow!("record {} has no JSON {} body", record.id, target));
    }

    if let Some(seed) = seed {
        println!("{}", serde_json::to_string_pretty(&seed)?);
    }
    Ok(())
}

async fn blocked(config: &AppConfig) -> Result<()> {
    let backend = backend(config)?;
    let cache = BlockedPatternCache::default();

    for pattern in cache.patterns(backend.as_ref()).await {
        println!("{}", pattern);
    }
    Ok(())
}
