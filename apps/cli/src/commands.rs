//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use reconcile_connector::{LocConnector, WikidataConnector};
use reconcile_core::{ProgressReporter, RunConfig, RunSummary, WorkResult, WorkState};
use reconcile_shared::{AppConfig, init_config, load_config, validate};
use reconcile_storage::{Cache, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// reconcile-works: match local BIBFRAME Works to authority identifiers.
#[derive(Parser)]
#[command(
    name = "reconcile-works",
    version,
    about = "Replace placeholder Work identifiers with id.loc.gov and Wikidata URIs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Reconcile every Work in an RDF/XML document.
    Run {
        /// Input RDF/XML document.
        input: PathBuf,

        /// Directory for the audit log and the rewritten document.
        output_dir: PathBuf,

        /// Cache database path (overrides config).
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Skip the Wikidata fallback.
        #[arg(long)]
        no_wikidata: bool,

        /// id.loc.gov request budget per minute (overrides config).
        #[arg(long)]
        requests_per_minute: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Lookup cache maintenance.
    Cache {
        /// Cache subcommand.
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show entry counts.
    Stats {
        /// Cache database path (overrides config).
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Delete every cached entry.
    Clear {
        /// Cache database path (overrides config).
        #[arg(long)]
        cache: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "reconcile_works=info,reconcile_core=info,reconcile_connector=warn",
        1 => "reconcile_works=debug,reconcile_core=debug,reconcile_connector=info",
        _ => "reconcile_works=trace,reconcile_core=trace,reconcile_connector=trace,reconcile_matching=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            input,
            output_dir,
            cache,
            no_wikidata,
            requests_per_minute,
        } => {
            let mut config = load_config()?;
            if let Some(path) = cache {
                config.cache.path = Some(path.to_string_lossy().into_owned());
            }
            if no_wikidata {
                config.wikidata.enabled = false;
            }
            if let Some(rpm) = requests_per_minute {
                config.loc.requests_per_minute = rpm;
            }
            validate(&config)?;
            cmd_run(&config, input, output_dir).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::Cache { action } => match action {
            CacheAction::Stats { cache } => cmd_cache_stats(cache.as_deref()).await,
            CacheAction::Clear { cache } => cmd_cache_clear(cache.as_deref()).await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, input: PathBuf, output_dir: PathBuf) -> Result<()> {
    if !input.is_file() {
        return Err(eyre!("input document not found: {}", input.display()));
    }

    let cache = Arc::new(open_cache(config, None).await?);
    let loc = LocConnector::new(&config.loc, cache.clone())?;
    let wikidata = if config.wikidata.enabled {
        Some(WikidataConnector::new(&config.wikidata, cache.clone())?)
    } else {
        None
    };

    let run_config = RunConfig {
        input,
        output_dir,
        authority_prefixes: config.matching.authority_prefixes.clone(),
    };

    info!(
        input = %run_config.input.display(),
        output_dir = %run_config.output_dir.display(),
        wikidata = config.wikidata.enabled,
        "reconciling works"
    );

    let reporter = CliProgress::new();
    let summary = reconcile_core::run(&run_config, &loc, wikidata.as_ref(), &reporter).await?;

    println!();
    println!("  Reconciliation complete");
    println!("  Works:      {}", summary.works);
    println!("  Matched:    {} ({} via Wikidata)", summary.matched, summary.graph_matched);
    println!("  Hub-linked: {}", summary.hub_linked);
    println!("  Not found:  {}", summary.not_found);
    println!("  Errored:    {}", summary.errored);
    println!("  Skipped:    {}", summary.skipped);
    println!("  Instances:  {}", summary.instances_repointed);
    println!("  Audit:      {}", summary.audit_path.display());
    println!("  Output:     {}", summary.output_path.display());
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Open the cache database, retrying as configured.
async fn open_cache(config: &AppConfig, path: Option<&Path>) -> Result<Storage> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config.cache_path()?,
    };
    let backoff = Duration::from_millis(config.cache.connect_backoff_ms);
    Storage::open_with_retry(&path, config.cache.connect_attempts, backoff)
        .await
        .wrap_err_with(|| format!("cache unavailable at {}", path.display()))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar over the Works.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn work_started(&self, work_id: &str, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current.saturating_sub(1) as u64);
        self.bar.set_message(work_id.to_string());
    }

    fn work_finished(&self, result: &WorkResult) {
        self.bar.inc(1);
        if result.state == WorkState::Error {
            self.bar
                .println(format!("  ! {}: every search failed", result.work_id));
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// cache
// ---------------------------------------------------------------------------

async fn cmd_cache_stats(path: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let storage = open_cache(&config, path).await?;
    let stats = storage.stats().await?;
    println!("  Entries:     {}", stats.entries);
    println!("  Hashes:      {}", stats.hashes);
    println!("  Hash fields: {}", stats.hash_fields);
    Ok(())
}

async fn cmd_cache_clear(path: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let storage = open_cache(&config, path).await?;
    storage.clear().await?;
    println!("Cache cleared.");
    Ok(())
}
