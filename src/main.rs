//! CLI entry point for semdex.
//!
//! Provides commands for scanning trees into the embedding index, searching it,
//! and inspecting what it holds.

use anyhow::{Context, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use semdex::display::{
    ScanProgress, create_group_stats_table, create_groups_table, create_scan_summary_table,
    create_spinner,
};
use semdex::indexing::FileWalker;
use semdex::retrieve::{build_context, find_similar_scored, load_hits};
use semdex::vector::{SUPPORTED_MODELS, codec};
use semdex::{
    EmbeddingProvider, FastEmbedProvider, GroupFlag, IndexError, IndexScope, ScanService,
    ScanState, Settings, SimilarityIndexStore, SqliteStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Incremental embedding index and semantic search
#[derive(Parser)]
#[command(
    name = "semdex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental embedding index and semantic search",
    long_about = "Embed the files of a tree into a local index and retrieve the chunks closest to a query.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .semdex directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Scan directories into the index
    #[command(
        about = "Embed new and changed files, drop removed ones",
        after_help = "Examples:\n  semdex scan\n  semdex scan src docs --group code --flag 2\n  semdex scan --dry-run"
    )]
    Scan {
        /// Directories to scan (defaults to [scan].roots)
        paths: Vec<PathBuf>,

        /// Group name (overrides [group].name)
        #[arg(short, long)]
        group: Option<String>,

        /// Group flag bits (overrides [group].flag)
        #[arg(short, long)]
        flag: Option<u64>,

        /// Label for the group flag
        #[arg(long)]
        flag_name: Option<String>,

        /// Only count the files that would be scanned
        #[arg(long)]
        dry_run: bool,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Semantic search over indexed chunks
    #[command(
        about = "Find the chunks most similar to a query",
        after_help = "Examples:\n  semdex search \"where are retries configured\"\n  semdex search \"parser\" --take 8 --flag 6 --json"
    )]
    Search {
        /// Natural language query
        query: String,

        /// Number of chunks to return (overrides [search].take)
        #[arg(short, long)]
        take: Option<usize>,

        /// Restrict to a group name (empty matches all)
        #[arg(short, long, default_value = "")]
        group: String,

        /// Restrict to parts sharing a flag bit (0 matches all)
        #[arg(short, long, default_value_t = 0)]
        flag: u64,

        /// Output hits as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show part counts per group
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List or label groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .semdex/settings.toml")]
    Config {
        /// List the supported embedding models
        #[arg(long)]
        models: bool,
    },

    /// Export the parts of a scope with their vectors
    Export {
        /// Group name (defaults to [group].name)
        #[arg(short, long)]
        group: Option<String>,

        /// Group flag (defaults to [group].flag)
        #[arg(short, long)]
        flag: Option<u64>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// List known groups
    List {
        #[arg(long)]
        json: bool,
    },
    /// Name a group flag
    Label {
        name: String,
        flag: u64,
        label: String,
    },
}

#[derive(Debug, Serialize)]
struct ExportedPart {
    path: PathBuf,
    index: u32,
    count: u32,
    model: String,
    tokens: u32,
    text: String,
    vector: Vec<f32>,
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let default_level = if debug { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(fmt).init();
}

/// Entry point with tokio async runtime.
///
/// Loads configuration, installs logging, and dispatches the command.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Init { .. }) {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    let settings = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).unwrap_or_else(|e| {
            eprintln!(
                "Configuration error loading from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        })
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };

    init_tracing(settings.debug);

    if let Err(e) = run(cli.command, settings).await {
        eprintln!("Error: {e:#}");
        if let Some(index_error) = e.downcast_ref::<IndexError>() {
            for suggestion in index_error.recovery_suggestions() {
                eprintln!("  - {suggestion}");
            }
        }
        std::process::exit(1);
    }
}

async fn run(command: Commands, mut settings: Settings) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Edit {} to customize your settings.", path.display());
            Ok(())
        }

        Commands::Config { models } => {
            if models {
                for model in SUPPORTED_MODELS {
                    println!("{model}");
                }
                return Ok(());
            }
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }

        Commands::Scan {
            paths,
            group,
            flag,
            flag_name,
            dry_run,
            quiet,
        } => {
            if let Some(group) = group {
                settings.group.name = group;
            }
            if let Some(flag) = flag {
                settings.group.flag = flag;
            }
            if flag_name.is_some() {
                settings.group.flag_name = flag_name;
            }
            if settings.group.flag == 0 {
                bail!("group flag 0 is reserved for search wildcards");
            }

            let mut options = settings.scan_options();
            if !paths.is_empty() {
                options.roots = paths;
            }

            let walker = FileWalker::new(options.walk.clone());
            let mut total = 0;
            for root in &options.roots {
                total += walker.count_files(root)?;
            }
            if dry_run {
                println!("{total} files would be scanned into {}", settings.scope());
                return Ok(());
            }

            let store = open_store(&settings)?;
            let provider = load_provider(&settings).await?;
            let mut service = ScanService::new(Arc::new(Mutex::new(store)), provider);

            let (tx, rx) = crossbeam_channel::bounded(1024);
            let cancel = service.start(settings.scope(), options, Some(tx))?;

            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nCanceling scan...");
                    ctrl_c.cancel();
                }
            });

            let progress = if quiet {
                ScanProgress::hidden()
            } else {
                ScanProgress::new(total as u64)
            };
            let report = tokio::task::spawn_blocking(move || {
                loop {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(event) => {
                            if progress.apply(&event) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if !service.is_running() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                service.wait()
            })
            .await??;

            let Some(report) = report else {
                bail!("scan did not start");
            };
            if quiet {
                report.display();
            } else {
                println!("{}", create_scan_summary_table(&report));
                for (path, error) in report.errors.iter().take(5) {
                    eprintln!("  {}: {error}", path.display());
                }
            }
            match report.state {
                ScanState::Completed => Ok(()),
                ScanState::Canceled => {
                    eprintln!("Scan canceled; stale rows were kept.");
                    Ok(())
                }
                state => bail!("scan ended {state:?} after {} exceptions", report.counts.exception),
            }
        }

        Commands::Search {
            query,
            take,
            group,
            flag,
            json,
        } => {
            let take = take.unwrap_or(settings.search.take);
            let store = open_store(&settings)?;
            let provider = load_provider(&settings).await?;

            let embedded = provider.embed(&settings.embedding.model, &[query])?;
            let Some(vector) = embedded.into_iter().next() else {
                bail!("embedding provider returned no vector for the query");
            };

            let ranked = find_similar_scored(&store, &group, GroupFlag::new(flag), &vector, take)?;
            let hits = load_hits(&store, &ranked)?;
            debug!("{} hits for take {take}", hits.len());

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                eprintln!("No indexed chunks matched.");
            } else {
                print!("{}", build_context(&settings.search.instructions, &hits));
            }
            Ok(())
        }

        Commands::Stats { json } => {
            let store = open_store(&settings)?;
            let stats = store.group_stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else if stats.is_empty() {
                println!("Index is empty. Run 'semdex scan' first.");
            } else {
                println!("{}", create_group_stats_table(&stats));
            }
            Ok(())
        }

        Commands::Group { action } => {
            let mut store = open_store(&settings)?;
            match action {
                GroupAction::List { json } => {
                    let groups = store.list_groups()?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&groups)?);
                    } else {
                        println!("{}", create_groups_table(&groups));
                    }
                }
                GroupAction::Label { name, flag, label } => {
                    let group = store.upsert_group(&name, GroupFlag::new(flag), Some(label.as_str()))?;
                    println!("{} {:#b} = {}", group.name, group.flag.bits(), group.flag_name);
                }
            }
            Ok(())
        }

        Commands::Export {
            group,
            flag,
            output,
        } => {
            let store = open_store(&settings)?;
            let scope = IndexScope::new(
                group.unwrap_or_else(|| settings.group.name.clone()),
                GroupFlag::new(flag.unwrap_or(settings.group.flag)),
            );

            let mut exported = Vec::new();
            for file in store.files_in_scope(&scope)? {
                if !file.is_enabled {
                    continue;
                }
                for part in store.parts_for_file(file.id)? {
                    exported.push(ExportedPart {
                        path: file.url.clone(),
                        index: part.index,
                        count: part.count,
                        model: part.embedding_model,
                        tokens: part.text_tokens,
                        vector: codec::decode(&part.embedding)
                            .with_context(|| format!("part {} of {}", part.id, file.url.display()))?,
                        text: part.text,
                    });
                }
            }

            let json = serde_json::to_string_pretty(&exported)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Exported {} parts to {}", exported.len(), path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
    let path = settings.index_file();
    debug!("Opening index at {}", path.display());
    SqliteStore::open(&path).with_context(|| format!("opening index {}", path.display()))
}

async fn load_provider(settings: &Settings) -> anyhow::Result<Arc<FastEmbedProvider>> {
    let model = settings.embedding.model.clone();
    let cache_dir = settings.embedding.cache_dir.clone();
    let show_progress = settings.embedding.show_download_progress;

    let spinner = create_spinner(&format!("Loading embedding model {model}"));
    let provider = tokio::task::spawn_blocking(move || {
        FastEmbedProvider::new(&model, cache_dir, show_progress)
    })
    .await??;
    spinner.finish_and_clear();
    Ok(Arc::new(provider))
}
