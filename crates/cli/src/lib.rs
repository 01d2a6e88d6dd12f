use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docket_preview::{FileReference, FsBackend, LifecycleEvent, PreviewConfig, PreviewDispatcher, TextPages};
use docket_preview_core::{ClassifyRequest, PaginatedSearchIndex};
use docket_preview_scheduler::GenerationCounter;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "DOCKET_PREVIEW_LOG";

#[derive(Debug, Parser)]
#[command(name = "docket-preview")]
#[command(about = "Inspect how files are classified and previewed")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the render category for a file name.
    Classify {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(long, value_name = "MIME")]
        content_type: Option<String>,
    },
    /// Mount a file through the preview engine and print lifecycle events.
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Storage root the file is resolved against (defaults to its directory)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        #[arg(long, value_name = "MIME")]
        content_type: Option<String>,
        /// TOML configuration file (defaults to the platform config file, then environment overrides)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Search a form-feed paged text file.
    Search {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput<'a> {
    name: &'a str,
    category: &'static str,
}

#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    page_count: usize,
    total_occurrences: usize,
    matches: Vec<MatchOutput>,
}

#[derive(Debug, Serialize)]
struct MatchOutput {
    /// 1-based page number
    page: usize,
    occurrences: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing();

    match cli.command {
        Commands::Classify { name, content_type } => run_classify(&name, content_type.as_deref()),
        Commands::Inspect {
            file,
            root,
            content_type,
            config,
        } => run_inspect(&file, root.as_deref(), content_type, config.as_deref()),
        Commands::Search { file, query } => run_search(&file, &query),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Log to stderr so stdout stays machine-readable
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when run is called twice in-process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn run_classify(name: &str, content_type: Option<&str>) -> Result<()> {
    let classification = ClassifyRequest::new(name).content_type(content_type).classify();
    tracing::debug!(stage = ?classification.stage, "classified");

    let payload = ClassifyOutput {
        name,
        category: classification.category.as_str(),
    };
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

fn run_inspect(file: &Path, root: Option<&Path>, content_type: Option<String>, config: Option<&Path>) -> Result<()> {
    ensure_file_exists(file)?;

    let config = match config {
        Some(path) => PreviewConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PreviewConfig::load().with_context(|| {
            format!(
                "failed to load configuration from {} or environment",
                PreviewConfig::default_path().display()
            )
        })?,
    };

    let (root, storage_path) = storage_location(file, root)?;
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| storage_path.clone());
    let size = fs::metadata(file)?.len();

    let mut reference = FileReference::new(storage_path, name).with_size(size);
    if let Some(content_type) = content_type {
        reference = reference.with_content_type(content_type);
    }

    let events = runtime()?.block_on(async move {
        let mut dispatcher = PreviewDispatcher::new(Arc::new(FsBackend::new(root)), config);
        let mut receiver = dispatcher.subscribe();
        dispatcher.mount(reference).await;

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    });

    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }

    if let Some(LifecycleEvent::Error { message, .. }) = events.last() {
        anyhow::bail!("preview failed: {message}");
    }

    Ok(())
}

fn run_search(file: &Path, query: &str) -> Result<()> {
    ensure_file_exists(file)?;

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let pages = TextPages::decode(&bytes).context("failed to decode text file")?;

    let mut index = PaginatedSearchIndex::new(GenerationCounter::new().advance());
    let hits = runtime()?
        .block_on(index.search(&pages, query))
        .context("search failed")?
        .to_vec();

    let payload = SearchOutput {
        query,
        page_count: pages.len(),
        total_occurrences: index.state().total_occurrences(),
        matches: hits
            .into_iter()
            .map(|hit| MatchOutput {
                page: hit.item + 1,
                occurrences: hit.occurrences,
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Split a file path into a backend root and a `/`-separated storage path
fn storage_location(file: &Path, root: Option<&Path>) -> Result<(PathBuf, String)> {
    let file = fs::canonicalize(file).with_context(|| format!("failed to resolve {}", file.display()))?;
    let root = match root {
        Some(root) => fs::canonicalize(root).with_context(|| format!("failed to resolve root {}", root.display()))?,
        None => file
            .parent()
            .map(Path::to_path_buf)
            .context("file has no parent directory")?,
    };

    let relative = file
        .strip_prefix(&root)
        .with_context(|| format!("{} is not inside {}", file.display(), root.display()))?;
    let storage_path = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    Ok((root, storage_path))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
