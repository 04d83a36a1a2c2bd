//! netdoc CLI tool
//!
//! Command-line interface for parsing network diagrams with netdoc-core.
//!
//! ## Commands
//!
//! - `parse <path>`: One-shot parsing of a diagram or a directory of diagrams
//! - `process --store <dir> --request <json>`: Run one parse request through the job service
//! - `work --store <dir>`: Read JSON-lines requests from stdin and process them with a worker pool

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use netdoc_core::{
    codec::{
        archive::{ensure_supported, is_diagram_path, is_legacy_path},
        to_json, DiagramCompiler,
    },
    commands::{CompletionNotification, ParseRequest},
    config::{ConfigProvider, NetdocConfig, TomlConfigProvider},
    event::JobEvent,
    queue::{MemoryQueue, NotificationSink},
    service::{ParserService, WorkerSummary},
    storage::FsBlobStore,
    NetdocError,
};
use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "netdoc")]
#[command(author, version, about = "A tool for extracting network topology from diagrams", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a diagram or every diagram below a directory and print a summary
    Parse {
        /// Path to the diagram or directory to parse
        path: PathBuf,

        /// Print the artifact as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run a single parse request against a directory-backed blob store
    Process {
        /// Root directory of the blob store
        #[arg(long)]
        store: PathBuf,

        /// Parse request as JSON: {"document_id", "file_path", "project_id"}
        #[arg(long)]
        request: String,

        /// Abandon the job after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Process JSON-lines parse requests from stdin with a worker pool
    Work {
        /// Root directory of the blob store
        #[arg(long)]
        store: PathBuf,

        /// Number of workers (overrides the configuration)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print job events
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Writes every notification to stdout as one JSON line.
struct StdoutNotifications;

#[async_trait]
impl NotificationSink for StdoutNotifications {
    async fn publish(&self, notification: &CompletionNotification) -> Result<(), NetdocError> {
        let line = serde_json::to_string(notification)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}

fn load_config(path: Option<PathBuf>) -> Result<NetdocConfig, NetdocError> {
    match path {
        Some(path) => TomlConfigProvider::new(path).load(),
        None => Ok(NetdocConfig::default()),
    }
}

fn diagram_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        // legacy files are listed so they are reported rather than silently skipped
        .filter(|entry| {
            entry.file_type().is_file()
                && (is_diagram_path(entry.path()) || is_legacy_path(entry.path()))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn parse(config: &NetdocConfig, path: &Path, json: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let compiler = DiagramCompiler::new(config)?;
    let files = diagram_files(path);
    if files.is_empty() {
        println!("No diagrams found at {}", path.display());
        return Ok(());
    }

    let mut failures = 0;
    for file in &files {
        let filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = match ensure_supported(file)
            .and_then(|()| std::fs::read(file).map_err(NetdocError::from))
            .and_then(|bytes| compiler.compile(&filename, bytes))
        {
            Ok(result) => result,
            Err(e) => {
                failures += 1;
                eprintln!("{}: {} ({})", file.display(), e, e.kind());
                continue;
            }
        };

        if json {
            std::io::stdout().write_all(&to_json(&result.artifact)?)?;
            println!();
            continue;
        }

        let topology = &result.artifact.topology;
        let metrics = &topology.metrics;
        println!("\n=== {} ===", file.display());
        println!("Pages: {}", topology.page_count);
        println!("Devices: {}", metrics.total_devices);
        println!("Connections: {}", metrics.total_connections);
        println!("Healed connections: {}", metrics.healed_connections);
        println!("Unresolved connectors: {}", result.artifact.unresolved_connections.len());
        println!("Average connections per device: {}", metrics.average_connections_per_device);
        println!("Density: {}", metrics.network_density);
        println!(
            "Network type: {:?} ({:?}, redundancy {:?})",
            metrics.network_type, metrics.topology_pattern, metrics.redundancy
        );
        println!("Segments: {}", topology.segments.len());
        if verbose {
            for diagnostic in &result.diagnostics {
                println!("  {diagnostic}");
            }
        } else {
            for warning in result.warnings() {
                println!("  {warning}");
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {} diagram(s) failed to parse", files.len()).into());
    }
    Ok(())
}

async fn process(
    config: NetdocConfig,
    store: PathBuf,
    request: &str,
    timeout: Option<u64>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let service = ParserService::new(
        Arc::new(FsBlobStore::new(store)),
        Arc::new(StdoutNotifications),
        config,
    )?;
    let report = match ParseRequest::from_json(request.as_bytes()) {
        Ok(request) => match timeout {
            Some(secs) => {
                service
                    .process_within(request, Duration::from_secs(secs))
                    .await
            }
            None => service.process(request).await,
        },
        Err(_) => service.process_message(request.as_bytes()).await,
    };
    if let Some(job) = &report.job {
        let history: Vec<String> = job.history().iter().map(ToString::to_string).collect();
        eprintln!("Job {}: {}", job.id, history.join(" -> "));
    }
    Ok(report
        .notification
        .as_ref()
        .is_some_and(CompletionNotification::is_success))
}

async fn work(
    mut config: NetdocConfig,
    store: PathBuf,
    workers: Option<usize>,
    verbose: bool,
) -> Result<WorkerSummary, Box<dyn std::error::Error>> {
    if let Some(count) = workers {
        config.worker.count = count;
    }
    config.worker.exit_when_idle = true;

    let queue = Arc::new(MemoryQueue::default());
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            queue.push(line.into_bytes());
        }
    }
    tracing::info!("Queued {} request(s)", queue.pending_len());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<JobEvent>();
    let events = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if verbose {
                eprintln!("[Event] {event}");
            }
        }
    });

    let service = Arc::new(
        ParserService::new(
            Arc::new(FsBlobStore::new(store)),
            Arc::new(StdoutNotifications),
            config,
        )?
        .with_events(tx),
    );

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        let _ = stop_tx.send(true);
    })?;

    let mut summary = WorkerSummary::default();
    for handle in service.spawn_workers(queue, stop_rx) {
        summary.merge(&handle.await?);
    }
    drop(service);
    events.await?;
    Ok(summary)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Parse {
            path,
            json,
            verbose,
        } => parse(&config, &path, json, verbose),

        Commands::Process {
            store,
            request,
            timeout,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let succeeded = runtime.block_on(process(config, store, &request, timeout))?;
            if !succeeded {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Work {
            store,
            workers,
            verbose,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let summary = runtime.block_on(work(config, store, workers, verbose))?;
            eprintln!("\n=== Worker Results ===");
            eprintln!("Processed: {}", summary.processed);
            eprintln!("Completed: {}", summary.completed);
            eprintln!("Failed: {}", summary.failed);
            eprintln!("Requeued: {}", summary.requeued);
            eprintln!("Rejected: {}", summary.rejected);
            Ok(())
        }
    }
}
