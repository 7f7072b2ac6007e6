//! deepcopy CLI - configuration-driven graph copy over a JSON data snapshot.

use clap::{Parser, Subcommand};
use deepcopy::{
    CopyConfig, CopyError, CopyOrchestrator, CopyRequest, DiscoveryReport, ExtensionCatalog,
    Filter, MemoryStorage, StorageController, Tables, Value,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "deepcopy")]
#[command(about = "Copy a selection of rows together with everything they reference")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "deepcopy.yaml")]
    config: PathBuf,

    /// Path to the JSON data snapshot
    #[arg(short, long, default_value = "data.json")]
    data: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct Selection {
    /// Root id to copy (repeatable; default: every root row)
    #[arg(long = "root-id")]
    root_ids: Vec<i64>,

    /// Extra condition on the root table, as column=value (repeatable)
    #[arg(long = "where", value_parser = parse_condition)]
    conditions: Vec<(String, String)>,
}

impl Selection {
    fn request(&self) -> CopyRequest {
        let mut filter = Filter::new();
        for (column, value) in &self.conditions {
            let value = value
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::from(value.as_str()));
            filter = filter.eq(column.as_str(), value);
        }

        let request = if self.root_ids.is_empty() {
            CopyRequest::all()
        } else {
            CopyRequest::ids(self.root_ids.iter().copied())
        };
        request.with_filter(filter)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration against the data snapshot
    Validate,

    /// Discover what a run would copy, without writing anything
    Plan {
        #[command(flatten)]
        selection: Selection,
    },

    /// Copy the selected rows
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Where to write the resulting snapshot [default: the --data file]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_condition(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected column=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(CopyError::Config)?;

    let config = CopyConfig::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let storage = Arc::new(MemoryStorage::load(&cli.data)?);
    info!("Loaded data snapshot from {:?}", cli.data);

    let controller = Arc::new(StorageController::from_config(storage.clone(), &config.copy));
    let catalog = ExtensionCatalog::with_builtins();
    let tables = Tables::from_controller(&config, controller.as_ref(), &catalog).await?;

    match cli.command {
        Commands::Validate => {
            println!(
                "Configuration is valid: {} tables, root table '{}'",
                tables.len(),
                tables.root().id()
            );
        }

        Commands::Plan { selection } => {
            let cancel_token = setup_signal_handler().await?;
            let orchestrator = CopyOrchestrator::from_config(&config, tables, controller);
            let graph = orchestrator
                .discover(&selection.request(), &cancel_token)
                .await?;
            let report = DiscoveryReport::from_graph(&graph, orchestrator.tables());

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nCopy plan:");
                println!("  Root table: {}", report.root_table);
                println!("  Roots: {}", report.roots);
                println!("  Objects: {}", report.objects);
                for (table, count) in &report.per_table {
                    println!("    {}: {}", table, count);
                }
                if report.placeholders > 0 {
                    println!("  Excluded placeholders: {}", report.placeholders);
                }
                print_unsatisfied(&report.unsatisfied_links);
            }
        }

        Commands::Run { selection, output } => {
            let cancel_token = setup_signal_handler().await?;
            let orchestrator = CopyOrchestrator::from_config(&config, tables, controller);
            let result = orchestrator.run(&selection.request(), cancel_token).await?;

            let output = output.unwrap_or_else(|| cli.data.clone());
            storage.save(&output)?;
            info!("Wrote data snapshot to {:?}", output);

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nCopy completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Objects: {}/{}",
                    result.objects_copied, result.objects_discovered
                );
                for (table, count) in &result.copied_per_table {
                    println!("    {}: {}", table, count);
                }
                for (original, new) in &result.root_id_map {
                    println!("  Root {} -> {}", original, new);
                }
                print_unsatisfied(&result.unsatisfied_links);
            }
        }
    }

    Ok(())
}

fn print_unsatisfied(links: &[deepcopy::UnsatisfiedLink]) {
    if links.is_empty() {
        return;
    }
    println!("  Unsatisfied links: {}", links.len());
    for link in links {
        println!(
            "    {} {}: {} = {} ({:?})",
            link.table, link.id, link.column, link.value, link.reason
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, CopyError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Rolling back...");
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Rolling back...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, CopyError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
