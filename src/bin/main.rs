//! LDP Deposit CLI
//!
//! Command-line tool for depositing packages into an LDP repository.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use ldp_deposit::{
    init_logging, load_package, DepositConfig, DepositError, DepositManager, EventKind,
    FanoutNotifier, JsonLinesNotifier, LdpSessionFactory, LoggingConfig, MemoryRepository,
    Notifier, RecordingNotifier, TracingNotifier,
};

#[derive(Parser)]
#[command(name = "ldp-deposit")]
#[command(about = "Deposit linked resource packages into an LDP repository")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit a package as one transaction
    Deposit(DepositArgs),
    /// Show where each resource would land, without touching a repository
    Plan(PlanArgs),
}

#[derive(Args)]
struct DepositArgs {
    /// Package directory or zip archive containing manifest.json
    package: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository REST endpoint (overrides the config file)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Container receiving the package roots (default: the base URL)
    #[arg(long, value_name = "URL")]
    target: Option<String>,

    /// Deposit without a repository transaction
    #[arg(long)]
    no_transaction: bool,

    /// Append deposit events as JSON lines to this file
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,
}

#[derive(Args)]
struct PlanArgs {
    /// Package directory or zip archive containing manifest.json
    package: PathBuf,

    /// Container the plan is rooted at
    #[arg(long, value_name = "URL", default_value = "http://localhost:8080/rest")]
    target: String,
}

/// Merge the config file with command-line overrides
fn load_config(args: &DepositArgs) -> Result<DepositConfig, DepositError> {
    let mut config = match &args.config {
        Some(path) => DepositConfig::load(path)?,
        None => DepositConfig::default(),
    };

    if let Some(base_url) = &args.base_url {
        config.repository.base_url = base_url.clone();
    }
    if let Some(target) = &args.target {
        config.deposit.target_container = Some(target.clone());
    }
    if args.no_transaction {
        config.repository.use_transactions = false;
    }

    config.validate()?;
    Ok(config)
}

fn open_events_file(path: &Path) -> Result<BufWriter<File>, DepositError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(BufWriter::new(file))
}

fn run_deposit(args: DepositArgs) -> Result<(), DepositError> {
    let config = load_config(&args)?;
    init_logging(&config.logging)?;

    let tree = load_package(&args.package)?;
    let factory = LdpSessionFactory::new(config.repository.clone())?;
    let manager = DepositManager::new(factory);

    let events = match &args.events {
        Some(path) => Some(JsonLinesNotifier::new(open_events_file(path)?)),
        None => None,
    };
    let mut sinks: Vec<&dyn Notifier> = Vec::new();
    sinks.push(&TracingNotifier);
    if let Some(events) = &events {
        sinks.push(events);
    }
    let notifier = FanoutNotifier::new(sinks);

    let report = manager.deposit_package(&tree, config.target_container(), &notifier)?;
    eprintln!(
        "Deposited {} into {}: {}",
        args.package.display(),
        config.target_container(),
        report.summary()
    );
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<(), DepositError> {
    init_logging(&LoggingConfig {
        level: "warn".to_string(),
        ..Default::default()
    })?;

    let tree = load_package(&args.package)?;
    let repository = MemoryRepository::new(args.target.clone());
    let recorder = RecordingNotifier::new();

    let report =
        DepositManager::new(repository).deposit_package(&tree, &args.target, &recorder)?;

    for event in recorder.events() {
        match event.kind {
            EventKind::Deposit => println!(
                "{} {} -> {}",
                event.resource_kind.map(|k| k.as_str()).unwrap_or("resource"),
                event.local_id.as_deref().unwrap_or("?"),
                event.uri.as_deref().unwrap_or("?")
            ),
            EventKind::Remap => println!(
                "remap {} ({})",
                event.uri.as_deref().unwrap_or("?"),
                event.detail.as_deref().unwrap_or("")
            ),
            _ => {}
        }
    }
    eprintln!("{}", report.summary());
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Deposit(args) => run_deposit(args),
        Commands::Plan(args) => run_plan(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
