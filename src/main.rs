//! WolfCave - Mock Bucket Server
//!
//! Runs a seeded workload against an in-memory bucket whose replicas lag
//! the active copy by a configurable virtual-time latency.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use wolfcave::config::WolfCaveConfig;
use wolfcave::error::Result;
use wolfcave::mocktime::Chrono;
use wolfcave::store::Bucket;
use wolfcave::workload::{Pacing, Workload};

/// WolfCave - Mock Bucket Server
#[derive(Parser)]
#[command(name = "wolfcave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "wolfcave.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured workload and print a replication report
    Run {
        /// Pace the virtual clock against wall-clock time
        #[arg(long)]
        paced: bool,

        /// Virtual seconds per real second when paced
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Override the number of documents written
        #[arg(long)]
        documents: Option<usize>,

        /// Override the replication latency in milliseconds
        #[arg(long)]
        latency_ms: Option<u64>,

        /// Start with replication paused
        #[arg(long)]
        pause_replication: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfcave.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show the effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config);
    let (level, format) = match &config {
        Ok(c) => (c.logging.level.clone(), c.logging.format.clone()),
        Err(_) => ("info".to_string(), "full".to_string()),
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&level), &format);

    match cli.command {
        Commands::Run {
            paced,
            speed,
            documents,
            latency_ms,
            pause_replication,
        } => {
            let mut config = config?;
            if let Some(documents) = documents {
                config.workload.documents = documents;
            }
            if let Some(latency_ms) = latency_ms {
                config.bucket.replication_latency_ms = latency_ms;
            }
            config.validate()?;

            let pacing = if paced {
                Pacing::Realtime { speed }
            } else {
                Pacing::Instant
            };
            run_workload(config, pacing, pause_replication).await
        }
        Commands::Init { output, force } => run_init(output, force),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(config?),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let fmt_layer = match format {
        "pretty" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .boxed(),
        "compact" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Load the config file, falling back to defaults when it is absent
fn load_config(path: &std::path::Path) -> Result<WolfCaveConfig> {
    if path.exists() {
        WolfCaveConfig::from_file(path)
    } else {
        Ok(WolfCaveConfig::default())
    }
}

/// Run the workload and print the report as JSON
async fn run_workload(config: WolfCaveConfig, pacing: Pacing, pause_replication: bool) -> Result<()> {
    let chrono = Arc::new(Chrono::starting_at(config.clock.start));
    let bucket = Bucket::new(chrono.clone(), &config.bucket)?;
    if pause_replication {
        bucket.pause_replication();
    }

    let mut workload = Workload::new(config.workload.clone());

    let report = tokio::select! {
        result = workload.run(&bucket, &chrono, pacing) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Write a default configuration file
fn run_init(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(wolfcave::Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }

    let config = WolfCaveConfig::default();
    let content = format!(
        "# WolfCave Configuration\n# Generated configuration file\n\n{}",
        config.to_toml_string()?
    );

    std::fs::write(&output, content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then run with: wolfcave --config {} run", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfCaveConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bucket: {}", config.bucket.name);
            println!("  vBuckets: {}", config.bucket.num_vbuckets);
            println!("  Replicas: {}", config.bucket.num_replicas);
            println!("  Replication Latency: {} ms", config.bucket.replication_latency_ms);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show configuration information
fn run_info(config: WolfCaveConfig) -> Result<()> {
    println!("WolfCave Configuration");
    println!("======================");
    println!();
    println!("Bucket:");
    println!("  Name:           {}", config.bucket.name);
    println!("  vBuckets:       {}", config.bucket.num_vbuckets);
    println!("  Replicas:       {}", config.bucket.num_replicas);
    println!("  Latency:        {} ms", config.bucket.replication_latency_ms);
    println!();
    println!("Clock:");
    println!("  Start:          {}", config.clock.start.to_rfc3339());
    println!();
    println!("Workload:");
    println!("  Documents:      {}", config.workload.documents);
    println!("  Interval:       {} ms (±{} ms)", config.workload.write_interval_ms, config.workload.jitter_ms);
    println!("  Value Size:     {} bytes", config.workload.value_size);
    println!("  Seed:           {}", config.workload.seed);

    Ok(())
}
