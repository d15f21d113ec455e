use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use provreport::config::ServiceConfig;
use provreport::loadgen::{self, LoadgenOptions};
use provreport::summary::Summary;

#[derive(Parser)]
#[command(
    name = "provreport",
    about = "Lifecycle tracking and statistics for provisioning test runs",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the report service (API server + snapshot store)
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,

        /// Config file path, overriding PROVREPORT_CONFIG and the system path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep the store purely in memory, ignoring any configured snapshot
        #[arg(long)]
        in_memory: bool,
    },

    /// Drive scripted provisioning runs against a live server
    Loadgen {
        /// Server to drive
        #[arg(long, default_value = "http://localhost:5000")]
        base_url: String,

        /// Seconds to pause between lifecycle steps
        #[arg(long, default_value = "2")]
        pace: u64,

        /// Leave the generated records on the server
        #[arg(long)]
        keep: bool,
    },

    /// Fetch and print the fleet summary from a live server
    Summary {
        /// Server to query
        #[arg(long, default_value = "http://localhost:5000")]
        base_url: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            config,
            in_memory,
        } => {
            let mut cfg = match config {
                Some(path) => ServiceConfig::load(&path)?,
                None => ServiceConfig::load_or_default(),
            };
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            if in_memory {
                cfg.store.snapshot_path = None;
            }
            tracing::info!(bind = %cfg.server.bind, "Starting provreport service");
            provreport::serve(cfg).await?;
        }
        Commands::Loadgen {
            base_url,
            pace,
            keep,
        } => {
            tracing::info!(%base_url, pace, "Running loadgen pass");
            loadgen::run(LoadgenOptions {
                base_url,
                pace: Duration::from_secs(pace),
                keep,
            })
            .await?;
        }
        Commands::Summary { base_url, json } => {
            let url = format!("{}/summary", base_url.trim_end_matches('/'));
            let summary: Summary = reqwest::get(&url)
                .await
                .with_context(|| format!("failed to reach {url}"))?
                .json()
                .await
                .context("summary response was not valid JSON")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("\nprovreport Fleet Summary");
    println!(
        "total: {}  running: {}  success: {}  failed: {}",
        summary.total_tests,
        summary.running_tests.len(),
        summary.success_tests,
        summary.failed_tests
    );
    println!(
        "failed in terraform: {}  failed by timeout: {}  unclassified: {}",
        summary.failed_in_terraform, summary.failed_by_timeout, summary.unclassified_tests
    );
    println!(
        "success duration: avg {}s (min {}s, max {}s over {})",
        summary.success_duration.average,
        summary.success_duration.min,
        summary.success_duration.max,
        summary.success_duration.count
    );
    println!(
        "failed duration:  avg {}s (min {}s, max {}s over {})",
        summary.failed_duration.average,
        summary.failed_duration.min,
        summary.failed_duration.max,
        summary.failed_duration.count
    );

    if !summary.running_tests.is_empty() {
        println!("\nRunning:");
        for line in &summary.running_tests {
            println!("  {line}");
        }
    }

    for (label, dimension) in [
        ("Zone", &summary.zones),
        ("Type", &summary.test_types),
        ("Image", &summary.image_names),
    ] {
        if dimension.is_empty() {
            continue;
        }
        println!(
            "\n{:<20} | {:>7} | {:>7} | {:>6} | % failure",
            label, "running", "success", "failed"
        );
        println!("{:-<20}-|-{:-<7}-|-{:-<7}-|-{:-<6}-|----------", "", "", "", "");
        for (key, stats) in dimension {
            println!(
                "{:<20} | {:>7} | {:>7} | {:>6} | {}",
                key, stats.running, stats.success, stats.failed, stats.percent_failure
            );
        }
    }
    println!();
}
