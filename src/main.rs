mod collectors;
mod config;
mod detect;
mod model;
mod orchestrator;
mod probe;
mod registry;
mod render;
mod sampler;

use clap::Parser;
use config::Config;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "opsnap")]
#[command(version)]
#[command(about = "Collects a diagnostic snapshot of this host into a report directory")]
struct Cli {
    /// Optional YAML config file; defaults apply without one.
    #[arg(long)]
    config: Option<String>,
    /// Total sampling window, e.g. "60s" or "10m".
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,
    /// Sampling tick interval, e.g. "5s".
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Directory the report directory is created under.
    #[arg(long)]
    output_dir: Option<String>,
    /// Comma-separated section keys to include (default: all).
    #[arg(long, value_delimiter = ',')]
    sections: Vec<String>,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(duration) = cli.duration {
        cfg.duration_secs = duration.as_secs();
    }
    if let Some(interval) = cli.interval {
        cfg.sample_interval_secs = interval.as_secs();
    }
    if let Some(output_dir) = cli.output_dir {
        cfg.output_dir = output_dir;
    }
    if !cli.sections.is_empty() {
        cfg.sections = cli.sections.clone();
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid run parameters");
        std::process::exit(1);
    }

    info!(
        duration_secs = cfg.duration_secs,
        interval_secs = cfg.sample_interval_secs,
        output_dir = %cfg.output_dir,
        "starting opsnap"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut run_task = tokio::spawn(async move { orchestrator::run(&cfg, shutdown_rx).await });

    let joined = tokio::select! {
        joined = &mut run_task => joined,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, rendering partial report");
            let _ = shutdown_tx.send(true);
            (&mut run_task).await
        }
    };

    match joined {
        Ok(Ok(outcome)) => {
            println!("report directory: {}", outcome.report_dir.display());
            for path in &outcome.report_paths {
                println!("  {}", path.display());
            }
            let summary_path = outcome.report_dir.join("summary.txt");
            if let Ok(summary) = std::fs::read_to_string(&summary_path) {
                println!("\n{summary}");
            }
        }
        Ok(Err(err)) => {
            error!(error = %err, "snapshot run failed");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "snapshot task panicked");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
