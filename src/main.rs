use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use log::{error, info};

use tor_downloader::cli::Cli;
use tor_downloader::config::Config;
use tor_downloader::links;
use tor_downloader::pool::WorkerPool;
use tor_downloader::progress::ProgressReporter;
use tor_downloader::proxy;
use tor_downloader::queue::TargetQueue;
use tor_downloader::types::{DownloadOutcome, RunSummary};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;
    init_logging(&config).context("failed to initialize logging")?;
    info!("Starting tor-downloader");
    info!("Using config: {:?}", config);

    let targets = match links::load_targets(&config.links_file, &config.output_dir).await {
        Ok(targets) => targets,
        Err(e) => {
            error!("Failed to load links file: {}", e);
            eprintln!("{}", "Failed to load links file".red());
            return Err(e.into());
        }
    };

    // The proxy process is a black box; start it when asked, then only
    // ever talk to the SOCKS endpoint it opens.
    let mut proxy_child = None;
    if let Some(tor_path) = &config.tor_path {
        proxy_child = Some(proxy::spawn_proxy(tor_path, config.socks_port)?);
    }

    let pool = WorkerPool::new(config.pool_config(), ProgressReporter::new());
    let result = pool.run(TargetQueue::new(targets)).await;

    if let Some(mut child) = proxy_child {
        let _ = child.kill().await;
    }

    match result {
        Ok(summary) => {
            print_summary(&summary);
            if summary.failed > 0 {
                error!("{} downloads failed", summary.failed);
                bail!("Some downloads failed");
            }
            println!("\n{}", "All downloads finished".green());
            Ok(())
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            eprintln!(
                "{}",
                "Proxy never became healthy, no downloads attempted".red()
            );
            Err(e.into())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n{}", "Download Summary:".bold());
    println!("Total targets: {}", summary.total);
    println!(
        "Completed: {} | Skipped: {} | Failed: {}",
        summary.completed.to_string().green(),
        summary.skipped.to_string().yellow(),
        summary.failed.to_string().red()
    );
    println!(
        "Total data transferred: {:.2} MB",
        summary.total_bytes as f64 / 1_048_576.0
    );
    println!("Total duration: {:.2?}", summary.total_duration);

    if summary.completed > 0 {
        println!("\n{}", "Completed Downloads:".green().bold());
        for report in &summary.reports {
            if let DownloadOutcome::Completed { bytes } = &report.outcome {
                println!(
                    "✓ {} ({:.2} MB in {:.2?})",
                    report.target.file_name().green(),
                    *bytes as f64 / 1_048_576.0,
                    report.duration
                );
            }
        }
    }

    if summary.failed > 0 {
        println!("\n{}", "Failed Downloads:".red().bold());
        for report in &summary.reports {
            if let DownloadOutcome::Failed { kind, attempts } = &report.outcome {
                println!(
                    "✗ {} - {} after {} attempt(s)",
                    report.target.file_name().red(),
                    kind,
                    attempts
                );
                println!("  URL: {}", report.target.url);
            }
        }
    }
}

fn init_logging(config: &Config) -> Result<(), std::io::Error> {
    let env = env_logger::Env::default().default_filter_or("info");
    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            env_logger::Builder::from_env(env)
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
        }
        None => env_logger::Builder::from_env(env).init(),
    }
    Ok(())
}
