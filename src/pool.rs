use crate::downloader::{StreamingDownloader, DEFAULT_RETRY_BUDGET};
use crate::error::DownloaderError;
use crate::progress::ProgressReporter;
use crate::proxy::ProxyHealthChecker;
use crate::queue::TargetQueue;
use crate::types::{DownloadOutcome, OutcomeReport, PoolConfig, ProxyStatus, RunSummary};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Bounded-concurrency download engine: a fixed set of worker slots
/// pulling from the queue and funneling outcomes through a single
/// completion channel back to the aggregator.
pub struct WorkerPool {
    config: PoolConfig,
    checker: ProxyHealthChecker,
    reporter: ProgressReporter,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, reporter: ProgressReporter) -> Self {
        let checker = ProxyHealthChecker::new(config.proxy, config.max_tor_checks);
        Self {
            config,
            checker,
            reporter,
        }
    }

    /// Replace the health checker, e.g. to point the routing check at a
    /// stand-in page.
    pub fn with_checker(mut self, checker: ProxyHealthChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Process every target in the queue. The proxy must pass its health
    /// check first; otherwise no target is attempted and the error is
    /// fatal for the run. Outcomes arrive in completion order.
    pub async fn run(&self, queue: TargetQueue) -> Result<RunSummary, DownloaderError> {
        match self.checker.check().await {
            ProxyStatus::Healthy => {}
            ProxyStatus::Unreachable => {
                return Err(DownloaderError::ProxyUnreachable(self.config.proxy))
            }
            ProxyStatus::Unhealthy { checks } => {
                return Err(DownloaderError::ProxyUnhealthy {
                    endpoint: self.config.proxy,
                    checks,
                })
            }
        }

        let total = queue.len().await;
        let slots = self.config.max_downloads.min(total);
        let start = Instant::now();
        let queue = Arc::new(queue);
        let downloader = Arc::new(StreamingDownloader::new(self.config.proxy)?);
        let (tx, mut rx) = mpsc::unbounded_channel::<OutcomeReport>();

        info!("Starting {} worker slot(s) for {} target(s)", slots, total);
        let mut workers = Vec::with_capacity(slots);
        for slot in 0..slots {
            let queue = queue.clone();
            let downloader = downloader.clone();
            let reporter = self.reporter.clone();
            let tx = tx.clone();
            workers.push(tokio::spawn(async move {
                // A slot that finishes pulls the next target immediately;
                // the queue mutex only guards the pull itself.
                while let Some(target) = queue.next().await {
                    debug!("Slot {} picked up {}", slot, target.url);
                    let bar = reporter.add_target(&target);
                    let started = Instant::now();
                    let outcome = downloader.fetch(&target, DEFAULT_RETRY_BUDGET, &bar).await;
                    match &outcome {
                        DownloadOutcome::Failed { .. } => {
                            bar.finish_with_message("Download failed")
                        }
                        _ => bar.finish(),
                    }
                    let report = OutcomeReport {
                        target,
                        outcome,
                        duration: started.elapsed(),
                    };
                    reporter.outcome(&report);
                    if tx.send(report).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut reports = Vec::with_capacity(total);
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        futures::future::join_all(workers).await;

        let summary = RunSummary::from_reports(reports, start.elapsed());
        if let Err(e) = self.write_stats_csv(&summary).await {
            error!("Failed to write stats CSV: {}", e);
        }
        Ok(summary)
    }

    async fn write_stats_csv(&self, summary: &RunSummary) -> Result<(), DownloaderError> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let stats_path = self.config.output_dir.join("download_stats.csv");
        let mut wtr = csv::WriterBuilder::new().from_path(stats_path)?;

        wtr.write_record([
            "Filename",
            "Outcome",
            "Size (MB)",
            "Duration (s)",
            "URL",
            "Detail",
        ])?;

        for report in &summary.reports {
            let (outcome, bytes, detail) = match &report.outcome {
                DownloadOutcome::Completed { bytes } => {
                    ("completed".to_string(), *bytes, String::new())
                }
                DownloadOutcome::Skipped { reason } => {
                    ("skipped".to_string(), 0, reason.to_string())
                }
                DownloadOutcome::Failed { kind, attempts } => (
                    "failed".to_string(),
                    0,
                    format!("{} after {} attempt(s)", kind, attempts),
                ),
            };
            wtr.write_record([
                report.target.file_name().to_string(),
                outcome,
                format!("{:.2}", bytes as f64 / 1_048_576.0),
                format!("{:.2}", report.duration.as_secs_f64()),
                report.target.url.clone(),
                detail,
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }
}
