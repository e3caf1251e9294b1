use crate::types::{DownloadOutcome, OutcomeReport, Target};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info};

/// Pass-through aggregation of per-download progress for the console.
/// Rendering problems are swallowed so reporting can never stall a worker.
#[derive(Clone)]
pub struct ProgressReporter {
    multi: MultiProgress,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    /// A reporter with no visible output, for headless runs.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Create the per-target bar a worker drives while streaming.
    pub fn add_target(&self, target: &Target) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(target.file_name().to_string());
        pb
    }

    /// Emit one line per finished target, as it completes.
    pub fn outcome(&self, report: &OutcomeReport) {
        match &report.outcome {
            DownloadOutcome::Completed { bytes } => info!(
                "Download finished! Filepath: {} | URL: {} | {} bytes in {:.2?}",
                report.target.dest.display(),
                report.target.url,
                bytes,
                report.duration
            ),
            DownloadOutcome::Skipped { reason } => {
                info!("Skipped {} ({})", report.target.url, reason)
            }
            DownloadOutcome::Failed { kind, attempts } => error!(
                "Download failed! Reason: {} after {} attempt(s) | URL: {}",
                kind, attempts, report.target.url
            ),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
