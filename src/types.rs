use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// One URL-to-file download task.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: String,
    pub dest: PathBuf,
    /// Total size reported by earlier response metadata, when known.
    pub expected_size: Option<u64>,
}

impl Target {
    pub fn new(url: String, dest: PathBuf) -> Self {
        Self {
            url,
            dest,
            expected_size: None,
        }
    }

    pub fn file_name(&self) -> &str {
        self.dest
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

/// Classification of a failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Connection,
    Timeout,
    NotFound,
    Http,
    SizeMismatch,
    ProxyRejected,
    Io,
}

impl FetchErrorKind {
    /// Decision table for the bounded-attempt loop: transient network
    /// failures are worth another attempt, the rest are final. A proxy
    /// rejection in particular must not be retried against the same
    /// endpoint without a fresh health check.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            FetchErrorKind::Connection | FetchErrorKind::Timeout | FetchErrorKind::Http
        )
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::Connection => "connection error",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Http => "http error",
            FetchErrorKind::SizeMismatch => "size mismatch",
            FetchErrorKind::ProxyRejected => "proxy rejected",
            FetchErrorKind::Io => "io error",
        };
        f.write_str(name)
    }
}

/// Result of processing one target. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { bytes: u64 },
    Skipped { reason: &'static str },
    Failed { kind: FetchErrorKind, attempts: u32 },
}

/// Health-check verdict for the proxy endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    Healthy,
    Unreachable,
    Unhealthy { checks: u32 },
}

/// Immutable configuration snapshot consumed by the worker pool and the
/// health checker.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub proxy: SocketAddr,
    pub max_downloads: usize,
    pub max_tor_checks: u32,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct OutcomeReport {
    pub target: Target,
    pub outcome: DownloadOutcome,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub total_duration: Duration,
    pub reports: Vec<OutcomeReport>,
}

impl RunSummary {
    pub fn from_reports(reports: Vec<OutcomeReport>, total_duration: Duration) -> Self {
        let mut completed = 0;
        let mut skipped = 0;
        let mut failed = 0;
        let mut total_bytes = 0;
        for report in &reports {
            match &report.outcome {
                DownloadOutcome::Completed { bytes } => {
                    completed += 1;
                    total_bytes += *bytes;
                }
                DownloadOutcome::Skipped { .. } => skipped += 1,
                DownloadOutcome::Failed { .. } => failed += 1,
            }
        }
        Self {
            total: reports.len(),
            completed,
            skipped,
            failed,
            total_bytes,
            total_duration,
            reports,
        }
    }
}
