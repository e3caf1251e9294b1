use crate::types::{DownloadOutcome, FetchErrorKind, Target};
use futures_util::StreamExt;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout};

/// Attempts permitted per target before it is reported Failed.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Ceiling on the wait for the next body chunk. Onion circuits stall for
/// a long time before they die, so this is generous.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(120);
const RETRY_BACKOFF: Duration = Duration::from_secs(3);

struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

enum Attempt {
    Completed { bytes: u64 },
    AlreadyComplete,
}

/// Streams one file at a time to disk through the SOCKS proxy, resuming
/// partial files with ranged requests.
pub struct StreamingDownloader {
    client: reqwest::Client,
}

impl StreamingDownloader {
    pub fn new(proxy: SocketAddr) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(format!("socks5h://{}", proxy))?)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Download one target. Consumes at most `retry_budget` attempts; the
    /// outcome is final at this layer, the pool never re-runs a target.
    pub async fn fetch(
        &self,
        target: &Target,
        retry_budget: u32,
        bar: &ProgressBar,
    ) -> DownloadOutcome {
        // A file that already matches the expected size needs no request.
        if let (Some(expected), Ok(meta)) =
            (target.expected_size, fs::metadata(&target.dest).await)
        {
            if meta.len() == expected {
                debug!("File '{}' already complete, skipping", target.file_name());
                return DownloadOutcome::Skipped {
                    reason: "already complete",
                };
            }
        }

        let mut expected = target.expected_size;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.attempt(target, &mut expected, bar).await {
                Ok(Attempt::Completed { bytes }) => {
                    return DownloadOutcome::Completed { bytes };
                }
                Ok(Attempt::AlreadyComplete) => {
                    return DownloadOutcome::Skipped {
                        reason: "already complete",
                    };
                }
                Err(err) if !err.kind.retryable() || attempts >= retry_budget => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        target.url, attempts, err.message
                    );
                    return DownloadOutcome::Failed {
                        kind: err.kind,
                        attempts,
                    };
                }
                Err(err) => {
                    warn!(
                        "Attempt {}/{} for {} failed, retrying: {}",
                        attempts, retry_budget, target.url, err.message
                    );
                    sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    /// One transfer attempt. The resume state is re-read from disk each
    /// time, so bytes flushed by an interrupted attempt are not fetched
    /// again.
    async fn attempt(
        &self,
        target: &Target,
        expected: &mut Option<u64>,
        bar: &ProgressBar,
    ) -> Result<Attempt, FetchError> {
        let on_disk = match fs::metadata(&target.dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if let Some(total) = *expected {
            if on_disk == total {
                return Ok(Attempt::AlreadyComplete);
            }
        }

        let mut request = self.client.get(&target.url);
        if on_disk > 0 {
            debug!("Resuming {} from byte {}", target.url, on_disk);
            request = request.header(RANGE, format!("bytes={}-", on_disk));
        }
        let response = request.send().await.map_err(classify)?;

        let (write_from, truncate) = match response.status() {
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // The server has no bytes past our offset; the file is done.
                info!(
                    "Received 416 for {}, assuming download is complete",
                    target.url
                );
                return Ok(Attempt::AlreadyComplete);
            }
            StatusCode::NOT_FOUND => {
                return Err(FetchError {
                    kind: FetchErrorKind::NotFound,
                    message: format!("received 404, recheck download links: {}", target.url),
                });
            }
            StatusCode::PARTIAL_CONTENT => (on_disk, false),
            StatusCode::OK if on_disk > 0 => {
                info!(
                    "Server ignored the range request for {}, restarting from byte zero",
                    target.url
                );
                (0, true)
            }
            StatusCode::OK => (0, true),
            status => {
                return Err(FetchError {
                    kind: FetchErrorKind::Http,
                    message: format!("unexpected status {} for {}", status, target.url),
                });
            }
        };

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(len) = content_length {
            *expected = Some(write_from + len);
        }
        if let Some(total) = *expected {
            bar.set_length(total);
        }
        bar.set_position(write_from);

        if let Some(parent) = target.dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = if truncate {
            fs::File::create(&target.dest).await
        } else {
            OpenOptions::new().append(true).open(&target.dest).await
        }
        .map_err(io_error)?;

        let mut written = write_from;
        let mut stream = response.bytes_stream();
        loop {
            let chunk = match timeout(CHUNK_TIMEOUT, stream.next()).await {
                Err(_) => {
                    // Keep what we have; the next attempt resumes from here.
                    file.flush().await.ok();
                    return Err(FetchError {
                        kind: FetchErrorKind::Timeout,
                        message: format!("timed out waiting for data from {}", target.url),
                    });
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    file.flush().await.ok();
                    return Err(classify(e));
                }
                Ok(Some(Ok(chunk))) => chunk,
            };
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
            bar.set_position(written);
        }
        file.flush().await.map_err(io_error)?;

        // A finished stream with the wrong size is a corruption signal,
        // not something another attempt can fix.
        if let Some(total) = *expected {
            if written != total {
                return Err(FetchError {
                    kind: FetchErrorKind::SizeMismatch,
                    message: format!(
                        "expected {} bytes for {}, wrote {}",
                        total, target.url, written
                    ),
                });
            }
        }
        Ok(Attempt::Completed { bytes: written })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if is_proxy_rejection(&err) {
        FetchErrorKind::ProxyRejected
    } else {
        FetchErrorKind::Connection
    };
    FetchError {
        kind,
        message: err.to_string(),
    }
}

/// A SOCKS-level refusal means the proxy itself turned us away; retrying
/// against the same endpoint without a fresh health check is pointless.
fn is_proxy_rejection(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if inner.to_string().to_ascii_lowercase().contains("socks") {
            return true;
        }
        source = inner.source();
    }
    false
}

fn io_error(err: std::io::Error) -> FetchError {
    FetchError {
        kind: FetchErrorKind::Io,
        message: err.to_string(),
    }
}
