use crate::error::DownloaderError;
use crate::types::ProxyStatus;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};

/// Page that reports whether traffic actually leaves through Tor.
const TOR_CHECK_URL: &str = "https://check.torproject.org";
/// Marker present in the check page body when routing works.
pub const TOR_CHECK_MARKER: &str =
    "Congratulations. This browser is configured to use Tor.";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const CHECK_BACKOFF: Duration = Duration::from_secs(5);

/// Verifies that the local SOCKS endpoint is accepting connections and
/// routing traffic, retrying a bounded number of times. Must report
/// `Healthy` before any download is attempted.
pub struct ProxyHealthChecker {
    endpoint: SocketAddr,
    max_attempts: u32,
    check_url: String,
}

impl ProxyHealthChecker {
    pub fn new(endpoint: SocketAddr, max_attempts: u32) -> Self {
        Self {
            endpoint,
            max_attempts,
            check_url: TOR_CHECK_URL.to_string(),
        }
    }

    /// Point the routing check at a different page, e.g. a local stand-in
    /// for the Tor check service.
    pub fn with_check_url(mut self, url: impl Into<String>) -> Self {
        self.check_url = url.into();
        self
    }

    /// Probe the proxy. `Unreachable` when the endpoint itself cannot be
    /// contacted, `Healthy` on the first successful routed request,
    /// `Unhealthy` once the attempt budget is spent. Network probes only,
    /// no shared state is touched.
    pub async fn check(&self) -> ProxyStatus {
        if !self.endpoint_reachable().await {
            warn!(
                "Proxy endpoint {} is not accepting connections",
                self.endpoint
            );
            return ProxyStatus::Unreachable;
        }

        let client = match self.check_client() {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not build proxy check client: {}", e);
                return ProxyStatus::Unhealthy { checks: 0 };
            }
        };

        for attempt in 1..=self.max_attempts {
            debug!(
                "Proxy health check attempt {}/{}",
                attempt, self.max_attempts
            );
            match self.routed(&client).await {
                Ok(true) => {
                    info!(
                        "Proxy at {} is healthy (attempt {})",
                        self.endpoint, attempt
                    );
                    return ProxyStatus::Healthy;
                }
                Ok(false) => warn!(
                    "Proxy at {} accepted the connection but is not routing traffic",
                    self.endpoint
                ),
                Err(e) => warn!("Proxy health check failed: {}", e),
            }
            if attempt < self.max_attempts {
                sleep(CHECK_BACKOFF).await;
            }
        }
        ProxyStatus::Unhealthy {
            checks: self.max_attempts,
        }
    }

    async fn endpoint_reachable(&self) -> bool {
        matches!(
            timeout(CONNECT_TIMEOUT, TcpStream::connect(self.endpoint)).await,
            Ok(Ok(_))
        )
    }

    fn check_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(format!("socks5h://{}", self.endpoint))?)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CHECK_TIMEOUT)
            .build()
    }

    async fn routed(&self, client: &reqwest::Client) -> Result<bool, reqwest::Error> {
        let body = client.get(&self.check_url).send().await?.text().await?;
        Ok(body.contains(TOR_CHECK_MARKER))
    }
}

/// Launch the Tor executable as a detached child. The process is a black
/// box from here on; callers only ever talk to the SOCKS endpoint it opens.
pub fn spawn_proxy(tor_path: &Path, socks_port: u16) -> Result<Child, DownloaderError> {
    info!(
        "Launching proxy process '{}' with SOCKS port {}",
        tor_path.display(),
        socks_port
    );
    Command::new(tor_path)
        .arg("--SocksPort")
        .arg(socks_port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| DownloaderError::SpawnError(format!("{}: {}", tor_path.display(), e)))
}
