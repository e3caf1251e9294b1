use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("Failed to load config file: {0}")]
    ConfigError(String),

    #[error("Failed to load links file: {0}")]
    LinksError(String),

    #[error("Proxy endpoint {0} is unreachable")]
    ProxyUnreachable(SocketAddr),

    #[error("Proxy at {endpoint} is not routing traffic after {checks} health checks")]
    ProxyUnhealthy { endpoint: SocketAddr, checks: u32 },

    #[error("Failed to launch proxy process: {0}")]
    SpawnError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}
