use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON config file; CLI flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port of the local Tor SOCKS5 proxy
    #[arg(long)]
    pub socks_port: Option<u16>,

    /// Maximum number of downloads to run at once
    #[arg(short, long)]
    pub max_downloads: Option<usize>,

    /// Number of times the proxy is health-checked before giving up
    #[arg(long)]
    pub max_tor_checks: Option<u32>,

    /// Path to the Tor executable to launch before downloading
    #[arg(long)]
    pub tor_path: Option<PathBuf>,

    /// JSON file containing the list of URLs to download
    #[arg(short, long)]
    pub links_file: Option<PathBuf>,

    /// Log file path; logging goes to stderr when unset
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Output directory for downloaded files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}
