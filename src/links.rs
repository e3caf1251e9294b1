use crate::error::DownloaderError;
use crate::types::Target;
use log::{debug, info};
use std::path::Path;
use tokio::fs;

/// Load the links file, a JSON array of URL strings, into an ordered list
/// of targets. The order of the file is the order the queue serves.
pub async fn load_targets(
    path: &Path,
    output_dir: &Path,
) -> Result<Vec<Target>, DownloaderError> {
    let raw = fs::read_to_string(path).await?;
    let urls: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| DownloaderError::LinksError(format!("{}: {}", path.display(), e)))?;
    if urls.is_empty() {
        return Err(DownloaderError::LinksError(format!(
            "links file '{}' is empty",
            path.display()
        )));
    }
    info!("Found {} link(s) in file '{}'", urls.len(), path.display());

    let targets = urls
        .into_iter()
        .map(|url| {
            let dest = output_dir.join(file_name_for(&url));
            debug!("Target: {} -> {}", url, dest.display());
            Target::new(url, dest)
        })
        .collect();
    Ok(targets)
}

/// Derive a deterministic destination file name from a URL: the last
/// non-empty path segment, falling back to the host.
pub fn file_name_for(url: &str) -> String {
    let stripped = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = stripped.splitn(2, "://").nth(1).unwrap_or(stripped);
    let mut segments = without_scheme.split('/');
    let host = segments.next().unwrap_or("");
    match segments.rev().find(|s| !s.is_empty()) {
        Some(name) => sanitize(name),
        None if host.is_empty() => "download".to_string(),
        None => sanitize(host),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
