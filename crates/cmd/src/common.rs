use std::path::Path;

use anyhow::{Context, Result};
use pcloud::{PCloud, PCloudConfig, WritePolicy, load_config};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Resolve configuration from a YAML file, falling back to the environment
pub fn load_settings(config_path: Option<&Path>, chunk_size: Option<usize>) -> Result<PCloudConfig> {
    let config = match config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PCloudConfig::from_env().context(
            "No --config given; set PCLOUD_TOKEN (and optionally PCLOUD_BASE_URL)",
        )?,
    };

    Ok(match chunk_size {
        Some(chunk_size) => config.with_write_policy(WritePolicy::Chunked { chunk_size }),
        None => config,
    })
}

/// Create the API client for a resolved configuration
pub fn create_client(config: &PCloudConfig) -> Result<PCloud> {
    PCloud::new(config).context("Failed to create pCloud client")
}

/// Write one line of command output
pub async fn write_line<W>(out: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    Ok(())
}

/// Last path component, used as the remote name for uploads
pub fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("No file name in {}", path.display()))
}

/// Helper function to format file sizes
#[must_use]
pub fn format_file_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{size}B")
    }
}
