use std::path::Path;

use anyhow::{Context, Result, bail};
use pcloud::PCloudConfig;
use tokio::io::AsyncWrite;

use crate::common::write_line;

const TOKEN_PLACEHOLDER: &str = "your-access-token";

/// Write a configuration template to `path`, or to `out` when no path is given
pub async fn init_config_command<W>(path: Option<&Path>, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let yaml = PCloudConfig::new(TOKEN_PLACEHOLDER).to_yaml()?;

    let Some(path) = path else {
        return write_line(out, yaml.trim_end()).await;
    };

    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        bail!("{} already exists", path.display());
    }
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    write_line(out, &format!("Wrote configuration template to {}", path.display())).await
}
