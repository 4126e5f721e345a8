use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use diagnostics::*;
use pcloud::PCloud;
use tokio::io::AsyncWrite;

use crate::common::{file_name, format_file_size, write_line};

/// Upload a local file into a remote folder in one request
pub async fn upload_command<W>(client: &PCloud, local: &Path, folder: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let name = file_name(local)?;
    let content = tokio::fs::read(local)
        .await
        .with_context(|| format!("Failed to read {}", local.display()))?;
    let size = content.len() as u64;

    let response = client
        .upload_file(folder, &name, Bytes::from(content))
        .await?;
    let file_id = response
        .get("fileids")
        .and_then(|ids| ids.get(0))
        .map(ToString::to_string)
        .unwrap_or_else(|| "?".to_string());

    info!("Uploaded {name} to {folder} as file {file_id}",
        name: name.as_str(), folder: folder, file_id: file_id.as_str());
    write_line(
        out,
        &format!("Uploaded {} ({}) to {folder}", local.display(), format_file_size(size)),
    )
    .await
}
