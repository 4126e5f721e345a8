use std::path::Path;

use anyhow::{Context, Result, bail};
use diagnostics::*;
use pcloud::{PCloud, RemoteFile, RemoteFileStream};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::common::{format_file_size, write_line};

/// Remote result code for a path that does not exist
const FILE_NOT_FOUND: i64 = 2009;

/// Open the destination of a copy
///
/// Remote files are opened for append, so without `append` an existing
/// destination is deleted first and the copy replaces it.
async fn open_destination(client: &PCloud, path: &str, append: bool) -> Result<RemoteFileStream> {
    if !append {
        match client.stat(path).await {
            Ok(metadata) if metadata.is_folder => bail!("{path} is a folder"),
            Ok(_) => {
                debug!("Replacing existing {path}", path: path);
                client.delete_file(path).await?;
            }
            Err(e) if e.remote_code() == Some(FILE_NOT_FOUND) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let file = RemoteFile::create(client, path).await?;
    Ok(RemoteFileStream::new(file))
}

async fn transfer<R>(source: &mut R, mut destination: RemoteFileStream, dest: &str) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(source, &mut destination)
        .await
        .with_context(|| format!("Failed to copy into {dest}"))?;
    destination
        .shutdown()
        .await
        .with_context(|| format!("Failed to close {dest}"))?;
    Ok(copied)
}

/// Copy a local file into a remote file
pub async fn put_command<W>(
    client: &PCloud,
    local: &Path,
    remote: &str,
    append: bool,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut source = tokio::fs::File::open(local)
        .await
        .with_context(|| format!("Failed to open {}", local.display()))?;
    let destination = open_destination(client, remote, append).await?;

    let copied = transfer(&mut source, destination, remote).await?;

    info!("Copied {bytes} bytes to {remote}", bytes: copied, remote: remote);
    write_line(
        out,
        &format!("Copied {} to {remote} ({})", local.display(), format_file_size(copied)),
    )
    .await
}

/// Copy one remote file into another through the descriptor API
pub async fn copy_command<W>(
    client: &PCloud,
    source: &str,
    dest: &str,
    append: bool,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if source == dest {
        bail!("Source and destination are the same file: {source}");
    }

    let mut reader = RemoteFileStream::new(RemoteFile::new(client, source).await?);
    let destination = open_destination(client, dest, append).await?;

    let copied = transfer(&mut reader, destination, dest).await?;
    reader.shutdown().await?;

    info!("Copied {bytes} bytes from {source} to {dest}",
        bytes: copied, source: source, dest: dest);
    write_line(
        out,
        &format!("Copied {source} to {dest} ({})", format_file_size(copied)),
    )
    .await
}
