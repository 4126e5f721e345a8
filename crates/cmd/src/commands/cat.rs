use anyhow::{Context, Result};
use diagnostics::*;
use pcloud::{PCloud, RemoteFile, RemoteFileStream};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Stream a remote file's contents to `out`
pub async fn cat_command<W>(client: &PCloud, path: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let file = RemoteFile::new(client, path).await?;
    let mut stream = RemoteFileStream::new(file);

    let copied = tokio::io::copy(&mut stream, out)
        .await
        .with_context(|| format!("Failed to read {path}"))?;
    out.flush().await?;
    stream.shutdown().await?;

    debug!("Streamed {bytes} bytes from {path}", bytes: copied, path: path);
    Ok(())
}
