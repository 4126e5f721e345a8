use anyhow::Result;
use pcloud::{PCloud, RemoteFile};
use tokio::io::AsyncWrite;

use crate::common::write_line;

/// Delete a remote file
pub async fn remove_command<W>(client: &PCloud, path: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut file = RemoteFile::new(client, path).await?;
    if file.is_folder() {
        anyhow::bail!("{path} is a folder");
    }
    file.delete().await?;
    write_line(out, &format!("Deleted {path}")).await
}
