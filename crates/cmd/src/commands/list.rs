use anyhow::Result;
use pcloud::PCloud;
use tokio::io::AsyncWrite;

use crate::common::write_line;

/// Print the paths directly inside a remote folder, sorted
pub async fn list_command<W>(client: &PCloud, folder: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut entries = client.list_folder(folder).await?;
    entries.sort();

    for entry in entries {
        write_line(out, &entry).await?;
    }

    Ok(())
}
