use anyhow::Result;
use pcloud::{PCloud, RemoteFile};
use tokio::io::AsyncWrite;

use crate::common::{format_file_size, write_line};

/// Print account information as JSON
pub async fn userinfo_command<W>(client: &PCloud, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let info = client.user_info().await?;
    write_line(out, &serde_json::to_string_pretty(&info)?).await
}

/// Print the metadata snapshot of one remote path
pub async fn stat_command<W>(client: &PCloud, path: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let file = RemoteFile::new(client, path).await?;

    let kind = if file.is_folder() { "folder" } else { "file" };
    let created = file
        .created()
        .map_or_else(|| "-".to_string(), |date| date.to_rfc2822());
    let modified = file
        .modified()
        .map_or_else(|| "-".to_string(), |date| date.to_rfc2822());

    write_line(out, &format!("Path:     {}", file.path())).await?;
    write_line(out, &format!("Name:     {}", file.name())).await?;
    write_line(out, &format!("Id:       {}", file.id())).await?;
    write_line(out, &format!("Type:     {kind}")).await?;
    write_line(
        out,
        &format!("Size:     {} ({} bytes)", format_file_size(file.size()), file.size()),
    )
    .await?;
    write_line(out, &format!("Created:  {created}")).await?;
    write_line(out, &format!("Modified: {modified}")).await?;
    write_line(out, &format!("Mine:     {}", file.is_mine())).await?;
    write_line(out, &format!("Shared:   {}", file.is_shared())).await
}
