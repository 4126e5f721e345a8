use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::commands::{
    cat_command, copy_command, init_config_command, list_command, put_command, remove_command,
    stat_command, upload_command, userinfo_command,
};
use cmd::common::{create_client, load_settings};
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "pcloud-cli")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// YAML configuration file; without it PCLOUD_TOKEN and PCLOUD_BASE_URL are used
    #[arg(short, long, global = true, env = "PCLOUD_CONFIG")]
    config: Option<PathBuf>,
    /// Buffer writes and send them in chunks of this many bytes
    #[arg(long, global = true)]
    chunk_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show account information
    Userinfo,
    /// List the entries of a remote folder
    Ls {
        /// Remote folder path
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show metadata for a remote path
    Stat {
        /// Remote path
        path: String,
    },
    /// Write a remote file to stdout
    Cat {
        /// Remote file path
        path: String,
    },
    /// Copy a local file to a remote path
    Put {
        /// Local source file
        local: PathBuf,
        /// Remote destination path
        remote: String,
        /// Append to an existing remote file instead of replacing it
        #[arg(short, long)]
        append: bool,
    },
    /// Copy one remote file to another
    Cp {
        /// Remote source path
        source: String,
        /// Remote destination path
        dest: String,
        /// Append to an existing destination instead of replacing it
        #[arg(short, long)]
        append: bool,
    },
    /// Upload a local file into a remote folder in one request
    Upload {
        /// Local source file
        local: PathBuf,
        /// Remote folder
        #[arg(default_value = "/")]
        folder: String,
    },
    /// Delete a remote file
    Rm {
        /// Remote file path
        path: String,
    },
    /// Write a configuration template
    InitConfig {
        /// Destination file; stdout when omitted
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let mut out = tokio::io::stdout();

    if let Commands::InitConfig { path } = &cli.command {
        init_config_command(path.as_deref(), &mut out).await?;
        return Ok(out.flush().await?);
    }

    let config = load_settings(cli.config.as_deref(), cli.chunk_size)?;
    let client = create_client(&config)?;

    match &cli.command {
        Commands::Userinfo => userinfo_command(&client, &mut out).await,
        Commands::Ls { path } => list_command(&client, path, &mut out).await,
        Commands::Stat { path } => stat_command(&client, path, &mut out).await,
        Commands::Cat { path } => cat_command(&client, path, &mut out).await,
        Commands::Put {
            local,
            remote,
            append,
        } => put_command(&client, local, remote, *append, &mut out).await,
        Commands::Cp {
            source,
            dest,
            append,
        } => copy_command(&client, source, dest, *append, &mut out).await,
        Commands::Upload { local, folder } => {
            upload_command(&client, local, folder, &mut out).await
        }
        Commands::Rm { path } => remove_command(&client, path, &mut out).await,
        Commands::InitConfig { .. } => Ok(()),
    }?;

    Ok(out.flush().await?)
}
