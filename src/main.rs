//! filestore - operator CLI
//!
//! Reads and writes files in a configured store, one namespace at a time.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use filestore::config::StorageConfig;
use filestore::manager::StorageManager;
use filestore::provider::FileProvider;

#[derive(Parser, Debug)]
#[command(name = "filestore", version, about = "Inspect and edit a filestore backend")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "filestore.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a file to stdout
    Read { namespace: String, path: String },
    /// Write a file from --file or stdin
    Write {
        namespace: String,
        path: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete a file
    Delete { namespace: String, path: String },
    /// Report whether a file exists
    Exists { namespace: String, path: String },
    /// List files under a prefix
    List {
        namespace: String,
        #[arg(default_value = "")]
        prefix: String,
        /// Print the listing as a JSON array
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    filestore::logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = StorageConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let manager = StorageManager::from_config(&config)
        .await
        .context("opening storage")?;

    let outcome = execute(&manager, cli.command).await;
    // close even on failure so pending pushes are flushed
    let closed = manager.close().await.context("closing storage");

    let code = outcome?;
    closed?;
    Ok(code)
}

async fn execute(manager: &StorageManager, command: Command) -> Result<ExitCode> {
    match command {
        Command::Read { namespace, path } => {
            let data = manager.namespace(&namespace)?.read(&path).await?;
            std::io::stdout().write_all(&data)?;
        }
        Command::Write {
            namespace,
            path,
            file,
        } => {
            let data = match file {
                Some(file) => std::fs::read(&file)
                    .with_context(|| format!("reading {}", file.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
                    buf
                }
            };
            manager.namespace(&namespace)?.write(&path, &data).await?;
        }
        Command::Delete { namespace, path } => {
            manager.namespace(&namespace)?.delete(&path).await?;
        }
        Command::Exists { namespace, path } => {
            let exists = manager.namespace(&namespace)?.exists(&path).await?;
            println!("{}", exists);
            if !exists {
                return Ok(ExitCode::from(1));
            }
        }
        Command::List {
            namespace,
            prefix,
            json,
        } => {
            let files = manager.namespace(&namespace)?.list(&prefix).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in files {
                    println!("{}", file);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
