use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use file_station::catalog::Catalog;
use file_station::config::{Durability, StorageMode};
use file_station::inspect::{disk_space, num_keys};
use file_station::manager::{Listing, StorageManager};
use file_station::metrics::SharedMetrics;
use file_station::storage::{CasDriver, PathDriver, StorageDriver};

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    store: StoreConfig,

    #[arg(
        long,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
pub struct StoreConfig {
    #[arg(long, default_value = "./data/files", help = "Physical storage root")]
    fs_root: PathBuf,

    #[arg(long, default_value = "./data/meta", help = "Catalog root")]
    meta_root: PathBuf,

    #[arg(
        long,
        help = "Storage strategy (path, cas). Falls back to $STORAGE_MODE, then path"
    )]
    storage_mode: Option<StorageMode>,

    #[arg(
        long,
        help = "Run without the catalog: raw directory scans, path mode only"
    )]
    no_catalog: bool,

    #[arg(
        long,
        default_value = "fdatasync",
        help = "Durability level (buffer, fsync, fdatasync)"
    )]
    durability: Durability,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a local file to a logical path
    Upload {
        /// Local file to read
        source: PathBuf,
        /// Logical destination path, e.g. docs/readme.txt
        path: String,
        #[arg(long, help = "Free-text comment stored with the entry")]
        comment: Option<String>,
    },

    /// Download the content at a logical path
    Download {
        path: String,
        /// Destination file path
        dest: PathBuf,
    },

    /// List the direct children of a prefix
    List {
        #[arg(default_value = "")]
        prefix: String,

        #[arg(long, help = "Emit the listing as JSON")]
        json: bool,
    },

    /// Create a folder
    Mkdir { path: String },

    /// Move or rename a file or folder
    Mv {
        old_path: String,
        new_path: String,

        #[arg(long, help = "Treat the source as a folder (prefix cascade)")]
        folder: bool,
    },

    /// Delete a file or folder, cascading over nested entries
    Rm { path: String },

    /// Show the upload history of a path
    Versions { path: String },

    /// Inspect the catalog
    Inspect {
        #[command(subcommand)]
        command: InspectCommand,
    },
}

#[derive(Debug, Subcommand)]
enum InspectCommand {
    // number of keys
    NumKeys,
    DiskSpace,
}

fn setup_tracing(log_level: &str) {
    // Try to use RUST_LOG env var first, fall back to CLI flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", log_level);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn resolve_mode(flag: Option<StorageMode>) -> Result<StorageMode> {
    if let Some(mode) = flag {
        return Ok(mode);
    }
    match std::env::var("STORAGE_MODE") {
        Ok(value) => value
            .parse()
            .map_err(|e: String| anyhow::anyhow!("STORAGE_MODE: {}", e)),
        Err(_) => Ok(StorageMode::Path),
    }
}

fn resolve_use_catalog(no_catalog: bool) -> bool {
    if no_catalog {
        return false;
    }
    match std::env::var("USE_CATALOG") {
        Ok(value) => !matches!(value.to_lowercase().as_str(), "false" | "0" | "no"),
        Err(_) => true,
    }
}

fn build_manager(config: &StoreConfig) -> Result<StorageManager> {
    let mode = resolve_mode(config.storage_mode)?;
    let driver: Box<dyn StorageDriver> = match mode {
        StorageMode::Cas => Box::new(CasDriver::new(config.fs_root.clone())?),
        StorageMode::Path => Box::new(PathDriver::new(config.fs_root.clone())?),
    };

    let catalog = if resolve_use_catalog(config.no_catalog) {
        Some(Catalog::open(
            config.meta_root.clone(),
            Some(config.durability),
        )?)
    } else {
        info!("running without a catalog; listings are raw directory scans");
        None
    };

    Ok(StorageManager::new(
        driver,
        catalog,
        SharedMetrics::default(),
    ))
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    run(cli)
}

#[tokio::main]
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Inspect { command } => match command {
            InspectCommand::NumKeys => {
                let num_keys = num_keys(cli.store.meta_root)?;
                println!("Number of keys: {num_keys}");
            }
            InspectCommand::DiskSpace => {
                let disk_space = disk_space(cli.store.meta_root)?;
                println!("Disk space: {disk_space}");
            }
        },
        command => {
            let manager = build_manager(&cli.store)?;
            run_command(&manager, command).await?;
        }
    }
    Ok(())
}

async fn run_command(manager: &StorageManager, command: Command) -> Result<()> {
    match command {
        Command::Upload {
            source,
            path,
            comment,
        } => {
            let content = tokio::fs::read(&source).await?;
            let outcome = manager
                .upload(&content, &path, comment.as_deref())
                .await?;
            println!("Uploaded {} ({} bytes)", path, content.len());
            println!("  hash: {}", outcome.content_hash);
            if let Some(id) = outcome.id {
                println!("  id:   {}", id);
            }
        }

        Command::Download { path, dest } => {
            use tokio::io::AsyncWriteExt;

            let content = manager.download(&path).await?;
            let mut file = tokio::fs::File::create(&dest).await?;
            file.write_all(&content).await?;
            // Ensure all data is written to disk
            file.flush().await?;
            println!("Wrote {} bytes to {}", content.len(), dest.display());
        }

        Command::List { prefix, json } => {
            let listing = manager.list(&prefix).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(&listing);
            }
        }

        Command::Mkdir { path } => {
            manager.create_folder(&path).await?;
            println!("Created folder {}", path);
        }

        Command::Mv {
            old_path,
            new_path,
            folder,
        } => {
            manager.move_item(&old_path, &new_path, folder).await?;
            println!("Moved {} -> {}", old_path, new_path);
        }

        Command::Rm { path } => {
            manager.delete(&path).await?;
            println!("Deleted {}", path);
        }

        Command::Versions { path } => {
            let versions = manager.versions(&path)?;
            if versions.is_empty() {
                println!("No history for {}", path);
            }
            for version in versions {
                println!(
                    "{}  {}  {}",
                    format_timestamp(version.uploaded_at),
                    version.content_hash,
                    version.annotation.unwrap_or_default()
                );
            }
        }

        Command::Inspect { .. } => unreachable!("handled before manager construction"),
    }
    Ok(())
}

fn print_listing(listing: &Listing) {
    for folder in &listing.folders {
        println!("{}/", folder);
    }
    for file in &listing.files {
        println!(
            "{}  {:>10}  {}  {}",
            format_timestamp(file.uploaded_at),
            file.size,
            file.name,
            file.annotation.as_deref().unwrap_or("")
        );
    }
}

fn format_timestamp(secs: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}
