//! CLI command implementations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use reel_core::catalog::{IngestMetadata, ingest_file, scan_media_dir};
use reel_core::config::ReelConfig;
use reel_core::{Catalog, ContentLocator, Result};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve {
        /// Address to bind to (overrides REEL_BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Require this bearer token on stream requests (overrides REEL_ACCESS_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// Register uncatalogued files in the media directory before serving
        #[arg(long)]
        scan: bool,
    },
    /// Copy a video file into the media directory and publish it
    Ingest {
        /// Video file to ingest
        file: PathBuf,
        /// Display title (defaults to the file name)
        #[arg(short, long, default_value = "")]
        title: String,
        #[arg(short, long, default_value = "")]
        category: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Explicit content id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Publish every uncatalogued video file found in the media directory
    Scan,
    /// List catalog entries
    List,
    /// Remove an entry from the catalog (the media file is kept)
    Remove {
        /// Content id to remove
        id: String,
    },
}

/// Catalog locations given as global flags
#[derive(Debug, Default)]
pub struct PathOverrides {
    pub media_dir: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

/// Handle the CLI command
///
/// # Errors
/// Returns the first error reported by the catalog or the server
pub async fn handle_command(command: Commands, paths: PathOverrides) -> Result<()> {
    let mut config = ReelConfig::from_env();
    if let Some(media_dir) = paths.media_dir {
        config.catalog.media_dir = media_dir;
    }
    if let Some(catalog) = paths.catalog {
        config.catalog.catalog_path = catalog;
    }

    match command {
        Commands::Serve { bind, token, scan } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if token.is_some() {
                config.server.access_token = token;
            }
            serve(config, scan).await
        }
        Commands::Ingest {
            file,
            title,
            category,
            description,
            id,
        } => {
            let metadata = IngestMetadata {
                title,
                category,
                description,
                id,
            };
            ingest(&config, file, metadata).await
        }
        Commands::Scan => scan(&config).await,
        Commands::List => list(&config).await,
        Commands::Remove { id } => remove(&config, &id).await,
    }
}

async fn open_catalog(config: &ReelConfig) -> Result<Catalog> {
    let catalog = Catalog::open(&config.catalog.catalog_path, &config.catalog.media_dir).await?;
    Ok(catalog)
}

/// Start the streaming server
pub async fn serve(config: ReelConfig, scan_first: bool) -> Result<()> {
    let catalog = open_catalog(&config).await?;
    if scan_first {
        scan_media_dir(&catalog).await?;
    }

    reel_web::run_server(config, Arc::new(catalog)).await?;
    Ok(())
}

/// Ingest a single file
pub async fn ingest(
    config: &ReelConfig,
    file: PathBuf,
    metadata: IngestMetadata,
) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let entry = ingest_file(&catalog, &file, metadata).await?;

    println!("Published {} as {}", entry.title, entry.id);
    println!("  Stream URL: /stream/{}", entry.id);
    Ok(())
}

/// Register files already present in the media directory
pub async fn scan(config: &ReelConfig) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let added = scan_media_dir(&catalog).await?;

    println!(
        "Registered {} new files from {}",
        added,
        config.catalog.media_dir.display()
    );
    Ok(())
}

/// Print the catalog
pub async fn list(config: &ReelConfig) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let entries = catalog.entries();

    println!("Catalog");
    println!("{:-<72}", "");
    if entries.is_empty() {
        println!("No content published yet.");
        println!("Use 'reel ingest <file>' or 'reel scan' to add content.");
        return Ok(());
    }

    for entry in &entries {
        let size = match catalog.locate(&entry.id).await {
            Ok(content) => format!("{:.1} MB", content.total_length as f64 / 1_048_576.0),
            Err(_) => "missing".to_string(),
        };
        println!(
            "{:<32} {:<28} {:>10}",
            entry.id, entry.title, size
        );
    }
    println!("\n{} entries", entries.len());
    Ok(())
}

/// Remove a catalog entry
pub async fn remove(config: &ReelConfig, id: &str) -> Result<()> {
    let catalog = open_catalog(config).await?;
    match catalog.remove(id).await? {
        Some(entry) => println!("Removed {} ({})", entry.id, entry.title),
        None => println!("No catalog entry with id {id}"),
    }
    Ok(())
}
