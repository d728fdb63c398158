//! Complete-then-publish ingest.
//!
//! A file is copied into the media directory under a hidden partial name,
//! synced, renamed into place, and only then published to the catalog. A
//! stream can therefore never observe a file that is still being written.

use std::path::Path;

use super::{
    Catalog, CatalogEntry, CatalogError, IngestMetadata, generate_content_id, is_valid_content_id,
};

/// Copies `source` into the catalog's media directory and publishes it.
///
/// # Errors
///
/// - `CatalogError::SourceNotFile` - `source` is missing or not a regular file
/// - `CatalogError::InvalidId` - The supplied identifier is not usable
/// - `CatalogError::Io` - Copying, syncing or renaming failed
pub async fn ingest_file(
    catalog: &Catalog,
    source: &Path,
    metadata: IngestMetadata,
) -> Result<CatalogEntry, CatalogError> {
    match tokio::fs::metadata(source).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            return Err(CatalogError::SourceNotFile {
                path: source.to_path_buf(),
            });
        }
    }

    let id = metadata.id.unwrap_or_else(generate_content_id);
    if !is_valid_content_id(&id) {
        return Err(CatalogError::InvalidId { id });
    }

    let file_name = match source.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{id}.{}", ext.to_lowercase()),
        None => id.clone(),
    };

    let media_dir = catalog.media_dir();
    tokio::fs::create_dir_all(media_dir).await?;
    let final_path = media_dir.join(&file_name);
    let partial_path = media_dir.join(format!(".{file_name}.partial"));

    if let Err(e) = copy_and_sync(source, &partial_path).await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return Err(e.into());
    }

    let title = if metadata.title.is_empty() {
        title_from_path(source)
    } else {
        metadata.title
    };

    let mut entry = CatalogEntry::new(id, title, file_name);
    entry.category = metadata.category;
    entry.description = metadata.description;

    catalog.publish(entry.clone()).await?;
    tracing::info!(
        "Ingested {} as {} ({})",
        source.display(),
        entry.id,
        final_path.display()
    );
    Ok(entry)
}

async fn copy_and_sync(source: &Path, destination: &Path) -> std::io::Result<()> {
    tokio::fs::copy(source, destination).await?;
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(destination)
        .await?;
    file.sync_all().await
}

/// Derives a display title from a file stem ("The_Last.Voyage" -> "The Last Voyage").
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.replace(['.', '_'], " "))
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}
