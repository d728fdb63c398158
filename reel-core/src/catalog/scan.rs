//! Media directory scanning.
//!
//! Registers video files that were placed in the media directory by other
//! means (rsync, a shared volume) so they become streamable without going
//! through ingest.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use super::{Catalog, CatalogEntry, CatalogError, generate_content_id, title_from_path};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mkv", "webm", "mov", "avi"];

/// Whether `path` has a video extension the server knows how to label.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Publishes every uncatalogued video file under the media directory.
///
/// Hidden files and directories are skipped, which also keeps partially
/// ingested files out. Returns the number of newly published entries.
///
/// # Errors
/// - `CatalogError::Io` - Failed to read the media directory or rewrite the catalog
pub async fn scan_media_dir(catalog: &Catalog) -> Result<usize, CatalogError> {
    let media_dir = catalog.media_dir().to_path_buf();
    if !tokio::fs::try_exists(&media_dir).await? {
        return Ok(0);
    }

    let mut found = Vec::new();
    collect_video_files(&media_dir, &media_dir, &mut found).await?;

    // Files registered by another process since we opened are not new
    catalog.refresh().await?;
    let snapshot = catalog.snapshot();
    let new_entries: Vec<CatalogEntry> = found
        .into_iter()
        .filter(|relative| !snapshot.references_file(relative))
        .map(|relative| {
            let title = title_from_path(Path::new(&relative));
            CatalogEntry::new(generate_content_id(), title, relative)
        })
        .collect();

    let count = new_entries.len();
    if count > 0 {
        catalog.publish_all(new_entries).await?;
    }
    tracing::info!(
        "Scanned {}: {} new media files",
        media_dir.display(),
        count
    );
    Ok(count)
}

/// Recursively collects video files as '/'-separated paths relative to `root`
fn collect_video_files<'a>(
    root: &'a Path,
    dir: &'a Path,
    found: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden {
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if let Err(e) = collect_video_files(root, &path, found).await {
                    tracing::warn!("Failed to scan {}: {}", path.display(), e);
                }
            } else if file_type.is_file() && is_video_file(&path) {
                if let Some(relative) = relative_name(root, &path) {
                    found.push(relative);
                }
            }
        }

        Ok(())
    })
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ContentLocator;

    #[test]
    fn test_video_extension_detection() {
        assert!(is_video_file(Path::new("a.mp4")));
        assert!(is_video_file(Path::new("a.MKV")));
        assert!(!is_video_file(Path::new("a.txt")));
        assert!(!is_video_file(Path::new("mp4")));
    }

    #[tokio::test]
    async fn test_scan_registers_new_files_once() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(media.join("series/s01")).unwrap();
        std::fs::create_dir_all(media.join(".trash")).unwrap();
        std::fs::write(media.join("Big_Buck.Bunny.mp4"), vec![0u8; 100]).unwrap();
        std::fs::write(media.join("series/s01/e01.mkv"), vec![0u8; 50]).unwrap();
        std::fs::write(media.join("notes.txt"), b"not video").unwrap();
        std::fs::write(media.join(".x.mp4.partial"), b"in flight").unwrap();
        std::fs::write(media.join(".trash/old.mp4"), b"deleted").unwrap();

        let catalog = Catalog::open(dir.path().join("catalog.json"), &media)
            .await
            .unwrap();
        assert_eq!(scan_media_dir(&catalog).await.unwrap(), 2);
        assert_eq!(scan_media_dir(&catalog).await.unwrap(), 0);

        let entries = catalog.entries();
        let mut names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Big_Buck.Bunny.mp4", "series/s01/e01.mkv"]);

        let bunny = entries
            .iter()
            .find(|e| e.file_name == "Big_Buck.Bunny.mp4")
            .unwrap();
        assert_eq!(bunny.title, "Big Buck Bunny");
        assert_eq!(catalog.locate(&bunny.id).await.unwrap().total_length, 100);
    }

    #[tokio::test]
    async fn test_scan_missing_media_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("catalog.json"), dir.path().join("absent"))
            .await
            .unwrap();
        assert_eq!(scan_media_dir(&catalog).await.unwrap(), 0);
    }
}
