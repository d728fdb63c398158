//! Test fixtures for catalog and streaming tests.
//!
//! Provides scratch catalogs populated with deterministic media files so
//! byte-level assertions can be made against known content.

use std::sync::Arc;

use super::{Catalog, CatalogEntry};

/// Deterministic content where every byte encodes its own offset.
///
/// Adjacent ranges differ, so an off-by-one in range arithmetic shows up
/// as a byte mismatch rather than passing silently.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i % 251) as u8) ^ ((i / 251) as u8))
        .collect()
}

/// Creates a catalog in a temporary directory with one published entry per
/// `(id, file_name, contents)` triple.
///
/// # Panics
///
/// Panics if the temporary directory, media files, or catalog cannot be
/// created. This is acceptable in test fixtures where failures indicate
/// environment issues.
pub async fn create_test_catalog(files: &[(&str, &str, Vec<u8>)]) -> (tempfile::TempDir, Arc<Catalog>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let media_dir = temp_dir.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();

    let catalog = Catalog::open(temp_dir.path().join("catalog.json"), &media_dir)
        .await
        .unwrap();

    let mut entries = Vec::new();
    for (id, file_name, contents) in files {
        std::fs::write(media_dir.join(file_name), contents).unwrap();
        entries.push(CatalogEntry::new(*id, *id, *file_name));
    }
    if !entries.is_empty() {
        catalog.publish_all(entries).await.unwrap();
    }

    (temp_dir, Arc::new(catalog))
}
