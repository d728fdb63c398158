//! Durable catalog index.
//!
//! The catalog lives in a JSON file shared by every Reel process on the
//! host: the server reads it, `reel ingest` and `reel scan` write it. Each
//! write takes an exclusive lock on a sibling `.lock` file, re-reads the
//! current file, applies its change, and atomically replaces the file
//! (unique temp file, fsync, rename). Readers notice a replaced file by its
//! stamp and reload it, so content published by another process becomes
//! resolvable without a restart.
//!
//! In memory the catalog is an immutable snapshot behind an `Arc`; a reload
//! or a write builds a new snapshot and swaps the pointer, so lookups on the
//! streaming path never observe a half-applied change.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::{
    CatalogEntry, CatalogError, ContentLocator, ContentRef, LocateError, is_contained_path,
    is_valid_content_id, stat_content,
};

type EntryMap = BTreeMap<String, CatalogEntry>;

/// On-disk layout of the catalog file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    entries: Vec<CatalogEntry>,
}

/// Identity of one version of the catalog file.
///
/// Every write renames a fresh file into place, so a change in any of
/// these fields means another writer replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn of(meta: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let inode = std::os::unix::fs::MetadataExt::ino(meta);
        #[cfg(not(unix))]
        let inode = 0;

        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
            inode,
        }
    }
}

/// Immutable view of the catalog at one point in time.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    entries: EntryMap,
}

impl CatalogSnapshot {
    /// Looks up an entry by identifier.
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Number of published entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Whether any entry points at `file_name`.
    pub fn references_file(&self, file_name: &str) -> bool {
        self.entries.values().any(|entry| entry.file_name == file_name)
    }
}

/// Catalog of published content backed by a JSON file.
pub struct Catalog {
    catalog_path: PathBuf,
    media_dir: PathBuf,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    /// Stamp of the file version `snapshot` was built from; `None` if absent
    loaded_stamp: Mutex<Option<FileStamp>>,
    /// Serializes this process's writers before they contend for the file lock
    write_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("catalog_path", &self.catalog_path)
            .field("media_dir", &self.media_dir)
            .field("entries", &self.snapshot().len())
            .finish()
    }
}

impl Catalog {
    /// Loads the catalog file, starting empty if it does not exist yet.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Corrupt` - The file exists but is not a valid catalog
    /// - `CatalogError::Io` - The file could not be read
    pub async fn open(
        catalog_path: impl Into<PathBuf>,
        media_dir: impl Into<PathBuf>,
    ) -> Result<Self, CatalogError> {
        let catalog_path = catalog_path.into();
        let media_dir = media_dir.into();

        let (entries, stamp) = load_from_disk(&catalog_path).await?;
        tracing::info!(
            "Loaded catalog {} with {} entries",
            catalog_path.display(),
            entries.len()
        );

        Ok(Self {
            catalog_path,
            media_dir,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot { entries })),
            loaded_stamp: Mutex::new(stamp),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Directory that media files are resolved under.
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Location of the backing JSON file.
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    fn lock_path(&self) -> PathBuf {
        sibling_path(&self.catalog_path, ".lock")
    }

    /// Current snapshot; cheap to clone and never blocks writers for long.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().clone()
    }

    /// Clones the entry registered under `id`.
    pub fn get(&self, id: &str) -> Option<CatalogEntry> {
        self.snapshot().get(id).cloned()
    }

    /// All entries ordered by identifier.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.snapshot().iter().cloned().collect()
    }

    /// Absolute path of an entry's media file.
    pub fn path_for(&self, entry: &CatalogEntry) -> PathBuf {
        self.media_dir.join(&entry.file_name)
    }

    /// Reloads the snapshot if another writer replaced the catalog file.
    ///
    /// Returns whether a new snapshot was installed.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Corrupt` - The replaced file is not a valid catalog
    /// - `CatalogError::Io` - The file could not be read
    pub async fn refresh(&self) -> Result<bool, CatalogError> {
        let current = current_stamp(&self.catalog_path).await?;
        if current == *self.loaded_stamp.lock() {
            return Ok(false);
        }

        let (entries, stamp) = load_from_disk(&self.catalog_path).await?;
        tracing::debug!(
            "Catalog {} changed on disk, reloaded {} entries",
            self.catalog_path.display(),
            entries.len()
        );
        self.install(entries, stamp);
        Ok(true)
    }

    /// Publishes (inserts or replaces) a single entry.
    ///
    /// The media file must already be complete; it becomes resolvable as soon
    /// as this returns.
    ///
    /// # Errors
    ///
    /// - `CatalogError::InvalidId` / `CatalogError::InvalidFileName` - Entry fails validation
    /// - `CatalogError::Io` - The catalog file could not be rewritten
    pub async fn publish(&self, entry: CatalogEntry) -> Result<(), CatalogError> {
        self.publish_all(vec![entry]).await
    }

    /// Publishes a batch of entries with a single catalog rewrite.
    ///
    /// # Errors
    ///
    /// - `CatalogError::InvalidId` / `CatalogError::InvalidFileName` - An entry fails validation
    /// - `CatalogError::Io` - The catalog file could not be rewritten
    pub async fn publish_all(&self, batch: Vec<CatalogEntry>) -> Result<(), CatalogError> {
        for entry in &batch {
            validate_entry(entry)?;
        }

        self.update(move |entries| {
            for entry in batch {
                tracing::info!("Publishing {} ({})", entry.id, entry.file_name);
                entries.insert(entry.id.clone(), entry);
            }
        })
        .await
    }

    /// Removes an entry, returning it if it existed. The media file is left alone.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Io` - The catalog file could not be rewritten
    pub async fn remove(&self, id: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let id = id.to_string();
        self.update(move |entries| entries.remove(&id)).await
    }

    /// Applies `mutate` to the latest on-disk catalog under the file lock,
    /// persists the result, and installs it as the visible snapshot.
    async fn update<F, R>(&self, mutate: F) -> Result<R, CatalogError>
    where
        F: FnOnce(&mut EntryMap) -> R + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let catalog_path = self.catalog_path.clone();
        let lock_path = self.lock_path();

        let (entries, stamp, result) = tokio::task::spawn_blocking(move || {
            update_on_disk(&catalog_path, &lock_path, mutate)
        })
        .await
        .map_err(|e| CatalogError::Io(std::io::Error::other(e)))??;

        self.install(entries, Some(stamp));
        Ok(result)
    }

    fn install(&self, entries: EntryMap, stamp: Option<FileStamp>) {
        *self.snapshot.write() = Arc::new(CatalogSnapshot { entries });
        *self.loaded_stamp.lock() = stamp;
    }
}

#[async_trait]
impl ContentLocator for Catalog {
    async fn locate(&self, id: &str) -> Result<ContentRef, LocateError> {
        if !is_valid_content_id(id) {
            return Err(LocateError::NotFound { id: id.to_string() });
        }

        // A broken catalog write must not take down lookups of what we already have
        if let Err(e) = self.refresh().await {
            tracing::warn!("Keeping previous catalog snapshot, reload failed: {e}");
        }

        let entry = self
            .get(id)
            .ok_or_else(|| LocateError::NotFound { id: id.to_string() })?;

        stat_content(id, self.path_for(&entry), entry.media_type).await
    }
}

fn validate_entry(entry: &CatalogEntry) -> Result<(), CatalogError> {
    if !is_valid_content_id(&entry.id) {
        return Err(CatalogError::InvalidId {
            id: entry.id.clone(),
        });
    }
    if !is_contained_path(&entry.file_name) {
        return Err(CatalogError::InvalidFileName {
            name: entry.file_name.clone(),
        });
    }
    Ok(())
}

/// `path` with `suffix` appended to its file name.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn current_stamp(path: &Path) -> Result<Option<FileStamp>, CatalogError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(FileStamp::of(&meta))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn load_from_disk(path: &Path) -> Result<(EntryMap, Option<FileStamp>), CatalogError> {
    // Stamp first: if the file is replaced in between, the next refresh reloads again
    let stamp = current_stamp(path).await?;
    match tokio::fs::read(path).await {
        Ok(raw) => Ok((decode_entries(path, &raw)?, stamp)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((EntryMap::new(), None)),
        Err(e) => Err(e.into()),
    }
}

/// Parses catalog JSON, dropping entries that could escape the media directory.
fn decode_entries(path: &Path, raw: &[u8]) -> Result<EntryMap, CatalogError> {
    let file = serde_json::from_slice::<CatalogFile>(raw).map_err(|source| {
        CatalogError::Corrupt {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut entries = EntryMap::new();
    for entry in file.entries {
        if validate_entry(&entry).is_err() {
            tracing::warn!(
                "Skipping catalog entry with unusable id or path: {:?} -> {:?}",
                entry.id,
                entry.file_name
            );
            continue;
        }
        entries.insert(entry.id.clone(), entry);
    }
    Ok(entries)
}

/// Read-modify-write of the catalog file while holding the cross-process lock.
fn update_on_disk<F, R>(
    catalog_path: &Path,
    lock_path: &Path,
    mutate: F,
) -> Result<(EntryMap, FileStamp, R), CatalogError>
where
    F: FnOnce(&mut EntryMap) -> R,
{
    if let Some(parent) = catalog_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    FileExt::lock_exclusive(&lock_file)?;

    let mut entries = match std::fs::read(catalog_path) {
        Ok(raw) => decode_entries(catalog_path, &raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => EntryMap::new(),
        Err(e) => return Err(e.into()),
    };
    let result = mutate(&mut entries);

    let file = CatalogFile {
        entries: entries.values().cloned().collect(),
    };
    let encoded = serde_json::to_vec_pretty(&file).map_err(CatalogError::Encode)?;
    write_atomically(catalog_path, &encoded)?;
    let stamp = FileStamp::of(&std::fs::metadata(catalog_path)?);

    // Closing the handle releases the lock
    drop(lock_file);
    Ok((entries, stamp, result))
}

/// Replaces `path` with `contents` via a uniquely named, synced temp file and rename.
fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = sibling_path(path, &format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
