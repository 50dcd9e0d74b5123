use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::core::downloader::{is_part_file, Downloader};
use crate::core::error::{BuildError, BuildResult, ResolutionError};
use crate::core::maven::{Coordinate, RegistryList};
use crate::core::resilience::{retry_transient, RetryPolicy};

/// A file present in the local artifact cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub coordinate: Coordinate,
    pub path: PathBuf,
    pub sha1: String,
    /// Registry that served the file, `None` when it was already on disk.
    pub registry: Option<String>,
}

/// On-disk artifact cache in Maven layout, with per-coordinate single flight.
///
/// Every coordinate owns one `OnceCell` in the arena. Concurrent callers for
/// the same coordinate wait on that cell, so one fetch runs per key while
/// unrelated keys proceed independently. A failed or cancelled fetch leaves
/// the cell empty and the next caller tries again.
pub struct ArtifactCache {
    root: PathBuf,
    registries: RegistryList,
    retry: RetryPolicy,
    offline: bool,
    entries: DashMap<Coordinate, Arc<OnceCell<Arc<CachedFile>>>>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>, registries: RegistryList, retry: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            registries,
            retry,
            offline: false,
            entries: DashMap::new(),
        }
    }

    /// Serve only what is already cached.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registries(&self) -> &RegistryList {
        &self.registries
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn path_for(&self, coordinate: &Coordinate) -> PathBuf {
        self.root.join(coordinate.local_path())
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.path_for(coordinate).is_file()
    }

    /// Return the cached file for `coordinate`, fetching it on first use.
    pub async fn get(&self, coordinate: &Coordinate) -> BuildResult<Arc<CachedFile>> {
        // Clone the cell out so no map shard stays locked across the await.
        let cell = self
            .entries
            .entry(coordinate.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| self.materialize(coordinate))
            .await
            .cloned()
    }

    async fn materialize(&self, coordinate: &Coordinate) -> BuildResult<Arc<CachedFile>> {
        let dest = self.path_for(coordinate);
        if dest.is_file() {
            debug!("Cache hit for {}", coordinate);
            let sha1 = Downloader::sha1_of(&dest).await?;
            return Ok(Arc::new(CachedFile {
                coordinate: coordinate.clone(),
                path: dest,
                sha1,
                registry: None,
            }));
        }

        if self.offline {
            return Err(ResolutionError::CoordinateNotFound {
                coordinate: coordinate.to_string(),
                searched: vec![format!("offline cache {}", self.root.display())],
            }
            .into());
        }

        let label = format!("Fetching {}", coordinate);
        let (location, sha1) = retry_transient(&self.retry, &label, || {
            self.registries.fetch_to(coordinate, &dest)
        })
        .await?;

        info!("Cached {} from {}", coordinate, location.registry);
        Ok(Arc::new(CachedFile {
            coordinate: coordinate.clone(),
            path: dest,
            sha1,
            registry: Some(location.registry),
        }))
    }

    /// Forget every entry and delete the cache directory.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn clear(&self) -> BuildResult<()> {
        self.entries.clear();
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!("Artifact cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildError::Io {
                path: self.root.clone(),
                source: e,
            }),
        }
    }

    /// Delete `.part` leftovers of interrupted downloads last written more
    /// than `min_age` ago. Younger files may belong to a download still in
    /// flight in another process. Returns how many were removed.
    pub async fn sweep_partials(&self, min_age: Duration) -> BuildResult<usize> {
        let root = self.root.clone();
        let removed = tokio::task::spawn_blocking(move || sweep_dir(&root, min_age))
            .await
            .map_err(|e| BuildError::Other(format!("Partial file sweep panicked: {e}")))??;
        if removed > 0 {
            info!("Removed {} stale partial download(s)", removed);
        }
        Ok(removed)
    }
}

fn sweep_dir(root: &Path, min_age: Duration) -> BuildResult<usize> {
    if !root.is_dir() {
        return Ok(0);
    }
    let now = SystemTime::now();
    let mut removed = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| BuildError::Io {
            path: dir.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if !is_part_file(&path) {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < min_age {
                debug!("Keeping in-flight partial {:?}", path);
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // another process finished or cleaned it first
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::Io { path, source: e }),
            }
        }
    }
    Ok(removed)
}
