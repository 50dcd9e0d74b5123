// ─── Repository Registry ───
// Ordered package sources queried for coordinates. First match wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::artifact::{Coordinate, ModuleKey};
use super::metadata::MavenMetadata;
use crate::core::downloader::{
    part_path, verify_digests, Checksum, Downloader, PartFileGuard, StreamHasher,
};
use crate::core::error::{BuildError, BuildResult, ResolutionError};

/// Where a registry found an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    /// Name of the registry that answered.
    pub registry: String,
    /// URL for remote registries, filesystem path for local ones.
    pub uri: String,
    pub checksum: Option<Checksum>,
}

/// A package source in Maven repository layout.
#[async_trait]
pub trait Registry: Send + Sync {
    fn name(&self) -> &str;

    /// Base URL or root directory, for messages.
    fn location(&self) -> String;

    /// Find an artifact. `Ok(None)` means the registry answered "not here";
    /// `Err` means it could not be asked.
    async fn lookup(&self, coordinate: &Coordinate) -> BuildResult<Option<ArtifactLocation>>;

    /// Copy a located artifact to `dest`, verifying its checksum.
    /// `dest` must be complete or absent when this returns. Returns the SHA-1.
    async fn fetch(&self, location: &ArtifactLocation, dest: &Path) -> BuildResult<String>;

    /// Versions published for a module, `None` when the module is unknown here.
    async fn versions(&self, module: &ModuleKey) -> BuildResult<Option<Vec<String>>>;

    /// Timestamped file version of a `-SNAPSHOT` coordinate, read from the
    /// version level `maven-metadata.xml`. `None` when no metadata exists.
    async fn snapshot_version(&self, coordinate: &Coordinate) -> BuildResult<Option<String>>;
}

// ── Remote ──────────────────────────────────────────────

pub struct MavenRegistry {
    name: String,
    base_url: String,
    downloader: Arc<Downloader>,
}

impl MavenRegistry {
    pub fn new(name: &str, base_url: &str, downloader: Arc<Downloader>) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            downloader,
        }
    }

    async fn published_checksum(&self, url: &str) -> BuildResult<Option<Checksum>> {
        for kind in ["sha1", "md5"] {
            let checksum_url = format!("{url}.{kind}");
            if let Some(body) = self.downloader.fetch_optional_text(&checksum_url).await? {
                if let Some(checksum) = Checksum::from_published(kind, &body) {
                    return Ok(Some(checksum));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Registry for MavenRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> String {
        self.base_url.clone()
    }

    async fn lookup(&self, coordinate: &Coordinate) -> BuildResult<Option<ArtifactLocation>> {
        let file_version = if coordinate.is_snapshot() {
            self.snapshot_version(coordinate)
                .await?
                .unwrap_or_else(|| coordinate.version.clone())
        } else {
            coordinate.version.clone()
        };
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            coordinate.version_dir(),
            coordinate.filename_for(&file_version)
        );

        if !self.downloader.exists(&url).await? {
            debug!("{} not in {}", coordinate, self.name);
            return Ok(None);
        }

        let checksum = self.published_checksum(&url).await?;
        Ok(Some(ArtifactLocation {
            registry: self.name.clone(),
            uri: url,
            checksum,
        }))
    }

    async fn fetch(&self, location: &ArtifactLocation, dest: &Path) -> BuildResult<String> {
        self.downloader
            .download_file(&location.uri, dest, location.checksum.as_ref())
            .await
    }

    async fn versions(&self, module: &ModuleKey) -> BuildResult<Option<Vec<String>>> {
        let url = format!(
            "{}/{}/{}/maven-metadata.xml",
            self.base_url,
            module.group_path(),
            module.artifact
        );
        let Some(xml) = self.downloader.fetch_optional_text(&url).await? else {
            return Ok(None);
        };
        Ok(Some(MavenMetadata::parse(&url, &xml)?.versions()))
    }

    async fn snapshot_version(&self, coordinate: &Coordinate) -> BuildResult<Option<String>> {
        let url = format!(
            "{}/{}/maven-metadata.xml",
            self.base_url,
            coordinate.version_dir()
        );
        let Some(xml) = self.downloader.fetch_optional_text(&url).await? else {
            return Ok(None);
        };
        let metadata = MavenMetadata::parse(&url, &xml)?;
        Ok(metadata.snapshot_file_version(
            &coordinate.version,
            &coordinate.extension,
            coordinate.classifier.as_deref(),
        ))
    }
}

// ── Local ───────────────────────────────────────────────

/// A directory in Maven layout (`~/.m2/repository`, test fixtures).
pub struct LocalRegistry {
    name: String,
    root: PathBuf,
}

impl LocalRegistry {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            root: root.into(),
        }
    }

    /// `~/.m2/repository`
    pub fn maven_local() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new("mavenLocal", home.join(".m2").join("repository")))
    }

    fn sidecar_checksum(path: &Path) -> Option<Checksum> {
        ["sha1", "md5"].into_iter().find_map(|kind| {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(format!(".{kind}"));
            let body = std::fs::read_to_string(PathBuf::from(sidecar)).ok()?;
            Checksum::from_published(kind, &body)
        })
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn lookup(&self, coordinate: &Coordinate) -> BuildResult<Option<ArtifactLocation>> {
        if !self.root.is_dir() {
            return Err(BuildError::Io {
                path: self.root.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "local registry directory is missing",
                ),
            });
        }

        let direct = self.root.join(coordinate.local_path());
        let path = if direct.is_file() {
            Some(direct)
        } else if coordinate.is_snapshot() {
            self.snapshot_version(coordinate)
                .await?
                .map(|file_version| {
                    self.root
                        .join(coordinate.version_dir())
                        .join(coordinate.filename_for(&file_version))
                })
                .filter(|p| p.is_file())
        } else {
            None
        };

        Ok(path.map(|path| ArtifactLocation {
            registry: self.name.clone(),
            checksum: Self::sidecar_checksum(&path),
            uri: path.to_string_lossy().to_string(),
        }))
    }

    async fn fetch(&self, location: &ArtifactLocation, dest: &Path) -> BuildResult<String> {
        let source = PathBuf::from(&location.uri);
        let bytes = tokio::fs::read(&source)
            .await
            .map_err(|e| BuildError::Io {
                path: source.clone(),
                source: e,
            })?;

        let mut hasher = StreamHasher::default();
        hasher.update(&bytes);
        let (sha1, md5) = hasher.finish();
        verify_digests(dest, location.checksum.as_ref(), &sha1, &md5)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        let guard = PartFileGuard::new(part_path(dest));
        tokio::fs::write(guard.path(), &bytes)
            .await
            .map_err(|e| BuildError::Io {
                path: guard.path().to_path_buf(),
                source: e,
            })?;
        guard.promote(dest).await?;
        Ok(sha1)
    }

    async fn versions(&self, module: &ModuleKey) -> BuildResult<Option<Vec<String>>> {
        let module_dir = self.root.join(module.group_path()).join(&module.artifact);
        let metadata_path = module_dir.join("maven-metadata.xml");
        if let Ok(xml) = tokio::fs::read_to_string(&metadata_path).await {
            let metadata = MavenMetadata::parse(&metadata_path.to_string_lossy(), &xml)?;
            return Ok(Some(metadata.versions()));
        }

        let mut entries = match tokio::fs::read_dir(&module_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| BuildError::Io {
            path: module_dir.clone(),
            source: e,
        })? {
            if entry.path().is_dir() {
                versions.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        versions.sort();
        Ok(Some(versions))
    }

    async fn snapshot_version(&self, coordinate: &Coordinate) -> BuildResult<Option<String>> {
        let metadata_path = self
            .root
            .join(coordinate.version_dir())
            .join("maven-metadata.xml");
        let Ok(xml) = tokio::fs::read_to_string(&metadata_path).await else {
            return Ok(None);
        };
        let metadata = MavenMetadata::parse(&metadata_path.to_string_lossy(), &xml)?;
        Ok(metadata.snapshot_file_version(
            &coordinate.version,
            &coordinate.extension,
            coordinate.classifier.as_deref(),
        ))
    }
}

// ── Ordered list ────────────────────────────────────────

/// Registries in query order. Insertion order is precedence.
#[derive(Clone, Default)]
pub struct RegistryList {
    registries: Vec<Arc<dyn Registry>>,
}

impl fmt::Debug for RegistryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl RegistryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registries.push(registry);
        self
    }

    pub fn push(&mut self, registry: Arc<dyn Registry>) {
        self.registries.push(registry);
    }

    /// Maven Central, then the PaperMC repository.
    pub fn defaults(downloader: Arc<Downloader>) -> Self {
        Self::new()
            .with(Arc::new(MavenRegistry::new(
                "central",
                super::MAVEN_CENTRAL,
                downloader.clone(),
            )))
            .with(Arc::new(MavenRegistry::new(
                "papermc",
                super::PAPER_MAVEN,
                downloader,
            )))
    }

    pub fn resolve_registries(&self) -> &[Arc<dyn Registry>] {
        &self.registries
    }

    pub fn names(&self) -> Vec<String> {
        self.registries.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Query registries in order until one has the artifact.
    ///
    /// Unreachable registries are skipped. When nothing matched and at least
    /// one registry could not be asked the failure is reported as
    /// `RegistriesUnreachable`, which is transient; otherwise it is a
    /// definitive `CoordinateNotFound`.
    pub async fn locate(
        &self,
        coordinate: &Coordinate,
    ) -> BuildResult<(Arc<dyn Registry>, ArtifactLocation)> {
        let mut failures = Vec::new();
        for registry in &self.registries {
            match registry.lookup(coordinate).await {
                Ok(Some(location)) => {
                    debug!("Found {} in {}", coordinate, registry.name());
                    return Ok((registry.clone(), location));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "Registry {} unreachable while looking up {}: {}",
                        registry.name(),
                        coordinate,
                        e
                    );
                    failures.push(format!("{}: {}", registry.name(), e));
                }
            }
        }

        if failures.is_empty() {
            Err(ResolutionError::CoordinateNotFound {
                coordinate: coordinate.to_string(),
                searched: self.names(),
            }
            .into())
        } else {
            Err(ResolutionError::RegistriesUnreachable {
                coordinate: coordinate.to_string(),
                failures,
            }
            .into())
        }
    }

    /// Locate and fetch in one step. Returns where it came from and its SHA-1.
    pub async fn fetch_to(
        &self,
        coordinate: &Coordinate,
        dest: &Path,
    ) -> BuildResult<(ArtifactLocation, String)> {
        let (registry, location) = self.locate(coordinate).await?;
        let sha1 = registry.fetch(&location, dest).await?;
        Ok((location, sha1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(root: &Path, coord: &str, body: &[u8]) {
        let coordinate = Coordinate::parse(coord).unwrap();
        let path = root.join(coordinate.local_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn first_registry_with_the_artifact_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        publish(first.path(), "com.example:lib:1.0", b"first");
        publish(second.path(), "com.example:lib:1.0", b"second");

        let list = RegistryList::new()
            .with(Arc::new(LocalRegistry::new("one", first.path())))
            .with(Arc::new(LocalRegistry::new("two", second.path())));

        let (_, location) = list
            .locate(&Coordinate::parse("com.example:lib:1.0").unwrap())
            .await
            .unwrap();
        assert_eq!(location.registry, "one");
    }

    #[tokio::test]
    async fn unreachable_registry_falls_through() {
        let present = tempfile::tempdir().unwrap();
        publish(present.path(), "com.example:lib:1.0", b"jar");

        let list = RegistryList::new()
            .with(Arc::new(LocalRegistry::new("gone", "/nonexistent/plugsmith/repo")))
            .with(Arc::new(LocalRegistry::new("present", present.path())));

        let (_, location) = list
            .locate(&Coordinate::parse("com.example:lib:1.0").unwrap())
            .await
            .unwrap();
        assert_eq!(location.registry, "present");
    }

    #[tokio::test]
    async fn exhaustion_names_the_coordinate() {
        let empty = tempfile::tempdir().unwrap();
        let list = RegistryList::new().with(Arc::new(LocalRegistry::new("empty", empty.path())));
        let err = match list
            .locate(&Coordinate::parse("com.example:missing:2.0").unwrap())
            .await
        {
            Ok((_, location)) => panic!("unexpected location {location:?}"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            BuildError::Resolution(ResolutionError::CoordinateNotFound { ref coordinate, .. })
                if coordinate == "com.example:missing:2.0"
        ));
    }

    #[tokio::test]
    async fn sidecar_checksum_is_enforced() {
        let repo = tempfile::tempdir().unwrap();
        publish(repo.path(), "com.example:lib:1.0", b"payload");
        let jar = repo
            .path()
            .join(Coordinate::parse("com.example:lib:1.0").unwrap().local_path());
        std::fs::write(
            format!("{}.sha1", jar.display()),
            "0000000000000000000000000000000000000000",
        )
        .unwrap();

        let registry = LocalRegistry::new("repo", repo.path());
        let coordinate = Coordinate::parse("com.example:lib:1.0").unwrap();
        let location = registry.lookup(&coordinate).await.unwrap().unwrap();

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("lib-1.0.jar");
        let err = registry.fetch(&location, &dest).await.unwrap_err();
        assert!(matches!(err, BuildError::ChecksumMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn local_versions_list_directories() {
        let repo = tempfile::tempdir().unwrap();
        publish(repo.path(), "com.example:lib:1.0", b"a");
        publish(repo.path(), "com.example:lib:1.1", b"b");
        let registry = LocalRegistry::new("repo", repo.path());
        let versions = registry
            .versions(&Coordinate::parse("com.example:lib:1.0").unwrap().module_key())
            .await
            .unwrap();
        assert_eq!(versions, Some(vec!["1.0".to_string(), "1.1".to_string()]));
    }
}
