use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::paths::{javac_beside, locate_java_binary};
use crate::core::downloader::PartFileGuard;
use crate::core::error::{BuildError, BuildResult, ToolchainError};
use crate::core::resilience::{retry_transient, RetryPolicy};

pub const DEFAULT_ADOPTIUM_API: &str = "https://api.adoptium.net/v3/assets/latest";
const RUNTIME_SCHEMA_VERSION: u32 = 1;
const RUNTIME_METADATA_FILE: &str = "runtime.json";
const RUNTIME_LOCK_STALE_SECS: i64 = 60 * 10;
const MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;

/// What probing a `java` binary reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// `runtime.json`, written next to every provisioned runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    pub schema_version: u32,
    pub identifier: String,
    pub major: u32,
    pub vendor: String,
    pub version: String,
    pub arch: String,
    pub os: String,
    pub sha256_archive: String,
    pub installed_at: String,
    pub source_url: String,
    pub java_bin_rel: Option<String>,
}

/// A runtime found under the managed runtimes directory.
#[derive(Debug, Clone)]
pub struct ManagedRuntime {
    pub metadata: RuntimeMetadata,
    pub root: PathBuf,
    pub java_bin: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumRelease {
    binary: AdoptiumBinary,
    version: AdoptiumVersion,
}

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumBinary {
    package: AdoptiumPackage,
}

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumPackage {
    checksum: String,
    link: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumVersion {
    openjdk_version: String,
}

/// A concrete download chosen from the Adoptium API.
#[derive(Debug, Clone)]
struct DownloadRuntimeSpec {
    major: u32,
    arch: String,
    vendor: String,
    version: String,
    url: String,
    archive_name: String,
    sha256: String,
}

// ── Provisioning ────────────────────────────────────────

/// Downloads and installs Temurin JDKs into the managed runtimes directory.
#[derive(Debug, Clone)]
pub struct RuntimeProvisioner {
    runtimes_root: PathBuf,
    api_base: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl RuntimeProvisioner {
    pub fn new(
        runtimes_root: impl Into<PathBuf>,
        api_base: &str,
        client: reqwest::Client,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            runtimes_root: runtimes_root.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }

    pub fn runtimes_root(&self) -> &Path {
        &self.runtimes_root
    }

    /// Install a JDK of exactly `major`, returning its `java` binary.
    ///
    /// Concurrent installs of the same major are serialised through a lock
    /// file; the loser of the race reuses the winner's runtime. Any failure is
    /// reported as `Toolchain::Unavailable` naming the version and the path.
    #[instrument(skip(self), fields(root = %self.runtimes_root.display()))]
    pub async fn provision(&self, major: u32) -> BuildResult<PathBuf> {
        let arch = platform::platform_arch();
        self.install(major, &arch).await.map_err(|e| match e {
            BuildError::Cancelled | BuildError::Toolchain(_) => e,
            other => ToolchainError::Unavailable {
                major,
                install_path: self.runtimes_root.clone(),
                reason: other.to_string(),
            }
            .into(),
        })
    }

    async fn install(&self, major: u32, arch: &str) -> BuildResult<PathBuf> {
        tokio::fs::create_dir_all(&self.runtimes_root)
            .await
            .map_err(|source| BuildError::Io {
                path: self.runtimes_root.clone(),
                source,
            })?;
        cleanup_abandoned_runtime_locks(&self.runtimes_root).await;

        let lock_path = self.runtimes_root.join(format!("java{major}.lock"));
        let _lock = acquire_runtime_lock(&lock_path).await?;

        if let Some(existing) = best_managed_runtime(&self.runtimes_root, major).await {
            info!(
                "Java {} was provisioned concurrently at {:?}",
                major, existing.root
            );
            return Ok(existing.java_bin);
        }

        let spec = retry_transient(&self.retry, "Querying Adoptium", || {
            download::fetch_runtime_spec(&self.client, &self.api_base, major, arch)
        })
        .await?;

        let identifier = format!(
            "java{}-{}-{}-{}",
            spec.major,
            spec.vendor.to_lowercase(),
            normalize_version_for_id(&spec.version),
            spec.arch
        );
        let runtime_root = self.runtimes_root.join(&identifier);
        let temp_dir = self.runtimes_root.join("temp");
        let staging = StagingDir::new(temp_dir.join(format!("{}_dir", Uuid::new_v4())));
        let archive_path = temp_dir.join(&spec.archive_name);

        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|source| BuildError::Io {
                path: temp_dir.clone(),
                source,
            })?;

        ensure_min_disk_space(&self.runtimes_root, MIN_FREE_DISK_BYTES)?;
        let download_start = Instant::now();
        info!("Downloading runtime {} from {}", identifier, spec.url);
        let archive = retry_transient(&self.retry, "Downloading runtime", || {
            download::download_with_sha256(&self.client, &spec.url, &archive_path, &spec.sha256)
        })
        .await?;
        info!("Runtime download finished in {:?}", download_start.elapsed());

        ensure_min_disk_space(&self.runtimes_root, MIN_FREE_DISK_BYTES)?;
        let extract_start = Instant::now();
        let archive_file = archive.path().to_path_buf();
        let staging_path = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract::extract_archive(&archive_file, &staging_path))
            .await
            .map_err(|e| BuildError::Other(format!("Extraction task failed: {e}")))??;
        drop(archive);
        info!("Runtime extraction finished in {:?}", extract_start.elapsed());

        ensure_executable(staging.path())?;

        let java_bin = locate_java_binary(staging.path());
        let probed = probe_blocking(java_bin.clone()).await;
        if probed.as_ref().map(|p| p.major) != Some(major) {
            return Err(BuildError::Other(format!(
                "downloaded runtime failed validation: {} is not a working Java {}",
                java_bin.display(),
                major
            )));
        }
        if javac_beside(&java_bin).is_none() {
            return Err(ToolchainError::MissingCompiler {
                major,
                java_home: staging.path().to_path_buf(),
            }
            .into());
        }

        let metadata = RuntimeMetadata {
            schema_version: RUNTIME_SCHEMA_VERSION,
            identifier: identifier.clone(),
            major,
            vendor: spec.vendor,
            version: spec.version,
            arch: spec.arch,
            os: platform::platform_os().to_string(),
            sha256_archive: spec.sha256,
            installed_at: Utc::now().to_rfc3339(),
            source_url: spec.url,
            java_bin_rel: java_bin
                .strip_prefix(staging.path())
                .ok()
                .map(|p| p.to_string_lossy().to_string()),
        };
        write_runtime_metadata(staging.path(), &metadata).await?;

        if runtime_root.exists() {
            tokio::fs::remove_dir_all(&runtime_root)
                .await
                .map_err(|source| BuildError::Io {
                    path: runtime_root.clone(),
                    source,
                })?;
        }
        staging.promote(&runtime_root).await?;

        let final_java = locate_java_binary(&runtime_root);
        info!("Provisioned Java {} at {:?}", major, runtime_root);
        Ok(final_java)
    }
}

/// Temporary extraction directory, deleted unless promoted.
struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn promote(mut self, dest: &Path) -> BuildResult<()> {
        tokio::fs::rename(&self.path, dest)
            .await
            .map_err(|source| BuildError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

async fn write_runtime_metadata(runtime_root: &Path, metadata: &RuntimeMetadata) -> BuildResult<()> {
    let metadata_path = runtime_root.join(RUNTIME_METADATA_FILE);
    let payload = serde_json::to_vec_pretty(metadata)?;
    tokio::fs::write(&metadata_path, payload)
        .await
        .map_err(|source| BuildError::Io {
            path: metadata_path,
            source,
        })
}

// ── Locking ─────────────────────────────────────────────

async fn acquire_runtime_lock(lock_path: &Path) -> BuildResult<RuntimeLockGuard> {
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        match tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(lock_path)
            .await
        {
            Ok(mut file) => {
                let payload = serde_json::json!({
                    "pid": std::process::id(),
                    "timestamp": Utc::now().timestamp(),
                });
                file.write_all(payload.to_string().as_bytes())
                    .await
                    .map_err(|source| BuildError::Io {
                        path: lock_path.to_path_buf(),
                        source,
                    })?;
                return Ok(RuntimeLockGuard {
                    path: lock_path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                cleanup_stale_lock(lock_path).await;
                if attempts % 20 == 0 {
                    info!("Waiting for runtime lock at {:?}", lock_path);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(source) => {
                return Err(BuildError::Io {
                    path: lock_path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

async fn cleanup_stale_lock(lock_path: &Path) {
    let Ok(content) = tokio::fs::read_to_string(lock_path).await else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        return;
    };
    let pid = value
        .get("pid")
        .and_then(|v| v.as_u64())
        .unwrap_or_default() as u32;
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    let expired = Utc::now().timestamp().saturating_sub(timestamp) > RUNTIME_LOCK_STALE_SECS;

    #[cfg(target_os = "linux")]
    let dead = !PathBuf::from(format!("/proc/{pid}")).exists();
    #[cfg(not(target_os = "linux"))]
    let dead = {
        let _ = pid;
        false
    };

    if expired || dead {
        warn!("Removing stale runtime lock {:?}", lock_path);
        let _ = tokio::fs::remove_file(lock_path).await;
    }
}

async fn cleanup_abandoned_runtime_locks(runtimes_root: &Path) {
    let mut entries = match tokio::fs::read_dir(runtimes_root).await {
        Ok(entries) => entries,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("lock") {
            cleanup_stale_lock(&path).await;
        }
    }
}

struct RuntimeLockGuard {
    path: PathBuf,
}

impl Drop for RuntimeLockGuard {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {:?}: {}", self.path, source);
        }
    }
}

fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> BuildResult<()> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    match available {
        Some(bytes) if bytes < minimum_bytes => Err(BuildError::Other(format!(
            "insufficient disk space at {}: {} bytes available, {} required",
            path.display(),
            bytes,
            minimum_bytes
        ))),
        _ => Ok(()),
    }
}

fn ensure_executable(runtime_root: &Path) -> BuildResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let java_bin = locate_java_binary(runtime_root);
        let bins = [Some(java_bin.clone()), javac_beside(&java_bin)];
        for bin in bins.into_iter().flatten().filter(|b| b.exists()) {
            let mut perms = std::fs::metadata(&bin)
                .map_err(|source| BuildError::Io {
                    path: bin.clone(),
                    source,
                })?
                .permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&bin, perms).map_err(|source| BuildError::Io {
                path: bin.clone(),
                source,
            })?;
        }
    }
    #[cfg(not(unix))]
    let _ = runtime_root;
    Ok(())
}

// ── Managed runtimes ────────────────────────────────────

/// Every runtime under `runtimes_root` with a readable `runtime.json` for
/// the current architecture. A missing directory yields nothing.
pub async fn scan_managed_runtimes(runtimes_root: &Path) -> Vec<ManagedRuntime> {
    let arch = platform::platform_arch();
    let mut runtimes = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(runtimes_root).await else {
        return runtimes;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let root = entry.path();
        if !root.is_dir() || root.file_name().and_then(|n| n.to_str()) == Some("temp") {
            continue;
        }

        let Ok(bytes) = tokio::fs::read(root.join(RUNTIME_METADATA_FILE)).await else {
            continue;
        };
        let metadata: RuntimeMetadata = match serde_json::from_slice(&bytes) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring runtime at {:?}: unreadable metadata: {}", root, e);
                continue;
            }
        };
        if metadata.arch != arch {
            continue;
        }

        let java_bin = metadata
            .java_bin_rel
            .as_ref()
            .map(|relative| root.join(relative))
            .filter(|p| p.exists())
            .unwrap_or_else(|| locate_java_binary(&root));
        runtimes.push(ManagedRuntime {
            metadata,
            root,
            java_bin,
        });
    }

    runtimes.sort_by(|a, b| a.root.cmp(&b.root));
    runtimes
}

/// Newest managed runtime of exactly `major` that still probes correctly.
pub async fn best_managed_runtime(runtimes_root: &Path, major: u32) -> Option<ManagedRuntime> {
    let mut candidates = Vec::new();
    for runtime in scan_managed_runtimes(runtimes_root).await {
        if runtime.metadata.major != major {
            continue;
        }
        match probe_blocking(runtime.java_bin.clone()).await {
            Some(probed) if probed.major == major => candidates.push(runtime),
            _ => warn!("Managed runtime at {:?} failed validation", runtime.root),
        }
    }

    candidates.sort_by(|a, b| {
        compare_java_versions(&a.metadata.version, &b.metadata.version)
            .unwrap_or(Ordering::Equal)
            .reverse()
    });
    candidates.into_iter().next()
}

// ── Probing ─────────────────────────────────────────────

/// Run `java -XshowSettings:properties -version` off the async runtime.
pub async fn probe_blocking(path: PathBuf) -> Option<JavaInstallation> {
    tokio::task::spawn_blocking(move || probe_java(&path))
        .await
        .ok()
        .flatten()
}

#[instrument]
pub fn probe_java(path: &Path) -> Option<JavaInstallation> {
    let output = Command::new(path)
        .args(["-XshowSettings:properties", "-version"])
        .output()
        .ok()?;

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!("Probing {:?}: {}", path, text.lines().next().unwrap_or(""));
    parse_probe_output(path, &text)
}

fn parse_probe_output(path: &Path, text: &str) -> Option<JavaInstallation> {
    let version = property(text, "java.version").or_else(|| quoted_version(text))?;
    let major = parse_major_version(&version);
    if major == 0 {
        return None;
    }

    let lower = text.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64");

    Some(JavaInstallation {
        path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
        version,
        major,
        is_64bit,
        vendor: parse_vendor(text),
    })
}

/// `    key = value` lines of `-XshowSettings:properties`.
fn property(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

/// First quoted token, as in `openjdk version "21.0.5" 2024-10-15`.
fn quoted_version(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

fn parse_vendor(text: &str) -> String {
    if let Some(vendor) = property(text, "java.vendor") {
        return vendor;
    }
    for line in text.lines() {
        if line.contains("Temurin") {
            return "Temurin".to_string();
        }
        if line.contains("OpenJDK") {
            return "OpenJDK".to_string();
        }
    }
    "unknown".to_string()
}

/// `17.0.8` -> 17, `1.8.0_392` -> 8.
pub fn parse_major_version(version: &str) -> u32 {
    let first_part = version.split('.').next().unwrap_or("0");
    let first_part = first_part.split(['-', '+']).next().unwrap_or("0");
    let major: u32 = first_part.parse().unwrap_or(0);

    if major == 1 {
        version
            .split('.')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(major)
    } else {
        major
    }
}

fn parse_java_version(version: &str) -> Option<(u32, u32, u32, u32)> {
    let cleaned = clean_openjdk_version(version);
    let (core, build) = cleaned.split_once('+').unwrap_or((cleaned.as_str(), "0"));
    let mut nums = core
        .split(['.', '_'])
        .filter_map(|part| part.parse::<u32>().ok())
        .collect::<Vec<_>>();
    if nums.is_empty() {
        return None;
    }
    while nums.len() < 3 {
        nums.push(0);
    }
    let build = build
        .split('.')
        .next()
        .and_then(|b| b.parse::<u32>().ok())
        .unwrap_or(0);
    Some((nums[0], nums[1], nums[2], build))
}

pub fn compare_java_versions(left: &str, right: &str) -> Option<Ordering> {
    let l = parse_java_version(left)?;
    let r = parse_java_version(right)?;
    Some(l.cmp(&r))
}

fn clean_openjdk_version(raw: &str) -> String {
    raw.split('-').next().unwrap_or(raw).to_string()
}

fn normalize_version_for_id(version: &str) -> String {
    version.replace('+', "_").replace(' ', "")
}

pub mod platform {
    pub fn platform_arch() -> String {
        match std::env::consts::ARCH {
            "x86_64" => "x64".to_string(),
            "aarch64" => "aarch64".to_string(),
            other => other.to_string(),
        }
    }

    pub fn platform_os() -> &'static str {
        match std::env::consts::OS {
            "windows" => "windows",
            "macos" => "mac",
            _ => "linux",
        }
    }
}

mod download {
    use super::*;

    pub(super) async fn fetch_runtime_spec(
        client: &reqwest::Client,
        api_base: &str,
        major: u32,
        arch: &str,
    ) -> BuildResult<DownloadRuntimeSpec> {
        let api_url = format!(
            "{}/{}/hotspot?architecture={}&image_type=jdk&os={}&vendor=eclipse",
            api_base,
            major,
            arch,
            platform::platform_os()
        );

        let response = client.get(&api_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BuildError::DownloadFailed {
                url: api_url,
                status: status.as_u16(),
            });
        }

        let releases: Vec<AdoptiumRelease> = response.json().await?;
        let Some(found) = releases.into_iter().next() else {
            return Err(BuildError::Other(format!(
                "no Temurin JDK {major} is published for {} {arch}",
                platform::platform_os()
            )));
        };

        Ok(DownloadRuntimeSpec {
            major,
            arch: arch.to_string(),
            vendor: "Temurin".to_string(),
            version: clean_openjdk_version(&found.version.openjdk_version),
            url: found.binary.package.link,
            archive_name: found.binary.package.name,
            sha256: found.binary.package.checksum,
        })
    }

    /// Stream `url` into a part file beside `output_path` and verify its
    /// SHA-256. The returned guard owns the finished archive.
    pub(super) async fn download_with_sha256(
        client: &reqwest::Client,
        url: &str,
        output_path: &Path,
        expected_sha256: &str,
    ) -> BuildResult<PartFileGuard> {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BuildError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let guard = PartFileGuard::new(crate::core::downloader::part_path(output_path));
        let mut file = tokio::fs::File::create(guard.path())
            .await
            .map_err(|source| BuildError::Io {
                path: guard.path().to_path_buf(),
                source,
            })?;

        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|source| BuildError::Io {
                    path: guard.path().to_path_buf(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| BuildError::Io {
            path: guard.path().to_path_buf(),
            source,
        })?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected_sha256.trim()) {
            return Err(BuildError::ChecksumMismatch {
                path: output_path.to_path_buf(),
                algorithm: "SHA-256",
                expected: expected_sha256.to_string(),
                actual,
            });
        }
        Ok(guard)
    }
}

pub(crate) mod extract {
    use super::*;
    use std::io::Read;

    /// Unpack a JDK archive into `runtime_root`, dropping the archive's
    /// top-level directory. `.zip` and `.tar.gz` are supported.
    pub fn extract_archive(archive: &Path, runtime_root: &Path) -> BuildResult<()> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        // the guard's random suffix sits after the real extension
        let name = name.trim_end_matches(".part");
        if name.contains(".zip") {
            extract_zip_file(archive, runtime_root)
        } else if name.contains(".tar.gz") || name.contains(".tgz") {
            extract_tar_gz_file(archive, runtime_root)
        } else {
            Err(BuildError::Other(format!(
                "unsupported runtime archive format: {name}"
            )))
        }
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError + '_ {
        move |source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Strip the first component and reject anything escaping the root.
    fn strip_top_level(path: &Path) -> Option<PathBuf> {
        let mut rel_path = PathBuf::new();
        let mut components = path.components();
        let _ = components.next();
        for component in components {
            match component {
                Component::Normal(part) => rel_path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        (!rel_path.as_os_str().is_empty()).then_some(rel_path)
    }

    fn reset_root(runtime_root: &Path) -> BuildResult<()> {
        if runtime_root.exists() {
            std::fs::remove_dir_all(runtime_root).map_err(io_err(runtime_root))?;
        }
        std::fs::create_dir_all(runtime_root).map_err(io_err(runtime_root))
    }

    pub fn extract_zip_file(zip_path: &Path, runtime_root: &Path) -> BuildResult<()> {
        let zip_file = std::fs::File::open(zip_path).map_err(io_err(zip_path))?;
        let mut archive = zip::ZipArchive::new(zip_file)?;
        reset_root(runtime_root)?;

        for index in 0..archive.len() {
            let mut zipped = archive.by_index(index)?;
            let enclosed_name = zipped
                .enclosed_name()
                .ok_or_else(|| BuildError::Other(format!("invalid zip entry {}", zipped.name())))?;
            let Some(rel_path) = strip_top_level(&enclosed_name) else {
                continue;
            };

            let out_path = runtime_root.join(rel_path);
            if zipped.is_dir() {
                std::fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            let mut out = std::fs::File::create(&out_path).map_err(io_err(&out_path))?;
            std::io::copy(&mut zipped, &mut out).map_err(io_err(&out_path))?;
        }
        Ok(())
    }

    pub fn extract_tar_gz_file(tar_path: &Path, runtime_root: &Path) -> BuildResult<()> {
        let file = std::fs::File::open(tar_path).map_err(io_err(tar_path))?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        reset_root(runtime_root)?;

        for entry in archive.entries().map_err(io_err(tar_path))? {
            let mut entry = entry.map_err(io_err(tar_path))?;
            let entry_path = entry.path().map_err(io_err(tar_path))?.into_owned();
            let Some(rel_path) = strip_top_level(&entry_path) else {
                continue;
            };
            let out_path = runtime_root.join(rel_path);

            match entry.header().entry_type() {
                tar::EntryType::Directory => {
                    std::fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
                }
                tar::EntryType::Regular | tar::EntryType::Symlink | tar::EntryType::Link => {
                    if let Some(parent) = out_path.parent() {
                        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
                    }
                    entry.unpack(&out_path).map_err(io_err(&out_path))?;
                }
                _ => {
                    let mut sink = Vec::new();
                    entry.read_to_end(&mut sink).map_err(io_err(tar_path))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_major_modern_and_legacy() {
        assert_eq!(parse_major_version("17.0.8"), 17);
        assert_eq!(parse_major_version("21"), 21);
        assert_eq!(parse_major_version("22-ea"), 22);
        assert_eq!(parse_major_version("1.8.0_392"), 8);
    }

    #[test]
    fn java_version_comparison_prefers_newer() {
        assert_eq!(
            compare_java_versions("21.0.2+13", "21.0.3+7"),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_java_versions("21.0.5", "21.0.5"),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn probe_output_prefers_properties() {
        let text = r#"Property settings:
    java.vendor = Eclipse Adoptium
    java.version = 21.0.5
    os.arch = amd64

openjdk version "21.0.5" 2024-10-15 LTS
OpenJDK Runtime Environment Temurin-21.0.5+11 (build 21.0.5+11-LTS)"#;
        let probed = parse_probe_output(Path::new("/nonexistent/java"), text).unwrap();
        assert_eq!(probed.major, 21);
        assert_eq!(probed.version, "21.0.5");
        assert_eq!(probed.vendor, "Eclipse Adoptium");
        assert!(probed.is_64bit);
    }

    #[test]
    fn probe_output_falls_back_to_banner() {
        let text = "openjdk version \"17.0.12\" 2024-07-16\nOpenJDK Runtime Environment";
        let probed = parse_probe_output(Path::new("java"), text).unwrap();
        assert_eq!(probed.major, 17);
        assert_eq!(probed.vendor, "OpenJDK");
        assert!(parse_probe_output(Path::new("java"), "command not found").is_none());
    }

    #[test]
    fn tar_gz_is_extracted_without_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("OpenJDK21U-jdk_x64_linux_hotspot_21.0.5_11.tar.gz");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
            let mut builder = tar::Builder::new(encoder);
            let body = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "jdk-21.0.5+11/bin/java", &body[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let root = dir.path().join("runtime");
        extract::extract_archive(&archive_path, &root).unwrap();
        assert!(root.join("bin").join("java").is_file());
    }

    #[test]
    fn unknown_archive_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("jdk.rar");
        std::fs::write(&archive, b"").unwrap();
        assert!(extract::extract_archive(&archive, &dir.path().join("out")).is_err());
    }

    #[tokio::test]
    async fn stale_lock_from_dead_process_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("java21.lock");
        std::fs::write(&lock, r#"{"pid": 0, "timestamp": 0}"#).unwrap();
        cleanup_stale_lock(&lock).await;
        assert!(!lock.exists());

        let guard = acquire_runtime_lock(&lock).await.unwrap();
        assert!(lock.exists());
        drop(guard);
        assert!(!lock.exists());
    }
}
