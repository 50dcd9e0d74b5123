use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use md5::Md5;
use reqwest::{Client, StatusCode};
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::error::{BuildError, BuildResult};
use crate::core::http::build_http_client;

/// A checksum published next to an artifact (`.sha1` / `.md5`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Sha1(String),
    Md5(String),
}

impl Checksum {
    /// Parse the body of a `.sha1`/`.md5` file: first whitespace-separated
    /// token, lowercase. Some repositories append the file name.
    pub fn from_published(kind: &str, body: &str) -> Option<Self> {
        let token = body.split_whitespace().next()?.to_ascii_lowercase();
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match kind {
            "sha1" if token.len() == 40 => Some(Checksum::Sha1(token)),
            "md5" if token.len() == 32 => Some(Checksum::Md5(token)),
            _ => None,
        }
    }

    fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Sha1(_) => "SHA-1",
            Checksum::Md5(_) => "MD5",
        }
    }

    fn expected(&self) -> &str {
        match self {
            Checksum::Sha1(v) | Checksum::Md5(v) => v,
        }
    }
}

/// Incremental hasher covering both published checksum kinds.
#[derive(Default)]
pub struct StreamHasher {
    sha1: Sha1,
    md5: Md5,
}

impl StreamHasher {
    pub fn update(&mut self, bytes: &[u8]) {
        self.sha1.update(bytes);
        self.md5.update(bytes);
    }

    /// Returns `(sha1, md5)` hex digests.
    pub fn finish(self) -> (String, String) {
        (
            hex::encode(self.sha1.finalize()),
            hex::encode(self.md5.finalize()),
        )
    }
}

/// Check hex digests against an expected checksum.
pub fn verify_digests(
    path: &Path,
    expected: Option<&Checksum>,
    sha1: &str,
    md5: &str,
) -> BuildResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = match expected {
        Checksum::Sha1(_) => sha1,
        Checksum::Md5(_) => md5,
    };
    if !actual.eq_ignore_ascii_case(expected.expected()) {
        return Err(BuildError::ChecksumMismatch {
            path: path.to_path_buf(),
            algorithm: expected.algorithm(),
            expected: expected.expected().to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Temporary sibling of `dest` that a download is streamed into.
///
/// Only a completed, verified file is renamed onto `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(
        "{}.{}.part",
        file_name,
        uuid::Uuid::new_v4().simple()
    ))
}

pub fn is_part_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("part")
}

/// Removes an unfinished `.part` file when the owning future is dropped
/// (cancellation) or fails.
pub struct PartFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the finished file to `dest`.
    pub async fn promote(mut self, dest: &Path) -> BuildResult<()> {
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

impl Drop for PartFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Streaming, checksum validated downloader.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> BuildResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Probing ─────────────────────────────────────────

    /// `HEAD` the URL. `Ok(false)` for 404/410, error for anything else non-2xx.
    pub async fn exists(&self, url: &str) -> BuildResult<bool> {
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(false);
        }
        Err(BuildError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }

    /// Small text documents (metadata, checksum files). `None` on 404/410.
    pub async fn fetch_optional_text(&self, url: &str) -> BuildResult<Option<String>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BuildError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(response.text().await?))
    }

    // ── Single file download ────────────────────────────

    /// Download `url` to `dest`, validating the checksum when one is given.
    ///
    /// Bytes are streamed into a `.part` sibling and renamed onto `dest` only
    /// after the checksum matches, so `dest` either does not exist or is
    /// complete. Returns the SHA-1 of the written file.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected: Option<&Checksum>,
    ) -> BuildResult<String> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BuildError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let guard = PartFileGuard::new(part_path(dest));
        let mut hasher = StreamHasher::default();
        let mut written = 0_u64;
        {
            let mut file = tokio::fs::File::create(guard.path())
                .await
                .map_err(|e| BuildError::Io {
                    path: guard.path().to_path_buf(),
                    source: e,
                })?;

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                hasher.update(&chunk);
                written += chunk.len() as u64;
                file.write_all(&chunk).await.map_err(|e| BuildError::Io {
                    path: guard.path().to_path_buf(),
                    source: e,
                })?;
            }

            file.flush().await.map_err(|e| BuildError::Io {
                path: guard.path().to_path_buf(),
                source: e,
            })?;
            // file is dropped here, before the rename
        }

        let (sha1, md5) = hasher.finish();
        verify_digests(dest, expected, &sha1, &md5)?;
        guard.promote(dest).await?;

        debug!("Downloaded {} ({} bytes) -> {:?}", url, written, dest);
        Ok(sha1)
    }

    /// Hash an existing file.
    pub async fn sha1_of(path: &Path) -> BuildResult<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| BuildError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_checksums_are_normalized() {
        assert_eq!(
            Checksum::from_published("sha1", "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709  gson.jar\n"),
            Some(Checksum::Sha1(
                "da39a3ee5e6b4b0d3255bfef95601890afd80709".into()
            ))
        );
        assert_eq!(Checksum::from_published("sha1", "<html>"), None);
        assert_eq!(Checksum::from_published("md5", "abc"), None);
    }

    #[test]
    fn digest_mismatch_is_reported() {
        let mut hasher = StreamHasher::default();
        hasher.update(b"hello");
        let (sha1, md5) = hasher.finish();
        assert_eq!(sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");

        let expected = Checksum::Md5("00000000000000000000000000000000".into());
        let err = verify_digests(Path::new("x.jar"), Some(&expected), &sha1, &md5).unwrap_err();
        assert!(matches!(err, BuildError::ChecksumMismatch { algorithm: "MD5", .. }));
    }

    #[test]
    fn part_paths_stay_beside_destination() {
        let dest = Path::new("/cache/com/google/gson-2.12.1.jar");
        let part = part_path(&dest);
        assert_eq!(part.parent(), dest.parent());
        assert!(is_part_file(&part));
    }

    #[tokio::test]
    async fn dropped_guard_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("a.jar.123.part");
        tokio::fs::write(&part, b"trunc").await.unwrap();
        drop(PartFileGuard::new(part.clone()));
        assert!(!part.exists());
    }
}
