use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use super::settings::{resolve_data_dir, BuildSettings};
use crate::core::cache::ArtifactCache;
use crate::core::downloader::Downloader;
use crate::core::error::{BuildError, BuildResult};
use crate::core::http::build_http_client;
use crate::core::java::{RuntimeProvisioner, ToolchainSelector};
use crate::core::maven::{DependencyResolver, RegistryList};

/// Shared machine state for a build: data directory, settings and HTTP.
pub struct BuildEnvironment {
    pub data_dir: PathBuf,
    pub settings: BuildSettings,
    pub http_client: Client,
    pub downloader: Arc<Downloader>,
}

impl BuildEnvironment {
    /// Open (and create) the data directory. `data_dir` overrides the
    /// environment variable and platform default.
    pub fn open(data_dir: Option<&Path>) -> BuildResult<Self> {
        let data_dir = resolve_data_dir(data_dir);
        std::fs::create_dir_all(&data_dir).map_err(|e| BuildError::Io {
            path: data_dir.clone(),
            source: e,
        })?;
        let settings = BuildSettings::load(&data_dir);
        debug!("Data directory {:?}, settings {:?}", data_dir, settings);

        let http_client = build_http_client()?;
        let downloader = Arc::new(Downloader::with_client(http_client.clone()));
        Ok(Self {
            data_dir,
            settings,
            http_client,
            downloader,
        })
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.settings.offline |= offline;
        self
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.data_dir.join("runtimes")
    }

    pub fn artifact_cache(&self, registries: RegistryList) -> Arc<ArtifactCache> {
        Arc::new(
            ArtifactCache::new(self.cache_dir(), registries, self.settings.retry.clone())
                .offline(self.settings.offline),
        )
    }

    pub fn resolver(&self, registries: RegistryList) -> Arc<DependencyResolver> {
        Arc::new(DependencyResolver::new(
            self.artifact_cache(registries),
            self.settings.concurrency,
        ))
    }

    /// Offline builds never provision.
    pub fn toolchain_selector(&self) -> ToolchainSelector {
        let selector = ToolchainSelector::new(self.runtimes_dir());
        if self.settings.offline {
            return selector;
        }
        selector.with_provisioner(RuntimeProvisioner::new(
            self.runtimes_dir(),
            &self.settings.adoptium_api,
            self.http_client.clone(),
            self.settings.retry.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_live_under_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = BuildEnvironment::open(Some(dir.path())).unwrap().with_offline(true);
        assert_eq!(env.cache_dir(), dir.path().join("cache"));
        assert_eq!(env.runtimes_dir(), dir.path().join("runtimes"));
        assert!(env.settings.offline);
        assert!(env.artifact_cache(RegistryList::new()).is_offline());
    }
}
