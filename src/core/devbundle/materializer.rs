use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::config::{read_bundle, BundleConfig};
use super::request::DevBundleRequest;
use crate::core::error::{BuildError, BuildResult, ResolutionError};
use crate::core::mapping::MappingMetadata;
use crate::core::maven::{Coordinate, DependencyResolver, ModuleKey, Resolution};
use crate::core::resilience::retry_transient;

/// A materialized dev bundle: its config, resolved artifacts and mappings.
#[derive(Debug, Clone)]
pub struct DevBundle {
    pub tag: String,
    pub path: PathBuf,
    pub config: BundleConfig,
    pub artifacts: Resolution,
    pub mapping: Arc<MappingMetadata>,
    api: Vec<Coordinate>,
    libraries: Vec<Coordinate>,
}

impl DevBundle {
    pub fn api_coordinates(&self) -> &[Coordinate] {
        &self.api
    }

    pub fn api_modules(&self) -> BTreeSet<ModuleKey> {
        self.api.iter().map(Coordinate::module_key).collect()
    }

    /// Roots for the build classpath.
    ///
    /// Project versions win over the bundle's library versions. The platform
    /// API is always the bundle's: a project declaration of an API module is
    /// dropped.
    pub fn merge_roots(&self, project: &[Coordinate]) -> Vec<Coordinate> {
        let api_modules = self.api_modules();
        let mut roots = self.api.clone();

        let mut declared = BTreeSet::new();
        for coordinate in project {
            let module = coordinate.module_key();
            if api_modules.contains(&module) {
                warn!(
                    "Ignoring declared {}: the dev bundle {} provides the platform API",
                    coordinate, self.tag
                );
                continue;
            }
            declared.insert(module);
            roots.push(coordinate.clone());
        }

        for library in &self.libraries {
            let module = library.module_key();
            if declared.contains(&module) {
                debug!("Project declaration overrides bundle library {}", library);
                continue;
            }
            roots.push(library.clone());
        }
        roots
    }

    pub fn classpath(&self) -> Vec<PathBuf> {
        self.artifacts.classpath()
    }
}

pub struct DevBundleMaterializer {
    resolver: Arc<DependencyResolver>,
}

impl DevBundleMaterializer {
    pub fn new(resolver: Arc<DependencyResolver>) -> Self {
        Self { resolver }
    }

    /// Fetch, unpack and resolve a dev bundle.
    ///
    /// The tag must be published verbatim. A tag no registry lists fails at
    /// once; registry outages are retried with the cache's retry policy.
    #[instrument(skip(self), fields(tag = %request))]
    pub async fn materialize(&self, request: &DevBundleRequest) -> BuildResult<DevBundle> {
        let cache = self.resolver.cache();
        let coordinate = request.coordinate();

        if !cache.is_offline() && !cache.contains(&coordinate) {
            let label = format!("Checking dev bundle {}", request);
            retry_transient(cache.retry_policy(), &label, || self.check_published(request)).await?;
        }

        let file = cache.get(&coordinate).await.map_err(|e| match e {
            BuildError::Resolution(ResolutionError::CoordinateNotFound { searched, .. }) => {
                ResolutionError::BundleNotFound {
                    tag: request.tag().to_string(),
                    searched,
                }
                .into()
            }
            other => other,
        })?;

        let path = file.path.clone();
        let tag = request.tag().to_string();
        let game_version = request.game_version().to_string();
        let contents = tokio::task::spawn_blocking(move || read_bundle(&path, &tag, &game_version))
            .await
            .map_err(|e| BuildError::Other(format!("bundle reader task failed: {e}")))??;

        let api = contents.config.api()?;
        let libraries = contents.config.libraries()?;
        let roots: Vec<Coordinate> = api.iter().chain(&libraries).cloned().collect();
        let artifacts = self.resolver.resolve_pinned(&roots, &api).await?;

        info!(
            "Materialized dev bundle {} ({} artifacts, namespaces: {})",
            request,
            artifacts.len(),
            contents.mapping.supported().join(", ")
        );

        Ok(DevBundle {
            tag: request.tag().to_string(),
            path: file.path.clone(),
            config: contents.config,
            artifacts,
            mapping: Arc::new(contents.mapping),
            api,
            libraries,
        })
    }

    /// Ask every registry whether the exact tag is published.
    async fn check_published(&self, request: &DevBundleRequest) -> BuildResult<()> {
        let registries = self.resolver.cache().registries();
        let module = request.coordinate().module_key();
        let mut failures = Vec::new();

        for registry in registries.resolve_registries() {
            match registry.versions(&module).await {
                Ok(Some(versions)) if versions.iter().any(|v| v == request.tag()) => {
                    debug!("Dev bundle {} is published in {}", request, registry.name());
                    return Ok(());
                }
                Ok(Some(versions)) => {
                    debug!(
                        "{} lists {} dev bundle version(s), none is {}",
                        registry.name(),
                        versions.len(),
                        request
                    );
                }
                Ok(None) => debug!("{} publishes no dev bundles", registry.name()),
                Err(e) => {
                    warn!(
                        "Registry {} unreachable while checking dev bundle {}: {}",
                        registry.name(),
                        request,
                        e
                    );
                    failures.push(format!("{}: {}", registry.name(), e));
                }
            }
        }

        if failures.is_empty() {
            Err(ResolutionError::BundleNotFound {
                tag: request.tag().to_string(),
                searched: registries.names(),
            }
            .into())
        } else {
            Err(ResolutionError::RegistriesUnreachable {
                coordinate: request.coordinate().to_string(),
                failures,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::core::cache::ArtifactCache;
    use crate::core::devbundle::config::fixture::{config, write_bundle, SPIGOT_TINY};
    use crate::core::mapping::MappingNamespace;
    use crate::core::maven::{ArtifactLocation, LocalRegistry, Registry, RegistryList};
    use crate::core::resilience::RetryPolicy;

    const TAG: &str = "1.21.4-R0.1-SNAPSHOT";
    const API: &str = "io.papermc.paper:paper-api:1.21.4-R0.1-SNAPSHOT";

    fn publish_jar(root: &Path, coord: &str, pom_deps: &str) {
        let coordinate = Coordinate::parse(coord).unwrap();
        let jar = root.join(coordinate.local_path());
        std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
        std::fs::write(&jar, coord).unwrap();
        std::fs::write(
            root.join(coordinate.pom().local_path()),
            format!(
                "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version><dependencies>{}</dependencies></project>",
                coordinate.group, coordinate.artifact, coordinate.version, pom_deps
            ),
        )
        .unwrap();
    }

    fn publish_bundle(root: &Path) {
        let request = DevBundleRequest::new(TAG).unwrap();
        write_bundle(
            &root.join(request.coordinate().local_path()),
            &config("1.21.4", API),
            &[("data/spigot.tiny", SPIGOT_TINY)],
        );
        publish_jar(
            root,
            API,
            "<dependency><groupId>com.google.code.gson</groupId><artifactId>gson</artifactId><version>2.11.0</version></dependency>",
        );
        publish_jar(root, "com.google.code.gson:gson:2.11.0", "");
        publish_jar(root, "com.google.code.gson:gson:2.12.1", "");
    }

    fn materializer(registries: RegistryList, cache_dir: &Path, retry: RetryPolicy) -> DevBundleMaterializer {
        let cache = ArtifactCache::new(cache_dir, registries, retry);
        DevBundleMaterializer::new(Arc::new(DependencyResolver::new(Arc::new(cache), 4)))
    }

    #[tokio::test]
    async fn materializes_a_published_bundle() {
        let repo = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        publish_bundle(repo.path());

        let registries =
            RegistryList::new().with(Arc::new(LocalRegistry::new("papermc", repo.path())));
        let bundle = materializer(registries, cache.path(), RetryPolicy::none())
            .materialize(&DevBundleRequest::new(TAG).unwrap())
            .await
            .unwrap();

        assert_eq!(bundle.tag, TAG);
        assert!(bundle.mapping.supports(MappingNamespace::Spigot));
        assert!(bundle
            .artifacts
            .get(&Coordinate::parse(API).unwrap())
            .is_some());

        // project gson wins over the bundle's transitive request; the API
        // cannot be overridden
        let roots = bundle.merge_roots(&[
            Coordinate::parse("com.google.code.gson:gson:2.12.1").unwrap(),
            Coordinate::parse("io.papermc.paper:paper-api:1.21.3-R0.1-SNAPSHOT").unwrap(),
        ]);
        assert_eq!(
            roots.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![API.to_string(), "com.google.code.gson:gson:2.12.1".to_string()]
        );
    }

    /// Answers `versions` with an empty list and counts the calls.
    struct EmptyRegistry {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Registry for EmptyRegistry {
        fn name(&self) -> &str {
            "papermc"
        }

        fn location(&self) -> String {
            "memory".into()
        }

        async fn lookup(&self, _: &Coordinate) -> BuildResult<Option<ArtifactLocation>> {
            Ok(None)
        }

        async fn fetch(&self, _: &ArtifactLocation, _: &Path) -> BuildResult<String> {
            unreachable!("nothing is ever located")
        }

        async fn versions(&self, _: &ModuleKey) -> BuildResult<Option<Vec<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BuildError::DownloadFailed {
                    url: "https://repo.example/maven-metadata.xml".into(),
                    status: 503,
                })
            } else {
                Ok(Some(vec![TAG.to_string()]))
            }
        }

        async fn snapshot_version(&self, _: &Coordinate) -> BuildResult<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn unpublished_tag_fails_without_retry() {
        let registry = Arc::new(EmptyRegistry {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cache = tempfile::tempdir().unwrap();
        let err = materializer(
            RegistryList::new().with(registry.clone()),
            cache.path(),
            RetryPolicy::new(3, 1, 1),
        )
        .materialize(&DevBundleRequest::new("1.21.4-R0.2-SNAPSHOT").unwrap())
        .await
        .unwrap_err();

        match err {
            BuildError::Resolution(ResolutionError::BundleNotFound { tag, searched }) => {
                assert_eq!(tag, "1.21.4-R0.2-SNAPSHOT");
                assert_eq!(searched, vec!["papermc"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outages_are_retried_then_surfaced() {
        let registry = Arc::new(EmptyRegistry {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cache = tempfile::tempdir().unwrap();
        let err = materializer(
            RegistryList::new().with(registry.clone()),
            cache.path(),
            RetryPolicy::new(2, 1, 1),
        )
        .materialize(&DevBundleRequest::new(TAG).unwrap())
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Resolution(ResolutionError::RegistriesUnreachable { .. })
        ));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 3);
    }
}
