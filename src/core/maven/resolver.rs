use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::artifact::{Coordinate, ModuleKey};
use super::pom::PomDocument;
use super::version::select_highest;
use crate::core::cache::{ArtifactCache, CachedFile};
use crate::core::error::{BuildError, BuildResult, ResolutionError, VersionConflict};

/// Parent chains deeper than this are treated as malformed.
const MAX_PARENT_DEPTH: usize = 16;

/// One artifact of a resolution, with the selected coordinates it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub coordinate: Coordinate,
    pub path: PathBuf,
    pub sha1: String,
    pub dependencies: BTreeSet<Coordinate>,
}

/// Result of resolving a set of root coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub roots: Vec<Coordinate>,
    pub artifacts: BTreeMap<Coordinate, Arc<ResolvedArtifact>>,
}

impl Resolution {
    /// Jar files in coordinate order.
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.artifacts
            .values()
            .filter(|a| a.coordinate.extension == "jar")
            .map(|a| a.path.clone())
            .collect()
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&Arc<ResolvedArtifact>> {
        self.artifacts.get(coordinate)
    }

    /// The artifact selected for a module, whatever its version.
    pub fn find_module(&self, module: &ModuleKey) -> Option<&Arc<ResolvedArtifact>> {
        self.artifacts
            .values()
            .find(|a| &a.coordinate.module_key() == module)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Everything reachable from `coordinate`, excluding itself.
    pub fn transitive(&self, coordinate: &Coordinate) -> BTreeSet<Coordinate> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&Coordinate> = VecDeque::new();
        if let Some(start) = self.artifacts.get(coordinate) {
            queue.extend(start.dependencies.iter());
        }
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                if let Some(artifact) = self.artifacts.get(next) {
                    queue.extend(artifact.dependencies.iter());
                }
            }
        }
        seen
    }
}

/// What one fetched coordinate contributes to the graph.
#[derive(Debug, Clone)]
struct FetchedNode {
    file: Arc<CachedFile>,
    declared: Vec<Coordinate>,
}

/// Transitive resolver over the artifact cache.
///
/// Works in rounds. Each round selects one version per module from every
/// version requested so far, walks the graph from the roots through those
/// selections, and fetches whatever reached node is still unknown. It stops
/// when a walk reaches nothing new. Every round waits for all of its fetches
/// before selecting again, so the outcome never depends on completion order.
///
/// Arbitration: the highest requested version of each module wins, whether
/// a root or a transitive dependency asked for it. Versions that cannot be
/// ordered are a `VersionConflict`. Only coordinates passed as pins to
/// [`DependencyResolver::resolve_pinned`] override this.
pub struct DependencyResolver {
    cache: Arc<ArtifactCache>,
    concurrency: usize,
}

impl DependencyResolver {
    pub fn new(cache: Arc<ArtifactCache>, concurrency: usize) -> Self {
        Self {
            cache,
            concurrency: concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub async fn resolve(&self, roots: &[Coordinate]) -> BuildResult<Resolution> {
        self.resolve_pinned(roots, &[]).await
    }

    /// Resolve `roots`, holding each module in `pins` at its given version
    /// regardless of what else requests it.
    #[instrument(skip_all, fields(roots = roots.len(), pins = pins.len()))]
    pub async fn resolve_pinned(
        &self,
        roots: &[Coordinate],
        pins: &[Coordinate],
    ) -> BuildResult<Resolution> {
        let pinned = pin_modules(pins)?;
        let mut requested: BTreeMap<ModuleKey, BTreeSet<String>> = BTreeMap::new();
        for root in roots {
            requested
                .entry(root.module_key())
                .or_default()
                .insert(root.version.clone());
        }

        let mut fetched: HashMap<Coordinate, FetchedNode> = HashMap::new();
        let mut round = 0_usize;

        let (selection, reached) = loop {
            let selection = select_versions(&requested, &pinned)?;
            let reached = walk(roots, &selection, &fetched);
            let pending: Vec<Coordinate> = reached
                .iter()
                .filter(|c| !fetched.contains_key(*c))
                .cloned()
                .collect();
            if pending.is_empty() {
                break (selection, reached);
            }

            round += 1;
            debug!("Resolution round {}: fetching {} artifact(s)", round, pending.len());

            let results: Vec<BuildResult<(Coordinate, FetchedNode)>> = stream::iter(pending)
                .map(|coordinate| async move {
                    let node = self.fetch_node(&coordinate).await?;
                    Ok((coordinate, node))
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for result in results {
                let (coordinate, node) = result?;
                for dep in &node.declared {
                    requested
                        .entry(dep.module_key())
                        .or_default()
                        .insert(dep.version.clone());
                }
                fetched.insert(coordinate, node);
            }
        };

        let mut artifacts = BTreeMap::new();
        for coordinate in reached {
            let Some(node) = fetched.get(&coordinate) else {
                continue;
            };
            let dependencies = node
                .declared
                .iter()
                .filter_map(|dep| apply_selection(dep, &selection))
                .collect();
            artifacts.insert(
                coordinate.clone(),
                Arc::new(ResolvedArtifact {
                    coordinate,
                    path: node.file.path.clone(),
                    sha1: node.file.sha1.clone(),
                    dependencies,
                }),
            );
        }

        info!(
            "Resolved {} root(s) to {} artifact(s) in {} round(s)",
            roots.len(),
            artifacts.len(),
            round
        );
        Ok(Resolution {
            roots: roots.to_vec(),
            artifacts,
        })
    }

    /// Fetch the artifact itself, then its effective POM.
    async fn fetch_node(&self, coordinate: &Coordinate) -> BuildResult<FetchedNode> {
        let file = self.cache.get(coordinate).await?;

        let pom_coordinate = coordinate.pom();
        let pom_file = if coordinate.is_pom() {
            file.clone()
        } else {
            match self.cache.get(&pom_coordinate).await {
                Ok(pom) => pom,
                Err(BuildError::Resolution(ResolutionError::CoordinateNotFound { .. })) => {
                    debug!("{} publishes no POM, treating it as a leaf", coordinate);
                    return Ok(FetchedNode {
                        file,
                        declared: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            }
        };

        let pom = self.effective_pom(&pom_coordinate, &pom_file).await?;
        let declared = pom
            .runtime_dependencies()
            .iter()
            .filter_map(|dep| {
                let resolved = pom.dependency_coordinate(dep);
                if resolved.is_none() {
                    warn!(
                        "Cannot determine version of {}:{} declared by {} (skipping)",
                        dep.group_id, dep.artifact_id, coordinate
                    );
                }
                resolved
            })
            .collect();

        Ok(FetchedNode { file, declared })
    }

    async fn effective_pom(
        &self,
        coordinate: &Coordinate,
        file: &CachedFile,
    ) -> BuildResult<PomDocument> {
        let mut pom = read_pom(coordinate, file).await?;
        let mut next_parent = pom.parent.clone();
        let mut depth = 0;

        while let Some(parent) = next_parent {
            depth += 1;
            if depth > MAX_PARENT_DEPTH {
                return Err(BuildError::PomParse {
                    coordinate: coordinate.to_string(),
                    message: format!("parent chain deeper than {MAX_PARENT_DEPTH}"),
                });
            }
            let parent_coordinate = parent.coordinate();
            let parent_file = self.cache.get(&parent_coordinate).await?;
            let parent_pom = read_pom(&parent_coordinate, &parent_file).await?;
            pom.inherit(&parent_pom);
            next_parent = parent_pom.parent.clone();
        }
        Ok(pom)
    }
}

async fn read_pom(coordinate: &Coordinate, file: &CachedFile) -> BuildResult<PomDocument> {
    let xml = tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|e| BuildError::Io {
            path: file.path.clone(),
            source: e,
        })?;
    PomDocument::parse(coordinate, &xml)
}

/// One version per pinned module. Two different pins for a module conflict.
fn pin_modules(pins: &[Coordinate]) -> BuildResult<BTreeMap<ModuleKey, String>> {
    let mut by_module: BTreeMap<ModuleKey, BTreeSet<String>> = BTreeMap::new();
    for pin in pins {
        by_module
            .entry(pin.module_key())
            .or_default()
            .insert(pin.version.clone());
    }

    let mut pinned = BTreeMap::new();
    let mut conflicts = Vec::new();
    for (module, versions) in by_module {
        let mut versions: Vec<String> = versions.into_iter().collect();
        if versions.len() == 1 {
            pinned.insert(module, versions.remove(0));
        } else {
            conflicts.push(VersionConflict {
                module: module.to_string(),
                versions,
            });
        }
    }
    if conflicts.is_empty() {
        Ok(pinned)
    } else {
        Err(BuildError::VersionConflict(conflicts))
    }
}

fn select_versions(
    requested: &BTreeMap<ModuleKey, BTreeSet<String>>,
    pinned: &BTreeMap<ModuleKey, String>,
) -> BuildResult<BTreeMap<ModuleKey, String>> {
    let mut selection = BTreeMap::new();
    let mut conflicts = Vec::new();

    for (module, versions) in requested {
        if let Some(version) = pinned.get(module) {
            selection.insert(module.clone(), version.clone());
            continue;
        }
        let versions: Vec<String> = versions.iter().cloned().collect();
        match select_highest(&versions) {
            Ok(version) => {
                selection.insert(module.clone(), version);
            }
            Err(competing) => conflicts.push(VersionConflict {
                module: module.to_string(),
                versions: competing,
            }),
        }
    }

    if conflicts.is_empty() {
        Ok(selection)
    } else {
        Err(BuildError::VersionConflict(conflicts))
    }
}

fn apply_selection(
    coordinate: &Coordinate,
    selection: &BTreeMap<ModuleKey, String>,
) -> Option<Coordinate> {
    selection
        .get(&coordinate.module_key())
        .map(|version| coordinate.with_version(version))
}

/// Coordinates reachable from the roots under `selection`, through the edges
/// of nodes fetched so far. Unfetched nodes are included but not expanded.
fn walk(
    roots: &[Coordinate],
    selection: &BTreeMap<ModuleKey, String>,
    fetched: &HashMap<Coordinate, FetchedNode>,
) -> BTreeSet<Coordinate> {
    let mut reached = BTreeSet::new();
    let mut queue: VecDeque<Coordinate> = roots
        .iter()
        .filter_map(|root| apply_selection(root, selection))
        .collect();

    while let Some(coordinate) = queue.pop_front() {
        if !reached.insert(coordinate.clone()) {
            continue;
        }
        if let Some(node) = fetched.get(&coordinate) {
            queue.extend(
                node.declared
                    .iter()
                    .filter_map(|dep| apply_selection(dep, selection)),
            );
        }
    }
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::maven::{LocalRegistry, RegistryList};
    use crate::core::resilience::RetryPolicy;
    use std::path::Path;

    struct Repo {
        dir: tempfile::TempDir,
    }

    impl Repo {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn publish(&self, coord: &str, deps: &[&str]) {
            let coordinate = Coordinate::parse(coord).unwrap();
            let jar = self.dir.path().join(coordinate.local_path());
            std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
            std::fs::write(&jar, coord.as_bytes()).unwrap();

            let dependencies: String = deps
                .iter()
                .map(|d| {
                    let c = Coordinate::parse(d).unwrap();
                    format!(
                        "<dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></dependency>",
                        c.group, c.artifact, c.version
                    )
                })
                .collect();
            let pom = format!(
                "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version><dependencies>{}</dependencies></project>",
                coordinate.group, coordinate.artifact, coordinate.version, dependencies
            );
            std::fs::write(self.dir.path().join(coordinate.pom().local_path()), pom).unwrap();
        }

        fn resolver(&self, cache_dir: &Path) -> DependencyResolver {
            let registries =
                RegistryList::new().with(Arc::new(LocalRegistry::new("fixture", self.dir.path())));
            let cache = ArtifactCache::new(cache_dir, registries, RetryPolicy::none());
            DependencyResolver::new(Arc::new(cache), 4)
        }
    }

    fn coords(raw: &[&str]) -> Vec<Coordinate> {
        raw.iter().map(|c| Coordinate::parse(c).unwrap()).collect()
    }

    #[tokio::test]
    async fn resolves_transitive_dependencies() {
        let repo = Repo::new();
        repo.publish("com.google.code.gson:gson:2.12.1", &["com.google.errorprone:error_prone_annotations:2.36.0"]);
        repo.publish("com.google.errorprone:error_prone_annotations:2.36.0", &[]);

        let cache = tempfile::tempdir().unwrap();
        let resolution = repo
            .resolver(cache.path())
            .resolve(&coords(&["com.google.code.gson:gson:2.12.1"]))
            .await
            .unwrap();

        assert_eq!(resolution.len(), 2);
        let gson = resolution
            .get(&Coordinate::parse("com.google.code.gson:gson:2.12.1").unwrap())
            .unwrap();
        assert_eq!(
            gson.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["com.google.errorprone:error_prone_annotations:2.36.0"]
        );
        assert_eq!(resolution.classpath().len(), 2);
    }

    #[tokio::test]
    async fn highest_transitive_version_wins_and_drops_orphans() {
        let repo = Repo::new();
        repo.publish("app:a:1.0", &["lib:shared:1.0"]);
        repo.publish("app:b:1.0", &["lib:shared:2.0"]);
        repo.publish("lib:shared:1.0", &["lib:old-only:1.0"]);
        repo.publish("lib:shared:2.0", &[]);
        repo.publish("lib:old-only:1.0", &[]);

        let cache = tempfile::tempdir().unwrap();
        let resolution = repo
            .resolver(cache.path())
            .resolve(&coords(&["app:a:1.0", "app:b:1.0"]))
            .await
            .unwrap();

        let names: Vec<String> = resolution.artifacts.keys().map(ToString::to_string).collect();
        assert_eq!(names, vec!["app:a:1.0", "app:b:1.0", "lib:shared:2.0"]);
    }

    #[tokio::test]
    async fn higher_transitive_version_beats_a_declared_one() {
        let repo = Repo::new();
        repo.publish("app:a:1.0", &["lib:shared:2.0"]);
        repo.publish("lib:shared:1.5", &[]);
        repo.publish("lib:shared:2.0", &[]);

        let cache = tempfile::tempdir().unwrap();
        let resolution = repo
            .resolver(cache.path())
            .resolve(&coords(&["app:a:1.0", "lib:shared:1.5"]))
            .await
            .unwrap();
        assert!(resolution
            .get(&Coordinate::parse("lib:shared:2.0").unwrap())
            .is_some());
        assert!(resolution
            .get(&Coordinate::parse("lib:shared:1.5").unwrap())
            .is_none());
    }

    #[tokio::test]
    async fn pinned_modules_hold_their_version() {
        let repo = Repo::new();
        repo.publish("io.papermc.paper:paper-api:1.21.4-R0.1", &[]);
        repo.publish("io.papermc.paper:paper-api:1.22-R0.1", &[]);
        repo.publish("app:a:1.0", &["io.papermc.paper:paper-api:1.22-R0.1"]);

        let cache = tempfile::tempdir().unwrap();
        let api = coords(&["io.papermc.paper:paper-api:1.21.4-R0.1"]);
        let roots = coords(&["io.papermc.paper:paper-api:1.21.4-R0.1", "app:a:1.0"]);
        let resolution = repo
            .resolver(cache.path())
            .resolve_pinned(&roots, &api)
            .await
            .unwrap();
        let names: Vec<String> = resolution.artifacts.keys().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["app:a:1.0", "io.papermc.paper:paper-api:1.21.4-R0.1"]
        );

        let err = repo
            .resolver(cache.path())
            .resolve_pinned(&roots, &coords(&["lib:x:1.0", "lib:x:2.0"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::VersionConflict(ref c) if c[0].module == "lib:x"));
    }

    #[tokio::test]
    async fn incomparable_qualifiers_are_reported() {
        let repo = Repo::new();
        repo.publish("app:a:1.0", &["com.google.guava:guava:33.0-jre"]);
        repo.publish("app:b:1.0", &["com.google.guava:guava:33.0-android"]);
        repo.publish("com.google.guava:guava:33.0-jre", &[]);
        repo.publish("com.google.guava:guava:33.0-android", &[]);

        let cache = tempfile::tempdir().unwrap();
        let err = repo
            .resolver(cache.path())
            .resolve(&coords(&["app:a:1.0", "app:b:1.0"]))
            .await
            .unwrap_err();
        match err {
            BuildError::VersionConflict(conflicts) => {
                assert_eq!(conflicts[0].module, "com.google.guava:guava");
                assert_eq!(conflicts[0].versions.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_transitive_dependency_is_named() {
        let repo = Repo::new();
        repo.publish("app:a:1.0", &["lib:ghost:9.9"]);

        let cache = tempfile::tempdir().unwrap();
        let err = repo
            .resolver(cache.path())
            .resolve(&coords(&["app:a:1.0"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("lib:ghost:9.9"));
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let repo = Repo::new();
        repo.publish("app:a:1.0", &["lib:x:1.0", "lib:y:1.0"]);
        repo.publish("lib:x:1.0", &["lib:y:1.1"]);
        repo.publish("lib:y:1.0", &[]);
        repo.publish("lib:y:1.1", &[]);

        let cache = tempfile::tempdir().unwrap();
        let resolver = repo.resolver(cache.path());
        let roots = coords(&["app:a:1.0"]);
        let first = resolver.resolve(&roots).await.unwrap();
        let second = resolver.resolve(&roots).await.unwrap();
        assert_eq!(first, second);
        assert!(first.get(&Coordinate::parse("lib:y:1.1").unwrap()).is_some());
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let repo = Repo::new();
        repo.publish("lib:ping:1.0", &["lib:pong:1.0"]);
        repo.publish("lib:pong:1.0", &["lib:ping:1.0"]);

        let cache = tempfile::tempdir().unwrap();
        let resolution = repo
            .resolver(cache.path())
            .resolve(&coords(&["lib:ping:1.0"]))
            .await
            .unwrap();
        assert_eq!(resolution.len(), 2);
        let ping = Coordinate::parse("lib:ping:1.0").unwrap();
        assert!(resolution.transitive(&ping).contains(&ping));
    }
}
