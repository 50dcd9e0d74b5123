use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::devbundle::DevBundleRequest;
use crate::core::downloader::Downloader;
use crate::core::error::{BuildError, BuildResult};
use crate::core::java::ToolchainSpec;
use crate::core::mapping::{MappingNamespace, ReobfConfiguration};
use crate::core::maven::{
    Coordinate, LocalRegistry, MavenRegistry, Registry, RegistryList, MAVEN_CENTRAL, PAPER_MAVEN,
};

pub const PROJECT_FILE: &str = "plugsmith.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub group: String,
    pub name: String,
    pub version: String,
}

/// A `[[repositories]]` entry: exactly one of `url` or `path`, or the name
/// `mavenLocal` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependenciesConfig {
    #[serde(default)]
    pub implementation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperweightConfig {
    pub dev_bundle: DevBundleRequest,
    #[serde(default = "default_namespace")]
    pub reobf_artifact_configuration: MappingNamespace,
}

fn default_namespace() -> MappingNamespace {
    ReobfConfiguration::default().namespace()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaConfig {
    pub toolchain: ToolchainSpec,
}

/// `plugsmith.toml`. Bundle tag, namespace and toolchain are checked by
/// their types while parsing; coordinates and repositories by `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectInfo,
    #[serde(default = "default_repositories")]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub dependencies: DependenciesConfig,
    pub paperweight: PaperweightConfig,
    pub java: JavaConfig,
}

fn default_repositories() -> Vec<RepositoryConfig> {
    vec![
        RepositoryConfig {
            name: "central".to_string(),
            url: Some(MAVEN_CENTRAL.to_string()),
            path: None,
        },
        RepositoryConfig {
            name: "papermc".to_string(),
            url: Some(PAPER_MAVEN.to_string()),
            path: None,
        },
    ]
}

impl ProjectConfig {
    /// Read `plugsmith.toml` from a project directory.
    pub fn load(project_dir: &Path) -> BuildResult<Self> {
        let path = project_dir.join(PROJECT_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| BuildError::Io {
            path: path.clone(),
            source: e,
        })?;
        let config = Self::parse(&raw)?;
        debug!("Loaded project {} from {:?}", config.project.name, path);
        Ok(config)
    }

    pub fn parse(raw: &str) -> BuildResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BuildResult<()> {
        let info = &self.project;
        for (field, value) in [("group", &info.group), ("name", &info.name), ("version", &info.version)] {
            if value.trim().is_empty() {
                return Err(BuildError::Config(format!("project.{field} must not be empty")));
            }
        }
        if info.name.contains(['/', '\\']) || info.version.contains(['/', '\\']) {
            return Err(BuildError::Config(
                "project name and version must not contain path separators".to_string(),
            ));
        }

        self.dependencies()?;

        if self.repositories.is_empty() {
            return Err(BuildError::Config("at least one repository is required".to_string()));
        }
        for repo in &self.repositories {
            match (&repo.url, &repo.path) {
                (Some(_), Some(_)) => {
                    return Err(BuildError::Config(format!(
                        "repository '{}' sets both url and path",
                        repo.name
                    )))
                }
                (None, None) if repo.name != "mavenLocal" => {
                    return Err(BuildError::Config(format!(
                        "repository '{}' needs a url or a path",
                        repo.name
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Declared `implementation` coordinates.
    pub fn dependencies(&self) -> BuildResult<Vec<Coordinate>> {
        self.dependencies
            .implementation
            .iter()
            .map(|raw| {
                Coordinate::parse(raw).map_err(|e| {
                    BuildError::Config(format!("invalid dependency '{raw}': {e}"))
                })
            })
            .collect()
    }

    /// Registries in declaration order. Relative `path`s are resolved
    /// against the project directory.
    pub fn registries(
        &self,
        project_dir: &Path,
        downloader: Arc<Downloader>,
    ) -> BuildResult<RegistryList> {
        let mut list = RegistryList::new();
        for repo in &self.repositories {
            let registry: Arc<dyn Registry> = match (&repo.url, &repo.path) {
                (Some(url), _) => Arc::new(MavenRegistry::new(&repo.name, url, downloader.clone())),
                (None, Some(path)) => {
                    let root = if path.is_absolute() {
                        path.clone()
                    } else {
                        project_dir.join(path)
                    };
                    Arc::new(LocalRegistry::new(&repo.name, root))
                }
                (None, None) => Arc::new(LocalRegistry::maven_local().ok_or_else(|| {
                    BuildError::Config("mavenLocal requested but no home directory is known".into())
                })?),
            };
            list.push(registry);
        }
        Ok(list)
    }

    pub fn reobf(&self) -> ReobfConfiguration {
        ReobfConfiguration::select_mapping(self.paperweight.reobf_artifact_configuration)
    }

    pub fn toolchain(&self) -> ToolchainSpec {
        self.java.toolchain
    }

    /// `<name>-<version>.jar`
    pub fn artifact_file_name(&self) -> String {
        format!("{}-{}.jar", self.project.name, self.project.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[project]
group = "com.jellypudding"
name = "fakePlayers"
version = "1.0-SNAPSHOT"

[dependencies]
implementation = ["com.google.code.gson:gson:2.12.1"]

[paperweight]
dev_bundle = "1.21.4-R0.1-SNAPSHOT"
reobf_artifact_configuration = "MOJANG_PRODUCTION"

[java]
toolchain = 21
"#;

    #[test]
    fn parses_the_sample_project() {
        let config = ProjectConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.artifact_file_name(), "fakePlayers-1.0-SNAPSHOT.jar");
        assert_eq!(config.toolchain().major_version(), 21);
        assert_eq!(config.paperweight.dev_bundle.tag(), "1.21.4-R0.1-SNAPSHOT");
        assert_eq!(config.reobf().namespace(), MappingNamespace::MojangProduction);
        assert_eq!(
            config.repositories.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["central", "papermc"]
        );
        assert_eq!(config.dependencies().unwrap()[0].artifact, "gson");
    }

    #[test]
    fn rejects_invalid_values_at_load() {
        let cases = [
            SAMPLE.replace("toolchain = 21", "toolchain = 7"),
            SAMPLE.replace("\"MOJANG_PRODUCTION\"", "\"YARN\""),
            SAMPLE.replace("1.21.4-R0.1-SNAPSHOT", "latest"),
            SAMPLE.replace("com.google.code.gson:gson:2.12.1", "gson"),
        ];
        for raw in cases {
            assert!(ProjectConfig::parse(&raw).is_err(), "accepted:\n{raw}");
        }
    }

    #[test]
    fn local_repositories_resolve_against_the_project() {
        let raw = format!("{SAMPLE}\n[[repositories]]\nname = \"fixture\"\npath = \"repo\"\n");
        let config = ProjectConfig::parse(&raw).unwrap();
        let downloader = Arc::new(Downloader::with_client(reqwest::Client::new()));
        let list = config.registries(Path::new("/work/plugin"), downloader).unwrap();
        assert_eq!(list.names(), vec!["fixture"]);
        assert_eq!(
            list.resolve_registries()[0].location(),
            Path::new("/work/plugin").join("repo").display().to_string()
        );
    }
}
