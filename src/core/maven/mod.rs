mod artifact;
mod metadata;
mod pom;
mod registry;
mod resolver;
mod version;

pub use artifact::{Coordinate, ModuleKey};
pub use metadata::MavenMetadata;
pub use pom::{PomDependency, PomDocument};
pub use registry::{ArtifactLocation, LocalRegistry, MavenRegistry, Registry, RegistryList};
pub use resolver::{DependencyResolver, ResolvedArtifact, Resolution};
pub use version::{compare_versions, select_highest};

/// Well-known repositories for Paper plugin builds.
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";
pub const PAPER_MAVEN: &str = "https://repo.papermc.io/repository/maven-public";
