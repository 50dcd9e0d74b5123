mod config;
mod layout;

pub use config::{
    DependenciesConfig, JavaConfig, PaperweightConfig, ProjectConfig, ProjectInfo,
    RepositoryConfig, PROJECT_FILE,
};
pub use layout::ProjectLayout;
