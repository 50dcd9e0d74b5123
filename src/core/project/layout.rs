use std::path::{Path, PathBuf};

/// Conventional directory layout of a plugin project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn java_sources(&self) -> PathBuf {
        self.root.join("src").join("main").join("java")
    }

    pub fn resources(&self) -> PathBuf {
        self.root.join("src").join("main").join("resources")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// `javac` output, compile namespace.
    pub fn classes_dir(&self) -> PathBuf {
        self.build_dir().join("classes").join("java").join("main")
    }

    /// Classes after remapping into the target namespace.
    pub fn remapped_dir(&self) -> PathBuf {
        self.build_dir().join("classes").join("remapped")
    }

    pub fn libs_dir(&self) -> PathBuf {
        self.build_dir().join("libs")
    }
}
