use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::error::BuildError;

/// Progress of a build. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    /// Nothing resolved yet.
    Unresolved,
    /// Dev bundle and project dependencies on disk.
    DependenciesResolved,
    /// A JDK of the requested major is available.
    ToolchainSelected,
    Compiled,
    Remapped,
    /// The jar is in `build/libs`.
    Packaged,
}

impl BuildStage {
    pub fn next(self) -> Option<Self> {
        match self {
            BuildStage::Unresolved => Some(BuildStage::DependenciesResolved),
            BuildStage::DependenciesResolved => Some(BuildStage::ToolchainSelected),
            BuildStage::ToolchainSelected => Some(BuildStage::Compiled),
            BuildStage::Compiled => Some(BuildStage::Remapped),
            BuildStage::Remapped => Some(BuildStage::Packaged),
            BuildStage::Packaged => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Unresolved => "unresolved",
            BuildStage::DependenciesResolved => "dependencies_resolved",
            BuildStage::ToolchainSelected => "toolchain_selected",
            BuildStage::Compiled => "compiled",
            BuildStage::Remapped => "remapped",
            BuildStage::Packaged => "packaged",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build that stopped. `stage` is the last stage it reached.
#[derive(Debug, Error)]
#[error("build stopped at stage {stage}: {error}")]
pub struct PipelineFailure {
    pub stage: BuildStage,
    #[source]
    pub error: BuildError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_walk_forward_to_packaged() {
        let mut stage = BuildStage::Unresolved;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(stage, BuildStage::Packaged);
    }
}
