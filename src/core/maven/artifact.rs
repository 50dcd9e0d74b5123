use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::error::{BuildError, BuildResult};

/// A fully parsed dependency coordinate.
///
/// Supported formats:
///   `group:artifact:version`
///   `group:artifact:version:classifier`
///   `group:artifact:version:classifier@extension`
///   `group:artifact:version@extension`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension. Defaults to `"jar"`.
    pub extension: String,
}

/// A coordinate without its version: the unit of version arbitration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub group: String,
    pub artifact: String,
    pub classifier: Option<String>,
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.classifier {
            Some(c) => write!(f, "{}:{}:{}", self.group, self.artifact, c),
            None => write!(f, "{}:{}", self.group, self.artifact),
        }
    }
}

impl ModuleKey {
    pub fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }
}

impl Coordinate {
    /// Parse a coordinate string.
    ///
    /// # Examples
    /// ```
    /// use plugsmith_lib::core::maven::Coordinate;
    /// let c = Coordinate::parse("com.google.code.gson:gson:2.12.1").unwrap();
    /// assert_eq!(c.group, "com.google.code.gson");
    /// ```
    pub fn parse(coord: &str) -> BuildResult<Self> {
        let coord = coord.trim();
        let (coord_part, extension_override) = match coord.rfind('@') {
            Some(idx) => (&coord[..idx], Some(&coord[idx + 1..])),
            None => (coord, None),
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if parts.iter().any(|p| p.trim().is_empty())
            || extension_override.is_some_and(|e| e.is_empty())
        {
            return Err(BuildError::InvalidCoordinate(coord.to_string()));
        }

        let classifier = match parts.len() {
            3 => None,
            4 => Some(parts[3].to_string()),
            _ => return Err(BuildError::InvalidCoordinate(coord.to_string())),
        };

        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier,
            extension: extension_override.unwrap_or("jar").to_string(),
        })
    }

    pub fn new(group: &str, artifact: &str, version: &str) -> Self {
        Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier: None,
            extension: "jar".to_string(),
        }
    }

    pub fn module_key(&self) -> ModuleKey {
        ModuleKey {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            classifier: self.classifier.clone(),
        }
    }

    /// `net/sf/jopt-simple`
    pub fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with("-SNAPSHOT")
    }

    /// `artifact-version[-classifier].extension`
    pub fn filename(&self) -> String {
        self.filename_for(&self.version)
    }

    /// Filename using a concrete file version, e.g. a timestamped snapshot
    /// (`dev-bundle-1.21.4-R0.1-20250308.211345-171.zip`).
    pub fn filename_for(&self, file_version: &str) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact, file_version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, file_version, self.extension),
        }
    }

    /// Path of the version directory relative to a repository root.
    ///
    /// `<group_path>/<artifact>/<version>`
    pub fn version_dir(&self) -> String {
        format!("{}/{}/{}", self.group_path(), self.artifact, self.version)
    }

    /// `<repo>/<group_path>/<artifact>/<version>/<filename>`
    pub fn url(&self, repo_base: &str) -> String {
        let base = repo_base.trim_end_matches('/');
        format!("{}/{}/{}", base, self.version_dir(), self.filename())
    }

    /// Local path relative to the cache root, mirroring Maven's layout.
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.group_path())
            .join(&self.artifact)
            .join(&self.version)
            .join(self.filename())
    }

    /// Same coordinate with a different extension (e.g. `"pom"`).
    pub fn with_extension(&self, extension: &str) -> Self {
        let mut clone = self.clone();
        clone.extension = extension.to_string();
        clone
    }

    /// POM of this module: no classifier, `pom` extension.
    pub fn pom(&self) -> Self {
        let mut clone = self.with_extension("pom");
        clone.classifier = None;
        clone
    }

    pub fn with_version(&self, version: &str) -> Self {
        let mut clone = self.clone();
        clone.version = version.to_string();
        clone
    }

    pub fn is_pom(&self) -> bool {
        self.extension == "pom"
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Coordinate {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coordinate::parse(s)
    }
}
