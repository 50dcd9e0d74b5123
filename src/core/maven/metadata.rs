use quick_xml::de::from_str;
use serde::Deserialize;

use crate::core::error::{BuildError, BuildResult};

/// `maven-metadata.xml`, at module level (published versions) or at
/// version level (timestamped snapshot file names).
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MavenMetadata {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub versioning: Option<Versioning>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub versions: Option<VersionList>,
    #[serde(default)]
    pub snapshot: Option<SnapshotInfo>,
    #[serde(default)]
    pub snapshot_versions: Option<SnapshotVersions>,
}

#[derive(Debug, Deserialize, Default)]
pub struct VersionList {
    #[serde(default, rename = "version")]
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub build_number: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SnapshotVersions {
    #[serde(default, rename = "snapshotVersion")]
    pub items: Vec<SnapshotVersion>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SnapshotVersion {
    #[serde(default)]
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
}

impl MavenMetadata {
    pub fn parse(url: &str, xml: &str) -> BuildResult<Self> {
        from_str(xml).map_err(|e| BuildError::Other(format!("Invalid maven-metadata.xml at {url}: {e}")))
    }

    /// Every version listed at module level.
    pub fn versions(&self) -> Vec<String> {
        self.versioning
            .as_ref()
            .and_then(|v| v.versions.as_ref())
            .map(|v| v.items.iter().map(|s| s.trim().to_string()).collect())
            .unwrap_or_default()
    }

    /// Concrete file version for a `-SNAPSHOT` artifact.
    ///
    /// Prefers the explicit `snapshotVersions` entry for the extension and
    /// classifier, falling back to `<base>-<timestamp>-<buildNumber>`.
    pub fn snapshot_file_version(
        &self,
        base_version: &str,
        extension: &str,
        classifier: Option<&str>,
    ) -> Option<String> {
        let versioning = self.versioning.as_ref()?;

        if let Some(list) = &versioning.snapshot_versions {
            let found = list.items.iter().find(|sv| {
                sv.extension == extension
                    && sv.classifier.as_deref().filter(|c| !c.is_empty()) == classifier
            });
            if let Some(sv) = found {
                return Some(sv.value.trim().to_string());
            }
        }

        let snapshot = versioning.snapshot.as_ref()?;
        let timestamp = snapshot.timestamp.as_deref()?;
        let build = snapshot.build_number?;
        let stem = base_version.strip_suffix("-SNAPSHOT")?;
        Some(format!("{stem}-{timestamp}-{build}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
    <metadata>
      <groupId>io.papermc.paper</groupId>
      <artifactId>dev-bundle</artifactId>
      <versioning>
        <latest>1.21.4-R0.1-SNAPSHOT</latest>
        <versions>
          <version>1.21.3-R0.1-SNAPSHOT</version>
          <version>1.21.4-R0.1-SNAPSHOT</version>
        </versions>
      </versioning>
    </metadata>"#;

    const VERSION_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
    <metadata modelVersion="1.1.0">
      <groupId>io.papermc.paper</groupId>
      <artifactId>dev-bundle</artifactId>
      <version>1.21.4-R0.1-SNAPSHOT</version>
      <versioning>
        <snapshot>
          <timestamp>20250308.211345</timestamp>
          <buildNumber>171</buildNumber>
        </snapshot>
        <snapshotVersions>
          <snapshotVersion>
            <extension>zip</extension>
            <value>1.21.4-R0.1-20250308.211345-171</value>
          </snapshotVersion>
          <snapshotVersion>
            <extension>pom</extension>
            <value>1.21.4-R0.1-20250308.211345-171</value>
          </snapshotVersion>
        </snapshotVersions>
      </versioning>
    </metadata>"#;

    #[test]
    fn lists_module_versions() {
        let meta = MavenMetadata::parse("test", MODULE_METADATA).unwrap();
        assert_eq!(
            meta.versions(),
            vec!["1.21.3-R0.1-SNAPSHOT", "1.21.4-R0.1-SNAPSHOT"]
        );
    }

    #[test]
    fn resolves_timestamped_snapshot() {
        let meta = MavenMetadata::parse("test", VERSION_METADATA).unwrap();
        assert_eq!(
            meta.snapshot_file_version("1.21.4-R0.1-SNAPSHOT", "zip", None)
                .as_deref(),
            Some("1.21.4-R0.1-20250308.211345-171")
        );
        // no explicit entry for jar: fall back to timestamp + build number
        assert_eq!(
            meta.snapshot_file_version("1.21.4-R0.1-SNAPSHOT", "jar", Some("sources"))
                .as_deref(),
            Some("1.21.4-R0.1-20250308.211345-171")
        );
    }
}
