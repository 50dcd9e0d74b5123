use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::ResolutionError;
use crate::core::maven::Coordinate;

pub const DEV_BUNDLE_GROUP: &str = "io.papermc.paper";
pub const DEV_BUNDLE_ARTIFACT: &str = "dev-bundle";

/// A dev bundle tag such as `1.21.4-R0.1-SNAPSHOT`: the game version, a dash,
/// and the platform release tag.
///
/// The shape is checked on construction. Whether the tag is published is
/// only known once registries are asked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DevBundleRequest {
    tag: String,
}

impl DevBundleRequest {
    pub fn new(tag: &str) -> Result<Self, ResolutionError> {
        let tag = tag.trim();
        let invalid = |reason: &str| ResolutionError::InvalidTag {
            tag: tag.to_string(),
            reason: reason.to_string(),
        };

        let (game, release) = tag
            .split_once('-')
            .ok_or_else(|| invalid("expected <major.minor.patch>-<releaseTag>"))?;

        let parts: Vec<&str> = game.split('.').collect();
        if parts.len() != 3
            || parts
                .iter()
                .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(invalid("game version must be three numeric parts"));
        }
        if release.is_empty()
            || !release
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid("release tag is empty or has illegal characters"));
        }

        Ok(Self {
            tag: tag.to_string(),
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `1.21.4` for `1.21.4-R0.1-SNAPSHOT`.
    pub fn game_version(&self) -> &str {
        self.tag.split_once('-').map_or(&self.tag, |(game, _)| game)
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(DEV_BUNDLE_GROUP, DEV_BUNDLE_ARTIFACT, &self.tag).with_extension("zip")
    }
}

impl TryFrom<String> for DevBundleRequest {
    type Error = ResolutionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DevBundleRequest> for String {
    fn from(request: DevBundleRequest) -> Self {
        request.tag
    }
}

impl fmt::Display for DevBundleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_release_tags() {
        let request = DevBundleRequest::new("1.21.4-R0.1-SNAPSHOT").unwrap();
        assert_eq!(request.game_version(), "1.21.4");
        assert_eq!(
            request.coordinate().to_string(),
            "io.papermc.paper:dev-bundle:1.21.4-R0.1-SNAPSHOT@zip"
        );
        assert!(DevBundleRequest::new("1.20.6-R0.2").is_ok());
    }

    #[test]
    fn rejects_malformed_tags() {
        for tag in ["1.21.4", "1.21-R0.1-SNAPSHOT", "1.21.x-R0.1", "1.21.4-", "1.21.4-R0 1", ""] {
            match DevBundleRequest::new(tag) {
                Err(ResolutionError::InvalidTag { tag: reported, .. }) => assert_eq!(reported, tag),
                other => panic!("{tag:?} was accepted: {other:?}"),
            }
        }
    }
}
