use std::collections::HashMap;

use quick_xml::de::from_str;
use serde::Deserialize;

use super::artifact::Coordinate;
use crate::core::error::{BuildError, BuildResult};

/// Interpolation depth limit for nested `${...}` references.
const MAX_INTERPOLATION_PASSES: usize = 8;

/// Minimal POM model – only the fields we care about for dependency resolution.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PomDocument {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub packaging: Option<String>,
    #[serde(default)]
    pub parent: Option<PomParent>,
    #[serde(default)]
    pub properties: Option<HashMap<String, String>>,
    #[serde(default)]
    pub dependencies: Option<PomDependencies>,
    #[serde(default)]
    pub dependency_management: Option<PomDependencyManagement>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PomParent {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PomDependencies {
    #[serde(default, rename = "dependency")]
    pub items: Vec<PomDependency>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PomDependencyManagement {
    #[serde(default)]
    pub dependencies: Option<PomDependencies>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub optional: Option<bool>,
    #[serde(rename = "type", default)]
    pub dep_type: Option<String>,
    #[serde(default)]
    pub classifier: Option<String>,
}

impl PomParent {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(&self.group_id, &self.artifact_id, &self.version).pom()
    }
}

impl PomDocument {
    /// Parse a POM XML string. `owner` only labels errors.
    pub fn parse(owner: &Coordinate, xml: &str) -> BuildResult<Self> {
        from_str(xml).map_err(|e| BuildError::PomParse {
            coordinate: owner.to_string(),
            message: e.to_string(),
        })
    }

    /// Fold a parent POM into this one (child values win).
    ///
    /// Call repeatedly, nearest parent first, to build the effective POM.
    pub fn inherit(&mut self, parent: &PomDocument) {
        if self.group_id.is_none() {
            self.group_id = parent.group_id.clone();
        }
        if self.version.is_none() {
            self.version = parent.version.clone();
        }

        let mut properties = parent.properties.clone().unwrap_or_default();
        properties.extend(self.properties.take().unwrap_or_default());
        self.properties = Some(properties);

        let parent_managed = parent.managed_dependencies().to_vec();
        let managed = self
            .dependency_management
            .get_or_insert_with(Default::default)
            .dependencies
            .get_or_insert_with(Default::default);
        for dep in parent_managed {
            if !managed.items.iter().any(|d| same_module(d, &dep)) {
                managed.items.push(dep);
            }
        }

        let parent_deps = parent
            .dependencies
            .as_ref()
            .map(|d| d.items.clone())
            .unwrap_or_default();
        let deps = self.dependencies.get_or_insert_with(Default::default);
        for dep in parent_deps {
            if !deps.items.iter().any(|d| same_module(d, &dep)) {
                deps.items.push(dep);
            }
        }
    }

    fn managed_dependencies(&self) -> &[PomDependency] {
        self.dependency_management
            .as_ref()
            .and_then(|dm| dm.dependencies.as_ref())
            .map(|d| d.items.as_slice())
            .unwrap_or(&[])
    }

    fn lookup_property(&self, key: &str) -> Option<String> {
        match key {
            "project.version" | "pom.version" | "version" => self
                .version
                .clone()
                .or_else(|| self.parent.as_ref().map(|p| p.version.clone())),
            "project.groupId" | "pom.groupId" | "groupId" => self
                .group_id
                .clone()
                .or_else(|| self.parent.as_ref().map(|p| p.group_id.clone())),
            "project.artifactId" | "pom.artifactId" => self.artifact_id.clone(),
            "project.parent.version" => self.parent.as_ref().map(|p| p.version.clone()),
            "project.parent.groupId" => self.parent.as_ref().map(|p| p.group_id.clone()),
            _ => self.properties.as_ref().and_then(|p| p.get(key).cloned()),
        }
    }

    /// Substitute `${...}` references. Unknown references are left verbatim.
    pub fn interpolate(&self, value: &str) -> String {
        let mut current = value.trim().to_string();
        for _ in 0..MAX_INTERPOLATION_PASSES {
            let Some(start) = current.find("${") else {
                break;
            };
            let Some(len) = current[start..].find('}') else {
                break;
            };
            let key = &current[start + 2..start + len];
            let Some(replacement) = self.lookup_property(key) else {
                break;
            };
            current.replace_range(start..start + len + 1, replacement.trim());
        }
        current
    }

    /// Resolve a dependency version using `dependencyManagement` if explicit version is absent.
    pub fn resolve_version(&self, dep: &PomDependency) -> Option<String> {
        if let Some(version) = &dep.version {
            return Some(self.interpolate(version));
        }

        self.managed_dependencies()
            .iter()
            .find(|managed| same_module(managed, dep))
            .and_then(|managed| managed.version.as_deref())
            .map(|v| self.interpolate(v))
    }

    /// Dependencies that belong on a runtime classpath: `compile` and
    /// `runtime` scopes, optional ones excluded.
    pub fn runtime_dependencies(&self) -> Vec<PomDependency> {
        let deps = match &self.dependencies {
            Some(d) => &d.items,
            None => return vec![],
        };

        deps.iter()
            .filter(|d| {
                let scope = d.scope.as_deref().map(str::trim).unwrap_or("compile");
                let optional = d.optional.unwrap_or(false);
                matches!(scope, "compile" | "runtime") && !optional
            })
            .map(|d| PomDependency {
                group_id: self.interpolate(&d.group_id),
                artifact_id: self.interpolate(&d.artifact_id),
                classifier: d.classifier.as_deref().map(|c| self.interpolate(c)),
                ..d.clone()
            })
            .collect()
    }

    /// Turn a dependency entry into a coordinate, or `None` when its version
    /// cannot be determined.
    pub fn dependency_coordinate(&self, dep: &PomDependency) -> Option<Coordinate> {
        let version = self.resolve_version(dep)?;
        if version.contains("${") || version.is_empty() {
            return None;
        }
        // Maven version ranges pick the lower bound; we never widen silently.
        let version = strip_range(&version)?;
        let extension = match dep.dep_type.as_deref() {
            None | Some("jar") | Some("bundle") => "jar",
            Some(other) => other,
        };
        Some(Coordinate {
            group: dep.group_id.clone(),
            artifact: dep.artifact_id.clone(),
            version,
            classifier: dep.classifier.clone(),
            extension: extension.to_string(),
        })
    }
}

fn same_module(a: &PomDependency, b: &PomDependency) -> bool {
    a.group_id == b.group_id && a.artifact_id == b.artifact_id && a.classifier == b.classifier
}

/// `[1.2,2.0)` → `1.2`, `[1.2]` → `1.2`, plain versions unchanged.
fn strip_range(version: &str) -> Option<String> {
    if !version.starts_with('[') && !version.starts_with('(') {
        return Some(version.to_string());
    }
    let inner = version.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')'));
    inner
        .split(',')
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}
