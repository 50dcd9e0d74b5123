use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::paths::{java_home_of, javac_beside, system_java_candidates};
use super::runtime::{
    best_managed_runtime, compare_java_versions, probe_blocking, JavaInstallation,
    RuntimeProvisioner,
};
use crate::core::error::{BuildResult, ToolchainError};

/// Oldest Java release a project may request.
pub const MIN_TOOLCHAIN_MAJOR: u32 = 8;

/// Requested Java major version. Validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ToolchainSpec {
    major_version: u32,
}

impl ToolchainSpec {
    pub fn new(major_version: u32) -> Result<Self, ToolchainError> {
        if major_version < MIN_TOOLCHAIN_MAJOR {
            return Err(ToolchainError::InvalidSpec {
                major: major_version,
            });
        }
        Ok(Self { major_version })
    }

    pub fn major_version(&self) -> u32 {
        self.major_version
    }
}

impl TryFrom<u32> for ToolchainSpec {
    type Error = ToolchainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ToolchainSpec> for u32 {
    fn from(spec: ToolchainSpec) -> Self {
        spec.major_version
    }
}

impl fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Java {}", self.major_version)
    }
}

/// A concrete JDK chosen for the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeHandle {
    pub java_home: PathBuf,
    pub java_bin: PathBuf,
    pub javac_bin: Option<PathBuf>,
    pub version: String,
    pub major: u32,
    pub vendor: String,
    /// Installed by this tool rather than found on the system.
    pub provisioned: bool,
}

impl RuntimeHandle {
    fn from_installation(install: JavaInstallation, provisioned: bool) -> Self {
        Self {
            java_home: java_home_of(&install.path),
            javac_bin: javac_beside(&install.path),
            java_bin: install.path,
            version: install.version,
            major: install.major,
            vendor: install.vendor,
            provisioned,
        }
    }

    /// The `javac` binary, or `MissingCompiler` for a bare JRE.
    pub fn require_javac(&self) -> Result<&PathBuf, ToolchainError> {
        self.javac_bin
            .as_ref()
            .ok_or_else(|| ToolchainError::MissingCompiler {
                major: self.major,
                java_home: self.java_home.clone(),
            })
    }
}

/// Picks a JDK whose major version equals the request exactly.
///
/// Scan order: managed runtimes, then system installations (`JAVA_HOME`,
/// `PATH`, platform JVM directories). Among matches the newest version wins.
/// Installations without `javac` are skipped. With nothing usable found, a
/// JDK is provisioned when a provisioner is configured.
pub struct ToolchainSelector {
    runtimes_root: PathBuf,
    provisioner: Option<RuntimeProvisioner>,
    scan_system: bool,
}

impl ToolchainSelector {
    pub fn new(runtimes_root: impl Into<PathBuf>) -> Self {
        Self {
            runtimes_root: runtimes_root.into(),
            provisioner: None,
            scan_system: true,
        }
    }

    pub fn with_provisioner(mut self, provisioner: RuntimeProvisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Only consider managed runtimes. Keeps tests independent of the host.
    pub fn managed_only(mut self) -> Self {
        self.scan_system = false;
        self
    }

    #[instrument(skip(self), fields(major = spec.major_version()))]
    pub async fn select(&self, spec: &ToolchainSpec) -> BuildResult<RuntimeHandle> {
        let major = spec.major_version();
        let mut jre_only = None;

        if let Some(managed) = best_managed_runtime(&self.runtimes_root, major).await {
            if let Some(install) = probe_blocking(managed.java_bin.clone()).await {
                let handle = RuntimeHandle::from_installation(install, true);
                if handle.javac_bin.is_some() {
                    info!("Using managed Java {} at {:?}", handle.version, handle.java_home);
                    return Ok(handle);
                }
                jre_only = Some(handle);
            }
        }

        if self.scan_system {
            let mut matches = Vec::new();
            for candidate in system_java_candidates() {
                let Some(install) = probe_blocking(candidate.clone()).await else {
                    debug!("{:?} did not answer the version probe", candidate);
                    continue;
                };
                if install.major != major {
                    debug!("Skipping Java {} at {:?}", install.version, install.path);
                    continue;
                }
                let handle = RuntimeHandle::from_installation(install, false);
                if handle.javac_bin.is_some() {
                    matches.push(handle);
                } else if jre_only.is_none() {
                    jre_only = Some(handle);
                }
            }
            if let Some(best) = newest(matches) {
                info!("Using system Java {} at {:?}", best.version, best.java_home);
                return Ok(best);
            }
        }

        if let Some(provisioner) = &self.provisioner {
            info!("No local JDK {} found, provisioning one", major);
            let java_bin = provisioner.provision(major).await?;
            let install = probe_blocking(java_bin.clone()).await.ok_or_else(|| {
                ToolchainError::Unavailable {
                    major,
                    install_path: java_home_of(&java_bin),
                    reason: "provisioned runtime does not start".to_string(),
                }
            })?;
            let handle = RuntimeHandle::from_installation(install, true);
            handle.require_javac()?;
            return Ok(handle);
        }

        if let Some(jre) = jre_only {
            return Err(ToolchainError::MissingCompiler {
                major,
                java_home: jre.java_home,
            }
            .into());
        }

        Err(ToolchainError::Unavailable {
            major,
            install_path: self.runtimes_root.clone(),
            reason: "no matching installation found and provisioning is disabled".to_string(),
        }
        .into())
    }
}

/// Where a build gets its JDK from.
#[async_trait]
pub trait ToolchainProvider: Send + Sync {
    async fn select(&self, spec: &ToolchainSpec) -> BuildResult<RuntimeHandle>;
}

#[async_trait]
impl ToolchainProvider for ToolchainSelector {
    async fn select(&self, spec: &ToolchainSpec) -> BuildResult<RuntimeHandle> {
        ToolchainSelector::select(self, spec).await
    }
}

fn newest(mut handles: Vec<RuntimeHandle>) -> Option<RuntimeHandle> {
    handles.sort_by(|a, b| {
        compare_java_versions(&b.version, &a.version)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.java_bin.cmp(&b.java_bin))
    });
    handles.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_rejects_ancient_majors() {
        assert!(ToolchainSpec::new(21).is_ok());
        assert!(matches!(
            ToolchainSpec::new(7),
            Err(ToolchainError::InvalidSpec { major: 7 })
        ));
        let parsed: Result<ToolchainSpec, _> = serde_json::from_str("5");
        assert!(parsed.is_err());
    }

    #[test]
    fn newest_patch_wins() {
        let handle = |version: &str| RuntimeHandle {
            java_home: PathBuf::from(format!("/jdk/{version}")),
            java_bin: PathBuf::from(format!("/jdk/{version}/bin/java")),
            javac_bin: None,
            version: version.into(),
            major: 21,
            vendor: "Temurin".into(),
            provisioned: false,
        };
        let best = newest(vec![handle("21.0.2"), handle("21.0.5"), handle("21.0.3")]).unwrap();
        assert_eq!(best.version, "21.0.5");
    }

    #[cfg(unix)]
    mod managed {
        use super::*;
        use crate::core::java::runtime::platform::platform_arch;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn fake_runtime(runtimes: &Path, version: &str, with_javac: bool) {
            let major = version.split('.').next().unwrap();
            let root = runtimes.join(format!("java{major}-temurin-{version}"));
            let bin = root.join("bin");
            std::fs::create_dir_all(&bin).unwrap();

            let script = format!(
                "#!/bin/sh\necho 'Property settings:' >&2\necho '    java.vendor = Eclipse Adoptium' >&2\necho '    java.version = {version}' >&2\necho 'openjdk version \"{version}\"' >&2\n"
            );
            let java = bin.join("java");
            std::fs::write(&java, script).unwrap();
            std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
            if with_javac {
                std::fs::write(bin.join("javac"), "#!/bin/sh\n").unwrap();
            }

            let metadata = serde_json::json!({
                "schema_version": 1,
                "identifier": format!("java{major}-temurin-{version}"),
                "major": major.parse::<u32>().unwrap(),
                "vendor": "Temurin",
                "version": version,
                "arch": platform_arch(),
                "os": "linux",
                "sha256_archive": "",
                "installed_at": "2025-01-01T00:00:00Z",
                "source_url": "",
                "java_bin_rel": "bin/java",
            });
            std::fs::write(root.join("runtime.json"), metadata.to_string()).unwrap();
        }

        #[tokio::test]
        async fn exact_major_is_selected() {
            let dir = tempfile::tempdir().unwrap();
            fake_runtime(dir.path(), "17.0.12", true);
            fake_runtime(dir.path(), "21.0.5", true);

            let selector = ToolchainSelector::new(dir.path()).managed_only();
            let handle = selector
                .select(&ToolchainSpec::new(21).unwrap())
                .await
                .unwrap();
            assert_eq!(handle.major, 21);
            assert_eq!(handle.version, "21.0.5");
            assert!(handle.provisioned);
            assert!(handle.javac_bin.is_some());
        }

        #[tokio::test]
        async fn newer_major_does_not_satisfy_request() {
            let dir = tempfile::tempdir().unwrap();
            fake_runtime(dir.path(), "21.0.5", true);

            let selector = ToolchainSelector::new(dir.path()).managed_only();
            let err = selector
                .select(&ToolchainSpec::new(17).unwrap())
                .await
                .unwrap_err();
            let text = err.to_string();
            assert!(text.contains("Java 17"), "{text}");
            assert!(text.contains(&dir.path().display().to_string()), "{text}");
        }

        #[tokio::test]
        async fn jre_without_javac_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            fake_runtime(dir.path(), "21.0.5", false);

            let selector = ToolchainSelector::new(dir.path()).managed_only();
            let err = selector
                .select(&ToolchainSpec::new(21).unwrap())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                crate::core::error::BuildError::Toolchain(ToolchainError::MissingCompiler {
                    major: 21,
                    ..
                })
            ));
        }
    }
}
