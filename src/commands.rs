use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::devbundle::DevBundle;
use crate::core::java::{RuntimeHandle, ToolchainProvider, ToolchainSpec};
use crate::core::maven::RegistryList;
use crate::core::pipeline::{BuildPipeline, BuildReport, ResolvedBuild};
use crate::core::project::{ProjectConfig, ProjectLayout, PROJECT_FILE};
use crate::core::state::BuildEnvironment;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub data_dir: Option<PathBuf>,
    pub offline: bool,
}

impl GlobalOptions {
    fn environment(&self) -> Result<BuildEnvironment> {
        let env = BuildEnvironment::open(self.data_dir.as_deref())
            .context("Failed to open the plugsmith data directory")?;
        Ok(env.with_offline(self.offline))
    }
}

fn pipeline(env: &BuildEnvironment, project_dir: &Path) -> Result<BuildPipeline> {
    BuildPipeline::for_project(env, project_dir).with_context(|| {
        format!("Failed to load {} in {}", PROJECT_FILE, project_dir.display())
    })
}

/// Run the whole pipeline. Ctrl-C cancels the build between stages and
/// aborts in-flight downloads.
pub async fn build(options: &GlobalOptions, project_dir: &Path) -> Result<BuildReport> {
    let env = options.environment()?;
    let pipeline = pipeline(&env, project_dir)?;

    let token = pipeline.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling build");
            token.cancel();
        }
    });

    let result = pipeline.run().await;
    watcher.abort();
    Ok(result?)
}

pub async fn resolve(options: &GlobalOptions, project_dir: &Path) -> Result<ResolvedBuild> {
    let env = options.environment()?;
    let resolved = pipeline(&env, project_dir)?.resolve().await?;
    Ok(resolved)
}

pub async fn bundle(options: &GlobalOptions, project_dir: &Path) -> Result<DevBundle> {
    Ok(resolve(options, project_dir).await?.bundle)
}

/// `major` overrides the project's `[java] toolchain`.
pub async fn toolchain(
    options: &GlobalOptions,
    project_dir: &Path,
    major: Option<u32>,
) -> Result<RuntimeHandle> {
    let spec = match major {
        Some(major) => ToolchainSpec::new(major)?,
        None => ProjectConfig::load(project_dir)
            .with_context(|| {
                format!(
                    "No --major given and no readable {} in {}",
                    PROJECT_FILE,
                    project_dir.display()
                )
            })?
            .toolchain(),
    };

    let env = options.environment()?;
    let handle = ToolchainProvider::select(&env.toolchain_selector(), &spec).await?;
    Ok(handle)
}

/// Partial downloads younger than this may still be in flight elsewhere.
const STALE_PARTIAL_AGE: Duration = Duration::from_secs(60 * 60);

/// Remove `build/` and stale partial downloads. With `all`, clear the
/// artifact cache as well.
pub async fn clean(options: &GlobalOptions, project_dir: &Path, all: bool) -> Result<()> {
    let build_dir = ProjectLayout::new(project_dir).build_dir();
    if tokio::fs::try_exists(&build_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&build_dir)
            .await
            .with_context(|| format!("Failed to remove {}", build_dir.display()))?;
        info!("Removed {}", build_dir.display());
    }

    let env = options.environment()?;
    let cache = env.artifact_cache(RegistryList::new());
    if all {
        cache.clear().await?;
        info!("Cleared artifact cache at {}", env.cache_dir().display());
    } else {
        cache.sweep_partials(STALE_PARTIAL_AGE).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_removes_build_output_only() {
        let project = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let libs = project.path().join("build").join("libs");
        std::fs::create_dir_all(&libs).unwrap();
        std::fs::write(libs.join("greeter-1.0.jar"), b"jar").unwrap();
        std::fs::create_dir_all(project.path().join("src")).unwrap();

        let options = GlobalOptions {
            data_dir: Some(data.path().to_path_buf()),
            offline: true,
        };
        clean(&options, project.path(), false).await.unwrap();
        assert!(!project.path().join("build").exists());
        assert!(project.path().join("src").exists());

        // nothing left to remove is fine
        clean(&options, project.path(), true).await.unwrap();
    }

    #[tokio::test]
    async fn clean_keeps_partials_still_being_written() {
        let project = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let options = GlobalOptions {
            data_dir: Some(data.path().to_path_buf()),
            offline: true,
        };
        let cache_dir = options.environment().unwrap().cache_dir().to_path_buf();
        let module = cache_dir.join("com").join("example").join("lib").join("1.0");
        std::fs::create_dir_all(&module).unwrap();
        let part = module.join("lib-1.0.jar.0f3a.part");
        std::fs::write(&part, b"in flight").unwrap();

        clean(&options, project.path(), false).await.unwrap();
        assert!(part.exists());
    }

    #[tokio::test]
    async fn toolchain_without_major_or_project_fails() {
        let project = tempfile::tempdir().unwrap();
        let err = toolchain(&GlobalOptions::default(), project.path(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(PROJECT_FILE));
    }
}
