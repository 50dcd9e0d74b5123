use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::stage::{BuildStage, PipelineFailure};
use crate::core::devbundle::{DevBundle, DevBundleMaterializer};
use crate::core::error::{BuildError, BuildResult};
use crate::core::java::{RuntimeHandle, ToolchainProvider};
use crate::core::mapping::MappingNamespace;
use crate::core::maven::{DependencyResolver, Resolution};
use crate::core::package::{ArtifactPackager, BuildArtifact, Compiler, JavacCompiler};
use crate::core::project::{ProjectConfig, ProjectLayout};
use crate::core::state::BuildEnvironment;

const REPORT_FILE: &str = "plugsmith-build.json";

/// Dev bundle plus the merged project resolution.
#[derive(Debug, Clone)]
pub struct ResolvedBuild {
    pub bundle: DevBundle,
    pub resolution: Resolution,
}

impl ResolvedBuild {
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.resolution.classpath()
    }
}

/// Summary of one build, written to `build/reports/plugsmith-build.json`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: String,
    pub project: String,
    pub dev_bundle: String,
    pub namespace: MappingNamespace,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Every stage reached, in order.
    pub stages: Vec<BuildStage>,
    pub classpath: Vec<PathBuf>,
    pub toolchain: Option<RuntimeHandle>,
    pub artifact: Option<BuildArtifact>,
    pub error: Option<String>,
}

impl BuildReport {
    fn start(project: &ProjectConfig) -> Self {
        Self {
            build_id: Uuid::new_v4().to_string(),
            project: format!(
                "{}:{}:{}",
                project.project.group, project.project.name, project.project.version
            ),
            dev_bundle: project.paperweight.dev_bundle.tag().to_string(),
            namespace: project.paperweight.reobf_artifact_configuration,
            started_at: Utc::now(),
            finished_at: None,
            stages: vec![BuildStage::Unresolved],
            classpath: Vec::new(),
            toolchain: None,
            artifact: None,
            error: None,
        }
    }

    /// Last stage reached.
    pub fn stage(&self) -> BuildStage {
        self.stages.last().copied().unwrap_or(BuildStage::Unresolved)
    }

    fn advance(&mut self, to: BuildStage) {
        debug_assert_eq!(self.stage().next(), Some(to), "stages only move forward");
        info!(stage = %to, "Build stage reached");
        self.stages.push(to);
    }
}

/// Drives a project from `Unresolved` to `Packaged`.
pub struct BuildPipeline {
    project: ProjectConfig,
    layout: ProjectLayout,
    resolver: Arc<DependencyResolver>,
    materializer: DevBundleMaterializer,
    toolchains: Arc<dyn ToolchainProvider>,
    packager: ArtifactPackager,
    cancel: CancellationToken,
}

impl BuildPipeline {
    pub fn new(
        project: ProjectConfig,
        layout: ProjectLayout,
        resolver: Arc<DependencyResolver>,
        toolchains: Arc<dyn ToolchainProvider>,
        compiler: Arc<dyn Compiler>,
        concurrency: usize,
    ) -> Self {
        let packager = ArtifactPackager::new(
            layout.clone(),
            project.artifact_file_name(),
            compiler,
            concurrency,
        );
        Self {
            materializer: DevBundleMaterializer::new(resolver.clone()),
            project,
            layout,
            resolver,
            toolchains,
            packager,
            cancel: CancellationToken::new(),
        }
    }

    /// Production wiring: `plugsmith.toml` from `project_dir`, the
    /// environment's cache and toolchains, and `javac`.
    pub fn for_project(env: &BuildEnvironment, project_dir: &Path) -> BuildResult<Self> {
        let project = ProjectConfig::load(project_dir)?;
        let registries = project.registries(project_dir, env.downloader.clone())?;
        Ok(Self::new(
            project,
            ProjectLayout::new(project_dir),
            env.resolver(registries),
            Arc::new(env.toolchain_selector()),
            Arc::new(JavacCompiler),
            env.settings.concurrency,
        ))
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn packager(&self) -> &ArtifactPackager {
        &self.packager
    }

    /// Materialize the dev bundle and resolve it together with the
    /// project's dependencies.
    pub async fn resolve(&self) -> BuildResult<ResolvedBuild> {
        let bundle = self
            .guard(self.materializer.materialize(&self.project.paperweight.dev_bundle))
            .await?;
        let roots = bundle.merge_roots(&self.project.dependencies()?);
        let resolution = self
            .guard(self.resolver.resolve_pinned(&roots, bundle.api_coordinates()))
            .await?;
        Ok(ResolvedBuild { bundle, resolution })
    }

    #[instrument(skip(self), fields(project = %self.project.project.name))]
    pub async fn run(&self) -> Result<BuildReport, PipelineFailure> {
        let mut report = BuildReport::start(&self.project);
        let result = self.drive(&mut report).await;

        report.finished_at = Some(Utc::now());
        if let Err(error) = &result {
            report.error = Some(error.to_string());
        }
        self.write_report(&report).await;

        match result {
            Ok(()) => {
                info!(
                    "Build {} packaged in {} ms",
                    report.build_id,
                    (Utc::now() - report.started_at).num_milliseconds()
                );
                Ok(report)
            }
            Err(error) => Err(PipelineFailure {
                stage: report.stage(),
                error,
            }),
        }
    }

    async fn drive(&self, report: &mut BuildReport) -> BuildResult<()> {
        let resolved = self.resolve().await?;
        let classpath = resolved.classpath();
        report.classpath = classpath.clone();
        report.advance(BuildStage::DependenciesResolved);

        let toolchain = self
            .guard(self.toolchains.select(&self.project.toolchain()))
            .await?;
        report.toolchain = Some(toolchain.clone());
        report.advance(BuildStage::ToolchainSelected);

        self.guard(self.packager.compile(&classpath, &toolchain)).await?;
        report.advance(BuildStage::Compiled);

        let reobf = self.project.reobf();
        self.guard(
            self.packager
                .remap(&classpath, &reobf, resolved.bundle.mapping.clone()),
        )
        .await?;
        report.advance(BuildStage::Remapped);

        let artifact = self
            .guard(self.packager.write_jar(&classpath, reobf.namespace()))
            .await?;
        report.artifact = Some(artifact);
        report.advance(BuildStage::Packaged);
        Ok(())
    }

    /// Run `work` unless the build is cancelled first. A cancelled future is
    /// dropped, which discards its partial files.
    async fn guard<T>(&self, work: impl Future<Output = BuildResult<T>>) -> BuildResult<T> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BuildError::Cancelled),
            result = work => result,
        }
    }

    async fn write_report(&self, report: &BuildReport) {
        let dir = self.layout.build_dir().join("reports");
        let path = dir.join(REPORT_FILE);
        let outcome = async {
            tokio::fs::create_dir_all(&dir).await?;
            let json = serde_json::to_vec_pretty(report).map_err(std::io::Error::from)?;
            tokio::fs::write(&path, json).await
        }
        .await;
        if let Err(e) = outcome {
            warn!("Could not write build report {:?}: {}", path, e);
        }
    }
}
