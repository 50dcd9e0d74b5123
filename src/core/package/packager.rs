use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use super::compiler::{CompileRequest, Compiler};
use crate::core::downloader::{part_path, PartFileGuard};
use crate::core::error::{BuildError, BuildResult};
use crate::core::fsutil::{entry_name, list_files};
use crate::core::java::RuntimeHandle;
use crate::core::mapping::{MappingMetadata, MappingNamespace, ReobfConfiguration};
use crate::core::project::ProjectLayout;
use crate::core::remap::{ClassHierarchy, ClassRemapper, RemapSummary};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const MAPPINGS_NAMESPACE_ATTRIBUTE: &str = "paperweight-mappings-namespace";

/// The packaged plugin jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub namespace: MappingNamespace,
    pub classpath: Vec<PathBuf>,
    pub sha256: String,
    pub size: u64,
}

/// Compiles, remaps and jars a project.
///
/// The three steps are exposed separately so a caller can observe each
/// completed stage; `package` runs them in order.
pub struct ArtifactPackager {
    layout: ProjectLayout,
    jar_name: String,
    compiler: Arc<dyn Compiler>,
    concurrency: usize,
}

impl ArtifactPackager {
    pub fn new(
        layout: ProjectLayout,
        jar_name: impl Into<String>,
        compiler: Arc<dyn Compiler>,
        concurrency: usize,
    ) -> Self {
        Self {
            layout,
            jar_name: jar_name.into(),
            compiler,
            concurrency: concurrency.max(1),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn jar_path(&self) -> PathBuf {
        self.layout.libs_dir().join(&self.jar_name)
    }

    pub async fn package(
        &self,
        classpath: &[PathBuf],
        toolchain: &RuntimeHandle,
        reobf: &ReobfConfiguration,
        mapping: Arc<MappingMetadata>,
    ) -> BuildResult<BuildArtifact> {
        self.compile(classpath, toolchain).await?;
        self.remap(classpath, reobf, mapping).await?;
        self.write_jar(classpath, reobf.namespace()).await
    }

    /// Compile `src/main/java` into a fresh classes directory.
    #[instrument(skip_all, fields(project = %self.layout.root().display()))]
    pub async fn compile(&self, classpath: &[PathBuf], toolchain: &RuntimeHandle) -> BuildResult<usize> {
        let source_root = self.layout.java_sources();
        let listing_root = source_root.clone();
        let sources: Vec<PathBuf> = spawn_listing(listing_root)
            .await?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "java"))
            .map(|p| source_root.join(p))
            .collect();

        let output_dir = self.layout.classes_dir();
        reset_dir(&output_dir).await?;

        if sources.is_empty() {
            warn!("No Java sources under {:?}", source_root);
            return Ok(0);
        }

        self.compiler
            .compile(&CompileRequest {
                toolchain,
                sources: &sources,
                classpath,
                output_dir: &output_dir,
            })
            .await?;
        info!("Compiled {} source file(s)", sources.len());
        Ok(sources.len())
    }

    /// Remap compiled classes into the configured namespace.
    ///
    /// This is where the namespace is first checked against the bundle.
    /// Remapped classes on `classpath` supply the ancestry that member
    /// references are resolved through.
    pub async fn remap(
        &self,
        classpath: &[PathBuf],
        reobf: &ReobfConfiguration,
        mapping: Arc<MappingMetadata>,
    ) -> BuildResult<RemapSummary> {
        reobf.validate(&mapping)?;
        let mut remapper = ClassRemapper::new(mapping.clone(), reobf.namespace())?;
        if !remapper.is_identity() {
            let jars = classpath.to_vec();
            let hierarchy = tokio::task::spawn_blocking(move || {
                let mut hierarchy = ClassHierarchy::new();
                let added = hierarchy.index_jars(&jars, |name| mapping.is_remapped(name));
                info!("Indexed {} remapped class(es) from the classpath", added);
                hierarchy
            })
            .await
            .map_err(|e| BuildError::Other(format!("class hierarchy task failed: {e}")))?;
            remapper = remapper.with_hierarchy(hierarchy);
        }
        let remapper = Arc::new(remapper);

        let output_dir = self.layout.remapped_dir();
        reset_dir(&output_dir).await?;
        remapper
            .remap_directory(&self.layout.classes_dir(), &output_dir, self.concurrency)
            .await
    }

    /// Write the jar next to its final name and rename it into place.
    #[instrument(skip_all, fields(jar = %self.jar_name))]
    pub async fn write_jar(
        &self,
        classpath: &[PathBuf],
        namespace: MappingNamespace,
    ) -> BuildResult<BuildArtifact> {
        let libs = self.layout.libs_dir();
        tokio::fs::create_dir_all(&libs).await.map_err(|e| BuildError::Io {
            path: libs.clone(),
            source: e,
        })?;

        let dest = self.jar_path();
        let guard = PartFileGuard::new(part_path(&dest));
        let part = guard.path().to_path_buf();
        let classes = self.layout.remapped_dir();
        let resources = self.layout.resources();

        let (sha256, size) = tokio::task::spawn_blocking(move || {
            write_jar_file(&part, &classes, &resources, namespace)
        })
        .await
        .map_err(|e| BuildError::Other(format!("jar writer task failed: {e}")))??;

        guard.promote(&dest).await?;
        info!("Packaged {:?} ({} bytes, {})", dest, size, namespace);

        Ok(BuildArtifact {
            path: dest,
            namespace,
            classpath: classpath.to_vec(),
            sha256,
            size,
        })
    }
}

async fn spawn_listing(root: PathBuf) -> BuildResult<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || list_files(&root))
        .await
        .map_err(|e| BuildError::Other(format!("file listing task failed: {e}")))?
}

async fn reset_dir(dir: &Path) -> BuildResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(BuildError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    }
    tokio::fs::create_dir_all(dir).await.map_err(|e| BuildError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

pub fn manifest(namespace: MappingNamespace) -> String {
    format!(
        "Manifest-Version: 1.0\r\nCreated-By: plugsmith {}\r\n{}: {}\r\n\r\n",
        env!("CARGO_PKG_VERSION"),
        MAPPINGS_NAMESPACE_ATTRIBUTE,
        namespace.manifest_value()
    )
}

/// Entries are sorted and carry a fixed timestamp so equal inputs give
/// byte-identical jars. Returns the SHA-256 and size of the file.
fn write_jar_file(
    dest: &Path,
    classes: &Path,
    resources: &Path,
    namespace: MappingNamespace,
) -> BuildResult<(String, u64)> {
    let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();
    for relative in list_files(classes)? {
        entries.insert(entry_name(&relative), classes.join(relative));
    }
    for relative in list_files(resources)? {
        let name = entry_name(&relative);
        if name.eq_ignore_ascii_case(MANIFEST_PATH) {
            warn!("Ignoring {} from resources, the manifest is generated", MANIFEST_PATH);
            continue;
        }
        if entries.insert(name.clone(), resources.join(relative)).is_some() {
            warn!("Resource {} replaces a compiled class", name);
        }
    }

    let io_err = |e: std::io::Error| BuildError::Io {
        path: dest.to_path_buf(),
        source: e,
    };
    let file = std::fs::File::create(dest).map_err(io_err)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    zip.start_file(MANIFEST_PATH, options)?;
    zip.write_all(manifest(namespace).as_bytes()).map_err(io_err)?;
    for (name, source) in &entries {
        zip.start_file(name.as_str(), options)?;
        let bytes = std::fs::read(source).map_err(|e| BuildError::Io {
            path: source.clone(),
            source: e,
        })?;
        zip.write_all(&bytes).map_err(io_err)?;
    }
    zip.finish()?;

    let written = std::fs::read(dest).map_err(io_err)?;
    let sha256 = hex::encode(Sha256::digest(&written));
    Ok((sha256, written.len() as u64))
}
