//! End-to-end builds against a fixture repository, with a fake compiler and
//! a fixed JDK.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use plugsmith_lib::core::cache::ArtifactCache;
use plugsmith_lib::core::downloader::Downloader;
use plugsmith_lib::core::error::{BuildError, BuildResult, MappingError, ResolutionError};
use plugsmith_lib::core::java::{RuntimeHandle, ToolchainProvider, ToolchainSpec};
use plugsmith_lib::core::maven::{Coordinate, DependencyResolver};
use plugsmith_lib::core::package::{CompileRequest, Compiler, MANIFEST_PATH};
use plugsmith_lib::core::pipeline::{BuildPipeline, BuildStage};
use plugsmith_lib::core::project::{ProjectConfig, ProjectLayout, PROJECT_FILE};
use plugsmith_lib::core::resilience::RetryPolicy;

const API: &str = "io.papermc.paper:paper-api:1.21.4-R0.1-SNAPSHOT";
const GSON: &str = "com.google.code.gson:gson:2.12.1";
const BUNDLE_PATH: &str =
    "io/papermc/paper/dev-bundle/1.21.4-R0.1-SNAPSHOT/dev-bundle-1.21.4-R0.1-SNAPSHOT.zip";

const SPIGOT_TINY: &str = "tiny\t2\t0\tmojang\tspigot
c\tnet/minecraft/server/level/ServerPlayer\tnet/minecraft/server/level/EntityPlayer
";

const BUNDLE_CONFIG: &str = r#"{
  "minecraftVersion": "1.21.4",
  "apiCoordinates": ["io.papermc.paper:paper-api:1.21.4-R0.1-SNAPSHOT"],
  "libraryDependencies": ["com.google.code.gson:gson:2.11.0"],
  "compileNamespace": "MOJANG_PRODUCTION",
  "mappings": { "SPIGOT": "data/spigot.tiny", "OBFUSCATED": null },
  "remappedPackages": ["net.minecraft"]
}"#;

// ── Fixtures ────────────────────────────────────────────

fn publish_jar(repo: &Path, coord: &str) {
    let coordinate = Coordinate::parse(coord).unwrap();
    let jar = repo.join(coordinate.local_path());
    std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
    std::fs::write(&jar, coord).unwrap();
    std::fs::write(
        repo.join(coordinate.pom().local_path()),
        format!(
            "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></project>",
            coordinate.group, coordinate.artifact, coordinate.version
        ),
    )
    .unwrap();
}

fn publish_bundle(repo: &Path) {
    let path = repo.join(BUNDLE_PATH);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("config.json", options).unwrap();
    zip.write_all(BUNDLE_CONFIG.as_bytes()).unwrap();
    zip.start_file("data/spigot.tiny", options).unwrap();
    zip.write_all(SPIGOT_TINY.as_bytes()).unwrap();
    zip.finish().unwrap();
}

/// A plugin project whose repository lives in `<project>/repo`.
struct Fixture {
    project: tempfile::TempDir,
    cache: tempfile::TempDir,
}

impl Fixture {
    fn new(dev_bundle: &str, namespace: &str, source: &str) -> Self {
        let project = tempfile::tempdir().unwrap();
        let repo = project.path().join("repo");
        publish_bundle(&repo);
        publish_jar(&repo, API);
        publish_jar(&repo, GSON);
        publish_jar(&repo, "com.google.code.gson:gson:2.11.0");

        std::fs::write(
            project.path().join(PROJECT_FILE),
            format!(
                r#"
[project]
group = "com.jellypudding"
name = "fakePlayers"
version = "1.0-SNAPSHOT"

[[repositories]]
name = "fixture"
path = "repo"

[dependencies]
implementation = ["{GSON}"]

[paperweight]
dev_bundle = "{dev_bundle}"
reobf_artifact_configuration = "{namespace}"

[java]
toolchain = 21
"#
            ),
        )
        .unwrap();

        let sources = project.path().join("src/main/java/dev/example");
        std::fs::create_dir_all(&sources).unwrap();
        std::fs::write(sources.join("FakePlayer.java"), source).unwrap();
        let resources = project.path().join("src/main/resources");
        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(resources.join("plugin.yml"), "name: fakePlayers\n").unwrap();

        Self {
            project,
            cache: tempfile::tempdir().unwrap(),
        }
    }

    fn pipeline(&self) -> BuildPipeline {
        let dir = self.project.path();
        let config = ProjectConfig::load(dir).unwrap();
        let downloader = Arc::new(Downloader::with_client(reqwest::Client::new()));
        let registries = config.registries(dir, downloader).unwrap();
        let cache = ArtifactCache::new(self.cache.path(), registries, RetryPolicy::new(2, 1, 1));
        BuildPipeline::new(
            config,
            ProjectLayout::new(dir),
            Arc::new(DependencyResolver::new(Arc::new(cache), 4)),
            Arc::new(FixedToolchain),
            Arc::new(FakeCompiler),
            4,
        )
    }

    fn report(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(
            self.project.path().join("build/reports/plugsmith-build.json"),
        )
        .unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

struct FixedToolchain;

#[async_trait]
impl ToolchainProvider for FixedToolchain {
    async fn select(&self, spec: &ToolchainSpec) -> BuildResult<RuntimeHandle> {
        Ok(RuntimeHandle {
            java_home: PathBuf::from("/opt/jdk-21"),
            java_bin: PathBuf::from("/opt/jdk-21/bin/java"),
            javac_bin: Some(PathBuf::from("/opt/jdk-21/bin/javac")),
            version: "21.0.5".into(),
            major: spec.major_version(),
            vendor: "Eclipse Adoptium".into(),
            provisioned: false,
        })
    }
}

/// Emits one class per source, `dev/example/<Stem>`. A source mentioning
/// `extends ServerPlayer` gets the game class as its superclass.
struct FakeCompiler;

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, request: &CompileRequest<'_>) -> BuildResult<()> {
        assert!(request
            .classpath
            .iter()
            .any(|p| p.to_string_lossy().contains("paper-api")));
        for source in request.sources {
            let stem = source.file_stem().unwrap().to_string_lossy().to_string();
            let text = std::fs::read_to_string(source).unwrap();
            let super_name = if text.contains("extends ServerPlayer") {
                "net/minecraft/server/level/ServerPlayer"
            } else {
                "java/lang/Object"
            };
            let out = request.output_dir.join("dev/example");
            std::fs::create_dir_all(&out).unwrap();
            std::fs::write(
                out.join(format!("{stem}.class")),
                class_bytes(&format!("dev/example/{stem}"), super_name),
            )
            .unwrap();
        }
        Ok(())
    }
}

/// Minimal class: two class constants, no members.
fn class_bytes(this_name: &str, super_name: &str) -> Vec<u8> {
    fn utf8(out: &mut Vec<u8>, value: &str) {
        out.push(1);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
    }

    let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 65];
    out.extend_from_slice(&5u16.to_be_bytes());
    utf8(&mut out, this_name);
    out.extend_from_slice(&[7, 0, 1]);
    utf8(&mut out, super_name);
    out.extend_from_slice(&[7, 0, 3]);
    out.extend_from_slice(&0x0021u16.to_be_bytes());
    out.extend_from_slice(&2u16.to_be_bytes());
    out.extend_from_slice(&4u16.to_be_bytes());
    // interfaces, fields, methods, attributes
    out.extend_from_slice(&[0; 8]);
    out
}

fn jar_entry(jar: &Path, name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(jar).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w == needle.as_bytes())
}

// ── Scenarios ───────────────────────────────────────────

#[tokio::test]
async fn mojang_production_build_is_packaged() {
    let fixture = Fixture::new(
        "1.21.4-R0.1-SNAPSHOT",
        "MOJANG_PRODUCTION",
        "package dev.example; public class FakePlayer {}",
    );
    let report = fixture.pipeline().run().await.unwrap();

    assert_eq!(report.stage(), BuildStage::Packaged);
    assert_eq!(report.stages.len(), 6);
    assert_eq!(report.toolchain.as_ref().unwrap().major, 21);

    let names: Vec<String> = report
        .classpath
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert!(names.iter().any(|n| n.starts_with("paper-api-1.21.4")));
    // the project's gson wins over the bundle's 2.11.0
    assert!(names.contains(&"gson-2.12.1.jar".to_string()));
    assert!(!names.contains(&"gson-2.11.0.jar".to_string()));

    let artifact = report.artifact.unwrap();
    assert_eq!(
        artifact.path,
        fixture.project.path().join("build/libs/fakePlayers-1.0-SNAPSHOT.jar")
    );
    assert_eq!(artifact.sha256.len(), 64);

    let manifest = String::from_utf8(jar_entry(&artifact.path, MANIFEST_PATH)).unwrap();
    assert!(manifest.contains("paperweight-mappings-namespace: mojang"));
    assert_eq!(jar_entry(&artifact.path, "plugin.yml"), b"name: fakePlayers\n");
    assert!(contains(
        &jar_entry(&artifact.path, "dev/example/FakePlayer.class"),
        "dev/example/FakePlayer"
    ));

    assert_eq!(fixture.report()["stages"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn spigot_build_rewrites_game_references() {
    let fixture = Fixture::new(
        "1.21.4-R0.1-SNAPSHOT",
        "SPIGOT",
        "package dev.example; public class FakePlayer extends ServerPlayer {}",
    );
    let artifact = fixture.pipeline().run().await.unwrap().artifact.unwrap();

    let class = jar_entry(&artifact.path, "dev/example/FakePlayer.class");
    assert!(contains(&class, "net/minecraft/server/level/EntityPlayer"));
    let manifest = String::from_utf8(jar_entry(&artifact.path, MANIFEST_PATH)).unwrap();
    assert!(manifest.contains("paperweight-mappings-namespace: spigot"));
}

#[tokio::test]
async fn unsupported_namespace_halts_after_compiling() {
    let fixture = Fixture::new(
        "1.21.4-R0.1-SNAPSHOT",
        "MCP",
        "package dev.example; public class FakePlayer {}",
    );
    let failure = fixture.pipeline().run().await.unwrap_err();

    assert_eq!(failure.stage, BuildStage::Compiled);
    match &failure.error {
        BuildError::Mapping(MappingError::UnsupportedNamespace { namespace, supported }) => {
            assert_eq!(namespace.to_string(), "MCP");
            assert!(supported.iter().any(|s| s == "SPIGOT"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(failure.to_string().contains("MCP"));
    assert!(!fixture
        .project
        .path()
        .join("build/libs/fakePlayers-1.0-SNAPSHOT.jar")
        .exists());
    assert_eq!(fixture.report()["stages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn namespace_advertised_without_a_table_is_unsupported() {
    let fixture = Fixture::new(
        "1.21.4-R0.1-SNAPSHOT",
        "OBFUSCATED",
        "package dev.example; public class FakePlayer {}",
    );
    let failure = fixture.pipeline().run().await.unwrap_err();

    assert_eq!(failure.stage, BuildStage::Compiled);
    match &failure.error {
        BuildError::Mapping(MappingError::UnsupportedNamespace { namespace, supported }) => {
            assert_eq!(namespace.to_string(), "OBFUSCATED");
            assert_eq!(supported, &vec!["MOJANG_PRODUCTION".to_string(), "SPIGOT".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unpublished_bundle_halts_unresolved() {
    let fixture = Fixture::new(
        "1.21.4-R0.2-SNAPSHOT",
        "MOJANG_PRODUCTION",
        "package dev.example; public class FakePlayer {}",
    );
    let failure = fixture.pipeline().run().await.unwrap_err();

    assert_eq!(failure.stage, BuildStage::Unresolved);
    match &failure.error {
        BuildError::Resolution(ResolutionError::BundleNotFound { tag, searched }) => {
            assert_eq!(tag, "1.21.4-R0.2-SNAPSHOT");
            assert_eq!(searched, &vec!["fixture".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!fixture.project.path().join("build/classes").exists());
}

#[tokio::test]
async fn resolving_twice_gives_the_same_classpath() {
    let fixture = Fixture::new(
        "1.21.4-R0.1-SNAPSHOT",
        "MOJANG_PRODUCTION",
        "package dev.example; public class FakePlayer {}",
    );
    let pipeline = fixture.pipeline();
    let first = pipeline.resolve().await.unwrap();
    let second = pipeline.resolve().await.unwrap();
    assert_eq!(first.classpath(), second.classpath());
    assert!(!first.classpath().is_empty());
}
