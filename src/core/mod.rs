// ─── Plugsmith Core ───
// Build backend for Paper server plugins.
//
// Architecture:
//   core/
//     maven/      Coordinates, POMs, registries, transitive resolution
//     cache/      Content-addressed artifact cache with single-flight fetches
//     downloader/ Streaming downloads with checksum verification
//     resilience/ Retry with exponential backoff for transient failures
//     devbundle/  Dev bundle tags, bundle config, materialization
//     mapping/    Namespaces, mapping tables, reobf configuration
//     remap/      Class file rewriting between namespaces
//     java/       JDK detection, toolchain selection, provisioning
//     package/    javac invocation and jar assembly
//     project/    plugsmith.toml and the project layout
//     pipeline/   Build stages and the pipeline driver
//     state/      Data directory, settings, shared HTTP

pub mod cache;
pub mod devbundle;
pub mod downloader;
pub mod error;
pub mod fsutil;
pub mod http;
pub mod java;
pub mod mapping;
pub mod maven;
pub mod package;
pub mod pipeline;
pub mod project;
pub mod remap;
pub mod resilience;
pub mod state;
