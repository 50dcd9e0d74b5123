//! Compilation, remapping and jar assembly.

mod compiler;
mod packager;

pub use compiler::{
    classpath_separator, join_classpath, parse_diagnostics, CompileRequest, Compiler,
    JavacCompiler,
};
pub use packager::{
    manifest, ArtifactPackager, BuildArtifact, MANIFEST_PATH, MAPPINGS_NAMESPACE_ATTRIBUTE,
};
