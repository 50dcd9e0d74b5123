//! Bytecode reobfuscation of compiled plugin classes.

pub mod classfile;
mod hierarchy;
mod remapper;
mod signature;

pub use hierarchy::{ClassHierarchy, ClassNode};
pub use remapper::{ClassRemapper, RemapSummary, RemappedClass};
pub use signature::remap_signature;
