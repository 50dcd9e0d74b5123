use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::namespace::MappingNamespace;
use super::tiny::MappingTable;
use crate::core::error::MappingError;

/// Mapping information a dev bundle publishes.
///
/// Tables translate from the compile namespace into each target namespace;
/// the compile namespace itself needs no table. Names the bundle advertises
/// without a usable table are kept apart in `unmapped`.
#[derive(Debug, Clone)]
pub struct MappingMetadata {
    pub compile_namespace: MappingNamespace,
    unmapped: BTreeSet<String>,
    tables: BTreeMap<MappingNamespace, Arc<MappingTable>>,
    /// Internal-name prefixes (`net/minecraft/`) whose classes must be mapped.
    remapped_packages: Vec<String>,
}

impl MappingMetadata {
    pub fn new(compile_namespace: MappingNamespace, remapped_packages: Vec<String>) -> Self {
        Self {
            compile_namespace,
            unmapped: BTreeSet::new(),
            tables: BTreeMap::new(),
            remapped_packages: remapped_packages
                .into_iter()
                .map(|p| normalize_package(&p))
                .collect(),
        }
    }

    /// Record a namespace name reported by the bundle. Only a recognised
    /// name with a table becomes a remap target.
    pub fn add_namespace(&mut self, reported: &str, table: Option<MappingTable>) {
        match (MappingNamespace::from_bundle_name(reported), table) {
            (Some(ns), Some(table)) => {
                self.unmapped.remove(ns.as_str());
                self.tables.insert(ns, Arc::new(table));
            }
            (Some(ns), None) if ns == self.compile_namespace || self.tables.contains_key(&ns) => {}
            (Some(ns), None) => {
                self.unmapped.insert(ns.as_str().to_string());
            }
            (None, _) => {
                self.unmapped.insert(reported.to_string());
            }
        }
    }

    /// Namespaces a build can target: the compile namespace plus every
    /// namespace with a table, sorted.
    pub fn supported(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .tables
            .keys()
            .map(|ns| ns.as_str().to_string())
            .collect();
        names.insert(self.compile_namespace.as_str().to_string());
        names.into_iter().collect()
    }

    /// Names the bundle advertises without a usable table.
    pub fn unmapped(&self) -> Vec<String> {
        self.unmapped.iter().cloned().collect()
    }

    pub fn supports(&self, namespace: MappingNamespace) -> bool {
        namespace == self.compile_namespace || self.tables.contains_key(&namespace)
    }

    /// Table from the compile namespace into `target`. `Ok(None)` means the
    /// target is the compile namespace and names pass through unchanged.
    pub fn table_for(
        &self,
        target: MappingNamespace,
    ) -> Result<Option<Arc<MappingTable>>, MappingError> {
        if target == self.compile_namespace {
            return Ok(None);
        }
        self.tables
            .get(&target)
            .cloned()
            .map(Some)
            .ok_or_else(|| MappingError::UnsupportedNamespace {
                namespace: target,
                supported: self.supported(),
            })
    }

    pub fn remapped_packages(&self) -> &[String] {
        &self.remapped_packages
    }

    /// Whether an internal class name falls under a remapped package.
    pub fn is_remapped(&self, internal_name: &str) -> bool {
        self.remapped_packages
            .iter()
            .any(|prefix| internal_name.starts_with(prefix.as_str()))
    }
}

/// `net.minecraft` and `net/minecraft/` both become `net/minecraft/`.
fn normalize_package(package: &str) -> String {
    let mut internal = package.trim().replace('.', "/");
    if !internal.ends_with('/') {
        internal.push('/');
    }
    internal
}
