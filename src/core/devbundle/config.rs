use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{BuildError, BuildResult, ResolutionError};
use crate::core::mapping::{MappingMetadata, MappingNamespace, MappingTable};
use crate::core::maven::Coordinate;

pub const CONFIG_ENTRY: &str = "config.json";

/// `config.json` at the root of a dev bundle zip.
///
/// ```json
/// {
///   "minecraftVersion": "1.21.4",
///   "apiCoordinates": ["io.papermc.paper:paper-api:1.21.4-R0.1-SNAPSHOT"],
///   "libraryDependencies": ["com.mojang:brigadier:1.3.10"],
///   "compileNamespace": "MOJANG_PRODUCTION",
///   "mappings": { "SPIGOT": "data/spigot.tiny", "intermediary": null },
///   "remappedPackages": ["net.minecraft", "com.mojang.math"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
    pub minecraft_version: String,
    pub api_coordinates: Vec<String>,
    #[serde(default)]
    pub library_dependencies: Vec<String>,
    pub compile_namespace: String,
    /// Namespace name to the Tiny file translating into it. `null` when the
    /// bundle advertises a namespace without shipping a table.
    #[serde(default)]
    pub mappings: BTreeMap<String, Option<String>>,
    #[serde(default = "default_remapped_packages")]
    pub remapped_packages: Vec<String>,
}

fn default_remapped_packages() -> Vec<String> {
    vec!["net.minecraft".to_string(), "com.mojang.math".to_string()]
}

impl BundleConfig {
    pub fn api(&self) -> BuildResult<Vec<Coordinate>> {
        self.api_coordinates.iter().map(|c| Coordinate::parse(c)).collect()
    }

    pub fn libraries(&self) -> BuildResult<Vec<Coordinate>> {
        self.library_dependencies
            .iter()
            .map(|c| Coordinate::parse(c))
            .collect()
    }
}

/// Everything read out of a bundle archive.
#[derive(Debug, Clone)]
pub struct BundleContents {
    pub config: BundleConfig,
    pub mapping: MappingMetadata,
}

/// Read and validate a bundle zip. Blocking; call from `spawn_blocking`.
///
/// Nothing is returned unless the config and every mapping table parsed.
pub fn read_bundle(path: &Path, tag: &str, game_version: &str) -> BuildResult<BundleContents> {
    let malformed = |message: String| -> BuildError {
        ResolutionError::MalformedBundle {
            tag: tag.to_string(),
            message,
        }
        .into()
    };

    let file = std::fs::File::open(path).map_err(|e| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| malformed(format!("not a zip archive: {e}")))?;

    let config: BundleConfig = {
        let entry = archive
            .by_name(CONFIG_ENTRY)
            .map_err(|e| malformed(format!("missing {CONFIG_ENTRY}: {e}")))?;
        serde_json::from_reader(entry).map_err(|e| malformed(format!("invalid {CONFIG_ENTRY}: {e}")))?
    };

    if config.minecraft_version != game_version {
        return Err(malformed(format!(
            "bundle is for game version {}, tag names {}",
            config.minecraft_version, game_version
        )));
    }
    if config.api_coordinates.is_empty() {
        return Err(malformed("apiCoordinates is empty".to_string()));
    }
    config
        .api()
        .and_then(|_| config.libraries())
        .map_err(|e| malformed(e.to_string()))?;

    let compile_namespace = MappingNamespace::from_bundle_name(&config.compile_namespace)
        .ok_or_else(|| {
            malformed(format!(
                "unrecognised compile namespace '{}'",
                config.compile_namespace
            ))
        })?;

    let mut mapping = MappingMetadata::new(compile_namespace, config.remapped_packages.clone());
    for (namespace, file) in &config.mappings {
        let table = match file {
            Some(file) => {
                let mut text = String::new();
                archive
                    .by_name(file)
                    .map_err(|e| malformed(format!("mapping file {file} for {namespace}: {e}")))?
                    .read_to_string(&mut text)
                    .map_err(|e| malformed(format!("mapping file {file} is unreadable: {e}")))?;
                let table = MappingTable::parse_tiny_v2(file, &text)?;
                debug!(namespace = %namespace, classes = table.class_count(), "Loaded mapping table");
                Some(table)
            }
            None => None,
        };
        mapping.add_namespace(namespace, table);
    }
    let unmapped = mapping.unmapped();
    if !unmapped.is_empty() {
        warn!(
            "Dev bundle {} advertises namespaces without a mapping table: {}",
            tag,
            unmapped.join(", ")
        );
    }

    Ok(BundleContents { config, mapping })
}
