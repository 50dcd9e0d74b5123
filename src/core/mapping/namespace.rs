use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::MappingError;

/// Symbol namespaces a packaged plugin can be remapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingNamespace {
    /// Mojang's published names. The platform loads these directly.
    MojangProduction,
    /// The names the game actually ships with.
    Obfuscated,
    Spigot,
    Mcp,
}

impl MappingNamespace {
    pub const ALL: [MappingNamespace; 4] = [
        MappingNamespace::MojangProduction,
        MappingNamespace::Obfuscated,
        MappingNamespace::Spigot,
        MappingNamespace::Mcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingNamespace::MojangProduction => "MOJANG_PRODUCTION",
            MappingNamespace::Obfuscated => "OBFUSCATED",
            MappingNamespace::Spigot => "SPIGOT",
            MappingNamespace::Mcp => "MCP",
        }
    }

    /// Value of the `paperweight-mappings-namespace` jar manifest attribute.
    pub fn manifest_value(&self) -> &'static str {
        match self {
            MappingNamespace::MojangProduction => "mojang",
            MappingNamespace::Obfuscated => "obf",
            MappingNamespace::Spigot => "spigot",
            MappingNamespace::Mcp => "mcp",
        }
    }

    /// Map a namespace name as written by bundle tooling onto the closed set.
    ///
    /// Bundles use both the constant spelling and the tool names
    /// (`mojang`, `obf`, `spigot`, `srg`). Anything else is `None`.
    pub fn from_bundle_name(name: &str) -> Option<Self> {
        if let Ok(ns) = name.parse() {
            return Some(ns);
        }
        match name.trim().to_ascii_lowercase().as_str() {
            "mojang" | "mojang+yarn" | "mojmap" | "named" => Some(MappingNamespace::MojangProduction),
            "obf" | "official" | "notch" => Some(MappingNamespace::Obfuscated),
            "spigot" | "bukkit" => Some(MappingNamespace::Spigot),
            "mcp" | "srg" | "searge" => Some(MappingNamespace::Mcp),
            _ => None,
        }
    }
}

impl fmt::Display for MappingNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingNamespace {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MappingError::UnknownNamespace(wanted.to_string()))
    }
}
