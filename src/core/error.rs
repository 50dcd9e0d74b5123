use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::mapping::MappingNamespace;

/// HTTP statuses worth another attempt.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Central error type for the whole build pipeline.
/// Every module returns `Result<T, BuildError>`.
#[derive(Debug, Error)]
pub enum BuildError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("{algorithm} mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: &'static str,
        expected: String,
        actual: String,
    },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("POM parse error for {coordinate}: {message}")]
    PomParse { coordinate: String, message: String },

    // ── Pipeline taxonomy ───────────────────────────────
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Unresolvable version conflicts: {}", format_conflicts(.0))]
    VersionConflict(Vec<VersionConflict>),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    // ── Formats ─────────────────────────────────────────
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid class file {path}: {message}")]
    ClassFormat { path: String, message: String },

    // ── Configuration ───────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Build cancelled")]
    Cancelled,

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type BuildResult<T> = Result<T, BuildError>;

impl From<std::io::Error> for BuildError {
    fn from(source: std::io::Error) -> Self {
        BuildError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl BuildError {
    /// Whether a retry with backoff can reasonably succeed.
    ///
    /// Only network-level failures qualify. A missing coordinate or bundle tag
    /// is a definitive answer from the registry and is never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            BuildError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BuildError::DownloadFailed { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
            BuildError::Resolution(ResolutionError::RegistriesUnreachable { .. }) => true,
            _ => false,
        }
    }
}

// ── Resolution ──────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Could not resolve {coordinate}: not found in any registry (searched: {})", .searched.join(", "))]
    CoordinateNotFound {
        coordinate: String,
        searched: Vec<String>,
    },

    #[error("No dev bundle is published for tag '{tag}' (checked: {})", .searched.join(", "))]
    BundleNotFound { tag: String, searched: Vec<String> },

    #[error("Invalid dev bundle tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("Dev bundle '{tag}' is malformed: {message}")]
    MalformedBundle { tag: String, message: String },

    #[error("Could not resolve {coordinate}: every registry was unreachable ({})", .failures.join("; "))]
    RegistriesUnreachable {
        coordinate: String,
        failures: Vec<String>,
    },
}

/// Two or more requested versions of one module that cannot be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    pub module: String,
    pub versions: Vec<String>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requested as {}", self.module, self.versions.join(" vs "))
    }
}

fn format_conflicts(conflicts: &[VersionConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Toolchain ───────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Unsupported toolchain version {major}: Java 8 or newer is required")]
    InvalidSpec { major: u32 },

    #[error("No Java {major} runtime found or provisionable (install path {install_path:?}): {reason}")]
    Unavailable {
        major: u32,
        install_path: PathBuf,
        reason: String,
    },

    #[error("Java {major} at {java_home:?} has no javac; a JDK is required to compile")]
    MissingCompiler { major: u32, java_home: PathBuf },
}

// ── Mapping ─────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Unknown mapping namespace '{0}' (expected MOJANG_PRODUCTION, OBFUSCATED, SPIGOT or MCP)")]
    UnknownNamespace(String),

    #[error("Mapping namespace {namespace} is not published by the dev bundle (supported: {})", .supported.join(", "))]
    UnsupportedNamespace {
        namespace: MappingNamespace,
        supported: Vec<String>,
    },

    #[error("Symbol {symbol} referenced by {class_file} is absent from the {namespace} mapping table")]
    MissingSymbol {
        symbol: String,
        class_file: String,
        namespace: MappingNamespace,
    },

    #[error("Malformed mapping table {file} at line {line}: {message}")]
    MalformedTable {
        file: String,
        line: usize,
        message: String,
    },
}

// ── Compilation ─────────────────────────────────────────

/// Compiler diagnostics for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDiagnostics {
    pub source: PathBuf,
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
#[error("Compilation failed in {} source unit(s): {}", .units.len(), summarize_units(.units))]
pub struct CompilationError {
    pub units: Vec<UnitDiagnostics>,
}

fn summarize_units(units: &[UnitDiagnostics]) -> String {
    units
        .iter()
        .map(|u| format!("{} ({} error(s))", u.source.display(), u.messages.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_coordinate_message_names_it() {
        let err: BuildError = ResolutionError::CoordinateNotFound {
            coordinate: "com.example:missing:1.0".into(),
            searched: vec!["central".into(), "papermc".into()],
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("com.example:missing:1.0"));
        assert!(text.contains("central, papermc"));
    }

    #[test]
    fn bundle_not_found_is_not_transient() {
        let err: BuildError = ResolutionError::BundleNotFound {
            tag: "1.21.4-R0.2-SNAPSHOT".into(),
            searched: vec![],
        }
        .into();
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = BuildError::DownloadFailed {
            url: "https://repo.example/x.jar".into(),
            status: 503,
        };
        assert!(err.is_transient());
        let err = BuildError::DownloadFailed {
            url: "https://repo.example/x.jar".into(),
            status: 404,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn version_conflicts_are_listed() {
        let err = BuildError::VersionConflict(vec![VersionConflict {
            module: "com.google.guava:guava".into(),
            versions: vec!["33.0-android".into(), "33.0-jre".into()],
        }]);
        assert_eq!(
            err.to_string(),
            "Unresolvable version conflicts: com.google.guava:guava requested as 33.0-android vs 33.0-jre"
        );
    }
}
