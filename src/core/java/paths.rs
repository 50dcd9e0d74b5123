use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

pub fn javac_exe() -> &'static str {
    if cfg!(windows) {
        "javac.exe"
    } else {
        "javac"
    }
}

/// Directories that conventionally hold one JDK per subdirectory.
pub fn platform_jvm_dirs() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        vec![
            PathBuf::from(r"C:\Program Files\Java"),
            PathBuf::from(r"C:\Program Files\Eclipse Adoptium"),
        ]
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Library/Java/JavaVirtualMachines")]
    } else {
        vec![PathBuf::from("/usr/lib/jvm"), PathBuf::from("/opt/java")]
    }
}

/// `bin/java` inside a JDK root, also handling the macOS bundle layout.
pub fn locate_java_binary(runtime_root: &Path) -> PathBuf {
    let primary = runtime_root.join("bin").join(java_exe());
    if primary.exists() {
        return primary;
    }

    let mac_layout = runtime_root
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_exe());
    if mac_layout.exists() {
        return mac_layout;
    }

    find_java_binary_recursive(runtime_root).unwrap_or(primary)
}

fn find_java_binary_recursive(root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let file_type = entry.file_type().ok()?;

        if file_type.is_file() {
            let in_bin = path
                .parent()
                .and_then(|p| p.file_name())
                .is_some_and(|n| n == "bin");
            if in_bin && path.file_name().and_then(|n| n.to_str()) == Some(java_exe()) {
                return Some(path);
            }
        } else if file_type.is_dir() {
            if let Some(found) = find_java_binary_recursive(&path) {
                return Some(found);
            }
        }
    }
    None
}

/// `javac` next to a `java` binary, if the installation is a JDK.
pub fn javac_beside(java_bin: &Path) -> Option<PathBuf> {
    let javac = java_bin.parent()?.join(javac_exe());
    javac.is_file().then_some(javac)
}

/// Installation root for a `.../bin/java` binary.
pub fn java_home_of(java_bin: &Path) -> PathBuf {
    java_bin
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| java_bin.to_path_buf())
}

/// System `java` binaries in scan order: `JAVA_HOME`, every `PATH` entry,
/// then the platform JVM directories. Duplicates are dropped.
pub fn system_java_candidates() -> Vec<PathBuf> {
    let mut ordered = Vec::new();

    if let Some(home) = std::env::var_os("JAVA_HOME") {
        ordered.push(PathBuf::from(home).join("bin").join(java_exe()));
    }

    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            ordered.push(dir.join(java_exe()));
        }
    }

    for dir in platform_jvm_dirs() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut roots: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        roots.sort();
        ordered.extend(roots.iter().map(|root| locate_java_binary(root)));
    }

    dedupe_existing(ordered)
}

fn dedupe_existing(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| p.is_file())
        .filter(|p| {
            let key = std::fs::canonicalize(p).unwrap_or_else(|_| p.clone());
            seen.insert(key)
        })
        .collect()
}
