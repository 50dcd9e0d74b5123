use std::path::{Path, PathBuf};

use crate::core::error::{BuildError, BuildResult};

/// Every regular file under `root`, relative to it, sorted. A missing root
/// is empty. Blocking.
pub fn list_files(root: &Path) -> BuildResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.is_dir() {
        return Ok(out);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| BuildError::Io {
            path: dir.clone(),
            source: e,
        })?;
        for entry in entries {
            let path = entry
                .map_err(|e| BuildError::Io {
                    path: dir.clone(),
                    source: e,
                })?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    out.sort();
    Ok(out)
}

/// `a/b/C.class` on every platform.
pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/c")).unwrap();
        std::fs::write(dir.path().join("b/c/z.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let files = list_files(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| entry_name(p)).collect();
        assert_eq!(names, vec!["a.txt", "b/c/z.txt"]);
        assert!(list_files(&dir.path().join("missing")).unwrap().is_empty());
    }
}
