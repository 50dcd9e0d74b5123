//! Superclass, interface and member declarations of the classes a remap can
//! see: Minecraft classes from the classpath jars and the project's own
//! compiled classes.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::classfile::ClassFile;
use crate::core::error::{BuildError, BuildResult};
use crate::core::fsutil::{entry_name, list_files};
use crate::core::mapping::MemberKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNode {
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: HashSet<MemberKey>,
    pub methods: HashSet<MemberKey>,
}

impl ClassNode {
    pub fn new(super_name: Option<&str>, interfaces: &[&str]) -> Self {
        Self {
            super_name: super_name.map(str::to_string),
            interfaces: interfaces.iter().map(|i| i.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.insert(MemberKey::new(name, descriptor));
        self
    }

    pub fn with_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.insert(MemberKey::new(name, descriptor));
        self
    }

    /// Internal name and node of a parsed class.
    pub fn from_class(class: &ClassFile, label: &str) -> BuildResult<(String, Self)> {
        let (this, super_class, interfaces) = class.hierarchy(label)?;
        let missing = |index: u16| BuildError::ClassFormat {
            path: label.to_string(),
            message: format!("#{index} is not a class entry"),
        };

        let name = class.class_name(this).ok_or_else(|| missing(this))?;
        let super_name = match super_class {
            0 => None,
            idx => Some(class.class_name(idx).ok_or_else(|| missing(idx))?.to_string()),
        };
        let interfaces = interfaces
            .into_iter()
            .map(|idx| class.class_name(idx).map(str::to_string).ok_or_else(|| missing(idx)))
            .collect::<BuildResult<Vec<_>>>()?;

        let mut node = Self {
            super_name,
            interfaces,
            ..Self::default()
        };
        for member in class.members(label)? {
            let key = MemberKey::new(&member.name, &member.descriptor);
            if member.is_method {
                node.methods.insert(key);
            } else {
                node.fields.insert(key);
            }
        }
        Ok((name.to_string(), node))
    }

    /// Superclass first, then interfaces in declaration order.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }

    pub fn declares(&self, name: &str, descriptor: &str, is_field: bool) -> bool {
        let key = MemberKey::new(name, descriptor);
        if is_field {
            self.fields.contains(&key)
        } else {
            self.methods.contains(&key)
        }
    }
}

/// Class nodes by internal name.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassNode>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, node: ClassNode) {
        self.classes.insert(name.to_string(), node);
    }

    pub fn get(&self, name: &str) -> Option<&ClassNode> {
        self.classes.get(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Add one class. Returns its internal name.
    pub fn add_class(&mut self, bytes: &[u8], label: &str) -> BuildResult<String> {
        let class = ClassFile::parse(bytes, label)?;
        let (name, node) = ClassNode::from_class(&class, label)?;
        self.classes.insert(name.clone(), node);
        Ok(name)
    }

    /// Index every `.class` under `dir`. Blocking.
    pub fn index_directory(&mut self, dir: &Path) -> BuildResult<usize> {
        let mut added = 0;
        for relative in list_files(dir)? {
            if !relative.extension().is_some_and(|ext| ext == "class") {
                continue;
            }
            let path = dir.join(&relative);
            let bytes = std::fs::read(&path).map_err(|e| BuildError::Io {
                path: path.clone(),
                source: e,
            })?;
            self.add_class(&bytes, &entry_name(&relative))?;
            added += 1;
        }
        Ok(added)
    }

    /// Index the classes in `jars` whose internal name passes `keep`.
    /// Blocking. A jar that cannot be opened is skipped with a warning; its
    /// classes simply stay unknown.
    pub fn index_jars(&mut self, jars: &[PathBuf], keep: impl Fn(&str) -> bool) -> usize {
        let mut added = 0;
        for jar in jars {
            match self.index_jar(jar, &keep) {
                Ok(count) => {
                    if count > 0 {
                        debug!(jar = %jar.display(), classes = count, "Indexed class hierarchy");
                    }
                    added += count;
                }
                Err(e) => warn!("Skipping {} for the class hierarchy: {}", jar.display(), e),
            }
        }
        added
    }

    fn index_jar(&mut self, jar: &Path, keep: &impl Fn(&str) -> bool) -> BuildResult<usize> {
        let file = std::fs::File::open(jar).map_err(|e| BuildError::Io {
            path: jar.to_path_buf(),
            source: e,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| BuildError::ClassFormat {
            path: jar.display().to_string(),
            message: format!("not a zip archive: {e}"),
        })?;

        let mut added = 0;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| BuildError::ClassFormat {
                path: jar.display().to_string(),
                message: e.to_string(),
            })?;
            let Some(name) = entry.name().strip_suffix(".class") else {
                continue;
            };
            // skip multi-release variants
            if name.starts_with("META-INF/") || !keep(name) {
                continue;
            }
            let label = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes).map_err(|e| BuildError::Io {
                path: jar.to_path_buf(),
                source: e,
            })?;
            self.add_class(&bytes, &label)?;
            added += 1;
        }
        Ok(added)
    }
}
