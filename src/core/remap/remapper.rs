use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use super::classfile::{patch_u2, BodyRef, ClassFile, CpEntry};
use super::hierarchy::{ClassHierarchy, ClassNode};
use super::signature::remap_signature;
use crate::core::error::{BuildError, BuildResult, MappingError};
use crate::core::fsutil::{entry_name, list_files};
use crate::core::mapping::{MappingMetadata, MappingNamespace, MappingTable};

const MAX_POOL_ENTRIES: usize = u16::MAX as usize;

/// One class after remapping.
#[derive(Debug, Clone)]
pub struct RemappedClass {
    /// Internal name after mapping, `None` when the bytes were passed through.
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapSummary {
    pub classes: usize,
    pub resources: usize,
}

/// Rewrites compiled classes from the compile namespace into a target
/// namespace.
///
/// Class references under a remapped package must be present in the table.
/// Member references are looked up on the owner and then up its superclass
/// and interface chain. A member that no class in the chain maps is a
/// `MissingSymbol`, unless the chain leaves the remapped packages, in which
/// case the member is inherited from outside and keeps its name.
#[derive(Debug, Clone)]
pub struct ClassRemapper {
    table: Option<Arc<MappingTable>>,
    metadata: Arc<MappingMetadata>,
    namespace: MappingNamespace,
    hierarchy: Arc<ClassHierarchy>,
}

impl ClassRemapper {
    pub fn new(metadata: Arc<MappingMetadata>, namespace: MappingNamespace) -> Result<Self, MappingError> {
        let table = metadata.table_for(namespace)?;
        Ok(Self {
            table,
            metadata,
            namespace,
            hierarchy: Arc::new(ClassHierarchy::new()),
        })
    }

    /// Ancestry of classes the remapped code refers to.
    pub fn with_hierarchy(mut self, hierarchy: ClassHierarchy) -> Self {
        self.hierarchy = Arc::new(hierarchy);
        self
    }

    pub fn namespace(&self) -> MappingNamespace {
        self.namespace
    }

    /// Whether this remapper leaves classes untouched.
    pub fn is_identity(&self) -> bool {
        self.table.is_none()
    }

    pub fn remap_class(&self, bytes: &[u8], label: &str) -> BuildResult<RemappedClass> {
        let Some(table) = self.table.as_deref() else {
            return Ok(RemappedClass {
                name: None,
                bytes: bytes.to_vec(),
            });
        };

        let original = ClassFile::parse(bytes, label)?;
        let (this_name, this_node) = ClassNode::from_class(&original, label)?;
        let mut job = RemapJob {
            table,
            metadata: &self.metadata,
            namespace: self.namespace,
            hierarchy: &self.hierarchy,
            this: (this_name.as_str(), &this_node),
            label,
            names: HashMap::new(),
            pool: PoolBuilder::new(&original.pool, label),
        };

        job.rewrite_pool(&original)?;
        let body = job.rewrite_body(&original, &this_node)?;
        let name = job.map_class(&this_name)?;

        let out = ClassFile {
            minor: original.minor,
            major: original.major,
            pool: job.pool.entries,
            body,
        };
        Ok(RemappedClass {
            name: Some(name),
            bytes: out.to_bytes().map_err(|e| relabel(e, label))?,
        })
    }

    /// Remap every class under `input` into `output`, copying other files.
    /// The classes under `input` join the hierarchy first, so references
    /// through project subclasses resolve.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn remap_directory(
        self: Arc<Self>,
        input: &Path,
        output: &Path,
        concurrency: usize,
    ) -> BuildResult<RemapSummary> {
        let root = input.to_path_buf();
        let identity = self.is_identity();
        let base = Arc::clone(&self.hierarchy);
        let (files, hierarchy) = tokio::task::spawn_blocking(move || -> BuildResult<_> {
            let files = list_files(&root)?;
            if identity {
                return Ok((files, None));
            }
            let mut hierarchy = ClassHierarchy::clone(&base);
            let added = hierarchy.index_directory(&root)?;
            debug!(classes = added, "Indexed project classes");
            Ok((files, Some(hierarchy)))
        })
        .await
        .map_err(|e| BuildError::Other(format!("file listing task failed: {e}")))??;

        let shared = match hierarchy {
            Some(hierarchy) => Arc::new(ClassRemapper::clone(&self).with_hierarchy(hierarchy)),
            None => self,
        };

        tokio::fs::create_dir_all(output).await.map_err(|e| BuildError::Io {
            path: output.to_path_buf(),
            source: e,
        })?;

        let outcomes: Vec<bool> = stream::iter(files.into_iter().map(|relative| {
            let remapper = Arc::clone(&shared);
            let source = input.join(&relative);
            let output = output.to_path_buf();
            async move {
                tokio::task::spawn_blocking(move || {
                    remapper.remap_file(&source, &relative, &output)
                })
                .await
                .map_err(|e| BuildError::Other(format!("remap task failed: {e}")))?
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

        let classes = outcomes.iter().filter(|is_class| **is_class).count();
        let summary = RemapSummary {
            classes,
            resources: outcomes.len() - classes,
        };
        info!(classes = summary.classes, resources = summary.resources, "Remapped output");
        Ok(summary)
    }

    /// Returns whether the file was a class.
    fn remap_file(&self, source: &Path, relative: &Path, output: &Path) -> BuildResult<bool> {
        let bytes = std::fs::read(source).map_err(|e| BuildError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let is_class = relative.extension().is_some_and(|ext| ext == "class");

        let (dest, contents) = if is_class {
            let label = entry_name(relative);
            let remapped = self.remap_class(&bytes, &label)?;
            let dest = match remapped.name {
                Some(name) => output.join(format!("{name}.class")),
                None => output.join(relative),
            };
            (dest, remapped.bytes)
        } else {
            (output.join(relative), bytes)
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&dest, contents).map_err(|e| BuildError::Io {
            path: dest.clone(),
            source: e,
        })?;
        Ok(is_class)
    }
}

// ── Pool ────────────────────────────────────────────────

/// Append-only view of the constant pool. Existing entries are repointed,
/// never edited, so shared UTF-8 constants keep their meaning elsewhere.
struct PoolBuilder<'a> {
    entries: Vec<CpEntry>,
    utf8: HashMap<Vec<u8>, u16>,
    nat: HashMap<(u16, u16), u16>,
    label: &'a str,
}

impl<'a> PoolBuilder<'a> {
    fn new(pool: &[CpEntry], label: &'a str) -> Self {
        let mut utf8 = HashMap::new();
        let mut nat = HashMap::new();
        for (idx, entry) in pool.iter().enumerate() {
            let idx = idx as u16;
            match entry {
                CpEntry::Utf8(bytes) => {
                    utf8.entry(bytes.clone()).or_insert(idx);
                }
                CpEntry::NameAndType { name, descriptor } => {
                    nat.entry((*name, *descriptor)).or_insert(idx);
                }
                _ => {}
            }
        }
        Self {
            entries: pool.to_vec(),
            utf8,
            nat,
            label,
        }
    }

    fn push(&mut self, entry: CpEntry) -> BuildResult<u16> {
        if self.entries.len() >= MAX_POOL_ENTRIES {
            return Err(class_format(self.label, "constant pool overflow while remapping"));
        }
        self.entries.push(entry);
        Ok((self.entries.len() - 1) as u16)
    }

    fn utf8(&mut self, value: &str) -> BuildResult<u16> {
        if let Some(idx) = self.utf8.get(value.as_bytes()) {
            return Ok(*idx);
        }
        if value.len() > u16::MAX as usize {
            return Err(class_format(
                self.label,
                &format!("remapped constant of {} bytes exceeds 65535", value.len()),
            ));
        }
        let idx = self.push(CpEntry::Utf8(value.as_bytes().to_vec()))?;
        self.utf8.insert(value.as_bytes().to_vec(), idx);
        Ok(idx)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> BuildResult<u16> {
        let key = (self.utf8(name)?, self.utf8(descriptor)?);
        if let Some(idx) = self.nat.get(&key) {
            return Ok(*idx);
        }
        let idx = self.push(CpEntry::NameAndType {
            name: key.0,
            descriptor: key.1,
        })?;
        self.nat.insert(key, idx);
        Ok(idx)
    }
}

// ── Rewriting ───────────────────────────────────────────

/// How a member reference resolved against the owner's ancestry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MemberLookup {
    Mapped(String),
    /// Declared or inherited outside the remapped packages.
    Foreign,
    Missing,
}

struct RemapJob<'a> {
    table: &'a MappingTable,
    metadata: &'a MappingMetadata,
    namespace: MappingNamespace,
    hierarchy: &'a ClassHierarchy,
    /// The class being remapped, which the hierarchy may not hold yet.
    this: (&'a str, &'a ClassNode),
    label: &'a str,
    names: HashMap<String, String>,
    pool: PoolBuilder<'a>,
}

impl<'a> RemapJob<'a> {
    fn map_class(&mut self, name: &str) -> BuildResult<String> {
        if let Some(mapped) = self.names.get(name) {
            return Ok(mapped.clone());
        }
        let mapped = match self.table.map_class(name) {
            Some(target) => target.to_string(),
            None if self.metadata.is_remapped(name) => {
                return Err(MappingError::MissingSymbol {
                    symbol: name.to_string(),
                    class_file: self.label.to_string(),
                    namespace: self.namespace,
                }
                .into());
            }
            None => name.to_string(),
        };
        self.names.insert(name.to_string(), mapped.clone());
        Ok(mapped)
    }

    fn node(&self, name: &str) -> Option<&'a ClassNode> {
        if name == self.this.0 {
            return Some(self.this.1);
        }
        self.hierarchy.get(name)
    }

    /// Breadth-first walk from `start` through superclasses and interfaces.
    ///
    /// The first table entry wins. A remapped class that declares the member
    /// without an entry makes it missing. Otherwise the member is foreign
    /// when the walk reaches a non-remapped class that declares it or whose
    /// ancestry is unknown, such as a JDK class.
    fn lookup_member(&self, start: &[&str], name: &str, desc: &str, is_field: bool) -> MemberLookup {
        let mut queue: VecDeque<&str> = start.iter().copied().collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut declared_remapped = false;
        let mut foreign = false;

        while let Some(class) = queue.pop_front() {
            if !seen.insert(class) {
                continue;
            }
            let mapped = if is_field {
                self.table.map_field(class, name, desc)
            } else {
                self.table.map_method(class, name, desc)
            };
            if let Some(mapped) = mapped {
                return MemberLookup::Mapped(mapped.to_string());
            }

            let remapped = self.metadata.is_remapped(class);
            let Some(node) = self.node(class) else {
                foreign |= !remapped;
                continue;
            };
            if node.declares(name, desc, is_field) {
                if remapped {
                    declared_remapped = true;
                } else if is_field {
                    // fields are not overridden; the nearest declaration wins
                    return MemberLookup::Foreign;
                } else {
                    foreign = true;
                }
            }
            queue.extend(node.parents());
        }

        if declared_remapped || !foreign {
            MemberLookup::Missing
        } else {
            MemberLookup::Foreign
        }
    }

    fn map_descriptor(&mut self, descriptor: &str) -> BuildResult<String> {
        let label = self.label;
        remap_signature(descriptor, label, &mut |name: &str| self.map_class(name))
    }

    fn utf8<'c>(&self, class: &'c ClassFile, index: u16) -> BuildResult<&'c str> {
        class
            .utf8(index)
            .ok_or_else(|| class_format(self.label, &format!("#{index} is not a UTF-8 constant")))
    }

    fn nat<'c>(&self, class: &'c ClassFile, index: u16) -> BuildResult<(&'c str, &'c str)> {
        let (name, descriptor) = class
            .name_and_type(index)
            .ok_or_else(|| class_format(self.label, &format!("#{index} is not a name-and-type")))?;
        Ok((self.utf8(class, name)?, self.utf8(class, descriptor)?))
    }

    fn rewrite_pool(&mut self, original: &ClassFile) -> BuildResult<()> {
        for (idx, entry) in original.pool.iter().enumerate() {
            let replacement = match *entry {
                CpEntry::Class(name_idx) => {
                    let name = self.utf8(original, name_idx)?;
                    let mapped = if name.starts_with('[') {
                        self.map_descriptor(name)?
                    } else {
                        self.map_class(name)?
                    };
                    (mapped != name)
                        .then(|| self.pool.utf8(&mapped).map(CpEntry::Class))
                        .transpose()?
                }
                CpEntry::MethodType(desc_idx) => {
                    let desc = self.utf8(original, desc_idx)?;
                    let mapped = self.map_descriptor(desc)?;
                    (mapped != desc)
                        .then(|| self.pool.utf8(&mapped).map(CpEntry::MethodType))
                        .transpose()?
                }
                CpEntry::Dynamic { bootstrap, nat } | CpEntry::InvokeDynamic { bootstrap, nat } => {
                    let (name, desc) = self.nat(original, nat)?;
                    let mapped = self.map_descriptor(desc)?;
                    if mapped == desc {
                        None
                    } else {
                        let nat = self.pool.name_and_type(name, &mapped)?;
                        Some(match entry {
                            CpEntry::Dynamic { .. } => CpEntry::Dynamic { bootstrap, nat },
                            _ => CpEntry::InvokeDynamic { bootstrap, nat },
                        })
                    }
                }
                CpEntry::FieldRef { class, nat }
                | CpEntry::MethodRef { class, nat }
                | CpEntry::InterfaceMethodRef { class, nat } => {
                    let is_field = matches!(entry, CpEntry::FieldRef { .. });
                    self.rewrite_member_ref(original, class, nat, is_field)?
                        .map(|nat| match entry {
                            CpEntry::FieldRef { .. } => CpEntry::FieldRef { class, nat },
                            CpEntry::MethodRef { .. } => CpEntry::MethodRef { class, nat },
                            _ => CpEntry::InterfaceMethodRef { class, nat },
                        })
                }
                _ => None,
            };
            if let Some(replacement) = replacement {
                self.pool.entries[idx] = replacement;
            }
        }
        Ok(())
    }

    /// New name-and-type index for a member reference, if anything changed.
    fn rewrite_member_ref(
        &mut self,
        original: &ClassFile,
        class: u16,
        nat: u16,
        is_field: bool,
    ) -> BuildResult<Option<u16>> {
        let owner = original
            .class_name(class)
            .ok_or_else(|| class_format(self.label, &format!("#{class} is not a class entry")))?;
        let (name, desc) = self.nat(original, nat)?;

        let mapped_name = if owner.starts_with('[') || name.starts_with('<') {
            name.to_string()
        } else {
            match self.lookup_member(&[owner], name, desc, is_field) {
                MemberLookup::Mapped(mapped) => mapped,
                MemberLookup::Foreign => name.to_string(),
                MemberLookup::Missing => {
                    return Err(MappingError::MissingSymbol {
                        symbol: format!("{owner}.{name} {desc}"),
                        class_file: self.label.to_string(),
                        namespace: self.namespace,
                    }
                    .into());
                }
            }
        };
        let mapped_desc = self.map_descriptor(desc)?;

        if mapped_name == name && mapped_desc == desc {
            return Ok(None);
        }
        self.pool.name_and_type(&mapped_name, &mapped_desc).map(Some)
    }

    fn rewrite_body(&mut self, original: &ClassFile, this: &ClassNode) -> BuildResult<Vec<u8>> {
        let mut body = original.body.clone();
        let parents: Vec<&str> = this.parents().collect();

        for body_ref in original.body_refs(self.label)? {
            let (offset, replacement) = match body_ref {
                BodyRef::MemberDescriptor { offset, index }
                | BodyRef::LocalDescriptor { offset, index }
                | BodyRef::Signature { offset, index } => {
                    let value = self.utf8(original, index)?;
                    let mapped = self.map_descriptor(value)?;
                    if mapped == value {
                        continue;
                    }
                    (offset, self.pool.utf8(&mapped)?)
                }
                BodyRef::MethodName {
                    offset,
                    index,
                    descriptor,
                } => {
                    let name = self.utf8(original, index)?;
                    let desc = self.utf8(original, descriptor)?;
                    if name.starts_with('<') {
                        continue;
                    }
                    // an override takes the name of what it overrides
                    match self.lookup_member(&parents, name, desc, false) {
                        MemberLookup::Mapped(mapped) if mapped != name => {
                            (offset, self.pool.utf8(&mapped)?)
                        }
                        _ => continue,
                    }
                }
                BodyRef::EnclosingMethod { offset, index } => {
                    let (name, desc) = self.nat(original, index)?;
                    let mapped = self.map_descriptor(desc)?;
                    if mapped == desc {
                        continue;
                    }
                    (offset, self.pool.name_and_type(name, &mapped)?)
                }
            };
            patch_u2(&mut body, offset, replacement);
        }
        Ok(body)
    }
}

fn class_format(label: &str, message: &str) -> BuildError {
    BuildError::ClassFormat {
        path: label.to_string(),
        message: message.to_string(),
    }
}

fn relabel(err: BuildError, label: &str) -> BuildError {
    match err {
        BuildError::ClassFormat { message, .. } => class_format(label, &message),
        other => other,
    }
}
