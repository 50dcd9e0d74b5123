//! Tiny v2 mapping tables.
//!
//! ```text
//! tiny	2	0	mojang	spigot
//! c	net/minecraft/server/level/ServerPlayer	net/minecraft/server/level/EntityPlayer
//! 	f	I	spawnInvulnerableTime	cm
//! 	m	(Lnet/minecraft/network/chat/Component;)V	sendSystemMessage	a
//! 		p	1		message
//! ```
//!
//! Only the first two namespace columns are read. Member descriptors are in
//! the first namespace. Parameter, local variable and comment lines are
//! skipped.

use std::collections::HashMap;

use crate::core::error::MappingError;

/// A member is identified by name and source-namespace descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMapping {
    pub target: String,
    pub fields: HashMap<MemberKey, String>,
    pub methods: HashMap<MemberKey, String>,
}

/// Class, field and method names from one namespace to another, keyed by
/// internal (`a/b/C`) source names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    pub source_namespace: String,
    pub target_namespace: String,
    classes: HashMap<String, ClassMapping>,
}

impl MappingTable {
    pub fn new(source_namespace: &str, target_namespace: &str) -> Self {
        Self {
            source_namespace: source_namespace.to_string(),
            target_namespace: target_namespace.to_string(),
            classes: HashMap::new(),
        }
    }

    pub fn insert_class(&mut self, source: &str, target: &str) -> &mut ClassMapping {
        let entry = self.classes.entry(source.to_string()).or_default();
        entry.target = target.to_string();
        entry
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn map_class(&self, internal_name: &str) -> Option<&str> {
        self.classes.get(internal_name).map(|c| c.target.as_str())
    }

    pub fn map_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        let class = self.classes.get(owner)?;
        let key = MemberKey::new(name, descriptor);
        if let Some(found) = class.fields.get(&key) {
            return Some(found);
        }
        // some tables omit field descriptors
        class
            .fields
            .iter()
            .find(|(k, _)| k.name == name && k.descriptor.is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn map_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.classes
            .get(owner)?
            .methods
            .get(&MemberKey::new(name, descriptor))
            .map(String::as_str)
    }

    /// Parse a Tiny v2 document. `file` only labels errors.
    pub fn parse_tiny_v2(file: &str, text: &str) -> Result<Self, MappingError> {
        let malformed = |line: usize, message: &str| MappingError::MalformedTable {
            file: file.to_string(),
            line,
            message: message.to_string(),
        };

        let mut lines = text.lines().enumerate();
        let (_, header) = lines.next().ok_or_else(|| malformed(1, "empty file"))?;
        let header: Vec<&str> = header.split('\t').collect();
        if header.len() < 5 || header[0] != "tiny" || header[1] != "2" {
            return Err(malformed(1, "expected a 'tiny 2 <minor> <from> <to>' header"));
        }

        let mut table = MappingTable::new(header[3], header[4]);
        let mut current: Option<String> = None;

        for (idx, raw) in lines {
            let line_no = idx + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let depth = raw.chars().take_while(|c| *c == '\t').count();
            let cols: Vec<&str> = raw[depth..].split('\t').collect();

            match (depth, cols[0]) {
                (0, "c") => {
                    if cols.len() < 2 || cols[1].is_empty() {
                        return Err(malformed(line_no, "class entry without a name"));
                    }
                    let source = cols[1];
                    let target = cols.get(2).filter(|t| !t.is_empty()).unwrap_or(&source);
                    table.insert_class(source, target);
                    current = Some(source.to_string());
                }
                (1, kind @ ("f" | "m")) => {
                    let Some(owner) = current.as_ref() else {
                        // header properties also sit at depth 1
                        continue;
                    };
                    if cols.len() < 3 {
                        return Err(malformed(line_no, "member entry needs a descriptor and a name"));
                    }
                    let descriptor = cols[1];
                    let source = cols[2];
                    let target = cols.get(3).filter(|t| !t.is_empty()).unwrap_or(&source);
                    let class = table
                        .classes
                        .get_mut(owner)
                        .ok_or_else(|| malformed(line_no, "member outside of a class"))?;
                    let members = if kind == "f" {
                        &mut class.fields
                    } else {
                        &mut class.methods
                    };
                    members.insert(MemberKey::new(source, descriptor), target.to_string());
                }
                (0, other) => {
                    return Err(malformed(line_no, &format!("unknown top-level entry '{other}'")));
                }
                _ => {}
            }
        }

        Ok(table)
    }
}
