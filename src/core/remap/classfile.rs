//! Just enough of the JVM class-file format to rewrite symbol references:
//! the constant pool is decoded, the rest of the file is walked to find the
//! constant-pool indices that name descriptors and signatures.

use crate::core::error::{BuildError, BuildResult};

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpEntry {
    /// Index 0, and the slot after a Long or Double.
    Unusable,
    Utf8(Vec<u8>),
    Integer([u8; 4]),
    Float([u8; 4]),
    Long([u8; 8]),
    Double([u8; 8]),
    Class(u16),
    String(u16),
    FieldRef { class: u16, nat: u16 },
    MethodRef { class: u16, nat: u16 },
    InterfaceMethodRef { class: u16, nat: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, nat: u16 },
    InvokeDynamic { bootstrap: u16, nat: u16 },
    Module(u16),
    Package(u16),
}

/// Where a u2 constant-pool index sits in the class body, and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRef {
    /// Descriptor of a declared field or method.
    MemberDescriptor { offset: usize, index: u16 },
    /// Name of a declared method, with its descriptor index.
    MethodName {
        offset: usize,
        index: u16,
        descriptor: u16,
    },
    /// `Signature` attribute, `LocalVariableTypeTable` entry.
    Signature { offset: usize, index: u16 },
    /// `LocalVariableTable` entry descriptor.
    LocalDescriptor { offset: usize, index: u16 },
    /// `EnclosingMethod` name-and-type.
    EnclosingMethod { offset: usize, index: u16 },
}

/// A field or method declared by a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredMember {
    pub is_method: bool,
    pub name: String,
    pub descriptor: String,
}

/// A parsed class file: decoded pool plus the raw body after it.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor: u16,
    pub major: u16,
    pub pool: Vec<CpEntry>,
    pub body: Vec<u8>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    label: &'a str,
}

impl<'a> Reader<'a> {
    fn error(&self, message: &str) -> BuildError {
        BuildError::ClassFormat {
            path: self.label.to_string(),
            message: format!("{message} at byte {}", self.pos),
        }
    }

    fn take(&mut self, len: usize) -> BuildResult<&'a [u8]> {
        let bytes = self.bytes;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| self.error("truncated class file"))?;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u1(&mut self) -> BuildResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> BuildResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> BuildResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn array<const N: usize>(&mut self) -> BuildResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

impl ClassFile {
    pub fn parse(bytes: &[u8], label: &str) -> BuildResult<Self> {
        let mut r = Reader {
            bytes,
            pos: 0,
            label,
        };
        if r.u4()? != MAGIC {
            return Err(r.error("bad magic number"));
        }
        let minor = r.u2()?;
        let major = r.u2()?;
        let count = r.u2()? as usize;
        if count == 0 {
            return Err(r.error("empty constant pool"));
        }

        let mut pool = Vec::with_capacity(count);
        pool.push(CpEntry::Unusable);
        while pool.len() < count {
            let tag = r.u1()?;
            let entry = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    CpEntry::Utf8(r.take(len)?.to_vec())
                }
                3 => CpEntry::Integer(r.array()?),
                4 => CpEntry::Float(r.array()?),
                5 => CpEntry::Long(r.array()?),
                6 => CpEntry::Double(r.array()?),
                7 => CpEntry::Class(r.u2()?),
                8 => CpEntry::String(r.u2()?),
                9 => CpEntry::FieldRef {
                    class: r.u2()?,
                    nat: r.u2()?,
                },
                10 => CpEntry::MethodRef {
                    class: r.u2()?,
                    nat: r.u2()?,
                },
                11 => CpEntry::InterfaceMethodRef {
                    class: r.u2()?,
                    nat: r.u2()?,
                },
                12 => CpEntry::NameAndType {
                    name: r.u2()?,
                    descriptor: r.u2()?,
                },
                15 => CpEntry::MethodHandle {
                    kind: r.u1()?,
                    reference: r.u2()?,
                },
                16 => CpEntry::MethodType(r.u2()?),
                17 => CpEntry::Dynamic {
                    bootstrap: r.u2()?,
                    nat: r.u2()?,
                },
                18 => CpEntry::InvokeDynamic {
                    bootstrap: r.u2()?,
                    nat: r.u2()?,
                },
                19 => CpEntry::Module(r.u2()?),
                20 => CpEntry::Package(r.u2()?),
                other => return Err(r.error(&format!("unknown constant pool tag {other}"))),
            };
            let wide = matches!(entry, CpEntry::Long(_) | CpEntry::Double(_));
            pool.push(entry);
            if wide {
                pool.push(CpEntry::Unusable);
            }
        }
        if pool.len() != count {
            return Err(r.error("wide constant overflows the pool"));
        }

        Ok(Self {
            minor,
            major,
            pool,
            body: bytes[r.pos..].to_vec(),
        })
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.pool.get(index as usize)? {
            CpEntry::Utf8(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.pool.get(index as usize)? {
            CpEntry::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    pub fn name_and_type(&self, index: u16) -> Option<(u16, u16)> {
        match self.pool.get(index as usize)? {
            CpEntry::NameAndType { name, descriptor } => Some((*name, *descriptor)),
            _ => None,
        }
    }

    /// `this_class`, `super_class` and the interface indices.
    pub fn hierarchy(&self, label: &str) -> BuildResult<(u16, u16, Vec<u16>)> {
        let mut r = Reader {
            bytes: &self.body,
            pos: 2,
            label,
        };
        let this_class = r.u2()?;
        let super_class = r.u2()?;
        let count = r.u2()?;
        let mut interfaces = Vec::with_capacity(count as usize);
        for _ in 0..count {
            interfaces.push(r.u2()?);
        }
        Ok((this_class, super_class, interfaces))
    }

    /// Fields, then methods, in declaration order.
    pub fn members(&self, label: &str) -> BuildResult<Vec<DeclaredMember>> {
        let mut r = Reader {
            bytes: &self.body,
            pos: 6,
            label,
        };
        let interfaces = r.u2()? as usize;
        r.take(interfaces * 2)?;

        let mut members = Vec::new();
        for is_method in [false, true] {
            let count = r.u2()?;
            for _ in 0..count {
                r.take(2)?; // access
                let (name, descriptor) = (r.u2()?, r.u2()?);
                let (Some(name), Some(descriptor)) = (self.utf8(name), self.utf8(descriptor)) else {
                    return Err(r.error("member name or descriptor is not a UTF-8 constant"));
                };
                members.push(DeclaredMember {
                    is_method,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                });
                let attributes = r.u2()?;
                for _ in 0..attributes {
                    r.take(2)?;
                    let len = r.u4()? as usize;
                    r.take(len)?;
                }
            }
        }
        Ok(members)
    }

    /// Every descriptor and signature reference in the body.
    pub fn body_refs(&self, label: &str) -> BuildResult<Vec<BodyRef>> {
        let mut r = Reader {
            bytes: &self.body,
            pos: 0,
            label,
        };
        let mut refs = Vec::new();

        r.take(6)?; // access, this, super
        let interfaces = r.u2()? as usize;
        r.take(interfaces * 2)?;

        for is_method in [false, true] {
            let members = r.u2()?;
            for _ in 0..members {
                r.take(2)?; // access
                let name_offset = r.pos;
                let name = r.u2()?;
                let descriptor_offset = r.pos;
                let descriptor = r.u2()?;
                if is_method {
                    refs.push(BodyRef::MethodName {
                        offset: name_offset,
                        index: name,
                        descriptor,
                    });
                }
                refs.push(BodyRef::MemberDescriptor {
                    offset: descriptor_offset,
                    index: descriptor,
                });
                self.attributes(&mut r, &mut refs)?;
            }
        }
        self.attributes(&mut r, &mut refs)?;

        if r.pos != self.body.len() {
            return Err(r.error("trailing bytes after attributes"));
        }
        Ok(refs)
    }

    fn attributes(&self, r: &mut Reader<'_>, refs: &mut Vec<BodyRef>) -> BuildResult<()> {
        let count = r.u2()?;
        for _ in 0..count {
            let name = r.u2()?;
            let len = r.u4()? as usize;
            let start = r.pos;
            match self.utf8(name) {
                Some("Signature") => {
                    let offset = r.pos;
                    let index = r.u2()?;
                    refs.push(BodyRef::Signature { offset, index });
                }
                Some("EnclosingMethod") => {
                    r.u2()?; // class
                    let offset = r.pos;
                    let index = r.u2()?;
                    if index != 0 {
                        refs.push(BodyRef::EnclosingMethod { offset, index });
                    }
                }
                Some("Code") => {
                    r.take(4)?; // max_stack, max_locals
                    let code_len = r.u4()? as usize;
                    r.take(code_len)?;
                    let exceptions = r.u2()? as usize;
                    r.take(exceptions * 8)?;
                    self.attributes(r, refs)?;
                }
                Some(kind @ ("LocalVariableTable" | "LocalVariableTypeTable")) => {
                    let entries = r.u2()?;
                    for _ in 0..entries {
                        r.take(6)?; // start_pc, length, name
                        let offset = r.pos;
                        let index = r.u2()?;
                        r.take(2)?; // slot
                        refs.push(if kind == "LocalVariableTable" {
                            BodyRef::LocalDescriptor { offset, index }
                        } else {
                            BodyRef::Signature { offset, index }
                        });
                    }
                }
                _ => {
                    r.take(len)?;
                }
            }
            if r.pos != start + len {
                return Err(r.error("attribute length does not match its content"));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> BuildResult<Vec<u8>> {
        let count = u16::try_from(self.pool.len()).map_err(|_| BuildError::ClassFormat {
            path: String::new(),
            message: format!("constant pool grew to {} entries", self.pool.len()),
        })?;

        let mut out = Vec::with_capacity(self.body.len() + self.pool.len() * 8 + 10);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());
        out.extend_from_slice(&count.to_be_bytes());

        for entry in self.pool.iter().skip(1) {
            write_entry(&mut out, entry)?;
        }
        out.extend_from_slice(&self.body);
        Ok(out)
    }
}

fn write_entry(out: &mut Vec<u8>, entry: &CpEntry) -> BuildResult<()> {
    let u2 = |out: &mut Vec<u8>, v: u16| out.extend_from_slice(&v.to_be_bytes());
    match entry {
        CpEntry::Unusable => {}
        CpEntry::Utf8(bytes) => {
            let len = u16::try_from(bytes.len()).map_err(|_| BuildError::ClassFormat {
                path: String::new(),
                message: format!("UTF-8 constant of {} bytes exceeds 65535", bytes.len()),
            })?;
            out.push(1);
            u2(out, len);
            out.extend_from_slice(bytes);
        }
        CpEntry::Integer(b) => {
            out.push(3);
            out.extend_from_slice(b);
        }
        CpEntry::Float(b) => {
            out.push(4);
            out.extend_from_slice(b);
        }
        CpEntry::Long(b) => {
            out.push(5);
            out.extend_from_slice(b);
        }
        CpEntry::Double(b) => {
            out.push(6);
            out.extend_from_slice(b);
        }
        CpEntry::Class(i) => {
            out.push(7);
            u2(out, *i);
        }
        CpEntry::String(i) => {
            out.push(8);
            u2(out, *i);
        }
        CpEntry::FieldRef { class, nat } => {
            out.push(9);
            u2(out, *class);
            u2(out, *nat);
        }
        CpEntry::MethodRef { class, nat } => {
            out.push(10);
            u2(out, *class);
            u2(out, *nat);
        }
        CpEntry::InterfaceMethodRef { class, nat } => {
            out.push(11);
            u2(out, *class);
            u2(out, *nat);
        }
        CpEntry::NameAndType { name, descriptor } => {
            out.push(12);
            u2(out, *name);
            u2(out, *descriptor);
        }
        CpEntry::MethodHandle { kind, reference } => {
            out.push(15);
            out.push(*kind);
            u2(out, *reference);
        }
        CpEntry::MethodType(i) => {
            out.push(16);
            u2(out, *i);
        }
        CpEntry::Dynamic { bootstrap, nat } => {
            out.push(17);
            u2(out, *bootstrap);
            u2(out, *nat);
        }
        CpEntry::InvokeDynamic { bootstrap, nat } => {
            out.push(18);
            u2(out, *bootstrap);
            u2(out, *nat);
        }
        CpEntry::Module(i) => {
            out.push(19);
            u2(out, *i);
        }
        CpEntry::Package(i) => {
            out.push(20);
            u2(out, *i);
        }
    }
    Ok(())
}

/// Overwrite the u2 at `offset` in `body`.
pub fn patch_u2(body: &mut [u8], offset: usize, value: u16) {
    body[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(s: &str) -> CpEntry {
        CpEntry::Utf8(s.as_bytes().to_vec())
    }

    /// `Point extends Object` with field `x I` and method `<init> ()V`.
    fn point(name: &str) -> ClassFile {
        let pool = vec![
            CpEntry::Unusable,
            utf8(name),                 // 1
            CpEntry::Class(1),          // 2
            utf8("java/lang/Object"),   // 3
            CpEntry::Class(3),          // 4
            utf8("x"),                  // 5
            utf8("I"),                  // 6
            utf8("<init>"),             // 7
            utf8("()V"),                // 8
            utf8("Deprecated"),         // 9
        ];
        let mut body = Vec::new();
        let u2 = |body: &mut Vec<u8>, v: u16| body.extend_from_slice(&v.to_be_bytes());
        u2(&mut body, 0x0021);
        u2(&mut body, 2);
        u2(&mut body, 4);
        u2(&mut body, 0);
        u2(&mut body, 1);
        for v in [0x0001, 5, 6, 0] {
            u2(&mut body, v);
        }
        u2(&mut body, 1);
        for v in [0x0001, 7, 8, 1, 9] {
            u2(&mut body, v);
        }
        body.extend_from_slice(&0u32.to_be_bytes());
        u2(&mut body, 0);
        ClassFile {
            minor: 0,
            major: 52,
            pool,
            body,
        }
    }

    #[test]
    fn lists_declared_members_and_parents() {
        let class = ClassFile::parse(&point("demo/Point").to_bytes().unwrap(), "Point.class").unwrap();
        let (this, super_class, interfaces) = class.hierarchy("Point.class").unwrap();
        assert_eq!(class.class_name(this), Some("demo/Point"));
        assert_eq!(class.class_name(super_class), Some("java/lang/Object"));
        assert!(interfaces.is_empty());

        let members = class.members("Point.class").unwrap();
        assert_eq!(
            members,
            vec![
                DeclaredMember {
                    is_method: false,
                    name: "x".into(),
                    descriptor: "I".into()
                },
                DeclaredMember {
                    is_method: true,
                    name: "<init>".into(),
                    descriptor: "()V".into()
                },
            ]
        );
    }

    #[test]
    fn oversized_utf8_constant_is_rejected() {
        let long_name = "a".repeat(70_000);
        let err = point(&long_name).to_bytes().unwrap_err();
        match err {
            BuildError::ClassFormat { message, .. } => assert!(message.contains("70000 bytes")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
