//! Minimal JVM class-file reader
//!
//! Only the parts a front end needs to use a compiled class as a dependency:
//! the constant pool, access flags, supertypes, field and method descriptors,
//! `ConstantValue` and `InnerClasses`. Code and every other attribute are skipped.

use thiserror::Error;

use crate::common::constant::Constant;
use crate::common::types::{parse_field_descriptor, PrimitiveType, Type};

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassFormatError {
    #[error("truncated class file at offset {0}")]
    Truncated(usize),
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unknown constant pool tag {tag} at entry {index}")]
    UnknownTag { tag: u8, index: u16 },
    #[error("constant pool entry {0} has the wrong kind")]
    BadIndex(u16),
    #[error("malformed modified UTF-8 in constant pool entry {0}")]
    BadUtf8(u16),
}

type ReadResult<T> = std::result::Result<T, ClassFormatError>;

#[derive(Debug, Clone, PartialEq)]
enum PoolEntry {
    /// Slot 0 and the second half of long/double entries
    Unusable,
    Utf8(String),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    /// Member refs, name-and-type, method handles and the like
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// `ConstantValue` attribute, fields only
    pub constant: Option<Constant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClassEntry {
    /// Internal name of the nested class
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `java/util/Map$Entry`
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub inner_classes: Vec<InnerClassEntry>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> ReadResult<ClassFile> {
        let mut reader = Reader { bytes, pos: 0 };
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let _minor = reader.u16()?;
        let major_version = reader.u16()?;
        let pool = read_pool(&mut reader)?;

        let access_flags = reader.u16()?;
        let this_class = pool.class_name(reader.u16()?)?;
        let super_index = reader.u16()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?)
        };
        let interface_count = reader.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(reader.u16()?)?);
        }

        let fields = read_members(&mut reader, &pool, true)?;
        let methods = read_members(&mut reader, &pool, false)?;

        let mut inner_classes = Vec::new();
        let attribute_count = reader.u16()?;
        for _ in 0..attribute_count {
            let name = pool.utf8(reader.u16()?)?;
            let length = reader.u32()? as usize;
            let body = reader.take(length)?;
            if name == "InnerClasses" {
                inner_classes = read_inner_classes(body, &pool)?;
            }
        }

        Ok(ClassFile {
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            inner_classes,
        })
    }

    /// Entry describing this class itself, present when it is nested
    pub fn own_inner_entry(&self) -> Option<&InnerClassEntry> {
        self.inner_classes.iter().find(|e| e.inner == self.this_class)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClassFormatError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ReadResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> ReadResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> ReadResult<u64> {
        let high = self.u32()? as u64;
        let low = self.u32()? as u64;
        Ok((high << 32) | low)
    }
}

struct Pool(Vec<PoolEntry>);

impl Pool {
    fn get(&self, index: u16) -> ReadResult<&PoolEntry> {
        self.0.get(index as usize).ok_or(ClassFormatError::BadIndex(index))
    }

    fn utf8(&self, index: u16) -> ReadResult<String> {
        match self.get(index)? {
            PoolEntry::Utf8(s) => Ok(s.clone()),
            _ => Err(ClassFormatError::BadIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> ReadResult<String> {
        match self.get(index)? {
            PoolEntry::Class(name) => self.utf8(*name),
            _ => Err(ClassFormatError::BadIndex(index)),
        }
    }

    fn constant(&self, index: u16, field_type: &Type) -> ReadResult<Constant> {
        let entry = self.get(index)?;
        let value = match (entry, field_type.as_primitive()) {
            (PoolEntry::Int(v), Some(PrimitiveType::Boolean)) => Some(Constant::Boolean(*v != 0)),
            (PoolEntry::Int(v), Some(p)) => Constant::Int(*v).cast(p),
            (PoolEntry::Long(v), _) => Some(Constant::Long(*v)),
            (PoolEntry::Float(v), _) => Some(Constant::Float(*v)),
            (PoolEntry::Double(v), _) => Some(Constant::Double(*v)),
            (PoolEntry::String(s), _) => Some(Constant::String(self.utf8(*s)?)),
            _ => None,
        };
        value.ok_or(ClassFormatError::BadIndex(index))
    }
}

fn read_pool(reader: &mut Reader<'_>) -> ReadResult<Pool> {
    let count = reader.u16()?;
    let mut entries = vec![PoolEntry::Unusable];
    let mut index = 1u16;
    while index < count {
        let tag = reader.u8()?;
        let entry = match tag {
            1 => {
                let length = reader.u16()? as usize;
                let raw = reader.take(length)?;
                PoolEntry::Utf8(decode_modified_utf8(raw).ok_or(ClassFormatError::BadUtf8(index))?)
            }
            3 => PoolEntry::Int(reader.u32()? as i32),
            4 => PoolEntry::Float(f32::from_bits(reader.u32()?)),
            5 => PoolEntry::Long(reader.u64()? as i64),
            6 => PoolEntry::Double(f64::from_bits(reader.u64()?)),
            7 => PoolEntry::Class(reader.u16()?),
            8 => PoolEntry::String(reader.u16()?),
            9 | 10 | 11 | 12 | 17 | 18 => {
                reader.take(4)?;
                PoolEntry::Other
            }
            15 => {
                reader.take(3)?;
                PoolEntry::Other
            }
            16 | 19 | 20 => {
                reader.take(2)?;
                PoolEntry::Other
            }
            _ => return Err(ClassFormatError::UnknownTag { tag, index }),
        };
        let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
        entries.push(entry);
        index += 1;
        if wide {
            entries.push(PoolEntry::Unusable);
            index += 1;
        }
    }
    Ok(Pool(entries))
}

fn read_members(reader: &mut Reader<'_>, pool: &Pool, fields: bool) -> ReadResult<Vec<MemberInfo>> {
    let count = reader.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.u16()?;
        let name = pool.utf8(reader.u16()?)?;
        let descriptor = pool.utf8(reader.u16()?)?;
        let mut constant = None;
        let attribute_count = reader.u16()?;
        for _ in 0..attribute_count {
            let attribute = pool.utf8(reader.u16()?)?;
            let length = reader.u32()? as usize;
            let body = reader.take(length)?;
            if fields && attribute == "ConstantValue" && body.len() == 2 {
                let index = u16::from_be_bytes([body[0], body[1]]);
                if let Some(ty) = parse_field_descriptor(&descriptor) {
                    constant = Some(pool.constant(index, &ty)?);
                }
            }
        }
        members.push(MemberInfo { access_flags, name, descriptor, constant });
    }
    Ok(members)
}

fn read_inner_classes(body: &[u8], pool: &Pool) -> ReadResult<Vec<InnerClassEntry>> {
    let mut reader = Reader { bytes: body, pos: 0 };
    let count = reader.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let inner = pool.class_name(reader.u16()?)?;
        let outer_index = reader.u16()?;
        let name_index = reader.u16()?;
        let access_flags = reader.u16()?;
        entries.push(InnerClassEntry {
            inner,
            outer: if outer_index == 0 { None } else { Some(pool.class_name(outer_index)?) },
            simple_name: if name_index == 0 { None } else { Some(pool.utf8(name_index)?) },
            access_flags,
        });
    }
    Ok(entries)
}

/// Decode the JVM's modified UTF-8 (2-byte NUL, surrogate pairs as two 3-byte units)
fn decode_modified_utf8(raw: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *raw.get(i + 1)? as u16;
            units.push(((b & 0x1F) << 6) | (b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *raw.get(i + 1)? as u16;
            let b3 = *raw.get(i + 2)? as u16;
            units.push(((b & 0x0F) << 12) | ((b2 & 0x3F) << 6) | (b3 & 0x3F));
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::flags::access_flags::*;

    /// Hand-assembled class file builder for tests
    #[derive(Default)]
    pub(crate) struct ClassBuilder {
        pool: Vec<Vec<u8>>,
        body: Vec<u8>,
    }

    impl ClassBuilder {
        pub(crate) fn utf8(&mut self, s: &str) -> u16 {
            let mut entry = vec![1];
            entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
            entry.extend_from_slice(s.as_bytes());
            self.push(entry)
        }

        pub(crate) fn class(&mut self, name: &str) -> u16 {
            let name = self.utf8(name);
            let mut entry = vec![7];
            entry.extend_from_slice(&name.to_be_bytes());
            self.push(entry)
        }

        pub(crate) fn int(&mut self, value: i32) -> u16 {
            let mut entry = vec![3];
            entry.extend_from_slice(&value.to_be_bytes());
            self.push(entry)
        }

        pub(crate) fn long(&mut self, value: i64) -> u16 {
            let mut entry = vec![5];
            entry.extend_from_slice(&value.to_be_bytes());
            let index = self.push(entry);
            // long entries take two slots
            self.pool.push(Vec::new());
            index
        }

        fn push(&mut self, entry: Vec<u8>) -> u16 {
            self.pool.push(entry);
            self.pool.len() as u16
        }

        fn u16(&mut self, v: u16) {
            self.body.extend_from_slice(&v.to_be_bytes());
        }

        fn u32(&mut self, v: u32) {
            self.body.extend_from_slice(&v.to_be_bytes());
        }

        /// Assemble `this extends super` with the given fields, methods and inner-class entries
        pub(crate) fn build(
            mut self,
            access: u16,
            this: &str,
            super_name: Option<&str>,
            fields: &[(u16, &str, &str, Option<u16>)],
            methods: &[(u16, &str, &str)],
            inner: &[(&str, Option<&str>, &str, u16)],
        ) -> Vec<u8> {
            let this_index = self.class(this);
            let super_index = super_name.map(|s| self.class(s)).unwrap_or(0);
            let constant_value = self.utf8("ConstantValue");
            let field_entries: Vec<_> = fields
                .iter()
                .map(|(flags, name, desc, value)| (*flags, self.utf8(name), self.utf8(desc), *value))
                .collect();
            let method_entries: Vec<_> = methods
                .iter()
                .map(|(flags, name, desc)| (*flags, self.utf8(name), self.utf8(desc)))
                .collect();
            let inner_entries: Vec<_> = inner
                .iter()
                .map(|(inner, outer, name, flags)| {
                    (self.class(inner), outer.map(|o| self.class(o)).unwrap_or(0), self.utf8(name), *flags)
                })
                .collect();
            let inner_attr = self.utf8("InnerClasses");

            self.u16(access);
            self.u16(this_index);
            self.u16(super_index);
            self.u16(0);
            self.u16(field_entries.len() as u16);
            for (flags, name, desc, value) in field_entries {
                self.u16(flags);
                self.u16(name);
                self.u16(desc);
                match value {
                    Some(index) => {
                        self.u16(1);
                        self.u16(constant_value);
                        self.u32(2);
                        self.u16(index);
                    }
                    None => self.u16(0),
                }
            }
            self.u16(method_entries.len() as u16);
            for (flags, name, desc) in method_entries {
                self.u16(flags);
                self.u16(name);
                self.u16(desc);
                self.u16(0);
            }
            if inner_entries.is_empty() {
                self.u16(0);
            } else {
                self.u16(1);
                self.u16(inner_attr);
                self.u32(2 + 8 * inner_entries.len() as u32);
                self.u16(inner_entries.len() as u16);
                for (inner, outer, name, flags) in inner_entries {
                    self.u16(inner);
                    self.u16(outer);
                    self.u16(name);
                    self.u16(flags);
                }
            }

            let mut out = Vec::new();
            out.extend_from_slice(&MAGIC.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&52u16.to_be_bytes());
            out.extend_from_slice(&(self.pool.len() as u16 + 1).to_be_bytes());
            for entry in &self.pool {
                out.extend_from_slice(entry);
            }
            out.extend_from_slice(&self.body);
            out
        }
    }

    #[test]
    fn test_reads_members_and_constants() {
        let mut builder = ClassBuilder::default();
        let limit = builder.int(300);
        let big = builder.long(1 << 40);
        let bytes = builder.build(
            ACC_PUBLIC | ACC_SUPER,
            "lib/Limits",
            Some("java/lang/Object"),
            &[
                (ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "MAX", "S", Some(limit)),
                (ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "BIG", "J", Some(big)),
                (ACC_PRIVATE, "count", "I", None),
            ],
            &[(ACC_PUBLIC, "<init>", "()V"), (ACC_PUBLIC | ACC_STATIC, "twice", "(I)I")],
            &[],
        );
        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.this_class, "lib/Limits");
        assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.major_version, 52);
        assert_eq!(class.fields[0].constant, Some(Constant::Short(300)));
        assert_eq!(class.fields[1].constant, Some(Constant::Long(1 << 40)));
        assert_eq!(class.fields[2].constant, None);
        assert_eq!(class.methods[1].descriptor, "(I)I");
    }

    #[test]
    fn test_reads_inner_class_entries() {
        let bytes = ClassBuilder::default().build(
            ACC_SUPER,
            "lib/Outer$Inner",
            Some("java/lang/Object"),
            &[],
            &[(0, "<init>", "(Llib/Outer;)V")],
            &[("lib/Outer$Inner", Some("lib/Outer"), "Inner", ACC_PUBLIC)],
        );
        let class = ClassFile::parse(&bytes).unwrap();
        let entry = class.own_inner_entry().unwrap();
        assert_eq!(entry.outer.as_deref(), Some("lib/Outer"));
        assert_eq!(entry.access_flags & ACC_STATIC, 0);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(ClassFile::parse(&[0, 1, 2, 3]), Err(ClassFormatError::BadMagic(0x0001_0203)));
        assert!(matches!(
            ClassFile::parse(&MAGIC.to_be_bytes()),
            Err(ClassFormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_modified_utf8() {
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80]).as_deref(), Some("\0"));
        assert_eq!(decode_modified_utf8(b"abc").as_deref(), Some("abc"));
    }
}
