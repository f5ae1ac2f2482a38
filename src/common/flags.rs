//! Access and property flags
//!
//! Modifiers are carried as JVM access-flag words so that the lowered IR can
//! hand them to the class-file writer unchanged.

use std::fmt;

pub mod access_flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_VOLATILE: u16 = 0x0040;
    pub const ACC_BRIDGE: u16 = 0x0040;
    pub const ACC_TRANSIENT: u16 = 0x0080;
    pub const ACC_VARARGS: u16 = 0x0080;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_STRICT: u16 = 0x0800;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
    pub const ACC_ANNOTATION: u16 = 0x2000;
    pub const ACC_ENUM: u16 = 0x4000;
}

use access_flags::*;

/// Modifier set of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(pub u16);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);

    pub fn new(bits: u16) -> Self {
        Modifiers(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    pub fn with(self, bit: u16) -> Self {
        Modifiers(self.0 | bit)
    }

    pub fn without(self, bit: u16) -> Self {
        Modifiers(self.0 & !bit)
    }

    pub fn insert(&mut self, bit: u16) {
        self.0 |= bit;
    }

    pub fn remove(&mut self, bit: u16) {
        self.0 &= !bit;
    }

    pub fn is_static(&self) -> bool {
        self.has(ACC_STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.has(ACC_FINAL)
    }

    pub fn is_private(&self) -> bool {
        self.has(ACC_PRIVATE)
    }

    pub fn is_public(&self) -> bool {
        self.has(ACC_PUBLIC)
    }

    pub fn is_protected(&self) -> bool {
        self.has(ACC_PROTECTED)
    }

    pub fn is_abstract(&self) -> bool {
        self.has(ACC_ABSTRACT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.has(ACC_SYNTHETIC)
    }

    /// Clear private/protected/public and apply package visibility
    pub fn package_visible(self) -> Self {
        self.without(ACC_PRIVATE | ACC_PROTECTED | ACC_PUBLIC)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (ACC_PUBLIC, "public"),
            (ACC_PRIVATE, "private"),
            (ACC_PROTECTED, "protected"),
            (ACC_STATIC, "static"),
            (ACC_FINAL, "final"),
            (ACC_ABSTRACT, "abstract"),
            (ACC_NATIVE, "native"),
            (ACC_SYNTHETIC, "synthetic"),
            (ACC_ENUM, "enum"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.has(bit) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
