//! Search path resolution
//!
//! Classes are looked up in this order:
//! 1. in-memory sources registered on the compilation context
//! 2. source roots, as `<root>/p/q/C.java`
//! 3. compiled-class roots, as `<root>/p/q/C$N.class`
//! 4. the built-in prelude
//!
//! Nested classes always live in the file of their top-level class.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::prelude;
use crate::common::types::ClassType;
use crate::config::Config;
use crate::consts::{CLASS_SUFFIX, SOURCE_SUFFIX};
use crate::error::{Error, Result};

/// Where a class definition can be read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLocation {
    /// Source file; the path doubles as the compilation-unit key
    Source(PathBuf),
    Compiled(PathBuf),
    Prelude(&'static str),
}

#[derive(Debug, Default)]
pub struct SearchPath {
    memory: BTreeMap<PathBuf, String>,
    source_roots: Vec<PathBuf>,
    class_roots: Vec<PathBuf>,
    prelude: bool,
}

impl SearchPath {
    pub fn new(config: &Config) -> Self {
        Self {
            memory: BTreeMap::new(),
            source_roots: config.source_roots.clone(),
            class_roots: config.class_roots.clone(),
            prelude: config.prelude,
        }
    }

    /// Register an in-memory source at a path relative to the source root
    pub fn add_memory_source(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.memory.insert(path.into(), source.into());
    }

    pub fn has_memory_source(&self, path: &Path) -> bool {
        self.memory.contains_key(path)
    }

    /// Relative source path of a top-level class: `p/q/C.java`
    pub fn source_file_name(ty: &ClassType) -> PathBuf {
        let mut path = package_dir(&ty.package);
        path.push(format!("{}.{}", ty.top_level().simple_name(), SOURCE_SUFFIX));
        path
    }

    /// Relative class-file path: `p/q/C$N.class`
    pub fn class_file_name(ty: &ClassType) -> PathBuf {
        let internal = ty.erased().internal_name();
        PathBuf::from(format!("{}.{}", internal, CLASS_SUFFIX))
    }

    pub fn find(&self, ty: &ClassType) -> Option<ClassLocation> {
        let relative = Self::source_file_name(ty);
        if self.memory.contains_key(&relative) {
            return Some(ClassLocation::Source(relative));
        }
        for root in &self.source_roots {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                return Some(ClassLocation::Source(canonical(&candidate)));
            }
        }
        let class_file = Self::class_file_name(ty);
        for root in &self.class_roots {
            let candidate = root.join(&class_file);
            if candidate.is_file() {
                return Some(ClassLocation::Compiled(candidate));
            }
        }
        if self.prelude {
            if let Some(source) = prelude::source_for(&ty.top_level()) {
                return Some(ClassLocation::Prelude(source));
            }
        }
        None
    }

    /// Read a source file, in-memory sources first
    pub fn read_source(&self, path: &Path) -> Result<String> {
        if let Some(source) = self.memory.get(path) {
            return Ok(source.clone());
        }
        fs::read_to_string(path).map_err(|e| Error::io(path, e))
    }

    /// Whether some root contains the package `name`
    pub fn is_package(&self, name: &str) -> bool {
        let dir = package_dir(name);
        if self.memory.keys().any(|k| k.starts_with(&dir)) {
            return true;
        }
        if self
            .source_roots
            .iter()
            .chain(self.class_roots.iter())
            .any(|root| root.join(&dir).is_dir())
        {
            return true;
        }
        self.prelude && prelude::is_package(name)
    }
}

fn package_dir(package: &str) -> PathBuf {
    package.split('.').filter(|s| !s.is_empty()).collect()
}

/// Canonical form used as the compilation-unit key
pub fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let nested = ClassType::new("p.q", "Outer").nested("Inner");
        assert_eq!(SearchPath::source_file_name(&nested), PathBuf::from("p/q/Outer.java"));
        assert_eq!(SearchPath::class_file_name(&nested), PathBuf::from("p/q/Outer$Inner.class"));
        let top = ClassType::new("", "A");
        assert_eq!(SearchPath::source_file_name(&top), PathBuf::from("A.java"));
    }

    #[test]
    fn test_memory_sources_win() {
        let mut path = SearchPath::new(&Config::default());
        path.add_memory_source("p/A.java", "package p; class A {}");
        assert_eq!(
            path.find(&ClassType::new("p", "A")),
            Some(ClassLocation::Source(PathBuf::from("p/A.java")))
        );
        assert!(path.is_package("p"));
        assert!(!path.is_package("nope"));
        assert!(matches!(path.find(&ClassType::object()), Some(ClassLocation::Prelude(_))));
    }

    #[test]
    fn test_prelude_can_be_disabled() {
        let path = SearchPath::new(&Config::default().without_prelude());
        assert_eq!(path.find(&ClassType::string()), None);
        assert!(!path.is_package("java.lang"));
    }
}
