//! Compiler configuration
//!
//! The search path is an ordered list of source roots followed by an ordered
//! list of compiled-class roots. Both can come from the environment:
//!
//! - `JFRONT_SOURCEPATH`: source roots (platform path-list syntax)
//! - `JFRONT_CLASSPATH`: compiled-class roots

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const SOURCEPATH_ENV: &str = "JFRONT_SOURCEPATH";
pub const CLASSPATH_ENV: &str = "JFRONT_CLASSPATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source_roots: Vec<PathBuf>,
    pub class_roots: Vec<PathBuf>,
    /// Where the CLI writes textual IR; `None` keeps output in memory
    pub output_dir: Option<PathBuf>,
    /// Whether the built-in `java.lang` stubs are on the search path
    pub prelude: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_roots: Vec::new(),
            class_roots: Vec::new(),
            output_dir: None,
            prelude: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration from `JFRONT_SOURCEPATH`/`JFRONT_CLASSPATH`, defaulting to
    /// the current directory as the only source root
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.source_roots = env::var_os(SOURCEPATH_ENV)
            .map(|value| split_paths(&value))
            .unwrap_or_default();
        if config.source_roots.is_empty() {
            config.source_roots.push(PathBuf::from("."));
        }
        config.class_roots = env::var_os(CLASSPATH_ENV)
            .map(|value| split_paths(&value))
            .unwrap_or_default();
        log::debug!(
            "config from environment: sourcepath={:?} classpath={:?}",
            config.source_roots,
            config.class_roots
        );
        config
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_roots.push(root.into());
        self
    }

    pub fn with_class_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.class_roots.push(root.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn without_prelude(mut self) -> Self {
        self.prelude = false;
        self
    }

    /// Reject roots that do not exist
    pub fn validate(&self) -> Result<()> {
        for root in self.source_roots.iter().chain(self.class_roots.iter()) {
            if !root.is_dir() {
                return Err(Error::config(format!(
                    "search path entry '{}' is not a directory",
                    root.display()
                )));
            }
        }
        if let Some(dir) = &self.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(Error::config(format!(
                    "output location '{}' is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Split a platform path list, dropping empty entries
pub fn split_paths(value: &std::ffi::OsStr) -> Vec<PathBuf> {
    env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// Split a path list given on the command line
pub fn parse_path_list(value: &str) -> Vec<PathBuf> {
    split_paths(Path::new(value).as_os_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_source_root("src")
            .with_class_root("lib")
            .without_prelude();
        assert_eq!(config.source_roots, vec![PathBuf::from("src")]);
        assert_eq!(config.class_roots, vec![PathBuf::from("lib")]);
        assert!(!config.prelude);
    }

    #[test]
    fn test_path_list() {
        let sep = if cfg!(windows) { ";" } else { ":" };
        let list = format!("a{sep}{sep}b");
        assert_eq!(parse_path_list(&list), vec![PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let config = Config::new().with_source_root("/definitely/not/here");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
