use std::fs;
use std::path::{Path, PathBuf};

use super::IrClass;
use crate::error::{Error, Result};

/// Consumer of lowered classes (a bytecode emitter, a file writer, a test)
pub trait ClassSink {
    fn accept(&mut self, class: IrClass) -> Result<()>;
}

/// Keeps every class in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub classes: Vec<IrClass>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, binary_name: &str) -> Option<&IrClass> {
        self.classes.iter().find(|c| c.name.binary_name() == binary_name)
    }
}

impl ClassSink for MemorySink {
    fn accept(&mut self, class: IrClass) -> Result<()> {
        self.classes.push(class);
        Ok(())
    }
}

/// Writes the textual form of each class to `<root>/<internal name>.jir`
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub const EXTENSION: &'static str = "jir";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), written: Vec::new() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn path_for(&self, class: &IrClass) -> PathBuf {
        self.root
            .join(format!("{}.{}", class.name.internal_name(), Self::EXTENSION))
    }
}

impl ClassSink for DirectorySink {
    fn accept(&mut self, class: IrClass) -> Result<()> {
        let path = self.path_for(&class);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&path, class.to_string()).map_err(|e| Error::io(&path, e))?;
        log::debug!("wrote '{}'", path.display());
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ClassType;

    fn empty_class(package: &str, name: &str) -> IrClass {
        IrClass {
            name: ClassType::new(package, name),
            flags: 0x0021,
            super_class: Some(ClassType::object()),
            interfaces: Vec::new(),
            outer: None,
            is_inner: false,
            fields: Vec::new(),
            methods: Vec::new(),
            source: PathBuf::from("A.java"),
        }
    }

    #[test]
    fn test_directory_sink_writes_one_file_per_class() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        sink.accept(empty_class("p.q", "A")).unwrap();
        let path = dir.path().join("p/q/A.jir");
        assert_eq!(sink.written(), &[path.clone()]);
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("public class p.q.A extends java.lang.Object"), "{text}");
    }

    #[test]
    fn test_memory_sink_find() {
        let mut sink = MemorySink::new();
        sink.accept(empty_class("", "B")).unwrap();
        assert!(sink.find("B").is_some());
        assert!(sink.find("C").is_none());
    }
}
