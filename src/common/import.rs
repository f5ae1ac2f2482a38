//! Import declarations of one compilation unit
//!
//! Imports are recorded as written; single-type imports are only resolved
//! against the registry when their simple name is actually looked up, so an
//! unused import of a missing class is not an error until it is used.

use crate::ast::{Ast, ImportDecl};
use crate::parser::Span;

/// `import p.q.C;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleImport {
    pub simple_name: String,
    pub qualified_name: String,
    pub span: Span,
}

/// `import static p.q.C.member;` or `import static p.q.C.*;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticImport {
    /// Dotted name of the class the members come from
    pub class_name: String,
    /// `None` for the on-demand form
    pub member: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportScope {
    pub package: String,
    pub singles: Vec<SingleImport>,
    /// Package or class names of `import p.*;`
    pub wildcards: Vec<String>,
    pub statics: Vec<StaticImport>,
}

impl ImportScope {
    pub fn new(package: impl Into<String>) -> Self {
        Self { package: package.into(), ..Default::default() }
    }

    pub fn from_ast(ast: &Ast) -> Self {
        let mut scope = Self::new(ast.package_name());
        for import in &ast.imports {
            scope.add(import);
        }
        scope
    }

    pub fn add(&mut self, import: &ImportDecl) {
        match (import.is_static, import.is_wildcard) {
            (false, false) => {
                let simple_name = import
                    .name
                    .rsplit('.')
                    .next()
                    .unwrap_or(import.name.as_str())
                    .to_string();
                // A repeated import of the same name is harmless
                if !self.singles.iter().any(|s| s.qualified_name == import.name) {
                    self.singles.push(SingleImport {
                        simple_name,
                        qualified_name: import.name.clone(),
                        span: import.span,
                    });
                }
            }
            (false, true) => {
                if !self.wildcards.contains(&import.name) {
                    self.wildcards.push(import.name.clone());
                }
            }
            (true, false) => {
                if let Some((class_name, member)) = import.name.rsplit_once('.') {
                    self.statics.push(StaticImport {
                        class_name: class_name.to_string(),
                        member: Some(member.to_string()),
                        span: import.span,
                    });
                }
            }
            (true, true) => self.statics.push(StaticImport {
                class_name: import.name.clone(),
                member: None,
                span: import.span,
            }),
        }
    }

    pub fn single(&self, simple_name: &str) -> Option<&SingleImport> {
        self.singles.iter().find(|s| s.simple_name == simple_name)
    }

    /// Static imports that may provide `member`, single-member imports first
    pub fn statics_for<'a>(&'a self, member: &'a str) -> impl Iterator<Item = &'a StaticImport> + 'a {
        let singles = self
            .statics
            .iter()
            .filter(move |s| s.member.as_deref() == Some(member));
        let on_demand = self.statics.iter().filter(|s| s.member.is_none());
        singles.chain(on_demand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_import_scope_from_ast() {
        let ast = parse(
            "package a.b;\nimport java.util.List;\nimport java.util.*;\nimport java.util.*;\nimport static java.lang.Math.max;\nimport static java.lang.Math.*;\nclass X {}",
        )
        .unwrap();
        let scope = ImportScope::from_ast(&ast);
        assert_eq!(scope.package, "a.b");
        assert_eq!(scope.single("List").unwrap().qualified_name, "java.util.List");
        assert!(scope.single("Map").is_none());
        assert_eq!(scope.wildcards, vec!["java.util".to_string()]);
        let statics: Vec<_> = scope.statics_for("max").collect();
        assert_eq!(statics.len(), 2);
        assert_eq!(statics[0].member.as_deref(), Some("max"));
        assert!(statics[1].member.is_none());
    }
}
