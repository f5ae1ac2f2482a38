//! Enter phase - Skeleton Discovery
//!
//! Walks the declarations of a unit depth-first and registers one empty class
//! record per named class, interface and enum, so that forward and mutually
//! recursive references resolve before any member is looked at. Nested types are
//! identified by their enclosing type's name plus their own. Anonymous classes
//! are not entered here: nothing can name them from source, and they are
//! registered by the Skeleton Builder once their supertype is known.

use crate::ast::{Ast, ClassDecl, ClassKind};
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::env::{ClassSymbol, Origin};
use crate::common::flags::{access_flags, Modifiers};
use crate::common::types::ClassType;
use crate::error::{Error, Result, ResultExt};

pub struct Enter {
    unit: UnitId,
}

impl Enter {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        let package = ast.package_name();
        let origin = if ctx.unit(self.unit).is_prelude {
            Origin::Prelude
        } else {
            Origin::Source(ctx.unit(self.unit).path.clone())
        };
        for decl in &mut ast.type_decls {
            let ty = ClassType::new(package.clone(), decl.name.clone());
            self.enter_class(ctx, decl, ty, None, &origin)?;
        }
        log::debug!(
            "entered {} classes from '{}'",
            ctx.unit(self.unit).classes.len(),
            ctx.unit(self.unit).path.display()
        );
        Ok(())
    }

    fn enter_class(
        &mut self,
        ctx: &mut CompilationContext,
        decl: &mut ClassDecl,
        ty: ClassType,
        outer: Option<ClassKind>,
        origin: &Origin,
    ) -> Result<()> {
        if decl.is_anonymous {
            return Err(Error::internal("anonymous class reached Skeleton Discovery")).at(decl.span);
        }
        let flags = implicit_flags(decl, outer);
        let mut symbol = ClassSymbol::new(ty.clone(), decl.kind, flags, origin.clone());
        symbol.is_inner = outer.is_some() && decl.kind == ClassKind::Class && !flags.is_static();
        symbol.type_params = decl
            .type_params
            .iter()
            .map(|p| crate::common::types::Type::TypeVariable { name: p.name.clone(), bound: None })
            .collect();
        ctx.register(symbol).at(decl.span)?;
        decl.symbol = Some(ty.clone());
        ctx.unit_mut(self.unit).classes.push(ty.clone());

        let mut nested = Vec::new();
        for member in decl.nested_types_mut() {
            let member_ty = ty.nested(member.name.clone());
            if nested.contains(&member_ty) {
                return Err(Error::type_error(format!("duplicate class '{}'", member_ty))).at(member.span);
            }
            nested.push(member_ty);
        }
        if let Some(class) = ctx.get(&ty) {
            class.borrow_mut().nested = nested.clone();
        }
        let kind = decl.kind;
        for (member, member_ty) in decl.nested_types_mut().zip(nested) {
            self.enter_class(ctx, member, member_ty, Some(kind), origin)?;
        }
        Ok(())
    }
}

/// Modifiers a declaration has without writing them
fn implicit_flags(decl: &ClassDecl, outer: Option<ClassKind>) -> Modifiers {
    let mut flags = decl.modifiers;
    match decl.kind {
        ClassKind::Interface => flags.insert(access_flags::ACC_ABSTRACT),
        ClassKind::Enum => {
            if decl.enum_constants.iter().all(|c| c.body.is_none()) {
                flags.insert(access_flags::ACC_FINAL);
            }
        }
        ClassKind::Class => {}
    }
    if let Some(outer) = outer {
        // Member interfaces and enums are implicitly static; members of an
        // interface are implicitly public and static
        if decl.kind != ClassKind::Class || outer == ClassKind::Interface {
            flags.insert(access_flags::ACC_STATIC);
        }
        if outer == ClassKind::Interface {
            flags.insert(access_flags::ACC_PUBLIC);
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_nested_classes_are_entered() {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source(
            "p/A.java",
            "package p; class A { class B { static class C {} } interface I {} enum E { X } }",
        );
        let unit = ctx.compile_root(std::path::Path::new("p/A.java")).unwrap();
        let classes = &ctx.unit(unit).classes;
        let names: Vec<String> = classes.iter().map(ClassType::binary_name).collect();
        assert_eq!(names, ["p.A", "p.A$B", "p.A$B$C", "p.A$I", "p.A$E"]);

        let b = ctx.get(&ClassType::new("p", "A").nested("B")).unwrap();
        assert!(b.borrow().is_inner);
        let c = ctx.get(&ClassType::new("p", "A").nested("B").nested("C")).unwrap();
        assert!(!c.borrow().is_inner);
        let i = ctx.get(&ClassType::new("p", "A").nested("I")).unwrap();
        assert!(i.borrow().flags.is_static());
        let a = ctx.get(&ClassType::new("p", "A")).unwrap();
        assert_eq!(a.borrow().nested.len(), 3);
    }

    #[test]
    fn test_duplicate_member_type() {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("A.java", "class A { class B {} class B {} }");
        let err = ctx.compile_root(std::path::Path::new("A.java")).unwrap_err();
        assert!(err.to_string().contains("duplicate class"), "{}", err);
    }
}
