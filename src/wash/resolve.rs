//! Type Resolution
//!
//! Replaces every type mention of a unit (class headers, member signatures and
//! every type written inside bodies) with a fully qualified type. A mention that
//! already carries a resolved type is left alone, so running the pass twice is a
//! no-op.
//!
//! Supertypes are written to the class record as soon as they resolve: member
//! types inherited through them may be named by the rest of this unit, or by a
//! unit that is resolving concurrently further up the call stack.

use crate::ast::*;
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::types::{ClassType, Type};
use crate::error::{Error, Result, ResultExt};

pub struct TypeResolver {
    unit: UnitId,
}

impl TypeResolver {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        let mut resolving = Resolving { ctx, unit: self.unit, enclosing: Vec::new(), type_vars: Vec::new() };
        walk_ast(&mut resolving, ast)
    }
}

/// Resolve one type mention on behalf of the unit `unit`, with `enclosing` naming
/// the enclosing classes innermost first
pub fn resolve_type_ref(
    ctx: &mut CompilationContext,
    unit: UnitId,
    enclosing: &[ClassType],
    ty: &mut TypeRef,
) -> Result<()> {
    let mut resolving = Resolving {
        ctx,
        unit,
        enclosing: enclosing.iter().rev().cloned().collect(),
        type_vars: Vec::new(),
    };
    resolving.resolve(ty)
}

struct Resolving<'a> {
    ctx: &'a mut CompilationContext,
    unit: UnitId,
    /// Lexically enclosing classes, innermost last
    enclosing: Vec<ClassType>,
    /// Type variables in scope, innermost scope last
    type_vars: Vec<Vec<Type>>,
}

impl Resolving<'_> {
    fn resolve(&mut self, ty: &mut TypeRef) -> Result<()> {
        if ty.resolved.is_some() {
            return Ok(());
        }
        let span = ty.span;
        let base = match &mut ty.syntax {
            TypeSyntax::Primitive(p) => Type::Primitive(*p),
            TypeSyntax::Wildcard { bound, is_super } => {
                let bound = match bound {
                    Some(bound) => {
                        self.resolve(bound)?;
                        Some(Box::new(bound.ty()?.clone()))
                    }
                    None => None,
                };
                if *is_super {
                    Type::Wildcard { lower: bound, upper: None }
                } else {
                    Type::Wildcard { lower: None, upper: bound }
                }
            }
            TypeSyntax::Named(segments) => {
                for segment in segments.iter_mut() {
                    for arg in &mut segment.args {
                        self.resolve(arg)?;
                    }
                }
                self.resolve_named(segments).at(span)?
            }
        };
        let mut resolved = base;
        for _ in 0..ty.array_dims {
            resolved = Type::array_of(resolved);
        }
        if resolved.is_void() && ty.array_dims > 0 {
            return Err(Error::type_error("'void' type not allowed here")).at(span);
        }
        ty.resolved = Some(resolved);
        Ok(())
    }

    fn resolve_named(&mut self, segments: &[TypeSegment]) -> Result<Type> {
        let first = &segments[0].name;
        if segments.len() == 1 {
            if let Some(var) = self.type_var(first) {
                return Ok(var);
            }
        }
        let dotted = segments.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(".");
        let enclosing: Vec<ClassType> = self.enclosing.iter().rev().cloned().collect();
        let class = match self.ctx.lookup_type_name(first, &enclosing, self.unit)? {
            Some(mut current) => {
                for segment in &segments[1..] {
                    current = self
                        .ctx
                        .find_member_type(&current, &segment.name)?
                        .ok_or_else(|| Error::class_not_found(&dotted))?;
                }
                current
            }
            None => self
                .ctx
                .resolve_qualified(&dotted)?
                .ok_or_else(|| Error::class_not_found(&dotted))?,
        };
        let args = segments
            .last()
            .map(|s| s.args.iter().map(|a| a.ty().cloned()).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();
        Ok(Type::Class(class.with_args(args)))
    }

    fn type_var(&self, name: &str) -> Option<Type> {
        self.type_vars
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|v| matches!(v, Type::TypeVariable { name: n, .. } if n == name))
            .cloned()
    }

    /// Bring type parameters into scope and resolve their bounds; a bound may
    /// mention the parameters themselves
    fn enter_type_params(&mut self, params: &mut [TypeParam]) -> Result<Vec<Type>> {
        self.type_vars.push(
            params
                .iter()
                .map(|p| Type::TypeVariable { name: p.name.clone(), bound: None })
                .collect(),
        );
        let mut resolved = Vec::new();
        for param in params.iter_mut() {
            for bound in &mut param.bounds {
                self.resolve(bound)?;
            }
            let bound = match param.bounds.first() {
                Some(bound) => Some(Box::new(bound.ty()?.clone())),
                None => None,
            };
            resolved.push(Type::TypeVariable { name: param.name.clone(), bound });
        }
        if let Some(scope) = self.type_vars.last_mut() {
            *scope = resolved.clone();
        }
        Ok(resolved)
    }

    fn named_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        let ty = class.symbol()?.clone();
        let type_params = self.enter_type_params(&mut class.type_params).at(class.span)?;
        if let Some(extends) = &mut class.extends {
            self.resolve(extends)?;
        }
        for iface in &mut class.implements {
            self.resolve(iface)?;
        }

        let super_class = match class.kind {
            ClassKind::Interface => None,
            ClassKind::Enum => Some(Type::Class(
                ClassType::java_lang(crate::consts::ENUM).with_args(vec![Type::Class(ty.clone())]),
            )),
            ClassKind::Class if ty.is_object() => None,
            ClassKind::Class => Some(match &class.extends {
                Some(extends) => extends.ty()?.clone(),
                None => Type::object(),
            }),
        };
        let interfaces = class.implements.iter().map(|i| i.ty().cloned()).collect::<Result<Vec<_>>>()?;
        if let Some(symbol) = self.ctx.get(&ty) {
            let mut symbol = symbol.borrow_mut();
            symbol.type_params = type_params;
            symbol.super_class = super_class;
            symbol.interfaces = interfaces;
        }

        self.enclosing.push(ty);
        let result = self.class_body(class);
        self.enclosing.pop();
        self.type_vars.pop();
        result
    }

    fn class_body(&mut self, class: &mut ClassDecl) -> Result<()> {
        for constant in &mut class.enum_constants {
            for arg in &mut constant.args {
                self.visit_expr(arg)?;
            }
            if let Some(body) = &mut constant.body {
                self.visit_class(body)?;
            }
        }
        for member in &mut class.body {
            self.visit_member(member)?;
        }
        Ok(())
    }
}

impl VisitorMut for Resolving<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        if class.is_anonymous {
            // The creating expression already pushed the supertype, whose member
            // types are in scope inside the body
            return self.class_body(class);
        }
        self.named_class(class)
    }

    fn visit_member(&mut self, member: &mut ClassMember) -> Result<()> {
        match member {
            ClassMember::Method(method) => {
                self.enter_type_params(&mut method.type_params).at(method.span)?;
                let result = walk_member(self, member);
                self.type_vars.pop();
                result
            }
            _ => walk_member(self, member),
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::New { class, outer, args, body, captured, .. } => {
                if let Some(outer) = outer {
                    self.visit_expr(outer)?;
                }
                if outer.is_none() {
                    self.resolve(class)?;
                }
                for arg in args.iter_mut() {
                    self.visit_expr(arg)?;
                }
                for arg in captured.iter_mut() {
                    self.visit_expr(arg)?;
                }
                if let Some(body) = body {
                    // `outer.new Inner() {..}` names Inner relative to the type of
                    // `outer`, which is only known to Type Propagation
                    let Some(Type::Class(sup)) = class.resolved.clone() else {
                        return Err(Error::type_error(
                            "anonymous subclasses of qualified inner classes are not supported",
                        ))
                        .at(span);
                    };
                    self.enclosing.push(sup.erased());
                    let result = self.visit_class(body);
                    self.enclosing.pop();
                    result?;
                }
                Ok(())
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_type_ref(&mut self, ty: &mut TypeRef) -> Result<()> {
        self.resolve(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::Span;
    use std::path::Path;

    fn header_compiled(source: &str) -> (CompilationContext, UnitId) {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        let unit = ctx.compile_root(Path::new("p/A.java")).unwrap();
        (ctx, unit)
    }

    fn field_type(ctx: &CompilationContext, unit: UnitId, name: &str) -> Type {
        let ast = ctx.unit(unit).ast.as_ref().unwrap();
        ast.type_decls[0]
            .body
            .iter()
            .find_map(|m| match m {
                ClassMember::Field(f) if f.name == name => f.ty.resolved.clone(),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_member_types_and_generics() {
        let (ctx, unit) = header_compiled(
            "package p; import java.util.List; class A<T> { class B {} B b; List<String> names; T item; int[] xs; }",
        );
        assert_eq!(field_type(&ctx, unit, "b"), Type::Class(ClassType::new("p", "A").nested("B")));
        assert_eq!(
            field_type(&ctx, unit, "names"),
            Type::Class(ClassType::new("java.util", "List").with_args(vec![Type::string()]))
        );
        assert!(matches!(field_type(&ctx, unit, "item"), Type::TypeVariable { ref name, .. } if name == "T"));
        assert_eq!(field_type(&ctx, unit, "xs"), Type::array_of(Type::INT));
    }

    #[test]
    fn test_resolution_is_a_fixed_point() {
        let (mut ctx, unit) = header_compiled("package p; class A { class B {} }");
        let enclosing = [ClassType::new("p", "A")];
        let mut simple = TypeRef::named("B", Span::synthetic());
        resolve_type_ref(&mut ctx, unit, &enclosing, &mut simple).unwrap();
        let first = simple.resolved.clone();
        resolve_type_ref(&mut ctx, unit, &enclosing, &mut simple).unwrap();
        assert_eq!(simple.resolved, first);

        let mut qualified = TypeRef::named("p.A.B", Span::synthetic());
        resolve_type_ref(&mut ctx, unit, &enclosing, &mut qualified).unwrap();
        assert_eq!(qualified.resolved, first);
    }

    #[test]
    fn test_unknown_type() {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("A.java", "class A { Missing m; }");
        let err = ctx.compile_root(Path::new("A.java")).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::ClassNotFound));
        let syntax = err.as_syntax().unwrap();
        assert_eq!(syntax.location.map(|l| l.line), Some(1));
        assert_eq!(syntax.file.as_deref(), Some(Path::new("A.java")));
    }
}
