//! Scope Resolution
//!
//! Binds every bare identifier of a unit. Lookup order:
//!
//! 1. locals and parameters of the enclosing method
//! 2. fields of the enclosing class and its supertypes
//! 3. fields of lexically enclosing classes, outward, each with its supertypes
//! 4. locals of an enclosing method, read from inside an anonymous class
//! 5. single and on-demand static imports
//!
//! Supertype fields win over fields of enclosing classes. An identifier bound to
//! a field becomes an explicit field access on `this`, on a qualified `Outer.this`
//! or on the declaring type; one bound to a captured local is recorded on every
//! anonymous class between the use and the declaring method.
//!
//! Dotted names are classified left to right as a variable, a type or a package.
//! Unqualified method calls are left to Type Propagation, which knows the
//! argument types needed to pick the receiving class.

use crate::ast::*;
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::env::CapturedVar;
use crate::common::types::{ClassType, Type};
use crate::error::{Error, Result, ResultExt};
use crate::parser::Span;

pub struct ScopeResolver {
    unit: UnitId,
}

impl ScopeResolver {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        let mut scoping = Scoping { ctx, unit: self.unit, classes: Vec::new(), scopes: Vec::new() };
        walk_ast(&mut scoping, ast)
    }
}

/// What a dotted name prefix turned out to be
enum Naming {
    Value,
    Type(ClassType),
    Package(String),
}

struct LocalScope {
    /// Number of class frames open when the scope was entered
    depth: usize,
    vars: Vec<LocalEntry>,
}

struct LocalEntry {
    name: String,
    ty: Type,
    /// Declared without an initializer; one later plain assignment still leaves it effectively final
    blank: bool,
    /// First read from inside an anonymous class
    captured: Option<Span>,
    /// First assignment that makes it not effectively final
    reassigned: Option<Span>,
}

fn not_effectively_final(name: &str, span: Span) -> Result<()> {
    Err(Error::type_error(format!(
        "local variables referenced from an inner class must be final or effectively final: {}",
        name
    )))
    .at(span)
}

struct Scoping<'a> {
    ctx: &'a mut CompilationContext,
    unit: UnitId,
    /// Lexically enclosing classes, innermost last
    classes: Vec<ClassType>,
    scopes: Vec<LocalScope>,
}

fn type_name(ty: ClassType, span: Span) -> Expr {
    Expr::new(ExprKind::TypeName(TypeRef::of(Type::Class(ty), span)), span)
}

fn field_access(target: Expr, name: &str, span: Span) -> Expr {
    Expr::new(
        ExprKind::FieldAccess { target: Box::new(target), name: name.to_string(), field: None },
        span,
    )
}

impl Scoping<'_> {
    fn enclosing(&self) -> Vec<ClassType> {
        self.classes.iter().rev().cloned().collect()
    }

    fn push_scope(&mut self) {
        self.scopes.push(LocalScope { depth: self.classes.len(), vars: Vec::new() });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, ty: &TypeRef, span: Span) -> Result<()> {
        self.declare_local(name, ty, false, span)
    }

    fn declare_local(&mut self, name: &str, ty: &TypeRef, blank: bool, span: Span) -> Result<()> {
        let depth = self.classes.len();
        let duplicate = self
            .scopes
            .iter()
            .rev()
            .take_while(|s| s.depth == depth)
            .any(|s| s.vars.iter().any(|v| v.name == name));
        if duplicate {
            return Err(Error::type_error(format!("variable '{}' is already defined in this method", name))).at(span);
        }
        let ty = ty.ty().at(span)?.clone();
        match self.scopes.last_mut() {
            Some(scope) => scope.vars.push(LocalEntry {
                name: name.to_string(),
                ty,
                blank,
                captured: None,
                reassigned: None,
            }),
            None => return Err(Error::internal("local declared outside of any scope")).at(span),
        }
        Ok(())
    }

    fn find_local(&self, name: &str) -> Option<(usize, Type)> {
        self.scopes.iter().rev().find_map(|scope| {
            scope
                .vars
                .iter()
                .rev()
                .find(|v| v.name == name)
                .map(|v| (scope.depth, v.ty.clone()))
        })
    }

    fn local_entry(&mut self, name: &str) -> Option<&mut LocalEntry> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.vars.iter_mut().rev().find(|v| v.name == name))
    }

    /// Record a write to a local of the current method; `plain` is a simple `=`
    fn note_assignment(&mut self, target: &Expr, plain: bool) -> Result<()> {
        let ExprKind::Name { name, binding: Some(Binding::Local) } = &target.kind else {
            return Ok(());
        };
        let span = target.span;
        let Some(entry) = self.local_entry(name) else {
            return Ok(());
        };
        if entry.reassigned.is_some() {
            return Ok(());
        }
        if plain && entry.blank {
            entry.blank = false;
            return Ok(());
        }
        entry.reassigned = Some(span);
        if entry.captured.is_some() {
            return not_effectively_final(name, span);
        }
        Ok(())
    }

    fn note_capture(&mut self, name: &str, span: Span) -> Result<()> {
        let Some(entry) = self.local_entry(name) else {
            return Ok(());
        };
        if entry.captured.is_none() {
            entry.captured = Some(span);
        }
        if entry.reassigned.is_some() {
            return not_effectively_final(name, span);
        }
        Ok(())
    }

    /// Binding of a local visible at this point, recording captures on the way
    fn local_binding(&mut self, name: &str, span: Span, own_method_only: bool) -> Result<Option<Expr>> {
        let Some((depth, ty)) = self.find_local(name) else {
            return Ok(None);
        };
        let here = self.classes.len();
        if depth == here {
            return Ok(Some(Expr::new(ExprKind::Name { name: name.to_string(), binding: Some(Binding::Local) }, span)));
        }
        if own_method_only {
            return Ok(None);
        }
        for crossed in &self.classes[depth..] {
            let class = self.ctx.load(crossed)?;
            let mut class = class.borrow_mut();
            if !class.is_anonymous {
                return Err(Error::internal(format!("local '{}' captured by named class '{}'", name, crossed)))
                    .at(span);
            }
            if !class.captures.iter().any(|c| c.name == name) {
                log::trace!("{} captures '{}'", crossed.binary_name(), name);
                class.captures.push(CapturedVar { name: name.to_string(), ty: ty.clone() });
            }
        }
        self.note_capture(name, span)?;
        let class = self.classes[here - 1].clone();
        Ok(Some(Expr::new(
            ExprKind::Name { name: name.to_string(), binding: Some(Binding::Captured { class, ty }) },
            span,
        )))
    }

    /// Replacement for a bare identifier used as a variable, `None` if nothing matches
    fn resolve_variable(&mut self, name: &str, span: Span) -> Result<Option<Expr>> {
        if let Some(local) = self.local_binding(name, span, true)? {
            return Ok(Some(local));
        }
        let innermost = self.classes.len();
        for (index, class) in self.classes.clone().iter().enumerate().rev() {
            let Some(field) = self.ctx.find_field(class, name)? else {
                continue;
            };
            let target = if field.is_static() {
                type_name(field.owner.clone(), span)
            } else if index + 1 == innermost {
                Expr::new(ExprKind::This { qualifier: None }, span)
            } else {
                let qualifier = TypeRef::of(Type::Class(class.clone()), span);
                Expr::new(ExprKind::This { qualifier: Some(qualifier) }, span)
            };
            return Ok(Some(field_access(target, name, span)));
        }
        if let Some(captured) = self.local_binding(name, span, false)? {
            return Ok(Some(captured));
        }
        let imports: Vec<String> = self
            .ctx
            .unit(self.unit)
            .imports
            .statics_for(name)
            .map(|s| s.class_name.clone())
            .collect();
        for class_name in imports {
            let Some(owner) = self.ctx.resolve_qualified(&class_name)? else {
                return Err(Error::class_not_found(&class_name)).at(span);
            };
            if let Some(field) = self.ctx.find_field(&owner, name)? {
                if field.is_static() {
                    return Ok(Some(field_access(type_name(owner, span), name, span)));
                }
            }
        }
        Ok(None)
    }

    /// Classify a name used as the target of a member access
    fn classify(&mut self, expr: &mut Expr) -> Result<Naming> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Name { name, binding: None } => {
                let name = name.clone();
                if let Some(value) = self.resolve_variable(&name, span)? {
                    *expr = value;
                    return Ok(Naming::Value);
                }
                let enclosing = self.enclosing();
                if let Some(ty) = self.ctx.lookup_type_name(&name, &enclosing, self.unit).at(span)? {
                    *expr = type_name(ty.clone(), span);
                    return Ok(Naming::Type(ty));
                }
                if self.ctx.is_package(&name) {
                    expr.kind = ExprKind::PackageName(name.clone());
                    return Ok(Naming::Package(name));
                }
                Err(Error::symbol_not_found(&name)).at(span)
            }
            ExprKind::FieldAccess { target, name, .. } => {
                let name = name.clone();
                match self.classify(target)? {
                    Naming::Value => Ok(Naming::Value),
                    Naming::Type(owner) => {
                        if self.ctx.find_field(&owner, &name)?.is_some() {
                            return Ok(Naming::Value);
                        }
                        match self.ctx.find_member_type(&owner, &name)? {
                            Some(member) => {
                                *expr = type_name(member.clone(), span);
                                Ok(Naming::Type(member))
                            }
                            // Reported as a missing field by Type Propagation
                            None => Ok(Naming::Value),
                        }
                    }
                    Naming::Package(package) => {
                        let ty = ClassType::new(package.clone(), name.clone());
                        if self.ctx.try_load(&ty).at(span)?.is_some() {
                            *expr = type_name(ty.clone(), span);
                            return Ok(Naming::Type(ty));
                        }
                        let dotted = format!("{}.{}", package, name);
                        if self.ctx.is_package(&dotted) {
                            expr.kind = ExprKind::PackageName(dotted.clone());
                            return Ok(Naming::Package(dotted));
                        }
                        Err(Error::class_not_found(&dotted)).at(span)
                    }
                }
            }
            ExprKind::TypeName(ty) => match ty.ty()? {
                Type::Class(class) => Ok(Naming::Type(class.clone())),
                _ => Ok(Naming::Value),
            },
            ExprKind::PackageName(package) => Ok(Naming::Package(package.clone())),
            _ => {
                self.visit_expr(expr)?;
                Ok(Naming::Value)
            }
        }
    }

    fn anonymous_body(&mut self, body: &mut ClassDecl) -> Result<()> {
        self.classes.push(body.symbol()?.clone());
        let mut result = Ok(());
        for member in &mut body.body {
            result = self.visit_member(member);
            if result.is_err() {
                break;
            }
        }
        self.classes.pop();
        result
    }

    fn check_not_captured(target: &Expr) -> Result<()> {
        if let ExprKind::Name { name, binding: Some(Binding::Captured { .. }) } = &target.kind {
            return Err(Error::type_error(format!(
                "local variable '{}' is accessed from an inner class; it cannot be assigned",
                name
            )))
            .at(target.span);
        }
        Ok(())
    }

    fn with_params(&mut self, params: &[Parameter], body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        self.push_scope();
        let mut result = Ok(());
        for param in params {
            result = self.declare(&param.name, &param.ty, param.span);
            if result.is_err() {
                break;
            }
        }
        let result = result.and_then(|_| body(self));
        self.pop_scope();
        result
    }
}

impl VisitorMut for Scoping<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        if class.is_anonymous {
            return self.anonymous_body(class);
        }
        self.classes.push(class.symbol()?.clone());
        // Member types see no locals
        let scopes = std::mem::take(&mut self.scopes);
        let result = walk_class(self, class);
        self.scopes = scopes;
        self.classes.pop();
        result
    }

    fn visit_member(&mut self, member: &mut ClassMember) -> Result<()> {
        match member {
            ClassMember::Method(method) => {
                let params = method.params.clone();
                self.with_params(&params, |this| match &mut method.body {
                    Some(body) => this.visit_block(body),
                    None => Ok(()),
                })
            }
            ClassMember::Constructor(ctor) => {
                let params = ctor.params.clone();
                self.with_params(&params, |this| {
                    for stmt in &mut ctor.prologue {
                        this.visit_stmt(stmt)?;
                    }
                    if let Some(call) = &mut ctor.explicit_call {
                        if let Some(outer) = &mut call.outer {
                            this.visit_expr(outer)?;
                        }
                        for arg in &mut call.args {
                            this.visit_expr(arg)?;
                        }
                    }
                    this.visit_block(&mut ctor.body)
                })
            }
            _ => walk_member(self, member),
        }
    }

    fn visit_block(&mut self, block: &mut Block) -> Result<()> {
        self.push_scope();
        let result = walk_block(self, block);
        self.pop_scope();
        result
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::LocalVar(local) => {
                if let Some(init) = &mut local.init {
                    self.visit_expr(init)?;
                }
                self.declare_local(&local.name, &local.ty, local.init.is_none(), span)
            }
            StmtKind::For { init, cond, update, body, cond_setup } => {
                self.push_scope();
                let result = (|| {
                    for s in init.iter_mut() {
                        self.visit_stmt(s)?;
                    }
                    for s in cond_setup.iter_mut() {
                        self.visit_stmt(s)?;
                    }
                    if let Some(cond) = cond {
                        self.visit_expr(cond)?;
                    }
                    for s in update.iter_mut() {
                        self.visit_stmt(s)?;
                    }
                    self.visit_stmt(body)
                })();
                self.pop_scope();
                result
            }
            StmtKind::ForEach { var, iterable, body, item } => {
                self.visit_expr(iterable)?;
                self.push_scope();
                let result = (|| {
                    self.declare(&var.name, &var.ty, span)?;
                    if let Some(item) = item {
                        self.visit_expr(item)?;
                    }
                    self.visit_stmt(body)
                })();
                self.pop_scope();
                result
            }
            StmtKind::Switch { selector, cases } => {
                self.visit_expr(selector)?;
                self.push_scope();
                let result = (|| {
                    for case in cases.iter_mut() {
                        for label in &mut case.labels {
                            // A bare name that binds nothing may be an enum constant
                            if let ExprKind::Name { name, binding: None } = &label.expr.kind {
                                let name = name.clone();
                                if let Some(value) = self.resolve_variable(&name, label.expr.span)? {
                                    label.expr = value;
                                }
                                continue;
                            }
                            self.visit_expr(&mut label.expr)?;
                        }
                        for s in &mut case.body {
                            self.visit_stmt(s)?;
                        }
                    }
                    Ok(())
                })();
                self.pop_scope();
                result
            }
            StmtKind::Try { body, catches, finally } => {
                self.visit_block(body)?;
                for catch in catches.iter_mut() {
                    self.push_scope();
                    let result = self
                        .declare(&catch.name, &catch.ty, catch.span)
                        .and_then(|_| self.visit_block(&mut catch.body));
                    self.pop_scope();
                    result?;
                }
                if let Some(finally) = finally {
                    self.visit_block(finally)?;
                }
                Ok(())
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Name { name, binding: None } => {
                let name = name.clone();
                match self.resolve_variable(&name, span)? {
                    Some(value) => {
                        *expr = value;
                        Ok(())
                    }
                    None => Err(Error::symbol_not_found(&name)).at(span),
                }
            }
            ExprKind::FieldAccess { .. } => self.classify(expr).map(|_| ()),
            ExprKind::MethodCall { target, args, .. } => {
                if let Some(target) = target {
                    self.classify(target)?;
                }
                for arg in args.iter_mut() {
                    self.visit_expr(arg)?;
                }
                Ok(())
            }
            ExprKind::Assign { target, value, op, .. } => {
                let plain = op.is_none();
                self.visit_expr(target)?;
                Self::check_not_captured(target)?;
                self.visit_expr(value)?;
                self.note_assignment(target, plain)
            }
            ExprKind::IncDec { target, .. } => {
                self.visit_expr(target)?;
                Self::check_not_captured(target)?;
                self.note_assignment(target, false)
            }
            ExprKind::New { outer, args, body, captured, .. } => {
                if let Some(outer) = outer {
                    self.visit_expr(outer)?;
                }
                for arg in args.iter_mut() {
                    self.visit_expr(arg)?;
                }
                let Some(body) = body else {
                    return Ok(());
                };
                self.anonymous_body(body)?;
                let anon = body.symbol()?.clone();
                let captures = self.ctx.load(&anon)?.borrow().captures.clone();
                let mut values = Vec::with_capacity(captures.len());
                for capture in &captures {
                    match self.local_binding(&capture.name, span, false)? {
                        Some(value) => values.push(value),
                        None => {
                            return Err(Error::internal(format!("captured local '{}' is not in scope", capture.name)))
                                .at(span)
                        }
                    }
                }
                *captured = values;
                Ok(())
            }
            _ => walk_expr(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn scoped(source: &str) -> (CompilationContext, UnitId) {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/E.java", source);
        let unit = ctx.compile_root(Path::new("p/E.java")).unwrap();
        let mut ast = ctx.take_ast(unit).unwrap();
        ScopeResolver::new(unit).process(&mut ctx, &mut ast).unwrap();
        ctx.put_ast(unit, ast);
        (ctx, unit)
    }

    fn first_return(ctx: &CompilationContext, unit: UnitId, path: &[&str], method: &str) -> Expr {
        let ast = ctx.unit(unit).ast.as_ref().unwrap();
        let mut class = &ast.type_decls[0];
        for name in path {
            class = class.nested_types().find(|c| &c.name == name).unwrap();
        }
        class
            .body
            .iter()
            .find_map(|m| match m {
                ClassMember::Method(m) if m.name == method => m.body.as_ref(),
                _ => None,
            })
            .and_then(|b| {
                b.stmts.iter().find_map(|s| match &s.kind {
                    StmtKind::Return(Some(e)) => Some(e.clone()),
                    _ => None,
                })
            })
            .unwrap()
    }

    #[test]
    fn test_supertype_field_wins_over_enclosing_field() {
        let (ctx, unit) = scoped(
            "package p; class E { int f; static class A { int f; } class B extends A { int get() { return f; } } }",
        );
        let expr = first_return(&ctx, unit, &["B"], "get");
        let ExprKind::FieldAccess { target, name, .. } = &expr.kind else {
            panic!("expected field access, got {:?}", expr.kind);
        };
        assert_eq!(name, "f");
        assert!(matches!(target.kind, ExprKind::This { qualifier: None }));
    }

    #[test]
    fn test_enclosing_field_is_qualified() {
        let (ctx, unit) = scoped("package p; class E { int f; class B { int get() { return f; } } }");
        let expr = first_return(&ctx, unit, &["B"], "get");
        let ExprKind::FieldAccess { target, .. } = &expr.kind else {
            panic!("expected field access");
        };
        let ExprKind::This { qualifier: Some(q) } = &target.kind else {
            panic!("expected qualified this");
        };
        assert_eq!(q.resolved, Some(Type::Class(ClassType::new("p", "E"))));
    }

    #[test]
    fn test_locals_shadow_fields_and_dotted_names_classify() {
        let (ctx, unit) = scoped(
            "package p; class E { int f; int get(int f) { return f; } Object out() { return System.out; } }",
        );
        let local = first_return(&ctx, unit, &[], "get");
        assert!(matches!(local.kind, ExprKind::Name { binding: Some(Binding::Local), .. }));
        let out = first_return(&ctx, unit, &[], "out");
        let ExprKind::FieldAccess { target, .. } = &out.kind else {
            panic!("expected field access");
        };
        assert!(matches!(target.kind, ExprKind::TypeName(_)));
    }

    #[test]
    fn test_captured_locals_are_recorded() {
        let (mut ctx, _) = scoped(
            "package p; class E { Runnable make(final int n) { return new Runnable() { public void run() { int m = n; } }; } }",
        );
        let anon = ctx.load(&ClassType::new("p", "E").nested("1")).unwrap();
        let captures = anon.borrow().captures.clone();
        assert_eq!(captures, vec![CapturedVar { name: "n".to_string(), ty: Type::INT }]);
    }

    #[test]
    fn test_unknown_identifier() {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("A.java", "class A { int f() { return nope; } }");
        ctx.compile_root(Path::new("A.java")).unwrap();
        let err = ctx.drain().unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::SymbolNotFound));
    }

    fn scope_error(source: &str) -> crate::error::Error {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/E.java", source);
        let unit = ctx.compile_root(Path::new("p/E.java")).unwrap();
        let mut ast = ctx.take_ast(unit).unwrap();
        ScopeResolver::new(unit).process(&mut ctx, &mut ast).unwrap_err()
    }

    #[test]
    fn test_captured_local_reassigned_after_capture() {
        let err = scope_error(
            "package p; class E { Object m() { int n = 1; Object o = new Object() { int g() { return n; } }; n = 2; return o; } }",
        );
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::TypeError));
        assert!(err.to_string().contains("effectively final"), "{}", err);
    }

    #[test]
    fn test_captured_local_incremented_before_capture() {
        let err = scope_error(
            "package p; class E { Object m(int n) { n++; return new Object() { int g() { return n; } }; } }",
        );
        assert!(err.to_string().contains("effectively final: n"), "{}", err);
    }

    #[test]
    fn test_blank_local_assigned_once_can_be_captured() {
        let (mut ctx, _) = scoped(
            "package p; class E { Object m() { int n; n = 3; return new Object() { int g() { return n; } }; } }",
        );
        let anon = ctx.load(&ClassType::new("p", "E").nested("1")).unwrap();
        assert_eq!(anon.borrow().captures.len(), 1);
    }
}
