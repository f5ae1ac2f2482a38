//! Inner and anonymous classes
//!
//! - every inner class gets a synthetic `this$0` field, stored from a leading
//!   constructor parameter before the superclass constructor runs; `Outer.this`
//!   becomes a chain of `this$0` reads
//! - anonymous classes get one `val$x` field per captured local, stored from
//!   trailing constructor parameters; reads of the local become field reads
//! - `new` expressions and explicit constructor calls pass the outer instance
//!   and captured values as ordinary arguments
//! - anonymous class bodies move out of their `new` expression and become
//!   nested members of the enclosing class
//! - private members used from another class of the same nest are reached
//!   through static package-visible accessors, synthesized once per member;
//!   private constructors used that way lose their `private` flag

use crate::ast::*;
use crate::common::compilation_context::CompilationContext;
use crate::common::env::{Accessor, AccessorKey, FieldRef, FieldSymbol, MethodRef, MethodSymbol};
use crate::common::flags::{access_flags::*, Modifiers};
use crate::common::types::{ClassType, FunctionType, Type};
use crate::consts::{ACCESSOR_PREFIX, CAPTURED_FIELD_PREFIX, OUTER_THIS_FIELD};
use crate::error::{Error, Result, ResultExt};
use crate::parser::Span;
use crate::wash::rewrite::{assign, call, field_access, static_field, type_name};

pub struct InnerClasses;

impl InnerClasses {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        let mut rewriter = Rewriter { ctx, frames: Vec::new(), in_ctor_call: false, generated: Vec::new() };
        walk_ast(&mut rewriter, ast)?;
        for (owner, method) in rewriter.generated {
            let span = method.span;
            let decl = ast
                .type_decls
                .iter_mut()
                .find_map(|decl| find_decl(decl, &owner))
                .ok_or_else(|| Error::internal(format!("no declaration for '{}' in this unit", owner)))
                .at(span)?;
            decl.body.push(ClassMember::Method(method));
        }
        Ok(())
    }
}

impl Default for InnerClasses {
    fn default() -> Self {
        Self::new()
    }
}

fn find_decl<'a>(decl: &'a mut ClassDecl, ty: &ClassType) -> Option<&'a mut ClassDecl> {
    if decl.symbol.as_ref() == Some(ty) {
        return Some(decl);
    }
    decl.nested_types_mut().find_map(|nested| find_decl(nested, ty))
}

fn synthetic_field(owner: &ClassType, name: &str, ty: Type) -> FieldRef {
    FieldRef {
        owner: owner.clone(),
        name: name.to_string(),
        ty,
        flags: Modifiers::new(ACC_FINAL | ACC_SYNTHETIC),
    }
}

fn synthetic_param(name: &str, ty: Type, span: Span) -> Parameter {
    Parameter {
        modifiers: Modifiers::new(ACC_FINAL | ACC_SYNTHETIC),
        ty: TypeRef::of(ty, span),
        name: name.to_string(),
        span,
    }
}

fn take(expr: &mut Expr) -> Expr {
    let span = expr.span;
    std::mem::replace(expr, Expr::new(ExprKind::Null, span))
}

struct Frame {
    ty: ClassType,
    /// Anonymous class bodies to add as members once the class is done
    hoisted: Vec<ClassDecl>,
}

struct Rewriter<'a> {
    ctx: &'a mut CompilationContext,
    /// Lexically enclosing classes, innermost last
    frames: Vec<Frame>,
    /// Inside the arguments of `this(...)`/`super(...)`
    in_ctor_call: bool,
    /// Accessor methods to add to their owner's declaration
    generated: Vec<(ClassType, MethodDecl)>,
}

impl Rewriter<'_> {
    fn current(&self) -> Result<&ClassType> {
        self.frames
            .last()
            .map(|f| &f.ty)
            .ok_or_else(|| Error::internal("expression outside of any class"))
    }

    /// Whether a private member of `owner` used here needs an accessor
    fn crosses(&self, owner: &ClassType) -> Result<bool> {
        Ok(self.current()? != &owner.erased())
    }

    /// Outer-instance field and captured-local plumbing of one class
    fn prepare(&mut self, decl: &mut ClassDecl, ty: &ClassType) -> Result<()> {
        let span = decl.span;
        let class = self.ctx.load(ty)?;
        let (is_inner, captures) = {
            let class = class.borrow();
            (class.is_inner && class.field(OUTER_THIS_FIELD).is_none(), class.captures.clone())
        };

        if is_inner {
            let outer = ty
                .outer()
                .ok_or_else(|| Error::internal(format!("inner class '{}' has no outer class", ty)))?;
            let outer_ty = Type::Class(outer);
            let field = synthetic_field(ty, OUTER_THIS_FIELD, outer_ty.clone());
            class.borrow_mut().add_field(FieldSymbol::new(OUTER_THIS_FIELD, outer_ty.clone(), field.flags, ty.clone()));
            for ctor in decl.constructors_mut() {
                ctor.params.insert(0, synthetic_param(OUTER_THIS_FIELD, outer_ty.clone(), span));
                let value = Expr::local(OUTER_THIS_FIELD, outer_ty.clone(), span);
                match &mut ctor.explicit_call {
                    Some(call) if call.kind == CtorCallKind::This => call.args.insert(0, value),
                    _ => {
                        let target = field_access(Expr::this(ty.clone(), span), field.clone(), span);
                        ctor.prologue.insert(0, assign(target, value, span)?);
                    }
                }
            }
            log::debug!("{} stores its outer instance", ty.binary_name());
        }

        let fresh = captures
            .first()
            .map(|c| class.borrow().field(&format!("{}{}", CAPTURED_FIELD_PREFIX, c.name)).is_none())
            .unwrap_or(false);
        if fresh {
            let mut class = class.borrow_mut();
            for capture in &captures {
                let name = format!("{}{}", CAPTURED_FIELD_PREFIX, capture.name);
                class.add_field(FieldSymbol::new(
                    name,
                    capture.ty.clone(),
                    Modifiers::new(ACC_FINAL | ACC_SYNTHETIC),
                    ty.clone(),
                ));
            }
            let types: Vec<Type> = captures.iter().map(|c| c.ty.clone()).collect();
            for method in class.methods.iter_mut().filter(|m| m.is_constructor) {
                method.trailing = types.clone();
            }
            drop(class);
            for ctor in decl.constructors_mut() {
                for capture in &captures {
                    let name = format!("{}{}", CAPTURED_FIELD_PREFIX, capture.name);
                    ctor.params.push(synthetic_param(&name, capture.ty.clone(), span));
                    let field = synthetic_field(ty, &name, capture.ty.clone());
                    let target = field_access(Expr::this(ty.clone(), span), field, span);
                    ctor.prologue.push(assign(target, Expr::local(&name, capture.ty.clone(), span), span)?);
                }
            }
            log::debug!("{} captures {} locals", ty.binary_name(), captures.len());
        }
        Ok(())
    }

    /// The instance of the enclosing class `target`, reached from the current class
    fn instance_of(&self, target: &ClassType, span: Span) -> Result<Expr> {
        let target = target.erased();
        let current = self.frames.len().saturating_sub(1);
        let index = self
            .frames
            .iter()
            .rposition(|f| f.ty == target)
            .ok_or_else(|| Error::internal(format!("'{}' does not enclose this code", target)))?;
        let mut expr = Expr::this(self.frames[current].ty.clone(), span);
        for i in (index + 1..=current).rev() {
            let outer = Type::Class(self.frames[i - 1].ty.clone());
            expr = if i == current && self.in_ctor_call {
                // `this` is not usable yet; the parameter holds the same value
                Expr::local(OUTER_THIS_FIELD, outer, span)
            } else {
                field_access(expr, synthetic_field(&self.frames[i].ty, OUTER_THIS_FIELD, outer), span)
            };
        }
        Ok(expr)
    }

    fn widen(&mut self, ctor: &mut MethodRef) -> Result<()> {
        if !ctor.flags.is_private() || !self.crosses(&ctor.owner)? {
            return Ok(());
        }
        let class = self.ctx.load(&ctor.owner)?;
        let descriptor = ctor.sig.erased().descriptor();
        for method in class
            .borrow_mut()
            .methods
            .iter_mut()
            .filter(|m| m.is_constructor && m.sig.erased().descriptor() == descriptor)
        {
            method.flags.remove(ACC_PRIVATE);
        }
        ctor.flags.remove(ACC_PRIVATE);
        log::debug!("widened private constructor {}{}", ctor.owner.binary_name(), descriptor);
        Ok(())
    }

    /// Static bridge `owner.access$NNN`, synthesized on first use
    fn accessor(
        &mut self,
        owner: &ClassType,
        key: AccessorKey,
        sig: FunctionType,
        span: Span,
        body: impl FnOnce(&[Expr]) -> Result<Vec<Stmt>>,
    ) -> Result<MethodRef> {
        let owner = owner.erased();
        let class = self.ctx.load(&owner)?;
        let (kind, existing, index) = {
            let class = class.borrow();
            let existing = class
                .accessors
                .iter()
                .find(|a| a.key == key)
                .and_then(|a| class.methods_named(&a.name).next())
                .map(|m| m.to_ref(class.kind));
            let index = match class.accessors.iter().find(|a| a.key.same_member(&key)) {
                Some(sibling) => sibling.index,
                None => class.accessors.iter().map(|a| a.index + 1).max().unwrap_or(0),
            };
            (class.kind, existing, index)
        };
        if let Some(method) = existing {
            return Ok(method);
        }

        let code = if matches!(key, AccessorKey::Write(_)) { 2 } else { 0 };
        let name = format!("{}{}{:02}", ACCESSOR_PREFIX, index, code);
        let params: Vec<(String, Type)> =
            sig.params.iter().enumerate().map(|(i, ty)| (format!("x{}", i), ty.clone())).collect();
        let reads: Vec<Expr> = params.iter().map(|(name, ty)| Expr::local(name, ty.clone(), span)).collect();
        let stmts = body(&reads)?;

        let flags = Modifiers::new(ACC_STATIC | ACC_SYNTHETIC);
        let symbol = MethodSymbol::new(name.clone(), sig.clone(), flags, owner.clone());
        let method = symbol.to_ref(kind);
        {
            let mut class = class.borrow_mut();
            class.add_method(symbol);
            class.accessors.push(Accessor { key, index, name: name.clone(), sig: sig.clone() });
        }
        self.generated.push((
            owner.clone(),
            MethodDecl {
                modifiers: flags,
                type_params: Vec::new(),
                return_type: TypeRef::of((*sig.return_type).clone(), span),
                name: name.clone(),
                params: params.into_iter().map(|(name, ty)| synthetic_param(&name, ty, span)).collect(),
                throws: Vec::new(),
                body: Some(Block::new(stmts, span)),
                span,
            },
        ));
        log::debug!("accessor {}.{}{}", owner.binary_name(), name, sig.descriptor());
        Ok(method)
    }

    fn read_accessor(&mut self, target: Expr, field: FieldRef, ty: Type, span: Span) -> Result<Expr> {
        let owner = field.owner.erased();
        let params = if field.is_static() { Vec::new() } else { vec![Type::Class(owner.clone())] };
        let sig = FunctionType::new(field.ty.erasure(), params);
        let read = field.clone();
        let method = self.accessor(&owner, AccessorKey::Read(field.name.clone()), sig, span, |params| {
            let value = match params.first() {
                Some(object) => field_access(object.clone(), read, span),
                None => static_field(read, span),
            };
            Ok(vec![Stmt::new(StmtKind::Return(Some(value)), span)])
        })?;
        let args = if field.is_static() { Vec::new() } else { vec![target] };
        Ok(call(Some(type_name(&owner, span)), method, args, ty, span))
    }

    fn write_accessor(&mut self, target: Expr, field: FieldRef, value: Expr, span: Span) -> Result<Expr> {
        let owner = field.owner.erased();
        let erased = field.ty.erasure();
        let mut params = if field.is_static() { Vec::new() } else { vec![Type::Class(owner.clone())] };
        params.push(erased.clone());
        let sig = FunctionType::new(erased, params);
        let written = field.clone();
        let method = self.accessor(&owner, AccessorKey::Write(field.name.clone()), sig, span, |params| {
            let (place, value) = match params {
                [object, value] => (field_access(object.clone(), written, span), value.clone()),
                [value] => (static_field(written, span), value.clone()),
                _ => return Err(Error::internal("field writer takes one or two parameters")),
            };
            Ok(vec![assign(place, value.clone(), span)?, Stmt::new(StmtKind::Return(Some(value)), span)])
        })?;
        let mut args = if field.is_static() { Vec::new() } else { vec![target] };
        args.push(value);
        Ok(call(Some(type_name(&owner, span)), method, args, field.ty.clone(), span))
    }

    fn invoke_accessor(&mut self, target: Option<Expr>, method: MethodRef, args: Vec<Expr>, ty: Type, span: Span) -> Result<Expr> {
        let owner = method.owner.erased();
        let jvm = method.jvm_signature();
        let mut params = if method.is_static() { Vec::new() } else { vec![Type::Class(owner.clone())] };
        params.extend(jvm.params.iter().cloned());
        let sig = FunctionType::new((*jvm.return_type).clone(), params);
        let key = AccessorKey::Invoke { name: method.name.clone(), descriptor: method.descriptor() };
        let invoked = method.clone();
        let returns = (*jvm.return_type).clone();
        let accessor = self.accessor(&owner, key, sig, span, |params| {
            let (receiver, rest) = if invoked.is_static() {
                (type_name(&invoked.owner, span), params)
            } else {
                match params.split_first() {
                    Some((receiver, rest)) => (receiver.clone(), rest),
                    None => return Err(Error::internal("instance method accessor without receiver")),
                }
            };
            let inner = call(Some(receiver), invoked, rest.to_vec(), returns.clone(), span);
            Ok(if returns.is_void() {
                vec![Stmt::expr(inner), Stmt::new(StmtKind::Return(None), span)]
            } else {
                vec![Stmt::new(StmtKind::Return(Some(inner)), span)]
            })
        })?;
        let mut full = Vec::with_capacity(args.len() + 1);
        if !method.is_static() {
            let receiver = target.ok_or_else(|| Error::internal("instance call without receiver"))?;
            full.push(receiver);
        }
        full.extend(args);
        Ok(call(Some(type_name(&owner, span)), accessor, full, ty, span))
    }

    fn new_instance(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let current = self.current()?.clone();
        let ExprKind::New { class, outer, args, body, ctor, captured } = &mut expr.kind else {
            return Ok(());
        };
        if let Some(outer) = outer {
            self.visit_expr(outer)?;
        }
        for arg in args.iter_mut().chain(captured.iter_mut()) {
            self.visit_expr(arg)?;
        }

        let mut full = Vec::new();
        if let Some(body) = body.as_deref_mut() {
            let anon = body.symbol()?.clone();
            if self.ctx.load(&anon)?.borrow().is_inner {
                full.push(Expr::this(current, span));
            }
            self.visit_class(body)?;
            *class = TypeRef::of(Type::Class(anon), span);
        }
        if let Some(outer) = outer.take() {
            full.push(*outer);
        }
        full.append(args);
        full.append(captured);
        *args = full;
        if let Some(ctor) = ctor {
            self.widen(ctor)?;
        }
        if let Some(body) = body.take() {
            if let Some(frame) = self.frames.last_mut() {
                frame.hoisted.push(*body);
            }
        }
        Ok(())
    }

    fn assignment(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::Assign { target, value, .. } = &mut expr.kind else {
            return Ok(());
        };
        // The target is written, only its parts are read
        match &mut target.kind {
            ExprKind::FieldAccess { target: object, .. } => self.visit_expr(object)?,
            ExprKind::Name { .. } => {}
            _ => self.visit_expr(target)?,
        }
        self.visit_expr(value)?;

        let private = match &target.kind {
            ExprKind::FieldAccess { field: Some(field), .. } if field.flags.is_private() => {
                self.crosses(&field.owner)?
            }
            _ => false,
        };
        if !private {
            return Ok(());
        }
        let ExprKind::Assign { target, value, .. } = take(expr).kind else {
            return Err(Error::internal("assignment changed shape"));
        };
        let ExprKind::FieldAccess { target: object, field: Some(field), .. } = target.kind else {
            return Err(Error::internal("assignment target changed shape"));
        };
        *expr = self.write_accessor(*object, field, *value, span)?;
        Ok(())
    }
}

impl VisitorMut for Rewriter<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        let ty = class.symbol()?.clone();
        self.prepare(class, &ty).at(class.span)?;
        self.frames.push(Frame { ty, hoisted: Vec::new() });
        let saved = std::mem::replace(&mut self.in_ctor_call, false);
        let mut result = Ok(());
        for member in &mut class.body {
            result = self.visit_member(member);
            if result.is_err() {
                break;
            }
        }
        self.in_ctor_call = saved;
        let frame = self.frames.pop();
        result?;
        if let Some(frame) = frame {
            for hoisted in frame.hoisted {
                // Initializer code copied into several constructors carries the same body
                let known = class.nested_types().any(|n| n.symbol == hoisted.symbol);
                if !known {
                    class.body.push(ClassMember::Type(hoisted));
                }
            }
        }
        Ok(())
    }

    fn visit_member(&mut self, member: &mut ClassMember) -> Result<()> {
        let ClassMember::Constructor(ctor) = member else {
            return walk_member(self, member);
        };
        let span = ctor.span;
        for stmt in &mut ctor.prologue {
            self.visit_stmt(stmt)?;
        }
        if let Some(call) = &mut ctor.explicit_call {
            let saved = std::mem::replace(&mut self.in_ctor_call, true);
            let mut result = Ok(());
            if let Some(outer) = &mut call.outer {
                result = self.visit_expr(outer);
            }
            for arg in &mut call.args {
                result = result.and_then(|_| self.visit_expr(arg));
            }
            self.in_ctor_call = saved;
            result.at(span)?;
            if let Some(outer) = call.outer.take() {
                call.args.insert(0, *outer);
            }
            if let Some(method) = &mut call.ctor {
                self.widen(method).at(span)?;
            }
        }
        self.visit_block(&mut ctor.body)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::New { .. } => return self.new_instance(expr).at(span),
            ExprKind::Assign { .. } => return self.assignment(expr).at(span),
            _ => walk_expr(self, expr)?,
        }

        match &expr.kind {
            ExprKind::This { qualifier: Some(qualifier) } => {
                let target = qualifier
                    .ty()?
                    .as_class()
                    .cloned()
                    .ok_or_else(|| Error::internal("qualified this names a non-class"))
                    .at(span)?;
                *expr = self.instance_of(&target, span).at(span)?;
            }
            ExprKind::Name { name, binding: Some(Binding::Captured { class, ty }) } => {
                let field = synthetic_field(class, &format!("{}{}", CAPTURED_FIELD_PREFIX, name), ty.clone());
                let instance = self.instance_of(class, span).at(span)?;
                *expr = field_access(instance, field, span);
            }
            ExprKind::FieldAccess { field: Some(field), .. }
                if field.flags.is_private() && self.crosses(&field.owner)? =>
            {
                let ty = expr.ty()?.clone();
                let ExprKind::FieldAccess { target, field: Some(field), .. } = take(expr).kind else {
                    return Err(Error::internal("field access changed shape"));
                };
                *expr = self.read_accessor(*target, field, ty, span).at(span)?;
            }
            ExprKind::MethodCall { method: Some(method), .. }
                if method.flags.is_private() && self.crosses(&method.owner)? =>
            {
                let ty = expr.ty()?.clone();
                let ExprKind::MethodCall { target, args, method: Some(method), .. } = take(expr).kind else {
                    return Err(Error::internal("method call changed shape"));
                };
                *expr = self.invoke_accessor(target.map(|t| *t), method, args, ty, span).at(span)?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn rewritten(source: &str) -> (CompilationContext, Ast) {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        let unit = ctx.compile_root(Path::new("p/A.java")).unwrap();
        let mut ast = ctx.take_ast(unit).unwrap();
        crate::wash::scope::ScopeResolver::new(unit).process(&mut ctx, &mut ast).unwrap();
        crate::wash::attr::Attr::new(unit).process(&mut ctx, &mut ast).unwrap();
        crate::wash::rewrite::constants::ConstantPropagation::new().process(&mut ctx, &mut ast).unwrap();
        crate::wash::rewrite::enums::EnumDesugar::new().process(&mut ctx, &mut ast).unwrap();
        crate::wash::rewrite::effects::EffectNormalizer::new().process(&mut ctx, &mut ast).unwrap();
        InnerClasses::new().process(&mut ctx, &mut ast).unwrap();
        (ctx, ast)
    }

    fn class<'a>(ast: &'a Ast, path: &[&str]) -> &'a ClassDecl {
        let mut decl = &ast.type_decls[0];
        for name in path {
            decl = decl
                .nested_types()
                .find(|n| n.symbol.as_ref().map(|s| s.simple_name()) == Some(*name))
                .unwrap();
        }
        decl
    }

    fn body<'a>(decl: &'a ClassDecl, method: &str) -> &'a [Stmt] {
        decl.body
            .iter()
            .find_map(|m| match m {
                ClassMember::Method(m) if m.name == method => m.body.as_ref(),
                _ => None,
            })
            .map(|b| b.stmts.as_slice())
            .unwrap()
    }

    fn returned(stmts: &[Stmt]) -> &Expr {
        stmts
            .iter()
            .find_map(|s| match &s.kind {
                StmtKind::Return(Some(value)) => Some(value),
                _ => None,
            })
            .unwrap()
    }

    fn constructor<'a>(decl: &'a ClassDecl) -> &'a ConstructorDecl {
        decl.body
            .iter()
            .find_map(|m| match m {
                ClassMember::Constructor(c) => Some(c),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_inner_class_stores_outer_instance() {
        let (ctx, ast) = rewritten(
            "package p; class A { int x; class B { int m() { return x; } } void n() { B b = new B(); } }",
        );
        let b = class(&ast, &["B"]);
        let ctor = constructor(b);
        assert_eq!(ctor.params[0].name, OUTER_THIS_FIELD);
        assert_eq!(ctor.prologue.len(), 1);

        let ExprKind::FieldAccess { target, name, .. } = &returned(body(b, "m")).kind else { panic!("expected a field read") };
        assert_eq!(name, "x");
        assert!(matches!(&target.kind, ExprKind::FieldAccess { name, .. } if name == OUTER_THIS_FIELD));

        let StmtKind::LocalVar(local) = &body(&ast.type_decls[0], "n")[0].kind else { panic!("expected a local") };
        let ExprKind::New { args, outer, .. } = &local.init.as_ref().unwrap().kind else { panic!("expected new") };
        assert!(outer.is_none());
        assert!(matches!(args[0].kind, ExprKind::This { qualifier: None }));

        let symbol = ctx.get(&ClassType::new("p", "A").nested("B")).unwrap();
        assert!(symbol.borrow().field(OUTER_THIS_FIELD).is_some());
    }

    #[test]
    fn test_private_field_reads_share_one_accessor() {
        let (ctx, ast) = rewritten(
            "package p; class A { private int secret; class B { int m() { return secret; } int k() { return secret + 1; } } }",
        );
        let a = ctx.get(&ClassType::new("p", "A")).unwrap();
        assert_eq!(a.borrow().accessors.len(), 1);
        assert_eq!(a.borrow().accessors[0].key, AccessorKey::Read("secret".to_string()));
        assert!(a.borrow().field("secret").unwrap().flags.is_private());

        let accessors: Vec<&MethodDecl> = ast.type_decls[0]
            .body
            .iter()
            .filter_map(|m| match m {
                ClassMember::Method(m) if m.name.starts_with(ACCESSOR_PREFIX) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(accessors.len(), 1);
        assert!(accessors[0].modifiers.is_static());

        let b = class(&ast, &["B"]);
        let ExprKind::MethodCall { name, args, .. } = &returned(body(b, "m")).kind else { panic!("expected a call") };
        assert_eq!(name, &accessors[0].name);
        assert!(matches!(&args[0].kind, ExprKind::FieldAccess { name, .. } if name == OUTER_THIS_FIELD));
    }

    #[test]
    fn test_private_write_and_call_get_accessors() {
        let (ctx, ast) = rewritten(
            "package p; class A { private int s; private int f(int v) { return v; } class B { void m() { s = f(2); } } }",
        );
        let a = ctx.get(&ClassType::new("p", "A")).unwrap();
        let keys: Vec<AccessorKey> = a.borrow().accessors.iter().map(|a| a.key.clone()).collect();
        assert!(keys.contains(&AccessorKey::Write("s".to_string())));
        assert!(keys.iter().any(|k| matches!(k, AccessorKey::Invoke { name, .. } if name == "f")));

        let StmtKind::Expr(write) = &body(class(&ast, &["B"]), "m")[0].kind else { panic!("expected a statement") };
        let ExprKind::MethodCall { args, .. } = &write.kind else { panic!("expected the writer") };
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[1].kind, ExprKind::MethodCall { name, .. } if name.starts_with(ACCESSOR_PREFIX)));
    }

    #[test]
    fn test_read_and_write_of_one_field_share_a_number() {
        let (ctx, _) = rewritten(
            "package p; class A { private int x; private int y; class B { void m() { x = 1; int a = y; int b = x; } } }",
        );
        let a = ctx.get(&ClassType::new("p", "A")).unwrap();
        let names: Vec<String> = a.borrow().accessors.iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["access$002", "access$100", "access$000"]);
    }

    #[test]
    fn test_anonymous_class_captures_and_is_hoisted() {
        let (ctx, ast) = rewritten(
            "package p; class A { Object m(final int n) { return new Object() { int get() { return n; } }; } }",
        );
        let anon_ty = ClassType::new("p", "A").nested("1");
        let anon = class(&ast, &["1"]);
        let ctor = constructor(anon);
        let names: Vec<&str> = ctor.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![OUTER_THIS_FIELD, "val$n"]);
        assert_eq!(ctor.prologue.len(), 2);

        let ExprKind::FieldAccess { name, .. } = &returned(body(anon, "get")).kind else { panic!("expected a field read") };
        assert_eq!(name, "val$n");

        let ExprKind::New { class: created, body, args, captured, .. } = &returned(body(&ast.type_decls[0], "m")).kind else {
            panic!("expected new")
        };
        assert!(body.is_none());
        assert!(captured.is_empty());
        assert_eq!(args.len(), 2);
        assert_eq!(created.resolved, Some(Type::Class(anon_ty.clone())));

        let symbol = ctx.get(&anon_ty).unwrap();
        let symbol = symbol.borrow();
        assert_eq!(symbol.constructors().next().unwrap().trailing, vec![Type::INT]);
        assert!(symbol.field("val$n").is_some());
    }

    #[test]
    fn test_qualified_this_walks_outer_chain() {
        let (_, ast) = rewritten("package p; class A { class B { class C { A a() { return A.this; } } } }");
        let c = class(&ast, &["B", "C"]);
        let ExprKind::FieldAccess { target, name, .. } = &returned(body(c, "a")).kind else { panic!("expected a field read") };
        assert_eq!(name, OUTER_THIS_FIELD);
        let ExprKind::FieldAccess { target: inner, .. } = &target.kind else { panic!("expected a second hop") };
        assert!(matches!(inner.kind, ExprKind::This { qualifier: None }));
    }

    #[test]
    fn test_rerun_is_harmless() {
        let (mut ctx, mut ast) = rewritten(
            "package p; class A { private int s; Object m(final int n) { return new Object() { int g() { return n + s; } }; } }",
        );
        let before = format!("{:?}", ast);
        InnerClasses::new().process(&mut ctx, &mut ast).unwrap();
        assert_eq!(format!("{:?}", ast), before);
    }
}
