//! Structural rewrites
//!
//! Four passes over a fully typed unit, run in this order:
//!
//! - `constants`: inline reads of compile-time constant fields
//! - `enums`: synthesize the constant array, the static initializer of enum
//!   constants, `values()` and `valueOf(String)`, and the name/ordinal
//!   constructor parameters
//! - `effects`: move initializers into constructors and `<clinit>`, desugar
//!   enhanced `for`, and lift assignments and increments out of expressions
//! - `inner`: outer-instance and captured-local plumbing, private-member
//!   accessors
//!
//! Every pass leaves the tree fully typed, so running one twice is harmless.

pub mod constants;
pub mod effects;
pub mod enums;
pub mod inner;

use crate::ast::*;
use crate::common::compilation_context::CompilationContext;
use crate::common::env::{FieldRef, MethodRef};
use crate::common::types::{ClassType, Type};
use crate::error::{Error, Result};
use crate::parser::Span;

/// `Owner` used as the target of a static member access
pub(crate) fn type_name(owner: &ClassType, span: Span) -> Expr {
    let ty = Type::Class(owner.erased());
    Expr::typed(ExprKind::TypeName(TypeRef::of(ty.clone(), span)), ty, span)
}

pub(crate) fn field_access(target: Expr, field: FieldRef, span: Span) -> Expr {
    let ty = field.ty.clone();
    Expr::typed(
        ExprKind::FieldAccess { target: Box::new(target), name: field.name.clone(), field: Some(field) },
        ty,
        span,
    )
}

pub(crate) fn static_field(field: FieldRef, span: Span) -> Expr {
    let owner = field.owner.clone();
    field_access(type_name(&owner, span), field, span)
}

pub(crate) fn call(target: Option<Expr>, method: MethodRef, args: Vec<Expr>, ty: Type, span: Span) -> Expr {
    Expr::typed(
        ExprKind::MethodCall {
            target: target.map(Box::new),
            name: method.name.clone(),
            args,
            method: Some(method),
            is_super: false,
        },
        ty,
        span,
    )
}

/// `target = value;`
pub(crate) fn assign(target: Expr, value: Expr, span: Span) -> Result<Stmt> {
    let ty = target.ty()?.clone();
    Ok(Stmt::new(
        StmtKind::Expr(Expr::typed(
            ExprKind::Assign { op: None, target: Box::new(target), value: Box::new(value), op_type: None },
            ty,
            span,
        )),
        span,
    ))
}

pub(crate) fn local_var(name: &str, ty: Type, init: Option<Expr>, span: Span) -> Stmt {
    Stmt::new(
        StmtKind::LocalVar(LocalVar {
            modifiers: crate::common::flags::Modifiers::NONE,
            ty: TypeRef::of(ty, span),
            name: name.to_string(),
            init,
        }),
        span,
    )
}

pub(crate) fn field_named(ctx: &mut CompilationContext, owner: &ClassType, name: &str) -> Result<FieldRef> {
    ctx.find_field(owner, name)?
        .ok_or_else(|| Error::field_not_found(name, owner))
}

/// The method `owner.name` taking `arity` parameters
pub(crate) fn method_named(
    ctx: &mut CompilationContext,
    owner: &ClassType,
    name: &str,
    arity: usize,
) -> Result<MethodRef> {
    ctx.find_methods(owner, name)?
        .into_iter()
        .find(|m| m.sig.params.len() == arity)
        .ok_or_else(|| Error::method_not_found(format!("cannot find symbol: method {} in {}", name, owner)))
}
