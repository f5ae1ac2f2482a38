//! Conversion contexts
//!
//! Every implicit conversion becomes an explicit `Convert` node here, so later
//! stages never have to re-derive one:
//!
//! - primitive widening or narrowing: `Convert::Primitive`
//! - boxing: `Convert::Box` (lowered to `Wrapper.valueOf`)
//! - unboxing: `Convert::Unbox` (lowered to `xxxValue()`)
//! - downcasts and generic erasure casts: `Convert::Checkcast`
//!
//! Reference compatibility is decided on erased types.

use crate::ast::{Attrs, ConvertKind, Expr, ExprKind};
use crate::common::compilation_context::CompilationContext;
use crate::common::types::{PrimitiveType, Type};
use crate::error::{Error, Result};

/// Wrap `expr` in a conversion node whose type is `target`
pub fn convert(kind: ConvertKind, expr: Expr, target: Type) -> Expr {
    let constant = match (kind, &target) {
        (ConvertKind::Primitive, Type::Primitive(p)) => expr.attrs.constant.as_ref().and_then(|c| c.cast(*p)),
        _ => None,
    };
    let span = expr.span;
    Expr {
        kind: ExprKind::Convert { kind, expr: Box::new(expr) },
        span,
        attrs: Attrs { ty: Some(target), constant },
    }
}

/// Widening reference conversion (identity included) on erased types
pub fn reference_assignable(ctx: &mut CompilationContext, from: &Type, to: &Type) -> Result<bool> {
    let from = from.erasure();
    let to = to.erasure();
    if !from.is_reference() || !to.is_reference() {
        return Ok(false);
    }
    Ok(match (&from, &to) {
        (Type::Null, _) => true,
        (_, Type::Class(target)) if target.is_object() => true,
        (Type::Array(a), Type::Array(b)) => {
            if a.is_reference() && b.is_reference() {
                reference_assignable(ctx, a, b)?
            } else {
                a == b
            }
        }
        (Type::Class(a), Type::Class(b)) => ctx.is_subtype(a, b)?,
        _ => from == to,
    })
}

/// Whether a value of type `from` may be passed where `to` is expected
///
/// `boxing` selects between the strict and the loose invocation phase.
pub fn is_assignable(ctx: &mut CompilationContext, from: &Type, to: &Type, boxing: bool) -> Result<bool> {
    Ok(match (from, to) {
        (Type::Primitive(a), Type::Primitive(b)) => a.widens_to(*b),
        (Type::Primitive(a), _) => match a.boxed() {
            Some(wrapper) if boxing => reference_assignable(ctx, &Type::Class(wrapper), to)?,
            _ => false,
        },
        (_, Type::Primitive(b)) => match from.as_class().and_then(|c| c.unboxed()) {
            Some(p) if boxing => p.widens_to(*b),
            _ => false,
        },
        _ => reference_assignable(ctx, from, to)?,
    })
}

/// Implicit conversion of `expr` to `to`, or `None` if there is none
fn implicit(ctx: &mut CompilationContext, expr: Expr, to: &Type, boxing: bool) -> Result<std::result::Result<Expr, Expr>> {
    let from = expr.ty()?.clone();
    if &from == to {
        return Ok(Ok(expr));
    }
    match (&from, to) {
        (Type::Primitive(a), Type::Primitive(b)) => {
            if a.widens_to(*b) && a.is_numeric() {
                Ok(Ok(convert(ConvertKind::Primitive, expr, to.clone())))
            } else {
                Ok(Err(expr))
            }
        }
        (Type::Primitive(a), _) => {
            let Some(wrapper) = a.boxed().filter(|_| boxing) else {
                return Ok(Err(expr));
            };
            let wrapper = Type::Class(wrapper);
            if reference_assignable(ctx, &wrapper, to)? {
                Ok(Ok(convert(ConvertKind::Box, expr, wrapper)))
            } else {
                Ok(Err(expr))
            }
        }
        (_, Type::Primitive(b)) => {
            let Some(p) = from.as_class().and_then(|c| c.unboxed()).filter(|_| boxing) else {
                return Ok(Err(expr));
            };
            let unboxed = convert(ConvertKind::Unbox, expr, Type::Primitive(p));
            if p == *b {
                Ok(Ok(unboxed))
            } else if p.widens_to(*b) {
                Ok(Ok(convert(ConvertKind::Primitive, unboxed, to.clone())))
            } else {
                Ok(Err(unboxed))
            }
        }
        _ => {
            if reference_assignable(ctx, &from, to)? {
                Ok(Ok(expr))
            } else {
                Ok(Err(expr))
            }
        }
    }
}

fn incompatible(from: &Type, to: &Type) -> Error {
    match (from, to) {
        (Type::Primitive(a), Type::Primitive(b)) if a.is_numeric() && b.is_numeric() => Error::type_error(format!(
            "incompatible types: possible lossy conversion from {} to {}",
            from, to
        )),
        _ => Error::type_error(format!("incompatible types: {} cannot be converted to {}", from, to)),
    }
}

/// Assignment conversion, including narrowing of int-valued constants to
/// `byte`/`short`/`char` and their wrappers
pub fn assign(ctx: &mut CompilationContext, expr: Expr, to: &Type) -> Result<Expr> {
    let from = expr.ty()?.clone();
    if from.is_void() {
        return Err(Error::type_error("'void' type not allowed here"));
    }
    if let Some(narrowed) = narrow_constant(&expr, &from, to) {
        return Ok(narrowed);
    }
    match implicit(ctx, expr, to, true)? {
        Ok(converted) => Ok(converted),
        Err(_) => Err(incompatible(&from, to)),
    }
}

fn narrow_constant(expr: &Expr, from: &Type, to: &Type) -> Option<Expr> {
    let constant = expr.attrs.constant.as_ref()?;
    let int_valued = matches!(
        from.as_primitive(),
        Some(PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Char | PrimitiveType::Int)
    );
    if !int_valued {
        return None;
    }
    let (target, boxed) = match to {
        Type::Primitive(p) => (*p, false),
        Type::Class(c) => (c.unboxed()?, true),
        _ => return None,
    };
    if !matches!(target, PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Char) {
        return None;
    }
    if Some(target) == from.as_primitive() || !constant.fits_in(target) {
        return None;
    }
    let literal = Expr::literal(constant.cast(target)?, expr.span);
    Some(if boxed {
        convert(ConvertKind::Box, literal, to.clone())
    } else {
        literal
    })
}

/// Method invocation conversion; no constant narrowing
pub fn invocation(ctx: &mut CompilationContext, expr: Expr, to: &Type) -> Result<Expr> {
    let from = expr.ty()?.clone();
    match implicit(ctx, expr, to, true)? {
        Ok(converted) => Ok(converted),
        Err(_) => Err(incompatible(&from, to)),
    }
}

/// Explicit cast
pub fn cast(ctx: &mut CompilationContext, mut expr: Expr, to: &Type) -> Result<Expr> {
    let from = expr.ty()?.clone();
    if &from == to {
        return Ok(expr);
    }
    match (&from, to) {
        (Type::Primitive(a), Type::Primitive(b)) => {
            if a.is_numeric() && b.is_numeric() {
                Ok(convert(ConvertKind::Primitive, expr, to.clone()))
            } else {
                Err(incompatible(&from, to))
            }
        }
        (Type::Primitive(_), _) => match implicit(ctx, expr, to, true)? {
            Ok(converted) => Ok(converted),
            Err(_) => Err(incompatible(&from, to)),
        },
        (_, Type::Primitive(b)) => {
            if from.as_class().and_then(|c| c.unboxed()).is_some() {
                return match implicit(ctx, expr, to, true)? {
                    Ok(converted) => Ok(converted),
                    Err(_) => Err(incompatible(&from, to)),
                };
            }
            // `(int) object` checks against the wrapper, then unboxes
            let wrapper = b.boxed().ok_or_else(|| incompatible(&from, to))?;
            let wrapper = Type::Class(wrapper);
            if !reference_assignable(ctx, &wrapper, &from)? {
                return Err(incompatible(&from, to));
            }
            let checked = convert(ConvertKind::Checkcast, expr, wrapper);
            Ok(convert(ConvertKind::Unbox, checked, to.clone()))
        }
        _ => {
            if reference_assignable(ctx, &from, to)? {
                // Upcasts only change the static type
                expr.attrs.ty = Some(to.clone());
                if !to.is_string() {
                    expr.attrs.constant = None;
                }
                return Ok(expr);
            }
            if castable(ctx, &from, to)? {
                Ok(convert(ConvertKind::Checkcast, expr, to.clone()))
            } else {
                Err(incompatible(&from, to))
            }
        }
    }
}

/// Whether a downcast from `from` to `to` can succeed at run time
fn castable(ctx: &mut CompilationContext, from: &Type, to: &Type) -> Result<bool> {
    let (from, to) = (from.erasure(), to.erasure());
    match (&from, &to) {
        (Type::Class(a), Type::Class(b)) => {
            if ctx.is_subtype(b, a)? {
                return Ok(true);
            }
            let a_interface = ctx.load(a)?.borrow().is_interface();
            let b_interface = ctx.load(b)?.borrow().is_interface();
            Ok(a_interface || b_interface)
        }
        (Type::Class(a), Type::Array(_)) => Ok(a.is_object()),
        (Type::Array(a), Type::Array(b)) if a.is_reference() && b.is_reference() => castable(ctx, a, b),
        _ => Ok(false),
    }
}

/// Unbox a wrapper operand for a numeric or boolean context
pub fn unbox(expr: Expr) -> Result<Expr> {
    let ty = expr.ty()?.clone();
    match &ty {
        Type::Primitive(_) => Ok(expr),
        Type::Class(c) => match c.unboxed() {
            Some(p) => Ok(convert(ConvertKind::Unbox, expr, Type::Primitive(p))),
            None => Err(Error::type_error(format!("bad operand type {}", ty))),
        },
        _ => Err(Error::type_error(format!("bad operand type {}", ty))),
    }
}

/// Unbox if needed, then widen to `target`
pub fn to_primitive(expr: Expr, target: PrimitiveType) -> Result<Expr> {
    let expr = unbox(expr)?;
    match expr.ty()?.as_primitive() {
        Some(p) if p == target => Ok(expr),
        Some(p) if p.widens_to(target) => Ok(convert(ConvertKind::Primitive, expr, Type::Primitive(target))),
        _ => Err(Error::internal(format!("cannot widen operand to {}", target))),
    }
}

/// Insert the erasure cast for a value whose declared type was a type variable
pub fn erasure_cast(expr: Expr, declared: &Type, actual: &Type) -> Expr {
    if declared.erasure() == actual.erasure() || !actual.is_reference() {
        let mut expr = expr;
        expr.attrs.ty = Some(actual.clone());
        return expr;
    }
    let mut erased = expr;
    erased.attrs.ty = Some(declared.erasure());
    convert(ConvertKind::Checkcast, erased, actual.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constant::Constant;
    use crate::common::types::ClassType;
    use crate::config::Config;
    use crate::parser::Span;

    fn int(v: i32) -> Expr {
        Expr::literal(Constant::Int(v), Span::synthetic())
    }

    #[test]
    fn test_constant_narrowing_before_general_rules() {
        let mut ctx = CompilationContext::new(Config::default());
        let short = Type::Primitive(PrimitiveType::Short);
        let narrowed = assign(&mut ctx, int(2), &short).unwrap();
        assert!(matches!(narrowed.kind, ExprKind::Literal(Constant::Short(2))));
        let err = assign(&mut ctx, int(70000), &short).unwrap_err();
        assert!(err.to_string().contains("possible lossy conversion from int to short"));
    }

    #[test]
    fn test_boxing_and_unboxing_nodes() {
        let mut ctx = CompilationContext::new(Config::default());
        let object = Type::object();
        let boxed = assign(&mut ctx, int(1), &object).unwrap();
        assert!(matches!(boxed.kind, ExprKind::Convert { kind: ConvertKind::Box, .. }));
        assert_eq!(boxed.attrs.ty, Some(Type::Class(ClassType::java_lang("Integer"))));

        let integer = Expr::typed(ExprKind::Null, Type::Class(ClassType::java_lang("Integer")), Span::synthetic());
        let widened = assign(&mut ctx, integer, &Type::LONG).unwrap();
        let ExprKind::Convert { kind: ConvertKind::Primitive, expr } = &widened.kind else {
            panic!("expected widening");
        };
        assert!(matches!(expr.kind, ExprKind::Convert { kind: ConvertKind::Unbox, .. }));
    }

    #[test]
    fn test_reference_assignability() {
        let mut ctx = CompilationContext::new(Config::default());
        let string = Type::string();
        let chars = Type::Class(ClassType::java_lang("CharSequence"));
        assert!(reference_assignable(&mut ctx, &string, &chars).unwrap());
        assert!(!reference_assignable(&mut ctx, &chars, &string).unwrap());
        assert!(reference_assignable(&mut ctx, &Type::array_of(string.clone()), &Type::object()).unwrap());
        assert!(!is_assignable(&mut ctx, &Type::INT, &Type::object(), false).unwrap());
        assert!(is_assignable(&mut ctx, &Type::INT, &Type::object(), true).unwrap());
    }
}
