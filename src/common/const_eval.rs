//! Lazy evaluation of constant field initializers
//!
//! Initializers are evaluated straight from the syntax tree as it stands after
//! type resolution, so a constant can be read by another unit long before the
//! declaring unit reaches Type Propagation. Names are looked up the same way the
//! scope pass would for a static context: the declaring class and its
//! supertypes, then enclosing classes outward, then static imports.

use crate::ast::{BinaryOp, Expr, ExprKind};
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::constant::{fold_binary, fold_unary, Constant};
use crate::common::types::{ClassType, PrimitiveType, Type};
use crate::error::Result;

pub struct ConstEvaluator {
    unit: UnitId,
    scope: ClassType,
}

impl ConstEvaluator {
    pub fn new(unit: UnitId, scope: ClassType) -> Self {
        Self { unit, scope }
    }

    /// Value of `expr`, or `None` if it is not a constant expression
    pub fn eval(&self, ctx: &mut CompilationContext, expr: &Expr) -> Result<Option<Constant>> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(Some(value.clone())),
            ExprKind::Name { name, .. } => self.name_value(ctx, name),
            ExprKind::FieldAccess { target, name, .. } => match self.target_type(ctx, target)? {
                Some(owner) => self.static_field_value(ctx, &owner, name),
                None => Ok(None),
            },
            ExprKind::Unary { op, operand } => {
                Ok(self.eval(ctx, operand)?.and_then(|v| fold_unary(*op, &v)))
            }
            ExprKind::Binary { op, left, right } => {
                let Some(l) = self.eval(ctx, left)? else {
                    return Ok(None);
                };
                let Some(r) = self.eval(ctx, right)? else {
                    return Ok(None);
                };
                let op = match op {
                    BinaryOp::Add if is_string(&l) || is_string(&r) => BinaryOp::Concat,
                    other => *other,
                };
                if op != BinaryOp::Concat && (is_string(&l) || is_string(&r)) {
                    // `==` on strings is a reference comparison, never a constant
                    return Ok(None);
                }
                Ok(fold_binary(op, &l, &r))
            }
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                let Some(Constant::Boolean(cond)) = self.eval(ctx, cond)? else {
                    return Ok(None);
                };
                let Some(then_value) = self.eval(ctx, then_expr)? else {
                    return Ok(None);
                };
                let Some(else_value) = self.eval(ctx, else_expr)? else {
                    return Ok(None);
                };
                let chosen = if cond { then_value.clone() } else { else_value.clone() };
                match (then_value.primitive(), else_value.primitive()) {
                    (Some(a), Some(b)) if a != b && a.is_numeric() && b.is_numeric() => {
                        Ok(PrimitiveType::binary_promote(a, b).and_then(|p| chosen.cast(p)))
                    }
                    _ => Ok(Some(chosen)),
                }
            }
            ExprKind::Cast { ty, expr } => {
                let Some(value) = self.eval(ctx, expr)? else {
                    return Ok(None);
                };
                Ok(match ty.resolved.as_ref() {
                    Some(Type::Primitive(p)) => value.cast(*p),
                    Some(t) if t.is_string() && is_string(&value) => Some(value),
                    _ => None,
                })
            }
            _ => Ok(None),
        }
    }

    fn enclosing(&self) -> Vec<ClassType> {
        let mut chain = vec![self.scope.clone()];
        while let Some(outer) = chain.last().and_then(ClassType::outer) {
            chain.push(outer);
        }
        chain
    }

    fn name_value(&self, ctx: &mut CompilationContext, name: &str) -> Result<Option<Constant>> {
        for class in self.enclosing() {
            if let Some(field) = ctx.find_field(&class, name)? {
                if !field.flags.is_final() {
                    return Ok(None);
                }
                return ctx.field_constant(&field.owner, name);
            }
        }
        let imports: Vec<_> = ctx
            .unit(self.unit)
            .imports
            .statics_for(name)
            .map(|s| s.class_name.clone())
            .collect();
        for class_name in imports {
            if let Some(owner) = ctx.resolve_qualified(&class_name)? {
                if let Some(value) = self.static_field_value(ctx, &owner, name)? {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    fn static_field_value(
        &self,
        ctx: &mut CompilationContext,
        owner: &ClassType,
        name: &str,
    ) -> Result<Option<Constant>> {
        match ctx.find_field(owner, name)? {
            Some(field) if field.is_static() && field.flags.is_final() => ctx.field_constant(&field.owner, name),
            _ => Ok(None),
        }
    }

    /// Class named by the target of a field access, if it names one
    fn target_type(&self, ctx: &mut CompilationContext, target: &Expr) -> Result<Option<ClassType>> {
        let Some(segments) = dotted_segments(target) else {
            return Ok(None);
        };
        let enclosing = self.enclosing();
        // A variable of the same name shadows a type
        for class in &enclosing {
            if ctx.find_field(class, &segments[0])?.is_some() {
                return Ok(None);
            }
        }
        if let Some(mut current) = ctx.lookup_type_name(&segments[0], &enclosing, self.unit)? {
            for member in &segments[1..] {
                match ctx.find_member_type(&current, member)? {
                    Some(next) => current = next,
                    None => return Ok(None),
                }
            }
            return Ok(Some(current));
        }
        ctx.resolve_qualified(&segments.join("."))
    }
}

fn is_string(value: &Constant) -> bool {
    matches!(value, Constant::String(_))
}

fn dotted_segments(expr: &Expr) -> Option<Vec<String>> {
    match &expr.kind {
        ExprKind::Name { name, .. } => Some(vec![name.clone()]),
        ExprKind::FieldAccess { target, name, .. } => {
            let mut segments = dotted_segments(target)?;
            segments.push(name.clone());
            Some(segments)
        }
        _ => None,
    }
}
