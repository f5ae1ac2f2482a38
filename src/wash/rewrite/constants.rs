//! Constant propagation
//!
//! Reads of compile-time constant fields become literals. The constant value of
//! every `final` field declared in the unit is settled first, so units loading
//! these classes later see the field as constant without evaluating it again.
//!
//! Assignment and increment targets are left alone, and so are constants read
//! through an arbitrary expression, whose receiver must still be evaluated.

use crate::ast::*;
use crate::common::compilation_context::CompilationContext;
use crate::common::types::ClassType;
use crate::error::{Result, ResultExt};

pub struct ConstantPropagation;

impl ConstantPropagation {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        let mut inliner = Inliner { ctx, class: None, inlined: 0 };
        walk_ast(&mut inliner, ast)?;
        log::debug!("inlined {} constant reads", inliner.inlined);
        Ok(())
    }
}

impl Default for ConstantPropagation {
    fn default() -> Self {
        Self::new()
    }
}

struct Inliner<'a> {
    ctx: &'a mut CompilationContext,
    class: Option<ClassType>,
    inlined: usize,
}

impl VisitorMut for Inliner<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        let ty = class.symbol()?.clone();
        for member in &class.body {
            if let ClassMember::Field(field) = member {
                if field.modifiers.is_final() && field.initializer.is_some() {
                    self.ctx.field_constant(&ty, &field.name).at(field.span)?;
                }
            }
        }
        let saved = self.class.replace(ty);
        let result = walk_class(self, class);
        self.class = saved;
        result
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<()> {
        match &mut expr.kind {
            // The target itself is a variable, only its parts are reads
            ExprKind::Assign { target, value, .. } => {
                walk_expr(self, target)?;
                self.visit_expr(value)
            }
            ExprKind::IncDec { target, .. } => walk_expr(self, target),
            ExprKind::FieldAccess { target, .. }
                if matches!(target.kind, ExprKind::TypeName(_) | ExprKind::This { qualifier: None }) =>
            {
                match expr.attrs.constant.clone() {
                    Some(value) => {
                        *expr = Expr::literal(value, expr.span);
                        self.inlined += 1;
                        Ok(())
                    }
                    None => walk_expr(self, expr),
                }
            }
            _ => walk_expr(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constant::Constant;
    use crate::config::Config;
    use std::path::Path;

    fn propagated(source: &str) -> (CompilationContext, Ast) {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        let unit = ctx.compile_root(Path::new("p/A.java")).unwrap();
        let mut ast = ctx.take_ast(unit).unwrap();
        crate::wash::scope::ScopeResolver::new(unit).process(&mut ctx, &mut ast).unwrap();
        crate::wash::attr::Attr::new(unit).process(&mut ctx, &mut ast).unwrap();
        ConstantPropagation::new().process(&mut ctx, &mut ast).unwrap();
        (ctx, ast)
    }

    fn returned(ast: &Ast, method: &str) -> Expr {
        ast.type_decls[0]
            .body
            .iter()
            .find_map(|m| match m {
                ClassMember::Method(m) if m.name == method => m.body.as_ref(),
                _ => None,
            })
            .and_then(|body| match &body.stmts[0].kind {
                StmtKind::Return(Some(value)) => Some(value.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_static_constant_read_is_inlined() {
        let (ctx, ast) = propagated(
            "package p; class A { static final int K = 2 * 3; static int x = 4; int m() { return K + x; } }",
        );
        let ExprKind::Binary { left, right, .. } = returned(&ast, "m").kind else { panic!("expected a binary node") };
        assert!(matches!(left.kind, ExprKind::Literal(Constant::Int(6))));
        assert!(matches!(right.kind, ExprKind::FieldAccess { .. }));

        let class = ctx.get(&ClassType::new("p", "A")).unwrap();
        let class = class.borrow();
        assert_eq!(class.field("K").unwrap().constant.value(), Some(&Constant::Int(6)));
    }

    #[test]
    fn test_final_instance_field_read_through_this() {
        let (_, ast) = propagated("package p; class A { final int k = 1; A() { } int m() { return k; } }");
        assert!(matches!(returned(&ast, "m").kind, ExprKind::Literal(Constant::Int(1))));
    }

    #[test]
    fn test_constant_inside_array_dimension() {
        let (_, ast) = propagated("package p; class A { static final int K = 1; static int m() { return K; } void n() { int[] a = new int[K]; } }");
        assert!(matches!(returned(&ast, "m").kind, ExprKind::Literal(Constant::Int(1))));
        let ClassMember::Method(n) = &ast.type_decls[0].body[2] else { panic!("expected a method") };
        let StmtKind::LocalVar(local) = &n.body.as_ref().unwrap().stmts[0].kind else { panic!("expected a local") };
        let ExprKind::NewArray { dims, .. } = &local.init.as_ref().unwrap().kind else { panic!("expected an array") };
        assert!(matches!(dims[0].kind, ExprKind::Literal(Constant::Int(1))));
    }
}
