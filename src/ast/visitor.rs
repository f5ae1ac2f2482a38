use super::*;
use crate::error::Result;

/// Mutable AST visitor; override a hook and call the matching `walk_*` to recurse
pub trait VisitorMut {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        walk_class(self, class)
    }

    fn visit_member(&mut self, member: &mut ClassMember) -> Result<()> {
        walk_member(self, member)
    }

    fn visit_block(&mut self, block: &mut Block) -> Result<()> {
        walk_block(self, block)
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<()> {
        walk_expr(self, expr)
    }

    fn visit_type_ref(&mut self, ty: &mut TypeRef) -> Result<()> {
        walk_type_ref(self, ty)
    }
}

pub fn walk_ast<V: VisitorMut + ?Sized>(v: &mut V, ast: &mut Ast) -> Result<()> {
    for class in &mut ast.type_decls {
        v.visit_class(class)?;
    }
    Ok(())
}

pub fn walk_class<V: VisitorMut + ?Sized>(v: &mut V, class: &mut ClassDecl) -> Result<()> {
    for param in &mut class.type_params {
        for bound in &mut param.bounds {
            v.visit_type_ref(bound)?;
        }
    }
    if let Some(extends) = &mut class.extends {
        v.visit_type_ref(extends)?;
    }
    for iface in &mut class.implements {
        v.visit_type_ref(iface)?;
    }
    for constant in &mut class.enum_constants {
        for arg in &mut constant.args {
            v.visit_expr(arg)?;
        }
        if let Some(body) = &mut constant.body {
            v.visit_class(body)?;
        }
    }
    for member in &mut class.body {
        v.visit_member(member)?;
    }
    Ok(())
}

pub fn walk_member<V: VisitorMut + ?Sized>(v: &mut V, member: &mut ClassMember) -> Result<()> {
    match member {
        ClassMember::Field(field) => {
            v.visit_type_ref(&mut field.ty)?;
            if let Some(init) = &mut field.initializer {
                v.visit_expr(init)?;
            }
        }
        ClassMember::Method(method) => {
            for param in &mut method.type_params {
                for bound in &mut param.bounds {
                    v.visit_type_ref(bound)?;
                }
            }
            v.visit_type_ref(&mut method.return_type)?;
            for param in &mut method.params {
                v.visit_type_ref(&mut param.ty)?;
            }
            for thrown in &mut method.throws {
                v.visit_type_ref(thrown)?;
            }
            if let Some(body) = &mut method.body {
                v.visit_block(body)?;
            }
        }
        ClassMember::Constructor(ctor) => {
            for param in &mut ctor.params {
                v.visit_type_ref(&mut param.ty)?;
            }
            for thrown in &mut ctor.throws {
                v.visit_type_ref(thrown)?;
            }
            for stmt in &mut ctor.prologue {
                v.visit_stmt(stmt)?;
            }
            if let Some(call) = &mut ctor.explicit_call {
                if let Some(outer) = &mut call.outer {
                    v.visit_expr(outer)?;
                }
                for arg in &mut call.args {
                    v.visit_expr(arg)?;
                }
            }
            v.visit_block(&mut ctor.body)?;
        }
        ClassMember::Initializer(init) => v.visit_block(&mut init.body)?,
        ClassMember::Type(class) => v.visit_class(class)?,
    }
    Ok(())
}

pub fn walk_block<V: VisitorMut + ?Sized>(v: &mut V, block: &mut Block) -> Result<()> {
    for stmt in &mut block.stmts {
        v.visit_stmt(stmt)?;
    }
    Ok(())
}

fn walk_local<V: VisitorMut + ?Sized>(v: &mut V, local: &mut LocalVar) -> Result<()> {
    v.visit_type_ref(&mut local.ty)?;
    if let Some(init) = &mut local.init {
        v.visit_expr(init)?;
    }
    Ok(())
}

pub fn walk_stmt<V: VisitorMut + ?Sized>(v: &mut V, stmt: &mut Stmt) -> Result<()> {
    match &mut stmt.kind {
        StmtKind::LocalVar(local) => walk_local(v, local)?,
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => v.visit_expr(expr)?,
        StmtKind::Block(block) => v.visit_block(block)?,
        StmtKind::If { cond, then_branch, else_branch } => {
            v.visit_expr(cond)?;
            v.visit_stmt(then_branch)?;
            if let Some(els) = else_branch {
                v.visit_stmt(els)?;
            }
        }
        StmtKind::While { cond, body, cond_setup } => {
            for s in cond_setup {
                v.visit_stmt(s)?;
            }
            v.visit_expr(cond)?;
            v.visit_stmt(body)?;
        }
        StmtKind::DoWhile { body, cond, cond_setup } => {
            v.visit_stmt(body)?;
            for s in cond_setup {
                v.visit_stmt(s)?;
            }
            v.visit_expr(cond)?;
        }
        StmtKind::For { init, cond, update, body, cond_setup } => {
            for s in init {
                v.visit_stmt(s)?;
            }
            for s in cond_setup {
                v.visit_stmt(s)?;
            }
            if let Some(cond) = cond {
                v.visit_expr(cond)?;
            }
            for s in update {
                v.visit_stmt(s)?;
            }
            v.visit_stmt(body)?;
        }
        StmtKind::ForEach { var, iterable, body, item } => {
            walk_local(v, var)?;
            v.visit_expr(iterable)?;
            if let Some(item) = item {
                v.visit_expr(item)?;
            }
            v.visit_stmt(body)?;
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                v.visit_expr(value)?;
            }
        }
        StmtKind::Switch { selector, cases } => {
            v.visit_expr(selector)?;
            for case in cases {
                for label in &mut case.labels {
                    v.visit_expr(&mut label.expr)?;
                }
                for s in &mut case.body {
                    v.visit_stmt(s)?;
                }
            }
        }
        StmtKind::Labeled { body, .. } => v.visit_stmt(body)?,
        StmtKind::Try { body, catches, finally } => {
            v.visit_block(body)?;
            for catch in catches {
                v.visit_type_ref(&mut catch.ty)?;
                v.visit_block(&mut catch.body)?;
            }
            if let Some(finally) = finally {
                v.visit_block(finally)?;
            }
        }
        StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => {}
    }
    Ok(())
}

pub fn walk_expr<V: VisitorMut + ?Sized>(v: &mut V, expr: &mut Expr) -> Result<()> {
    match &mut expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Null
        | ExprKind::Name { .. }
        | ExprKind::Super
        | ExprKind::PackageName(_)
        | ExprKind::LoopItem => {}
        ExprKind::FieldAccess { target, .. } => v.visit_expr(target)?,
        ExprKind::MethodCall { target, args, .. } => {
            if let Some(target) = target {
                v.visit_expr(target)?;
            }
            for arg in args {
                v.visit_expr(arg)?;
            }
        }
        ExprKind::New { class, outer, args, body, captured, .. } => {
            v.visit_type_ref(class)?;
            if let Some(outer) = outer {
                v.visit_expr(outer)?;
            }
            for arg in args {
                v.visit_expr(arg)?;
            }
            for arg in captured {
                v.visit_expr(arg)?;
            }
            if let Some(body) = body {
                v.visit_class(body)?;
            }
        }
        ExprKind::NewArray { elem, dims, init, .. } => {
            v.visit_type_ref(elem)?;
            for dim in dims {
                v.visit_expr(dim)?;
            }
            if let Some(init) = init {
                for e in init {
                    v.visit_expr(e)?;
                }
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            v.visit_expr(array)?;
            v.visit_expr(index)?;
        }
        ExprKind::ArrayLength(array) => v.visit_expr(array)?,
        ExprKind::Unary { operand, .. } => v.visit_expr(operand)?,
        ExprKind::IncDec { target, .. } => v.visit_expr(target)?,
        ExprKind::Binary { left, right, .. } => {
            v.visit_expr(left)?;
            v.visit_expr(right)?;
        }
        ExprKind::Assign { target, value, .. } => {
            v.visit_expr(target)?;
            v.visit_expr(value)?;
        }
        ExprKind::Conditional { cond, then_expr, else_expr } => {
            v.visit_expr(cond)?;
            v.visit_expr(then_expr)?;
            v.visit_expr(else_expr)?;
        }
        ExprKind::Cast { ty, expr } => {
            v.visit_type_ref(ty)?;
            v.visit_expr(expr)?;
        }
        ExprKind::InstanceOf { expr, ty } => {
            v.visit_expr(expr)?;
            v.visit_type_ref(ty)?;
        }
        ExprKind::This { qualifier } => {
            if let Some(q) = qualifier {
                v.visit_type_ref(q)?;
            }
        }
        ExprKind::TypeName(ty) => v.visit_type_ref(ty)?,
        ExprKind::Convert { expr, .. } => v.visit_expr(expr)?,
    }
    Ok(())
}

pub fn walk_type_ref<V: VisitorMut + ?Sized>(v: &mut V, ty: &mut TypeRef) -> Result<()> {
    match &mut ty.syntax {
        TypeSyntax::Primitive(_) => {}
        TypeSyntax::Named(segments) => {
            for segment in segments {
                for arg in &mut segment.args {
                    v.visit_type_ref(arg)?;
                }
            }
        }
        TypeSyntax::Wildcard { bound, .. } => {
            if let Some(bound) = bound {
                v.visit_type_ref(bound)?;
            }
        }
    }
    Ok(())
}
