//! Side-effect normalization
//!
//! After this pass, assignments appear only as expression statements of the
//! form `place = value`, where `value` and the parts of `place` are free of
//! assignments and increments. Every statement that needs an effect performed
//! inside an expression gets the effect as statements placed in front of it; the
//! values it still needs from before the effect are kept in `$tmpN` locals so the
//! source's left-to-right evaluation order is preserved.
//!
//! The pass also:
//!
//! - moves instance field initializers and instance initializer blocks, in
//!   source order, to the start of every constructor that does not call `this(...)`
//! - moves non-constant static initializers into a synthesized `<clinit>`
//! - desugars enhanced `for` over arrays and over `Iterable`
//! - spills `&&`, `||` and `?:` into `if` statements when an operand that is
//!   evaluated conditionally has effects

use crate::ast::*;
use crate::common::compilation_context::CompilationContext;
use crate::common::constant::Constant;
use crate::common::conversion;
use crate::common::env::MethodSymbol;
use crate::common::flags::{access_flags::*, Modifiers};
use crate::common::types::{ClassType, FunctionType, PrimitiveType, Type};
use crate::consts::{ITERATOR, ITERATOR_PACKAGE, STATIC_INITIALIZER_METHOD_NAME, TEMP_PREFIX};
use crate::error::{Error, Result, ResultExt};
use crate::parser::Span;
use crate::wash::rewrite::{assign, call, field_access, field_named, local_var, method_named, static_field};

pub struct EffectNormalizer;

impl EffectNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        walk_ast(&mut Normalizer { ctx, temps: 0 }, ast)
    }
}

impl Default for EffectNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether evaluating `expr` assigns anything
fn lifts(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Assign { .. } | ExprKind::IncDec { .. } => true,
        ExprKind::Literal(_)
        | ExprKind::Null
        | ExprKind::Name { .. }
        | ExprKind::This { .. }
        | ExprKind::Super
        | ExprKind::PackageName(_)
        | ExprKind::TypeName(_)
        | ExprKind::LoopItem => false,
        ExprKind::FieldAccess { target, .. } => lifts(target),
        ExprKind::MethodCall { target, args, .. } => {
            target.as_deref().map(lifts).unwrap_or(false) || args.iter().any(lifts)
        }
        ExprKind::New { outer, args, captured, .. } => {
            outer.as_deref().map(lifts).unwrap_or(false) || args.iter().any(lifts) || captured.iter().any(lifts)
        }
        ExprKind::NewArray { dims, init, .. } => {
            dims.iter().any(lifts) || init.iter().flatten().any(lifts)
        }
        ExprKind::ArrayAccess { array, index } => lifts(array) || lifts(index),
        ExprKind::Binary { left, right, .. } => lifts(left) || lifts(right),
        ExprKind::Conditional { cond, then_expr, else_expr } => {
            lifts(cond) || lifts(then_expr) || lifts(else_expr)
        }
        ExprKind::ArrayLength(inner)
        | ExprKind::Unary { operand: inner, .. }
        | ExprKind::Cast { expr: inner, .. }
        | ExprKind::InstanceOf { expr: inner, .. }
        | ExprKind::Convert { expr: inner, .. } => lifts(inner),
    }
}

/// Values no assignment can change
fn stable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Literal(_)
            | ExprKind::Null
            | ExprKind::This { .. }
            | ExprKind::Super
            | ExprKind::TypeName(_)
            | ExprKind::PackageName(_)
            | ExprKind::Name { binding: Some(Binding::Captured { .. }), .. }
    )
}

/// Put `with` where the `LoopItem` placeholder sits inside a conversion chain
fn substitute_item(item: Expr, with: Expr) -> Expr {
    let Expr { kind, span, attrs } = item;
    match kind {
        ExprKind::LoopItem => with,
        ExprKind::Convert { kind, expr } => Expr {
            kind: ExprKind::Convert { kind, expr: Box::new(substitute_item(*expr, with)) },
            span,
            attrs,
        },
        other => Expr { kind: other, span, attrs },
    }
}

fn one(p: PrimitiveType, span: Span) -> Result<Expr> {
    let value = match p {
        PrimitiveType::Int => Constant::Int(1),
        PrimitiveType::Long => Constant::Long(1),
        PrimitiveType::Float => Constant::Float(1.0),
        PrimitiveType::Double => Constant::Double(1.0),
        other => return Err(Error::internal(format!("no increment step for {}", other))),
    };
    Ok(Expr::literal(value, span))
}

struct Normalizer<'a> {
    ctx: &'a mut CompilationContext,
    /// Temporaries handed out in the current method
    temps: usize,
}

impl VisitorMut for Normalizer<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        let saved = std::mem::replace(&mut self.temps, 0);
        let result = self.class(class);
        self.temps = saved;
        result.at(class.span)
    }
}

impl Normalizer<'_> {
    fn class(&mut self, class: &mut ClassDecl) -> Result<()> {
        self.move_initializers(class)?;
        for member in &mut class.body {
            match member {
                ClassMember::Method(method) => {
                    self.temps = 0;
                    if let Some(body) = method.body.take() {
                        method.body = Some(self.block(body).at(method.span)?);
                    }
                }
                ClassMember::Constructor(ctor) => {
                    self.temps = 0;
                    self.constructor(ctor).at(ctor.span)?;
                }
                ClassMember::Type(nested) => self.visit_class(nested)?,
                ClassMember::Field(_) | ClassMember::Initializer(_) => {}
            }
        }
        Ok(())
    }

    fn constructor(&mut self, ctor: &mut ConstructorDecl) -> Result<()> {
        let mut prologue = Vec::new();
        for stmt in std::mem::take(&mut ctor.prologue) {
            self.stmt(stmt, &mut prologue)?;
        }
        if let Some(call) = &mut ctor.explicit_call {
            let has_outer = call.outer.is_some();
            let mut parts: Vec<Expr> = call.outer.take().map(|outer| *outer).into_iter().collect();
            parts.extend(std::mem::take(&mut call.args));
            let mut parts = self.ordered(parts, &mut prologue)?;
            if has_outer && !parts.is_empty() {
                call.outer = Some(parts.remove(0).boxed());
            }
            call.args = parts;
        }
        ctor.prologue = prologue;
        let body = std::mem::replace(&mut ctor.body, Block::empty());
        ctor.body = self.block(body)?;
        Ok(())
    }

    // ----- initializers -----

    fn move_initializers(&mut self, class: &mut ClassDecl) -> Result<()> {
        let ty = class.symbol()?.clone();
        let mut instance = Vec::new();
        let mut statics = Vec::new();
        let mut members = Vec::with_capacity(class.body.len());
        for member in std::mem::take(&mut class.body) {
            match member {
                ClassMember::Field(mut field) => {
                    if let Some(init) = field.initializer.take() {
                        let span = field.span;
                        let target = field_named(self.ctx, &ty, &field.name).at(span)?;
                        if field.modifiers.is_static() {
                            let constant = field.modifiers.is_final()
                                && self.ctx.field_constant(&ty, &field.name).at(span)?.is_some();
                            if !constant {
                                statics.push(assign(static_field(target, span), init, span)?);
                            }
                        } else {
                            let this = Expr::this(ty.clone(), span);
                            instance.push(assign(field_access(this, target, span), init, span)?);
                        }
                    }
                    members.push(ClassMember::Field(field));
                }
                ClassMember::Initializer(init) => {
                    let block = Stmt::new(StmtKind::Block(init.body), init.span);
                    if init.is_static {
                        statics.push(block);
                    } else {
                        instance.push(block);
                    }
                }
                other => members.push(other),
            }
        }
        class.body = members;

        if !instance.is_empty() {
            for ctor in class.constructors_mut() {
                let delegates = matches!(&ctor.explicit_call, Some(call) if call.kind == CtorCallKind::This);
                if !delegates {
                    ctor.body.stmts.splice(0..0, instance.iter().cloned());
                }
            }
        }
        if !statics.is_empty() {
            self.class_initializer(class, &ty, statics)?;
        }
        Ok(())
    }

    fn class_initializer(&mut self, class: &mut ClassDecl, ty: &ClassType, stmts: Vec<Stmt>) -> Result<()> {
        let span = class.span;
        let existing = class.body.iter_mut().find_map(|m| match m {
            ClassMember::Method(m) if m.name == STATIC_INITIALIZER_METHOD_NAME => m.body.as_mut(),
            _ => None,
        });
        if let Some(body) = existing {
            body.stmts.extend(stmts);
            return Ok(());
        }
        let flags = Modifiers::new(ACC_STATIC);
        let symbol = MethodSymbol::new(
            STATIC_INITIALIZER_METHOD_NAME,
            FunctionType::new(Type::VOID, Vec::new()),
            flags,
            ty.clone(),
        );
        self.ctx.load(ty)?.borrow_mut().add_method(symbol);
        class.body.push(ClassMember::Method(MethodDecl {
            modifiers: flags,
            type_params: Vec::new(),
            return_type: TypeRef::of(Type::VOID, span),
            name: STATIC_INITIALIZER_METHOD_NAME.to_string(),
            params: Vec::new(),
            throws: Vec::new(),
            body: Some(Block::new(stmts, span)),
            span,
        }));
        log::debug!("synthesized {}.{}", ty.binary_name(), STATIC_INITIALIZER_METHOD_NAME);
        Ok(())
    }

    // ----- temporaries -----

    fn temp_name(&mut self) -> String {
        let name = format!("{}{}", TEMP_PREFIX, self.temps);
        self.temps += 1;
        name
    }

    /// Evaluate `expr` into a fresh local and read that instead
    fn temp(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Result<Expr> {
        let ty = expr.ty()?.clone();
        let span = expr.span;
        let name = self.temp_name();
        out.push(local_var(&name, ty.clone(), Some(expr), span));
        Ok(Expr::local(&name, ty, span))
    }

    /// Keep `expr` safe from assignments evaluated after it
    fn stash(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Result<Expr> {
        if stable(&expr) || matches!(expr.ty(), Ok(Type::Null)) {
            return Ok(expr);
        }
        self.temp(expr, out)
    }

    /// Make `expr` cheap to read twice
    fn share(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Result<Expr> {
        if expr.is_trivial() {
            return Ok(expr);
        }
        self.temp(expr, out)
    }

    // ----- statements -----

    fn block(&mut self, block: Block) -> Result<Block> {
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in block.stmts {
            self.stmt(stmt, &mut stmts)?;
        }
        Ok(Block::new(stmts, block.span))
    }

    /// A nested statement position, such as a loop body, that holds one statement
    fn single(&mut self, stmt: Stmt) -> Result<Stmt> {
        let span = stmt.span;
        let mut out = Vec::new();
        self.stmt(stmt, &mut out)?;
        if out.len() == 1 {
            if let Some(only) = out.pop() {
                return Ok(only);
            }
        }
        Ok(Stmt::block(out, span))
    }

    fn stmts(&mut self, stmts: Vec<Stmt>) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> Result<()> {
        let span = stmt.span;
        let kind = match stmt.kind {
            StmtKind::LocalVar(mut local) => {
                if let Some(init) = local.init.take() {
                    local.init = Some(self.value(init, out).at(span)?);
                }
                StmtKind::LocalVar(local)
            }
            StmtKind::Expr(expr) => return self.effect(expr, out).at(span),
            StmtKind::Block(block) => StmtKind::Block(self.block(block)?),
            StmtKind::If { cond, then_branch, else_branch } => {
                let cond = self.value(cond, out).at(span)?;
                let then_branch = Box::new(self.single(*then_branch)?);
                let else_branch = match else_branch {
                    Some(els) => Some(Box::new(self.single(*els)?)),
                    None => None,
                };
                StmtKind::If { cond, then_branch, else_branch }
            }
            StmtKind::While { cond, body, cond_setup } => {
                let mut setup = self.stmts(cond_setup)?;
                let cond = self.value(cond, &mut setup).at(span)?;
                let body = Box::new(self.single(*body)?);
                StmtKind::While { cond, body, cond_setup: setup }
            }
            StmtKind::DoWhile { body, cond, cond_setup } => {
                let body = Box::new(self.single(*body)?);
                let mut setup = self.stmts(cond_setup)?;
                let cond = self.value(cond, &mut setup).at(span)?;
                StmtKind::DoWhile { body, cond, cond_setup: setup }
            }
            StmtKind::For { init, cond, update, body, cond_setup } => {
                let init = self.stmts(init)?;
                let mut setup = self.stmts(cond_setup)?;
                let cond = match cond {
                    Some(cond) => Some(self.value(cond, &mut setup).at(span)?),
                    None => None,
                };
                let update = self.stmts(update)?;
                let body = Box::new(self.single(*body)?);
                StmtKind::For { init, cond, update, body, cond_setup: setup }
            }
            StmtKind::ForEach { var, iterable, body, item } => {
                let mut desugared = Vec::new();
                self.for_each(var, iterable, *body, item, span, &mut desugared).at(span)?;
                for stmt in desugared {
                    self.stmt(stmt, out)?;
                }
                return Ok(());
            }
            StmtKind::Return(value) => match value {
                Some(value) => StmtKind::Return(Some(self.value(value, out).at(span)?)),
                None => StmtKind::Return(None),
            },
            StmtKind::Throw(value) => StmtKind::Throw(self.value(value, out).at(span)?),
            StmtKind::Switch { selector, cases } => {
                let selector = self.value(selector, out).at(span)?;
                let mut normalized = Vec::with_capacity(cases.len());
                for case in cases {
                    let body = self.stmts(case.body)?;
                    normalized.push(SwitchCase { body, ..case });
                }
                StmtKind::Switch { selector, cases: normalized }
            }
            StmtKind::Labeled { label, body } => {
                // Setup statements go in front of the label, so the label stays on the loop
                let mut inner = Vec::new();
                self.stmt(*body, &mut inner)?;
                let last = inner
                    .pop()
                    .unwrap_or_else(|| Stmt::new(StmtKind::Empty, span));
                out.extend(inner);
                StmtKind::Labeled { label, body: Box::new(last) }
            }
            StmtKind::Try { body, catches, finally } => {
                let body = self.block(body)?;
                let mut normalized = Vec::with_capacity(catches.len());
                for catch in catches {
                    let body = self.block(catch.body)?;
                    normalized.push(CatchClause { body, ..catch });
                }
                let finally = match finally {
                    Some(finally) => Some(self.block(finally)?),
                    None => None,
                };
                StmtKind::Try { body, catches: normalized, finally }
            }
            other @ (StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty) => other,
        };
        out.push(Stmt::new(kind, span));
        Ok(())
    }

    fn for_each(
        &mut self,
        var: LocalVar,
        iterable: Expr,
        body: Stmt,
        item: Option<Box<Expr>>,
        span: Span,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let iterable_ty = iterable.ty()?.clone();
        let declare = |current: Expr| {
            let init = match item {
                Some(item) => substitute_item(*item, current),
                None => current,
            };
            Stmt::new(StmtKind::LocalVar(LocalVar { init: Some(init), ..var }), span)
        };

        if let Type::Array(element) = &iterable_ty {
            let array = self.temp_name();
            let length = self.temp_name();
            let index = self.temp_name();
            out.push(local_var(&array, iterable_ty.clone(), Some(iterable), span));
            let array_read = || Expr::local(&array, iterable_ty.clone(), span);
            let len = Expr::typed(ExprKind::ArrayLength(array_read().boxed()), Type::INT, span);
            out.push(local_var(&length, Type::INT, Some(len), span));

            let i = || Expr::local(&index, Type::INT, span);
            let current = Expr::typed(
                ExprKind::ArrayAccess { array: array_read().boxed(), index: i().boxed() },
                (**element).clone(),
                span,
            );
            let cond = Expr::typed(
                ExprKind::Binary { op: BinaryOp::Lt, left: i().boxed(), right: Expr::local(&length, Type::INT, span).boxed() },
                Type::BOOLEAN,
                span,
            );
            let next = Expr::typed(
                ExprKind::Binary { op: BinaryOp::Add, left: i().boxed(), right: one(PrimitiveType::Int, span)?.boxed() },
                Type::INT,
                span,
            );
            let body = Stmt::block(vec![declare(current), body], span);
            out.push(Stmt::new(
                StmtKind::For {
                    init: vec![local_var(&index, Type::INT, Some(Expr::literal(Constant::Int(0), span)), span)],
                    cond: Some(cond),
                    update: vec![assign(i(), next, span)?],
                    body: Box::new(body),
                    cond_setup: Vec::new(),
                },
                span,
            ));
            return Ok(());
        }

        let owner = iterable_ty
            .erasure()
            .as_class()
            .cloned()
            .ok_or_else(|| Error::type_error(format!("for-each not applicable to expression type {}", iterable_ty)))?;
        let iterator_ty = ClassType::new(ITERATOR_PACKAGE, ITERATOR);
        let iterator = method_named(self.ctx, &owner, "iterator", 0)?;
        let has_next = method_named(self.ctx, &iterator_ty, "hasNext", 0)?;
        let next = method_named(self.ctx, &iterator_ty, "next", 0)?;

        let it = self.temp_name();
        let it_read = || Expr::local(&it, Type::Class(iterator_ty.clone()), span);
        let created = call(Some(iterable), iterator, Vec::new(), Type::Class(iterator_ty.clone()), span);
        out.push(local_var(&it, Type::Class(iterator_ty.clone()), Some(created), span));
        let cond = call(Some(it_read()), has_next, Vec::new(), Type::BOOLEAN, span);
        let current = call(Some(it_read()), next, Vec::new(), Type::object(), span);
        let body = Stmt::block(vec![declare(current), body], span);
        out.push(Stmt::new(
            StmtKind::While { cond, body: Box::new(body), cond_setup: Vec::new() },
            span,
        ));
        Ok(())
    }

    // ----- expressions -----

    /// Expression statement: the value is discarded
    fn effect(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Result<()> {
        match expr.kind {
            ExprKind::Assign { .. } => {
                self.assignment(expr, false, out)?;
            }
            ExprKind::IncDec { .. } => {
                self.step(expr, false, out)?;
            }
            _ => {
                let value = self.value(expr, out)?;
                out.push(Stmt::expr(value));
            }
        }
        Ok(())
    }

    /// Evaluate the parts left to right, protecting each from effects of the later ones
    fn ordered(&mut self, parts: Vec<Expr>, out: &mut Vec<Stmt>) -> Result<Vec<Expr>> {
        let lifting: Vec<bool> = parts.iter().map(lifts).collect();
        let mut result = Vec::with_capacity(parts.len());
        for (i, part) in parts.into_iter().enumerate() {
            let part = self.value(part, out)?;
            if lifting[i + 1..].iter().any(|l| *l) {
                result.push(self.stash(part, out)?);
            } else {
                result.push(part);
            }
        }
        Ok(result)
    }

    /// An assignment-free expression with the value of `expr`
    fn value(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> Result<Expr> {
        if matches!(expr.kind, ExprKind::Assign { .. }) {
            return self.assignment(expr, true, out)?.ok_or_else(|| Error::internal("assignment has no value"));
        }
        if matches!(expr.kind, ExprKind::IncDec { .. }) {
            return self.step(expr, true, out)?.ok_or_else(|| Error::internal("increment has no value"));
        }
        let Expr { kind, span, attrs } = expr;
        let kind = match kind {
            ExprKind::Binary { op: op @ (BinaryOp::And | BinaryOp::Or), left, right } if lifts(&right) => {
                let left = self.value(*left, out)?;
                let result = self.temp(left, out)?;
                let mut taken = Vec::new();
                let right = self.value(*right, &mut taken)?;
                taken.push(assign(result.clone(), right, span)?);
                let cond = match op {
                    BinaryOp::And => result.clone(),
                    _ => Expr::typed(
                        ExprKind::Unary { op: UnaryOp::Not, operand: result.clone().boxed() },
                        Type::BOOLEAN,
                        span,
                    ),
                };
                out.push(Stmt::new(
                    StmtKind::If { cond, then_branch: Box::new(Stmt::block(taken, span)), else_branch: None },
                    span,
                ));
                return Ok(result);
            }
            ExprKind::Conditional { cond, then_expr, else_expr } if lifts(&then_expr) || lifts(&else_expr) => {
                let ty = attrs.ty.clone().ok_or_else(|| Error::internal("conditional has no type"))?;
                let cond = self.value(*cond, out)?;
                let name = self.temp_name();
                out.push(local_var(&name, ty.clone(), None, span));
                let result = Expr::local(&name, ty, span);
                let branch = |this: &mut Self, expr: Expr| -> Result<Stmt> {
                    let mut stmts = Vec::new();
                    let value = this.value(expr, &mut stmts)?;
                    stmts.push(assign(result.clone(), value, span)?);
                    Ok(Stmt::block(stmts, span))
                };
                let then_branch = branch(self, *then_expr)?;
                let else_branch = branch(self, *else_expr)?;
                out.push(Stmt::new(
                    StmtKind::If {
                        cond,
                        then_branch: Box::new(then_branch),
                        else_branch: Some(Box::new(else_branch)),
                    },
                    span,
                ));
                return Ok(result);
            }
            ExprKind::Conditional { cond, then_expr, else_expr } => ExprKind::Conditional {
                cond: self.value(*cond, out)?.boxed(),
                then_expr,
                else_expr,
            },
            ExprKind::Binary { op, left, right } => {
                let mut parts = self.ordered(vec![*left, *right], out)?.into_iter();
                match (parts.next(), parts.next()) {
                    (Some(left), Some(right)) => ExprKind::Binary { op, left: left.boxed(), right: right.boxed() },
                    _ => return Err(Error::internal("binary operand lost")),
                }
            }
            ExprKind::FieldAccess { target, name, field } => ExprKind::FieldAccess {
                target: self.value(*target, out)?.boxed(),
                name,
                field,
            },
            ExprKind::MethodCall { target, name, args, method, is_super } => {
                let has_target = target.is_some();
                let mut parts: Vec<Expr> = target.map(|t| *t).into_iter().collect();
                parts.extend(args);
                let mut parts = self.ordered(parts, out)?;
                let target = if has_target && !parts.is_empty() { Some(parts.remove(0).boxed()) } else { None };
                ExprKind::MethodCall { target, name, args: parts, method, is_super }
            }
            ExprKind::New { class, outer, args, body, ctor, captured } => {
                let has_outer = outer.is_some();
                let arity = args.len();
                let mut parts: Vec<Expr> = outer.map(|o| *o).into_iter().collect();
                parts.extend(args);
                parts.extend(captured);
                let mut parts = self.ordered(parts, out)?;
                let outer = if has_outer && !parts.is_empty() { Some(parts.remove(0).boxed()) } else { None };
                let captured = parts.split_off(arity.min(parts.len()));
                let body = match body {
                    Some(mut body) => {
                        self.visit_class(&mut body)?;
                        Some(body)
                    }
                    None => None,
                };
                ExprKind::New { class, outer, args: parts, body, ctor, captured }
            }
            ExprKind::NewArray { elem, dims, extra_dims, init } => {
                let dims = self.ordered(dims, out)?;
                let init = match init {
                    Some(init) => Some(self.ordered(init, out)?),
                    None => None,
                };
                ExprKind::NewArray { elem, dims, extra_dims, init }
            }
            ExprKind::ArrayAccess { array, index } => {
                let mut parts = self.ordered(vec![*array, *index], out)?.into_iter();
                match (parts.next(), parts.next()) {
                    (Some(array), Some(index)) => ExprKind::ArrayAccess { array: array.boxed(), index: index.boxed() },
                    _ => return Err(Error::internal("array operand lost")),
                }
            }
            ExprKind::ArrayLength(array) => ExprKind::ArrayLength(self.value(*array, out)?.boxed()),
            ExprKind::Unary { op, operand } => ExprKind::Unary { op, operand: self.value(*operand, out)?.boxed() },
            ExprKind::Cast { ty, expr } => ExprKind::Cast { ty, expr: self.value(*expr, out)?.boxed() },
            ExprKind::InstanceOf { expr, ty } => ExprKind::InstanceOf { expr: self.value(*expr, out)?.boxed(), ty },
            ExprKind::Convert { kind, expr } => ExprKind::Convert { kind, expr: self.value(*expr, out)?.boxed() },
            other @ (ExprKind::Literal(_)
            | ExprKind::Null
            | ExprKind::Name { .. }
            | ExprKind::This { .. }
            | ExprKind::Super
            | ExprKind::PackageName(_)
            | ExprKind::TypeName(_)
            | ExprKind::LoopItem) => other,
            ExprKind::Assign { .. } | ExprKind::IncDec { .. } => {
                return Err(Error::internal("assignment reached the operand rewrite"))
            }
        };
        Ok(Expr { kind, span, attrs })
    }

    /// The variable an assignment writes, with its object and index evaluated
    ///
    /// `reused` when the variable is also read; `later` when the assigned value has effects.
    fn place(&mut self, target: Expr, reused: bool, later: bool, out: &mut Vec<Stmt>) -> Result<Expr> {
        let Expr { kind, span, attrs } = target;
        let kind = match kind {
            ExprKind::FieldAccess { target: object, name, field } => {
                let object = self.value(*object, out)?;
                let object = self.keep(object, reused, later, out)?;
                ExprKind::FieldAccess { target: object.boxed(), name, field }
            }
            ExprKind::ArrayAccess { array, index } => {
                let index_lifts = lifts(&index);
                let array = self.value(*array, out)?;
                let array = self.keep(array, reused, later || index_lifts, out)?;
                let index = self.value(*index, out)?;
                let index = self.keep(index, reused, later, out)?;
                ExprKind::ArrayAccess { array: array.boxed(), index: index.boxed() }
            }
            other @ ExprKind::Name { .. } => other,
            _ => return Err(Error::internal("assignment target is not a variable")),
        };
        Ok(Expr { kind, span, attrs })
    }

    fn keep(&mut self, expr: Expr, reused: bool, later: bool, out: &mut Vec<Stmt>) -> Result<Expr> {
        if later {
            let expr = self.stash(expr, out)?;
            return if reused { self.share(expr, out) } else { Ok(expr) };
        }
        if reused {
            return self.share(expr, out);
        }
        Ok(expr)
    }

    /// `old op value`, converted back to the variable's type
    fn compound(&mut self, op: BinaryOp, old: Expr, value: Expr, op_type: Option<Type>, ty: &Type, span: Span) -> Result<Expr> {
        if op == BinaryOp::Concat {
            return Ok(Expr::typed(
                ExprKind::Binary { op, left: old.boxed(), right: value.boxed() },
                Type::string(),
                span,
            ));
        }
        let op_type = op_type.ok_or_else(|| Error::internal("compound assignment has no operation type"))?;
        let p = op_type
            .as_primitive()
            .ok_or_else(|| Error::internal(format!("compound assignment computed in {}", op_type)))?;
        let left = conversion::to_primitive(old, p)?;
        let computed = Expr::typed(ExprKind::Binary { op, left: left.boxed(), right: value.boxed() }, op_type, span);
        conversion::cast(self.ctx, computed, ty)
    }

    fn assignment(&mut self, expr: Expr, used: bool, out: &mut Vec<Stmt>) -> Result<Option<Expr>> {
        let span = expr.span;
        let ty = expr.ty()?.clone();
        let ExprKind::Assign { op, target, value, op_type } = expr.kind else {
            return Err(Error::internal("expected an assignment"));
        };
        let later = lifts(&value);
        let place = self.place(*target, op.is_some(), later, out)?;
        let stored = match op {
            None => {
                let value = self.value(*value, out)?;
                if used {
                    self.share(value, out)?
                } else {
                    value
                }
            }
            Some(op) => {
                let old = if later { self.temp(place.clone(), out)? } else { place.clone() };
                let value = self.value(*value, out)?;
                let computed = self.compound(op, old, value, op_type, &ty, span)?;
                if used {
                    self.share(computed, out)?
                } else {
                    computed
                }
            }
        };
        out.push(assign(place, stored.clone(), span)?);
        Ok(used.then_some(stored))
    }

    fn step(&mut self, expr: Expr, used: bool, out: &mut Vec<Stmt>) -> Result<Option<Expr>> {
        let span = expr.span;
        let ty = expr.ty()?.clone();
        let ExprKind::IncDec { op, target } = expr.kind else {
            return Err(Error::internal("expected an increment"));
        };
        let promoted = ty
            .unboxed_primitive()
            .and_then(PrimitiveType::unary_promote)
            .ok_or_else(|| Error::internal(format!("cannot increment {}", ty)))?;
        let place = self.place(*target, true, false, out)?;
        let bop = if op.is_increment() { BinaryOp::Add } else { BinaryOp::Sub };
        let step = one(promoted, span)?;

        if used && !op.is_prefix() {
            let old = self.temp(place.clone(), out)?;
            let computed = self.compound(bop, old.clone(), step, Some(Type::Primitive(promoted)), &ty, span)?;
            out.push(assign(place, computed, span)?);
            return Ok(Some(old));
        }
        let computed = self.compound(bop, place.clone(), step, Some(Type::Primitive(promoted)), &ty, span)?;
        let computed = if used { self.temp(computed, out)? } else { computed };
        out.push(assign(place, computed.clone(), span)?);
        Ok(used.then_some(computed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn normalized(source: &str) -> (CompilationContext, Ast) {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        let unit = ctx.compile_root(Path::new("p/A.java")).unwrap();
        let mut ast = ctx.take_ast(unit).unwrap();
        crate::wash::scope::ScopeResolver::new(unit).process(&mut ctx, &mut ast).unwrap();
        crate::wash::attr::Attr::new(unit).process(&mut ctx, &mut ast).unwrap();
        crate::wash::rewrite::constants::ConstantPropagation::new().process(&mut ctx, &mut ast).unwrap();
        crate::wash::rewrite::enums::EnumDesugar::new().process(&mut ctx, &mut ast).unwrap();
        EffectNormalizer::new().process(&mut ctx, &mut ast).unwrap();
        (ctx, ast)
    }

    fn method<'a>(ast: &'a Ast, name: &str) -> &'a [Stmt] {
        ast.type_decls[0]
            .body
            .iter()
            .find_map(|m| match m {
                ClassMember::Method(m) if m.name == name => m.body.as_ref(),
                _ => None,
            })
            .map(|b| b.stmts.as_slice())
            .unwrap()
    }

    fn local_name(stmt: &Stmt) -> &str {
        match &stmt.kind {
            StmtKind::LocalVar(local) => &local.name,
            other => panic!("expected a local, found {:?}", other),
        }
    }

    #[test]
    fn test_postfix_increment_keeps_old_value() {
        let (_, ast) = normalized("package p; class A { int m(int i) { int j = i++ + i; return j; } }");
        let body = method(&ast, "m");
        assert_eq!(local_name(&body[0]), "$tmp0");
        let StmtKind::Expr(inc) = &body[1].kind else { panic!("expected the increment") };
        assert!(matches!(&inc.kind, ExprKind::Assign { op: None, .. }));
        let StmtKind::LocalVar(j) = &body[2].kind else { panic!("expected j") };
        let ExprKind::Binary { left, right, .. } = &j.init.as_ref().unwrap().kind else { panic!("expected a sum") };
        assert!(matches!(&left.kind, ExprKind::Name { name, .. } if name == "$tmp0"));
        assert!(matches!(&right.kind, ExprKind::Name { name, .. } if name == "i"));
    }

    #[test]
    fn test_compound_assignment_narrows_back() {
        let (_, ast) = normalized("package p; class A { short s; void m() { s += 1; } }");
        let StmtKind::Expr(stmt) = &method(&ast, "m")[0].kind else { panic!("expected a statement") };
        let ExprKind::Assign { op: None, value, .. } = &stmt.kind else { panic!("expected a simple assignment") };
        assert!(matches!(value.kind, ExprKind::Convert { kind: ConvertKind::Primitive, .. }));
        assert_eq!(value.attrs.ty, Some(Type::Primitive(PrimitiveType::Short)));
    }

    #[test]
    fn test_short_circuit_with_effect() {
        let (_, ast) = normalized("package p; class A { boolean m(boolean a, int i) { return a && i++ > 0; } }");
        let body = method(&ast, "m");
        assert_eq!(local_name(&body[0]), "$tmp0");
        assert!(matches!(body[1].kind, StmtKind::If { else_branch: None, .. }));
        assert!(matches!(&body[2].kind, StmtKind::Return(Some(e)) if matches!(&e.kind, ExprKind::Name { name, .. } if name == "$tmp0")));
    }

    #[test]
    fn test_initializers_move_into_constructors() {
        let (ctx, ast) = normalized(
            "package p; class A { int x = 1; static int y = f(); static final int K = 3; { x = 2; } \
             A() { } A(int a) { this(); } static int f() { return 0; } }",
        );
        let decl = &ast.type_decls[0];
        assert!(!decl.body.iter().any(|m| matches!(m, ClassMember::Initializer(_))));
        let ctors: Vec<&ConstructorDecl> = decl
            .body
            .iter()
            .filter_map(|m| match m {
                ClassMember::Constructor(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(ctors[0].body.stmts.len(), 2);
        assert!(ctors[1].body.stmts.is_empty());
        assert_eq!(method(&ast, STATIC_INITIALIZER_METHOD_NAME).len(), 1);

        let class = ctx.get(&ClassType::new("p", "A")).unwrap();
        assert_eq!(class.borrow().methods_named(STATIC_INITIALIZER_METHOD_NAME).count(), 1);
    }

    #[test]
    fn test_enhanced_for_over_array() {
        let (_, ast) = normalized("package p; class A { int m(int[] a) { int s = 0; for (int v : a) s += v; return s; } }");
        let body = method(&ast, "m");
        assert!(local_name(&body[1]).starts_with(TEMP_PREFIX));
        assert!(local_name(&body[2]).starts_with(TEMP_PREFIX));
        let StmtKind::For { init, cond, update, body: loop_body, .. } = &body[3].kind else { panic!("expected a for loop") };
        assert_eq!(init.len(), 1);
        assert!(cond.is_some());
        assert_eq!(update.len(), 1);
        let StmtKind::Block(block) = &loop_body.kind else { panic!("expected a block") };
        let StmtKind::LocalVar(v) = &block.stmts[0].kind else { panic!("expected the loop variable") };
        assert_eq!(v.name, "v");
        assert!(matches!(v.init.as_ref().unwrap().kind, ExprKind::ArrayAccess { .. }));
    }

    #[test]
    fn test_enhanced_for_over_iterable() {
        let (_, ast) = normalized(
            "package p; import java.util.List; class A { void m(List<String> xs) { for (String x : xs) { } } }",
        );
        let body = method(&ast, "m");
        let StmtKind::LocalVar(it) = &body[0].kind else { panic!("expected the iterator") };
        assert_eq!(it.ty.resolved, Some(Type::Class(ClassType::new(ITERATOR_PACKAGE, ITERATOR))));
        let StmtKind::While { cond, .. } = &body[1].kind else { panic!("expected a while loop") };
        assert!(matches!(&cond.kind, ExprKind::MethodCall { name, .. } if name == "hasNext"));
    }

    #[test]
    fn test_rerun_is_harmless() {
        let (mut ctx, mut ast) = normalized("package p; class A { int x = 1; static int y = 2; int m(int i) { return i++; } }");
        let before = format!("{:?}", ast);
        EffectNormalizer::new().process(&mut ctx, &mut ast).unwrap();
        assert_eq!(format!("{:?}", ast), before);
    }
}
