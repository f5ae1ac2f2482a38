//! Lowering to the IR
//!
//! Runs last, over a tree the rewrites left with statement-level side effects
//! only. Every class of the unit, nested and hoisted anonymous ones included,
//! becomes one `IrClass` handed to the context's output. Member flags and
//! descriptors come from the class records, so synthetic parameters and widened
//! constructors are reflected.

use std::collections::HashMap;

use crate::ast::*;
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::env::{ClassSymbol, MethodRef};
use crate::common::types::{ClassType, FunctionType, PrimitiveType, Type};
use crate::consts::CONSTRUCTOR_METHOD_NAME;
use crate::error::{Error, Result, ResultExt};
use crate::ir::*;

pub struct Lower {
    unit: UnitId,
}

impl Lower {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        if ctx.unit(self.unit).is_prelude {
            return Ok(());
        }
        let mut classes = Vec::new();
        for decl in &ast.type_decls {
            self.class(ctx, decl, &mut classes)?;
        }
        for class in classes {
            log::debug!("lowered {} ({} methods)", class.name.binary_name(), class.methods.len());
            ctx.emit(class);
        }
        Ok(())
    }

    fn class(&self, ctx: &mut CompilationContext, decl: &ClassDecl, out: &mut Vec<IrClass>) -> Result<()> {
        let ty = decl.symbol()?.clone();
        let symbol = ctx.load(&ty)?.borrow().clone();
        let mut methods = Vec::new();
        for member in &decl.body {
            let method = match member {
                ClassMember::Method(method) => Body::new(ctx, method.modifiers.is_static())
                    .method(&symbol, method)
                    .at(method.span)?,
                ClassMember::Constructor(ctor) => Body::new(ctx, false).constructor(&symbol, ctor).at(ctor.span)?,
                ClassMember::Initializer(init) => {
                    return Err(Error::internal("initializer block survived the rewrites")).at(init.span)
                }
                ClassMember::Field(_) | ClassMember::Type(_) => continue,
            };
            methods.push(method);
        }

        let as_class = |t: &Type| t.as_class().map(ClassType::erased);
        out.push(IrClass {
            name: ty.clone(),
            flags: symbol.access_flags(),
            super_class: symbol.super_class.as_ref().and_then(as_class),
            interfaces: symbol.interfaces.iter().filter_map(as_class).collect(),
            outer: ty.outer(),
            is_inner: symbol.is_inner,
            fields: symbol
                .fields
                .iter()
                .map(|f| IrField {
                    name: f.name.clone(),
                    ty: f.ty.erasure(),
                    descriptor: f.ty.erasure().descriptor(),
                    flags: f.flags.bits(),
                    constant: if f.flags.is_final() { f.constant.value().cloned() } else { None },
                })
                .collect(),
            methods,
            source: ctx.unit(self.unit).path.clone(),
        });
        for nested in decl.nested_types() {
            self.class(ctx, nested, out)?;
        }
        Ok(())
    }
}

/// Slot allocation for one method body
struct Locals {
    scopes: Vec<HashMap<String, (u16, Type)>>,
    next: u16,
    declared: Vec<IrLocal>,
}

impl Locals {
    fn declare(&mut self, name: &str, ty: Type) -> u16 {
        let slot = self.next;
        self.next += ty.width().max(1);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), (slot, ty.clone()));
        }
        self.declared.push(IrLocal { slot, name: name.to_string(), ty });
        slot
    }

    fn lookup(&self, name: &str) -> Result<(u16, Type)> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .ok_or_else(|| Error::internal(format!("local '{}' has no slot", name)))
    }
}

struct Body<'a> {
    ctx: &'a mut CompilationContext,
    locals: Locals,
}

impl<'a> Body<'a> {
    fn new(ctx: &'a mut CompilationContext, is_static: bool) -> Self {
        let locals = Locals { scopes: vec![HashMap::new()], next: if is_static { 0 } else { 1 }, declared: Vec::new() };
        Self { ctx, locals }
    }

    fn params(&mut self, params: &[Parameter]) -> Result<Vec<Type>> {
        let mut types = Vec::with_capacity(params.len());
        for param in params {
            let ty = param.ty.ty().at(param.span)?.erasure();
            self.locals.declare(&param.name, ty.clone());
            types.push(ty);
        }
        Ok(types)
    }

    fn flags(symbol: &ClassSymbol, name: &str, descriptor: &str, declared: u16) -> u16 {
        symbol
            .methods_named(name)
            .find(|m| m.descriptor() == descriptor)
            .map(|m| m.flags.bits())
            .unwrap_or(declared)
    }

    fn finish(self, name: &str, descriptor: String, flags: u16, body: Option<Vec<IrStmt>>) -> IrMethod {
        IrMethod {
            name: name.to_string(),
            descriptor,
            flags,
            locals: self.locals.declared,
            max_locals: self.locals.next,
            body,
        }
    }

    fn method(mut self, symbol: &ClassSymbol, method: &MethodDecl) -> Result<IrMethod> {
        let params = self.params(&method.params)?;
        let ret = method.return_type.ty()?.erasure();
        let descriptor = FunctionType::new(ret, params).descriptor();
        let flags = Self::flags(symbol, &method.name, &descriptor, method.modifiers.bits());
        let body = match &method.body {
            Some(block) => Some(self.block(block)?),
            None => None,
        };
        Ok(self.finish(&method.name, descriptor, flags, body))
    }

    fn constructor(mut self, symbol: &ClassSymbol, ctor: &ConstructorDecl) -> Result<IrMethod> {
        let params = self.params(&ctor.params)?;
        let descriptor = FunctionType::new(Type::VOID, params).descriptor();
        let flags = Self::flags(symbol, CONSTRUCTOR_METHOD_NAME, &descriptor, ctor.modifiers.bits());

        let mut body = self.stmts(&ctor.prologue)?;
        if let Some(call) = &ctor.explicit_call {
            let method = call.ctor.as_ref().ok_or_else(|| Error::internal("constructor call was not resolved")).at(call.span)?;
            let method = self.ctx.refresh_method(method)?;
            let args = self.exprs(&call.args)?;
            body.push(IrStmt::Eval(IrExpr::Invoke {
                kind: InvokeKind::Special,
                method: MemberRef::new(method.owner.clone(), CONSTRUCTOR_METHOD_NAME, method.descriptor()),
                target: Some(Box::new(IrExpr::This)),
                args,
            }));
        }
        body.extend(self.block(&ctor.body)?);
        Ok(self.finish(CONSTRUCTOR_METHOD_NAME, descriptor, flags, Some(body)))
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.locals.scopes.push(HashMap::new());
        let result = f(self);
        self.locals.scopes.pop();
        result
    }

    fn block(&mut self, block: &Block) -> Result<Vec<IrStmt>> {
        self.scoped(|this| this.stmts(&block.stmts))
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<Vec<IrStmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.stmt(stmt, &mut out).at(stmt.span)?;
        }
        Ok(out)
    }

    /// A nested statement as its own statement list
    fn nested(&mut self, stmt: &Stmt) -> Result<Vec<IrStmt>> {
        self.scoped(|this| {
            let mut out = Vec::new();
            match &stmt.kind {
                StmtKind::Block(block) => out = this.stmts(&block.stmts)?,
                _ => this.stmt(stmt, &mut out).at(stmt.span)?,
            }
            Ok(out)
        })
    }

    fn stmt(&mut self, stmt: &Stmt, out: &mut Vec<IrStmt>) -> Result<()> {
        match &stmt.kind {
            StmtKind::LocalVar(local) => {
                let ty = local.ty.ty()?.erasure();
                // The initializer cannot see the variable it initializes
                let value = local.init.as_ref().map(|init| self.expr(init)).transpose()?;
                let slot = self.locals.declare(&local.name, ty.clone());
                if let Some(value) = value {
                    out.push(IrStmt::Store { slot, ty, value });
                }
            }
            StmtKind::Expr(expr) => out.push(self.effect(expr)?),
            StmtKind::Block(block) => out.push(IrStmt::Block(self.block(block)?)),
            StmtKind::If { cond, then_branch, else_branch } => {
                let cond = self.expr(cond)?;
                let then_branch = self.nested(then_branch)?;
                let else_branch = match else_branch {
                    Some(stmt) => self.nested(stmt)?,
                    None => Vec::new(),
                };
                out.push(IrStmt::If { cond, then_branch, else_branch });
            }
            StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. } => {
                out.extend(self.looping(stmt, None)?);
            }
            StmtKind::ForEach { .. } => return Err(Error::internal("enhanced for survived the rewrites")),
            StmtKind::Return(value) => {
                let value = value.as_ref().map(|v| self.expr(v)).transpose()?;
                out.push(IrStmt::Return(value));
            }
            StmtKind::Break(label) => out.push(IrStmt::Break(label.clone())),
            StmtKind::Continue(label) => out.push(IrStmt::Continue(label.clone())),
            StmtKind::Throw(value) => out.push(IrStmt::Throw(self.expr(value)?)),
            StmtKind::Switch { selector, cases } => {
                let key = self.expr(selector)?;
                // All cases share one scope
                let cases = self.scoped(|this| {
                    let mut lowered = Vec::with_capacity(cases.len());
                    for case in cases {
                        let keys = case
                            .labels
                            .iter()
                            .map(|label| label.value.ok_or_else(|| Error::internal("case label has no key")))
                            .collect::<Result<Vec<_>>>()
                            .at(case.span)?;
                        lowered.push(IrCase { keys, is_default: case.is_default, body: this.stmts(&case.body)? });
                    }
                    Ok(lowered)
                })?;
                out.push(IrStmt::Switch { key, cases });
            }
            StmtKind::Labeled { label, body } => match &body.kind {
                StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. } => {
                    out.extend(self.looping(body, Some(label.clone()))?);
                }
                _ => {
                    let body = self.nested(body)?;
                    out.push(IrStmt::Labeled { label: label.clone(), body });
                }
            },
            StmtKind::Try { body, catches, finally } => {
                let body = self.block(body)?;
                let mut lowered = Vec::with_capacity(catches.len());
                for catch in catches {
                    let class = catch
                        .ty
                        .ty()
                        .at(catch.span)?
                        .as_class()
                        .map(ClassType::erased)
                        .ok_or_else(|| Error::internal("catch parameter is not a class"))
                        .at(catch.span)?;
                    let clause = self.scoped(|this| {
                        let slot = this.locals.declare(&catch.name, Type::Class(class.clone()));
                        Ok(IrCatch { class: class.clone(), slot, body: this.block(&catch.body)? })
                    })?;
                    lowered.push(clause);
                }
                let finally = finally.as_ref().map(|f| self.block(f)).transpose()?;
                out.push(IrStmt::Try { body, catches: lowered, finally });
            }
            StmtKind::Empty => {}
        }
        Ok(())
    }

    /// A loop, preceded by the `for` initializers in a block of their own
    fn looping(&mut self, stmt: &Stmt, label: Option<String>) -> Result<Vec<IrStmt>> {
        self.scoped(|this| {
            let (init, setup, cond, body, update, test_first) = match &stmt.kind {
                StmtKind::While { cond, body, cond_setup } => (&[][..], cond_setup, Some(cond), body, &[][..], true),
                StmtKind::DoWhile { body, cond, cond_setup } => (&[][..], cond_setup, Some(cond), body, &[][..], false),
                StmtKind::For { init, cond, update, body, cond_setup } => {
                    (init.as_slice(), cond_setup, cond.as_ref(), body, update.as_slice(), true)
                }
                _ => return Err(Error::internal("not a loop")),
            };
            let init = this.stmts(init)?;
            let setup = this.stmts(setup)?;
            let cond = cond.map(|c| this.expr(c)).transpose()?;
            let body = this.nested(body)?;
            let update = this.stmts(update)?;
            let lowered = IrStmt::Loop { label, setup, cond, body, update, test_first };
            Ok(if init.is_empty() {
                vec![lowered]
            } else {
                let mut block = init;
                block.push(lowered);
                vec![IrStmt::Block(block)]
            })
        })
    }

    /// An expression statement; plain assignments become stores
    fn effect(&mut self, expr: &Expr) -> Result<IrStmt> {
        let ExprKind::Assign { op, target, value, .. } = &expr.kind else {
            return Ok(IrStmt::Eval(self.expr(expr)?));
        };
        if op.is_some() {
            return Err(Error::internal("compound assignment survived the rewrites")).at(expr.span);
        }
        match &target.kind {
            ExprKind::Name { name, binding: Some(Binding::Local) } => {
                let (slot, ty) = self.locals.lookup(name).at(target.span)?;
                Ok(IrStmt::Store { slot, ty, value: self.expr(value)? })
            }
            ExprKind::FieldAccess { target: object, field: Some(field), .. } => {
                let member = MemberRef::new(field.owner.clone(), field.name.clone(), field.ty.erasure().descriptor());
                if field.is_static() {
                    Ok(IrStmt::PutStatic { field: member, value: self.expr(value)? })
                } else {
                    let target = self.receiver(object)?;
                    Ok(IrStmt::PutField { field: member, target, value: self.expr(value)? })
                }
            }
            ExprKind::ArrayAccess { array, index } => Ok(IrStmt::ArrayStore {
                array: self.expr(array)?,
                index: self.expr(index)?,
                value: self.expr(value)?,
                elem: target.ty()?.erasure(),
            }),
            _ => Err(Error::internal("assignment to a non-variable")).at(target.span),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Result<Vec<IrExpr>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: &Expr) -> Result<Box<IrExpr>> {
        Ok(Box::new(self.expr(expr)?))
    }

    /// Object an instance member is selected from; `super` selects from `this`
    fn receiver(&mut self, target: &Expr) -> Result<IrExpr> {
        match target.kind {
            ExprKind::Super => Ok(IrExpr::This),
            _ => self.expr(target),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<IrExpr> {
        let span = expr.span;
        if let Some(value) = expr.attrs.constant.as_ref().filter(|_| foldable(expr)) {
            return Ok(IrExpr::Const(value.clone()));
        }
        Ok(match &expr.kind {
            ExprKind::Literal(value) => IrExpr::Const(value.clone()),
            ExprKind::Null => IrExpr::Null,
            ExprKind::Name { name, binding: Some(Binding::Local) } => {
                let (slot, ty) = self.locals.lookup(name).at(span)?;
                IrExpr::Load { slot, ty }
            }
            ExprKind::FieldAccess { target, field: Some(field), .. } => {
                let member = MemberRef::new(field.owner.clone(), field.name.clone(), field.ty.erasure().descriptor());
                if field.is_static() {
                    IrExpr::GetStatic { field: member }
                } else {
                    IrExpr::GetField { field: member, target: Box::new(self.receiver(target)?) }
                }
            }
            ExprKind::MethodCall { target, args, method: Some(method), is_super, .. } => {
                self.invoke(target.as_deref(), args, method, *is_super).at(span)?
            }
            ExprKind::New { class, args, ctor: Some(ctor), .. } => {
                let ctor = self.ctx.refresh_method(ctor)?;
                let created = class.ty().ok().and_then(Type::as_class).map(ClassType::erased).unwrap_or_else(|| ctor.owner.erased());
                IrExpr::New { class: created, descriptor: ctor.descriptor(), args: self.exprs(args)? }
            }
            ExprKind::NewArray { dims, init, .. } => {
                let ty = expr.ty()?.erasure();
                match init {
                    Some(elements) => IrExpr::ArrayLiteral { ty, elements: self.exprs(elements)? },
                    None => IrExpr::NewArray { ty, dims: self.exprs(dims)? },
                }
            }
            ExprKind::ArrayAccess { array, index } => IrExpr::ArrayLoad {
                array: self.boxed(array)?,
                index: self.boxed(index)?,
                elem: expr.ty()?.erasure(),
            },
            ExprKind::ArrayLength(array) => IrExpr::ArrayLength(self.boxed(array)?),
            ExprKind::Unary { op, operand } => IrExpr::Unary {
                op: *op,
                operand: self.boxed(operand)?,
                ty: primitive(expr)?,
            },
            ExprKind::Binary { op: BinaryOp::Concat, .. } => {
                let mut parts = Vec::new();
                self.concat(expr, &mut parts)?;
                IrExpr::Concat(parts)
            }
            ExprKind::Binary { op, left, right } => IrExpr::Binary {
                op: *op,
                ty: left.ty()?.erasure(),
                left: self.boxed(left)?,
                right: self.boxed(right)?,
            },
            ExprKind::Conditional { cond, then_expr, else_expr } => IrExpr::Conditional {
                cond: self.boxed(cond)?,
                then_expr: self.boxed(then_expr)?,
                else_expr: self.boxed(else_expr)?,
            },
            ExprKind::InstanceOf { expr: operand, ty } => IrExpr::InstanceOf {
                ty: ty.ty().at(span)?.erasure(),
                expr: self.boxed(operand)?,
            },
            ExprKind::This { qualifier: None } => IrExpr::This,
            ExprKind::Convert { kind, expr: operand } => self.convert(*kind, operand, expr.ty()?).at(span)?,
            _ => {
                return Err(Error::internal(format!("expression cannot be lowered: {:?}", std::mem::discriminant(&expr.kind))))
                    .at(span)
            }
        })
    }

    fn invoke(&mut self, target: Option<&Expr>, args: &[Expr], method: &MethodRef, is_super: bool) -> Result<IrExpr> {
        let member = MemberRef::new(method.owner.clone(), method.name.clone(), method.descriptor());
        let args = self.exprs(args)?;
        if method.is_static() {
            return Ok(IrExpr::Invoke { kind: InvokeKind::Static, method: member, target: None, args });
        }
        let kind = if is_super || method.flags.is_private() {
            InvokeKind::Special
        } else if method.owner_is_interface {
            InvokeKind::Interface
        } else {
            InvokeKind::Virtual
        };
        let target = match target {
            Some(target) => self.receiver(target)?,
            None => IrExpr::This,
        };
        Ok(IrExpr::Invoke { kind, method: member, target: Some(Box::new(target)), args })
    }

    fn concat(&mut self, expr: &Expr, parts: &mut Vec<(IrExpr, Type)>) -> Result<()> {
        match &expr.kind {
            ExprKind::Binary { op: BinaryOp::Concat, left, right } if !foldable_constant(expr) => {
                self.concat(left, parts)?;
                self.concat(right, parts)
            }
            _ => {
                parts.push((self.expr(expr)?, expr.ty()?.erasure()));
                Ok(())
            }
        }
    }

    fn convert(&mut self, kind: ConvertKind, operand: &Expr, to: &Type) -> Result<IrExpr> {
        let from = operand.ty()?.clone();
        let inner = self.expr(operand)?;
        Ok(match kind {
            ConvertKind::Primitive => {
                let (Some(from), Some(to)) = (from.as_primitive(), to.as_primitive()) else {
                    return Err(Error::internal("primitive conversion between non-primitives"));
                };
                if from == to {
                    inner
                } else {
                    IrExpr::Convert { from, to, expr: Box::new(inner) }
                }
            }
            ConvertKind::Box => {
                let (Some(p), Some(wrapper)) = (from.as_primitive(), to.as_class()) else {
                    return Err(Error::internal("boxing of a non-primitive"));
                };
                let wrapper = wrapper.erased();
                let sig = FunctionType::new(Type::Class(wrapper.clone()), vec![Type::Primitive(p)]);
                IrExpr::Invoke {
                    kind: InvokeKind::Static,
                    method: MemberRef::new(wrapper, "valueOf", sig.descriptor()),
                    target: None,
                    args: vec![inner],
                }
            }
            ConvertKind::Unbox => {
                let wrapper = from.erasure();
                let (Some(wrapper), Some(p)) = (wrapper.as_class(), to.as_primitive()) else {
                    return Err(Error::internal("unboxing of a non-wrapper"));
                };
                let name = p.unbox_method().ok_or_else(|| Error::internal(format!("{} has no wrapper", p)))?;
                let sig = FunctionType::new(Type::Primitive(p), Vec::new());
                IrExpr::Invoke {
                    kind: InvokeKind::Virtual,
                    method: MemberRef::new(wrapper.clone(), name, sig.descriptor()),
                    target: Some(Box::new(inner)),
                    args: Vec::new(),
                }
            }
            ConvertKind::Checkcast => {
                let target = to.erasure();
                if from.erasure() == target {
                    inner
                } else {
                    IrExpr::Checkcast { ty: target, expr: Box::new(inner) }
                }
            }
        })
    }
}

fn primitive(expr: &Expr) -> Result<PrimitiveType> {
    expr.ty()?
        .as_primitive()
        .ok_or_else(|| Error::internal("operator applied to a reference"))
        .at(expr.span)
}

fn foldable_constant(expr: &Expr) -> bool {
    expr.attrs.constant.is_some() && foldable(expr)
}

/// Whether a constant-valued expression can be replaced by its value without
/// dropping the evaluation of some receiver
fn foldable(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Name { .. } => true,
        ExprKind::FieldAccess { target, .. } => {
            matches!(target.kind, ExprKind::TypeName(_) | ExprKind::This { qualifier: None })
        }
        ExprKind::Unary { operand, .. } => foldable(operand),
        ExprKind::Binary { left, right, .. } => foldable(left) && foldable(right),
        ExprKind::Conditional { cond, then_expr, else_expr } => {
            foldable(cond) && foldable(then_expr) && foldable(else_expr)
        }
        ExprKind::Convert { kind: ConvertKind::Primitive, expr } => foldable(expr),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constant::Constant;
    use crate::common::flags::access_flags::ACC_ABSTRACT;
    use crate::config::Config;
    use std::path::Path;

    fn lowered(source: &str) -> Vec<IrClass> {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        ctx.compile_root(Path::new("p/A.java")).unwrap();
        ctx.drain().unwrap();
        ctx.take_output()
    }

    fn find<'a>(classes: &'a [IrClass], class: &str, name: &str) -> &'a IrMethod {
        classes
            .iter()
            .find(|c| c.name.binary_name() == class)
            .and_then(|c| c.method(name))
            .unwrap()
    }

    #[test]
    fn test_wide_locals_take_two_slots() {
        let classes = lowered("package p; class A { static int f(long a, int b) { double d = 1.0; int e = b; return e; } }");
        let f = find(&classes, "p.A", "f");
        let slots: Vec<(u16, &str)> = f.locals.iter().map(|l| (l.slot, l.name.as_str())).collect();
        assert_eq!(slots, vec![(0, "a"), (2, "b"), (3, "d"), (5, "e")]);
        assert_eq!(f.max_locals, 6);
        assert_eq!(f.descriptor, "(JI)I");
    }

    #[test]
    fn test_boxing_and_unboxing_are_calls() {
        let classes = lowered("package p; class A { Integer f(int x) { return x; } int g(Integer y) { return y; } }");
        let Some(IrStmt::Return(Some(IrExpr::Invoke { kind, method, .. }))) = find(&classes, "p.A", "f").statements().first() else {
            panic!("expected a boxing call")
        };
        assert_eq!(*kind, InvokeKind::Static);
        assert_eq!((method.name.as_str(), method.descriptor.as_str()), ("valueOf", "(I)Ljava/lang/Integer;"));

        let Some(IrStmt::Return(Some(IrExpr::Invoke { kind, method, target, .. }))) = find(&classes, "p.A", "g").statements().first() else {
            panic!("expected an unboxing call")
        };
        assert_eq!(*kind, InvokeKind::Virtual);
        assert_eq!(method.name, "intValue");
        assert!(matches!(target.as_deref(), Some(IrExpr::Load { slot: 1, .. })));
    }

    #[test]
    fn test_constructor_calls_super_after_prologue() {
        let classes = lowered("package p; class A { class B { } }");
        let init = find(&classes, "p.A$B", "<init>");
        assert_eq!(init.descriptor, "(Lp/A;)V");
        let stmts = init.statements();
        assert!(matches!(&stmts[0], IrStmt::PutField { field, .. } if field.name == "this$0"));
        let IrStmt::Eval(IrExpr::Invoke { kind: InvokeKind::Special, method, .. }) = &stmts[1] else {
            panic!("expected the super constructor call")
        };
        assert_eq!(method.owner, ClassType::object());
        assert_eq!(method.descriptor, "()V");
    }

    #[test]
    fn test_string_concat_is_flattened() {
        let classes = lowered("package p; class A { String f(int a, String b) { return \"x\" + a + b + 'c'; } }");
        let Some(IrStmt::Return(Some(IrExpr::Concat(parts)))) = find(&classes, "p.A", "f").statements().first() else {
            panic!("expected a concat")
        };
        let types: Vec<&Type> = parts.iter().map(|(_, ty)| ty).collect();
        let char = Type::Primitive(PrimitiveType::Char);
        assert_eq!(types, vec![&Type::string(), &Type::INT, &Type::string(), &char]);
        assert_eq!(parts[0].0, IrExpr::Const(Constant::String("x".to_string())));
    }

    #[test]
    fn test_for_loop_keeps_initializer_outside() {
        let classes = lowered("package p; class A { static int f(int n) { int s = 0; for (int i = 0; i < n; i++) { s += i; } return s; } }");
        let stmts = find(&classes, "p.A", "f").statements();
        let IrStmt::Block(block) = &stmts[1] else { panic!("expected the loop block") };
        assert!(matches!(block[0], IrStmt::Store { slot: 2, .. }));
        let IrStmt::Loop { cond: Some(_), update, test_first: true, .. } = &block[1] else { panic!("expected a loop") };
        assert_eq!(update.len(), 1);
    }

    #[test]
    fn test_interface_methods_have_no_body() {
        let classes = lowered("package p; interface A { int f(); }");
        let f = find(&classes, "p.A", "f");
        assert!(f.body.is_none());
        assert_ne!(f.flags & ACC_ABSTRACT, 0);
    }
}
