//! Type Propagation
//!
//! Computes the static type of every expression of a unit and checks it. On the
//! way it:
//!
//! - makes every implicit conversion an explicit `Convert` node
//! - resolves fields, methods and constructors to symbol references
//! - picks the receiving class of unqualified method calls
//! - supplies the implicit `super()` call and the outer instance of inner classes
//! - synthesizes the constructor of every anonymous class
//! - computes switch keys and the element conversion of enhanced `for` loops
//!
//! Compile-time constants are recorded on the nodes but not folded into them;
//! the only exception is assignment conversion, which narrows an `int` constant
//! to a `byte`/`short`/`char` literal.

use std::collections::HashSet;

use crate::ast::*;
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::constant::{fold_binary, fold_unary, Constant};
use crate::common::conversion;
use crate::common::env::{MethodRef, MethodSymbol, SymbolEnv};
use crate::common::flags::{access_flags, Modifiers};
use crate::common::types::{ClassType, FunctionType, PrimitiveType, Type};
use crate::consts::{CONSTRUCTOR_METHOD_NAME, ENUM_NAME_PARAM, ENUM_ORDINAL_PARAM, ITERABLE, THROWABLE};
use crate::error::{Error, Result, ResultExt};
use crate::parser::Span;
use crate::wash::flow;
use crate::wash::members::leading_params;
use crate::wash::overload::{self, member_type, Selected};

/// Name of the synthesized parameter holding the superclass's outer instance
const SUPER_OUTER_PARAM: &str = "$outer";

pub struct Attr {
    unit: UnitId,
}

impl Attr {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        let mut attribution = Attribution {
            ctx,
            unit: self.unit,
            classes: Vec::new(),
            env: SymbolEnv::new(),
            method: None,
            static_context: false,
        };
        for decl in &mut ast.type_decls {
            attribution.class_decl(decl)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ClassFrame {
    ty: ClassType,
    this_type: ClassType,
    kind: ClassKind,
    is_inner: bool,
    super_class: Option<Type>,
}

#[derive(Debug, Clone)]
struct MethodFrame {
    return_type: Type,
    is_constructor: bool,
    is_initializer: bool,
}

/// State saved while attributing a nested or anonymous class body
struct Saved {
    env: SymbolEnv,
    method: Option<MethodFrame>,
    static_context: bool,
}

struct Attribution<'a> {
    ctx: &'a mut CompilationContext,
    unit: UnitId,
    /// Lexically enclosing classes, innermost last
    classes: Vec<ClassFrame>,
    env: SymbolEnv,
    method: Option<MethodFrame>,
    /// No `this` is available
    static_context: bool,
}

fn take(expr: &mut Expr) -> Expr {
    let span = expr.span;
    std::mem::replace(expr, Expr::new(ExprKind::Null, span))
}

fn type_name(ty: ClassType, span: Span) -> Expr {
    let ty = Type::Class(ty);
    Expr::typed(ExprKind::TypeName(TypeRef::of(ty.clone(), span)), ty, span)
}

fn bad_operands(op: &str, left: &Type, right: &Type) -> Error {
    Error::type_error(format!("bad operand types for binary operator '{}': {} and {}", op, left, right))
}

fn static_reference(what: &str) -> Error {
    Error::type_error(format!("non-static {} cannot be referenced from a static context", what))
}

impl Attribution<'_> {
    fn current(&self) -> Result<&ClassFrame> {
        self.classes
            .last()
            .ok_or_else(|| Error::internal("expression outside of any class"))
    }

    fn push_class(&mut self, ty: &ClassType) -> Result<Saved> {
        let class = self.ctx.load(ty)?;
        let frame = {
            let class = class.borrow();
            ClassFrame {
                ty: class.ty.clone(),
                this_type: class.this_type(),
                kind: class.kind,
                is_inner: class.is_inner,
                super_class: class.super_class.clone(),
            }
        };
        self.classes.push(frame);
        Ok(Saved {
            env: std::mem::take(&mut self.env),
            method: self.method.take(),
            static_context: self.static_context,
        })
    }

    fn pop_class(&mut self, saved: Saved) {
        self.classes.pop();
        self.env = saved.env;
        self.method = saved.method;
        self.static_context = saved.static_context;
    }

    // ----- declarations -----

    fn class_decl(&mut self, decl: &mut ClassDecl) -> Result<()> {
        let ty = decl.symbol()?.clone();
        let saved = self.push_class(&ty)?;
        let result = self.class_members(decl, &ty);
        self.pop_class(saved);
        result
    }

    fn class_members(&mut self, decl: &mut ClassDecl, ty: &ClassType) -> Result<()> {
        for constant in &mut decl.enum_constants {
            self.enum_constant(ty, constant)?;
        }
        for member in &mut decl.body {
            self.member(member)?;
        }
        Ok(())
    }

    fn enter_body(&mut self, is_static: bool, method: Option<MethodFrame>) {
        self.static_context = is_static;
        self.env = SymbolEnv::new();
        self.method = method;
    }

    fn declare_params(&mut self, params: &[Parameter]) -> Result<()> {
        for param in params {
            let ty = param.ty.ty().at(param.span)?.clone();
            self.env.declare(param.name.clone(), ty, param.modifiers.is_final());
        }
        Ok(())
    }

    fn member(&mut self, member: &mut ClassMember) -> Result<()> {
        match member {
            ClassMember::Field(field) => {
                let is_static = field.modifiers.is_static() || self.current()?.kind == ClassKind::Interface;
                self.enter_body(is_static, None);
                if let Some(init) = &mut field.initializer {
                    let ty = field.ty.ty().at(field.span)?.clone();
                    self.attr_value(init)?;
                    self.convert_in_place(init, |ctx, e| conversion::assign(ctx, e, &ty))?;
                }
                Ok(())
            }
            ClassMember::Method(method) => {
                let Some(body) = &mut method.body else {
                    return Ok(());
                };
                let return_type = method.return_type.ty().at(method.span)?.clone();
                self.enter_body(
                    method.modifiers.is_static(),
                    Some(MethodFrame { return_type: return_type.clone(), is_constructor: false, is_initializer: false }),
                );
                self.declare_params(&method.params)?;
                self.block(body)?;
                flow::check_body(body, !return_type.is_void(), method.span)
            }
            ClassMember::Constructor(ctor) => self.constructor(ctor),
            ClassMember::Initializer(init) => {
                self.enter_body(init.is_static, Some(MethodFrame { return_type: Type::VOID, is_constructor: false, is_initializer: true }));
                self.block(&mut init.body)?;
                flow::check_body(&init.body, false, init.span)
            }
            ClassMember::Type(nested) => self.class_decl(nested),
        }
    }

    fn constructor(&mut self, ctor: &mut ConstructorDecl) -> Result<()> {
        self.enter_body(false, Some(MethodFrame { return_type: Type::VOID, is_constructor: true, is_initializer: false }));
        self.declare_params(&ctor.params)?;
        for stmt in &mut ctor.prologue {
            self.stmt(stmt)?;
        }
        let frame = self.current()?.clone();
        match &mut ctor.explicit_call {
            Some(call) => {
                if frame.kind == ClassKind::Enum && call.kind == CtorCallKind::Super {
                    return Err(Error::type_error("call to super not allowed in enum constructor")).at(call.span);
                }
                self.ctor_call(call)?;
            }
            None if frame.kind == ClassKind::Class && frame.super_class.is_some() => {
                let mut call = CtorCall {
                    kind: CtorCallKind::Super,
                    outer: None,
                    args: Vec::new(),
                    ctor: None,
                    span: ctor.span,
                };
                self.ctor_call(&mut call)?;
                ctor.explicit_call = Some(call);
            }
            None => {}
        }
        self.block(&mut ctor.body)?;
        flow::check_body(&ctor.body, false, ctor.span)
    }

    /// `this(...)` or `super(...)`, explicit or implicit
    fn ctor_call(&mut self, call: &mut CtorCall) -> Result<()> {
        let span = call.span;
        let frame = self.current()?.clone();
        let receiver = match call.kind {
            CtorCallKind::This => Type::Class(frame.this_type.clone()),
            CtorCallKind::Super => frame
                .super_class
                .clone()
                .ok_or_else(|| Error::internal(format!("'{}' has no superclass", frame.ty)))
                .at(span)?,
        };
        let target = receiver
            .as_class()
            .map(ClassType::erased)
            .ok_or_else(|| Error::internal(format!("superclass of '{}' is not a class", frame.ty)))
            .at(span)?;

        // Until the superclass constructor has run there is no `this` to use
        let saved_static = self.static_context;
        self.static_context = true;
        let outcome = self.call_arguments(call);
        self.static_context = saved_static;
        outcome?;

        let arg_types = call.args.iter().map(|a| a.ty().cloned()).collect::<Result<Vec<_>>>()?;
        let candidates = self.ctx.find_methods(&target, CONSTRUCTOR_METHOD_NAME)?;
        let selected =
            overload::select(self.ctx, candidates, &receiver, &arg_types, target.simple_name()).at(span)?;
        self.check_private(&selected.method.owner, selected.method.flags, target.simple_name())
            .at(span)?;
        self.convert_args(&mut call.args, &selected.params)?;

        let target_inner = self.ctx.load(&target)?.borrow().is_inner;
        if call.kind == CtorCallKind::Super && target_inner {
            let outer_ty = target
                .outer()
                .ok_or_else(|| Error::internal(format!("inner class '{}' has no outer class", target)))?;
            match &mut call.outer {
                Some(outer) => self.check_outer(outer, &outer_ty)?,
                None => call.outer = Some(Box::new(self.outer_instance(&outer_ty, span)?)),
            }
        } else if call.outer.is_some() {
            return Err(Error::type_error(format!("illegal qualifier; {} is not an inner class", target))).at(span);
        }
        call.ctor = Some(selected.method);
        Ok(())
    }

    fn call_arguments(&mut self, call: &mut CtorCall) -> Result<()> {
        if let Some(outer) = &mut call.outer {
            self.attr_value(outer)?;
        }
        for arg in &mut call.args {
            self.attr_value(arg)?;
        }
        Ok(())
    }

    fn enum_constant(&mut self, enum_ty: &ClassType, constant: &mut EnumConstant) -> Result<()> {
        let span = constant.span;
        self.enter_body(true, None);
        for arg in &mut constant.args {
            self.attr_value(arg)?;
        }
        let arg_types = constant.args.iter().map(|a| a.ty().cloned()).collect::<Result<Vec<_>>>()?;
        let candidates = self.ctx.find_methods(enum_ty, CONSTRUCTOR_METHOD_NAME)?;
        let receiver = Type::Class(enum_ty.clone());
        let selected =
            overload::select(self.ctx, candidates, &receiver, &arg_types, enum_ty.simple_name()).at(span)?;
        self.convert_args(&mut constant.args, &selected.params)?;
        let ctor = match &mut constant.body {
            Some(body) => self.anonymous_body(body, &selected, None)?,
            None => selected.method,
        };
        constant.ctor = Some(ctor);
        Ok(())
    }

    /// Attribute an anonymous class body and give the class its constructor
    fn anonymous_body(
        &mut self,
        body: &mut ClassDecl,
        super_ctor: &Selected,
        super_outer: Option<ClassType>,
    ) -> Result<MethodRef> {
        let anon = body.symbol()?.clone();
        let saved = self.push_class(&anon)?;
        let mut result = Ok(());
        for member in &mut body.body {
            result = self.member(member);
            if result.is_err() {
                break;
            }
        }
        self.pop_class(saved);
        result?;
        self.anonymous_constructor(body, &anon, super_ctor, super_outer)
    }

    /// Constructor of an anonymous class: takes the superclass's outer instance
    /// (if any), the enum name and ordinal (for enum constant bodies) and the
    /// arguments of the chosen superclass constructor, and passes them all on
    fn anonymous_constructor(
        &mut self,
        body: &mut ClassDecl,
        anon: &ClassType,
        super_ctor: &Selected,
        super_outer: Option<ClassType>,
    ) -> Result<MethodRef> {
        let span = body.span;
        let super_is_enum = self.ctx.load(&super_ctor.method.owner)?.borrow().is_enum();
        let mut params: Vec<(String, Type)> = Vec::new();
        if let Some(outer) = &super_outer {
            params.push((SUPER_OUTER_PARAM.to_string(), Type::Class(outer.clone())));
        }
        if super_is_enum {
            params.push((ENUM_NAME_PARAM.to_string(), Type::string()));
            params.push((ENUM_ORDINAL_PARAM.to_string(), Type::INT));
        }
        for (i, param) in super_ctor.params.iter().enumerate() {
            params.push((format!("$p{}", i), param.erasure()));
        }

        let forwarded = params
            .iter()
            .skip(usize::from(super_outer.is_some()))
            .map(|(name, ty)| Expr::local(name, ty.clone(), span))
            .collect();
        let call = CtorCall {
            kind: CtorCallKind::Super,
            outer: super_outer
                .as_ref()
                .map(|outer| Box::new(Expr::local(SUPER_OUTER_PARAM, Type::Class(outer.clone()), span))),
            args: forwarded,
            ctor: Some(super_ctor.method.clone()),
            span,
        };

        let sig = FunctionType::new(Type::VOID, params.iter().map(|(_, ty)| ty.clone()).collect());
        let mut symbol = MethodSymbol::new(CONSTRUCTOR_METHOD_NAME, sig, Modifiers::NONE, anon.clone());
        let class = self.ctx.load(anon)?;
        symbol.leading = leading_params(anon, class.borrow().is_inner, false);
        let method = symbol.to_ref(ClassKind::Class);
        if !class.borrow_mut().add_method(symbol) || body.has_constructor() {
            return Ok(method);
        }
        body.body.push(ClassMember::Constructor(ConstructorDecl {
            modifiers: Modifiers::NONE,
            name: anon.simple_name().to_string(),
            params: params
                .into_iter()
                .map(|(name, ty)| Parameter {
                    modifiers: Modifiers::new(access_flags::ACC_FINAL | access_flags::ACC_SYNTHETIC),
                    ty: TypeRef::of(ty, span),
                    name,
                    span,
                })
                .collect(),
            throws: Vec::new(),
            prologue: Vec::new(),
            explicit_call: Some(call),
            body: Block::new(Vec::new(), span),
            span,
        }));
        log::debug!("synthesized constructor {}{}", anon.binary_name(), method.descriptor());
        Ok(method)
    }

    // ----- statements -----

    fn block(&mut self, block: &mut Block) -> Result<()> {
        let saved = self.env.clone();
        let mut result = Ok(());
        for stmt in &mut block.stmts {
            result = self.stmt(stmt);
            if result.is_err() {
                break;
            }
        }
        self.env = saved;
        result
    }

    /// A statement in its own scope, such as a loop body
    fn scoped(&mut self, stmt: &mut Stmt) -> Result<()> {
        let saved = self.env.clone();
        let result = self.stmt(stmt);
        self.env = saved;
        result
    }

    fn stmts(&mut self, stmts: &mut [Stmt]) -> Result<()> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::LocalVar(local) => self.local_var(local),
            StmtKind::Expr(expr) => {
                self.attr_expr(expr, false)?;
                if matches!(expr.kind, ExprKind::TypeName(_) | ExprKind::PackageName(_)) {
                    return Err(Error::type_error("not a statement"));
                }
                Ok(())
            }
            StmtKind::Block(block) => self.block(block),
            StmtKind::If { cond, then_branch, else_branch } => {
                self.condition(cond)?;
                self.scoped(then_branch)?;
                match else_branch {
                    Some(els) => self.scoped(els),
                    None => Ok(()),
                }
            }
            StmtKind::While { cond, body, cond_setup } => {
                self.stmts(cond_setup)?;
                self.condition(cond)?;
                self.scoped(body)
            }
            StmtKind::DoWhile { body, cond, cond_setup } => {
                self.scoped(body)?;
                self.stmts(cond_setup)?;
                self.condition(cond)
            }
            StmtKind::For { init, cond, update, body, cond_setup } => {
                let saved = self.env.clone();
                let result = self.for_loop(init, cond.as_mut(), update, body, cond_setup);
                self.env = saved;
                result
            }
            StmtKind::ForEach { var, iterable, body, item } => {
                let saved = self.env.clone();
                let result = self.for_each(var, iterable, body, item, span);
                self.env = saved;
                result
            }
            StmtKind::Return(value) => self.return_stmt(value.as_mut()),
            StmtKind::Throw(expr) => {
                self.attr_value(expr)?;
                let ty = expr.ty()?.clone();
                if !self.is_throwable(&ty)? {
                    return Err(Error::type_error(format!(
                        "incompatible types: {} cannot be converted to {}",
                        ty, THROWABLE
                    )));
                }
                Ok(())
            }
            StmtKind::Switch { selector, cases } => self.switch(selector, cases, span),
            StmtKind::Labeled { body, .. } => self.stmt(body),
            StmtKind::Try { body, catches, finally } => {
                self.block(body)?;
                for catch in catches.iter_mut() {
                    let ty = catch.ty.ty().at(catch.span)?.clone();
                    if !self.is_throwable(&ty)? {
                        return Err(Error::type_error(format!(
                            "incompatible types: {} cannot be converted to {}",
                            ty, THROWABLE
                        )))
                        .at(catch.span);
                    }
                    let saved = self.env.clone();
                    self.env.declare(catch.name.clone(), ty, false);
                    let result = self.block(&mut catch.body);
                    self.env = saved;
                    result?;
                }
                match finally {
                    Some(finally) => self.block(finally),
                    None => Ok(()),
                }
            }
            StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => Ok(()),
        }
        .at(span)
    }

    fn is_throwable(&mut self, ty: &Type) -> Result<bool> {
        match ty {
            Type::Null => Ok(true),
            Type::Class(c) => self.ctx.is_subtype(c, &ClassType::java_lang(THROWABLE)),
            _ => Ok(false),
        }
    }

    fn local_var(&mut self, local: &mut LocalVar) -> Result<()> {
        let ty = local.ty.ty()?.clone();
        if ty.is_void() {
            return Err(Error::type_error("'void' type not allowed here"));
        }
        if let Some(init) = &mut local.init {
            self.attr_value(init)?;
            self.convert_in_place(init, |ctx, e| conversion::assign(ctx, e, &ty))?;
        }
        let constant = local
            .init
            .as_ref()
            .and_then(|init| init.attrs.constant.clone())
            .filter(|_| local.modifiers.is_final() && (matches!(ty, Type::Primitive(_)) || ty.is_string()));
        match constant {
            Some(value) => self.env.declare_constant(local.name.clone(), ty, value),
            None => self.env.declare(local.name.clone(), ty, local.modifiers.is_final()),
        }
        Ok(())
    }

    fn for_loop(
        &mut self,
        init: &mut [Stmt],
        cond: Option<&mut Expr>,
        update: &mut [Stmt],
        body: &mut Stmt,
        cond_setup: &mut [Stmt],
    ) -> Result<()> {
        self.stmts(init)?;
        self.stmts(cond_setup)?;
        if let Some(cond) = cond {
            self.condition(cond)?;
        }
        self.stmts(update)?;
        self.scoped(body)
    }

    fn for_each(
        &mut self,
        var: &mut LocalVar,
        iterable: &mut Expr,
        body: &mut Stmt,
        item: &mut Option<Box<Expr>>,
        span: Span,
    ) -> Result<()> {
        self.attr_value(iterable)?;
        let iterated = iterable.ty()?.clone();
        let var_ty = var.ty.ty()?.clone();
        let element = match &iterated {
            Type::Array(element) => Expr::typed(ExprKind::LoopItem, (**element).clone(), span),
            Type::Class(_) | Type::TypeVariable { .. } => {
                let class = match &iterated {
                    Type::Class(c) => c.clone(),
                    other => other.erasure().as_class().cloned().unwrap_or_else(ClassType::object),
                };
                let view = self
                    .ctx
                    .as_super(&class, &ClassType::java_lang(ITERABLE))?
                    .ok_or_else(|| Error::type_error(format!("for-each not applicable to expression type {}", iterated)))?;
                let actual = match view.args().first() {
                    Some(Type::Wildcard { upper: Some(bound), .. }) => (**bound).clone(),
                    Some(Type::Wildcard { .. }) | None => Type::object(),
                    Some(arg) => arg.clone(),
                };
                // `Iterator.next()` returns the erased element
                let next = Expr::typed(ExprKind::LoopItem, Type::object(), span);
                conversion::erasure_cast(next, &Type::object(), &actual)
            }
            other => {
                return Err(Error::type_error(format!("for-each not applicable to expression type {}", other)))
            }
        };
        let converted = conversion::assign(self.ctx, element, &var_ty)?;
        *item = Some(Box::new(converted));
        self.env.declare(var.name.clone(), var_ty, var.modifiers.is_final());
        self.scoped(body)
    }

    fn return_stmt(&mut self, value: Option<&mut Expr>) -> Result<()> {
        let frame = match &self.method {
            Some(frame) if !frame.is_initializer => frame.clone(),
            _ => return Err(Error::type_error("return outside method")),
        };
        match value {
            Some(value) => {
                if frame.return_type.is_void() {
                    return Err(Error::type_error("incompatible types: unexpected return value"));
                }
                self.attr_value(value)?;
                let ty = frame.return_type;
                self.convert_in_place(value, |ctx, e| conversion::assign(ctx, e, &ty))
            }
            None if !frame.return_type.is_void() => Err(Error::type_error("missing return value")),
            None => Ok(()),
        }
    }

    fn switch(&mut self, selector: &mut Expr, cases: &mut [SwitchCase], span: Span) -> Result<()> {
        self.attr_value(selector)?;
        let selector_ty = selector.ty()?.clone();
        if selector_ty.is_string() {
            return Err(Error::type_error("switch on strings is not supported"));
        }
        let enum_class = match &selector_ty {
            Type::Class(c) if c.unboxed().is_none() => {
                let class = self.ctx.load(c)?;
                let is_enum = class.borrow().is_enum();
                is_enum.then(|| c.erased())
            }
            _ => None,
        };

        let key = match &enum_class {
            Some(enum_ty) => {
                let ordinal = self
                    .ctx
                    .find_methods(enum_ty, "ordinal")?
                    .into_iter()
                    .find(|m| m.sig.params.is_empty())
                    .ok_or_else(|| Error::internal("enum without ordinal()"))?;
                let target = take(selector);
                *selector = Expr::typed(
                    ExprKind::MethodCall {
                        target: Some(Box::new(target)),
                        name: "ordinal".to_string(),
                        args: Vec::new(),
                        method: Some(ordinal),
                        is_super: false,
                    },
                    Type::INT,
                    span,
                );
                PrimitiveType::Int
            }
            None => {
                let key = selector_ty
                    .unboxed_primitive()
                    .filter(|p| p.widens_to(PrimitiveType::Int) && p.is_integral())
                    .ok_or_else(|| {
                        Error::type_error(format!("incompatible types: {} cannot be converted to int", selector_ty))
                    })?;
                self.convert_in_place(selector, |_, e| conversion::to_primitive(e, PrimitiveType::Int))?;
                key
            }
        };

        let mut seen = HashSet::new();
        let mut has_default = false;
        let saved = self.env.clone();
        let mut result = Ok(());
        for case in cases.iter_mut() {
            result = self.switch_case(case, enum_class.as_ref(), key, &mut seen, &mut has_default);
            if result.is_err() {
                break;
            }
        }
        self.env = saved;
        result
    }

    fn switch_case(
        &mut self,
        case: &mut SwitchCase,
        enum_class: Option<&ClassType>,
        key: PrimitiveType,
        seen: &mut HashSet<i32>,
        has_default: &mut bool,
    ) -> Result<()> {
        if case.is_default {
            if *has_default {
                return Err(Error::type_error("duplicate default label")).at(case.span);
            }
            *has_default = true;
        }
        for label in &mut case.labels {
            let span = label.expr.span;
            let value = match enum_class {
                Some(enum_ty) => {
                    let name = match &label.expr.kind {
                        ExprKind::Name { name, .. } | ExprKind::FieldAccess { name, .. } => name.clone(),
                        _ => {
                            return Err(Error::type_error(
                                "an enum switch case label must be the unqualified name of an enumeration constant",
                            ))
                            .at(span)
                        }
                    };
                    let field = self
                        .ctx
                        .field_symbol(enum_ty, &name)?
                        .filter(|f| f.ordinal.is_some())
                        .ok_or_else(|| Error::symbol_not_found(&name))
                        .at(span)?;
                    let ordinal = field.ordinal.unwrap_or_default();
                    label.expr = Expr::typed(
                        ExprKind::FieldAccess {
                            target: Box::new(type_name(enum_ty.clone(), span)),
                            name,
                            field: Some(field.to_ref()),
                        },
                        Type::Class(enum_ty.clone()),
                        span,
                    );
                    ordinal
                }
                None => {
                    self.attr_value(&mut label.expr)?;
                    let constant = label
                        .expr
                        .attrs
                        .constant
                        .clone()
                        .ok_or_else(|| Error::type_error("constant expression required"))
                        .at(span)?;
                    let label_ty = constant.primitive().ok_or_else(|| {
                        Error::type_error(format!("incompatible types: {} cannot be converted to {}", constant.ty(), key))
                    });
                    let label_ty = label_ty.at(span)?;
                    if !label_ty.widens_to(key) && !(label_ty.widens_to(PrimitiveType::Int) && constant.fits_in(key)) {
                        return Err(Error::type_error(format!(
                            "incompatible types: possible lossy conversion from {} to {}",
                            label_ty, key
                        )))
                        .at(span);
                    }
                    let value = constant
                        .as_i64()
                        .ok_or_else(|| Error::type_error("constant expression required"))
                        .at(span)?;
                    value as i32
                }
            };
            if !seen.insert(value) {
                return Err(Error::type_error("duplicate case label")).at(span);
            }
            label.value = Some(value);
        }
        self.stmts(&mut case.body)
    }

    // ----- conversions -----

    fn convert_in_place(
        &mut self,
        expr: &mut Expr,
        f: impl FnOnce(&mut CompilationContext, Expr) -> Result<Expr>,
    ) -> Result<()> {
        let span = expr.span;
        let taken = take(expr);
        *expr = f(self.ctx, taken).at(span)?;
        Ok(())
    }

    fn convert_args(&mut self, args: &mut [Expr], params: &[Type]) -> Result<()> {
        for (arg, param) in args.iter_mut().zip(params) {
            self.convert_in_place(arg, |ctx, e| conversion::invocation(ctx, e, param))?;
        }
        Ok(())
    }

    fn condition(&mut self, cond: &mut Expr) -> Result<()> {
        self.attr_value(cond)?;
        let ty = cond.ty()?.clone();
        if ty.unboxed_primitive() != Some(PrimitiveType::Boolean) {
            return Err(Error::type_error(format!("incompatible types: {} cannot be converted to boolean", ty)))
                .at(cond.span);
        }
        self.convert_in_place(cond, |_, e| conversion::unbox(e))
    }

    /// Index and dimension expressions: unary promotion to `int`
    fn to_int(&mut self, expr: &mut Expr) -> Result<()> {
        let ty = expr.ty()?.clone();
        match ty.unboxed_primitive().and_then(PrimitiveType::unary_promote) {
            Some(PrimitiveType::Int) => self.convert_in_place(expr, |_, e| conversion::to_primitive(e, PrimitiveType::Int)),
            Some(p) if p.is_numeric() => Err(Error::type_error(format!(
                "incompatible types: possible lossy conversion from {} to int",
                p
            )))
            .at(expr.span),
            _ => Err(Error::type_error(format!("incompatible types: {} cannot be converted to int", ty))).at(expr.span),
        }
    }

    fn check_outer(&mut self, outer: &mut Expr, outer_ty: &ClassType) -> Result<()> {
        let ty = outer.ty()?.clone();
        if !conversion::reference_assignable(self.ctx, &ty, &Type::Class(outer_ty.clone()))? || ty == Type::Null {
            return Err(Error::type_error(format!(
                "incompatible types: {} cannot be converted to {}",
                ty, outer_ty
            )))
            .at(outer.span);
        }
        Ok(())
    }

    fn check_private(&self, owner: &ClassType, flags: Modifiers, what: &str) -> Result<()> {
        if flags.is_private() && owner.top_level().erased() != self.current()?.ty.top_level().erased() {
            return Err(Error::type_error(format!("{} has private access in {}", what, owner.erased())));
        }
        Ok(())
    }

    // ----- `this` and outer instances -----

    /// `this` of the enclosing class at frame `index`, checking it is reachable
    fn this_at(&self, index: usize, span: Span) -> Result<Expr> {
        if self.static_context {
            return Err(static_reference("variable this")).at(span);
        }
        let last = self.classes.len().saturating_sub(1);
        for crossed in &self.classes[index + 1..] {
            if !crossed.is_inner {
                return Err(Error::type_error(format!(
                    "no enclosing instance of type {} is in scope",
                    self.classes[index].ty
                )))
                .at(span);
            }
        }
        let frame = &self.classes[index];
        let qualifier = (index != last).then(|| TypeRef::of(Type::Class(frame.ty.clone()), span));
        Ok(Expr::typed(ExprKind::This { qualifier }, Type::Class(frame.this_type.clone()), span))
    }

    /// The innermost enclosing instance that is a `required`
    fn outer_instance(&mut self, required: &ClassType, span: Span) -> Result<Expr> {
        for index in (0..self.classes.len()).rev() {
            let ty = self.classes[index].ty.clone();
            if self.ctx.is_subtype(&ty, required)? {
                return self.this_at(index, span);
            }
        }
        Err(Error::type_error(format!("an enclosing instance that contains {} is required", required))).at(span)
    }

    fn super_type(&self) -> Result<Type> {
        self.current()?
            .super_class
            .clone()
            .ok_or_else(|| Error::type_error("'super' is not available here"))
    }

    /// Class whose members a value of type `ty` exposes
    fn member_owner(ty: &Type) -> Result<ClassType> {
        match ty {
            Type::Class(c) => Ok(c.clone()),
            Type::TypeVariable { .. } | Type::Wildcard { .. } => {
                Ok(ty.erasure().as_class().cloned().unwrap_or_else(ClassType::object))
            }
            Type::Array(_) => Ok(ClassType::object()),
            Type::Null => Err(Error::type_error("<null> cannot be dereferenced")),
            other => Err(Error::type_error(format!("{} cannot be dereferenced", other))),
        }
    }

    // ----- expressions -----

    /// Attribute an expression used as a value
    fn attr_value(&mut self, expr: &mut Expr) -> Result<()> {
        self.attr_expr(expr, false)?;
        match &expr.kind {
            ExprKind::TypeName(ty) => Err(Error::symbol_not_found(&ty.to_string())).at(expr.span),
            ExprKind::PackageName(name) => Err(Error::symbol_not_found(name)).at(expr.span),
            _ => Ok(()),
        }
    }

    fn attr_expr(&mut self, expr: &mut Expr, as_target: bool) -> Result<()> {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Literal(value) => {
                expr.attrs.constant = Some(value.clone());
                value.ty()
            }
            ExprKind::Null => Type::Null,
            ExprKind::Name { name, binding } => match binding {
                Some(Binding::Local) => {
                    let local = self
                        .env
                        .lookup(name)
                        .ok_or_else(|| Error::internal(format!("local '{}' is not in scope", name)))
                        .at(span)?;
                    if !as_target {
                        expr.attrs.constant = local.constant.clone();
                    }
                    local.ty.clone()
                }
                Some(Binding::Captured { ty, .. }) => ty.clone(),
                None => return Err(Error::symbol_not_found(name)).at(span),
            },
            ExprKind::FieldAccess { .. } => return self.field_access(expr, as_target),
            ExprKind::MethodCall { .. } => return self.method_call(expr),
            ExprKind::New { .. } => return self.new_instance(expr),
            ExprKind::NewArray { .. } => return self.new_array(expr),
            ExprKind::ArrayAccess { array, index } => {
                self.attr_value(array)?;
                self.attr_value(index)?;
                self.to_int(index)?;
                match array.ty()? {
                    Type::Array(element) => (**element).clone(),
                    other => {
                        return Err(Error::type_error(format!("array required, but {} found", other))).at(span)
                    }
                }
            }
            ExprKind::ArrayLength(array) => {
                self.attr_value(array)?;
                Type::INT
            }
            ExprKind::Unary { .. } => return self.unary(expr),
            ExprKind::IncDec { op, target } => {
                self.attr_expr(target, true)?;
                self.check_variable(target)?;
                let ty = target.ty()?.clone();
                if !ty.unboxed_primitive().map(|p| p.is_numeric()).unwrap_or(false) {
                    let symbol = if op.is_increment() { "++" } else { "--" };
                    return Err(Error::type_error(format!(
                        "bad operand type {} for unary operator '{}'",
                        ty, symbol
                    )))
                    .at(span);
                }
                ty
            }
            ExprKind::Binary { .. } => return self.binary(expr),
            ExprKind::Assign { .. } => return self.assignment(expr),
            ExprKind::Conditional { .. } => return self.conditional(expr),
            ExprKind::Cast { .. } => return self.cast(expr),
            ExprKind::InstanceOf { expr: operand, ty } => {
                self.attr_value(operand)?;
                let operand_ty = operand.ty()?.clone();
                let target = ty.ty()?.clone();
                if !operand_ty.is_reference() || !target.is_reference() {
                    return Err(Error::type_error(format!(
                        "unexpected type: required reference, found {}",
                        if operand_ty.is_reference() { &target } else { &operand_ty }
                    )))
                    .at(span);
                }
                Type::BOOLEAN
            }
            ExprKind::This { qualifier: None } => {
                let current = self.classes.len().saturating_sub(1);
                self.this_at(current, span)?.attrs.ty.unwrap_or_else(Type::object)
            }
            ExprKind::This { qualifier: Some(qualifier) } => {
                let class = qualifier
                    .ty()?
                    .as_class()
                    .map(ClassType::erased)
                    .ok_or_else(|| Error::type_error(format!("not an enclosing class: {}", qualifier)))
                    .at(span)?;
                let index = self
                    .classes
                    .iter()
                    .rposition(|frame| frame.ty == class)
                    .ok_or_else(|| Error::type_error(format!("not an enclosing class: {}", class)))
                    .at(span)?;
                self.this_at(index, span)?.attrs.ty.unwrap_or_else(Type::object)
            }
            ExprKind::Super => {
                return Err(Error::type_error("'super' must be followed by a member access")).at(span);
            }
            ExprKind::PackageName(name) => return Err(Error::symbol_not_found(name)).at(span),
            ExprKind::TypeName(ty) => ty.ty()?.clone(),
            ExprKind::Convert { .. } | ExprKind::LoopItem => {
                return expr
                    .attrs
                    .ty
                    .as_ref()
                    .map(|_| ())
                    .ok_or_else(|| Error::internal("synthetic expression without a type"))
                    .at(span);
            }
        };
        expr.attrs.ty = Some(ty);
        Ok(())
    }

    /// Assignment and increment targets must denote variables
    fn check_variable(&self, target: &Expr) -> Result<()> {
        match &target.kind {
            ExprKind::Name { name, binding: Some(Binding::Local) } => match self.env.lookup(name) {
                Some(local) if local.is_final => {
                    Err(Error::type_error(format!("cannot assign a value to final variable {}", name))).at(target.span)
                }
                _ => Ok(()),
            },
            ExprKind::Name { name, binding: Some(Binding::Captured { .. }) } => Err(Error::type_error(format!(
                "local variables referenced from an inner class must be final or effectively final: {}",
                name
            )))
            .at(target.span),
            ExprKind::ArrayAccess { .. } => Ok(()),
            ExprKind::FieldAccess { field: Some(field), name, .. } => {
                let initializing = match &self.method {
                    None => true,
                    Some(frame) => frame.is_constructor || frame.is_initializer,
                };
                if field.flags.is_final() && !initializing {
                    return Err(Error::type_error(format!("cannot assign a value to final variable {}", name)))
                        .at(target.span);
                }
                Ok(())
            }
            ExprKind::ArrayLength(_) => {
                Err(Error::type_error("cannot assign a value to final variable length")).at(target.span)
            }
            _ => Err(Error::type_error("unexpected type: required variable, found value")).at(target.span),
        }
    }

    fn field_access(&mut self, expr: &mut Expr, as_target: bool) -> Result<()> {
        let span = expr.span;
        let ExprKind::FieldAccess { target, name, field } = &mut expr.kind else {
            return Ok(());
        };

        let mut implicit_this = false;
        let (receiver, static_only) = match &target.kind {
            ExprKind::TypeName(ty) => {
                let ty = ty.ty()?.clone();
                target.attrs.ty = Some(ty.clone());
                (ty, true)
            }
            ExprKind::PackageName(package) => {
                return Err(Error::class_not_found(format!("{}.{}", package, name))).at(span);
            }
            ExprKind::Super => {
                let ty = self.super_type().at(span)?;
                target.attrs.ty = Some(ty.clone());
                (ty, false)
            }
            ExprKind::This { qualifier: None } if self.static_context => {
                // Reported below with the field's name, unless the field is static
                implicit_this = true;
                let ty = Type::Class(self.current()?.this_type.clone());
                target.attrs.ty = Some(ty.clone());
                (ty, false)
            }
            _ => {
                self.attr_value(target)?;
                (target.ty()?.clone(), false)
            }
        };

        if receiver.element().is_some() && name == "length" && !static_only {
            let array = take(target);
            *expr = Expr::typed(ExprKind::ArrayLength(Box::new(array)), Type::INT, span);
            return Ok(());
        }

        let owner = Self::member_owner(&receiver).at(span)?;
        let found = self
            .ctx
            .find_field(&owner, name)?
            .ok_or_else(|| Error::field_not_found(name, owner.erased()))
            .at(span)?;
        if !found.is_static() && (static_only || implicit_this) {
            return Err(static_reference(&format!("variable {}", name))).at(span);
        }
        self.check_private(&found.owner, found.flags, name).at(span)?;

        let declared = found.ty.clone();
        let actual = if found.is_static() {
            declared.clone()
        } else {
            let bindings = self.ctx.member_bindings(&receiver, &found.owner)?;
            declared.substitute(&bindings)
        };
        let reads_own_final = found.flags.is_final() && matches!(target.kind, ExprKind::This { qualifier: None });
        let constant = if found.is_static() || reads_own_final {
            self.ctx.field_constant(&found.owner, name).at(span)?
        } else {
            None
        };
        *field = Some(found);
        expr.attrs.ty = Some(actual.clone());
        expr.attrs.constant = constant;
        if !as_target && declared.erasure() != actual.erasure() {
            let read = take(expr);
            *expr = conversion::erasure_cast(read, &declared, &actual);
        }
        Ok(())
    }

    fn method_call(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::MethodCall { target, name, args, method, is_super } = &mut expr.kind else {
            return Ok(());
        };
        for arg in args.iter_mut() {
            self.attr_value(arg)?;
        }
        let arg_types = args.iter().map(|a| a.ty().cloned()).collect::<Result<Vec<_>>>()?;
        for (arg, ty) in args.iter().zip(&arg_types) {
            if ty.is_void() {
                return Err(Error::type_error("'void' type not allowed here")).at(arg.span);
            }
        }

        let (selected, receiver) = match target {
            None => {
                let (selected, receiver, resolved_target) = self.unqualified_method(name, &arg_types, span)?;
                *target = Some(Box::new(resolved_target));
                (selected, receiver)
            }
            Some(target) => match &target.kind {
                ExprKind::TypeName(ty) => {
                    let ty = ty.ty()?.clone();
                    target.attrs.ty = Some(ty.clone());
                    let owner = Self::member_owner(&ty).at(span)?;
                    let candidates = self.ctx.find_methods(&owner, name)?;
                    let selected = overload::select(self.ctx, candidates, &ty, &arg_types, name).at(span)?;
                    if !selected.method.is_static() {
                        return Err(static_reference(&format!("method {}", name))).at(span);
                    }
                    (selected, ty)
                }
                ExprKind::PackageName(package) => {
                    return Err(Error::class_not_found(package)).at(span);
                }
                ExprKind::Super => {
                    let ty = self.super_type().at(span)?;
                    target.attrs.ty = Some(ty.clone());
                    let owner = Self::member_owner(&ty).at(span)?;
                    let candidates = self.ctx.find_methods(&owner, name)?;
                    let selected = overload::select(self.ctx, candidates, &ty, &arg_types, name).at(span)?;
                    if selected.method.flags.is_abstract() {
                        return Err(Error::type_error(format!(
                            "abstract method {} in {} cannot be accessed directly",
                            name, selected.method.owner
                        )))
                        .at(span);
                    }
                    *is_super = true;
                    (selected, ty)
                }
                _ => {
                    self.attr_value(target)?;
                    let ty = target.ty()?.clone();
                    let owner = Self::member_owner(&ty).at(span)?;
                    let candidates = self.ctx.find_methods(&owner, name)?;
                    let selected = overload::select(self.ctx, candidates, &ty, &arg_types, name).at(span)?;
                    (selected, ty)
                }
            },
        };
        self.check_private(&selected.method.owner, selected.method.flags, name).at(span)?;
        self.convert_args(args, &selected.params)?;

        let declared = (*selected.method.sig.return_type).clone();
        let actual = member_type(self.ctx, &declared, &selected.method, &receiver)?;
        *method = Some(selected.method);
        expr.attrs.ty = Some(actual.clone());
        if declared.erasure() != actual.erasure() {
            let call = take(expr);
            *expr = conversion::erasure_cast(call, &declared, &actual);
        }
        Ok(())
    }

    /// Receiver of an unqualified call: the innermost enclosing class declaring
    /// or inheriting a method of that name, then static imports
    fn unqualified_method(&mut self, name: &str, args: &[Type], span: Span) -> Result<(Selected, Type, Expr)> {
        for index in (0..self.classes.len()).rev() {
            let class = self.classes[index].ty.clone();
            let candidates = self.ctx.find_methods(&class, name)?;
            if candidates.is_empty() {
                continue;
            }
            let receiver = Type::Class(self.classes[index].this_type.clone());
            let selected = overload::select(self.ctx, candidates, &receiver, args, name).at(span)?;
            let target = if selected.method.is_static() {
                type_name(class, span)
            } else {
                if self.static_context {
                    return Err(static_reference(&format!("method {}", name))).at(span);
                }
                self.this_at(index, span)?
            };
            return Ok((selected, receiver, target));
        }

        let imports: Vec<String> = self
            .ctx
            .unit(self.unit)
            .imports
            .statics_for(name)
            .map(|s| s.class_name.clone())
            .collect();
        for class_name in imports {
            let owner = self
                .ctx
                .resolve_qualified(&class_name)?
                .ok_or_else(|| Error::class_not_found(&class_name))
                .at(span)?;
            let candidates: Vec<MethodRef> = self
                .ctx
                .find_methods(&owner, name)?
                .into_iter()
                .filter(MethodRef::is_static)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let receiver = Type::Class(owner.clone());
            let selected = overload::select(self.ctx, candidates, &receiver, args, name).at(span)?;
            return Ok((selected, receiver, type_name(owner, span)));
        }
        let receiver = Type::object();
        overload::select(self.ctx, Vec::new(), &receiver, args, name)
            .map(|selected| (selected, receiver, Expr::new(ExprKind::Null, span)))
            .at(span)
    }

    fn new_instance(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::New { class, outer, args, body, ctor, captured } = &mut expr.kind else {
            return Ok(());
        };

        if let Some(outer) = outer.as_deref_mut() {
            self.attr_value(outer)?;
            if !class.is_resolved() {
                // `o.new Inner()` names Inner as a member of o's type
                let outer_ty = Self::member_owner(outer.ty()?).at(span)?;
                let name = class.dotted_name().unwrap_or_default();
                let member = self
                    .ctx
                    .find_member_type(&outer_ty, &name)?
                    .ok_or_else(|| Error::class_not_found(format!("{}.{}", outer_ty.erased(), name)))
                    .at(span)?;
                class.resolved = Some(Type::Class(member));
            }
        }
        for arg in args.iter_mut() {
            self.attr_value(arg)?;
        }
        let arg_types = args.iter().map(|a| a.ty().cloned()).collect::<Result<Vec<_>>>()?;

        let created = match class.ty().at(span)? {
            Type::Class(c) => c.clone(),
            other => return Err(Error::type_error(format!("unexpected type {}", other))).at(span),
        };
        let (kind, is_abstract, is_inner) = {
            let symbol = self.ctx.load(&created).at(span)?;
            let symbol = symbol.borrow();
            (symbol.kind, symbol.is_abstract(), symbol.is_inner)
        };
        if kind == ClassKind::Enum {
            return Err(Error::type_error("enum classes may not be instantiated")).at(span);
        }
        let is_interface = kind == ClassKind::Interface;

        // Interfaces are implemented on top of the root class
        let provider = if is_interface && body.is_some() { ClassType::object() } else { created.clone() };
        if is_interface && body.is_some() && !args.is_empty() {
            return Err(Error::type_error("anonymous class implements interface; cannot have arguments")).at(span);
        }
        if body.is_none() && is_abstract {
            return Err(Error::type_error(format!("{} is abstract; cannot be instantiated", created))).at(span);
        }
        let receiver = Type::Class(provider.clone());
        let candidates = self.ctx.find_methods(&provider, CONSTRUCTOR_METHOD_NAME)?;
        let selected = overload::select(self.ctx, candidates, &receiver, &arg_types, provider.simple_name()).at(span)?;
        self.check_private(&selected.method.owner, selected.method.flags, provider.simple_name())
            .at(span)?;
        self.convert_args(args, &selected.params)?;

        let needs_outer = is_inner && !is_interface;
        let outer_class = if needs_outer {
            let outer_ty = created
                .erased()
                .outer()
                .ok_or_else(|| Error::internal(format!("inner class '{}' has no outer class", created)))?;
            match outer.as_deref_mut() {
                Some(outer) => self.check_outer(outer, &outer_ty)?,
                None => *outer = Some(Box::new(self.outer_instance(&outer_ty, span)?)),
            }
            Some(outer_ty)
        } else {
            if outer.is_some() {
                return Err(Error::type_error(format!(
                    "qualified new of static class {}",
                    created.erased()
                )))
                .at(span);
            }
            None
        };

        let ty = match body {
            Some(body) => {
                let anon = body.symbol()?.clone();
                *ctor = Some(self.anonymous_body(body, &selected, outer_class)?);
                for value in captured.iter_mut() {
                    self.attr_value(value)?;
                }
                Type::Class(anon)
            }
            None => {
                *ctor = Some(selected.method);
                Type::Class(created)
            }
        };
        expr.attrs.ty = Some(ty);
        Ok(())
    }

    fn new_array(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::NewArray { elem, dims, extra_dims, init } = &mut expr.kind else {
            return Ok(());
        };
        let mut ty = elem.ty().at(span)?.clone();
        if ty.is_void() {
            return Err(Error::type_error("'void' type not allowed here")).at(span);
        }
        let total = dims.len() + *extra_dims;
        if total == 0 {
            return Err(Error::internal("array creation without dimensions")).at(span);
        }
        for _ in 0..total {
            ty = Type::array_of(ty);
        }
        for dim in dims.iter_mut() {
            self.attr_value(dim)?;
            self.to_int(dim)?;
        }
        if let Some(init) = init {
            let element = ty.element().cloned().unwrap_or_else(Type::object);
            for value in init.iter_mut() {
                self.attr_value(value)?;
                self.convert_in_place(value, |ctx, e| conversion::assign(ctx, e, &element))?;
            }
        }
        expr.attrs.ty = Some(ty);
        Ok(())
    }

    fn unary(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::Unary { op, operand } = &mut expr.kind else {
            return Ok(());
        };
        self.attr_value(operand)?;
        let operand_ty = operand.ty()?.clone();
        let bad = || {
            Error::type_error(format!("bad operand type {} for unary operator '{}'", operand_ty, op.symbol()))
        };
        let ty = match op {
            UnaryOp::Not => {
                if operand_ty.unboxed_primitive() != Some(PrimitiveType::Boolean) {
                    return Err(bad()).at(span);
                }
                self.convert_in_place(operand, |_, e| conversion::unbox(e))?;
                PrimitiveType::Boolean
            }
            UnaryOp::Plus | UnaryOp::Neg | UnaryOp::BitNot => {
                let promoted = operand_ty
                    .unboxed_primitive()
                    .filter(|p| if *op == UnaryOp::BitNot { p.is_integral() } else { p.is_numeric() })
                    .and_then(PrimitiveType::unary_promote)
                    .ok_or_else(bad)
                    .at(span)?;
                self.convert_in_place(operand, |_, e| conversion::to_primitive(e, promoted))?;
                promoted
            }
        };
        let constant = operand.attrs.constant.as_ref().and_then(|c| fold_unary(*op, c));
        expr.attrs.ty = Some(Type::Primitive(ty));
        expr.attrs.constant = constant;
        Ok(())
    }

    fn numeric_promotion(op: BinaryOp, left: &Type, right: &Type) -> Result<PrimitiveType> {
        match (left.unboxed_primitive(), right.unboxed_primitive()) {
            (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                PrimitiveType::binary_promote(a, b).ok_or_else(|| bad_operands(op.symbol(), left, right))
            }
            _ => Err(bad_operands(op.symbol(), left, right)),
        }
    }

    fn shift_operand(op: BinaryOp, ty: &Type, left: &Type, right: &Type) -> Result<PrimitiveType> {
        ty.unboxed_primitive()
            .filter(PrimitiveType::is_integral)
            .and_then(PrimitiveType::unary_promote)
            .ok_or_else(|| bad_operands(op.symbol(), left, right))
    }

    /// Shift distances are always `int`
    fn shift_distance(&mut self, right: &mut Expr, promoted: PrimitiveType) -> Result<()> {
        self.convert_in_place(right, |_, e| conversion::to_primitive(e, promoted))?;
        if promoted == PrimitiveType::Long {
            let distance = take(right);
            *right = conversion::convert(ConvertKind::Primitive, distance, Type::INT);
        }
        Ok(())
    }

    fn binary(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::Binary { op, left, right } = &mut expr.kind else {
            return Ok(());
        };
        self.attr_value(left)?;
        self.attr_value(right)?;
        let lt = left.ty()?.clone();
        let rt = right.ty()?.clone();
        if lt.is_void() || rt.is_void() {
            return Err(Error::type_error("'void' type not allowed here")).at(span);
        }

        let ty = match *op {
            BinaryOp::Add | BinaryOp::Concat if lt.is_string() || rt.is_string() => {
                *op = BinaryOp::Concat;
                Type::string()
            }
            BinaryOp::Concat => return Err(bad_operands("+", &lt, &rt)).at(span),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let promoted = Self::numeric_promotion(*op, &lt, &rt).at(span)?;
                self.convert_in_place(left, |_, e| conversion::to_primitive(e, promoted))?;
                self.convert_in_place(right, |_, e| conversion::to_primitive(e, promoted))?;
                Type::Primitive(promoted)
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                let lp = Self::shift_operand(*op, &lt, &lt, &rt).at(span)?;
                let rp = Self::shift_operand(*op, &rt, &lt, &rt).at(span)?;
                self.convert_in_place(left, |_, e| conversion::to_primitive(e, lp))?;
                self.shift_distance(right, rp)?;
                Type::Primitive(lp)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let promoted = Self::numeric_promotion(*op, &lt, &rt).at(span)?;
                self.convert_in_place(left, |_, e| conversion::to_primitive(e, promoted))?;
                self.convert_in_place(right, |_, e| conversion::to_primitive(e, promoted))?;
                Type::BOOLEAN
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                self.equality(*op, left, right, &lt, &rt).at(span)?;
                Type::BOOLEAN
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                let booleans = lt.unboxed_primitive() == Some(PrimitiveType::Boolean)
                    && rt.unboxed_primitive() == Some(PrimitiveType::Boolean);
                if booleans {
                    self.convert_in_place(left, |_, e| conversion::unbox(e))?;
                    self.convert_in_place(right, |_, e| conversion::unbox(e))?;
                    Type::BOOLEAN
                } else {
                    let bad = || bad_operands(op.symbol(), &lt, &rt);
                    let a = lt.unboxed_primitive().filter(PrimitiveType::is_integral).ok_or_else(bad).at(span)?;
                    let b = rt.unboxed_primitive().filter(PrimitiveType::is_integral).ok_or_else(bad).at(span)?;
                    let promoted = PrimitiveType::binary_promote(a, b).ok_or_else(bad).at(span)?;
                    self.convert_in_place(left, |_, e| conversion::to_primitive(e, promoted))?;
                    self.convert_in_place(right, |_, e| conversion::to_primitive(e, promoted))?;
                    Type::Primitive(promoted)
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                let booleans = lt.unboxed_primitive() == Some(PrimitiveType::Boolean)
                    && rt.unboxed_primitive() == Some(PrimitiveType::Boolean);
                if !booleans {
                    return Err(bad_operands(op.symbol(), &lt, &rt)).at(span);
                }
                self.convert_in_place(left, |_, e| conversion::unbox(e))?;
                self.convert_in_place(right, |_, e| conversion::unbox(e))?;
                Type::BOOLEAN
            }
        };

        let constant = match (&left.attrs.constant, &right.attrs.constant) {
            (Some(l), Some(r)) => fold_binary(*op, l, r),
            _ => None,
        };
        expr.attrs.ty = Some(ty);
        expr.attrs.constant = constant;
        Ok(())
    }

    fn equality(&mut self, op: BinaryOp, left: &mut Expr, right: &mut Expr, lt: &Type, rt: &Type) -> Result<()> {
        let one_primitive = matches!(lt, Type::Primitive(_)) || matches!(rt, Type::Primitive(_));
        let (lp, rp) = (lt.unboxed_primitive(), rt.unboxed_primitive());
        if one_primitive {
            match (lp, rp) {
                (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                    let promoted = PrimitiveType::binary_promote(a, b).ok_or_else(|| bad_operands(op.symbol(), lt, rt))?;
                    self.convert_in_place(left, |_, e| conversion::to_primitive(e, promoted))?;
                    self.convert_in_place(right, |_, e| conversion::to_primitive(e, promoted))?;
                    return Ok(());
                }
                (Some(PrimitiveType::Boolean), Some(PrimitiveType::Boolean)) => {
                    self.convert_in_place(left, |_, e| conversion::unbox(e))?;
                    self.convert_in_place(right, |_, e| conversion::unbox(e))?;
                    return Ok(());
                }
                _ => return Err(bad_operands(op.symbol(), lt, rt)),
            }
        }
        let comparable = conversion::reference_assignable(self.ctx, lt, rt)?
            || conversion::reference_assignable(self.ctx, rt, lt)?
            || self.either_interface(lt, rt)?;
        if !comparable {
            return Err(Error::type_error(format!("incomparable types: {} and {}", lt, rt)));
        }
        Ok(())
    }

    fn either_interface(&mut self, a: &Type, b: &Type) -> Result<bool> {
        for ty in [a, b] {
            if let Type::Class(c) = ty.erasure() {
                if self.ctx.load(&c)?.borrow().is_interface() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn assignment(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::Assign { op, target, value, op_type } = &mut expr.kind else {
            return Ok(());
        };
        self.attr_expr(target, true)?;
        self.check_variable(target)?;
        self.attr_value(value)?;
        let tt = target.ty()?.clone();
        let vt = value.ty()?.clone();
        match op {
            None => {
                self.convert_in_place(value, |ctx, e| conversion::assign(ctx, e, &tt))?;
            }
            Some(bop) => {
                if vt.is_void() {
                    return Err(Error::type_error("'void' type not allowed here")).at(span);
                }
                let computed = match *bop {
                    BinaryOp::Add if tt.is_string() => {
                        *bop = BinaryOp::Concat;
                        Type::string()
                    }
                    BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                        let lp = Self::shift_operand(*bop, &tt, &tt, &vt).at(span)?;
                        let rp = Self::shift_operand(*bop, &vt, &tt, &vt).at(span)?;
                        self.shift_distance(value, rp)?;
                        Type::Primitive(lp)
                    }
                    BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor
                        if tt.unboxed_primitive() == Some(PrimitiveType::Boolean)
                            && vt.unboxed_primitive() == Some(PrimitiveType::Boolean) =>
                    {
                        self.convert_in_place(value, |_, e| conversion::unbox(e))?;
                        Type::BOOLEAN
                    }
                    BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                        let bad = || bad_operands(bop.symbol(), &tt, &vt);
                        let a = tt.unboxed_primitive().filter(PrimitiveType::is_integral).ok_or_else(bad).at(span)?;
                        let b = vt.unboxed_primitive().filter(PrimitiveType::is_integral).ok_or_else(bad).at(span)?;
                        let promoted = PrimitiveType::binary_promote(a, b).ok_or_else(bad).at(span)?;
                        self.convert_in_place(value, |_, e| conversion::to_primitive(e, promoted))?;
                        Type::Primitive(promoted)
                    }
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                        let promoted = Self::numeric_promotion(*bop, &tt, &vt).at(span)?;
                        self.convert_in_place(value, |_, e| conversion::to_primitive(e, promoted))?;
                        Type::Primitive(promoted)
                    }
                    other => return Err(bad_operands(&format!("{}=", other.symbol()), &tt, &vt)).at(span),
                };
                *op_type = Some(computed);
            }
        }
        expr.attrs.ty = Some(tt);
        Ok(())
    }

    fn conditional(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::Conditional { cond, then_expr, else_expr } = &mut expr.kind else {
            return Ok(());
        };
        self.condition(cond)?;
        self.attr_value(then_expr)?;
        self.attr_value(else_expr)?;
        let a = then_expr.ty()?.clone();
        let b = else_expr.ty()?.clone();
        if a.is_void() || b.is_void() {
            return Err(Error::type_error("'void' type not allowed here")).at(span);
        }

        let ty = if a == b {
            a.clone()
        } else if let (Some(pa), Some(pb)) = (a.unboxed_primitive(), b.unboxed_primitive()) {
            if pa.is_numeric() && pb.is_numeric() {
                let narrow = |p: PrimitiveType, other: &Expr| {
                    matches!(p, PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Char)
                        && other.attrs.constant.as_ref().map(|c| c.primitive() == Some(PrimitiveType::Int) && c.fits_in(p)).unwrap_or(false)
                };
                let result = if narrow(pa, else_expr) {
                    pa
                } else if narrow(pb, then_expr) {
                    pb
                } else {
                    PrimitiveType::binary_promote(pa, pb).ok_or_else(|| bad_operands("?:", &a, &b)).at(span)?
                };
                let result = Type::Primitive(result);
                self.convert_in_place(then_expr, |ctx, e| conversion::assign(ctx, e, &result))?;
                self.convert_in_place(else_expr, |ctx, e| conversion::assign(ctx, e, &result))?;
                result
            } else if pa == PrimitiveType::Boolean && pb == PrimitiveType::Boolean {
                self.convert_in_place(then_expr, |_, e| conversion::unbox(e))?;
                self.convert_in_place(else_expr, |_, e| conversion::unbox(e))?;
                Type::BOOLEAN
            } else {
                self.reference_conditional(then_expr, else_expr)?
            }
        } else {
            self.reference_conditional(then_expr, else_expr)?
        };

        let constant = match (&cond.attrs.constant, &then_expr.attrs.constant, &else_expr.attrs.constant) {
            (Some(Constant::Boolean(c)), Some(t), Some(e)) => Some(if *c { t.clone() } else { e.clone() }),
            _ => None,
        };
        expr.attrs.ty = Some(ty);
        expr.attrs.constant = constant;
        Ok(())
    }

    /// Both branches as references: box primitives, then take the wider type
    fn reference_conditional(&mut self, then_expr: &mut Expr, else_expr: &mut Expr) -> Result<Type> {
        for branch in [&mut *then_expr, &mut *else_expr] {
            if let Some(wrapper) = branch.ty()?.as_primitive().and_then(|p| p.boxed()) {
                let boxed = Type::Class(wrapper);
                self.convert_in_place(branch, |ctx, e| conversion::assign(ctx, e, &boxed))?;
            }
        }
        let a = then_expr.ty()?.clone();
        let b = else_expr.ty()?.clone();
        Ok(match (&a, &b) {
            (Type::Null, _) => b,
            (_, Type::Null) => a,
            _ if conversion::reference_assignable(self.ctx, &a, &b)? => b,
            _ if conversion::reference_assignable(self.ctx, &b, &a)? => a,
            _ => Type::object(),
        })
    }

    fn cast(&mut self, expr: &mut Expr) -> Result<()> {
        let span = expr.span;
        let ExprKind::Cast { ty, expr: operand } = &mut expr.kind else {
            return Ok(());
        };
        let target = ty.ty().at(span)?.clone();
        self.attr_value(operand)?;
        if operand.ty()?.is_void() {
            return Err(Error::type_error("'void' type not allowed here")).at(span);
        }
        let taken = take(operand);
        let mut converted = conversion::cast(self.ctx, taken, &target).at(span)?;
        converted.span = span;
        *expr = converted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use std::path::Path;

    fn attributed(source: &str) -> Result<(CompilationContext, Ast)> {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        let unit = ctx.compile_root(Path::new("p/A.java"))?;
        let mut ast = ctx.take_ast(unit)?;
        crate::wash::scope::ScopeResolver::new(unit).process(&mut ctx, &mut ast)?;
        Attr::new(unit).process(&mut ctx, &mut ast)?;
        Ok((ctx, ast))
    }

    fn method_body<'a>(ast: &'a Ast, name: &str) -> &'a Block {
        ast.type_decls[0]
            .body
            .iter()
            .find_map(|m| match m {
                ClassMember::Method(method) if method.name == name => method.body.as_ref(),
                _ => None,
            })
            .unwrap()
    }

    fn local_init<'a>(block: &'a Block, name: &str) -> &'a Expr {
        block
            .stmts
            .iter()
            .find_map(|s| match &s.kind {
                StmtKind::LocalVar(local) if local.name == name => local.init.as_ref(),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_numeric_promotion() {
        let (_, ast) = attributed(
            "package p; class A { void m(byte b, short s, long l) { int i = b + s; long x = i * l; double d = l / 2.0f; } }",
        )
        .unwrap();
        let body = method_body(&ast, "m");
        let sum = local_init(body, "i");
        assert_eq!(sum.attrs.ty, Some(Type::INT));
        let ExprKind::Binary { left, .. } = &sum.kind else { panic!("expected a binary node") };
        assert!(matches!(left.kind, ExprKind::Convert { kind: ConvertKind::Primitive, .. }));
        assert_eq!(local_init(body, "x").attrs.ty, Some(Type::LONG));
        // float result widened to double by assignment
        let d = local_init(body, "d");
        assert_eq!(d.attrs.ty, Some(Type::Primitive(PrimitiveType::Double)));
        assert!(matches!(d.kind, ExprKind::Convert { .. }));
    }

    #[test]
    fn test_constant_narrowing_only_in_assignment() {
        let (_, ast) = attributed("package p; class A { void m() { short s = 1 + 1; int i = 1 + 1; } }").unwrap();
        let body = method_body(&ast, "m");
        assert!(matches!(local_init(body, "s").kind, ExprKind::Literal(Constant::Short(2))));
        let int = local_init(body, "i");
        assert!(matches!(int.kind, ExprKind::Binary { .. }));
        assert_eq!(int.attrs.constant, Some(Constant::Int(2)));
    }

    #[test]
    fn test_string_concat_and_boxing() {
        let (_, ast) = attributed(
            "package p; class A { void m(int n) { String s = \"n=\" + n; Object o = n; Integer boxed = 3; int back = boxed + 1; } }",
        )
        .unwrap();
        let body = method_body(&ast, "m");
        assert!(matches!(local_init(body, "s").kind, ExprKind::Binary { op: BinaryOp::Concat, .. }));
        assert!(matches!(local_init(body, "o").kind, ExprKind::Convert { kind: ConvertKind::Box, .. }));
        let ExprKind::Binary { left, .. } = &local_init(body, "back").kind else { panic!("expected a binary node") };
        assert!(matches!(left.kind, ExprKind::Convert { kind: ConvertKind::Unbox, .. }));
    }

    #[test]
    fn test_generic_return_gets_erasure_cast() {
        let (_, ast) = attributed(
            "package p; import java.util.List; class A { String first(List<String> xs) { return xs.get(0); } }",
        )
        .unwrap();
        let body = method_body(&ast, "first");
        let StmtKind::Return(Some(value)) = &body.stmts[0].kind else { panic!("expected a return") };
        assert!(matches!(value.kind, ExprKind::Convert { kind: ConvertKind::Checkcast, .. }));
        assert_eq!(value.attrs.ty, Some(Type::string()));
    }

    #[test]
    fn test_overload_and_unqualified_call() {
        let (_, ast) = attributed(
            "package p; class A { void f(long x) {} void f(Object x) {} void m() { f(1); } }",
        )
        .unwrap();
        let body = method_body(&ast, "m");
        let StmtKind::Expr(call) = &body.stmts[0].kind else { panic!("expected a call") };
        let ExprKind::MethodCall { target, method, .. } = &call.kind else { panic!("expected a call") };
        assert!(matches!(target.as_deref().map(|t| &t.kind), Some(ExprKind::This { qualifier: None })));
        assert_eq!(method.as_ref().unwrap().sig.params, vec![Type::LONG]);
    }

    #[test]
    fn test_enum_switch_uses_ordinals() {
        let (_, ast) = attributed(
            "package p; class A { enum E { X, Y } int m(E e) { switch (e) { case Y: return 1; default: return 0; } } }",
        )
        .unwrap();
        let body = method_body(&ast, "m");
        let StmtKind::Switch { selector, cases } = &body.stmts[0].kind else { panic!("expected a switch") };
        assert!(matches!(&selector.kind, ExprKind::MethodCall { name, .. } if name == "ordinal"));
        assert_eq!(cases[0].labels[0].value, Some(1));
    }

    #[test]
    fn test_anonymous_constructor_is_synthesized() {
        let (ctx, _) = attributed(
            "package p; class A { static class B { B(int x) {} } static Object m() { return new B(4) { }; } }",
        )
        .unwrap();
        let anon = ctx.get(&ClassType::new("p", "A").nested("1")).unwrap();
        let anon = anon.borrow();
        let ctor = anon.constructors().next().unwrap();
        assert_eq!(ctor.descriptor(), "(I)V");
    }

    #[test]
    fn test_errors() {
        let err = attributed("package p; class A { int m() { } }").unwrap_err();
        assert!(err.to_string().contains("missing return statement"), "{}", err);

        let err = attributed("package p; class A { void m() { int x = \"s\"; } }").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));

        let err = attributed("package p; class A { int f; static int m() { return f; } }").unwrap_err();
        assert!(err.to_string().contains("non-static variable f"), "{}", err);

        let err = attributed("package p; class A { void m(String s) { switch (s) { default: } } }").unwrap_err();
        assert!(err.to_string().contains("switch on strings"), "{}", err);

        let err = attributed("package p; class A { void m() { g(); } }").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MethodNotFound));
    }
}
