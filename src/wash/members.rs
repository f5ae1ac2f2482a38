//! Skeleton Builder
//!
//! Fills the records entered by discovery with member signatures: one field
//! record per field declaration and enum constant, one method record per method
//! and constructor. Initializers and bodies are not looked at, except that final
//! fields of primitive or `String` type keep their initializer as a pending
//! constant for lazy evaluation.
//!
//! Constructor records get their synthetic leading parameters here (the outer
//! instance of an inner class, name and ordinal of an enum), so every unit that
//! resolves a constructor call sees the final JVM signature.
//!
//! Once all named classes of the unit are built, the bodies are walked for `new`
//! expressions with a class body and enum constants with a body. Each gets a
//! fresh nested record named after its enclosing class and a per-class counter,
//! registered before its own members are built.

use crate::ast::*;
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::env::{ClassSymbol, ConstState, FieldSymbol, MethodSymbol, Origin, PendingConstant};
use crate::common::flags::{access_flags::*, Modifiers};
use crate::common::types::{ClassType, FunctionType, Type};
use crate::consts::CONSTRUCTOR_METHOD_NAME;
use crate::error::{Error, Result, ResultExt};

pub struct SkeletonBuilder {
    unit: UnitId,
}

impl SkeletonBuilder {
    pub fn new(unit: UnitId) -> Self {
        Self { unit }
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        for decl in &mut ast.type_decls {
            self.build_named(ctx, decl)?;
        }
        let origin = match ctx.unit(self.unit).is_prelude {
            true => Origin::Prelude,
            false => Origin::Source(ctx.unit(self.unit).path.clone()),
        };
        let mut anonymous = AnonymousClasses {
            ctx,
            unit: self.unit,
            origin,
            enclosing: Vec::new(),
            static_context: false,
        };
        walk_ast(&mut anonymous, ast)
    }

    fn build_named(&mut self, ctx: &mut CompilationContext, decl: &mut ClassDecl) -> Result<()> {
        let ty = decl.symbol()?.clone();
        check_supertypes(ctx, decl, &ty).at(decl.span)?;
        build_members(ctx, self.unit, decl, &ty)?;
        for nested in decl.nested_types_mut() {
            self.build_named(ctx, nested)?;
        }
        Ok(())
    }
}

fn check_supertypes(ctx: &mut CompilationContext, decl: &ClassDecl, ty: &ClassType) -> Result<()> {
    if let Some(extends) = &decl.extends {
        let Type::Class(sup) = extends.ty()? else {
            return Err(Error::type_error(format!("unexpected type '{}' in extends clause", extends)));
        };
        let sup_class = ctx.load(sup)?;
        let sup_class = sup_class.borrow();
        if sup_class.is_interface() {
            return Err(Error::type_error("no interface expected here"));
        }
        if sup_class.is_enum() {
            return Err(Error::type_error(format!("cannot inherit from enum '{}'", sup_class.ty)));
        }
        if sup_class.flags.is_final() {
            return Err(Error::type_error(format!("cannot inherit from final '{}'", sup_class.ty)));
        }
    }
    for iface in &decl.implements {
        let Type::Class(iface_ty) = iface.ty()? else {
            return Err(Error::type_error("interface expected here"));
        };
        if !ctx.load(iface_ty)?.borrow().is_interface() {
            return Err(Error::type_error("interface expected here"));
        }
    }
    if ctx.has_cyclic_superclass(ty)? {
        return Err(Error::cyclic(format!("cyclic inheritance involving '{}'", ty)));
    }
    Ok(())
}

/// Modifiers of a member as the JVM sees them, including the implicit ones
fn member_flags(written: Modifiers, in_interface: bool, is_method: bool, has_body: bool) -> Modifiers {
    let mut flags = written;
    if in_interface {
        flags.insert(ACC_PUBLIC);
        if !is_method {
            flags.insert(ACC_STATIC | ACC_FINAL);
        } else if !has_body {
            flags.insert(ACC_ABSTRACT);
        }
    }
    flags
}

/// Build the field and method records of a class body
fn build_members(ctx: &mut CompilationContext, unit: UnitId, decl: &mut ClassDecl, ty: &ClassType) -> Result<()> {
    let class = ctx.load(ty)?;
    let (in_interface, is_enum, is_inner) = {
        let class = class.borrow();
        (class.is_interface(), class.is_enum(), class.is_inner)
    };

    for (ordinal, constant) in decl.enum_constants.iter().enumerate() {
        let flags = Modifiers::new(ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM);
        let mut field = FieldSymbol::new(&constant.name, Type::Class(ty.clone()), flags, ty.clone());
        field.ordinal = Some(ordinal as i32);
        if class.borrow().field(&constant.name).is_some() {
            return Err(Error::type_error(format!(
                "variable '{}' is already defined in '{}'",
                constant.name, ty
            )))
            .at(constant.span);
        }
        class.borrow_mut().add_field(field);
    }

    let mut has_constructor = false;
    for member in &mut decl.body {
        match member {
            ClassMember::Field(field) => {
                let flags = member_flags(field.modifiers, in_interface, false, false);
                let field_ty = field.ty.ty()?.clone();
                let mut symbol = FieldSymbol::new(&field.name, field_ty.clone(), flags, ty.clone());
                let candidate = flags.is_final() && (field_ty.as_primitive().is_some() || field_ty.is_string());
                if let (true, Some(init)) = (candidate, &field.initializer) {
                    symbol.constant = ConstState::Unevaluated(Box::new(PendingConstant {
                        init: init.clone(),
                        unit,
                        scope: ty.clone(),
                    }));
                }
                let mut class = class.borrow_mut();
                if class.field(&field.name).is_some() {
                    return Err(Error::type_error(format!(
                        "variable '{}' is already defined in '{}'",
                        field.name, ty
                    )))
                    .at(field.span);
                }
                class.add_field(symbol);
            }
            ClassMember::Method(method) => {
                let flags = member_flags(method.modifiers, in_interface, true, method.body.is_some());
                if method.body.is_none() && !flags.is_abstract() && !flags.has(ACC_NATIVE) {
                    return Err(Error::type_error("missing method body, or declare abstract")).at(method.span);
                }
                if method.body.is_some() && flags.is_abstract() {
                    return Err(Error::type_error("abstract methods cannot have a body")).at(method.span);
                }
                let mut sig = FunctionType::new(
                    method.return_type.ty()?.clone(),
                    method.params.iter().map(|p| p.ty.ty().cloned()).collect::<Result<_>>()?,
                );
                sig.type_params = method
                    .type_params
                    .iter()
                    .map(|p| Type::TypeVariable {
                        name: p.name.clone(),
                        bound: p.bounds.first().and_then(|b| b.resolved.clone()).map(Box::new),
                    })
                    .collect();
                let symbol = MethodSymbol::new(&method.name, sig, flags, ty.clone());
                if !class.borrow_mut().add_method(symbol) {
                    return Err(Error::type_error(format!(
                        "method '{}' is already defined in '{}'",
                        method.name, ty
                    )))
                    .at(method.span);
                }
            }
            ClassMember::Constructor(ctor) => {
                has_constructor = true;
                if in_interface {
                    return Err(Error::type_error("interfaces cannot have constructors")).at(ctor.span);
                }
                let mut flags = ctor.modifiers;
                if is_enum {
                    if flags.is_public() || flags.is_protected() {
                        return Err(Error::type_error("modifier not allowed here: enum constructors are private"))
                            .at(ctor.span);
                    }
                    flags.insert(ACC_PRIVATE);
                }
                let sig = FunctionType::new(
                    Type::VOID,
                    ctor.params.iter().map(|p| p.ty.ty().cloned()).collect::<Result<_>>()?,
                );
                let mut symbol = MethodSymbol::new(CONSTRUCTOR_METHOD_NAME, sig, flags, ty.clone());
                symbol.leading = leading_params(ty, is_inner, is_enum);
                if !class.borrow_mut().add_method(symbol) {
                    return Err(Error::type_error(format!("constructor is already defined in '{}'", ty)))
                        .at(ctor.span);
                }
            }
            ClassMember::Initializer(init) => {
                if in_interface {
                    return Err(Error::type_error("initializers are not allowed in interfaces")).at(init.span);
                }
            }
            ClassMember::Type(_) => {}
        }
    }

    if !has_constructor && !in_interface && !decl.is_anonymous {
        let visibility = if is_enum {
            Modifiers::new(ACC_PRIVATE)
        } else {
            Modifiers::new(decl.modifiers.bits() & (ACC_PUBLIC | ACC_PROTECTED | ACC_PRIVATE))
        };
        let mut symbol =
            MethodSymbol::new(CONSTRUCTOR_METHOD_NAME, FunctionType::new(Type::VOID, Vec::new()), visibility, ty.clone());
        symbol.leading = leading_params(ty, is_inner, is_enum);
        class.borrow_mut().add_method(symbol);
        decl.body.push(ClassMember::Constructor(ConstructorDecl {
            modifiers: visibility,
            name: decl.name.clone(),
            params: Vec::new(),
            throws: Vec::new(),
            prologue: Vec::new(),
            explicit_call: None,
            body: Block::new(Vec::new(), decl.span),
            span: decl.span,
        }));
    }

    if is_enum {
        let array = Type::array_of(Type::Class(ty.clone()));
        let flags = Modifiers::new(ACC_PUBLIC | ACC_STATIC);
        let values = MethodSymbol::new("values", FunctionType::new(array, Vec::new()), flags, ty.clone());
        let value_of = MethodSymbol::new(
            "valueOf",
            FunctionType::new(Type::Class(ty.clone()), vec![Type::string()]),
            flags,
            ty.clone(),
        );
        let mut class = class.borrow_mut();
        if !class.add_method(values) || !class.add_method(value_of) {
            return Err(Error::type_error(format!("'values' or 'valueOf' is already defined in enum '{}'", ty)))
                .at(decl.span);
        }
    }
    Ok(())
}

/// Synthetic parameters every constructor of `ty` takes ahead of its own
pub fn leading_params(ty: &ClassType, is_inner: bool, is_enum: bool) -> Vec<Type> {
    if is_inner {
        ty.outer().map(|outer| vec![Type::Class(outer)]).unwrap_or_default()
    } else if is_enum {
        vec![Type::string(), Type::INT]
    } else {
        Vec::new()
    }
}

/// Registers anonymous classes in source order
struct AnonymousClasses<'a> {
    ctx: &'a mut CompilationContext,
    unit: UnitId,
    origin: Origin,
    /// Innermost last
    enclosing: Vec<ClassType>,
    /// Whether code being walked has no enclosing instance
    static_context: bool,
}

impl AnonymousClasses<'_> {
    fn current(&self) -> Result<ClassType> {
        self.enclosing
            .last()
            .cloned()
            .ok_or_else(|| Error::internal("anonymous class outside of any class"))
    }

    fn next_name(&mut self, enclosing: &ClassType) -> Result<ClassType> {
        let class = self.ctx.load(enclosing)?;
        let mut class = class.borrow_mut();
        class.anon_counter += 1;
        Ok(enclosing.nested(class.anon_counter.to_string()))
    }

    fn register(&mut self, body: &mut ClassDecl, sup: &ClassType, is_inner: bool, owner: &ClassType) -> Result<ClassType> {
        if body.nested_types().next().is_some() {
            return Err(Error::type_error("member types of anonymous classes are not supported")).at(body.span);
        }
        let ty = self.next_name(owner)?;
        let sup_is_interface = self.ctx.load(sup)?.borrow().is_interface();
        let mut symbol = ClassSymbol::new(ty.clone(), ClassKind::Class, Modifiers::NONE, self.origin.clone());
        symbol.is_anonymous = true;
        symbol.is_inner = is_inner;
        if sup_is_interface {
            symbol.super_class = Some(Type::object());
            symbol.interfaces = vec![Type::Class(sup.clone())];
        } else {
            symbol.super_class = Some(Type::Class(sup.clone()));
        }
        self.ctx.register(symbol).at(body.span)?;
        body.symbol = Some(ty.clone());
        self.ctx.unit_mut(self.unit).classes.push(ty.clone());
        log::debug!("anonymous class {} extends {} (inner: {})", ty.binary_name(), sup, is_inner);
        build_members(self.ctx, self.unit, body, &ty)?;
        Ok(ty)
    }

    /// Walk the body of a class with the given enclosing-class entry
    fn walk_body(&mut self, ty: ClassType, class: &mut ClassDecl) -> Result<()> {
        let saved = self.static_context;
        self.enclosing.push(ty);
        let result = walk_class(self, class);
        self.enclosing.pop();
        self.static_context = saved;
        result
    }
}

impl VisitorMut for AnonymousClasses<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        if class.is_anonymous {
            // Reached through an enum constant; `New` bodies are handled in `visit_expr`
            return Ok(());
        }
        let ty = class.symbol()?.clone();
        let is_enum = class.kind == ClassKind::Enum;
        let saved = self.static_context;
        self.enclosing.push(ty.clone());
        let mut result = Ok(());
        if is_enum {
            for constant in &mut class.enum_constants {
                self.static_context = true;
                for arg in &mut constant.args {
                    result = result.and_then(|_| self.visit_expr(arg));
                }
                if let Some(body) = &mut constant.body {
                    result = result.and_then(|_| {
                        let anon = self.register(body, &ty, false, &ty)?;
                        self.walk_body(anon, body)
                    });
                }
            }
        }
        if result.is_ok() {
            for member in &mut class.body {
                result = self.visit_member(member);
                if result.is_err() {
                    break;
                }
            }
        }
        self.enclosing.pop();
        self.static_context = saved;
        result
    }

    fn visit_member(&mut self, member: &mut ClassMember) -> Result<()> {
        let in_interface = match self.enclosing.last() {
            Some(ty) => self.ctx.load(ty)?.borrow().is_interface(),
            None => false,
        };
        let saved = self.static_context;
        let result = match member {
            ClassMember::Field(field) => {
                self.static_context = field.modifiers.is_static() || in_interface;
                walk_member(self, member)
            }
            ClassMember::Method(method) => {
                self.static_context = method.modifiers.is_static();
                walk_member(self, member)
            }
            ClassMember::Initializer(init) => {
                self.static_context = init.is_static;
                walk_member(self, member)
            }
            ClassMember::Constructor(ctor) => {
                // Arguments of `this(..)`/`super(..)` have no enclosing instance yet
                self.static_context = true;
                let mut result = Ok(());
                if let Some(call) = &mut ctor.explicit_call {
                    if let Some(outer) = &mut call.outer {
                        result = self.visit_expr(outer);
                    }
                    for arg in &mut call.args {
                        result = result.and_then(|_| self.visit_expr(arg));
                    }
                }
                self.static_context = false;
                result.and_then(|_| self.visit_block(&mut ctor.body))
            }
            ClassMember::Type(class) => self.visit_class(class),
        };
        self.static_context = saved;
        result
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<()> {
        let ExprKind::New { class, outer, args, body: Some(body), .. } = &mut expr.kind else {
            return walk_expr(self, expr);
        };
        if let Some(outer) = outer {
            self.visit_expr(outer)?;
        }
        for arg in args.iter_mut() {
            self.visit_expr(arg)?;
        }
        let Some(Type::Class(sup)) = class.resolved.clone() else {
            return Err(Error::internal("anonymous class supertype was not resolved")).at(expr.span);
        };
        let sup_class = self.ctx.load(&sup)?;
        {
            let sup_class = sup_class.borrow();
            if sup_class.is_enum() {
                return Err(Error::type_error("enum classes may not be instantiated")).at(expr.span);
            }
            if sup_class.flags.is_final() {
                return Err(Error::type_error(format!("cannot inherit from final '{}'", sup_class.ty)))
                    .at(expr.span);
            }
        }
        let owner = self.current()?;
        let anon = self.register(body, &sup, !self.static_context, &owner)?;
        self.walk_body(anon, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn build(source: &str) -> CompilationContext {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/A.java", source);
        ctx.compile_root(Path::new("p/A.java")).unwrap();
        ctx
    }

    #[test]
    fn test_constructors_get_synthetic_leading_params() {
        let mut ctx = build("package p; class A { class B { B(int x) {} } enum E { X, Y; E() {} } }");
        let b = ctx.load(&ClassType::new("p", "A").nested("B")).unwrap();
        let ctor = b.borrow().constructors().next().unwrap().clone();
        assert_eq!(ctor.descriptor(), "(Lp/A;I)V");

        let e = ctx.load(&ClassType::new("p", "A").nested("E")).unwrap();
        let e = e.borrow();
        assert_eq!(e.constructors().next().unwrap().descriptor(), "(Ljava/lang/String;I)V");
        assert!(e.constructors().next().unwrap().flags.is_private());
        assert_eq!(e.field("Y").unwrap().ordinal, Some(1));
        assert!(e.methods_named("values").next().is_some());
        assert!(e.methods_named("valueOf").next().is_some());
    }

    #[test]
    fn test_default_constructor_and_constant_candidates() {
        let mut ctx = build("package p; public class A { static final int N = 1 + 1; final Object o = null; int m; }");
        let a = ctx.load(&ClassType::new("p", "A")).unwrap();
        let a = a.borrow();
        let ctor = a.constructors().next().unwrap();
        assert!(ctor.flags.is_public());
        assert!(matches!(a.field("N").unwrap().constant, ConstState::Unevaluated(_)));
        assert!(matches!(a.field("o").unwrap().constant, ConstState::NotConstant));
        assert!(matches!(a.field("m").unwrap().constant, ConstState::NotConstant));
    }

    #[test]
    fn test_anonymous_classes_are_named_per_enclosing_class() {
        let mut ctx = build(
            "package p; class A {
                Runnable r = new Runnable() { public void run() {} };
                static Object s = new Object() {};
                class B { Object o = new Object() {}; }
            }",
        );
        let first = ctx.load(&ClassType::new("p", "A").nested("1")).unwrap();
        assert!(first.borrow().is_anonymous);
        assert!(first.borrow().is_inner);
        assert_eq!(first.borrow().interfaces, vec![Type::Class(ClassType::java_lang("Runnable"))]);
        let second = ctx.load(&ClassType::new("p", "A").nested("2")).unwrap();
        assert!(!second.borrow().is_inner);
        let in_b = ctx.get(&ClassType::new("p", "A").nested("B").nested("1"));
        assert!(in_b.is_some());
    }

    #[test]
    fn test_cyclic_inheritance() {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("A.java", "class A extends B {}");
        ctx.add_virtual_source("B.java", "class B extends A {}");
        let err = ctx.compile_root(Path::new("A.java")).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::CyclicDependency));
    }

    #[test]
    fn test_extending_an_interface_is_rejected() {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("A.java", "class A extends Runnable {}");
        let err = ctx.compile_root(Path::new("A.java")).unwrap_err();
        assert!(err.to_string().contains("no interface expected here"), "{}", err);
    }
}
