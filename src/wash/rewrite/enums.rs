//! Enum desugaring
//!
//! For every enum class `E`:
//!
//! - a private static `$VALUES` array field, and a static initializer (placed
//!   ahead of every other static initializer) that creates one instance per
//!   constant with `(name, ordinal, args...)` and then fills `$VALUES`
//! - bodies for the `values()` and `valueOf(String)` methods recorded by the
//!   Skeleton Builder
//! - every constructor takes `(String name, int ordinal)` first: it passes them
//!   on to `this(...)` or to `super(name, ordinal)` of `java.lang.Enum`
//!
//! Constant bodies become ordinary nested classes of `E`.

use crate::ast::*;
use crate::common::compilation_context::CompilationContext;
use crate::common::constant::Constant;
use crate::common::env::{FieldRef, FieldSymbol};
use crate::common::flags::{access_flags::*, Modifiers};
use crate::common::types::{ClassType, Type};
use crate::consts::{
    CONSTRUCTOR_METHOD_NAME, ENUM, ENUM_NAME_PARAM, ENUM_ORDINAL_PARAM, ENUM_VALUES_FIELD,
    ILLEGAL_ARGUMENT_EXCEPTION,
};
use crate::error::{Error, Result, ResultExt};
use crate::parser::Span;
use crate::wash::rewrite::{assign, call, field_named, local_var, method_named, static_field, type_name};

pub struct EnumDesugar;

impl EnumDesugar {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&mut self, ctx: &mut CompilationContext, ast: &mut Ast) -> Result<()> {
        walk_ast(&mut Desugar { ctx }, ast)
    }
}

impl Default for EnumDesugar {
    fn default() -> Self {
        Self::new()
    }
}

struct Desugar<'a> {
    ctx: &'a mut CompilationContext,
}

impl VisitorMut for Desugar<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> Result<()> {
        walk_class(self, class)?;
        if class.kind == ClassKind::Enum {
            self.desugar(class).at(class.span)?;
        }
        Ok(())
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

impl Desugar<'_> {
    fn desugar(&mut self, decl: &mut ClassDecl) -> Result<()> {
        let ty = decl.symbol()?.clone();
        let span = decl.span;
        let class = self.ctx.load(&ty)?;
        if class.borrow().field(ENUM_VALUES_FIELD).is_some() {
            return Ok(());
        }
        let array = Type::array_of(Type::Class(ty.clone()));
        class.borrow_mut().add_field(FieldSymbol::new(
            ENUM_VALUES_FIELD,
            array.clone(),
            Modifiers::new(ACC_PRIVATE | ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC),
            ty.clone(),
        ));
        let values = field_named(self.ctx, &ty, ENUM_VALUES_FIELD)?;

        self.constructors(decl)?;

        let mut init = Vec::new();
        let mut elements = Vec::new();
        let constants = std::mem::take(&mut decl.enum_constants);
        for (ordinal, constant) in constants.into_iter().enumerate() {
            let EnumConstant { name, args, body, ctor, span } = constant;
            let ctor = ctor
                .ok_or_else(|| Error::internal(format!("enum constant '{}' has no constructor", name)))
                .at(span)?;
            let created = match &body {
                Some(body) => body.symbol()?.clone(),
                None => ty.clone(),
            };
            let mut full = vec![
                Expr::literal(Constant::String(name.clone()), span),
                Expr::literal(Constant::Int(ordinal as i32), span),
            ];
            full.extend(args);
            let instance = Expr::typed(
                ExprKind::New {
                    class: TypeRef::of(Type::Class(created.clone()), span),
                    outer: None,
                    args: full,
                    body: None,
                    ctor: Some(ctor),
                    captured: Vec::new(),
                },
                Type::Class(created),
                span,
            );
            let field = field_named(self.ctx, &ty, &name)?;
            init.push(assign(static_field(field.clone(), span), instance, span)?);
            elements.push(static_field(field, span));
            if let Some(body) = body {
                decl.body.push(ClassMember::Type(*body));
            }
        }
        let all = Expr::typed(
            ExprKind::NewArray {
                elem: TypeRef::of(Type::Class(ty.clone()), span),
                dims: Vec::new(),
                extra_dims: 1,
                init: Some(elements),
            },
            array,
            span,
        );
        init.push(assign(static_field(values.clone(), span), all, span)?);
        log::debug!("{}: {} enum constants", ty.binary_name(), init.len() - 1);

        decl.body.insert(
            0,
            ClassMember::Initializer(Initializer { is_static: true, body: Block::new(init, span), span }),
        );
        let values_method = self.values_method(&ty, &values, span)?;
        let value_of = self.value_of_method(&ty, &values, span)?;
        decl.body.push(ClassMember::Method(values_method));
        decl.body.push(ClassMember::Method(value_of));
        Ok(())
    }

    fn constructors(&mut self, decl: &mut ClassDecl) -> Result<()> {
        let base = method_named(self.ctx, &ClassType::java_lang(ENUM), CONSTRUCTOR_METHOD_NAME, 2)?;
        for ctor in decl.constructors_mut() {
            let span = ctor.span;
            ctor.params.splice(
                0..0,
                [
                    synthetic_param(ENUM_NAME_PARAM, Type::string(), span),
                    synthetic_param(ENUM_ORDINAL_PARAM, Type::INT, span),
                ],
            );
            let forwarded = [
                Expr::local(ENUM_NAME_PARAM, Type::string(), span),
                Expr::local(ENUM_ORDINAL_PARAM, Type::INT, span),
            ];
            match &mut ctor.explicit_call {
                Some(call) => {
                    call.args.splice(0..0, forwarded);
                }
                None => {
                    ctor.explicit_call = Some(CtorCall {
                        kind: CtorCallKind::Super,
                        outer: None,
                        args: forwarded.into(),
                        ctor: Some(base.clone()),
                        span,
                    })
                }
            }
        }
        Ok(())
    }

    fn static_method(name: &str, return_type: Type, params: Vec<Parameter>, body: Vec<Stmt>, span: Span) -> MethodDecl {
        MethodDecl {
            modifiers: Modifiers::new(ACC_PUBLIC | ACC_STATIC),
            type_params: Vec::new(),
            return_type: TypeRef::of(return_type, span),
            name: name.to_string(),
            params,
            throws: Vec::new(),
            body: Some(Block::new(body, span)),
            span,
        }
    }

    /// `E[] copy = new E[$VALUES.length]; System.arraycopy(...); return copy;`
    fn values_method(&mut self, ty: &ClassType, values: &FieldRef, span: Span) -> Result<MethodDecl> {
        let array = Type::array_of(Type::Class(ty.clone()));
        let length = || {
            Expr::typed(ExprKind::ArrayLength(Box::new(static_field(values.clone(), span))), Type::INT, span)
        };
        let copy = "$values";
        let created = Expr::typed(
            ExprKind::NewArray {
                elem: TypeRef::of(Type::Class(ty.clone()), span),
                dims: vec![length()],
                extra_dims: 0,
                init: None,
            },
            array.clone(),
            span,
        );
        let system = ClassType::java_lang("System");
        let arraycopy = method_named(self.ctx, &system, "arraycopy", 5)?;
        let zero = || Expr::literal(Constant::Int(0), span);
        let copying = call(
            Some(type_name(&system, span)),
            arraycopy,
            vec![
                static_field(values.clone(), span),
                zero(),
                Expr::local(copy, array.clone(), span),
                zero(),
                length(),
            ],
            Type::VOID,
            span,
        );
        let body = vec![
            local_var(copy, array.clone(), Some(created), span),
            Stmt::expr(copying),
            Stmt::new(StmtKind::Return(Some(Expr::local(copy, array.clone(), span))), span),
        ];
        Ok(Self::static_method("values", array, Vec::new(), body, span))
    }

    /// Linear search of `$VALUES` by `name()`
    fn value_of_method(&mut self, ty: &ClassType, values: &FieldRef, span: Span) -> Result<MethodDecl> {
        let element = Type::Class(ty.clone());
        let string = ClassType::java_lang("String");
        let name_of = method_named(self.ctx, ty, "name", 0)?;
        let equals = method_named(self.ctx, &string, "equals", 1)?;
        let candidate = "$constant";
        let param = "name";

        let constant_name = call(Some(Expr::local(candidate, element.clone(), span)), name_of, Vec::new(), Type::string(), span);
        let matches = call(
            Some(constant_name),
            equals,
            vec![Expr::local(param, Type::string(), span)],
            Type::BOOLEAN,
            span,
        );
        let found = Stmt::new(
            StmtKind::If {
                cond: matches,
                then_branch: Box::new(Stmt::new(
                    StmtKind::Return(Some(Expr::local(candidate, element.clone(), span))),
                    span,
                )),
                else_branch: None,
            },
            span,
        );
        let search = Stmt::new(
            StmtKind::ForEach {
                var: LocalVar {
                    modifiers: Modifiers::NONE,
                    ty: TypeRef::of(element.clone(), span),
                    name: candidate.to_string(),
                    init: None,
                },
                iterable: static_field(values.clone(), span),
                body: Box::new(Stmt::block(vec![found], span)),
                item: Some(Box::new(Expr::typed(ExprKind::LoopItem, element.clone(), span))),
            },
            span,
        );

        let exception = ClassType::java_lang(ILLEGAL_ARGUMENT_EXCEPTION);
        let ctor = method_named(self.ctx, &exception, CONSTRUCTOR_METHOD_NAME, 1)?;
        let thrown = Expr::typed(
            ExprKind::New {
                class: TypeRef::of(Type::Class(exception.clone()), span),
                outer: None,
                args: vec![Expr::local(param, Type::string(), span)],
                body: None,
                ctor: Some(ctor),
                captured: Vec::new(),
            },
            Type::Class(exception),
            span,
        );
        let body = vec![search, Stmt::new(StmtKind::Throw(thrown), span)];
        let params = vec![Parameter {
            modifiers: Modifiers::NONE,
            ty: TypeRef::of(Type::string(), span),
            name: param.to_string(),
            span,
        }];
        Ok(Self::static_method("valueOf", element, params, body, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::Path;

    fn desugared(source: &str) -> (CompilationContext, Ast) {
        let mut ctx = CompilationContext::new(Config::default());
        ctx.add_virtual_source("p/E.java", source);
        let unit = ctx.compile_root(Path::new("p/E.java")).unwrap();
        let mut ast = ctx.take_ast(unit).unwrap();
        crate::wash::scope::ScopeResolver::new(unit).process(&mut ctx, &mut ast).unwrap();
        crate::wash::attr::Attr::new(unit).process(&mut ctx, &mut ast).unwrap();
        EnumDesugar::new().process(&mut ctx, &mut ast).unwrap();
        (ctx, ast)
    }

    #[test]
    fn test_constants_are_created_in_static_initializer() {
        let (ctx, ast) = desugared("package p; enum E { A, B(2) { }; E() { } E(int x) { this(); } }");
        let decl = &ast.type_decls[0];
        assert!(decl.enum_constants.is_empty());
        let ClassMember::Initializer(init) = &decl.body[0] else { panic!("expected the static initializer") };
        assert!(init.is_static);
        assert_eq!(init.body.stmts.len(), 3);
        let StmtKind::Expr(first) = &init.body.stmts[0].kind else { panic!("expected an assignment") };
        let ExprKind::Assign { value, .. } = &first.kind else { panic!("expected an assignment") };
        let ExprKind::New { args, .. } = &value.kind else { panic!("expected an instance creation") };
        assert!(matches!(&args[0].kind, ExprKind::Literal(Constant::String(s)) if s == "A"));
        assert!(matches!(args[1].kind, ExprKind::Literal(Constant::Int(0))));

        // the body of B is now a nested class
        assert!(decl.nested_types().any(|t| t.symbol.as_ref() == Some(&ClassType::new("p", "E").nested("1"))));

        let class = ctx.get(&ClassType::new("p", "E")).unwrap();
        assert!(class.borrow().field(ENUM_VALUES_FIELD).is_some());
    }

    #[test]
    fn test_constructors_take_name_and_ordinal() {
        let (_, mut ast) = desugared("package p; enum E { A; E() { } E(int x) { this(); } }");
        let decl = &mut ast.type_decls[0];
        for ctor in decl.constructors_mut() {
            assert_eq!(ctor.params[0].name, ENUM_NAME_PARAM);
            assert_eq!(ctor.params[1].name, ENUM_ORDINAL_PARAM);
            let call = ctor.explicit_call.as_ref().unwrap();
            assert_eq!(call.args.len(), 2);
            match call.kind {
                CtorCallKind::Super => assert_eq!(call.ctor.as_ref().unwrap().owner, ClassType::java_lang(ENUM)),
                CtorCallKind::This => assert_eq!(ctor.params.len(), 3),
            }
        }
    }

    #[test]
    fn test_values_and_value_of_have_bodies() {
        let (_, ast) = desugared("package p; enum E { A, B }");
        let methods: Vec<&MethodDecl> = ast.type_decls[0]
            .body
            .iter()
            .filter_map(|m| match m {
                ClassMember::Method(m) => Some(m),
                _ => None,
            })
            .collect();
        assert!(methods.iter().any(|m| m.name == "values" && m.body.is_some()));
        assert!(methods.iter().any(|m| m.name == "valueOf" && m.params.len() == 1));
    }

    #[test]
    fn test_rerun_is_harmless() {
        let (mut ctx, mut ast) = desugared("package p; enum E { A }");
        let members = ast.type_decls[0].body.len();
        EnumDesugar::new().process(&mut ctx, &mut ast).unwrap();
        assert_eq!(ast.type_decls[0].body.len(), members);
    }
}
