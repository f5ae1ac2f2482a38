use std::fmt;

use crate::common::constant::Constant;
use crate::common::env::{FieldRef, MethodRef};
use crate::common::flags::Modifiers;
use crate::common::types::{ClassType, PrimitiveType, Type};
use crate::error::{Error, Result};
use crate::parser::{HasSpan, Span};

/// Root of one compilation unit
#[derive(Debug, Clone)]
pub struct Ast {
    pub package_decl: Option<PackageDecl>,
    pub imports: Vec<ImportDecl>,
    pub type_decls: Vec<ClassDecl>,
    pub span: Span,
}

impl Ast {
    pub fn package_name(&self) -> String {
        self.package_decl.as_ref().map(|p| p.name.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct PackageDecl {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub name: String,
    pub is_static: bool,
    pub is_wildcard: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Enum => "enum",
        })
    }
}

/// Class, interface, enum or anonymous class body
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub kind: ClassKind,
    pub modifiers: Modifiers,
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub extends: Option<TypeRef>,
    pub implements: Vec<TypeRef>,
    pub enum_constants: Vec<EnumConstant>,
    pub body: Vec<ClassMember>,
    pub span: Span,
    /// Registry identity, set by Skeleton Discovery (or Skeleton Builder for anonymous classes)
    pub symbol: Option<ClassType>,
    pub is_anonymous: bool,
}

impl ClassDecl {
    pub fn new(kind: ClassKind, name: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            modifiers: Modifiers::NONE,
            name: name.into(),
            type_params: Vec::new(),
            extends: None,
            implements: Vec::new(),
            enum_constants: Vec::new(),
            body: Vec::new(),
            span,
            symbol: None,
            is_anonymous: false,
        }
    }

    pub fn symbol(&self) -> Result<&ClassType> {
        self.symbol
            .as_ref()
            .ok_or_else(|| Error::internal(format!("class '{}' was not entered", self.name)))
    }

    pub fn nested_types(&self) -> impl Iterator<Item = &ClassDecl> {
        self.body.iter().filter_map(|m| match m {
            ClassMember::Type(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn nested_types_mut(&mut self) -> impl Iterator<Item = &mut ClassDecl> {
        self.body.iter_mut().filter_map(|m| match m {
            ClassMember::Type(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn constructors_mut(&mut self) -> impl Iterator<Item = &mut ConstructorDecl> {
        self.body.iter_mut().filter_map(|m| match m {
            ClassMember::Constructor(ctor) => Some(ctor),
            _ => None,
        })
    }

    pub fn has_constructor(&self) -> bool {
        self.body.iter().any(|m| matches!(m, ClassMember::Constructor(_)))
    }
}

#[derive(Debug, Clone)]
pub enum ClassMember {
    Field(FieldDecl),
    Method(MethodDecl),
    Constructor(ConstructorDecl),
    Initializer(Initializer),
    Type(ClassDecl),
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: String,
    pub initializer: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub type_params: Vec<TypeParam>,
    pub return_type: TypeRef,
    pub name: String,
    pub params: Vec<Parameter>,
    pub throws: Vec<TypeRef>,
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ConstructorDecl {
    pub modifiers: Modifiers,
    pub name: String,
    pub params: Vec<Parameter>,
    pub throws: Vec<TypeRef>,
    /// Statements run before the explicit constructor call (synthetic field stores)
    pub prologue: Vec<Stmt>,
    pub explicit_call: Option<CtorCall>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorCallKind {
    This,
    Super,
}

/// `this(...)` or `super(...)` at the head of a constructor
#[derive(Debug, Clone)]
pub struct CtorCall {
    pub kind: CtorCallKind,
    pub outer: Option<Box<Expr>>,
    pub args: Vec<Expr>,
    pub ctor: Option<MethodRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Initializer {
    pub is_static: bool,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<TypeRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumConstant {
    pub name: String,
    pub args: Vec<Expr>,
    pub body: Option<Box<ClassDecl>>,
    /// Constructor chosen by Type Propagation
    pub ctor: Option<MethodRef>,
    pub span: Span,
}

/// Type syntax as written, with its resolved type attached
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub syntax: TypeSyntax,
    pub array_dims: usize,
    pub span: Span,
    pub resolved: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSyntax {
    Primitive(PrimitiveType),
    /// Dotted name, each segment with its own type arguments
    Named(Vec<TypeSegment>),
    Wildcard {
        bound: Option<Box<TypeRef>>,
        is_super: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSegment {
    pub name: String,
    pub args: Vec<TypeRef>,
}

impl TypeRef {
    pub fn primitive(p: PrimitiveType, span: Span) -> Self {
        Self {
            syntax: TypeSyntax::Primitive(p),
            array_dims: 0,
            span,
            resolved: Some(Type::Primitive(p)),
        }
    }

    pub fn named(name: &str, span: Span) -> Self {
        Self {
            syntax: TypeSyntax::Named(
                name.split('.')
                    .map(|n| TypeSegment { name: n.to_string(), args: Vec::new() })
                    .collect(),
            ),
            array_dims: 0,
            span,
            resolved: None,
        }
    }

    /// Already-resolved reference created by a rewrite
    pub fn of(ty: Type, span: Span) -> Self {
        let (base, dims) = {
            let mut base = &ty;
            let mut dims = 0;
            while let Type::Array(element) = base {
                base = element;
                dims += 1;
            }
            (base.clone(), dims)
        };
        let syntax = match &base {
            Type::Primitive(p) => TypeSyntax::Primitive(*p),
            other => TypeSyntax::Named(vec![TypeSegment {
                name: other.erasure().to_string(),
                args: Vec::new(),
            }]),
        };
        Self { syntax, array_dims: dims, span, resolved: Some(ty) }
    }

    pub fn ty(&self) -> Result<&Type> {
        self.resolved
            .as_ref()
            .ok_or_else(|| Error::internal(format!("type '{}' was not resolved", self)))
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Dotted source name of a named type
    pub fn dotted_name(&self) -> Option<String> {
        match &self.syntax {
            TypeSyntax::Named(segments) => Some(
                segments.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join("."),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.syntax {
            TypeSyntax::Primitive(p) => write!(f, "{}", p)?,
            TypeSyntax::Named(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(&segment.name)?;
                    if !segment.args.is_empty() {
                        f.write_str("<")?;
                        for (j, arg) in segment.args.iter().enumerate() {
                            if j > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{}", arg)?;
                        }
                        f.write_str(">")?;
                    }
                }
            }
            TypeSyntax::Wildcard { bound: None, .. } => f.write_str("?")?,
            TypeSyntax::Wildcard { bound: Some(bound), is_super } => {
                write!(f, "? {} {}", if *is_super { "super" } else { "extends" }, bound)?
            }
        }
        for _ in 0..self.array_dims {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self { stmts, span }
    }

    pub fn empty() -> Self {
        Self { stmts: Vec::new(), span: Span::synthetic() }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self { kind: StmtKind::Expr(expr), span }
    }

    pub fn block(stmts: Vec<Stmt>, span: Span) -> Self {
        Self { kind: StmtKind::Block(Block::new(stmts, span)), span }
    }
}

#[derive(Debug, Clone)]
pub struct LocalVar {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: String,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    LocalVar(LocalVar),
    Expr(Expr),
    Block(Block),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        /// Statements evaluated before every test of `cond`
        cond_setup: Vec<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        cond_setup: Vec<Stmt>,
    },
    For {
        init: Vec<Stmt>,
        cond: Option<Expr>,
        update: Vec<Stmt>,
        body: Box<Stmt>,
        cond_setup: Vec<Stmt>,
    },
    ForEach {
        var: LocalVar,
        iterable: Expr,
        body: Box<Stmt>,
        /// Element conversion around a `LoopItem` placeholder, built by Type Propagation
        item: Option<Box<Expr>>,
    },
    Return(Option<Expr>),
    Break(Option<String>),
    Continue(Option<String>),
    Throw(Expr),
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Empty,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub labels: Vec<CaseLabel>,
    pub is_default: bool,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CaseLabel {
    pub expr: Expr,
    /// Switch key (an ordinal for enum switches), set by Type Propagation
    pub value: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub ty: TypeRef,
    pub name: String,
    pub body: Block,
    pub span: Span,
}

/// Side data attached to an expression by later passes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    pub ty: Option<Type>,
    pub constant: Option<Constant>,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub attrs: Attrs,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span, attrs: Attrs::default() }
    }

    pub fn typed(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self { kind, span, attrs: Attrs { ty: Some(ty), constant: None } }
    }

    pub fn literal(value: Constant, span: Span) -> Self {
        let ty = value.ty();
        Self {
            kind: ExprKind::Literal(value.clone()),
            span,
            attrs: Attrs { ty: Some(ty), constant: Some(value) },
        }
    }

    pub fn local(name: &str, ty: Type, span: Span) -> Self {
        Self::typed(
            ExprKind::Name { name: name.to_string(), binding: Some(Binding::Local) },
            ty,
            span,
        )
    }

    pub fn this(ty: ClassType, span: Span) -> Self {
        Self::typed(ExprKind::This { qualifier: None }, Type::Class(ty), span)
    }

    pub fn ty(&self) -> Result<&Type> {
        self.attrs
            .ty
            .as_ref()
            .ok_or_else(|| Error::internal("expression has no type attribute"))
    }

    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    /// Reads of locals, `this` and literals have no side effects and are cheap to repeat
    pub fn is_trivial(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Literal(_)
                | ExprKind::Null
                | ExprKind::This { .. }
                | ExprKind::TypeName(_)
                | ExprKind::Name { binding: Some(Binding::Local), .. }
        )
    }
}

impl HasSpan for Expr {
    fn span(&self) -> Span {
        self.span
    }
}

impl HasSpan for Stmt {
    fn span(&self) -> Span {
        self.span
    }
}

/// What a bare identifier refers to, decided by Scope Resolution
///
/// Identifiers bound to fields are rewritten into explicit field accesses instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Local variable or parameter of the enclosing method
    Local,
    /// Local of an enclosing method read from inside an anonymous class
    Captured { class: ClassType, ty: Type },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    /// String concatenation, introduced by Type Propagation
    Concat,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Concat => "+",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncDecOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl IncDecOp {
    pub fn is_increment(&self) -> bool {
        matches!(self, IncDecOp::PreInc | IncDecOp::PostInc)
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, IncDecOp::PreInc | IncDecOp::PreDec)
    }
}

/// Implicit conversion made explicit by Type Propagation; the target is the node's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertKind {
    /// Primitive widening or narrowing
    Primitive,
    /// Primitive to its wrapper
    Box,
    /// Wrapper to its primitive
    Unbox,
    /// Reference downcast, including generic erasure casts
    Checkcast,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Constant),
    Null,
    Name {
        name: String,
        binding: Option<Binding>,
    },
    FieldAccess {
        target: Box<Expr>,
        name: String,
        field: Option<FieldRef>,
    },
    MethodCall {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        method: Option<MethodRef>,
        is_super: bool,
    },
    New {
        class: TypeRef,
        outer: Option<Box<Expr>>,
        args: Vec<Expr>,
        body: Option<Box<ClassDecl>>,
        ctor: Option<MethodRef>,
        /// Values of captured locals, in the created class's capture order
        captured: Vec<Expr>,
    },
    NewArray {
        elem: TypeRef,
        dims: Vec<Expr>,
        extra_dims: usize,
        init: Option<Vec<Expr>>,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLength(Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    IncDec {
        op: IncDecOp,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
        /// Type the compound operation is computed in
        op_type: Option<Type>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Cast {
        ty: TypeRef,
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    This {
        qualifier: Option<TypeRef>,
    },
    Super,
    /// Package prefix of a dotted name, only valid as a field-access target
    PackageName(String),
    /// Type used as the target of a static member access
    TypeName(TypeRef),
    Convert {
        kind: ConvertKind,
        expr: Box<Expr>,
    },
    /// Current element of an enhanced `for`, replaced when the loop is desugared
    LoopItem,
}
