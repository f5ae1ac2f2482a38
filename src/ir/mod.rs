//! Typed intermediate representation
//!
//! The hand-off format for a bytecode emitter. Each class carries resolved
//! supertypes, erased member descriptors and access-flag words. Method bodies
//! use a reduced statement set: locals are numbered slots, every conversion is
//! an explicit node or call, and expressions have no side effects other than
//! invocations and object creation.

mod printer;
mod sink;

pub use printer::*;
pub use sink::*;

use std::path::PathBuf;

use crate::ast::{BinaryOp, UnaryOp};
use crate::common::constant::Constant;
use crate::common::types::{ClassType, PrimitiveType, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct IrClass {
    pub name: ClassType,
    pub flags: u16,
    /// `None` only for the root object type
    pub super_class: Option<ClassType>,
    pub interfaces: Vec<ClassType>,
    /// Lexically enclosing class of a nested class
    pub outer: Option<ClassType>,
    /// Holds a reference to an enclosing instance
    pub is_inner: bool,
    pub fields: Vec<IrField>,
    pub methods: Vec<IrMethod>,
    pub source: PathBuf,
}

impl IrClass {
    pub fn field(&self, name: &str) -> Option<&IrField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&IrMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a IrMethod> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrField {
    pub name: String,
    pub ty: Type,
    pub descriptor: String,
    pub flags: u16,
    /// `ConstantValue` of a compile-time constant field
    pub constant: Option<Constant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrLocal {
    pub slot: u16,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrMethod {
    pub name: String,
    pub descriptor: String,
    pub flags: u16,
    /// Parameters first (after `this`), then every other local in declaration order
    pub locals: Vec<IrLocal>,
    pub max_locals: u16,
    /// `None` for abstract and native methods
    pub body: Option<Vec<IrStmt>>,
}

impl IrMethod {
    pub fn is_static(&self) -> bool {
        self.flags & crate::common::flags::access_flags::ACC_STATIC != 0
    }

    pub fn statements(&self) -> &[IrStmt] {
        self.body.as_deref().unwrap_or(&[])
    }
}

/// Field or method named by owner, name and erased descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: ClassType,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: ClassType, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self { owner: owner.erased(), name: name.into(), descriptor: descriptor.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    /// Constructors, private methods and `super.m()`
    Special,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrCase {
    pub keys: Vec<i32>,
    pub is_default: bool,
    pub body: Vec<IrStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrCatch {
    pub class: ClassType,
    pub slot: u16,
    pub body: Vec<IrStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrStmt {
    Eval(IrExpr),
    Store {
        slot: u16,
        ty: Type,
        value: IrExpr,
    },
    PutField {
        field: MemberRef,
        target: IrExpr,
        value: IrExpr,
    },
    PutStatic {
        field: MemberRef,
        value: IrExpr,
    },
    ArrayStore {
        array: IrExpr,
        index: IrExpr,
        value: IrExpr,
        elem: Type,
    },
    If {
        cond: IrExpr,
        then_branch: Vec<IrStmt>,
        else_branch: Vec<IrStmt>,
    },
    /// `setup` runs before every evaluation of `cond`; `test_first` is false for do-while
    Loop {
        label: Option<String>,
        setup: Vec<IrStmt>,
        cond: Option<IrExpr>,
        body: Vec<IrStmt>,
        update: Vec<IrStmt>,
        test_first: bool,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Return(Option<IrExpr>),
    Throw(IrExpr),
    Switch {
        key: IrExpr,
        cases: Vec<IrCase>,
    },
    Try {
        body: Vec<IrStmt>,
        catches: Vec<IrCatch>,
        finally: Option<Vec<IrStmt>>,
    },
    Block(Vec<IrStmt>),
    Labeled {
        label: String,
        body: Vec<IrStmt>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrExpr {
    Const(Constant),
    Null,
    Load {
        slot: u16,
        ty: Type,
    },
    This,
    GetField {
        field: MemberRef,
        target: Box<IrExpr>,
    },
    GetStatic {
        field: MemberRef,
    },
    Invoke {
        kind: InvokeKind,
        method: MemberRef,
        target: Option<Box<IrExpr>>,
        args: Vec<IrExpr>,
    },
    New {
        class: ClassType,
        descriptor: String,
        args: Vec<IrExpr>,
    },
    /// `new T[d0][d1]...`; `ty` is the created array type
    NewArray {
        ty: Type,
        dims: Vec<IrExpr>,
    },
    ArrayLiteral {
        ty: Type,
        elements: Vec<IrExpr>,
    },
    ArrayLoad {
        array: Box<IrExpr>,
        index: Box<IrExpr>,
        elem: Type,
    },
    ArrayLength(Box<IrExpr>),
    Unary {
        op: UnaryOp,
        operand: Box<IrExpr>,
        ty: PrimitiveType,
    },
    /// `ty` is the operand type after promotion
    Binary {
        op: BinaryOp,
        left: Box<IrExpr>,
        right: Box<IrExpr>,
        ty: Type,
    },
    Conditional {
        cond: Box<IrExpr>,
        then_expr: Box<IrExpr>,
        else_expr: Box<IrExpr>,
    },
    Convert {
        from: PrimitiveType,
        to: PrimitiveType,
        expr: Box<IrExpr>,
    },
    Checkcast {
        ty: Type,
        expr: Box<IrExpr>,
    },
    InstanceOf {
        ty: Type,
        expr: Box<IrExpr>,
    },
    /// String concatenation of typed parts
    Concat(Vec<(IrExpr, Type)>),
}
