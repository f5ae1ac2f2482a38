//! Symbol records
//!
//! Class records ("skeletons") are owned by the class registry and shared as
//! `ClassRef` handles, so every holder observes later in-place updates made by
//! Skeleton Builder and the structural rewrites. Field and method records name
//! their declaring class by identity only.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{ClassKind, Expr};
use crate::common::constant::Constant;
use crate::common::flags::{access_flags, Modifiers};
use crate::common::types::{ClassType, FunctionType, Type};

pub type ClassRef = Rc<RefCell<ClassSymbol>>;

/// Lifecycle of a class within one compiler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompilePhase {
    Discovered,
    TypeResolved,
    SkeletonBuilt,
    ScopeResolved,
    TypePropagated,
    Rewritten,
    Lowered,
}

impl CompilePhase {
    pub fn name(&self) -> &'static str {
        match self {
            CompilePhase::Discovered => "discover",
            CompilePhase::TypeResolved => "resolve-types",
            CompilePhase::SkeletonBuilt => "build-skeleton",
            CompilePhase::ScopeResolved => "resolve-scopes",
            CompilePhase::TypePropagated => "propagate-types",
            CompilePhase::Rewritten => "rewrite",
            CompilePhase::Lowered => "lower",
        }
    }
}

impl fmt::Display for CompilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a class record came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Source(PathBuf),
    Compiled(PathBuf),
    Prelude,
}

/// Compile-time constant state of a field
#[derive(Debug, Clone)]
pub enum ConstState {
    NotConstant,
    /// Candidate whose initializer has not been evaluated yet
    Unevaluated(Box<PendingConstant>),
    Evaluating,
    Value(Constant),
}

impl ConstState {
    pub fn value(&self) -> Option<&Constant> {
        match self {
            ConstState::Value(c) => Some(c),
            _ => None,
        }
    }
}

/// Initializer of a constant candidate, with the scope it is evaluated in
#[derive(Debug, Clone)]
pub struct PendingConstant {
    pub init: Expr,
    pub unit: usize,
    pub scope: ClassType,
}

#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub name: String,
    pub ty: Type,
    pub flags: Modifiers,
    pub owner: ClassType,
    pub constant: ConstState,
    /// Declaration index of an enum constant
    pub ordinal: Option<i32>,
}

impl FieldSymbol {
    pub fn new(name: impl Into<String>, ty: Type, flags: Modifiers, owner: ClassType) -> Self {
        Self {
            name: name.into(),
            ty,
            flags,
            owner,
            constant: ConstState::NotConstant,
            ordinal: None,
        }
    }

    pub fn to_ref(&self) -> FieldRef {
        FieldRef {
            owner: self.owner.clone(),
            name: self.name.clone(),
            ty: self.ty.clone(),
            flags: self.flags,
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub name: String,
    /// Source-level signature
    pub sig: FunctionType,
    pub flags: Modifiers,
    pub owner: ClassType,
    pub is_constructor: bool,
    /// Synthetic parameters prepended by rewrites (outer instance, enum name/ordinal)
    pub leading: Vec<Type>,
    /// Synthetic parameters appended by rewrites (captured locals)
    pub trailing: Vec<Type>,
}

impl MethodSymbol {
    pub fn new(name: impl Into<String>, sig: FunctionType, flags: Modifiers, owner: ClassType) -> Self {
        let name = name.into();
        Self {
            is_constructor: name == crate::consts::CONSTRUCTOR_METHOD_NAME,
            name,
            sig,
            flags,
            owner,
            leading: Vec::new(),
            trailing: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn to_ref(&self, owner_kind: ClassKind) -> MethodRef {
        MethodRef {
            owner: self.owner.clone(),
            name: self.name.clone(),
            sig: self.sig.clone(),
            flags: self.flags,
            owner_is_interface: owner_kind == ClassKind::Interface,
            leading: self.leading.clone(),
            trailing: self.trailing.clone(),
        }
    }

    /// JVM-level descriptor including synthetic parameters
    pub fn descriptor(&self) -> String {
        jvm_signature(&self.leading, &self.sig, &self.trailing).descriptor()
    }
}

fn jvm_signature(leading: &[Type], sig: &FunctionType, trailing: &[Type]) -> FunctionType {
    let params = leading
        .iter()
        .chain(sig.params.iter())
        .chain(trailing.iter())
        .map(Type::erasure)
        .collect();
    FunctionType::new(sig.return_type.erasure(), params)
}

/// Resolved field reference attached to the AST
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub owner: ClassType,
    pub name: String,
    /// Declared (unsubstituted) type
    pub ty: Type,
    pub flags: Modifiers,
}

impl FieldRef {
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }
}

/// Resolved method or constructor reference attached to the AST
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub owner: ClassType,
    pub name: String,
    pub sig: FunctionType,
    pub flags: Modifiers,
    pub owner_is_interface: bool,
    pub leading: Vec<Type>,
    pub trailing: Vec<Type>,
}

impl MethodRef {
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == crate::consts::CONSTRUCTOR_METHOD_NAME
    }

    /// Erased signature including synthetic parameters
    pub fn jvm_signature(&self) -> FunctionType {
        jvm_signature(&self.leading, &self.sig, &self.trailing)
    }

    pub fn descriptor(&self) -> String {
        self.jvm_signature().descriptor()
    }
}

/// Local of an enclosing method captured by an anonymous class
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedVar {
    pub name: String,
    pub ty: Type,
}

/// What a synthesized accessor gives access to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessorKey {
    Read(String),
    Write(String),
    Invoke { name: String, descriptor: String },
}

impl AccessorKey {
    /// Whether both keys reach the same member; a field's read and write bridges share a number
    pub fn same_member(&self, other: &AccessorKey) -> bool {
        match (self, other) {
            (AccessorKey::Read(a) | AccessorKey::Write(a), AccessorKey::Read(b) | AccessorKey::Write(b)) => a == b,
            (a @ AccessorKey::Invoke { .. }, b @ AccessorKey::Invoke { .. }) => a == b,
            _ => false,
        }
    }
}

/// Static package-visible bridge to a private member, memoized per key
#[derive(Debug, Clone)]
pub struct Accessor {
    pub key: AccessorKey,
    /// `N` of `access$N00`, one per member
    pub index: usize,
    pub name: String,
    pub sig: FunctionType,
}

#[derive(Debug, Clone)]
pub struct ClassSymbol {
    /// Erased identity
    pub ty: ClassType,
    pub kind: ClassKind,
    pub flags: Modifiers,
    pub type_params: Vec<Type>,
    /// `None` only for the root object type
    pub super_class: Option<Type>,
    pub interfaces: Vec<Type>,
    pub fields: Vec<FieldSymbol>,
    pub methods: Vec<MethodSymbol>,
    pub nested: Vec<ClassType>,
    pub phase: CompilePhase,
    pub origin: Origin,
    /// Non-static nested class holding a reference to its enclosing instance
    pub is_inner: bool,
    pub is_anonymous: bool,
    pub anon_counter: u32,
    pub captures: Vec<CapturedVar>,
    pub accessors: Vec<Accessor>,
}

impl ClassSymbol {
    pub fn new(ty: ClassType, kind: ClassKind, flags: Modifiers, origin: Origin) -> Self {
        Self {
            ty,
            kind,
            flags,
            type_params: Vec::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            nested: Vec::new(),
            phase: CompilePhase::Discovered,
            origin,
            is_inner: false,
            is_anonymous: false,
            anon_counter: 0,
            captures: Vec::new(),
            accessors: Vec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn is_enum(&self) -> bool {
        self.kind == ClassKind::Enum
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract() || self.is_interface()
    }

    /// The class type parameterized by its own type variables
    pub fn this_type(&self) -> ClassType {
        self.ty.with_args(self.type_params.clone())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSymbol> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSymbol> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodSymbol> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodSymbol> {
        self.methods.iter().filter(|m| m.is_constructor)
    }

    pub fn add_field(&mut self, field: FieldSymbol) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Add a method unless one with the same erased descriptor exists
    pub fn add_method(&mut self, method: MethodSymbol) -> bool {
        let descriptor = method.sig.erased().descriptor();
        let exists = self
            .methods
            .iter()
            .any(|m| m.name == method.name && m.sig.erased().descriptor() == descriptor);
        if !exists {
            self.methods.push(method);
        }
        !exists
    }

    pub fn access_flags(&self) -> u16 {
        let mut flags = self.flags;
        match self.kind {
            ClassKind::Interface => flags.insert(access_flags::ACC_INTERFACE | access_flags::ACC_ABSTRACT),
            ClassKind::Enum => flags.insert(access_flags::ACC_ENUM | access_flags::ACC_SUPER),
            ClassKind::Class => flags.insert(access_flags::ACC_SUPER),
        }
        flags.remove(access_flags::ACC_STATIC | access_flags::ACC_PRIVATE | access_flags::ACC_PROTECTED);
        flags.bits()
    }
}

/// Information about a local variable visible in the symbol environment
#[derive(Debug, Clone, PartialEq)]
pub struct LocalInfo {
    pub ty: Type,
    pub is_final: bool,
    /// Value of a constant variable (`final` with a constant initializer)
    pub constant: Option<Constant>,
}

/// Scope-chained mapping from identifiers to local variable types
///
/// A block takes a copy on entry and drops it on exit, so declarations never
/// leak into sibling scopes.
#[derive(Debug, Clone, Default)]
pub struct SymbolEnv {
    vars: HashMap<String, LocalInfo>,
}

impl SymbolEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: Type, is_final: bool) {
        self.vars.insert(name.into(), LocalInfo { ty, is_final, constant: None });
    }

    pub fn declare_constant(&mut self, name: impl Into<String>, ty: Type, value: Constant) {
        self.vars.insert(name.into(), LocalInfo { ty, is_final: true, constant: Some(value) });
    }

    pub fn lookup(&self, name: &str) -> Option<&LocalInfo> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::PrimitiveType;

    #[test]
    fn test_block_copy_does_not_leak() {
        let mut outer = SymbolEnv::new();
        outer.declare("a", Type::INT, false);
        {
            let mut inner = outer.clone();
            inner.declare("b", Type::LONG, false);
            assert!(inner.contains("a"));
            assert!(inner.contains("b"));
        }
        assert!(!outer.contains("b"));
    }

    #[test]
    fn test_method_descriptor_includes_synthetic_params() {
        let owner = ClassType::new("p", "Outer").nested("Inner");
        let mut ctor = MethodSymbol::new(
            "<init>",
            FunctionType::new(Type::VOID, vec![Type::Primitive(PrimitiveType::Int)]),
            Modifiers::NONE,
            owner,
        );
        ctor.leading.push(Type::Class(ClassType::new("p", "Outer")));
        ctor.trailing.push(Type::string());
        assert!(ctor.is_constructor);
        assert_eq!(ctor.descriptor(), "(Lp/Outer;ILjava/lang/String;)V");
    }
}
