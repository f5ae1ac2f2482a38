//! Shared compiler state and the type model
//!
//! The compilation context (class registry, units, work queue), the symbol
//! records it stores, search-path lookup and the conversion rules every stage
//! agrees on.

pub mod classfile;
pub mod classpath;
pub mod compilation_context;
pub mod const_eval;
pub mod constant;
pub mod conversion;
pub mod env;
pub mod flags;
pub mod import;
pub mod prelude;
pub mod types;

pub use compilation_context::{CompilationContext, CompilationUnit, UnitId};
pub use constant::Constant;
pub use env::{ClassRef, ClassSymbol, CompilePhase, FieldRef, FieldSymbol, MethodRef, MethodSymbol};
pub use types::{ClassType, FunctionType, PrimitiveType, Type};
