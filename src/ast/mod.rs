//! Abstract syntax tree
//!
//! Declarations, statements and expressions are closed sum types. Each node carries
//! its source span; expressions additionally carry an attribute bag (`Attrs`) that
//! Type Propagation fills with the resolved type and compile-time constant.

mod nodes;
mod visitor;

pub use nodes::*;
pub use visitor::*;
