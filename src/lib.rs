//! jfront: semantic analysis and lowering for a Java-like language
//!
//! ## Architecture
//!
//! - **parser**: logos lexer and recursive-descent parser producing the AST
//! - **ast**: syntax tree with per-node attributes filled in by later stages
//! - **common**: class registry, search path, type model, conversions
//! - **wash**: the stage pipeline, one struct per stage
//! - **ir**: the typed intermediate representation handed to an emitter
//!
//! ## Compilation flow
//!
//! ```text
//! source → parse → discover → resolve types → build skeletons      (eagerly, per unit)
//!                → resolve scopes → propagate types → rewrite → lower   (queued)
//! ```
//!
//! Units reached through type references are opened on demand and join the
//! same queue, so compiling one file compiles everything it depends on.

pub mod ast;
pub mod common;
pub mod config;
pub mod consts;
pub mod error;
pub mod ir;
pub mod parser;
pub mod wash;

use std::path::{Path, PathBuf};

pub use common::CompilationContext;
pub use config::Config;
pub use error::{Error, ErrorKind, Result, SyntaxError};
pub use ir::{ClassSink, DirectorySink, IrClass, MemorySink};

/// Compile the given files and every unit they reach, handing each lowered class
/// to `sink`; returns the number of classes produced
pub fn compile_files(config: Config, files: &[PathBuf], sink: &mut impl ClassSink) -> Result<usize> {
    let ctx = CompilationContext::new(config);
    run(ctx, files.iter().map(PathBuf::as_path), sink)
}

/// Compile in-memory sources given as `(path, text)` pairs, paths relative to a
/// source root (`p/q/C.java`); every pair is a root
pub fn compile_sources(config: Config, sources: &[(&str, &str)], sink: &mut impl ClassSink) -> Result<usize> {
    let mut ctx = CompilationContext::new(config);
    for (path, text) in sources {
        ctx.add_virtual_source(*path, *text);
    }
    run(ctx, sources.iter().map(|(path, _)| Path::new(*path)), sink)
}

/// Compile a single in-memory unit and return its classes
pub fn compile(path: &str, source: &str) -> Result<Vec<IrClass>> {
    let mut sink = MemorySink::new();
    compile_sources(Config::default(), &[(path, source)], &mut sink)?;
    Ok(sink.classes)
}

fn run<'a>(
    mut ctx: CompilationContext,
    roots: impl Iterator<Item = &'a Path>,
    sink: &mut impl ClassSink,
) -> Result<usize> {
    for root in roots {
        ctx.compile_root(root)?;
    }
    ctx.drain()?;
    let classes = ctx.take_output();
    let count = classes.len();
    for class in classes {
        sink.accept(class)?;
    }
    log::debug!("{} classes from {} units", count, ctx.units().len());
    Ok(count)
}
