//! Semantic analysis and lowering pipeline
//!
//! Each stage is a struct with a `process` method that rewrites one unit's AST in
//! place and updates the shared class registry:
//!
//! - Enter: Skeleton Discovery, one placeholder record per named class
//! - Resolve: Type Resolution of every type mention
//! - Members: Skeleton Builder, supertypes and member signatures, anonymous classes
//! - Scope: binding of bare identifiers
//! - Attr: Type Propagation and checking
//! - Rewrite: constants, enums, side effects, inner classes
//! - Lower: translation to the IR
//!
//! The three header stages run as soon as a unit is opened, because other units
//! need its skeletons to make progress. The body stages run later, when the
//! context drains its work queue.

pub mod attr;
pub mod enter;
pub mod flow;
pub mod lower;
pub mod members;
pub mod overload;
pub mod resolve;
pub mod rewrite;
pub mod scope;

use std::time::Instant;

use crate::ast::Ast;
use crate::common::compilation_context::{CompilationContext, UnitId};
use crate::common::env::CompilePhase;
use crate::error::{Result, ResultExt};

/// Skeleton Discovery, Type Resolution and Skeleton Builder
pub fn run_header_stages(ctx: &mut CompilationContext, unit: UnitId) -> Result<()> {
    run_stage(ctx, unit, CompilePhase::Discovered, |ctx, ast| {
        enter::Enter::new(unit).process(ctx, ast)
    })?;
    run_stage(ctx, unit, CompilePhase::TypeResolved, |ctx, ast| {
        resolve::TypeResolver::new(unit).process(ctx, ast)
    })?;
    run_stage(ctx, unit, CompilePhase::SkeletonBuilt, |ctx, ast| {
        members::SkeletonBuilder::new(unit).process(ctx, ast)
    })
}

/// Everything after the skeletons: scopes, types, rewrites and lowering
pub fn run_body_stages(ctx: &mut CompilationContext, unit: UnitId) -> Result<()> {
    run_stage(ctx, unit, CompilePhase::ScopeResolved, |ctx, ast| {
        scope::ScopeResolver::new(unit).process(ctx, ast)
    })?;
    run_stage(ctx, unit, CompilePhase::TypePropagated, |ctx, ast| {
        attr::Attr::new(unit).process(ctx, ast)
    })?;
    timed(ctx, unit, "rewrite-constants", |ctx, ast| {
        rewrite::constants::ConstantPropagation::new().process(ctx, ast)
    })?;
    timed(ctx, unit, "rewrite-enums", |ctx, ast| {
        rewrite::enums::EnumDesugar::new().process(ctx, ast)
    })?;
    timed(ctx, unit, "rewrite-effects", |ctx, ast| {
        rewrite::effects::EffectNormalizer::new().process(ctx, ast)
    })?;
    run_stage(ctx, unit, CompilePhase::Rewritten, |ctx, ast| {
        rewrite::inner::InnerClasses::new().process(ctx, ast)
    })?;
    run_stage(ctx, unit, CompilePhase::Lowered, |ctx, ast| {
        lower::Lower::new(unit).process(ctx, ast)
    })
}

fn run_stage(
    ctx: &mut CompilationContext,
    unit: UnitId,
    phase: CompilePhase,
    stage: impl FnOnce(&mut CompilationContext, &mut Ast) -> Result<()>,
) -> Result<()> {
    timed(ctx, unit, phase.name(), stage)?;
    advance(ctx, unit, phase);
    Ok(())
}

/// Run one stage over the unit's AST and report how long it took
fn timed(
    ctx: &mut CompilationContext,
    unit: UnitId,
    name: &str,
    stage: impl FnOnce(&mut CompilationContext, &mut Ast) -> Result<()>,
) -> Result<()> {
    let path = ctx.unit(unit).path.clone();
    let mut ast = ctx.take_ast(unit)?;
    let started = Instant::now();
    let result = stage(ctx, &mut ast);
    ctx.put_ast(unit, ast);
    log::info!("stage={} file={} elapsed={:?}", name, path.display(), started.elapsed());
    result.in_file(&path)
}

fn advance(ctx: &mut CompilationContext, unit: UnitId, phase: CompilePhase) {
    ctx.unit_mut(unit).phase = phase;
    let classes = ctx.unit(unit).classes.clone();
    for ty in &classes {
        if let Some(class) = ctx.get(ty) {
            let mut class = class.borrow_mut();
            if class.phase < phase {
                class.phase = phase;
            }
        }
    }
}
