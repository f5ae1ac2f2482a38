//! Flow checks run by Type Propagation on every method body
//!
//! - jump validation: `break` and `continue` must have a target, labels must
//!   name an enclosing statement, `continue` labels must name a loop
//! - liveness: a method with a return value must not complete normally
//!
//! Completion follows the usual reachability rules in a simplified form: a loop
//! whose condition is the constant `true` completes only through a `break`, a
//! `switch` completes unless its last group falls off a `default` without any
//! break, and `try` completes if its body or any handler does and the `finally`
//! block (when present) does too.

use crate::ast::*;
use crate::common::constant::Constant;
use crate::error::{Error, Result, ResultExt};
use crate::parser::Span;

#[derive(Debug, Clone)]
struct JumpTarget {
    label: Option<String>,
    is_loop: bool,
    is_switch: bool,
}

/// Validate jumps and, for value-returning methods, the closing return
pub fn check_body(body: &Block, returns_value: bool, span: Span) -> Result<()> {
    let mut targets = Vec::new();
    check_jumps_in(&body.stmts, &mut targets)?;
    if returns_value && can_complete(&body.stmts) {
        return Err(Error::type_error("missing return statement")).at(span);
    }
    Ok(())
}

fn check_jumps_in(stmts: &[Stmt], targets: &mut Vec<JumpTarget>) -> Result<()> {
    for stmt in stmts {
        check_jumps(stmt, targets)?;
    }
    Ok(())
}

fn is_loop(stmt: &Stmt) -> bool {
    matches!(
        stmt.kind,
        StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. } | StmtKind::ForEach { .. }
    )
}

fn check_jumps(stmt: &Stmt, targets: &mut Vec<JumpTarget>) -> Result<()> {
    match &stmt.kind {
        StmtKind::Break(None) => {
            if !targets.iter().any(|t| t.label.is_none() && (t.is_loop || t.is_switch)) {
                return Err(Error::type_error("break outside switch or loop")).at(stmt.span);
            }
        }
        StmtKind::Continue(None) => {
            if !targets.iter().any(|t| t.label.is_none() && t.is_loop) {
                return Err(Error::type_error("continue outside of loop")).at(stmt.span);
            }
        }
        StmtKind::Break(Some(label)) => {
            if !targets.iter().any(|t| t.label.as_deref() == Some(label)) {
                return Err(Error::type_error(format!("undefined label: {}", label))).at(stmt.span);
            }
        }
        StmtKind::Continue(Some(label)) => match targets.iter().rev().find(|t| t.label.as_deref() == Some(label)) {
            None => return Err(Error::type_error(format!("undefined label: {}", label))).at(stmt.span),
            Some(target) if !target.is_loop => {
                return Err(Error::type_error(format!("not a loop label: {}", label))).at(stmt.span)
            }
            Some(_) => {}
        },
        StmtKind::Labeled { label, body } => {
            if targets.iter().any(|t| t.label.as_deref() == Some(label)) {
                return Err(Error::type_error(format!("label {} already in use", label))).at(stmt.span);
            }
            targets.push(JumpTarget { label: Some(label.clone()), is_loop: is_loop(body), is_switch: false });
            let result = check_jumps(body, targets);
            targets.pop();
            result?;
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::ForEach { body, .. } => {
            targets.push(JumpTarget { label: None, is_loop: true, is_switch: false });
            let result = check_jumps(body, targets);
            targets.pop();
            result?;
        }
        StmtKind::For { init, update, body, .. } => {
            check_jumps_in(init, targets)?;
            targets.push(JumpTarget { label: None, is_loop: true, is_switch: false });
            let result = check_jumps_in(update, targets).and_then(|_| check_jumps(body, targets));
            targets.pop();
            result?;
        }
        StmtKind::Switch { cases, .. } => {
            targets.push(JumpTarget { label: None, is_loop: false, is_switch: true });
            let result = cases.iter().try_for_each(|case| check_jumps_in(&case.body, targets));
            targets.pop();
            result?;
        }
        StmtKind::Block(block) => check_jumps_in(&block.stmts, targets)?,
        StmtKind::If { then_branch, else_branch, .. } => {
            check_jumps(then_branch, targets)?;
            if let Some(els) = else_branch {
                check_jumps(els, targets)?;
            }
        }
        StmtKind::Try { body, catches, finally } => {
            check_jumps_in(&body.stmts, targets)?;
            for catch in catches {
                check_jumps_in(&catch.body.stmts, targets)?;
            }
            if let Some(finally) = finally {
                check_jumps_in(&finally.stmts, targets)?;
            }
        }
        StmtKind::LocalVar(_)
        | StmtKind::Expr(_)
        | StmtKind::Return(_)
        | StmtKind::Throw(_)
        | StmtKind::Empty => {}
    }
    Ok(())
}

fn is_constant_true(cond: Option<&Expr>) -> bool {
    match cond {
        None => true,
        Some(cond) => cond.attrs.constant == Some(Constant::Boolean(true)),
    }
}

/// Whether control can fall off the end of `stmts`
pub fn can_complete(stmts: &[Stmt]) -> bool {
    stmts.iter().all(completes)
}

fn completes(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break(_) | StmtKind::Continue(_) => false,
        StmtKind::Block(block) => can_complete(&block.stmts),
        StmtKind::If { then_branch, else_branch, .. } => match else_branch {
            Some(els) => completes(then_branch) || completes(els),
            None => true,
        },
        StmtKind::While { cond, body, .. } => !is_constant_true(Some(cond)) || breaks_out(body, None),
        StmtKind::DoWhile { cond, body, .. } => !is_constant_true(Some(cond)) || breaks_out(body, None),
        StmtKind::For { cond, body, .. } => !is_constant_true(cond.as_ref()) || breaks_out(body, None),
        StmtKind::ForEach { .. } => true,
        StmtKind::Labeled { label, body } => completes(body) || breaks_out(body, Some(label)),
        StmtKind::Switch { cases, .. } => {
            let has_default = cases.iter().any(|c| c.is_default);
            let last_completes = cases.last().map(|c| can_complete(&c.body)).unwrap_or(true);
            !has_default
                || last_completes
                || cases.iter().any(|c| c.body.iter().any(|s| breaks_out(s, None)))
        }
        StmtKind::Try { body, catches, finally } => {
            let inner = can_complete(&body.stmts) || catches.iter().any(|c| can_complete(&c.body.stmts));
            inner && finally.as_ref().map(|f| can_complete(&f.stmts)).unwrap_or(true)
        }
        StmtKind::LocalVar(_) | StmtKind::Expr(_) | StmtKind::Empty => true,
    }
}

/// Whether `stmt` contains a `break` leaving the statement it belongs to
///
/// With `label` set, looks for `break label`; otherwise for an unlabeled break
/// that is not captured by a nested loop or switch.
fn breaks_out(stmt: &Stmt, label: Option<&str>) -> bool {
    match &stmt.kind {
        StmtKind::Break(target) => target.as_deref() == label,
        StmtKind::Block(block) => block.stmts.iter().any(|s| breaks_out(s, label)),
        StmtKind::If { then_branch, else_branch, .. } => {
            breaks_out(then_branch, label) || else_branch.as_ref().map(|e| breaks_out(e, label)).unwrap_or(false)
        }
        StmtKind::Labeled { body, .. } => breaks_out(body, label),
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::ForEach { body, .. } => label.is_some() && breaks_out(body, label),
        StmtKind::Switch { cases, .. } => {
            label.is_some() && cases.iter().any(|c| c.body.iter().any(|s| breaks_out(s, label)))
        }
        StmtKind::Try { body, catches, finally } => {
            body.stmts.iter().any(|s| breaks_out(s, label))
                || catches.iter().any(|c| c.body.stmts.iter().any(|s| breaks_out(s, label)))
                || finally.as_ref().map(|f| f.stmts.iter().any(|s| breaks_out(s, label))).unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, Span::synthetic())
    }

    fn constant_true() -> Expr {
        Expr::literal(Constant::Boolean(true), Span::synthetic())
    }

    fn unknown() -> Expr {
        Expr::typed(ExprKind::Name { name: "b".into(), binding: Some(Binding::Local) }, crate::common::types::Type::BOOLEAN, Span::synthetic())
    }

    #[test]
    fn test_infinite_loop_does_not_complete() {
        let forever = stmt(StmtKind::While {
            cond: constant_true(),
            body: Box::new(stmt(StmtKind::Empty)),
            cond_setup: Vec::new(),
        });
        assert!(!can_complete(std::slice::from_ref(&forever)));

        let with_break = stmt(StmtKind::While {
            cond: constant_true(),
            body: Box::new(stmt(StmtKind::Break(None))),
            cond_setup: Vec::new(),
        });
        assert!(can_complete(&[with_break]));
    }

    #[test]
    fn test_if_without_else_completes() {
        let ret = stmt(StmtKind::If {
            cond: unknown(),
            then_branch: Box::new(stmt(StmtKind::Return(None))),
            else_branch: None,
        });
        assert!(can_complete(&[ret]));
        let both = stmt(StmtKind::If {
            cond: unknown(),
            then_branch: Box::new(stmt(StmtKind::Return(None))),
            else_branch: Some(Box::new(stmt(StmtKind::Throw(Expr::new(ExprKind::Null, Span::synthetic()))))),
        });
        assert!(!can_complete(&[both]));
    }

    #[test]
    fn test_jump_targets() {
        let body = Block::new(vec![stmt(StmtKind::Break(None))], Span::synthetic());
        let err = check_body(&body, false, Span::synthetic()).unwrap_err();
        assert!(err.to_string().contains("break outside switch or loop"));

        let labeled = Block::new(
            vec![stmt(StmtKind::Labeled { label: "out".into(), body: Box::new(stmt(StmtKind::Continue(Some("out".into())))) })],
            Span::synthetic(),
        );
        let err = check_body(&labeled, false, Span::synthetic()).unwrap_err();
        assert!(err.to_string().contains("not a loop label: out"));
    }
}
