//! Textual form of the IR, used by `--print-ir`, the directory sink and tests

use std::fmt::{self, Display, Formatter, Write};

use super::*;
use crate::common::flags::{access_flags, Modifiers};

const INDENT: &str = "  ";

fn class_keyword(flags: u16) -> &'static str {
    if flags & access_flags::ACC_INTERFACE != 0 {
        "interface"
    } else if flags & access_flags::ACC_ENUM != 0 {
        "enum"
    } else {
        "class"
    }
}

/// Modifier words of a member or class; class words drop the bits that only mean
/// something at the class-file level
fn modifier_words(flags: u16, class_level: bool) -> String {
    let bits = if class_level {
        flags & !(access_flags::ACC_SUPER | access_flags::ACC_INTERFACE | access_flags::ACC_ENUM)
    } else {
        flags
    };
    let mut words = Modifiers::new(bits).to_string();
    if !words.is_empty() {
        words.push(' ');
    }
    words
}

fn comma_separated<T: Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl Display for IrClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", modifier_words(self.flags, true), class_keyword(self.flags), self.name)?;
        if let Some(sup) = &self.super_class {
            write!(f, " extends {}", sup)?;
        }
        if !self.interfaces.is_empty() {
            write!(f, " implements {}", comma_separated(&self.interfaces))?;
        }
        writeln!(f)?;
        if let Some(outer) = &self.outer {
            writeln!(f, "{}outer {}{}", INDENT, outer, if self.is_inner { " (inner)" } else { "" })?;
        }
        writeln!(f, "{}source {}", INDENT, self.source.display())?;
        for field in &self.fields {
            writeln!(f, "{}{}", INDENT, field)?;
        }
        for method in &self.methods {
            writeln!(f)?;
            write!(f, "{}", method)?;
        }
        Ok(())
    }
}

impl Display for IrField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "field {}{} {}", modifier_words(self.flags, false), self.descriptor, self.name)?;
        if let Some(value) = &self.constant {
            write!(f, " = {}", value)?;
        }
        Ok(())
    }
}

impl Display for IrMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}method {}{}{} locals={}",
            INDENT,
            modifier_words(self.flags, false),
            self.name,
            self.descriptor,
            self.max_locals
        )?;
        let Some(body) = &self.body else {
            return writeln!(f, " (no body)");
        };
        writeln!(f)?;
        for local in &self.locals {
            writeln!(f, "{0}{0}local ${1} {2} {3}", INDENT, local.slot, local.ty, local.name)?;
        }
        let mut text = String::new();
        write_stmts(&mut text, body, 2)?;
        f.write_str(&text)
    }
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_stmts(out: &mut String, stmts: &[IrStmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        write_stmt(out, stmt, depth)?;
    }
    Ok(())
}

fn write_block(out: &mut String, header: &str, stmts: &[IrStmt], depth: usize) -> fmt::Result {
    pad(out, depth);
    writeln!(out, "{} {{", header)?;
    write_stmts(out, stmts, depth + 1)?;
    pad(out, depth);
    writeln!(out, "}}")
}

fn write_stmt(out: &mut String, stmt: &IrStmt, depth: usize) -> fmt::Result {
    match stmt {
        IrStmt::Eval(expr) => {
            pad(out, depth);
            writeln!(out, "{};", expr)
        }
        IrStmt::Store { slot, value, .. } => {
            pad(out, depth);
            writeln!(out, "${} = {};", slot, value)
        }
        IrStmt::PutField { field, target, value } => {
            pad(out, depth);
            writeln!(out, "{}.{} = {};", target, field.name, value)
        }
        IrStmt::PutStatic { field, value } => {
            pad(out, depth);
            writeln!(out, "{}.{} = {};", field.owner, field.name, value)
        }
        IrStmt::ArrayStore { array, index, value, .. } => {
            pad(out, depth);
            writeln!(out, "{}[{}] = {};", array, index, value)
        }
        IrStmt::If { cond, then_branch, else_branch } => {
            write_block(out, &format!("if ({})", cond), then_branch, depth)?;
            if !else_branch.is_empty() {
                write_block(out, "else", else_branch, depth)?;
            }
            Ok(())
        }
        IrStmt::Loop { label, setup, cond, body, update, test_first } => {
            pad(out, depth);
            if let Some(label) = label {
                write!(out, "{}: ", label)?;
            }
            let cond = cond.as_ref().map(ToString::to_string).unwrap_or_else(|| "true".to_string());
            writeln!(out, "{} ({}) {{", if *test_first { "while" } else { "do-while" }, cond)?;
            if !setup.is_empty() {
                write_block(out, "setup", setup, depth + 1)?;
            }
            write_stmts(out, body, depth + 1)?;
            if !update.is_empty() {
                write_block(out, "update", update, depth + 1)?;
            }
            pad(out, depth);
            writeln!(out, "}}")
        }
        IrStmt::Break(label) => {
            pad(out, depth);
            match label {
                Some(label) => writeln!(out, "break {};", label),
                None => writeln!(out, "break;"),
            }
        }
        IrStmt::Continue(label) => {
            pad(out, depth);
            match label {
                Some(label) => writeln!(out, "continue {};", label),
                None => writeln!(out, "continue;"),
            }
        }
        IrStmt::Return(value) => {
            pad(out, depth);
            match value {
                Some(value) => writeln!(out, "return {};", value),
                None => writeln!(out, "return;"),
            }
        }
        IrStmt::Throw(value) => {
            pad(out, depth);
            writeln!(out, "throw {};", value)
        }
        IrStmt::Switch { key, cases } => {
            pad(out, depth);
            writeln!(out, "switch ({}) {{", key)?;
            for case in cases {
                pad(out, depth + 1);
                let mut labels: Vec<String> = case.keys.iter().map(|k| format!("case {}", k)).collect();
                if case.is_default {
                    labels.push("default".to_string());
                }
                writeln!(out, "{}:", labels.join(", "))?;
                write_stmts(out, &case.body, depth + 2)?;
            }
            pad(out, depth);
            writeln!(out, "}}")
        }
        IrStmt::Try { body, catches, finally } => {
            write_block(out, "try", body, depth)?;
            for catch in catches {
                write_block(out, &format!("catch ({} ${})", catch.class, catch.slot), &catch.body, depth)?;
            }
            if let Some(finally) = finally {
                write_block(out, "finally", finally, depth)?;
            }
            Ok(())
        }
        IrStmt::Block(stmts) => write_block(out, "", stmts, depth),
        IrStmt::Labeled { label, body } => write_block(out, &format!("{}:", label), body, depth),
    }
}

impl Display for InvokeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvokeKind::Static => "invokestatic",
            InvokeKind::Virtual => "invokevirtual",
            InvokeKind::Interface => "invokeinterface",
            InvokeKind::Special => "invokespecial",
        })
    }
}

impl Display for IrExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IrExpr::Const(value) => write!(f, "{}", value),
            IrExpr::Null => f.write_str("null"),
            IrExpr::Load { slot, .. } => write!(f, "${}", slot),
            IrExpr::This => f.write_str("this"),
            IrExpr::GetField { field, target } => write!(f, "{}.{}", target, field.name),
            IrExpr::GetStatic { field } => write!(f, "{}.{}", field.owner, field.name),
            IrExpr::Invoke { kind, method, target, args } => {
                write!(f, "{} {}.{}{}(", kind, method.owner, method.name, method.descriptor)?;
                let mut operands: Vec<String> = Vec::new();
                if let Some(target) = target {
                    operands.push(target.to_string());
                }
                operands.extend(args.iter().map(ToString::to_string));
                write!(f, "{})", operands.join(", "))
            }
            IrExpr::New { class, descriptor, args } => {
                write!(f, "new {}{}({})", class, descriptor, comma_separated(args))
            }
            IrExpr::NewArray { ty, dims } => {
                write!(f, "newarray {}", ty)?;
                for dim in dims {
                    write!(f, "[{}]", dim)?;
                }
                Ok(())
            }
            IrExpr::ArrayLiteral { ty, elements } => write!(f, "{} {{{}}}", ty, comma_separated(elements)),
            IrExpr::ArrayLoad { array, index, .. } => write!(f, "{}[{}]", array, index),
            IrExpr::ArrayLength(array) => write!(f, "{}.length", array),
            IrExpr::Unary { op, operand, .. } => write!(f, "({}{})", op.symbol(), operand),
            IrExpr::Binary { op, left, right, .. } => write!(f, "({} {} {})", left, op, right),
            IrExpr::Conditional { cond, then_expr, else_expr } => {
                write!(f, "({} ? {} : {})", cond, then_expr, else_expr)
            }
            IrExpr::Convert { from, to, expr } => write!(f, "({}2{}){}", from, to, expr),
            IrExpr::Checkcast { ty, expr } => write!(f, "(checkcast {}){}", ty, expr),
            IrExpr::InstanceOf { ty, expr } => write!(f, "({} instanceof {})", expr, ty),
            IrExpr::Concat(parts) => {
                let parts: Vec<String> = parts.iter().map(|(p, _)| p.to_string()).collect();
                write!(f, "concat({})", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constant::Constant;

    #[test]
    fn test_print_method_body() {
        let method = IrMethod {
            name: "f".to_string(),
            descriptor: "(I)I".to_string(),
            flags: access_flags::ACC_STATIC,
            locals: vec![IrLocal { slot: 0, name: "x".to_string(), ty: Type::INT }],
            max_locals: 1,
            body: Some(vec![
                IrStmt::If {
                    cond: IrExpr::Binary {
                        op: BinaryOp::Gt,
                        left: Box::new(IrExpr::Load { slot: 0, ty: Type::INT }),
                        right: Box::new(IrExpr::Const(Constant::Int(0))),
                        ty: Type::INT,
                    },
                    then_branch: vec![IrStmt::Return(Some(IrExpr::Load { slot: 0, ty: Type::INT }))],
                    else_branch: Vec::new(),
                },
                IrStmt::Return(Some(IrExpr::Const(Constant::Int(0)))),
            ]),
        };
        let text = method.to_string();
        assert!(text.starts_with("  method static f(I)I locals=1\n"), "{text}");
        assert!(text.contains("    if (($0 > 0)) {\n      return $0;\n    }\n"), "{text}");
        assert!(text.ends_with("    return 0;\n"), "{text}");
    }
}
