//! Compile-time constant values and folding
//!
//! Folding follows the JVM arithmetic rules: integer operations wrap, integer
//! division by zero is not folded, shift distances are masked and float-to-int
//! conversions saturate.

use std::fmt;

use crate::ast::{BinaryOp, UnaryOp};
use crate::common::types::{PrimitiveType, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::String(_) => Type::string(),
            other => Type::Primitive(other.primitive().unwrap_or(PrimitiveType::Int)),
        }
    }

    pub fn primitive(&self) -> Option<PrimitiveType> {
        Some(match self {
            Constant::Boolean(_) => PrimitiveType::Boolean,
            Constant::Byte(_) => PrimitiveType::Byte,
            Constant::Char(_) => PrimitiveType::Char,
            Constant::Short(_) => PrimitiveType::Short,
            Constant::Int(_) => PrimitiveType::Int,
            Constant::Long(_) => PrimitiveType::Long,
            Constant::Float(_) => PrimitiveType::Float,
            Constant::Double(_) => PrimitiveType::Double,
            Constant::String(_) => return None,
        })
    }

    /// Integral value widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        Some(match self {
            Constant::Byte(v) => *v as i64,
            Constant::Char(v) => *v as i64,
            Constant::Short(v) => *v as i64,
            Constant::Int(v) => *v as i64,
            Constant::Long(v) => *v,
            _ => return None,
        })
    }

    fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Constant::Float(v) => *v as f64,
            Constant::Double(v) => *v,
            other => other.as_i64()? as f64,
        })
    }

    fn as_f32(&self) -> Option<f32> {
        Some(match self {
            Constant::Float(v) => *v,
            Constant::Double(v) => *v as f32,
            other => other.as_i64()? as f32,
        })
    }

    /// Whether an int-valued constant can be narrowed to `target` without loss
    pub fn fits_in(&self, target: PrimitiveType) -> bool {
        let value = match self {
            Constant::Byte(_) | Constant::Char(_) | Constant::Short(_) | Constant::Int(_) => {
                match self.as_i64() {
                    Some(v) => v,
                    None => return false,
                }
            }
            _ => return false,
        };
        match target {
            PrimitiveType::Byte => (i8::MIN as i64..=i8::MAX as i64).contains(&value),
            PrimitiveType::Short => (i16::MIN as i64..=i16::MAX as i64).contains(&value),
            PrimitiveType::Char => (0..=u16::MAX as i64).contains(&value),
            PrimitiveType::Int => true,
            _ => false,
        }
    }

    /// Primitive conversion of a constant (widening or narrowing)
    pub fn cast(&self, target: PrimitiveType) -> Option<Constant> {
        if let Constant::Boolean(b) = self {
            return match target {
                PrimitiveType::Boolean => Some(Constant::Boolean(*b)),
                _ => None,
            };
        }
        if matches!(self, Constant::String(_)) {
            return None;
        }
        let is_float = matches!(self, Constant::Float(_) | Constant::Double(_));
        Some(match target {
            PrimitiveType::Boolean | PrimitiveType::Void => return None,
            PrimitiveType::Double => Constant::Double(self.as_f64()?),
            PrimitiveType::Float => Constant::Float(self.as_f32()?),
            PrimitiveType::Long => {
                if is_float {
                    Constant::Long(self.as_f64()? as i64)
                } else {
                    Constant::Long(self.as_i64()?)
                }
            }
            narrow => {
                let int = if is_float {
                    self.as_f64()? as i32
                } else {
                    self.as_i64()? as i32
                };
                match narrow {
                    PrimitiveType::Int => Constant::Int(int),
                    PrimitiveType::Short => Constant::Short(int as i16),
                    PrimitiveType::Char => Constant::Char(int as u16),
                    PrimitiveType::Byte => Constant::Byte(int as i8),
                    _ => return None,
                }
            }
        })
    }

    /// String conversion used by concatenation
    pub fn to_java_string(&self) -> String {
        match self {
            Constant::Boolean(b) => b.to_string(),
            Constant::Byte(v) => v.to_string(),
            Constant::Char(c) => char::from_u32(*c as u32).map(String::from).unwrap_or_default(),
            Constant::Short(v) => v.to_string(),
            Constant::Int(v) => v.to_string(),
            Constant::Long(v) => v.to_string(),
            Constant::Float(v) => java_float_string(*v as f64, v.is_finite()),
            Constant::Double(v) => java_float_string(*v, v.is_finite()),
            Constant::String(s) => s.clone(),
        }
    }
}

fn java_float_string(value: f64, finite: bool) -> String {
    if !finite {
        return if value.is_nan() {
            "NaN".to_string()
        } else if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-3..1e7).contains(&magnitude) {
        let text = format!("{:E}", value);
        return match text.split_once('E') {
            Some((mantissa, exp)) if !mantissa.contains('.') => format!("{}.0E{}", mantissa, exp),
            _ => text,
        };
    }
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Char(c) => match char::from_u32(*c as u32) {
                Some(ch) => write!(f, "{:?}", ch),
                None => write!(f, "'\\u{:04x}'", c),
            },
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}f", v),
            Constant::Byte(v) => write!(f, "(byte){}", v),
            Constant::Short(v) => write!(f, "(short){}", v),
            other => f.write_str(&other.to_java_string()),
        }
    }
}

/// Fold a unary operation, `None` if the operand is not foldable
pub fn fold_unary(op: UnaryOp, operand: &Constant) -> Option<Constant> {
    if op == UnaryOp::Not {
        return match operand {
            Constant::Boolean(b) => Some(Constant::Boolean(!b)),
            _ => None,
        };
    }
    let promoted = operand.primitive()?.unary_promote()?;
    let value = operand.cast(promoted)?;
    match (op, value) {
        (UnaryOp::Plus, v) => Some(v),
        (UnaryOp::Neg, Constant::Int(v)) => Some(Constant::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Constant::Long(v)) => Some(Constant::Long(v.wrapping_neg())),
        (UnaryOp::Neg, Constant::Float(v)) => Some(Constant::Float(-v)),
        (UnaryOp::Neg, Constant::Double(v)) => Some(Constant::Double(-v)),
        (UnaryOp::BitNot, Constant::Int(v)) => Some(Constant::Int(!v)),
        (UnaryOp::BitNot, Constant::Long(v)) => Some(Constant::Long(!v)),
        _ => None,
    }
}

/// Fold a binary operation, `None` if the operands are not foldable
pub fn fold_binary(op: BinaryOp, left: &Constant, right: &Constant) -> Option<Constant> {
    use BinaryOp::*;

    if op == Concat {
        return Some(Constant::String(format!(
            "{}{}",
            left.to_java_string(),
            right.to_java_string()
        )));
    }

    if let (Constant::Boolean(l), Constant::Boolean(r)) = (left, right) {
        return Some(Constant::Boolean(match op {
            And | BitAnd => *l && *r,
            Or | BitOr => *l || *r,
            BitXor | Ne => l != r,
            Eq => l == r,
            _ => return None,
        }));
    }

    if matches!(op, Shl | Shr | UShr) {
        let base = left.cast(left.primitive()?.unary_promote()?)?;
        let distance = right.as_i64()?;
        return match base {
            Constant::Int(v) => {
                let d = (distance & 31) as u32;
                Some(Constant::Int(match op {
                    Shl => v.wrapping_shl(d),
                    Shr => v.wrapping_shr(d),
                    _ => ((v as u32) >> d) as i32,
                }))
            }
            Constant::Long(v) => {
                let d = (distance & 63) as u32;
                Some(Constant::Long(match op {
                    Shl => v.wrapping_shl(d),
                    Shr => v.wrapping_shr(d),
                    _ => ((v as u64) >> d) as i64,
                }))
            }
            _ => None,
        };
    }

    let promoted = PrimitiveType::binary_promote(left.primitive()?, right.primitive()?)?;
    let l = left.cast(promoted)?;
    let r = right.cast(promoted)?;
    match (l, r) {
        (Constant::Int(l), Constant::Int(r)) => fold_int(op, l, r),
        (Constant::Long(l), Constant::Long(r)) => fold_long(op, l, r),
        (Constant::Float(l), Constant::Float(r)) => fold_float(op, l as f64, r as f64)
            .map(|c| match c {
                Constant::Double(v) => Constant::Float(v as f32),
                other => other,
            }),
        (Constant::Double(l), Constant::Double(r)) => fold_float(op, l, r),
        _ => None,
    }
}

fn fold_int(op: BinaryOp, l: i32, r: i32) -> Option<Constant> {
    use BinaryOp::*;
    Some(match op {
        Add => Constant::Int(l.wrapping_add(r)),
        Sub => Constant::Int(l.wrapping_sub(r)),
        Mul => Constant::Int(l.wrapping_mul(r)),
        Div if r != 0 => Constant::Int(l.wrapping_div(r)),
        Rem if r != 0 => Constant::Int(l.wrapping_rem(r)),
        BitAnd => Constant::Int(l & r),
        BitOr => Constant::Int(l | r),
        BitXor => Constant::Int(l ^ r),
        Lt => Constant::Boolean(l < r),
        Le => Constant::Boolean(l <= r),
        Gt => Constant::Boolean(l > r),
        Ge => Constant::Boolean(l >= r),
        Eq => Constant::Boolean(l == r),
        Ne => Constant::Boolean(l != r),
        _ => return None,
    })
}

fn fold_long(op: BinaryOp, l: i64, r: i64) -> Option<Constant> {
    use BinaryOp::*;
    Some(match op {
        Add => Constant::Long(l.wrapping_add(r)),
        Sub => Constant::Long(l.wrapping_sub(r)),
        Mul => Constant::Long(l.wrapping_mul(r)),
        Div if r != 0 => Constant::Long(l.wrapping_div(r)),
        Rem if r != 0 => Constant::Long(l.wrapping_rem(r)),
        BitAnd => Constant::Long(l & r),
        BitOr => Constant::Long(l | r),
        BitXor => Constant::Long(l ^ r),
        Lt => Constant::Boolean(l < r),
        Le => Constant::Boolean(l <= r),
        Gt => Constant::Boolean(l > r),
        Ge => Constant::Boolean(l >= r),
        Eq => Constant::Boolean(l == r),
        Ne => Constant::Boolean(l != r),
        _ => return None,
    })
}

fn fold_float(op: BinaryOp, l: f64, r: f64) -> Option<Constant> {
    use BinaryOp::*;
    Some(match op {
        Add => Constant::Double(l + r),
        Sub => Constant::Double(l - r),
        Mul => Constant::Double(l * r),
        Div => Constant::Double(l / r),
        Rem => Constant::Double(l % r),
        Lt => Constant::Boolean(l < r),
        Le => Constant::Boolean(l <= r),
        Gt => Constant::Boolean(l > r),
        Ge => Constant::Boolean(l >= r),
        Eq => Constant::Boolean(l == r),
        Ne => Constant::Boolean(l != r),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_arithmetic_wraps() {
        assert_eq!(
            fold_binary(BinaryOp::Add, &Constant::Int(i32::MAX), &Constant::Int(1)),
            Some(Constant::Int(i32::MIN))
        );
        assert_eq!(fold_binary(BinaryOp::Div, &Constant::Int(1), &Constant::Int(0)), None);
    }

    #[test]
    fn test_mixed_operands_promote() {
        assert_eq!(
            fold_binary(BinaryOp::Mul, &Constant::Int(3), &Constant::Long(4)),
            Some(Constant::Long(12))
        );
        assert_eq!(
            fold_binary(BinaryOp::Add, &Constant::Char(b'a' as u16), &Constant::Int(1)),
            Some(Constant::Int(98))
        );
        assert_eq!(
            fold_binary(BinaryOp::Lt, &Constant::Float(1.5), &Constant::Int(2)),
            Some(Constant::Boolean(true))
        );
    }

    #[test]
    fn test_shift_distance_is_masked() {
        assert_eq!(
            fold_binary(BinaryOp::Shl, &Constant::Int(1), &Constant::Int(33)),
            Some(Constant::Int(2))
        );
        assert_eq!(
            fold_binary(BinaryOp::UShr, &Constant::Int(-1), &Constant::Int(28)),
            Some(Constant::Int(15))
        );
    }

    #[test]
    fn test_concat_uses_java_rendering() {
        let folded = fold_binary(BinaryOp::Concat, &Constant::String("v".into()), &Constant::Double(2.0));
        assert_eq!(folded, Some(Constant::String("v2.0".into())));
        let folded = fold_binary(BinaryOp::Concat, &Constant::Char(b'x' as u16), &Constant::Boolean(true));
        assert_eq!(folded, Some(Constant::String("xtrue".into())));
    }

    #[test]
    fn test_narrowing_fit() {
        assert!(Constant::Int(2).fits_in(PrimitiveType::Short));
        assert!(!Constant::Int(70000).fits_in(PrimitiveType::Short));
        assert!(!Constant::Int(-1).fits_in(PrimitiveType::Char));
        assert!(!Constant::Long(1).fits_in(PrimitiveType::Byte));
        assert_eq!(Constant::Int(2).cast(PrimitiveType::Short), Some(Constant::Short(2)));
        assert_eq!(Constant::Double(1e20).cast(PrimitiveType::Int), Some(Constant::Int(i32::MAX)));
    }

    #[test]
    fn test_unary_folding() {
        assert_eq!(fold_unary(UnaryOp::Neg, &Constant::Byte(5)), Some(Constant::Int(-5)));
        assert_eq!(fold_unary(UnaryOp::Not, &Constant::Boolean(false)), Some(Constant::Boolean(true)));
        assert_eq!(fold_unary(UnaryOp::BitNot, &Constant::Double(1.0)), None);
    }
}
