//! Overload resolution
//!
//! Candidates are filtered by arity, then checked in two phases: strict
//! invocation (widening only) and loose invocation (boxing and unboxing
//! allowed). The first phase with an applicable candidate wins, and among its
//! candidates the most specific one is chosen.
//!
//! Parameter types are seen through the receiver: class type variables are
//! replaced by the receiver's arguments and method type variables by their
//! erasure. Variable-arity methods are not supported.

use crate::common::compilation_context::{type_param_names, CompilationContext};
use crate::common::conversion::is_assignable;
use crate::common::env::MethodRef;
use crate::common::types::Type;
use crate::error::{Error, Result};

/// Chosen method with its parameter types as seen from the receiver
#[derive(Debug, Clone)]
pub struct Selected {
    pub method: MethodRef,
    pub params: Vec<Type>,
}

/// Replace method and class type variables in `ty` as seen through `receiver`
pub fn member_type(
    ctx: &mut CompilationContext,
    ty: &Type,
    method: &MethodRef,
    receiver: &Type,
) -> Result<Type> {
    let own: Vec<(String, Type)> = type_param_names(&method.sig.type_params)
        .into_iter()
        .zip(method.sig.type_params.iter().map(Type::erasure))
        .collect();
    let ty = ty.substitute(&own);
    if method.is_static() {
        return Ok(ty);
    }
    let bindings = ctx.member_bindings(receiver, &method.owner)?;
    Ok(ty.substitute(&bindings))
}

fn describe(name: &str, args: &[Type]) -> String {
    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("{}({})", name, args.join(", "))
}

/// Pick the method among `candidates` that `args` select
///
/// `name` is the method's source name, or the class name for constructors.
pub fn select(
    ctx: &mut CompilationContext,
    candidates: Vec<MethodRef>,
    receiver: &Type,
    args: &[Type],
    name: &str,
) -> Result<Selected> {
    if candidates.is_empty() {
        return Err(Error::method_not_found(format!("cannot find symbol: method {}", describe(name, args))));
    }

    let mut viewed = Vec::with_capacity(candidates.len());
    for method in candidates {
        if method.sig.params.len() != args.len() {
            continue;
        }
        let mut params = Vec::with_capacity(args.len());
        for param in &method.sig.params {
            params.push(member_type(ctx, param, &method, receiver)?);
        }
        viewed.push(Selected { method, params });
    }

    for boxing in [false, true] {
        let mut applicable = Vec::new();
        for candidate in &viewed {
            let mut ok = true;
            for (arg, param) in args.iter().zip(&candidate.params) {
                if !is_assignable(ctx, arg, param, boxing)? {
                    ok = false;
                    break;
                }
            }
            if ok {
                applicable.push(candidate.clone());
            }
        }
        if !applicable.is_empty() {
            log::trace!(
                "{} applicable candidates for {} (boxing: {})",
                applicable.len(),
                describe(name, args),
                boxing
            );
            return most_specific(ctx, applicable, name, args);
        }
    }
    Err(Error::method_not_found(format!("no suitable method found for {}", describe(name, args))))
}

fn more_specific(ctx: &mut CompilationContext, a: &Selected, b: &Selected) -> Result<bool> {
    for (pa, pb) in a.params.iter().zip(&b.params) {
        if !is_assignable(ctx, pa, pb, false)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn most_specific(
    ctx: &mut CompilationContext,
    applicable: Vec<Selected>,
    name: &str,
    args: &[Type],
) -> Result<Selected> {
    if let [only] = applicable.as_slice() {
        return Ok(only.clone());
    }
    let mut maximal = Vec::new();
    for (i, candidate) in applicable.iter().enumerate() {
        let mut best = true;
        for (j, other) in applicable.iter().enumerate() {
            if i != j && !more_specific(ctx, candidate, other)? {
                best = false;
                break;
            }
        }
        if best {
            maximal.push(candidate.clone());
        }
    }
    // Candidates with identical erased parameters are the same method seen
    // through different supertypes; the first one found is the most derived
    let first = maximal.first().cloned();
    match first {
        Some(first)
            if maximal
                .iter()
                .all(|m| m.method.sig.erased().params == first.method.sig.erased().params) =>
        {
            Ok(first)
        }
        _ => Err(Error::type_error(format!("reference to {} is ambiguous", describe(name, args)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::flags::Modifiers;
    use crate::common::types::{ClassType, FunctionType, PrimitiveType};
    use crate::config::Config;

    fn method(params: Vec<Type>) -> MethodRef {
        MethodRef {
            owner: ClassType::new("p", "A"),
            name: "m".into(),
            sig: FunctionType::new(Type::VOID, params),
            flags: Modifiers::NONE,
            owner_is_interface: false,
            leading: Vec::new(),
            trailing: Vec::new(),
        }
    }

    #[test]
    fn test_strict_phase_beats_boxing() {
        let mut ctx = CompilationContext::new(Config::default());
        let receiver = Type::Class(ClassType::new("p", "A"));
        let candidates = vec![method(vec![Type::object()]), method(vec![Type::LONG])];
        let chosen = select(&mut ctx, candidates, &receiver, &[Type::INT], "m").unwrap();
        assert_eq!(chosen.params, vec![Type::LONG]);
    }

    #[test]
    fn test_most_specific_and_ambiguity() {
        let mut ctx = CompilationContext::new(Config::default());
        let receiver = Type::Class(ClassType::new("p", "A"));
        let candidates = vec![method(vec![Type::object()]), method(vec![Type::string()])];
        let chosen = select(&mut ctx, candidates, &receiver, &[Type::Null], "m").unwrap();
        assert_eq!(chosen.params, vec![Type::string()]);

        let short = Type::Primitive(PrimitiveType::Short);
        let candidates = vec![
            method(vec![Type::INT, Type::LONG]),
            method(vec![Type::LONG, Type::INT]),
        ];
        let err = select(&mut ctx, candidates, &receiver, &[short.clone(), short], "m").unwrap_err();
        assert!(err.to_string().contains("ambiguous"), "{}", err);
    }

    #[test]
    fn test_no_candidate() {
        let mut ctx = CompilationContext::new(Config::default());
        let receiver = Type::Class(ClassType::new("p", "A"));
        let err = select(&mut ctx, vec![method(vec![Type::string()])], &receiver, &[Type::INT], "m").unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::MethodNotFound));
    }
}
