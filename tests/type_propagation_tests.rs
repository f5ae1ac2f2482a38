mod common;

use common::{compile_err, compile_ok, find_class, find_method};
use jfront::ast::BinaryOp;
use jfront::common::{Constant, PrimitiveType, Type};
use jfront::ir::{IrExpr, IrStmt, InvokeKind};
use jfront::ErrorKind;

#[test]
fn test_binary_promotion_inserts_conversions() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static long f(byte b, short s, long l) { return b + s + l; } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    let Some(IrStmt::Return(Some(IrExpr::Binary { op: BinaryOp::Add, left, ty, .. }))) = f.statements().first() else {
        panic!("expected an addition: {}", f)
    };
    assert_eq!(*ty, Type::LONG);
    let IrExpr::Convert { from: PrimitiveType::Int, to: PrimitiveType::Long, expr } = left.as_ref() else {
        panic!("expected int to long: {}", f)
    };
    let IrExpr::Binary { left: inner, ty: inner_ty, .. } = expr.as_ref() else {
        panic!("expected the int addition: {}", f)
    };
    assert_eq!(*inner_ty, Type::INT);
    assert!(matches!(inner.as_ref(), IrExpr::Convert { from: PrimitiveType::Byte, to: PrimitiveType::Int, .. }));
}

#[test]
fn test_int_constant_narrows_to_short() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static int f() { short s = 1 + 2; int i = 3 * 4; return s + i; } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    let stmts = f.statements();
    assert!(
        matches!(&stmts[0], IrStmt::Store { slot: 0, value: IrExpr::Const(Constant::Short(3)), .. }),
        "{}",
        f
    );
    assert!(matches!(&stmts[1], IrStmt::Store { slot: 1, value: IrExpr::Const(Constant::Int(12)), .. }), "{}", f);
}

#[test]
fn test_out_of_range_constant_is_rejected() {
    let err = compile_err(&[("p/A.java", "package p; class A { void f() { byte b = 200; } }")]);
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("possible lossy conversion"), "{}", err);
    assert_eq!(err.file.as_deref(), Some(std::path::Path::new("p/A.java")));
    assert_eq!(err.location.map(|l| l.line), Some(1));
}

#[test]
fn test_overload_prefers_widening_over_boxing() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static void g(long x) {} static void g(Integer x) {} static void f() { g(1); } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    let Some(IrStmt::Eval(IrExpr::Invoke { kind, method, args, .. })) = f.statements().first() else {
        panic!("expected a call: {}", f)
    };
    assert_eq!(*kind, InvokeKind::Static);
    assert_eq!(method.descriptor, "(J)V");
    // the widened literal folds to a long constant
    assert_eq!(args[0], IrExpr::Const(Constant::Long(1)));
}

#[test]
fn test_boxing_when_no_strict_match() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static void g(Object x) {} static void f() { g(1); } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    let Some(IrStmt::Eval(IrExpr::Invoke { args, .. })) = f.statements().first() else {
        panic!("expected a call: {}", f)
    };
    let IrExpr::Invoke { kind: InvokeKind::Static, method, .. } = &args[0] else {
        panic!("expected a boxing call: {}", f)
    };
    assert_eq!(method.owner.binary_name(), "java.lang.Integer");
    assert_eq!(method.name, "valueOf");
}

#[test]
fn test_inherited_field_wins_over_captured_local() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p;
         class Base { int x; }
         class A {
             Object m(final int x) {
                 return new Base() { int get() { return x; } };
             }
         }",
    )]);
    let anon = find_class(&classes, "p.A$1");
    assert!(anon.field("val$x").is_none(), "{}", anon);
    let get = find_method(anon, "get");
    let Some(IrStmt::Return(Some(IrExpr::GetField { field, target }))) = get.statements().first() else {
        panic!("expected a field read: {}", get)
    };
    assert_eq!(field.owner.binary_name(), "p.Base");
    assert_eq!(**target, IrExpr::This);
}

#[test]
fn test_enum_switch_keys_are_ordinals() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { enum E { X, Y, Z } static int f(E e) { switch (e) { case Z: return 1; case X: return 2; default: return 0; } } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    let Some(IrStmt::Switch { key, cases }) = f.statements().first() else {
        panic!("expected a switch: {}", f)
    };
    assert!(matches!(key, IrExpr::Invoke { method, .. } if method.name == "ordinal"));
    let keys: Vec<&[i32]> = cases.iter().map(|c| c.keys.as_slice()).collect();
    assert_eq!(keys, vec![&[2][..], &[0][..], &[][..]]);
    assert!(cases[2].is_default);
}

#[test]
fn test_semantic_errors() {
    let err = compile_err(&[("p/A.java", "package p; class A { int m() { } }")]);
    assert!(err.message.contains("missing return statement"), "{}", err);

    let err = compile_err(&[("p/A.java", "package p; class A { void m(String s) { switch (s) { default: } } }")]);
    assert_eq!(err.kind, ErrorKind::TypeError);

    let err = compile_err(&[("p/A.java", "package p; class A { void m() { int y = z; } }")]);
    assert_eq!(err.kind, ErrorKind::SymbolNotFound);

    let err = compile_err(&[("p/A.java", "package p; class A { void m() { \"s\".nope(); } }")]);
    assert_eq!(err.kind, ErrorKind::MethodNotFound);
}

#[test]
fn test_final_local_constant_narrows_and_labels_cases() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static int f(int x) { final int k = 5; byte b = k; switch (x) { case k: return b; default: return 0; } } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    let stmts = f.statements();
    assert!(matches!(&stmts[1], IrStmt::Store { value: IrExpr::Const(Constant::Byte(5)), .. }), "{}", f);
    let Some(IrStmt::Switch { cases, .. }) = stmts.get(2) else {
        panic!("expected a switch: {}", f)
    };
    assert_eq!(cases[0].keys, vec![5]);
}

#[test]
fn test_non_final_local_is_not_a_constant() {
    let err = compile_err(&[("p/A.java", "package p; class A { void f() { int k = 5; byte b = k; } }")]);
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("possible lossy conversion"), "{}", err);
}

#[test]
fn test_captured_local_must_stay_effectively_final() {
    let err = compile_err(&[(
        "p/A.java",
        "package p;\nclass A {\n  Object m() {\n    int n = 1;\n    Object o = new Object() { int g() { return n; } };\n    n = 2;\n    return o;\n  }\n}",
    )]);
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("effectively final"), "{}", err);
    assert_eq!(err.location.map(|l| l.line), Some(6));
}
