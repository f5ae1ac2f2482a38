mod common;

use common::{compile_ok, find_class, find_method};
use jfront::common::flags::access_flags::{ACC_PRIVATE, ACC_STATIC, ACC_SYNTHETIC};
use jfront::common::Constant;
use jfront::ir::{IrExpr, IrStmt};

#[test]
fn test_enum_is_desugared_into_plain_members() {
    let classes = compile_ok(&[("p/Color.java", "package p; enum Color { RED, GREEN }")]);
    let color = find_class(&classes, "p.Color");
    for field in ["RED", "GREEN", "$VALUES"] {
        assert!(color.field(field).is_some(), "missing {}: {}", field, color);
    }
    assert_eq!(color.field("$VALUES").unwrap().descriptor, "[Lp/Color;");
    assert_eq!(find_method(color, "values").descriptor, "()[Lp/Color;");
    assert_eq!(find_method(color, "valueOf").descriptor, "(Ljava/lang/String;)Lp/Color;");
    assert_eq!(find_method(color, "<init>").descriptor, "(Ljava/lang/String;I)V");

    let clinit = find_method(color, "<clinit>");
    let Some(IrStmt::PutStatic { field, value: IrExpr::New { descriptor, args, .. } }) = clinit.statements().first() else {
        panic!("expected RED to be created first: {}", clinit)
    };
    assert_eq!(field.name, "RED");
    assert_eq!(descriptor, "(Ljava/lang/String;I)V");
    assert_eq!(args, &vec![IrExpr::Const(Constant::String("RED".into())), IrExpr::Const(Constant::Int(0))]);
    let last = clinit.statements().iter().rev().find(|s| matches!(s, IrStmt::PutStatic { .. }));
    assert!(matches!(last, Some(IrStmt::PutStatic { field, .. }) if field.name == "$VALUES"), "{}", clinit);
}

#[test]
fn test_enum_constructor_arguments_follow_name_and_ordinal() {
    let classes = compile_ok(&[(
        "p/Planet.java",
        "package p; enum Planet { MERCURY(3), VENUS(6); private final int mass; Planet(int mass) { this.mass = mass; } }",
    )]);
    let planet = find_class(&classes, "p.Planet");
    assert_eq!(find_method(planet, "<init>").descriptor, "(Ljava/lang/String;II)V");
    let clinit = find_method(planet, "<clinit>");
    let Some(IrStmt::PutStatic { value: IrExpr::New { args, .. }, .. }) = clinit.statements().get(1) else {
        panic!("expected VENUS: {}", clinit)
    };
    assert_eq!(args[1], IrExpr::Const(Constant::Int(1)));
    assert_eq!(args[2], IrExpr::Const(Constant::Int(6)));
}

#[test]
fn test_anonymous_classes_are_numbered_in_order() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { Object a() { return new Object() { }; } Runnable b() { return new Runnable() { public void run() { } }; } }",
    )]);
    let first = find_class(&classes, "p.A$1");
    let second = find_class(&classes, "p.A$2");
    assert_eq!(first.super_class.as_ref().map(|c| c.binary_name()), Some("java.lang.Object".to_string()));
    assert_eq!(second.interfaces.iter().map(|c| c.binary_name()).collect::<Vec<_>>(), vec!["java.lang.Runnable".to_string()]);
    assert!(first.is_inner && second.is_inner);
}

#[test]
fn test_private_field_reads_share_one_accessor() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { private int x; class In { int g() { return x; } int h() { return x + 1; } } }",
    )]);
    let a = find_class(&classes, "p.A");
    let accessors: Vec<_> = a.methods.iter().filter(|m| m.name.starts_with("access$")).collect();
    assert_eq!(accessors.len(), 1, "{}", a);
    let accessor = accessors[0];
    assert_eq!(accessor.name, "access$000");
    assert_eq!(accessor.descriptor, "(Lp/A;)I");
    assert_eq!(accessor.flags & (ACC_STATIC | ACC_SYNTHETIC), ACC_STATIC | ACC_SYNTHETIC);

    let inner = find_class(&classes, "p.A$In");
    let g = find_method(inner, "g");
    let Some(IrStmt::Return(Some(IrExpr::Invoke { method, args, .. }))) = g.statements().first() else {
        panic!("expected an accessor call: {}", g)
    };
    assert_eq!(method.name, "access$000");
    assert!(matches!(&args[0], IrExpr::GetField { field, .. } if field.name == "this$0"), "{}", g);
}

#[test]
fn test_captured_local_becomes_constructor_argument() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { Object m(final int x) { return new Object() { int get() { return x; } }; } }",
    )]);
    let anon = find_class(&classes, "p.A$1");
    assert_eq!(find_method(anon, "<init>").descriptor, "(Lp/A;I)V");
    assert!(anon.field("val$x").is_some(), "{}", anon);

    let m = find_method(find_class(&classes, "p.A"), "m");
    let Some(IrStmt::Return(Some(IrExpr::New { args, .. }))) = m.statements().first() else {
        panic!("expected the instance creation: {}", m)
    };
    assert_eq!(args[0], IrExpr::This);
    assert!(matches!(args[1], IrExpr::Load { slot: 1, .. }), "{}", m);

    let get = find_method(anon, "get");
    assert!(matches!(get.statements().first(), Some(IrStmt::Return(Some(IrExpr::GetField { field, .. }))) if field.name == "val$x"));
}

#[test]
fn test_foreach_over_array_uses_index_loop() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static int sum(int[] xs) { int s = 0; for (int x : xs) { s += x; } return s; } }",
    )]);
    let text = find_method(find_class(&classes, "p.A"), "sum").to_string();
    assert!(text.contains(".length"), "{}", text);
    assert!(text.contains("while ("), "{}", text);
    assert!(text.contains("$tmp"), "{}", text);
}

#[test]
fn test_foreach_over_iterable_uses_iterator() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; import java.util.List; class A { static int count(List<String> xs) { int n = 0; for (String s : xs) { n++; } return n; } }",
    )]);
    let text = find_method(find_class(&classes, "p.A"), "count").to_string();
    assert!(text.contains("invokeinterface java.util.List.iterator()Ljava/util/Iterator;"), "{}", text);
    assert!(text.contains("invokeinterface java.util.Iterator.hasNext()Z"), "{}", text);
    assert!(text.contains("checkcast java.lang.String"), "{}", text);
}

#[test]
fn test_postfix_increment_in_expression_keeps_old_value() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { static int f(int i) { int j = i++ * 2; return i + j; } }",
    )]);
    let f = find_method(find_class(&classes, "p.A"), "f");
    assert!(f.locals.iter().any(|l| l.name.starts_with("$tmp")), "{}", f);
    let temp = f.locals.iter().find(|l| l.name.starts_with("$tmp")).unwrap();
    assert!(matches!(f.statements().first(), Some(IrStmt::Store { slot, value: IrExpr::Load { slot: 0, .. }, .. }) if *slot == temp.slot), "{}", f);
}

#[test]
fn test_field_initializers_move_into_constructors() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { int x = 5; static Object o = new Object(); A() { } A(int y) { this(); x = y; } }",
    )]);
    let a = find_class(&classes, "p.A");
    let ctors: Vec<_> = a.methods_named("<init>").collect();
    assert_eq!(ctors.len(), 2);
    let plain = ctors.iter().find(|m| m.descriptor == "()V").unwrap();
    assert!(plain.to_string().contains("this.x = 5;"), "{}", plain);
    let delegating = ctors.iter().find(|m| m.descriptor == "(I)V").unwrap();
    assert!(!delegating.to_string().contains("this.x = 5;"), "{}", delegating);
    assert!(find_method(a, "<clinit>").to_string().contains("p.A.o = new java.lang.Object()V()"));
}

#[test]
fn test_private_constructor_used_by_nested_class_is_widened() {
    let classes = compile_ok(&[(
        "p/A.java",
        "package p; class A { private A() { } static class B { Object m() { return new A(); } } }",
    )]);
    let ctor = find_method(find_class(&classes, "p.A"), "<init>");
    assert_eq!(ctor.flags & ACC_PRIVATE, 0, "{}", ctor);
}
