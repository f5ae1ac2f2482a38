mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::{compile_err, compile_ok, find_class, init_logging};
use jfront::ir::{ClassSink, DirectorySink, MemorySink};
use jfront::{CompilationContext, Config, ErrorKind};

#[test]
fn test_dependency_loaded_on_demand_is_compiled_too() {
    init_logging();
    let mut ctx = CompilationContext::new(Config::default());
    ctx.add_virtual_source("p/A.java", "package p; import q.B; class A { int f() { return new B().g(); } }");
    ctx.add_virtual_source("q/B.java", "package q; public class B { public int g() { return 1; } }");
    ctx.compile_root(Path::new("p/A.java")).unwrap();
    assert_eq!(ctx.units().iter().filter(|u| !u.is_prelude).count(), 2);
    ctx.drain().unwrap();
    let classes = ctx.take_output();
    let names: Vec<String> = classes.iter().map(|c| c.name.binary_name()).collect();
    assert!(names.contains(&"p.A".to_string()), "{:?}", names);
    assert!(names.contains(&"q.B".to_string()), "{:?}", names);
}

#[test]
fn test_unreferenced_sources_are_not_opened() {
    let mut ctx = CompilationContext::new(Config::default());
    ctx.add_virtual_source("p/A.java", "package p; class A { }");
    ctx.add_virtual_source("p/Unused.java", "package p; class Unused { }");
    ctx.compile_root(Path::new("p/A.java")).unwrap();
    ctx.drain().unwrap();
    assert!(ctx.units().iter().all(|u| u.path != Path::new("p/Unused.java")));
}

#[test]
fn test_single_type_import_beats_same_package() {
    let classes = compile_ok(&[
        ("p/A.java", "package p; import java.util.List; class A { List items; }"),
        ("p/List.java", "package p; class List { }"),
    ]);
    let a = find_class(&classes, "p.A");
    assert_eq!(a.field("items").unwrap().descriptor, "Ljava/util/List;");
}

#[test]
fn test_same_package_beats_prelude() {
    let classes = compile_ok(&[
        ("p/A.java", "package p; class A { Number n; }"),
        ("p/Number.java", "package p; class Number { }"),
    ]);
    let a = find_class(&classes, "p.A");
    assert_eq!(a.field("n").unwrap().descriptor, "Lp/Number;");
}

#[test]
fn test_missing_class() {
    let err = compile_err(&[("p/A.java", "package p; class A { Missing m; }")]);
    assert_eq!(err.kind, ErrorKind::ClassNotFound);
    assert!(err.message.contains("Missing"), "{}", err);
}

#[test]
fn test_dependency_error_is_reported_at_the_requester() {
    let mut ctx = CompilationContext::new(Config::default());
    ctx.add_virtual_source("p/A.java", "package p;\nclass A {\n  q.B b;\n}");
    ctx.add_virtual_source("q/B.java", "package q; public class B { int }");
    let err = ctx.compile_root(Path::new("p/A.java")).unwrap_err();
    let err = err.as_syntax().unwrap();
    assert_eq!(err.file.as_deref(), Some(Path::new("p/A.java")));
    assert!(err.message.contains("q.B"), "{}", err);
    let cause = err.root_cause();
    assert_eq!(cause.kind, ErrorKind::Grammar);
    assert_eq!(cause.file.as_deref(), Some(Path::new("q/B.java")));
    assert!(err.to_string().contains("caused by"), "{}", err);
}

#[test]
fn test_cyclic_inheritance_across_files() {
    let err = compile_err(&[("p/A.java", "package p; class A extends B { }"), ("p/B.java", "package p; class B extends A { }")]);
    assert_eq!(err.kind, ErrorKind::CyclicDependency);
}

#[test]
fn test_cyclic_constants() {
    let err = compile_err(&[(
        "p/A.java",
        "package p; class A { static final int X = Y + 1; static final int Y = X + 1; int m() { return X; } }",
    )]);
    assert_eq!(err.kind, ErrorKind::CyclicDependency);
}

#[test]
fn test_constant_from_another_unit_is_folded() {
    let classes = compile_ok(&[
        ("p/A.java", "package p; class A { static final int K = B.K * 2; }"),
        ("p/B.java", "package p; class B { static final int K = 21; }"),
    ]);
    let a = find_class(&classes, "p.A");
    assert_eq!(a.field("K").unwrap().constant, Some(jfront::common::Constant::Int(42)));
    // constants keep no initializer code
    assert!(a.method("<clinit>").is_none(), "{}", a);
}

fn write(root: &Path, relative: &str, source: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, source).unwrap();
    path
}

#[test]
fn test_source_root_on_disk() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "p/A.java", "package p; import q.B; class A { B b; }");
    write(dir.path(), "q/B.java", "package q; public class B { }");

    let config = Config::default().with_source_root(dir.path());
    config.validate().unwrap();
    let mut sink = MemorySink::new();
    let count = jfront::compile_files(config, &[a], &mut sink).unwrap();
    assert_eq!(count, 2);
    assert!(sink.find("q.B").is_some());
}

#[test]
fn test_directory_sink_receives_every_class() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let a = write(src.path(), "p/A.java", "package p; class A { class In { } }");

    let mut memory = MemorySink::new();
    jfront::compile_files(Config::default().with_source_root(src.path()), &[a], &mut memory).unwrap();
    let mut sink = DirectorySink::new(out.path());
    for class in memory.classes {
        sink.accept(class).unwrap();
    }
    assert!(out.path().join("p/A.jir").is_file());
    let inner = fs::read_to_string(out.path().join("p/A$In.jir")).unwrap();
    assert!(inner.contains("field final synthetic Lp/A; this$0"), "{}", inner);
}

#[test]
fn test_missing_root_is_a_config_error() {
    let config = Config::default().with_source_root("/definitely/not/here");
    assert!(matches!(config.validate(), Err(jfront::Error::Config { .. })));
}
