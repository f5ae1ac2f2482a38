// Helpers shared by the integration tests
#![allow(dead_code)]

use jfront::ir::{IrClass, IrMethod, MemorySink};
use jfront::{Config, Error, SyntaxError};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compile in-memory `(path, source)` pairs, panicking with the diagnostic on failure
pub fn compile_ok(sources: &[(&str, &str)]) -> Vec<IrClass> {
    init_logging();
    let mut sink = MemorySink::new();
    if let Err(err) = jfront::compile_sources(Config::default(), sources, &mut sink) {
        panic!("compilation failed: {}", err);
    }
    sink.classes
}

/// Compile sources that must be rejected and return the diagnostic
pub fn compile_err(sources: &[(&str, &str)]) -> SyntaxError {
    init_logging();
    let mut sink = MemorySink::new();
    match jfront::compile_sources(Config::default(), sources, &mut sink) {
        Ok(_) => panic!("compilation unexpectedly succeeded"),
        Err(Error::Syntax(err)) => err,
        Err(other) => panic!("expected a diagnostic, got: {}", other),
    }
}

pub fn find_class<'a>(classes: &'a [IrClass], binary_name: &str) -> &'a IrClass {
    classes.iter().find(|c| c.name.binary_name() == binary_name).unwrap_or_else(|| {
        let names: Vec<String> = classes.iter().map(|c| c.name.binary_name()).collect();
        panic!("no class {} among {:?}", binary_name, names)
    })
}

pub fn find_method<'a>(class: &'a IrClass, name: &str) -> &'a IrMethod {
    class.method(name).unwrap_or_else(|| {
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        panic!("no method {} in {} among {:?}", name, class.name, names)
    })
}
