use jfront::ast::{ClassKind, ClassMember};
use jfront::parser::lexer::Token;
use jfront::parser::{parse, Lexer};
use jfront::ErrorKind;

#[test]
fn lexer_keywords() {
    let source = "public class Test extends Object implements Interface";
    let tokens = Lexer::new(source).tokenize().expect("Failed to tokenize");

    assert_eq!(tokens.len(), 8);
    assert!(tokens[0].is(&Token::Public));
    assert!(tokens[1].is(&Token::Class));
    assert!(tokens[2].is(&Token::Identifier));
    assert!(tokens[3].is(&Token::Extends));
    assert!(tokens[4].is(&Token::Identifier));
    assert!(tokens[5].is(&Token::Implements));
    assert!(tokens[6].is(&Token::Identifier));
    assert!(tokens[7].is(&Token::Eof));
}

#[test]
fn lexer_compound_assignment_operators() {
    let tokens = Lexer::new("+ - * / % = += -= *= /= %=").tokenize().expect("Failed to tokenize");
    let kinds: Vec<Token> = tokens.into_iter().map(|t| t.token).collect();
    assert_eq!(
        kinds,
        vec![
            Token::Plus,
            Token::Minus,
            Token::Star,
            Token::Slash,
            Token::Percent,
            Token::Assign,
            Token::AddAssign,
            Token::SubAssign,
            Token::MulAssign,
            Token::DivAssign,
            Token::ModAssign,
            Token::Eof,
        ]
    );
}

#[test]
fn parse_simple_class_with_main() {
    let source = r#"
package com.example;

public class HelloWorld {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}
"#;
    let ast = parse(source).expect("Failed to parse");
    assert_eq!(ast.package_name(), "com.example");
    assert_eq!(ast.type_decls.len(), 1);
    let class = &ast.type_decls[0];
    assert_eq!(class.name, "HelloWorld");
    assert!(matches!(&class.body[..], [ClassMember::Method(m)] if m.name == "main"));
}

#[test]
fn parse_imports_and_nested_types() {
    let source = r#"
package p;

import java.util.List;
import java.util.*;
import static java.lang.Math.max;

class Outer {
    interface Shape { int area(); }
    enum Kind { A, B; Kind() { } }
    static class Nested { }
}
"#;
    let ast = parse(source).expect("Failed to parse");
    assert_eq!(ast.imports.len(), 3);
    assert!(ast.imports[1].is_wildcard);
    assert!(ast.imports[2].is_static);

    let kinds: Vec<ClassKind> = ast.type_decls[0]
        .body
        .iter()
        .filter_map(|m| match m {
            ClassMember::Type(decl) => Some(decl.kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![ClassKind::Interface, ClassKind::Enum, ClassKind::Class]);
}

#[test]
fn parse_error_has_location() {
    let err = parse("package p;\nclass A {\n  int x = ;\n}").unwrap_err();
    let syntax = err.as_syntax().expect("syntax error");
    assert_eq!(syntax.kind, ErrorKind::Grammar);
    assert_eq!(syntax.location.map(|l| l.line), Some(3));
}
