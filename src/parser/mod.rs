//! Lexical analysis and parsing of source files into the AST

pub mod lexer;
pub mod parser;
pub mod span;

pub use lexer::Lexer;
pub use parser::{parse, Parser};
pub use span::{HasSpan, Location, Span};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_class() {
        let source = r#"
package com.example;

public class HelloWorld {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}
"#;
        let ast = parse(source).expect("Failed to parse");
        assert_eq!(ast.type_decls.len(), 1);
        assert_eq!(ast.package_name(), "com.example");
    }

    #[test]
    fn test_parse_with_imports() {
        let source = r#"
package com.example;

import java.util.List;
import java.util.ArrayList;

public class TestClass {
    private List<String> items = new ArrayList<String>();
}
"#;
        let ast = parse(source).expect("Failed to parse");
        assert_eq!(ast.imports.len(), 2);
    }
}
