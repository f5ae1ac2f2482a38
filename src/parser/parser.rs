use crate::ast::*;
use crate::common::constant::Constant;
use crate::common::flags::{access_flags::*, Modifiers};
use crate::common::types::PrimitiveType;
use crate::consts::PARSER_MAX_DEPTH;
use crate::error::{Error, Result};
use crate::parser::lexer::{LexicalToken, Lexer, Token};
use crate::parser::{Location, Span};

/// Parse a compilation unit
pub fn parse(source: &str) -> Result<Ast> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse_compilation_unit()
}

/// Recursive-descent parser over a token vector
pub struct Parser {
    tokens: Vec<LexicalToken>,
    current: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<LexicalToken>) -> Self {
        Self { tokens, current: 0, depth: 0 }
    }

    // ---------------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------------

    fn peek(&self) -> Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Token {
        self.tokens
            .get(self.current + n)
            .map(|t| t.token)
            .unwrap_or(Token::Eof)
    }

    fn current_token(&self) -> &LexicalToken {
        let idx = self.current.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn location(&self) -> Location {
        self.current_token().location
    }

    fn previous_end(&self) -> Location {
        if self.current == 0 {
            return Location::start();
        }
        self.tokens[self.current - 1].end
    }

    fn span_from(&self, start: Location) -> Span {
        Span::new(start, self.previous_end())
    }

    fn is_at_end(&self) -> bool {
        self.peek() == Token::Eof
    }

    fn check(&self, token: Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> LexicalToken {
        let token = self.current_token().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token: Token, expected: &str) -> Result<LexicalToken> {
        if self.check(token) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = self.current_token();
        let found = if found.token == Token::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", found.lexeme)
        };
        Error::grammar(format!("expected {}, found {}", expected, found), self.location())
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::grammar(format!("{} are not supported", what), self.location())
    }

    fn identifier(&mut self) -> Result<String> {
        Ok(self.consume(Token::Identifier, "identifier")?.lexeme)
    }

    /// `>` closing a type argument list
    fn consume_type_args_close(&mut self) -> Result<()> {
        self.consume(Token::Gt, "'>'").map(|_| ())
    }

    /// Adjacent `>` tokens form a shift operator
    fn adjacent_gt(&self, count: usize) -> bool {
        (0..count).all(|i| self.peek_at(i) == Token::Gt)
            && (1..count).all(|i| {
                let prev = &self.tokens[self.current + i - 1];
                let next = &self.tokens[self.current + i];
                prev.end.offset == next.location.offset
            })
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > PARSER_MAX_DEPTH {
            return Err(Error::grammar("nesting too deep", self.location()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---------------------------------------------------------------------
    // Compilation unit and declarations
    // ---------------------------------------------------------------------

    pub fn parse_compilation_unit(&mut self) -> Result<Ast> {
        let start = self.location();
        self.skip_annotations()?;
        let package_decl = if self.check(Token::Package) {
            let pkg_start = self.location();
            self.advance();
            let name = self.qualified_name()?;
            self.consume(Token::Semicolon, "';'")?;
            Some(PackageDecl { name, span: self.span_from(pkg_start) })
        } else {
            None
        };

        let mut imports = Vec::new();
        while self.check(Token::Import) {
            imports.push(self.parse_import()?);
        }

        let mut type_decls = Vec::new();
        while !self.is_at_end() {
            if self.match_token(Token::Semicolon) {
                continue;
            }
            let start = self.location();
            let modifiers = self.parse_modifiers()?;
            type_decls.push(self.parse_type_decl(modifiers, start)?);
        }

        Ok(Ast { package_decl, imports, type_decls, span: self.span_from(start) })
    }

    fn qualified_name(&mut self) -> Result<String> {
        let mut name = self.identifier()?;
        while self.check(Token::Dot) && self.peek_at(1) == Token::Identifier {
            self.advance();
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> Result<ImportDecl> {
        let start = self.location();
        self.consume(Token::Import, "'import'")?;
        let is_static = self.match_token(Token::Static);
        let mut name = self.identifier()?;
        let mut is_wildcard = false;
        while self.match_token(Token::Dot) {
            if self.match_token(Token::Star) {
                is_wildcard = true;
                break;
            }
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        self.consume(Token::Semicolon, "';'")?;
        Ok(ImportDecl { name, is_static, is_wildcard, span: self.span_from(start) })
    }

    /// Annotations are accepted and discarded
    fn skip_annotations(&mut self) -> Result<()> {
        while self.check(Token::At) {
            if self.peek_at(1) == Token::Interface {
                return Err(self.unsupported("annotation type declarations"));
            }
            self.advance();
            self.qualified_name()?;
            if self.check(Token::LParen) {
                let mut depth = 0usize;
                loop {
                    match self.advance().token {
                        Token::LParen => depth += 1,
                        Token::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        Token::Eof => return Err(self.unexpected("')'")),
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers> {
        let mut modifiers = Modifiers::NONE;
        loop {
            self.skip_annotations()?;
            let bit = match self.peek() {
                Token::Public => ACC_PUBLIC,
                Token::Private => ACC_PRIVATE,
                Token::Protected => ACC_PROTECTED,
                Token::Static => ACC_STATIC,
                Token::Final => ACC_FINAL,
                Token::Abstract => ACC_ABSTRACT,
                Token::Native => ACC_NATIVE,
                Token::Synchronized if self.peek_at(1) != Token::LParen => ACC_SYNCHRONIZED,
                Token::Transient => ACC_TRANSIENT,
                Token::Volatile => ACC_VOLATILE,
                Token::Strictfp => ACC_STRICT,
                Token::Default if self.peek_at(1) != Token::Colon => 0,
                _ => break,
            };
            if bit != 0 && modifiers.has(bit) {
                return Err(Error::grammar("repeated modifier", self.location()));
            }
            self.advance();
            modifiers.insert(bit);
        }
        Ok(modifiers)
    }

    fn parse_type_decl(&mut self, modifiers: Modifiers, start: Location) -> Result<ClassDecl> {
        let kind = match self.peek() {
            Token::Class => ClassKind::Class,
            Token::Interface => ClassKind::Interface,
            Token::Enum => ClassKind::Enum,
            _ => return Err(self.unexpected("'class', 'interface' or 'enum'")),
        };
        self.advance();
        let name = self.identifier()?;
        let mut decl = ClassDecl::new(kind, name.clone(), Span::single(start));
        decl.modifiers = modifiers;
        if self.check(Token::Lt) {
            decl.type_params = self.parse_type_params()?;
        }
        match kind {
            ClassKind::Class => {
                if self.match_token(Token::Extends) {
                    decl.extends = Some(self.parse_type()?);
                }
                if self.match_token(Token::Implements) {
                    decl.implements = self.parse_type_list()?;
                }
            }
            ClassKind::Interface => {
                if self.match_token(Token::Extends) {
                    decl.implements = self.parse_type_list()?;
                }
            }
            ClassKind::Enum => {
                if self.match_token(Token::Implements) {
                    decl.implements = self.parse_type_list()?;
                }
            }
        }
        self.consume(Token::LBrace, "'{'")?;
        if kind == ClassKind::Enum {
            decl.enum_constants = self.parse_enum_constants()?;
        }
        decl.body = self.parse_class_body(&name)?;
        decl.span = self.span_from(start);
        Ok(decl)
    }

    fn parse_type_list(&mut self) -> Result<Vec<TypeRef>> {
        let mut types = vec![self.parse_type()?];
        while self.match_token(Token::Comma) {
            types.push(self.parse_type()?);
        }
        Ok(types)
    }

    fn parse_type_params(&mut self) -> Result<Vec<TypeParam>> {
        self.consume(Token::Lt, "'<'")?;
        let mut params = Vec::new();
        loop {
            self.skip_annotations()?;
            let start = self.location();
            let name = self.identifier()?;
            let mut bounds = Vec::new();
            if self.match_token(Token::Extends) {
                bounds.push(self.parse_type()?);
                while self.match_token(Token::Amp) {
                    bounds.push(self.parse_type()?);
                }
            }
            params.push(TypeParam { name, bounds, span: self.span_from(start) });
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        self.consume_type_args_close()?;
        Ok(params)
    }

    fn parse_enum_constants(&mut self) -> Result<Vec<EnumConstant>> {
        let mut constants = Vec::new();
        loop {
            self.skip_annotations()?;
            if !self.check(Token::Identifier) {
                break;
            }
            let start = self.location();
            let name = self.identifier()?;
            let args = if self.check(Token::LParen) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            let body = if self.check(Token::LBrace) {
                let body_start = self.location();
                self.advance();
                let mut anon = ClassDecl::new(ClassKind::Class, String::new(), Span::single(body_start));
                anon.body = self.parse_class_body("")?;
                anon.is_anonymous = true;
                anon.span = self.span_from(body_start);
                Some(Box::new(anon))
            } else {
                None
            };
            constants.push(EnumConstant { name, args, body, ctor: None, span: self.span_from(start) });
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        if !self.check(Token::RBrace) {
            self.consume(Token::Semicolon, "';' or '}'")?;
        }
        Ok(constants)
    }

    /// Members up to and including the closing brace
    fn parse_class_body(&mut self, class_name: &str) -> Result<Vec<ClassMember>> {
        let mut members = Vec::new();
        while !self.check(Token::RBrace) {
            if self.is_at_end() {
                return Err(self.unexpected("'}'"));
            }
            members.extend(self.parse_member(class_name)?);
        }
        self.consume(Token::RBrace, "'}'")?;
        Ok(members)
    }

    fn parse_member(&mut self, class_name: &str) -> Result<Vec<ClassMember>> {
        let start = self.location();
        if self.match_token(Token::Semicolon) {
            return Ok(Vec::new());
        }
        if self.check(Token::LBrace) {
            let body = self.parse_block()?;
            return Ok(vec![ClassMember::Initializer(Initializer {
                is_static: false,
                body,
                span: self.span_from(start),
            })]);
        }
        if self.check(Token::Static) && self.peek_at(1) == Token::LBrace {
            self.advance();
            let body = self.parse_block()?;
            return Ok(vec![ClassMember::Initializer(Initializer {
                is_static: true,
                body,
                span: self.span_from(start),
            })]);
        }

        let modifiers = self.parse_modifiers()?;
        if matches!(self.peek(), Token::Class | Token::Interface | Token::Enum) {
            let decl = self.parse_type_decl(modifiers, start)?;
            return Ok(vec![ClassMember::Type(decl)]);
        }

        let type_params = if self.check(Token::Lt) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };

        if self.check(Token::Identifier)
            && self.current_token().lexeme == class_name
            && self.peek_at(1) == Token::LParen
        {
            if !type_params.is_empty() {
                return Err(self.unsupported("generic constructors"));
            }
            let name = self.identifier()?;
            return Ok(vec![ClassMember::Constructor(self.parse_constructor_rest(
                modifiers, name, start,
            )?)]);
        }

        let ty = self.parse_type()?;
        let name = self.identifier()?;
        if self.check(Token::LParen) {
            let method = self.parse_method_rest(modifiers, type_params, ty, name, start)?;
            return Ok(vec![ClassMember::Method(method)]);
        }
        if !type_params.is_empty() {
            return Err(self.unexpected("'('"));
        }

        let mut fields = Vec::new();
        let mut name = name;
        loop {
            let field_ty = self.parse_declarator_dims(ty.clone())?;
            let initializer = if self.match_token(Token::Assign) {
                Some(self.parse_variable_initializer(&field_ty)?)
            } else {
                None
            };
            fields.push(ClassMember::Field(FieldDecl {
                modifiers,
                ty: field_ty,
                name,
                initializer,
                span: self.span_from(start),
            }));
            if !self.match_token(Token::Comma) {
                break;
            }
            name = self.identifier()?;
        }
        self.consume(Token::Semicolon, "';'")?;
        Ok(fields)
    }

    /// Trailing `[]` after a declarator name
    fn parse_declarator_dims(&mut self, mut ty: TypeRef) -> Result<TypeRef> {
        while self.check(Token::LBracket) && self.peek_at(1) == Token::RBracket {
            self.advance();
            self.advance();
            ty.array_dims += 1;
            ty.resolved = None;
        }
        Ok(ty)
    }

    fn parse_parameters(&mut self) -> Result<Vec<Parameter>> {
        self.consume(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                let start = self.location();
                let modifiers = self.parse_modifiers()?;
                let ty = self.parse_type()?;
                if self.check(Token::Ellipsis) {
                    return Err(self.unsupported("variable-arity parameters"));
                }
                let name = self.identifier()?;
                let ty = self.parse_declarator_dims(ty)?;
                params.push(Parameter { modifiers, ty, name, span: self.span_from(start) });
                if !self.match_token(Token::Comma) {
                    break;
                }
            }
        }
        self.consume(Token::RParen, "')'")?;
        Ok(params)
    }

    fn parse_throws(&mut self) -> Result<Vec<TypeRef>> {
        if self.match_token(Token::Throws) {
            self.parse_type_list()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_method_rest(
        &mut self,
        modifiers: Modifiers,
        type_params: Vec<TypeParam>,
        return_type: TypeRef,
        name: String,
        start: Location,
    ) -> Result<MethodDecl> {
        let params = self.parse_parameters()?;
        let return_type = self.parse_declarator_dims(return_type)?;
        let throws = self.parse_throws()?;
        let body = if self.match_token(Token::Semicolon) {
            None
        } else {
            Some(self.parse_block()?)
        };
        Ok(MethodDecl {
            modifiers,
            type_params,
            return_type,
            name,
            params,
            throws,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_constructor_rest(
        &mut self,
        modifiers: Modifiers,
        name: String,
        start: Location,
    ) -> Result<ConstructorDecl> {
        let params = self.parse_parameters()?;
        let throws = self.parse_throws()?;
        let body_start = self.location();
        self.consume(Token::LBrace, "'{'")?;

        let explicit_call = self.parse_explicit_ctor_call()?;
        let mut stmts = Vec::new();
        while !self.check(Token::RBrace) {
            if self.is_at_end() {
                return Err(self.unexpected("'}'"));
            }
            stmts.extend(self.parse_block_stmt()?);
        }
        self.consume(Token::RBrace, "'}'")?;
        Ok(ConstructorDecl {
            modifiers,
            name,
            params,
            throws,
            prologue: Vec::new(),
            explicit_call,
            body: Block::new(stmts, self.span_from(body_start)),
            span: self.span_from(start),
        })
    }

    /// `this(...)`, `super(...)` or `outer.super(...)` as the first statement
    fn parse_explicit_ctor_call(&mut self) -> Result<Option<CtorCall>> {
        let start = self.location();
        let kind = match (self.peek(), self.peek_at(1)) {
            (Token::This, Token::LParen) => CtorCallKind::This,
            (Token::Super, Token::LParen) => CtorCallKind::Super,
            _ => {
                // Qualified superclass constructor invocation: `outer.super(...)`
                let save = self.current;
                if self.check(Token::Identifier) {
                    if let Ok(outer) = self.parse_postfix_no_call_super() {
                        if self.check(Token::Dot)
                            && self.peek_at(1) == Token::Super
                            && self.peek_at(2) == Token::LParen
                        {
                            self.advance();
                            self.advance();
                            let args = self.parse_arguments()?;
                            self.consume(Token::Semicolon, "';'")?;
                            return Ok(Some(CtorCall {
                                kind: CtorCallKind::Super,
                                outer: Some(Box::new(outer)),
                                args,
                                ctor: None,
                                span: self.span_from(start),
                            }));
                        }
                    }
                }
                self.current = save;
                return Ok(None);
            }
        };
        self.advance();
        let args = self.parse_arguments()?;
        self.consume(Token::Semicolon, "';'")?;
        Ok(Some(CtorCall { kind, outer: None, args, ctor: None, span: self.span_from(start) }))
    }

    fn parse_postfix_no_call_super(&mut self) -> Result<Expr> {
        let start = self.location();
        let name = self.identifier()?;
        let mut expr = Expr::new(ExprKind::Name { name, binding: None }, self.span_from(start));
        while self.check(Token::Dot) && self.peek_at(1) == Token::Identifier {
            self.advance();
            let name = self.identifier()?;
            expr = Expr::new(
                ExprKind::FieldAccess { target: Box::new(expr), name, field: None },
                self.span_from(start),
            );
        }
        Ok(expr)
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    pub fn parse_type(&mut self) -> Result<TypeRef> {
        self.skip_annotations()?;
        let start = self.location();
        let syntax = if let Some(p) = primitive_of(self.peek()) {
            self.advance();
            TypeSyntax::Primitive(p)
        } else {
            let mut segments = Vec::new();
            loop {
                let name = self.identifier()?;
                let args = if self.check(Token::Lt) {
                    self.parse_type_args()?
                } else {
                    Vec::new()
                };
                segments.push(TypeSegment { name, args });
                if self.check(Token::Dot) && self.peek_at(1) == Token::Identifier {
                    self.advance();
                } else {
                    break;
                }
            }
            TypeSyntax::Named(segments)
        };
        let mut array_dims = 0;
        while self.check(Token::LBracket) && self.peek_at(1) == Token::RBracket {
            self.advance();
            self.advance();
            array_dims += 1;
        }
        let resolved = match (&syntax, array_dims) {
            (TypeSyntax::Primitive(p), 0) => Some(crate::common::types::Type::Primitive(*p)),
            _ => None,
        };
        Ok(TypeRef { syntax, array_dims, span: self.span_from(start), resolved })
    }

    fn parse_type_args(&mut self) -> Result<Vec<TypeRef>> {
        self.consume(Token::Lt, "'<'")?;
        let mut args = Vec::new();
        if self.check(Token::Gt) {
            return Err(self.unsupported("diamond type arguments"));
        }
        loop {
            self.skip_annotations()?;
            if self.check(Token::Question) {
                let start = self.location();
                self.advance();
                let (bound, is_super) = if self.match_token(Token::Extends) {
                    (Some(Box::new(self.parse_type()?)), false)
                } else if self.match_token(Token::Super) {
                    (Some(Box::new(self.parse_type()?)), true)
                } else {
                    (None, false)
                };
                args.push(TypeRef {
                    syntax: TypeSyntax::Wildcard { bound, is_super },
                    array_dims: 0,
                    span: self.span_from(start),
                    resolved: None,
                });
            } else {
                args.push(self.parse_type()?);
            }
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        self.consume_type_args_close()?;
        Ok(args)
    }

    /// Speculatively parse a type; restores the position on failure
    fn try_parse_type(&mut self) -> Option<TypeRef> {
        let save = self.current;
        match self.parse_type() {
            Ok(ty) => Some(ty),
            Err(_) => {
                self.current = save;
                None
            }
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    pub fn parse_block(&mut self) -> Result<Block> {
        let start = self.location();
        self.consume(Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(Token::RBrace) {
            if self.is_at_end() {
                return Err(self.unexpected("'}'"));
            }
            stmts.extend(self.parse_block_stmt()?);
        }
        self.consume(Token::RBrace, "'}'")?;
        Ok(Block::new(stmts, self.span_from(start)))
    }

    /// A block statement; local declarations with several declarators yield several statements
    fn parse_block_stmt(&mut self) -> Result<Vec<Stmt>> {
        if matches!(self.peek(), Token::Class | Token::Interface | Token::Enum)
            || (matches!(self.peek(), Token::Abstract | Token::Final | Token::Static)
                && matches!(self.peek_at(1), Token::Class | Token::Interface | Token::Enum))
        {
            return Err(self.unsupported("local class declarations"));
        }
        if self.is_local_var_decl() {
            let stmts = self.parse_local_var_decl()?;
            self.consume(Token::Semicolon, "';'")?;
            return Ok(stmts);
        }
        Ok(vec![self.parse_statement()?])
    }

    fn is_local_var_decl(&mut self) -> bool {
        let save = self.current;
        let result = (|| {
            self.parse_modifiers().ok()?;
            if !(self.check(Token::Identifier) || primitive_of(self.peek()).is_some()) {
                return None;
            }
            if self.check(Token::Void) {
                return None;
            }
            self.try_parse_type()?;
            if !self.check(Token::Identifier) {
                return None;
            }
            Some(matches!(
                self.peek_at(1),
                Token::Assign | Token::Semicolon | Token::Comma | Token::LBracket | Token::Colon
            ))
        })()
        .unwrap_or(false);
        self.current = save;
        result
    }

    fn parse_local_var_decl(&mut self) -> Result<Vec<Stmt>> {
        let start = self.location();
        let modifiers = self.parse_modifiers()?;
        let ty = self.parse_type()?;
        let mut stmts = Vec::new();
        loop {
            let name = self.identifier()?;
            let var_ty = self.parse_declarator_dims(ty.clone())?;
            let init = if self.match_token(Token::Assign) {
                Some(self.parse_variable_initializer(&var_ty)?)
            } else {
                None
            };
            stmts.push(Stmt::new(
                StmtKind::LocalVar(LocalVar { modifiers, ty: var_ty, name, init }),
                self.span_from(start),
            ));
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        Ok(stmts)
    }

    fn parse_variable_initializer(&mut self, ty: &TypeRef) -> Result<Expr> {
        if self.check(Token::LBrace) {
            self.parse_array_initializer(ty)
        } else {
            self.parse_expression()
        }
    }

    fn parse_array_initializer(&mut self, ty: &TypeRef) -> Result<Expr> {
        let start = self.location();
        if ty.array_dims == 0 {
            return Err(Error::grammar("array initializer for a non-array type", start));
        }
        self.consume(Token::LBrace, "'{'")?;
        let mut element_ty = ty.clone();
        element_ty.array_dims -= 1;
        element_ty.resolved = None;
        let mut values = Vec::new();
        while !self.check(Token::RBrace) {
            values.push(self.parse_variable_initializer(&element_ty)?);
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        self.consume(Token::RBrace, "'}'")?;
        let mut elem = ty.clone();
        elem.array_dims = 0;
        elem.resolved = match &elem.syntax {
            TypeSyntax::Primitive(p) => Some(crate::common::types::Type::Primitive(*p)),
            _ => None,
        };
        Ok(Expr::new(
            ExprKind::NewArray { elem, dims: Vec::new(), extra_dims: ty.array_dims, init: Some(values) },
            self.span_from(start),
        ))
    }

    pub fn parse_statement(&mut self) -> Result<Stmt> {
        self.enter()?;
        let result = self.parse_statement_inner();
        self.leave();
        result
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt> {
        let start = self.location();
        let kind = match self.peek() {
            Token::LBrace => StmtKind::Block(self.parse_block()?),
            Token::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            Token::If => {
                self.advance();
                let cond = self.parse_paren_expr()?;
                let then_branch = Box::new(self.parse_statement()?);
                let else_branch = if self.match_token(Token::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                StmtKind::If { cond, then_branch, else_branch }
            }
            Token::While => {
                self.advance();
                let cond = self.parse_paren_expr()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { cond, body, cond_setup: Vec::new() }
            }
            Token::Do => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.consume(Token::While, "'while'")?;
                let cond = self.parse_paren_expr()?;
                self.consume(Token::Semicolon, "';'")?;
                StmtKind::DoWhile { body, cond, cond_setup: Vec::new() }
            }
            Token::For => self.parse_for()?,
            Token::Return => {
                self.advance();
                let value = if self.check(Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume(Token::Semicolon, "';'")?;
                StmtKind::Return(value)
            }
            Token::Break | Token::Continue => {
                let is_break = self.advance().token == Token::Break;
                let label = if self.check(Token::Identifier) { Some(self.identifier()?) } else { None };
                self.consume(Token::Semicolon, "';'")?;
                if is_break {
                    StmtKind::Break(label)
                } else {
                    StmtKind::Continue(label)
                }
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.consume(Token::Semicolon, "';'")?;
                StmtKind::Throw(value)
            }
            Token::Switch => self.parse_switch()?,
            Token::Try => self.parse_try()?,
            Token::Synchronized => return Err(self.unsupported("synchronized statements")),
            Token::Identifier if self.peek_at(1) == Token::Colon => {
                let label = self.identifier()?;
                self.advance();
                let body = Box::new(self.parse_statement()?);
                StmtKind::Labeled { label, body }
            }
            _ => {
                let expr = self.parse_expression()?;
                if !is_statement_expression(&expr) {
                    return Err(Error::grammar("not a statement", expr.span.start));
                }
                self.consume(Token::Semicolon, "';'")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn parse_paren_expr(&mut self) -> Result<Expr> {
        self.consume(Token::LParen, "'('")?;
        let expr = self.parse_expression()?;
        self.consume(Token::RParen, "')'")?;
        Ok(expr)
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.consume(Token::For, "'for'")?;
        self.consume(Token::LParen, "'('")?;

        // Enhanced for: [modifiers] Type name ':' expr
        let save = self.current;
        if let Ok(modifiers) = self.parse_modifiers() {
            if let Some(ty) = self.try_parse_type() {
                if self.check(Token::Identifier) && self.peek_at(1) == Token::Colon {
                    let name = self.identifier()?;
                    self.advance();
                    let iterable = self.parse_expression()?;
                    self.consume(Token::RParen, "')'")?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(StmtKind::ForEach {
                        var: LocalVar { modifiers, ty, name, init: None },
                        iterable,
                        body,
                        item: None,
                    });
                }
            }
        }
        self.current = save;

        let mut init = Vec::new();
        if !self.check(Token::Semicolon) {
            if self.is_local_var_decl() {
                init = self.parse_local_var_decl()?;
            } else {
                for expr in self.parse_expression_list()? {
                    init.push(Stmt::expr(expr));
                }
            }
        }
        self.consume(Token::Semicolon, "';'")?;
        let cond = if self.check(Token::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.consume(Token::Semicolon, "';'")?;
        let mut update = Vec::new();
        if !self.check(Token::RParen) {
            for expr in self.parse_expression_list()? {
                update.push(Stmt::expr(expr));
            }
        }
        self.consume(Token::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For { init, cond, update, body, cond_setup: Vec::new() })
    }

    fn parse_expression_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            if !is_statement_expression(&expr) {
                return Err(Error::grammar("not a statement", expr.span.start));
            }
            exprs.push(expr);
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    fn parse_switch(&mut self) -> Result<StmtKind> {
        self.consume(Token::Switch, "'switch'")?;
        let selector = self.parse_paren_expr()?;
        self.consume(Token::LBrace, "'{'")?;
        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.check(Token::RBrace) {
            let start = self.location();
            let mut labels = Vec::new();
            let mut is_default = false;
            while matches!(self.peek(), Token::Case | Token::Default) {
                if self.match_token(Token::Default) {
                    is_default = true;
                } else {
                    self.advance();
                    let expr = self.parse_conditional()?;
                    labels.push(CaseLabel { expr, value: None });
                }
                if self.check(Token::Arrow) {
                    return Err(self.unsupported("arrow-form switch labels"));
                }
                self.consume(Token::Colon, "':'")?;
            }
            if labels.is_empty() && !is_default {
                return Err(self.unexpected("'case', 'default' or '}'"));
            }
            let mut body = Vec::new();
            while !matches!(self.peek(), Token::Case | Token::Default | Token::RBrace | Token::Eof) {
                body.extend(self.parse_block_stmt()?);
            }
            cases.push(SwitchCase { labels, is_default, body, span: self.span_from(start) });
        }
        self.consume(Token::RBrace, "'}'")?;
        Ok(StmtKind::Switch { selector, cases })
    }

    fn parse_try(&mut self) -> Result<StmtKind> {
        self.consume(Token::Try, "'try'")?;
        if self.check(Token::LParen) {
            return Err(self.unsupported("try-with-resources statements"));
        }
        let body = self.parse_block()?;
        let mut catches = Vec::new();
        while self.check(Token::Catch) {
            let start = self.location();
            self.advance();
            self.consume(Token::LParen, "'('")?;
            self.parse_modifiers()?;
            let ty = self.parse_type()?;
            if self.check(Token::Pipe) {
                return Err(self.unsupported("multi-catch clauses"));
            }
            let name = self.identifier()?;
            self.consume(Token::RParen, "')'")?;
            let body = self.parse_block()?;
            catches.push(CatchClause { ty, name, body, span: self.span_from(start) });
        }
        let finally = if self.match_token(Token::Finally) { Some(self.parse_block()?) } else { None };
        if catches.is_empty() && finally.is_none() {
            return Err(self.unexpected("'catch' or 'finally'"));
        }
        Ok(StmtKind::Try { body, catches, finally })
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let result = self.parse_assignment();
        self.leave();
        result
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let start = self.location();
        let target = self.parse_conditional()?;
        let op = match self.peek() {
            Token::Assign => None,
            Token::AddAssign => Some(BinaryOp::Add),
            Token::SubAssign => Some(BinaryOp::Sub),
            Token::MulAssign => Some(BinaryOp::Mul),
            Token::DivAssign => Some(BinaryOp::Div),
            Token::ModAssign => Some(BinaryOp::Rem),
            Token::AndAssign => Some(BinaryOp::BitAnd),
            Token::OrAssign => Some(BinaryOp::BitOr),
            Token::XorAssign => Some(BinaryOp::BitXor),
            Token::LShiftAssign => Some(BinaryOp::Shl),
            Token::RShiftAssign => Some(BinaryOp::Shr),
            Token::URShiftAssign => Some(BinaryOp::UShr),
            Token::Arrow => return Err(self.unsupported("lambda expressions")),
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(Error::grammar("invalid assignment target", target.span.start));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::new(
            ExprKind::Assign { op, target: Box::new(target), value: Box::new(value), op_type: None },
            self.span_from(start),
        ))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let start = self.location();
        let cond = self.parse_binary(0)?;
        if !self.match_token(Token::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_expression()?;
        self.consume(Token::Colon, "':'")?;
        let else_expr = self.parse_conditional()?;
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            self.span_from(start),
        ))
    }

    /// Binary operator at the current position with its precedence and token count
    fn binary_op(&self) -> Option<(BinaryOp, u8, usize)> {
        let op = match self.peek() {
            Token::PipePipe => (BinaryOp::Or, 1, 1),
            Token::AndAnd => (BinaryOp::And, 2, 1),
            Token::Pipe => (BinaryOp::BitOr, 3, 1),
            Token::Caret => (BinaryOp::BitXor, 4, 1),
            Token::Amp => (BinaryOp::BitAnd, 5, 1),
            Token::Eq => (BinaryOp::Eq, 6, 1),
            Token::Ne => (BinaryOp::Ne, 6, 1),
            Token::Lt => (BinaryOp::Lt, 7, 1),
            Token::Le => (BinaryOp::Le, 7, 1),
            Token::Ge => (BinaryOp::Ge, 7, 1),
            Token::Gt if self.adjacent_gt(3) => (BinaryOp::UShr, 8, 3),
            Token::Gt if self.adjacent_gt(2) => (BinaryOp::Shr, 8, 2),
            Token::Gt => (BinaryOp::Gt, 7, 1),
            Token::LShift => (BinaryOp::Shl, 8, 1),
            Token::Plus => (BinaryOp::Add, 9, 1),
            Token::Minus => (BinaryOp::Sub, 9, 1),
            Token::Star => (BinaryOp::Mul, 10, 1),
            Token::Slash => (BinaryOp::Div, 10, 1),
            Token::Percent => (BinaryOp::Rem, 10, 1),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let start = self.location();
        let mut left = self.parse_unary()?;
        loop {
            if self.check(Token::InstanceOf) && min_prec <= 7 {
                self.advance();
                let ty = self.parse_type()?;
                left = Expr::new(
                    ExprKind::InstanceOf { expr: Box::new(left), ty },
                    self.span_from(start),
                );
                continue;
            }
            let (op, prec, width) = match self.binary_op() {
                Some(op) if op.1 >= min_prec => op,
                _ => break,
            };
            for _ in 0..width {
                self.advance();
            }
            let right = self.parse_binary(prec + 1)?;
            left = Expr::new(
                ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
                self.span_from(start),
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.enter()?;
        let result = self.parse_unary_inner();
        self.leave();
        result
    }

    fn parse_unary_inner(&mut self) -> Result<Expr> {
        let start = self.location();
        let op = match self.peek() {
            Token::Plus => Some(UnaryOp::Plus),
            Token::Minus => Some(UnaryOp::Neg),
            Token::Bang => Some(UnaryOp::Not),
            Token::Tilde => Some(UnaryOp::BitNot),
            Token::Inc | Token::Dec => {
                let inc = self.advance().token == Token::Inc;
                let target = self.parse_unary()?;
                if !is_assignable(&target) {
                    return Err(Error::grammar("invalid increment target", target.span.start));
                }
                let op = if inc { IncDecOp::PreInc } else { IncDecOp::PreDec };
                return Ok(Expr::new(
                    ExprKind::IncDec { op, target: Box::new(target) },
                    self.span_from(start),
                ));
            }
            Token::LParen => {
                if let Some(cast) = self.try_parse_cast()? {
                    return Ok(cast);
                }
                None
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            if op == UnaryOp::Neg && self.check(Token::IntLiteral) {
                if let Some(value) = negative_literal(&self.current_token().lexeme) {
                    self.advance();
                    return Ok(Expr::literal(value, self.span_from(start)));
                }
            }
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary { op, operand: Box::new(operand) },
                self.span_from(start),
            ));
        }
        self.parse_postfix()
    }

    fn try_parse_cast(&mut self) -> Result<Option<Expr>> {
        let start = self.location();
        let save = self.current;
        self.advance();
        let is_primitive = primitive_of(self.peek()).is_some();
        let ty = match self.try_parse_type() {
            Some(ty) if self.check(Token::RParen) => ty,
            _ => {
                self.current = save;
                return Ok(None);
            }
        };
        self.advance();
        let is_cast = if is_primitive && ty.array_dims == 0 {
            true
        } else {
            matches!(
                self.peek(),
                Token::Identifier
                    | Token::LParen
                    | Token::Bang
                    | Token::Tilde
                    | Token::This
                    | Token::Super
                    | Token::New
            ) || self.peek().is_literal()
                || primitive_of(self.peek()).is_some()
        };
        if !is_cast {
            self.current = save;
            return Ok(None);
        }
        let expr = self.parse_unary()?;
        Ok(Some(Expr::new(ExprKind::Cast { ty, expr: Box::new(expr) }, self.span_from(start))))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.location();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.peek() {
                        Token::New => {
                            let created = self.parse_creator(start)?;
                            expr = match created.kind {
                                ExprKind::New { class, args, body, .. } => Expr::new(
                                    ExprKind::New {
                                        class,
                                        outer: Some(Box::new(expr)),
                                        args,
                                        body,
                                        ctor: None,
                                        captured: Vec::new(),
                                    },
                                    self.span_from(start),
                                ),
                                _ => return Err(self.unexpected("class instance creation")),
                            };
                        }
                        Token::This => {
                            self.advance();
                            let qualifier = expr_to_type(&expr)
                                .ok_or_else(|| Error::grammar("invalid qualified 'this'", expr.span.start))?;
                            expr = Expr::new(
                                ExprKind::This { qualifier: Some(qualifier) },
                                self.span_from(start),
                            );
                        }
                        Token::Class => return Err(self.unsupported("class literals")),
                        Token::Lt => return Err(self.unsupported("explicit method type arguments")),
                        _ => {
                            let name = self.identifier()?;
                            if self.check(Token::LParen) {
                                let args = self.parse_arguments()?;
                                let is_super = matches!(expr.kind, ExprKind::Super);
                                expr = Expr::new(
                                    ExprKind::MethodCall {
                                        target: Some(Box::new(expr)),
                                        name,
                                        args,
                                        method: None,
                                        is_super,
                                    },
                                    self.span_from(start),
                                );
                            } else {
                                expr = Expr::new(
                                    ExprKind::FieldAccess { target: Box::new(expr), name, field: None },
                                    self.span_from(start),
                                );
                            }
                        }
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(Token::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::ArrayAccess { array: Box::new(expr), index: Box::new(index) },
                        self.span_from(start),
                    );
                }
                Token::Inc | Token::Dec => {
                    if !is_assignable(&expr) {
                        break;
                    }
                    let inc = self.advance().token == Token::Inc;
                    let op = if inc { IncDecOp::PostInc } else { IncDecOp::PostDec };
                    expr = Expr::new(ExprKind::IncDec { op, target: Box::new(expr) }, self.span_from(start));
                }
                Token::ColonColon => return Err(self.unsupported("method references")),
                _ => break,
            }
        }
        if matches!(expr.kind, ExprKind::Super) {
            return Err(Error::grammar("'super' must be followed by a member access", expr.span.start));
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.location();
        match self.peek() {
            Token::IntLiteral | Token::FloatLiteral | Token::StringLiteral | Token::CharLiteral
            | Token::True | Token::False => {
                let token = self.advance();
                let value = parse_literal(&token)?;
                Ok(Expr::literal(value, self.span_from(start)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, self.span_from(start)))
            }
            Token::This => {
                self.advance();
                if self.check(Token::LParen) {
                    return Err(Error::grammar(
                        "call to this must be first statement in constructor",
                        start,
                    ));
                }
                Ok(Expr::new(ExprKind::This { qualifier: None }, self.span_from(start)))
            }
            Token::Super => {
                self.advance();
                if !self.check(Token::Dot) {
                    return Err(Error::grammar(
                        "call to super must be first statement in constructor",
                        start,
                    ));
                }
                Ok(Expr::new(ExprKind::Super, self.span_from(start)))
            }
            Token::LParen => {
                self.advance();
                let mut expr = self.parse_expression()?;
                self.consume(Token::RParen, "')'")?;
                expr.span = self.span_from(start);
                Ok(expr)
            }
            Token::New => self.parse_creator(start),
            Token::Identifier => {
                let name = self.identifier()?;
                if self.check(Token::LParen) {
                    let args = self.parse_arguments()?;
                    return Ok(Expr::new(
                        ExprKind::MethodCall { target: None, name, args, method: None, is_super: false },
                        self.span_from(start),
                    ));
                }
                Ok(Expr::new(ExprKind::Name { name, binding: None }, self.span_from(start)))
            }
            Token::Arrow => Err(self.unsupported("lambda expressions")),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        self.consume(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(Token::Comma) {
                    break;
                }
            }
        }
        self.consume(Token::RParen, "')'")?;
        Ok(args)
    }

    /// `new` followed by a class instance or array creation
    fn parse_creator(&mut self, start: Location) -> Result<Expr> {
        self.consume(Token::New, "'new'")?;
        let type_start = self.location();
        let mut ty = if let Some(p) = primitive_of(self.peek()) {
            self.advance();
            TypeRef::primitive(p, self.span_from(type_start))
        } else {
            let mut segments = Vec::new();
            loop {
                let name = self.identifier()?;
                let args = if self.check(Token::Lt) { self.parse_type_args()? } else { Vec::new() };
                segments.push(TypeSegment { name, args });
                if !self.match_token(Token::Dot) {
                    break;
                }
            }
            TypeRef {
                syntax: TypeSyntax::Named(segments),
                array_dims: 0,
                span: self.span_from(type_start),
                resolved: None,
            }
        };

        if self.check(Token::LBracket) {
            let mut dims = Vec::new();
            let mut extra_dims = 0;
            while self.check(Token::LBracket) {
                self.advance();
                if self.match_token(Token::RBracket) {
                    extra_dims += 1;
                    continue;
                }
                if extra_dims > 0 {
                    return Err(self.unexpected("']'"));
                }
                dims.push(self.parse_expression()?);
                self.consume(Token::RBracket, "']'")?;
            }
            if dims.is_empty() {
                ty.array_dims = extra_dims;
                if !self.check(Token::LBrace) {
                    return Err(self.unexpected("array initializer"));
                }
                let init = self.parse_array_initializer(&ty)?;
                let mut init = init;
                init.span = self.span_from(start);
                return Ok(init);
            }
            return Ok(Expr::new(
                ExprKind::NewArray { elem: ty, dims, extra_dims, init: None },
                self.span_from(start),
            ));
        }

        if matches!(ty.syntax, TypeSyntax::Primitive(_)) {
            return Err(self.unexpected("'['"));
        }
        let args = self.parse_arguments()?;
        let body = if self.check(Token::LBrace) {
            let body_start = self.location();
            self.advance();
            let mut anon = ClassDecl::new(ClassKind::Class, String::new(), Span::single(body_start));
            anon.body = self.parse_class_body("")?;
            anon.is_anonymous = true;
            anon.span = self.span_from(body_start);
            Some(Box::new(anon))
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::New { class: ty, outer: None, args, body, ctor: None, captured: Vec::new() },
            self.span_from(start),
        ))
    }
}

fn primitive_of(token: Token) -> Option<PrimitiveType> {
    Some(match token {
        Token::Boolean => PrimitiveType::Boolean,
        Token::Byte => PrimitiveType::Byte,
        Token::Short => PrimitiveType::Short,
        Token::Int => PrimitiveType::Int,
        Token::Long => PrimitiveType::Long,
        Token::Char => PrimitiveType::Char,
        Token::Float => PrimitiveType::Float,
        Token::Double => PrimitiveType::Double,
        Token::Void => PrimitiveType::Void,
        _ => return None,
    })
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Name { .. } | ExprKind::FieldAccess { .. } | ExprKind::ArrayAccess { .. }
    )
}

fn is_statement_expression(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Assign { .. } | ExprKind::IncDec { .. } | ExprKind::MethodCall { .. } | ExprKind::New { .. }
    )
}

/// Dotted name expression as a type reference (for `Outer.this`)
fn expr_to_type(expr: &Expr) -> Option<TypeRef> {
    fn collect(expr: &Expr, out: &mut Vec<String>) -> bool {
        match &expr.kind {
            ExprKind::Name { name, .. } => {
                out.push(name.clone());
                true
            }
            ExprKind::FieldAccess { target, name, .. } => {
                if !collect(target, out) {
                    return false;
                }
                out.push(name.clone());
                true
            }
            _ => false,
        }
    }
    let mut names = Vec::new();
    if !collect(expr, &mut names) {
        return None;
    }
    Some(TypeRef::named(&names.join("."), expr.span))
}

fn negative_literal(lexeme: &str) -> Option<Constant> {
    match lexeme {
        "2147483648" => Some(Constant::Int(i32::MIN)),
        "9223372036854775808L" | "9223372036854775808l" => Some(Constant::Long(i64::MIN)),
        _ => None,
    }
}

fn parse_literal(token: &LexicalToken) -> Result<Constant> {
    let text = token.lexeme.as_str();
    let bad = |what: &str| Error::lexical(format!("{}: {}", what, text), token.location);
    match token.token {
        Token::True => Ok(Constant::Boolean(true)),
        Token::False => Ok(Constant::Boolean(false)),
        Token::IntLiteral => {
            let cleaned: String = text.chars().filter(|c| *c != '_').collect();
            let (digits, is_long) = match cleaned.strip_suffix(['l', 'L']) {
                Some(d) => (d.to_string(), true),
                None => (cleaned.clone(), false),
            };
            let (radix, body) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
                (16, hex.to_string())
            } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
                (2, bin.to_string())
            } else if digits.len() > 1 && digits.starts_with('0') {
                (8, digits[1..].to_string())
            } else {
                (10, digits.clone())
            };
            let value = u64::from_str_radix(&body, radix).map_err(|_| bad("malformed integer literal"))?;
            if is_long {
                if radix == 10 && value > i64::MAX as u64 {
                    return Err(bad("integer number too large"));
                }
                Ok(Constant::Long(value as i64))
            } else if radix == 10 {
                if value > i32::MAX as u64 {
                    return Err(bad("integer number too large"));
                }
                Ok(Constant::Int(value as i32))
            } else {
                if value > u32::MAX as u64 {
                    return Err(bad("integer number too large"));
                }
                Ok(Constant::Int(value as u32 as i32))
            }
        }
        Token::FloatLiteral => {
            let cleaned: String = text.chars().filter(|c| *c != '_').collect();
            if let Some(body) = cleaned.strip_suffix(['f', 'F']) {
                body.parse::<f32>().map(Constant::Float).map_err(|_| bad("malformed floating-point literal"))
            } else {
                let body = cleaned.strip_suffix(['d', 'D']).unwrap_or(&cleaned);
                body.parse::<f64>().map(Constant::Double).map_err(|_| bad("malformed floating-point literal"))
            }
        }
        Token::CharLiteral => {
            let units = unescape(&text[1..text.len() - 1]).ok_or_else(|| bad("illegal escape character"))?;
            match units.as_slice() {
                [unit] => Ok(Constant::Char(*unit)),
                _ => Err(bad("unclosed character literal")),
            }
        }
        Token::StringLiteral => {
            let units = unescape(&text[1..text.len() - 1]).ok_or_else(|| bad("illegal escape character"))?;
            Ok(Constant::String(String::from_utf16_lossy(&units)))
        }
        _ => Err(bad("unexpected literal")),
    }
}

/// Decode escapes into UTF-16 code units
fn unescape(body: &str) -> Option<Vec<u16>> {
    let mut out = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            out.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let escaped = chars.next()?;
        let unit = match escaped {
            'n' => '\n' as u16,
            't' => '\t' as u16,
            'r' => '\r' as u16,
            'b' => 0x08,
            'f' => 0x0c,
            's' => ' ' as u16,
            '\'' => '\'' as u16,
            '"' => '"' as u16,
            '\\' => '\\' as u16,
            'u' => {
                while chars.peek() == Some(&'u') {
                    chars.next();
                }
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                if hex.len() != 4 {
                    return None;
                }
                u16::from_str_radix(&hex, 16).ok()?
            }
            '0'..='7' => {
                let mut value = escaped.to_digit(8)?;
                let max_digits = if escaped <= '3' { 2 } else { 1 };
                for _ in 0..max_digits {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                value as u16
            }
            _ => return None,
        };
        out.push(unit);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_class(source: &str) -> ClassDecl {
        let mut ast = parse(source).expect("parse failed");
        ast.type_decls.remove(0)
    }

    fn method_body(class: &ClassDecl, name: &str) -> Vec<Stmt> {
        class
            .body
            .iter()
            .find_map(|m| match m {
                ClassMember::Method(md) if md.name == name => md.body.clone(),
                _ => None,
            })
            .expect("method not found")
            .stmts
    }

    #[test]
    fn test_parse_package_imports_and_class() {
        let ast = parse(
            "package com.example;\nimport java.util.List;\nimport java.util.*;\nimport static java.lang.Math.max;\npublic class A extends B implements C, D {}",
        )
        .unwrap();
        assert_eq!(ast.package_name(), "com.example");
        assert_eq!(ast.imports.len(), 3);
        assert!(ast.imports[1].is_wildcard);
        assert!(ast.imports[2].is_static);
        let class = &ast.type_decls[0];
        assert_eq!(class.name, "A");
        assert!(class.modifiers.is_public());
        assert_eq!(class.extends.as_ref().unwrap().dotted_name().unwrap(), "B");
        assert_eq!(class.implements.len(), 2);
    }

    #[test]
    fn test_parse_members() {
        let class = first_class(
            "class A<T extends Comparable<T>> { int a, b[] = {1}; static { } A(int x) { this(); } <U> U id(U u) { return u; } abstract void f(); class Inner {} }",
        );
        assert_eq!(class.type_params.len(), 1);
        let kinds: Vec<&str> = class
            .body
            .iter()
            .map(|m| match m {
                ClassMember::Field(_) => "field",
                ClassMember::Method(_) => "method",
                ClassMember::Constructor(_) => "ctor",
                ClassMember::Initializer(_) => "init",
                ClassMember::Type(_) => "type",
            })
            .collect();
        assert_eq!(kinds, vec!["field", "field", "init", "ctor", "method", "method", "type"]);
        match &class.body[1] {
            ClassMember::Field(f) => {
                assert_eq!(f.ty.array_dims, 1);
                assert!(matches!(f.initializer.as_ref().unwrap().kind, ExprKind::NewArray { .. }));
            }
            _ => panic!("expected field"),
        }
        match &class.body[3] {
            ClassMember::Constructor(c) => {
                assert_eq!(c.explicit_call.as_ref().unwrap().kind, CtorCallKind::This)
            }
            _ => panic!("expected constructor"),
        }
    }

    #[test]
    fn test_parse_enum_with_bodies() {
        let class = first_class("enum Op { PLUS(\"+\") { int apply() { return 1; } }, MINUS(\"-\"); final String s; Op(String s) { this.s = s; } }");
        assert_eq!(class.kind, ClassKind::Enum);
        assert_eq!(class.enum_constants.len(), 2);
        assert!(class.enum_constants[0].body.is_some());
        assert_eq!(class.enum_constants[1].args.len(), 1);
    }

    #[test]
    fn test_parse_precedence_and_shift() {
        let class = first_class("class A { void f() { x = a + b * c >> 2; } }");
        let body = method_body(&class, "f");
        let StmtKind::Expr(Expr { kind: ExprKind::Assign { value, .. }, .. }) = &body[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op: BinaryOp::Shr, left, .. } = &value.kind else {
            panic!("expected shift at the top");
        };
        assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_parse_generic_local_and_cast() {
        let class = first_class(
            "class A { void f() { java.util.List<java.util.List<String>> xs = null; int i = (int) 3L; Object o = (Object) xs; int j = (i) + 1; } }",
        );
        let body = method_body(&class, "f");
        assert_eq!(body.len(), 4);
        let StmtKind::LocalVar(xs) = &body[0].kind else { panic!("expected local") };
        assert_eq!(xs.ty.to_string(), "java.util.List<java.util.List<String>>");
        let StmtKind::LocalVar(i) = &body[1].kind else { panic!("expected local") };
        assert!(matches!(i.init.as_ref().unwrap().kind, ExprKind::Cast { .. }));
        let StmtKind::LocalVar(j) = &body[3].kind else { panic!("expected local") };
        assert!(matches!(j.init.as_ref().unwrap().kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_parse_statements() {
        let class = first_class(
            "class A { void f(int[] xs) { outer: for (int i = 0, j = 1; i < 10; i++, j--) { if (i == 2) continue outer; else break; } for (int x : xs) { } do { } while (false); switch (xs[0]) { case 1: case 2: return; default: } try { } catch (RuntimeException e) { } finally { } } }",
        );
        let body = method_body(&class, "f");
        assert!(matches!(body[0].kind, StmtKind::Labeled { .. }));
        assert!(matches!(body[1].kind, StmtKind::ForEach { .. }));
        assert!(matches!(body[2].kind, StmtKind::DoWhile { .. }));
        let StmtKind::Switch { cases, .. } = &body[3].kind else { panic!("expected switch") };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].labels.len(), 2);
        assert!(cases[1].is_default);
        assert!(matches!(body[4].kind, StmtKind::Try { .. }));
    }

    #[test]
    fn test_parse_anonymous_and_qualified_this() {
        let class = first_class(
            "class A { class B { Object f() { return A.this; } } Runnable r = new Runnable() { public void run() { } }; B b = this.new B(); }",
        );
        let ClassMember::Field(field) = &class.body[1] else { panic!("expected field") };
        let ExprKind::New { body, .. } = &field.initializer.as_ref().unwrap().kind else {
            panic!("expected new")
        };
        assert!(body.as_ref().unwrap().is_anonymous);
        let ClassMember::Field(field) = &class.body[2] else { panic!("expected field") };
        let ExprKind::New { outer, .. } = &field.initializer.as_ref().unwrap().kind else {
            panic!("expected new")
        };
        assert!(outer.is_some());
    }

    #[test]
    fn test_parse_literals() {
        let class = first_class(
            "class A { void f() { a = 0x7fffffff; b = -2147483648; c = 010; d = 'A'; e = \"a\\tb\\u0041\"; f = 1e2; g = 2.5f; } }",
        );
        let values: Vec<Constant> = method_body(&class, "f")
            .into_iter()
            .map(|s| match s.kind {
                StmtKind::Expr(Expr { kind: ExprKind::Assign { value, .. }, .. }) => {
                    value.attrs.constant.clone().unwrap()
                }
                _ => panic!("expected assignment"),
            })
            .collect();
        assert_eq!(
            values,
            vec![
                Constant::Int(i32::MAX),
                Constant::Int(i32::MIN),
                Constant::Int(8),
                Constant::Char(65),
                Constant::String("a\tbA".into()),
                Constant::Double(100.0),
                Constant::Float(2.5),
            ]
        );
    }

    #[test]
    fn test_grammar_errors() {
        let err = parse("class A { void f() { int x = ; } }").unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::Grammar));
        let err = parse("class A { void f() { class L {} } }").unwrap_err();
        assert!(err.to_string().contains("local class declarations"), "{err}");
        let err = parse("class A { void f() { 1 + 2; } }").unwrap_err();
        assert!(err.to_string().contains("not a statement"), "{err}");
    }
}
