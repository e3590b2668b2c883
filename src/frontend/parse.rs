//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing infrastructure,
//! including the error type, token helpers, and the translation-unit entry
//! point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following organization:
//! - This module: Parser struct, helper methods, and coordination
//! - `declarations`: struct definitions, globals, functions and prototypes, types
//! - `statements`: statements (if, while, for, switch, ...)
//! - `expressions`: expressions with precedence climbing
//!
//! Parser methods are split across those files using `impl Parser` blocks.

use super::ast::*;
use super::lexer::{LexError, Lexer, Token, TokenKind};

/// Parser error type
#[derive(Debug, Clone, thiserror::Error)]
#[error("Parse error at {location}: {message}")]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            location: err.location,
        }
    }
}

/// Recursive descent parser for the C subset
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
    macro_expansions: Vec<MacroExpansion>,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
            macro_expansions: lexer.into_macro_expansions(),
        })
    }

    /// Parse every top-level item of the source.
    pub fn parse_translation_unit(&mut self) -> Result<TranslationUnit, ParseError> {
        let mut items = Vec::new();

        while !self.is_at_end() {
            // stray semicolons at file scope
            if self.match_token(&TokenKind::Semicolon) {
                continue;
            }
            items.extend(self.parse_top_level_declaration()?);
        }

        Ok(TranslationUnit {
            items,
            macro_expansions: std::mem::take(&mut self.macro_expansions),
        })
    }

    // ===== Helper methods =====

    pub(crate) fn is_type_keyword(&self) -> bool {
        Self::starts_type(&self.peek().kind)
    }

    pub(crate) fn starts_type(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Int
                | TokenKind::Char
                | TokenKind::Void
                | TokenKind::Struct
                | TokenKind::Const
                | TokenKind::Static
        )
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    pub(crate) fn peek(&self) -> &Token {
        // the token stream always ends with Eof and `advance` never moves past it
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n)
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    pub(crate) fn previous_location(&self) -> SourceLocation {
        self.previous().location
    }

    /// Last character of the previously consumed token.
    pub(crate) fn previous_end(&self) -> SourceLocation {
        self.previous().end
    }

    pub(crate) fn current_location(&self) -> SourceLocation {
        self.peek().location
    }

    pub(crate) fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(
            format!("{}, found {}", message.into(), self.peek()),
            self.current_location(),
        )
    }

    pub(crate) fn expect_token(&mut self, kind: &TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(message))
        }
    }

    pub(crate) fn expect_lparen(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::LParen, &format!("Expected '(' {ctx}"))
    }

    pub(crate) fn expect_rparen(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::RParen, &format!("Expected ')' {ctx}"))
    }

    pub(crate) fn expect_lbrace(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::LBrace, &format!("Expected '{{' {ctx}"))
    }

    pub(crate) fn expect_rbrace(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::RBrace, &format!("Expected '}}' {ctx}"))
    }

    pub(crate) fn expect_semicolon(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(&TokenKind::Semicolon, &format!("Expected ';' {ctx}"))
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here("Expected identifier"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> TranslationUnit {
        let mut parser = Parser::new(source).unwrap();
        parser.parse_translation_unit().unwrap()
    }

    #[test]
    fn test_parse_simple_function() {
        let unit = parse("int main() { return 0; }");

        assert_eq!(unit.items.len(), 1);
        match &unit.items[0] {
            Item::Function(f) => {
                assert_eq!(f.name, "main");
                assert!(f.params.is_empty());
                assert_eq!(f.return_type, Type::Int);
                assert_eq!(f.body.as_ref().map(Vec::len), Some(1));
            }
            other => panic!("Expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_struct_and_prototype() {
        let unit = parse("struct Point { int x; int y; };\nvoid g(int *);\nint printf(char *fmt, ...);");

        assert_eq!(unit.items.len(), 3);
        match &unit.items[0] {
            Item::Struct(s) => {
                assert_eq!(s.name, "Point");
                assert_eq!(s.fields.len(), 2);
            }
            other => panic!("Expected struct definition, got {:?}", other),
        }
        match &unit.items[1] {
            Item::Function(f) => {
                assert!(f.body.is_none());
                assert_eq!(f.params[0].ty, Type::Int.pointer_to());
                assert_eq!(f.params[0].name, None);
            }
            other => panic!("Expected prototype, got {:?}", other),
        }
        match &unit.items[2] {
            Item::Function(f) => assert!(f.variadic),
            other => panic!("Expected prototype, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_globals() {
        let unit = parse("int counter = 3, *cursor;\nstatic char buf[16];");
        assert_eq!(unit.items.len(), 3);
        match &unit.items[2] {
            Item::Global(decl) => {
                assert!(decl.is_static);
                assert_eq!(decl.ty, Type::Char.array_of(Some(16)));
            }
            other => panic!("Expected global, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_location() {
        let mut parser = Parser::new("int main() { return 0 }").unwrap();
        let err = parser.parse_translation_unit().unwrap_err();
        assert_eq!(err.location, SourceLocation::new(1, 23));
    }
}
