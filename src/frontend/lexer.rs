//! Lexer (tokenizer) for C source code
//!
//! Converts raw source text into a flat [`Token`] stream consumed by the parser.
//! Preprocessor handling is deliberately small:
//!
//! - `#include` and unknown directives are skipped.
//! - Object-like `#define NAME tokens` macros are expanded at each use. The
//!   expanded tokens take the location of the macro name at the use site, and
//!   each use is recorded as a [`MacroExpansion`] so diagnostics can group
//!   path events that came out of a macro.
//! - Function-like macros are skipped and never expanded.

use super::ast::{MacroExpansion, SourceLocation};
use rustc_hash::FxHashMap;
use std::fmt;

/// Nested expansion limit; also stops self-referential macros.
const MAX_MACRO_DEPTH: usize = 16;

/// Token payloads produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    CharLiteral(i8),
    StringLiteral(String),

    // Identifiers
    Ident(String),

    // Keywords
    Int,
    Char,
    Void,
    Struct,
    Const,
    Static,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Goto,
    Sizeof,
    Null,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    AndAnd,
    OrOr,
    Bang,

    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    LtLt,
    GtGt,

    // Assignment
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LtLtEq,
    GtGtEq,

    PlusPlus,
    MinusMinus,

    Dot,
    Arrow,
    Ellipsis,

    Question,
    Colon,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,

    Eof,
}

/// A token with the location of its first and last character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    pub end: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation, end: SourceLocation) -> Self {
        Self {
            kind,
            location,
            end,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::IntLiteral(n) => return write!(f, "int literal {}", n),
            TokenKind::CharLiteral(c) => {
                let byte = *c as u8;
                return if byte.is_ascii_graphic() || byte == b' ' {
                    write!(f, "char literal '{}'", byte as char)
                } else {
                    write!(f, "char literal '\\x{:02x}'", byte)
                };
            }
            TokenKind::StringLiteral(s) => return write!(f, "string literal \"{}\"", s),
            TokenKind::Ident(s) => return write!(f, "identifier '{}'", s),
            TokenKind::Int => "'int'",
            TokenKind::Char => "'char'",
            TokenKind::Void => "'void'",
            TokenKind::Struct => "'struct'",
            TokenKind::Const => "'const'",
            TokenKind::Static => "'static'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::Do => "'do'",
            TokenKind::For => "'for'",
            TokenKind::Switch => "'switch'",
            TokenKind::Case => "'case'",
            TokenKind::Default => "'default'",
            TokenKind::Break => "'break'",
            TokenKind::Continue => "'continue'",
            TokenKind::Return => "'return'",
            TokenKind::Goto => "'goto'",
            TokenKind::Sizeof => "'sizeof'",
            TokenKind::Null => "'NULL'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Amp => "'&'",
            TokenKind::Pipe => "'|'",
            TokenKind::Caret => "'^'",
            TokenKind::Tilde => "'~'",
            TokenKind::LtLt => "'<<'",
            TokenKind::GtGt => "'>>'",
            TokenKind::Eq => "'='",
            TokenKind::PlusEq => "'+='",
            TokenKind::MinusEq => "'-='",
            TokenKind::StarEq => "'*='",
            TokenKind::SlashEq => "'/='",
            TokenKind::PercentEq => "'%='",
            TokenKind::AmpEq => "'&='",
            TokenKind::PipeEq => "'|='",
            TokenKind::CaretEq => "'^='",
            TokenKind::LtLtEq => "'<<='",
            TokenKind::GtGtEq => "'>>='",
            TokenKind::PlusPlus => "'++'",
            TokenKind::MinusMinus => "'--'",
            TokenKind::Dot => "'.'",
            TokenKind::Arrow => "'->'",
            TokenKind::Ellipsis => "'...'",
            TokenKind::Question => "'?'",
            TokenKind::Colon => "':'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::Eof => "end of file",
        };
        f.write_str(text)
    }
}

/// Lexer error type
#[derive(Debug, Clone, thiserror::Error)]
#[error("Lexer error at {location}: {message}")]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl LexError {
    fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Lexer for C source code
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    macros: FxHashMap<String, Vec<TokenKind>>,
    expansions: Vec<MacroExpansion>,
}

impl Lexer {
    /// Create a new lexer for the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            macros: FxHashMap::default(),
            expansions: Vec::new(),
        }
    }

    /// Tokenize the entire input, expanding object-like macros
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                let loc = self.current_location();
                tokens.push(Token::new(TokenKind::Eof, loc, loc));
                break;
            }

            if self.peek() == Some('#') {
                self.preprocessor_directive()?;
                continue;
            }

            let token = self.next_token()?;
            self.push_expanded(token, &mut tokens, 0);
        }

        Ok(tokens)
    }

    /// Macro uses seen so far, in source order.
    pub fn macro_expansions(&self) -> &[MacroExpansion] {
        &self.expansions
    }

    pub fn into_macro_expansions(self) -> Vec<MacroExpansion> {
        self.expansions
    }

    fn push_expanded(&mut self, token: Token, out: &mut Vec<Token>, depth: usize) {
        if let TokenKind::Ident(name) = &token.kind {
            if depth < MAX_MACRO_DEPTH {
                if let Some(body) = self.macros.get(name).cloned() {
                    if depth == 0 {
                        self.expansions.push(MacroExpansion {
                            name: name.clone(),
                            location: token.location,
                        });
                    }
                    for kind in body {
                        let expanded = Token::new(kind, token.location, token.end);
                        self.push_expanded(expanded, out, depth + 1);
                    }
                    return;
                }
            }
        }
        out.push(token);
    }

    /// Handle one `#...` line.
    fn preprocessor_directive(&mut self) -> Result<(), LexError> {
        let start = self.current_location();
        self.advance(); // '#'
        self.skip_inline_whitespace();
        let directive = self.read_word();
        if directive != "define" {
            self.skip_rest_of_line();
            return Ok(());
        }

        self.skip_inline_whitespace();
        let name = self.read_word();
        if name.is_empty() {
            return Err(LexError::new("Expected macro name after #define", start));
        }
        if self.peek() == Some('(') {
            // function-like macro
            self.skip_rest_of_line();
            return Ok(());
        }

        let body_text: String = {
            let mut text = String::new();
            while let Some(ch) = self.peek() {
                if ch == '\n' {
                    break;
                }
                text.push(ch);
                self.advance();
            }
            text
        };

        let mut body_lexer = Lexer::new(&body_text);
        let mut body = Vec::new();
        loop {
            body_lexer
                .skip_whitespace_and_comments()
                .map_err(|e| LexError::new(e.message, start))?;
            if body_lexer.is_at_end() {
                break;
            }
            let token = body_lexer
                .next_token()
                .map_err(|e| LexError::new(e.message, start))?;
            body.push(token.kind);
        }
        self.macros.insert(name, body);
        Ok(())
    }

    /// Get next token
    fn next_token(&mut self) -> Result<Token, LexError> {
        let loc = self.current_location();
        let ch = self
            .advance()
            .ok_or_else(|| LexError::new("Unexpected end of file", loc))?;

        let kind = match ch {
            '"' => self.string_literal(loc)?,
            '\'' => self.char_literal(loc)?,
            '0'..='9' => self.number_literal(ch, loc)?,
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),

            '+' => self.one_of(&[('+', TokenKind::PlusPlus), ('=', TokenKind::PlusEq)], TokenKind::Plus),
            '-' => self.one_of(
                &[
                    ('-', TokenKind::MinusMinus),
                    ('=', TokenKind::MinusEq),
                    ('>', TokenKind::Arrow),
                ],
                TokenKind::Minus,
            ),
            '*' => self.one_of(&[('=', TokenKind::StarEq)], TokenKind::Star),
            '/' => self.one_of(&[('=', TokenKind::SlashEq)], TokenKind::Slash),
            '%' => self.one_of(&[('=', TokenKind::PercentEq)], TokenKind::Percent),
            '=' => self.one_of(&[('=', TokenKind::EqEq)], TokenKind::Eq),
            '!' => self.one_of(&[('=', TokenKind::NotEq)], TokenKind::Bang),
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    self.one_of(&[('=', TokenKind::LtLtEq)], TokenKind::LtLt)
                } else {
                    self.one_of(&[('=', TokenKind::Le)], TokenKind::Lt)
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    self.one_of(&[('=', TokenKind::GtGtEq)], TokenKind::GtGt)
                } else {
                    self.one_of(&[('=', TokenKind::Ge)], TokenKind::Gt)
                }
            }
            '&' => self.one_of(&[('&', TokenKind::AndAnd), ('=', TokenKind::AmpEq)], TokenKind::Amp),
            '|' => self.one_of(&[('|', TokenKind::OrOr), ('=', TokenKind::PipeEq)], TokenKind::Pipe),
            '^' => self.one_of(&[('=', TokenKind::CaretEq)], TokenKind::Caret),
            '.' => {
                if self.peek() == Some('.') && self.peek_ahead(1) == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            _ => {
                return Err(LexError::new(
                    format!("Unexpected character: '{}'", ch),
                    loc,
                ))
            }
        };

        let end = SourceLocation::new(self.line, self.column.saturating_sub(1).max(1));
        Ok(Token::new(kind, loc, end))
    }

    /// Consume the first matching follow character, or fall back to `single`.
    fn one_of(&mut self, follows: &[(char, TokenKind)], single: TokenKind) -> TokenKind {
        for (next, kind) in follows {
            if self.peek() == Some(*next) {
                self.advance();
                return kind.clone();
            }
        }
        single
    }

    fn escape(&mut self, loc: SourceLocation) -> Result<char, LexError> {
        let escaped = self
            .advance()
            .ok_or_else(|| LexError::new("Unexpected end of file in escape sequence", loc))?;
        Ok(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '0' => '\0',
            'x' => {
                let mut digits = String::new();
                while let Some(ch) = self.peek() {
                    if ch.is_ascii_hexdigit() && digits.len() < 2 {
                        digits.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
                let value = u8::from_str_radix(&digits, 16).map_err(|_| {
                    LexError::new(format!("Invalid hex escape sequence: \\x{}", digits), loc)
                })?;
                value as char
            }
            other => {
                return Err(LexError::new(
                    format!("Unknown escape sequence: \\{}", other),
                    loc,
                ))
            }
        })
    }

    fn string_literal(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut string = String::new();

        while let Some(ch) = self.peek() {
            match ch {
                '"' => {
                    self.advance();
                    return Ok(TokenKind::StringLiteral(string));
                }
                '\n' => break,
                '\\' => {
                    self.advance();
                    string.push(self.escape(loc)?);
                }
                _ => {
                    string.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError::new("Unterminated string literal", loc))
    }

    fn char_literal(&mut self, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let ch = self
            .advance()
            .ok_or_else(|| LexError::new("Unexpected end of file in character literal", loc))?;

        let value = if ch == '\\' { self.escape(loc)? } else { ch };

        if self.advance() != Some('\'') {
            return Err(LexError::new(
                "Expected closing quote in character literal",
                loc,
            ));
        }

        Ok(TokenKind::CharLiteral(value as u32 as u8 as i8))
    }

    /// Decimal or `0x` hexadecimal integer literal
    fn number_literal(&mut self, first_digit: char, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let hex = first_digit == '0' && matches!(self.peek(), Some('x') | Some('X'));
        if hex {
            self.advance();
        }

        let mut digits = String::new();
        if !hex {
            digits.push(first_digit);
        }
        while let Some(ch) = self.peek() {
            let accepted = if hex {
                ch.is_ascii_hexdigit()
            } else {
                ch.is_ascii_digit()
            };
            if !accepted {
                break;
            }
            digits.push(ch);
            self.advance();
        }

        let radix = if hex { 16 } else { 10 };
        let value = i64::from_str_radix(&digits, radix)
            .map_err(|_| LexError::new(format!("Invalid integer literal: {}", digits), loc))?;

        Ok(TokenKind::IntLiteral(value))
    }

    fn identifier_or_keyword(&mut self, first_char: char) -> TokenKind {
        let mut ident = String::new();
        ident.push(first_char);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "int" => TokenKind::Int,
            "char" => TokenKind::Char,
            "void" => TokenKind::Void,
            "struct" => TokenKind::Struct,
            "const" => TokenKind::Const,
            "static" => TokenKind::Static,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "goto" => TokenKind::Goto,
            "sizeof" => TokenKind::Sizeof,
            "NULL" => TokenKind::Null,
            _ => TokenKind::Ident(ident),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                Some('/') if self.peek_ahead(1) == Some('/') => self.skip_rest_of_line(),
                Some('/') if self.peek_ahead(1) == Some('*') => self.skip_block_comment()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.advance();
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    /// Skip up to and including the next newline
    fn skip_rest_of_line(&mut self) {
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    /// Skip multi-line comment (/* ... */)
    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start_loc = self.current_location();
        self.advance(); // skip '/'
        self.advance(); // skip '*'

        while !self.is_at_end() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(LexError::new("Unterminated block comment", start_loc))
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = *self.input.get(self.position)?;
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = kinds("int main() { return 0; }");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Int,
                TokenKind::Ident("main".to_string()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::IntLiteral(0),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("++ -- += -= == != && || <<= ... ->");
        assert_eq!(
            &tokens[..11],
            &[
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::LtLtEq,
                TokenKind::Ellipsis,
                TokenKind::Arrow,
            ]
        );
    }

    #[test]
    fn test_comments_and_directives_skipped() {
        let tokens = kinds("#include <stdio.h>\nint x; // c\n/* block\n */ int y;");
        assert_eq!(tokens[0], TokenKind::Int);
        assert_eq!(tokens[1], TokenKind::Ident("x".to_string()));
        assert_eq!(tokens[3], TokenKind::Int);
        assert_eq!(tokens[4], TokenKind::Ident("y".to_string()));
    }

    #[test]
    fn test_token_end_location() {
        let mut lexer = Lexer::new("  count = 42;");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!(tokens[0].location, SourceLocation::new(1, 3));
        assert_eq!(tokens[0].end, SourceLocation::new(1, 7));
        assert_eq!(tokens[2].location, SourceLocation::new(1, 11));
        assert_eq!(tokens[2].end, SourceLocation::new(1, 12));
    }

    #[test]
    fn test_object_macro_expansion() {
        let mut lexer = Lexer::new("#define LIMIT (4 + 1)\nint x = LIMIT;");
        let tokens = lexer.tokenize().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            &kinds[3..8],
            &[
                TokenKind::LParen,
                TokenKind::IntLiteral(4),
                TokenKind::Plus,
                TokenKind::IntLiteral(1),
                TokenKind::RParen,
            ]
        );
        // expanded tokens sit at the use site
        assert!(tokens[3..8]
            .iter()
            .all(|t| t.location == SourceLocation::new(2, 9)));
        assert_eq!(
            lexer.macro_expansions(),
            &[MacroExpansion {
                name: "LIMIT".to_string(),
                location: SourceLocation::new(2, 9),
            }]
        );
    }

    #[test]
    fn test_self_referential_macro_terminates() {
        let tokens = kinds("#define LOOP LOOP\nLOOP");
        assert_eq!(tokens[0], TokenKind::Ident("LOOP".to_string()));
    }

    #[test]
    fn test_string_and_char_literals() {
        let tokens = kinds(r#""hello\nworld" '\x41' '\n'"#);
        assert_eq!(tokens[0], TokenKind::StringLiteral("hello\nworld".to_string()));
        assert_eq!(tokens[1], TokenKind::CharLiteral(0x41));
        assert_eq!(tokens[2], TokenKind::CharLiteral(10));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let mut lexer = Lexer::new("\"abc");
        let err = lexer.tokenize().unwrap_err();
        assert_eq!(err.location, SourceLocation::new(1, 1));
    }
}
