//! C source front-end
//!
//! This module transforms C source text into a [`TranslationUnit`]:
//! - [`lexer`]: Tokenization (source text → tokens), object-like macros
//! - [`parse`]: Parser struct and helpers; `declarations`, `statements` and
//!   `expressions` extend it with the grammar
//! - [`ast`]: syntax tree definitions
//!
//! # Supported C Subset
//!
//! - Types: `int`, `char`, `void`, structs, pointers, arrays
//! - Globals (optionally `static`), prototypes, variadic prototypes
//! - Statements: declarations, control flow (`if`, `while`, `do`, `for`,
//!   `switch`), `goto` and labels
//! - Expressions: arithmetic, logical, bitwise, ternary, calls, casts, `sizeof`
//! - No typedefs, unions, enums, floating point or function pointers
//!
//! # Parser Implementation
//!
//! Hand-written recursive descent parser with precedence climbing for binary
//! operators. No external parser generator dependencies.

pub mod ast;
mod declarations;
mod expressions;
pub mod lexer;
pub mod parse;
mod statements;

pub(crate) use declarations::constant_value;
pub use ast::{SourceLocation, SourceRange, TranslationUnit, Type};
pub use lexer::LexError;
pub use parse::{ParseError, Parser};

/// Lex and parse `source` into a translation unit.
pub fn parse_source(source: &str) -> Result<TranslationUnit, ParseError> {
    Parser::new(source)?.parse_translation_unit()
}
