//! Declaration parsing implementation
//!
//! This module handles parsing of top-level declarations in C programs:
//!
//! - Struct definitions: `struct Name { ... };`
//! - Global variables: `[static] type declarator [= init], ...;`
//! - Function definitions and prototypes: `type name(params) { ... }` / `;`
//! - Types and declarators: base types, pointers, arrays
//!
//! # Grammar
//!
//! ```text
//! declaration  ::= struct_def | global_decl | function
//! struct_def   ::= "struct" identifier "{" (type declarator ";")* "}" ";"
//! function     ::= type identifier "(" params ")" (block | ";")
//! declarator   ::= "*"* identifier ("[" constant "]")*
//! initializer  ::= assignment_expr | "{" initializer ("," initializer)* ","? "}"
//! ```

use super::ast::*;
use super::lexer::TokenKind;
use super::parse::{ParseError, Parser};

impl Parser {
    /// Parse one top-level declaration; a global declaration with several
    /// declarators yields several items.
    pub(crate) fn parse_top_level_declaration(&mut self) -> Result<Vec<Item>, ParseError> {
        // struct Name { ... };  versus  struct Name f(...) / struct Name g;
        if self.check(&TokenKind::Struct)
            && matches!(self.peek_ahead(1).map(|t| &t.kind), Some(TokenKind::Ident(_)))
            && matches!(self.peek_ahead(2).map(|t| &t.kind), Some(TokenKind::LBrace))
        {
            self.advance(); // 'struct'
            return Ok(vec![Item::Struct(self.parse_struct_definition()?)]);
        }

        let (base, is_static) = self.parse_base_type()?;
        let (name, ty, name_location) = self.parse_declarator(base.clone())?;

        if self.check(&TokenKind::LParen) {
            return Ok(vec![Item::Function(self.parse_function_rest(name, ty, name_location)?)]);
        }

        let mut items = Vec::new();
        let mut current = (name, ty, name_location);
        loop {
            let (name, ty, decl_location) = current;
            let init = if self.match_token(&TokenKind::Eq) {
                Some(self.parse_initializer()?)
            } else {
                None
            };
            items.push(Item::Global(VarDecl {
                name,
                ty,
                init,
                is_static,
                location: decl_location,
            }));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            current = self.parse_declarator(base.clone())?;
        }
        self.expect_semicolon("after global declaration")?;

        Ok(items)
    }

    /// Parse struct definition body; `struct` is already consumed.
    pub(crate) fn parse_struct_definition(&mut self) -> Result<StructDef, ParseError> {
        let location = self.previous_location();
        let name = self.expect_identifier()?;

        self.expect_lbrace("after struct name")?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let (base, _) = self.parse_base_type()?;
            loop {
                let (field_name, ty, field_location) = self.parse_declarator(base.clone())?;
                fields.push(FieldDef {
                    name: field_name,
                    ty,
                    location: field_location,
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect_semicolon("after struct field")?;
        }

        self.expect_rbrace("after struct fields")?;
        self.expect_semicolon("after struct definition")?;

        Ok(StructDef {
            name,
            fields,
            location,
        })
    }

    /// Parse the parameter list and body (or `;`) of a function.
    fn parse_function_rest(
        &mut self,
        name: String,
        return_type: Type,
        location: SourceLocation,
    ) -> Result<FunctionDef, ParseError> {
        self.expect_lparen("after function name")?;
        let (params, variadic) = self.parse_parameter_list()?;
        self.expect_rparen("after parameters")?;

        if self.match_token(&TokenKind::Semicolon) {
            return Ok(FunctionDef {
                name,
                return_type,
                params,
                variadic,
                body: None,
                location,
                end_location: self.previous_location(),
            });
        }

        self.expect_lbrace("before function body")?;
        let body = self.parse_block_statements()?;
        self.expect_rbrace("after function body")?;

        Ok(FunctionDef {
            name,
            return_type,
            params,
            variadic,
            body: Some(body),
            location,
            end_location: self.previous_location(),
        })
    }

    /// Parse parameter list: `(void)`, `()`, or `type [name], ... [, ...]`
    pub(crate) fn parse_parameter_list(&mut self) -> Result<(Vec<Param>, bool), ParseError> {
        let mut params = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok((params, false));
        }

        // (void) means no parameters in C
        if self.check(&TokenKind::Void)
            && matches!(self.peek_ahead(1).map(|t| &t.kind), Some(TokenKind::RParen))
        {
            self.advance();
            return Ok((params, false));
        }

        loop {
            if self.match_token(&TokenKind::Ellipsis) {
                return Ok((params, true));
            }

            let location = self.current_location();
            let (base, _) = self.parse_base_type()?;
            let mut ty = base;
            while self.match_token(&TokenKind::Star) {
                ty = ty.pointer_to();
            }
            let name = match &self.peek().kind {
                TokenKind::Ident(name) => {
                    let name = name.clone();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            ty = self.parse_array_suffix(ty)?;

            params.push(Param {
                name,
                // array parameters are pointers
                ty: ty.decayed(),
                location,
            });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok((params, false))
    }

    /// Parse `[static] [const] base_type`; returns the type and the
    /// storage-class flag.
    pub(crate) fn parse_base_type(&mut self) -> Result<(Type, bool), ParseError> {
        let mut is_static = false;
        loop {
            if self.match_token(&TokenKind::Static) {
                is_static = true;
            } else if !self.match_token(&TokenKind::Const) {
                break;
            }
        }

        let base = if self.match_token(&TokenKind::Int) {
            Type::Int
        } else if self.match_token(&TokenKind::Char) {
            Type::Char
        } else if self.match_token(&TokenKind::Void) {
            Type::Void
        } else if self.match_token(&TokenKind::Struct) {
            Type::Struct(self.expect_identifier()?)
        } else {
            return Err(self.error_here("Expected type"));
        };

        // trailing qualifier: `int const x`
        while self.match_token(&TokenKind::Const) {}

        Ok((base, is_static))
    }

    /// Parse a type name for casts and `sizeof`: base type and pointer stars.
    pub(crate) fn parse_type(&mut self) -> Result<Type, ParseError> {
        let (mut ty, _) = self.parse_base_type()?;
        while self.match_token(&TokenKind::Star) {
            while self.match_token(&TokenKind::Const) {}
            ty = ty.pointer_to();
        }
        self.parse_array_suffix(ty)
    }

    /// Parse `*`* identifier `[N]`* on top of `base`.
    pub(crate) fn parse_declarator(&mut self, base: Type) -> Result<(String, Type, SourceLocation), ParseError> {
        let mut ty = base;
        while self.match_token(&TokenKind::Star) {
            while self.match_token(&TokenKind::Const) {}
            ty = ty.pointer_to();
        }
        let location = self.current_location();
        let name = self.expect_identifier()?;
        let ty = self.parse_array_suffix(ty)?;
        Ok((name, ty, location))
    }

    /// `int a[2][3]` is an array of two arrays of three ints.
    fn parse_array_suffix(&mut self, element: Type) -> Result<Type, ParseError> {
        let mut dims = Vec::new();
        while self.match_token(&TokenKind::LBracket) {
            if self.match_token(&TokenKind::RBracket) {
                dims.push(None);
                continue;
            }
            let size_expr = self.parse_expression()?;
            let size = constant_value(&size_expr)
                .filter(|n| *n >= 0)
                .ok_or_else(|| ParseError::new("Array size must be a constant integer", size_expr.location()))?;
            dims.push(Some(size as u64));
            self.expect_token(&TokenKind::RBracket, "Expected ']' after array size")?;
        }

        Ok(dims
            .into_iter()
            .rev()
            .fold(element, |inner, size| inner.array_of(size)))
    }

    /// Parse a variable initializer, including nested brace lists.
    pub(crate) fn parse_initializer(&mut self) -> Result<Initializer, ParseError> {
        if self.match_token(&TokenKind::LBrace) {
            let location = self.previous_location();
            let mut elements = Vec::new();
            while !self.check(&TokenKind::RBrace) {
                elements.push(self.parse_initializer()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect_rbrace("after initializer list")?;
            return Ok(Initializer::List(elements, location));
        }
        Ok(Initializer::Expr(self.parse_assignment()?))
    }
}

/// Fold an integer constant expression (literals, `sizeof`-free arithmetic).
pub(crate) fn constant_value(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::IntLiteral(n) => Some(*n),
        ExprKind::CharLiteral(c) => Some(*c as i64),
        ExprKind::Unary { op: UnOp::Neg, operand } => constant_value(operand)?.checked_neg(),
        ExprKind::Unary { op: UnOp::BitNot, operand } => Some(!constant_value(operand)?),
        ExprKind::Binary { op, lhs, rhs } => {
            let (l, r) = (constant_value(lhs)?, constant_value(rhs)?);
            match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Div => l.checked_div(r),
                BinOp::Rem => l.checked_rem(r),
                BinOp::Shl => l.checked_shl(u32::try_from(r).ok()?),
                BinOp::Shr => l.checked_shr(u32::try_from(r).ok()?),
                BinOp::BitAnd => Some(l & r),
                BinOp::BitOr => Some(l | r),
                BinOp::BitXor => Some(l ^ r),
                BinOp::Eq => Some((l == r) as i64),
                BinOp::Ne => Some((l != r) as i64),
                BinOp::Lt => Some((l < r) as i64),
                BinOp::Le => Some((l <= r) as i64),
                BinOp::Gt => Some((l > r) as i64),
                BinOp::Ge => Some((l >= r) as i64),
            }
        }
        _ => None,
    }
}
