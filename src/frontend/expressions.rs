//! Expression parsing implementation
//!
//! This module handles parsing of C expressions using precedence climbing
//! for binary operators and recursive descent for other expression forms.
//!
//! # Supported Expressions
//!
//! - Literals: integers, characters, strings, `NULL`
//! - Binary operators: arithmetic, comparison, logical, bitwise
//! - Unary operators: `-`, `!`, `~`, `&`, `*`, `++`, `--`
//! - Postfix: `[]`, `.`, `->`, `()`, `++`, `--`
//! - Assignment and compound assignment, ternary `? :`
//! - Type casts `(type)expr` and `sizeof`
//!
//! Every node records the source range from its first to its last token.

use super::ast::*;
use super::lexer::TokenKind;
use super::parse::{ParseError, Parser};

/// Binary operator classes recognized by the precedence climber
enum BinaryToken {
    Arith(BinOp),
    Logical(LogicalOp),
}

/// Precedence (higher binds tighter) and operator for a token.
fn binary_operator(kind: &TokenKind) -> Option<(u8, BinaryToken)> {
    use BinaryToken::*;
    Some(match kind {
        TokenKind::OrOr => (1, Logical(LogicalOp::Or)),
        TokenKind::AndAnd => (2, Logical(LogicalOp::And)),
        TokenKind::Pipe => (3, Arith(BinOp::BitOr)),
        TokenKind::Caret => (4, Arith(BinOp::BitXor)),
        TokenKind::Amp => (5, Arith(BinOp::BitAnd)),
        TokenKind::EqEq => (6, Arith(BinOp::Eq)),
        TokenKind::NotEq => (6, Arith(BinOp::Ne)),
        TokenKind::Lt => (7, Arith(BinOp::Lt)),
        TokenKind::Le => (7, Arith(BinOp::Le)),
        TokenKind::Gt => (7, Arith(BinOp::Gt)),
        TokenKind::Ge => (7, Arith(BinOp::Ge)),
        TokenKind::LtLt => (8, Arith(BinOp::Shl)),
        TokenKind::GtGt => (8, Arith(BinOp::Shr)),
        TokenKind::Plus => (9, Arith(BinOp::Add)),
        TokenKind::Minus => (9, Arith(BinOp::Sub)),
        TokenKind::Star => (10, Arith(BinOp::Mul)),
        TokenKind::Slash => (10, Arith(BinOp::Div)),
        TokenKind::Percent => (10, Arith(BinOp::Rem)),
        _ => return None,
    })
}

fn compound_assign_operator(kind: &TokenKind) -> Option<Option<BinOp>> {
    Some(match kind {
        TokenKind::Eq => None,
        TokenKind::PlusEq => Some(BinOp::Add),
        TokenKind::MinusEq => Some(BinOp::Sub),
        TokenKind::StarEq => Some(BinOp::Mul),
        TokenKind::SlashEq => Some(BinOp::Div),
        TokenKind::PercentEq => Some(BinOp::Rem),
        TokenKind::AmpEq => Some(BinOp::BitAnd),
        TokenKind::PipeEq => Some(BinOp::BitOr),
        TokenKind::CaretEq => Some(BinOp::BitXor),
        TokenKind::LtLtEq => Some(BinOp::Shl),
        TokenKind::GtGtEq => Some(BinOp::Shr),
        _ => return None,
    })
}

impl Parser {
    /// Parse expression (top-level entry point)
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    /// Parse assignment or ternary (right-associative)
    pub(crate) fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_ternary()?;

        if let Some(op) = compound_assign_operator(&self.peek().kind) {
            self.advance();
            let value = self.parse_assignment()?;
            let range = SourceRange::new(target.range.begin, value.range.end);
            return Ok(Expr::new(
                ExprKind::Assign {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                },
                range,
            ));
        }

        Ok(target)
    }

    /// Parse ternary conditional: cond ? then : else
    pub(crate) fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(1)?;

        if !self.match_token(&TokenKind::Question) {
            return Ok(cond);
        }

        let then_expr = self.parse_expression()?;
        self.expect_token(&TokenKind::Colon, "Expected ':' in ternary expression")?;
        let else_expr = self.parse_ternary()?;
        let range = SourceRange::new(cond.range.begin, else_expr.range.end);

        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            range,
        ))
    }

    /// Precedence climbing over all left-associative binary operators.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_cast()?;

        while let Some((prec, op)) = binary_operator(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let range = SourceRange::new(lhs.range.begin, rhs.range.end);
            let (lhs_box, rhs_box) = (Box::new(lhs), Box::new(rhs));
            let kind = match op {
                BinaryToken::Arith(op) => ExprKind::Binary {
                    op,
                    lhs: lhs_box,
                    rhs: rhs_box,
                },
                BinaryToken::Logical(op) => ExprKind::Logical {
                    op,
                    lhs: lhs_box,
                    rhs: rhs_box,
                },
            };
            lhs = Expr::new(kind, range);
        }

        Ok(lhs)
    }

    /// `(type) expr`, detected by a type keyword right after `(`
    fn parse_cast(&mut self) -> Result<Expr, ParseError> {
        let starts_cast = self.check(&TokenKind::LParen)
            && self
                .peek_ahead(1)
                .is_some_and(|t| Parser::starts_type(&t.kind));
        if !starts_cast {
            return self.parse_unary();
        }

        let begin = self.current_location();
        self.advance(); // '('
        let ty = self.parse_type()?;
        self.expect_rparen("after cast type")?;
        let operand = self.parse_cast()?;
        let range = SourceRange::new(begin, operand.range.end);

        Ok(Expr::new(
            ExprKind::Cast {
                ty,
                operand: Box::new(operand),
            },
            range,
        ))
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let begin = self.current_location();

        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::PlusPlus => Some(UnOp::PreInc),
            TokenKind::MinusMinus => Some(UnOp::PreDec),
            TokenKind::Star => Some(UnOp::Deref),
            TokenKind::Amp => Some(UnOp::AddrOf),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_cast()?;
            let range = SourceRange::new(begin, operand.range.end);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                range,
            ));
        }

        if self.match_token(&TokenKind::Plus) {
            // unary plus is the identity
            return self.parse_cast();
        }

        if self.match_token(&TokenKind::Sizeof) {
            let type_operand = self.check(&TokenKind::LParen)
                && self
                    .peek_ahead(1)
                    .is_some_and(|t| Parser::starts_type(&t.kind));
            if type_operand {
                self.advance();
                let ty = self.parse_type()?;
                self.expect_rparen("after sizeof type")?;
                let range = SourceRange::new(begin, self.previous_end());
                return Ok(Expr::new(ExprKind::SizeofType(ty), range));
            }
            let operand = self.parse_unary()?;
            let range = SourceRange::new(begin, operand.range.end);
            return Ok(Expr::new(ExprKind::SizeofExpr(Box::new(operand)), range));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            let begin = expr.range.begin;
            if self.match_token(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect_token(&TokenKind::RBracket, "Expected ']' after index")?;
                expr = Expr::new(
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    SourceRange::new(begin, self.previous_end()),
                );
            } else if self.check(&TokenKind::Dot) || self.check(&TokenKind::Arrow) {
                let arrow = self.check(&TokenKind::Arrow);
                self.advance();
                let field = self.expect_identifier()?;
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        field,
                        arrow,
                    },
                    SourceRange::new(begin, self.previous_end()),
                );
            } else if self.check(&TokenKind::LParen) {
                let callee = match &expr.kind {
                    ExprKind::Ident(name) => name.clone(),
                    _ => return Err(self.error_here("Only named functions can be called")),
                };
                self.advance();
                let args = self.parse_argument_list()?;
                self.expect_rparen("after arguments")?;
                expr = Expr::new(
                    ExprKind::Call { callee, args },
                    SourceRange::new(begin, self.previous_end()),
                );
            } else if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
                let op = if self.check(&TokenKind::PlusPlus) {
                    UnOp::PostInc
                } else {
                    UnOp::PostDec
                };
                self.advance();
                expr = Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(expr),
                    },
                    SourceRange::new(begin, self.previous_end()),
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let range = SourceRange::new(token.location, token.end);

        let kind = match token.kind {
            TokenKind::IntLiteral(n) => ExprKind::IntLiteral(n),
            TokenKind::CharLiteral(c) => ExprKind::CharLiteral(c),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::StringLiteral(mut s) => {
                self.advance();
                // adjacent literals concatenate
                while let TokenKind::StringLiteral(next) = &self.peek().kind {
                    s.push_str(next);
                    self.advance();
                }
                return Ok(Expr::new(
                    ExprKind::StringLiteral(s),
                    SourceRange::new(token.location, self.previous_end()),
                ));
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_rparen("after parenthesized expression")?;
                return Ok(Expr::new(
                    inner.kind,
                    SourceRange::new(token.location, self.previous_end()),
                ));
            }
            _ => return Err(self.error_here("Expected expression")),
        };

        self.advance();
        Ok(Expr::new(kind, range))
    }
}
