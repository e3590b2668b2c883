//! Statement parsing implementation
//!
//! This module handles parsing of all C statement types:
//!
//! - Variable declarations: `int x = 42, *p;`
//! - Control flow: `if`, `while`, `for`, `do-while`, `switch`
//! - Jump statements: `return`, `break`, `continue`, `goto`, labels
//! - Compound statements: `{ ... }`
//! - Expression statements: function calls, assignments
//!
//! # Grammar
//!
//! ```text
//! statement ::= var_decl | if_stmt | while_stmt | for_stmt
//!             | do_while_stmt | switch_stmt | return_stmt
//!             | break_stmt | continue_stmt | goto_stmt | label
//!             | block | expr_stmt | ";"
//! ```

use super::ast::*;
use super::lexer::TokenKind;
use super::parse::{ParseError, Parser};

impl Parser {
    /// Parse block statements (inside braces, excluding the braces themselves)
    pub(crate) fn parse_block_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }

        Ok(statements)
    }

    /// Parse a statement
    pub(crate) fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_location();

        if self.match_token(&TokenKind::Return) {
            let value = if self.check(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect_semicolon("after return")?;
            return Ok(Stmt::new(StmtKind::Return(value), loc));
        }

        if self.match_token(&TokenKind::If) {
            return self.parse_if_statement(loc);
        }

        if self.match_token(&TokenKind::While) {
            self.expect_lparen("after 'while'")?;
            let cond = self.parse_expression()?;
            self.expect_rparen("after while condition")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::new(StmtKind::While { cond, body }, loc));
        }

        if self.match_token(&TokenKind::Do) {
            let body = Box::new(self.parse_statement()?);
            self.expect_token(&TokenKind::While, "Expected 'while' after do body")?;
            self.expect_lparen("after 'while'")?;
            let cond = self.parse_expression()?;
            self.expect_rparen("after do-while condition")?;
            self.expect_semicolon("after do-while")?;
            return Ok(Stmt::new(StmtKind::DoWhile { body, cond }, loc));
        }

        if self.match_token(&TokenKind::For) {
            return self.parse_for_statement(loc);
        }

        if self.match_token(&TokenKind::Switch) {
            return self.parse_switch_statement(loc);
        }

        if self.match_token(&TokenKind::Break) {
            self.expect_semicolon("after 'break'")?;
            return Ok(Stmt::new(StmtKind::Break, loc));
        }

        if self.match_token(&TokenKind::Continue) {
            self.expect_semicolon("after 'continue'")?;
            return Ok(Stmt::new(StmtKind::Continue, loc));
        }

        if self.match_token(&TokenKind::Goto) {
            let label = self.expect_identifier()?;
            self.expect_semicolon("after 'goto'")?;
            return Ok(Stmt::new(StmtKind::Goto(label), loc));
        }

        if self.match_token(&TokenKind::LBrace) {
            let statements = self.parse_block_statements()?;
            self.expect_rbrace("after block")?;
            return Ok(Stmt::new(StmtKind::Block(statements), loc));
        }

        if self.match_token(&TokenKind::Semicolon) {
            return Ok(Stmt::new(StmtKind::Empty, loc));
        }

        // label: identifier followed by colon
        if matches!(self.peek().kind, TokenKind::Ident(_))
            && matches!(self.peek_ahead(1).map(|t| &t.kind), Some(TokenKind::Colon))
        {
            let name = self.expect_identifier()?;
            self.advance(); // ':'
            return Ok(Stmt::new(StmtKind::Label(name), loc));
        }

        if self.is_type_keyword() {
            let decls = self.parse_local_declaration()?;
            self.expect_semicolon("after variable declaration")?;
            return Ok(Stmt::new(StmtKind::Decl(decls), loc));
        }

        let expr = self.parse_expression()?;
        self.expect_semicolon("after expression")?;
        Ok(Stmt::new(StmtKind::Expr(expr), loc))
    }

    /// Parse `type declarator [= init] (, declarator [= init])*` without the `;`
    pub(crate) fn parse_local_declaration(&mut self) -> Result<Vec<VarDecl>, ParseError> {
        let (base, is_static) = self.parse_base_type()?;
        let mut decls = Vec::new();
        loop {
            let (name, ty, location) = self.parse_declarator(base.clone())?;
            let init = if self.match_token(&TokenKind::Eq) {
                Some(self.parse_initializer()?)
            } else {
                None
            };
            decls.push(VarDecl {
                name,
                ty,
                init,
                is_static,
                location,
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_if_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        self.expect_lparen("after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect_rparen("after if condition")?;

        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            loc,
        ))
    }

    fn parse_for_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        self.expect_lparen("after 'for'")?;

        let init = if self.match_token(&TokenKind::Semicolon) {
            None
        } else {
            let init_loc = self.current_location();
            let stmt = if self.is_type_keyword() {
                Stmt::new(StmtKind::Decl(self.parse_local_declaration()?), init_loc)
            } else {
                Stmt::new(StmtKind::Expr(self.parse_expression()?), init_loc)
            };
            self.expect_semicolon("after for initializer")?;
            Some(Box::new(stmt))
        };

        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon("after for condition")?;

        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_rparen("after for clauses")?;

        let body = Box::new(self.parse_statement()?);

        Ok(Stmt::new(
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            loc,
        ))
    }

    /// `switch (e) { case k: ... default: ... }`; statements before the
    /// first label are unreachable and dropped.
    fn parse_switch_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        self.expect_lparen("after 'switch'")?;
        let cond = self.parse_expression()?;
        self.expect_rparen("after switch expression")?;
        self.expect_lbrace("before switch body")?;

        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let case_loc = self.current_location();
            if self.match_token(&TokenKind::Case) {
                let value = self.parse_ternary()?;
                self.expect_token(&TokenKind::Colon, "Expected ':' after case value")?;
                cases.push(SwitchCase {
                    value: Some(value),
                    body: Vec::new(),
                    location: case_loc,
                });
            } else if self.match_token(&TokenKind::Default) {
                self.expect_token(&TokenKind::Colon, "Expected ':' after 'default'")?;
                cases.push(SwitchCase {
                    value: None,
                    body: Vec::new(),
                    location: case_loc,
                });
            } else {
                let stmt = self.parse_statement()?;
                if let Some(current) = cases.last_mut() {
                    current.body.push(stmt);
                }
            }
        }
        self.expect_rbrace("after switch body")?;

        Ok(Stmt::new(StmtKind::Switch { cond, cases }, loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(source: &str) -> Vec<Stmt> {
        let mut parser = Parser::new(source).unwrap();
        let unit = parser.parse_translation_unit().unwrap();
        match unit.items.into_iter().next() {
            Some(Item::Function(f)) => f.body.unwrap(),
            other => panic!("Expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let body = body_of("int f(int c) { if (c) return 1; else if (c > 2) return 2; else return 3; }");
        match &body[0].kind {
            StmtKind::If { else_branch: Some(inner), .. } => {
                assert!(matches!(inner.kind, StmtKind::If { .. }));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_declaration() {
        let body = body_of("void f() { for (int i = 0; i < 4; i++) ; }");
        match &body[0].kind {
            StmtKind::For { init: Some(init), cond: Some(_), step: Some(_), .. } => {
                assert!(matches!(init.kind, StmtKind::Decl(ref d) if d[0].name == "i"));
            }
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_cases_and_fallthrough() {
        let body = body_of("int f(int k) { switch (k) { case 1: k = 2; case 2: break; default: k = 0; } return k; }");
        match &body[0].kind {
            StmtKind::Switch { cases, .. } => {
                assert_eq!(cases.len(), 3);
                assert_eq!(cases[0].body.len(), 1);
                assert!(cases[2].value.is_none());
            }
            other => panic!("Expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_labels_and_goto() {
        let body = body_of("void f() { again: goto again; }");
        assert!(matches!(body[0].kind, StmtKind::Label(ref l) if l == "again"));
        assert!(matches!(body[1].kind, StmtKind::Goto(ref l) if l == "again"));
    }

    #[test]
    fn test_multiple_declarators() {
        let body = body_of("void f() { int a = 1, *p, arr[3] = {1, 2}; }");
        match &body[0].kind {
            StmtKind::Decl(decls) => {
                assert_eq!(decls.len(), 3);
                assert_eq!(decls[1].ty, Type::Int.pointer_to());
                assert!(matches!(decls[2].init, Some(Initializer::List(ref items, _)) if items.len() == 2));
            }
            other => panic!("Expected declaration, got {:?}", other),
        }
    }
}
