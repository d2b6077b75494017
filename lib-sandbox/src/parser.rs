//! Recursive-descent parser for the contract language subset.
//!
//! Grammar (informal):
//!
//! ```text
//! program   := (class_decl | stmt)*
//! class_decl:= 'class' IDENT ('extends' IDENT)? '{' method* '}'
//! method    := IDENT '(' params? ')' '{' stmt* '}'
//! stmt      := 'let' IDENT ('=' expr)? ';'
//!            | 'return' expr? ';'
//!            | 'if' '(' expr ')' body ('else' body)?
//!            | 'while' '(' expr ')' body
//!            | 'break' ';' | 'continue' ';'
//!            | '{' stmt* '}'
//!            | expr ';'
//! ```
//!
//! Class declarations are only permitted at the top level. Method source
//! spans are captured verbatim for contract-code persistence.

use crate::ast::*;
use crate::error::{SandboxError, SandboxResult};
use crate::token::{tokenize, Token, TokenKind};

pub(crate) fn parse(source: &str) -> SandboxResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    parser.program()
}

/// Parse a single expression (used for invocation strings)
pub(crate) fn parse_expression(source: &str) -> SandboxResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if !parser.at_end() {
        return Err(SandboxError::Parse(
            "trailing input after expression".to_string(),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> SandboxResult<&Token> {
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| SandboxError::Parse("unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> SandboxResult<()> {
        let found = self.peek().cloned();
        if found.as_ref() == Some(&kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(SandboxError::Parse(format!(
                "expected {what}, found {:?}",
                found
            )))
        }
    }

    fn expect_ident(&mut self, what: &str) -> SandboxResult<String> {
        match self.peek().cloned() {
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            found => Err(SandboxError::Parse(format!(
                "expected {what}, found {:?}",
                found
            ))),
        }
    }

    /// Statement terminator: a semicolon, or implicitly a closing brace / EOF
    fn expect_semi(&mut self) -> SandboxResult<()> {
        if self.check(&TokenKind::Semi) {
            return Ok(());
        }
        match self.peek() {
            None | Some(TokenKind::RBrace) => Ok(()),
            found => Err(SandboxError::Parse(format!(
                "expected ';', found {:?}",
                found
            ))),
        }
    }

    // =========================================================================
    // Declarations and statements
    // =========================================================================

    fn program(&mut self) -> SandboxResult<Program> {
        let mut stmts = Vec::new();
        while !self.at_end() {
            if self.peek() == Some(&TokenKind::Class) {
                stmts.push(Stmt::Class(self.class_decl()?));
            } else {
                stmts.push(self.statement()?);
            }
        }
        Ok(Program { stmts })
    }

    fn class_decl(&mut self) -> SandboxResult<ClassDecl> {
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect_ident("class name")?;
        let parent = if self.check(&TokenKind::Extends) {
            Some(self.expect_ident("parent class name")?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            // Tolerate stray semicolons between methods
            if self.check(&TokenKind::Semi) {
                continue;
            }
            methods.push(self.method()?);
        }

        Ok(ClassDecl {
            name,
            parent,
            methods,
        })
    }

    fn method(&mut self) -> SandboxResult<MethodDecl> {
        let start = self
            .tokens
            .get(self.pos)
            .map(|t| t.start)
            .ok_or_else(|| SandboxError::Parse("unexpected end of class body".to_string()))?;
        let name = self.expect_ident("method name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if self.peek() != Some(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.block_body()?;
        let end = self.tokens[self.pos - 1].end;

        Ok(MethodDecl {
            name,
            params,
            body,
            source: self.source[start..end].to_string(),
        })
    }

    /// Statements up to and including the closing brace
    fn block_body(&mut self) -> SandboxResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_end() {
                return Err(SandboxError::Parse("unterminated block".to_string()));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    /// A braced block, or a single statement wrapped as one
    fn body(&mut self) -> SandboxResult<Vec<Stmt>> {
        if self.check(&TokenKind::LBrace) {
            self.block_body()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn statement(&mut self) -> SandboxResult<Stmt> {
        match self.peek() {
            Some(TokenKind::Class) => Err(SandboxError::Parse(
                "class declarations are only permitted at the top level".to_string(),
            )),
            Some(TokenKind::Let) => {
                self.pos += 1;
                let name = self.expect_ident("binding name")?;
                let init = if self.check(&TokenKind::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect_semi()?;
                Ok(Stmt::Let { name, init })
            }
            Some(TokenKind::Return) => {
                self.pos += 1;
                let value = if self.peek() == Some(&TokenKind::Semi)
                    || self.peek() == Some(&TokenKind::RBrace)
                    || self.at_end()
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_semi()?;
                Ok(Stmt::Return(value))
            }
            Some(TokenKind::If) => {
                self.pos += 1;
                self.expect(TokenKind::LParen, "'('")?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                let then_branch = self.body()?;
                let else_branch = if self.check(&TokenKind::Else) {
                    Some(self.body()?)
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Some(TokenKind::While) => {
                self.pos += 1;
                self.expect(TokenKind::LParen, "'('")?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                let body = self.body()?;
                Ok(Stmt::While { cond, body })
            }
            Some(TokenKind::Break) => {
                self.pos += 1;
                self.expect_semi()?;
                Ok(Stmt::Break)
            }
            Some(TokenKind::Continue) => {
                self.pos += 1;
                self.expect_semi()?;
                Ok(Stmt::Continue)
            }
            Some(TokenKind::LBrace) => {
                self.pos += 1;
                Ok(Stmt::Block(self.block_body()?))
            }
            _ => {
                let expr = self.expression()?;
                self.expect_semi()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    // =========================================================================
    // Expressions, by precedence
    // =========================================================================

    fn expression(&mut self) -> SandboxResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> SandboxResult<Expr> {
        let expr = self.or_expr()?;

        let op = match self.peek() {
            Some(TokenKind::Assign) => AssignOp::Set,
            Some(TokenKind::PlusAssign) => AssignOp::Add,
            Some(TokenKind::MinusAssign) => AssignOp::Sub,
            _ => return Ok(expr),
        };
        self.pos += 1;

        match expr {
            Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. } => {}
            _ => {
                return Err(SandboxError::Parse(
                    "invalid assignment target".to_string(),
                ))
            }
        }

        let value = self.assignment()?;
        Ok(Expr::Assign {
            target: Box::new(expr),
            op,
            value: Box::new(value),
        })
    }

    fn or_expr(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.check(&TokenKind::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.equality()?;
        while self.check(&TokenKind::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::NotEq) => BinOp::NotEq,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::Le) => BinOp::Le,
                Some(TokenKind::Ge) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> SandboxResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> SandboxResult<Expr> {
        let op = match self.peek() {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Not) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> SandboxResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let field = self.expect_ident("member name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        field,
                    };
                }
                Some(TokenKind::LParen) => {
                    self.pos += 1;
                    let args = self.call_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Arguments after an already-consumed '('
    fn call_args(&mut self) -> SandboxResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.check(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen, "')'")?;
            break;
        }
        Ok(args)
    }

    fn primary(&mut self) -> SandboxResult<Expr> {
        let tok = self.advance()?.kind.clone();
        match tok {
            TokenKind::Int(n) => Ok(Expr::Int(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::This => Ok(Expr::This),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::New => {
                let class = self.expect_ident("class name")?;
                self.expect(TokenKind::LParen, "'('")?;
                let args = self.call_args()?;
                Ok(Expr::New { class, args })
            }
            TokenKind::Super => {
                self.expect(TokenKind::LParen, "'(' after 'super'")?;
                let args = self.call_args()?;
                Ok(Expr::SuperCall(args))
            }
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let mut elems = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        elems.push(self.expression()?);
                        if self.check(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Expr::Array(elems))
            }
            TokenKind::LBrace => {
                let mut pairs = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key = match self.advance()?.kind.clone() {
                            TokenKind::Ident(name) => name,
                            TokenKind::Str(s) => s,
                            found => {
                                return Err(SandboxError::Parse(format!(
                                    "expected record key, found {:?}",
                                    found
                                )))
                            }
                        };
                        self.expect(TokenKind::Colon, "':'")?;
                        pairs.push((key, self.expression()?));
                        if self.check(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RBrace, "'}'")?;
                        break;
                    }
                }
                Ok(Expr::Object(pairs))
            }
            found => Err(SandboxError::Parse(format!(
                "unexpected token {:?}",
                found
            ))),
        }
    }
}
