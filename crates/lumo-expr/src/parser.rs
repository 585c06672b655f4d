//! Recursive-descent parser with precedence climbing.

use crate::ast::{BinOp, Expr, Stmt, UnOp};
use crate::error::{ExprError, ExprResult};
use crate::token::{tokenize, Token, TokenKind};

/// Maximum expression/statement nesting depth accepted at parse time.
pub const MAX_DEPTH: usize = 64;

/// Parse a statement list (a render-function or action body).
pub fn parse_program(source: &str) -> ExprResult<Vec<Stmt>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let stmts = parser.stmt_list(&[TokenKind::Eof])?;
    parser.expect(TokenKind::Eof)?;
    Ok(stmts)
}

/// Parse a single expression (a guard condition or channel expression).
pub fn parse_expr(source: &str) -> ExprResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expr()?;
    parser.expect(TokenKind::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_ahead(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ExprResult<()> {
        if self.peek() == &kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", kind.describe())))
        }
    }

    fn unexpected(&self, context: &str) -> ExprError {
        ExprError::Parse {
            line: self.line(),
            message: format!("{context}, found {}", self.peek().describe()),
        }
    }

    fn enter(&mut self) -> ExprResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn stmt_list(&mut self, terminators: &[TokenKind]) -> ExprResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !terminators.contains(self.peek()) {
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> ExprResult<Stmt> {
        self.enter()?;
        let stmt = match self.peek().clone() {
            TokenKind::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(TokenKind::Assign)?;
                let value = self.expr()?;
                self.eat(&TokenKind::Semicolon);
                Stmt::Let(name, value)
            }
            TokenKind::Return => {
                self.advance();
                let value = self.expr()?;
                let next = if self.eat(&TokenKind::Comma) {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.eat(&TokenKind::Semicolon);
                Stmt::Return(value, next)
            }
            TokenKind::If => self.if_stmt()?,
            TokenKind::Ident(name) if self.peek_ahead(1) == &TokenKind::Assign => {
                self.advance();
                self.advance();
                let value = self.expr()?;
                self.eat(&TokenKind::Semicolon);
                Stmt::Assign(name, value)
            }
            _ => {
                let expr = self.expr()?;
                self.eat(&TokenKind::Semicolon);
                Stmt::Expr(expr)
            }
        };
        self.leave();
        Ok(stmt)
    }

    fn if_stmt(&mut self) -> ExprResult<Stmt> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.block()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.peek() == &TokenKind::If {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If(cond, then_branch, else_branch))
    }

    fn block(&mut self) -> ExprResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let stmts = self.stmt_list(&[TokenKind::RBrace, TokenKind::Eof])?;
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    // =========================================================================
    // Expressions (precedence climbing)
    // =========================================================================

    fn expr(&mut self) -> ExprResult<Expr> {
        self.enter()?;
        let expr = self.ternary()?;
        self.leave();
        Ok(expr)
    }

    fn ternary(&mut self) -> ExprResult<Expr> {
        let cond = self.or()?;
        if self.eat(&TokenKind::Question) {
            let then = self.expr()?;
            self.expect(TokenKind::Colon)?;
            let other = self.expr()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(other)))
        } else {
            Ok(cond)
        }
    }

    fn or(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        self.enter()?;
        let expr = match self.peek() {
            TokenKind::Minus => {
                self.advance();
                Expr::Unary(UnOp::Neg, Box::new(self.unary()?))
            }
            TokenKind::Bang => {
                self.advance();
                Expr::Unary(UnOp::Not, Box::new(self.unary()?))
            }
            _ => self.postfix()?,
        };
        self.leave();
        Ok(expr)
    }

    fn postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    // Calls only target bare identifiers; functions are not values.
                    let name = match expr {
                        Expr::Ident(name) => name,
                        _ => return Err(self.unexpected("only named functions can be called")),
                    };
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != &TokenKind::RParen {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    expr = Expr::Call(name, args);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        match self.advance() {
            TokenKind::Num(n) => Ok(Expr::Num(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::LParen => {
                let expr = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if self.peek() != &TokenKind::RBracket {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                if self.peek() != &TokenKind::RBrace {
                    loop {
                        let key = match self.advance() {
                            TokenKind::Ident(name) => name,
                            TokenKind::Str(s) => s,
                            _ => return Err(self.unexpected("expected map key")),
                        };
                        self.expect(TokenKind::Colon)?;
                        entries.push((key, self.expr()?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::Map(entries))
            }
            other => Err(ExprError::Parse {
                line: self.line(),
                message: format!("expected expression, found {}", other.describe()),
            }),
        }
    }

    fn ident(&mut self) -> ExprResult<String> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(ExprError::Parse {
                line: self.line(),
                message: format!("expected identifier, found {}", other.describe()),
            }),
        }
    }
}
