//! Predicate Language Parser
//!
//! Recursive descent over the token stream. Precedence, loosest first:
//! `or` < `and` < `not` < comparison < `+ -` < `* // %` < unary < postfix.
//!
//! Chained comparisons (`a < b < c`) are rejected; code fragments reject
//! control-flow keywords with `Unsupported` so the loader can abort.

use crate::features::expr::domain::{
    ArithOp, AssignTarget, BoolOp, CmpOp, Expr, Span, Spanned, Stmt, UnaryOp,
};

use super::lexer::{tokenize, Tok, Token};
use super::CompileIssue;

/// Parse a single predicate expression.
pub fn parse_predicate(src: &str) -> Result<Spanned<Expr>, CompileIssue> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(&tokens, src.len());
    let expr = parser.or_expr()?;
    parser.eat(&Tok::Newline);
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a code fragment: a sequence of statements separated by newlines
/// or `;`.
pub fn parse_fragment(src: &str) -> Result<Vec<Stmt>, CompileIssue> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(&tokens, src.len());
    let mut stmts = Vec::new();

    loop {
        while parser.eat(&Tok::Newline) {}
        if parser.peek().is_none() {
            break;
        }
        stmts.push(parser.statement()?);
    }

    Ok(stmts)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    src_len: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], src_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            src_len,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek().map(|t| &t.tok) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn here(&self) -> usize {
        self.peek().map(|t| t.span.start).unwrap_or(self.src_len)
    }

    fn parse_error(&self, message: impl Into<String>) -> CompileIssue {
        CompileIssue::Parse {
            message: message.into(),
            offset: self.here(),
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<Span, CompileIssue> {
        match self.peek() {
            Some(token) if token.tok == tok => {
                let span = token.span;
                self.pos += 1;
                Ok(span)
            }
            _ => Err(self.parse_error(format!("expected {}", what))),
        }
    }

    fn expect_end(&self) -> Result<(), CompileIssue> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.parse_error("unexpected trailing input")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, CompileIssue> {
        if let Some(token) = self.peek() {
            if let Tok::Reserved(kw) = token.tok {
                return Err(CompileIssue::Unsupported {
                    message: format!(
                        "`{}` is not allowed in analyzed code fragments",
                        kw
                    ),
                    offset: token.span.start,
                });
            }
        }

        let expr = self.or_expr()?;

        let aug = match self.peek().map(|t| &t.tok) {
            Some(Tok::Assign) => Some(None),
            Some(Tok::PlusAssign) => Some(Some(ArithOp::Add)),
            Some(Tok::MinusAssign) => Some(Some(ArithOp::Sub)),
            Some(Tok::StarAssign) => Some(Some(ArithOp::Mul)),
            Some(Tok::SlashSlashAssign) => Some(Some(ArithOp::FloorDiv)),
            Some(Tok::PercentAssign) => Some(Some(ArithOp::Mod)),
            _ => None,
        };

        let stmt = match aug {
            Some(op) => {
                self.advance();
                let target = match expr.node {
                    Expr::Local(name) => Spanned::new(AssignTarget::Local(name), expr.span),
                    Expr::Outcome(id) => Spanned::new(AssignTarget::Outcome(id), expr.span),
                    _ => {
                        return Err(CompileIssue::Parse {
                            message: "assignment target must be a name or `qid.outcome`"
                                .to_string(),
                            offset: expr.span.start,
                        })
                    }
                };
                let value = self.or_expr()?;
                Stmt::Assign { target, op, value }
            }
            None => Stmt::Expr(expr),
        };

        match self.peek().map(|t| &t.tok) {
            None | Some(Tok::Newline) => {
                self.eat(&Tok::Newline);
                Ok(stmt)
            }
            Some(_) => Err(self.parse_error("expected end of statement")),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn or_expr(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let first = self.and_expr()?;
        if self.peek().map(|t| &t.tok) != Some(&Tok::Or) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Tok::Or) {
            operands.push(self.and_expr()?);
        }
        let span = operands
            .first()
            .unwrap()
            .span
            .merge(operands.last().unwrap().span);
        Ok(Spanned::new(
            Expr::BoolChain {
                op: BoolOp::Or,
                operands,
            },
            span,
        ))
    }

    fn and_expr(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let first = self.not_expr()?;
        if self.peek().map(|t| &t.tok) != Some(&Tok::And) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&Tok::And) {
            operands.push(self.not_expr()?);
        }
        let span = operands
            .first()
            .unwrap()
            .span
            .merge(operands.last().unwrap().span);
        Ok(Spanned::new(
            Expr::BoolChain {
                op: BoolOp::And,
                operands,
            },
            span,
        ))
    }

    fn not_expr(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        if let Some(token) = self.peek() {
            if token.tok == Tok::Not {
                let start = token.span;
                self.advance();
                let operand = self.not_expr()?;
                let span = start.merge(operand.span);
                return Ok(Spanned::new(
                    Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ));
            }
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let lhs = self.arith()?;

        // `is [not] None`
        if self.eat(&Tok::Is) {
            let negated = self.eat(&Tok::Not);
            let none_span = self.expect(Tok::NoneKw, "`None` after `is`")?;
            let span = lhs.span.merge(none_span);
            return Ok(Spanned::new(
                Expr::IsNone {
                    operand: Box::new(lhs),
                    negated,
                },
                span,
            ));
        }

        let op = match self.peek().map(|t| &t.tok) {
            Some(Tok::EqEq) => Some(CmpOp::Eq),
            Some(Tok::NotEq) => Some(CmpOp::Ne),
            Some(Tok::Lt) => Some(CmpOp::Lt),
            Some(Tok::Le) => Some(CmpOp::Le),
            Some(Tok::Gt) => Some(CmpOp::Gt),
            Some(Tok::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        let op = match op {
            Some(op) => {
                self.advance();
                op
            }
            None => return Ok(lhs),
        };

        let rhs = self.arith()?;

        // Chained comparisons are not part of the sublanguage
        if matches!(
            self.peek().map(|t| &t.tok),
            Some(Tok::EqEq | Tok::NotEq | Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge | Tok::Is)
        ) {
            return Err(self.parse_error("chained comparisons are not supported"));
        }

        let span = lhs.span.merge(rhs.span);
        Ok(Spanned::new(
            Expr::Cmp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn arith(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Plus) => ArithOp::Add,
                Some(Tok::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            let span = lhs.span.merge(rhs.span);
            lhs = Spanned::new(
                Expr::Arith {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Star) => ArithOp::Mul,
                Some(Tok::SlashSlash) => ArithOp::FloorDiv,
                Some(Tok::Percent) => ArithOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            let span = lhs.span.merge(rhs.span);
            lhs = Spanned::new(
                Expr::Arith {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        match self.peek().map(|t| (t.tok.clone(), t.span)) {
            Some((Tok::Minus, span)) => {
                self.advance();
                let operand = self.unary()?;
                let merged = span.merge(operand.span);
                Ok(Spanned::new(
                    Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    merged,
                ))
            }
            Some((Tok::Plus, _)) => {
                self.advance();
                self.unary()
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                let (attr, attr_span) = match self.advance() {
                    Some(Token {
                        tok: Tok::Ident(name),
                        span,
                    }) => (name.clone(), *span),
                    _ => return Err(self.parse_error("expected attribute name after `.`")),
                };
                let base = match &expr.node {
                    Expr::Local(name) => name.clone(),
                    _ => {
                        return Err(CompileIssue::Parse {
                            message: "attribute access is only valid on an item id".to_string(),
                            offset: expr.span.start,
                        })
                    }
                };
                if attr != "outcome" {
                    return Err(CompileIssue::Parse {
                        message: format!("unsupported attribute `.{}`; only `.outcome`", attr),
                        offset: attr_span.start,
                    });
                }
                let span = expr.span.merge(attr_span);
                expr = Spanned::new(Expr::Outcome(base), span);
            } else if self.peek().map(|t| &t.tok) == Some(&Tok::LParen) {
                let name = match &expr.node {
                    Expr::Local(name) => name.clone(),
                    _ => {
                        return Err(CompileIssue::Parse {
                            message: "only simple names can be called".to_string(),
                            offset: expr.span.start,
                        })
                    }
                };
                self.advance();
                let mut args = Vec::new();
                if self.peek().map(|t| &t.tok) != Some(&Tok::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                }
                let close = self.expect(Tok::RParen, "`)`")?;
                let span = expr.span.merge(close);
                expr = Spanned::new(Expr::Call { name, args }, span);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Spanned<Expr>, CompileIssue> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.parse_error("unexpected end of expression")),
        };
        match token.tok {
            Tok::Int(value) => {
                self.advance();
                Ok(Spanned::new(Expr::Int(value), token.span))
            }
            Tok::True => {
                self.advance();
                Ok(Spanned::new(Expr::Bool(true), token.span))
            }
            Tok::False => {
                self.advance();
                Ok(Spanned::new(Expr::Bool(false), token.span))
            }
            Tok::NoneKw => {
                self.advance();
                Ok(Spanned::new(Expr::NoneLit, token.span))
            }
            Tok::Ident(name) => {
                self.advance();
                Ok(Spanned::new(Expr::Local(name), token.span))
            }
            Tok::LParen => {
                self.advance();
                let inner = self.or_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(inner)
            }
            Tok::Reserved(kw) => Err(CompileIssue::Unsupported {
                message: format!("`{}` is not part of the predicate language", kw),
                offset: token.span.start,
            }),
            _ => Err(self.parse_error("expected a literal, name, or `(`")),
        }
    }
}
