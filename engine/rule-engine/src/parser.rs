//! Recursive-descent parser producing the rule AST

use crate::error::{Result, RuleError};
use crate::lexer::{Spanned, Token};
use prodline_types::AttrValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(AttrValue),
    /// Dotted path rooted at the implicit variable, e.g.
    /// `["product", "attrs", "layers"]`.
    Field(Vec<String>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

pub(crate) fn parse(tokens: &[Spanned]) -> Result<Expr> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(RuleError::Parse {
            offset: extra.offset,
            message: format!("unexpected trailing token {:?}", extra.token),
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn end_offset(&self) -> usize {
        self.tokens.last().map(|s| s.offset + 1).unwrap_or(0)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.comparison()?;
        while self.eat(&Token::And) {
            let rhs = self.comparison()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek().map(|s| &s.token) {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let spanned = self.advance().ok_or_else(|| RuleError::Parse {
            offset: self.end_offset(),
            message: "unexpected end of expression".into(),
        })?;

        match &spanned.token {
            Token::Int(v) => Ok(Expr::Literal(AttrValue::Int(*v))),
            Token::Float(v) => Ok(Expr::Literal(AttrValue::Float(*v))),
            Token::Str(v) => Ok(Expr::Literal(AttrValue::Str(v.clone()))),
            Token::True => Ok(Expr::Literal(AttrValue::Bool(true))),
            Token::False => Ok(Expr::Literal(AttrValue::Bool(false))),
            Token::LParen => {
                let inner = self.or_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(RuleError::Parse {
                        offset: self.end_offset(),
                        message: "expected ')'".into(),
                    });
                }
                Ok(inner)
            }
            Token::Ident(first) => {
                let mut path = vec![first.clone()];
                while self.eat(&Token::Dot) {
                    match self.advance() {
                        Some(Spanned { token: Token::Ident(segment), .. }) => {
                            path.push(segment.clone());
                        }
                        other => {
                            return Err(RuleError::Parse {
                                offset: other.map(|s| s.offset).unwrap_or(self.end_offset()),
                                message: "expected field name after '.'".into(),
                            });
                        }
                    }
                }
                Ok(Expr::Field(path))
            }
            other => Err(RuleError::Parse {
                offset: spanned.offset,
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(input: &str) -> Result<Expr> {
        parse(&tokenize(input)?)
    }

    #[test]
    fn parses_field_comparison() {
        let expr = parse_str("product.attrs.layers >= 4").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Ge,
                lhs: Box::new(Expr::Field(vec![
                    "product".into(),
                    "attrs".into(),
                    "layers".into()
                ])),
                rhs: Box::new(Expr::Literal(AttrValue::Int(4))),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // a || b && c  =>  a || (b && c)
        let expr = parse_str("product.a || product.b && product.c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        // 1 + 2 * 3 == 7
        let expr = parse_str("1 + 2 * 3 == 7").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Eq, lhs, .. } => match *lhs {
                Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                    assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("unexpected lhs: {other:?}"),
            },
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(matches!(parse_str("true true"), Err(RuleError::Parse { .. })));
    }

    #[test]
    fn rejects_dangling_operator() {
        assert!(matches!(parse_str("product.priority >"), Err(RuleError::Parse { .. })));
    }
}
