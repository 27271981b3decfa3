//! Recursive-descent parser producing an [`Expr`] tree.

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use crate::error::ExprError;
use crate::lexer::{tokenize, Spanned, Token};

pub(crate) fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser { tokens, cursor: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(spanned) => Err(ExprError::UnexpectedToken {
            position: spanned.position,
            found: spanned.token.describe(),
            expected: "operator or end of formula",
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let next = self.tokens.get(self.cursor).cloned();
        if next.is_some() {
            self.cursor += 1;
        }
        next
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ExprError> {
        match self.advance() {
            Some(spanned) if spanned.token == token => Ok(()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                position: spanned.position,
                found: spanned.token.describe(),
                expected,
            }),
            None => Err(ExprError::UnexpectedEnd { expected }),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::DoubleSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn factor(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek_token() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.power(),
        };
        self.advance();
        Ok(Expr::unary(op, self.factor()?))
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        if self.peek_token() == Some(&Token::DoubleStar) {
            self.advance();
            // Right associative; the exponent may carry its own unary sign.
            let exponent = self.factor()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        const EXPECTED: &str = "number, variable, function call or `(`";

        let spanned = self
            .advance()
            .ok_or(ExprError::UnexpectedEnd { expected: EXPECTED })?;
        match spanned.token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek_token() == Some(&Token::LParen) {
                    self.advance();
                    self.call(name, spanned.position)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            other => Err(ExprError::UnexpectedToken {
                position: spanned.position,
                found: other.describe(),
                expected: EXPECTED,
            }),
        }
    }

    /// Parse call arguments after the opening parenthesis.
    fn call(&mut self, name: String, position: usize) -> Result<Expr, ExprError> {
        let function =
            Function::from_name(&name).ok_or(ExprError::UnknownFunction { name, position })?;

        let mut args = Vec::new();
        if self.peek_token() == Some(&Token::RParen) {
            self.advance();
        } else {
            loop {
                args.push(self.expr()?);
                match self.advance() {
                    Some(Spanned {
                        token: Token::Comma,
                        ..
                    }) => continue,
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => break,
                    Some(other) => {
                        return Err(ExprError::UnexpectedToken {
                            position: other.position,
                            found: other.token.describe(),
                            expected: "`,` or `)`",
                        })
                    }
                    None => {
                        return Err(ExprError::UnexpectedEnd {
                            expected: "`,` or `)`",
                        })
                    }
                }
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(ExprError::Arity {
                function: function.name(),
                expected: function.arity_text(),
                found: args.len(),
            });
        }
        Ok(Expr::Call { function, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Expr {
        Expr::Number(v)
    }

    fn var(name: &str) -> Expr {
        Expr::Variable(name.into())
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("a + b * c").unwrap(),
            Expr::binary(
                BinaryOp::Add,
                var("a"),
                Expr::binary(BinaryOp::Mul, var("b"), var("c"))
            )
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        assert_eq!(
            parse("a - b - c").unwrap(),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, var("a"), var("b")),
                var("c")
            )
        );
    }

    #[test]
    fn test_power_is_right_associative_and_binds_over_unary() {
        assert_eq!(
            parse("2 ** 3 ** 2").unwrap(),
            Expr::binary(
                BinaryOp::Pow,
                num(2.0),
                Expr::binary(BinaryOp::Pow, num(3.0), num(2.0))
            )
        );
        assert_eq!(
            parse("-2 ** 2").unwrap(),
            Expr::unary(UnaryOp::Neg, Expr::binary(BinaryOp::Pow, num(2.0), num(2.0)))
        );
        assert_eq!(
            parse("2 ** -1").unwrap(),
            Expr::binary(BinaryOp::Pow, num(2.0), Expr::unary(UnaryOp::Neg, num(1.0)))
        );
    }

    #[test]
    fn test_calls() {
        assert_eq!(
            parse("log(x, 10)").unwrap(),
            Expr::Call {
                function: Function::Log,
                args: vec![var("x"), num(10.0)],
            }
        );
        assert!(matches!(
            parse("sqrt(1, 2)"),
            Err(ExprError::Arity {
                function: "sqrt",
                found: 2,
                ..
            })
        ));
        assert!(matches!(parse("exp()"), Err(ExprError::Arity { found: 0, .. })));
    }

    #[test]
    fn test_rejects_non_whitelisted_calls() {
        assert!(matches!(
            parse("open(x)"),
            Err(ExprError::UnknownFunction { ref name, position: 0 }) if name == "open"
        ));
        assert!(matches!(
            parse("1 + eval(x)"),
            Err(ExprError::UnknownFunction { position: 4, .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse("   "), Err(ExprError::Empty));
        assert!(matches!(parse("(a + b"), Err(ExprError::UnexpectedEnd { .. })));
        assert!(matches!(parse("a +"), Err(ExprError::UnexpectedEnd { .. })));
        assert!(matches!(
            parse("a b"),
            Err(ExprError::UnexpectedToken { position: 2, .. })
        ));
        assert!(matches!(
            parse("* a"),
            Err(ExprError::UnexpectedToken { position: 0, .. })
        ));
        assert!(matches!(
            parse("log(x; 2)"),
            Err(ExprError::InvalidToken { .. })
        ));
    }
}
