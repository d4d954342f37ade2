use std::sync::Arc;

use vista_variant::Variant;

use crate::ast::{BinaryOp, Builtin, Expr, PropRef, UnaryOp};
use crate::error::ExpressionError;
use crate::lexer::{Lexer, Token};

/// Compile an expression source into an [`Expr`] tree.
/// The whole input must be consumed; trailing tokens are an error.
pub fn compile(source: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expr(0)?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

// Binding powers, loosest to tightest. Ternary sits below `||`.
fn infix_power(tok: &Token) -> Option<(BinaryOp, u8, u8)> {
    let (op, lbp, rbp) = match tok {
        Token::OrOr => (BinaryOp::Or, 2, 3),
        Token::AndAnd => (BinaryOp::And, 4, 5),
        Token::EqEq => (BinaryOp::Eq, 6, 7),
        Token::NotEq => (BinaryOp::Ne, 6, 7),
        Token::Lt => (BinaryOp::Lt, 8, 9),
        Token::Le => (BinaryOp::Le, 8, 9),
        Token::Gt => (BinaryOp::Gt, 8, 9),
        Token::Ge => (BinaryOp::Ge, 8, 9),
        Token::Plus => (BinaryOp::Add, 10, 11),
        Token::Minus => (BinaryOp::Sub, 10, 11),
        Token::Star => (BinaryOp::Mul, 12, 13),
        Token::Slash => (BinaryOp::Div, 12, 13),
        Token::Percent => (BinaryOp::Rem, 12, 13),
        _ => return None,
    };
    Some((op, lbp, rbp))
}

const TERNARY_LBP: u8 = 1;

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ExpressionError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token, ExpressionError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, tok: Token, expected: &str) -> Result<(), ExpressionError> {
        if self.current == tok {
            self.advance()?;
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: expected.to_string(),
                found: self.current.describe(),
            })
        }
    }

    fn expect_eof(&mut self) -> Result<(), ExpressionError> {
        if self.current == Token::Eof {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: "end of expression".to_string(),
                found: self.current.describe(),
            })
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            // Ternary: lowest precedence, right associative.
            if self.current == Token::Question && TERNARY_LBP >= min_bp {
                self.advance()?;
                let then_branch = self.parse_expr(0)?;
                self.expect(Token::Colon, "':' in conditional")?;
                let else_branch = self.parse_expr(TERNARY_LBP)?;
                lhs = Expr::Ternary {
                    cond: Box::new(lhs),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                };
                continue;
            }

            let Some((op, lbp, rbp)) = infix_power(&self.current) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.advance()?;
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance()? {
            Token::Int(v) => Ok(Expr::Literal(Variant::Int(v))),
            Token::Real(v) => Ok(Expr::Literal(Variant::Real(v))),
            Token::Str(s) => Ok(Expr::Literal(Variant::from(s))),

            Token::Minus => {
                let operand = self.parse_expr(14)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Token::Bang => {
                let operand = self.parse_expr(14)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }

            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }

            Token::Ident(name) => self.parse_ident(name),

            other => Err(ExpressionError::UnexpectedToken {
                expected: "literal, name, unary operator or '('".to_string(),
                found: other.describe(),
            }),
        }
    }

    /// An identifier starts a keyword literal, a function call, or a
    /// property reference (optionally dotted).
    fn parse_ident(&mut self, name: String) -> Result<Expr, ExpressionError> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Variant::Bool(true))),
            "false" => return Ok(Expr::Literal(Variant::Bool(false))),
            "null" => return Ok(Expr::Literal(Variant::Null)),
            _ => {}
        }

        if self.current == Token::LParen {
            let func = Builtin::from_name(&name)
                .ok_or(ExpressionError::UnknownFunction { name: name.clone() })?;
            self.advance()?;
            let mut args = Vec::new();
            if self.current != Token::RParen {
                loop {
                    args.push(self.parse_expr(0)?);
                    if self.current == Token::Comma {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RParen, "')' after arguments")?;
            let (min, max) = func.arity();
            if args.len() < min || args.len() > max {
                return Err(ExpressionError::BadArity {
                    name: func.name(),
                    expected: min,
                    got: args.len(),
                });
            }
            return Ok(Expr::Call { func, args });
        }

        if self.current == Token::Dot {
            self.advance()?;
            let prop = match self.advance()? {
                Token::Ident(p) => p,
                other => {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "property name after '.'".to_string(),
                        found: other.describe(),
                    });
                }
            };
            let prop = Arc::<str>::from(prop.as_str());
            let reference = if name == "parent" {
                PropRef::Parent(prop)
            } else {
                PropRef::Named {
                    object: Arc::<str>::from(name.as_str()),
                    prop,
                }
            };
            return Ok(Expr::Property(reference));
        }

        Ok(Expr::Property(PropRef::Own(Arc::<str>::from(name.as_str()))))
    }
}
