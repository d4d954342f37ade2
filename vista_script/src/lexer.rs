use crate::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String), // width, parent, clamp
    Int(i64),
    Real(f64),
    Str(String),

    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    Lt,    // <
    Le,    // <=
    Gt,    // >
    Ge,    // >=
    EqEq,  // ==
    NotEq, // !=

    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    Question, // ?
    Colon,    // :
    Dot,      // .
    Comma,    // ,
    LParen,   // (
    RParen,   // )

    Eof,
}

impl Token {
    /// Compact rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier '{s}'"),
            Token::Int(v) => format!("integer {v}"),
            Token::Real(v) => format!("number {v}"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Eof => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            _ => "?",
        }
    }
}

pub struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    peek: Option<char>,
    offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let peek = chars.next();
        Self {
            chars,
            peek,
            offset: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let cur = self.peek;
        if let Some(c) = cur {
            self.offset += c.len_utf8();
        }
        self.peek = self.chars.next();
        cur
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek, Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consume `expected` if it is next; true when consumed.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ExpressionError> {
        self.skip_ws();

        let start = self.offset;
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        let tok = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '?' => Token::Question,
            ':' => Token::Colon,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,

            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '=' => {
                if self.eat('=') {
                    Token::EqEq
                } else {
                    return Err(ExpressionError::UnexpectedChar { ch: '=', offset: start });
                }
            }
            '!' => {
                if self.eat('=') {
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '&' => {
                if self.eat('&') {
                    Token::AndAnd
                } else {
                    return Err(ExpressionError::UnexpectedChar { ch: '&', offset: start });
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::OrOr
                } else {
                    return Err(ExpressionError::UnexpectedChar { ch: '|', offset: start });
                }
            }

            quote @ ('"' | '\'') => {
                let mut s = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some('\\') => match self.bump() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => {
                                return Err(ExpressionError::UnterminatedString { offset: start });
                            }
                        },
                        Some(c) => s.push(c),
                        None => return Err(ExpressionError::UnterminatedString { offset: start }),
                    }
                }
                Token::Str(s)
            }

            c if c.is_ascii_digit() => {
                let mut s = String::new();
                s.push(c);
                let mut is_real = false;
                loop {
                    match self.peek {
                        Some(p) if p.is_ascii_digit() => s.push(self.bump().unwrap()),
                        // A digit must follow the dot, otherwise it is member access.
                        Some('.') if !is_real => {
                            let mut ahead = self.chars.clone();
                            if matches!(ahead.next(), Some(d) if d.is_ascii_digit()) {
                                is_real = true;
                                s.push(self.bump().unwrap());
                            } else {
                                break;
                            }
                        }
                        _ => break,
                    }
                }
                if is_real {
                    s.parse::<f64>()
                        .map(Token::Real)
                        .map_err(|_| ExpressionError::MalformedNumber { text: s.clone() })?
                } else {
                    s.parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| ExpressionError::MalformedNumber { text: s.clone() })?
                }
            }

            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                s.push(c);
                while matches!(self.peek, Some(p) if p.is_alphanumeric() || p == '_') {
                    s.push(self.bump().unwrap());
                }
                Token::Ident(s)
            }

            other => return Err(ExpressionError::UnexpectedChar { ch: other, offset: start }),
        };

        Ok(tok)
    }
}
