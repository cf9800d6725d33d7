//! Expressions accepted on `>>>` example lines.
//!
//! Grammar:
//!
//! ```text
//! expr  := '-' expr | atom
//! atom  := literal | NAME [ '(' [expr (',' expr)*] ')' ] | '(' [expr (',' expr)* [',']] ')'
//! ```

use crate::interpreter::{Interpreter, Object};
use mutant_core::{Error, Result, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Call(Box<Expr>, Vec<Expr>),
    Tuple(Vec<Expr>),
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Minus,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(Error::Parse(format!("unterminated string in {:?}", src)));
                    };
                    i += 1;
                    if ch == quote {
                        break;
                    }
                    if ch == '\\' {
                        let escaped = chars.get(i).copied().ok_or_else(|| {
                            Error::Parse(format!("dangling escape in {:?}", src))
                        })?;
                        i += 1;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    } else {
                        text.push(ch);
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let token = if text.contains('.') {
                    text.parse().map(Token::Float).map_err(|_| {
                        Error::Parse(format!("bad number {:?}", text))
                    })?
                } else {
                    text.parse().map(Token::Int).map_err(|_| {
                        Error::Parse(format!("bad number {:?}", text))
                    })?
                };
                tokens.push(token);
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::Parse(format!(
                    "unexpected character {:?} in {:?}",
                    other, src
                )))
            }
        }
    }

    Ok(tokens)
}

/// Deepest nesting of parentheses and unary minus on one example line
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(Error::Parse(format!("expected {:?}, found {:?}", expected, other))),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(Error::Parse(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let expr = self.unary();
        self.depth -= 1;
        expr
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            return Ok(match self.expr()? {
                Expr::Literal(Value::Int(v)) => Expr::Literal(Value::Int(-v)),
                Expr::Literal(Value::Float(v)) => Expr::Literal(Value::Float(-v)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr> {
        let expr = match self.advance() {
            Some(Token::Int(v)) => Expr::Literal(Value::Int(v)),
            Some(Token::Float(v)) => Expr::Literal(Value::Float(v)),
            Some(Token::Str(s)) => Expr::Literal(Value::Str(s)),
            Some(Token::Name(name)) => match name.as_str() {
                "None" => Expr::Literal(Value::None),
                "True" => Expr::Literal(Value::Bool(true)),
                "False" => Expr::Literal(Value::Bool(false)),
                _ => Expr::Name(name),
            },
            Some(Token::LParen) => {
                let (items, trailing_comma) = self.sequence()?;
                if items.len() == 1 && !trailing_comma {
                    items.into_iter().next().unwrap_or(Expr::Tuple(Vec::new()))
                } else {
                    Expr::Tuple(items)
                }
            }
            other => return Err(Error::Parse(format!("unexpected token {:?}", other))),
        };

        let mut expr = expr;
        while self.peek() == Some(&Token::LParen) {
            self.advance();
            let (args, _) = self.sequence()?;
            expr = Expr::Call(Box::new(expr), args);
        }
        Ok(expr)
    }

    /// Comma-separated expressions up to and including the closing paren
    fn sequence(&mut self) -> Result<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while self.peek() != Some(&Token::RParen) {
            items.push(self.expr()?);
            trailing_comma = false;
            if self.peek() == Some(&Token::Comma) {
                self.advance();
                trailing_comma = true;
            } else {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok((items, trailing_comma))
    }
}

pub fn parse_expr(src: &str) -> Result<Expr> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(Error::Parse(format!("trailing input in {:?}", src)));
    }
    Ok(expr)
}

/// Evaluate against the interpreter's module
pub fn eval(expr: &Expr, interp: &mut Interpreter<'_>) -> Result<Object> {
    match expr {
        Expr::Literal(v) => Ok(Object::Value(v.clone())),
        Expr::Name(name) => Ok(Object::Function(interp.lookup(name)?)),
        Expr::Tuple(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match eval(item, interp)? {
                    Object::Value(v) => values.push(v),
                    Object::Function(f) => {
                        return Err(Error::Runtime(format!(
                            "TypeError: function {} cannot be stored in a tuple",
                            f.name
                        )))
                    }
                }
            }
            Ok(Object::Value(Value::Tuple(values)))
        }
        Expr::Neg(inner) => match eval(inner, interp)? {
            Object::Value(Value::Int(v)) => v
                .checked_neg()
                .map(|n| Object::Value(Value::Int(n)))
                .ok_or_else(|| Error::Runtime("OverflowError: integer overflow".to_string())),
            Object::Value(Value::Float(v)) => Ok(Object::Value(Value::Float(-v))),
            other => Err(Error::Runtime(format!(
                "TypeError: bad operand type for unary -: {}",
                other.repr()
            ))),
        },
        Expr::Call(callee, args) => {
            let callee = eval(callee, interp)?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, interp)?);
            }
            match callee {
                Object::Function(f) => interp.call(&f, values),
                other => Err(Error::Runtime(format!(
                    "TypeError: {} is not callable",
                    other.repr()
                ))),
            }
        }
    }
}
