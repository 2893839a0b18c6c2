//! Parser for edge `when` expressions.
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr (("||" | "or") and_expr)*
//! and_expr   := not_expr (("&&" | "and") not_expr)*
//! not_expr   := ("!" | "not") not_expr | comparison
//! comparison := atom (("==" | "!=" | ">" | "<") atom)?
//! atom       := "(" expr ")" | literal | variable
//! ```
//!
//! An input made of a single dotted name such as `utils.helper.check` is a
//! reference to a registered condition function.

use super::ast::{CompareOp, Expr, LogicalOp, WhenExpr};
use crate::utils::error::{LimanError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Compare(CompareOp),
    Bool(bool),
    Number(f64),
    Str(String),
    Ident(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::Compare(op) => format!("'{}'", op.as_str()),
            Token::Bool(value) => format!("'{}'", value),
            Token::Number(value) => format!("number {}", value),
            Token::Str(value) => format!("string {:?}", value),
            Token::Ident(name) => format!("'{}'", name),
        }
    }
}

/// Parses a `when` expression.
pub fn parse_when(input: &str) -> Result<WhenExpr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(parse_error(input, "empty expression"));
    }

    if let [Token::Ident(name)] = tokens.as_slice() {
        if is_function_ref(name) {
            return Ok(WhenExpr::FunctionRef(name.clone()));
        }
    }

    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(parse_error(
            input,
            format!("unexpected {} after expression", token.describe()),
        ));
    }
    Ok(WhenExpr::Conditional(expr))
}

fn parse_error(input: &str, message: impl Into<String>) -> LimanError {
    LimanError::Parse {
        input: input.to_string(),
        message: message.into(),
    }
}

fn is_function_ref(name: &str) -> bool {
    !name.starts_with('$') && name.split('.').count() >= 2
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
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
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(parse_error(input, format!("unexpected character '{}'", c)));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '=' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(parse_error(input, "expected '==' but found '='"));
                }
                tokens.push(Token::Compare(CompareOp::Eq));
                i += 2;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CompareOp::Ne));
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '>' => {
                tokens.push(Token::Compare(CompareOp::Gt));
                i += 1;
            }
            '<' => {
                tokens.push(Token::Compare(CompareOp::Lt));
                i += 1;
            }
            '\'' | '"' => {
                let (value, next) = read_string(input, &chars, i)?;
                tokens.push(Token::Str(value));
                i = next;
            }
            '-' if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                let (value, next) = read_number(input, &chars, i)?;
                tokens.push(Token::Number(value));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let (value, next) = read_number(input, &chars, i)?;
                tokens.push(Token::Number(value));
                i = next;
            }
            c if c == '$' || is_ident_start(c) => {
                let (name, next) = read_name(input, &chars, i)?;
                tokens.push(match name.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(name),
                });
                i = next;
            }
            other => {
                return Err(parse_error(
                    input,
                    format!("unexpected character '{}'", other),
                ))
            }
        }
    }

    Ok(tokens)
}

fn read_string(input: &str, chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| parse_error(input, "unterminated escape sequence"))?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }

    Err(parse_error(input, "unterminated string literal"))
}

fn read_number(input: &str, chars: &[char], start: usize) -> Result<(f64, usize)> {
    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        if !chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            return Err(parse_error(input, "expected digits after decimal point"));
        }
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    let literal: String = chars[start..i].iter().collect();
    let value = literal
        .parse::<f64>()
        .map_err(|e| parse_error(input, format!("invalid number '{}': {}", literal, e)))?;
    Ok((value, i))
}

/// Reads `name`, `$name` or a dotted path such as `$output.count`.
fn read_name(input: &str, chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut i = start;
    if chars[i] == '$' {
        i += 1;
    }

    loop {
        if !chars.get(i).copied().is_some_and(is_ident_start) {
            return Err(parse_error(input, "expected identifier"));
        }
        while i < chars.len() && is_ident_char(chars[i]) {
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            continue;
        }
        break;
    }

    Ok((chars[start..i].iter().collect(), i))
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> LimanError {
        parse_error(self.input, message)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::not(self.parse_not()?));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_atom()?;
        let Some(Token::Compare(op)) = self.peek().cloned() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_atom()?;

        if !left.is_value() || !right.is_value() {
            return Err(self.error(format!(
                "operands of '{}' must be literals or variables",
                op.as_str()
            )));
        }
        Ok(Expr::compare(op, left, right))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    Some(token) => Err(self.error(format!("expected ')' but found {}", token.describe()))),
                    None => Err(self.error("expected ')' but reached end of input")),
                }
            }
            Some(Token::Bool(value)) => Ok(Expr::Bool(value)),
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::Ident(name)) => {
                if is_function_ref(&name) {
                    return Err(self.error(format!(
                        "function reference '{}' cannot be used inside an expression",
                        name
                    )));
                }
                Ok(Expr::Var(name))
            }
            Some(token) => Err(self.error(format!("unexpected {}", token.describe()))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}
