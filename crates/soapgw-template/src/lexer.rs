//! Template lexer
//!
//! Splits template text into literal text and `{{ }}` actions, applies
//! `{{-` / `-}}` whitespace trimming, drops comments and tokenizes action
//! bodies.

use std::iter::Peekable;
use std::str::CharIndices;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A token inside an action
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Dot,
    /// `.A.B`
    Field(Vec<String>),
    /// `$`, `$x`, `$x.A.B`
    Var(String, Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Pipe,
    LParen,
    RParen,
    Comma,
    Declare,
    Assign,
}

/// A lexed template item
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action { line: usize, tokens: Vec<Token> },
}

/// Lexing failure with the line it occurred on
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LexError {
    pub line: usize,
    pub message: String,
}

impl LexError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

pub(crate) fn lex(src: &str) -> Result<Vec<Item>, LexError> {
    let mut items = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next = false;

    loop {
        let Some(open) = rest.find(OPEN) else {
            push_text(&mut items, rest, trim_next, false);
            break;
        };

        let after = &rest[open + OPEN.len()..];
        let trim_left = has_left_trim(after);
        push_text(&mut items, &rest[..open], trim_next, trim_left);
        line += rest[..open].matches('\n').count();

        let body = if trim_left { &after[1..] } else { after };
        let action_line = line;

        if body.trim_start().starts_with("/*") {
            let (consumed, trim_right) = skip_comment(body, action_line)?;
            line += body[..consumed].matches('\n').count();
            trim_next = trim_right;
            rest = &body[consumed..];
            continue;
        }

        let end = find_close(body)
            .ok_or_else(|| LexError::new(action_line, "unclosed action"))?;
        let mut inner = &body[..end];
        let trim_right = has_right_trim(inner);
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }

        let tokens = tokenize(inner, action_line)?;
        if tokens.is_empty() {
            return Err(LexError::new(action_line, "missing value for command"));
        }
        items.push(Item::Action {
            line: action_line,
            tokens,
        });

        line += body[..end].matches('\n').count();
        trim_next = trim_right;
        rest = &body[end + CLOSE.len()..];
    }

    Ok(items)
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

/// `{{- ` trims; `{{-3}}` is a negative number
fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

fn has_right_trim(inner: &str) -> bool {
    inner
        .strip_suffix('-')
        .is_some_and(|rest| rest.ends_with(char::is_whitespace))
}

/// Returns bytes consumed up to and including the closing delimiter.
fn skip_comment(body: &str, line: usize) -> Result<(usize, bool), LexError> {
    let end = body
        .find("*/")
        .ok_or_else(|| LexError::new(line, "unclosed comment"))?;
    let after = &body[end + 2..];
    let trimmed = after.trim_start();
    let skipped = after.len() - trimmed.len();

    if let Some(rest) = trimmed.strip_prefix("-}}") {
        if skipped == 0 {
            return Err(LexError::new(line, "comment ends before closing delimiter"));
        }
        Ok((body.len() - rest.len(), true))
    } else if let Some(rest) = trimmed.strip_prefix(CLOSE) {
        Ok((body.len() - rest.len(), false))
    } else {
        Err(LexError::new(line, "comment ends before closing delimiter"))
    }
}

/// Position of the closing `}}`, ignoring delimiters inside quoted strings.
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'`' || b == b'\'' {
                    quote = Some(b);
                } else if body[i..].starts_with(CLOSE) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Scanner<'s> {
    src: &'s str,
    chars: Peekable<CharIndices<'s>>,
    line: usize,
}

impl<'s> Scanner<'s> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|&c| is_ident_char(c)) {
            out.push(c);
            self.chars.next();
        }
        out
    }

    /// `.A.B.C` after the first dot has been consumed
    fn field_chain(&mut self) -> Vec<String> {
        let mut fields = vec![self.ident()];
        while self.peek() == Some('.') && self.peek_second().is_some_and(is_ident_start) {
            self.chars.next();
            fields.push(self.ident());
        }
        fields
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError::new(self.line, message)
    }

    fn string(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated quoted string")),
                Some((_, '"')) => return Ok(out),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, c)) => return Err(self.error(format!("unknown escape sequence \\{c}"))),
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn raw_string(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated raw quoted string")),
                Some((_, '`')) => return Ok(out),
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn char_constant(&mut self) -> Result<Token, LexError> {
        let c = match self.chars.next() {
            Some((_, '\\')) => match self.chars.next() {
                Some((_, 'n')) => '\n',
                Some((_, 't')) => '\t',
                Some((_, c)) => c,
                None => return Err(self.error("unterminated character constant")),
            },
            Some((_, c)) => c,
            None => return Err(self.error("unterminated character constant")),
        };
        match self.chars.next() {
            Some((_, '\'')) => Ok(Token::Int(i64::from(u32::from(c)))),
            _ => Err(self.error("unterminated character constant")),
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, LexError> {
        let mut end = start;
        let mut prev = ' ';
        while let Some(&(i, c)) = self.chars.peek() {
            let sign_after_exponent = (c == '+' || c == '-') && matches!(prev, 'e' | 'E') && !self.src[start..i].contains(['x', 'X']);
            let leading_sign = (c == '+' || c == '-') && i == start;
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || sign_after_exponent || leading_sign {
                end = i + c.len_utf8();
                prev = c;
                self.chars.next();
            } else {
                break;
            }
        }

        let text = self.src[start..end].replace('_', "");
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(&text)),
        };

        let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok().map(Token::Int)
        } else if digits.contains(['.', 'e', 'E']) {
            digits.parse::<f64>().ok().map(Token::Float)
        } else {
            digits.parse::<i64>().ok().map(Token::Int)
        };

        match parsed {
            Some(Token::Int(n)) if negative => Ok(Token::Int(-n)),
            Some(Token::Float(f)) if negative => Ok(Token::Float(-f)),
            Some(token) => Ok(token),
            None => Err(self.error(format!("bad number syntax: {:?}", &self.src[start..end]))),
        }
    }
}

fn tokenize(src: &str, line: usize) -> Result<Vec<Token>, LexError> {
    let mut scanner = Scanner {
        src,
        chars: src.char_indices().peekable(),
        line,
    };
    let mut tokens = Vec::new();

    while let Some(&(i, c)) = scanner.chars.peek() {
        if c.is_whitespace() {
            if c == '\n' {
                scanner.line += 1;
            }
            scanner.chars.next();
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || ((c == '-' || c == '+') && scanner.peek_second().is_some_and(|n| n.is_ascii_digit() || n == '.'))
            || (c == '.' && scanner.peek_second().is_some_and(|n| n.is_ascii_digit()));
        if starts_number {
            tokens.push(scanner.number(i)?);
            continue;
        }

        scanner.chars.next();
        let token = match c {
            '|' => Token::Pipe,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '=' => Token::Assign,
            ':' => {
                if scanner.peek() == Some('=') {
                    scanner.chars.next();
                    Token::Declare
                } else {
                    return Err(scanner.error("expected :="));
                }
            }
            '"' => Token::Str(scanner.string()?),
            '`' => Token::Str(scanner.raw_string()?),
            '\'' => scanner.char_constant()?,
            '.' => {
                if scanner.peek().is_some_and(is_ident_start) {
                    Token::Field(scanner.field_chain())
                } else {
                    Token::Dot
                }
            }
            '$' => {
                let name = format!("${}", scanner.ident());
                let fields = if scanner.peek() == Some('.')
                    && scanner.peek_second().is_some_and(is_ident_start)
                {
                    scanner.chars.next();
                    scanner.field_chain()
                } else {
                    Vec::new()
                };
                Token::Var(name, fields)
            }
            c if is_ident_start(c) => {
                let mut ident = c.to_string();
                ident.push_str(&scanner.ident());
                match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(ident),
                }
            }
            other => return Err(scanner.error(format!("unexpected {other:?} in action"))),
        };
        tokens.push(token);
    }

    Ok(tokens)
}
