//! Template parser
//!
//! Builds the executable tree from lexed items. Variables and function
//! names are checked here, so an executing template never meets an
//! undefined name.

use crate::funcs;
use crate::lexer::{Item, LexError, Token, lex};
use crate::{Error, Result};

/// A compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub(crate) name: String,
    pub(crate) root: Vec<Node>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action {
        line: usize,
        pipe: Pipeline,
    },
    If {
        line: usize,
        pipe: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        line: usize,
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        line: usize,
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Pipeline {
    /// Declared or assigned variables, `$` included
    pub decl: Vec<String>,
    /// `=` rather than `:=`
    pub assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Var(String, Vec<String>),
    Func(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Sub(Box<Pipeline>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    If,
    Range,
    With,
}

impl Control {
    fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Range => "range",
            Self::With => "with",
        }
    }
}

enum Stop {
    Eof,
    End { line: usize },
    Else { line: usize, tokens: Vec<Token> },
}

/// Parse template text into a [`Template`].
///
/// # Errors
///
/// Returns [`Error::Syntax`] for malformed actions, unbalanced control
/// structures, undefined variables or unknown functions.
pub fn parse(name: &str, src: &str) -> Result<Template> {
    let items = lex(src).map_err(|e: LexError| Error::syntax(name, e.line, e.message))?;
    let mut parser = Parser {
        name,
        items: items.into_iter(),
        scopes: vec![vec!["$".to_string()]],
    };

    let (root, stop) = parser.parse_list()?;
    match stop {
        Stop::Eof => Ok(Template {
            name: name.to_string(),
            root,
        }),
        Stop::End { line } => Err(Error::syntax(name, line, "unexpected {{end}}")),
        Stop::Else { line, .. } => Err(Error::syntax(name, line, "unexpected {{else}}")),
    }
}

struct Parser<'n> {
    name: &'n str,
    items: std::vec::IntoIter<Item>,
    scopes: Vec<Vec<String>>,
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

impl Parser<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> Error {
        Error::syntax(self.name, line, message)
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (line, tokens) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { line, tokens } => (line, tokens),
            };

            match tokens.first() {
                Some(Token::Ident(kw)) if kw == "end" => {
                    if tokens.len() > 1 {
                        return Err(self.error(line, "unexpected tokens in {{end}}"));
                    }
                    return Ok((nodes, Stop::End { line }));
                }
                Some(Token::Ident(kw)) if kw == "else" => {
                    return Ok((
                        nodes,
                        Stop::Else {
                            line,
                            tokens: tokens[1..].to_vec(),
                        },
                    ));
                }
                Some(Token::Ident(kw)) if kw == "if" => {
                    nodes.push(self.parse_control(Control::If, line, &tokens[1..])?);
                }
                Some(Token::Ident(kw)) if kw == "range" => {
                    nodes.push(self.parse_control(Control::Range, line, &tokens[1..])?);
                }
                Some(Token::Ident(kw)) if kw == "with" => {
                    nodes.push(self.parse_control(Control::With, line, &tokens[1..])?);
                }
                Some(Token::Ident(kw))
                    if matches!(
                        kw.as_str(),
                        "define" | "template" | "block" | "break" | "continue"
                    ) =>
                {
                    return Err(self.error(line, format!("unsupported action {{{{{kw}}}}}")));
                }
                _ => {
                    let pipe = self.parse_action_pipeline(line, &tokens, 1)?;
                    nodes.push(Node::Action { line, pipe });
                }
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn parse_control(&mut self, control: Control, line: usize, tokens: &[Token]) -> Result<Node> {
        self.scopes.push(Vec::new());
        let max_decl = if control == Control::Range { 2 } else { 1 };
        let pipe = self.parse_action_pipeline(line, tokens, max_decl)?;
        if pipe.cmds.is_empty() {
            return Err(self.error(line, format!("missing value for {}", control.keyword())));
        }

        let (body, stop) = self.parse_list()?;
        let otherwise = match stop {
            Stop::End { .. } => Vec::new(),
            Stop::Else {
                line: else_line,
                tokens: else_tokens,
            } => self.parse_else(control, else_line, &else_tokens)?,
            Stop::Eof => {
                return Err(self.error(line, format!("unexpected EOF in {{{{{}}}}}", control.keyword())));
            }
        };
        self.scopes.pop();

        Ok(match control {
            Control::If => Node::If {
                line,
                pipe,
                then: body,
                otherwise,
            },
            Control::Range => Node::Range {
                line,
                pipe,
                body,
                otherwise,
            },
            Control::With => Node::With {
                line,
                pipe,
                body,
                otherwise,
            },
        })
    }

    /// Body of `{{else}}` up to the closing `{{end}}`.
    ///
    /// `{{else if ...}}` and `{{else with ...}}` nest a control node that
    /// shares the outer `{{end}}`.
    fn parse_else(&mut self, control: Control, line: usize, tokens: &[Token]) -> Result<Vec<Node>> {
        match tokens.first() {
            None => {
                let (otherwise, stop) = self.parse_list()?;
                match stop {
                    Stop::End { .. } => Ok(otherwise),
                    Stop::Else { line, .. } => Err(self.error(line, "expected end; found {{else}}")),
                    Stop::Eof => Err(self.error(line, "unexpected EOF in {{else}}")),
                }
            }
            Some(Token::Ident(kw)) if kw == "if" && control == Control::If => {
                Ok(vec![self.parse_control(Control::If, line, &tokens[1..])?])
            }
            Some(Token::Ident(kw)) if kw == "with" && control == Control::With => {
                Ok(vec![self.parse_control(Control::With, line, &tokens[1..])?])
            }
            Some(_) => Err(self.error(line, "unexpected tokens in {{else}}")),
        }
    }

    fn parse_action_pipeline(&mut self, line: usize, tokens: &[Token], max_decl: usize) -> Result<Pipeline> {
        let mut cursor = Cursor { tokens, pos: 0 };
        let (decl, assign) = self.parse_declaration(line, &mut cursor, max_decl)?;
        let mut pipe = self.parse_pipeline(line, &mut cursor, false)?;
        if !cursor.at_end() {
            return Err(self.error(line, format!("unexpected {:?} in operand", cursor.peek())));
        }
        if pipe.cmds.is_empty() && !decl.is_empty() {
            return Err(self.error(line, "missing value for declaration"));
        }

        if !assign {
            if let Some(scope) = self.scopes.last_mut() {
                scope.extend(decl.iter().cloned());
            }
        }
        pipe.decl = decl;
        pipe.assign = assign;
        Ok(pipe)
    }

    fn parse_declaration(
        &self,
        line: usize,
        cursor: &mut Cursor<'_>,
        max_decl: usize,
    ) -> Result<(Vec<String>, bool)> {
        let var_at = |cursor: &Cursor<'_>, offset: usize| match cursor.peek_at(offset) {
            Some(Token::Var(name, fields)) if fields.is_empty() => Some(name.clone()),
            _ => None,
        };

        if let Some(first) = var_at(cursor, 0) {
            match cursor.peek_at(1) {
                Some(Token::Declare) => {
                    cursor.pos += 2;
                    return Ok((vec![first], false));
                }
                Some(Token::Assign) => {
                    if !self.is_defined(&first) {
                        return Err(self.error(line, format!("undefined variable: {first}")));
                    }
                    cursor.pos += 2;
                    return Ok((vec![first], true));
                }
                Some(Token::Comma) if max_decl >= 2 => {
                    if let (Some(second), Some(Token::Declare)) = (var_at(cursor, 2), cursor.peek_at(3)) {
                        cursor.pos += 4;
                        return Ok((vec![first, second], false));
                    }
                    return Err(self.error(line, "range can only initialize variables with :="));
                }
                Some(Token::Comma) => {
                    return Err(self.error(line, "too many declarations"));
                }
                _ => {}
            }
        }
        Ok((Vec::new(), false))
    }

    fn is_defined(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.iter().any(|v| v == name))
    }

    fn parse_pipeline(&self, line: usize, cursor: &mut Cursor<'_>, in_paren: bool) -> Result<Pipeline> {
        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(line, cursor)?;
            cmds.push(cmd);
            match cursor.peek() {
                Some(Token::Pipe) => {
                    cursor.next();
                }
                Some(Token::RParen) if in_paren => break,
                None => break,
                Some(other) => {
                    return Err(self.error(line, format!("unexpected {other:?} in command")));
                }
            }
        }

        for cmd in cmds.iter().skip(1) {
            if !matches!(cmd.args.first(), Some(Operand::Func(_))) {
                return Err(self.error(line, "non-function in pipeline stage"));
            }
        }

        Ok(Pipeline {
            decl: Vec::new(),
            assign: false,
            cmds,
        })
    }

    fn parse_command(&self, line: usize, cursor: &mut Cursor<'_>) -> Result<Command> {
        let mut args = Vec::new();
        while let Some(token) = cursor.peek() {
            let operand = match token {
                Token::Pipe | Token::RParen => break,
                Token::Dot => Operand::Dot,
                Token::Field(path) => Operand::Field(path.clone()),
                Token::Var(name, path) => {
                    if !self.is_defined(name) {
                        return Err(self.error(line, format!("undefined variable: {name}")));
                    }
                    Operand::Var(name.clone(), path.clone())
                }
                Token::Ident(name) => {
                    if !funcs::exists(name) {
                        return Err(self.error(line, format!("function {name:?} not defined")));
                    }
                    Operand::Func(name.clone())
                }
                Token::Str(s) => Operand::Str(s.clone()),
                Token::Int(n) => Operand::Int(*n),
                Token::Float(f) => Operand::Float(*f),
                Token::Bool(b) => Operand::Bool(*b),
                Token::Nil => Operand::Nil,
                Token::LParen => {
                    cursor.next();
                    let sub = self.parse_pipeline(line, cursor, true)?;
                    match cursor.peek() {
                        Some(Token::RParen) => {}
                        _ => return Err(self.error(line, "unclosed left paren")),
                    }
                    Operand::Sub(Box::new(sub))
                }
                Token::Comma | Token::Declare | Token::Assign => {
                    return Err(self.error(line, format!("unexpected {token:?} in operand")));
                }
            };
            cursor.next();
            args.push(operand);
        }

        match args.first() {
            None => Err(self.error(line, "missing value for command")),
            Some(Operand::Nil) if args.len() == 1 => Err(self.error(line, "nil is not a command")),
            Some(Operand::Func(_)) => Ok(Command { args }),
            Some(_) if args.len() > 1 => {
                Err(self.error(line, "can't give argument to non-function"))
            }
            Some(_) => Ok(Command { args }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Template {
        parse("t", src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    fn parse_err(src: &str) -> String {
        parse("t", src).unwrap_err().to_string()
    }

    #[test]
    fn test_parse_text_and_field() {
        let t = parse_ok("Hi {{.Name}}");
        assert_eq!(t.root.len(), 2);
        assert!(matches!(&t.root[1], Node::Action { pipe, .. }
            if pipe.cmds[0].args == vec![Operand::Field(vec!["Name".to_string()])]));
    }

    #[test]
    fn test_parse_range_with_variables() {
        let t = parse_ok("{{range $i, $c := .Countries}}{{$i}}={{$c.Code}}{{else}}none{{end}}");
        match &t.root[0] {
            Node::Range { pipe, body, otherwise, .. } => {
                assert_eq!(pipe.decl, vec!["$i", "$c"]);
                assert_eq!(body.len(), 3);
                assert_eq!(otherwise, &vec![Node::Text("none".to_string())]);
            }
            other => panic!("expected range, found {other:?}"),
        }
    }

    #[test]
    fn test_parse_else_if_chain_shares_end() {
        let t = parse_ok("{{if .A}}a{{else if .B}}b{{else}}c{{end}}");
        match &t.root[0] {
            Node::If { otherwise, .. } => {
                assert!(matches!(&otherwise[0], Node::If { otherwise: inner, .. }
                    if inner == &vec![Node::Text("c".to_string())]));
            }
            other => panic!("expected if, found {other:?}"),
        }
    }

    #[test]
    fn test_parse_pipes_and_parens() {
        let t = parse_ok(r#"{{.Name | default "x" | upper}}{{if (eq .A 1)}}y{{end}}"#);
        assert!(matches!(&t.root[0], Node::Action { pipe, .. } if pipe.cmds.len() == 3));
    }

    #[test]
    fn test_variable_scoping() {
        parse_ok("{{$x := .A}}{{$x}}{{$x = .B}}");
        let err = parse_err("{{with $y := .A}}{{end}}{{$y}}");
        assert!(err.contains("undefined variable: $y"), "{err}");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_err("{{if .A}}x").contains("unexpected EOF"));
        assert!(parse_err("x{{end}}").contains("unexpected {{end}}"));
        assert!(parse_err("{{else}}").contains("unexpected {{else}}"));
        assert!(parse_err("{{nosuch .A}}").contains("function \"nosuch\" not defined"));
        assert!(parse_err("{{.A .B}}").contains("can't give argument to non-function"));
        assert!(parse_err("{{$z}}").contains("undefined variable"));
        assert!(parse_err("{{.A | .B}}").contains("non-function"));
        assert!(parse_err("{{template \"x\"}}").contains("unsupported action"));
    }

    #[test]
    fn test_error_carries_line() {
        let err = parse("named", "ok\n\n{{if}}{{end}}").unwrap_err();
        assert_eq!(err.to_string(), "template: named:3: missing value for command");
    }
}
