//! Template execution
//!
//! Walks a parsed [`Template`] against a JSON value. Dot follows Go
//! semantics: `range` and `with` rebind it to the current element or value.
//!
//! A field missing from the data is an error when it is printed or passed
//! to a function in an output action. Inside `if`, `with` and `range`
//! heads a missing field evaluates to nil, so optional data can be tested
//! before it is used.

use crate::funcs::{self, kind, to_text, truthy};
use crate::parser::{Command, Node, Operand, Pipeline, Template};
use crate::{Error, Result};
use serde_json::Value;
use tracing::trace;

/// Execute a template against `data`.
///
/// # Errors
///
/// Returns [`Error::Execution`] when a field cannot be evaluated, a
/// function fails, or a non-iterable value is ranged over.
pub fn execute(template: &Template, data: &Value) -> Result<String> {
    let mut state = State {
        name: &template.name,
        out: String::new(),
        vars: vec![("$".to_string(), data.clone())],
        line: 0,
    };
    state.walk_list(&template.root, data)?;
    trace!(template = %template.name, bytes = state.out.len(), "executed template");
    Ok(state.out)
}

struct State<'t> {
    name: &'t str,
    out: String,
    vars: Vec<(String, Value)>,
    line: usize,
}

impl State<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::execution(self.name, self.line, message)
    }

    fn walk_list(&mut self, nodes: &[Node], dot: &Value) -> Result<()> {
        let mark = self.vars.len();
        for node in nodes {
            self.walk(node, dot)?;
        }
        self.vars.truncate(mark);
        Ok(())
    }

    fn walk(&mut self, node: &Node, dot: &Value) -> Result<()> {
        match node {
            Node::Text(text) => self.out.push_str(text),
            Node::Action { line, pipe } => {
                self.line = *line;
                let value = self.eval_pipeline(pipe, dot, false)?;
                if pipe.decl.is_empty() {
                    self.out.push_str(&to_text(&value));
                }
            }
            Node::If {
                line,
                pipe,
                then,
                otherwise,
            } => {
                self.line = *line;
                let mark = self.vars.len();
                let cond = self.eval_pipeline(pipe, dot, true)?;
                if truthy(&cond) {
                    self.walk_list(then, dot)?;
                } else {
                    self.walk_list(otherwise, dot)?;
                }
                self.vars.truncate(mark);
            }
            Node::With {
                line,
                pipe,
                body,
                otherwise,
            } => {
                self.line = *line;
                let mark = self.vars.len();
                let value = self.eval_pipeline(pipe, dot, true)?;
                if truthy(&value) {
                    self.walk_list(body, &value)?;
                } else {
                    self.walk_list(otherwise, dot)?;
                }
                self.vars.truncate(mark);
            }
            Node::Range {
                line,
                pipe,
                body,
                otherwise,
            } => {
                self.line = *line;
                self.walk_range(pipe, body, otherwise, dot)?;
            }
        }
        Ok(())
    }

    fn walk_range(
        &mut self,
        pipe: &Pipeline,
        body: &[Node],
        otherwise: &[Node],
        dot: &Value,
    ) -> Result<()> {
        let collection = self.eval_commands(&pipe.cmds, dot, true)?;

        let entries: Vec<(Value, Value)> = match collection {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(self.error(format!("range can't iterate over {}", kind(&other))));
            }
        };

        if entries.is_empty() {
            return self.walk_list(otherwise, dot);
        }

        for (key, element) in entries {
            let mark = self.vars.len();
            match pipe.decl.as_slice() {
                [value_var] => self.vars.push((value_var.clone(), element.clone())),
                [key_var, value_var] => {
                    self.vars.push((key_var.clone(), key));
                    self.vars.push((value_var.clone(), element.clone()));
                }
                _ => {}
            }
            self.walk_list(body, &element)?;
            self.vars.truncate(mark);
        }
        Ok(())
    }

    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value, lenient: bool) -> Result<Value> {
        let value = self.eval_commands(&pipe.cmds, dot, lenient)?;
        for name in &pipe.decl {
            if pipe.assign {
                match self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = value.clone(),
                    None => return Err(self.error(format!("undefined variable: {name}"))),
                }
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn eval_commands(&mut self, cmds: &[Command], dot: &Value, lenient: bool) -> Result<Value> {
        let mut piped: Option<Value> = None;
        for cmd in cmds {
            piped = Some(self.eval_command(cmd, dot, piped, lenient)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn eval_command(
        &mut self,
        cmd: &Command,
        dot: &Value,
        piped: Option<Value>,
        lenient: bool,
    ) -> Result<Value> {
        match cmd.args.first() {
            Some(Operand::Func(name)) => {
                let mut args = Vec::with_capacity(cmd.args.len());
                for arg in &cmd.args[1..] {
                    args.push(self.eval_operand(arg, dot, lenient)?);
                }
                args.extend(piped);
                funcs::call(name, args).map_err(|e| self.error(format!("error calling {name}: {e}")))
            }
            Some(operand) => {
                if piped.is_some() {
                    return Err(self.error("can't give argument to non-function"));
                }
                self.eval_operand(operand, dot, lenient)
            }
            None => Err(self.error("empty command")),
        }
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value, lenient: bool) -> Result<Value> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => self.field(dot, path, lenient),
            Operand::Var(name, path) => {
                let base = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| self.error(format!("undefined variable: {name}")))?;
                self.field(&base, path, lenient)
            }
            Operand::Func(name) => funcs::call(name, Vec::new())
                .map_err(|e| self.error(format!("error calling {name}: {e}"))),
            Operand::Str(s) => Ok(Value::String(s.clone())),
            Operand::Int(n) => Ok(Value::from(*n)),
            Operand::Float(f) => Ok(Value::from(*f)),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Nil => Ok(Value::Null),
            Operand::Sub(pipe) => self.eval_commands(&pipe.cmds, dot, lenient),
        }
    }

    fn field(&self, base: &Value, path: &[String], lenient: bool) -> Result<Value> {
        let mut current = base;
        for segment in path {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(next) => current = next,
                    None if lenient => return Ok(Value::Null),
                    None => {
                        return Err(self.error(format!("can't evaluate field {segment}: no such key")));
                    }
                },
                _ if lenient => return Ok(Value::Null),
                other => {
                    return Err(self.error(format!(
                        "can't evaluate field {segment} in type {}",
                        kind(other)
                    )));
                }
            }
        }
        Ok(current.clone())
    }
}
