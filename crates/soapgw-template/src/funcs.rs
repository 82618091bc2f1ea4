//! Built-in template functions

use serde_json::Value;
use std::cmp::Ordering;

const BUILTINS: &[&str] = &[
    "and", "default", "eq", "ge", "gt", "index", "join", "json", "le", "len", "lower", "lt", "ne",
    "not", "or", "print", "trim", "upper", "xml",
];

pub(crate) fn exists(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Call a built-in. Errors are plain messages; the executor adds context.
pub(crate) fn call(name: &str, args: Vec<Value>) -> Result<Value, String> {
    match name {
        "and" => {
            require_at_least(name, &args, 1)?;
            let mut last = Value::Null;
            for arg in args {
                if !truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            Ok(last)
        }
        "or" => {
            require_at_least(name, &args, 1)?;
            let mut last = Value::Null;
            for arg in args {
                if truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            Ok(last)
        }
        "not" => {
            let [v] = exactly::<1>(name, args)?;
            Ok(Value::Bool(!truthy(&v)))
        }
        "default" => {
            let [fallback, v] = exactly::<2>(name, args)?;
            Ok(if truthy(&v) { v } else { fallback })
        }
        "eq" => {
            require_at_least(name, &args, 2)?;
            let first = &args[0];
            Ok(Value::Bool(args[1..].iter().any(|other| equal(first, other))))
        }
        "ne" => {
            let [a, b] = exactly::<2>(name, args)?;
            Ok(Value::Bool(!equal(&a, &b)))
        }
        "lt" | "le" | "gt" | "ge" => {
            let [a, b] = exactly::<2>(name, args)?;
            let ordering = compare(&a, &b)?;
            Ok(Value::Bool(match name {
                "lt" => ordering == Ordering::Less,
                "le" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        "len" => {
            let [v] = exactly::<1>(name, args)?;
            let n = match &v {
                Value::String(s) => s.len(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => return Err(format!("len of type {}", kind(other))),
            };
            Ok(Value::from(n))
        }
        "index" => {
            require_at_least(name, &args, 1)?;
            let mut iter = args.into_iter();
            let mut current = iter.next().unwrap_or(Value::Null);
            for key in iter {
                current = index_one(current, &key)?;
            }
            Ok(current)
        }
        "join" => {
            let [list, sep] = exactly::<2>(name, args)?;
            let Value::Array(items) = list else {
                return Err(format!("join expects a list, got {}", kind(&list)));
            };
            let parts: Vec<String> = items.iter().map(to_text).collect();
            Ok(Value::String(parts.join(&to_text(&sep))))
        }
        "json" => {
            let [v] = exactly::<1>(name, args)?;
            serde_json::to_string(&v)
                .map(Value::String)
                .map_err(|e| e.to_string())
        }
        "xml" => {
            let [v] = exactly::<1>(name, args)?;
            Ok(Value::String(escape_xml(&to_text(&v))))
        }
        "upper" => {
            let [v] = exactly::<1>(name, args)?;
            Ok(Value::String(to_text(&v).to_uppercase()))
        }
        "lower" => {
            let [v] = exactly::<1>(name, args)?;
            Ok(Value::String(to_text(&v).to_lowercase()))
        }
        "trim" => {
            let [v] = exactly::<1>(name, args)?;
            Ok(Value::String(to_text(&v).trim().to_string()))
        }
        "print" => Ok(Value::String(sprint(&args))),
        other => Err(format!("function {other:?} not defined")),
    }
}

fn require_at_least(name: &str, args: &[Value], n: usize) -> Result<(), String> {
    if args.len() < n {
        return Err(format!(
            "wrong number of args for {name}: want at least {n} got {}",
            args.len()
        ));
    }
    Ok(())
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], String> {
    let got = args.len();
    args.try_into()
        .map_err(|_| format!("wrong number of args for {name}: want {N} got {got}"))
}

/// Go truthiness: false, zero, nil and empty values are false
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub(crate) fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Text form of a value as printed by an action
pub(crate) fn to_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map_or_else(|| n.to_string(), format_float)
            }
        }
        Value::Array(_) | Value::Object(_) => v.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, String> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y)
                .ok_or_else(|| "incomparable numbers".to_string())
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(format!(
            "incompatible types for comparison: {} and {}",
            kind(a),
            kind(b)
        )),
    }
}

fn index_one(container: Value, key: &Value) -> Result<Value, String> {
    match (container, key) {
        (Value::Array(mut items), Value::Number(n)) => {
            let i = n
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| format!("cannot index list with {n}"))?;
            if i >= items.len() {
                return Err(format!("index out of range: {i}"));
            }
            Ok(items.swap_remove(i))
        }
        (Value::Object(mut map), Value::String(k)) => Ok(map.remove(k).unwrap_or(Value::Null)),
        (Value::Null, _) => Err("index of untyped nil".to_string()),
        (other, key) => Err(format!("can't index item of type {} with {}", kind(&other), kind(key))),
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Operands are separated by a space when neither side is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !arg.is_string() {
            out.push(' ');
        }
        out.push_str(&to_text(arg));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_ok(name: &str, args: Vec<Value>) -> Value {
        call(name, args).unwrap_or_else(|e| panic!("{name} failed: {e}"))
    }

    #[test]
    fn test_join() {
        assert_eq!(call_ok("join", vec![json!(["a", "b", 3]), json!(", ")]), json!("a, b, 3"));
        assert!(call("join", vec![json!("a"), json!(",")]).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call_ok("eq", vec![json!(1), json!(1.0)]), json!(true));
        assert_eq!(call_ok("eq", vec![json!("a"), json!("b"), json!("a")]), json!(true));
        assert_eq!(call_ok("ne", vec![json!("a"), json!("b")]), json!(true));
        assert_eq!(call_ok("lt", vec![json!(1), json!(2)]), json!(true));
        assert_eq!(call_ok("ge", vec![json!("b"), json!("a")]), json!(true));
        assert!(call("lt", vec![json!(1), json!("a")]).is_err());
    }

    #[test]
    fn test_logic_and_default() {
        assert_eq!(call_ok("and", vec![json!(1), json!(""), json!(2)]), json!(""));
        assert_eq!(call_ok("or", vec![json!(""), json!(0), json!("x")]), json!("x"));
        assert_eq!(call_ok("not", vec![json!([])]), json!(true));
        assert_eq!(call_ok("default", vec![json!("n/a"), json!("")]), json!("n/a"));
        assert_eq!(call_ok("default", vec![json!("n/a"), json!("set")]), json!("set"));
    }

    #[test]
    fn test_index_and_len() {
        let data = json!({"list": [10, 20], "map": {"k": "v"}});
        assert_eq!(call_ok("index", vec![data.clone(), json!("list"), json!(1)]), json!(20));
        assert_eq!(call_ok("index", vec![data.clone(), json!("missing")]), Value::Null);
        assert!(call("index", vec![json!([1]), json!(5)]).is_err());
        assert_eq!(call_ok("len", vec![data["list"].clone()]), json!(2));
        assert!(call("len", vec![json!(3)]).is_err());
    }

    #[test]
    fn test_encoders() {
        assert_eq!(call_ok("json", vec![json!("a\"b")]), json!("\"a\\\"b\""));
        assert_eq!(call_ok("xml", vec![json!("<a & 'b'>")]), json!("&lt;a &amp; &#39;b&#39;&gt;"));
        assert_eq!(call_ok("upper", vec![json!("abc")]), json!("ABC"));
        assert_eq!(call_ok("trim", vec![json!("  x ")]), json!("x"));
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(call_ok("print", vec![json!(1), json!(2), json!("a"), json!(3)]), json!("1 2a3"));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!(212.0)), "212");
        assert_eq!(to_text(&json!(12.5)), "12.5");
        assert_eq!(to_text(&Value::Null), "");
        assert_eq!(to_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_wrong_arity() {
        let err = call("not", vec![]).unwrap_err();
        assert_eq!(err, "wrong number of args for not: want 1 got 0");
    }
}
