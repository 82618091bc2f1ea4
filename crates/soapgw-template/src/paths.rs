//! Static path extraction
//!
//! Finds the data paths a template dereferences by scanning its actions
//! with regular expressions. This works on the raw text and does not need
//! the template to parse.
//!
//! Paths reached through a variable are rewritten onto the collection the
//! variable was bound from, so `{{range $c := .Countries}}{{$c.Code}}`
//! yields `Countries` and `Countries.Code`. Variable names are assumed to
//! be unique within one template. Fields read through a rebound dot
//! (`{{range .Countries}}{{.Code}}`) are recorded as written, relative to
//! the root.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::trace;

const PATH: &str = r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*";

static ACTION: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)\{\{(.*?)\}\}"));

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| compile(r#""(?:[^"\\]|\\.)*"|`[^`]*`"#));

static BINDING: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"\$([A-Za-z0-9_]+)\s*:=\s*\.({PATH})")));

static DIRECT: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?:^|[\s(|,]|\$)\.({PATH})")));

static VAR_FIELD: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"\$([A-Za-z0-9_]+)\.({PATH})")));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("path extraction patterns are valid regexes")
}

/// Extract every data path referenced by a template.
///
/// Each path is recorded together with all of its prefixes, so `.A.B.C`
/// contributes `A`, `A.B` and `A.B.C`. Text inside string literals and
/// comments is ignored.
pub fn extract_paths(content: &str) -> BTreeSet<String> {
    let actions: Vec<String> = ACTION
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|body| !is_comment(body))
        .map(|body| STRING_LITERAL.replace_all(body, " ").into_owned())
        .collect();

    let mut bindings: HashMap<String, String> = HashMap::new();
    for action in &actions {
        for caps in BINDING.captures_iter(action) {
            bindings.insert(caps[1].to_string(), caps[2].to_string());
        }
    }

    let mut paths = BTreeSet::new();
    for action in &actions {
        for caps in DIRECT.captures_iter(action) {
            add_with_prefixes(&mut paths, &caps[1]);
        }
        for caps in VAR_FIELD.captures_iter(action) {
            if let Some(collection) = bindings.get(&caps[1]) {
                add_with_prefixes(&mut paths, &format!("{collection}.{}", &caps[2]));
            }
        }
    }

    trace!(actions = actions.len(), paths = paths.len(), "extracted template paths");
    paths
}

fn is_comment(body: &str) -> bool {
    body.trim_start_matches('-').trim_start().starts_with("/*")
}

fn add_with_prefixes(paths: &mut BTreeSet<String>, path: &str) {
    let mut end = 0;
    for segment in path.split('.') {
        end += segment.len();
        paths.insert(path[..end].to_string());
        end += 1;
    }
}
