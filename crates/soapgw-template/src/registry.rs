//! Template registry
//!
//! Thread-safe cache of parsed templates keyed by name. Entries are shared
//! as `Arc<TemplateInfo>` and replaced wholesale on reload.

use crate::{Error, Result, TemplateInfo, parse_template};
use dashmap::DashMap;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const TEMPLATE_EXTENSION: &str = "tmpl";

/// Concurrent map of template name to parsed template
#[derive(Default)]
pub struct TemplateRegistry {
    templates: DashMap<String, Arc<TemplateInfo>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, parse and register the template at `path` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read and
    /// [`Error::Syntax`] when it does not parse. A failed load leaves any
    /// previous entry for `name` in place.
    pub fn load_template(&self, name: &str, path: &Path) -> Result<Arc<TemplateInfo>> {
        let content = std::fs::read_to_string(path)?;
        let info = parse_template(name, &content)?;
        debug!(name, path = %path.display(), paths = info.paths.len(), "loaded template");
        Ok(self.insert(info))
    }

    /// Load every `*.tmpl` file below `dir`, named by file stem.
    ///
    /// Returns the number of templates loaded. Any failure aborts the load.
    ///
    /// # Errors
    ///
    /// Returns the first IO or syntax error encountered.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            for entry in std::fs::read_dir(&current)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                self.load_template(name, &path)?;
                loaded += 1;
            }
        }

        info!(dir = %dir.display(), loaded, "loaded template directory");
        Ok(loaded)
    }

    /// Register an already parsed template, replacing any entry of that name
    pub fn insert(&self, info: TemplateInfo) -> Arc<TemplateInfo> {
        let info = Arc::new(info);
        self.templates.insert(info.name.clone(), info.clone());
        info
    }

    /// Look up a template by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no template has that name.
    pub fn get(&self, name: &str) -> Result<Arc<TemplateInfo>> {
        self.templates
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Execute the named template against `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown name, otherwise any
    /// execution error.
    pub fn execute(&self, name: &str, data: &Value) -> Result<String> {
        self.get(name)?.execute(data)
    }

    /// Registered names in sorted order
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn remove(&self, name: &str) -> Option<Arc<TemplateInfo>> {
        self.templates.remove(name).map(|(_, info)| info)
    }

    pub fn clear(&self) {
        self.templates.clear();
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
