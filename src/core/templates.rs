
use std::{collections::HashMap, fs, path::Path};

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;

use crate::core::context::RunContext;

/// Template every submission script is rendered from.
pub const BATCH_TEMPLATE: &str = "slurm_template.sh";

const MAX_INCLUDE_DEPTH: usize = 8;

const BUILTIN_TEMPLATES: [(&str, &str); 4] = [
  (
    BATCH_TEMPLATE,
    include_str!("../../templates/slurm_template.sh"),
  ),
  ("slurm_osu.sh", include_str!("../../templates/slurm_osu.sh")),
  ("slurm_hpl.sh", include_str!("../../templates/slurm_hpl.sh")),
  ("HPL.dat", include_str!("../../templates/HPL.dat")),
];

// {{ key }}
static VALUE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());
// {% include key %}, where the value of `key` names another template
static INCLUDE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\{%\s*include\s+([A-Za-z_][A-Za-z0-9_]*)\s*%\}").unwrap());

#[derive(Error, Debug)]
pub enum TemplateError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Template '{0}' not found")]
  NotFound(String),
  #[error("Template '{template}' needs key '{key}', which is missing or null")]
  MissingKey { template: String, key: String },
  #[error("Too many nested includes while rendering '{0}'")]
  IncludeDepth(String),
}

/// Renders a named template against a context. Implementations must be pure.
pub trait Renderer {
  fn render(&self, name: &str, context: &RunContext) -> Result<String, TemplateError>;
}

/// Named template sources: the built-in set, optionally overridden from a directory.
#[derive(Debug, Clone)]
pub struct Templates {
  sources: HashMap<String, String>,
}

impl Templates {
  pub fn builtin() -> Self {
    let sources = BUILTIN_TEMPLATES
      .iter()
      .map(|(name, source)| (name.to_string(), source.to_string()))
      .collect();
    Templates { sources }
  }

  /// Every regular file in `dir` replaces (or adds) the template with the same file name.
  pub fn with_overrides(mut self, dir: &Path) -> Result<Self, TemplateError> {
    for entry in fs::read_dir(dir)? {
      let path = entry?.path();
      if !path.is_file() {
        continue;
      }
      if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        debug!("Loading template '{}' from {:?}", name, path);
        self.sources.insert(name.to_string(), fs::read_to_string(&path)?);
      }
    }
    Ok(self)
  }

  pub fn insert(&mut self, name: &str, source: &str) {
    self.sources.insert(name.to_string(), source.to_string());
  }

  pub fn contains(&self, name: &str) -> bool {
    self.sources.contains_key(name)
  }

  fn render_nested(
    &self,
    name: &str,
    context: &RunContext,
    depth: usize,
  ) -> Result<String, TemplateError> {
    if depth > MAX_INCLUDE_DEPTH {
      return Err(TemplateError::IncludeDepth(name.to_string()));
    }
    let source = self
      .sources
      .get(name)
      .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

    let mut error = None;
    let substituted = VALUE_RE.replace_all(source, |caps: &Captures| {
      let key = &caps[1];
      match context.get(key).and_then(format_value) {
        Some(text) => text,
        None => {
          error.get_or_insert(TemplateError::MissingKey {
            template: name.to_string(),
            key: key.to_string(),
          });
          String::new()
        }
      }
    });
    if let Some(e) = error {
      return Err(e);
    }

    let mut error = None;
    let rendered = INCLUDE_RE.replace_all(&substituted, |caps: &Captures| {
      if error.is_some() {
        return String::new();
      }
      let key = &caps[1];
      let included = match context.get_str(key) {
        Some(included) => self.render_nested(included, context, depth + 1),
        None => Err(TemplateError::MissingKey {
          template: name.to_string(),
          key: key.to_string(),
        }),
      };
      match included {
        Ok(text) => text.trim_end_matches('\n').to_string(),
        Err(e) => {
          error = Some(e);
          String::new()
        }
      }
    });
    if let Some(e) = error {
      return Err(e);
    }

    Ok(rendered.into_owned())
  }
}

impl Renderer for Templates {
  fn render(&self, name: &str, context: &RunContext) -> Result<String, TemplateError> {
    self.render_nested(name, context, 0)
  }
}

/// Text form of a context value. Lists render one item per line; null renders nothing.
fn format_value(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    Value::Array(items) => Some(
      items
        .iter()
        .filter_map(format_value)
        .collect::<Vec<_>>()
        .join("\n"),
    ),
    other => Some(other.to_string()),
  }
}
