//! Renders template files to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::context::TemplateEvaluationContext;
use super::parse::{Expr, ParseError, Segment, parse};

/// Errors from rendering a single template. None of these succeed on retry.
#[derive(Debug, Error)]
pub enum RenderError {
  #[error("failed to read template {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("malformed template {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: ParseError,
  },

  #[error("missing property '{0}'")]
  MissingProperty(String),

  #[error("missing spec value 'spec.{0}'")]
  MissingSpecValue(String),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Renders templates against one evaluation context.
pub struct Renderer {
  context: TemplateEvaluationContext,
}

impl Renderer {
  pub fn new(context: TemplateEvaluationContext) -> Self {
    Self { context }
  }

  /// Render `src` into `dst`, creating intermediate directories.
  pub fn render(&self, src: &Path, dst: &Path) -> Result<(), RenderError> {
    let source = fs::read_to_string(src).map_err(|source| RenderError::Read {
      path: src.to_path_buf(),
      source,
    })?;

    let segments = parse(&source).map_err(|source| RenderError::Parse {
      path: src.to_path_buf(),
      source,
    })?;

    let rendered = self.evaluate(&segments)?;

    if let Some(parent) = dst.parent() {
      fs::create_dir_all(parent).map_err(|source| RenderError::Write {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    fs::write(dst, rendered).map_err(|source| RenderError::Write {
      path: dst.to_path_buf(),
      source,
    })?;

    debug!(src = %src.display(), dst = %dst.display(), "rendered template");
    Ok(())
  }

  /// Evaluate pre-parsed segments to a string.
  pub fn evaluate(&self, segments: &[Segment]) -> Result<String, RenderError> {
    let mut out = String::new();

    for segment in segments {
      match segment {
        Segment::Literal(s) => out.push_str(s),
        Segment::Output(expr) => out.push_str(&self.evaluate_expr(expr)?),
      }
    }

    Ok(out)
  }

  fn evaluate_expr(&self, expr: &Expr) -> Result<String, RenderError> {
    let value = match expr {
      Expr::Property { name, default } => self
        .context
        .property(name)
        .or(default.as_ref())
        .ok_or_else(|| RenderError::MissingProperty(name.clone()))?,
      Expr::Spec(path) => self
        .context
        .spec_value(path.iter().map(String::as_str))
        .ok_or_else(|| RenderError::MissingSpecValue(path.join(".")))?,
      Expr::Name => self
        .context
        .spec_value(["name"])
        .ok_or_else(|| RenderError::MissingSpecValue("name".to_string()))?,
      Expr::Index => self
        .context
        .spec_value(["index"])
        .ok_or_else(|| RenderError::MissingSpecValue("index".to_string()))?,
    };

    Ok(display_value(value))
  }
}

/// Strings verbatim, scalars via display, nil as empty, collections as JSON.
fn display_value(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Array(_) | Value::Object(_) => value.to_string(),
  }
}
