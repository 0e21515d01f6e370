//! Template rendering.
//!
//! Templates are text files with ERB-style tags bound to a job + instance
//! context. Only output and comment tags are understood; anything that would
//! need a general-purpose interpreter is rejected at parse time so malformed
//! templates surface as early as possible.
//!
//! # Tags
//!
//! - `<%= expr %>` - evaluate `expr` and insert the result
//! - `<%# ... %>` - comment, produces nothing
//! - `<%%` - literal `<%`
//! - `-%>` - close a tag and drop the newline that follows it
//!
//! # Expressions
//!
//! - `p("a.b")`, `p("a.b", default)` - property lookup
//! - `spec.index`, `spec.networks.<net>.ip`, ... - instance spec values
//! - `name`, `index` - shorthands for `spec.name` and `spec.index`
//!
//! # Submodules
//!
//! - [`context`] - evaluation context built from job + instance
//! - [`parse`] - tag and expression parser
//! - [`render`] - file renderer

pub mod context;
pub mod parse;
pub mod render;

pub use context::TemplateEvaluationContext;
pub use parse::{Expr, ParseError, Segment, parse};
pub use render::{RenderError, Renderer};
