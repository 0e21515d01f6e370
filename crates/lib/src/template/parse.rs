//! Parser for the ERB-style template subset.

use serde_json::Value;
use thiserror::Error;

/// An expression inside an output tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// `p("name")` or `p("name", default)`
  Property { name: String, default: Option<Value> },
  /// `spec.a.b`
  Spec(Vec<String>),
  /// `name`
  Name,
  /// `index`
  Index,
}

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
  Literal(String),
  Output(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error("unclosed tag at position {0}")]
  Unclosed(usize),

  #[error("unsupported code tag at position {position}: '{code}'")]
  UnsupportedTag { position: usize, code: String },

  #[error("invalid expression: '{0}'")]
  BadExpression(String),

  #[error("invalid literal: '{0}'")]
  BadLiteral(String),
}

/// Parse template text into literal and output segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, ParseError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find("<%") {
    let position = input.len() - rest.len() + start;
    literal.push_str(&rest[..start]);
    let after = &rest[start + 2..];

    // <%% is an escaped tag opener
    if let Some(stripped) = after.strip_prefix('%') {
      literal.push_str("<%");
      rest = stripped;
      continue;
    }

    let end = find_close(after).ok_or(ParseError::Unclosed(position))?;
    let mut body = &after[..end];
    let mut next = &after[end + 2..];

    if let Some(trimmed) = body.strip_suffix('-') {
      body = trimmed;
      next = next
        .strip_prefix("\r\n")
        .or_else(|| next.strip_prefix('\n'))
        .unwrap_or(next);
    }

    if let Some(expr) = body.strip_prefix('=') {
      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      segments.push(Segment::Output(parse_expr(expr.trim())?));
    } else if !body.starts_with('#') {
      return Err(ParseError::UnsupportedTag {
        position,
        code: body.trim().to_string(),
      });
    }

    rest = next;
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Offset of the `%>` closing a tag body. Comments end at the first `%>`;
/// other tags skip over `%>` inside quoted strings.
fn find_close(body: &str) -> Option<usize> {
  if body.starts_with('#') {
    return body.find("%>");
  }

  let bytes = body.as_bytes();
  let mut quote = None;
  let mut escaped = false;
  for (idx, &b) in bytes.iter().enumerate() {
    match quote {
      Some(_) if escaped => escaped = false,
      Some(_) if b == b'\\' => escaped = true,
      Some(q) if b == q => quote = None,
      Some(_) => {}
      None if b == b'"' || b == b'\'' => quote = Some(b),
      None if b == b'%' && bytes.get(idx + 1) == Some(&b'>') => return Some(idx),
      None => {}
    }
  }

  None
}

fn parse_expr(expr: &str) -> Result<Expr, ParseError> {
  match expr {
    "name" => return Ok(Expr::Name),
    "index" => return Ok(Expr::Index),
    _ => {}
  }

  if let Some(path) = expr.strip_prefix("spec.") {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| !is_identifier(s)) {
      return Err(ParseError::BadExpression(expr.to_string()));
    }
    return Ok(Expr::Spec(segments));
  }

  if let Some(args) = expr.strip_prefix("p(").and_then(|s| s.strip_suffix(')')) {
    return parse_property_call(args).ok_or_else(|| ParseError::BadExpression(expr.to_string()))?;
  }

  Err(ParseError::BadExpression(expr.to_string()))
}

fn is_identifier(s: &str) -> bool {
  !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses `"name"` or `"name", default`. Returns `None` when the argument
/// list is not shaped like a property call.
fn parse_property_call(args: &str) -> Option<Result<Expr, ParseError>> {
  let (name, rest) = parse_quoted(args.trim_start())?;
  let rest = rest.trim();

  if rest.is_empty() {
    return Some(Ok(Expr::Property { name, default: None }));
  }

  let default = rest.strip_prefix(',')?.trim();
  Some(parse_literal(default).map(|value| Expr::Property {
    name,
    default: Some(value),
  }))
}

/// Parses a leading single- or double-quoted string, returning the unescaped
/// contents and the remaining input.
fn parse_quoted(input: &str) -> Option<(String, &str)> {
  let mut chars = input.char_indices();
  let (_, quote) = chars.next()?;
  if quote != '"' && quote != '\'' {
    return None;
  }

  let mut value = String::new();
  let mut escaped = false;
  for (idx, c) in chars {
    if escaped {
      value.push(match c {
        'n' => '\n',
        't' => '\t',
        other => other,
      });
      escaped = false;
    } else if c == '\\' {
      escaped = true;
    } else if c == quote {
      return Some((value, &input[idx + c.len_utf8()..]));
    } else {
      value.push(c);
    }
  }

  None
}

fn parse_literal(input: &str) -> Result<Value, ParseError> {
  match input {
    "nil" => return Ok(Value::Null),
    "true" => return Ok(Value::Bool(true)),
    "false" => return Ok(Value::Bool(false)),
    _ => {}
  }

  if let Some((s, rest)) = parse_quoted(input) {
    if rest.trim().is_empty() {
      return Ok(Value::String(s));
    }
    return Err(ParseError::BadLiteral(input.to_string()));
  }

  serde_json::from_str(input).map_err(|_| ParseError::BadLiteral(input.to_string()))
}
