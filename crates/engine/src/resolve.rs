//! # Template Resolution and Path Expressions
//!
//! HTTP theses may reference the outputs of sibling theses and configured
//! variables through the `${{ ... }}` template syntax:
//!
//! - `${{ env.VARIABLE_NAME }}` - configured variable lookup
//! - `${{ theses.login.response.body.token }}` - output of a sibling thesis
//!
//! Assertions address the same data with rooted path expressions such as
//! `$.login.response.body.items[0].id`.
//!
//! ```rust
//! use std::collections::HashMap;
//! use serde_json::{Map, json};
//! use thesis_engine::resolve::{TemplateContext, interpolate_value};
//!
//! let mut theses = Map::new();
//! theses.insert("login".into(), json!({"response": {"body": {"token": "abc"}}}));
//! let variables = HashMap::from([("HOST".to_string(), "api.local".to_string())]);
//! let context = TemplateContext::new(&theses, &variables);
//!
//! let value = json!({"url": "http://${{ env.HOST }}/me", "token": "${{ theses.login.response.body.token }}"});
//! let resolved = interpolate_value(&value, &context);
//! assert_eq!(resolved["url"], "http://api.local/me");
//! assert_eq!(resolved["token"], "abc");
//! ```

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Values a template may reference.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// Outputs of the theses of the current scenario, keyed by thesis name.
    pub theses: &'a Map<String, Value>,
    /// Configured variables exposed as `env.*`.
    pub variables: &'a HashMap<String, String>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(theses: &'a Map<String, Value>, variables: &'a HashMap<String, String>) -> Self {
        Self { theses, variables }
    }
}

/// Recursively interpolates every string inside `value`.
///
/// A string made of a single template keeps the JSON type of the resolved
/// value, so `"${{ theses.create.response.body.id }}"` can yield a number.
pub fn interpolate_value(value: &Value, context: &TemplateContext<'_>) -> Value {
    match value {
        Value::String(text) => {
            if let Some(expression) = single_template(text) {
                return resolve_value(expression, context).unwrap_or(Value::Null);
            }
            Value::String(interpolate_string(text, context))
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| interpolate_value(item, context)).collect()),
        Value::Object(object) => Value::Object(
            object
                .iter()
                .map(|(key, value)| (key.clone(), interpolate_value(value, context)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Replaces every `${{ ... }}` marker in `input`. Unresolvable expressions
/// render as empty text; an unterminated marker is kept verbatim.
pub fn interpolate_string(input: &str, context: &TemplateContext<'_>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut remaining = input;

    while let Some(start) = remaining.find("${{") {
        let (before, after) = remaining.split_at(start);
        output.push_str(before);

        let Some(end) = after.find("}}") else {
            output.push_str(after);
            return output;
        };
        let expression = after[3..end].trim();
        if let Some(value) = resolve_value(expression, context) {
            output.push_str(&format_json_value(&value));
        }
        remaining = &after[end + 2..];
    }

    output.push_str(remaining);
    output
}

fn single_template(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("${{")?.strip_suffix("}}")?;
    if inner.contains("${{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn resolve_value(expression: &str, context: &TemplateContext<'_>) -> Option<Value> {
    if let Some(name) = expression.strip_prefix("env.") {
        return context.variables.get(name).map(|value| Value::String(value.clone()));
    }
    let rest = expression.strip_prefix("theses.")?;
    let (name, path) = match rest.split_once('.') {
        Some((name, path)) => (name, Some(path)),
        None => (rest, None),
    };
    let output = context.theses.get(name)?;
    select_path(output, path)
}

/// Selects a nested value by a dot path with optional numeric indices, such
/// as `a.b[0].c` or `items.0.id`. `None` selects `value` itself.
pub fn select_path(value: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path.map(str::trim).filter(|path| !path.is_empty()) else {
        return Some(value.clone());
    };

    let mut current = value;
    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        let (key, indices) = split_indices(segment);
        if !key.is_empty() {
            current = match current {
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                other => other.get(key)?,
            };
        }
        for index in indices {
            current = current.get(index)?;
        }
    }
    Some(current.clone())
}

fn split_indices(segment: &str) -> (&str, Vec<usize>) {
    let Some(open) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let indices = segment[open..]
        .split('[')
        .filter_map(|part| part.strip_suffix(']'))
        .filter_map(|index| index.parse::<usize>().ok())
        .collect();
    (&segment[..open], indices)
}

/// Error raised for a malformed path expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path `{expression}`: {reason}")]
pub struct PathError {
    pub expression: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parsed `$`-rooted path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        let error = |reason| PathError {
            expression: expression.to_string(),
            reason,
        };
        let trimmed = expression.trim();
        let rest = trimmed.strip_prefix('$').ok_or_else(|| error("must start with `$`"))?;

        let mut segments = Vec::new();
        let mut chars = rest.chars().peekable();
        while let Some(next) = chars.next() {
            match next {
                '.' => {
                    let mut key = String::new();
                    while let Some(&next) = chars.peek() {
                        if next == '.' || next == '[' {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(error("empty field name"));
                    }
                    segments.push(PathSegment::Key(key));
                }
                '[' => {
                    let mut index = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(digit) => index.push(digit),
                            None => return Err(error("unclosed `[`")),
                        }
                    }
                    let index = index.trim().parse::<usize>().map_err(|_| error("index must be a non-negative integer"))?;
                    segments.push(PathSegment::Index(index));
                }
                _ => return Err(error("expected `.` or `[`")),
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Value at this path, or `None` when any segment is missing.
    pub fn select<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |current, segment| match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(*index),
        })
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Loose equality: `"42"` matches `42` and `"true"` matches `true`.
pub fn json_values_match(expected: &Value, candidate: &Value) -> bool {
    if expected == candidate {
        return true;
    }
    match (expected, candidate) {
        (Value::Number(left), Value::Number(right)) => left.as_f64().is_some_and(|left| Some(left) == right.as_f64()),
        (Value::String(_), Value::String(_)) => false,
        (Value::String(text), other) | (other, Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => json_values_match(&parsed, other),
            Err(_) => text == &other.to_string(),
        },
        _ => false,
    }
}

pub(crate) fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
