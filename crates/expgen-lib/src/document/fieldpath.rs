//! Field path templates
//!
//! A field path is written like `/spec/template/spec/containers/[name={ .ContainerName }]/resources`.
//! Placeholders are substituted first, then the path is split on `/` with `\/` kept as a
//! literal slash inside a segment.

use crate::error::{GenerationError, Result};
use std::collections::BTreeMap;

/// Stand-in for escaped slashes while splitting
const ESCAPED_SLASH: char = '\u{1F}';

/// Evaluate a path template against `vars` and split it into segments.
///
/// Missing variables evaluate to the empty string. A template that evaluates to nothing
/// (or only slashes) yields an empty path.
pub fn field_path(template: &str, vars: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let expanded = expand(template, vars)?;

    let escaped = expanded.replace("\\/", &ESCAPED_SLASH.to_string());
    let trimmed = escaped.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    Ok(trimmed
        .split('/')
        .map(|segment| segment.replace(ESCAPED_SLASH, "/"))
        .collect())
}

fn expand(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            GenerationError::SelectorConfig(format!("unterminated placeholder in path {template:?}"))
        })?;

        let expr = after[..end].trim();
        let key = expr.strip_prefix('.').ok_or_else(|| {
            GenerationError::SelectorConfig(format!("invalid placeholder {{{expr}}} in path {template:?}"))
        })?;
        if let Some(value) = vars.get(key.trim()) {
            out.push_str(value);
        }

        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
