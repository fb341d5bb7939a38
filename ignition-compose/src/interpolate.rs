//! Variable substitution in descriptor values.
//!
//! Supported forms:
//!
//! - `$VAR` and `${VAR}`: value of `VAR`, empty if unset
//! - `${VAR:-default}` / `${VAR-default}`: `default` if `VAR` is unset or empty / unset
//! - `${VAR:?message}` / `${VAR?message}`: error if `VAR` is unset or empty / unset
//! - `${VAR:+alt}` / `${VAR+alt}`: `alt` if `VAR` is set and non-empty / set
//! - `$$`: a literal `$`
//!
//! Defaults and alternates are themselves interpolated, so
//! `${A:-${B:-fallback}}` works.

use serde_yaml::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("unterminated variable expression in '{0}'")]
    Unterminated(String),

    #[error("invalid variable expression '${{{0}}}'")]
    InvalidExpression(String),

    #[error("required variable {name} is missing a value: {message}")]
    Required { name: String, message: String },
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Substitute variables in `input` using `lookup`.
pub fn interpolate<F>(input: &str, lookup: &F) -> Result<String, InterpolationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        match after.chars().next() {
            Some('$') => {
                out.push('$');
                rest = &after[1..];
            }
            Some('{') => {
                let body_len = braced_len(&after[1..])
                    .ok_or_else(|| InterpolationError::Unterminated(input.to_owned()))?;
                let body = &after[1..1 + body_len];
                out.push_str(&expand(body, lookup)?);
                rest = &after[body_len + 2..];
            }
            Some(c) if is_name_start(c) => {
                let len = after
                    .find(|c: char| !is_name_char(c))
                    .unwrap_or(after.len());
                out.push_str(&value_or_blank(&after[..len], lookup));
                rest = &after[len..];
            }
            // a lone `$` is kept as is
            _ => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}

/// Length of the text up to the `}` closing an already opened `${`.
fn braced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut prev = '\0';
    for (i, c) in s.char_indices() {
        match c {
            '{' if prev == '$' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
        prev = c;
    }
    None
}

fn value_or_blank<F>(name: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).unwrap_or_else(|| {
        warn!(variable = name, "variable is not set, defaulting to a blank string");
        String::new()
    })
}

fn expand<F>(body: &str, lookup: &F) -> Result<String, InterpolationError>
where
    F: Fn(&str) -> Option<String>,
{
    let invalid = || InterpolationError::InvalidExpression(body.to_owned());

    let name_len = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
    let (name, modifier) = body.split_at(name_len);
    if !name.starts_with(is_name_start) {
        return Err(invalid());
    }
    if modifier.is_empty() {
        return Ok(value_or_blank(name, lookup));
    }

    let value = lookup(name);
    let (strict, op_and_arg) = match modifier.strip_prefix(':') {
        Some(rest) => (true, rest),
        None => (false, modifier),
    };
    // with ':' an empty value counts as unset
    let is_set = match &value {
        Some(v) => !strict || !v.is_empty(),
        None => false,
    };

    let mut chars = op_and_arg.chars();
    let op = chars.next().ok_or_else(invalid)?;
    let arg = chars.as_str();

    match op {
        '-' if is_set => Ok(value.unwrap_or_default()),
        '-' => interpolate(arg, lookup),
        '?' if is_set => Ok(value.unwrap_or_default()),
        '?' => Err(InterpolationError::Required {
            name: name.to_owned(),
            message: interpolate(arg, lookup)?,
        }),
        '+' if is_set => interpolate(arg, lookup),
        '+' => Ok(String::new()),
        _ => Err(invalid()),
    }
}

/// Interpolate every string scalar in a YAML document. Mapping keys are
/// left untouched.
pub fn interpolate_value<F>(value: &mut Value, lookup: &F) -> Result<(), InterpolationError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate(s, lookup)?;
            }
        }
        Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, lookup)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}
