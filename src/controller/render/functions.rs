//! # Template Functions
//!
//! The functions available to templates. Arguments follow Go template order,
//! so a piped value arrives last (`{{ .x | default "y" }}` calls
//! `default("y", x)`).

use base64::Engine;
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};

/// Names of every registered function
pub const FUNCTIONS: &[&str] = &[
    "sanitize",
    "lower",
    "upper",
    "trim",
    "quote",
    "default",
    "base64_encode",
    "index",
];

pub fn register(env: &mut Environment<'_>) {
    env.add_function("sanitize", |v: Value| text(&v).map(|s| sanitize(&s)));
    env.add_function("lower", |v: Value| text(&v).map(|s| s.to_lowercase()));
    env.add_function("upper", |v: Value| text(&v).map(|s| s.to_uppercase()));
    env.add_function("trim", |v: Value| text(&v).map(|s| s.trim().to_string()));
    env.add_function("quote", quote);
    env.add_function("default", default);
    env.add_function("base64_encode", base64_encode);
    env.add_function("index", index);
}

/// Lowercase, drop everything but `[a-z0-9-.]`, trim `-` and `.` from both ends
pub fn sanitize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect::<String>()
        .trim_matches(|c| c == '-' || c == '.')
        .to_string()
}

/// String form of a value; undefined values are an error
fn text(value: &Value) -> Result<String, Error> {
    if value.is_undefined() {
        return Err(Error::new(
            ErrorKind::UndefinedError,
            "undefined value passed to function",
        ));
    }
    Ok(match value.kind() {
        ValueKind::None => String::new(),
        ValueKind::Bytes => value
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default(),
        _ => value.as_str().map_or_else(|| value.to_string(), str::to_string),
    })
}

fn quote(value: Value) -> Result<String, Error> {
    let s = text(&value)?;
    serde_json::to_string(&s).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// `default fallback value`: `value` unless it is missing or empty
fn default(fallback: Value, value: Option<Value>) -> Value {
    match value {
        Some(v) if is_set(&v) => v,
        _ => fallback,
    }
}

fn is_set(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => false,
        ValueKind::Bool => value.is_true(),
        ValueKind::String | ValueKind::Bytes | ValueKind::Seq | ValueKind::Map => {
            value.len().is_none_or(|len| len > 0)
        }
        _ => value.is_true(),
    }
}

fn base64_encode(value: Value) -> Result<String, Error> {
    let bytes = match value.as_bytes() {
        Some(b) if value.kind() == ValueKind::Bytes => b.to_vec(),
        _ => text(&value)?.into_bytes(),
    };
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// `index collection key...`
fn index(collection: Value, keys: Rest<Value>) -> Result<Value, Error> {
    keys.iter().try_fold(collection, |current, key| {
        if current.is_undefined() || current.is_none() {
            return Err(Error::new(
                ErrorKind::UndefinedError,
                format!("cannot index missing value with {key}"),
            ));
        }
        current.get_item(key)
    })
}
