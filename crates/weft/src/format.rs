//! Key and value formatting between domain and wire forms
//!
//! Field names cross the wire through a [`KeyFormat`]; attribute values
//! cross through the [`ValueFormatterRegistry`], which knows how to coerce
//! booleans, round-trip dates through a descriptor's format, and resolve
//! URLs against a base.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::resource::AttributeValue;
use crate::schema::AttributeKind;

/// How domain field names appear on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyFormat {
    /// Names pass through unchanged
    AsIs,
    /// `createdAt` / `created_at` become `created-at`
    #[default]
    Dasherized,
    /// `createdAt` becomes `created_at`
    Underscored,
}

impl KeyFormat {
    /// Domain name to wire name
    pub fn encode(&self, name: &str) -> String {
        match self {
            KeyFormat::AsIs => name.to_string(),
            KeyFormat::Dasherized => split_words(name, '-'),
            KeyFormat::Underscored => split_words(name, '_'),
        }
    }

    /// Wire name back to a domain name
    ///
    /// Separated segments are re-joined in camelCase for `AsIs` inputs that
    /// were camelCase; snake_case domain names survive because `encode` is
    /// re-applied before comparison everywhere names are matched.
    pub fn decode(&self, wire_name: &str) -> String {
        match self {
            KeyFormat::AsIs => wire_name.to_string(),
            KeyFormat::Dasherized => join_words(wire_name, '-'),
            KeyFormat::Underscored => join_words(wire_name, '_'),
        }
    }
}

fn split_words(name: &str, separator: char) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push(separator);
            out.push(ch.to_ascii_lowercase());
        } else if ch == '_' || ch == '-' {
            out.push(separator);
        } else {
            out.push(ch);
        }
    }
    out
}

fn join_words(wire_name: &str, separator: char) -> String {
    let mut out = String::with_capacity(wire_name.len());
    let mut upper_next = false;
    for ch in wire_name.chars() {
        if ch == separator {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// A pluggable value transformer
///
/// Registered formatters are consulted before the built-in behavior; a
/// `None` return passes the value on to the next formatter.
pub trait ValueFormatter: Send + Sync {
    /// Wire value to typed slot value; `None` means "not handled here"
    fn unformat(&self, kind: &AttributeKind, value: &Value) -> Option<Result<AttributeValue>>;

    /// Typed slot value to wire value; `None` means "not handled here"
    fn format(&self, kind: &AttributeKind, value: &AttributeValue) -> Option<Value>;
}

/// Registry of value formatters with built-in fallbacks
#[derive(Default)]
pub struct ValueFormatterRegistry {
    custom: Vec<Box<dyn ValueFormatter>>,
}

impl ValueFormatterRegistry {
    /// Create a registry with only the built-in behavior
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom formatter, consulted before the built-ins
    pub fn register(&mut self, formatter: Box<dyn ValueFormatter>) {
        self.custom.push(formatter);
    }

    /// Translate a wire value into a typed slot value
    pub fn unformat(&self, kind: &AttributeKind, value: &Value) -> Result<AttributeValue> {
        for formatter in &self.custom {
            if let Some(result) = formatter.unformat(kind, value) {
                return result;
            }
        }
        builtin_unformat(kind, value)
    }

    /// Translate a typed slot value into a wire value
    pub fn format(&self, kind: &AttributeKind, value: &AttributeValue) -> Value {
        for formatter in &self.custom {
            if let Some(out) = formatter.format(kind, value) {
                return out;
            }
        }
        builtin_format(kind, value)
    }
}

impl std::fmt::Debug for ValueFormatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueFormatterRegistry")
            .field("custom", &self.custom.len())
            .finish()
    }
}

fn builtin_unformat(kind: &AttributeKind, value: &Value) -> Result<AttributeValue> {
    match kind {
        AttributeKind::Plain => Ok(AttributeValue::Json(value.clone())),
        AttributeKind::Boolean => match truthiness(value) {
            Some(b) => Ok(AttributeValue::Bool(b)),
            None => Err(Error::InvalidResourceStructure(format!(
                "cannot coerce {} to a boolean",
                value
            ))),
        },
        AttributeKind::Date { format } => {
            let raw = value.as_str().ok_or_else(|| {
                Error::InvalidResourceStructure(format!("date value is not a string: {}", value))
            })?;
            parse_date(raw, format.as_deref()).map(AttributeValue::Date)
        }
        AttributeKind::Url { base } => {
            let raw = value.as_str().ok_or_else(|| {
                Error::InvalidResourceStructure(format!("url value is not a string: {}", value))
            })?;
            parse_url(raw, base.as_ref()).map(AttributeValue::Url)
        }
    }
}

fn builtin_format(kind: &AttributeKind, value: &AttributeValue) -> Value {
    match (kind, value) {
        (AttributeKind::Date { format }, AttributeValue::Date(date)) => {
            Value::String(format_date(date, format.as_deref()))
        }
        (_, AttributeValue::Url(url)) => Value::String(url.as_str().to_string()),
        (_, AttributeValue::Bool(b)) => Value::Bool(*b),
        (_, AttributeValue::Json(v)) => v.clone(),
        // A date in a non-date slot still serializes in the default form.
        (_, AttributeValue::Date(date)) => Value::String(format_date(date, None)),
    }
}

/// Truthy coercion for boolean attributes
fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_date(raw: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    match format {
        None => DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| {
                Error::InvalidResourceStructure(format!("unparsable date {:?}: {}", raw, e))
            }),
        Some(fmt) => DateTime::parse_from_str(raw, fmt)
            .map(|d| d.with_timezone(&Utc))
            // Formats without an offset parse naive and are taken as UTC.
            .or_else(|_| NaiveDateTime::parse_from_str(raw, fmt).map(|n| n.and_utc()))
            .map_err(|e| {
                Error::InvalidResourceStructure(format!("unparsable date {:?}: {}", raw, e))
            }),
    }
}

fn format_date(date: &DateTime<Utc>, format: Option<&str>) -> String {
    match format {
        None => date.to_rfc3339_opts(SecondsFormat::Millis, true),
        Some(fmt) => date.format(fmt).to_string(),
    }
}

fn parse_url(raw: &str, base: Option<&Url>) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(raw).map_err(|e| {
                Error::InvalidResourceStructure(format!("unresolvable url {:?}: {}", raw, e))
            }),
            None => Err(Error::InvalidResourceStructure(format!(
                "relative url {:?} with no base",
                raw
            ))),
        },
        Err(e) => Err(Error::InvalidResourceStructure(format!(
            "unparsable url {:?}: {}",
            raw, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dasherized_handles_camel_and_snake_case() {
        let format = KeyFormat::Dasherized;
        assert_eq!(format.encode("createdAt"), "created-at");
        assert_eq!(format.encode("created_at"), "created-at");
        assert_eq!(format.encode("toOneAttribute"), "to-one-attribute");
        assert_eq!(format.encode("title"), "title");
    }

    #[test]
    fn test_underscored_and_as_is() {
        assert_eq!(KeyFormat::Underscored.encode("createdAt"), "created_at");
        assert_eq!(KeyFormat::AsIs.encode("createdAt"), "createdAt");
    }

    #[test]
    fn test_decode_restores_camel_case() {
        assert_eq!(KeyFormat::Dasherized.decode("created-at"), "createdAt");
        assert_eq!(KeyFormat::Underscored.decode("created_at"), "createdAt");
    }

    #[test]
    fn test_boolean_coercion() {
        let registry = ValueFormatterRegistry::new();
        let kind = AttributeKind::Boolean;

        for truthy in [json!(true), json!(1), json!("true"), json!("1")] {
            assert_eq!(
                registry.unformat(&kind, &truthy).unwrap().as_bool(),
                Some(true)
            );
        }
        for falsy in [json!(false), json!(0), json!("false"), json!("")] {
            assert_eq!(
                registry.unformat(&kind, &falsy).unwrap().as_bool(),
                Some(false)
            );
        }
        assert!(registry.unformat(&kind, &json!("maybe")).is_err());
    }

    #[test]
    fn test_default_date_round_trip() {
        let registry = ValueFormatterRegistry::new();
        let kind = AttributeKind::Date { format: None };

        let parsed = registry
            .unformat(&kind, &json!("2024-03-01T12:30:00.000+01:00"))
            .unwrap();
        let date = parsed.as_date().unwrap();
        // Normalized to UTC.
        assert_eq!(date.to_rfc3339_opts(SecondsFormat::Millis, true), "2024-03-01T11:30:00.000Z");

        let wire = registry.format(&kind, &parsed);
        assert_eq!(wire, json!("2024-03-01T11:30:00.000Z"));
    }

    #[test]
    fn test_custom_date_format_assumes_utc() {
        let registry = ValueFormatterRegistry::new();
        let kind = AttributeKind::Date {
            format: Some("%Y-%m-%d %H:%M:%S".to_string()),
        };

        let parsed = registry.unformat(&kind, &json!("2024-03-01 08:00:00")).unwrap();
        let wire = registry.format(&kind, &parsed);
        assert_eq!(wire, json!("2024-03-01 08:00:00"));
    }

    #[test]
    fn test_url_resolution_against_base() {
        let registry = ValueFormatterRegistry::new();
        let base = Url::parse("http://example.com/assets/").unwrap();
        let kind = AttributeKind::Url { base: Some(base) };

        let resolved = registry.unformat(&kind, &json!("logo.png")).unwrap();
        assert_eq!(
            resolved.as_url().unwrap().as_str(),
            "http://example.com/assets/logo.png"
        );

        let absolute = registry
            .unformat(&kind, &json!("http://other.example.com/x"))
            .unwrap();
        assert_eq!(absolute.as_url().unwrap().as_str(), "http://other.example.com/x");
    }

    #[test]
    fn test_relative_url_without_base_fails() {
        let registry = ValueFormatterRegistry::new();
        let kind = AttributeKind::Url { base: None };
        assert!(registry.unformat(&kind, &json!("logo.png")).is_err());
    }

    #[test]
    fn test_custom_formatter_wins() {
        struct Uppercase;
        impl ValueFormatter for Uppercase {
            fn unformat(&self, kind: &AttributeKind, value: &Value) -> Option<Result<AttributeValue>> {
                match (kind, value) {
                    (AttributeKind::Plain, Value::String(s)) => Some(Ok(AttributeValue::Json(
                        Value::String(s.to_uppercase()),
                    ))),
                    _ => None,
                }
            }
            fn format(&self, _: &AttributeKind, _: &AttributeValue) -> Option<Value> {
                None
            }
        }

        let mut registry = ValueFormatterRegistry::new();
        registry.register(Box::new(Uppercase));

        let out = registry.unformat(&AttributeKind::Plain, &json!("loud")).unwrap();
        assert_eq!(out.as_str(), Some("LOUD"));
    }
}
