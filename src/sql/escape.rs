//! SQL value escaping.
//!
//! Converts typed values into text that can be spliced directly into a SQL
//! statement. Escaping primitives come from an [`Escaper`], which is normally
//! the leased connection itself.
//!
//! # Dispatch
//!
//! Values are rendered by kind:
//! 1. Numbers are emitted verbatim (NaN falls through to the text rule)
//! 2. `NULL` is emitted as the bare keyword
//! 3. Sequences become `(a, b, c)` with every element escaped recursively
//! 4. [`RawSql`] tokens pass through untouched
//! 5. Timestamps become quoted ISO-8601 literals
//! 6. JSON objects are serialized and quoted
//! 7. Everything else is coerced to text and quoted

use crate::error::{AppError, AppResult};
use crate::sql::fragment::RawSql;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

/// Literal and identifier escaping primitives.
pub trait Escaper {
    /// Quote `text` as a string literal.
    fn escape_literal(&self, text: &str) -> AppResult<String>;

    /// Quote `name` as an identifier.
    fn escape_identifier(&self, name: &str) -> AppResult<String>;
}

impl<E: Escaper + ?Sized> Escaper for &E {
    fn escape_literal(&self, text: &str) -> AppResult<String> {
        (**self).escape_literal(text)
    }

    fn escape_identifier(&self, name: &str) -> AppResult<String> {
        (**self).escape_identifier(name)
    }
}

/// PostgreSQL quoting rules, matching the client-side escaping of libpq and
/// node-postgres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PgEscaper;

impl Escaper for PgEscaper {
    fn escape_literal(&self, text: &str) -> AppResult<String> {
        if text.contains('\0') {
            return Err(AppError::escape("literal", "text contains a NUL byte"));
        }

        let mut has_backslash = false;
        let mut escaped = String::with_capacity(text.len() + 2);
        escaped.push('\'');
        for c in text.chars() {
            match c {
                '\'' => escaped.push_str("''"),
                '\\' => {
                    escaped.push_str("\\\\");
                    has_backslash = true;
                }
                _ => escaped.push(c),
            }
        }
        escaped.push('\'');

        if has_backslash {
            escaped.insert_str(0, " E");
        }
        Ok(escaped)
    }

    fn escape_identifier(&self, name: &str) -> AppResult<String> {
        if name.contains('\0') {
            return Err(AppError::escape("identifier", "name contains a NUL byte"));
        }
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// A value that can be interpolated into a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<SqlValue>),
    Raw(RawSql),
    Date(DateTime<Utc>),
    Json(JsonValue),
}

impl SqlValue {
    /// Serialize any value into its JSON shape and dispatch on that.
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Check if this value renders as `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Json(JsonValue::Null))
    }

    /// Get the kind name of this value for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) | Self::UInt(_) | Self::Float(_) => "number",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Raw(_) => "raw",
            Self::Date(_) => "date",
            Self::Json(_) => "json",
        }
    }
}

/// Escape a single value for direct inclusion in a statement.
pub fn escape_value<E: Escaper + ?Sized>(value: &SqlValue, escaper: &E) -> AppResult<String> {
    match value {
        SqlValue::Int(v) => Ok(v.to_string()),
        SqlValue::UInt(v) => Ok(v.to_string()),
        SqlValue::Float(v) => escape_float(*v, escaper),
        SqlValue::Null => Ok("NULL".to_string()),
        SqlValue::List(items) => escape_list(items.iter(), escaper),
        SqlValue::Raw(raw) => Ok(raw.as_str().to_string()),
        SqlValue::Date(date) => {
            escaper.escape_literal(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        SqlValue::Bool(v) => escaper.escape_literal(if *v { "true" } else { "false" }),
        SqlValue::Text(text) => escaper.escape_literal(text),
        SqlValue::Json(json) => escape_json(json, escaper),
    }
}

fn escape_float<E: Escaper + ?Sized>(value: f64, escaper: &E) -> AppResult<String> {
    if value.is_finite() {
        return Ok(value.to_string());
    }
    // Bare `inf`/`NaN` words are not valid SQL; use PostgreSQL's float input syntax.
    let text = if value.is_nan() {
        "NaN"
    } else if value.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    };
    escaper.escape_literal(text)
}

fn escape_list<'a, E, I>(items: I, escaper: &E) -> AppResult<String>
where
    E: Escaper + ?Sized,
    I: Iterator<Item = &'a SqlValue>,
{
    let parts = items
        .map(|item| escape_value(item, escaper))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(", ")))
}

fn escape_json<E: Escaper + ?Sized>(json: &JsonValue, escaper: &E) -> AppResult<String> {
    match json {
        JsonValue::Null => Ok("NULL".to_string()),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(v), _, _) => Ok(v.to_string()),
            (None, Some(v), _) => Ok(v.to_string()),
            (None, None, Some(v)) => escape_float(v, escaper),
            _ => escaper.escape_literal(&n.to_string()),
        },
        JsonValue::Array(items) => {
            let parts = items
                .iter()
                .map(|item| escape_json(item, escaper))
                .collect::<AppResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(", ")))
        }
        JsonValue::Object(_) => escaper.escape_literal(&serde_json::to_string(json)?),
        JsonValue::String(text) => escaper.escape_literal(text),
        JsonValue::Bool(v) => escaper.escape_literal(if *v { "true" } else { "false" }),
    }
}

macro_rules! impl_from_int {
    ($variant:ident as $target:ty: $($t:ty),+) => {
        $(
            impl From<$t> for SqlValue {
                fn from(v: $t) -> Self {
                    SqlValue::$variant(v as $target)
                }
            }
        )+
    };
}

impl_from_int!(Int as i64: i8, i16, i32, i64, isize);
impl_from_int!(UInt as u64: u8, u16, u32, u64, usize);

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(v as f64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<RawSql> for SqlValue {
    fn from(v: RawSql) -> Self {
        SqlValue::Raw(v)
    }
}

impl From<&RawSql> for SqlValue {
    fn from(v: &RawSql) -> Self {
        SqlValue::Raw(v.clone())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Date(v.and_utc())
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for SqlValue {
    fn from(v: Vec<T>) -> Self {
        SqlValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue> + Clone> From<&[T]> for SqlValue {
    fn from(v: &[T]) -> Self {
        SqlValue::List(v.iter().cloned().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn esc(value: impl Into<SqlValue>) -> String {
        escape_value(&value.into(), &PgEscaper).unwrap()
    }

    #[test]
    fn test_numbers_are_verbatim() {
        assert_eq!(esc(5), "5");
        assert_eq!(esc(-12i64), "-12");
        assert_eq!(esc(u64::MAX), "18446744073709551615");
        assert_eq!(esc(1.5), "1.5");
        assert_eq!(esc(2.0), "2");
    }

    #[test]
    fn test_non_finite_floats_are_quoted() {
        assert_eq!(esc(f64::NAN), "'NaN'");
        assert_eq!(esc(f64::INFINITY), "'Infinity'");
        assert_eq!(esc(f64::NEG_INFINITY), "'-Infinity'");
    }

    #[test]
    fn test_null() {
        assert_eq!(esc(SqlValue::Null), "NULL");
        assert_eq!(esc(None::<i32>), "NULL");
        assert_eq!(esc(json!(null)), "NULL");
    }

    #[test]
    fn test_list_escapes_each_element() {
        assert_eq!(esc(vec![1, 2, 3]), "(1, 2, 3)");
        assert_eq!(esc(vec!["a", "b'c"]), "('a', 'b''c')");
        let nested = SqlValue::List(vec![SqlValue::Null, SqlValue::List(vec![1.into()])]);
        assert_eq!(esc(nested), "(NULL, (1))");
    }

    #[test]
    fn test_raw_passes_through() {
        assert_eq!(esc(RawSql::new("NOW()")), "NOW()");
    }

    #[test]
    fn test_date_is_iso_literal() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(esc(date), "'2024-01-02T03:04:05.000Z'");
    }

    #[test]
    fn test_object_is_json_literal() {
        assert_eq!(esc(json!({"a": 1})), "'{\"a\":1}'");
        assert_eq!(esc(json!({"q": "it's"})), "'{\"q\":\"it''s\"}'");
    }

    #[test]
    fn test_json_scalars_follow_dispatch() {
        assert_eq!(esc(json!(7)), "7");
        assert_eq!(esc(json!(0.25)), "0.25");
        assert_eq!(esc(json!([1, "x"])), "(1, 'x')");
        assert_eq!(esc(json!("text")), "'text'");
        assert_eq!(esc(json!(true)), "'true'");
    }

    #[test]
    fn test_fallback_text() {
        assert_eq!(esc("hello"), "'hello'");
        assert_eq!(esc(false), "'false'");
        assert_eq!(esc("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_backslash_uses_escape_string_syntax() {
        assert_eq!(esc("a\\b"), " E'a\\\\b'");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(PgEscaper.escape_identifier("users").unwrap(), "\"users\"");
        assert_eq!(PgEscaper.escape_identifier("a\"b").unwrap(), "\"a\"\"b\"");
    }

    #[test]
    fn test_nul_byte_is_rejected() {
        let err = escape_value(&"a\0b".into(), &PgEscaper).unwrap_err();
        assert!(matches!(err, AppError::Escape { kind: "literal", .. }));
        assert!(PgEscaper.escape_identifier("x\0").is_err());
    }

    #[test]
    fn test_json_helper_serializes_structs() {
        #[derive(serde::Serialize)]
        struct Tag {
            name: &'static str,
        }
        let value = SqlValue::json(&Tag { name: "x" }).unwrap();
        assert_eq!(value.kind(), "json");
        assert_eq!(esc(value), "'{\"name\":\"x\"}'");
    }
}
