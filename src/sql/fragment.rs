//! Trusted SQL fragments.
//!
//! A [`RawSql`] marks text that is already valid SQL and must not be escaped
//! again. The builders in this module are the only place untrusted names and
//! values become trusted fragments, so every identifier and literal they emit
//! has been through an [`Escaper`].

use crate::error::AppResult;
use crate::sql::escape::{Escaper, SqlValue, escape_value};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// SQL text that is spliced into statements verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawSql(String);

impl RawSql {
    /// Wrap text as trusted SQL without any escaping.
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered column/value pairs for INSERT and UPDATE fragments.
///
/// Insertion order is preserved and is the order columns appear in the
/// generated SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnValues {
    pairs: Vec<(String, SqlValue)>,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; builder style.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.pairs.push((column.into(), value.into()));
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(column, _)| column.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.pairs.iter().map(|(c, v)| (c.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for ColumnValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Build pairs from a JSON object, in the order its keys were inserted.
impl From<Map<String, JsonValue>> for ColumnValues {
    fn from(map: Map<String, JsonValue>) -> Self {
        map.into_iter().collect()
    }
}

/// Wrap arbitrary text as trusted SQL. The caller vouches for its safety.
pub fn raw(sql: impl Into<String>) -> RawSql {
    RawSql::new(sql)
}

/// Escape a single value once and mark the result as trusted.
///
/// A value that is already a [`RawSql`] is returned unchanged, so wrapping
/// twice never escapes twice.
pub fn escaped<E: Escaper + ?Sized>(value: impl Into<SqlValue>, escaper: &E) -> AppResult<RawSql> {
    match value.into() {
        SqlValue::Raw(raw) => Ok(raw),
        other => escape_value(&other, escaper).map(RawSql),
    }
}

/// Escape a table or column name.
///
/// `identifier("testName")` renders as `"testName"`.
pub fn identifier<E: Escaper + ?Sized>(name: &str, escaper: &E) -> AppResult<RawSql> {
    escaper.escape_identifier(name).map(RawSql)
}

/// Escape and comma-join column names, preserving input order.
///
/// `column_list(["foo", "bar"])` renders as `"foo", "bar"`.
pub fn column_list<E, I, S>(names: I, escaper: &E) -> AppResult<RawSql>
where
    E: Escaper + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let columns = names
        .into_iter()
        .map(|name| escaper.escape_identifier(name.as_ref()))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(RawSql(columns.join(", ")))
}

/// Column list taken from the keys of a JSON object, in insertion order.
pub fn column_list_of<E: Escaper + ?Sized>(
    object: &Map<String, JsonValue>,
    escaper: &E,
) -> AppResult<RawSql> {
    column_list(object.keys(), escaper)
}

/// `("a", "b") VALUES (1, 'x')`
pub fn insert_fragment<E: Escaper + ?Sized>(
    pairs: &ColumnValues,
    escaper: &E,
) -> AppResult<RawSql> {
    let columns = column_list(pairs.columns(), escaper)?;
    let values = pairs
        .iter()
        .map(|(_, value)| escape_value(value, escaper))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(RawSql(format!("({}) VALUES ({})", columns, values.join(", "))))
}

/// `"a" = 1, "b" = 'x'`
pub fn update_fragment<E: Escaper + ?Sized>(
    pairs: &ColumnValues,
    escaper: &E,
) -> AppResult<RawSql> {
    let assignments = pairs
        .iter()
        .map(|(column, value)| {
            Ok(format!(
                "{} = {}",
                escaper.escape_identifier(column)?,
                escape_value(value, escaper)?
            ))
        })
        .collect::<AppResult<Vec<_>>>()?;
    Ok(RawSql(assignments.join(", ")))
}
