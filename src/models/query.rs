//! Statement result model.

use crate::db::JsonRow;
use crate::error::AppResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Rows returned by one executed statement, in server order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<JsonRow>,
}

impl QueryResult {
    pub fn new(rows: Vec<JsonRow>) -> Self {
        Self { rows }
    }

    /// Create an empty result (for statements without a result set).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&JsonRow> {
        self.rows.first()
    }

    /// Deserialize the first row, if any.
    pub fn first_as<T: DeserializeOwned>(&self) -> AppResult<Option<T>> {
        self.rows
            .first()
            .map(|row| serde_json::from_value(JsonValue::Object(row.clone())))
            .transpose()
            .map_err(Into::into)
    }

    /// Deserialize every row.
    pub fn into_typed<T: DeserializeOwned>(self) -> AppResult<Vec<T>> {
        self.rows
            .into_iter()
            .map(|row| serde_json::from_value(JsonValue::Object(row)).map_err(Into::into))
            .collect()
    }

    /// Value of `column` in the first row.
    pub fn scalar(&self, column: &str) -> Option<&JsonValue> {
        self.rows.first().and_then(|row| row.get(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> JsonRow {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert!(result.first().is_none());
    }

    #[test]
    fn test_first_as() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Item {
            id: i64,
            name: String,
        }

        let result = QueryResult::new(vec![
            row(json!({"id": 1, "name": "a"})),
            row(json!({"id": 2, "name": "b"})),
        ]);
        let first: Option<Item> = result.first_as().unwrap();
        assert_eq!(
            first,
            Some(Item {
                id: 1,
                name: "a".to_string()
            })
        );
        assert_eq!(result.into_typed::<Item>().unwrap().len(), 2);
    }

    #[test]
    fn test_first_as_shape_mismatch() {
        let result = QueryResult::new(vec![row(json!({"id": "x"}))]);
        #[derive(Deserialize, Debug)]
        #[allow(dead_code)]
        struct Item {
            id: i64,
        }
        assert!(result.first_as::<Item>().is_err());
    }

    #[test]
    fn test_scalar() {
        let result = QueryResult::new(vec![row(json!({"count": 3}))]);
        assert_eq!(result.scalar("count"), Some(&json!(3)));
        assert_eq!(result.scalar("missing"), None);
    }
}
