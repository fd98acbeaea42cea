//! Example CRUD model over the `generic` table.
//!
//! ```sql
//! CREATE TABLE generic (
//!   _id serial PRIMARY KEY,
//!   message text NOT NULL,
//!   "updatedAt" timestamp DEFAULT NOW() NOT NULL,
//!   "createdAt" timestamp DEFAULT NOW() NOT NULL
//! );
//! ```
//!
//! The numeric `_id` never leaves this module: records are exposed with the
//! opaque id produced by [`IdCodec`].

use crate::db::Connection;
use crate::error::{AppError, AppResult};
use crate::id::IdCodec;
use crate::sql;
use crate::sql::{ColumnValues, RawSql};
use crate::trx::Transaction;
use serde::{Deserialize, Serialize};

/// Table name.
pub const TABLE: &str = "generic";

/// Every column, in response order.
pub const COLUMNS: [&str; 4] = ["_id", "message", "updatedAt", "createdAt"];

/// A record as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generic {
    #[serde(rename = "_id")]
    pub id: String,
    pub message: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Request body for create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericInput {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct GenericRow {
    _id: u64,
    message: String,
    #[serde(rename = "updatedAt")]
    updated_at: String,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl GenericRow {
    fn into_dto(self, codec: &IdCodec) -> Generic {
        Generic {
            id: codec.encode(self._id),
            message: self.message,
            updated_at: self.updated_at,
            created_at: self.created_at,
        }
    }
}

pub async fn create<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    input: &GenericInput,
) -> AppResult<Generic> {
    let table = trx.identifier(TABLE)?;
    let columns = trx.column_list(COLUMNS)?;
    let insert = trx.insert(&ColumnValues::new().set("message", input.message.as_str()))?;

    let result = trx
        .sql(sql!("INSERT INTO ", table, " ", insert, " RETURNING ", columns))
        .await?;

    result
        .first_as::<GenericRow>()?
        .map(|row| row.into_dto(codec))
        .ok_or_else(|| AppError::internal(format!("Could not create \"{TABLE}\" record")))
}

/// Look up a record by its opaque id. An id that does not decode is an error.
pub async fn find_by_id<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    id: &str,
) -> AppResult<Option<Generic>> {
    let key = codec.decode(id)?;
    let table = trx.identifier(TABLE)?;
    let columns = trx.column_list(COLUMNS)?;

    let result = trx
        .sql(sql!("SELECT ", columns, " FROM ", table, " WHERE _id = ", key))
        .await?;

    Ok(result.first_as::<GenericRow>()?.map(|row| row.into_dto(codec)))
}

pub async fn update_by_id<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    id: &str,
    input: &GenericInput,
) -> AppResult<Generic> {
    let key = codec.decode(id)?;
    let table = trx.identifier(TABLE)?;
    let columns = trx.column_list(COLUMNS)?;
    let changes = trx.update(
        &ColumnValues::new()
            .set("message", input.message.as_str())
            .set("updatedAt", RawSql::new("NOW()")),
    )?;

    let result = trx
        .sql(sql!(
            "UPDATE ", table, " SET ", changes, " WHERE _id = ", key, " RETURNING ", columns
        ))
        .await?;

    result
        .first_as::<GenericRow>()?
        .map(|row| row.into_dto(codec))
        .ok_or_else(|| AppError::not_found(TABLE, id))
}

/// Delete a record. Returns whether a row was removed.
pub async fn remove_by_id<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    id: &str,
) -> AppResult<bool> {
    let key = codec.decode(id)?;
    let table = trx.identifier(TABLE)?;

    let result = trx
        .sql(sql!("DELETE FROM ", table, " WHERE _id = ", key, " RETURNING _id"))
        .await?;

    Ok(!result.is_empty())
}

pub async fn count<C: Connection>(trx: &mut Transaction<C>) -> AppResult<i64> {
    let table = trx.identifier(TABLE)?;
    let result = trx
        .sql(sql!("SELECT COUNT(*) AS count FROM ", table))
        .await?;

    let value = result
        .scalar("count")
        .ok_or_else(|| AppError::internal(format!("COUNT on \"{TABLE}\" returned no rows")))?;
    // int8 may arrive as a number or, through text fallbacks, as a string.
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| AppError::internal(format!("unexpected COUNT value {value}")))
}
