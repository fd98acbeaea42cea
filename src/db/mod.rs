//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection leasing through the pool traits
//! - The sqlx-backed PostgreSQL pool
//! - Row to JSON conversion

pub mod pool;
pub mod types;

pub use pool::{Connection, ConnectionPool, PgConnectionPool, PgPooledConnection};
pub use types::{JsonRow, RowToJson};
