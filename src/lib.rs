//! Transactional HTTP API server for PostgreSQL.
//!
//! Every request runs in its own database transaction: a pooled connection
//! is leased, `BEGIN` is issued, the handler composes statements through an
//! escaping SQL builder bound to that connection, and the unit of work ends
//! in `COMMIT` or `ROLLBACK` before the connection goes back to the pool.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod middleware;
pub mod models;
pub mod server;
pub mod sql;
pub mod trx;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use trx::{Reply, RequestContext, Transaction, transactional};
