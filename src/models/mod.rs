//! Data models.

pub mod generic;
pub mod query;

pub use generic::{Generic, GenericInput};
pub use query::QueryResult;
