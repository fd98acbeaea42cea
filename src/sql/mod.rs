//! SQL composition layer.
//!
//! This module provides the pieces that turn structured data into statement text:
//! - Value escaping with type dispatch
//! - Trusted raw fragments and the identifier/column/INSERT/UPDATE builders
//! - Statement templates with interpolated values
//! - The `sql!` template macro

pub mod escape;
pub mod fragment;
#[macro_use]
pub mod macros;
pub mod template;

pub use escape::{Escaper, PgEscaper, SqlValue, escape_value};
pub use fragment::{
    ColumnValues, RawSql, column_list, column_list_of, escaped, identifier, insert_fragment, raw,
    update_fragment,
};
pub use template::{Node, SqlTemplate};
