//! Units of work.
//!
//! - [`context`]: the transaction handed to handlers and the shared lifecycle
//! - [`request`]: the HTTP request wrapper
//! - [`action`]: the background action wrapper

pub mod action;
pub mod context;
pub mod request;

pub use action::{run_action, spawn_action};
pub use context::{Transaction, TransactionState, run_in_transaction};
pub use request::{Reply, RequestContext, map_reply, run_request, transactional};
