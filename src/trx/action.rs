//! Action wrapper for work that runs outside an HTTP request.
//!
//! Same unit-of-work lifecycle as the request wrapper, without response
//! mapping. Failures are logged and swallowed; the caller only learns
//! whether the action committed.

use crate::db::ConnectionPool;
use crate::error::AppResult;
use crate::trx::context::{Transaction, run_in_transaction};
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Run `action` in its own transaction. Returns `true` if it committed.
pub async fn run_action<P, F>(pool: &P, name: &str, action: F) -> bool
where
    P: ConnectionPool,
    F: for<'t> FnOnce(&'t mut Transaction<P::Connection>) -> BoxFuture<'t, AppResult<()>> + Send,
{
    match run_in_transaction(pool, action).await {
        Ok(()) => {
            debug!(action = name, "Action committed");
            true
        }
        Err(e) => {
            error!(action = name, error = %e, "Action failed");
            false
        }
    }
}

/// Fire-and-forget variant of [`run_action`] on the tokio runtime.
pub fn spawn_action<P, F>(pool: P, name: impl Into<String>, action: F) -> JoinHandle<bool>
where
    P: ConnectionPool + 'static,
    F: for<'t> FnOnce(&'t mut Transaction<P::Connection>) -> BoxFuture<'t, AppResult<()>>
        + Send
        + 'static,
{
    let name = name.into();
    tokio::spawn(async move { run_action(&pool, &name, action).await })
}
