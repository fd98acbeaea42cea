//! Transaction context and the unit-of-work lifecycle.
//!
//! A [`Transaction`] owns one leased connection for the duration of a single
//! request or action. Statement building goes through the same connection's
//! escaping primitives, and BEGIN/COMMIT/ROLLBACK are driven only by
//! [`run_in_transaction`], so handlers can never end the unit of work early.

use crate::db::{Connection, ConnectionPool};
use crate::error::{AppError, AppResult};
use crate::models::QueryResult;
use crate::sql::{self, ColumnValues, RawSql, SqlTemplate, SqlValue};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value as JsonValue};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Connection leased, BEGIN not yet issued.
    Idle,
    Active,
    Committed,
    RolledBack,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// A leased connection plus the statement builders bound to it.
pub struct Transaction<C: Connection> {
    conn: C,
    state: TransactionState,
}

impl<C: Connection> std::fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Transaction<C> {
    pub(crate) fn new(conn: C) -> Self {
        Self {
            conn,
            state: TransactionState::Idle,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Render a template with this connection's escaper and execute it.
    ///
    /// Every value node is escaped; only [`RawSql`] values produced by the
    /// builder methods pass through untouched.
    pub async fn sql(&mut self, template: SqlTemplate) -> AppResult<QueryResult> {
        let statement = template.render(&self.conn)?;
        self.conn.query(&statement).await
    }

    /// Compose a statement from template-literal shaped input and execute it.
    pub async fn compose(
        &mut self,
        parts: &[&'static str],
        values: Vec<SqlValue>,
    ) -> AppResult<QueryResult> {
        let template = SqlTemplate::from_parts(parts, values)?;
        self.sql(template).await
    }

    pub fn identifier(&self, name: &str) -> AppResult<RawSql> {
        sql::identifier(name, &self.conn)
    }

    pub fn column_list<I, S>(&self, names: I) -> AppResult<RawSql>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sql::column_list(names, &self.conn)
    }

    /// Column list from the keys of a JSON object.
    pub fn column_list_of(&self, object: &Map<String, JsonValue>) -> AppResult<RawSql> {
        sql::column_list_of(object, &self.conn)
    }

    pub fn insert(&self, pairs: &ColumnValues) -> AppResult<RawSql> {
        sql::insert_fragment(pairs, &self.conn)
    }

    pub fn update(&self, pairs: &ColumnValues) -> AppResult<RawSql> {
        sql::update_fragment(pairs, &self.conn)
    }

    pub fn escaped(&self, value: impl Into<SqlValue>) -> AppResult<RawSql> {
        sql::escaped(value, &self.conn)
    }

    /// Trusted SQL text, spliced without escaping.
    pub fn raw(&self, text: impl Into<String>) -> RawSql {
        sql::raw(text)
    }

    async fn control(&mut self, statement: &'static str) -> AppResult<()> {
        debug!(statement, "Transaction control");
        self.conn.query(statement).await.map(|_| ())
    }

    pub(crate) async fn begin(&mut self) -> AppResult<()> {
        if self.state != TransactionState::Idle {
            return Err(AppError::internal(format!(
                "cannot begin a transaction that is {}",
                self.state
            )));
        }
        self.control("BEGIN").await?;
        self.state = TransactionState::Active;
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> AppResult<()> {
        if self.state != TransactionState::Active {
            return Err(AppError::internal(format!(
                "cannot commit a transaction that is {}",
                self.state
            )));
        }
        self.control("COMMIT").await?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> AppResult<()> {
        if self.state != TransactionState::Active {
            return Ok(());
        }
        let result = self.control("ROLLBACK").await;
        // The server discards the transaction even if the statement errors.
        self.state = TransactionState::RolledBack;
        result
    }

    /// Roll back, logging instead of returning a failure.
    async fn rollback_logged(&mut self) {
        if let Err(e) = self.rollback().await {
            error!(error = %e, "ROLLBACK failed");
        }
    }

    /// Hand the connection back to its pool.
    ///
    /// A session still inside a transaction is dropped instead, which closes
    /// it rather than recycling it.
    pub(crate) async fn release(self) {
        if self.state == TransactionState::Active {
            warn!("Discarding connection with an open transaction");
            drop(self.conn);
            return;
        }
        self.conn.release().await;
    }

    /// BEGIN, run `work`, then COMMIT or ROLLBACK. Never releases.
    async fn execute<T, F>(&mut self, work: F) -> AppResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction<C>) -> BoxFuture<'t, AppResult<T>> + Send,
    {
        self.begin().await?;

        let outcome = AssertUnwindSafe(async { work(self).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(AppError::internal(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match outcome {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback_logged().await;
                    Err(e)
                }
            },
            Err(e) => {
                self.rollback_logged().await;
                Err(e)
            }
        }
    }
}

/// Run `work` as one unit of work on a freshly leased connection.
///
/// The connection is released exactly once on every path after a successful
/// lease. A lease failure returns before anything needs releasing.
pub async fn run_in_transaction<P, T, F>(pool: &P, work: F) -> AppResult<T>
where
    P: ConnectionPool,
    T: Send,
    F: for<'t> FnOnce(&'t mut Transaction<P::Connection>) -> BoxFuture<'t, AppResult<T>> + Send,
{
    let conn = pool.connect().await?;
    let mut trx = Transaction::new(conn);
    let outcome = trx.execute(work).await;
    trx.release().await;
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Escaper, PgEscaper};
    use std::sync::{Arc, Mutex};

    /// Connection that records statements into a shared log.
    struct LogConnection {
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl Escaper for LogConnection {
        fn escape_literal(&self, text: &str) -> AppResult<String> {
            PgEscaper.escape_literal(text)
        }

        fn escape_identifier(&self, name: &str) -> AppResult<String> {
            PgEscaper.escape_identifier(name)
        }
    }

    impl Connection for LogConnection {
        async fn query(&mut self, sql: &str) -> AppResult<QueryResult> {
            self.log.lock().unwrap().push(sql.to_string());
            if self.fail_on.is_some_and(|needle| sql.contains(needle)) {
                return Err(AppError::database("boom", None));
            }
            Ok(QueryResult::empty())
        }

        async fn release(self) {
            self.log.lock().unwrap().push("<release>".to_string());
        }
    }

    fn connection(fail_on: Option<&'static str>) -> (LogConnection, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            LogConnection {
                log: Arc::clone(&log),
                fail_on,
            },
            log,
        )
    }

    fn explode(message: &'static str) -> AppResult<()> {
        panic!("{message}")
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (conn, log) = connection(None);
        let mut trx = Transaction::new(conn);
        assert_eq!(trx.state(), TransactionState::Idle);
        assert!(trx.commit().await.is_err());

        trx.begin().await.unwrap();
        assert_eq!(trx.state(), TransactionState::Active);
        assert!(trx.begin().await.is_err());

        trx.commit().await.unwrap();
        assert_eq!(trx.state(), TransactionState::Committed);
        // Nothing to roll back once committed.
        trx.rollback().await.unwrap();
        trx.release().await;

        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "COMMIT", "<release>"]);
    }

    #[tokio::test]
    async fn test_execute_commits_on_success() {
        let (conn, log) = connection(None);
        let mut trx = Transaction::new(conn);
        let value = trx
            .execute(|trx| {
                Box::pin(async move {
                    trx.sql(SqlTemplate::new("SELECT 1")).await?;
                    Ok(7)
                })
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "SELECT 1", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_execute_rolls_back_on_statement_failure() {
        let (conn, log) = connection(Some("broken"));
        let mut trx = Transaction::new(conn);
        let result: AppResult<()> = trx
            .execute(|trx| {
                Box::pin(async move {
                    trx.sql(SqlTemplate::new("SELECT broken")).await?;
                    Ok(())
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(trx.state(), TransactionState::RolledBack);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["BEGIN", "SELECT broken", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_execute_rolls_back_when_commit_fails() {
        let (conn, log) = connection(Some("COMMIT"));
        let mut trx = Transaction::new(conn);
        let result = trx.execute(|_| Box::pin(async { Ok(()) })).await;
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_execute_catches_panic() {
        let (conn, log) = connection(None);
        let mut trx = Transaction::new(conn);
        let result: AppResult<()> = trx
            .execute(|_| Box::pin(async { explode("kaboom") }))
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_begin_failure_skips_handler() {
        let (conn, log) = connection(Some("BEGIN"));
        let mut trx = Transaction::new(conn);
        let result: AppResult<()> = trx
            .execute(|_| Box::pin(async { explode("handler must not run") }))
            .await;
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN"]);
    }

    #[tokio::test]
    async fn test_builders_use_connection_escaper() {
        let (conn, log) = connection(None);
        let mut trx = Transaction::new(conn);
        let table = trx.identifier("generic").unwrap();
        let pairs = ColumnValues::new().set("message", "it's");
        let insert = trx.insert(&pairs).unwrap();
        trx.sql(
            SqlTemplate::new("INSERT INTO ")
                .value(table)
                .text(" ")
                .value(insert),
        )
        .await
        .unwrap();
        trx.compose(&["SELECT * FROM t WHERE id = ", ""], vec![SqlValue::from(5)])
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "INSERT INTO \"generic\" (\"message\") VALUES ('it''s')",
                "SELECT * FROM t WHERE id = 5",
            ]
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(3);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
