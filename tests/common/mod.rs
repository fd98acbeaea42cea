//! Shared test helpers: a recording in-memory connection pool.

#![allow(dead_code)]

use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use trx_server::db::{Connection, ConnectionPool};
use trx_server::error::{AppError, AppResult};
use trx_server::models::QueryResult;
use trx_server::sql::Escaper;

#[derive(Default)]
struct FakeState {
    statements: Mutex<Vec<String>>,
    connects: AtomicUsize,
    releases: AtomicUsize,
    discards: AtomicUsize,
    fail_connect: AtomicBool,
    fail_patterns: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, QueryResult)>>,
}

/// Pool whose connections record every statement instead of talking to a
/// database. Statements matching a failure pattern return an error; those
/// matching a response pattern return the scripted rows.
#[derive(Clone, Default)]
pub struct FakePool {
    state: Arc<FakeState>,
}

impl FakePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool that cannot hand out connections.
    pub fn unreachable() -> Self {
        let pool = Self::new();
        pool.state.fail_connect.store(true, Ordering::SeqCst);
        pool
    }

    /// Fail any statement containing `pattern`.
    pub fn fail_on(self, pattern: &str) -> Self {
        self.state
            .fail_patterns
            .lock()
            .unwrap()
            .push(pattern.to_string());
        self
    }

    /// Answer statements containing `pattern` with `rows` (JSON objects).
    pub fn respond(self, pattern: &str, rows: Vec<JsonValue>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                JsonValue::Object(map) => map,
                other => panic!("scripted row must be an object, got {other}"),
            })
            .collect();
        self.state
            .responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), QueryResult::new(rows)));
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.statements.lock().unwrap().clone()
    }

    /// How many times exactly `statement` was executed.
    pub fn executed(&self, statement: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.as_str() == statement)
            .count()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Connections dropped without `release`, i.e. closed instead of recycled.
    pub fn discards(&self) -> usize {
        self.state.discards.load(Ordering::SeqCst)
    }
}

impl ConnectionPool for FakePool {
    type Connection = FakeConnection;

    async fn connect(&self) -> AppResult<FakeConnection> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(AppError::connection(
                "pool exhausted",
                "raise max_connections",
            ));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
            released: false,
        })
    }
}

pub struct FakeConnection {
    state: Arc<FakeState>,
    released: bool,
}

/// Identifiers in double quotes, literals in single quotes; embedded quote
/// characters are doubled.
impl Escaper for FakeConnection {
    fn escape_literal(&self, text: &str) -> AppResult<String> {
        Ok(format!("'{}'", text.replace('\'', "''")))
    }

    fn escape_identifier(&self, name: &str) -> AppResult<String> {
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

impl Connection for FakeConnection {
    async fn query(&mut self, sql: &str) -> AppResult<QueryResult> {
        self.state.statements.lock().unwrap().push(sql.to_string());

        let failing = self
            .state
            .fail_patterns
            .lock()
            .unwrap()
            .iter()
            .any(|p| sql.contains(p.as_str()));
        if failing {
            return Err(AppError::database(
                format!("scripted failure for: {sql}"),
                Some("XX000".to_string()),
            ));
        }

        let response = self
            .state
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, result)| result.clone());
        Ok(response.unwrap_or_default())
    }

    async fn release(mut self) {
        self.released = true;
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if !self.released {
            self.state.discards.fetch_add(1, Ordering::SeqCst);
        }
    }
}
