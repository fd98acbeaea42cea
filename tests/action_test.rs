//! Integration tests for the background action wrapper.

mod common;

use common::FakePool;
use trx_server::error::AppError;
use trx_server::sql::SqlTemplate;
use trx_server::trx::{run_action, spawn_action};

#[tokio::test]
async fn test_action_commits() {
    let pool = FakePool::new();

    let committed = run_action(&pool, "cleanup", |trx| {
        Box::pin(async move {
            trx.sql(SqlTemplate::new("DELETE FROM sessions")).await?;
            Ok(())
        })
    })
    .await;

    assert!(committed);
    assert_eq!(
        pool.statements(),
        vec!["BEGIN", "DELETE FROM sessions", "COMMIT"]
    );
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn test_action_failure_is_logged_not_raised() {
    let pool = FakePool::new();

    let committed = run_action(&pool, "failing", |_trx| {
        Box::pin(async { Err(AppError::internal("nope")) })
    })
    .await;

    assert!(!committed);
    assert_eq!(pool.statements(), vec!["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.releases(), 1);
}

#[tokio::test]
async fn test_action_without_connection() {
    let pool = FakePool::unreachable();

    let committed = run_action(&pool, "orphan", |_trx| Box::pin(async { Ok(()) })).await;

    assert!(!committed);
    assert_eq!(pool.releases(), 0);
}

#[tokio::test]
async fn test_spawned_action_runs_in_background() {
    let pool = FakePool::new().fail_on("missing_table");

    let ok = spawn_action(pool.clone(), "ok", |trx| {
        Box::pin(async move {
            trx.sql(SqlTemplate::new("SELECT 1")).await?;
            Ok(())
        })
    });
    let failed = spawn_action(pool.clone(), "failed", |trx| {
        Box::pin(async move {
            trx.sql(SqlTemplate::new("SELECT * FROM missing_table")).await?;
            Ok(())
        })
    });

    assert!(ok.await.unwrap());
    assert!(!failed.await.unwrap());
    assert_eq!(pool.connects(), 2);
    assert_eq!(pool.releases(), 2);
    assert_eq!(pool.executed("COMMIT"), 1);
    assert_eq!(pool.executed("ROLLBACK"), 1);
}
