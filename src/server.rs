//! HTTP server: routes, layers and lifecycle.

use crate::auth::{AuthConfig, Authenticate, Protect};
use crate::db::{Connection, ConnectionPool};
use crate::db::types::format_timestamp;
use crate::error::{AppError, AppResult};
use crate::id::IdCodec;
use crate::middleware::{Pipeline, run_pipeline};
use crate::models::{GenericInput, generic};
use crate::trx::{Reply, RequestContext, Transaction, transactional};
use axum::Router;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Hardening headers added to every response unless a handler set them.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", "default-src 'self'; frame-ancestors 'self'; object-src 'none'"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Everything the routes need, constructed once at startup.
#[derive(Debug, Clone)]
pub struct AppState<P> {
    pub pool: P,
    pub codec: Arc<IdCodec>,
    pub auth: Arc<AuthConfig>,
    pub cors_permissive: bool,
}

impl<P: ConnectionPool + Clone + 'static> AppState<P> {
    pub fn new(pool: P, codec: IdCodec, auth: AuthConfig) -> Self {
        Self {
            pool,
            codec: Arc::new(codec),
            auth: Arc::new(auth),
            cors_permissive: false,
        }
    }

    pub fn with_permissive_cors(mut self, enabled: bool) -> Self {
        self.cors_permissive = enabled;
        self
    }
}

/// Wrap a `(trx, codec, request)` handler so the codec from state is passed in.
macro_rules! with_codec {
    ($state:expr, $handler:ident) => {{
        let codec = Arc::clone(&$state.codec);
        transactional($state.pool.clone(), move |trx, req| {
            let codec = Arc::clone(&codec);
            Box::pin(async move { $handler(trx, &codec, req).await })
        })
    }};
}

/// Build the application router.
pub fn build_router<P>(state: AppState<P>) -> Router
where
    P: ConnectionPool + Clone + 'static,
{
    let protect = Arc::new(Pipeline::new().with(Protect));
    let authenticate = Arc::new(Pipeline::new().with(Authenticate::new(Arc::clone(&state.auth))));
    let guard = || from_fn_with_state(Arc::clone(&protect), run_pipeline);

    let router = Router::new()
        .route(
            "/ping",
            get(transactional(state.pool.clone(), |trx, req| {
                Box::pin(ping(trx, req))
            })),
        )
        .route(
            "/generic",
            get(transactional(state.pool.clone(), |trx, _req| {
                Box::pin(count_generic(trx))
            }))
            .merge(post(with_codec!(state, create_generic)).route_layer(guard())),
        )
        .route(
            "/generic/{id}",
            get(with_codec!(state, read_generic)).merge(
                put(with_codec!(state, update_generic))
                    .delete(with_codec!(state, delete_generic))
                    .route_layer(guard()),
            ),
        )
        .layer(from_fn_with_state(authenticate, run_pipeline));

    let router = with_security_headers(router).layer(TraceLayer::new_for_http());

    if state.cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

fn with_security_headers(router: Router) -> Router {
    SECURITY_HEADERS.iter().fold(router, |router, &(name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ))
    })
}

async fn ping<C: Connection>(_trx: &mut Transaction<C>, _req: RequestContext) -> AppResult<Reply> {
    Reply::json(&json!({ "pong": true, "time": format_timestamp(Utc::now()) }))
}

async fn count_generic<C: Connection>(trx: &mut Transaction<C>) -> AppResult<Reply> {
    let count = generic::count(trx).await?;
    Reply::json(&json!({ "count": count }))
}

async fn read_generic<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    req: RequestContext,
) -> AppResult<Reply> {
    let record = generic::find_by_id(trx, codec, req.require_param("id")?).await?;
    record.map(|r| Reply::json(&r)).transpose().map(Reply::from)
}

async fn create_generic<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    req: RequestContext,
) -> AppResult<Reply> {
    let input: GenericInput = req.body_as()?;
    let record = generic::create(trx, codec, &input).await?;
    Reply::json(&record)
}

async fn update_generic<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    req: RequestContext,
) -> AppResult<Reply> {
    let input: GenericInput = req.body_as()?;
    let record = generic::update_by_id(trx, codec, req.require_param("id")?, &input).await?;
    Reply::json(&record)
}

async fn delete_generic<C: Connection>(
    trx: &mut Transaction<C>,
    codec: &IdCodec,
    req: RequestContext,
) -> AppResult<Reply> {
    let removed = generic::remove_by_id(trx, codec, req.require_param("id")?).await?;
    Ok(Reply::status(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }))
}

/// Bind `bind_addr` and serve until SIGINT/SIGTERM.
///
/// In-flight requests get [`GRACEFUL_TIMEOUT`] to finish once a signal
/// arrives; a second signal exits immediately.
pub async fn serve(router: Router, bind_addr: &str) -> AppResult<()> {
    let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
        AppError::internal(format!("Failed to bind to {}: {}", bind_addr, e))
    })?;
    info!(addr = %bind_addr, "Listening for HTTP traffic");

    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();
    let shutdown_signal = async move {
        wait_for_signal().await;
        shutdown_notify_clone.notify_one();
    };

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal);

    tokio::select! {
        result = server => {
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => {
                    error!(error = %e, "HTTP server error");
                    return Err(AppError::internal(format!("HTTP server error: {}", e)));
                }
            }
        }
        _ = async {
            shutdown_notify.notified().await;
            info!(
                timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                "Waiting for in-flight requests (send signal again to force exit)..."
            );

            tokio::select! {
                _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                    warn!("Graceful shutdown timeout, forcing exit");
                }
                _ = wait_for_signal() => {
                    warn!("Received second signal, forcing immediate exit");
                }
            }
        } => {}
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
