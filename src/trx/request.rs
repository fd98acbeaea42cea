//! Transactional request wrapper.
//!
//! [`transactional`] turns a handler `(transaction, request) -> Reply` into an
//! axum handler. Each request leases its own connection, runs inside
//! BEGIN/COMMIT (or ROLLBACK on any failure), releases the connection, and
//! maps the outcome to a response:
//!
//! 1. any failure becomes a bare `500`
//! 2. a number (or numeric string) becomes a bare status code
//! 3. a response produced by the handler is sent as is
//! 4. any other non-empty value is sent as a JSON body with `200`
//! 5. otherwise a bare `200`

use crate::auth::AuthenticatedUser;
use crate::db::ConnectionPool;
use crate::error::{AppError, AppResult};
use crate::trx::context::{Transaction, run_in_transaction};
use axum::Json;
use axum::body::{Bytes, to_bytes};
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Upper bound on buffered request bodies.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// What a handler sees of the inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Path parameters by name; empty when the route has none.
    pub params: HashMap<String, String>,
    /// Parsed JSON body, `Null` when the request had no body.
    pub body: JsonValue,
    pub user: Option<AuthenticatedUser>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            params: HashMap::new(),
            body: JsonValue::Null,
            user: None,
        }
    }
}

impl RequestContext {
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = body;
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// A path parameter the route guarantees; missing means a routing bug.
    pub fn require_param(&self, name: &str) -> AppResult<&str> {
        self.param(name)
            .ok_or_else(|| AppError::invalid_input(format!("missing path parameter '{name}'")))
    }

    /// Deserialize the JSON body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.body.clone()).map_err(Into::into)
    }
}

impl<S> FromRequest<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
        {
            Ok(Path(params)) => params,
            Err(_) => HashMap::new(),
        };

        let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
            warn!(error = %e, "Failed to read request body");
            StatusCode::PAYLOAD_TOO_LARGE.into_response()
        })?;

        Ok(Self {
            body: parse_body(&bytes)?,
            user: parts.extensions.get::<AuthenticatedUser>().cloned(),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            params,
        })
    }
}

fn parse_body(bytes: &Bytes) -> Result<JsonValue, Response> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonValue::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| {
        warn!(error = %e, "Rejected malformed JSON body");
        StatusCode::BAD_REQUEST.into_response()
    })
}

/// What a handler produces on success.
#[derive(Debug)]
pub enum Reply {
    /// A value to serialize, or a number to use as a bare status code.
    Value(JsonValue),
    /// A response the handler built itself.
    Response(Response),
    /// Nothing to send beyond a bare `200`.
    Empty,
}

impl Reply {
    /// Serialize `value` into a JSON reply.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> AppResult<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// A bare status code.
    pub fn status(code: StatusCode) -> Self {
        Self::Value(JsonValue::from(code.as_u16()))
    }
}

impl From<JsonValue> for Reply {
    fn from(value: JsonValue) -> Self {
        Self::Value(value)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<StatusCode> for Reply {
    fn from(code: StatusCode) -> Self {
        Self::status(code)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Map a unit-of-work outcome to the HTTP response.
pub fn map_reply(outcome: AppResult<Reply>) -> Response {
    match outcome {
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Ok(Reply::Value(value)) => map_value(value),
        Ok(Reply::Response(response)) => response,
        Ok(Reply::Empty) => StatusCode::OK.into_response(),
    }
}

fn map_value(value: JsonValue) -> Response {
    if let Some(number) = coerce_status(&value) {
        return status_response(number);
    }
    if is_falsy(&value) {
        return StatusCode::OK.into_response();
    }
    Json(value).into_response()
}

/// The number a reply value stands for, if it is numeric.
///
/// Only JSON numbers and strings holding a finite number qualify; arrays,
/// objects, booleans, null and blank strings never do.
pub fn coerce_status(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

fn status_response(number: f64) -> Response {
    let code = (number.fract() == 0.0 && (100.0..=999.0).contains(&number))
        .then(|| StatusCode::from_u16(number as u16).ok())
        .flatten();
    match code {
        Some(code) => code.into_response(),
        None => {
            error!(status = number, "Handler returned an invalid status code");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn is_falsy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(b) => !b,
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Run one request as a unit of work and map its outcome.
pub async fn run_request<P, F>(pool: &P, ctx: RequestContext, handler: &F) -> Response
where
    P: ConnectionPool,
    F: for<'t> Fn(&'t mut Transaction<P::Connection>, RequestContext) -> BoxFuture<'t, AppResult<Reply>>
        + Sync,
{
    let method = ctx.method.clone();
    let path = ctx.uri.path().to_string();

    let outcome = run_in_transaction(pool, |trx| handler(trx, ctx)).await;
    if let Err(e) = &outcome {
        error!(%method, %path, error = %e, "Request failed");
    }
    map_reply(outcome)
}

/// Wrap a handler into an axum handler that runs each request in its own
/// transaction.
///
/// The unit of work runs on its own task. If the client disconnects and axum
/// drops the handler future, the transaction still ends in COMMIT or ROLLBACK
/// and the connection is released.
///
/// ```ignore
/// Router::new().route(
///     "/ping",
///     get(transactional(pool, |_trx, _req| {
///         Box::pin(async { Reply::json(&json!({ "pong": true })) })
///     })),
/// )
/// ```
pub fn transactional<P, F>(
    pool: P,
    handler: F,
) -> impl Fn(RequestContext) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    P: ConnectionPool + Clone + 'static,
    F: for<'t> Fn(&'t mut Transaction<P::Connection>, RequestContext) -> BoxFuture<'t, AppResult<Reply>>
        + Send
        + Sync
        + 'static,
{
    let handler = Arc::new(handler);
    move |ctx: RequestContext| {
        let pool = pool.clone();
        let handler = Arc::clone(&handler);
        let response: BoxFuture<'static, Response> = Box::pin(async move {
            let task =
                tokio::spawn(async move { run_request(&pool, ctx, handler.as_ref()).await });
            match task.await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Request task failed");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        });
        response
    }
}
