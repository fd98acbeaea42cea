//! Request interceptor pipeline.
//!
//! Interceptors run in the order they were added. Each either lets the
//! request continue (possibly after annotating it) or answers it directly,
//! which skips every later interceptor and the route handler.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one interceptor.
#[derive(Debug)]
pub enum Flow {
    Continue,
    Respond(Response),
}

/// A step in the [`Pipeline`].
pub trait Interceptor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn intercept<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Flow>;
}

/// Ordered list of interceptors.
#[derive(Clone, Default)]
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| i.name()))
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor to the end of the pipeline.
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run interceptors in order, stopping at the first that responds.
    pub async fn run(&self, request: &mut Request) -> Flow {
        for interceptor in &self.interceptors {
            if let Flow::Respond(response) = interceptor.intercept(request).await {
                debug!(
                    interceptor = interceptor.name(),
                    status = %response.status(),
                    "Request short-circuited"
                );
                return Flow::Respond(response);
            }
        }
        Flow::Continue
    }
}

/// axum middleware running a pipeline in front of the inner service.
///
/// Install with `axum::middleware::from_fn_with_state(Arc::new(pipeline), run_pipeline)`.
pub async fn run_pipeline(
    State(pipeline): State<Arc<Pipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    match pipeline.run(&mut request).await {
        Flow::Continue => next.run(request).await,
        Flow::Respond(response) => response,
    }
}
