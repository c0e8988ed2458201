//! Per-request middleware run before generation

use crate::request::Request;
use async_trait::async_trait;
use tracing::trace;

/// Name of the alternate generator selected by [`DebugMiddleware`]
pub const DEBUG_OUTCOME: &str = "debug";

/// What the pipeline does after a middleware ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Abandon the cycle; the connection is closed without a response
    Drop,
}

/// Inspects or rewrites a request before its handler generates a response.
///
/// Middleware may select an alternate generator through
/// [`Request::set_alternate_outcome`] or drop the request entirely.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: &mut Request) -> Flow;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Middleware from a synchronous closure
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut Request) -> Flow + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request) -> Flow + Send + Sync,
{
    async fn handle(&self, request: &mut Request) -> Flow {
        (self.f)(request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Selects the `debug` alternate for requests carrying a `debug` query
/// parameter. Installed by the server when debug mode is on.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugMiddleware;

#[async_trait]
impl Middleware for DebugMiddleware {
    async fn handle(&self, request: &mut Request) -> Flow {
        if request.query_param(DEBUG_OUTCOME).is_some() {
            trace!(path = %request.path(), "debug outcome requested");
            request.set_alternate_outcome(DEBUG_OUTCOME);
        }
        Flow::Continue
    }

    fn name(&self) -> &str {
        "debug"
    }
}
