//! The request pipeline.
//!
//! A [`Worker`] runs one connection at a time through
//! parse → route → validate → cache-check → generate → post-process →
//! encode → write → close. Per-request failures end in a response (or a
//! deliberate drop) and never escape the cycle.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::Flow;
use crate::request::Request;
use crate::response::{Body, Response};
use crate::session;
use crate::Status;
use bytes::Bytes;
use futures_util::FutureExt;
use kiln_compression::{ReusableGzip, accepts_gzip, content_md5};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, trace, warn};

/// Internal redirects followed within one cycle
pub const MAX_REDIRECTS: usize = 8;

const SERVER_NAME: &str = "kiln";
const RESPONSE_CACHE: &str = "responses";

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A response with this status was written
    Responded(u16),
    /// Middleware dropped the request; nothing was written
    Dropped,
}

enum Generated {
    Response(Response),
    Declined,
    Dropped,
    Failed(Error),
}

/// A pooled pipeline runner owning its compressor
#[derive(Debug)]
pub struct Worker {
    id: usize,
    gzip: ReusableGzip,
    cycles: u64,
}

impl Worker {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            gzip: ReusableGzip::new(),
            cycles: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Clear per-cycle state before going back to the pool
    pub(crate) fn recycle(&mut self) {
        self.gzip.reset();
        self.cycles += 1;
    }

    /// Serve one connection: parse a request, answer it and close.
    pub async fn serve<S>(&mut self, engine: &Engine, stream: S, peer: Option<SocketAddr>) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.serve_connection(engine, stream, peer, false).await
    }

    /// [`Worker::serve`] for a stream whose TLS session is already established
    pub async fn serve_secure<S>(&mut self, engine: &Engine, stream: S, peer: Option<SocketAddr>) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.serve_connection(engine, stream, peer, true).await
    }

    async fn serve_connection<S>(
        &mut self,
        engine: &Engine,
        stream: S,
        peer: Option<SocketAddr>,
        secure: bool,
    ) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let parsed = engine.parser().parse(&mut reader, peer).await;
        engine.metrics().observe_read(started.elapsed());

        let outcome = match parsed {
            Ok(Some(mut request)) => {
                request.set_secure(secure);
                self.handle(engine, &mut request, &mut write_half).await?
            }
            Ok(None) => {
                debug!(worker = self.id, peer = ?peer, "empty request");
                return Ok(Outcome::Dropped);
            }
            Err(Error::Protocol(violation)) => {
                debug!(worker = self.id, peer = ?peer, %violation, "protocol violation");
                engine.metrics().record_protocol_violation(violation.kind());
                let response = Response::status_only(violation.status());
                let status = self
                    .write_response(engine, response, false, false, &mut write_half)
                    .await?;
                Outcome::Responded(status)
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = write_half.shutdown().await {
            trace!(worker = self.id, error = %err, "shutdown after response failed");
        }
        if let Outcome::Responded(status) = outcome {
            engine.metrics().record_request(status, started.elapsed());
        }
        Ok(outcome)
    }

    /// Run a parsed request through the pipeline and write the response.
    ///
    /// The request is invalid afterwards; handing it in again fails with
    /// [`Error::InvalidRequest`] before any handler runs.
    pub async fn handle<W>(&mut self, engine: &Engine, request: &mut Request, out: &mut W) -> Result<Outcome>
    where
        W: AsyncWrite + Unpin,
    {
        if !request.is_valid() {
            return Err(Error::InvalidRequest);
        }

        let Some(mut response) = self.respond(engine, request).await else {
            request.invalidate();
            engine.metrics().record_drop();
            info!(worker = self.id, path = %request.path(), "request dropped by middleware");
            return Ok(Outcome::Dropped);
        };

        for cookie in request.take_postponed_cookies() {
            response.add_cookie(cookie);
        }
        let gzip = request.header("accept-encoding").is_some_and(accepts_gzip);
        let head_only = request.method() == Method::Head;
        request.invalidate();

        let status = self.write_response(engine, response, gzip, head_only, out).await?;
        debug!(worker = self.id, path = %request.path(), status, "response written");
        Ok(Outcome::Responded(status))
    }

    /// Route through post-processing; `None` means the request was dropped
    async fn respond(&mut self, engine: &Engine, request: &mut Request) -> Option<Response> {
        for hop in 0..=MAX_REDIRECTS {
            let mut handler = engine.router().route(request);
            debug!(worker = self.id, handler = %handler.name(), path = %request.path(), "routed");

            if handler.forces_https() && !request.is_secure() {
                match engine.https_redirect() {
                    Some(redirect) => handler = Arc::clone(redirect),
                    None => {
                        let err = Error::Tls(format!("{} requires HTTPS but TLS is not enabled", handler.name()));
                        return Some(self.failure(engine, &err));
                    }
                }
            }

            if let Err(rejection) = handler.validate(request) {
                debug!(worker = self.id, status = rejection.status(), "validation failed");
                return Some(rejection);
            }

            if handler.wants_session()
                && let Some(store) = engine.sessions()
                && let Err(err) = session::resolve(store, request).await
            {
                return Some(self.failure(engine, &err));
            }

            let cacheable = engine.cache().is_enabled() && handler.is_cacheable(request);
            if cacheable {
                let cached = engine.cache().response(&handler.cache_key());
                engine.metrics().record_cache_lookup(RESPONSE_CACHE, cached.is_some());
                if let Some(cached) = cached {
                    trace!(worker = self.id, handler = %handler.name(), "response cache hit");
                    return Some(self.post_process(engine, request, Response::from_cached(cached)));
                }
            }

            match self.generate(engine, &handler, request).await {
                Generated::Response(mut response) => {
                    if response.content_type().is_none()
                        && let Some(content_type) = handler.content_type()
                    {
                        response.headers_mut().insert("Content-Type", content_type);
                    }
                    if cacheable {
                        engine.cache().store_response(handler.cache_key(), response.to_cached());
                    }
                    return Some(self.post_process(engine, request, response));
                }
                Generated::Dropped => return None,
                Generated::Failed(err) => return Some(self.failure(engine, &err)),
                Generated::Declined => match request.take_redirect() {
                    Some(target) if hop < MAX_REDIRECTS => {
                        debug!(worker = self.id, from = %request.path(), to = %target, "internal redirect");
                        *request = request.redirected(&target);
                    }
                    Some(_) => {
                        let err = Error::generation(format!("more than {} internal redirects", MAX_REDIRECTS));
                        return Some(self.failure(engine, &err));
                    }
                    None => {
                        let err = Error::generation(format!("{} produced no response", handler.name()));
                        return Some(self.failure(engine, &err));
                    }
                },
            }
        }
        let err = Error::generation("redirect limit reached");
        Some(self.failure(engine, &err))
    }

    /// Middleware, generator and decorators, with panics contained
    async fn generate(&mut self, engine: &Engine, handler: &Arc<Handler>, request: &mut Request) -> Generated {
        let run = async {
            for middleware in engine.middleware().iter().chain(handler.middleware()) {
                if middleware.handle(request).await == Flow::Drop {
                    debug!(middleware = middleware.name(), "middleware dropped the request");
                    return Generated::Dropped;
                }
            }

            let outcome = request.alternate_outcome().map(str::to_string);
            let generator = Arc::clone(handler.generator(outcome.as_deref()));
            match generator.generate(request).await {
                Ok(Some(mut response)) => {
                    handler.decorate(request, &mut response);
                    response.apply_decorators();
                    Generated::Response(response)
                }
                Ok(None) => Generated::Declined,
                Err(err) => Generated::Failed(err),
            }
        };

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(generated) => generated,
            Err(panic) => Generated::Failed(Error::generation(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Run text or byte hooks over the body
    fn post_process(&self, engine: &Engine, request: &Request, mut response: Response) -> Response {
        let body = match response.take_body() {
            Body::Text(mut text) => {
                for hook in engine.text_hooks() {
                    match hook(request, text) {
                        Ok(next) => text = next,
                        Err(err) => return self.failure(engine, &err),
                    }
                }
                Body::Text(text)
            }
            Body::Bytes(mut bytes) => {
                for hook in engine.byte_hooks() {
                    match hook(request, bytes) {
                        Ok(next) => bytes = next,
                        Err(err) => return self.failure(engine, &err),
                    }
                }
                Body::Bytes(bytes)
            }
            Body::Empty => Body::Empty,
        };
        response.set_body(body);
        response
    }

    fn failure(&self, engine: &Engine, err: &Error) -> Response {
        error!(worker = self.id, error = %err, "request failed");
        if engine.options().debug {
            Response::text(format!("500 Internal Server Error\n\n{}\n", err))
                .with_status(Status::InternalServerError)
        } else {
            Response::status_only(Status::InternalServerError)
        }
    }

    /// Encode and write `response`; returns the status sent
    async fn write_response<W>(
        &mut self,
        engine: &Engine,
        mut response: Response,
        gzip: bool,
        head_only: bool,
        out: &mut W,
    ) -> Result<u16>
    where
        W: AsyncWrite + Unpin,
    {
        let options = engine.options();
        let mut payload = match response.take_body() {
            Body::Empty => Bytes::new(),
            Body::Text(text) => Bytes::from(text),
            Body::Bytes(bytes) => bytes,
        };

        if options.gzip && gzip && !payload.is_empty() && !response.headers().contains("content-encoding") {
            let started = Instant::now();
            match self.gzip.compress(&payload) {
                Ok(compressed) => {
                    engine.metrics().observe_compression(started.elapsed());
                    trace!(worker = self.id, before = payload.len(), after = compressed.len(), "gzip");
                    payload = Bytes::from(compressed);
                    response.headers_mut().insert("Content-Encoding", "gzip");
                }
                Err(err) => {
                    warn!(worker = self.id, error = %err, "compression failed, sending identity");
                    engine.metrics().record_compression_failure();
                    self.gzip.reset();
                }
            }
            response.headers_mut().insert("Vary", "Accept-Encoding");
        }

        if options.content_md5 && !payload.is_empty() {
            response.headers_mut().insert("Content-MD5", content_md5(&payload));
        }

        let headers = response.headers_mut();
        headers.insert("Server", SERVER_NAME);
        headers.insert("Date", httpdate::fmt_http_date(SystemTime::now()));
        headers.insert("Content-Length", payload.len().to_string());
        headers.insert("Connection", "close");

        let mut head = Vec::with_capacity(256);
        response.write_head(&mut head);
        out.write_all(&head).await?;
        if !head_only {
            out.write_all(&payload).await?;
        }
        out.flush().await?;
        Ok(response.status())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
