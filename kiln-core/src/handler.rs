//! Handlers: a route pattern plus the chains that turn a request into a
//! response.

use crate::error::Result;
use crate::meta::{self, Variables};
use crate::method::{Method, MethodFilter};
use crate::middleware::Middleware;
use crate::pattern::RoutePattern;
use crate::request::Request;
use crate::response::Response;
use crate::rest::{JsonGenerator, Requirements};
use crate::Status;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces the response for a matched request.
///
/// `Ok(None)` means "no response": the pipeline then follows an internal
/// redirect if one was set on the request, and fails the cycle otherwise.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &mut Request) -> Result<Option<Response>>;
}

/// Generator from a synchronous closure
pub struct FnGenerator<F>(pub F);

#[async_trait]
impl<F> Generator for FnGenerator<F>
where
    F: Fn(&mut Request) -> Result<Option<Response>> + Send + Sync,
{
    async fn generate(&self, request: &mut Request) -> Result<Option<Response>> {
        (self.0)(request)
    }
}

/// Rejects a request with the response to send instead
pub type Validator = Arc<dyn Fn(&Request) -> std::result::Result<(), Response> + Send + Sync>;
/// Adjusts a generated response
pub type Decorator = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;
/// Decides per request whether the response cache applies
pub type CachePredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;
/// Extra match condition checked after the pattern matched
pub type MatchGuard = Arc<dyn Fn(&mut Request) -> bool + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handler identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        HandlerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered route.
pub struct Handler {
    id: HandlerId,
    name: String,
    method: MethodFilter,
    pattern: RoutePattern,
    hits: AtomicU64,
    validators: Vec<Validator>,
    middleware: Vec<Arc<dyn Middleware>>,
    decorators: Vec<Decorator>,
    cache_when: Option<CachePredicate>,
    generator: Arc<dyn Generator>,
    alternates: HashMap<String, Arc<dyn Generator>>,
    wants_session: bool,
    content_type: Option<String>,
    guard: Option<MatchGuard>,
    force_https: bool,
}

impl Handler {
    pub fn builder(pattern: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder::new(pattern)
    }

    /// Default fallback: 404 for everything
    pub fn not_found() -> Self {
        HandlerBuilder::new("/")
            .name("not-found")
            .assemble(RoutePattern::root())
    }

    /// 301 to the same resource on the TLS listener at `tls_port`.
    ///
    /// The host comes from the request's `Host` header, without its port.
    pub fn https_redirect(tls_port: u16) -> Self {
        HandlerBuilder::new("/")
            .name("https-redirect")
            .generator(HttpsRedirect { port: tls_port })
            .assemble(RoutePattern::root())
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> MethodFilter {
        self.method
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn record_hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Key for duplicate detection: canonical pattern and method
    pub fn signature(&self) -> (&str, MethodFilter) {
        (self.pattern.canonical(), self.method)
    }

    pub fn accepts(&self, method: Method) -> bool {
        self.method.accepts(method)
    }

    /// Test the request against this handler.
    ///
    /// On success the captured variables are stored in the request meta.
    pub fn try_match(&self, request: &mut Request) -> bool {
        if !self.accepts(request.method()) {
            return false;
        }
        let Some(variables) = self.pattern.captures(request.path()) else {
            return false;
        };
        request.meta_mut().insert(meta::VARIABLES, variables);

        if let Some(guard) = &self.guard
            && !guard(request)
        {
            request.meta_mut().remove::<Variables>(meta::VARIABLES);
            return false;
        }
        true
    }

    /// Run the validator chain; the first rejection wins
    pub fn validate(&self, request: &Request) -> std::result::Result<(), Response> {
        self.validators.iter().try_for_each(|validator| validator(request))
    }

    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub fn is_cacheable(&self, request: &Request) -> bool {
        self.cache_when.as_ref().is_some_and(|when| when(request))
    }

    /// Response cache key: the handler identity
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.name, self.id)
    }

    /// The generator for `outcome`, or the regular one
    pub fn generator(&self, outcome: Option<&str>) -> &Arc<dyn Generator> {
        outcome
            .and_then(|name| self.alternates.get(name))
            .unwrap_or(&self.generator)
    }

    pub fn has_alternate(&self, name: &str) -> bool {
        self.alternates.contains_key(name)
    }

    pub fn decorate(&self, request: &Request, response: &mut Response) {
        for decorator in &self.decorators {
            decorator(request, response);
        }
    }

    pub fn wants_session(&self) -> bool {
        self.wants_session
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Plain-text requests are answered with a redirect to HTTPS instead
    pub fn forces_https(&self) -> bool {
        self.force_https
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("method", &self.method)
            .field("pattern", &self.pattern.source())
            .field("hits", &self.hits())
            .finish()
    }
}

struct NotFound;

#[async_trait]
impl Generator for NotFound {
    async fn generate(&self, _request: &mut Request) -> Result<Option<Response>> {
        Ok(Some(Response::text("Not Found").with_status(Status::NotFound)))
    }
}

struct HttpsRedirect {
    port: u16,
}

impl HttpsRedirect {
    fn location(&self, request: &Request) -> String {
        let host = request.header("host").map(strip_port).unwrap_or("localhost");
        let mut url = format!("https://{}", host);
        if self.port != 443 {
            url.push_str(&format!(":{}", self.port));
        }
        let path = request
            .path()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&path);
        if let Some(query) = request.raw_query() {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

#[async_trait]
impl Generator for HttpsRedirect {
    async fn generate(&self, request: &mut Request) -> Result<Option<Response>> {
        let location = self.location(request);
        tracing::debug!(%location, "redirecting to HTTPS");
        let body = format!(
            "<h1>Redirecting...</h1>\n<p>If the request isn't redirecting, click: <a href=\"{0}\" title=\"HTTPS Redirect\">{0}</a></p>",
            location
        );
        Ok(Some(
            Response::html(body)
                .with_status(Status::MovedPermanently)
                .with_header("Location", location),
        ))
    }
}

/// Host part of a `Host` header value, IPv6 brackets kept
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

/// Builder for [`Handler`]
pub struct HandlerBuilder {
    pattern: String,
    name: Option<String>,
    method: MethodFilter,
    validators: Vec<Validator>,
    middleware: Vec<Arc<dyn Middleware>>,
    decorators: Vec<Decorator>,
    cache_when: Option<CachePredicate>,
    generator: Option<Arc<dyn Generator>>,
    alternates: HashMap<String, Arc<dyn Generator>>,
    wants_session: bool,
    content_type: Option<String>,
    guard: Option<MatchGuard>,
    force_https: bool,
}

impl HandlerBuilder {
    fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            name: None,
            method: MethodFilter::All,
            validators: Vec::new(),
            middleware: Vec::new(),
            decorators: Vec::new(),
            cache_when: None,
            generator: None,
            alternates: HashMap::new(),
            wants_session: false,
            content_type: None,
            guard: None,
            force_https: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = MethodFilter::Only(method);
        self
    }

    pub fn any_method(mut self) -> Self {
        self.method = MethodFilter::All;
        self
    }

    /// Respond with a closure that always produces a response
    pub fn respond<F>(self, f: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.generate(move |request: &mut Request| Ok(Some(f(request))))
    }

    /// Generate with a closure that may decline or fail
    pub fn generate<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(FnGenerator(f)));
        self
    }

    pub fn generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Answer with the JSON form of the closure's value
    pub fn json<F, T>(self, f: F) -> Self
    where
        F: Fn(&mut Request) -> Result<T> + Send + Sync + 'static,
        T: Serialize + Send + 'static,
    {
        self.generator(JsonGenerator::new(f))
    }

    /// Reject requests missing any of `requirements` with a 400 JSON error
    pub fn requires(self, requirements: Requirements) -> Self {
        self.validator(move |request| requirements.check(request).map_err(|missing| missing.to_response()))
    }

    /// Redirect requests that did not arrive over TLS
    pub fn force_https(mut self) -> Self {
        self.force_https = true;
        self
    }

    /// Named generator chosen when middleware selects `name`
    pub fn alternate<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Request) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.alternates.insert(name.into(), Arc::new(FnGenerator(f)));
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> std::result::Result<(), Response> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn decorator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.decorators.push(Arc::new(f));
        self
    }

    /// Cache every response of this handler
    pub fn cached(self) -> Self {
        self.cache_when(|_| true)
    }

    pub fn cache_when<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.cache_when = Some(Arc::new(f));
        self
    }

    pub fn with_session(mut self) -> Self {
        self.wants_session = true;
        self
    }

    /// Content type used when the generated response sets none
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn guard<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Handler> {
        let pattern = RoutePattern::parse(&self.pattern)?;
        Ok(self.assemble(pattern))
    }

    fn assemble(self, pattern: RoutePattern) -> Handler {
        let name = self
            .name
            .unwrap_or_else(|| format!("{} /{}", self.method, pattern.canonical()));
        Handler {
            id: HandlerId::next(),
            name,
            method: self.method,
            pattern,
            hits: AtomicU64::new(0),
            validators: self.validators,
            middleware: self.middleware,
            decorators: self.decorators,
            cache_when: self.cache_when,
            generator: self.generator.unwrap_or_else(|| Arc::new(NotFound)),
            alternates: self.alternates,
            wants_session: self.wants_session,
            content_type: self.content_type,
            guard: self.guard,
            force_https: self.force_https,
        }
    }
}
