//! Shared state handed to every worker

use crate::error::Result;
use crate::handler::Handler;
use crate::middleware::{DebugMiddleware, Middleware};
use crate::parser::{ParserLimits, RequestParser};
use crate::request::Request;
use crate::router::Router;
use crate::session::SessionStore;
use crate::template::{self, TemplateEngine};
use bytes::Bytes;
use kiln_cache::{CacheConfig, CacheManager, CacheManagerConfig};
use kiln_config::{CacheSettings, ServerConfig};
use kiln_metrics::ServerMetrics;
use std::sync::Arc;

/// Transforms a text body after generation or a cache hit
pub type TextHook = Arc<dyn Fn(&Request, String) -> Result<String> + Send + Sync>;
/// Transforms a byte body after generation or a cache hit
pub type ByteHook = Arc<dyn Fn(&Request, Bytes) -> Result<Bytes> + Send + Sync>;

/// Pipeline switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Render failure diagnostics into 500 responses
    pub debug: bool,
    pub gzip: bool,
    pub content_md5: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debug: false,
            gzip: true,
            content_md5: true,
        }
    }
}

/// Everything a worker needs to run a cycle.
///
/// Built once at startup and shared behind an `Arc`; nothing in here is
/// global.
pub struct Engine {
    router: Arc<Router>,
    cache: Arc<CacheManager>,
    metrics: ServerMetrics,
    parser: RequestParser,
    sessions: Option<Arc<dyn SessionStore>>,
    middleware: Vec<Arc<dyn Middleware>>,
    text_hooks: Vec<TextHook>,
    byte_hooks: Vec<ByteHook>,
    https_redirect: Option<Arc<Handler>>,
    options: EngineOptions,
}

impl Engine {
    /// Engine with an empty router, default limits and caches
    pub fn new(metrics: ServerMetrics) -> Self {
        Self {
            router: Arc::new(Router::new()),
            cache: Arc::new(CacheManager::disabled()),
            metrics,
            parser: RequestParser::default(),
            sessions: None,
            middleware: Vec::new(),
            text_hooks: Vec::new(),
            byte_hooks: Vec::new(),
            https_redirect: None,
            options: EngineOptions::default(),
        }
    }

    /// Engine configured from `config`, with its own metrics registry
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let cache = if config.cache.enabled {
            CacheManager::new(CacheManagerConfig {
                responses: cache_config(&config.cache.responses),
                files: cache_config(&config.cache.files),
                fragments: cache_config(&config.cache.fragments),
            })?
        } else {
            CacheManager::disabled()
        };

        let mut engine = Self::new(ServerMetrics::new()?)
            .with_cache(Arc::new(cache))
            .with_limits(ParserLimits::from(&config.limits))
            .with_options(EngineOptions {
                debug: config.server.debug,
                gzip: config.server.gzip,
                content_md5: config.server.content_md5,
            });
        if config.server.debug {
            engine = engine.with_middleware(DebugMiddleware);
        }
        Ok(engine)
    }

    pub fn with_router(mut self, router: Arc<Router>) -> Self {
        self.router = router;
        self
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_limits(mut self, limits: ParserLimits) -> Self {
        self.parser = RequestParser::new(limits);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Middleware run before every handler's own middleware
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn with_text_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, String) -> Result<String> + Send + Sync + 'static,
    {
        self.text_hooks.push(Arc::new(hook));
        self
    }

    pub fn with_byte_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, Bytes) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.byte_hooks.push(Arc::new(hook));
        self
    }

    /// Send plain-text requests for HTTPS-only handlers to `tls_port`
    pub fn with_https_redirect(mut self, tls_port: u16) -> Self {
        self.https_redirect = Some(Arc::new(Handler::https_redirect(tls_port)));
        self
    }

    /// Render every text body through `engine`
    pub fn with_template_engine(self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.with_text_hook(move |request, text| {
            template::render_for_request(engine.as_ref(), request, &text)
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    pub fn parser(&self) -> &RequestParser {
        &self.parser
    }

    pub fn sessions(&self) -> Option<&dyn SessionStore> {
        self.sessions.as_deref()
    }

    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub fn text_hooks(&self) -> &[TextHook] {
        &self.text_hooks
    }

    pub fn byte_hooks(&self) -> &[ByteHook] {
        &self.byte_hooks
    }

    pub fn https_redirect(&self) -> Option<&Arc<Handler>> {
        self.https_redirect.as_ref()
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("router", &self.router)
            .field("options", &self.options)
            .field("middleware", &self.middleware.len())
            .field("sessions", &self.sessions.is_some())
            .finish()
    }
}

fn cache_config(settings: &CacheSettings) -> CacheConfig {
    CacheConfig::new(settings.ttl(), settings.max_entries)
}
