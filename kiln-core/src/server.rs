//! Server assembly and lifecycle

use crate::acceptor::{Acceptor, ConnectionFilter, FilterChain, Shared, Transport};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::middleware::Middleware;
use crate::pool::WorkerPool;
use crate::router::Router;
use crate::session::SessionStore;
use crate::shutdown::{ConnectionTracker, ShutdownHandle};
use crate::static_files::{StaticFiles, StaticFilesConfig};
use crate::template::{SimpleTemplateEngine, TemplateEngine};
use crate::tls::TlsConfig;
use kiln_config::{ServerConfig, Validate};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

type EngineStep = Box<dyn FnOnce(Engine) -> Engine + Send>;

/// Builder for [`Server`]
pub struct ServerBuilder {
    config: ServerConfig,
    steps: Vec<EngineStep>,
    routes: Vec<Handler>,
    fallback: Option<Handler>,
    static_files: Vec<StaticFilesConfig>,
    filters: FilterChain,
    tls: Option<TlsConfig>,
}

impl ServerBuilder {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            routes: Vec::new(),
            fallback: None,
            static_files: Vec::new(),
            filters: FilterChain::new(),
            tls: None,
        }
    }

    fn configure(mut self, step: impl FnOnce(Engine) -> Engine + Send + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn route(mut self, handler: Handler) -> Self {
        self.routes.push(handler);
        self
    }

    /// Handler for requests no route matches
    pub fn fallback(mut self, handler: Handler) -> Self {
        self.fallback = Some(handler);
        self
    }

    /// Serve a folder; may be called once per mount point
    pub fn static_files(mut self, config: StaticFilesConfig) -> Self {
        self.static_files.push(config);
        self
    }

    /// Append a connection filter; filters run in insertion order
    pub fn filter(mut self, filter: impl ConnectionFilter + 'static) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn middleware(self, middleware: impl Middleware + 'static) -> Self {
        self.configure(move |engine| engine.with_middleware(middleware))
    }

    pub fn session_store(self, store: Arc<dyn SessionStore>) -> Self {
        self.configure(move |engine| engine.with_session_store(store))
    }

    pub fn template_engine(self, templates: Arc<dyn TemplateEngine>) -> Self {
        self.configure(move |engine| engine.with_template_engine(templates))
    }

    /// Use [`SimpleTemplateEngine`] with fragments from `loader`
    pub fn simple_templates<F>(self, loader: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.configure(move |engine| {
            let templates = SimpleTemplateEngine::new(Arc::clone(engine.cache())).with_loader(loader);
            engine.with_template_engine(Arc::new(templates))
        })
    }

    pub fn text_hook<F>(self, hook: F) -> Self
    where
        F: Fn(&crate::Request, String) -> Result<String> + Send + Sync + 'static,
    {
        self.configure(move |engine| engine.with_text_hook(hook))
    }

    /// Use this certificate instead of the configured PEM paths
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Validate the configuration and wire everything together.
    pub fn build(self) -> Result<Server> {
        self.config.validate()?;

        let mut engine = Engine::from_config(&self.config)?;
        for step in self.steps {
            engine = step(engine);
        }

        let router = Arc::clone(engine.router());
        for handler in self.routes {
            router.register(handler)?;
        }
        for config in self.static_files {
            let files = StaticFiles::new(config)?;
            router.register(files.handler(Arc::clone(engine.cache()))?)?;
        }
        if let Some(fallback) = self.fallback {
            router.set_fallback(fallback);
        }

        let tls = match self.tls {
            Some(tls) => Some(tls),
            None if self.config.tls.enabled => {
                let (Some(cert), Some(key)) = (&self.config.tls.cert_path, &self.config.tls.key_path) else {
                    return Err(Error::Tls("TLS enabled without certificate and key paths".to_string()));
                };
                Some(TlsConfig::from_pem_files(cert, key)?)
            }
            None => None,
        };
        if tls.is_some() && engine.https_redirect().is_none() {
            engine = engine.with_https_redirect(self.config.tls.port);
        }

        Ok(Server {
            config: self.config,
            engine: Arc::new(engine),
            filters: self.filters,
            tls,
            shutdown: ShutdownHandle::new(),
        })
    }
}

/// A configured, not yet listening server.
pub struct Server {
    config: ServerConfig,
    engine: Arc<Engine>,
    filters: FilterChain,
    tls: Option<TlsConfig>,
    shutdown: ShutdownHandle,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Routes can still be added after the build
    pub fn router(&self) -> &Arc<Router> {
        self.engine.router()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Bind the listeners and start accepting.
    ///
    /// Binding failures are fatal and reported as [`Error::Bind`].
    pub async fn start(self) -> Result<RunningServer> {
        let server = &self.config.server;
        let workers = server.workers.max(1);
        let shared = Arc::new(Shared {
            engine: Arc::clone(&self.engine),
            pool: Arc::new(WorkerPool::new(workers)),
            filters: self.filters,
            admission: Arc::new(Semaphore::new(workers * server.queue_factor.max(1))),
            tracker: ConnectionTracker::new(),
            grace: server.shutdown_grace(),
        });

        let plain = bind(&server.host, server.port).await?;
        let local_addr = plain.local_addr()?;
        let mut acceptors = vec![tokio::spawn(
            Acceptor::new(plain, Transport::Plain, Arc::clone(&shared)).run(self.shutdown.subscribe()),
        )];

        let mut tls_addr = None;
        if let Some(tls) = &self.tls {
            let listener = bind(&server.host, self.config.tls.port).await?;
            tls_addr = Some(listener.local_addr()?);
            acceptors.push(tokio::spawn(
                Acceptor::new(listener, Transport::Tls(tls.acceptor()), Arc::clone(&shared))
                    .run(self.shutdown.subscribe()),
            ));
        }

        let sorter = self.config.router.sort_interval().map(|interval| {
            self.engine.router().spawn_sorter(
                self.config.router.sort_initial_delay(),
                interval,
                self.shutdown.subscribe(),
            )
        });

        info!(
            addr = %local_addr,
            tls = ?tls_addr,
            workers,
            routes = self.engine.router().len(),
            "server started"
        );

        Ok(RunningServer {
            local_addr,
            tls_addr,
            shutdown: self.shutdown,
            acceptors,
            sorter,
            pool: Arc::clone(&shared.pool),
        })
    }

    /// Start and serve until shut down
    pub async fn run(self) -> Result<()> {
        self.start().await?.wait().await;
        Ok(())
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}

/// A listening server
pub struct RunningServer {
    local_addr: SocketAddr,
    tls_addr: Option<SocketAddr>,
    shutdown: ShutdownHandle,
    acceptors: Vec<JoinHandle<()>>,
    sorter: Option<JoinHandle<()>>,
    pool: Arc<WorkerPool>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tls_addr(&self) -> Option<SocketAddr> {
        self.tls_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Wait for the accept loops to finish draining after shutdown
    pub async fn wait(self) {
        for acceptor in self.acceptors {
            if let Err(err) = acceptor.await {
                warn!(error = %err, "accept loop ended abnormally");
            }
        }
        if let Some(sorter) = self.sorter {
            sorter.abort();
        }
        self.pool.close();
        info!("server stopped");
    }

    /// Trigger shutdown and wait for it to complete
    pub async fn shutdown(self) {
        self.shutdown.shutdown();
        self.wait().await;
    }
}
