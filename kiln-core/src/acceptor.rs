//! Accept loops, connection filters and the bounded executor.
//!
//! Each listener runs its own loop. Before calling `accept` the loop takes
//! an admission permit, so at most `workers * queue_factor` connections are
//! admitted at once and a saturated server leaves new connections in the
//! kernel backlog. Admitted connections run as tasks that wait for a pooled
//! worker.

use crate::engine::Engine;
use crate::pool::WorkerPool;
use crate::shutdown::{self, ConnectionGuard, ConnectionTracker};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace, warn};

/// Decides whether an accepted socket is served at all
pub trait ConnectionFilter: Send + Sync {
    fn name(&self) -> &str;
    fn admit(&self, stream: &TcpStream, peer: SocketAddr) -> bool;
}

/// Rejects everything; useful for maintenance windows and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReject;

impl ConnectionFilter for AlwaysReject {
    fn name(&self) -> &str {
        "always-reject"
    }

    fn admit(&self, _stream: &TcpStream, _peer: SocketAddr) -> bool {
        false
    }
}

/// Rejects sockets whose peer already went away
#[derive(Debug, Default, Clone, Copy)]
pub struct PeerConnected;

impl ConnectionFilter for PeerConnected {
    fn name(&self) -> &str {
        "peer-connected"
    }

    fn admit(&self, stream: &TcpStream, _peer: SocketAddr) -> bool {
        stream.peer_addr().is_ok()
    }
}

/// Filter from a closure over the peer address
pub struct FnFilter<F> {
    name: String,
    f: F,
}

impl<F> FnFilter<F>
where
    F: Fn(SocketAddr) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> ConnectionFilter for FnFilter<F>
where
    F: Fn(SocketAddr) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn admit(&self, _stream: &TcpStream, peer: SocketAddr) -> bool {
        (self.f)(peer)
    }
}

/// Ordered filters; the first refusal closes the socket
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn ConnectionFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl ConnectionFilter + 'static) {
        self.filters.push(Arc::new(filter));
    }

    pub fn admit(&self, stream: &TcpStream, peer: SocketAddr) -> bool {
        match self.filters.iter().find(|filter| !filter.admit(stream, peer)) {
            Some(filter) => {
                debug!(%peer, filter = filter.name(), "connection rejected");
                false
            }
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

/// Plain TCP or TLS on top of it
#[derive(Clone)]
pub enum Transport {
    Plain,
    Tls(TlsAcceptor),
}

impl Transport {
    fn label(&self) -> &'static str {
        match self {
            Transport::Plain => "http",
            Transport::Tls(_) => "https",
        }
    }
}

/// State shared by every accept loop of one server
pub(crate) struct Shared {
    pub engine: Arc<Engine>,
    pub pool: Arc<WorkerPool>,
    pub filters: FilterChain,
    pub admission: Arc<Semaphore>,
    pub tracker: ConnectionTracker,
    pub grace: Duration,
}

/// One listening socket and its accept loop
pub(crate) struct Acceptor {
    listener: TcpListener,
    transport: Transport,
    shared: Arc<Shared>,
}

impl Acceptor {
    pub fn new(listener: TcpListener, transport: Transport, shared: Arc<Shared>) -> Self {
        Self {
            listener,
            transport,
            shared,
        }
    }

    /// Accept until shutdown, then drain in-flight connections for the
    /// grace period and abort what is left. The listener closes on return.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let local = self.listener.local_addr().ok();
        let scheme = self.transport.label();
        info!(addr = ?local, scheme, "accepting connections");

        let mut tasks = JoinSet::new();
        loop {
            let permit = tokio::select! {
                _ = shutdown::signalled(&mut stop) => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined && err.is_panic() {
                        error!(scheme, "connection task panicked");
                    }
                    continue;
                }
                permit = Arc::clone(&self.shared.admission).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown::signalled(&mut stop) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(scheme, error = %err, "accept failed");
                        continue;
                    }
                },
            };

            if !self.shared.filters.admit(&stream, peer) {
                self.shared.engine.metrics().record_rejected_connection();
                continue;
            }
            let Some(guard) = self.shared.tracker.track() else {
                break;
            };
            if let Err(err) = stream.set_nodelay(true) {
                trace!(?peer, error = %err, "set_nodelay failed");
            }

            tasks.spawn(serve_connection(
                Arc::clone(&self.shared),
                self.transport.clone(),
                stream,
                peer,
                permit,
                guard,
            ));
        }

        info!(addr = ?local, scheme, in_flight = tasks.len(), "accept loop stopped");
        let shared = Arc::clone(&self.shared);
        drop(self.listener);

        shared.tracker.stop_admission();
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined
                    && err.is_panic()
                {
                    error!(scheme, "connection task panicked");
                }
            }
        };
        if tokio::time::timeout(shared.grace, drain).await.is_err() {
            warn!(scheme, remaining = tasks.len(), "aborting connections after grace period");
            tasks.shutdown().await;
        }
    }
}

async fn serve_connection(
    shared: Arc<Shared>,
    transport: Transport,
    stream: TcpStream,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
    _guard: ConnectionGuard,
) {
    let result = match transport {
        Transport::Plain => serve_stream(&shared, stream, peer, false).await,
        Transport::Tls(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => serve_stream(&shared, tls, peer, true).await,
            Err(err) => {
                debug!(%peer, error = %err, "TLS handshake failed");
                return;
            }
        },
    };
    if let Err(err) = result {
        debug!(%peer, error = %err, "connection ended with an error");
    }
}

async fn serve_stream<S>(shared: &Shared, stream: S, peer: SocketAddr, secure: bool) -> crate::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut worker = shared.pool.lease().await?;
    let _active = shared.engine.metrics().worker_leased();
    if secure {
        worker.serve_secure(&shared.engine, stream, Some(peer)).await?;
    } else {
        worker.serve(&shared.engine, stream, Some(peer)).await?;
    }
    Ok(())
}
