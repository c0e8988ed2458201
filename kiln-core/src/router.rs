//! Self-tuning router.
//!
//! Handlers are matched in list order. Every match bumps the handler's hit
//! counter; when the most-hit handler changes, the list is flagged dirty and
//! the next [`Router::sort_now`] publishes a copy sorted by descending hits.
//! Readers always see a complete list: sorting builds a new vector and swaps
//! the pointer.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::request::Request;
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

pub struct Router {
    handlers: ArcSwap<Vec<Arc<Handler>>>,
    // Serializes writers; readers never take it
    writer: Mutex<()>,
    fallback: ArcSwap<Handler>,
    head: ArcSwapOption<Handler>,
    dirty: AtomicBool,
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            fallback: ArcSwap::from_pointee(Handler::not_found()),
            head: ArcSwapOption::empty(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Append a handler.
    ///
    /// Fails with [`Error::DuplicateRoute`] when a handler with the same
    /// canonical pattern and method filter is already registered; the
    /// existing handler stays in place.
    pub fn register(&self, handler: Handler) -> Result<Arc<Handler>> {
        let _writer = self.writer.lock();
        let current = self.handlers.load();

        if current.iter().any(|existing| existing.signature() == handler.signature()) {
            return Err(Error::DuplicateRoute {
                pattern: handler.pattern().canonical().to_string(),
                method: handler.method().to_string(),
            });
        }

        let handler = Arc::new(handler);
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(handler.clone());
        self.handlers.store(Arc::new(next));

        debug!(handler = %handler.name(), id = %handler.id(), "route registered");
        Ok(handler)
    }

    /// Replace the handler used when nothing matches
    pub fn set_fallback(&self, handler: Handler) {
        self.fallback.store(Arc::new(handler));
    }

    pub fn fallback(&self) -> Arc<Handler> {
        self.fallback.load_full()
    }

    /// Find the handler for `request`.
    ///
    /// The first handler accepting the method and matching the path wins and
    /// its variables are attached to the request; otherwise the fallback
    /// handler is returned.
    pub fn route(&self, request: &mut Request) -> Arc<Handler> {
        let handlers = self.handlers.load();
        for handler in handlers.iter() {
            if handler.try_match(request) {
                let hits = handler.record_hit();
                self.track_head(handler, hits);
                trace!(handler = %handler.name(), hits, "route matched");
                return handler.clone();
            }
        }
        trace!(path = %request.path(), "no route matched, using fallback");
        self.fallback.load_full()
    }

    fn track_head(&self, handler: &Arc<Handler>, hits: u64) {
        let head = self.head.load();
        let replace = match head.as_ref() {
            Some(current) => current.id() != handler.id() && hits > current.hits(),
            None => true,
        };
        if replace {
            self.head.store(Some(handler.clone()));
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Re-sort by descending hit count if the head changed since the last
    /// sort. Ties keep their relative order. Returns whether a sort happened.
    pub fn sort_now(&self) -> bool {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return false;
        }
        let _writer = self.writer.lock();
        let mut sorted: Vec<Arc<Handler>> = self.handlers.load().iter().cloned().collect();
        // Hits keep moving while we sort; read each one once
        sorted.sort_by_cached_key(|handler| Reverse(handler.hits()));
        self.handlers.store(Arc::new(sorted));
        true
    }

    /// Snapshot of the handlers in match order
    pub fn routes(&self) -> Vec<Arc<Handler>> {
        self.handlers.load().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }

    /// Most-hit handler as of the last match that changed it
    pub fn head(&self) -> Option<Arc<Handler>> {
        self.head.load_full()
    }

    /// Run [`Router::sort_now`] every `interval` after `initial_delay`
    /// until `shutdown` turns true.
    pub fn spawn_sorter(
        self: &Arc<Self>,
        initial_delay: Duration,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(initial_delay) => {}
                _ = shutdown.wait_for(|stop| *stop) => return,
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if router.sort_now() {
                            debug!(head = ?router.head().map(|h| h.name().to_string()), "routes re-sorted");
                        }
                    }
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
            info!("route sorter stopped");
        })
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("handlers", &self.len())
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .finish()
    }
}
