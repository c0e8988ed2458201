// Kiln - a small HTTP/1.x server engine
//
// Requests are parsed off the socket, routed through a list of handlers that
// re-sorts itself by traffic, generated by a bounded pool of workers and
// written back with optional gzip and response caching.

// Re-export core functionality
pub use kiln_core::*;

pub use kiln_cache as cache;
pub use kiln_compression as compression;
pub use kiln_config as config;
pub use kiln_metrics as metrics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use kiln_core::{
        Body, Engine, Error, Flow, Handler, Method, Middleware, Request, Requirements, Response, Result,
        Router, Server, SetCookie, Status, StaticFilesConfig,
    };
    pub use kiln_config::ServerConfig;

    pub use async_trait::async_trait;
}
