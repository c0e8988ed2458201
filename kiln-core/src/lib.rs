// Core of the Kiln HTTP/1.x server engine
// Wire parsing, routing, the per-request pipeline and connection handling

pub mod acceptor;
pub mod cookies;
pub mod engine;
pub mod error;
pub mod handler;
pub mod headers;
pub mod logging;
pub mod meta;
pub mod method;
pub mod middleware;
pub mod parser;
pub mod pattern;
pub mod pool;
pub mod request;
pub mod response;
pub mod rest;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod static_files;
pub mod status;
pub mod template;
pub mod tls;
pub mod worker;

// Re-export commonly used types
pub use acceptor::{AlwaysReject, ConnectionFilter, FilterChain, FnFilter, PeerConnected, Transport};
pub use cookies::{Cookies, SetCookie};
pub use engine::{ByteHook, Engine, EngineOptions, TextHook};
pub use error::{Error, ProtocolViolation, Result};
pub use handler::{
    CachePredicate, Decorator, FnGenerator, Generator, Handler, HandlerBuilder, HandlerId,
    MatchGuard, Validator,
};
pub use headers::Headers;
pub use meta::{Meta, Variables};
pub use method::{Method, MethodFilter};
pub use middleware::{DebugMiddleware, Flow, FnMiddleware, Middleware};
pub use parser::{ParserLimits, RequestParser};
pub use pattern::RoutePattern;
pub use pool::{WorkerLease, WorkerPool};
pub use request::Request;
pub use response::{APPLICATION_JSON, Body, Response, ResponseDecorator};
pub use rest::{JsonGenerator, MissingParameter, ParameterLocation, Requirement, Requirements, accepts_json};
pub use router::Router;
pub use server::{RunningServer, Server, ServerBuilder};
pub use session::{MemorySessionStore, NoopSessionStore, SESSION_COOKIE, Session, SessionStore};
pub use shutdown::{ConnectionGuard, ConnectionTracker, ShutdownHandle};
pub use static_files::{
    ExtensionPolicy, FileKind, ReadMode, ResolvedFile, StaticFiles, StaticFilesConfig,
};
pub use status::Status;
pub use template::{
    FormVariables, FragmentLoader, QueryVariables, RequestVariables, RouteVariables,
    SessionVariables, SimpleTemplateEngine, TemplateEngine, VariableProvider, render_for_request,
};
pub use tls::TlsConfig;
pub use worker::{MAX_REDIRECTS, Outcome, Worker};

pub use kiln_cache;
pub use kiln_config;
pub use kiln_metrics;
