//! Responses and their wire form

use crate::Status;
use crate::cookies::SetCookie;
use crate::headers::Headers;
use bytes::Bytes;
use kiln_cache::{CachedBody, CachedResponse};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_JSON: &str = "application/json";

/// Response body: text or bytes, never both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Empty => 0,
            Body::Text(text) => text.len(),
            Body::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Text(text) => text.as_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

/// Post-generation transformation attached to a single response
pub type ResponseDecorator = Arc<dyn Fn(&mut Response) + Send + Sync>;

/// An outgoing response.
#[derive(Clone, Default)]
pub struct Response {
    status: u16,
    headers: Headers,
    cookies: Vec<SetCookie>,
    body: Body,
    decorators: Vec<ResponseDecorator>,
}

impl Response {
    pub fn new(status: impl Into<u16>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn ok() -> Self {
        Self::new(Status::Ok)
    }

    pub fn not_found() -> Self {
        Self::new(Status::NotFound)
    }

    /// A response carrying nothing but its status line
    pub fn status_only(status: impl Into<u16>) -> Self {
        Self::new(status)
    }

    /// 200 with a plain text body
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_content_type(TEXT_PLAIN)
            .with_body(Body::Text(body.into()))
    }

    /// 200 with an HTML body
    pub fn html(body: impl Into<String>) -> Self {
        Self::ok()
            .with_content_type(TEXT_HTML)
            .with_body(Body::Text(body.into()))
    }

    /// 200 with `value` serialized as JSON.
    ///
    /// The body is stored as bytes, so text hooks such as templating leave
    /// it alone.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::bytes(body, APPLICATION_JSON))
    }

    /// 200 with a binary body
    pub fn bytes(body: impl Into<Bytes>, content_type: &str) -> Self {
        Self::ok()
            .with_content_type(content_type)
            .with_body(Body::Bytes(body.into()))
    }

    pub fn with_status(mut self, status: impl Into<u16>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_content_type(self, content_type: &str) -> Self {
        self.with_header("Content-Type", content_type)
    }

    pub fn with_cookie(mut self, cookie: SetCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_decorator<F>(mut self, decorator: F) -> Self
    where
        F: Fn(&mut Response) + Send + Sync + 'static,
    {
        self.decorators.push(Arc::new(decorator));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: impl Into<u16>) {
        self.status = status.into();
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }

    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.cookies.push(cookie);
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Run and drop the decorators attached to this response
    pub fn apply_decorators(&mut self) {
        let decorators = std::mem::take(&mut self.decorators);
        for decorator in &decorators {
            decorator(self);
        }
    }

    /// Reason phrase for the status code
    pub fn reason(&self) -> &'static str {
        Status::from_code(self.status)
            .map(|status| status.reason())
            .unwrap_or("Unknown")
    }

    /// Snapshot stored in the response cache
    pub fn to_cached(&self) -> CachedResponse {
        let body = match &self.body {
            Body::Empty => CachedBody::Bytes(Bytes::new()),
            Body::Text(text) => CachedBody::Text(Arc::from(text.as_str())),
            Body::Bytes(bytes) => CachedBody::Bytes(bytes.clone()),
        };
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("set-cookie"))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        CachedResponse {
            status: self.status,
            headers,
            body,
        }
    }

    /// Rebuild a response from a cache entry
    pub fn from_cached(cached: CachedResponse) -> Self {
        let body = match cached.body {
            CachedBody::Text(text) => Body::Text(text.to_string()),
            CachedBody::Bytes(bytes) if bytes.is_empty() => Body::Empty,
            CachedBody::Bytes(bytes) => Body::Bytes(bytes),
        };
        let mut response = Response::new(cached.status).with_body(body);
        response.headers = cached.headers.into_iter().collect();
        response
    }

    /// Serialize the status line, headers and cookies, ending with the blank line
    pub fn write_head(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status, self.reason()).as_bytes());
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        for cookie in &self.cookies {
            out.extend_from_slice(format!("Set-Cookie: {}\r\n", cookie).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("body", &self.body)
            .field("decorators", &self.decorators.len())
            .finish()
    }
}
