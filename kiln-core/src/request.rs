//! The parsed request and its per-cycle state

use crate::cookies::{Cookies, SetCookie};
use crate::headers::Headers;
use crate::meta::{self, Meta, Variables};
use crate::method::Method;
use crate::session::Session;
use bytes::Bytes;
use std::net::SocketAddr;
use tracing::debug;

/// A request as it moves through one pipeline cycle.
///
/// Built by the parser (or by [`Request::new`] in tests), mutated by
/// routing and middleware, and marked invalid once its response is written.
/// An invalid request is never processed again.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    version: String,
    raw_query: Option<String>,
    query: Vec<(String, String)>,
    headers: Headers,
    cookies: Cookies,
    form: Option<Vec<(String, String)>>,
    body: Option<Bytes>,
    meta: Meta,
    peer: Option<SocketAddr>,
    secure: bool,
    postponed_cookies: Vec<SetCookie>,
    session: Option<Session>,
    valid: bool,
}

impl Request {
    /// Create a request for `path` with no headers, query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: "HTTP/1.1".to_string(),
            raw_query: None,
            query: Vec::new(),
            headers: Headers::new(),
            cookies: Cookies::new(),
            form: None,
            body: None,
            meta: Meta::new(),
            peer: None,
            secure: false,
            postponed_cookies: Vec::new(),
            session: None,
            valid: true,
        }
    }

    pub(crate) fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub(crate) fn set_query(&mut self, raw: String, pairs: Vec<(String, String)>) {
        self.raw_query = Some(raw);
        self.query = pairs;
    }

    pub(crate) fn set_headers(&mut self, headers: Headers) {
        for value in headers.get_all("cookie") {
            self.cookies.parse_header(value);
        }
        self.headers = headers;
    }

    pub(crate) fn set_form(&mut self, form: Vec<(String, String)>) {
        self.form = Some(form);
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = Some(body);
    }

    pub(crate) fn set_peer(&mut self, peer: Option<SocketAddr>) {
        self.peer = peer;
    }

    pub(crate) fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    // Builders for hand-made requests

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        if name == "cookie" {
            self.cookies.parse_header(&value);
        }
        self.headers.append(name, value);
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self.raw_query = serde_urlencoded::to_string(&self.query).ok();
        self
    }

    pub fn with_form_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    // Accessors

    pub fn method(&self) -> Method {
        self.method
    }

    /// Percent-decoded path without the query string
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First query value for `key`
    pub fn query_param(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    /// Decoded form fields, present for body-bearing requests
    pub fn form(&self) -> Option<&[(String, String)]> {
        self.form.as_deref()
    }

    pub fn form_param(&self, key: &str) -> Option<&str> {
        self.form.as_deref().and_then(|form| lookup(form, key))
    }

    /// Raw body of a non-form request
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    /// Variables captured by the matched route
    pub fn variables(&self) -> Option<&Variables> {
        self.meta.get::<Variables>(meta::VARIABLES)
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables()
            .and_then(|vars| vars.get(name))
            .map(String::as_str)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the request arrived over TLS
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    // Lifecycle

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the request as handled
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Ask the pipeline to re-route this request to `path`.
    ///
    /// Takes effect when the generator returns no response.
    pub fn redirect_internal(&mut self, path: impl Into<String>) {
        self.meta.insert(meta::INTERNAL_REDIRECT, path.into());
    }

    pub(crate) fn take_redirect(&mut self) -> Option<String> {
        self.meta.remove::<String>(meta::INTERNAL_REDIRECT)
    }

    /// Replacement request for an internal redirect to `target`.
    ///
    /// Method, version, headers, cookies, form, body, peer, transport,
    /// session and postponed cookies carry over; meta starts empty. The path is
    /// percent-decoded like an incoming one. A query in `target` replaces the
    /// original query; an undecodable one is dropped.
    pub fn redirected(&mut self, target: &str) -> Request {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let path = match urlencoding::decode(path) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => {
                debug!(to = %target, "redirect path is not valid percent-encoding, kept raw");
                path.to_string()
            }
        };

        let mut next = Request::new(self.method, path);
        next.version = self.version.clone();
        next.headers = self.headers.clone();
        next.cookies = self.cookies.clone();
        next.form = self.form.clone();
        next.body = self.body.clone();
        next.peer = self.peer;
        next.secure = self.secure;
        next.session = self.session.clone();
        next.postponed_cookies = std::mem::take(&mut self.postponed_cookies);
        if let Some(raw) = raw_query {
            match crate::parser::decode_pairs(raw) {
                Ok(pairs) => next.set_query(raw.to_string(), pairs),
                Err(err) => debug!(to = %target, error = %err, "redirect query dropped"),
            }
        }
        next
    }

    /// Select a named alternate generator of the matched handler
    pub fn set_alternate_outcome(&mut self, name: impl Into<String>) {
        self.meta.insert(meta::ALTERNATE_OUTCOME, name.into());
    }

    pub fn alternate_outcome(&self) -> Option<&str> {
        self.meta
            .get::<String>(meta::ALTERNATE_OUTCOME)
            .map(String::as_str)
    }

    // Cookies and sessions

    /// Queue a cookie for whatever response ends up being written
    pub fn postpone_cookie(&mut self, cookie: SetCookie) {
        self.postponed_cookies.push(cookie);
    }

    pub fn postponed_cookies(&self) -> &[SetCookie] {
        &self.postponed_cookies
    }

    pub(crate) fn take_postponed_cookies(&mut self) -> Vec<SetCookie> {
        std::mem::take(&mut self.postponed_cookies)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let request = Request::new(Method::Get, "/search")
            .with_header("Cookie", "a=1; b=2")
            .with_query_param("q", "rust lang");

        assert_eq!(request.header("cookie"), Some("a=1; b=2"));
        assert_eq!(request.cookie("b"), Some("2"));
        assert_eq!(request.query_param("q"), Some("rust lang"));
        assert_eq!(request.raw_query(), Some("q=rust+lang"));
        assert!(request.is_valid());
    }

    #[test]
    fn test_redirected_decodes_target() {
        let mut request = Request::new(Method::Get, "/old").with_query_param("keep", "no");

        let next = request.redirected("/files/my%20report?name=a%20b");
        assert_eq!(next.path(), "/files/my report");
        assert_eq!(next.query_param("name"), Some("a b"));

        let next = request.redirected("/plain?bad=%zz");
        assert_eq!(next.path(), "/plain");
        assert!(next.query_param("bad").is_none());
        assert!(next.query_param("keep").is_none());
    }

    #[test]
    fn test_redirected_copies_context() {
        let mut request = Request::new(Method::Post, "/old")
            .with_header("x-token", "t")
            .with_form_param("name", "kiln");
        request.postpone_cookie(SetCookie::new("a", "1"));
        request.set_alternate_outcome("debug");

        let next = request.redirected("/new?page=2");
        assert_eq!(next.path(), "/new");
        assert_eq!(next.method(), Method::Post);
        assert_eq!(next.query_param("page"), Some("2"));
        assert_eq!(next.header("x-token"), Some("t"));
        assert_eq!(next.form_param("name"), Some("kiln"));
        assert_eq!(next.postponed_cookies().len(), 1);
        assert_eq!(next.alternate_outcome(), None);
        assert!(request.postponed_cookies().is_empty());
    }

    #[test]
    fn test_take_redirect() {
        let mut request = Request::new(Method::Get, "/");
        assert!(request.take_redirect().is_none());
        request.redirect_internal("/elsewhere");
        assert_eq!(request.take_redirect().as_deref(), Some("/elsewhere"));
        assert!(request.take_redirect().is_none());
    }
}
