//! Request head and body parsing.
//!
//! The head is read line by line from a buffered stream. Both limits are
//! enforced while reading, so an oversized line or an endless header block
//! is rejected before it is buffered in full.

use crate::error::{Error, ProtocolViolation, Result};
use crate::headers::Headers;
use crate::method::Method;
use crate::request::Request;
use bytes::Bytes;
use kiln_config::LimitsSection;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::trace;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Size limits applied while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Maximum head lines, request line included
    pub max_lines: usize,
    /// Maximum bytes per line, line terminator excluded
    pub max_line_size: usize,
    /// Content-Length values at or above this are rejected
    pub max_body_size: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self::from(&LimitsSection::default())
    }
}

impl From<&LimitsSection> for ParserLimits {
    fn from(limits: &LimitsSection) -> Self {
        Self {
            max_lines: limits.request_lines,
            max_line_size: limits.request_line_size,
            max_body_size: limits.body_size,
        }
    }
}

/// Turns raw bytes into a [`Request`].
#[derive(Debug, Clone, Default)]
pub struct RequestParser {
    limits: ParserLimits,
}

impl RequestParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ParserLimits {
        self.limits
    }

    /// Parse one request.
    ///
    /// Returns `Ok(None)` when the peer closed the connection without
    /// sending anything.
    pub async fn parse<R>(&self, reader: &mut R, peer: Option<SocketAddr>) -> Result<Option<Request>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::with_capacity(256);

        if !self.read_line(reader, &mut line).await? {
            return Ok(None);
        }
        let (method, target, version) = parse_request_line(&line)?;

        let mut headers = Headers::new();
        let mut count = 1usize;
        loop {
            if !self.read_line(reader, &mut line).await? {
                return Err(ProtocolViolation::UnexpectedEof.into());
            }
            if line.is_empty() {
                break;
            }
            count += 1;
            if count > self.limits.max_lines {
                return Err(ProtocolViolation::TooManyHeaders {
                    limit: self.limits.max_lines,
                }
                .into());
            }
            if let Some((name, value)) = parse_header_line(&line) {
                headers.append(name, value);
            }
        }

        let mut request = build_request(method, &target)?;
        request.set_version(version);
        request.set_peer(peer);

        if method.has_body() {
            self.read_body(reader, &headers, &mut request).await?;
        }
        request.set_headers(headers);

        trace!(method = %method, path = %request.path(), lines = count, "request parsed");
        Ok(Some(request))
    }

    /// Read one line into `buf` without its terminator.
    ///
    /// Returns `false` on EOF before any byte of the line.
    async fn read_line<R>(&self, reader: &mut R, buf: &mut Vec<u8>) -> Result<bool>
    where
        R: AsyncBufRead + Unpin,
    {
        buf.clear();
        let cap = self.limits.max_line_size as u64 + 2;
        let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
        if read == 0 {
            return Ok(false);
        }

        if buf.last() != Some(&b'\n') {
            if read as u64 == cap {
                return Err(self.line_too_long());
            }
            return Err(ProtocolViolation::UnexpectedEof.into());
        }
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        if buf.len() > self.limits.max_line_size {
            return Err(self.line_too_long());
        }
        Ok(true)
    }

    async fn read_body<R>(&self, reader: &mut R, headers: &Headers, request: &mut Request) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let length = headers
            .get("content-length")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or(ProtocolViolation::InvalidContentLength)?;
        if length >= self.limits.max_body_size {
            return Err(ProtocolViolation::BodyTooLarge {
                length,
                limit: self.limits.max_body_size,
            }
            .into());
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Protocol(ProtocolViolation::UnexpectedEof)
            } else {
                Error::Io(err)
            }
        })?;

        let is_form = headers
            .get("content-type")
            .is_none_or(|value| value.trim().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE));
        if is_form {
            let raw = String::from_utf8_lossy(&body);
            request.set_form(decode_pairs(&raw)?);
        } else {
            request.set_body(Bytes::from(body));
        }
        Ok(())
    }

    fn line_too_long(&self) -> Error {
        ProtocolViolation::LineTooLong {
            limit: self.limits.max_line_size,
        }
        .into()
    }
}

fn parse_request_line(line: &[u8]) -> Result<(Method, String, &'static str)> {
    let mut buf = Vec::with_capacity(line.len() + 4);
    buf.extend_from_slice(line);
    buf.extend_from_slice(b"\r\n\r\n");

    let mut headers = [httparse::EMPTY_HEADER; 0];
    let mut parsed = httparse::Request::new(&mut headers);
    match parsed.parse(&buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(ProtocolViolation::MalformedRequestLine.into()),
        Err(httparse::Error::Version) => {
            let version = String::from_utf8_lossy(line)
                .rsplit(' ')
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(ProtocolViolation::UnsupportedVersion(version).into());
        }
        Err(_) => return Err(ProtocolViolation::MalformedRequestLine.into()),
    }

    let token = parsed.method.unwrap_or_default();
    let method =
        Method::parse(token).ok_or_else(|| ProtocolViolation::UnknownMethod(token.to_string()))?;
    let target = parsed
        .path
        .ok_or(ProtocolViolation::MalformedRequestLine)?
        .to_string();
    let version = match parsed.version {
        Some(0) => "HTTP/1.0",
        _ => "HTTP/1.1",
    };
    Ok((method, target, version))
}

/// Split a header line at its first colon; lines without one are skipped
fn parse_header_line(line: &[u8]) -> Option<(String, String)> {
    let colon = memchr::memchr(b':', line)?;
    let name = String::from_utf8_lossy(&line[..colon]).trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
    Some((name, value))
}

fn build_request(method: Method, target: &str) -> Result<Request> {
    let (raw_path, raw_query) = match memchr::memchr(b'?', target.as_bytes()) {
        Some(idx) => (&target[..idx], Some(&target[idx + 1..])),
        None => (target, None),
    };
    let path = urlencoding::decode(raw_path).map_err(|_| ProtocolViolation::MalformedRequestLine)?;

    let mut request = Request::new(method, path.into_owned());
    if let Some(raw) = raw_query {
        let pairs = decode_pairs(raw)?;
        request.set_query(raw.to_string(), pairs);
    }
    Ok(request)
}

/// Decode `&`-separated `key=value` pairs with `+` as space.
///
/// Broken percent escapes and escapes that decode to invalid UTF-8 are
/// rejected instead of being passed through.
pub fn decode_pairs(raw: &str) -> Result<Vec<(String, String)>> {
    let malformed = || Error::Protocol(ProtocolViolation::MalformedQuery(raw.to_string()));

    if !valid_escapes(raw.as_bytes()) || urlencoding::decode(&raw.replace('+', " ")).is_err() {
        return Err(malformed());
    }
    serde_urlencoded::from_str(raw).map_err(|_| malformed())
}

fn valid_escapes(bytes: &[u8]) -> bool {
    let mut i = 0;
    while let Some(offset) = memchr::memchr(b'%', &bytes[i..]) {
        let at = i + offset;
        match bytes.get(at + 1..at + 3) {
            Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => i = at + 3,
            _ => return false,
        }
    }
    true
}
