use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

/// Compute the `Content-MD5` header value for an encoded body.
pub fn content_md5(body: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(body);
    STANDARD.encode(hasher.finalize())
}
