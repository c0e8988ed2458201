//! Serving files from a folder.
//!
//! [`StaticFiles`] builds a GET handler for `{mount}/{file*}.{extension}`.
//! Its guard only lets a request through when the extension is allowed by
//! the [`ExtensionPolicy`] and the file exists inside the root folder, so
//! other routes and the fallback still see everything else.

use crate::error::{Error, Result};
use crate::handler::{Generator, Handler};
use crate::meta;
use crate::method::Method;
use crate::request::Request;
use crate::response::{Body, Response};
use async_trait::async_trait;
use bytes::Bytes;
use kiln_cache::CacheManager;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// How a file's contents are read and served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// UTF-8 text, kept in the file cache
    Text,
    /// Raw bytes, read on every request
    Bytes,
}

/// A family of extensions sharing a content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKind {
    pub extensions: Vec<String>,
    pub content_type: String,
    pub mode: ReadMode,
}

impl FileKind {
    pub fn text(extensions: &[&str], content_type: &str) -> Self {
        Self::new(extensions, content_type, ReadMode::Text)
    }

    pub fn binary(extensions: &[&str], content_type: &str) -> Self {
        Self::new(extensions, content_type, ReadMode::Bytes)
    }

    fn new(extensions: &[&str], content_type: &str, mode: ReadMode) -> Self {
        Self {
            extensions: extensions.iter().map(|ext| ext.to_ascii_lowercase()).collect(),
            content_type: content_type.to_string(),
            mode,
        }
    }
}

/// The file kinds a static handler may serve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionPolicy {
    kinds: Vec<FileKind>,
}

impl ExtensionPolicy {
    /// A policy that serves nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Common web assets
    pub fn web() -> Self {
        Self::empty()
            .allow(FileKind::text(&["html", "htm"], "text/html; charset=utf-8"))
            .allow(FileKind::text(&["css"], "text/css; charset=utf-8"))
            .allow(FileKind::text(&["js", "mjs"], "text/javascript; charset=utf-8"))
            .allow(FileKind::text(&["json"], "application/json"))
            .allow(FileKind::text(&["txt"], "text/plain; charset=utf-8"))
            .allow(FileKind::text(&["xml"], "application/xml"))
            .allow(FileKind::text(&["svg"], "image/svg+xml"))
            .allow(FileKind::binary(&["png"], "image/png"))
            .allow(FileKind::binary(&["jpg", "jpeg"], "image/jpeg"))
            .allow(FileKind::binary(&["gif"], "image/gif"))
            .allow(FileKind::binary(&["webp"], "image/webp"))
            .allow(FileKind::binary(&["ico"], "image/x-icon"))
            .allow(FileKind::binary(&["woff"], "font/woff"))
            .allow(FileKind::binary(&["woff2"], "font/woff2"))
            .allow(FileKind::binary(&["pdf"], "application/pdf"))
    }

    /// Add a kind; earlier kinds win for shared extensions
    pub fn allow(mut self, kind: FileKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn lookup(&self, extension: &str) -> Option<&FileKind> {
        self.kinds.iter().find(|kind| {
            kind.extensions
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(extension))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Where files come from and where they are mounted
#[derive(Debug, Clone)]
pub struct StaticFilesConfig {
    pub root: PathBuf,
    /// URL prefix, `/` for the site root
    pub mount: String,
    pub policy: ExtensionPolicy,
}

impl StaticFilesConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mount: "/".to_string(),
            policy: ExtensionPolicy::web(),
        }
    }

    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    pub fn policy(mut self, policy: ExtensionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// A file resolved by the guard, stored in the request meta
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Static file capability
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    mount: String,
    policy: Arc<ExtensionPolicy>,
}

impl StaticFiles {
    /// Validate `config`: the root must be an existing directory and the
    /// policy must allow something.
    pub fn new(config: StaticFilesConfig) -> Result<Self> {
        if config.policy.is_empty() {
            return Err(Error::StaticFiles("extension policy allows no files".to_string()));
        }
        let root = config.root.canonicalize().map_err(|err| {
            Error::StaticFiles(format!("root {}: {}", config.root.display(), err))
        })?;
        if !root.is_dir() {
            return Err(Error::StaticFiles(format!("root {} is not a directory", root.display())));
        }
        Ok(Self {
            root,
            mount: config.mount.trim_matches('/').to_string(),
            policy: Arc::new(config.policy),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a route match to a file under the root.
    ///
    /// Hidden segments, parent references and anything resolving outside
    /// the root are refused.
    ///
    /// Runs inside the route guard, which is synchronous, so the
    /// `canonicalize` and metadata calls block the calling task. They stay
    /// here because a missing file must fall through to later routes
    /// instead of ending in this handler. Reads happen in the generator
    /// through `tokio::fs`.
    pub fn resolve(&self, file: &str, extension: &str) -> Option<ResolvedFile> {
        let kind = self.policy.lookup(extension)?;
        let relative = PathBuf::from(format!("{}.{}", file, extension));
        let clean = relative.components().all(|component| match component {
            Component::Normal(part) => !part.to_string_lossy().starts_with('.'),
            _ => false,
        });
        if !clean {
            return None;
        }

        let path = self.root.join(&relative).canonicalize().ok()?;
        if !path.starts_with(&self.root) || !path.is_file() {
            return None;
        }
        Some(ResolvedFile {
            path,
            kind: kind.clone(),
        })
    }

    /// GET handler serving this folder through `cache`
    pub fn handler(&self, cache: Arc<CacheManager>) -> Result<Handler> {
        let pattern = if self.mount.is_empty() {
            "{file*}.{extension}".to_string()
        } else {
            format!("{}/{{file*}}.{{extension}}", self.mount)
        };
        let files = self.clone();
        Handler::builder(pattern)
            .name(format!("static:/{}", self.mount))
            .method(Method::Get)
            .guard(move |request| {
                let resolved = match (request.variable("file"), request.variable("extension")) {
                    (Some(file), Some(extension)) => files.resolve(file, extension),
                    _ => None,
                };
                match resolved {
                    Some(resolved) => {
                        request.meta_mut().insert(meta::FILE, resolved);
                        true
                    }
                    None => false,
                }
            })
            .generator(FileGenerator { cache })
            .build()
    }
}

struct FileGenerator {
    cache: Arc<CacheManager>,
}

#[async_trait]
impl Generator for FileGenerator {
    async fn generate(&self, request: &mut Request) -> Result<Option<Response>> {
        let file = request
            .meta()
            .get::<ResolvedFile>(meta::FILE)
            .cloned()
            .ok_or_else(|| Error::StaticFiles("no file resolved for request".to_string()))?;

        let body = match file.kind.mode {
            ReadMode::Text => match self.cache.file(&file.path) {
                Some(text) => {
                    trace!(path = %file.path.display(), "file cache hit");
                    Body::Text(text.to_string())
                }
                None => {
                    let text = tokio::fs::read_to_string(&file.path).await?;
                    self.cache.store_file(file.path.clone(), Arc::from(text.as_str()));
                    Body::Text(text)
                }
            },
            ReadMode::Bytes => Body::Bytes(Bytes::from(tokio::fs::read(&file.path).await?)),
        };

        Ok(Some(
            Response::ok()
                .with_content_type(&file.kind.content_type)
                .with_body(body),
        ))
    }
}
