//! Template contract and a minimal substitution engine.
//!
//! The pipeline renders text bodies through a [`TemplateEngine`] when one is
//! installed on the server. Values come from [`VariableProvider`]s built
//! around the current request.

use crate::error::Result;
use crate::request::Request;
use kiln_cache::CacheManager;
use std::sync::Arc;
use tracing::trace;

/// A named source of template values
pub trait VariableProvider {
    fn name(&self) -> &str;
    fn value(&self, key: &str) -> Option<String>;
}

/// Renders text against a set of providers
pub trait TemplateEngine: Send + Sync {
    fn render(&self, text: &str, providers: &[&dyn VariableProvider]) -> Result<String>;
}

/// Query string parameters, as `query.<key>`
pub struct QueryVariables<'a>(pub &'a Request);

impl VariableProvider for QueryVariables<'_> {
    fn name(&self) -> &str {
        "query"
    }

    fn value(&self, key: &str) -> Option<String> {
        self.0.query_param(key).map(str::to_string)
    }
}

/// Form fields, as `post.<key>`
pub struct FormVariables<'a>(pub &'a Request);

impl VariableProvider for FormVariables<'_> {
    fn name(&self) -> &str {
        "post"
    }

    fn value(&self, key: &str) -> Option<String> {
        self.0.form_param(key).map(str::to_string)
    }
}

/// Route variables, as `route.<name>`
pub struct RouteVariables<'a>(pub &'a Request);

impl VariableProvider for RouteVariables<'_> {
    fn name(&self) -> &str {
        "route"
    }

    fn value(&self, key: &str) -> Option<String> {
        self.0.variable(key).map(str::to_string)
    }
}

/// Session values, as `session.<key>`; `session.token` is the token itself
pub struct SessionVariables<'a>(pub &'a Request);

impl VariableProvider for SessionVariables<'_> {
    fn name(&self) -> &str {
        "session"
    }

    fn value(&self, key: &str) -> Option<String> {
        let session = self.0.session()?;
        match key {
            "token" => Some(session.token().to_string()),
            _ => session.get(key),
        }
    }
}

/// Request line facts, as `request.path`, `request.method`, `request.version`
/// and `request.peer`
pub struct RequestVariables<'a>(pub &'a Request);

impl VariableProvider for RequestVariables<'_> {
    fn name(&self) -> &str {
        "request"
    }

    fn value(&self, key: &str) -> Option<String> {
        match key {
            "path" => Some(self.0.path().to_string()),
            "method" => Some(self.0.method().to_string()),
            "version" => Some(self.0.version().to_string()),
            "peer" => self.0.peer_addr().map(|addr| addr.to_string()),
            _ => None,
        }
    }
}

/// Render `text` with every request-scoped provider
pub fn render_for_request(engine: &dyn TemplateEngine, request: &Request, text: &str) -> Result<String> {
    let query = QueryVariables(request);
    let form = FormVariables(request);
    let route = RouteVariables(request);
    let session = SessionVariables(request);
    let req = RequestVariables(request);
    let providers: [&dyn VariableProvider; 5] = [&query, &form, &route, &session, &req];
    engine.render(text, &providers)
}

/// Loads fragment sources by id
pub type FragmentLoader = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

const MAX_INCLUDE_DEPTH: usize = 8;

/// `{{provider.key}}` substitution with `{{> id}}` fragment includes.
///
/// Fragments are fetched through the fragment cache and rendered in place.
/// Placeholders that resolve to nothing are left in the output untouched,
/// so text that merely contains braces passes through unchanged.
pub struct SimpleTemplateEngine {
    cache: Arc<CacheManager>,
    loader: Option<FragmentLoader>,
}

impl SimpleTemplateEngine {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache, loader: None }
    }

    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    fn fragment(&self, id: &str) -> Option<Arc<str>> {
        if let Some(cached) = self.cache.fragment(id) {
            return Some(cached);
        }
        let loader = self.loader.as_ref()?;
        let source: Arc<str> = Arc::from(loader(id)?);
        trace!(fragment = id, "fragment loaded");
        self.cache.store_fragment(id, source.clone());
        Some(source)
    }

    fn render_into(&self, out: &mut String, text: &str, providers: &[&dyn VariableProvider], depth: usize) {
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return;
            };
            let expr = after[..end].trim();
            let whole = &rest[start..start + 2 + end + 2];
            rest = &after[end + 2..];

            if let Some(id) = expr.strip_prefix('>') {
                match self.fragment(id.trim()) {
                    Some(fragment) if depth < MAX_INCLUDE_DEPTH => {
                        self.render_into(out, &fragment, providers, depth + 1)
                    }
                    _ => out.push_str(whole),
                }
                continue;
            }

            let value = expr.split_once('.').and_then(|(scope, key)| {
                providers
                    .iter()
                    .find(|provider| provider.name() == scope)
                    .and_then(|provider| provider.value(key))
            });
            match value {
                Some(value) => out.push_str(&value),
                None => out.push_str(whole),
            }
        }
        out.push_str(rest);
    }
}

impl TemplateEngine for SimpleTemplateEngine {
    fn render(&self, text: &str, providers: &[&dyn VariableProvider]) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        self.render_into(&mut out, text, providers, 0);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::meta::{VARIABLES, Variables};
    use kiln_cache::CacheManagerConfig;

    fn engine() -> SimpleTemplateEngine {
        let cache = Arc::new(CacheManager::new(CacheManagerConfig::default()).unwrap());
        SimpleTemplateEngine::new(cache).with_loader(|id| match id {
            "header" => Some("<h1>{{query.title}}</h1>".to_string()),
            "loop" => Some("{{> loop}}".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_substitution() {
        let mut request = Request::new(Method::Get, "/post/7").with_query_param("title", "Hi");
        let mut vars = Variables::new();
        vars.insert("id".into(), "7".into());
        request.meta_mut().insert(VARIABLES, vars);

        let out = render_for_request(
            &engine(),
            &request,
            "{{request.path}} #{{ route.id }} {{query.title}}",
        )
        .unwrap();
        assert_eq!(out, "/post/7 #7 Hi");
    }

    #[test]
    fn test_unresolved_placeholders_pass_through() {
        let request = Request::new(Method::Get, "/");
        let text = "function f() { return {{query.none}}; } {{ plain }} {{ open";
        assert_eq!(render_for_request(&engine(), &request, text).unwrap(), text);
    }

    #[test]
    fn test_fragments_are_cached() {
        let engine = engine();
        let request = Request::new(Method::Get, "/").with_query_param("title", "Kiln");

        let out = render_for_request(&engine, &request, "{{> header}}").unwrap();
        assert_eq!(out, "<h1>Kiln</h1>");
        assert!(engine.cache.fragment("header").is_some());
    }

    #[test]
    fn test_include_depth_is_bounded() {
        let request = Request::new(Method::Get, "/");
        let out = render_for_request(&engine(), &request, "{{> loop}}").unwrap();
        assert_eq!(out, "{{> loop}}");
    }
}
