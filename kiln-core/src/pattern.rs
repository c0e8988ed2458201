//! Route patterns compiled to anchored regular expressions.
//!
//! Syntax:
//!
//! - literal text, matched case-insensitively
//! - `{name}` or `<name>`: a required variable
//! - `{name*}`: a variable that may span delimiters
//! - `[name]` or `[name=default]`: an optional variable
//!
//! `/` and `.` delimit variables. An absent optional variable also consumes
//! the delimiter in front of it, so `user/[id]` matches `/user` and `/user/7`.
//! Leading and trailing slashes are ignored on both sides.

use crate::error::{Error, Result};
use crate::meta::Variables;
use regex::Regex;
use std::fmt;

const SEGMENT: &str = "([^/.]+)";
const TAIL: &str = "(.+?)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Required,
    Tail,
    Optional(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Variable { name: String, kind: Kind },
}

#[derive(Clone)]
enum Matcher {
    /// Patterns without variables skip the regex engine
    Literal(String),
    Regex(Regex),
}

/// A compiled route pattern
#[derive(Clone)]
pub struct RoutePattern {
    source: String,
    canonical: String,
    matcher: Matcher,
    // (name, default) in capture group order
    variables: Vec<(String, Option<String>)>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Pattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let tokens = tokenize(pattern.trim_matches('/')).map_err(|reason| invalid(&reason))?;
        match tokens.as_slice() {
            [] => return Ok(Self::literal(pattern, String::new())),
            [Token::Literal(text)] => return Ok(Self::literal(pattern, text.clone())),
            _ => {}
        }

        let mut variables: Vec<(String, Option<String>)> = Vec::new();
        let mut expr = String::from("(?i)^");
        let mut canonical = String::new();

        for (idx, token) in tokens.iter().enumerate() {
            match token {
                Token::Literal(text) => {
                    // A delimiter right before an optional variable moves into its group
                    let text = match tokens.get(idx + 1) {
                        Some(Token::Variable {
                            kind: Kind::Optional(_),
                            ..
                        }) if text.ends_with(['/', '.']) => &text[..text.len() - 1],
                        _ => text.as_str(),
                    };
                    expr.push_str(&regex::escape(text));
                }
                Token::Variable { name, kind } => {
                    if variables.iter().any(|(existing, _)| existing == name) {
                        return Err(invalid(&format!("duplicate variable '{}'", name)));
                    }
                    match kind {
                        Kind::Required => expr.push_str(SEGMENT),
                        Kind::Tail => expr.push_str(TAIL),
                        Kind::Optional(_) => {
                            let delimiter = match idx.checked_sub(1).map(|prev| &tokens[prev]) {
                                Some(Token::Literal(text)) => text.chars().last().filter(|c| *c == '/' || *c == '.'),
                                _ => None,
                            };
                            match delimiter {
                                Some(delim) => {
                                    expr.push_str("(?:");
                                    expr.push_str(&regex::escape(&delim.to_string()));
                                    expr.push_str(SEGMENT);
                                    expr.push_str(")?");
                                }
                                None => {
                                    expr.push_str(SEGMENT);
                                    expr.push('?');
                                }
                            }
                        }
                    }
                    let default = match kind {
                        Kind::Optional(default) => default.clone(),
                        _ => None,
                    };
                    variables.push((name.clone(), default));
                }
            }
            write_canonical(&mut canonical, token);
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|err| invalid(&err.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            canonical: canonical.to_lowercase(),
            matcher: Matcher::Regex(regex),
            variables,
        })
    }

    /// The pattern matching only `/`
    pub fn root() -> Self {
        Self::literal("/", String::new())
    }

    fn literal(source: &str, text: String) -> Self {
        Self {
            source: source.to_string(),
            canonical: text.to_lowercase(),
            matcher: Matcher::Literal(text),
            variables: Vec::new(),
        }
    }

    /// Pattern as registered
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Normalized form used to detect duplicate routes
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(name, _)| name.as_str())
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        match &self.matcher {
            Matcher::Literal(text) => text.eq_ignore_ascii_case(path),
            Matcher::Regex(regex) => regex.is_match(path),
        }
    }

    /// Match `path` and collect its variables.
    ///
    /// Absent optional variables take their default, or are left out.
    pub fn captures(&self, path: &str) -> Option<Variables> {
        let path = path.trim_matches('/');
        let regex = match &self.matcher {
            Matcher::Literal(text) => {
                return text.eq_ignore_ascii_case(path).then(Variables::new);
            }
            Matcher::Regex(regex) => regex,
        };
        let captures = regex.captures(path)?;
        let mut vars = Variables::with_capacity(self.variables.len());
        for (idx, (name, default)) in self.variables.iter().enumerate() {
            match captures.get(idx + 1) {
                Some(value) => {
                    vars.insert(name.clone(), value.as_str().to_string());
                }
                None => {
                    if let Some(default) = default {
                        vars.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        Some(vars)
    }
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutePattern")
            .field("source", &self.source)
            .field("canonical", &self.canonical)
            .finish()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn tokenize(pattern: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        let close = match c {
            '{' => '}',
            '<' => '>',
            '[' => ']',
            '}' | '>' | ']' => return Err(format!("unbalanced '{}'", c)),
            _ => {
                literal.push(c);
                continue;
            }
        };

        let mut inner = String::new();
        loop {
            match chars.next() {
                Some(ch) if ch == close => break,
                Some(ch @ ('{' | '<' | '[' | '}' | '>' | ']')) => {
                    return Err(format!("unexpected '{}' inside variable", ch));
                }
                Some(ch) => inner.push(ch),
                None => return Err(format!("unclosed '{}'", c)),
            }
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        let (name, kind) = match c {
            '[' => match inner.split_once('=') {
                Some((name, default)) => (name.to_string(), Kind::Optional(Some(default.to_string()))),
                None => (inner, Kind::Optional(None)),
            },
            '{' if inner.ends_with('*') => (inner[..inner.len() - 1].to_string(), Kind::Tail),
            _ => (inner, Kind::Required),
        };
        if name.is_empty() {
            return Err("empty variable name".to_string());
        }
        if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
            return Err(format!("invalid variable name '{}'", name));
        }
        tokens.push(Token::Variable { name, kind });
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn write_canonical(out: &mut String, token: &Token) {
    match token {
        Token::Literal(text) => out.push_str(text),
        Token::Variable { name, kind } => match kind {
            Kind::Required => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Kind::Tail => {
                out.push('{');
                out.push_str(name);
                out.push_str("*}");
            }
            Kind::Optional(default) => {
                out.push('[');
                out.push_str(name);
                if let Some(default) = default {
                    out.push('=');
                    out.push_str(default);
                }
                out.push(']');
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pattern: &str, path: &str) -> Option<Variables> {
        RoutePattern::parse(pattern).unwrap().captures(path)
    }

    #[test]
    fn test_literal_is_case_insensitive() {
        let pattern = RoutePattern::parse("/hello").unwrap();
        assert!(pattern.matches("/hello"));
        assert!(pattern.matches("/HELLO/"));
        assert!(!pattern.matches("/hello/world"));
    }

    #[test]
    fn test_root() {
        let pattern = RoutePattern::parse("/").unwrap();
        assert!(pattern.matches("/"));
        assert!(pattern.matches(""));
        assert!(!pattern.matches("/x"));
        assert_eq!(pattern.canonical(), RoutePattern::root().canonical());
    }

    #[test]
    fn test_required_variables() {
        let captured = vars("/user/{id}/<tab>", "/user/42/Posts").unwrap();
        assert_eq!(captured["id"], "42");
        assert_eq!(captured["tab"], "Posts");
        assert!(vars("/user/{id}", "/user/").is_none());
    }

    #[test]
    fn test_variables_stop_at_delimiters() {
        let captured = vars("{file}.{extension}", "/index.html").unwrap();
        assert_eq!(captured["file"], "index");
        assert_eq!(captured["extension"], "html");
        assert!(vars("{file}.{extension}", "/css/site.css").is_none());
    }

    #[test]
    fn test_tail_variable() {
        let captured = vars("static/{path*}.{extension}", "/static/css/v1.2/site.css").unwrap();
        assert_eq!(captured["path"], "css/v1.2/site");
        assert_eq!(captured["extension"], "css");
    }

    #[test]
    fn test_optional_variable() {
        assert_eq!(vars("/user/[id]", "/user").unwrap().get("id"), None);
        assert_eq!(vars("/user/[id]", "/user/7").unwrap()["id"], "7");
        assert_eq!(vars("/list/[page=1]", "/list").unwrap()["page"], "1");
        assert_eq!(vars("/list/[page=1]", "/list/3").unwrap()["page"], "3");
        assert!(vars("/user/[id]", "/username").is_none());
    }

    #[test]
    fn test_canonical() {
        let a = RoutePattern::parse("/Hello/<name>/").unwrap();
        let b = RoutePattern::parse("hello/{name}").unwrap();
        assert_eq!(a.canonical(), "hello/{name}");
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["/a/{id", "/a/id}", "/a/{}", "/a/{x}/{x}", "/a/[b{c}]", "/a/{b c}"] {
            assert!(
                matches!(RoutePattern::parse(bad), Err(Error::Pattern { .. })),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_literal_metacharacters_are_escaped() {
        let pattern = RoutePattern::parse("/a+b").unwrap();
        assert!(pattern.matches("/a+b"));
        assert!(!pattern.matches("/aab"));
    }
}
