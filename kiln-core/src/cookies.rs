//! Request cookie parsing and `Set-Cookie` values

use std::fmt;

/// Cookies sent by the client, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    entries: Vec<(String, String)>,
}

impl Cookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `Cookie` header value into the jar.
    ///
    /// Tokens are `;`-separated `key=value` pairs; the value may be empty.
    /// Tokens without `=` or with an empty key are skipped.
    pub fn parse_header(&mut self, header: &str) {
        for token in header.split(';') {
            let token = token.trim();
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"');
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(key, _)| *key != name);
        self.entries.push((name, value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A cookie to be set on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub max_age: Option<u64>,
    pub http_only: bool,
    pub secure: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: Some("/".to_string()),
            max_age: None,
            http_only: false,
            secure: false,
        }
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// A cookie that tells the client to drop `name`
    pub fn expired(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let mut cookies = Cookies::new();
        cookies.parse_header("a=1; b=; flag; =x;  c = \"quoted\" ; a=2");

        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get_all("a").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(cookies.get("b"), Some(""));
        assert_eq!(cookies.get("c"), Some("quoted"));
        assert_eq!(cookies.get("flag"), None);
        assert_eq!(cookies.len(), 4);
    }

    #[test]
    fn test_set_cookie_display() {
        let cookie = SetCookie::new("kiln_session", "abc").http_only();
        assert_eq!(cookie.to_string(), "kiln_session=abc; Path=/; HttpOnly");
        assert_eq!(
            SetCookie::expired("x").to_string(),
            "x=; Path=/; Max-Age=0"
        );
    }
}
