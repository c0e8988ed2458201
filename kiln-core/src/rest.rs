//! JSON endpoints.
//!
//! [`Requirements`] declares the query or form parameters a request must
//! carry; a handler built with [`HandlerBuilder::requires`] rejects
//! requests missing any of them with a 400 JSON error. A
//! [`JsonGenerator`] turns a closure returning a serializable value into a
//! JSON response, honoring the `Accept` header.
//!
//! [`HandlerBuilder::requires`]: crate::handler::HandlerBuilder::requires

use crate::Status;
use crate::error::Result;
use crate::handler::Generator;
use crate::request::Request;
use crate::response::{APPLICATION_JSON, Response};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, warn};

/// Where a required parameter is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLocation {
    Query,
    Form,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterLocation::Query => f.write_str("query"),
            ParameterLocation::Form => f.write_str("form"),
        }
    }
}

/// A parameter the request must carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub location: ParameterLocation,
    pub key: String,
}

impl Requirement {
    fn is_met(&self, request: &Request) -> bool {
        match self.location {
            ParameterLocation::Query => request.query_param(&self.key).is_some(),
            ParameterLocation::Form => request.form_param(&self.key).is_some(),
        }
    }
}

/// The first unmet requirement
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing variable: {key}")]
pub struct MissingParameter {
    pub location: ParameterLocation,
    pub key: String,
}

impl MissingParameter {
    /// 400 with a JSON error body
    pub fn to_response(&self) -> Response {
        let body = json!({ "status": "error", "message": self.to_string() });
        match Response::json(&body) {
            Ok(response) => hardened(response.with_status(Status::BadRequest)),
            Err(_) => Response::status_only(Status::BadRequest),
        }
    }
}

/// Ordered list of required parameters, checked first to last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    requirements: Vec<Requirement>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement {
            location: ParameterLocation::Query,
            key: key.into(),
        });
        self
    }

    pub fn form(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement {
            location: ParameterLocation::Form,
            key: key.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn check(&self, request: &Request) -> std::result::Result<(), MissingParameter> {
        match self.requirements.iter().find(|requirement| !requirement.is_met(request)) {
            Some(requirement) => {
                debug!(location = %requirement.location, key = %requirement.key, "required parameter missing");
                Err(MissingParameter {
                    location: requirement.location,
                    key: requirement.key.clone(),
                })
            }
            None => Ok(()),
        }
    }
}

/// Whether the `Accept` header allows a JSON answer.
///
/// A missing header accepts anything.
pub fn accepts_json(request: &Request) -> bool {
    let Some(accept) = request.header("accept") else {
        return true;
    };
    accept
        .split(',')
        .map(|range| range.split(';').next().unwrap_or_default().trim())
        .any(|range| {
            range == "*/*" || range.eq_ignore_ascii_case("application/*") || range.eq_ignore_ascii_case(APPLICATION_JSON)
        })
}

/// Headers every JSON endpoint sends
pub fn hardened(response: Response) -> Response {
    response
        .with_header("X-Content-Type-Options", "nosniff")
        .with_header("X-Frame-Options", "deny")
        .with_header("Content-Security-Policy", "default-src 'none'")
}

/// Generator answering with the JSON form of a closure's value.
///
/// A request that does not accept JSON gets a status-only 406. A failing
/// closure yields a 500 whose JSON body carries the error message.
pub struct JsonGenerator<F>(F);

impl<F> JsonGenerator<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, T> Generator for JsonGenerator<F>
where
    F: Fn(&mut Request) -> Result<T> + Send + Sync,
    T: Serialize + Send,
{
    async fn generate(&self, request: &mut Request) -> Result<Option<Response>> {
        if !accepts_json(request) {
            return Ok(Some(Response::status_only(Status::NotAcceptable)));
        }
        let response = match (self.0)(request) {
            Ok(value) => Response::json(&value)?,
            Err(err) => {
                warn!(path = %request.path(), error = %err, "JSON endpoint failed");
                Response::json(&json!({ "status": "error", "error": err.to_string() }))?
                    .with_status(Status::InternalServerError)
            }
        };
        Ok(Some(hardened(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    #[test]
    fn test_requirements_report_first_missing() {
        let requirements = Requirements::new().query("page").form("user");
        let request = Request::new(Method::Post, "/api").with_form_param("user", "bob");

        let missing = requirements.check(&request).unwrap_err();
        assert_eq!(missing.key, "page");
        assert_eq!(missing.location, ParameterLocation::Query);
        assert_eq!(missing.to_string(), "Missing variable: page");

        let complete = request.with_query_param("page", "2");
        assert!(requirements.check(&complete).is_ok());
    }

    #[test]
    fn test_accepts_json() {
        let request = |accept: &str| Request::new(Method::Get, "/").with_header("Accept", accept);

        assert!(accepts_json(&Request::new(Method::Get, "/")));
        assert!(accepts_json(&request("*/*")));
        assert!(accepts_json(&request("text/html, application/json;q=0.9")));
        assert!(accepts_json(&request("application/*")));
        assert!(!accepts_json(&request("text/html")));
    }

    #[tokio::test]
    async fn test_generator_wraps_errors_as_json() {
        let generator = JsonGenerator::new(|_: &mut Request| -> Result<serde_json::Value> {
            Err(crate::Error::generation("database offline"))
        });
        let mut request = Request::new(Method::Get, "/api");

        let response = generator.generate(&mut request).await.unwrap().unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
        let body: serde_json::Value = serde_json::from_slice(response.body().as_bytes()).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "Generation failed: database offline");
    }
}
