use std::fmt;

use serde_json::Value as JsonValue;

use crate::ApiError;

/// HTTP methods used against the API.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a payload is sent on the wire for this method.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Patch)
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical call: where to go, how, and with what payload.
///
/// The same request is re-issued unchanged on every retry.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
    /// Path relative to the API base, e.g. `productos/5`.
    pub endpoint: String,
    pub method: Method,
    pub body: Option<JsonValue>,
    /// Query pairs appended percent-encoded after any inline query.
    pub query: Vec<(String, String)>,
    /// Per-attempt timeout; falls back to the client's default when `None`.
    pub timeout_ms: Option<u64>,
}

impl RequestSpec {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: None,
            query: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: JsonValue) -> Self {
        Self::new(Method::Post, endpoint).with_body(body)
    }

    pub fn patch(endpoint: impl Into<String>, body: JsonValue) -> Self {
        Self::new(Method::Patch, endpoint).with_body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Payload to put on the wire, if any.
    pub(crate) fn wire_body(&self) -> Option<&JsonValue> {
        self.body.as_ref().filter(|_| self.method.carries_body())
    }

    pub(crate) fn validate(&self) -> Result<(), ApiError> {
        if self.endpoint.trim().trim_matches('/').is_empty() {
            return Err(ApiError::InvalidRequest(
                "endpoint cannot be empty".to_owned(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ApiError::InvalidRequest(
                "timeout must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Method, RequestSpec};
    use crate::ErrorKind;

    #[test]
    fn body_only_on_wire_for_post_and_patch() {
        let post = RequestSpec::post("productos", json!({"nombre": "Miel"}));
        let delete = RequestSpec::delete("productos/1").with_body(json!({"ignored": true}));

        assert!(post.wire_body().is_some());
        assert!(delete.wire_body().is_none());
        assert!(Method::Patch.carries_body());
        assert!(!Method::Get.carries_body());
    }

    #[test]
    fn rejects_empty_endpoint() {
        let err = RequestSpec::get(" / ").validate().expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = RequestSpec::get("productos")
            .with_timeout_ms(0)
            .validate()
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn builder_collects_query_pairs() {
        let spec = RequestSpec::get("productos").with_query("nombre", "Miel & Limón");
        assert_eq!(
            spec.query,
            vec![("nombre".to_owned(), "Miel & Limón".to_owned())]
        );
        assert_eq!(spec.method.to_string(), "GET");
    }
}
