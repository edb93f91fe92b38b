use std::{
    fmt,
    time::{Duration, Instant},
};

use reqwest::{header, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;

use crate::{
    cancel::{CancellationHandle, Elapsed},
    retry::RetryState,
    ApiError, ClientOptions, RequestSpec, Result, Severity, Telemetry,
};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.ecomarket.com/api";

const JSON_MIME: &str = "application/json";

#[derive(Clone)]
/// HTTP client for the EcoMarket REST API.
pub struct EcoMarketClient {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
    options: ClientOptions,
    telemetry: Telemetry,
}

impl fmt::Debug for EcoMarketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcoMarketClient")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl Default for EcoMarketClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl EcoMarketClient {
    /// Creates a client rooted at `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            authorization: None,
            options: ClientOptions::default(),
            telemetry: Telemetry::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `ECOMARKET_API_URL`: API root, required
    /// - `ECOMARKET_TOKEN`: bearer token, optional
    /// - `ECOMARKET_LOG_LEVEL`: minimum telemetry severity, optional
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ecomarket_http::EcoMarketClient;
    ///
    /// let api = EcoMarketClient::from_env().expect("missing ECOMARKET_API_URL");
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("ECOMARKET_API_URL")
            .map_err(|_| "missing ECOMARKET_API_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("ECOMARKET_API_URL is set but empty".to_owned());
        }

        let mut client = Self::new(url.trim());
        if let Ok(token) = std::env::var("ECOMARKET_TOKEN") {
            if !token.trim().is_empty() {
                client = client.with_bearer(token);
            }
        }
        if let Ok(level) = std::env::var("ECOMARKET_LOG_LEVEL") {
            let level: Severity = level
                .parse()
                .map_err(|err| format!("invalid ECOMARKET_LOG_LEVEL: {err}"))?;
            client.telemetry.configure_level(level);
        }
        Ok(client)
    }

    /// Sends `Authorization: Bearer <token>` on every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer(self, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.with_raw_auth(authorization)
    }

    /// Sends the given value verbatim as the `Authorization` header.
    pub fn with_raw_auth(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Replaces the telemetry handle. Clones of `telemetry` keep sharing it.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Runs one logical call and returns the parsed JSON body.
    ///
    /// Timeouts and transport failures are retried up to
    /// [`ClientOptions::max_retries`] times. Any HTTP-level rejection or
    /// malformed response ends the call on the attempt that produced it.
    /// A `204 No Content` yields `Value::Null`.
    pub async fn execute(&self, spec: RequestSpec) -> Result<JsonValue> {
        self.execute_with(&spec, |_, body| Ok(body)).await
    }

    /// Like [`execute`](Self::execute), decoding the body into `T`.
    ///
    /// A body that does not fit `T` fails the call with
    /// [`ErrorKind::MalformedResponse`](crate::ErrorKind::MalformedResponse)
    /// and is reported like any other terminal failure.
    pub async fn execute_as<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        self.execute_with(&spec, |status, body| {
            serde_json::from_value(body).map_err(|err| ApiError::MalformedResponse {
                status: status.as_u16(),
                message: format!(
                    "unexpected response shape for {} {}: {err}",
                    spec.method, spec.endpoint
                ),
            })
        })
        .await
    }

    /// Runs the attempt loop and hands a classified success to `decode`.
    ///
    /// `decode` runs before the success record is emitted; its error ends
    /// the call without retry.
    pub(crate) async fn execute_with<T, F>(&self, spec: &RequestSpec, decode: F) -> Result<T>
    where
        F: Fn(StatusCode, JsonValue) -> Result<T>,
    {
        spec.validate()?;
        let url = self.build_url(spec)?;
        let timeout = Duration::from_millis(spec.timeout_ms.unwrap_or(self.options.timeout_ms));
        let call_started = Instant::now();
        let mut retry = RetryState::new(self.options.max_retries);

        loop {
            let mut attempt = AttemptContext::open(retry.attempt_number(), timeout);
            self.telemetry.emit(
                Severity::Debug,
                format!("request started: {} {}", spec.method, spec.endpoint),
                json!({
                    "endpoint": spec.endpoint,
                    "method": spec.method.as_str(),
                    "url": url.as_str(),
                    "attempt": attempt.number,
                    "max_attempts": retry.max_retries() + 1,
                    "timeout_ms": duration_ms(timeout),
                    "headers": self.header_summary(),
                }),
            );

            let outcome = attempt.cancel.guard(self.send_once(spec, &url)).await;
            let elapsed = attempt.started.elapsed();

            let failure = match outcome {
                Ok(Ok(raw)) => match classify(raw).and_then(|(status, body)| {
                    decode(status, body).map(|value| (status, value))
                }) {
                    Ok((status, value)) => {
                        self.report_success(spec, &attempt, status, elapsed);
                        return Ok(value);
                    }
                    Err(err) => AttemptError::Terminal(err),
                },
                Ok(Err(err)) if err.is_timeout() => AttemptError::TimedOut,
                Ok(Err(err)) if should_retry_transport(&err) => AttemptError::Transport(err),
                Ok(Err(err)) => AttemptError::Terminal(unsendable(err, attempt.number)),
                Err(Elapsed) => AttemptError::TimedOut,
            };

            if failure.is_retryable() && retry.can_retry() {
                self.telemetry.emit(
                    Severity::Warn,
                    format!(
                        "retrying request ({}/{}): {} {}",
                        retry.retry_count() + 1,
                        retry.max_retries(),
                        spec.method,
                        spec.endpoint
                    ),
                    json!({
                        "endpoint": spec.endpoint,
                        "method": spec.method.as_str(),
                        "attempt": attempt.number,
                        "reason": failure.reason(attempt.cancel.timeout()),
                        "duration_ms": duration_ms(elapsed),
                    }),
                );
                drop(attempt);
                self.wait_before_retry(retry.retry_count()).await;
                retry.record_retry();
                continue;
            }

            let err = failure.into_api_error(attempt.number, retry.can_retry(), timeout);
            self.telemetry.emit(
                Severity::Error,
                format!("request failed: {} {}", spec.method, spec.endpoint),
                json!({
                    "endpoint": spec.endpoint,
                    "method": spec.method.as_str(),
                    "attempt": attempt.number,
                    "kind": format!("{:?}", err.kind()),
                    "error": err.message(),
                    "status": err.http_status(),
                    "retries_exhausted": err.retries_exhausted(),
                    "duration_ms": duration_ms(elapsed),
                    "total_duration_ms": duration_ms(call_started.elapsed()),
                    "detail": format!("{err:?}"),
                }),
            );
            return Err(err);
        }
    }

    async fn send_once(
        &self,
        spec: &RequestSpec,
        url: &Url,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut request = self
            .http
            .request(spec.method.to_reqwest(), url.clone())
            .header(header::CONTENT_TYPE, JSON_MIME)
            .header(header::ACCEPT, JSON_MIME);
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }
        if let Some(body) = spec.wire_body() {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    fn report_success(
        &self,
        spec: &RequestSpec,
        attempt: &AttemptContext,
        status: StatusCode,
        elapsed: Duration,
    ) {
        let slow = elapsed > Duration::from_millis(self.options.slow_call_threshold_ms);
        let severity = if slow { Severity::Warn } else { Severity::Info };
        self.telemetry.emit(
            severity,
            format!("request completed: {} {}", spec.method, spec.endpoint),
            json!({
                "endpoint": spec.endpoint,
                "method": spec.method.as_str(),
                "attempt": attempt.number,
                "status": status.as_u16(),
                "duration_ms": duration_ms(elapsed),
                "slow": slow,
            }),
        );
    }

    fn build_url(&self, spec: &RequestSpec) -> Result<Url> {
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            spec.endpoint.trim().trim_start_matches('/')
        );
        let mut url = Url::parse(&raw)
            .map_err(|err| ApiError::InvalidRequest(format!("invalid url '{raw}': {err}")))?;
        if !spec.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &spec.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn header_summary(&self) -> JsonValue {
        let mut headers = json!({
            "Content-Type": JSON_MIME,
            "Accept": JSON_MIME,
        });
        if let (Some(authorization), Some(map)) = (&self.authorization, headers.as_object_mut()) {
            map.insert(
                "Authorization".to_owned(),
                JsonValue::String(authorization.clone()),
            );
        }
        headers
    }

    /// Waits before the next retry attempt (exponential backoff).
    async fn wait_before_retry(&self, retry_count: usize) {
        if self.options.retry_backoff_ms == 0 {
            return;
        }
        let exp = retry_count.min(16) as u32;
        let multiplier = 1u64 << exp;
        let delay_ms = self.options.retry_backoff_ms.saturating_mul(multiplier);

        tracing::debug!("retrying request after {} ms", delay_ms);
        sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// One physical attempt. Owns the deadline until the attempt resolves.
struct AttemptContext {
    number: usize,
    started: Instant,
    cancel: CancellationHandle,
}

impl AttemptContext {
    fn open(number: usize, timeout: Duration) -> Self {
        Self {
            number,
            started: Instant::now(),
            cancel: CancellationHandle::arm(timeout),
        }
    }
}

struct RawResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: Vec<u8>,
}

enum AttemptError {
    TimedOut,
    Transport(reqwest::Error),
    Terminal(ApiError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Transport(_))
    }

    fn reason(&self, timeout: Duration) -> String {
        match self {
            Self::TimedOut => format!("timed out after {} ms", duration_ms(timeout)),
            Self::Transport(err) => err.to_string(),
            Self::Terminal(err) => err.to_string(),
        }
    }

    fn into_api_error(self, attempts: usize, budget_left: bool, timeout: Duration) -> ApiError {
        let retries_exhausted = !budget_left;
        match self {
            Self::TimedOut => ApiError::Timeout {
                message: format!(
                    "request timed out after {} ms; retries exhausted after {attempts} attempts",
                    duration_ms(timeout)
                ),
                attempts,
                retries_exhausted,
            },
            Self::Transport(err) => ApiError::Network {
                message: format!("{err}; retries exhausted after {attempts} attempts"),
                attempts,
                retries_exhausted,
                source: Some(err),
            },
            Self::Terminal(err) => err,
        }
    }
}

/// Failures where the request may not have reached the server.
fn should_retry_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_request() || err.is_body() || err.is_connect()
}

/// Maps a transport error that retrying cannot fix (bad header value,
/// redirect policy, ...) to a terminal error.
fn unsendable(err: reqwest::Error, attempts: usize) -> ApiError {
    if err.is_builder() {
        return ApiError::InvalidRequest(format!("cannot build request: {err}"));
    }
    ApiError::Network {
        message: err.to_string(),
        attempts,
        retries_exhausted: false,
        source: Some(err),
    }
}

fn classify(raw: RawResponse) -> std::result::Result<(StatusCode, JsonValue), ApiError> {
    let status = raw.status;
    if status == StatusCode::NO_CONTENT {
        return Ok((status, JsonValue::Null));
    }

    let payload = if raw.content_type.as_deref().is_some_and(is_json_content_type) {
        let parsed = serde_json::from_slice::<JsonValue>(&raw.body).map_err(|err| {
            ApiError::MalformedResponse {
                status: status.as_u16(),
                message: format!("invalid JSON body: {err}"),
            }
        })?;
        Some(parsed)
    } else {
        None
    };

    if status.is_success() {
        return payload.map(|body| (status, body)).ok_or_else(|| {
            ApiError::MalformedResponse {
                status: status.as_u16(),
                message: format!(
                    "expected {JSON_MIME} response, got '{}' (possible proxy or HTML page)",
                    raw.content_type.as_deref().unwrap_or("no content type")
                ),
            }
        });
    }

    let message = payload
        .as_ref()
        .and_then(payload_message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if status == StatusCode::CONFLICT {
        Err(ApiError::Conflict { message, payload })
    } else {
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
            payload,
        })
    }
}

fn is_json_content_type(value: &str) -> bool {
    value.to_ascii_lowercase().contains(JSON_MIME)
}

fn payload_message(payload: &JsonValue) -> Option<String> {
    ["message", "detail"]
        .iter()
        .find_map(|key| payload.get(key).and_then(JsonValue::as_str))
        .map(str::to_owned)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;
    use serde_json::json;
    use tokio::time::Instant;

    use super::{
        classify, is_json_content_type, normalize_bearer_authorization, EcoMarketClient,
        RawResponse,
    };
    use crate::{ClientOptions, ErrorKind, RequestSpec};

    fn with_backoff(retry_backoff_ms: u64) -> EcoMarketClient {
        EcoMarketClient::new("https://api.example.com/api").with_options(ClientOptions {
            retry_backoff_ms,
            ..ClientOptions::default()
        })
    }

    fn raw(status: StatusCode, content_type: Option<&str>, body: &str) -> RawResponse {
        RawResponse {
            status,
            content_type: content_type.map(str::to_owned),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = EcoMarketClient::new("https://api/api").with_raw_auth("secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn json_content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(!is_json_content_type("text/html"));
    }

    #[test]
    fn build_url_joins_path_and_encodes_query() {
        let client = EcoMarketClient::new("https://api.example.com/api/");
        let url = client
            .build_url(&RequestSpec::get("/productos").with_query("nombre", "Miel & Limón"))
            .expect("must build");
        assert_eq!(url.path(), "/api/productos");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("nombre".to_owned(), "Miel & Limón".to_owned())]
        );
    }

    #[test]
    fn build_url_keeps_inline_query() {
        let client = EcoMarketClient::new("https://api.example.com/api");
        let url = client
            .build_url(&RequestSpec::get("productos?nombre=miel"))
            .expect("must build");
        assert_eq!(url.query(), Some("nombre=miel"));
    }

    #[test]
    fn classify_success_json() {
        let (status, body) = classify(raw(
            StatusCode::OK,
            Some("application/json"),
            r#"[{"id":1}]"#,
        ))
        .expect("must succeed");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"id": 1}]));
    }

    #[test]
    fn classify_html_success_is_malformed() {
        let err = classify(raw(StatusCode::OK, Some("text/html"), "<html></html>"))
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn classify_no_content_is_null() {
        let (_, body) = classify(raw(StatusCode::NO_CONTENT, None, "")).expect("must succeed");
        assert!(body.is_null());
    }

    #[test]
    fn classify_error_prefers_detail_when_message_missing() {
        let err = classify(raw(
            StatusCode::BAD_REQUEST,
            Some("application/json"),
            r#"{"detail":"precio inválido"}"#,
        ))
        .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
        assert_eq!(err.message(), "precio inválido");
    }

    #[test]
    fn classify_error_without_json_uses_generic_message() {
        let err = classify(raw(StatusCode::BAD_GATEWAY, Some("text/plain"), "upstream"))
            .expect_err("must fail");
        assert_eq!(err.message(), "HTTP 502");
        assert_eq!(err.http_status(), Some(502));
        assert!(err.server_payload().is_none());
    }

    #[test]
    fn classify_conflict_keeps_payload() {
        let err = classify(raw(
            StatusCode::CONFLICT,
            Some("application/json"),
            r#"{"message":"duplicado"}"#,
        ))
        .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.server_payload(), Some(&json!({"message": "duplicado"})));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_per_retry() {
        let client = with_backoff(100);

        for (retry_count, expected_ms) in [(0, 100), (1, 200), (2, 400)] {
            let started = Instant::now();
            client.wait_before_retry(retry_count).await;
            let waited = started.elapsed();
            assert!(
                waited >= Duration::from_millis(expected_ms)
                    && waited < Duration::from_millis(expected_ms + 50),
                "retry {retry_count} waited {waited:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_backoff_does_not_sleep() {
        let client = with_backoff(0);

        let started = Instant::now();
        for retry_count in 0..4 {
            client.wait_before_retry(retry_count).await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
