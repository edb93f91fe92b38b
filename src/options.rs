/// Configures timeout, retry and telemetry thresholds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Default per-attempt timeout in milliseconds.
    ///
    /// A [`RequestSpec`](crate::RequestSpec) may override it.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    ///
    /// Zero retries immediately.
    pub retry_backoff_ms: u64,
    /// Successful calls slower than this are reported at warn level.
    pub slow_call_threshold_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            max_retries: 3,
            retry_backoff_ms: 0,
            slow_call_threshold_ms: 2_000,
        }
    }
}
