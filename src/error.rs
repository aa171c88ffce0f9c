use thiserror::Error;

/// Failure of one physical request against the provider. Every variant is
/// transient at the fetch boundary: the client retries with backoff and
/// downgrades exhausted retries to "no data", so none of these ever reach
/// the aggregation layer.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection failure or request timeout.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status from the provider.
    #[error("provider returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Body that does not parse as the expected history payload.
    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),
}
