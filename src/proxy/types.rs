//! Type definitions for the proxy module

use crate::config::UpstreamSettings;
use axum::http::StatusCode;
use nutype::nutype;
use std::time::Duration;
use thiserror::Error;

/// Default ceiling on an inbound request body (10 MiB)
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Default upstream call timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum size for inbound request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Default, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
    default = 10485760
)]
pub struct RequestSizeLimit(usize);

/// Upstream call timeout in whole seconds
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Default, TryFrom, AsRef),
    validate(predicate = |secs: &u64| *secs > 0),
    default = 30
)]
pub struct RequestTimeout(u64);

impl RequestTimeout {
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.into_inner())
    }
}

/// Base URL of the single upstream JSON-RPC server, `http://` or `https://`
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| {
        s.strip_prefix("http://")
            .or_else(|| s.strip_prefix("https://"))
            .is_some_and(|rest| !rest.is_empty())
            && s.parse::<http::Uri>().is_ok()
    }),
    derive(Clone, Debug, Display, PartialEq, Eq, TryFrom, AsRef)
)]
pub struct UpstreamUrl(String);

/// Proxy configuration
#[derive(Clone, Debug, Default)]
pub struct ProxyConfig {
    /// Forwarding target; `None` makes every call fail with 503
    pub upstream: Option<UpstreamUrl>,
    pub request_timeout: RequestTimeout,
    pub max_request_size: RequestSizeLimit,
}

impl ProxyConfig {
    /// Validate raw upstream settings; an empty URL means "no upstream"
    pub fn from_settings(settings: &UpstreamSettings) -> ProxyResult<Self> {
        let upstream = settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| {
                UpstreamUrl::try_new(url.to_string())
                    .map_err(|e| ProxyError::InvalidConfiguration(format!("upstream.url: {e}")))
            })
            .transpose()?;

        let request_timeout = RequestTimeout::try_new(settings.request_timeout_secs).map_err(|e| {
            ProxyError::InvalidConfiguration(format!("upstream.request_timeout_secs: {e}"))
        })?;

        let max_request_size = RequestSizeLimit::try_new(settings.max_request_size).map_err(|e| {
            ProxyError::InvalidConfiguration(format!("upstream.max_request_size: {e}"))
        })?;

        Ok(Self {
            upstream,
            request_timeout,
            max_request_size,
        })
    }

    pub fn with_upstream(mut self, upstream: UpstreamUrl) -> Self {
        self.upstream = Some(upstream);
        self
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    BadInput(String),

    #[error("No upstream target configured")]
    NoUpstreamConfigured,

    #[error("Upstream request failed: {0}")]
    TransportFailure(String),

    #[error("Failed to read upstream response: {0}")]
    UpstreamReadFailure(String),

    #[error("Invalid proxy configuration: {0}")]
    InvalidConfiguration(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadInput(_) => StatusCode::BAD_REQUEST,
            Self::NoUpstreamConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamReadFailure(_) | Self::InvalidConfiguration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn upstream_settings(url: Option<&str>) -> UpstreamSettings {
        UpstreamSettings {
            url: url.map(str::to_string),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }

    #[rstest]
    #[case("http://localhost:8545")]
    #[case("http://10.0.0.5:3000/rpc")]
    #[case("  http://upstream.internal  ")]
    #[case("https://rpc.example.com/v1")]
    #[case("https://10.0.0.5:8443")]
    fn accepts_http_and_https_upstreams(#[case] url: &str) {
        assert!(UpstreamUrl::try_new(url.to_string()).is_ok());
    }

    #[rstest]
    #[case("localhost:8545")]
    #[case("http://")]
    #[case("https://")]
    #[case("ftp://files.example.com")]
    #[case("")]
    fn rejects_unsupported_upstreams(#[case] url: &str) {
        assert!(UpstreamUrl::try_new(url.to_string()).is_err());
    }

    #[test]
    fn upstream_url_is_trimmed() {
        let url = UpstreamUrl::try_new("  http://localhost:1 ".to_string()).unwrap();
        assert_eq!(url.as_ref(), "http://localhost:1");
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn blank_upstream_means_none(#[case] url: Option<&str>) {
        let config = ProxyConfig::from_settings(&upstream_settings(url)).unwrap();
        assert!(config.upstream.is_none());
    }

    #[test]
    fn settings_are_validated() {
        let config =
            ProxyConfig::from_settings(&upstream_settings(Some("http://localhost:8545"))).unwrap();
        assert_eq!(config.request_timeout.as_duration(), Duration::from_secs(30));
        assert_eq!(*config.max_request_size.as_ref(), DEFAULT_MAX_REQUEST_SIZE);

        let mut zero_size = upstream_settings(None);
        zero_size.max_request_size = 0;
        assert!(matches!(
            ProxyConfig::from_settings(&zero_size),
            Err(ProxyError::InvalidConfiguration(_))
        ));

        assert!(ProxyConfig::from_settings(&upstream_settings(Some("nope"))).is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ProxyConfig::default();
        assert!(config.upstream.is_none());
        assert_eq!(config.max_request_size.into_inner(), DEFAULT_MAX_REQUEST_SIZE);
        assert_eq!(config.request_timeout.into_inner(), DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[rstest]
    #[case(ProxyError::BadInput("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ProxyError::NoUpstreamConfigured, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(ProxyError::TransportFailure("x".into()), StatusCode::BAD_GATEWAY)]
    #[case(ProxyError::UpstreamReadFailure("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn error_status_mapping(#[case] error: ProxyError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }
}
