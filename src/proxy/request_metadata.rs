//! Caller metadata extracted from inbound requests

use crate::domain::CapturedHeaders;
use crate::proxy::headers::{USER_AGENT, X_FORWARDED_FOR, X_REAL_IP};
use axum::http::HeaderMap;
use std::net::SocketAddr;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Best-effort client address
///
/// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer address
/// without its port. Empty when none is available.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(first) = header_str(headers, X_FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = header_str(headers, X_REAL_IP) {
        return real_ip.to_string();
    }

    remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Snapshot of inbound headers, first value per name
///
/// Values that are not visible ASCII are stored lossily.
pub fn capture_headers(headers: &HeaderMap) -> CapturedHeaders {
    let mut captured = CapturedHeaders::new();
    for (name, value) in headers {
        captured.capture(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[rstest]
    #[case(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")], "203.0.113.7")]
    #[case(&[("x-forwarded-for", " 198.51.100.2 ")], "198.51.100.2")]
    #[case(&[("x-real-ip", "192.0.2.44")], "192.0.2.44")]
    #[case(
        &[("x-forwarded-for", "203.0.113.7"), ("x-real-ip", "192.0.2.44")],
        "203.0.113.7"
    )]
    #[case(&[("x-forwarded-for", ""), ("x-real-ip", "192.0.2.44")], "192.0.2.44")]
    #[case(&[], "127.0.0.1")]
    fn client_ip_priority(#[case] pairs: &[(&'static str, &'static str)], #[case] expected: &str) {
        let remote: SocketAddr = "127.0.0.1:54321".parse().unwrap();
        assert_eq!(client_ip(&headers(pairs), Some(remote)), expected);
    }

    #[test]
    fn client_ip_without_any_source_is_empty() {
        assert_eq!(client_ip(&HeaderMap::new(), None), "");
    }

    #[test]
    fn ipv6_peer_is_rendered_without_port() {
        let remote: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(remote)), "::1");
    }

    #[test]
    fn captures_first_value_of_repeated_headers() {
        let map = headers(&[
            ("accept", "application/json"),
            ("accept", "text/event-stream"),
            ("user-agent", "probe/1.0"),
        ]);
        let captured = capture_headers(&map);

        assert_eq!(captured.get("accept"), Some("application/json"));
        assert_eq!(captured.len(), 2);
        assert_eq!(user_agent(&map), "probe/1.0");
    }

    #[test]
    fn missing_user_agent_is_empty() {
        assert_eq!(user_agent(&HeaderMap::new()), "");
    }
}
