//! Server-sent-events unwrapping for stored response bodies
//!
//! Upstreams that answer JSON-RPC over an event stream wrap the payload in
//! `event:`/`data:` lines. Only the persisted copy is unwrapped; callers always
//! receive the upstream bytes untouched.

use std::borrow::Cow;

const EVENT_FIELD: &[u8] = b"event:";
const DATA_FIELD: &str = "data:";

/// Whether the body starts like an event stream
pub fn is_event_stream(body: &[u8]) -> bool {
    body.starts_with(EVENT_FIELD) || body.starts_with(DATA_FIELD.as_bytes())
}

/// Concatenated `data:` payloads of an event-stream body
///
/// Bodies that do not start with `event:` or `data:` are returned unchanged,
/// as are event streams without any data line.
pub fn unwrap_event_stream(body: &[u8]) -> Cow<'_, [u8]> {
    if !is_event_stream(body) {
        return Cow::Borrowed(body);
    }

    let text = String::from_utf8_lossy(body);
    let payload: String = text
        .split('\n')
        .filter_map(|line| line.trim().strip_prefix(DATA_FIELD))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if payload.is_empty() {
        Cow::Borrowed(body)
    } else {
        Cow::Owned(payload.into_bytes())
    }
}
