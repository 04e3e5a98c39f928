//! Identifier, payload and pagination types shared by the audit records
//!
//! These newtypes keep request correlation keys, store-assigned record IDs
//! and raw bodies from being confused with plain strings and integers.

use bytes::Bytes;
use nutype::nutype;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Prefix of every generated correlation key
pub const REQUEST_ID_PREFIX: &str = "req_";

/// Default number of records returned by a listing
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Largest accepted page size
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Correlation key linking an audit request to its audit response
///
/// Generated once per inbound call. The store enforces uniqueness; a
/// collision surfaces as a duplicate-key error rather than being pre-checked.
#[nutype(derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    AsRef
))]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new time-ordered correlation key
    ///
    /// UUIDv7 carries a millisecond timestamp plus 74 random bits, so two
    /// calls in the same millisecond still differ.
    pub fn generate() -> Self {
        Self::new(format!("{REQUEST_ID_PREFIX}{}", Uuid::now_v7().simple()))
    }
}

/// Sequence number assigned by the audit store on insert
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct RecordId(i64);

/// Raw, unmodified body bytes
///
/// Serializes as embedded JSON when the bytes parse as JSON, otherwise as a
/// lossy UTF-8 string, so read APIs stay readable for non-JSON traffic.
#[derive(Clone, PartialEq, Eq, Default, derive_more::From)]
pub struct Payload(Bytes);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match serde_json::from_slice::<serde_json::Value>(&self.0) {
            Ok(value) => value.serialize(serializer),
            Err(_) => serializer.serialize_str(&String::from_utf8_lossy(&self.0)),
        }
    }
}

/// Inbound header snapshot, first value per header name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapturedHeaders(BTreeMap<String, String>);

impl CapturedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header value unless one was already captured for the name
    pub fn capture(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pagination window for listing queries
///
/// Out-of-range limits fall back to the default rather than being clamped to
/// the nearest bound; negative offsets resolve to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    limit: i64,
    offset: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = limit
            .filter(|l| *l > 0 && *l <= MAX_PAGE_LIMIT)
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = offset.filter(|o| *o >= 0).unwrap_or(0);
        Self { limit, offset }
    }

    /// Build a page from raw query-string values; unparseable values use defaults
    pub fn from_query(limit: Option<&str>, offset: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|v| v.trim().parse::<i64>().ok());
        Self::new(parse(limit), parse(offset))
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case(Some(0), DEFAULT_PAGE_LIMIT)]
    #[case(Some(-5), DEFAULT_PAGE_LIMIT)]
    #[case(Some(5000), DEFAULT_PAGE_LIMIT)]
    #[case(Some(1001), DEFAULT_PAGE_LIMIT)]
    #[case(None, DEFAULT_PAGE_LIMIT)]
    #[case(Some(1), 1)]
    #[case(Some(1000), 1000)]
    fn page_limit_resolution(#[case] requested: Option<i64>, #[case] expected: i64) {
        assert_eq!(Page::new(requested, None).limit(), expected);
    }

    #[rstest]
    #[case(Some(-1), 0)]
    #[case(None, 0)]
    #[case(Some(0), 0)]
    #[case(Some(25), 25)]
    fn page_offset_resolution(#[case] requested: Option<i64>, #[case] expected: i64) {
        assert_eq!(Page::new(None, requested).offset(), expected);
    }

    #[test]
    fn page_from_query_ignores_garbage() {
        let page = Page::from_query(Some("abc"), Some("-3"));
        assert_eq!(page, Page::default());

        let page = Page::from_query(Some(" 20 "), Some("40"));
        assert_eq!(page.limit(), 20);
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn generated_request_ids_are_prefixed_and_unique() {
        let ids: HashSet<RequestId> = (0..1000).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.to_string().starts_with(REQUEST_ID_PREFIX)));
    }

    #[test]
    fn payload_serializes_json_inline_and_text_as_string() {
        let json = Payload::from(r#"{"a":1}"#);
        assert_eq!(serde_json::to_value(&json).unwrap(), serde_json::json!({"a": 1}));

        let text = Payload::from("not json");
        assert_eq!(
            serde_json::to_value(&text).unwrap(),
            serde_json::Value::String("not json".to_string())
        );
    }

    #[test]
    fn captured_headers_keep_first_value() {
        let mut headers = CapturedHeaders::new();
        headers.capture("accept", "application/json");
        headers.capture("accept", "text/plain");
        assert_eq!(headers.get("accept"), Some("application/json"));
        assert_eq!(headers.len(), 1);
    }
}
