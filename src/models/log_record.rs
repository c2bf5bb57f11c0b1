use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::models::filter::ContentBucket;
use crate::models::rule::RuleTarget;

/// Identifier assigned by the backend. Accepts both JSON strings and numbers
/// on the wire and always compares as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Text(text) => ItemId(text),
            WireId::Number(number) => ItemId(number.to_string()),
        })
    }
}

/// Where a captured request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Local,
    Proxied,
    Mitm,
    Websocket,
    Tunnel,
    Blocked,
    Error,
    /// Legacy transport marker, superseded by `websocket`
    Direct,
    /// Anything the backend reports that this client does not know yet
    #[serde(other)]
    Unknown,
}

impl Source {
    /// Every category the backend can report, in display order
    pub const ALL: [Source; 8] = [
        Source::Local,
        Source::Proxied,
        Source::Mitm,
        Source::Websocket,
        Source::Tunnel,
        Source::Blocked,
        Source::Error,
        Source::Direct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Local => "local",
            Source::Proxied => "proxied",
            Source::Mitm => "mitm",
            Source::Websocket => "websocket",
            Source::Tunnel => "tunnel",
            Source::Blocked => "blocked",
            Source::Error => "error",
            Source::Direct => "direct",
            Source::Unknown => "unknown",
        }
    }

    /// Old transport names that persisted whitelists may still contain
    pub fn is_legacy_transport(&self) -> bool {
        matches!(self, Source::Tunnel | Source::Direct)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .iter()
            .copied()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source category '{}'", s))
    }
}

/// A request or response body as the backend hands it over: either the raw
/// text or a JSON value it already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Json(serde_json::Value),
}

impl MessageBody {
    /// JSON view of the body, parsing raw text when it happens to be JSON
    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            MessageBody::Json(value) => Some(value.clone()),
            MessageBody::Text(text) => serde_json::from_str(text).ok(),
        }
    }
}

/// Summary of a rewrite rule that touched a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRewrite {
    #[serde(default)]
    pub id: Option<ItemId>,

    #[serde(default)]
    pub name: String,

    /// Rule kind as reported by the backend (e.g. `jsonPath`, `replace`)
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub target: RuleTarget,
}

/// What a frame carries. A frame holds at most one representation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FramePayload {
    /// Backend decoded the frame as JSON
    Json(serde_json::Value),

    /// Textual preview of a frame that is not JSON
    Preview(String),

    #[default]
    Absent,
}

/// One message or chunk inside a streamed exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireFrame", into = "WireFrame")]
pub struct Frame {
    /// Position within its sequence, increasing
    pub index: u64,

    /// Raw length in bytes
    pub length: u64,

    pub compressed: bool,

    pub end_stream: bool,

    pub payload: FramePayload,

    pub error: Option<String>,
}

impl Frame {
    /// Frame with no payload, mostly useful when building fixtures
    pub fn empty(index: u64) -> Self {
        Self {
            index,
            length: 0,
            compressed: false,
            end_stream: false,
            payload: FramePayload::Absent,
            error: None,
        }
    }

    pub fn with_payload(mut self, payload: FramePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }
}

/// Frame layout on the wire. `json` and `preview` may both be present there;
/// the decoded JSON wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    compressed: bool,
    #[serde(default, alias = "end")]
    end_stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<WireFrame> for Frame {
    fn from(wire: WireFrame) -> Self {
        let payload = match (wire.json, wire.preview) {
            (Some(json), _) if !json.is_null() => FramePayload::Json(json),
            (_, Some(preview)) => FramePayload::Preview(preview),
            _ => FramePayload::Absent,
        };

        Frame {
            index: wire.index,
            length: wire.length,
            compressed: wire.compressed,
            end_stream: wire.end_stream,
            payload,
            error: wire.error,
        }
    }
}

impl From<Frame> for WireFrame {
    fn from(frame: Frame) -> Self {
        let (json, preview) = match frame.payload {
            FramePayload::Json(json) => (Some(json), None),
            FramePayload::Preview(preview) => (None, Some(preview)),
            FramePayload::Absent => (None, None),
        };

        WireFrame {
            index: frame.index,
            length: frame.length,
            compressed: frame.compressed,
            end_stream: frame.end_stream,
            json,
            preview,
            error: frame.error,
        }
    }
}

/// Frames captured for a streamed or CONNECT exchange
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectExchange {
    /// As captured
    #[serde(default)]
    pub before: Vec<Frame>,

    /// After rewrite rules ran
    #[serde(default)]
    pub after: Vec<Frame>,
}

/// Accepts RFC 3339 strings and epoch milliseconds. Anything unreadable
/// becomes `None` so one odd field does not reject the whole page.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTimestamp {
        Millis(i64),
        FractionalMillis(f64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
        WireTimestamp::FractionalMillis(ms) => Utc.timestamp_millis_opt(ms as i64).single(),
        WireTimestamp::Text(text) => match DateTime::parse_from_rfc3339(text.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => text.trim().parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        },
        WireTimestamp::Other(_) => None,
    })
}

/// One captured request/message as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Stable identity key across paginated windows
    pub id: ItemId,

    #[serde(default)]
    pub method: String,

    pub source: Source,

    /// Short URL as shown in list views
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub full_url: Option<String>,

    #[serde(default)]
    pub request_headers: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub response_headers: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub request_body: Option<MessageBody>,

    #[serde(default)]
    pub response_body: Option<MessageBody>,

    #[serde(default)]
    pub status: Option<u16>,

    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    /// Capture timestamp, RFC 3339 text or epoch milliseconds on the wire
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub rewrites: Vec<AppliedRewrite>,

    #[serde(default)]
    pub connect: Option<ConnectExchange>,
}

impl LogRecord {
    /// Full URL when the backend sent one, otherwise the short form
    pub fn display_url(&self) -> &str {
        match &self.full_url {
            Some(full) if !full.is_empty() => full,
            _ => &self.url,
        }
    }

    /// Response content type, header names compared case-insensitively
    pub fn content_type(&self) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| match value {
                serde_json::Value::String(text) => Some(text.as_str()),
                serde_json::Value::Array(values) => values.first().and_then(|v| v.as_str()),
                _ => None,
            })
    }

    pub fn content_bucket(&self) -> ContentBucket {
        ContentBucket::classify(self.content_type(), self.display_url())
    }

    pub fn is_request_rewritten(&self) -> bool {
        self.rewrites
            .iter()
            .any(|rewrite| matches!(rewrite.target, RuleTarget::Request | RuleTarget::Both))
    }

    pub fn is_response_rewritten(&self) -> bool {
        self.rewrites
            .iter()
            .any(|rewrite| matches!(rewrite.target, RuleTarget::Response | RuleTarget::Both))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_deserializes_from_backend_shape() {
        let record: LogRecord = serde_json::from_value(json!({
            "id": 42,
            "method": "POST",
            "source": "mitm",
            "url": "/api/users",
            "fullUrl": "https://example.com/api/users",
            "responseHeaders": { "Content-Type": "application/json; charset=utf-8" },
            "requestBody": "{\"name\":\"a\"}",
            "responseBody": { "ok": true },
            "status": 201,
            "rewrites": [{ "id": "r1", "name": "strip", "kind": "jsonPath", "target": "response" }]
        }))
        .unwrap();

        assert_eq!(record.id, ItemId::new("42"));
        assert_eq!(record.source, Source::Mitm);
        assert_eq!(record.display_url(), "https://example.com/api/users");
        assert_eq!(record.content_bucket(), ContentBucket::Json);
        assert!(record.is_response_rewritten());
        assert!(!record.is_request_rewritten());
        assert_eq!(record.request_body.unwrap().as_json(), Some(json!({ "name": "a" })));
        assert_eq!(record.response_body, Some(MessageBody::Json(json!({ "ok": true }))));
    }

    #[test]
    fn test_timestamp_accepts_text_and_epoch_millis() {
        let text: LogRecord = serde_json::from_value(json!({
            "id": 1, "source": "proxied", "timestamp": "2025-10-09T08:53:20Z"
        }))
        .unwrap();
        let millis: LogRecord = serde_json::from_value(json!({
            "id": 2, "source": "proxied", "timestamp": 1760000000000u64
        }))
        .unwrap();

        assert_eq!(millis.timestamp, Utc.timestamp_millis_opt(1_760_000_000_000).single());
        assert_eq!(text.timestamp, millis.timestamp);

        let odd: LogRecord = serde_json::from_value(json!({
            "id": 3, "source": "proxied", "timestamp": { "seconds": 5 }
        }))
        .unwrap();
        assert_eq!(odd.timestamp, None);

        let null: LogRecord = serde_json::from_value(json!({ "id": 4, "source": "proxied", "timestamp": null })).unwrap();
        assert_eq!(null.timestamp, None);
    }

    #[test]
    fn test_unknown_source_does_not_fail_the_page() {
        let record: LogRecord =
            serde_json::from_value(json!({ "id": "a", "source": "quic" })).unwrap();
        assert_eq!(record.source, Source::Unknown);
    }

    #[test]
    fn test_frame_keeps_a_single_representation() {
        let frame: Frame = serde_json::from_value(json!({
            "index": 3, "length": 12, "json": { "t": 1 }, "preview": "{\"t\":1}", "end": true
        }))
        .unwrap();
        assert_eq!(frame.payload, FramePayload::Json(json!({ "t": 1 })));
        assert!(frame.end_stream);

        let wire = serde_json::to_value(&frame).unwrap();
        assert!(wire.get("preview").is_none());

        let frame: Frame = serde_json::from_value(json!({ "index": 0, "json": null, "preview": "ping" })).unwrap();
        assert_eq!(frame.payload, FramePayload::Preview("ping".to_string()));
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("WebSocket".parse::<Source>().unwrap(), Source::Websocket);
        assert!("quic".parse::<Source>().is_err());
        assert!(Source::Tunnel.is_legacy_transport());
        assert!(!Source::Mitm.is_legacy_transport());
    }
}
