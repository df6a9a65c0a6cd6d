//! Cross-context message envelopes.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Execution context a message originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSource {
    /// The consent iframe spawned by the widget.
    #[serde(rename = "onairosIframe")]
    OnairosIframe,
    /// The embedding host page.
    #[serde(rename = "webpage")]
    Webpage,
    /// The extension's content script.
    #[serde(rename = "content-script")]
    ContentScript,
}

/// Message types carried across context boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Initialization handshake between contexts.
    Handshake,
    /// Data-request payload delivery to the consent surface.
    DataRequest,
    /// The user approved the consent set.
    ConsentApproved,
    /// The user rejected the consent set.
    ConsentRejected,
    /// A platform OAuth finished in the popped context (explicit ack).
    PlatformLinked,
    /// A platform OAuth failed in the popped context (explicit ack).
    PlatformLinkFailed,
    /// Terminal close/teardown signal.
    Close,
}

/// A message crossing a context boundary: `{source, type, ...payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Originating context.
    pub source: MessageSource,
    /// Message type.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Remaining payload fields, flattened alongside source/type.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// Create an empty envelope.
    pub fn new(source: MessageSource, kind: MessageKind) -> Self {
        Self {
            source,
            kind,
            payload: serde_json::Map::new(),
        }
    }

    /// Attach a payload field.
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    /// Initialization handshake from a context.
    pub fn handshake(source: MessageSource) -> Self {
        Self::new(source, MessageKind::Handshake)
    }

    /// Data-request payload delivery.
    pub fn data_request(source: MessageSource, request: serde_json::Value) -> Self {
        Self::new(source, MessageKind::DataRequest).with_field("request", request)
    }

    /// Consent-set approval carrying the authorization result.
    pub fn consent_approved(source: MessageSource, result: serde_json::Value) -> Self {
        Self::new(source, MessageKind::ConsentApproved).with_field("result", result)
    }

    /// Consent-set rejection.
    pub fn consent_rejected(source: MessageSource, reason: &str) -> Self {
        Self::new(source, MessageKind::ConsentRejected)
            .with_field("reason", serde_json::Value::String(reason.to_string()))
    }

    /// Explicit platform-link acknowledgement from the popped context.
    pub fn platform_linked(source: MessageSource, platform: &str) -> Self {
        Self::new(source, MessageKind::PlatformLinked)
            .with_field("platform", serde_json::Value::String(platform.to_string()))
    }

    /// Explicit platform-link failure from the popped context.
    pub fn platform_link_failed(source: MessageSource, platform: &str, error: &str) -> Self {
        Self::new(source, MessageKind::PlatformLinkFailed)
            .with_field("platform", serde_json::Value::String(platform.to_string()))
            .with_field("error", serde_json::Value::String(error.to_string()))
    }

    /// Terminal close signal.
    pub fn close(source: MessageSource) -> Self {
        Self::new(source, MessageKind::Close)
    }

    /// Read a string payload field.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// True when the envelope carries the given source and kind.
    pub fn matches(&self, source: MessageSource, kind: MessageKind) -> bool {
        self.source == source && self.kind == kind
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an incoming raw message, rejecting anything that does not match
    /// the expected `{source, type}` shape. Rejected messages are ignored,
    /// never processed speculatively.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                debug!(error = %e, "Dropping message without a valid envelope shape");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_wire_names() {
        assert_eq!(
            serde_json::to_string(&MessageSource::OnairosIframe).unwrap(),
            "\"onairosIframe\""
        );
        assert_eq!(
            serde_json::to_string(&MessageSource::Webpage).unwrap(),
            "\"webpage\""
        );
        assert_eq!(
            serde_json::to_string(&MessageSource::ContentScript).unwrap(),
            "\"content-script\""
        );
    }

    #[test]
    fn kind_wire_names() {
        let kinds = vec![
            (MessageKind::Handshake, "HANDSHAKE"),
            (MessageKind::DataRequest, "DATA_REQUEST"),
            (MessageKind::ConsentApproved, "CONSENT_APPROVED"),
            (MessageKind::ConsentRejected, "CONSENT_REJECTED"),
            (MessageKind::PlatformLinked, "PLATFORM_LINKED"),
            (MessageKind::PlatformLinkFailed, "PLATFORM_LINK_FAILED"),
            (MessageKind::Close, "CLOSE"),
        ];

        for (kind, expected) in kinds {
            let json = serde_json::to_string(&Envelope::new(MessageSource::Webpage, kind)).unwrap();
            assert!(
                json.contains(&format!("\"type\":\"{expected}\"")),
                "kind {kind:?} should serialize to {expected}"
            );
        }
    }

    #[test]
    fn payload_is_flattened() {
        let envelope = Envelope::platform_linked(MessageSource::OnairosIframe, "youtube");
        let json = envelope.to_json().unwrap();

        assert!(json.contains("\"source\":\"onairosIframe\""));
        assert!(json.contains("\"type\":\"PLATFORM_LINKED\""));
        // Payload fields sit alongside source/type, not nested
        assert!(json.contains("\"platform\":\"youtube\""));
        assert!(!json.contains("\"payload\""));
    }

    #[test]
    fn parse_roundtrip() {
        let original = Envelope::data_request(
            MessageSource::Webpage,
            serde_json::json!({ "requester": "acme", "categories": ["interests"] }),
        );
        let json = original.to_json().unwrap();
        let parsed = Envelope::parse(&json).unwrap();

        assert_eq!(parsed.source, MessageSource::Webpage);
        assert_eq!(parsed.kind, MessageKind::DataRequest);
        assert_eq!(parsed.payload.get("request"), original.payload.get("request"));
    }

    #[test]
    fn parse_rejects_missing_tag() {
        assert!(Envelope::parse(r#"{"source":"webpage"}"#).is_none());
        assert!(Envelope::parse(r#"{"type":"CLOSE"}"#).is_none());
        assert!(Envelope::parse(r#"{"hello":"world"}"#).is_none());
    }

    #[test]
    fn parse_rejects_unknown_source_or_type() {
        assert!(Envelope::parse(r#"{"source":"evil-frame","type":"CLOSE"}"#).is_none());
        assert!(Envelope::parse(r#"{"source":"webpage","type":"EXFILTRATE"}"#).is_none());
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(Envelope::parse("definitely not json").is_none());
        assert!(Envelope::parse("").is_none());
    }

    #[test]
    fn matches_filters_on_both_tags() {
        let envelope = Envelope::close(MessageSource::OnairosIframe);

        assert!(envelope.matches(MessageSource::OnairosIframe, MessageKind::Close));
        assert!(!envelope.matches(MessageSource::Webpage, MessageKind::Close));
        assert!(!envelope.matches(MessageSource::OnairosIframe, MessageKind::Handshake));
    }

    #[test]
    fn field_str_reads_payload() {
        let envelope = Envelope::consent_rejected(MessageSource::OnairosIframe, "user dismissed");
        assert_eq!(envelope.field_str("reason"), Some("user dismissed"));
        assert_eq!(envelope.field_str("missing"), None);
    }

    #[test]
    fn link_failed_carries_platform_and_error() {
        let envelope = Envelope::platform_link_failed(
            MessageSource::ContentScript,
            "reddit",
            "access_denied",
        );
        assert_eq!(envelope.field_str("platform"), Some("reddit"));
        assert_eq!(envelope.field_str("error"), Some("access_denied"));
    }
}
