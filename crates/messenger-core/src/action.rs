//! Thread log entries ("actions") and their classifier.
//!
//! Blob envelope (GraphQL thread query):
//! `{"__typename": "UserMessage", "message_id", "timestamp_precise": "<ms>",
//! "message_sender": {"id"}, "message": {"text"}, "blob_attachments": [..]}`.
//!
//! Inline envelope (legacy thread info):
//! `{"action_type": "ma-type:user-generated-message", "message_id",
//! "timestamp": <ms>, "author": "fbid:<id>", "body", "attachments": [..]}`.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    attachment::{Attachment, decode_attachment, decode_attachments},
    decode::{ShapeMismatch, VariantDecoder, WireShape},
    normalization::canonical_id,
};

/// Type tag of a user-sent message in the blob envelope.
pub const MESSAGE_ACTION_TYPE: &str = "UserMessage";
/// Type tag of a user-sent message in the inline envelope.
pub const LEGACY_MESSAGE_ACTION_TYPE: &str = "ma-type:user-generated-message";

/// Fields every action exposes, whatever its variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionHeader {
    /// Backend type tag, possibly empty.
    pub action_type: String,
    /// Milliseconds since Unix epoch, `0` when absent.
    pub timestamp_ms: u64,
    pub message_id: String,
    pub author_id: String,
    /// Original payload, unchanged.
    pub raw: Value,
}

impl ActionHeader {
    /// Extract the common fields leniently; missing fields become empty.
    pub fn from_raw(raw: &Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(ToOwned::to_owned);

        let action_type = text("__typename")
            .or_else(|| text("action_type"))
            .unwrap_or_default();
        let timestamp_ms = ["timestamp_precise", "timestamp"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(timestamp_from_value))
            .unwrap_or(0);
        let message_id = text("message_id").unwrap_or_default();
        let author_id = raw
            .pointer("/message_sender/id")
            .or_else(|| raw.get("author"))
            .map(canonical_id)
            .unwrap_or_default();

        Self {
            action_type,
            timestamp_ms,
            message_id,
            author_id,
            raw: raw.clone(),
        }
    }
}

/// A user-sent message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageAction {
    pub header: ActionHeader,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Something that happened in a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Action {
    Message(MessageAction),
    /// Any action without action-specific fields, including unknown types.
    Generic(ActionHeader),
}

impl Action {
    pub fn header(&self) -> &ActionHeader {
        match self {
            Action::Message(message) => &message.header,
            Action::Generic(header) => header,
        }
    }

    pub fn action_type(&self) -> &str {
        &self.header().action_type
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.header().timestamp_ms
    }

    pub fn message_id(&self) -> &str {
        &self.header().message_id
    }

    pub fn author_id(&self) -> &str {
        &self.header().author_id
    }

    pub fn raw(&self) -> &Value {
        &self.header().raw
    }
}

/// Classify one thread log entry. Never fails; unmatched entries become
/// [`Action::Generic`] carrying the input unchanged.
pub fn decode_action(raw: &Value) -> Action {
    let header = ActionHeader::from_raw(raw);
    match MESSAGE_DECODER.decode(raw) {
        Some(parts) => Action::Message(MessageAction {
            header,
            body: parts.body,
            attachments: parts.attachments,
        }),
        None => Action::Generic(header),
    }
}

struct MessageParts {
    body: String,
    attachments: Vec<Attachment>,
}

static MESSAGE_DECODER: LazyLock<VariantDecoder<MessageParts>> = LazyLock::new(|| {
    VariantDecoder::new()
        .shape::<InlineMessage>("inline_message")
        .shape::<BlobMessage>("blob_message")
});

fn timestamp_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n > 0.0).map(|n| n as u64)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct InlineMessage {
    action_type: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attachments: Vec<Value>,
}

impl WireShape for InlineMessage {
    type Output = MessageParts;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.action_type, &[LEGACY_MESSAGE_ACTION_TYPE])
    }

    fn into_output(self) -> MessageParts {
        MessageParts {
            body: self.body.unwrap_or_default(),
            attachments: decode_attachments(&self.attachments),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BlobMessageText {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobMessage {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default)]
    message: Option<BlobMessageText>,
    #[serde(default)]
    blob_attachments: Option<Vec<Value>>,
    #[serde(default)]
    sticker: Option<Value>,
}

impl WireShape for BlobMessage {
    type Output = MessageParts;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &[MESSAGE_ACTION_TYPE])
    }

    fn into_output(self) -> MessageParts {
        let mut attachments = decode_attachments(&self.blob_attachments.unwrap_or_default());
        if let Some(mut sticker) = self.sticker.filter(Value::is_object) {
            if let Some(fields) = sticker.as_object_mut() {
                fields
                    .entry("__typename")
                    .or_insert_with(|| Value::String("Sticker".to_owned()));
            }
            attachments.push(decode_attachment(&sticker));
        }

        MessageParts {
            body: self
                .message
                .and_then(|message| message.text)
                .unwrap_or_default(),
            attachments,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_blob_message_with_attachments() {
        let raw = json!({
            "__typename": "UserMessage",
            "message_id": "mid.$cAAA",
            "timestamp_precise": "1480000000123",
            "message_sender": {"id": "100001"},
            "message": {"text": "look at this"},
            "blob_attachments": [
                {"__typename": "MessageImage", "large_preview": {"uri": "https://cdn.example/l.jpg"}},
                {"__typename": "MessageLocation"}
            ]
        });
        let action = decode_action(&raw);
        assert_eq!(action.action_type(), MESSAGE_ACTION_TYPE);
        assert_eq!(action.timestamp_ms(), 1_480_000_000_123);
        assert_eq!(action.message_id(), "mid.$cAAA");
        assert_eq!(action.author_id(), "100001");
        assert_eq!(action.raw(), &raw);

        match action {
            Action::Message(message) => {
                assert_eq!(message.body, "look at this");
                assert_eq!(message.attachments.len(), 2);
                assert_eq!(message.attachments[0].url(), "https://cdn.example/l.jpg");
                assert_eq!(message.attachments[1].attachment_type(), "MessageLocation");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn blob_message_sticker_becomes_an_attachment() {
        let raw = json!({
            "__typename": "UserMessage",
            "message": null,
            "sticker": {"id": "369239263222822", "url": "https://cdn.example/like.png"}
        });
        match decode_action(&raw) {
            Action::Message(message) => {
                assert_eq!(message.body, "");
                assert_eq!(message.attachments.len(), 1);
                assert!(matches!(message.attachments[0], Attachment::Sticker(_)));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn decodes_inline_message() {
        let raw = json!({
            "action_type": "ma-type:user-generated-message",
            "message_id": "mid.1480000000000:abc",
            "timestamp": 1_480_000_000_000_u64,
            "author": "fbid:100002",
            "body": "hello",
            "attachments": [{"mercury": {"attach_type": "file", "url": "https://cdn.example/f"}}]
        });
        let action = decode_action(&raw);
        assert_eq!(action.author_id(), "100002");
        assert_eq!(action.timestamp_ms(), 1_480_000_000_000);
        match action {
            Action::Message(message) => {
                assert_eq!(message.body, "hello");
                assert_eq!(message.attachments[0].url(), "https://cdn.example/f");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_generic_with_raw_payload() {
        let raw = json!({
            "__typename": "ThreadNameMessage",
            "message_id": "mid.$x",
            "timestamp_precise": "1480000000999",
            "message_sender": {"id": 100003.0},
            "thread_name": "weekend plans"
        });
        match decode_action(&raw) {
            Action::Generic(header) => {
                assert_eq!(header.action_type, "ThreadNameMessage");
                assert_eq!(header.author_id, "100003");
                assert_eq!(header.timestamp_ms, 1_480_000_000_999);
                assert_eq!(header.raw, raw);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn malformed_message_falls_back_to_generic() {
        let raw = json!({"__typename": "UserMessage", "blob_attachments": "nope"});
        let action = decode_action(&raw);
        assert!(matches!(action, Action::Generic(_)));
        assert_eq!(action.action_type(), MESSAGE_ACTION_TYPE);
        assert_eq!(action.message_id(), "");
        assert_eq!(action.timestamp_ms(), 0);
    }

    #[test]
    fn non_object_payload_is_generic_and_empty() {
        let raw = json!(42);
        let action = decode_action(&raw);
        assert_eq!(action.action_type(), "");
        assert_eq!(action.author_id(), "");
        assert_eq!(action.raw(), &raw);
    }
}
