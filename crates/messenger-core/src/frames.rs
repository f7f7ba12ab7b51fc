//! Poll response parsing and frame routing.
//!
//! A pull response is a concatenation of JSON objects (no enclosing array),
//! each with a type tag `t`, a sequence number `seq` and, for `t == "msg"`,
//! a list of frames `ms`. Every frame is routed by its own `type` field.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    attachment::decode_attachments,
    error::MessengerError,
    normalization::{
        deserialize_canonical_id, deserialize_null_default, deserialize_optional_canonical_id,
        strip_json_guard,
    },
    types::{
        BuddyStatusEvent, DeleteMessageEvent, Event, MessageEvent, ThreadInfo, ThreadKey,
        TypingEvent,
    },
};

/// Frames and the highest sequence number found in one poll response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    pub frames: Vec<Value>,
    /// `None` when no object carried a sequence number.
    pub max_seq: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PollEnvelope {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    t: String,
    #[serde(default)]
    seq: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    ms: Vec<Value>,
}

/// Parse a pull response body.
///
/// The whole body must parse; a partially valid body yields an error and no
/// frames, so the caller can retry without advancing its sequence number.
pub fn parse_poll_body(body: &[u8]) -> Result<PollBatch, MessengerError> {
    let body = strip_json_guard(body);
    let mut batch = PollBatch::default();

    for envelope in serde_json::Deserializer::from_slice(body).into_iter::<PollEnvelope>() {
        let envelope =
            envelope.map_err(|err| MessengerError::parse("poll_body_invalid", err.to_string()))?;
        if let Some(seq) = envelope.seq {
            batch.max_seq = Some(batch.max_seq.map_or(seq, |current| current.max(seq)));
        }
        if envelope.t == "msg" {
            batch.frames.extend(envelope.ms);
        }
    }

    Ok(batch)
}

/// Sticky routing information returned by the discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickyInfo {
    pub pool: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct LbInfo {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    sticky: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pool: String,
}

#[derive(Debug, Deserialize)]
struct DiscoveryEnvelope {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    t: String,
    #[serde(default)]
    lb_info: Option<LbInfo>,
}

/// Find the load-balancer frame (`t == "lb"`) in a discovery response.
pub fn parse_sticky_info(body: &[u8]) -> Result<StickyInfo, MessengerError> {
    let body = strip_json_guard(body);
    for envelope in serde_json::Deserializer::from_slice(body).into_iter::<DiscoveryEnvelope>() {
        let envelope = envelope
            .map_err(|err| MessengerError::parse("discovery_body_invalid", err.to_string()))?;
        if envelope.t == "lb"
            && let Some(info) = envelope.lb_info
        {
            return Ok(StickyInfo {
                pool: info.pool,
                token: info.sticky,
            });
        }
    }
    Err(MessengerError::parse(
        "discovery_unexpected",
        "unexpected initial polling response",
    ))
}

#[derive(Debug, Deserialize)]
struct ReconnectPayload {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    host: String,
}

#[derive(Debug, Deserialize)]
struct ReconnectEnvelope {
    payload: ReconnectPayload,
}

/// Extract the target host from a reconnect response.
pub fn parse_reconnect_host(body: &[u8]) -> Result<String, MessengerError> {
    let envelope: ReconnectEnvelope = serde_json::from_slice(strip_json_guard(body))
        .map_err(|err| MessengerError::parse("reconnect_body_invalid", err.to_string()))?;
    if envelope.payload.host.is_empty() {
        return Err(MessengerError::parse(
            "reconnect_host_missing",
            "reconnect response did not name a host",
        ));
    }
    Ok(envelope.payload.host)
}

/// Turn one frame into zero or more events.
///
/// Unknown frame types and frames that do not fit their type's shape yield
/// no events.
pub fn route_frame(frame: &Value) -> Vec<Event> {
    let Some(frame_type) = frame.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };

    match frame_type {
        "delta" => route_delta(frame).into_iter().collect(),
        "buddylist_overlay" => route_buddylist_overlay(frame),
        "ttyp" | "typ" => route_typing(frame).into_iter().collect(),
        "messaging" => {
            if frame.get("event").and_then(Value::as_str) == Some("delete_messages") {
                route_delete(frame).into_iter().collect()
            } else {
                Vec::new()
            }
        }
        other => {
            tracing::trace!(frame_type = other, "ignoring frame");
            Vec::new()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DeltaThreadKey {
    #[serde(default, rename = "threadFbId", deserialize_with = "deserialize_optional_canonical_id")]
    thread_fbid: Option<String>,
    #[serde(default, rename = "otherUserFbId", deserialize_with = "deserialize_optional_canonical_id")]
    other_user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaMeta {
    #[serde(default, rename = "actorFbId", deserialize_with = "deserialize_canonical_id")]
    actor: String,
    #[serde(default, rename = "messageId", deserialize_with = "deserialize_null_default")]
    message_id: String,
    #[serde(default, rename = "threadKey", deserialize_with = "deserialize_null_default")]
    thread_key: DeltaThreadKey,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attachments: Option<Vec<Value>>,
    #[serde(
        default,
        rename = "messageMetadata",
        deserialize_with = "deserialize_null_default"
    )]
    meta: DeltaMeta,
}

#[derive(Debug, Deserialize)]
struct DeltaFrame {
    delta: DeltaBody,
}

fn route_delta(frame: &Value) -> Option<Event> {
    let DeltaFrame { delta } = DeltaFrame::deserialize(frame)
        .inspect_err(|err| tracing::debug!(error = %err, "dropping malformed delta frame"))
        .ok()?;
    let body = delta.body.unwrap_or_default();
    let attachments = delta.attachments.unwrap_or_default();
    if body.is_empty() && attachments.is_empty() {
        return None;
    }

    let thread_key = delta.meta.thread_key;
    let thread = match (thread_key.thread_fbid, thread_key.other_user) {
        (Some(group), _) => ThreadKey::Group(group),
        (None, Some(user)) => ThreadKey::User(user),
        (None, None) => {
            tracing::debug!(
                message_id = %delta.meta.message_id,
                "dropping delta without a thread key"
            );
            return None;
        }
    };

    Some(Event::Message(MessageEvent {
        message_id: delta.meta.message_id,
        body,
        attachments: decode_attachments(&attachments),
        sender_id: delta.meta.actor,
        thread,
    }))
}

#[derive(Debug, Deserialize)]
struct OverlayEntry {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    la: f64,
}

/// One event per overlay user, in payload order.
fn route_buddylist_overlay(frame: &Value) -> Vec<Event> {
    let Some(overlay) = frame.get("overlay").and_then(Value::as_object) else {
        return Vec::new();
    };
    overlay_entries(overlay)
        .map(|(user_id, entry)| {
            Event::BuddyStatus(BuddyStatusEvent {
                user_id: user_id.clone(),
                last_active_ms: (entry.la.max(0.0) as u64).saturating_mul(1000),
            })
        })
        .collect()
}

fn overlay_entries(
    overlay: &Map<String, Value>,
) -> impl Iterator<Item = (&String, OverlayEntry)> {
    overlay.iter().filter_map(|(user_id, entry)| {
        match OverlayEntry::deserialize(entry) {
            Ok(entry) => Some((user_id, entry)),
            Err(err) => {
                tracing::debug!(%user_id, error = %err, "skipping malformed overlay entry");
                None
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct TypingFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    st: i64,
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    from: String,
    #[serde(default, deserialize_with = "deserialize_optional_canonical_id")]
    thread_fbid: Option<String>,
}

fn route_typing(frame: &Value) -> Option<Event> {
    let typing = TypingFrame::deserialize(frame)
        .inspect_err(|err| tracing::debug!(error = %err, "dropping malformed typing frame"))
        .ok()?;
    let group_thread = if typing.frame_type == "ttyp" {
        typing.thread_fbid
    } else {
        None
    };
    Some(Event::Typing(TypingEvent {
        sender_id: typing.from,
        typing: typing.st == 1,
        group_thread,
    }))
}

#[derive(Debug, Deserialize)]
struct DeleteFrame {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    mids: Vec<String>,
    updated_thread: Option<ThreadInfo>,
}

fn route_delete(frame: &Value) -> Option<Event> {
    let DeleteFrame {
        mids,
        updated_thread,
    } = DeleteFrame::deserialize(frame)
        .inspect_err(|err| tracing::debug!(error = %err, "dropping malformed delete frame"))
        .ok()?;
    let mut updated_thread = updated_thread?;
    updated_thread.canonicalize_ids();
    Some(Event::DeleteMessage(DeleteMessageEvent {
        message_ids: mids,
        updated_thread,
    }))
}
