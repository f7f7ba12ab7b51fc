//! Transport-free core of the Messenger event client.
//!
//! This crate defines the event model, the tolerant wire decoders, poll-frame
//! routing, the stream lifecycle, and the cursor paginator. Nothing here
//! performs network I/O; the `messenger-stream` crate drives it.

/// Timeline action decoding.
pub mod action;
/// Attachment variants and their wire decoders.
pub mod attachment;
/// Cancellable bounded delivery channel.
pub mod channel;
/// Ordered-candidate decoding helpers.
pub mod decode;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Poll body parsing and frame routing.
pub mod frames;
/// Identifier and body normalization helpers.
pub mod normalization;
/// Backward-in-time cursor pagination.
pub mod pagination;
/// Fixed retry delay used by the poll loop.
pub mod retry;
/// Event stream lifecycle state machine.
pub mod state_machine;
/// Event payloads, thread metadata, and poll session state.
pub mod types;

pub use action::{
    Action, ActionHeader, LEGACY_MESSAGE_ACTION_TYPE, MESSAGE_ACTION_TYPE, MessageAction,
    decode_action,
};
pub use attachment::{
    Attachment, AudioAttachment, FileAttachment, ImageAttachment, StickerAttachment,
    UnknownAttachment, VideoAttachment, decode_attachment, decode_attachments,
};
pub use channel::{Sink, SinkError, SinkReceiver, bounded};
pub use decode::{ShapeMismatch, VariantDecoder, WireShape};
pub use error::{ErrorCategory, MessengerError, TransportError, classify_http_status};
pub use frames::{
    PollBatch, StickyInfo, parse_poll_body, parse_reconnect_host, parse_sticky_info, route_frame,
};
pub use normalization::{
    canonical_id, deserialize_null_default, strip_fbid_prefix, strip_json_guard,
};
pub use pagination::{CursorPaginator, CursorRecord, PageAddressing, PageFetcher};
pub use retry::RetryPolicy;
pub use state_machine::StreamStateMachine;
pub use types::{
    BuddyStatusEvent, Cursor, DeleteMessageEvent, Event, MessageEvent, ParticipantInfo,
    PollSession, StreamState, ThreadInfo, ThreadKey, ThreadListResult, TypingEvent,
};
