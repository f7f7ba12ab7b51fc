use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{
    attachment::Attachment,
    normalization::{
        deserialize_canonical_id, deserialize_lenient_u64, deserialize_null_default,
        deserialize_optional_canonical_id, strip_fbid_prefix,
    },
};

/// Lifecycle of one event stream.
///
/// A failed handshake moves straight to `Closed` with an error recorded; there
/// is no separate failed state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamState {
    /// Handshake (reconnect + discovery) has not finished yet.
    Initializing,
    /// Long-poll loop is running.
    Streaming,
    /// Worker has stopped and the sink is closed.
    Closed,
}

/// Conversation a message belongs to. Exactly one of the two is ever set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreadKey {
    /// Group chat identified by its thread FBID.
    Group(String),
    /// One-on-one chat identified by the other user's FBID.
    User(String),
}

impl ThreadKey {
    /// Identifier of the thread or peer, whichever applies.
    pub fn id(&self) -> &str {
        match self {
            ThreadKey::Group(id) | ThreadKey::User(id) => id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ThreadKey::Group(_))
    }
}

/// A new message pushed by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEvent {
    pub message_id: String,
    /// Text body, empty when the message only carries attachments.
    pub body: String,
    pub attachments: Vec<Attachment>,
    /// FBID of the sender. May be the current user when sent from another device.
    pub sender_id: String,
    pub thread: ThreadKey,
}

/// Presence update for a buddy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuddyStatusEvent {
    pub user_id: String,
    /// Last-active time in milliseconds since Unix epoch.
    pub last_active_ms: u64,
}

/// A user started or stopped typing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingEvent {
    pub sender_id: String,
    pub typing: bool,
    /// Group thread, `None` for a one-on-one chat.
    pub group_thread: Option<String>,
}

/// One or more messages were deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteMessageEvent {
    pub message_ids: Vec<String>,
    pub updated_thread: ThreadInfo,
}

/// Typed notification published by an event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    BuddyStatus(BuddyStatusEvent),
    Typing(TypingEvent),
    DeleteMessage(DeleteMessageEvent),
}

/// Summary of a chat thread (group chat or one-on-one).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadInfo {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    pub thread_fbid: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    /// `None` for group chats.
    #[serde(default, deserialize_with = "deserialize_optional_canonical_id")]
    pub other_user_fbid: Option<String>,
    /// Participant FBIDs.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub participants: Vec<String>,
    /// Last message sent in the thread.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub snippet: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub snippet_sender: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub unread_count: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub message_count: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub timestamp: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub server_timestamp: u64,
}

impl ThreadInfo {
    /// Strip `fbid:` prefixes from every identifier the backend may prefix.
    pub fn canonicalize_ids(&mut self) {
        fn strip(id: &mut String) {
            let stripped = strip_fbid_prefix(id);
            if stripped.len() != id.len() {
                *id = stripped.to_owned();
            }
        }

        strip(&mut self.thread_fbid);
        strip(&mut self.snippet_sender);
        if let Some(other) = self.other_user_fbid.as_mut() {
            strip(other);
        }
        for participant in &mut self.participants {
            strip(participant);
        }
    }
}

/// Profile summary of a user that appears in a thread list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Usually `fbid:<id>`; kept as sent.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    pub fbid: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub gender: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub href: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub image_src: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub big_image_src: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub short_name: String,
}

/// One range of the user's inbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadListResult {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub threads: Vec<ThreadInfo>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub participants: Vec<ParticipantInfo>,
}

impl ThreadListResult {
    /// Strip `fbid:` prefixes from thread and participant identifiers.
    pub fn canonicalize_ids(&mut self) {
        for thread in &mut self.threads {
            thread.canonicalize_ids();
        }
        for participant in &mut self.participants {
            participant.fbid = strip_fbid_prefix(&participant.fbid).to_owned();
        }
    }

    pub fn participant(&self, fbid: &str) -> Option<&ParticipantInfo> {
        self.participants.iter().find(|participant| participant.fbid == fbid)
    }
}

/// Position in a backward-ordered log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    /// Millisecond timestamp bound; `None` means "most recent".
    pub before_ms: Option<u64>,
    /// Records consumed so far, for logs addressed by offset.
    pub offset: u64,
}

impl Cursor {
    pub fn is_unset(&self) -> bool {
        self.before_ms.is_none()
    }
}

/// Wire affinity and sequence state of one long-poll session.
#[derive(Debug, Clone)]
pub struct PollSession {
    pub sticky_pool: String,
    pub sticky_token: String,
    seq: u64,
    started_at: Instant,
}

impl PollSession {
    pub fn new(sticky_pool: impl Into<String>, sticky_token: impl Into<String>) -> Self {
        Self {
            sticky_pool: sticky_pool.into(),
            sticky_token: sticky_token.into(),
            seq: 0,
            started_at: Instant::now(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Fold an observed sequence number in. The tracked value never decreases.
    pub fn advance_seq(&mut self, observed: u64) -> u64 {
        self.seq = self.seq.max(observed);
        self.seq
    }

    /// Whole seconds since the session started.
    pub fn idle_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
