//! Scripted request port shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use messenger_core::TransportError;
use messenger_stream::{Params, RequestPort, Session, StaticParams, StreamConfig};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const USER_ID: &str = "100042";

pub const RECONNECT_OK: &[u8] = br#"for (;;);{"t":"lb","payload":{"host":"5-frc"}}"#;
pub const DISCOVERY_OK: &[u8] =
    br#"for (;;);{"t":"lb","seq":0,"lb_info":{"sticky":"tok-1","pool":"atn2c06_chat-proxy"}}"#;

type Reply = Result<Vec<u8>, TransportError>;

/// What the fake does for one request.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(Reply),
    /// Block until the caller cancels, like a long-poll with no news.
    Hang,
}

impl Step {
    pub fn body(body: impl Into<Vec<u8>>) -> Self {
        Step::Reply(Ok(body.into()))
    }

    pub fn fail(err: TransportError) -> Self {
        Step::Reply(Err(err))
    }
}

#[derive(Debug, Default)]
struct Script {
    reconnect: VecDeque<Step>,
    discovery: VecDeque<Step>,
    polls: VecDeque<Step>,
    graphql: VecDeque<Step>,
    thread_lists: VecDeque<Step>,
    image_sources: VecDeque<Step>,
}

/// Answers requests by endpoint from per-endpoint scripts and records them.
///
/// An exhausted script hangs until cancellation.
#[derive(Debug, Default)]
pub struct ScriptedPort {
    script: Mutex<Script>,
    pub gets: Mutex<Vec<Url>>,
    pub posts: Mutex<Vec<(Url, Params)>>,
}

impl ScriptedPort {
    pub fn with_handshake() -> Arc<Self> {
        let port = Arc::new(Self::default());
        port.push_reconnect(Step::body(RECONNECT_OK));
        port.push_discovery(Step::body(DISCOVERY_OK));
        port
    }

    pub fn push_reconnect(&self, step: Step) {
        self.script.lock().expect("script").reconnect.push_back(step);
    }

    pub fn push_discovery(&self, step: Step) {
        self.script.lock().expect("script").discovery.push_back(step);
    }

    pub fn push_poll(&self, step: Step) {
        self.script.lock().expect("script").polls.push_back(step);
    }

    pub fn push_graphql(&self, step: Step) {
        self.script.lock().expect("script").graphql.push_back(step);
    }

    pub fn push_thread_list(&self, step: Step) {
        self.script.lock().expect("script").thread_lists.push_back(step);
    }

    pub fn push_image_source(&self, step: Step) {
        self.script.lock().expect("script").image_sources.push_back(step);
    }

    /// Recorded form posts to the endpoint at `path`.
    pub fn posts_to(&self, path: &str) -> Vec<Params> {
        self.posts
            .lock()
            .expect("posts")
            .iter()
            .filter(|(url, _)| url.path() == path)
            .map(|(_, form)| form.clone())
            .collect()
    }

    /// Recorded requests to the steady-state pull endpoint.
    pub fn poll_requests(&self) -> Vec<Url> {
        self.gets
            .lock()
            .expect("gets")
            .iter()
            .filter(|url| url.host_str() == Some("0-edge-chat.messenger.com"))
            .cloned()
            .collect()
    }

    async fn play(step: Option<Step>, cancel: &CancellationToken) -> Reply {
        match step {
            Some(Step::Reply(reply)) => reply,
            Some(Step::Hang) | None => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl RequestPort for ScriptedPort {
    async fn get(&self, url: Url, cancel: &CancellationToken) -> Reply {
        self.gets.lock().expect("gets").push(url.clone());
        let step = {
            let mut script = self.script.lock().expect("script");
            if url.path() == "/ajax/presence/reconnect.php" {
                script.reconnect.pop_front()
            } else if url.host_str() == Some("0-edge-chat.messenger.com") {
                script.polls.pop_front()
            } else {
                script.discovery.pop_front()
            }
        };
        Self::play(step, cancel).await
    }

    async fn post_form(&self, url: Url, form: Params, cancel: &CancellationToken) -> Reply {
        let step = {
            let mut script = self.script.lock().expect("script");
            match url.path() {
                "/ajax/mercury/threadlist_info.php" => script.thread_lists.pop_front(),
                "/ajax/image_source.php" => script.image_sources.pop_front(),
                _ => script.graphql.pop_front(),
            }
        };
        self.posts.lock().expect("posts").push((url, form));
        Self::play(step, cancel).await
    }
}

pub fn session(port: Arc<ScriptedPort>) -> Session {
    Session::new(
        USER_ID,
        port,
        Arc::new(StaticParams(vec![
            ("__user".to_owned(), USER_ID.to_owned()),
            ("fb_dtsg".to_owned(), "dtsg-token".to_owned()),
        ])),
        StreamConfig::default(),
    )
}

/// A pull body carrying one text delta at `seq`.
pub fn text_batch(seq: u64, body: &str) -> Vec<u8> {
    format!(
        r#"for (;;);{{"t":"msg","seq":{seq},"ms":[{{"type":"delta","delta":{{"body":"{body}","messageMetadata":{{"actorFbId":"7","messageId":"mid.{seq}","threadKey":{{"otherUserFbId":"7"}}}}}}}}]}}"#
    )
    .into_bytes()
}

/// Value of `key` in a recorded form.
pub fn form_value(form: &Params, key: &str) -> Option<String> {
    form.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

pub fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold before the deadline");
}
