use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use messenger_core::{
    Action, CursorPaginator, Event, MessengerError, ThreadInfo, ThreadListResult,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    action_log::ActionLogFetcher,
    config::StreamConfig,
    port::{ParamSource, RequestPort},
    profile::fetch_profile_picture,
    stream::EventStream,
    thread_list::{ThreadListFetcher, fetch_thread_list},
};

/// Why [`Session::read_event`] returned no event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadEventError {
    /// The default stream was closed without a failure.
    #[error("event stream is closed")]
    Closed,
    /// The default stream stopped because of this error.
    #[error("event stream failed: {0}")]
    Failed(MessengerError),
}

/// Session-level state shared by every stream and paginator.
pub(crate) struct SessionShared {
    pub(crate) user_id: String,
    pub(crate) port: Arc<dyn RequestPort>,
    pub(crate) params: Arc<dyn ParamSource>,
    pub(crate) config: StreamConfig,
    rng: Mutex<StdRng>,
}

impl SessionShared {
    /// Four random lowercase letters used as the `cb` cache buster.
    pub(crate) fn cache_buster(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..4)
            .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
            .collect()
    }
}

impl fmt::Debug for SessionShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionShared")
            .field("user_id", &self.user_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
enum DefaultStream {
    #[default]
    Idle,
    Open(Arc<EventStream>),
    Closed,
}

/// An authenticated Messenger session.
///
/// Owns the collaborators every stream and paginator borrows, plus a lazily
/// started default stream behind [`Session::read_event`].
#[derive(Debug)]
pub struct Session {
    shared: Arc<SessionShared>,
    default_stream: Mutex<DefaultStream>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        port: Arc<dyn RequestPort>,
        params: Arc<dyn ParamSource>,
        config: StreamConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                user_id: user_id.into(),
                port,
                params,
                config,
                rng: Mutex::new(StdRng::from_os_rng()),
            }),
            default_stream: Mutex::new(DefaultStream::Idle),
        }
    }

    /// FBID of the authenticated user.
    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Start an independent event stream on the current tokio runtime.
    ///
    /// The caller owns it and must close it; dropping it also stops the worker.
    pub fn event_stream(&self) -> EventStream {
        EventStream::spawn(Arc::clone(&self.shared))
    }

    /// Read the next event from the default stream, starting it on first use.
    pub async fn read_event(&self) -> Result<Event, ReadEventError> {
        let stream = {
            let mut guard = self
                .default_stream
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match &*guard {
                DefaultStream::Open(stream) => Arc::clone(stream),
                DefaultStream::Closed => return Err(ReadEventError::Closed),
                DefaultStream::Idle => {
                    let stream = Arc::new(self.event_stream());
                    *guard = DefaultStream::Open(Arc::clone(&stream));
                    stream
                }
            }
        };

        match stream.recv().await {
            Some(event) => Ok(event),
            None => Err(stream
                .error()
                .map_or(ReadEventError::Closed, ReadEventError::Failed)),
        }
    }

    /// Close the default stream. Later reads fail with [`ReadEventError::Closed`].
    ///
    /// Streams from [`Session::event_stream`] are not affected.
    pub fn close(&self) {
        let previous = std::mem::replace(
            &mut *self
                .default_stream
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            DefaultStream::Closed,
        );
        if let DefaultStream::Open(stream) = previous {
            stream.close();
        }
    }

    /// Paginate a thread's action log with the configured page size.
    pub fn action_log(&self, thread_id: impl Into<String>) -> CursorPaginator<Action> {
        self.action_log_with_page_size(thread_id, self.shared.config.action_page_size)
    }

    /// Paginate a thread's action log, newest action first.
    pub fn action_log_with_page_size(
        &self,
        thread_id: impl Into<String>,
        page_size: usize,
    ) -> CursorPaginator<Action> {
        let fetcher = ActionLogFetcher::new(Arc::clone(&self.shared), thread_id);
        CursorPaginator::spawn(fetcher, page_size)
    }

    /// Read up to `limit` threads starting at `offset`, most recent first.
    ///
    /// Dropping the future aborts the request.
    pub async fn threads(
        &self,
        offset: u64,
        limit: usize,
    ) -> Result<ThreadListResult, MessengerError> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        fetch_thread_list(&self.shared, offset, limit, &cancel).await
    }

    /// Paginate the whole inbox, most recently active thread first.
    pub fn thread_log(&self, page_size: usize) -> CursorPaginator<ThreadInfo> {
        CursorPaginator::spawn(ThreadListFetcher::new(Arc::clone(&self.shared)), page_size)
    }

    /// URL of a small square profile picture for `fbid`.
    pub async fn profile_picture(&self, fbid: &str) -> Result<Url, MessengerError> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        fetch_profile_picture(&self.shared, fbid, &cancel).await
    }
}
