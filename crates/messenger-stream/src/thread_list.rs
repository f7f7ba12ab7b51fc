//! Inbox listing: ranges of the user's threads, addressed by offset.

use std::sync::Arc;

use async_trait::async_trait;
use messenger_core::{
    Cursor, MessengerError, PageAddressing, PageFetcher, ThreadInfo, ThreadListResult,
    deserialize_null_default, strip_json_guard,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{session::SessionShared, stream::url_error};

/// Read `limit` threads starting at `offset` (0 is the most recent thread).
pub(crate) async fn fetch_thread_list(
    shared: &SessionShared,
    offset: u64,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<ThreadListResult, MessengerError> {
    let mut form = shared.params.common_params().await?;
    form.extend([
        ("inbox[filter]".to_owned(), String::new()),
        ("inbox[offset]".to_owned(), offset.to_string()),
        ("inbox[limit]".to_owned(), limit.to_string()),
    ]);
    let url = shared.config.thread_list_url().map_err(url_error)?;

    let body = shared.port.post_form(url, form, cancel).await?;
    let list = parse_thread_list(&body)?;
    tracing::debug!(
        offset,
        threads = list.threads.len(),
        participants = list.participants.len(),
        "fetched thread list"
    );
    Ok(list)
}

/// Pages through the inbox, most recently active thread first.
#[derive(Debug)]
pub struct ThreadListFetcher {
    shared: Arc<SessionShared>,
}

impl ThreadListFetcher {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl PageFetcher<ThreadInfo> for ThreadListFetcher {
    fn addressing(&self) -> PageAddressing {
        PageAddressing::Offset
    }

    async fn fetch(
        &self,
        cursor: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ThreadInfo>, MessengerError> {
        let list = fetch_thread_list(&self.shared, cursor.offset, limit, cancel).await?;
        Ok(list.threads)
    }
}

#[derive(Debug, Deserialize)]
struct ThreadListResponse {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    payload: ThreadListResult,
}

fn parse_thread_list(body: &[u8]) -> Result<ThreadListResult, MessengerError> {
    let response: ThreadListResponse = serde_json::from_slice(strip_json_guard(body))
        .map_err(|err| MessengerError::parse("thread_list_invalid", err.to_string()))?;
    let mut list = response.payload;
    list.canonicalize_ids();
    Ok(list)
}
