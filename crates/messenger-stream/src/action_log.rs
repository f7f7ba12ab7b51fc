//! Page fetcher over a thread's action log.

use std::sync::Arc;

use async_trait::async_trait;
use messenger_core::{
    Action, Cursor, MessengerError, PageFetcher, decode_action, strip_json_guard,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{session::SessionShared, stream::url_error};

/// GraphQL document for the message-thread query.
const MESSAGE_THREAD_DOC_ID: &str = "1547392382048831";

/// Fetches pages of one thread's actions through the GraphQL batch endpoint.
#[derive(Debug)]
pub struct ActionLogFetcher {
    shared: Arc<SessionShared>,
    thread_id: String,
}

impl ActionLogFetcher {
    pub(crate) fn new(shared: Arc<SessionShared>, thread_id: impl Into<String>) -> Self {
        Self {
            shared,
            thread_id: thread_id.into(),
        }
    }
}

#[async_trait]
impl PageFetcher<Action> for ActionLogFetcher {
    async fn fetch(
        &self,
        cursor: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Action>, MessengerError> {
        let mut form = self.shared.params.common_params().await?;
        form.push((
            "queries".to_owned(),
            thread_query(&self.thread_id, cursor, limit).to_string(),
        ));
        let url = self.shared.config.graphql_url().map_err(url_error)?;

        let body = self.shared.port.post_form(url, form, cancel).await?;
        let page = parse_action_page(&body)?;
        tracing::debug!(
            thread_id = %self.thread_id,
            before_ms = ?cursor.before_ms,
            actions = page.len(),
            "fetched action page"
        );
        Ok(page)
    }
}

/// Batch query body: `{"o0": {"doc_id": .., "query_params": ..}}`.
fn thread_query(thread_id: &str, cursor: Cursor, limit: usize) -> Value {
    json!({
        "o0": {
            "doc_id": MESSAGE_THREAD_DOC_ID,
            "query_params": {
                "id": thread_id,
                "message_limit": limit,
                "load_messages": 1,
                "load_read_receipts": false,
                "before": cursor.before_ms,
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
struct GraphQlMessage {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResult {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    errors: Vec<GraphQlMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchError {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    o0: QueryResult,
    #[serde(default)]
    error: BatchError,
}

/// Decode a batch response into a newest-first page of actions.
///
/// The backend returns nodes oldest first and may append further JSON
/// objects after the first one; only the first object is read.
fn parse_action_page(body: &[u8]) -> Result<Vec<Action>, MessengerError> {
    let body = strip_json_guard(body);
    let response = serde_json::Deserializer::from_slice(body)
        .into_iter::<BatchResponse>()
        .next()
        .ok_or_else(|| MessengerError::parse("action_page_invalid", "empty GraphQL response"))?
        .map_err(|err| MessengerError::parse("action_page_invalid", err.to_string()))?;

    if let Some(first) = response.o0.errors.first() {
        return Err(MessengerError::parse(
            "graphql_error",
            format!("GraphQL error: {}", first.message),
        ));
    }
    if !response.error.description.is_empty() {
        return Err(MessengerError::parse(
            "graphql_error",
            format!("GraphQL error: {}", response.error.description),
        ));
    }

    let nodes = response
        .o0
        .data
        .pointer("/message_thread/messages/nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            MessengerError::parse("action_page_invalid", "response has no message nodes")
        })?;

    Ok(nodes.iter().rev().map(decode_action).collect())
}
