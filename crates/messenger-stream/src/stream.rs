//! Long-poll event stream.
//!
//! Each stream owns one worker task. The worker runs a one-shot handshake
//! (reconnect, then discovery of the sticky pool and token) and then polls
//! the edge pull endpoint until the stream is closed. Poll failures are
//! retried after a fixed delay; handshake failures close the stream with the
//! error recorded.

use std::sync::{Arc, Mutex, PoisonError};

use messenger_core::{
    ErrorCategory, Event, MessengerError, PollSession, Sink, SinkReceiver, StreamState,
    StreamStateMachine, TransportError, bounded, parse_poll_body, parse_reconnect_host,
    parse_sticky_info, route_frame,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::{
    port::{Params, with_query},
    session::SessionShared,
};

#[derive(Debug, Default)]
struct StreamStatus {
    machine: StreamStateMachine,
    error: Option<MessengerError>,
    seq: u64,
}

/// A live view of the user's incoming events.
///
/// Events are read with [`EventStream::recv`]. When it returns `None` the
/// stream is closed; [`EventStream::error`] tells a clean close apart from a
/// failed handshake.
#[derive(Debug)]
pub struct EventStream {
    receiver: SinkReceiver<Event>,
    cancel: CancellationToken,
    status: Arc<Mutex<StreamStatus>>,
}

impl EventStream {
    pub(crate) fn spawn(shared: Arc<SessionShared>) -> Self {
        let cancel = CancellationToken::new();
        let (sink, receiver) = bounded(shared.config.event_buffer, cancel.clone());
        let status = Arc::new(Mutex::new(StreamStatus::default()));

        let span = tracing::info_span!("event_stream", user_id = %shared.user_id);
        let worker = StreamWorker {
            shared,
            sink,
            status: Arc::clone(&status),
        };
        tokio::spawn(worker.run().instrument(span));

        Self {
            receiver,
            cancel,
            status,
        }
    }

    /// Next event, or `None` once the stream is closed and drained.
    pub async fn recv(&self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// The error that stopped the stream, if any. Never set by [`EventStream::close`].
    pub fn error(&self) -> Option<MessengerError> {
        self.lock_status().error.clone()
    }

    pub fn state(&self) -> StreamState {
        self.lock_status().machine.state()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_status().machine.is_closed()
    }

    /// Highest sequence number seen so far.
    pub fn seq(&self) -> u64 {
        self.lock_status().seq
    }

    /// Stop the worker and close the event sink.
    ///
    /// Idempotent and safe to call from several tasks at once.
    pub fn close(&self) {
        if self.lock_status().machine.close() {
            tracing::info!("event stream closed by owner");
        }
        self.cancel.cancel();
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, StreamStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why a worker step did not produce a value.
#[derive(Debug)]
enum Halt {
    Cancelled,
    Failed(MessengerError),
}

impl Halt {
    /// Tag a failure with the handshake stage it happened in.
    fn during(self, stage: &str) -> Self {
        match self {
            Halt::Cancelled => Halt::Cancelled,
            Halt::Failed(err) => Halt::Failed(MessengerError::initialization(stage, err)),
        }
    }
}

impl From<TransportError> for Halt {
    fn from(err: TransportError) -> Self {
        if err.is_cancelled() {
            Halt::Cancelled
        } else {
            Halt::Failed(err.into())
        }
    }
}

impl From<MessengerError> for Halt {
    fn from(err: MessengerError) -> Self {
        Halt::Failed(err)
    }
}

pub(crate) fn url_error(err: url::ParseError) -> MessengerError {
    MessengerError::new(ErrorCategory::Config, "invalid_url", err.to_string())
}

struct StreamWorker {
    shared: Arc<SessionShared>,
    sink: Sink<Event>,
    status: Arc<Mutex<StreamStatus>>,
}

impl StreamWorker {
    async fn run(self) {
        let session = match self.handshake().await {
            Ok(session) => session,
            Err(Halt::Cancelled) => {
                tracing::debug!("handshake cancelled");
                self.finish();
                return;
            }
            Err(Halt::Failed(err)) => {
                tracing::error!(
                    code = %err.code,
                    error = %err,
                    "event stream initialization failed"
                );
                self.fail(err);
                return;
            }
        };

        if let Err(err) = self.lock_status().machine.begin_streaming() {
            tracing::debug!(error = %err, "stream closed before polling started");
            return;
        }
        tracing::info!(sticky_pool = %session.sticky_pool, "event stream polling");

        self.poll_loop(session).await;
        self.finish();
    }

    async fn handshake(&self) -> Result<PollSession, Halt> {
        let host = self.reconnect().await.map_err(|halt| halt.during("reconnect"))?;
        tracing::debug!(%host, "reconnect named pull host");
        self.discover(&host)
            .await
            .map_err(|halt| halt.during("discovery"))
    }

    async fn reconnect(&self) -> Result<String, Halt> {
        let mut params = self.shared.params.common_params().await?;
        params.push(("reason".to_owned(), "6".to_owned()));
        let base = self.shared.config.reconnect_url().map_err(url_error)?;
        let url = with_query(base, params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let body = self.get(url).await?;
        Ok(parse_reconnect_host(&body)?)
    }

    async fn discover(&self, host: &str) -> Result<PollSession, Halt> {
        let base = self.shared.config.pull_url(host).map_err(url_error)?;
        let params = self.pull_params(None);
        let url = with_query(base, params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let body = self.get(url).await?;
        let sticky = parse_sticky_info(&body)?;
        Ok(PollSession::new(sticky.pool, sticky.token))
    }

    async fn poll_loop(&self, mut session: PollSession) {
        let retry = self.shared.config.retry;
        let base = match self.shared.config.edge_pull_url() {
            Ok(base) => base,
            Err(err) => {
                self.record(url_error(err));
                return;
            }
        };

        loop {
            if self.sink.is_cancelled() {
                return;
            }

            let params = self.pull_params(Some(&session));
            let url = with_query(
                base.clone(),
                params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
            let body = match self.get(url).await {
                Ok(body) => body,
                Err(Halt::Cancelled) => return,
                Err(Halt::Failed(err)) => {
                    tracing::warn!(
                        code = %err.code,
                        error = %err,
                        delay_ms = retry.delay_ms(),
                        "poll failed, retrying"
                    );
                    if !retry.wait(self.sink.cancellation()).await {
                        return;
                    }
                    continue;
                }
            };

            let batch = match parse_poll_body(&body) {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(
                        code = %err.code,
                        error = %err,
                        delay_ms = retry.delay_ms(),
                        "poll body rejected, retrying"
                    );
                    if !retry.wait(self.sink.cancellation()).await {
                        return;
                    }
                    continue;
                }
            };

            if let Some(observed) = batch.max_seq {
                let tracked = session.advance_seq(observed);
                self.lock_status().seq = tracked;
                tracing::debug!(observed, tracked, frames = batch.frames.len(), "poll batch");
            }

            for frame in &batch.frames {
                for event in route_frame(frame) {
                    if self.sink.emit(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Query for a pull request. `None` builds the discovery request.
    fn pull_params(&self, session: Option<&PollSession>) -> Params {
        let user_id = self.shared.user_id.as_str();
        let (seq, idle) = session.map_or((0, 0), |s| (s.seq(), s.idle_secs()));
        let seq = seq.to_string();

        let mut params: Vec<(&str, String)> = vec![
            ("cap", "8".to_owned()),
            ("cb", self.shared.cache_buster()),
            ("channel", format!("p_{user_id}")),
            ("clientid", self.shared.config.client_id.clone()),
            ("idle", idle.to_string()),
        ];
        if session.is_some() {
            params.push(("isq", "243".to_owned()));
        }
        params.extend([
            ("msgr_region", "FRC".to_owned()),
            ("msgs_recv", seq.clone()),
            ("partition", "-2".to_owned()),
            ("pws", "fresh".to_owned()),
            ("qp", "y".to_owned()),
            ("seq", seq),
            ("state", "offline".to_owned()),
            ("uid", user_id.to_owned()),
            ("viewer_uid", user_id.to_owned()),
        ]);
        if let Some(session) = session {
            params.push(("sticky_pool", session.sticky_pool.clone()));
            params.push(("sticky_token", session.sticky_token.clone()));
        }

        params
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect()
    }

    /// GET through the port, racing the stream's cancellation.
    async fn get(&self, url: Url) -> Result<Vec<u8>, Halt> {
        let cancel = self.sink.cancellation();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Halt::Cancelled),
            result = self.shared.port.get(url, cancel) => result,
        };
        if cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        Ok(result?)
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, StreamStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: MessengerError) {
        let mut status = self.lock_status();
        if status.machine.fail_initialization().is_ok() {
            status.error.get_or_insert(err);
        }
    }

    fn record(&self, err: MessengerError) {
        let mut status = self.lock_status();
        status.error.get_or_insert(err);
        status.machine.close();
    }

    fn finish(&self) {
        if self.lock_status().machine.close() {
            tracing::info!("event stream stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use messenger_core::ErrorCategory;

    use super::*;

    #[test]
    fn halt_tags_failures_with_stage() {
        let halt = Halt::from(TransportError::Status { status: 502 }).during("reconnect");
        match halt {
            Halt::Failed(err) => {
                assert_eq!(err.category, ErrorCategory::Initialization);
                assert_eq!(err.code, "reconnect_failed");
            }
            other => panic!("unexpected halt: {other:?}"),
        }
        assert!(matches!(
            Halt::from(TransportError::Cancelled).during("discovery"),
            Halt::Cancelled
        ));
    }

    #[test]
    fn url_errors_are_config_errors() {
        let err = url_error(url::ParseError::EmptyHost);
        assert_eq!(err.category, ErrorCategory::Config);
        assert_eq!(err.code, "invalid_url");
    }
}
