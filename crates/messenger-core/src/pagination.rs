//! Backward-in-time pagination over a cursor-addressed log.
//!
//! A worker fetches pages newest-first and delivers records newest to oldest.
//! Logs addressed by a `before` timestamp overlap by exactly one record
//! between consecutive pages because the bound is inclusive; the overlap is
//! dropped from every page after the first. Offset-addressed logs do not
//! overlap and are delivered untrimmed.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    action::Action,
    channel::{Sink, SinkReceiver, bounded},
    error::MessengerError,
    types::{Cursor, ThreadInfo},
};

/// A record that can anchor the next page's cursor.
pub trait CursorRecord {
    /// Millisecond timestamp of the record.
    fn cursor_timestamp_ms(&self) -> u64;
}

impl CursorRecord for Action {
    fn cursor_timestamp_ms(&self) -> u64 {
        self.timestamp_ms()
    }
}

impl CursorRecord for ThreadInfo {
    fn cursor_timestamp_ms(&self) -> u64 {
        self.timestamp
    }
}

/// Which part of the [`Cursor`] a log reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAddressing {
    /// Inclusive `before_ms` bound; the next page repeats the oldest record.
    Before,
    /// Zero-based record `offset`; pages are disjoint.
    Offset,
}

/// Page-fetch capability for one log.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    fn addressing(&self) -> PageAddressing {
        PageAddressing::Before
    }

    /// Fetch up to `limit` records at or before `cursor`, newest first.
    async fn fetch(
        &self,
        cursor: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, MessengerError>;
}

#[derive(Debug, Default)]
struct PaginatorStatus {
    error: Option<MessengerError>,
}

/// Lazy, cancellable sequence of log records, newest first.
///
/// Not resumable: once closed, build a new paginator to start over.
#[derive(Debug)]
pub struct CursorPaginator<T> {
    receiver: SinkReceiver<T>,
    cancel: CancellationToken,
    status: Arc<Mutex<PaginatorStatus>>,
}

impl<T: CursorRecord + Send + 'static> CursorPaginator<T> {
    /// Spawn the worker on the current tokio runtime. `page_size` is clamped
    /// to at least 1.
    pub fn spawn<F>(fetcher: F, page_size: usize) -> Self
    where
        F: PageFetcher<T> + 'static,
    {
        let cancel = CancellationToken::new();
        let (sink, receiver) = bounded(1, cancel.clone());
        let status = Arc::new(Mutex::new(PaginatorStatus::default()));
        tokio::spawn(run_paginator(
            fetcher,
            page_size.max(1),
            sink,
            Arc::clone(&status),
        ));

        Self {
            receiver,
            cancel,
            status,
        }
    }

    /// Next record, or `None` when the log is exhausted, the paginator was
    /// closed, or a fetch failed (see [`CursorPaginator::error`]).
    pub async fn next(&self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Drain the remaining records and return them oldest first.
    pub async fn collect_oldest_first(&self) -> Vec<T> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record);
        }
        records.reverse();
        records
    }

    /// First fetch failure, if any.
    pub fn error(&self) -> Option<MessengerError> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    /// Stop the worker. Idempotent; buffered records stay readable.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Drop for CursorPaginator<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_paginator<T, F>(
    fetcher: F,
    page_size: usize,
    sink: Sink<T>,
    status: Arc<Mutex<PaginatorStatus>>,
) where
    T: CursorRecord + Send,
    F: PageFetcher<T>,
{
    let cancel = sink.cancellation().clone();
    let overlapping = fetcher.addressing() == PageAddressing::Before;
    let mut cursor = Cursor::default();
    let mut first_page = true;

    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            fetched = fetcher.fetch(cursor, page_size, &cancel) => fetched,
        };
        let mut page = match fetched {
            Ok(page) => page,
            Err(_) if cancel.is_cancelled() => return,
            Err(err) => {
                tracing::warn!(error = %err, ?cursor, "page fetch failed");
                status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .error
                    .get_or_insert(err);
                return;
            }
        };

        let fetched_len = page.len();
        let oldest_ms = page.last().map(CursorRecord::cursor_timestamp_ms);
        if overlapping && !first_page && !page.is_empty() {
            page.remove(0);
        }
        first_page = false;
        if page.is_empty() {
            tracing::debug!(?cursor, "log exhausted");
            return;
        }

        for record in page {
            if sink.is_cancelled() || sink.emit(record).await.is_err() {
                return;
            }
        }

        if fetched_len < page_size {
            tracing::debug!(?cursor, fetched_len, "short page, log exhausted");
            return;
        }
        cursor = Cursor {
            before_ms: oldest_ms,
            offset: cursor.offset + fetched_len as u64,
        };
    }
}
