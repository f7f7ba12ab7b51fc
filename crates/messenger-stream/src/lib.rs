//! Messenger runtime: sessions, long-poll event streams, action-log and inbox
//! paging.
//!
//! All network access goes through the [`RequestPort`] seam; authentication
//! and per-request parameters come from a [`ParamSource`].

/// GraphQL-backed page fetcher for thread action logs.
pub mod action_log;
/// Environment-backed runtime configuration.
pub mod config;
/// Tracing bootstrap.
pub mod logging;
/// Transport and parameter seams.
pub mod port;
/// Profile picture lookup.
pub mod profile;
/// Session owner of streams and paginators.
pub mod session;
/// Long-poll event stream worker.
pub mod stream;
/// Offset-addressed inbox listing.
pub mod thread_list;

pub use action_log::ActionLogFetcher;
pub use config::{ConfigError, StreamConfig};
pub use port::{ParamSource, Params, RequestPort, StaticParams};
pub use session::{ReadEventError, Session};
pub use stream::EventStream;
pub use thread_list::ThreadListFetcher;
