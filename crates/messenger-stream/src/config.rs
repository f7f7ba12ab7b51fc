//! Environment-backed configuration for sessions and event streams.

use std::{env, error::Error, fmt};

use messenger_core::RetryPolicy;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.messenger.com";
const DEFAULT_EDGE_DOMAIN: &str = "messenger.com";
const DEFAULT_CLIENT_ID: &str = "3342de8f";
const DEFAULT_EVENT_BUFFER: usize = 1;
const DEFAULT_ACTION_PAGE_SIZE: usize = 100;

/// Host prefix of the steady-state pull endpoint.
const EDGE_CHAT_HOST: &str = "edge-chat";

/// Runtime configuration shared by every stream and paginator of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Web origin used for the reconnect and GraphQL endpoints.
    pub base_url: String,
    /// Domain the pull hosts live under (`0-<host>.<edge_domain>`).
    pub edge_domain: String,
    /// Client id echoed on every pull request.
    pub client_id: String,
    /// Delay applied after a failed poll.
    pub retry: RetryPolicy,
    /// Capacity of each stream's event sink.
    pub event_buffer: usize,
    /// Default page size for action-log paginators.
    pub action_page_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            edge_domain: DEFAULT_EDGE_DOMAIN.to_owned(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            retry: RetryPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            action_page_size: DEFAULT_ACTION_PAGE_SIZE,
        }
    }
}

impl StreamConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = match optional_trimmed_env("MESSENGER_BASE_URL", &mut lookup) {
            Some(value) => match Url::parse(&value) {
                Ok(url) => url.to_string(),
                Err(err) => {
                    return Err(ConfigError::InvalidValue {
                        key: "MESSENGER_BASE_URL",
                        value,
                        reason: err.to_string(),
                    });
                }
            },
            None => DEFAULT_BASE_URL.to_owned(),
        };
        let edge_domain = optional_trimmed_env("MESSENGER_EDGE_DOMAIN", &mut lookup)
            .unwrap_or_else(|| DEFAULT_EDGE_DOMAIN.to_owned());
        let client_id = optional_trimmed_env("MESSENGER_CLIENT_ID", &mut lookup)
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_owned());

        let retry_delay_ms = parse_positive(
            "MESSENGER_POLL_RETRY_DELAY_MS",
            RetryPolicy::DEFAULT_DELAY_MS,
            &mut lookup,
        )?;
        let event_buffer = parse_positive(
            "MESSENGER_EVENT_BUFFER",
            DEFAULT_EVENT_BUFFER as u64,
            &mut lookup,
        )?;
        let action_page_size = parse_positive(
            "MESSENGER_ACTION_PAGE_SIZE",
            DEFAULT_ACTION_PAGE_SIZE as u64,
            &mut lookup,
        )?;

        Ok(Self {
            base_url,
            edge_domain,
            client_id,
            retry: RetryPolicy::fixed(retry_delay_ms),
            event_buffer: event_buffer as usize,
            action_page_size: action_page_size as usize,
        })
    }

    /// Reconnect endpoint that names the pull host for a new stream.
    pub fn reconnect_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)?.join("/ajax/presence/reconnect.php")
    }

    /// GraphQL batch endpoint used by the action log.
    pub fn graphql_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)?.join("/api/graphqlbatch")
    }

    /// Inbox listing endpoint, addressed by offset.
    pub fn thread_list_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)?.join("/ajax/mercury/threadlist_info.php?dpr=1")
    }

    pub fn image_source_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)?.join("/ajax/image_source.php?dpr=1")
    }

    /// Pull endpoint on `host` (for example the host named by reconnect).
    pub fn pull_url(&self, host: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("https://0-{host}.{}/pull", self.edge_domain))
    }

    /// Pull endpoint used once the sticky session is established.
    pub fn edge_pull_url(&self) -> Result<Url, url::ParseError> {
        self.pull_url(EDGE_CHAT_HOST)
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_positive<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    let parsed = value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value: value.clone(),
            reason: err.to_string(),
        })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(parsed)
}
