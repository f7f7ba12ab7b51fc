//! Seams to the collaborators that own authentication and raw HTTP.

use async_trait::async_trait;
use messenger_core::{MessengerError, TransportError};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Ordered form or query parameters.
pub type Params = Vec<(String, String)>;

/// Performs authenticated HTTP calls and returns raw response bodies.
///
/// Implementations must abort an in-flight call promptly once `cancel`
/// fires and report it as [`TransportError::Cancelled`]. Bodies may still
/// carry the `for (;;);` guard prefix.
#[async_trait]
pub trait RequestPort: Send + Sync {
    async fn get(&self, url: Url, cancel: &CancellationToken) -> Result<Vec<u8>, TransportError>;

    async fn post_form(
        &self,
        url: Url,
        form: Params,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Supplies the per-request session parameters (`__user`, `fb_dtsg`, ...).
///
/// Token refresh and caching live behind this trait.
#[async_trait]
pub trait ParamSource: Send + Sync {
    async fn common_params(&self) -> Result<Params, MessengerError>;
}

/// A fixed parameter set, for sessions whose tokens never rotate.
#[derive(Debug, Clone, Default)]
pub struct StaticParams(pub Params);

#[async_trait]
impl ParamSource for StaticParams {
    async fn common_params(&self) -> Result<Params, MessengerError> {
        Ok(self.0.clone())
    }
}

/// Append `params` to the query string of `base`.
pub(crate) fn with_query<'a, I>(mut base: Url, params: I) -> Url
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    base.query_pairs_mut().extend_pairs(params);
    base
}
