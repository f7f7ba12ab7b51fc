//! Profile picture lookup.

use messenger_core::{MessengerError, strip_json_guard};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{session::SessionShared, stream::url_error};

/// Edge length of the requested square thumbnail, in pixels.
const PROFILE_PICTURE_SIZE: &str = "50";

pub(crate) async fn fetch_profile_picture(
    shared: &SessionShared,
    fbid: &str,
    cancel: &CancellationToken,
) -> Result<Url, MessengerError> {
    let mut form = shared.params.common_params().await?;
    form.extend(
        [
            ("requests[0][fbid]", fbid),
            ("requests[0][type]", "profile_picture"),
            ("requests[0][width]", PROFILE_PICTURE_SIZE),
            ("requests[0][height]", PROFILE_PICTURE_SIZE),
            ("requests[0][resize_mode]", "p"),
        ]
        .map(|(key, value)| (key.to_owned(), value.to_owned())),
    );
    let url = shared.config.image_source_url().map_err(url_error)?;

    let body = shared.port.post_form(url, form, cancel).await?;
    parse_image_source(&body)
}

#[derive(Debug, Deserialize)]
struct ImageSource {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageSourceResponse {
    #[serde(default)]
    payload: Option<Vec<ImageSource>>,
}

fn parse_image_source(body: &[u8]) -> Result<Url, MessengerError> {
    let response: ImageSourceResponse = serde_json::from_slice(strip_json_guard(body))
        .map_err(|err| MessengerError::parse("image_source_invalid", err.to_string()))?;
    let mut payload = response.payload.unwrap_or_default();
    if payload.len() != 1 {
        return Err(MessengerError::parse(
            "image_source_invalid",
            format!("expected one image source, got {}", payload.len()),
        ));
    }
    let uri = payload.remove(0).uri.unwrap_or_default();
    Url::parse(&uri).map_err(|err| MessengerError::parse("image_source_invalid", err.to_string()))
}
