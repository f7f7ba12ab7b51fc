//! Message attachments and their classifier.
//!
//! Two envelopes are seen on the wire:
//!
//! * inline: the pull-channel form, `{"fbid", "filename", "mimeType",
//!   "mercury": {"attach_type": "photo", "hires_url", ...}}`;
//! * blob: the GraphQL form, `{"__typename": "MessageImage",
//!   "large_preview": {"uri", ...}, ...}`. Newer pull frames nest it as
//!   `mercury.blob_attachment`.
//!
//! Every variant tries inline first, then blob.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    decode::{ShapeMismatch, VariantDecoder, WireShape},
    normalization::{deserialize_canonical_id, deserialize_lenient_u64},
};

pub const IMAGE_ATTACHMENT_TYPE: &str = "photo";
pub const ANIMATED_IMAGE_ATTACHMENT_TYPE: &str = "animated_image";
pub const STICKER_ATTACHMENT_TYPE: &str = "sticker";
pub const AUDIO_ATTACHMENT_TYPE: &str = "audio";
pub const VIDEO_ATTACHMENT_TYPE: &str = "video";
pub const FILE_ATTACHMENT_TYPE: &str = "file";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAttachment {
    pub fbid: String,
    pub filename: String,
    pub mime_type: String,
    pub width: u64,
    pub height: u64,
    pub preview_url: String,
    pub large_preview_url: String,
    pub thumbnail_url: String,
    pub hires_url: String,
    /// Animated images (GIFs) keep their playable URL in `hires_url`.
    pub animated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StickerAttachment {
    pub url: String,
    pub sticker_id: String,
    pub pack_id: String,
    pub sprite_uri: String,
    pub sprite_uri_2x: String,
    pub padded_sprite_uri: String,
    pub padded_sprite_uri_2x: String,
    pub frame_count: u64,
    pub frame_rate: u64,
    pub frames_per_row: u64,
    pub frames_per_col: u64,
    pub width: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioAttachment {
    pub filename: String,
    pub url: String,
    pub duration_ms: u64,
    pub voicemail: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoAttachment {
    pub filename: String,
    pub url: String,
    pub duration_ms: u64,
    pub width: u64,
    pub height: u64,
    pub preview_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAttachment {
    pub fbid: String,
    pub filename: String,
    pub url: String,
    pub mime_type: String,
    pub size: u64,
    pub malicious: bool,
}

/// Attachment of an unsupported type, kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnknownAttachment {
    /// Type tag recovered from the payload, possibly empty.
    pub attachment_type: String,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Attachment {
    Audio(AudioAttachment),
    Image(ImageAttachment),
    Sticker(StickerAttachment),
    File(FileAttachment),
    Video(VideoAttachment),
    Unknown(UnknownAttachment),
}

impl Attachment {
    /// Canonical type tag, for example [`IMAGE_ATTACHMENT_TYPE`].
    pub fn attachment_type(&self) -> &str {
        match self {
            Attachment::Audio(_) => AUDIO_ATTACHMENT_TYPE,
            Attachment::Image(image) if image.animated => ANIMATED_IMAGE_ATTACHMENT_TYPE,
            Attachment::Image(_) => IMAGE_ATTACHMENT_TYPE,
            Attachment::Sticker(_) => STICKER_ATTACHMENT_TYPE,
            Attachment::File(_) => FILE_ATTACHMENT_TYPE,
            Attachment::Video(_) => VIDEO_ATTACHMENT_TYPE,
            Attachment::Unknown(unknown) => &unknown.attachment_type,
        }
    }

    /// Most relevant URL: download URL for files, hi-res URL for images,
    /// image URL for stickers. Empty for unknown attachments.
    pub fn url(&self) -> &str {
        match self {
            Attachment::Audio(audio) => &audio.url,
            Attachment::Image(image) => &image.hires_url,
            Attachment::Sticker(sticker) => &sticker.url,
            Attachment::File(file) => &file.url,
            Attachment::Video(video) => &video.url,
            Attachment::Unknown(_) => "",
        }
    }
}

macro_rules! into_attachment {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(impl From<$payload> for Attachment {
            fn from(value: $payload) -> Self {
                Attachment::$variant(value)
            }
        })*
    };
}

into_attachment!(
    AudioAttachment => Audio,
    ImageAttachment => Image,
    StickerAttachment => Sticker,
    FileAttachment => File,
    VideoAttachment => Video,
);

/// Classify one attachment payload. Never fails; unmatched payloads become
/// [`Attachment::Unknown`] carrying the input unchanged.
pub fn decode_attachment(raw: &Value) -> Attachment {
    if let Some(attachment) = ATTACHMENT_DECODER.decode(raw) {
        return attachment;
    }
    if let Some(nested) = raw.pointer("/mercury/blob_attachment")
        && let Some(attachment) = ATTACHMENT_DECODER.decode(nested)
    {
        return attachment;
    }
    Attachment::Unknown(UnknownAttachment {
        attachment_type: unknown_type_tag(raw),
        raw: raw.clone(),
    })
}

/// Classify a list of attachment payloads, preserving order.
pub fn decode_attachments(raw: &[Value]) -> Vec<Attachment> {
    raw.iter().map(decode_attachment).collect()
}

static ATTACHMENT_DECODER: LazyLock<VariantDecoder<Attachment>> = LazyLock::new(|| {
    VariantDecoder::new()
        .shape::<InlineAudio>("inline_audio")
        .shape::<BlobAudio>("blob_audio")
        .shape::<InlineImage>("inline_image")
        .shape::<BlobAnimatedImage>("blob_animated_image")
        .shape::<BlobImage>("blob_image")
        .shape::<InlineSticker>("inline_sticker")
        .shape::<BlobSticker>("blob_sticker")
        .shape::<InlineVideo>("inline_video")
        .shape::<BlobVideo>("blob_video")
        .shape::<InlineFile>("inline_file")
        .shape::<BlobFile>("blob_file")
});

fn unknown_type_tag(raw: &Value) -> String {
    ["/mercury/attach_type", "/attach_type", "/__typename"]
        .iter()
        .find_map(|pointer| raw.pointer(pointer).and_then(Value::as_str))
        .unwrap_or_default()
        .to_owned()
}

#[derive(Debug, Default, Deserialize)]
struct UriRef {
    #[serde(default)]
    uri: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    width: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    height: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Dimensions {
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    x: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    y: u64,
}

// ---- inline envelope ----

#[derive(Debug, Default, Deserialize)]
struct InlineImageMeta {
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    width: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct InlineImageMercury {
    attach_type: String,
    #[serde(default)]
    preview_url: String,
    #[serde(default)]
    large_preview_url: String,
    #[serde(default)]
    thumbnail_url: String,
    #[serde(default)]
    hires_url: String,
}

#[derive(Debug, Deserialize)]
struct InlineImage {
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    fbid: String,
    #[serde(default)]
    filename: String,
    #[serde(default, rename = "mimeType")]
    mime_type: String,
    #[serde(default, rename = "imageMetadata")]
    meta: InlineImageMeta,
    mercury: InlineImageMercury,
}

impl WireShape for InlineImage {
    type Output = ImageAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(
            &self.mercury.attach_type,
            &[IMAGE_ATTACHMENT_TYPE, ANIMATED_IMAGE_ATTACHMENT_TYPE],
        )
    }

    fn into_output(self) -> ImageAttachment {
        ImageAttachment {
            animated: self.mercury.attach_type == ANIMATED_IMAGE_ATTACHMENT_TYPE,
            fbid: self.fbid,
            filename: self.filename,
            mime_type: self.mime_type,
            width: self.meta.width,
            height: self.meta.height,
            preview_url: self.mercury.preview_url,
            large_preview_url: self.mercury.large_preview_url,
            thumbnail_url: self.mercury.thumbnail_url,
            hires_url: self.mercury.hires_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineStickerMeta {
    #[serde(default, rename = "stickerID", deserialize_with = "deserialize_canonical_id")]
    sticker_id: String,
    #[serde(default, rename = "packID", deserialize_with = "deserialize_canonical_id")]
    pack_id: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frame_count: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frame_rate: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frames_per_row: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frames_per_col: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    width: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    height: u64,
    #[serde(default, rename = "spriteURI")]
    sprite_uri: Option<String>,
    #[serde(default, rename = "spriteURI2x")]
    sprite_uri_2x: Option<String>,
    #[serde(default, rename = "paddedSpriteURI")]
    padded_sprite_uri: Option<String>,
    #[serde(default, rename = "paddedSpriteURI2x")]
    padded_sprite_uri_2x: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InlineStickerMercury {
    attach_type: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    metadata: InlineStickerMeta,
}

#[derive(Debug, Deserialize)]
struct InlineSticker {
    mercury: InlineStickerMercury,
}

impl WireShape for InlineSticker {
    type Output = StickerAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.mercury.attach_type, &[STICKER_ATTACHMENT_TYPE])
    }

    fn into_output(self) -> StickerAttachment {
        let meta = self.mercury.metadata;
        StickerAttachment {
            url: self.mercury.url,
            sticker_id: meta.sticker_id,
            pack_id: meta.pack_id,
            sprite_uri: meta.sprite_uri.unwrap_or_default(),
            sprite_uri_2x: meta.sprite_uri_2x.unwrap_or_default(),
            padded_sprite_uri: meta.padded_sprite_uri.unwrap_or_default(),
            padded_sprite_uri_2x: meta.padded_sprite_uri_2x.unwrap_or_default(),
            frame_count: meta.frame_count,
            frame_rate: meta.frame_rate,
            frames_per_row: meta.frames_per_row,
            frames_per_col: meta.frames_per_col,
            width: meta.width,
            height: meta.height,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct InlineMediaMeta {
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    width: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    height: u64,
    #[serde(default)]
    is_voicemail: bool,
}

#[derive(Debug, Deserialize)]
struct InlineMediaMercury {
    attach_type: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    preview_url: String,
    #[serde(default)]
    metadata: InlineMediaMeta,
}

/// Shared inline body for audio, video and file attachments.
#[derive(Debug, Deserialize)]
struct InlineMedia {
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    fbid: String,
    #[serde(default)]
    filename: String,
    #[serde(default, rename = "mimeType")]
    mime_type: String,
    #[serde(default, rename = "fileSize", deserialize_with = "deserialize_lenient_u64")]
    file_size: u64,
    mercury: InlineMediaMercury,
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct InlineAudio(InlineMedia);

impl WireShape for InlineAudio {
    type Output = AudioAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.0.mercury.attach_type, &[AUDIO_ATTACHMENT_TYPE])
    }

    fn into_output(self) -> AudioAttachment {
        let media = self.0;
        AudioAttachment {
            filename: media.filename,
            url: media.mercury.url,
            duration_ms: media.mercury.metadata.duration,
            voicemail: media.mercury.metadata.is_voicemail,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct InlineVideo(InlineMedia);

impl WireShape for InlineVideo {
    type Output = VideoAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.0.mercury.attach_type, &[VIDEO_ATTACHMENT_TYPE])
    }

    fn into_output(self) -> VideoAttachment {
        let media = self.0;
        VideoAttachment {
            filename: media.filename,
            url: media.mercury.url,
            duration_ms: media.mercury.metadata.duration,
            width: media.mercury.metadata.width,
            height: media.mercury.metadata.height,
            preview_url: media.mercury.preview_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct InlineFile(InlineMedia);

impl WireShape for InlineFile {
    type Output = FileAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.0.mercury.attach_type, &[FILE_ATTACHMENT_TYPE])
    }

    fn into_output(self) -> FileAttachment {
        let media = self.0;
        FileAttachment {
            fbid: media.fbid,
            filename: media.filename,
            url: media.mercury.url,
            mime_type: media.mime_type,
            size: media.file_size,
            malicious: false,
        }
    }
}

// ---- blob envelope ----

#[derive(Debug, Deserialize)]
struct BlobImage {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    legacy_attachment_id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    original_dimensions: Dimensions,
    #[serde(default)]
    preview: UriRef,
    #[serde(default)]
    large_preview: UriRef,
    #[serde(default)]
    thumbnail: UriRef,
}

impl WireShape for BlobImage {
    type Output = ImageAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &["MessageImage"])
    }

    fn into_output(self) -> ImageAttachment {
        ImageAttachment {
            fbid: self.legacy_attachment_id,
            filename: self.filename,
            mime_type: String::new(),
            width: self.original_dimensions.x,
            height: self.original_dimensions.y,
            preview_url: self.preview.uri,
            hires_url: self.large_preview.uri.clone(),
            large_preview_url: self.large_preview.uri,
            thumbnail_url: self.thumbnail.uri,
            animated: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobAnimatedImage {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    legacy_attachment_id: String,
    #[serde(default)]
    filename: String,
    animated_image: UriRef,
    #[serde(default)]
    preview_image: UriRef,
}

impl WireShape for BlobAnimatedImage {
    type Output = ImageAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &["MessageAnimatedImage"])
    }

    fn into_output(self) -> ImageAttachment {
        ImageAttachment {
            fbid: self.legacy_attachment_id,
            filename: self.filename,
            mime_type: String::new(),
            width: self.animated_image.width,
            height: self.animated_image.height,
            preview_url: self.preview_image.uri.clone(),
            large_preview_url: self.preview_image.uri,
            thumbnail_url: String::new(),
            hires_url: self.animated_image.uri,
            animated: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BlobPack {
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct BlobSticker {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(deserialize_with = "deserialize_canonical_id")]
    id: String,
    #[serde(default)]
    pack: BlobPack,
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    width: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    height: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frame_count: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frame_rate: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frames_per_row: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    frames_per_column: u64,
    #[serde(default)]
    sprite_image: Option<UriRef>,
    #[serde(default)]
    sprite_image_2x: Option<UriRef>,
    #[serde(default)]
    padded_sprite_image: Option<UriRef>,
    #[serde(default)]
    padded_sprite_image_2x: Option<UriRef>,
}

impl WireShape for BlobSticker {
    type Output = StickerAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &["Sticker", "MessageSticker"])
    }

    fn into_output(self) -> StickerAttachment {
        fn uri(image: Option<UriRef>) -> String {
            image.map(|image| image.uri).unwrap_or_default()
        }

        StickerAttachment {
            url: self.url,
            sticker_id: self.id,
            pack_id: self.pack.id,
            sprite_uri: uri(self.sprite_image),
            sprite_uri_2x: uri(self.sprite_image_2x),
            padded_sprite_uri: uri(self.padded_sprite_image),
            padded_sprite_uri_2x: uri(self.padded_sprite_image_2x),
            frame_count: self.frame_count,
            frame_rate: self.frame_rate,
            frames_per_row: self.frames_per_row,
            frames_per_col: self.frames_per_column,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobAudio {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    playable_url: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    playable_duration_in_ms: u64,
    #[serde(default)]
    is_voicemail: bool,
}

impl WireShape for BlobAudio {
    type Output = AudioAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &["MessageAudio"])
    }

    fn into_output(self) -> AudioAttachment {
        AudioAttachment {
            filename: self.filename,
            url: self.playable_url,
            duration_ms: self.playable_duration_in_ms,
            voicemail: self.is_voicemail,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobVideo {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    playable_url: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    playable_duration_in_ms: u64,
    #[serde(default)]
    original_dimensions: Dimensions,
    #[serde(default)]
    large_image: UriRef,
}

impl WireShape for BlobVideo {
    type Output = VideoAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &["MessageVideo"])
    }

    fn into_output(self) -> VideoAttachment {
        VideoAttachment {
            filename: self.filename,
            url: self.playable_url,
            duration_ms: self.playable_duration_in_ms,
            width: self.original_dimensions.x,
            height: self.original_dimensions.y,
            preview_url: self.large_image.uri,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobFile {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default, deserialize_with = "deserialize_canonical_id")]
    message_file_fbid: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    is_malicious: bool,
}

impl WireShape for BlobFile {
    type Output = FileAttachment;

    fn validate(&self) -> Result<(), ShapeMismatch> {
        ShapeMismatch::expect_tag(&self.typename, &["MessageFile"])
    }

    fn into_output(self) -> FileAttachment {
        FileAttachment {
            fbid: self.message_file_fbid,
            filename: self.filename,
            url: self.url,
            mime_type: self.content_type,
            size: 0,
            malicious: self.is_malicious,
        }
    }
}
