//! Content parts in the native `generateContent` wire shape.

use serde::{Deserialize, Serialize};

/// MIME type assumed for images that do not declare one.
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Base64 image payload with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    /// Render as a `data:<mime>;base64,<data>` URI.
    pub fn to_data_uri(&self) -> String {
        let mime = if self.mime_type.is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            &self.mime_type
        };
        format!("data:{mime};base64,{}", self.data)
    }
}

/// One element of a request's `parts` array.
///
/// Serializes as `{"text": ..}` or `{"inlineData": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentPart::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URI.
    ///
    /// Returns `None` for anything that is not a base64 data URI or whose
    /// payload is empty.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64")?;
        if payload.is_empty() {
            return None;
        }
        let mime = if mime.is_empty() { DEFAULT_IMAGE_MIME } else { mime };
        Some(Self::inline(mime, payload))
    }

    /// Accept either a data URI or a bare base64 payload.
    pub fn from_image(image: &str) -> Option<Self> {
        let image = image.trim();
        if image.starts_with("data:") {
            return Self::from_data_uri(image);
        }
        if image.is_empty() || image.contains(',') || image.contains("://") {
            return None;
        }
        Some(Self::inline(DEFAULT_IMAGE_MIME, image))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::InlineData { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::InlineData { .. } => None,
        }
    }
}

/// An image followed by the caption that tells the model what it is.
///
/// Yields nothing when `image` cannot be parsed, so a broken reference
/// never fails the whole request.
pub fn reference_image(image: &str, caption: &str) -> Vec<ContentPart> {
    match ContentPart::from_image(image) {
        Some(part) => vec![part, ContentPart::text(caption)],
        None => {
            tracing::warn!(caption, "Skipping unparsable reference image");
            Vec::new()
        }
    }
}
