//! Multimodal content assembly.
//!
//! Study material arrives as one text blob that may carry inline images as
//! markers of the form
//!
//! ```text
//! [IMAGE_DATA:data:image/png;base64,iVBORw0KGgo...]
//! ```
//!
//! [`split`] separates the markers from the text and validates their
//! payloads. [`build_payload`] then shapes text and images into the
//! multi-part request a given provider accepts. Text-only providers never
//! receive image parts.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde_json::Value;

use crate::types::ProviderCapabilities;
use crate::{HuginnError, Result};

/// Literal opening of an inline image marker.
pub const IMAGE_MARKER_PREFIX: &str = "[IMAGE_DATA:";

static IMAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[IMAGE_DATA:data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\s]*)\]")
        .expect("static pattern")
});

/// A decoded inline image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePart {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Standard base64 encoding of the image bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Render back into the inline marker grammar.
    pub fn to_marker(&self) -> String {
        format!(
            "{IMAGE_MARKER_PREFIX}data:{};base64,{}]",
            self.mime_type,
            self.to_base64()
        )
    }
}

/// Content split into plain text and inline images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub text: String,
    pub images: Vec<ImagePart>,
}

impl Split {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Separate inline image markers from `content`.
///
/// Markers may appear anywhere and in any number. A marker whose payload is
/// not valid standard base64, whose MIME type is not `image/*`, or which is
/// not closed is rejected with `InvalidInput`.
pub fn split(content: &str) -> Result<Split> {
    let mut images = Vec::new();
    let mut text = String::with_capacity(content.len());
    let mut last = 0;

    for caps in IMAGE_MARKER.captures_iter(content) {
        let (Some(whole), Some(mime), Some(payload)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let mime = mime.as_str().to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(HuginnError::InvalidInput(format!(
                "inline data has non-image MIME type {mime}"
            )));
        }
        let payload: String = payload
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if payload.is_empty() {
            return Err(HuginnError::InvalidInput(
                "inline image has an empty payload".into(),
            ));
        }
        let data = STANDARD.decode(payload.as_bytes()).map_err(|e| {
            HuginnError::InvalidInput(format!("inline image payload is not base64: {e}"))
        })?;

        text.push_str(&content[last..whole.start()]);
        images.push(ImagePart {
            mime_type: mime,
            data,
        });
        last = whole.end();
    }
    text.push_str(&content[last..]);

    if text.contains(IMAGE_MARKER_PREFIX) {
        return Err(HuginnError::InvalidInput(
            "malformed inline image marker".into(),
        ));
    }

    Ok(Split {
        text: text.trim().to_string(),
        images,
    })
}

/// One part of a provider request body.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image(ImagePart),
}

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadOptions {
    /// Ask for JSON output.
    pub json_mode: bool,
    /// Structured-output schema, for providers that accept one.
    pub response_schema: Option<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for PayloadOptions {
    fn default() -> Self {
        Self {
            json_mode: false,
            response_schema: None,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Provider-agnostic request, ready for a concrete client to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPayload {
    /// Trusted instructions. Never contains user text.
    pub system_prompt: String,
    pub parts: Vec<ContentPart>,
    pub options: PayloadOptions,
}

impl ProviderPayload {
    /// All text parts joined by blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &ImagePart> {
        self.parts.iter().filter_map(|p| match p {
            ContentPart::Image(img) => Some(img),
            ContentPart::Text(_) => None,
        })
    }

    pub fn has_images(&self) -> bool {
        self.images().next().is_some()
    }
}

/// Shape `text` and `images` into a request for a provider with `caps`.
///
/// Multimodal providers receive every image part first, then the text.
/// Handing images to a text-only provider is a routing bug and fails with
/// `InvalidInput`. JSON mode is dropped for providers without it.
pub fn build_payload(
    caps: &ProviderCapabilities,
    text: &str,
    images: &[ImagePart],
    preamble: &str,
    mut options: PayloadOptions,
) -> Result<ProviderPayload> {
    if !caps.accepts(!images.is_empty()) {
        return Err(HuginnError::InvalidInput(
            "image content cannot be sent to a text-only provider".into(),
        ));
    }
    if !caps.supports_json_mode {
        options.json_mode = false;
        options.response_schema = None;
    }

    let mut parts: Vec<ContentPart> = images.iter().cloned().map(ContentPart::Image).collect();
    parts.push(ContentPart::Text(text.to_string()));

    Ok(ProviderPayload {
        system_prompt: preamble.to_string(),
        parts,
        options,
    })
}
