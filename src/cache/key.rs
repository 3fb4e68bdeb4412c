//! Cache key derivation.
//!
//! A [`CacheKey`] is a SHA-256 digest over the mode, the canonical JSON of
//! the generation config (and learner profile, when it influences output)
//! and a *content signature*. The digest must be stable across processes
//! because entries are persisted, which rules out `DefaultHasher`.
//!
//! # Content signature
//!
//! Uploaded documents may be megabytes long. With
//! [`SignatureMode::Sampled`] (the default) only a representative sample is
//! hashed: the first and last [`SAMPLE_CHARS`] characters plus the total
//! length. Identical content always yields identical keys. Two *different*
//! documents that share prefix, length and suffix will collide and reuse one
//! another's answer; this is an accepted trade-off. Use
//! [`SignatureMode::FullDigest`] to hash every byte instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::multimodal::ImagePart;
use crate::types::GenerationRequest;

/// Characters sampled from each end of the content.
pub const SAMPLE_CHARS: usize = 256;

/// Bytes sampled from each end of an inline image.
const IMAGE_SAMPLE_BYTES: usize = 64;

/// Namespace prefix of cache entries inside the key-value store.
pub const CACHE_PREFIX: &str = "huginn:cache:";

/// How much of the content feeds the cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    /// Prefix + length + suffix. Cheap, may collide on crafted inputs.
    #[default]
    Sampled,
    /// Hash the complete content.
    FullDigest,
}

/// Stable cache key for one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `request`, whose content has already been split
    /// into `text` and inline `images`.
    pub fn derive(
        request: &GenerationRequest,
        text: &str,
        images: &[ImagePart],
        mode: SignatureMode,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.mode().as_str().as_bytes());
        hasher.update([0u8]);
        // serde_json keeps struct field order, so this encoding is canonical
        hasher.update(serde_json::to_vec(request.config()).unwrap_or_default());
        hasher.update([0u8]);
        if let Some(profile) = request.effective_profile() {
            hasher.update(serde_json::to_vec(profile).unwrap_or_default());
        }
        hasher.update([0u8]);
        hasher.update(content_signature(text, mode));
        for image in images {
            hasher.update([0u8]);
            hasher.update(image.mime_type.as_bytes());
            hasher.update(image_signature(&image.data, mode));
        }
        Self(hex(&hasher.finalize()))
    }

    /// Wrap a raw digest string (e.g. a key read back from the store).
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Hex digest without namespace.
    pub fn digest(&self) -> &str {
        &self.0
    }

    /// Full key inside the key-value store.
    pub fn storage_key(&self) -> String {
        format!("{CACHE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derived representative of the text content.
pub fn content_signature(text: &str, mode: SignatureMode) -> Vec<u8> {
    match mode {
        SignatureMode::FullDigest => Sha256::digest(text.as_bytes()).to_vec(),
        SignatureMode::Sampled => {
            let length = text.chars().count();
            let prefix: String = text.chars().take(SAMPLE_CHARS).collect();
            let suffix: String = text
                .chars()
                .skip(length.saturating_sub(SAMPLE_CHARS))
                .collect();
            format!("{prefix}\u{0}{length}\u{0}{suffix}").into_bytes()
        }
    }
}

fn image_signature(data: &[u8], mode: SignatureMode) -> Vec<u8> {
    match mode {
        SignatureMode::FullDigest => Sha256::digest(data).to_vec(),
        SignatureMode::Sampled => {
            let head = &data[..data.len().min(IMAGE_SAMPLE_BYTES)];
            let tail = &data[data.len().saturating_sub(IMAGE_SAMPLE_BYTES)..];
            let mut sig = Vec::with_capacity(head.len() + tail.len() + 8);
            sig.extend_from_slice(head);
            sig.extend_from_slice(&(data.len() as u64).to_le_bytes());
            sig.extend_from_slice(tail);
            sig
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Difficulty, GenerationConfig, Mode};

    fn request(mode: Mode, content: &str, config: GenerationConfig) -> GenerationRequest {
        GenerationRequest::new(mode, content, config)
    }

    fn key(req: &GenerationRequest, mode: SignatureMode) -> CacheKey {
        CacheKey::derive(req, req.content(), &[], mode)
    }

    #[test]
    fn deterministic() {
        let req = request(Mode::Exam, "cells divide", GenerationConfig::new());
        assert_eq!(
            key(&req, SignatureMode::Sampled),
            key(&req, SignatureMode::Sampled)
        );
    }

    #[test]
    fn differs_on_mode() {
        let a = request(Mode::Exam, "cells divide", GenerationConfig::new());
        let b = request(Mode::Lesson, "cells divide", GenerationConfig::new());
        assert_ne!(
            key(&a, SignatureMode::Sampled),
            key(&b, SignatureMode::Sampled)
        );
    }

    #[test]
    fn differs_on_config() {
        let a = request(Mode::Exam, "cells divide", GenerationConfig::new());
        let b = request(
            Mode::Exam,
            "cells divide",
            GenerationConfig::new().difficulty(Difficulty::Hard),
        );
        assert_ne!(
            key(&a, SignatureMode::Sampled),
            key(&b, SignatureMode::Sampled)
        );
    }

    #[test]
    fn differs_on_short_content() {
        let a = request(Mode::Exam, "mitosis", GenerationConfig::new());
        let b = request(Mode::Exam, "meiosis", GenerationConfig::new());
        assert_ne!(
            key(&a, SignatureMode::Sampled),
            key(&b, SignatureMode::Sampled)
        );
    }

    #[test]
    fn sampled_signature_collides_on_shared_prefix_length_suffix() {
        let head = "a".repeat(SAMPLE_CHARS);
        let tail = "z".repeat(SAMPLE_CHARS);
        let one = format!("{head}{}{tail}", "x".repeat(1_000));
        let two = format!("{head}{}{tail}", "y".repeat(1_000));
        let a = request(Mode::Summary, &one, GenerationConfig::new());
        let b = request(Mode::Summary, &two, GenerationConfig::new());

        assert_eq!(
            key(&a, SignatureMode::Sampled),
            key(&b, SignatureMode::Sampled)
        );
        assert_ne!(
            key(&a, SignatureMode::FullDigest),
            key(&b, SignatureMode::FullDigest)
        );
    }

    #[test]
    fn sampled_signature_sees_length_changes() {
        let head = "a".repeat(SAMPLE_CHARS);
        let tail = "z".repeat(SAMPLE_CHARS);
        let one = format!("{head}{}{tail}", "x".repeat(1_000));
        let two = format!("{head}{}{tail}", "x".repeat(1_001));
        let a = request(Mode::Summary, &one, GenerationConfig::new());
        let b = request(Mode::Summary, &two, GenerationConfig::new());
        assert_ne!(
            key(&a, SignatureMode::Sampled),
            key(&b, SignatureMode::Sampled)
        );
    }

    #[test]
    fn images_participate() {
        let req = request(Mode::Exam, "label the diagram", GenerationConfig::new());
        let png = ImagePart {
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        };
        let other = ImagePart {
            mime_type: "image/png".into(),
            data: vec![4, 5, 6],
        };
        let with_png = CacheKey::derive(&req, "label the diagram", &[png], SignatureMode::Sampled);
        let with_other =
            CacheKey::derive(&req, "label the diagram", &[other], SignatureMode::Sampled);
        assert_ne!(with_png, with_other);
        assert_ne!(with_png, key(&req, SignatureMode::Sampled));
    }

    #[test]
    fn storage_key_is_namespaced() {
        let req = request(Mode::Chat, "hi", GenerationConfig::new());
        let key = key(&req, SignatureMode::Sampled);
        assert!(key.storage_key().starts_with(CACHE_PREFIX));
        assert_eq!(key.digest().len(), 64);
    }
}
