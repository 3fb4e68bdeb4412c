//! Provider and gateway capability reporting

use serde::{Deserialize, Serialize};

/// Input modality a provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    TextOnly,
    Multimodal,
}

/// What an inference provider can do.
///
/// The router only ever looks at this struct, never at the concrete client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub modality: Modality,
    /// Native JSON output mode.
    pub supports_json_mode: bool,
    /// Handles very long documents and lesson-scale reasoning.
    pub supports_large_context: bool,
}

impl ProviderCapabilities {
    /// Fast, cheap, text-only provider (e.g. Groq).
    pub fn text_only() -> Self {
        Self {
            modality: Modality::TextOnly,
            supports_json_mode: true,
            supports_large_context: false,
        }
    }

    /// Heavier multimodal, large-context provider (e.g. Gemini).
    pub fn multimodal() -> Self {
        Self {
            modality: Modality::Multimodal,
            supports_json_mode: true,
            supports_large_context: true,
        }
    }

    pub fn is_multimodal(&self) -> bool {
        self.modality == Modality::Multimodal
    }

    /// Whether a request with or without images may be sent here.
    pub fn accepts(&self, has_images: bool) -> bool {
        !has_images || self.is_multimodal()
    }
}

/// What the assembled gateway can do, given its configured providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// A fast text provider is configured.
    pub fast_text: bool,
    /// Image-bearing content can be processed.
    pub multimodal: bool,
    /// A large-context provider is configured.
    pub large_context: bool,
    /// A cross-provider fallback exists for text-only requests.
    pub fallback: bool,
}
