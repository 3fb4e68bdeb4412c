//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use huginn::{HuginnError, InferenceProvider, ProviderCapabilities, ProviderPayload, Result};

/// What a scripted provider answers with.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Unavailable,
    Rejected(u16),
    /// Sleep this long, then answer with the inner reply.
    Slow(Duration, Box<Reply>),
}

/// In-process provider with a fixed reply that records every call.
pub struct ScriptedProvider {
    name: &'static str,
    caps: ProviderCapabilities,
    reply: Mutex<Reply>,
    calls: AtomicUsize,
    payloads: Mutex<Vec<ProviderPayload>>,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, caps: ProviderCapabilities, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name,
            caps,
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        })
    }

    /// A text-only provider named "fast".
    pub fn fast(reply: Reply) -> Arc<Self> {
        Self::new("fast", ProviderCapabilities::text_only(), reply)
    }

    /// A multimodal provider named "vision".
    pub fn vision(reply: Reply) -> Arc<Self> {
        Self::new("vision", ProviderCapabilities::multimodal(), reply)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<ProviderPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.caps
    }

    async fn generate(&self, payload: &ProviderPayload) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        let reply = self.reply.lock().unwrap().clone();
        answer(self.name, reply).await
    }
}

async fn answer(name: &str, reply: Reply) -> Result<String> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Text(text) => return Ok(text),
            Reply::Unavailable => {
                return Err(HuginnError::ProviderUnavailable(format!("{name} is down")));
            }
            Reply::Rejected(status) => {
                return Err(HuginnError::ProviderRejected {
                    provider: name.to_string(),
                    status,
                    message: "rejected by test".into(),
                });
            }
            Reply::Slow(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

/// A well-formed exam answer with `n` multiple choice questions.
pub fn exam_json(n: usize) -> String {
    let questions: Vec<_> = (0..n)
        .map(|i| {
            serde_json::json!({
                "question": format!("Question {}?", i + 1),
                "options": ["A", "B", "C", "D"],
                "correct_answer": "B",
                "explanation": "Because B.",
            })
        })
        .collect();
    serde_json::json!({ "questions": questions }).to_string()
}

/// A well-formed lesson answer.
pub fn lesson_json() -> String {
    serde_json::json!({
        "sections": [
            {"title": "Light reactions", "content": "Chlorophyll absorbs light.", "key_points": ["ATP"]},
            {"title": "Calvin cycle", "content": "CO2 is fixed into sugar."},
        ]
    })
    .to_string()
}

/// A well-formed protocol answer.
pub fn protocol_json() -> String {
    serde_json::json!({
        "title": "Recall plan",
        "steps": [
            {"title": "Read", "description": "Skim the chapter.", "duration_minutes": 10},
            {"title": "Recall", "description": "Write down what you remember."},
        ],
        "tips": ["Sleep well"],
    })
    .to_string()
}

/// Inline image marker around a tiny PNG header.
pub fn png_marker() -> String {
    huginn::ImagePart::new("image/png", vec![0x89, b'P', b'N', b'G']).to_marker()
}
