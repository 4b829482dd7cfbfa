//! Content Generation Contract
//!
//! The inference backend is an opaque collaborator. The engine hands it a
//! [`Session`] (system prompt + prior turns) and a new prompt; it hands
//! back text. Image generation is a separate single-shot operation guarded
//! by the image throttle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error types for the generation backend
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Backend not reachable or not configured. Transient from the
    /// engine's point of view: log and skip, never retry within a tick.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("generation failed: {0}")]
    Failed(String),
}

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One exchange step inside a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// An accumulating dialogue context bound to one destination.
///
/// Turns are append-only; the session is cloned out of the cache, extended,
/// and written back wholesale after each completed exchange.
#[derive(Debug, Clone)]
pub struct Session {
    system_prompt: String,
    turns: Vec<Turn>,
}

impl Session {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            turns: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, text: &str) {
        self.turns.push(Turn {
            role: Role::User,
            text: text.to_string(),
        });
    }

    pub fn push_assistant(&mut self, text: &str) {
        self.turns.push(Turn {
            role: Role::Assistant,
            text: text.to_string(),
        });
    }
}

/// Inference collaborator. `generate` must treat `session` as read-only;
/// recording the exchange back into the cache is the caller's job.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce a reply to `prompt` given the session so far
    async fn generate(&self, session: &Session, prompt: &str) -> Result<String, GenerateError>;

    /// Produce PNG bytes for an image prompt
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerateError>;
}
