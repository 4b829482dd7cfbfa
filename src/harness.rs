//! In-Memory Collaborators
//!
//! Scripted stand-ins for the platform and the inference backend. Tests
//! drive the engine with these, and the binary wires them up so a tick can
//! run end to end without any live platform credentials.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::generate::{ContentGenerator, GenerateError, Session};
use crate::platform::{
    DeliveryError, Destination, DestinationDirectory, Member, MessageHandle, MessageSender,
};

/// Directory that returns a fixed snapshot on every call
pub struct ScriptedDirectory {
    destinations: Vec<Destination>,
    members: Vec<Member>,
}

impl ScriptedDirectory {
    pub fn new(destinations: Vec<Destination>, members: Vec<Member>) -> Self {
        Self {
            destinations,
            members,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait]
impl DestinationDirectory for ScriptedDirectory {
    async fn sendable_destinations(&self) -> Vec<Destination> {
        self.destinations.clone()
    }

    async fn human_members(&self) -> Vec<Member> {
        self.members.clone()
    }
}

/// One delivery captured by [`RecordingSender`]
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub destination_id: u64,
    pub direct: bool,
    pub text: String,
    pub png: Option<Vec<u8>>,
    pub reply_to: Option<u64>,
}

/// Sender that records every delivery instead of talking to a platform.
///
/// `fail_direct` / `fail_channel` turn the matching path into a
/// [`DeliveryError::Unreachable`] so tests can exercise failure handling.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    next_id: AtomicU64,
    fail_direct: bool,
    fail_channel: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_direct() -> Self {
        Self {
            fail_direct: true,
            ..Self::default()
        }
    }

    pub fn failing_channel() -> Self {
        Self {
            fail_channel: true,
            ..Self::default()
        }
    }

    /// Everything delivered so far, in order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn accept(&self, message: SentMessage) -> MessageHandle {
        let destination_id = message.destination_id;
        self.sent.lock().push(message);
        MessageHandle {
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            destination_id,
        }
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_channel(
        &self,
        channel_id: u64,
        text: &str,
    ) -> Result<MessageHandle, DeliveryError> {
        if self.fail_channel {
            return Err(DeliveryError::Transport("channel send disabled".into()));
        }
        Ok(self.accept(SentMessage {
            destination_id: channel_id,
            direct: false,
            text: text.to_string(),
            png: None,
            reply_to: None,
        }))
    }

    async fn send_direct(
        &self,
        member_id: u64,
        text: &str,
    ) -> Result<MessageHandle, DeliveryError> {
        if self.fail_direct {
            return Err(DeliveryError::Unreachable("DMs closed".into()));
        }
        Ok(self.accept(SentMessage {
            destination_id: member_id,
            direct: true,
            text: text.to_string(),
            png: None,
            reply_to: None,
        }))
    }

    async fn send_image(
        &self,
        channel_id: u64,
        caption: &str,
        png: &[u8],
        reply_to: Option<u64>,
    ) -> Result<MessageHandle, DeliveryError> {
        if self.fail_channel {
            return Err(DeliveryError::Transport("channel send disabled".into()));
        }
        Ok(self.accept(SentMessage {
            destination_id: channel_id,
            direct: false,
            text: caption.to_string(),
            png: Some(png.to_vec()),
            reply_to,
        }))
    }
}

/// Generator that answers every prompt with a fixed reply and logs what it
/// was asked, including how much session history came along.
pub struct CannedGenerator {
    reply: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
    session_lens: Mutex<Vec<usize>>,
}

impl CannedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
            session_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    /// Prompts received so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Turn count of the session accompanying each prompt
    pub fn session_lens(&self) -> Vec<usize> {
        self.session_lens.lock().clone()
    }
}

#[async_trait]
impl ContentGenerator for CannedGenerator {
    async fn generate(&self, session: &Session, prompt: &str) -> Result<String, GenerateError> {
        if self.fail {
            return Err(GenerateError::Unavailable("scripted failure".into()));
        }
        self.prompts.lock().push(prompt.to_string());
        self.session_lens.lock().push(session.len());
        Ok(self.reply.clone())
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerateError> {
        if self.fail {
            return Err(GenerateError::Unavailable("scripted failure".into()));
        }
        self.prompts.lock().push(prompt.to_string());
        // minimal PNG signature, enough for callers that only move bytes
        Ok(vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'])
    }
}
