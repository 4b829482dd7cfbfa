//! Platform Collaborator Contracts
//!
//! The engine never talks to a chat platform directly. A host process
//! implements these traits over its client library (Discord, Matrix,
//! Telegram, ...) and hands them in; everything here is a point-in-time
//! snapshot or a fire-and-forget send.

use async_trait::async_trait;

/// Error types for outbound delivery
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient cannot be reached (DMs disabled, user left, ...).
    /// Expected and non-fatal for direct messages.
    #[error("recipient unreachable: {0}")]
    Unreachable(String),

    #[error("message rejected by platform: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Where a message can go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    /// Shared channel visible to multiple members
    Channel,
    /// One-to-one private conversation
    Direct,
}

/// A place the bot may send a message, as seen at snapshot time.
///
/// Supplied by the [`DestinationDirectory`] per tick; the engine never
/// holds one across ticks.
#[derive(Debug, Clone)]
pub struct Destination {
    /// Platform identifier
    pub id: u64,
    /// Channel or direct conversation
    pub kind: DestinationKind,
    /// Liveness proxy (member count or equivalent), higher = more active
    pub activity: u32,
    /// Whether the newest message in this destination is the bot's own
    pub last_author_was_self: bool,
}

impl Destination {
    /// Convenience constructor for a channel snapshot entry
    pub fn channel(id: u64, activity: u32) -> Self {
        Self {
            id,
            kind: DestinationKind::Channel,
            activity,
            last_author_was_self: false,
        }
    }

    pub fn with_own_last_message(mut self) -> Self {
        self.last_author_was_self = true;
        self
    }
}

/// A human member the bot may address
#[derive(Debug, Clone)]
pub struct Member {
    pub id: u64,
    pub name: String,
    /// Platform-specific mention markup (e.g. `<@1234>`)
    pub mention: String,
}

impl Member {
    pub fn new(id: u64, name: &str, mention: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            mention: mention.to_string(),
        }
    }
}

/// Handle to a message the platform accepted
#[derive(Debug, Clone, Copy)]
pub struct MessageHandle {
    pub message_id: u64,
    pub destination_id: u64,
}

/// Read-only, point-in-time view of the places and people the bot can
/// currently reach. Implementations must already have permission
/// filtering applied: everything returned is sendable.
#[async_trait]
pub trait DestinationDirectory: Send + Sync {
    /// Destinations the bot currently has permission to post in
    async fn sendable_destinations(&self) -> Vec<Destination>;

    /// Non-bot members currently visible to the bot
    async fn human_members(&self) -> Vec<Member>;
}

/// Outbound delivery. Best-effort: the engine treats a [`DeliveryError`]
/// as distinguishable from success, never as fatal.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Post text into a channel
    async fn send_channel(&self, channel_id: u64, text: &str) -> Result<MessageHandle, DeliveryError>;

    /// Deliver text to a member's private conversation
    async fn send_direct(&self, member_id: u64, text: &str) -> Result<MessageHandle, DeliveryError>;

    /// Post a PNG with a caption, optionally as a reply to another message
    async fn send_image(
        &self,
        channel_id: u64,
        caption: &str,
        png: &[u8],
        reply_to: Option<u64>,
    ) -> Result<MessageHandle, DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_constructor_defaults() {
        let dest = Destination::channel(42, 7);
        assert_eq!(dest.id, 42);
        assert_eq!(dest.kind, DestinationKind::Channel);
        assert_eq!(dest.activity, 7);
        assert!(!dest.last_author_was_self);
    }

    #[test]
    fn test_own_last_message_flag() {
        let dest = Destination::channel(1, 0).with_own_last_message();
        assert!(dest.last_author_was_self);
    }
}
