//! Minglebot Engagement Engine
//!
//! The autonomous side of a chat bot: decides whether, where and to whom
//! the bot speaks without being asked, and reacts to the traffic that
//! comes back. Platform transport and inference are opaque collaborators
//! behind traits; the engine owns the scheduling, fairness and throttling
//! logic between them.
//!
//! # Features
//!
//! - **Engagement loop**: periodic chance-gated ticks choosing between a
//!   channel question and a direct message
//! - **Fair channel selection**: activity-weighted random draws with
//!   exponential decay for recently used channels
//! - **Follow-up matching**: questions pend per channel for 10 minutes so
//!   replies land in the same conversation thread
//! - **Image quota**: sliding-window rate limit (20/hour) with a prompt
//!   memo for cumulative "refine this image" chains
//! - **Session affinity**: LRU-bounded conversation cache per destination
//!
//! # Architecture
//!
//! ```text
//! timer ──► EngagementLoop ──► select_channel ──► ContentGenerator
//!              │                      │             (OpenAI-compatible)
//!              │                      └── UsageHistory
//!              ├── RecentPrompts ◄────────────┐
//!              ▼                              │
//!        MessageSender ◄── InboundHandler ◄── platform events
//!                               │
//!                               ├── SessionCache (moka LRU)
//!                               └── ImageThrottle (quota + memo)
//! ```

pub mod config;
pub mod engage;
pub mod generate;
pub mod harness;
pub mod inbound;
pub mod llm;
pub mod platform;
pub mod sessions;

pub use config::{Config, EngagementConfig, LlmConfig};
pub use engage::{
    EngageOutcome, EngageStats, EngagementLoop, ImageThrottle, RecentPrompts, UsageHistory,
    QUESTION_PROMPTS,
};
pub use generate::{ContentGenerator, GenerateError, Role, Session, Turn};
pub use inbound::{ContextLine, InboundHandler, InboundOutcome, IncomingMessage, RepliedMessage};
pub use llm::LlmClient;
pub use platform::{
    DeliveryError, Destination, DestinationDirectory, DestinationKind, Member, MessageHandle,
    MessageSender,
};
pub use sessions::SessionCache;
