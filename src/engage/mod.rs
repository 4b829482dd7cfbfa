//! Autonomous Engagement
//!
//! Everything behind the bot's unprompted behaviour:
//! - `scheduler`: the periodic tick loop deciding whether, where and to
//!   whom the bot speaks
//! - `selector`: activity-weighted, penalty-decayed channel selection
//! - `usage`: sliding-window history of autonomous sends per channel
//! - `recent`: pending questions awaiting a reply
//! - `throttle`: sliding-window image-generation quota with a prompt memo
//!
//! The scheduler owns the flow; the other modules are injectable state
//! shared with the inbound message handler.

pub mod recent;
pub mod scheduler;
pub mod selector;
pub mod throttle;
pub mod usage;

pub use recent::RecentPrompts;
pub use scheduler::{EngageOutcome, EngageStats, EngagementLoop, QUESTION_PROMPTS};
pub use selector::{select_channel, selection_weights};
pub use throttle::ImageThrottle;
pub use usage::UsageHistory;
