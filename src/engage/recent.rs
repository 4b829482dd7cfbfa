//! Pending Autonomous Questions
//!
//! After the bot asks an unprompted question in a channel, the question
//! waits here for a short window (default 10 min). An inbound human message
//! in that channel within the window is treated as a possible answer; the
//! entry is cleared once consumed so one question never triggers two
//! follow-ups, and expires lazily on read so stale chatter cannot match.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

struct Pending {
    asked_at: Instant,
    question: String,
}

/// One pending question per channel, freshness-bounded
pub struct RecentPrompts {
    window: Duration,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl RecentPrompts {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Store the question just asked, replacing any earlier one
    pub fn record(&self, channel_id: u64, question: &str) {
        self.record_at(channel_id, question, Instant::now());
    }

    pub fn record_at(&self, channel_id: u64, question: &str, now: Instant) {
        self.pending.lock().insert(
            channel_id,
            Pending {
                asked_at: now,
                question: question.to_string(),
            },
        );
    }

    /// The still-fresh question for a channel. A stale entry is removed and
    /// reported as absent.
    pub fn recent(&self, channel_id: u64) -> Option<String> {
        self.recent_at(channel_id, Instant::now())
    }

    pub fn recent_at(&self, channel_id: u64, now: Instant) -> Option<String> {
        let mut pending = self.pending.lock();
        let entry = pending.get(&channel_id)?;

        if now.saturating_duration_since(entry.asked_at) > self.window {
            debug!("Pending question in channel {} expired unanswered", channel_id);
            pending.remove(&channel_id);
            return None;
        }

        Some(entry.question.clone())
    }

    /// Drop a channel's pending question once its answer was handled
    pub fn clear(&self, channel_id: u64) {
        self.pending.lock().remove(&channel_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_MIN: Duration = Duration::from_secs(10 * 60);

    #[test]
    fn test_fresh_question_is_returned() {
        let recent = RecentPrompts::new(TEN_MIN);
        let base = Instant::now();

        recent.record_at(4, "what do you think of rain?", base);
        assert_eq!(
            recent.recent_at(4, base + Duration::from_secs(30)).as_deref(),
            Some("what do you think of rain?")
        );
    }

    #[test]
    fn test_expiry_around_the_window_edge() {
        let recent = RecentPrompts::new(TEN_MIN);
        let base = Instant::now();

        recent.record_at(4, "q", base);
        // just inside
        assert!(recent.recent_at(4, base + TEN_MIN - Duration::from_secs(1)).is_some());
        // just past: expired and removed
        assert!(recent.recent_at(4, base + TEN_MIN + Duration::from_secs(1)).is_none());
        // removal is permanent even for an earlier-now read
        assert!(recent.recent_at(4, base + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_clear_consumes_the_entry() {
        let recent = RecentPrompts::new(TEN_MIN);
        let base = Instant::now();

        recent.record_at(4, "q", base);
        recent.clear(4);
        assert!(recent.recent_at(4, base).is_none());
    }

    #[test]
    fn test_record_overwrites_prior_question() {
        let recent = RecentPrompts::new(TEN_MIN);
        let base = Instant::now();

        recent.record_at(4, "first", base);
        recent.record_at(4, "second", base + Duration::from_secs(5));
        assert_eq!(recent.recent_at(4, base + Duration::from_secs(6)).as_deref(), Some("second"));
        assert_eq!(recent.pending_count(), 1);
    }

    #[test]
    fn test_channels_do_not_cross() {
        let recent = RecentPrompts::new(TEN_MIN);
        let base = Instant::now();

        recent.record_at(1, "a", base);
        recent.record_at(2, "b", base);
        recent.clear(1);

        assert!(recent.recent_at(1, base).is_none());
        assert_eq!(recent.recent_at(2, base).as_deref(), Some("b"));
    }
}
