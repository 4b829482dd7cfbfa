//! Per-Channel Usage History
//!
//! Timestamps of autonomous sends per channel, pruned to a trailing window
//! (default 2 h) lazily on access. The selector reads these counts to halve
//! a channel's odds for every recent visit; the scheduler appends after
//! every successful channel send.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Recency-bounded log of autonomous sends keyed by channel id
pub struct UsageHistory {
    window: Duration,
    sends: Mutex<HashMap<u64, Vec<Instant>>>,
}

impl UsageHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sends: Mutex::new(HashMap::new()),
        }
    }

    /// Note one autonomous send to a channel
    pub fn record(&self, channel_id: u64) {
        self.record_at(channel_id, Instant::now());
    }

    pub fn record_at(&self, channel_id: u64, now: Instant) {
        self.sends.lock().entry(channel_id).or_default().push(now);
    }

    /// Sends to a channel within the trailing window
    pub fn recent_sends(&self, channel_id: u64) -> usize {
        self.recent_sends_at(channel_id, Instant::now())
    }

    pub fn recent_sends_at(&self, channel_id: u64, now: Instant) -> usize {
        let mut sends = self.sends.lock();
        let Some(entries) = sends.get_mut(&channel_id) else {
            return 0;
        };

        entries.retain(|&t| now.saturating_duration_since(t) <= self.window);
        let count = entries.len();
        if count == 0 {
            sends.remove(&channel_id);
        }
        count
    }

    /// Channels currently holding at least one in-window entry
    pub fn tracked_channels(&self) -> usize {
        self.sends.lock().len()
    }
}
