//! Image Generation Throttle
//!
//! Sliding-window quota for the shared image backend: at most N generations
//! per rolling hour, process-wide. Check and record happen under one lock
//! acquisition (`try_consume`), so concurrent callers cannot overshoot the
//! quota between a check and a record.
//!
//! Also keeps the prompt memo that powers "refine this image" replies: the
//! id of each posted image maps back to the prompt that produced it.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60 * 60);

/// Most recent prompt memos kept; older ones are displaced in insertion
/// order.
const MEMO_CAP: usize = 512;

#[derive(Default)]
struct PromptMemo {
    prompts: HashMap<u64, String>,
    order: VecDeque<u64>,
}

/// Hourly quota plus prompt memo for image generation
pub struct ImageThrottle {
    max_per_hour: usize,
    window: Mutex<Vec<Instant>>,
    memo: Mutex<PromptMemo>,
}

impl ImageThrottle {
    pub fn new(max_per_hour: usize) -> Self {
        Self {
            max_per_hour,
            window: Mutex::new(Vec::new()),
            memo: Mutex::new(PromptMemo::default()),
        }
    }

    /// Claim one generation slot. Returns false without recording when the
    /// rolling window is full.
    pub fn try_consume(&self) -> bool {
        self.try_consume_at(Instant::now())
    }

    pub fn try_consume_at(&self, now: Instant) -> bool {
        let mut window = self.window.lock();
        Self::prune(&mut window, now);

        if window.len() >= self.max_per_hour {
            debug!("Image quota exhausted ({} in window)", window.len());
            return false;
        }

        window.push(now);
        true
    }

    /// Slots left in the rolling window. Read-only: repeated calls without
    /// an intervening consume return the same value.
    pub fn remaining(&self) -> usize {
        self.remaining_at(Instant::now())
    }

    pub fn remaining_at(&self, now: Instant) -> usize {
        let mut window = self.window.lock();
        Self::prune(&mut window, now);
        self.max_per_hour.saturating_sub(window.len())
    }

    fn prune(window: &mut Vec<Instant>, now: Instant) {
        window.retain(|&t| now.saturating_duration_since(t) <= WINDOW);
    }

    /// Remember which prompt produced a posted image. Last write wins when
    /// the same output id is stored twice.
    pub fn store_prompt(&self, output_id: u64, prompt: &str) {
        let mut memo = self.memo.lock();

        if memo.prompts.insert(output_id, prompt.to_string()).is_none() {
            memo.order.push_back(output_id);
            if memo.order.len() > MEMO_CAP {
                if let Some(evicted) = memo.order.pop_front() {
                    memo.prompts.remove(&evicted);
                }
            }
        }
    }

    /// The prompt behind an output id, or empty when unknown
    pub fn prompt_for(&self, output_id: u64) -> String {
        self.memo
            .lock()
            .prompts
            .get(&output_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_allows_up_to_max() {
        let throttle = ImageThrottle::new(3);
        let base = Instant::now();

        for i in 0..3 {
            assert!(throttle.try_consume_at(base), "consume {} should succeed", i);
        }
        assert!(!throttle.try_consume_at(base));
    }

    #[test]
    fn test_window_expiry_at_hour_boundary() {
        let throttle = ImageThrottle::new(20);
        let base = Instant::now();

        for _ in 0..20 {
            assert!(throttle.try_consume_at(base));
        }

        // 21st attempt inside the hour is rejected, after it succeeds
        assert!(!throttle.try_consume_at(base + 59 * MINUTE));
        assert!(throttle.try_consume_at(base + 61 * MINUTE));
    }

    #[test]
    fn test_remaining_counts_down() {
        let throttle = ImageThrottle::new(5);
        let base = Instant::now();

        assert_eq!(throttle.remaining_at(base), 5);
        throttle.try_consume_at(base);
        throttle.try_consume_at(base);
        assert_eq!(throttle.remaining_at(base), 3);
    }

    #[test]
    fn test_remaining_is_idempotent() {
        let throttle = ImageThrottle::new(5);
        let base = Instant::now();
        throttle.try_consume_at(base);

        let first = throttle.remaining_at(base);
        let second = throttle.remaining_at(base);
        let third = throttle.remaining_at(base);
        assert_eq!(first, 4);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[test]
    fn test_remaining_recovers_after_window() {
        let throttle = ImageThrottle::new(2);
        let base = Instant::now();
        throttle.try_consume_at(base);
        throttle.try_consume_at(base);

        assert_eq!(throttle.remaining_at(base), 0);
        assert_eq!(throttle.remaining_at(base + 61 * MINUTE), 2);
    }

    #[test]
    fn test_rejected_attempt_records_nothing() {
        let throttle = ImageThrottle::new(1);
        let base = Instant::now();

        assert!(throttle.try_consume_at(base));
        assert!(!throttle.try_consume_at(base));
        assert!(!throttle.try_consume_at(base));

        // only the single accepted consume occupies the window
        assert!(throttle.try_consume_at(base + 61 * MINUTE));
    }

    #[test]
    fn test_prompt_memo_roundtrip() {
        let throttle = ImageThrottle::new(1);

        throttle.store_prompt(100, "a red fox");
        assert_eq!(throttle.prompt_for(100), "a red fox");
        assert_eq!(throttle.prompt_for(999), "");
    }

    #[test]
    fn test_prompt_memo_last_write_wins() {
        let throttle = ImageThrottle::new(1);

        throttle.store_prompt(100, "first");
        throttle.store_prompt(100, "second");
        assert_eq!(throttle.prompt_for(100), "second");
    }

    #[test]
    fn test_prompt_memo_bounded() {
        let throttle = ImageThrottle::new(1);

        for id in 0..(MEMO_CAP as u64 + 10) {
            throttle.store_prompt(id, "p");
        }

        // the oldest entries were displaced, the newest survive
        assert_eq!(throttle.prompt_for(0), "");
        assert_eq!(throttle.prompt_for(MEMO_CAP as u64 + 9), "p");
    }
}
