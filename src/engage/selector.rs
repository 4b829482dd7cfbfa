//! Activity-Weighted Channel Selection
//!
//! Every candidate starts at weight 1.0. Channels in the top third by
//! activity get a 2.3× boost (roughly a 70/30 split in favour of busy
//! places), then every autonomous send within the trailing usage window
//! halves the weight again, so the bot spreads itself around instead of
//! camping in one channel. Selection itself is a cumulative-weight walk
//! over the candidates in input order.
//!
//! Pure with respect to its inputs: no clocks, no I/O, no shared state
//! beyond the usage snapshot handed in. Feed it a seeded RNG and the
//! outcome is reproducible.

use rand::Rng;
use std::collections::HashSet;
use std::time::Instant;

use crate::engage::usage::UsageHistory;
use crate::platform::Destination;

/// Weight multiplier for channels in the top third by activity
pub const ACTIVE_BOOST: f64 = 2.3;

/// Per-recent-send weight multiplier (N sends → 0.5^N)
pub const REUSE_DECAY: f64 = 0.5;

/// Pick one channel from a non-empty candidate slice.
///
/// Panics when `candidates` is empty: callers filter before selecting, an
/// empty slice here is an upstream bug, not a runtime condition.
pub fn select_channel<'a, R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &'a [Destination],
    usage: &UsageHistory,
    now: Instant,
) -> &'a Destination {
    assert!(!candidates.is_empty(), "channel selection requires at least one candidate");

    if candidates.len() == 1 {
        return &candidates[0];
    }

    let weights = selection_weights(candidates, usage, now);
    let total: f64 = weights.iter().sum();
    let draw = rng.gen_range(0.0..total);

    let mut cumulative = 0.0;
    for (candidate, weight) in candidates.iter().zip(&weights) {
        cumulative += weight;
        if cumulative >= draw {
            return candidate;
        }
    }

    // floating-point rounding can leave the draw above the final cumulative
    &candidates[candidates.len() - 1]
}

/// Per-candidate weights, aligned with the input order
pub fn selection_weights(
    candidates: &[Destination],
    usage: &UsageHistory,
    now: Instant,
) -> Vec<f64> {
    let boosted = top_third_ids(candidates);

    candidates
        .iter()
        .map(|candidate| {
            let mut weight = 1.0;
            if boosted.contains(&candidate.id) {
                weight *= ACTIVE_BOOST;
            }
            let recent = usage.recent_sends_at(candidate.id, now);
            weight *= REUSE_DECAY.powi(recent as i32);
            weight
        })
        .collect()
}

/// Ids of the top third of candidates by activity. Ties keep input order
/// (stable sort); the cut never drops below one candidate.
fn top_third_ids(candidates: &[Destination]) -> HashSet<u64> {
    let take = (candidates.len() / 3).max(1);

    let mut by_activity: Vec<&Destination> = candidates.iter().collect();
    by_activity.sort_by(|a, b| b.activity.cmp(&a.activity));

    by_activity.into_iter().take(take).map(|d| d.id).collect()
}
