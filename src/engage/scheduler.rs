//! Autonomous Engagement Loop
//!
//! Drives the bot's unprompted side: on a periodic tick it rolls a chance
//! gate, snapshots the reachable channels, flips a coin between a channel
//! prompt and a direct message, and hands the chosen path to the content
//! generator. Outcomes land in the usage history (so channel selection
//! stays fair) and the pending-prompt tracker (so replies can be matched
//! later).
//!
//! Ticks never overlap: a busy guard skips a tick while the previous one
//! is still in flight, and any collaborator failure is absorbed at the
//! tick boundary so one bad tick cannot kill the loop.

use anyhow::Result;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::EngagementConfig;
use crate::engage::recent::RecentPrompts;
use crate::engage::selector;
use crate::engage::usage::UsageHistory;
use crate::generate::ContentGenerator;
use crate::platform::{Destination, DestinationDirectory, DestinationKind, MessageSender};
use crate::sessions::SessionCache;

/// Curated instructions for the question generator. Drawn uniformly per
/// engagement; repeats across ticks are fine.
pub const QUESTION_PROMPTS: [&str; 5] = [
    "Generate a random interesting question to ask someone",
    "Create a fun conversation starter question",
    "Make up a thought-provoking question",
    "Generate a random would-you-rather question",
    "Create an interesting hypothetical question",
];

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngageOutcome {
    /// Engagement switched off in configuration
    Disabled,
    /// Previous tick still running
    Busy,
    /// Chance gate not met
    GateSkipped,
    /// No sendable channels in the snapshot
    NoDestinations,
    /// Every channel had the bot as its last author
    NoCandidates,
    /// No human members to address
    NoMembers,
    /// Question posted into a channel
    ChannelPrompt { channel_id: u64, member_id: u64 },
    /// Question delivered as a direct message
    DirectPrompt { member_id: u64 },
    /// Direct message bounced (closed DMs etc.), swallowed
    DirectUndeliverable { member_id: u64 },
}

impl EngageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngageOutcome::Disabled => "disabled",
            EngageOutcome::Busy => "busy",
            EngageOutcome::GateSkipped => "gate_skipped",
            EngageOutcome::NoDestinations => "no_destinations",
            EngageOutcome::NoCandidates => "no_candidates",
            EngageOutcome::NoMembers => "no_members",
            EngageOutcome::ChannelPrompt { .. } => "channel_prompt",
            EngageOutcome::DirectPrompt { .. } => "direct_prompt",
            EngageOutcome::DirectUndeliverable { .. } => "direct_undeliverable",
        }
    }
}

/// Counters for the engagement loop
#[derive(Debug, Default)]
pub struct EngageStats {
    pub ticks: AtomicU64,
    pub channel_prompts: AtomicU64,
    pub direct_prompts: AtomicU64,
}

/// The periodic engagement scheduler.
///
/// All shared state (sessions, pending prompts, usage history) is injected
/// so several instances can coexist and tests can inspect the maps after a
/// tick. Randomness goes through one seedable source for the same reason.
pub struct EngagementLoop {
    config: EngagementConfig,
    directory: Arc<dyn DestinationDirectory>,
    sender: Arc<dyn MessageSender>,
    generator: Arc<dyn ContentGenerator>,
    sessions: Arc<SessionCache>,
    recent: Arc<RecentPrompts>,
    usage: Arc<UsageHistory>,
    rng: Mutex<StdRng>,
    busy: AtomicBool,
    stats: EngageStats,
}

impl EngagementLoop {
    pub fn new(
        config: EngagementConfig,
        directory: Arc<dyn DestinationDirectory>,
        sender: Arc<dyn MessageSender>,
        generator: Arc<dyn ContentGenerator>,
        sessions: Arc<SessionCache>,
        recent: Arc<RecentPrompts>,
        usage: Arc<UsageHistory>,
    ) -> Self {
        Self {
            config,
            directory,
            sender,
            generator,
            sessions,
            recent,
            usage,
            rng: Mutex::new(StdRng::from_entropy()),
            busy: AtomicBool::new(false),
            stats: EngageStats::default(),
        }
    }

    /// Replace the random source with a seeded one for reproducible draws
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &EngageStats {
        &self.stats
    }

    /// Run one engagement attempt.
    ///
    /// Skips immediately if a previous attempt is still in flight. Errors
    /// from collaborators bubble up to the caller; the run loop logs them
    /// and moves on to the next tick.
    pub async fn try_engage(&self) -> Result<EngageOutcome> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Tick skipped, previous engagement still running");
            return Ok(EngageOutcome::Busy);
        }

        let result = self.engage_once().await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn engage_once(&self) -> Result<EngageOutcome> {
        if !self.config.enabled {
            return Ok(EngageOutcome::Disabled);
        }

        let roll: u8 = self.rng.lock().gen_range(1..=100);
        if roll > self.config.chance_percent {
            return Ok(EngageOutcome::GateSkipped);
        }

        let channels: Vec<Destination> = self
            .directory
            .sendable_destinations()
            .await
            .into_iter()
            .filter(|d| d.kind == DestinationKind::Channel)
            .collect();
        if channels.is_empty() {
            return Ok(EngageOutcome::NoDestinations);
        }

        let dm_roll: u8 = self.rng.lock().gen_range(0..100);
        if dm_roll < self.config.dm_chance_percent {
            self.direct_prompt().await
        } else {
            self.channel_prompt(&channels).await
        }
    }

    async fn channel_prompt(&self, channels: &[Destination]) -> Result<EngageOutcome> {
        // never pile a new question onto a channel where the bot already
        // had the last word
        let candidates: Vec<Destination> = channels
            .iter()
            .filter(|c| !c.last_author_was_self)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Ok(EngageOutcome::NoCandidates);
        }

        let members = self.directory.human_members().await;
        if members.is_empty() {
            return Ok(EngageOutcome::NoMembers);
        }

        let (channel, member, template) = {
            let mut rng = self.rng.lock();
            let channel =
                selector::select_channel(&mut *rng, &candidates, &self.usage, Instant::now())
                    .clone();
            let member = members[rng.gen_range(0..members.len())].clone();
            let template = QUESTION_PROMPTS[rng.gen_range(0..QUESTION_PROMPTS.len())];
            (channel, member, template)
        };

        let mut session = self.sessions.get_or_create(channel.id).await;
        let question = self.generator.generate(&session, template).await?;
        session.push_user(template);
        session.push_assistant(&question);
        self.sessions.put(channel.id, session).await;

        let text = format!("{} {}", member.mention, question);
        self.sender.send_channel(channel.id, &text).await?;

        self.recent.record(channel.id, &question);
        self.usage.record(channel.id);
        self.stats.channel_prompts.fetch_add(1, Ordering::Relaxed);
        info!("Asked {} a question in channel {}", member.name, channel.id);

        Ok(EngageOutcome::ChannelPrompt {
            channel_id: channel.id,
            member_id: member.id,
        })
    }

    async fn direct_prompt(&self) -> Result<EngageOutcome> {
        let members = self.directory.human_members().await;
        if members.is_empty() {
            return Ok(EngageOutcome::NoMembers);
        }

        let (member, template) = {
            let mut rng = self.rng.lock();
            let member = members[rng.gen_range(0..members.len())].clone();
            let template = QUESTION_PROMPTS[rng.gen_range(0..QUESTION_PROMPTS.len())];
            (member, template)
        };

        // direct messages start from a clean framing, never a cached thread
        let session = self.sessions.fresh();
        let question = self.generator.generate(&session, template).await?;

        match self.sender.send_direct(member.id, &question).await {
            Ok(_) => {
                self.stats.direct_prompts.fetch_add(1, Ordering::Relaxed);
                info!("Sent {} a direct question", member.name);
                Ok(EngageOutcome::DirectPrompt {
                    member_id: member.id,
                })
            }
            Err(err) => {
                // closed DMs are a routine outcome, not an error
                debug!("Direct message to {} undeliverable: {}", member.name, err);
                Ok(EngageOutcome::DirectUndeliverable {
                    member_id: member.id,
                })
            }
        }
    }

    /// Run the periodic loop until shutdown is signalled.
    ///
    /// The first tick fires after the configured startup delay; missed
    /// ticks are skipped rather than queued.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Engagement loop disabled");
            return;
        }

        info!(
            "Starting engagement loop (first tick in {}s, every {}s after)",
            self.config.startup_delay.as_secs(),
            self.config.tick_interval.as_secs()
        );

        let start = tokio::time::Instant::now() + self.config.startup_delay;
        let mut ticker = tokio::time::interval_at(start, self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.try_engage().await {
                        Ok(outcome) => debug!("Engagement tick: {}", outcome.as_str()),
                        Err(e) => warn!("Engagement tick error: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Engagement loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}
