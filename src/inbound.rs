//! Inbound Message Handling
//!
//! Reacts to platform traffic the host forwards in. Four reactions, tried
//! in order, first match wins:
//! 1. Follow-up: the channel has a pending autonomous question and someone
//!    (not a bot) just spoke, so with a configured chance the bot responds
//!    and consumes the pending question.
//! 2. Direct chat: private messages get a threaded conversation.
//! 3. Image refinement: a reply to one of the bot's PNG posts spends quota
//!    and regenerates with the old and new prompt combined.
//! 4. Mention chat: an @-mention gets a context-aware channel reply.
//!
//! Bot-authored messages are ignored outright.

use anyhow::Result;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EngagementConfig;
use crate::engage::recent::RecentPrompts;
use crate::engage::throttle::ImageThrottle;
use crate::generate::{ContentGenerator, GenerateError};
use crate::platform::{DestinationKind, MessageSender};
use crate::sessions::SessionCache;

/// The message the bot is replying to, when the incoming message is a reply
#[derive(Debug, Clone, Copy)]
pub struct RepliedMessage {
    pub message_id: u64,
    pub author_was_self: bool,
    pub has_png: bool,
}

/// One line of surrounding conversation supplied by the host
#[derive(Debug, Clone)]
pub struct ContextLine {
    pub author: String,
    pub text: String,
}

/// Snapshot of one platform message, already stripped of platform markup
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub channel_id: u64,
    pub kind: DestinationKind,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub text: String,
    pub mentions_bot: bool,
    pub replied_to: Option<RepliedMessage>,
    /// Up to a few preceding messages, oldest first, for mention replies
    pub context: Vec<ContextLine>,
}

impl IncomingMessage {
    /// Plain channel message with no reply, mention or context attached
    pub fn channel_text(channel_id: u64, author_id: u64, author_name: &str, text: &str) -> Self {
        Self {
            message_id: 0,
            channel_id,
            kind: DestinationKind::Channel,
            author_id,
            author_name: author_name.to_string(),
            author_is_bot: false,
            text: text.to_string(),
            mentions_bot: false,
            replied_to: None,
            context: Vec::new(),
        }
    }

    /// Private message variant
    pub fn direct_text(channel_id: u64, author_id: u64, author_name: &str, text: &str) -> Self {
        Self {
            kind: DestinationKind::Direct,
            ..Self::channel_text(channel_id, author_id, author_name, text)
        }
    }

    pub fn with_message_id(mut self, message_id: u64) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn from_bot(mut self) -> Self {
        self.author_is_bot = true;
        self
    }

    pub fn with_mention(mut self) -> Self {
        self.mentions_bot = true;
        self
    }

    pub fn replying_to(mut self, replied: RepliedMessage) -> Self {
        self.replied_to = Some(replied);
        self
    }
}

/// What the handler did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Author was a bot
    IgnoredBot,
    /// Nothing matched
    Ignored,
    /// Follow-up posted, pending question consumed
    FollowUp { channel_id: u64 },
    /// Pending question present but the reply gate skipped it
    FollowUpSkipped,
    /// Threaded private reply sent
    DirectChat { member_id: u64 },
    /// Image quota exhausted, refusal sent instead
    RateLimited,
    /// Refined image posted
    ImageRefined { channel_id: u64 },
    /// Image backend failed, apology sent
    ImageFailed,
    /// Mention answered in the channel
    MentionReply { channel_id: u64 },
}

impl InboundOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundOutcome::IgnoredBot => "ignored_bot",
            InboundOutcome::Ignored => "ignored",
            InboundOutcome::FollowUp { .. } => "follow_up",
            InboundOutcome::FollowUpSkipped => "follow_up_skipped",
            InboundOutcome::DirectChat { .. } => "direct_chat",
            InboundOutcome::RateLimited => "rate_limited",
            InboundOutcome::ImageRefined { .. } => "image_refined",
            InboundOutcome::ImageFailed => "image_failed",
            InboundOutcome::MentionReply { .. } => "mention_reply",
        }
    }
}

/// Handler for platform messages, sharing state with the engagement loop.
///
/// `sessions` and `recent` are the same instances the scheduler writes to;
/// that is what makes a reply to an autonomous question land in the same
/// conversation thread.
pub struct InboundHandler {
    config: EngagementConfig,
    sender: Arc<dyn MessageSender>,
    generator: Arc<dyn ContentGenerator>,
    sessions: Arc<SessionCache>,
    recent: Arc<RecentPrompts>,
    throttle: Arc<ImageThrottle>,
    rng: Mutex<StdRng>,
}

impl InboundHandler {
    pub fn new(
        config: EngagementConfig,
        sender: Arc<dyn MessageSender>,
        generator: Arc<dyn ContentGenerator>,
        sessions: Arc<SessionCache>,
        recent: Arc<RecentPrompts>,
        throttle: Arc<ImageThrottle>,
    ) -> Self {
        Self {
            config,
            sender,
            generator,
            sessions,
            recent,
            throttle,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source with a seeded one for reproducible draws
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Classify and react to one message. Collaborator errors bubble up;
    /// the host logs them and keeps dispatching.
    pub async fn handle(&self, message: &IncomingMessage) -> Result<InboundOutcome> {
        if message.author_is_bot {
            return Ok(InboundOutcome::IgnoredBot);
        }

        // order matters: a pending question claims the message before the
        // other branches get a look
        if let Some(question) = self.recent.recent(message.channel_id) {
            return self.follow_up(message, &question).await;
        }

        if message.kind == DestinationKind::Direct {
            return self.direct_chat(message).await;
        }

        if let Some(replied) = &message.replied_to {
            if replied.author_was_self && replied.has_png {
                return self.refine_image(message, replied.message_id).await;
            }
        }

        if message.mentions_bot {
            return self.mention_chat(message).await;
        }

        Ok(InboundOutcome::Ignored)
    }

    async fn follow_up(&self, message: &IncomingMessage, question: &str) -> Result<InboundOutcome> {
        let roll: u8 = self.rng.lock().gen_range(0..100);
        if roll >= self.config.reply_chance_percent {
            debug!("Follow-up gate skipped reply in channel {}", message.channel_id);
            return Ok(InboundOutcome::FollowUpSkipped);
        }

        let prompt = format!(
            "You recently asked: '{}' and user ({}) in the chat said: '{}'. If this seems \
             like a response to your question, provide a thoughtful follow-up. If it doesn't \
             seem related, just acknowledge it briefly. Don't ask additional questions in \
             response",
            question, message.author_name, message.text
        );

        let reply = self.converse(message.channel_id, &prompt).await?;
        self.sender.send_channel(message.channel_id, &reply).await?;

        // consumed: the same question must never trigger twice
        self.recent.clear(message.channel_id);

        Ok(InboundOutcome::FollowUp {
            channel_id: message.channel_id,
        })
    }

    async fn direct_chat(&self, message: &IncomingMessage) -> Result<InboundOutcome> {
        let prompt = format!("{}: {}", message.author_name, message.text);
        let reply = self.converse(message.channel_id, &prompt).await?;
        self.sender.send_direct(message.author_id, &reply).await?;

        Ok(InboundOutcome::DirectChat {
            member_id: message.author_id,
        })
    }

    async fn refine_image(
        &self,
        message: &IncomingMessage,
        source_message_id: u64,
    ) -> Result<InboundOutcome> {
        if !self.throttle.try_consume() {
            let text = format!(
                "❌ Rate limit exceeded. {} remaining.",
                self.throttle.remaining()
            );
            self.sender.send_channel(message.channel_id, &text).await?;
            return Ok(InboundOutcome::RateLimited);
        }

        // chain the stored prompt so refinements stay cumulative
        let old_prompt = self.throttle.prompt_for(source_message_id);
        let prompt = if old_prompt.is_empty() {
            message.text.clone()
        } else {
            format!("{} + {}", old_prompt, message.text)
        };

        let png = match self.generator.generate_image(&prompt).await {
            Ok(png) => png,
            Err(err) => {
                warn!("Image generation failed: {}", err);
                self.sender
                    .send_channel(message.channel_id, "❌ Image generation failed.")
                    .await?;
                return Ok(InboundOutcome::ImageFailed);
            }
        };

        let handle = self
            .sender
            .send_image(message.channel_id, "✅ Done", &png, Some(message.message_id))
            .await?;
        self.throttle.store_prompt(handle.message_id, &prompt);

        Ok(InboundOutcome::ImageRefined {
            channel_id: message.channel_id,
        })
    }

    async fn mention_chat(&self, message: &IncomingMessage) -> Result<InboundOutcome> {
        let mut prompt = String::from("Recent conversation context:\n");
        for line in &message.context {
            prompt.push_str(&format!("{}: {}\n", line.author, line.text));
        }
        prompt.push_str(&format!("{}: {}", message.author_name, message.text));

        let reply = self.converse(message.channel_id, &prompt).await?;
        self.sender.send_channel(message.channel_id, &reply).await?;

        Ok(InboundOutcome::MentionReply {
            channel_id: message.channel_id,
        })
    }

    /// One threaded exchange: clone the session out, generate, append both
    /// turns, write the session back wholesale.
    async fn converse(&self, key: u64, prompt: &str) -> Result<String, GenerateError> {
        let mut session = self.sessions.get_or_create(key).await;
        let reply = self.generator.generate(&session, prompt).await?;
        session.push_user(prompt);
        session.push_assistant(&reply);
        self.sessions.put(key, session).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{CannedGenerator, RecordingSender};

    struct Fixture {
        handler: InboundHandler,
        sender: Arc<RecordingSender>,
        generator: Arc<CannedGenerator>,
        recent: Arc<RecentPrompts>,
        throttle: Arc<ImageThrottle>,
    }

    fn fixture_full(config: EngagementConfig, generator: CannedGenerator) -> Fixture {
        let sender = Arc::new(RecordingSender::new());
        let generator = Arc::new(generator);
        let sessions = Arc::new(SessionCache::new(config.max_sessions, "test persona"));
        let recent = Arc::new(RecentPrompts::new(config.reply_window));
        let throttle = Arc::new(ImageThrottle::new(config.image_max_per_hour));
        let handler = InboundHandler::new(
            config,
            sender.clone(),
            generator.clone(),
            sessions,
            recent.clone(),
            throttle.clone(),
        )
        .with_rng_seed(3);
        Fixture {
            handler,
            sender,
            generator,
            recent,
            throttle,
        }
    }

    fn fixture(config: EngagementConfig) -> Fixture {
        fixture_full(config, CannedGenerator::new("canned reply"))
    }

    #[tokio::test]
    async fn test_bot_messages_are_ignored() {
        let f = fixture(EngagementConfig::default());
        let msg = IncomingMessage::channel_text(1, 2, "botling", "beep").from_bot();

        assert_eq!(f.handler.handle(&msg).await.unwrap(), InboundOutcome::IgnoredBot);
        assert_eq!(f.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_channel_chatter_is_ignored() {
        let f = fixture(EngagementConfig::default());
        let msg = IncomingMessage::channel_text(1, 2, "ada", "nice weather");

        assert_eq!(f.handler.handle(&msg).await.unwrap(), InboundOutcome::Ignored);
        assert_eq!(f.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_consumes_pending_question() {
        let f = fixture(EngagementConfig {
            reply_chance_percent: 100,
            ..EngagementConfig::default()
        });
        f.recent.record(5, "what's your favourite planet?");

        let msg = IncomingMessage::channel_text(5, 2, "ada", "mars, obviously");
        let outcome = f.handler.handle(&msg).await.unwrap();

        assert_eq!(outcome, InboundOutcome::FollowUp { channel_id: 5 });
        assert_eq!(f.sender.sent_count(), 1);
        assert!(f.recent.recent(5).is_none(), "question must be consumed");

        let prompt = &f.generator.prompts()[0];
        assert!(prompt.contains("You recently asked: 'what's your favourite planet?'"));
        assert!(prompt.contains("user (ada) in the chat said: 'mars, obviously'"));
    }

    #[tokio::test]
    async fn test_skipped_follow_up_keeps_the_question_pending() {
        let f = fixture(EngagementConfig {
            reply_chance_percent: 0,
            ..EngagementConfig::default()
        });
        f.recent.record(5, "pending?");

        let msg = IncomingMessage::channel_text(5, 2, "ada", "hello");
        let outcome = f.handler.handle(&msg).await.unwrap();

        assert_eq!(outcome, InboundOutcome::FollowUpSkipped);
        assert_eq!(f.sender.sent_count(), 0);
        assert_eq!(f.recent.recent(5).as_deref(), Some("pending?"));
    }

    #[tokio::test]
    async fn test_direct_chat_threads_through_one_session() {
        let f = fixture(EngagementConfig::default());

        let first = IncomingMessage::direct_text(900, 42, "ada", "hi there");
        let second = IncomingMessage::direct_text(900, 42, "ada", "still me");

        assert_eq!(
            f.handler.handle(&first).await.unwrap(),
            InboundOutcome::DirectChat { member_id: 42 }
        );
        assert_eq!(
            f.handler.handle(&second).await.unwrap(),
            InboundOutcome::DirectChat { member_id: 42 }
        );

        // second exchange sees the two turns recorded by the first
        assert_eq!(f.generator.session_lens(), vec![0, 2]);

        let sent = f.sender.sent();
        assert!(sent.iter().all(|m| m.direct && m.destination_id == 42));
    }

    #[tokio::test]
    async fn test_refine_denied_when_quota_exhausted() {
        let f = fixture(EngagementConfig {
            image_max_per_hour: 0,
            ..EngagementConfig::default()
        });

        let msg = IncomingMessage::channel_text(7, 2, "ada", "make it blue")
            .with_message_id(501)
            .replying_to(RepliedMessage {
                message_id: 400,
                author_was_self: true,
                has_png: true,
            });

        assert_eq!(f.handler.handle(&msg).await.unwrap(), InboundOutcome::RateLimited);
        let sent = f.sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Rate limit exceeded"));
        assert!(sent[0].png.is_none());
    }

    #[tokio::test]
    async fn test_refine_combines_old_and_new_prompt() {
        let f = fixture(EngagementConfig::default());
        f.throttle.store_prompt(400, "a cat in a hat");

        let msg = IncomingMessage::channel_text(7, 2, "ada", "make it blue")
            .with_message_id(501)
            .replying_to(RepliedMessage {
                message_id: 400,
                author_was_self: true,
                has_png: true,
            });

        let outcome = f.handler.handle(&msg).await.unwrap();
        assert_eq!(outcome, InboundOutcome::ImageRefined { channel_id: 7 });

        assert_eq!(f.generator.prompts(), vec!["a cat in a hat + make it blue"]);

        let sent = f.sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].png.is_some());
        assert_eq!(sent[0].reply_to, Some(501));

        // the recording sender numbers messages from 1, so the combined
        // prompt now sits under the new image's id
        assert_eq!(f.throttle.prompt_for(1), "a cat in a hat + make it blue");
    }

    #[tokio::test]
    async fn test_refine_without_stored_prompt_uses_reply_text() {
        let f = fixture(EngagementConfig::default());

        let msg = IncomingMessage::channel_text(7, 2, "ada", "a dog on a skateboard")
            .with_message_id(77)
            .replying_to(RepliedMessage {
                message_id: 999,
                author_was_self: true,
                has_png: true,
            });

        f.handler.handle(&msg).await.unwrap();
        assert_eq!(f.generator.prompts(), vec!["a dog on a skateboard"]);
    }

    #[tokio::test]
    async fn test_reply_to_someone_elses_png_is_ignored() {
        let f = fixture(EngagementConfig::default());

        let msg = IncomingMessage::channel_text(7, 2, "ada", "neat picture")
            .replying_to(RepliedMessage {
                message_id: 400,
                author_was_self: false,
                has_png: true,
            });

        assert_eq!(f.handler.handle(&msg).await.unwrap(), InboundOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_image_failure_sends_apology_and_keeps_quota_spent() {
        let f = fixture_full(EngagementConfig::default(), CannedGenerator::failing());

        let msg = IncomingMessage::channel_text(7, 2, "ada", "try again")
            .with_message_id(1)
            .replying_to(RepliedMessage {
                message_id: 400,
                author_was_self: true,
                has_png: true,
            });

        assert_eq!(f.handler.handle(&msg).await.unwrap(), InboundOutcome::ImageFailed);
        assert!(f.sender.sent()[0].text.contains("Image generation failed"));
        // the attempt consumed quota even though generation failed
        assert_eq!(f.throttle.remaining(), 19);
    }

    #[tokio::test]
    async fn test_mention_reply_builds_context_prompt() {
        let f = fixture(EngagementConfig::default());

        let mut msg = IncomingMessage::channel_text(7, 2, "ada", "what do you think?")
            .with_mention();
        msg.context = vec![
            ContextLine {
                author: "grace".to_string(),
                text: "compilers are fun".to_string(),
            },
            ContextLine {
                author: "Assistant".to_string(),
                text: "agreed".to_string(),
            },
        ];

        let outcome = f.handler.handle(&msg).await.unwrap();
        assert_eq!(outcome, InboundOutcome::MentionReply { channel_id: 7 });

        let prompt = &f.generator.prompts()[0];
        assert!(prompt.starts_with("Recent conversation context:\n"));
        assert!(prompt.contains("grace: compilers are fun\n"));
        assert!(prompt.contains("Assistant: agreed\n"));
        assert!(prompt.ends_with("ada: what do you think?"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(InboundOutcome::Ignored.as_str(), "ignored");
        assert_eq!(
            InboundOutcome::FollowUp { channel_id: 1 }.as_str(),
            "follow_up"
        );
    }
}
