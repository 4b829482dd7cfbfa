//! Configuration management

use anyhow::Result;
use std::time::Duration;

/// Tuning for the autonomous engagement loop
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// Enable the periodic engagement loop
    pub enabled: bool,

    /// Percent chance (0-100) that a tick produces an engagement
    pub chance_percent: u8,

    /// Percent chance (0-100) that an engagement goes to a DM
    /// instead of a channel
    pub dm_chance_percent: u8,

    /// Percent chance (0-100) that a reply to a pending question
    /// gets a follow-up response
    pub reply_chance_percent: u8,

    /// Delay before the first tick after startup
    pub startup_delay: Duration,

    /// Interval between ticks
    pub tick_interval: Duration,

    /// Image generations allowed per rolling hour
    pub image_max_per_hour: usize,

    /// How long a pending question stays eligible for follow-up
    pub reply_window: Duration,

    /// How far back autonomous sends count against channel selection
    pub usage_window: Duration,

    /// Maximum cached conversation sessions
    pub max_sessions: u64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chance_percent: 10,
            dm_chance_percent: 50,
            reply_chance_percent: 80,
            startup_delay: Duration::from_secs(20 * 60), // 20 minutes
            tick_interval: Duration::from_secs(30 * 60), // 30 minutes
            image_max_per_hour: 20,
            reply_window: Duration::from_secs(10 * 60), // 10 minutes
            usage_window: Duration::from_secs(2 * 60 * 60), // 2 hours
            max_sessions: 256,
        }
    }
}

/// LLM backend endpoints and models
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    /// API key (optional - local backends often need none)
    pub api_key: Option<String>,

    /// Chat model
    pub model: String,

    /// Image model
    pub image_model: String,

    /// Persona for new conversation sessions
    pub system_prompt: String,
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub engagement: EngagementConfig,
    pub llm: LlmConfig,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are MaIn, a curious and slightly \
mischievous chat companion. Keep replies short, casual and in the language \
the other person uses.";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = EngagementConfig::default();

        let enabled = std::env::var("MINGLEBOT_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.enabled);

        let chance_percent = percent_var("MINGLEBOT_CHANCE_PERCENT", defaults.chance_percent);
        let dm_chance_percent =
            percent_var("MINGLEBOT_DM_CHANCE_PERCENT", defaults.dm_chance_percent);
        let reply_chance_percent =
            percent_var("MINGLEBOT_REPLY_CHANCE_PERCENT", defaults.reply_chance_percent);

        let startup_delay = std::env::var("MINGLEBOT_STARTUP_DELAY_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.startup_delay);

        let tick_interval = std::env::var("MINGLEBOT_TICK_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.tick_interval);

        let image_max_per_hour = std::env::var("MINGLEBOT_IMAGE_MAX_PER_HOUR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.image_max_per_hour);

        let max_sessions = std::env::var("MINGLEBOT_MAX_SESSIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_sessions);

        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());

        let api_key = std::env::var("OPENAI_API_KEY").ok();

        let model =
            std::env::var("MINGLEBOT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let image_model =
            std::env::var("MINGLEBOT_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".to_string());

        let system_prompt = std::env::var("MINGLEBOT_SYSTEM_PROMPT")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            engagement: EngagementConfig {
                enabled,
                chance_percent,
                dm_chance_percent,
                reply_chance_percent,
                startup_delay,
                tick_interval,
                image_max_per_hour,
                reply_window: defaults.reply_window,
                usage_window: defaults.usage_window,
                max_sessions,
            },
            llm: LlmConfig {
                base_url,
                api_key,
                model,
                image_model,
                system_prompt,
            },
        })
    }
}

fn percent_var(name: &str, default: u8) -> u8 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .map(|p| p.min(100))
        .unwrap_or(default)
}
