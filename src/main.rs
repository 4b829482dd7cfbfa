//! Minglebot - Entry Point
//!
//! The engine ships without a platform adapter, so the binary runs against
//! scripted collaborators: a fixed set of demo channels and members, and
//! either a real OpenAI-compatible backend (when configured) or canned
//! replies. Useful for smoke-testing configuration and watching the
//! engagement loop make its decisions.
//!
//! Modes:
//! - Default: periodic engagement loop until Ctrl-C
//! - --once / -1: force a single engagement tick, print it, exit

use std::sync::Arc;

use minglebot::harness::{CannedGenerator, RecordingSender, ScriptedDirectory};
use minglebot::{
    Config, ContentGenerator, Destination, EngagementLoop, LlmClient, Member, RecentPrompts,
    SessionCache, UsageHistory,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn demo_directory() -> ScriptedDirectory {
    ScriptedDirectory::new(
        vec![
            Destination::channel(101, 12),
            Destination::channel(102, 4),
            Destination::channel(103, 7),
        ],
        vec![
            Member::new(1, "ada", "<@1>"),
            Member::new(2, "grace", "<@2>"),
            Member::new(3, "linus", "<@3>"),
        ],
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let once_mode = args.iter().any(|a| a == "--once" || a == "-1");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Minglebot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: minglebot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --once, -1  Force one engagement tick and exit");
        println!("  --help, -h  Show this help");
        println!();
        println!("Default: run the periodic engagement loop until Ctrl-C");
        println!();
        println!("Environment variables:");
        println!("  OPENAI_BASE_URL               OpenAI-compatible endpoint");
        println!("  OPENAI_API_KEY                API key (optional for local backends)");
        println!("  MINGLEBOT_MODEL               Chat model");
        println!("  MINGLEBOT_IMAGE_MODEL         Image model");
        println!("  MINGLEBOT_CHANCE_PERCENT      Per-tick engagement chance (0-100)");
        println!("  MINGLEBOT_TICK_MINUTES        Minutes between ticks");
        println!("  MINGLEBOT_STARTUP_DELAY_MINUTES  Delay before the first tick");
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::from_env()?;
    info!("Minglebot v{}", env!("CARGO_PKG_VERSION"));

    let generator: Arc<dyn ContentGenerator> = {
        let llm = LlmClient::new(config.llm.clone());
        if llm.is_available() {
            info!("Using LLM backend at {}", config.llm.base_url);
            Arc::new(llm)
        } else {
            info!("No LLM backend configured, using canned replies");
            Arc::new(CannedGenerator::new(
                "What's the most interesting thing you learned this week?",
            ))
        }
    };

    if once_mode {
        // --once bypasses the chance gate
        config.engagement.chance_percent = 100;
    }

    let sender = Arc::new(RecordingSender::new());
    let sessions = Arc::new(SessionCache::new(
        config.engagement.max_sessions,
        &config.llm.system_prompt,
    ));
    let recent = Arc::new(RecentPrompts::new(config.engagement.reply_window));
    let usage = Arc::new(UsageHistory::new(config.engagement.usage_window));

    let engine = Arc::new(EngagementLoop::new(
        config.engagement.clone(),
        Arc::new(demo_directory()),
        sender.clone(),
        generator,
        sessions,
        recent,
        usage,
    ));

    if once_mode {
        let outcome = engine.try_engage().await?;
        info!("Tick outcome: {}", outcome.as_str());
        for message in sender.sent() {
            let kind = if message.direct { "member" } else { "channel" };
            info!("Would send to {} {}: {}", kind, message.destination_id, message.text);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_handle = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    shutdown_tx.send(true)?;
    loop_handle.await?;

    Ok(())
}
