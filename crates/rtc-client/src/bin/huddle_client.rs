//! Relay client
//!
//! Connects to a relay's signaling endpoint, joins a room, logs every
//! channel event and leaves the room on Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! RTC_ACCESS_TOKEN=... cargo run --bin huddle_client -- \
//!   --url wss://relay.example.com/ws \
//!   --room standup \
//!   --name tester
//!
//! # Start from a config file, override the URL
//! cargo run --bin huddle_client -- --config ./client.toml --url ws://localhost:4443
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use huddle_rtc_client::auth::{Credentials, NoRefresh};
use huddle_rtc_client::signaling::{ChannelEvent, SignalingChannel, WebSocketConnector};
use huddle_rtc_client::{ChannelState, RtcClientConfig, TeardownOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// huddle relay client
///
/// Joins a room over the relay's signaling channel and reports what it sees.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RTC_CONFIG")]
    config: Option<PathBuf>,

    /// Signaling URL (overrides the config file)
    #[arg(long, env = "RTC_SIGNALING_URL")]
    url: Option<String>,

    /// Access token presented to the relay
    #[arg(long, env = "RTC_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    /// Refresh token, kept for reconnects
    #[arg(long, env = "RTC_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Room to join
    #[arg(short, long, env = "RTC_ROOM")]
    room: String,

    /// Display name
    #[arg(short, long, default_value = "huddle-client", env = "RTC_DISPLAY_NAME")]
    name: String,

    /// Leave acknowledgement timeout in milliseconds (overrides the config file)
    #[arg(long, env = "RTC_TEARDOWN_TIMEOUT_MS")]
    teardown_timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false, env = "RTC_JSON_LOGS")]
    json_logs: bool,
}

fn build_config(args: &Args) -> anyhow::Result<RtcClientConfig> {
    let mut config = match &args.config {
        Some(path) => RtcClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RtcClientConfig::default(),
    };

    if let Some(url) = &args.url {
        config.signaling.url = url.clone();
    }
    if let Some(timeout) = args.teardown_timeout_ms {
        config.signaling.teardown_timeout_ms = timeout;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = build_config(&args)?;
    let run_id = uuid::Uuid::new_v4();
    info!(
        %run_id,
        version = huddle_rtc_client::version(),
        url = %config.signaling.url,
        room = %args.room,
        "huddle_client starting"
    );

    let channel = SignalingChannel::new(
        &config.signaling,
        Arc::new(WebSocketConnector::new()),
        Arc::new(NoRefresh),
    );
    let events = tokio::spawn(log_events(channel.clone()));

    let mut credentials = Credentials::new(args.token.clone());
    if let Some(refresh_token) = &args.refresh_token {
        credentials = credentials.with_refresh_token(refresh_token.clone());
    }
    channel.connect(Some(credentials)).await?;

    let joined = channel.join_room(&args.room, &args.name).await?;
    if joined.is_admitted() {
        info!(producers = joined.producers.len(), "Joined room");
        for producer in &joined.producers {
            info!(
                producer_id = %producer.producer_id,
                user_id = %producer.user_id,
                kind = %producer.kind,
                "Existing producer"
            );
        }
    } else if joined.pending_approval {
        info!("Waiting for moderator approval");
    } else {
        channel.disconnect().await;
        bail!("relay refused to admit us to room '{}'", args.room);
    }

    info!("Client running. Press Ctrl+C to leave.");
    let mut state = channel.watch_state();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for Ctrl+C")?;
            info!("Shutdown signal received, leaving room...");
        }
        _ = state.wait_for(|s| *s == ChannelState::Closed) => {
            warn!("Signaling channel closed");
        }
    }

    match channel.teardown().await {
        TeardownOutcome::Acknowledged => info!("Relay acknowledged leave"),
        TeardownOutcome::TimedOut => warn!("Leave not acknowledged in time"),
        TeardownOutcome::Skipped { reason } => warn!("Leave skipped: {}", reason),
    }
    channel.disconnect().await;
    events.abort();

    Ok(())
}

async fn log_events(channel: SignalingChannel) {
    let mut events = channel.subscribe();
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Server(event)) => info!(event = event.name(), "{:?}", event),
            Ok(ChannelEvent::AuthFailed { message }) => error!("Authentication failed: {}", message),
            Ok(ChannelEvent::ReconnectFailed { attempts }) => {
                error!("Gave up reconnecting after {} attempts", attempts)
            }
            Ok(event) => info!(event = event.name(), "{:?}", event),
            Err(RecvError::Lagged(skipped)) => warn!("Event log lagged, skipped {}", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
