//! tmibot: a small demo bot for Twitch chat.
//!
//! Commands (default prefix `!`):
//!
//!   !ping            replies "pong"
//!   !echo <text>     repeats the text
//!   !uptime          how long the bot has been running
//!   !help            lists commands
//!
//! Credentials come from `--token`/`--username` or `TWITCH_OAUTH_TOKEN` /
//! `TWITCH_USERNAME`, falling back to `~/.config/tmibot/bot.toml`.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tmibot_sdk::{Bot, BotConfig, BucketKind, Message, ReconnectConfig};

use config::FileConfig;

#[derive(Parser, Debug)]
#[command(name = "tmibot", about = "Demo Twitch chat bot")]
struct Args {
    /// Config file (default: ~/.config/tmibot/bot.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gateway address (host:port)
    #[arg(long)]
    server: Option<String>,

    /// Connect without TLS
    #[arg(long)]
    no_tls: bool,

    /// Bot login name
    #[arg(long, env = "TWITCH_USERNAME")]
    username: Option<String>,

    /// OAuth token (with or without the `oauth:` prefix)
    #[arg(long, env = "TWITCH_OAUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Channels to join, comma separated
    #[arg(long, env = "TWITCH_CHANNELS", value_delimiter = ',')]
    channels: Vec<String>,

    /// Command prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Message sent to each channel after joining
    #[arg(long)]
    ready_message: Option<String>,

    /// Seconds between heartbeat log lines
    #[arg(long)]
    heartbeat: Option<u64>,

    /// Exit on the first disconnect instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,
}

const DEFAULT_HEARTBEAT_SECS: u64 = 300;

/// Merge flags over the config file.
fn bot_config(args: &Args, file: FileConfig) -> Result<BotConfig> {
    let username = args
        .username
        .clone()
        .or(file.username)
        .context("no username: pass --username or set TWITCH_USERNAME")?;
    let token = args
        .token
        .clone()
        .or(file.oauth_token)
        .context("no token: pass --token or set TWITCH_OAUTH_TOKEN")?;

    let mut cfg = BotConfig::new(token, username);
    let channels = if args.channels.is_empty() {
        file.channels.unwrap_or_default()
    } else {
        args.channels.clone()
    };
    cfg = cfg.channels(channels);

    if let Some(server) = args.server.clone().or(file.server) {
        cfg.server_addr = server;
    }
    cfg.tls = !args.no_tls && file.tls.unwrap_or(true);
    if let Some(prefix) = args.prefix.clone().or(file.command_prefix) {
        cfg = cfg.command_prefix(prefix);
    }
    if let Some(text) = args.ready_message.clone().or(file.ready_message) {
        cfg = cfg.ready_message(text);
    }
    // CLEARCHAT/CLEARMSG/GLOBALUSERSTATE only arrive with these.
    cfg = cfg.capabilities(file.capabilities.unwrap_or_else(|| {
        vec![
            tmibot_sdk::config::CAP_COMMANDS.to_string(),
            tmibot_sdk::config::CAP_TAGS.to_string(),
        ]
    }));
    Ok(cfg)
}

fn format_uptime(started: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - started).num_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

async fn reply(bot: &Bot, msg: &Message, text: &str) -> Result<()> {
    if let Some(channel) = &msg.channel {
        bot.send(channel, text).await?;
    }
    Ok(())
}

fn register(bot: &Bot, heartbeat_secs: u64) {
    let started = Utc::now();

    bot.add_command("ping", |bot, msg| async move { reply(&bot, &msg, "pong").await });

    bot.add_command("echo", |bot, msg| async move {
        if msg.text_args.is_empty() {
            return Ok(());
        }
        reply(&bot, &msg, &msg.text_args.join(" ")).await
    });

    bot.add_command("uptime", move |bot, msg| async move {
        let text = format!("up for {}", format_uptime(started, Utc::now()));
        reply(&bot, &msg, &text).await
    });

    bot.add_command("help", |bot, msg| async move {
        let prefix = bot.command_prefix().to_string();
        let names: Vec<String> = bot
            .registered(BucketKind::Command)
            .into_iter()
            .map(|name| format!("{prefix}{name}"))
            .collect();
        reply(&bot, &msg, &format!("commands: {}", names.join(", "))).await
    });

    bot.add_listener("log", |_bot, msg| async move {
        tracing::info!(
            channel = msg.channel.as_deref().unwrap_or("-"),
            user = msg.user.as_deref().unwrap_or("-"),
            "{}",
            msg.text.as_deref().unwrap_or_default()
        );
        Ok(())
    });

    bot.add_before_command("audit", |_bot, msg| async move {
        tracing::debug!(
            command = msg.text_command.as_deref().unwrap_or_default(),
            user = msg.user.as_deref().unwrap_or("-"),
            "Command"
        );
        Ok(())
    });

    let last_beat = Arc::new(AtomicI64::new(started.timestamp()));
    bot.add_check("heartbeat", move |bot| {
        let last_beat = last_beat.clone();
        async move {
            let now = Utc::now().timestamp();
            let last = last_beat.load(Ordering::Relaxed);
            if now - last >= heartbeat_secs as i64 {
                last_beat.store(now, Ordering::Relaxed);
                tracing::info!(
                    channels = ?bot.channels(),
                    uptime = %format_uptime(started, Utc::now()),
                    "Heartbeat"
                );
            }
            Ok(())
        }
    });

    bot.add_after_bot_connected("hello", |bot| async move {
        tracing::info!(nick = %bot.username(), channels = ?bot.channels(), "Gateway acknowledged login");
        Ok(())
    });

    bot.add_after_clear_chat("log-clear", |_bot, channel, user| async move {
        tracing::info!(%channel, %user, "Chat cleared for user");
        Ok(())
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tmibot=info,tmibot_sdk=info".into()),
        )
        .init();

    let args = Args::parse();
    let path = args.config.clone().unwrap_or_else(config::default_path);
    let file = FileConfig::load(&path)?;
    let heartbeat = args
        .heartbeat
        .or(file.heartbeat_secs)
        .unwrap_or(DEFAULT_HEARTBEAT_SECS);
    let cfg = bot_config(&args, file)?;
    tracing::info!(?cfg, "Starting");

    let bot = Bot::new(cfg);
    register(&bot, heartbeat);

    let stopper = bot.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C, shutting down");
            stopper.stop();
        }
    });

    if args.no_reconnect {
        bot.run().await?;
    } else {
        bot.run_with_reconnect(ReconnectConfig::default()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["tmibot", "--username", "Bot", "--token", "abc"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig {
            username: Some("other".into()),
            channels: Some(vec!["fromfile".into()]),
            command_prefix: Some("?".into()),
            ..Default::default()
        };
        let cfg = bot_config(&args(&["--channels", "a,#B"]), file).unwrap();
        assert_eq!(cfg.username, "bot");
        assert_eq!(cfg.channels, vec!["a", "b"]);
        assert_eq!(cfg.command_prefix, "?");
        assert_eq!(cfg.pass_token(), "oauth:abc");
        assert!(cfg.tls);
    }

    #[test]
    fn file_supplies_missing_values() {
        let file = FileConfig {
            channels: Some(vec!["fromfile".into()]),
            tls: Some(false),
            capabilities: Some(vec![]),
            ..Default::default()
        };
        let cfg = bot_config(&args(&[]), file).unwrap();
        assert_eq!(cfg.channels, vec!["fromfile"]);
        assert!(!cfg.tls);
        assert!(cfg.capabilities.is_empty());
    }

    #[test]
    fn uptime_formatting() {
        let start = Utc::now();
        assert_eq!(format_uptime(start, start + chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_uptime(start, start + chrono::Duration::seconds(65)), "1m 5s");
        assert_eq!(
            format_uptime(start, start + chrono::Duration::seconds(3725)),
            "1h 2m 5s"
        );
    }
}
