//! tmibot-sdk: a Twitch chat client engine and callback-driven bot framework.
//!
//! The engine speaks the IRC dialect of the Twitch chat gateway over TLS:
//!
//! - [`irc`]: parsing of raw lines into [`Message`]s
//! - [`connection`]: TLS transport, login handshake, receive-with-timeout
//! - [`registry`]: named callback buckets with deferred removal
//! - [`bot`]: lifecycle, join/leave protocol, the read loop, and the
//!   `add_*`/`remove_*` callback surface
//!
//! ```rust,no_run
//! use tmibot_sdk::{Bot, BotConfig};
//!
//! # async fn example() -> tmibot_sdk::Result<()> {
//! let bot = Bot::new(BotConfig::new("oauth:token", "mybot").channel("somechannel"));
//!
//! bot.add_command("ping", |bot, msg| async move {
//!     if let Some(channel) = &msg.channel {
//!         bot.send(channel, "pong").await?;
//!     }
//!     Ok(())
//! });
//!
//! bot.run().await
//! # }
//! ```
//!
//! Everything runs on the task that calls [`Bot::run`]: one line is parsed
//! and dispatched at a time, and a slow callback stalls the loop unless
//! [`BotConfig::callback_timeout`] is set.

pub mod actions;
pub mod bot;
pub mod config;
pub mod connection;
mod dispatch;
pub mod error;
pub mod irc;
pub mod reconnect;
pub mod registry;

pub use bot::{Bot, BotState};
pub use config::BotConfig;
pub use error::{Error, Result};
pub use irc::Message;
pub use reconnect::ReconnectConfig;
pub use registry::BucketKind;
