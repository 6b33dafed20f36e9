//! The bot: session state, lifecycle, and the public callback surface.
//!
//! [`Bot`] is a cheap, cloneable handle. Every callback receives a clone, so
//! callbacks can send messages, join or leave channels, register or remove
//! callbacks, and stop the bot while the read loop is running.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --run()--> Connecting --login + joins--> Connected --stop()--> Stopped
//!      ^                                                    |
//!      +------------------ transport error -----------------+
//! ```
//!
//! `stop()` is cooperative: the loop notices the flag at the top of its next
//! iteration, so it exits within one receive timeout. A stopped bot cannot be
//! run again.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::BotConfig;
use crate::connection::{self, EstablishedConnection, LineReader, Recv, Writer};
use crate::dispatch::{self, Flow};
use crate::error::{Error, Result};
use crate::irc::{Message, normalize_channel};
use crate::registry::{BucketKind, ChannelText, Registry, callback};

/// Where the bot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Disconnected,
    Connecting,
    Connected,
    Stopped,
}

struct Shared {
    config: BotConfig,
    registry: Mutex<Registry>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    channels: Mutex<Vec<String>>,
    state: Mutex<BotState>,
    finished: AtomicBool,
    sessions: AtomicU64,
}

/// A Twitch chat bot. Clones share the same session.
#[derive(Clone)]
pub struct Bot {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("username", &self.shared.config.username)
            .field("state", &self.state())
            .field("channels", &self.channels())
            .finish()
    }
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        let config = config.normalized();
        let channels = config.channels.clone();
        Self {
            shared: Arc::new(Shared {
                config,
                registry: Mutex::new(Registry::default()),
                writer: tokio::sync::Mutex::new(None),
                channels: Mutex::new(channels),
                state: Mutex::new(BotState::Disconnected),
                finished: AtomicBool::new(false),
                sessions: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.shared.config
    }

    pub fn username(&self) -> &str {
        &self.shared.config.username
    }

    pub fn command_prefix(&self) -> &str {
        &self.shared.config.command_prefix
    }

    pub fn state(&self) -> BotState {
        *self.shared.state.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Channels the bot is in, or will join on the next connect.
    pub fn channels(&self) -> Vec<String> {
        self.shared.channels.lock().clone()
    }

    /// Number of sessions that reached the read loop.
    pub fn sessions(&self) -> u64 {
        self.shared.sessions.load(Ordering::SeqCst)
    }

    /// Names registered in a bucket, in insertion order.
    pub fn registered(&self, kind: BucketKind) -> Vec<String> {
        self.shared.registry.lock().names(kind)
    }

    pub(crate) fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        f(&mut self.shared.registry.lock())
    }

    /// Ask the read loop to exit. Takes effect within one receive timeout.
    pub fn stop(&self) {
        if self.shared.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Stop requested");
        let mut state = self.shared.state.lock();
        if *state == BotState::Disconnected {
            *state = BotState::Stopped;
        }
    }

    // ── Lifecycle ──

    /// Connect to the configured gateway, log in, join channels, and run the
    /// read loop until [`stop`](Self::stop) or a fatal error.
    pub async fn run(&self) -> Result<()> {
        self.begin()?;
        let result = match connection::establish_connection(&self.shared.config).await {
            Ok(EstablishedConnection::Plain(tcp)) => self.drive(tcp).await,
            Ok(EstablishedConnection::Tls(tls)) => self.drive(*tls).await,
            Err(e) => Err(e),
        };
        self.end(&result).await;
        result
    }

    /// Like [`run`](Self::run) but over an already-open stream.
    pub async fn run_with_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.begin()?;
        let result = self.drive(stream).await;
        self.end(&result).await;
        result
    }

    fn begin(&self) -> Result<()> {
        if self.is_finished() {
            return Err(Error::Stopped);
        }
        let mut state = self.shared.state.lock();
        if matches!(*state, BotState::Connecting | BotState::Connected) {
            return Err(Error::AlreadyRunning);
        }
        *state = BotState::Connecting;
        Ok(())
    }

    async fn end(&self, result: &Result<()>) {
        self.shared.writer.lock().await.take();
        let next = if self.is_finished() {
            BotState::Stopped
        } else {
            BotState::Disconnected
        };
        *self.shared.state.lock() = next;
        match result {
            Ok(()) => tracing::info!("Bot stopped"),
            Err(e) => tracing::error!(error = %e, "Read loop exited"),
        }
    }

    async fn drive<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let config = &self.shared.config;
        let (mut reader, mut writer) = connection::split_stream(stream, config.recv_timeout);
        connection::login(&mut writer, config).await?;
        *self.shared.writer.lock().await = Some(writer);
        tracing::info!(server = %config.server_addr, nick = %config.username, "Logged in");

        for channel in self.channels() {
            self.join_channel(&channel).await?;
        }

        *self.shared.state.lock() = BotState::Connected;
        self.shared.sessions.fetch_add(1, Ordering::SeqCst);
        self.read_loop(&mut reader).await
    }

    async fn read_loop(&self, reader: &mut LineReader) -> Result<()> {
        let prefix = self.shared.config.command_prefix.as_str();
        while !self.is_finished() {
            match reader.recv_cycle().await? {
                Recv::Timeout => dispatch::on_idle(self).await?,
                Recv::Lines(lines) => {
                    for line in lines {
                        if line.is_empty() {
                            continue;
                        }
                        tracing::debug!("<< {line}");
                        let msg = Message::parse(&line, prefix);
                        if dispatch::dispatch(self, msg).await? == Flow::Reconnect {
                            return Err(Error::ReconnectRequested);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ── Sending ──

    /// Send `"{command} {args}\r\n"`.
    pub async fn send_raw(&self, command: &str, args: &str) -> Result<()> {
        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        connection::write_command(writer, command, args).await
    }

    /// Send a chat message (`PRIVMSG #<channel> :<text>`).
    pub async fn send(&self, channel: &str, text: &str) -> Result<()> {
        let channel = normalize_channel(channel);
        self.send_raw("PRIVMSG", &format!("#{channel} :{text}")).await
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.shared.writer.lock().await.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    // ── Join / leave ──

    /// Run before-join hooks, `JOIN`, send the ready message, run after-join
    /// hooks, then flush both join buckets.
    pub async fn join_channel(&self, name: &str) -> Result<()> {
        self.ensure_connected().await?;
        let channel = normalize_channel(name);

        dispatch::run_bucket(self, |r| &mut r.before_join_channel, channel.clone()).await?;
        self.send_raw("JOIN", &format!("#{channel}")).await?;
        self.send(&channel, &self.shared.config.ready_message).await?;
        self.track_channel(&channel);
        tracing::info!(channel = %channel, "Joined");
        dispatch::run_bucket(self, |r| &mut r.after_join_channel, channel).await?;

        self.with_registry(|r| {
            r.before_join_channel.flush();
            r.after_join_channel.flush();
        });
        Ok(())
    }

    /// Run before-leave hooks, `PART`, run after-leave hooks, then flush both
    /// leave buckets.
    pub async fn leave_channel(&self, name: &str) -> Result<()> {
        self.ensure_connected().await?;
        let channel = normalize_channel(name);

        dispatch::run_bucket(self, |r| &mut r.before_leave_channel, channel.clone()).await?;
        self.send_raw("PART", &format!("#{channel}")).await?;
        self.untrack_channel(&channel);
        tracing::info!(channel = %channel, "Left");
        dispatch::run_bucket(self, |r| &mut r.after_leave_channel, channel).await?;

        self.with_registry(|r| {
            r.before_leave_channel.flush();
            r.after_leave_channel.flush();
        });
        Ok(())
    }

    fn track_channel(&self, channel: &str) {
        let mut channels = self.shared.channels.lock();
        if !channels.iter().any(|c| c == channel) {
            channels.push(channel.to_string());
        }
    }

    pub(crate) fn untrack_channel(&self, channel: &str) {
        self.shared.channels.lock().retain(|c| c != channel);
    }
}

macro_rules! remover {
    ($(#[$meta:meta])* $name:ident => $field:ident) => {
        $(#[$meta])*
        pub fn $name(&self, name: &str) {
            self.with_registry(|r| r.$field.schedule_removal(name));
        }
    };
}

// ── Callback registration ──
//
// `add_*` inserts (or overwrites, keeping position). `remove_*` only queues
// the name; it is dropped after the bucket's next dispatch pass.
impl Bot {
    pub fn add_before_join_channel<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.before_join_channel.insert(name, callback(f)));
    }

    pub fn add_after_join_channel<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.after_join_channel.insert(name, callback(f)));
    }

    pub fn add_before_leave_channel<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.before_leave_channel.insert(name, callback(f)));
    }

    /// Also fired when the server reports a `PART`.
    pub fn add_after_leave_channel<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.after_leave_channel.insert(name, callback(f)));
    }

    /// Runs every time a receive times out with nothing read.
    pub fn add_check<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.checks.insert(name, callback(move |bot, ()| f(bot))));
    }

    /// Runs for every `PRIVMSG`, command or not.
    pub fn add_listener<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.listeners.insert(name, callback(f)));
    }

    /// Runs when a `PRIVMSG` text is the command prefix followed by `name`.
    pub fn add_command<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.commands.insert(name, callback(f)));
    }

    pub fn add_before_command<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.before_command.insert(name, callback(f)));
    }

    pub fn add_after_command<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| r.after_command.insert(name, callback(f)));
    }

    /// Receives `(channel, user)` for a `CLEARCHAT` targeting one user.
    pub fn add_after_clear_chat<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let cb = callback(move |bot, (channel, text): ChannelText| f(bot, channel, text));
        self.with_registry(|r| r.after_clear_chat.insert(name, cb));
    }

    /// Receives `(channel, deleted text)` for a `CLEARMSG`.
    pub fn add_after_delete_message<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let cb = callback(move |bot, (channel, text): ChannelText| f(bot, channel, text));
        self.with_registry(|r| r.after_delete_message.insert(name, cb));
    }

    /// Runs on `GLOBALUSERSTATE`, i.e. once authentication succeeded.
    pub fn add_after_bot_connected<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_registry(|r| {
            r.after_bot_connected
                .insert(name, callback(move |bot, ()| f(bot)))
        });
    }

    remover!(remove_before_join_channel => before_join_channel);
    remover!(remove_after_join_channel => after_join_channel);
    remover!(remove_before_leave_channel => before_leave_channel);
    remover!(remove_after_leave_channel => after_leave_channel);
    remover!(remove_check => checks);
    remover!(remove_listener => listeners);
    remover!(
        /// The command stays invocable until the next command flush.
        remove_command => commands
    );
    remover!(remove_before_command => before_command);
    remover!(remove_after_command => after_command);
    remover!(remove_after_clear_chat => after_clear_chat);
    remover!(remove_after_delete_message => after_delete_message);
    remover!(remove_after_bot_connected => after_bot_connected);
}
