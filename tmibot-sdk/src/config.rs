//! Bot session configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::irc::normalize_channel;

/// Twitch chat gateway (TLS).
pub const DEFAULT_SERVER: &str = "irc.chat.twitch.tv:6697";
/// Idle interval after which checks run.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);
/// Floor for the receive timeout; anything shorter turns checks into a busy loop.
pub const MIN_RECV_TIMEOUT: Duration = Duration::from_millis(10);
/// Twitch capability that enables CLEARCHAT, CLEARMSG, GLOBALUSERSTATE, RECONNECT.
pub const CAP_COMMANDS: &str = "twitch.tv/commands";
/// Twitch capability that adds IRCv3 tags to messages.
pub const CAP_TAGS: &str = "twitch.tv/tags";
/// Twitch capability that enables JOIN/PART for other users.
pub const CAP_MEMBERSHIP: &str = "twitch.tv/membership";

/// Everything a [`Bot`](crate::bot::Bot) needs to connect and behave.
///
/// Credentials are opaque strings obtained elsewhere; the bot never
/// refreshes them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Gateway address (host:port).
    pub server_addr: String,
    /// Wrap the TCP stream in TLS.
    pub tls: bool,
    /// OAuth token, with or without the `oauth:` prefix.
    pub oauth_token: String,
    pub client_id: String,
    pub client_secret: String,
    /// Login name of the bot account.
    pub username: String,
    /// Channels joined on connect.
    pub channels: Vec<String>,
    pub command_prefix: String,
    /// Sent to every channel right after JOIN, even when empty.
    pub ready_message: String,
    /// Capabilities requested with `CAP REQ` before `PASS`. Empty means none.
    pub capabilities: Vec<String>,
    #[serde(rename = "recv_timeout_ms", with = "duration_ms")]
    pub recv_timeout: Duration,
    /// Upper bound for a single callback invocation.
    #[serde(rename = "callback_timeout_ms", with = "opt_duration_ms")]
    pub callback_timeout: Option<Duration>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER.to_string(),
            tls: true,
            oauth_token: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            channels: Vec::new(),
            command_prefix: "!".to_string(),
            ready_message: String::new(),
            capabilities: Vec::new(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            callback_timeout: None,
        }
    }
}

impl BotConfig {
    pub fn new(oauth_token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            oauth_token: oauth_token.into(),
            username: username.into().to_lowercase(),
            ..Default::default()
        }
    }

    pub fn channel(mut self, name: &str) -> Self {
        self.channels.push(name.to_string());
        self.normalized()
    }

    pub fn channels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.channels
            .extend(names.into_iter().map(|s| s.as_ref().to_string()));
        self.normalized()
    }

    pub fn command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn ready_message(mut self, text: impl Into<String>) -> Self {
        self.ready_message = text.into();
        self
    }

    pub fn client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn server(mut self, addr: impl Into<String>, tls: bool) -> Self {
        self.server_addr = addr.into();
        self.tls = tls;
        self
    }

    pub fn capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = Some(timeout);
        self
    }

    /// Normalize channel names (lower-case, no `#`/`@`, no blanks, no
    /// duplicates) and raise `recv_timeout` to [`MIN_RECV_TIMEOUT`].
    pub fn normalized(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.channels.len());
        for name in self.channels.iter().map(|c| normalize_channel(c)) {
            if !name.is_empty() && !seen.contains(&name) {
                seen.push(name);
            }
        }
        self.channels = seen;
        self.username = self.username.trim().to_lowercase();
        if self.recv_timeout < MIN_RECV_TIMEOUT {
            tracing::warn!(
                recv_timeout_ms = self.recv_timeout.as_millis() as u64,
                "recv_timeout below {}ms, raising it",
                MIN_RECV_TIMEOUT.as_millis()
            );
            self.recv_timeout = MIN_RECV_TIMEOUT;
        }
        self
    }

    /// The `PASS` argument, always carrying the `oauth:` prefix.
    pub fn pass_token(&self) -> String {
        if self.oauth_token.starts_with("oauth:") {
            self.oauth_token.clone()
        } else {
            format!("oauth:{}", self.oauth_token)
        }
    }

    /// Host part of `server_addr`, used as the TLS server name.
    pub fn host(&self) -> &str {
        self.server_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.server_addr)
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("server_addr", &self.server_addr)
            .field("tls", &self.tls)
            .field("oauth_token", &redact(&self.oauth_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("username", &self.username)
            .field("channels", &self.channels)
            .field("command_prefix", &self.command_prefix)
            .field("ready_message", &self.ready_message)
            .field("capabilities", &self.capabilities)
            .field("recv_timeout", &self.recv_timeout)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "***" }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
