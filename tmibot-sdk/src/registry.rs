//! Named callback buckets with deferred removal.
//!
//! Each bucket is an insertion-ordered map from name to callback. Removal is
//! two-phase: [`Bucket::schedule_removal`] queues a name and
//! [`Bucket::flush`] applies the queue. The dispatcher iterates a
//! [`Bucket::snapshot`] and flushes only after the whole pass, so a callback
//! removed mid-pass (even by itself) still runs for the current event.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::bot::Bot;
use crate::irc::Message;

/// Future returned by every callback.
pub type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A registered callback taking the bucket-specific argument `A`.
pub type Callback<A> = Arc<dyn Fn(Bot, A) -> BoxFuture + Send + Sync>;

/// `(channel, text)` passed to clear-chat and delete-message hooks.
pub type ChannelText = (String, String);

/// Box an async closure into a [`Callback`].
pub fn callback<A, F, Fut>(f: F) -> Callback<A>
where
    F: Fn(Bot, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |bot, arg| Box::pin(f(bot, arg)))
}

/// Identifies one of the twelve buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    BeforeJoinChannel,
    AfterJoinChannel,
    BeforeLeaveChannel,
    AfterLeaveChannel,
    Check,
    Listener,
    Command,
    BeforeCommand,
    AfterCommand,
    AfterClearChat,
    AfterDeleteMessage,
    AfterBotConnected,
}

impl BucketKind {
    pub const ALL: [BucketKind; 12] = [
        BucketKind::BeforeJoinChannel,
        BucketKind::AfterJoinChannel,
        BucketKind::BeforeLeaveChannel,
        BucketKind::AfterLeaveChannel,
        BucketKind::Check,
        BucketKind::Listener,
        BucketKind::Command,
        BucketKind::BeforeCommand,
        BucketKind::AfterCommand,
        BucketKind::AfterClearChat,
        BucketKind::AfterDeleteMessage,
        BucketKind::AfterBotConnected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::BeforeJoinChannel => "before-join-channel",
            BucketKind::AfterJoinChannel => "after-join-channel",
            BucketKind::BeforeLeaveChannel => "before-leave-channel",
            BucketKind::AfterLeaveChannel => "after-leave-channel",
            BucketKind::Check => "check",
            BucketKind::Listener => "listener",
            BucketKind::Command => "command",
            BucketKind::BeforeCommand => "before-command",
            BucketKind::AfterCommand => "after-command",
            BucketKind::AfterClearChat => "after-clear-chat",
            BucketKind::AfterDeleteMessage => "after-delete-message",
            BucketKind::AfterBotConnected => "after-bot-connected",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion-ordered name → callback map plus its pending-removal queue.
pub struct Bucket<A> {
    kind: BucketKind,
    entries: Vec<(String, Callback<A>)>,
    pending: Vec<String>,
}

impl<A> Bucket<A> {
    pub fn new(kind: BucketKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    /// Insert or overwrite. An overwritten entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, cb: Callback<A>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = cb,
            None => self.entries.push((name, cb)),
        }
    }

    /// Queue a name for removal at the next [`flush`](Self::flush).
    ///
    /// Unknown names are accepted; they are ignored at flush time.
    pub fn schedule_removal(&mut self, name: impl Into<String>) {
        self.pending.push(name.into());
    }

    /// Apply queued removals. Returns how many entries were dropped.
    pub fn flush(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.pending);
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !pending.contains(n));
        before - self.entries.len()
    }

    /// Clone the current entries, in insertion order, for one dispatch pass.
    pub fn snapshot(&self) -> Vec<(String, Callback<A>)> {
        self.entries.clone()
    }

    pub fn get(&self, name: &str) -> Option<Callback<A>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cb)| cb.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A> fmt::Debug for Bucket<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .field("pending", &self.pending)
            .finish()
    }
}

/// All twelve buckets of one bot.
#[derive(Debug)]
pub struct Registry {
    pub before_join_channel: Bucket<String>,
    pub after_join_channel: Bucket<String>,
    pub before_leave_channel: Bucket<String>,
    pub after_leave_channel: Bucket<String>,
    pub checks: Bucket<()>,
    pub listeners: Bucket<Message>,
    pub commands: Bucket<Message>,
    pub before_command: Bucket<Message>,
    pub after_command: Bucket<Message>,
    pub after_clear_chat: Bucket<ChannelText>,
    pub after_delete_message: Bucket<ChannelText>,
    pub after_bot_connected: Bucket<()>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            before_join_channel: Bucket::new(BucketKind::BeforeJoinChannel),
            after_join_channel: Bucket::new(BucketKind::AfterJoinChannel),
            before_leave_channel: Bucket::new(BucketKind::BeforeLeaveChannel),
            after_leave_channel: Bucket::new(BucketKind::AfterLeaveChannel),
            checks: Bucket::new(BucketKind::Check),
            listeners: Bucket::new(BucketKind::Listener),
            commands: Bucket::new(BucketKind::Command),
            before_command: Bucket::new(BucketKind::BeforeCommand),
            after_command: Bucket::new(BucketKind::AfterCommand),
            after_clear_chat: Bucket::new(BucketKind::AfterClearChat),
            after_delete_message: Bucket::new(BucketKind::AfterDeleteMessage),
            after_bot_connected: Bucket::new(BucketKind::AfterBotConnected),
        }
    }
}

impl Registry {
    /// Names registered in a bucket, in insertion order.
    pub fn names(&self, kind: BucketKind) -> Vec<String> {
        match kind {
            BucketKind::BeforeJoinChannel => self.before_join_channel.names(),
            BucketKind::AfterJoinChannel => self.after_join_channel.names(),
            BucketKind::BeforeLeaveChannel => self.before_leave_channel.names(),
            BucketKind::AfterLeaveChannel => self.after_leave_channel.names(),
            BucketKind::Check => self.checks.names(),
            BucketKind::Listener => self.listeners.names(),
            BucketKind::Command => self.commands.names(),
            BucketKind::BeforeCommand => self.before_command.names(),
            BucketKind::AfterCommand => self.after_command.names(),
            BucketKind::AfterClearChat => self.after_clear_chat.names(),
            BucketKind::AfterDeleteMessage => self.after_delete_message.names(),
            BucketKind::AfterBotConnected => self.after_bot_connected.names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop<A: Send + 'static>() -> Callback<A> {
        callback(|_bot, _arg: A| async { Ok::<_, anyhow::Error>(()) })
    }

    #[test]
    fn insert_keeps_order_and_overwrites_in_place() {
        let mut bucket: Bucket<()> = Bucket::new(BucketKind::Check);
        bucket.insert("a", noop());
        bucket.insert("b", noop());
        bucket.insert("c", noop());
        bucket.insert("a", noop());
        assert_eq!(bucket.names(), vec!["a", "b", "c"]);
        assert_eq!(bucket.len(), 3);
    }

    #[test]
    fn removal_is_deferred_until_flush() {
        let mut bucket: Bucket<()> = Bucket::new(BucketKind::Check);
        bucket.insert("a", noop());
        bucket.insert("b", noop());

        bucket.schedule_removal("a");
        assert!(bucket.contains("a"));
        assert_eq!(bucket.pending(), ["a".to_string()]);

        assert_eq!(bucket.flush(), 1);
        assert!(!bucket.contains("a"));
        assert!(bucket.pending().is_empty());
        assert_eq!(bucket.names(), vec!["b"]);
    }

    #[test]
    fn double_removal_is_idempotent() {
        let mut bucket: Bucket<Message> = Bucket::new(BucketKind::Command);
        bucket.insert("hello", noop());
        bucket.schedule_removal("hello");
        bucket.schedule_removal("hello");
        assert_eq!(bucket.flush(), 1);
        assert!(bucket.is_empty());
        assert_eq!(bucket.flush(), 0);
    }

    #[test]
    fn removing_unknown_name_is_harmless() {
        let mut bucket: Bucket<String> = Bucket::new(BucketKind::AfterJoinChannel);
        bucket.insert("greet", noop());
        bucket.schedule_removal("nope");
        assert_eq!(bucket.flush(), 0);
        assert_eq!(bucket.names(), vec!["greet"]);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let mut bucket: Bucket<()> = Bucket::new(BucketKind::Check);
        bucket.insert("a", noop());
        let snap = bucket.snapshot();
        bucket.insert("b", noop());
        bucket.schedule_removal("a");
        bucket.flush();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "a");
        assert_eq!(bucket.names(), vec!["b"]);
    }

    #[test]
    fn re_adding_after_scheduled_removal_still_removes() {
        let mut bucket: Bucket<()> = Bucket::new(BucketKind::Check);
        bucket.insert("a", noop());
        bucket.schedule_removal("a");
        bucket.insert("a", noop());
        bucket.flush();
        assert!(!bucket.contains("a"));
    }

    #[test]
    fn registry_names_by_kind() {
        let mut registry = Registry::default();
        registry.listeners.insert("log", noop());
        registry.commands.insert("ping", noop());
        assert_eq!(registry.names(BucketKind::Listener), vec!["log"]);
        assert_eq!(registry.names(BucketKind::Command), vec!["ping"]);
        for kind in BucketKind::ALL {
            if !matches!(kind, BucketKind::Listener | BucketKind::Command) {
                assert!(registry.names(kind).is_empty(), "{kind} should be empty");
            }
        }
    }
}
