//! Chat slash-commands.
//!
//! Each helper sends `PRIVMSG #<channel> :/<command> <args>`; the gateway
//! interprets the slash-command, the client never does.

use crate::bot::Bot;
use crate::error::Result;

/// Build the text payload of a slash-command.
pub fn slash(command: &str, args: &[&str]) -> String {
    let mut text = format!("/{command}");
    for arg in args.iter().filter(|a| !a.is_empty()) {
        text.push(' ');
        text.push_str(arg);
    }
    text
}

impl Bot {
    async fn slash(&self, channel: &str, command: &str, args: &[&str]) -> Result<()> {
        self.send(channel, &slash(command, args)).await
    }

    pub async fn me(&self, channel: &str, text: &str) -> Result<()> {
        self.slash(channel, "me", &[text]).await
    }

    pub async fn announce(&self, channel: &str, text: &str) -> Result<()> {
        self.slash(channel, "announce", &[text]).await
    }

    pub async fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> Result<()> {
        self.slash(channel, "ban", &[user, reason.unwrap_or_default()])
            .await
    }

    pub async fn unban(&self, channel: &str, user: &str) -> Result<()> {
        self.slash(channel, "unban", &[user]).await
    }

    /// Time a user out for `seconds`.
    pub async fn timeout(
        &self,
        channel: &str,
        user: &str,
        seconds: u64,
        reason: Option<&str>,
    ) -> Result<()> {
        let secs = seconds.to_string();
        self.slash(channel, "timeout", &[user, &secs, reason.unwrap_or_default()])
            .await
    }

    pub async fn untimeout(&self, channel: &str, user: &str) -> Result<()> {
        self.slash(channel, "untimeout", &[user]).await
    }

    pub async fn clear(&self, channel: &str) -> Result<()> {
        self.slash(channel, "clear", &[]).await
    }

    /// Delete one message by its `id` tag.
    pub async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()> {
        self.slash(channel, "delete", &[message_id]).await
    }

    pub async fn slow(&self, channel: &str, seconds: u64) -> Result<()> {
        let secs = seconds.to_string();
        self.slash(channel, "slow", &[&secs]).await
    }

    pub async fn slow_off(&self, channel: &str) -> Result<()> {
        self.slash(channel, "slowoff", &[]).await
    }

    /// Followers-only mode; `minutes` is the minimum follow age.
    pub async fn followers_only(&self, channel: &str, minutes: Option<u64>) -> Result<()> {
        let age = minutes.map(|m| format!("{m}m")).unwrap_or_default();
        self.slash(channel, "followers", &[&age]).await
    }

    pub async fn followers_only_off(&self, channel: &str) -> Result<()> {
        self.slash(channel, "followersoff", &[]).await
    }

    pub async fn subscribers_only(&self, channel: &str) -> Result<()> {
        self.slash(channel, "subscribers", &[]).await
    }

    pub async fn subscribers_only_off(&self, channel: &str) -> Result<()> {
        self.slash(channel, "subscribersoff", &[]).await
    }

    pub async fn emote_only(&self, channel: &str) -> Result<()> {
        self.slash(channel, "emoteonly", &[]).await
    }

    pub async fn emote_only_off(&self, channel: &str) -> Result<()> {
        self.slash(channel, "emoteonlyoff", &[]).await
    }

    pub async fn mod_user(&self, channel: &str, user: &str) -> Result<()> {
        self.slash(channel, "mod", &[user]).await
    }

    pub async fn unmod_user(&self, channel: &str, user: &str) -> Result<()> {
        self.slash(channel, "unmod", &[user]).await
    }

    pub async fn vip(&self, channel: &str, user: &str) -> Result<()> {
        self.slash(channel, "vip", &[user]).await
    }

    pub async fn unvip(&self, channel: &str, user: &str) -> Result<()> {
        self.slash(channel, "unvip", &[user]).await
    }

    pub async fn raid(&self, channel: &str, target: &str) -> Result<()> {
        self.slash(channel, "raid", &[target]).await
    }

    pub async fn unraid(&self, channel: &str) -> Result<()> {
        self.slash(channel, "unraid", &[]).await
    }

    /// Change the bot's name color (named color or `#RRGGBB`).
    pub async fn color(&self, channel: &str, color: &str) -> Result<()> {
        self.slash(channel, "color", &[color]).await
    }

    /// Run a commercial of `seconds` length.
    pub async fn commercial(&self, channel: &str, seconds: Option<u64>) -> Result<()> {
        let secs = seconds.map(|s| s.to_string()).unwrap_or_default();
        self.slash(channel, "commercial", &[&secs]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_formatting() {
        assert_eq!(slash("clear", &[]), "/clear");
        assert_eq!(slash("ban", &["troll", ""]), "/ban troll");
        assert_eq!(
            slash("timeout", &["troll", "600", "spam links"]),
            "/timeout troll 600 spam links"
        );
        assert_eq!(slash("followers", &["10m"]), "/followers 10m");
    }
}
