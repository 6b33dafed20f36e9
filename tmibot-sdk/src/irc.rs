//! Twitch IRC line parsing and formatting.
//!
//! Parsing is best-effort: fields that cannot be determined are left unset,
//! and no input line is ever rejected.

use std::collections::HashMap;

/// Server suffix carried by every user prefix on the Twitch gateway.
const USER_HOST_SUFFIX: &str = ".tmi.twitch.tv";
/// Bare server origin, e.g. `:tmi.twitch.tv 001 ...`.
const SERVER_HOST: &str = "tmi.twitch.tv";

/// One parsed IRC line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// The line as received, without the terminator.
    pub raw: String,
    /// IRCv3 tags (empty unless the line started with `@`).
    pub tags: HashMap<String, String>,
    /// Sender prefix without the leading `:`.
    pub prefix: Option<String>,
    /// Login name of the sender; `None` for server-origin lines.
    pub user: Option<String>,
    /// Channel name without the leading `#`.
    pub channel: Option<String>,
    /// e.g. `PRIVMSG`, `PING`, `CLEARCHAT`. Empty if the line had none.
    pub irc_command: String,
    /// Tokens between the command and the trailing text.
    pub irc_args: Vec<String>,
    /// Trailing payload (after the first `:`-prefixed token).
    pub text: Option<String>,
    /// First word of `text` with the command prefix stripped.
    pub text_command: Option<String>,
    /// Words of `text` after the command token.
    pub text_args: Vec<String>,
}

impl Message {
    /// Parse a single line (terminator already stripped).
    ///
    /// `command_prefix` decides whether the trailing text is a bot command:
    /// `text_command` is set iff `text` starts with it.
    pub fn parse(line: &str, command_prefix: &str) -> Self {
        let mut msg = Message {
            raw: line.to_string(),
            ..Default::default()
        };

        let mut tokens: Vec<&str> = line.split(' ').collect();
        let mut pos = 0;

        if let Some(tag_str) = tokens.first().and_then(|t| t.strip_prefix('@')) {
            msg.tags = parse_tags(tag_str);
            pos += 1;
        }

        if let Some(prefix) = tokens.get(pos).and_then(|t| t.strip_prefix(':')) {
            msg.user = user_from_prefix(prefix);
            msg.prefix = Some(prefix.to_string());
            pos += 1;
        }

        let rest = tokens.split_off(pos.min(tokens.len()));
        let text_start = rest.iter().position(|t| t.starts_with(':'));

        let args_region = match text_start {
            Some(idx) => {
                let mut text = rest[idx..].join(" ");
                text.remove(0);
                msg.text = Some(text);
                &rest[..idx]
            }
            None => &rest[..],
        };

        if let Some((command, args)) = args_region.split_first() {
            msg.irc_command = command.to_string();
            msg.irc_args = args.iter().map(|a| a.to_string()).collect();
        }

        if let Some(body) = msg
            .text
            .as_deref()
            .and_then(|t| t.strip_prefix(command_prefix))
        {
            let mut words = body.split_whitespace();
            let first = if body.starts_with(char::is_whitespace) {
                ""
            } else {
                words.next().unwrap_or("")
            };
            msg.text_command = Some(first.to_string());
            msg.text_args = words.map(str::to_string).collect();
        }

        msg.channel = msg
            .irc_args
            .iter()
            .find_map(|a| a.strip_prefix('#'))
            .map(str::to_string);

        msg
    }

    /// Look up a tag value (`None` if the tag is absent).
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// True when the sender is the given login (case-insensitive).
    pub fn is_from(&self, login: &str) -> bool {
        self.user
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(login))
    }
}

/// Derive the sender's login name from a prefix.
///
/// `alice!alice@alice.tmi.twitch.tv` yields `alice`; a bare `tmi.twitch.tv`
/// yields nothing; a prefix with no Twitch host at all is used verbatim.
pub fn user_from_prefix(prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }
    if let Some(head) = prefix.strip_suffix(USER_HOST_SUFFIX) {
        let login = head.rsplit('@').next().unwrap_or(head);
        if login.is_empty() {
            return None;
        }
        return Some(login.to_string());
    }
    if prefix.contains(SERVER_HOST) {
        return None;
    }
    Some(prefix.to_string())
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|kv| !kv.is_empty())
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k.to_string(), unescape_tag_value(v)),
            None => (kv.to_string(), String::new()),
        })
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Format one outbound line: `"{command} {args}\r\n"`.
pub fn format_line(command: &str, args: &str) -> String {
    format!("{command} {args}\r\n")
}

/// Strip a leading `#` or `@`, trim, and lower-case a channel name.
pub fn normalize_channel(name: &str) -> String {
    name.trim()
        .trim_start_matches(['#', '@'])
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privmsg_with_command() {
        let msg = Message::parse(
            ":alice!alice@alice.tmi.twitch.tv PRIVMSG #foo :!cmd arg1 arg2",
            "!",
        );
        assert_eq!(msg.prefix.as_deref(), Some("alice!alice@alice.tmi.twitch.tv"));
        assert_eq!(msg.user.as_deref(), Some("alice"));
        assert_eq!(msg.irc_command, "PRIVMSG");
        assert_eq!(msg.irc_args, vec!["#foo"]);
        assert_eq!(msg.channel.as_deref(), Some("foo"));
        assert_eq!(msg.text.as_deref(), Some("!cmd arg1 arg2"));
        assert_eq!(msg.text_command.as_deref(), Some("cmd"));
        assert_eq!(msg.text_args, vec!["arg1", "arg2"]);
    }

    #[test]
    fn bare_privmsg_without_prefix() {
        let msg = Message::parse("PRIVMSG #foo :!cmd arg1 arg2", "!");
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.user, None);
        assert_eq!(msg.irc_command, "PRIVMSG");
        assert_eq!(msg.channel.as_deref(), Some("foo"));
        assert_eq!(msg.text_command.as_deref(), Some("cmd"));
        assert_eq!(msg.text_args, vec!["arg1", "arg2"]);
    }

    #[test]
    fn ping_without_prefix() {
        let msg = Message::parse("PING :tmi.twitch.tv", "!");
        assert_eq!(msg.irc_command, "PING");
        assert!(msg.irc_args.is_empty());
        assert_eq!(msg.text.as_deref(), Some("tmi.twitch.tv"));
        assert_eq!(msg.text_command, None);
        assert_eq!(msg.channel, None);
    }

    #[test]
    fn server_origin_has_no_user() {
        let msg = Message::parse(":tmi.twitch.tv 001 bot :Welcome, GLHF!", "!");
        assert_eq!(msg.prefix.as_deref(), Some("tmi.twitch.tv"));
        assert_eq!(msg.user, None);
        assert_eq!(msg.irc_command, "001");
        assert_eq!(msg.irc_args, vec!["bot"]);
    }

    #[test]
    fn foreign_prefix_used_verbatim() {
        assert_eq!(user_from_prefix("someone").as_deref(), Some("someone"));
        assert_eq!(
            user_from_prefix("nick!user@irc.example.org").as_deref(),
            Some("nick!user@irc.example.org")
        );
        assert_eq!(user_from_prefix("bob.tmi.twitch.tv").as_deref(), Some("bob"));
        assert_eq!(user_from_prefix("tmi.twitch.tv"), None);
    }

    #[test]
    fn no_trailing_text() {
        let msg = Message::parse(":bob!bob@bob.tmi.twitch.tv JOIN #chan", "!");
        assert_eq!(msg.irc_command, "JOIN");
        assert_eq!(msg.channel.as_deref(), Some("chan"));
        assert_eq!(msg.text, None);
        assert_eq!(msg.text_command, None);
        assert!(msg.text_args.is_empty());
    }

    #[test]
    fn trailing_colons_preserved() {
        let msg = Message::parse(
            ":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :time is 12:30 :) ok",
            "!",
        );
        assert_eq!(msg.text.as_deref(), Some("time is 12:30 :) ok"));
        assert_eq!(msg.text_command, None);
    }

    #[test]
    fn text_not_starting_with_prefix() {
        let msg = Message::parse(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :hi !cmd", "!");
        assert_eq!(msg.text_command, None);
        assert!(msg.text_args.is_empty());
    }

    #[test]
    fn multi_char_prefix() {
        let msg = Message::parse(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :?? roll 2d6", "??");
        assert_eq!(msg.text_command.as_deref(), Some(""));
        assert_eq!(msg.text_args, vec!["roll", "2d6"]);

        let msg = Message::parse(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :??roll 2d6", "??");
        assert_eq!(msg.text_command.as_deref(), Some("roll"));
        assert_eq!(msg.text_args, vec!["2d6"]);
    }

    #[test]
    fn clearchat_and_clearmsg() {
        let msg = Message::parse(":tmi.twitch.tv CLEARCHAT #dallas :ronni", "!");
        assert_eq!(msg.irc_command, "CLEARCHAT");
        assert_eq!(msg.user, None);
        assert_eq!(msg.channel.as_deref(), Some("dallas"));
        assert_eq!(msg.text.as_deref(), Some("ronni"));

        let msg = Message::parse(":tmi.twitch.tv CLEARCHAT #dallas", "!");
        assert_eq!(msg.channel.as_deref(), Some("dallas"));
        assert_eq!(msg.text, None);
    }

    #[test]
    fn tags_are_parsed_and_unescaped() {
        let msg = Message::parse(
            "@badge-info=;color=#0D4200;display-name=Ronni;id=b34ccfc7;system-msg=hello\\sthere\\:x :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #dallas :!hi",
            "!",
        );
        assert_eq!(msg.tag("color"), Some("#0D4200"));
        assert_eq!(msg.tag("badge-info"), Some(""));
        assert_eq!(msg.tag("system-msg"), Some("hello there;x"));
        assert_eq!(msg.user.as_deref(), Some("ronni"));
        assert_eq!(msg.irc_command, "PRIVMSG");
        assert_eq!(msg.channel.as_deref(), Some("dallas"));
        assert_eq!(msg.text_command.as_deref(), Some("hi"));
    }

    #[test]
    fn repeated_spaces_are_lossy() {
        let msg = Message::parse("PRIVMSG #chan :a  b", "!");
        assert_eq!(msg.text.as_deref(), Some("a  b"));

        let msg = Message::parse("PRIVMSG  #chan :x", "!");
        assert_eq!(msg.irc_command, "PRIVMSG");
        assert_eq!(msg.irc_args, vec!["", "#chan"]);
        assert_eq!(msg.channel.as_deref(), Some("chan"));
    }

    #[test]
    fn garbage_never_panics() {
        for line in ["", " ", ":", "::", "@", "@;", ":prefix", ":prefix :text", "#", "\\"] {
            let msg = Message::parse(line, "!");
            assert_eq!(msg.raw, line);
        }
        let msg = Message::parse(":prefix :only text", "!");
        assert_eq!(msg.irc_command, "");
        assert_eq!(msg.text.as_deref(), Some("only text"));
    }

    #[test]
    fn format_and_normalize() {
        assert_eq!(format_line("JOIN", "#foo"), "JOIN #foo\r\n");
        assert_eq!(normalize_channel(" #Foo "), "foo");
        assert_eq!(normalize_channel("@Bar"), "bar");
    }
}
