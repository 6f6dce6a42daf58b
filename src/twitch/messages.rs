//! IRC line parsing and the webhook payload shape.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Payload forwarded to the automation webhook for every inbound chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub channel: String,
    pub username: String,
    pub display_name: String,
    pub message: String,
    /// Captured at receipt time, UTC.
    pub timestamp: DateTime<Utc>,
    pub badges: HashMap<String, String>,
    pub is_mod: bool,
    pub is_subscriber: bool,
    pub is_broadcaster: bool,
}

/// A chat message parsed from a raw IRC `PRIVMSG` line.
#[derive(Debug, Clone)]
pub struct PrivMsg {
    pub channel: String,
    pub username: String,
    pub display_name: Option<String>,
    pub text: String,
    pub badges: HashMap<String, String>,
    pub is_mod: bool,
    pub is_subscriber: bool,
}

impl PrivMsg {
    /// Builds the webhook payload, stamping the receipt time.
    ///
    /// `is_broadcaster` is derived from the badge map rather than a dedicated
    /// IRC tag; Twitch only signals broadcaster status through badges.
    pub fn into_chat_message(self) -> ChatMessage {
        let is_broadcaster = self.badges.contains_key("broadcaster");
        let display_name = self
            .display_name
            .unwrap_or_else(|| self.username.clone());

        ChatMessage {
            channel: self.channel,
            username: self.username,
            display_name,
            message: self.text,
            timestamp: Utc::now(),
            badges: self.badges,
            is_mod: self.is_mod,
            is_subscriber: self.is_subscriber,
            is_broadcaster,
        }
    }
}

/// Parses a `PRIVMSG` IRC line into a [`PrivMsg`].
///
/// Format: `@tags :user!user@user.tmi.twitch.tv PRIVMSG #channel :message`.
/// Returns `None` for any other line type.
pub fn parse_privmsg(line: &str) -> Option<PrivMsg> {
    if !line.contains("PRIVMSG") {
        return None;
    }

    let mut tags_str = "";
    let mut rest = line;

    if line.starts_with('@') {
        let (tags, remainder) = line.split_once(' ')?;
        tags_str = tags;
        rest = remainder;
    }

    let username = rest.split('!').next()?.trim_start_matches(':').to_string();
    if username.is_empty() {
        return None;
    }

    let privmsg_idx = rest.find("PRIVMSG")?;
    let after_privmsg = &rest[privmsg_idx + 7..];
    let channel = after_privmsg
        .split_whitespace()
        .next()?
        .trim_start_matches('#')
        .to_string();
    let msg_start = after_privmsg.find(':')?;
    let text = after_privmsg[msg_start + 1..]
        .trim_end_matches(['\r', '\n'])
        .to_string();

    let mut display_name = None;
    let mut badges = HashMap::new();
    let mut is_mod = false;
    let mut is_subscriber = false;

    for tag in tags_str.trim_start_matches('@').split(';') {
        let Some((key, value)) = tag.split_once('=') else {
            continue;
        };
        match key {
            "display-name" if !value.is_empty() => {
                display_name = Some(unescape_tag_value(value));
            }
            "badges" => {
                badges = parse_badges(value);
            }
            "mod" => {
                is_mod = value == "1";
            }
            "subscriber" => {
                is_subscriber = value == "1";
            }
            _ => {}
        }
    }

    // Badges carry the same signals and win when the flat tags are absent
    if badges.contains_key("moderator") {
        is_mod = true;
    }
    if badges.contains_key("subscriber") {
        is_subscriber = true;
    }

    Some(PrivMsg {
        channel,
        username,
        display_name,
        text,
        badges,
        is_mod,
        is_subscriber,
    })
}

/// Parses a badge tag value like `broadcaster/1,subscriber/12` into a map.
/// Malformed or missing badge data yields an empty map, never an error.
pub fn parse_badges(raw: &str) -> HashMap<String, String> {
    let mut badges = HashMap::new();
    for entry in raw.split(',') {
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.splitn(2, '/');
        let name = match parts.next() {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };
        let version = parts.next().unwrap_or("");
        badges.insert(name.to_string(), version.to_string());
    }
    badges
}

/// Unescapes an IRCv3 tag value (`\s`, `\:`, `\r`, `\n`, `\\`).
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGGED_LINE: &str = "@badge-info=;badges=broadcaster/1,subscriber/12;color=#FF0000;display-name=StreamerGal;mod=0;subscriber=1 :streamergal!streamergal@streamergal.tmi.twitch.tv PRIVMSG #somechannel :hello chat";

    #[test]
    fn test_parse_privmsg_with_tags() {
        let msg = parse_privmsg(TAGGED_LINE).unwrap();
        assert_eq!(msg.channel, "somechannel");
        assert_eq!(msg.username, "streamergal");
        assert_eq!(msg.display_name.as_deref(), Some("StreamerGal"));
        assert_eq!(msg.text, "hello chat");
        assert_eq!(msg.badges.get("broadcaster").map(String::as_str), Some("1"));
        assert_eq!(msg.badges.get("subscriber").map(String::as_str), Some("12"));
        assert!(msg.is_subscriber);
        assert!(!msg.is_mod);
    }

    #[test]
    fn test_parse_privmsg_without_tags() {
        let line = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechannel :plain message";
        let msg = parse_privmsg(line).unwrap();
        assert_eq!(msg.username, "viewer");
        assert_eq!(msg.text, "plain message");
        assert!(msg.display_name.is_none());
        assert!(msg.badges.is_empty());
        assert!(!msg.is_mod);
        assert!(!msg.is_subscriber);
    }

    #[test]
    fn test_parse_privmsg_moderator_badge_implies_mod() {
        let line = "@badges=moderator/1;mod=0 :helper!helper@helper.tmi.twitch.tv PRIVMSG #somechannel :hi";
        let msg = parse_privmsg(line).unwrap();
        assert!(msg.is_mod);
    }

    #[test]
    fn test_parse_privmsg_ignores_other_lines() {
        assert!(parse_privmsg("PING :tmi.twitch.tv").is_none());
        assert!(parse_privmsg(":tmi.twitch.tv 001 relaybot :Welcome, GLHF!").is_none());
        assert!(parse_privmsg(":relaybot!relaybot@relaybot.tmi.twitch.tv JOIN #somechannel").is_none());
    }

    #[test]
    fn test_parse_privmsg_message_with_colons() {
        let line = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechannel :look: a colon";
        let msg = parse_privmsg(line).unwrap();
        assert_eq!(msg.text, "look: a colon");
    }

    #[test]
    fn test_parse_badges_empty_value() {
        assert!(parse_badges("").is_empty());
    }

    #[test]
    fn test_parse_badges_malformed_entries() {
        let badges = parse_badges(",/3,vip/1,");
        assert_eq!(badges.len(), 1);
        assert_eq!(badges.get("vip").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_badges_missing_version() {
        let badges = parse_badges("premium");
        assert_eq!(badges.get("premium").map(String::as_str), Some(""));
    }

    #[test]
    fn test_unescape_tag_value() {
        assert_eq!(unescape_tag_value(r"hello\sworld"), "hello world");
        assert_eq!(unescape_tag_value(r"a\:b"), "a;b");
        assert_eq!(unescape_tag_value(r"back\\slash"), r"back\slash");
        assert_eq!(unescape_tag_value("plain"), "plain");
    }

    #[test]
    fn test_into_chat_message_broadcaster_from_badge() {
        let msg = parse_privmsg(TAGGED_LINE).unwrap();
        let payload = msg.into_chat_message();
        assert!(payload.is_broadcaster);
        assert_eq!(payload.display_name, "StreamerGal");
        assert_eq!(payload.message, "hello chat");
    }

    #[test]
    fn test_into_chat_message_no_broadcaster_badge() {
        let line = "@badges=subscriber/3 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechannel :hi";
        let payload = parse_privmsg(line).unwrap().into_chat_message();
        assert!(!payload.is_broadcaster);
        // display name falls back to the login name
        assert_eq!(payload.display_name, "viewer");
    }

    #[test]
    fn test_chat_message_serializes_expected_keys() {
        let line = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechannel :hi";
        let payload = parse_privmsg(line).unwrap().into_chat_message();
        let value = serde_json::to_value(&payload).unwrap();
        for key in [
            "channel",
            "username",
            "display_name",
            "message",
            "timestamp",
            "badges",
            "is_mod",
            "is_subscriber",
            "is_broadcaster",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
    }
}
