//! Positional, best-effort parsing of one inbound line.
//!
//! The parser anchors on the command word (the first word made only of
//! `A-Z` and `0-9`) instead of following a strict grammar: the prefix is the
//! word right before it and the tag block is the word two positions before
//! it. Optional segments may therefore be missing without breaking the
//! parse. Uppercase-only tags or prefixes can confuse the anchor; that is an
//! accepted limitation of the heuristic.

use std::collections::HashMap;

use super::tags::TagValue;
use crate::prefix::Origin;

/// A parsed inbound line. Never mutated after [`MessageEvent::parse`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageEvent {
    raw: String,
    tags: HashMap<String, TagValue>,
    prefix: String,
    command: String,
    params: Vec<String>,
    trailing: String,
    valid: bool,
}

impl MessageEvent {
    /// Parse one raw protocol line. Never fails; see [`MessageEvent::is_valid`].
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim();
        let words = split_words(line);

        let Some(cmd_index) = command_index(&words) else {
            return Self {
                raw: raw.to_owned(),
                ..Self::default()
            };
        };

        let prefix = parse_prefix(&words, cmd_index);
        let tags = parse_tags(&words, cmd_index);
        let command = words[cmd_index].1.to_owned();
        let (params, trailing) = parse_params(line, &words, cmd_index);

        let valid = !command.is_empty() && (!params.is_empty() || !trailing.is_empty());

        Self {
            raw: raw.to_owned(),
            tags,
            prefix,
            command,
            params,
            trailing,
            valid,
        }
    }

    /// The line exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Decoded tags keyed by their raw tag name.
    pub fn tags(&self) -> &HashMap<String, TagValue> {
        &self.tags
    }

    /// Look up a tag by its raw name (client marker included).
    pub fn tag(&self, raw_tag: &str) -> Option<&TagValue> {
        self.tags.get(raw_tag)
    }

    /// Message origin without the leading `:`; empty when absent.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The command word, e.g. `PRIVMSG` or `001`. Empty for unparseable lines.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Middle parameters followed by the trailing parameter, if any.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Text after the trailing `:` delimiter, internal spacing preserved.
    pub fn trailing(&self) -> &str {
        &self.trailing
    }

    /// `true` when a command was found and it carries at least one parameter
    /// or a non-empty trailing segment.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Parsed view of the prefix, `None` when the line had no prefix.
    pub fn origin(&self) -> Option<Origin<'_>> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(Origin::parse(&self.prefix))
        }
    }

    /// Nickname of the sending user, if the prefix names a user.
    pub fn nick(&self) -> Option<&str> {
        self.origin().and_then(|origin| origin.nick())
    }
}

/// Split on single spaces, dropping empty words, keeping each word's byte
/// offset into `line`.
fn split_words(line: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut offset = 0;
    for word in line.split(' ') {
        if !word.is_empty() {
            words.push((offset, word));
        }
        offset += word.len() + 1;
    }
    words
}

fn is_command_word(word: &str) -> bool {
    !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn command_index(words: &[(usize, &str)]) -> Option<usize> {
    words.iter().position(|(_, word)| is_command_word(word))
}

fn parse_prefix(words: &[(usize, &str)], cmd_index: usize) -> String {
    if cmd_index == 0 {
        return String::new();
    }
    let word = words[cmd_index - 1].1;
    word.strip_prefix(':').unwrap_or(word).to_owned()
}

fn parse_tags(words: &[(usize, &str)], cmd_index: usize) -> HashMap<String, TagValue> {
    if cmd_index < 2 {
        return HashMap::new();
    }
    let Some(block) = words[cmd_index - 2].1.strip_prefix('@') else {
        return HashMap::new();
    };

    block
        .split(';')
        .filter(|token| !token.is_empty())
        .map(TagValue::parse)
        .map(|tag| (tag.raw_tag().to_owned(), tag))
        .collect()
}

fn parse_params(line: &str, words: &[(usize, &str)], cmd_index: usize) -> (Vec<String>, String) {
    let mut params = Vec::new();
    for &(offset, word) in &words[cmd_index + 1..] {
        if word.starts_with(':') {
            let trailing = line[offset + 1..].to_owned();
            params.push(trailing.clone());
            return (params, trailing);
        }
        params.push(word.to_owned());
    }
    (params, String::new())
}
