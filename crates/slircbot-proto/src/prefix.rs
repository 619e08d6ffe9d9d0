//! Message origin (prefix) decoding.
//!
//! A prefix is either a server name or a `nick!user@host` mask. The parser is
//! lenient: it borrows from the prefix text and never validates characters.
//!
//! # Reference
//! - RFC 2812 Section 2.3.1: Message format

/// Borrowed view of a message prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin<'a> {
    /// A server name such as `irc.example.net`.
    Server(&'a str),
    /// A user mask; `user` and `host` are `None` when omitted.
    User {
        /// Nickname part.
        nick: &'a str,
        /// Username (ident) part, after `!`.
        user: Option<&'a str>,
        /// Hostname part, after `@`.
        host: Option<&'a str>,
    },
}

impl<'a> Origin<'a> {
    /// Split a prefix (without its leading `:`) into its parts.
    ///
    /// A name with a dot and no `!`/`@` is treated as a server.
    pub fn parse(prefix: &'a str) -> Self {
        let (rest, host) = match prefix.split_once('@') {
            Some((rest, host)) => (rest, Some(host)),
            None => (prefix, None),
        };
        let (nick, user) = match rest.split_once('!') {
            Some((nick, user)) => (nick, Some(user)),
            None => (rest, None),
        };

        if user.is_none() && host.is_none() && nick.contains('.') {
            Origin::Server(nick)
        } else {
            Origin::User { nick, user, host }
        }
    }

    /// Nickname, when the origin is a user with a non-empty nick.
    pub fn nick(&self) -> Option<&'a str> {
        match *self {
            Origin::User { nick, .. } if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// Hostname of a user origin, or the server name.
    pub fn host(&self) -> Option<&'a str> {
        match *self {
            Origin::Server(name) => Some(name),
            Origin::User { host, .. } => host,
        }
    }
}
