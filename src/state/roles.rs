//! Channel membership roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A member's standing in a channel, ordered from least to most privileged.
///
/// Used both for a user's actual role and for a channel's configured minimum
/// role for module commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Member,
    Voice,
    #[serde(alias = "halfop")]
    Moderator,
    #[serde(alias = "op")]
    Operator,
    Admin,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown channel role: {0}")]
pub struct ParseRoleError(pub String);

impl ChannelRole {
    /// Role granted by a NAMES/WHO prefix character (`~ & @ % +`).
    pub fn from_prefix_char(c: char) -> Option<Self> {
        match c {
            '~' => Some(Self::Owner),
            '&' => Some(Self::Admin),
            '@' => Some(Self::Operator),
            '%' => Some(Self::Moderator),
            '+' => Some(Self::Voice),
            _ => None,
        }
    }

    /// Role granted by a channel mode letter (`q a o h v`).
    pub fn from_mode_char(c: char) -> Option<Self> {
        match c {
            'q' => Some(Self::Owner),
            'a' => Some(Self::Admin),
            'o' => Some(Self::Operator),
            'h' => Some(Self::Moderator),
            'v' => Some(Self::Voice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Voice => "voice",
            Self::Moderator => "moderator",
            Self::Operator => "operator",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "voice" => Ok(Self::Voice),
            "moderator" | "halfop" => Ok(Self::Moderator),
            "operator" | "op" => Ok(Self::Operator),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::from_prefix_char(c)
                        .or_else(|| Self::from_mode_char(c))
                        .ok_or_else(|| ParseRoleError(s.to_owned())),
                    _ => Err(ParseRoleError(s.to_owned())),
                }
            }
        }
    }
}

/// Member modes (owner, admin, op, halfop, voice) held in one channel.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemberModes {
    pub owner: bool,  // +q (~)
    pub admin: bool,  // +a (&)
    pub op: bool,     // +o (@)
    pub halfop: bool, // +h (%)
    pub voice: bool,  // +v (+)
}

impl MemberModes {
    /// Split NAMES-style prefix characters off a nick, e.g. `@+alice`.
    pub fn from_prefixed(entry: &str) -> (Self, &str) {
        let mut modes = Self::default();
        let nick = entry.trim_start_matches(|c: char| match ChannelRole::from_prefix_char(c) {
            Some(role) => {
                modes.set(role, true);
                true
            }
            None => false,
        });
        (modes, nick)
    }

    /// Grant or revoke a role. `Member` is implied and cannot be toggled.
    pub fn set(&mut self, role: ChannelRole, enabled: bool) {
        match role {
            ChannelRole::Owner => self.owner = enabled,
            ChannelRole::Admin => self.admin = enabled,
            ChannelRole::Operator => self.op = enabled,
            ChannelRole::Moderator => self.halfop = enabled,
            ChannelRole::Voice => self.voice = enabled,
            ChannelRole::Member => {}
        }
    }

    /// Highest role held. Priority: ~ > & > @ > % > + > member
    pub fn highest_role(&self) -> ChannelRole {
        if self.owner {
            ChannelRole::Owner
        } else if self.admin {
            ChannelRole::Admin
        } else if self.op {
            ChannelRole::Operator
        } else if self.halfop {
            ChannelRole::Moderator
        } else if self.voice {
            ChannelRole::Voice
        } else {
            ChannelRole::Member
        }
    }

    /// Get the highest prefix character for this member.
    pub fn prefix_char(&self) -> Option<char> {
        match self.highest_role() {
            ChannelRole::Owner => Some('~'),
            ChannelRole::Admin => Some('&'),
            ChannelRole::Operator => Some('@'),
            ChannelRole::Moderator => Some('%'),
            ChannelRole::Voice => Some('+'),
            ChannelRole::Member => None,
        }
    }
}
