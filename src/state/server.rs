//! Live server state shared read-only with modules.

use super::roles::{ChannelRole, MemberModes};
use serde::Serialize;
use slircbot_proto::irc_to_lower;
use std::collections::HashMap;

/// The bot's own identity on the network.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BotIdentity {
    pub nick: String,
    pub ident: String,
    pub realname: String,
}

/// A user the bot shares at least one channel with.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserInfo {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
    /// Membership keyed by case-folded channel name.
    pub channels: HashMap<String, MemberModes>,
}

/// A channel the bot is in.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: Option<String>,
}

/// Snapshot of everything the bot knows about its connection.
///
/// Modules only ever see this through an `Arc`; the tracker replaces it
/// copy-on-write, so a snapshot handed out is never mutated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerState {
    /// Connection password. Never serialized to sandboxed modules.
    #[serde(skip_serializing)]
    pub pass: Option<String>,
    pub identity: BotIdentity,
    /// Set once RPL_WELCOME is received.
    pub registered: bool,
    /// Keyed by case-folded nickname.
    pub users: HashMap<String, UserInfo>,
    /// Keyed by case-folded channel name.
    pub channels: HashMap<String, ChannelInfo>,
    /// Minimum role required to trigger module commands, keyed by
    /// case-folded channel name.
    pub channel_restrictions: HashMap<String, ChannelRole>,
}

impl ServerState {
    pub fn new(
        identity: BotIdentity,
        pass: Option<String>,
        restrictions: impl IntoIterator<Item = (String, ChannelRole)>,
    ) -> Self {
        Self {
            pass,
            identity,
            channel_restrictions: restrictions
                .into_iter()
                .map(|(channel, role)| (irc_to_lower(&channel), role))
                .collect(),
            ..Self::default()
        }
    }

    pub fn user(&self, nick: &str) -> Option<&UserInfo> {
        self.users.get(&irc_to_lower(nick))
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelInfo> {
        self.channels.get(&irc_to_lower(name))
    }

    /// Highest role `nick` holds in `channel`; `None` if not known to be a
    /// member.
    pub fn role_in(&self, nick: &str, channel: &str) -> Option<ChannelRole> {
        self.user(nick)?
            .channels
            .get(&irc_to_lower(channel))
            .map(MemberModes::highest_role)
    }

    /// Minimum role configured for module commands in `channel`.
    pub fn restriction(&self, channel: &str) -> Option<ChannelRole> {
        self.channel_restrictions
            .get(&irc_to_lower(channel))
            .copied()
    }

    pub fn is_me(&self, nick: &str) -> bool {
        slircbot_proto::irc_eq(nick, &self.identity.nick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_lookup_is_case_insensitive() {
        let state = ServerState::new(
            BotIdentity::default(),
            None,
            [("#Ops".to_owned(), ChannelRole::Moderator)],
        );
        assert_eq!(state.restriction("#ops"), Some(ChannelRole::Moderator));
        assert_eq!(state.restriction("#OPS"), Some(ChannelRole::Moderator));
        assert_eq!(state.restriction("#lobby"), None);
    }

    #[test]
    fn password_is_not_serialized() {
        let state = ServerState {
            pass: Some("hunter2".into()),
            ..ServerState::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
