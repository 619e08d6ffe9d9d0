//! Keeps [`ServerState`] in step with inbound traffic.
//!
//! The tracker is the only writer of server state. Each update clones the
//! state if a module still holds the previous snapshot (`Arc::make_mut`).

use super::roles::{ChannelRole, MemberModes};
use super::server::{ChannelInfo, ServerState, UserInfo};
use slircbot_proto::{irc_to_lower, ChannelExt, MessageEvent, Origin};
use std::sync::Arc;
use tracing::trace;

/// Channel mode letters that always consume an argument, besides the
/// role letters.
const MODES_WITH_ARG: &str = "beIk";

pub struct StateTracker {
    state: Arc<ServerState>,
}

impl StateTracker {
    pub fn new(state: ServerState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Current state. Cheap; the snapshot never changes underneath the caller.
    pub fn snapshot(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Apply one inbound event.
    pub fn observe(&mut self, event: &MessageEvent) {
        if !event.is_valid() {
            return;
        }

        match event.command() {
            "001" => self.on_welcome(event),
            "NICK" => self.on_nick(event),
            "JOIN" => self.on_join(event),
            "PART" => {
                if let (Some(nick), Some(channel)) = (event.nick(), event.param(0)) {
                    self.leave(nick, channel);
                }
            }
            "KICK" => {
                if let (Some(channel), Some(target)) = (event.param(0), event.param(1)) {
                    self.leave(target, channel);
                }
            }
            "QUIT" => self.on_quit(event),
            "MODE" => self.on_mode(event),
            "TOPIC" => {
                if let Some(channel) = event.param(0) {
                    self.set_topic(channel, event.param(1));
                }
            }
            // RPL_TOPIC: <me> <channel> :<topic>
            "332" => {
                if let Some(channel) = event.param(1) {
                    self.set_topic(channel, event.param(2));
                }
            }
            // RPL_NAMREPLY: <me> <symbol> <channel> :<names>
            "353" => self.on_names(event),
            _ => {}
        }
    }

    fn on_welcome(&mut self, event: &MessageEvent) {
        let state = Arc::make_mut(&mut self.state);
        state.registered = true;
        if let Some(nick) = event.param(0) {
            state.identity.nick = nick.to_owned();
        }
    }

    fn on_nick(&mut self, event: &MessageEvent) {
        let (Some(old), Some(new)) = (event.nick(), event.param(0)) else {
            return;
        };
        let state = Arc::make_mut(&mut self.state);
        if state.is_me(old) {
            state.identity.nick = new.to_owned();
        }
        if let Some(mut user) = state.users.remove(&irc_to_lower(old)) {
            user.nick = new.to_owned();
            state.users.insert(irc_to_lower(new), user);
        }
    }

    fn on_join(&mut self, event: &MessageEvent) {
        let (Some(origin), Some(channel)) = (event.origin(), event.param(0)) else {
            return;
        };
        let Origin::User { nick, user, host } = origin else {
            return;
        };
        let key = irc_to_lower(channel);
        let state = Arc::make_mut(&mut self.state);

        if state.is_me(nick) {
            state.channels.insert(
                key.clone(),
                ChannelInfo {
                    name: channel.to_owned(),
                    topic: None,
                },
            );
        }

        let entry = state
            .users
            .entry(irc_to_lower(nick))
            .or_insert_with(|| UserInfo {
                nick: nick.to_owned(),
                ..UserInfo::default()
            });
        entry.user = user.map(str::to_owned).or(entry.user.take());
        entry.host = host.map(str::to_owned).or(entry.host.take());
        entry.channels.insert(key, MemberModes::default());
    }

    fn on_quit(&mut self, event: &MessageEvent) {
        let Some(nick) = event.nick() else {
            return;
        };
        let state = Arc::make_mut(&mut self.state);
        if !state.is_me(nick) {
            state.users.remove(&irc_to_lower(nick));
        }
    }

    fn leave(&mut self, nick: &str, channel: &str) {
        let key = irc_to_lower(channel);
        let state = Arc::make_mut(&mut self.state);

        if state.is_me(nick) {
            state.channels.remove(&key);
            for user in state.users.values_mut() {
                user.channels.remove(&key);
            }
        } else if let Some(user) = state.users.get_mut(&irc_to_lower(nick)) {
            user.channels.remove(&key);
        }

        let me = irc_to_lower(&state.identity.nick);
        state
            .users
            .retain(|nick, user| *nick == me || !user.channels.is_empty());
    }

    fn set_topic(&mut self, channel: &str, topic: Option<&str>) {
        let state = Arc::make_mut(&mut self.state);
        if let Some(info) = state.channels.get_mut(&irc_to_lower(channel)) {
            info.topic = topic.filter(|t| !t.is_empty()).map(str::to_owned);
        }
    }

    fn on_names(&mut self, event: &MessageEvent) {
        let Some(channel) = event.param(2) else {
            return;
        };
        let key = irc_to_lower(channel);
        let state = Arc::make_mut(&mut self.state);

        for entry in event.trailing().split(' ').filter(|e| !e.is_empty()) {
            let (modes, mask) = MemberModes::from_prefixed(entry);
            // userhost-in-names sends full masks
            let nick = mask.split('!').next().unwrap_or(mask);
            if nick.is_empty() {
                continue;
            }
            state
                .users
                .entry(irc_to_lower(nick))
                .or_insert_with(|| UserInfo {
                    nick: nick.to_owned(),
                    ..UserInfo::default()
                })
                .channels
                .insert(key.clone(), modes);
        }
    }

    fn on_mode(&mut self, event: &MessageEvent) {
        let params = event.params();
        let (Some(target), Some(changes)) = (params.first(), params.get(1)) else {
            return;
        };
        if !target.is_channel_name() {
            return;
        }
        let key = irc_to_lower(target);
        let mut args = params[2..].iter();
        let mut adding = true;
        let state = Arc::make_mut(&mut self.state);

        for c in changes.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                c => {
                    if let Some(role) = ChannelRole::from_mode_char(c) {
                        let Some(nick) = args.next() else {
                            break;
                        };
                        if let Some(modes) = state
                            .users
                            .get_mut(&irc_to_lower(nick))
                            .and_then(|user| user.channels.get_mut(&key))
                        {
                            modes.set(role, adding);
                            trace!(channel = %target, nick = %nick, role = %role, adding, "member role changed");
                        }
                    } else if MODES_WITH_ARG.contains(c) || (c == 'l' && adding) {
                        args.next();
                    }
                }
            }
        }
    }
}
