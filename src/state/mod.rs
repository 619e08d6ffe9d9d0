//! Server state: what the bot knows about the network it is connected to.

mod roles;
mod server;
mod tracker;

pub use roles::{ChannelRole, MemberModes, ParseRoleError};
pub use server::{BotIdentity, ChannelInfo, ServerState, UserInfo};
pub use tracker::StateTracker;
