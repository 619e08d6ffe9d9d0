//! Inbound message representation and parsing.

mod event;
/// IRCv3 tag decoding.
pub mod tags;

pub use self::event::MessageEvent;
pub use self::tags::TagValue;
