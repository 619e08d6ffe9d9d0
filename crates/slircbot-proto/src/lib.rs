//! # slircbot-proto
//!
//! Inbound IRC line parsing and outbound line encoding for the slircbot
//! module host.
//!
//! The parser is deliberately forgiving: it never fails. A line it cannot
//! make sense of still produces a [`MessageEvent`], flagged invalid, so that
//! modules can observe malformed traffic if they want to.
//!
//! ## Parsing
//!
//! ```rust
//! use slircbot_proto::MessageEvent;
//!
//! let event = MessageEvent::parse(":nick!user@host PRIVMSG #room :hello world");
//! assert!(event.is_valid());
//! assert_eq!(event.prefix(), "nick!user@host");
//! assert_eq!(event.command(), "PRIVMSG");
//! assert_eq!(event.params(), ["#room", "hello world"]);
//! assert_eq!(event.trailing(), "hello world");
//! assert_eq!(event.nick(), Some("nick"));
//! ```
//!
//! ## Encoding
//!
//! ```rust
//! use slircbot_proto::encode_command;
//!
//! let line = encode_command("PRIVMSG", &["#room", "hi there"]).unwrap();
//! assert_eq!(line, "PRIVMSG #room :hi there");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod chan;
pub mod encode;
pub mod error;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::chan::ChannelExt;
pub use self::encode::encode_command;
pub use self::error::{EncodeError, LineError};
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::{MessageEvent, TagValue};
pub use self::prefix::Origin;
