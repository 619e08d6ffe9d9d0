//! Network module.
//!
//! One outbound TCP connection to the IRC server, framed into lines.

mod connection;

pub use connection::Connection;
