//! Outbound command queue between modules and the transport.

use crate::error::CapabilityError;
use serde::Deserialize;
use tokio::sync::mpsc;

/// One command a module asked to send. The transport encodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub command: String,
    pub params: Vec<String>,
}

/// Parameters for [`CommandSink::send`]: a single text or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandParams {
    Single(String),
    Many(Vec<String>),
}

impl CommandParams {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(param) => vec![param],
            Self::Many(params) => params,
        }
    }
}

impl From<&str> for CommandParams {
    fn from(param: &str) -> Self {
        Self::Single(param.to_owned())
    }
}

impl From<String> for CommandParams {
    fn from(param: String) -> Self {
        Self::Single(param)
    }
}

impl From<Vec<String>> for CommandParams {
    fn from(params: Vec<String>) -> Self {
        Self::Many(params)
    }
}

impl From<Vec<&str>> for CommandParams {
    fn from(params: Vec<&str>) -> Self {
        Self::Many(params.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandParams {
    fn from(params: [&str; N]) -> Self {
        Self::Many(params.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[String; N]> for CommandParams {
    fn from(params: [String; N]) -> Self {
        Self::Many(params.into())
    }
}

/// Sending half of the outbound queue.
///
/// Never blocks: module code runs synchronously inside the event loop, so a
/// full queue is reported instead of awaited.
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: mpsc::Sender<OutboundCommand>,
}

impl CommandSink {
    /// Create a bounded queue holding at most `capacity` commands.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn send(
        &self,
        command: &str,
        params: impl Into<CommandParams>,
    ) -> Result<(), CapabilityError> {
        let cmd = OutboundCommand {
            command: command.to_owned(),
            params: params.into().into_vec(),
        };
        self.tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                crate::metrics::record_command_dropped("queue_full");
                CapabilityError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => CapabilityError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_many_params() {
        let (sink, mut rx) = CommandSink::channel(4);
        sink.send("NICK", "slircbot").unwrap();
        sink.send("USER", ["bot", "*", "*", "Real Name"]).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundCommand {
                command: "NICK".into(),
                params: vec!["slircbot".into()],
            }
        );
        assert_eq!(rx.try_recv().unwrap().params, ["bot", "*", "*", "Real Name"]);
    }

    #[test]
    fn owned_param_arrays() {
        let (sink, mut rx) = CommandSink::channel(4);
        let names = ["core", "echo"].join(",");
        sink.send("PRIVMSG", ["#room".to_owned(), names]).unwrap();
        assert_eq!(rx.try_recv().unwrap().params, ["#room", "core,echo"]);
    }

    #[test]
    fn full_queue_is_reported() {
        let (sink, _rx) = CommandSink::channel(1);
        sink.send("PING", "a").unwrap();
        assert_eq!(sink.send("PING", "b"), Err(CapabilityError::QueueFull));
    }

    #[test]
    fn closed_queue_is_reported() {
        let (sink, rx) = CommandSink::channel(1);
        drop(rx);
        assert_eq!(sink.send("PING", "a"), Err(CapabilityError::Closed));
    }

    #[test]
    fn params_from_json() {
        let one: CommandParams = serde_json::from_str(r#""server1""#).unwrap();
        assert_eq!(one.into_vec(), ["server1"]);
        let many: CommandParams = serde_json::from_str(r##"["#room","hi there"]"##).unwrap();
        assert_eq!(many.into_vec(), ["#room", "hi there"]);
    }
}
