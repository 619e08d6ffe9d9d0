//! Connection - the line-framed TCP stream to the IRC server.

use crate::error::ClientError;
use crate::modules::OutboundCommand;
use futures_util::{SinkExt, StreamExt};
use slircbot_proto::{LineCodec, LineError, encode_command};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{trace, warn};

pub struct Connection {
    addr: String,
    transport: Framed<TcpStream, LineCodec>,
}

impl Connection {
    pub async fn connect(addr: &str, max_line_length: usize) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_owned(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }
        Ok(Self {
            addr: addr.to_owned(),
            transport: Framed::new(stream, LineCodec::with_max_len(max_line_length)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Next line from the server. `None` once the server closes the stream.
    pub async fn next_line(&mut self) -> Option<Result<String, LineError>> {
        self.transport.next().await
    }

    /// Encode and write one command. Commands that cannot be encoded are
    /// dropped with a warning; only transport failures are errors.
    pub async fn send(&mut self, cmd: &OutboundCommand) -> Result<(), ClientError> {
        let line = match encode_command(&cmd.command, &cmd.params) {
            Ok(line) => line,
            Err(e) => {
                warn!(command = %cmd.command, error = %e, "Dropping unencodable command");
                crate::metrics::record_command_dropped("unencodable");
                return Ok(());
            }
        };
        trace!(line = %line, "-> server");
        self.transport.send(line).await?;
        crate::metrics::record_command_sent();
        Ok(())
    }
}
