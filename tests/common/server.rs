//! Scripted fake IRC server.
//!
//! Accepts one bot connection and lets a test read what the bot sends and
//! write what the "server" says.

use slircbot::MessageEvent;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    /// Bind on an ephemeral localhost port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn address(&self) -> String {
        self.listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
    }

    /// Wait for the bot to connect.
    pub async fn accept(self) -> anyhow::Result<FakePeer> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        Ok(FakePeer::new(stream))
    }
}

/// The server's side of the bot connection.
pub struct FakePeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakePeer {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Send one raw line to the bot.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one line from the bot.
    pub async fn recv(&mut self) -> anyhow::Result<MessageEvent> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<MessageEvent> {
        let mut line = String::new();
        let read = timeout(dur, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("bot closed the connection");
        }
        Ok(MessageEvent::parse(line.trim_end()))
    }

    /// Receive lines until one with `command` arrives; earlier lines are
    /// returned alongside it.
    #[allow(dead_code)]
    pub async fn recv_until(&mut self, command: &str) -> anyhow::Result<(MessageEvent, Vec<MessageEvent>)> {
        let mut skipped = Vec::new();
        loop {
            let msg = self.recv().await?;
            if msg.command() == command {
                return Ok((msg, skipped));
            }
            skipped.push(msg);
        }
    }

    /// Receive the next line and require it to be `command`.
    pub async fn expect(&mut self, command: &str) -> anyhow::Result<MessageEvent> {
        let msg = self.recv().await?;
        anyhow::ensure!(
            msg.command() == command,
            "expected {command}, got {:?}",
            msg.raw()
        );
        Ok(msg)
    }

    /// Read NICK and USER, then welcome the bot as `nick`.
    #[allow(dead_code)]
    pub async fn register(&mut self, nick: &str) -> anyhow::Result<()> {
        let (nick_msg, _) = self.recv_until("NICK").await?;
        anyhow::ensure!(nick_msg.param(0) == Some(nick), "unexpected NICK {:?}", nick_msg.raw());
        self.expect("USER").await?;
        self.send_raw(&format!(":irc.test 001 {nick} :Welcome to the test network"))
            .await
    }
}
