//! Client - connects to a relay and exchanges framed text messages

use crate::protocol::MAX_MESSAGE_SIZE;
use crate::server::connection::{read_frame, write_frame};
use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// A joined connection to the relay
pub struct ChatClient {
    reader: ChatReader,
    writer: ChatWriter,
}

/// Receiving half of a [`ChatClient`]
pub struct ChatReader {
    inner: OwnedReadHalf,
    max_message_size: u32,
}

/// Sending half of a [`ChatClient`]
pub struct ChatWriter {
    inner: OwnedWriteHalf,
}

impl ChatClient {
    /// Connect and announce `identity`
    pub async fn connect(addr: &str, identity: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Could not connect to server at {}", addr))?;
        Self::join(stream, identity).await
    }

    /// Connect, retrying a fixed number of times before giving up
    pub async fn connect_with_retry(
        addr: &str,
        identity: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match TcpStream::connect(addr).await {
                Ok(stream) => return Self::join(stream, identity).await,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Connection to {} failed (attempt {}/{}): {}",
                        addr,
                        attempt,
                        attempts,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Could not connect to server at {} after {} attempts: {}",
                        addr,
                        attempts,
                        e
                    ));
                }
            }
        }
    }

    async fn join(stream: TcpStream, identity: &str) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: ChatReader {
                inner: reader,
                max_message_size: MAX_MESSAGE_SIZE,
            },
            writer: ChatWriter { inner: writer },
        };
        client.writer.send(identity).await?;
        Ok(client)
    }

    /// Limit the size of relayed frames this client accepts
    ///
    /// Relayed chat carries the sender's tag on top of the body, so the
    /// default is the protocol ceiling rather than the server's body limit.
    pub fn with_max_message_size(mut self, max: u32) -> Self {
        self.reader.max_message_size = max;
        self
    }

    /// Send one chat message
    pub async fn send(&mut self, text: impl AsRef<[u8]>) -> Result<()> {
        self.writer.send(text).await
    }

    /// Receive the next relayed message, or `None` once the server closes
    pub async fn recv(&mut self) -> Result<Option<String>> {
        self.reader.recv().await
    }

    pub fn split(self) -> (ChatReader, ChatWriter) {
        (self.reader, self.writer)
    }

    /// Close the connection cleanly
    pub async fn close(self) -> Result<()> {
        self.writer.close().await
    }
}

impl ChatReader {
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let frame = read_frame(&mut self.inner, self.max_message_size).await?;
        Ok(frame.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

impl ChatWriter {
    pub async fn send(&mut self, text: impl AsRef<[u8]>) -> Result<()> {
        write_frame(&mut self.inner, text.as_ref()).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
