//! Client for a `StoreServer` running in another process
//!
//! The connection is opened lazily and dropped on any transport error, so
//! the next call reconnects. Transport failures surface as
//! `Error::StoreUnavailable`, which callers treat as transient.

use aircoord_core::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{parse_reply_line, ttl_from_int, Command, Reply, ReplyHeader};
use crate::store::{KeyTtl, StateStore};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Remote store client
pub struct RemoteStore {
    address: String,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl RemoteStore {
    /// Create a client for `address`; nothing is connected until first use
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(1),
            connection: Mutex::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Round-trip a PING
    pub async fn ping(&self) -> Result<()> {
        match self.request(&Command::Ping).await? {
            Reply::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn connect(&self) -> Result<Connection> {
        debug!(address = %self.address, "Connecting to store");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                Error::StoreUnavailable(format!("Connect to {} timed out", self.address))
            })?
            .map_err(|e| {
                Error::StoreUnavailable(format!("Connect to {} failed: {}", self.address, e))
            })?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn request(&self, command: &Command) -> Result<Reply> {
        let line = command.encode()?;
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(Error::StoreUnavailable("No connection".to_string()));
        };

        match Self::exchange(conn, &line).await {
            Ok(Reply::Error(msg)) => Err(Error::Store(msg)),
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(address = %self.address, error = %e, "Store connection lost");
                *guard = None;
                Err(Error::StoreUnavailable(e.to_string()))
            }
        }
    }

    async fn exchange(conn: &mut Connection, line: &str) -> Result<Reply> {
        conn.writer.write_all(line.as_bytes()).await?;
        conn.writer.write_all(b"\n").await?;
        conn.writer.flush().await?;

        let first = Self::read_line(conn).await?;
        match parse_reply_line(&first)? {
            ReplyHeader::Complete(reply) => Ok(reply),
            ReplyHeader::ArrayOf(n) => {
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    let item = Self::read_line(conn).await?;
                    items.push(item.trim_end_matches(['\r', '\n']).to_string());
                }
                Ok(Reply::Array(items))
            }
        }
    }

    async fn read_line(conn: &mut Connection) -> Result<String> {
        let mut line = String::new();
        if conn.reader.read_line(&mut line).await? == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "store closed the connection",
            )));
        }
        Ok(line)
    }
}

fn unexpected(reply: Reply) -> Error {
    Error::Protocol(format!("Unexpected reply: {:?}", reply))
}

#[async_trait]
impl StateStore for RemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.request(&Command::Get { key: key.to_string() }).await? {
            Reply::Value(v) => Ok(Some(v)),
            Reply::Nil => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let command = Command::Set {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.request(&command).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let command = Command::SetWithTtl {
            key: key.to_string(),
            ttl,
            value: value.to_string(),
        };
        match self.request(&command).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.request(&Command::Del { key: key.to_string() }).await? {
            Reply::Int(n) => Ok(n > 0),
            other => Err(unexpected(other)),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        match self.request(&Command::Ttl { key: key.to_string() }).await? {
            Reply::Int(n) => Ok(ttl_from_int(n)),
            other => Err(unexpected(other)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let command = Command::Expire {
            key: key.to_string(),
            ttl,
        };
        match self.request(&command).await? {
            Reply::Int(n) => Ok(n > 0),
            other => Err(unexpected(other)),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let command = Command::Keys {
            prefix: prefix.to_string(),
        };
        match self.request(&command).await? {
            Reply::Array(keys) => Ok(keys),
            other => Err(unexpected(other)),
        }
    }
}
