//! TCP server exposing a `MemoryStore` to other processes

use aircoord_core::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::memory::MemoryStore;
use crate::protocol::{Command, CommandParser, Reply};
use crate::store::StateStore;

/// Interval between sweeps of expired keys
const PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Counts a connected client for as long as its task lives, aborted or not
struct ClientGuard(Arc<AtomicUsize>);

impl ClientGuard {
    fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Store server
pub struct StoreServer {
    /// Backing store
    store: MemoryStore,
    /// Connected client count
    client_count: Arc<AtomicUsize>,
}

impl StoreServer {
    /// Create a server around `store`
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            client_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The backing store
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Bind `addr` and serve forever
    pub async fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// The purge sweep and every client connection run in tasks owned by
    /// this future; dropping it aborts them all.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Store server listening on {}", listener.local_addr()?);

        let mut tasks = JoinSet::new();
        let purge_store = self.store.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                purge_store.purge_expired();
            }
        });

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        info!("New store client: {}", peer_addr);
                        let store = self.store.clone();
                        let guard = ClientGuard::new(self.client_count.clone());

                        tasks.spawn(async move {
                            let _guard = guard;
                            if let Err(e) = Self::handle_client(socket, peer_addr, store).await {
                                error!("Error handling store client {}: {}", peer_addr, e);
                            }
                            info!("Store client {} disconnected", peer_addr);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                // Reap finished connections
                Some(_) = tasks.join_next() => {}
            }
        }
    }

    /// Handle a client connection
    async fn handle_client(
        socket: TcpStream,
        peer_addr: SocketAddr,
        store: MemoryStore,
    ) -> Result<()> {
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("Store client {} closed connection", peer_addr);
                    break;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    let reply = match CommandParser::parse(&line) {
                        Ok(command) => Self::execute(&store, command).await,
                        Err(e) => {
                            warn!("Store client {} sent bad command: {}", peer_addr, e);
                            Reply::Error(e)
                        }
                    };

                    writer.write_all(reply.encode().as_bytes()).await?;
                    writer.flush().await?;
                }
                Err(e) => {
                    error!("Error reading from store client {}: {}", peer_addr, e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Execute one command against the store
    pub async fn execute(store: &MemoryStore, command: Command) -> Reply {
        let result = match command {
            Command::Ping => Ok(Reply::Pong),
            Command::Get { key } => store.get(&key).await.map(|v| match v {
                Some(value) => Reply::Value(value),
                None => Reply::Nil,
            }),
            Command::Set { key, value } => store.set(&key, &value).await.map(|_| Reply::Ok),
            Command::SetWithTtl { key, ttl, value } => store
                .set_with_ttl(&key, &value, ttl)
                .await
                .map(|_| Reply::Ok),
            Command::Del { key } => store
                .delete(&key)
                .await
                .map(|existed| Reply::Int(existed as i64)),
            Command::Ttl { key } => store.ttl(&key).await.map(Reply::from_ttl),
            Command::Expire { key, ttl } => store
                .expire(&key, ttl)
                .await
                .map(|existed| Reply::Int(existed as i64)),
            Command::Keys { prefix } => store.keys(&prefix).await.map(Reply::Array),
        };

        result.unwrap_or_else(|e| Reply::Error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_commands() {
        let store = MemoryStore::new();

        assert_eq!(StoreServer::execute(&store, Command::Ping).await, Reply::Pong);
        assert_eq!(
            StoreServer::execute(
                &store,
                Command::Set {
                    key: "current_attack_mode".into(),
                    value: "NORMAL".into()
                }
            )
            .await,
            Reply::Ok
        );
        assert_eq!(
            StoreServer::execute(
                &store,
                Command::Get {
                    key: "current_attack_mode".into()
                }
            )
            .await,
            Reply::Value("NORMAL".into())
        );
        assert_eq!(
            StoreServer::execute(
                &store,
                Command::Ttl {
                    key: "current_attack_mode".into()
                }
            )
            .await,
            Reply::Int(-1)
        );
        assert_eq!(
            StoreServer::execute(&store, Command::Del { key: "nope".into() }).await,
            Reply::Int(0)
        );
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = StoreServer::new(MemoryStore::new());
        let store = server.store().clone();
        tokio::spawn(async move { server.serve(listener).await });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(b"SET target_channel 6\n").await.unwrap();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "OK\n");

        line.clear();
        writer.write_all(b"bogus\n").await.unwrap();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("ERR "));

        assert_eq!(
            store.get("target_channel").await.unwrap().as_deref(),
            Some("6")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_server_stops_purging() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(StoreServer::new(MemoryStore::new()));
        let store = server.store().clone();
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        store
            .set_with_ttl("liveness:channel:1", "wlan0mon", Duration::from_secs(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(store.is_empty());

        serving.abort();
        assert!(serving.await.unwrap_err().is_cancelled());

        store
            .set_with_ttl("liveness:channel:6", "wlan0mon", Duration::from_secs(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        // Expired but never swept
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_server_closes_clients() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(StoreServer::new(MemoryStore::new()));
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        writer.write_all(b"PING\n").await.unwrap();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(server.client_count(), 1);

        serving.abort();
        let _ = serving.await;

        line.clear();
        let read = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(server.client_count(), 0);
    }
}
