//! Connection supervisor
//!
//! Owns the listening socket and the registry. Each accepted socket gets
//! its name handshake inline, then a spawned task running its session.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::connection::{Connection, Inbound};
use crate::error::AppError;
use crate::frame::FrameCodec;
use crate::handler::handshake;
use crate::registry::Registry;

/// The accept loop and everything it shares with handlers
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: Config,
}

impl ChatServer {
    /// Validate `config` and bind its address
    pub async fn bind(config: Config) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then close every
    /// registered connection
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        info!("Chat server accepting connections");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = tokio::time::timeout(self.config.idle_timeout(), self.listener.accept()) => {
                    match accepted {
                        // No one knocked this round
                        Err(_) => continue,
                        Ok(Ok((stream, addr))) => self.admit(stream, addr).await,
                        Ok(Err(e)) => error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }

        let connections = self.registry.all_connections();
        info!("Shutting down, closing {} connection(s)", connections.len());
        for conn in connections {
            conn.close().await;
        }
    }

    /// Run the name handshake and hand a registered connection to its own
    /// task
    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        info!("New connection from {}", addr);
        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Connection::new(addr.to_string(), writer));
        let mut inbound = Inbound::new(
            conn.id(),
            reader,
            FrameCodec::with_max_content_length(self.config.max_content_length),
            self.config.idle_timeout(),
        );

        let session = handshake(
            Arc::clone(&conn),
            &mut inbound,
            self.registry(),
            &self.config.default_room,
        )
        .await;

        match session {
            Some(session) => {
                tokio::spawn(session.run(inbound));
                debug!("Active connections: {}", self.registry.len());
            }
            None => {
                info!("{} did not register; closing", addr);
                conn.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use clap::Parser;
    use futures_util::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::sync::oneshot;
    use tokio_util::codec::FramedRead;

    use crate::frame::{self, Decoded};
    use crate::message::{self, SERVER_NAME};

    const IDLE_MS: u64 = 100;

    fn test_config() -> Config {
        let mut config = Config::parse_from(["chat_relay"]);
        config.port = 0;
        config.idle_timeout_ms = IDLE_MS;
        config
    }

    /// Poll until `done` holds, for at most two seconds
    async fn eventually(done: impl Fn() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    struct Server {
        addr: SocketAddr,
        registry: Arc<Registry>,
        stop: Option<oneshot::Sender<()>>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Server {
        async fn start() -> Self {
            let server = ChatServer::bind(test_config()).await.unwrap();
            let addr = server.local_addr().unwrap();
            let registry = server.registry();
            let (stop, stopped) = oneshot::channel::<()>();
            let task = tokio::spawn(server.run_until(async {
                let _ = stopped.await;
            }));
            Self {
                addr,
                registry,
                stop: Some(stop),
                task,
            }
        }

        async fn shutdown(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            self.task.await.unwrap();
        }
    }

    struct Client {
        frames: FramedRead<OwnedReadHalf, FrameCodec>,
        writer: OwnedWriteHalf,
        name: String,
    }

    impl Client {
        /// Connect, send the name and wait for the welcome
        async fn join(addr: SocketAddr, name: &str) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, writer) = stream.into_split();
            let mut client = Self {
                frames: FramedRead::new(reader, FrameCodec::new()),
                writer,
                name: name.to_string(),
            };
            client.say(name).await;
            client.expect(&message::welcome()).await;
            client
        }

        async fn say(&mut self, text: &str) {
            let bytes = frame::encode(text.as_bytes(), &self.name).unwrap();
            self.writer.write_all(&bytes).await.unwrap();
        }

        async fn next_text(&mut self, wait: Duration) -> Option<String> {
            match tokio::time::timeout(wait, self.frames.next()).await {
                Ok(Some(Ok(Decoded::Frame(frame)))) => {
                    assert_eq!(frame.sender_name, SERVER_NAME);
                    Some(frame.text())
                }
                _ => None,
            }
        }

        async fn expect(&mut self, text: &str) {
            assert_eq!(
                self.next_text(Duration::from_secs(2)).await.as_deref(),
                Some(text)
            );
        }

        async fn expect_nothing(&mut self) {
            assert_eq!(self.next_text(Duration::from_millis(150)).await, None);
        }
    }

    #[tokio::test]
    async fn test_chat_and_move_scenario() {
        let server = Server::start().await;
        let mut alice = Client::join(server.addr, "Alice").await;
        let mut bob = Client::join(server.addr, "Bob").await;
        assert_eq!(server.registry.len(), 2);

        alice.say("hi").await;
        bob.expect("Alice: hi").await;
        alice.expect_nothing().await;

        alice.say("/move Movies").await;
        bob.expect("Alice has left the chat").await;
        alice.expect("Alice has entered the chat").await;

        bob.say("anyone still here?").await;
        alice.expect_nothing().await;

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_client_is_never_registered() {
        let server = Server::start().await;
        let mut silent = TcpStream::connect(server.addr).await.unwrap();

        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(2), silent.read_to_end(&mut buf))
            .await
            .expect("server closes the connection")
            .unwrap_or(0);
        assert_eq!(read, 0);
        assert!(server.registry.snapshot().is_empty());

        // The accept loop is still serving.
        let _alice = Client::join(server.addr, "Alice").await;
        assert_eq!(server.registry.len(), 1);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_is_cleaned_up() {
        let server = Server::start().await;
        let alice = Client::join(server.addr, "Alice").await;
        let mut bob = Client::join(server.addr, "Bob").await;

        drop(alice);
        bob.expect("Alice has left the chat").await;
        eventually(|| server.registry.len() == 1).await;

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_command_closes_socket() {
        let server = Server::start().await;
        let mut alice = Client::join(server.addr, "Alice").await;

        alice.say("/disconnect").await;
        let end = tokio::time::timeout(Duration::from_secs(2), alice.frames.next())
            .await
            .expect("server closes the connection");
        assert!(end.is_none());
        assert!(server.registry.is_empty());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_registered_connections() {
        let server = Server::start().await;
        let mut alice = Client::join(server.addr, "Alice").await;

        server.shutdown().await;

        let end = tokio::time::timeout(Duration::from_secs(2), alice.frames.next())
            .await
            .expect("connection closed on shutdown");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let mut config = test_config();
        config.default_room = String::new();
        assert!(matches!(
            ChatServer::bind(config).await,
            Err(AppError::Config(_))
        ));
    }
}
