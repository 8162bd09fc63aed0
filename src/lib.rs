//! Multi-room TCP Chat Relay Library
//!
//! Clients connect over TCP, send a display name as their first frame,
//! and then chat with everyone in their current room.
//!
//! # Features
//! - Fixed-width header framing (`frame`)
//! - Named rooms created implicitly by moving into them
//! - `/help`, `/move <room>`, `/leave`, `/rooms` and `/disconnect` commands
//! - Idle timeouts that never drop a connection on their own
//!
//! # Architecture
//! A single `Registry` behind a mutex is shared by every connection task:
//! - `ChatServer` accepts sockets and runs the name handshake
//! - Each registered connection gets a `Session` task that dispatches its
//!   commands
//! - Broadcasts look up room members under the lock and write after it is
//!   released
//!
//! # Example
//! ```ignore
//! use clap::Parser;
//! use chat_relay::{ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(Config::parse()).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use connection::{Connection, Inbound, Received};
pub use error::{AppError, FrameError};
pub use frame::{Decoded, Frame, FrameCodec, HEADER_SIZE};
pub use handler::{handshake, Session};
pub use message::Command;
pub use registry::{Entry, Registry};
pub use server::ChatServer;
pub use types::{ConnectionId, DEFAULT_ROOM};
