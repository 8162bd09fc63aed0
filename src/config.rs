//! Process configuration
//!
//! Command-line flags with environment variable fallbacks.

use std::time::Duration;

use clap::Parser;

use crate::error::AppError;
use crate::frame::DEFAULT_MAX_CONTENT_LENGTH;
use crate::message::room_name_problem;
use crate::types::DEFAULT_ROOM;

/// Multi-room TCP chat relay
#[derive(Parser, Debug, Clone)]
#[command(name = "chat_relay", version, about = "Multi-room TCP chat relay")]
pub struct Config {
    /// Host or address to bind to
    #[arg(long, env = "CHAT_RELAY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "CHAT_RELAY_PORT", default_value_t = 5000)]
    pub port: u16,

    /// How long accept and receive calls wait before looping, in milliseconds
    #[arg(long, env = "CHAT_RELAY_IDLE_TIMEOUT_MS", default_value_t = 5000)]
    pub idle_timeout_ms: u64,

    /// Room new connections are placed in
    #[arg(long, env = "CHAT_RELAY_DEFAULT_ROOM", default_value = DEFAULT_ROOM)]
    pub default_room: String,

    /// Largest inbound payload accepted, in bytes
    #[arg(long, env = "CHAT_RELAY_MAX_CONTENT", default_value_t = DEFAULT_MAX_CONTENT_LENGTH)]
    pub max_content_length: usize,
}

impl Config {
    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.default_room.trim().is_empty() {
            return Err(AppError::Config("default room must not be empty".into()));
        }
        // `/leave` moves into the default room, so it must be a name `/move`
        // would accept.
        if self.default_room.trim() != self.default_room {
            return Err(AppError::Config(
                "default room must not start or end with whitespace".into(),
            ));
        }
        if let Some(problem) = room_name_problem(&self.default_room) {
            return Err(AppError::Config(format!("default room: {}", problem)));
        }
        if self.idle_timeout_ms == 0 {
            return Err(AppError::Config("idle timeout must be positive".into()));
        }
        Ok(())
    }
}
