//! Basic type definitions for the chat relay
//!
//! - `ConnectionId`: UUID-based identifier for one live connection
//! - guest name generation for clients that register without a name

use rand::Rng;
use uuid::Uuid;

/// Room every connection starts in unless configured otherwise
pub const DEFAULT_ROOM: &str = "General";

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a display name of the form `User<n>`, `n` in `0..=1000`
pub fn guest_name() -> String {
    let n: u16 = rand::thread_rng().gen_range(0..=1000);
    format!("User{}", n)
}
