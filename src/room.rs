//! Room routing
//!
//! Works out who a room-wide message goes to and fans the frame out.
//! Membership is read under the registry lock; the writes happen after it
//! has been released.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::debug;

use crate::connection::Connection;
use crate::error::AppError;
use crate::frame;
use crate::registry::Registry;
use crate::types::ConnectionId;

/// Everyone in `room` except `sender`
pub fn broadcast_targets(
    registry: &Registry,
    sender: ConnectionId,
    room: &str,
) -> Vec<Arc<Connection>> {
    registry
        .members_of(room)
        .into_iter()
        .filter(|conn| conn.id() != sender)
        .collect()
}

/// Send `text` from `sender_name` to every target
///
/// The frame is encoded once. A failed write to one target is logged and
/// does not affect the others; that target's own handler will notice the
/// broken connection. Returns the number of successful deliveries.
pub async fn broadcast(
    targets: &[Arc<Connection>],
    text: &str,
    sender_name: &str,
) -> Result<usize, AppError> {
    if targets.is_empty() {
        return Ok(0);
    }
    let bytes = frame::encode(text.as_bytes(), sender_name)?;

    let results = join_all(targets.iter().map(|conn| conn.write_frame(&bytes))).await;

    let mut delivered = 0;
    for (conn, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => debug!("Broadcast to {} failed: {}", conn.id(), e),
        }
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn conn() -> Arc<Connection> {
        Arc::new(Connection::new("test", tokio::io::sink()))
    }

    #[test]
    fn test_targets_exclude_sender_and_other_rooms() {
        let registry = Registry::new();
        let alice = conn();
        let bob = conn();
        let carol = conn();
        let dave = conn();
        registry.register(&alice, "Alice", "General");
        registry.register(&bob, "Bob", "General");
        registry.register(&carol, "Carol", "General");
        registry.register(&dave, "Dave", "Movies");

        let targets: HashSet<ConnectionId> = broadcast_targets(&registry, alice.id(), "General")
            .iter()
            .map(|c| c.id())
            .collect();
        let expected: HashSet<ConnectionId> = [bob.id(), carol.id()].into_iter().collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_targets_empty_when_alone() {
        let registry = Registry::new();
        let alice = conn();
        registry.register(&alice, "Alice", "General");

        assert!(broadcast_targets(&registry, alice.id(), "General").is_empty());
        assert!(broadcast_targets(&registry, alice.id(), "Nowhere").is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_targets() {
        let open = conn();
        let closed = conn();
        closed.close().await;

        let delivered = broadcast(&[open, closed], "hello", "SERVER").await.unwrap();
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_nobody() {
        assert_eq!(broadcast(&[], "hello", "SERVER").await.unwrap(), 0);
    }
}
