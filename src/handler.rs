//! Per-connection command handling
//!
//! A connection goes through three states:
//!
//! - awaiting its name: [`handshake`] reads the first frame as the display
//!   name and registers the connection
//! - active: [`Session::run`] decodes frames and dispatches commands
//! - disconnected: the session has unregistered and closed the connection
//!
//! A `Session` only exists for a registered connection, so the active
//! state is the lifetime of the value.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Inbound, Received};
use crate::error::{AppError, FrameError};
use crate::message::{self, Command, SERVER_NAME};
use crate::registry::Registry;
use crate::room;
use crate::types::guest_name;

/// Turn a fresh connection into a registered session
///
/// Exactly one receive is attempted. If it times out, is malformed, or the
/// peer goes away, returns None and the connection is left unregistered;
/// closing it is up to the caller.
pub async fn handshake<R: AsyncRead + Unpin>(
    conn: Arc<Connection>,
    inbound: &mut Inbound<R>,
    registry: Arc<Registry>,
    default_room: &str,
) -> Option<Session> {
    let frame = match inbound.recv().await {
        Received::Data(frame) => frame,
        Received::Empty | Received::Closed => {
            debug!("No name received from {}", conn.peer());
            return None;
        }
    };

    let requested = frame.text();
    let name = match requested.trim() {
        "" => guest_name(),
        name => match message::display_name_problem(name) {
            Some(problem) => {
                let guest = guest_name();
                warn!("{} asked for {:?}: {}; using '{}'", conn.peer(), name, problem, guest);
                guest
            }
            None => name.to_string(),
        },
    };

    if !registry.register(&conn, &name, default_room) {
        warn!("Connection {} is already registered", conn.id());
        return None;
    }
    info!("{} joined as '{}' in '{}'", conn.peer(), name, default_room);

    let session = Session {
        conn,
        name,
        registry,
        default_room: default_room.to_string(),
    };
    // A failed welcome means the peer is gone; the first receive will
    // report it and run the normal cleanup.
    if let Err(e) = session.reply(&message::welcome()).await {
        debug!("Welcome to {} failed: {}", session.conn.id(), e);
    }
    Some(session)
}

/// An active, registered connection
#[derive(Debug)]
pub struct Session {
    conn: Arc<Connection>,
    name: String,
    registry: Arc<Registry>,
    default_room: String,
}

impl Session {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive and dispatch until the connection ends
    pub async fn run<R: AsyncRead + Unpin>(self, mut inbound: Inbound<R>) {
        loop {
            match inbound.recv().await {
                Received::Data(frame) => {
                    if self.dispatch(&frame.text()).await.is_break() {
                        return;
                    }
                }
                Received::Empty => continue,
                Received::Closed => {
                    info!("Lost connection to '{}' ({})", self.name, self.conn.peer());
                    if let Some(e @ FrameError::ContentTooLong { .. }) = inbound.close_reason() {
                        let reason = format!("disconnected, {}", e);
                        self.reply_or_log(&message::error_reply(&reason)).await;
                    }
                    self.depart().await;
                    return;
                }
            }
        }
    }

    /// Act on one inbound payload
    ///
    /// Breaks once the session has disconnected.
    pub async fn dispatch(&self, text: &str) -> ControlFlow<()> {
        match Command::parse(text) {
            Command::Disconnect => {
                info!("'{}' disconnected", self.name);
                self.depart().await;
                return ControlFlow::Break(());
            }
            Command::Help => self.reply_or_log(message::HELP_TEXT).await,
            Command::Move(target) => self.move_to(&target).await,
            Command::Leave => self.leave().await,
            Command::ListRooms => self.list_rooms().await,
            Command::Chat(text) => self.chat(&text).await,
        }
        ControlFlow::Continue(())
    }

    async fn reply(&self, text: &str) -> Result<(), AppError> {
        self.conn.send(text, SERVER_NAME).await
    }

    async fn reply_or_log(&self, text: &str) {
        if let Err(e) = self.reply(text).await {
            debug!("Reply to '{}' failed: {}", self.name, e);
        }
    }

    /// Send `text` to everyone else in `room`
    async fn announce(&self, room: &str, text: &str) {
        let targets = room::broadcast_targets(&self.registry, self.conn.id(), room);
        self.send_to(&targets, text).await;
    }

    async fn send_to(&self, targets: &[Arc<Connection>], text: &str) {
        match room::broadcast(targets, text, SERVER_NAME).await {
            Ok(delivered) => debug!("'{}' reached {} connection(s)", self.name, delivered),
            Err(e) => {
                warn!("Could not broadcast for '{}': {}", self.name, e);
                let reason = format!("message could not be sent ({})", e);
                self.reply_or_log(&message::error_reply(&reason)).await;
            }
        }
    }

    async fn chat(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let Some(room) = self.registry.room_of(self.conn.id()) else {
            return;
        };
        self.announce(&room, &message::chat_line(&self.name, text))
            .await;
    }

    async fn move_to(&self, target: &str) {
        if let Some(problem) = message::room_name_problem(target) {
            self.reply_or_log(&message::error_reply(problem)).await;
            return;
        }
        let Some(current) = self.registry.room_of(self.conn.id()) else {
            return;
        };
        if current == target {
            debug!("'{}' is already in '{}'", self.name, target);
            return;
        }

        self.announce(&current, &message::left_notice(&self.name))
            .await;
        if !self.registry.move_room(self.conn.id(), target) {
            return;
        }
        info!("'{}' moved from '{}' to '{}'", self.name, current, target);

        // The mover is included so it sees its own arrival.
        let members = self.registry.members_of(target);
        self.send_to(&members, &message::entered_notice(&self.name))
            .await;
    }

    async fn leave(&self) {
        let Some(current) = self.registry.room_of(self.conn.id()) else {
            return;
        };
        if current == self.default_room {
            self.announce(&current, &message::left_notice(&self.name))
                .await;
            return;
        }
        let default_room = self.default_room.clone();
        self.move_to(&default_room).await;
    }

    async fn list_rooms(&self) {
        let snapshot = self.registry.snapshot();
        let table = message::rooms_table(
            snapshot
                .iter()
                .map(|entry| (entry.name.as_str(), entry.room.as_str())),
        );
        self.reply_or_log(&table).await;
    }

    /// Tell the room, unregister, close
    async fn depart(&self) {
        if let Some(room) = self.registry.room_of(self.conn.id()) {
            self.announce(&room, &message::left_notice(&self.name))
                .await;
        }
        self.registry.unregister(self.conn.id());
        self.conn.close().await;
    }
}
