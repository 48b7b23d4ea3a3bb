// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant rooms of live dashboard connections.
//!
//! Room membership is owned by a single command loop; joins, leaves and
//! broadcasts are messages to that loop, so the room table is never touched
//! from two tasks at once. A connection whose buffer is full or whose
//! writer is gone is dropped from its room during the broadcast.

use std::collections::HashMap;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use switchboard_core::Broadcaster;

enum RoomCommand {
    Join {
        instance_id: String,
        conn_id: String,
        tx: mpsc::Sender<String>,
    },
    Leave {
        instance_id: String,
        conn_id: String,
    },
    Publish {
        instance_id: String,
        frame: String,
    },
    Count {
        instance_id: Option<String>,
        reply: oneshot::Sender<usize>,
    },
    CloseAll,
}

/// A joined connection's outbound frames.
pub struct Subscription {
    pub conn_id: String,
    pub instance_id: String,
    pub rx: mpsc::Receiver<String>,
}

/// Handle to the room loop. Cheap to clone.
#[derive(Clone)]
pub struct RoomBroadcaster {
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
    send_buffer: usize,
}

impl RoomBroadcaster {
    /// Spawns the room loop on the current runtime.
    ///
    /// The loop exits once every handle is dropped.
    pub fn new(send_buffer: usize) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(process_commands(cmd_rx));
        Self {
            cmd_tx,
            send_buffer: send_buffer.max(1),
        }
    }

    /// Adds a connection to `instance_id`'s room.
    pub fn join(&self, instance_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.send_buffer);
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.send(RoomCommand::Join {
            instance_id: instance_id.to_string(),
            conn_id: conn_id.clone(),
            tx,
        });
        Subscription {
            conn_id,
            instance_id: instance_id.to_string(),
            rx,
        }
    }

    pub fn leave(&self, instance_id: &str, conn_id: &str) {
        self.send(RoomCommand::Leave {
            instance_id: instance_id.to_string(),
            conn_id: conn_id.to_string(),
        });
    }

    /// Live connections in one room, or across all rooms.
    pub async fn connection_count(&self, instance_id: Option<&str>) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Count {
            instance_id: instance_id.map(str::to_string),
            reply,
        });
        rx.await.unwrap_or(0)
    }

    /// Drops every connection; their writers see the channel close.
    pub fn close_all(&self) {
        self.send(RoomCommand::CloseAll);
    }

    fn send(&self, command: RoomCommand) {
        if self.cmd_tx.send(command).is_err() {
            warn!("room loop is gone; command dropped");
        }
    }
}

impl Broadcaster for RoomBroadcaster {
    fn broadcast(&self, instance_id: &str, message_type: &str, payload: serde_json::Value) {
        let frame = json!({"type": message_type, "payload": payload}).to_string();
        self.send(RoomCommand::Publish {
            instance_id: instance_id.to_string(),
            frame,
        });
    }
}

async fn process_commands(mut cmd_rx: mpsc::UnboundedReceiver<RoomCommand>) {
    let mut rooms: HashMap<String, HashMap<String, mpsc::Sender<String>>> = HashMap::new();

    while let Some(command) = cmd_rx.recv().await {
        match command {
            RoomCommand::Join {
                instance_id,
                conn_id,
                tx,
            } => {
                debug!(instance_id = %instance_id, conn_id = %conn_id, "room join");
                rooms.entry(instance_id).or_default().insert(conn_id, tx);
            }
            RoomCommand::Leave {
                instance_id,
                conn_id,
            } => {
                if let Some(room) = rooms.get_mut(&instance_id) {
                    room.remove(&conn_id);
                    if room.is_empty() {
                        rooms.remove(&instance_id);
                    }
                }
                debug!(instance_id = %instance_id, conn_id = %conn_id, "room leave");
            }
            RoomCommand::Publish { instance_id, frame } => {
                let Some(room) = rooms.get_mut(&instance_id) else {
                    continue;
                };
                room.retain(|conn_id, tx| match tx.try_send(frame.clone()) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(
                            instance_id = %instance_id,
                            conn_id = %conn_id,
                            error = %e,
                            "dropping room connection"
                        );
                        false
                    }
                });
                if room.is_empty() {
                    rooms.remove(&instance_id);
                }
            }
            RoomCommand::Count { instance_id, reply } => {
                let count = match instance_id {
                    Some(id) => rooms.get(&id).map_or(0, HashMap::len),
                    None => rooms.values().map(HashMap::len).sum(),
                };
                let _ = reply.send(count);
            }
            RoomCommand::CloseAll => rooms.clear(),
        }

        switchboard_prometheus::set_room_connections(rooms.values().map(HashMap::len).sum());
    }
}
