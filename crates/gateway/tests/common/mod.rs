#![allow(dead_code)]

use std::sync::Arc;

use huddle_gateway::websocket::connection::Connection;
use huddle_gateway::websocket::events::ServerEvent;
use huddle_gateway::Coordinator;
use huddle_shared::{MemoryStore, RoomDefinition, RoomId, UserId};
use serde_json::Value;
use tokio::sync::mpsc;

pub fn room(id: &str, capacity: u32) -> RoomDefinition {
    RoomDefinition {
        id: RoomId::from(id),
        name: id.to_string(),
        capacity,
        restricted: false,
    }
}

pub fn coordinator(rooms: Vec<RoomDefinition>) -> (Coordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_rooms(rooms));
    (Coordinator::new(store.clone(), false), store)
}

/// One open tab
pub struct Tab {
    pub conn: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Tab {
    pub async fn open(coordinator: &Coordinator, user_id: UserId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = coordinator.open_connection(user_id, tx).await;
        let mut tab = Self { conn, rx };
        tab.drain();
        tab
    }

    pub fn user_id(&self) -> UserId {
        self.conn.user_id
    }

    /// Everything received since the last drain, as wire JSON
    pub fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(serde_json::to_value(&event).unwrap_or(Value::Null));
        }
        events
    }

    /// Wire types of everything received since the last drain
    pub fn drain_types(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|e| e["type"].as_str().map(str::to_string))
            .collect()
    }
}
