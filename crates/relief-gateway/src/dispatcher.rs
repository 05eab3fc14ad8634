use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use relief_types::events::{GatewayEvent, Room};

/// An event serialized once and addressed to one or more rooms.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub rooms: Arc<[Room]>,
    pub json: Arc<str>,
}

impl RoomMessage {
    /// A connection receives the message if it is in any target room.
    pub fn is_for(&self, member_of: impl Fn(&Room) -> bool) -> bool {
        self.rooms.iter().any(member_of)
    }
}

/// Fans events out to every connected client; each connection filters
/// by the rooms it has joined.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<RoomMessage>,

    /// Open connections per user. A user may be connected from several devices.
    online_users: RwLock<HashMap<Uuid, usize>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to every member of `room`.
    pub fn emit(&self, room: Room, event: &GatewayEvent) {
        self.emit_to(vec![room], event);
    }

    /// Send an event once to every member of any of `rooms`.
    pub fn emit_to(&self, rooms: Vec<Room>, event: &GatewayEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize gateway event: {}", e);
                return;
            }
        };
        let msg = RoomMessage {
            rooms: rooms.into(),
            json: json.into(),
        };
        // No receivers just means nobody is connected.
        if let Ok(n) = self.inner.broadcast_tx.send(msg) {
            debug!("Dispatched event to {} connection(s)", n);
        }
    }

    /// Record a new connection for `user_id`. Returns the number of users online.
    pub async fn user_online(&self, user_id: Uuid) -> usize {
        let mut online = self.inner.online_users.write().await;
        *online.entry(user_id).or_default() += 1;
        online.len()
    }

    /// Drop one connection for `user_id`. Returns the number of users online.
    pub async fn user_offline(&self, user_id: Uuid) -> usize {
        let mut online = self.inner.online_users.write().await;
        if let Some(count) = online.get_mut(&user_id) {
            *count -= 1;
            if *count == 0 {
                online.remove(&user_id);
            }
        }
        online.len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_types::events::DisasterAlert;

    fn alert(message: &str) -> GatewayEvent {
        GatewayEvent::DisasterAlert(DisasterAlert {
            disaster_id: None,
            name: None,
            severity: None,
            message: message.to_string(),
            sent_by: None,
            timestamp: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn emit_reaches_subscribers_with_target_rooms() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.emit_to(
            vec![Room::new("admin"), Room::new("ngo")],
            &alert("Evacuate"),
        );

        let msg = rx.recv().await.unwrap();
        assert!(msg.is_for(|r| r.as_str() == "ngo"));
        assert!(!msg.is_for(|r| r.as_str() == "volunteer"));
        let json: serde_json::Value = serde_json::from_str(&msg.json).unwrap();
        assert_eq!(json["type"], "disaster-alert");
        assert_eq!(json["data"]["message"], "Evacuate");
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_harmless() {
        let dispatcher = Dispatcher::new();
        dispatcher.emit(Room::all_users(), &alert("Nobody listening"));
    }

    #[tokio::test]
    async fn online_tracking_counts_connections() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        assert_eq!(dispatcher.user_online(user).await, 1);
        assert_eq!(dispatcher.user_online(user).await, 1);
        assert_eq!(dispatcher.user_online(Uuid::new_v4()).await, 2);
        // One of two sockets closed: still online.
        assert_eq!(dispatcher.user_offline(user).await, 2);
        assert_eq!(dispatcher.user_offline(user).await, 1);
        assert_eq!(dispatcher.user_offline(user).await, 1);
    }
}
