use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relief_types::api::Claims;
use relief_types::events::{GatewayCommand, GatewayEvent, Room};
use relief_types::geo;
use relief_types::models::Role;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a new socket has to send `identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// The authenticated user behind a connection.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub user_id: Uuid,
    pub role: Role,
}

/// Resolves the account behind a token at identify time.
pub trait AccountLookup: Send + Sync + 'static {
    /// The account's current role, or `None` if it no longer exists.
    fn current_role(&self, user_id: Uuid) -> anyhow::Result<Option<Role>>;
}

/// Rooms joined by one connection, shared between its send and receive tasks.
#[derive(Debug, Clone, Default)]
pub struct Membership(Arc<RwLock<HashSet<Room>>>);

impl Membership {
    /// The rooms every identified connection starts in.
    pub fn initial(session: Session) -> Self {
        let rooms = [
            Room::all_users(),
            Room::for_role(session.role),
            Room::for_user(session.user_id),
        ];
        Self(Arc::new(RwLock::new(rooms.into_iter().collect())))
    }

    pub fn contains(&self, room: &Room) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).contains(room)
    }

    /// Returns false if the room was already joined.
    pub fn join(&self, room: Room) -> bool {
        self.0.write().unwrap_or_else(PoisonError::into_inner).insert(room)
    }

    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        rooms
    }
}

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Handle a single WebSocket connection: identify, then relay room traffic.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    jwt_secret: String,
    accounts: Arc<dyn AccountLookup>,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(session) = wait_for_identify(&mut receiver, &jwt_secret, accounts).await else {
        warn!("WebSocket client failed to identify, closing");
        let _ = send_event(
            &mut sender,
            &GatewayEvent::Error { message: "Authentication failed".to_string() },
        )
        .await;
        return;
    };

    let membership = Membership::initial(session);
    let ready = GatewayEvent::Ready {
        user_id: session.user_id,
        role: session.role,
        rooms: membership.rooms(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let online = dispatcher.user_online(session.user_id).await;
    info!(
        "{} ({}) connected to gateway, {} user(s) online",
        session.user_id, session.role, online
    );

    run_connection_loop(sender, receiver, dispatcher.clone(), session, membership).await;

    let online = dispatcher.user_offline(session.user_id).await;
    info!(
        "{} disconnected from gateway, {} user(s) online",
        session.user_id, online
    );
}

async fn run_connection_loop(
    mut sender: WsSink,
    mut receiver: WsStream,
    dispatcher: Dispatcher,
    session: Session,
    membership: Membership,
) {
    let mut broadcast_rx = dispatcher.subscribe();

    // Replies addressed to this connection only (join confirmations, errors).
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let send_membership = membership.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !msg.is_for(|room| send_membership.contains(room)) {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(event) = reply else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_dispatcher = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if let Some(reply) =
                            handle_command(&recv_dispatcher, session, &membership, cmd)
                        {
                            let _ = reply_tx.send(reply);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            session.user_id,
                            e,
                            preview(&text, 200)
                        );
                        let _ = reply_tx.send(GatewayEvent::Error {
                            message: "Malformed command".to_string(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn send_event(sender: &mut WsSink, event: &GatewayEvent) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| warn!("Failed to encode event: {}", e))?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn wait_for_identify(
    receiver: &mut WsStream,
    jwt_secret: &str,
    accounts: Arc<dyn AccountLookup>,
) -> Option<Session> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return authenticate(&token, jwt_secret, accounts.clone()).await;
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Verify the token, then check the account still exists. The session takes
/// the stored role, not the one baked into the token.
pub async fn authenticate(
    token: &str,
    jwt_secret: &str,
    accounts: Arc<dyn AccountLookup>,
) -> Option<Session> {
    let user_id = verify_token(token, jwt_secret)?.user_id;
    let lookup = tokio::task::spawn_blocking(move || accounts.current_role(user_id)).await;
    match lookup {
        Ok(Ok(Some(role))) => Some(Session { user_id, role }),
        Ok(Ok(None)) => {
            warn!("Gateway token for unknown user {}", user_id);
            None
        }
        Ok(Err(e)) => {
            warn!("Account lookup for {} failed: {:#}", user_id, e);
            None
        }
        Err(e) => {
            warn!("Account lookup task failed: {}", e);
            None
        }
    }
}

/// At most `max` characters of `text`, cut on a char boundary.
fn preview(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(i, _)| &text[..i])
}

/// Decode a bearer token into a session.
pub fn verify_token(token: &str, jwt_secret: &str) -> Option<Session> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    Some(Session {
        user_id: data.claims.sub,
        role: data.claims.role,
    })
}

/// Apply one client command. Returns a reply for this connection, if any.
pub fn handle_command(
    dispatcher: &Dispatcher,
    session: Session,
    membership: &Membership,
    cmd: GatewayCommand,
) -> Option<GatewayEvent> {
    match cmd {
        GatewayCommand::Identify { .. } => None, // Already handled

        GatewayCommand::JoinRoom(room) => {
            if !room.may_join(session.user_id, session.role) {
                warn!("{} ({}) refused room {}", session.user_id, session.role, room);
                return Some(GatewayEvent::Error {
                    message: format!("Not allowed to join room {}", room),
                });
            }
            if membership.join(room.clone()) {
                debug!("{} joined room {}", session.user_id, room);
            }
            Some(GatewayEvent::Joined { room })
        }

        GatewayCommand::DisasterAlert(mut alert) => {
            if session.role != Role::Admin {
                return Some(GatewayEvent::Error {
                    message: "Only admins can send disaster alerts".to_string(),
                });
            }
            info!("{} broadcasting disaster alert: {}", session.user_id, alert.message);
            alert.sent_by = Some(session.user_id);
            alert.timestamp = Utc::now();
            dispatcher.emit(Room::all_users(), &GatewayEvent::DisasterAlert(alert));
            None
        }

        GatewayCommand::UpdateLocation(mut location) => {
            if session.role != Role::Volunteer {
                return Some(GatewayEvent::Error {
                    message: "Only volunteers can share their location".to_string(),
                });
            }
            let [lon, lat] = location.coordinates;
            if let Err(e) = geo::validate(lon, lat) {
                return Some(GatewayEvent::Error { message: e.to_string() });
            }
            location.volunteer_id = Some(session.user_id);
            location.timestamp = Utc::now();
            dispatcher.emit_to(
                vec![Room::for_role(Role::Admin), Room::for_role(Role::Ngo)],
                &GatewayEvent::VolunteerLocation(location),
            );
            None
        }
    }
}
