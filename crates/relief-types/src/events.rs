use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{HelpRequestStatus, Role, Severity};

/// A named fan-out group on the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Room(String);

impl Room {
    pub const ALL_USERS: &'static str = "all-users";
    const USER_PREFIX: &'static str = "user:";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn all_users() -> Self {
        Self::new(Self::ALL_USERS)
    }

    pub fn for_role(role: Role) -> Self {
        Self::new(match role {
            Role::Admin => "admin",
            Role::Ngo => "ngo",
            Role::Volunteer => "volunteer",
            Role::AffectedIndividual => "affected",
        })
    }

    /// Personal room used for targeted notifications.
    pub fn for_user(user_id: Uuid) -> Self {
        Self(format!("{}{}", Self::USER_PREFIX, user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a user with `role` may join this room.
    ///
    /// Role rooms and personal rooms are reserved: a user may only join their
    /// own, and admins may also listen in on any role room. Any other name is
    /// an open room.
    pub fn may_join(&self, user_id: Uuid, role: Role) -> bool {
        if self.0.starts_with(Self::USER_PREFIX) {
            return *self == Self::for_user(user_id);
        }
        match Role::ALL.iter().find(|r| *self == Self::for_role(**r)) {
            Some(owner) => *owner == role || role == Role::Admin,
            None => true,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disaster_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_by: Option<Uuid>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<Uuid>,
    pub coordinates: [f64; 2],
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Events sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms successful identification
    Ready { user_id: Uuid, role: Role, rooms: Vec<Room> },

    /// Connection joined a room
    Joined { room: Room },

    /// Disaster alert for everyone
    DisasterAlert(DisasterAlert),

    /// A volunteer reported their position
    VolunteerLocation(VolunteerLocation),

    /// A help request was (re)assigned to the receiving user
    HelpRequestAssigned {
        help_request_id: Uuid,
        status: HelpRequestStatus,
        ngo: Option<Uuid>,
        volunteer: Option<Uuid>,
    },

    /// A command was refused
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Join a named room
    JoinRoom(Room),

    /// Broadcast an alert to every connected user (admins only)
    DisasterAlert(DisasterAlert),

    /// Share the sender's position with admins and NGOs (volunteers only)
    UpdateLocation(VolunteerLocation),
}
