//! Status machines and the ownership checks layered on top of them.

use uuid::Uuid;

use crate::models::{HelpRequest, HelpRequestStatus, Resource, ResourceStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot change status from {from} to {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

impl HelpRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use HelpRequestStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned | Cancelled)
                | (Assigned, Pending | InProgress | Cancelled)
                | (InProgress, Resolved | Cancelled)
        )
    }

    pub fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self.as_str(), to: next.as_str() })
        }
    }

    /// Assignment (and re-assignment) happens before work starts.
    pub fn accepts_assignment(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned)
    }

    /// Requesters may only edit what nobody has picked up yet.
    pub fn is_editable(self) -> bool {
        self == Self::Pending
    }

    /// Still waiting for someone to act; used by the nearby search.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned)
    }
}

impl ResourceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Depleted)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use ResourceStatus::*;
        matches!(
            (self, next),
            (Available, InTransit | Depleted) | (InTransit, Available | Delivered | Depleted)
        )
    }

    pub fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self.as_str(), to: next.as_str() })
        }
    }

    /// Delivered and depleted stock is no longer offered.
    pub fn keeps_available(self) -> bool {
        !self.is_terminal()
    }
}

impl HelpRequest {
    pub fn is_requester(&self, user_id: Uuid) -> bool {
        self.requested_by.id == user_id
    }

    pub fn is_assigned_ngo(&self, user_id: Uuid) -> bool {
        self.assigned_to.ngo.as_ref().is_some_and(|n| n.id == user_id)
    }

    pub fn is_assigned_volunteer(&self, user_id: Uuid) -> bool {
        self.assigned_to.volunteer.as_ref().is_some_and(|v| v.id == user_id)
    }

    /// Admins and NGOs see every request; others only their own or assigned ones.
    pub fn can_view(&self, user_id: Uuid, role: Role) -> bool {
        matches!(role, Role::Admin | Role::Ngo)
            || self.is_assigned_volunteer(user_id)
            || self.is_requester(user_id)
    }

    /// Who may move the status forward or post progress notes.
    pub fn can_handle(&self, user_id: Uuid, role: Role) -> bool {
        role == Role::Admin || self.is_assigned_ngo(user_id) || self.is_assigned_volunteer(user_id)
    }
}

/// Admins assign anyone; an NGO may only assign itself.
pub fn can_assign_help_request(actor_id: Uuid, actor_role: Role, ngo: Option<Uuid>) -> bool {
    match actor_role {
        Role::Admin => true,
        Role::Ngo => ngo == Some(actor_id),
        _ => false,
    }
}

impl Resource {
    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.provided_by.id == user_id
    }

    pub fn is_assigned(&self, user_id: Uuid) -> bool {
        self.assigned_volunteers.iter().any(|v| v.id == user_id)
    }

    pub fn can_change_status(&self, user_id: Uuid, role: Role) -> bool {
        match role {
            Role::Ngo => self.is_owner(user_id),
            Role::Volunteer => self.is_assigned(user_id),
            _ => false,
        }
    }
}
