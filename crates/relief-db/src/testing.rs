use chrono::Utc;
use uuid::Uuid;

use relief_types::models::{
    AffectedArea, Assignment, Disaster, DisasterType, HelpRequest, HelpRequestStatus, Location,
    RequestType, Resource, ResourceStatus, ResourceType, Role, Severity, User,
};

use crate::NewUser;

pub(crate) fn new_user(email: &str, role: Role, verified: bool) -> NewUser {
    NewUser {
        id: Uuid::new_v4(),
        name: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        role,
        is_verified: verified,
        phone: Some("555-0100".to_string()),
        address: None,
        ngo_details: None,
        skills: vec![],
        availability: None,
        affected_details: None,
    }
}

pub(crate) fn new_disaster(admin: &User, areas: Vec<AffectedArea>) -> Disaster {
    let now = Utc::now();
    Disaster {
        id: Uuid::new_v4(),
        name: "Monsoon flooding".to_string(),
        kind: DisasterType::Flood,
        description: "River banks breached".to_string(),
        severity: Severity::High,
        start_date: now,
        end_date: None,
        is_active: true,
        affected_areas: areas,
        alert_message: "Move to higher ground".to_string(),
        created_by: Some(admin.to_ref()),
        updated_by: None,
        resources_needed: vec![ResourceType::Water],
        images: vec![],
        updates: vec![],
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn new_resource(provider: &User, kind: ResourceType, at: [f64; 2]) -> Resource {
    let now = Utc::now();
    Resource {
        id: Uuid::new_v4(),
        kind,
        name: format!("{} kit", kind),
        description: "Packed supplies".to_string(),
        quantity: 100.0,
        unit: "boxes".to_string(),
        location: Location::point(at[0], at[1]),
        provided_by: provider.to_ref(),
        disaster: None,
        is_available: true,
        expiry_date: None,
        images: vec![],
        assigned_volunteers: vec![],
        status: ResourceStatus::Available,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn new_help_request(requester: &User, kinds: Vec<RequestType>, at: [f64; 2]) -> HelpRequest {
    let now = Utc::now();
    HelpRequest {
        id: Uuid::new_v4(),
        requested_by: requester.to_ref(),
        disaster: None,
        request_type: kinds,
        description: "Family stranded on roof".to_string(),
        urgency: Severity::Critical,
        location: Location::point(at[0], at[1]),
        number_of_people: 4,
        status: HelpRequestStatus::Pending,
        assigned_to: Assignment::default(),
        images: vec![],
        updates: vec![],
        created_at: now,
        updated_at: now,
    }
}
