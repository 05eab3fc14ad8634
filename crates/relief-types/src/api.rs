use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AffectedArea, AffectedDetails, Address, Availability, DisasterType, Location, NgoDetails,
    RequestType, ResourceType, Role, Severity, User, VolunteerDetails,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

// -- Envelopes --

/// Every successful response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self { success: true, count: None, message: None, data: Some(data) }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        Self { success: true, count: Some(items.len()), message: None, data: Some(items) }
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self { success: true, count: None, message: Some(message.into()), data: None }
    }
}

/// Every error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub ngo_details: Option<NgoDetails>,
    #[serde(default)]
    pub volunteer_details: Option<VolunteerDetails>,
    #[serde(default)]
    pub affected_details: Option<AffectedDetails>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgoDetailsPatch {
    pub registration_number: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub founded_year: Option<i32>,
    pub documents: Option<Vec<String>>,
}

impl NgoDetailsPatch {
    pub fn apply(self, details: &mut NgoDetails) {
        if let Some(v) = self.registration_number {
            details.registration_number = Some(v);
        }
        if let Some(v) = self.description {
            details.description = Some(v);
        }
        if let Some(v) = self.website {
            details.website = Some(v);
        }
        if let Some(v) = self.founded_year {
            details.founded_year = Some(v);
        }
        if let Some(v) = self.documents {
            details.documents = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerDetailsPatch {
    pub skills: Option<Vec<String>>,
    pub availability: Option<Availability>,
    pub is_active: Option<bool>,
}

impl VolunteerDetailsPatch {
    pub fn apply(self, details: &mut VolunteerDetails) {
        if let Some(v) = self.skills {
            details.skills = v;
        }
        if let Some(v) = self.availability {
            details.availability = Some(v);
        }
        if let Some(v) = self.is_active {
            details.is_active = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedDetailsPatch {
    pub current_needs: Option<Vec<String>>,
    pub family_size: Option<u32>,
    pub current_location: Option<Location>,
    pub medical_conditions: Option<Vec<String>>,
}

impl AffectedDetailsPatch {
    pub fn apply(self, details: &mut AffectedDetails) {
        if let Some(v) = self.current_needs {
            details.current_needs = v;
        }
        if let Some(v) = self.family_size {
            details.family_size = Some(v);
        }
        if let Some(v) = self.current_location {
            details.current_location = Some(v);
        }
        if let Some(v) = self.medical_conditions {
            details.medical_conditions = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub profile_picture: Option<String>,
    pub ngo_details: Option<NgoDetailsPatch>,
    pub volunteer_details: Option<VolunteerDetailsPatch>,
    pub affected_details: Option<AffectedDetailsPatch>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(default)]
    pub coordinates: Option<Vec<f64>>,
}

/// Query string of every `nearby` style endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub max_distance: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<ResourceType>,
}

// -- Disasters --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDisasterRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DisasterType,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub affected_areas: Vec<AffectedArea>,
    pub alert_message: String,
    #[serde(default)]
    pub resources_needed: Vec<ResourceType>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDisasterRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<DisasterType>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub affected_areas: Option<Vec<AffectedArea>>,
    pub alert_message: Option<String>,
    pub resources_needed: Option<Vec<ResourceType>>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AddUpdateRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    #[serde(default)]
    pub alert_message: Option<String>,
}

// -- Resources --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub name: String,
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub location: Location,
    #[serde(default)]
    pub disaster: Option<Uuid>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    #[serde(rename = "type")]
    pub kind: Option<ResourceType>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub location: Option<Location>,
    pub disaster: Option<Uuid>,
    pub is_available: Option<bool>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignVolunteersRequest {
    #[serde(default)]
    pub volunteers: Option<Vec<Uuid>>,
}

/// Body of both status endpoints; parsed by hand so bad values get a clear message.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}

// -- Help requests --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHelpRequestRequest {
    pub request_type: Vec<RequestType>,
    pub description: String,
    #[serde(default)]
    pub urgency: Severity,
    pub location: Location,
    #[serde(default)]
    pub number_of_people: Option<u32>,
    #[serde(default)]
    pub disaster: Option<Uuid>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHelpRequestRequest {
    pub request_type: Option<Vec<RequestType>>,
    pub description: Option<String>,
    pub urgency: Option<Severity>,
    pub location: Option<Location>,
    pub number_of_people: Option<u32>,
    pub disaster: Option<Uuid>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignHelpRequestRequest {
    #[serde(default)]
    pub ngo: Option<Uuid>,
    #[serde(default)]
    pub volunteer: Option<Uuid>,
}
