use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Enums --

wire_enum! {
    /// Account role. Every route guard is expressed in terms of these.
    pub enum Role {
        Admin => "Admin",
        Ngo => "NGO",
        Volunteer => "Volunteer",
        AffectedIndividual => "AffectedIndividual",
    }
}

impl Role {
    /// NGO and volunteer accounts stay unverified until an admin approves them.
    pub fn verified_on_registration(self) -> bool {
        matches!(self, Role::Admin | Role::AffectedIndividual)
    }
}

wire_enum! {
    pub enum Availability {
        FullTime => "Full-time",
        PartTime => "Part-time",
        Weekends => "Weekends",
        EmergencyOnly => "Emergency-only",
    }
}

wire_enum! {
    pub enum DisasterType {
        Flood => "Flood",
        Earthquake => "Earthquake",
        Cyclone => "Cyclone",
        Fire => "Fire",
        Landslide => "Landslide",
        Tsunami => "Tsunami",
        Drought => "Drought",
        Other => "Other",
    }
}

wire_enum! {
    /// Shared by disaster severity and help-request urgency.
    pub enum Severity {
        Low => "Low",
        Medium => "Medium",
        High => "High",
        Critical => "Critical",
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

wire_enum! {
    pub enum ResourceType {
        Food => "Food",
        Water => "Water",
        Shelter => "Shelter",
        Medical => "Medical",
        Clothing => "Clothing",
        Rescue => "Rescue",
        Other => "Other",
    }
}

wire_enum! {
    pub enum ResourceStatus {
        Available => "Available",
        InTransit => "In Transit",
        Delivered => "Delivered",
        Depleted => "Depleted",
    }
}

wire_enum! {
    pub enum RequestType {
        Food => "Food",
        Water => "Water",
        Shelter => "Shelter",
        Medical => "Medical",
        Rescue => "Rescue",
        Other => "Other",
    }
}

wire_enum! {
    pub enum HelpRequestStatus {
        Pending => "Pending",
        Assigned => "Assigned",
        InProgress => "In Progress",
        Resolved => "Resolved",
        Cancelled => "Cancelled",
    }
}

wire_enum! {
    pub enum PointKind {
        Point => "Point",
    }
}

impl Default for PointKind {
    fn default() -> Self {
        PointKind::Point
    }
}

wire_enum! {
    pub enum AreaKind {
        Point => "Point",
        Polygon => "Polygon",
    }
}

// -- Geometry --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// GeoJSON point, `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: PointKind,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl Location {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: PointKind::Point,
            coordinates: [longitude, latitude],
            address: None,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AreaCoordinates {
    Point([f64; 2]),
    /// Linear rings: the first is the outer boundary, the rest are holes.
    Polygon(Vec<Vec<[f64; 2]>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedArea {
    #[serde(rename = "type")]
    pub kind: AreaKind,
    pub coordinates: AreaCoordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

// -- References --

/// A populated reference to another user: id plus display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterRef {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DisasterType,
}

/// One entry of an append-only update log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<Uuid>,
}

impl UpdateEntry {
    pub fn new(message: impl Into<String>, updated_by: Uuid) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            updated_by: Some(updated_by),
        }
    }
}

// -- Users --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgoDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i32>,
    #[serde(default)]
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerDetails {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<Location>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedDetails {
    #[serde(default)]
    pub current_needs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<Location>,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
}

/// A user as exposed over the API. The password hash never leaves the db crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ngo_details: Option<NgoDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_details: Option<VolunteerDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_details: Option<AffectedDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
        }
    }
}

// -- Disasters --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disaster {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DisasterType,
    pub description: String,
    pub severity: Severity,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub affected_areas: Vec<AffectedArea>,
    pub alert_message: String,
    pub created_by: Option<UserRef>,
    pub updated_by: Option<UserRef>,
    pub resources_needed: Vec<ResourceType>,
    pub images: Vec<String>,
    pub updates: Vec<UpdateEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Resources --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub name: String,
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub location: Location,
    pub provided_by: UserRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disaster: Option<DisasterRef>,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub assigned_volunteers: Vec<UserRef>,
    pub status: ResourceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Help requests --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ngo: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer: Option<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpRequest {
    pub id: Uuid,
    pub requested_by: UserRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disaster: Option<DisasterRef>,
    pub request_type: Vec<RequestType>,
    pub description: String,
    pub urgency: Severity,
    pub location: Location,
    pub number_of_people: u32,
    pub status: HelpRequestStatus,
    pub assigned_to: Assignment,
    pub images: Vec<String>,
    pub updates: Vec<UpdateEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
