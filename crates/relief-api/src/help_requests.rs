use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use relief_db::HelpRequestFilter;
use relief_types::api::{
    AddUpdateRequest, AssignHelpRequestRequest, CreateHelpRequestRequest, Envelope, NearbyQuery,
    StatusRequest, UpdateHelpRequestRequest,
};
use relief_types::events::{GatewayEvent, Room};
use relief_types::geo;
use relief_types::models::{
    Assignment, HelpRequest, HelpRequestStatus, RequestType, Role, UpdateEntry, User,
};
use relief_types::workflow::can_assign_help_request;

use crate::auth::{AppState, run_db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{require_role, require_verified_role};
use crate::resources::{disaster_ref, validate_location};
use crate::users::near_from_query;

const STAFF: &[Role] = &[Role::Admin, Role::Ngo];
const HANDLERS: &[Role] = &[Role::Admin, Role::Ngo, Role::Volunteer];

pub async fn create_help_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<CreateHelpRequestRequest>,
) -> ApiResult<impl IntoResponse> {
    require_role(&user, &[Role::AffectedIndividual])?;
    if req.request_type.is_empty() {
        return Err(ApiError::bad_request("At least one request type is required"));
    }
    if req.description.trim().is_empty() {
        return Err(ApiError::bad_request("Description is required"));
    }
    validate_location(&req.location)?;
    let number_of_people = req.number_of_people.unwrap_or(1);
    if number_of_people == 0 {
        return Err(ApiError::bad_request("Number of people must be at least 1"));
    }
    let disaster = disaster_ref(&state, req.disaster).await?;

    let now = Utc::now();
    let help_request = HelpRequest {
        id: Uuid::new_v4(),
        requested_by: user.to_ref(),
        disaster,
        request_type: dedup(req.request_type),
        description: req.description,
        urgency: req.urgency,
        location: req.location,
        number_of_people,
        status: HelpRequestStatus::Pending,
        assigned_to: Assignment::default(),
        images: req.images,
        updates: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let stored = help_request.clone();
    run_db(&state, move |db| db.insert_help_request(&stored)).await?;
    info!("{} raised help request {}", user.id, help_request.id);

    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(help_request).with_message("Help request created successfully")),
    ))
}

pub async fn list_help_requests(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Envelope<Vec<HelpRequest>>>> {
    require_role(&user, STAFF)?;
    let requests = run_db(&state, |db| db.list_help_requests(HelpRequestFilter::default())).await?;
    Ok(Json(Envelope::list(requests)))
}

pub async fn list_by_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(status): ApiPath<String>,
) -> ApiResult<Json<Envelope<Vec<HelpRequest>>>> {
    require_role(&user, STAFF)?;
    let status: HelpRequestStatus = status
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid status specified"))?;
    let filter = HelpRequestFilter { status: Some(status), ..Default::default() };
    let requests = run_db(&state, move |db| db.list_help_requests(filter)).await?;
    Ok(Json(Envelope::list(requests)))
}

pub async fn list_by_type(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(kind): ApiPath<String>,
) -> ApiResult<Json<Envelope<Vec<HelpRequest>>>> {
    require_role(&user, STAFF)?;
    let kind: RequestType = kind
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid request type specified"))?;
    let filter = HelpRequestFilter { kind: Some(kind), ..Default::default() };
    let requests = run_db(&state, move |db| db.list_help_requests(filter)).await?;
    Ok(Json(Envelope::list(requests)))
}

/// Requests raised by the caller.
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Envelope<Vec<HelpRequest>>>> {
    require_role(&user, &[Role::AffectedIndividual])?;
    let user_id = user.id;
    let requests = run_db(&state, move |db| db.list_help_requests_by(user_id)).await?;
    Ok(Json(Envelope::list(requests)))
}

/// Requests assigned to the calling NGO or volunteer.
pub async fn list_assigned(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Envelope<Vec<HelpRequest>>>> {
    require_role(&user, &[Role::Ngo, Role::Volunteer])?;
    let user_id = user.id;
    let requests = run_db(&state, move |db| db.list_assigned_help_requests(user_id)).await?;
    Ok(Json(Envelope::list(requests)))
}

pub async fn nearby_help_requests(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiQuery(query): ApiQuery<NearbyQuery>,
) -> ApiResult<Json<Envelope<Vec<HelpRequest>>>> {
    require_role(&user, STAFF)?;
    let near = near_from_query(&query, geo::DEFAULT_NEARBY_RADIUS_M)?;
    let requests = run_db(&state, move |db| db.nearby_help_requests(near)).await?;
    Ok(Json(Envelope::list(requests)))
}

pub async fn get_help_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<HelpRequest>>> {
    let help_request = load(&state, id).await?;
    if !help_request.can_view(user.id, user.role) {
        return Err(ApiError::forbidden("Not authorized to view this help request"));
    }
    Ok(Json(Envelope::data(help_request)))
}

pub async fn update_help_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateHelpRequestRequest>,
) -> ApiResult<Json<Envelope<HelpRequest>>> {
    require_role(&user, &[Role::AffectedIndividual])?;
    let mut help_request = load(&state, id).await?;
    if !help_request.is_requester(user.id) {
        return Err(ApiError::forbidden("Not authorized to update this help request"));
    }
    if !help_request.status.is_editable() {
        return Err(ApiError::bad_request(format!(
            "Cannot update help request with status: {}",
            help_request.status
        )));
    }

    if let Some(v) = req.request_type {
        if v.is_empty() {
            return Err(ApiError::bad_request("At least one request type is required"));
        }
        help_request.request_type = dedup(v);
    }
    if let Some(v) = req.description.filter(|d| !d.trim().is_empty()) {
        help_request.description = v;
    }
    if let Some(v) = req.urgency {
        help_request.urgency = v;
    }
    if let Some(v) = req.location {
        validate_location(&v)?;
        help_request.location = v;
    }
    if let Some(v) = req.number_of_people {
        if v == 0 {
            return Err(ApiError::bad_request("Number of people must be at least 1"));
        }
        help_request.number_of_people = v;
    }
    if req.disaster.is_some() {
        help_request.disaster = disaster_ref(&state, req.disaster).await?;
    }
    if let Some(v) = req.images {
        help_request.images = v;
    }

    let help_request = run_db(&state, move |db| db.edit_help_request(&help_request))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(
        Envelope::data(help_request).with_message("Help request updated successfully"),
    ))
}

pub async fn cancel_help_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<HelpRequest>>> {
    require_role(&user, &[Role::AffectedIndividual])?;
    let help_request = load(&state, id).await?;
    if !help_request.is_requester(user.id) {
        return Err(ApiError::forbidden("Not authorized to cancel this help request"));
    }
    if help_request.status.is_terminal() {
        return Err(ApiError::bad_request(format!(
            "Cannot cancel a {} help request",
            help_request.status.as_str().to_lowercase()
        )));
    }

    let note = UpdateEntry::new("Cancelled by requester", user.id);
    let help_request = run_db(&state, move |db| {
        db.set_help_request_status(id, HelpRequestStatus::Cancelled, Some(&note))
    })
    .await?
    .ok_or_else(not_found)?;
    Ok(Json(
        Envelope::data(help_request).with_message("Help request cancelled successfully"),
    ))
}

pub async fn assign_help_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignHelpRequestRequest>,
) -> ApiResult<Json<Envelope<HelpRequest>>> {
    require_verified_role(&user, STAFF)?;
    let help_request = load(&state, id).await?;

    if !can_assign_help_request(user.id, user.role, req.ngo) {
        return Err(ApiError::forbidden("Not authorized to assign this help request"));
    }
    if req.ngo.is_none() && req.volunteer.is_none() {
        return Err(ApiError::bad_request("An NGO or volunteer is required"));
    }
    if !help_request.status.accepts_assignment() {
        return Err(ApiError::bad_request(format!(
            "Cannot assign help request with status: {}",
            help_request.status
        )));
    }

    if let Some(ngo_id) = req.ngo {
        if !is_verified_with_role(&state, ngo_id, Role::Ngo).await? {
            return Err(ApiError::bad_request("Invalid or unverified NGO"));
        }
    }
    if let Some(volunteer_id) = req.volunteer {
        if !is_verified_with_role(&state, volunteer_id, Role::Volunteer).await? {
            return Err(ApiError::bad_request("Invalid or unverified volunteer"));
        }
    }

    let note = UpdateEntry::new("Request assigned", user.id);
    let (ngo, volunteer) = (req.ngo, req.volunteer);
    let help_request = run_db(&state, move |db| db.assign_help_request(id, ngo, volunteer, &note))
        .await?
        .ok_or_else(not_found)?;
    info!("{} assigned help request {}", user.id, help_request.id);
    notify_assignees(&state, &help_request);

    Ok(Json(
        Envelope::data(help_request).with_message("Help request assigned successfully"),
    ))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<Json<Envelope<HelpRequest>>> {
    require_verified_role(&user, HANDLERS)?;
    let status: HelpRequestStatus = req
        .status
        .ok_or_else(|| ApiError::bad_request("Status is required"))?
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid status specified"))?;

    let help_request = load(&state, id).await?;
    if !help_request.can_handle(user.id, user.role) {
        return Err(ApiError::forbidden(
            "Not authorized to update this help request status",
        ));
    }

    let note = UpdateEntry::new(format!("Status updated to {}", status), user.id);
    let help_request = run_db(&state, move |db| {
        db.set_help_request_status(id, status, Some(&note))
    })
    .await?
    .ok_or_else(not_found)?;
    Ok(Json(
        Envelope::data(help_request).with_message("Help request status updated successfully"),
    ))
}

pub async fn add_update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddUpdateRequest>,
) -> ApiResult<Json<Envelope<HelpRequest>>> {
    require_verified_role(&user, HANDLERS)?;
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Update message is required"))?;

    let help_request = load(&state, id).await?;
    if !help_request.can_handle(user.id, user.role) {
        return Err(ApiError::forbidden(
            "Not authorized to add updates to this help request",
        ));
    }

    let note = UpdateEntry::new(message, user.id);
    let help_request = run_db(&state, move |db| db.append_help_request_update(id, &note))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(
        Envelope::data(help_request).with_message("Help request update added successfully"),
    ))
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<HelpRequest> {
    run_db(state, move |db| db.get_help_request(id))
        .await?
        .ok_or_else(not_found)
}

fn not_found() -> ApiError {
    ApiError::not_found("Help request not found")
}

async fn is_verified_with_role(state: &AppState, id: Uuid, role: Role) -> ApiResult<bool> {
    let user = run_db(state, move |db| db.get_user(id)).await?;
    Ok(user.is_some_and(|u| u.role == role && u.is_verified))
}

fn notify_assignees(state: &AppState, help_request: &HelpRequest) {
    let ngo = help_request.assigned_to.ngo.as_ref().map(|u| u.id);
    let volunteer = help_request.assigned_to.volunteer.as_ref().map(|u| u.id);
    let rooms: Vec<Room> = ngo.into_iter().chain(volunteer).map(Room::for_user).collect();
    if rooms.is_empty() {
        return;
    }
    state.dispatcher.emit_to(
        rooms,
        &GatewayEvent::HelpRequestAssigned {
            help_request_id: help_request.id,
            status: help_request.status,
            ngo,
            volunteer,
        },
    );
}

fn dedup(mut kinds: Vec<RequestType>) -> Vec<RequestType> {
    let mut seen = Vec::with_capacity(kinds.len());
    kinds.retain(|k| {
        if seen.contains(k) {
            false
        } else {
            seen.push(*k);
            true
        }
    });
    kinds
}
