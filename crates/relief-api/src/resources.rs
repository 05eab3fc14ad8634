use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use relief_db::ResourceFilter;
use relief_types::api::{
    AssignVolunteersRequest, CreateResourceRequest, Envelope, NearbyQuery, StatusRequest,
    UpdateResourceRequest,
};
use relief_types::geo;
use relief_types::models::{
    DisasterRef, Location, Resource, ResourceStatus, ResourceType, Role, User, UserRef,
};

use crate::auth::{AppState, run_db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::require_verified_role;
use crate::users::near_from_query;

pub async fn create_resource(
    State(state): State<AppState>,
    Extension(ngo): Extension<User>,
    ApiJson(req): ApiJson<CreateResourceRequest>,
) -> ApiResult<impl IntoResponse> {
    require_verified_role(&ngo, &[Role::Ngo])?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Resource name is required"));
    }
    validate_quantity(req.quantity)?;
    validate_location(&req.location)?;
    let disaster = disaster_ref(&state, req.disaster).await?;

    let now = Utc::now();
    let resource = Resource {
        id: Uuid::new_v4(),
        kind: req.kind,
        name: req.name,
        description: req.description,
        quantity: req.quantity,
        unit: req.unit,
        location: req.location,
        provided_by: ngo.to_ref(),
        disaster,
        is_available: true,
        expiry_date: req.expiry_date,
        images: req.images,
        assigned_volunteers: Vec::new(),
        status: ResourceStatus::Available,
        created_at: now,
        updated_at: now,
    };

    let stored = resource.clone();
    run_db(&state, move |db| db.insert_resource(&stored)).await?;
    info!("{} added resource {} ({})", ngo.id, resource.name, resource.id);

    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(resource).with_message("Resource created successfully")),
    ))
}

pub async fn list_resources(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<Resource>>>> {
    let resources = run_db(&state, |db| db.list_resources(ResourceFilter::default())).await?;
    Ok(Json(Envelope::list(resources)))
}

pub async fn list_by_type(
    State(state): State<AppState>,
    ApiPath(kind): ApiPath<String>,
) -> ApiResult<Json<Envelope<Vec<Resource>>>> {
    let kind: ResourceType = kind
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid resource type specified"))?;
    let filter = ResourceFilter {
        kind: Some(kind),
        available_only: true,
        ..Default::default()
    };
    let resources = run_db(&state, move |db| db.list_resources(filter)).await?;
    Ok(Json(Envelope::list(resources)))
}

pub async fn list_by_ngo(
    State(state): State<AppState>,
    ApiPath(ngo_id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<Vec<Resource>>>> {
    let filter = ResourceFilter {
        provided_by: Some(ngo_id),
        ..Default::default()
    };
    let resources = run_db(&state, move |db| db.list_resources(filter)).await?;
    Ok(Json(Envelope::list(resources)))
}

pub async fn nearby_resources(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<NearbyQuery>,
) -> ApiResult<Json<Envelope<Vec<Resource>>>> {
    let near = near_from_query(&query, geo::DEFAULT_NEARBY_RADIUS_M)?;
    let kind = query.kind;
    let resources = run_db(&state, move |db| db.nearby_resources(near, kind)).await?;
    Ok(Json(Envelope::list(resources)))
}

pub async fn get_resource(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<Resource>>> {
    Ok(Json(Envelope::data(load(&state, id).await?)))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Extension(ngo): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateResourceRequest>,
) -> ApiResult<Json<Envelope<Resource>>> {
    require_verified_role(&ngo, &[Role::Ngo])?;
    let mut resource = load(&state, id).await?;
    if !resource.is_owner(ngo.id) {
        return Err(ApiError::forbidden("Not authorized to update this resource"));
    }

    if let Some(v) = req.kind {
        resource.kind = v;
    }
    if let Some(v) = req.name.filter(|n| !n.trim().is_empty()) {
        resource.name = v;
    }
    if let Some(v) = req.description {
        resource.description = v;
    }
    if let Some(v) = req.quantity {
        validate_quantity(v)?;
        resource.quantity = v;
    }
    if let Some(v) = req.unit {
        resource.unit = v;
    }
    if let Some(v) = req.location {
        validate_location(&v)?;
        resource.location = v;
    }
    if req.disaster.is_some() {
        resource.disaster = disaster_ref(&state, req.disaster).await?;
    }
    if let Some(v) = req.is_available {
        resource.is_available = v;
    }
    if let Some(v) = req.expiry_date {
        resource.expiry_date = Some(v);
    }
    if let Some(v) = req.images {
        resource.images = v;
    }

    let resource = run_db(&state, move |db| db.save_resource(&resource))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(Envelope::data(resource).with_message("Resource updated successfully")))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Extension(ngo): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    require_verified_role(&ngo, &[Role::Ngo])?;
    let resource = load(&state, id).await?;
    if !resource.is_owner(ngo.id) {
        return Err(ApiError::forbidden("Not authorized to delete this resource"));
    }
    run_db(&state, move |db| db.delete_resource(id)).await?;
    info!("{} deleted resource {}", ngo.id, id);
    Ok(Json(Envelope::message("Resource deleted successfully")))
}

pub async fn assign_volunteers(
    State(state): State<AppState>,
    Extension(ngo): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignVolunteersRequest>,
) -> ApiResult<Json<Envelope<Resource>>> {
    require_verified_role(&ngo, &[Role::Ngo])?;
    let volunteer_ids = req
        .volunteers
        .ok_or_else(|| ApiError::bad_request("Volunteers array is required"))?;

    let resource = load(&state, id).await?;
    if !resource.is_owner(ngo.id) {
        return Err(ApiError::forbidden(
            "Not authorized to assign volunteers to this resource",
        ));
    }

    let mut volunteers: Vec<UserRef> = Vec::with_capacity(volunteer_ids.len());
    for volunteer_id in volunteer_ids {
        let volunteer = run_db(&state, move |db| db.get_user(volunteer_id))
            .await?
            .filter(|u| u.role == Role::Volunteer && u.is_verified)
            .ok_or_else(|| {
                ApiError::bad_request(format!("Invalid or unverified volunteer ID: {}", volunteer_id))
            })?;
        if !volunteers.iter().any(|v| v.id == volunteer.id) {
            volunteers.push(volunteer.to_ref());
        }
    }

    if resource.status != ResourceStatus::InTransit {
        resource.status.transition(ResourceStatus::InTransit)?;
    }

    let resource = run_db(&state, move |db| db.assign_resource_volunteers(id, &volunteers))
        .await?
        .ok_or_else(not_found)?;
    info!(
        "{} assigned {} volunteer(s) to resource {}",
        ngo.id,
        resource.assigned_volunteers.len(),
        resource.id
    );
    Ok(Json(Envelope::data(resource).with_message("Volunteers assigned successfully")))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<Json<Envelope<Resource>>> {
    require_verified_role(&user, &[Role::Ngo, Role::Volunteer])?;
    let status: ResourceStatus = req
        .status
        .ok_or_else(|| ApiError::bad_request("Status is required"))?
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid status specified"))?;

    let resource = load(&state, id).await?;
    if !resource.can_change_status(user.id, user.role) {
        return Err(ApiError::forbidden(
            "Not authorized to update this resource status",
        ));
    }

    let resource = run_db(&state, move |db| db.set_resource_status(id, status))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(
        Envelope::data(resource).with_message("Resource status updated successfully"),
    ))
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<Resource> {
    run_db(state, move |db| db.get_resource(id))
        .await?
        .ok_or_else(not_found)
}

fn not_found() -> ApiError {
    ApiError::not_found("Resource not found")
}

/// Resolve an optional disaster id into a populated reference.
pub(crate) async fn disaster_ref(state: &AppState, id: Option<Uuid>) -> ApiResult<Option<DisasterRef>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let disaster = run_db(state, move |db| db.get_disaster(id))
        .await?
        .ok_or_else(|| ApiError::bad_request("Disaster not found"))?;
    Ok(Some(DisasterRef {
        id: disaster.id,
        name: disaster.name,
        kind: disaster.kind,
    }))
}

fn validate_quantity(quantity: f64) -> ApiResult<()> {
    if quantity.is_finite() && quantity >= 0.0 {
        Ok(())
    } else {
        Err(ApiError::bad_request("Quantity cannot be negative"))
    }
}

pub(crate) fn validate_location(location: &Location) -> ApiResult<()> {
    geo::validate(location.longitude(), location.latitude())
        .map_err(|e| ApiError::bad_request(e.to_string()))
}
