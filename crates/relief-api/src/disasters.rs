use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use relief_types::api::{
    AddUpdateRequest, AlertRequest, CreateDisasterRequest, Envelope, NearbyQuery,
    UpdateDisasterRequest,
};
use relief_types::events::{DisasterAlert, GatewayEvent, Room};
use relief_types::geo;
use relief_types::models::{AffectedArea, AreaCoordinates, AreaKind, Disaster, Role, UpdateEntry, User};

use crate::auth::{AppState, run_db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::require_role;
use crate::users::near_from_query;

pub async fn create_disaster(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiJson(req): ApiJson<CreateDisasterRequest>,
) -> ApiResult<impl IntoResponse> {
    require_role(&admin, &[Role::Admin])?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Disaster name is required"));
    }
    if req.alert_message.trim().is_empty() {
        return Err(ApiError::bad_request("Alert message is required"));
    }
    validate_areas(&req.affected_areas)?;

    let now = Utc::now();
    let disaster = Disaster {
        id: Uuid::new_v4(),
        name: req.name,
        kind: req.kind,
        description: req.description,
        severity: req.severity,
        start_date: req.start_date.unwrap_or(now),
        end_date: req.end_date,
        is_active: true,
        affected_areas: req.affected_areas,
        alert_message: req.alert_message,
        created_by: Some(admin.to_ref()),
        updated_by: Some(admin.to_ref()),
        resources_needed: req.resources_needed,
        images: req.images,
        updates: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let stored = disaster.clone();
    run_db(&state, move |db| db.insert_disaster(&stored)).await?;
    info!("{} created disaster {} ({})", admin.id, disaster.name, disaster.id);
    broadcast_alert(&state, &disaster, admin.id);

    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(disaster).with_message("Disaster created successfully")),
    ))
}

pub async fn list_disasters(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<Disaster>>>> {
    let disasters = run_db(&state, |db| db.list_disasters(false)).await?;
    Ok(Json(Envelope::list(disasters)))
}

pub async fn list_active(State(state): State<AppState>) -> ApiResult<Json<Envelope<Vec<Disaster>>>> {
    let disasters = run_db(&state, |db| db.list_disasters(true)).await?;
    Ok(Json(Envelope::list(disasters)))
}

pub async fn disasters_by_location(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<NearbyQuery>,
) -> ApiResult<Json<Envelope<Vec<Disaster>>>> {
    let near = near_from_query(&query, geo::DEFAULT_AREA_RADIUS_M)?;
    let disasters = run_db(&state, move |db| db.disasters_covering(near)).await?;
    Ok(Json(Envelope::list(disasters)))
}

pub async fn get_disaster(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<Disaster>>> {
    let disaster = load(&state, id).await?;
    Ok(Json(Envelope::data(disaster)))
}

pub async fn update_disaster(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateDisasterRequest>,
) -> ApiResult<Json<Envelope<Disaster>>> {
    require_role(&admin, &[Role::Admin])?;
    let mut disaster = load(&state, id).await?;
    let previous_alert = disaster.alert_message.clone();

    if let Some(v) = req.name.filter(|n| !n.trim().is_empty()) {
        disaster.name = v;
    }
    if let Some(v) = req.kind {
        disaster.kind = v;
    }
    if let Some(v) = req.description {
        disaster.description = v;
    }
    if let Some(v) = req.severity {
        disaster.severity = v;
    }
    if let Some(v) = req.start_date {
        disaster.start_date = v;
    }
    if let Some(v) = req.end_date {
        disaster.end_date = Some(v);
    }
    if let Some(v) = req.is_active {
        disaster.is_active = v;
    }
    if let Some(v) = req.affected_areas {
        validate_areas(&v)?;
        disaster.affected_areas = v;
    }
    if let Some(v) = req.alert_message.filter(|m| !m.trim().is_empty()) {
        disaster.alert_message = v;
    }
    if let Some(v) = req.resources_needed {
        disaster.resources_needed = v;
    }
    if let Some(v) = req.images {
        disaster.images = v;
    }
    disaster.updated_by = Some(admin.to_ref());
    disaster.updated_at = Utc::now();

    let disaster = run_db(&state, move |db| db.save_disaster(&disaster))
        .await?
        .ok_or_else(not_found)?;
    if disaster.alert_message != previous_alert {
        broadcast_alert(&state, &disaster, admin.id);
    }
    Ok(Json(Envelope::data(disaster).with_message("Disaster updated successfully")))
}

pub async fn delete_disaster(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    require_role(&admin, &[Role::Admin])?;
    if !run_db(&state, move |db| db.delete_disaster(id)).await? {
        return Err(not_found());
    }
    info!("{} deleted disaster {}", admin.id, id);
    Ok(Json(Envelope::message("Disaster deleted successfully")))
}

pub async fn add_update(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddUpdateRequest>,
) -> ApiResult<Json<Envelope<Disaster>>> {
    require_role(&admin, &[Role::Admin])?;
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Update message is required"))?;

    let note = UpdateEntry::new(message, admin.id);
    let admin_id = admin.id;
    let disaster = run_db(&state, move |db| db.append_disaster_update(id, &note, admin_id))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(Envelope::data(disaster).with_message("Disaster update added successfully")))
}

pub async fn send_alert(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AlertRequest>,
) -> ApiResult<Json<Envelope<Disaster>>> {
    require_role(&admin, &[Role::Admin])?;
    let alert_message = req
        .alert_message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Alert message is required"))?;

    let admin_id = admin.id;
    let disaster = run_db(&state, move |db| db.set_disaster_alert(id, &alert_message, admin_id))
        .await?
        .ok_or_else(not_found)?;
    broadcast_alert(&state, &disaster, admin.id);
    Ok(Json(Envelope::data(disaster).with_message("Disaster alert sent successfully")))
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<Disaster> {
    run_db(state, move |db| db.get_disaster(id))
        .await?
        .ok_or_else(not_found)
}

fn not_found() -> ApiError {
    ApiError::not_found("Disaster not found")
}

fn broadcast_alert(state: &AppState, disaster: &Disaster, sent_by: Uuid) {
    if !disaster.is_active {
        return;
    }
    info!("Broadcasting alert for disaster {}", disaster.id);
    state.dispatcher.emit(
        Room::all_users(),
        &GatewayEvent::DisasterAlert(DisasterAlert {
            disaster_id: Some(disaster.id),
            name: Some(disaster.name.clone()),
            severity: Some(disaster.severity),
            message: disaster.alert_message.clone(),
            sent_by: Some(sent_by),
            timestamp: Utc::now(),
        }),
    );
}

/// Geometry must match its declared kind and use valid coordinates.
fn validate_areas(areas: &[AffectedArea]) -> ApiResult<()> {
    let invalid = || ApiError::bad_request("Invalid affected area geometry");
    for area in areas {
        match (area.kind, &area.coordinates) {
            (AreaKind::Point, AreaCoordinates::Point([lon, lat])) => {
                geo::validate(*lon, *lat).map_err(|_| invalid())?;
            }
            (AreaKind::Polygon, AreaCoordinates::Polygon(rings)) => {
                let outer = rings.first().ok_or_else(invalid)?;
                if outer.len() < 4 {
                    return Err(invalid());
                }
                for ring in rings {
                    for [lon, lat] in ring {
                        geo::validate(*lon, *lat).map_err(|_| invalid())?;
                    }
                }
            }
            _ => return Err(invalid()),
        }
    }
    Ok(())
}
