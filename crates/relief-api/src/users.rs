use axum::{Extension, Json, extract::State};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use relief_db::Near;
use relief_types::api::{Envelope, NearbyQuery, UpdateLocationRequest, UpdateProfileRequest};
use relief_types::events::{GatewayEvent, Room, VolunteerLocation};
use relief_types::geo;
use relief_types::models::{Location, Role, User};

use crate::auth::{AppState, run_db};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::require_role;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Envelope<Vec<User>>>> {
    require_role(&user, &[Role::Admin])?;
    let users = run_db(&state, |db| db.list_users(None)).await?;
    Ok(Json(Envelope::list(users)))
}

pub async fn list_users_by_role(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiPath(role): ApiPath<String>,
) -> ApiResult<Json<Envelope<Vec<User>>>> {
    require_role(&user, &[Role::Admin])?;
    let role: Role = role
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid role specified"))?;
    let users = run_db(&state, move |db| db.list_users(Some(role))).await?;
    Ok(Json(Envelope::list(users)))
}

pub async fn list_unverified(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Envelope<Vec<User>>>> {
    require_role(&user, &[Role::Admin])?;
    let users = run_db(&state, |db| db.list_unverified_users()).await?;
    Ok(Json(Envelope::list(users)))
}

pub async fn verify_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<User>>> {
    require_role(&admin, &[Role::Admin])?;
    let user = run_db(&state, move |db| {
        if !db.set_user_verified(id, true)? {
            return Ok(None);
        }
        db.get_user(id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("{} verified {} ({})", admin.id, user.email, user.role);
    Ok(Json(Envelope::data(user).with_message("User verified successfully")))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    require_role(&admin, &[Role::Admin])?;
    if !run_db(&state, move |db| db.delete_user(id)).await? {
        return Err(ApiError::not_found("User not found"));
    }
    info!("{} deleted user {}", admin.id, id);
    Ok(Json(Envelope::message("User deleted successfully")))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<Envelope<User>>> {
    if let Some(name) = req.name.filter(|n| !n.trim().is_empty()) {
        user.name = name;
    }
    if let Some(phone) = req.phone {
        user.phone = Some(phone);
    }
    if let Some(address) = req.address {
        user.address = Some(address);
    }
    if let Some(picture) = req.profile_picture {
        user.profile_picture = Some(picture);
    }

    // Role details merge field by field and only for the caller's own role.
    match user.role {
        Role::Ngo => {
            if let Some(patch) = req.ngo_details {
                patch.apply(user.ngo_details.get_or_insert_with(Default::default));
            }
        }
        Role::Volunteer => {
            if let Some(patch) = req.volunteer_details {
                patch.apply(user.volunteer_details.get_or_insert_with(Default::default));
            }
        }
        Role::AffectedIndividual => {
            if let Some(patch) = req.affected_details {
                patch.apply(user.affected_details.get_or_insert_with(Default::default));
            }
        }
        Role::Admin => {}
    }

    user.updated_at = Utc::now();
    let saved = user.clone();
    run_db(&state, move |db| db.save_profile(&saved)).await?;
    Ok(Json(Envelope::data(user).with_message("Profile updated successfully")))
}

pub async fn update_location(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<UpdateLocationRequest>,
) -> ApiResult<Json<Envelope<Location>>> {
    require_role(&user, &[Role::Volunteer])?;
    let coordinates = match req.coordinates.as_deref() {
        Some(&[lon, lat]) => [lon, lat],
        _ => {
            return Err(ApiError::bad_request(
                "Invalid coordinates format. Should be [longitude, latitude]",
            ));
        }
    };
    geo::validate(coordinates[0], coordinates[1])
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let user_id = user.id;
    if !run_db(&state, move |db| db.update_volunteer_location(user_id, coordinates)).await? {
        return Err(ApiError::not_found("User not found"));
    }

    state.dispatcher.emit_to(
        vec![Room::for_role(Role::Admin), Room::for_role(Role::Ngo)],
        &GatewayEvent::VolunteerLocation(VolunteerLocation {
            volunteer_id: Some(user_id),
            coordinates,
            timestamp: Utc::now(),
        }),
    );

    Ok(Json(
        Envelope::data(Location::point(coordinates[0], coordinates[1]))
            .with_message("Location updated successfully"),
    ))
}

pub async fn nearby_volunteers(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiQuery(query): ApiQuery<NearbyQuery>,
) -> ApiResult<Json<Envelope<Vec<User>>>> {
    require_role(&user, &[Role::Admin, Role::Ngo])?;
    let near = near_from_query(&query, geo::DEFAULT_NEARBY_RADIUS_M)?;
    let volunteers = run_db(&state, move |db| db.nearby_volunteers(near)).await?;
    Ok(Json(Envelope::list(volunteers)))
}

/// Centre and radius of a nearby search; both coordinates are required.
pub(crate) fn near_from_query(query: &NearbyQuery, default_radius_m: f64) -> ApiResult<Near> {
    let (Some(lon), Some(lat)) = (query.longitude, query.latitude) else {
        return Err(ApiError::bad_request("Longitude and latitude are required"));
    };
    geo::validate(lon, lat).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let radius = query.max_distance.unwrap_or(default_radius_m);
    if !radius.is_finite() || radius < 0.0 {
        return Err(ApiError::bad_request("maxDistance must be a non-negative number"));
    }
    Ok(Near::new([lon, lat], radius))
}

