pub mod auth;
pub mod disasters;
pub mod error;
pub mod extract;
pub mod help_requests;
pub mod middleware;
pub mod resources;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

use auth::AppState;
use middleware::require_auth;

/// The full REST surface under `/api`. Routes registered on both routers
/// merge by method, so a public `GET` and a protected `PUT` can share a path.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/disasters", get(disasters::list_disasters))
        .route("/api/disasters/active", get(disasters::list_active))
        .route("/api/disasters/location", get(disasters::disasters_by_location))
        .route("/api/disasters/{id}", get(disasters::get_disaster))
        .route("/api/resources", get(resources::list_resources))
        .route("/api/resources/type/{kind}", get(resources::list_by_type))
        .route("/api/resources/ngo/{id}", get(resources::list_by_ngo))
        .route("/api/resources/nearby", get(resources::nearby_resources))
        .route("/api/resources/{id}", get(resources::get_resource));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        // Users
        .route("/api/users", get(users::list_users))
        .route("/api/users/role/{role}", get(users::list_users_by_role))
        .route("/api/users/unverified", get(users::list_unverified))
        .route("/api/users/verify/{id}", put(users::verify_user))
        .route("/api/users/profile", put(users::update_profile))
        .route("/api/users/location", put(users::update_location))
        .route("/api/users/volunteers/nearby", get(users::nearby_volunteers))
        .route("/api/users/{id}", delete(users::delete_user))
        // Disasters
        .route("/api/disasters", post(disasters::create_disaster))
        .route(
            "/api/disasters/{id}",
            put(disasters::update_disaster).delete(disasters::delete_disaster),
        )
        .route("/api/disasters/{id}/updates", post(disasters::add_update))
        .route("/api/disasters/{id}/alert", post(disasters::send_alert))
        // Resources
        .route("/api/resources", post(resources::create_resource))
        .route(
            "/api/resources/{id}",
            put(resources::update_resource).delete(resources::delete_resource),
        )
        .route("/api/resources/{id}/assign", put(resources::assign_volunteers))
        .route("/api/resources/{id}/status", put(resources::update_status))
        // Help requests
        .route(
            "/api/help-requests",
            post(help_requests::create_help_request).get(help_requests::list_help_requests),
        )
        .route("/api/help-requests/mine", get(help_requests::list_mine))
        .route("/api/help-requests/assigned", get(help_requests::list_assigned))
        .route("/api/help-requests/nearby", get(help_requests::nearby_help_requests))
        .route("/api/help-requests/status/{status}", get(help_requests::list_by_status))
        .route("/api/help-requests/type/{kind}", get(help_requests::list_by_type))
        .route(
            "/api/help-requests/{id}",
            get(help_requests::get_help_request).put(help_requests::update_help_request),
        )
        .route("/api/help-requests/{id}/cancel", put(help_requests::cancel_help_request))
        .route("/api/help-requests/{id}/assign", put(help_requests::assign_help_request))
        .route("/api/help-requests/{id}/status", put(help_requests::update_status))
        .route("/api/help-requests/{id}/updates", post(help_requests::add_update))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use relief_db::{Database, NewUser};
    use relief_gateway::Dispatcher;
    use relief_types::events::Room;
    use relief_types::models::{Role, User};

    use super::*;
    use crate::auth::{AppStateInner, create_token};

    fn test_state() -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".to_string(),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Insert a user directly and mint a token for it.
    fn seed_user(state: &AppState, email: &str, role: Role, verified: bool) -> (User, String) {
        let user = state
            .db
            .create_user(&NewUser {
                id: Uuid::new_v4(),
                name: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
                password_hash: "not-a-real-hash".to_string(),
                role,
                is_verified: verified,
                phone: Some("555-0100".to_string()),
                address: None,
                ngo_details: None,
                skills: Vec::new(),
                availability: None,
                affected_details: None,
            })
            .unwrap();
        let token = create_token(&state.jwt_secret, &user).unwrap();
        (user, token)
    }

    async fn call(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn help_request_body() -> Value {
        json!({
            "requestType": ["Food", "Water"],
            "description": "Family of four stranded on the roof",
            "urgency": "Critical",
            "location": { "type": "Point", "coordinates": [85.3240, 27.7172] },
            "numberOfPeople": 4
        })
    }

    fn resource_body(name: &str, at: [f64; 2]) -> Value {
        json!({
            "type": "Food",
            "name": name,
            "description": "Dry rations",
            "quantity": 10,
            "unit": "kits",
            "location": { "type": "Point", "coordinates": at }
        })
    }

    /// A disaster whose affected area is a square around `center`.
    fn disaster_body(name: &str, center: [f64; 2]) -> Value {
        let [lon, lat] = center;
        json!({
            "name": name,
            "type": "Flood",
            "description": "River breached its banks",
            "severity": "High",
            "alertMessage": "Move to higher ground",
            "affectedAreas": [{
                "type": "Polygon",
                "coordinates": [[
                    [lon - 0.1, lat - 0.1],
                    [lon + 0.1, lat - 0.1],
                    [lon + 0.1, lat + 0.1],
                    [lon - 0.1, lat + 0.1],
                    [lon - 0.1, lat - 0.1]
                ]]
            }]
        })
    }

    fn id_of(body: &Value) -> String {
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let state = test_state();

        let (status, body) = call(&state, "GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Not authorized, no token");

        let (status, body) = call(&state, "GET", "/api/auth/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Not authorized, token failed");
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_rejected() {
        let state = test_state();
        let (user, token) = seed_user(&state, "gone@example.org", Role::Volunteer, true);
        assert!(state.db.delete_user(user.id).unwrap());

        let (status, body) = call(&state, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "User no longer exists");
    }

    #[tokio::test]
    async fn role_guards_return_forbidden() {
        let state = test_state();
        let (_, token) = seed_user(&state, "amal@example.org", Role::AffectedIndividual, true);

        let (status, body) = call(&state, "GET", "/api/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["message"],
            "User role AffectedIndividual is not authorized to access this route"
        );

        let (status, _) = call(&state, "GET", "/api/help-requests", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn register_login_and_pending_verification() {
        let state = test_state();

        let (status, body) = call(
            &state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Priya", "email": "Priya@Example.org", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user"]["email"], "priya@example.org");
        assert_eq!(body["data"]["user"]["role"], "AffectedIndividual");
        assert_eq!(body["data"]["user"]["isVerified"], true);
        assert!(body["data"]["user"].get("passwordHash").is_none());

        let (status, body) = call(
            &state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Priya", "email": "priya@example.org", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User already exists");

        let (status, body) = call(
            &state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "priya@example.org", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["token"].as_str().unwrap().to_string();
        let (status, body) = call(&state, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Priya");

        let (status, _) = call(
            &state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "priya@example.org", "password": "wrong-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Helping Hands",
                "email": "ngo@example.org",
                "password": "secret1",
                "role": "NGO"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user"]["isVerified"], false);

        let (status, body) = call(
            &state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ngo@example.org", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["message"],
            "Your account is pending verification by an administrator"
        );
    }

    #[tokio::test]
    async fn unverified_ngo_cannot_create_resources() {
        let state = test_state();
        let (_, token) = seed_user(&state, "new-ngo@example.org", Role::Ngo, false);

        let (status, body) = call(
            &state,
            "POST",
            "/api/resources",
            Some(&token),
            Some(resource_body("Bottled water", [85.3, 27.7])),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Your account is pending verification");
    }

    #[tokio::test]
    async fn help_request_lifecycle_ends_in_terminal_state() {
        let state = test_state();
        let (_, requester) = seed_user(&state, "amal@example.org", Role::AffectedIndividual, true);
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);
        let (ngo, _) = seed_user(&state, "ngo@example.org", Role::Ngo, true);
        let (volunteer, volunteer_token) =
            seed_user(&state, "vol@example.org", Role::Volunteer, true);
        let mut events = state.dispatcher.subscribe();

        let (status, body) = call(
            &state,
            "POST",
            "/api/help-requests",
            Some(&requester),
            Some(help_request_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "Pending");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/help-requests/{}/assign", id),
            Some(&admin),
            Some(json!({ "ngo": ngo.id, "volunteer": volunteer.id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "Assigned");
        assert_eq!(body["data"]["assignedTo"]["volunteer"]["name"], "vol");

        let event = events.recv().await.unwrap();
        assert!(event.is_for(|room| room.as_str() == format!("user:{}", volunteer.id)));
        assert!(event.json.contains("help-request-assigned"));

        // Once assigned the requester may no longer edit.
        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/help-requests/{}", id),
            Some(&requester),
            Some(json!({ "description": "Water is rising" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot update help request with status: Assigned");

        for next in ["In Progress", "Resolved"] {
            let (status, body) = call(
                &state,
                "PUT",
                &format!("/api/help-requests/{}/status", id),
                Some(&volunteer_token),
                Some(json!({ "status": next })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            assert_eq!(body["data"]["status"], next);
        }

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/help-requests/{}/status", id),
            Some(&volunteer_token),
            Some(json!({ "status": "Pending" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot change status from Resolved to Pending");

        let (status, _) = call(
            &state,
            "PUT",
            &format!("/api/help-requests/{}/cancel", id),
            Some(&requester),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            "GET",
            &format!("/api/help-requests/{}", id),
            Some(&requester),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let updates = body["data"]["updates"].as_array().unwrap();
        assert_eq!(
            updates.last().unwrap()["message"],
            "Status updated to Resolved"
        );
    }

    #[tokio::test]
    async fn strangers_cannot_view_or_cancel_help_requests() {
        let state = test_state();
        let (_, requester) = seed_user(&state, "amal@example.org", Role::AffectedIndividual, true);
        let (_, other) = seed_user(&state, "other@example.org", Role::AffectedIndividual, true);

        let (_, body) = call(
            &state,
            "POST",
            "/api/help-requests",
            Some(&requester),
            Some(help_request_body()),
        )
        .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &state,
            "GET",
            &format!("/api/help-requests/{}", id),
            Some(&other),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &state,
            "PUT",
            &format!("/api/help-requests/{}/cancel", id),
            Some(&other),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &state,
            "GET",
            "/api/help-requests/mine",
            Some(&requester),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn nearby_resources_are_sorted_by_distance() {
        let state = test_state();
        let (_, ngo) = seed_user(&state, "ngo@example.org", Role::Ngo, true);

        // Roughly 5 km, 1 km and 300 km from the query point.
        for (name, lon) in [("far", 85.35), ("near", 85.31), ("remote", 88.0)] {
            let (status, _) = call(
                &state,
                "POST",
                "/api/resources",
                Some(&ngo),
                Some(resource_body(name, [lon, 27.7])),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(
            &state,
            "GET",
            "/api/resources/nearby?longitude=85.30&latitude=27.7&maxDistance=10000",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["near", "far"]);

        let (status, body) = call(
            &state,
            "GET",
            "/api/resources/nearby?longitude=85.30",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Longitude and latitude are required");
    }

    #[tokio::test]
    async fn public_reads_and_bad_ids() {
        let state = test_state();

        let (status, body) = call(&state, "GET", "/api/disasters", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let (status, body) = call(&state, "GET", "/api/disasters/not-a-uuid", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid id");

        let (status, body) = call(
            &state,
            "GET",
            &format!("/api/resources/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Resource not found");
    }

    #[tokio::test]
    async fn resource_assignment_and_status_rules() {
        let state = test_state();
        let (_, owner) = seed_user(&state, "ngo@example.org", Role::Ngo, true);
        let (_, rival) = seed_user(&state, "rival@example.org", Role::Ngo, true);
        let (volunteer, volunteer_token) =
            seed_user(&state, "vol@example.org", Role::Volunteer, true);
        let (_, bystander) = seed_user(&state, "idle@example.org", Role::Volunteer, true);

        let (_, body) = call(
            &state,
            "POST",
            "/api/resources",
            Some(&owner),
            Some(resource_body("Rice", [85.3, 27.7])),
        )
        .await;
        let id = id_of(&body);
        let assign = json!({ "volunteers": [volunteer.id] });

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}/assign", id),
            Some(&rival),
            Some(assign.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Not authorized to assign volunteers to this resource");

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}/assign", id),
            Some(&owner),
            Some(assign),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["status"], "In Transit");
        assert_eq!(body["data"]["assignedVolunteers"][0]["name"], "vol");

        let (status, _) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}/status", id),
            Some(&bystander),
            Some(json!({ "status": "Delivered" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}/status", id),
            Some(&volunteer_token),
            Some(json!({ "status": "Delivered" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["status"], "Delivered");
        assert_eq!(body["data"]["isAvailable"], false);

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}/status", id),
            Some(&owner),
            Some(json!({ "status": "Available" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot change status from Delivered to Available");

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}", id),
            Some(&owner),
            Some(json!({ "isAvailable": true, "quantity": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isAvailable"], false);
        assert_eq!(body["data"]["assignedVolunteers"][0]["name"], "vol");

        let (_, body) = call(
            &state,
            "POST",
            "/api/resources",
            Some(&owner),
            Some(resource_body("Tents", [85.3, 27.7])),
        )
        .await;
        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/resources/{}/status", id_of(&body)),
            Some(&owner),
            Some(json!({ "status": "Depleted" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isAvailable"], false);
    }

    #[tokio::test]
    async fn alerts_persist_and_broadcast_only_while_active() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);
        let (_, ngo) = seed_user(&state, "ngo@example.org", Role::Ngo, true);

        let (status, body) = call(
            &state,
            "POST",
            "/api/disasters",
            Some(&admin),
            Some(disaster_body("Koshi floods", [85.32, 27.71])),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = id_of(&body);
        let alert_uri = format!("/api/disasters/{}/alert", id);
        let mut events = state.dispatcher.subscribe();

        let (status, _) = call(
            &state,
            "POST",
            &alert_uri,
            Some(&ngo),
            Some(json!({ "alertMessage": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = call(
            &state,
            "POST",
            &alert_uri,
            Some(&admin),
            Some(json!({ "alertMessage": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Alert message is required");

        let (status, body) = call(
            &state,
            "POST",
            &alert_uri,
            Some(&admin),
            Some(json!({ "alertMessage": "Evacuate ward 7" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["alertMessage"], "Evacuate ward 7");

        let event = events.recv().await.unwrap();
        assert!(event.is_for(|room| *room == Room::all_users()));
        let json: Value = serde_json::from_str(&event.json).unwrap();
        assert_eq!(json["type"], "disaster-alert");
        assert_eq!(json["data"]["message"], "Evacuate ward 7");

        let (_, body) = call(&state, "GET", &format!("/api/disasters/{}", id), None, None).await;
        assert_eq!(body["data"]["alertMessage"], "Evacuate ward 7");

        let (status, _) = call(
            &state,
            "PUT",
            &format!("/api/disasters/{}", id),
            Some(&admin),
            Some(json!({ "isActive": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(
            &state,
            "POST",
            &alert_uri,
            Some(&admin),
            Some(json!({ "alertMessage": "All clear" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["alertMessage"], "All clear");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn disasters_by_location_returns_active_covering_areas() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);

        let areas = [("Kathmandu floods", [85.32, 27.71]), ("Delhi heatwave", [77.2, 28.6])];
        for (name, center) in areas {
            let (status, _) = call(
                &state,
                "POST",
                "/api/disasters",
                Some(&admin),
                Some(disaster_body(name, center)),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(
            &state,
            "GET",
            "/api/disasters/location?longitude=85.33&latitude=27.72",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["name"], "Kathmandu floods");

        let (status, body) = call(
            &state,
            "GET",
            "/api/disasters/location?longitude=10.0&latitude=10.0",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let (status, _) = call(
            &state,
            "GET",
            "/api/disasters/location?latitude=27.72",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admins_verify_and_delete_users() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);
        let (ngo, ngo_token) = seed_user(&state, "ngo@example.org", Role::Ngo, false);

        let (status, _) = call(
            &state,
            "PUT",
            &format!("/api/users/verify/{}", ngo.id),
            Some(&ngo_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = call(&state, "GET", "/api/users/unverified", Some(&admin), None).await;
        assert_eq!(body["count"], 1);

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/users/verify/{}", ngo.id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isVerified"], true);
        let (_, body) = call(&state, "GET", "/api/users/unverified", Some(&admin), None).await;
        assert_eq!(body["count"], 0);

        let (status, body) = call(
            &state,
            "PUT",
            &format!("/api/users/verify/{}", Uuid::new_v4()),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");

        let (status, _) = call(
            &state,
            "DELETE",
            &format!("/api/users/{}", ngo.id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&state, "GET", "/api/auth/me", Some(&ngo_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "User no longer exists");
        let (status, _) = call(
            &state,
            "DELETE",
            &format!("/api/users/{}", ngo.id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn volunteer_location_reaches_coordinators() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);
        let (_, ngo) = seed_user(&state, "ngo@example.org", Role::Ngo, true);
        let (volunteer, volunteer_token) =
            seed_user(&state, "vol@example.org", Role::Volunteer, true);
        let mut events = state.dispatcher.subscribe();

        // The role is checked before the body.
        let (status, body) = call(
            &state,
            "PUT",
            "/api/users/location",
            Some(&ngo),
            Some(json!({ "coordinates": [1.0] })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "User role NGO is not authorized to access this route");

        let (status, body) = call(
            &state,
            "PUT",
            "/api/users/location",
            Some(&volunteer_token),
            Some(json!({ "coordinates": [1.0] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid coordinates format. Should be [longitude, latitude]");

        let (status, body) = call(
            &state,
            "PUT",
            "/api/users/location",
            Some(&volunteer_token),
            Some(json!({ "coordinates": [85.32, 27.71] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["coordinates"], json!([85.32, 27.71]));

        let event = events.recv().await.unwrap();
        assert!(event.is_for(|room| *room == Room::for_role(Role::Admin)));
        assert!(event.is_for(|room| *room == Room::for_role(Role::Ngo)));
        assert!(!event.is_for(|room| *room == Room::all_users()));
        let json: Value = serde_json::from_str(&event.json).unwrap();
        assert_eq!(json["type"], "volunteer-location");
        assert_eq!(json["data"]["volunteerId"], volunteer.id.to_string());

        let (_, body) = call(
            &state,
            "GET",
            "/api/users/volunteers/nearby?longitude=85.32&latitude=27.71",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_progress_notes_are_all_kept() {
        let state = test_state();
        let (_, requester) = seed_user(&state, "amal@example.org", Role::AffectedIndividual, true);
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);
        let (_, body) = call(
            &state,
            "POST",
            "/api/help-requests",
            Some(&requester),
            Some(help_request_body()),
        )
        .await;
        let uri = format!("/api/help-requests/{}/updates", id_of(&body));

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let (state, admin, uri) = (state.clone(), admin.clone(), uri.clone());
                tokio::spawn(async move {
                    call(
                        &state,
                        "POST",
                        &uri,
                        Some(&admin),
                        Some(json!({ "message": format!("note {}", i) })),
                    )
                    .await
                    .0
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), StatusCode::OK);
        }

        let (_, body) = call(&state, "GET", &uri.replace("/updates", ""), Some(&admin), None).await;
        assert_eq!(body["data"]["updates"].as_array().unwrap().len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_resolve_and_cancel_accept_exactly_one() {
        let state = test_state();
        let (_, requester) = seed_user(&state, "amal@example.org", Role::AffectedIndividual, true);
        let (_, admin) = seed_user(&state, "admin@example.org", Role::Admin, true);
        let (volunteer, volunteer_token) =
            seed_user(&state, "vol@example.org", Role::Volunteer, true);

        for _ in 0..10 {
            let (_, body) = call(
                &state,
                "POST",
                "/api/help-requests",
                Some(&requester),
                Some(help_request_body()),
            )
            .await;
            let base = format!("/api/help-requests/{}", id_of(&body));
            call(
                &state,
                "PUT",
                &format!("{}/assign", base),
                Some(&admin),
                Some(json!({ "volunteer": volunteer.id })),
            )
            .await;
            let (status, _) = call(
                &state,
                "PUT",
                &format!("{}/status", base),
                Some(&volunteer_token),
                Some(json!({ "status": "In Progress" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);

            let resolve = {
                let (state, token) = (state.clone(), volunteer_token.clone());
                let uri = format!("{}/status", base);
                tokio::spawn(async move {
                    call(
                        &state,
                        "PUT",
                        &uri,
                        Some(&token),
                        Some(json!({ "status": "Resolved" })),
                    )
                    .await
                    .0
                })
            };
            let cancel = {
                let (state, token) = (state.clone(), requester.clone());
                let uri = format!("{}/cancel", base);
                tokio::spawn(async move { call(&state, "PUT", &uri, Some(&token), None).await.0 })
            };
            let (resolved, cancelled) = (resolve.await.unwrap(), cancel.await.unwrap());

            let (_, body) = call(&state, "GET", &base, Some(&admin), None).await;
            let updates = body["data"]["updates"].as_array().unwrap().len();
            match (resolved, cancelled) {
                (StatusCode::OK, StatusCode::BAD_REQUEST) => {
                    assert_eq!(body["data"]["status"], "Resolved")
                }
                (StatusCode::BAD_REQUEST, StatusCode::OK) => {
                    assert_eq!(body["data"]["status"], "Cancelled")
                }
                other => panic!("expected exactly one success, got {:?}", other),
            }
            // Assigned, In Progress, and the single winning change.
            assert_eq!(updates, 3);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_are_refused_cleanly() {
        let state = test_state();
        let register = |email: &'static str, role: &'static str| {
            let state = state.clone();
            tokio::spawn(async move {
                let body =
                    json!({ "name": "Twin", "email": email, "password": "secret1", "role": role });
                call(&state, "POST", "/api/auth/register", None, Some(body)).await
            })
        };

        let first = register("twin@example.org", "Volunteer");
        let second = register("twin@example.org", "Volunteer");
        let mut outcomes = vec![first.await.unwrap(), second.await.unwrap()];
        outcomes.sort_by_key(|(status, _)| status.as_u16());
        assert_eq!(outcomes[0].0, StatusCode::CREATED);
        assert_eq!(outcomes[1].0, StatusCode::BAD_REQUEST);
        assert_eq!(outcomes[1].1["message"], "User already exists");

        let first = register("root-a@example.org", "Admin");
        let second = register("root-b@example.org", "Admin");
        let mut outcomes = vec![first.await.unwrap(), second.await.unwrap()];
        outcomes.sort_by_key(|(status, _)| status.as_u16());
        assert_eq!(outcomes[0].0, StatusCode::CREATED);
        assert_eq!(outcomes[1].0, StatusCode::FORBIDDEN);
        assert_eq!(outcomes[1].1["message"], "Admin registration is closed");
        assert_eq!(state.db.list_users(Some(Role::Admin)).unwrap().len(), 1);
    }
}
