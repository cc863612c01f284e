use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::common::VisiRideError;
use crate::service::protocol::{
    AddScooterQuery, FormFields, FreeScooterRequest, SignInQuery, SignUpRequest,
    UserLocationRequest, ERROR_MARKER,
};
use crate::service::state::AppState;

const GENERIC_FAILURE: &str = "Request failed";

pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/users", get(list_users))
        .route("/scooters", get(list_scooters))
        .route("/sign_up", post(sign_up))
        .route("/sign_in", get(sign_in))
        .route("/add_scooter", post(add_scooter))
        .route("/update_user_location", post(update_user_location))
        .route("/checkFace", post(check_face))
        .route("/gps", post(gps))
        .route("/free_scooter", post(free_scooter))
        // Json/Form otherwise stop at 2 MB
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Error reply for the phone app and admin tools.
fn client_error(err: VisiRideError) -> Response {
    match err {
        VisiRideError::Validation(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
        VisiRideError::NotFound(what) => (StatusCode::BAD_REQUEST, format!("Not found: {}", what)).into_response(),
        VisiRideError::AlreadyExists(what) => {
            (StatusCode::BAD_REQUEST, format!("Already exists: {}", what)).into_response()
        }
        other => {
            tracing::error!("request failed: {}", other);
            (StatusCode::BAD_REQUEST, GENERIC_FAILURE).into_response()
        }
    }
}

/// Error reply for scooter firmware, which only understands the marker.
fn firmware_error(err: VisiRideError) -> Response {
    match &err {
        VisiRideError::Validation(reason) => tracing::debug!("firmware request rejected: {}", reason),
        other => tracing::warn!("firmware request failed: {}", other),
    }
    (StatusCode::BAD_REQUEST, ERROR_MARKER).into_response()
}

async fn health() -> &'static str {
    "ok"
}

async fn list_users(State(state): State<AppState>) -> Response {
    match state.list_users().await {
        Ok(users) => Json(users).into_response(),
        Err(e) => client_error(e),
    }
}

async fn list_scooters(State(state): State<AppState>) -> Response {
    match state.list_scooters().await {
        Ok(scooters) => Json(scooters).into_response(),
        Err(e) => client_error(e),
    }
}

async fn sign_up(State(state): State<AppState>, Json(req): Json<SignUpRequest>) -> Response {
    match state.sign_up(req).await {
        Ok(outcome) => outcome.reply().into_response(),
        Err(e) => client_error(e),
    }
}

async fn sign_in(State(state): State<AppState>, Query(query): Query<SignInQuery>) -> Response {
    match state.sign_in(query).await {
        Ok(reply) => reply.into_response(),
        Err(e) => client_error(e),
    }
}

async fn add_scooter(State(state): State<AppState>, Query(query): Query<AddScooterQuery>) -> Response {
    match state.add_scooter(query).await {
        Ok(reply) => reply.into_response(),
        Err(e) => client_error(e),
    }
}

async fn update_user_location(
    State(state): State<AppState>,
    Json(req): Json<UserLocationRequest>,
) -> Response {
    match state.update_user_location(req).await {
        Ok(scooters) => Json(scooters).into_response(),
        Err(e) => client_error(e),
    }
}

async fn check_face(State(state): State<AppState>, Form(fields): Form<Vec<(String, String)>>) -> Response {
    match state.check_face(FormFields(fields)).await {
        // Classification keeps running after the reply is sent
        Ok(reply) => reply.message.into_response(),
        Err(e) => firmware_error(e),
    }
}

async fn gps(State(state): State<AppState>, Form(fields): Form<Vec<(String, String)>>) -> Response {
    match state.gps(FormFields(fields)).await {
        Ok(decision) => decision.as_wire().into_response(),
        Err(e) => firmware_error(e),
    }
}

async fn free_scooter(State(state): State<AppState>, Json(req): Json<FreeScooterRequest>) -> Response {
    match state.free_scooter(req).await {
        Ok(elapsed) => elapsed.to_string().into_response(),
        Err(e) => client_error(e),
    }
}
