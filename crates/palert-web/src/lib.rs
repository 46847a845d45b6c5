//! Axum JSON API: health plus API-key-protected rule CRUD.
//!
//! Rule routes are guarded by an `X-API-Key` check against the configured
//! key list; the acting user is taken from the `X-User-ID` header after
//! auth. Responses share one envelope: `data` on success, `error` plus the
//! HTTP status on failure.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use palert_core::{Category, Rule};
use palert_store::{RuleStore, StoreError, UserStore};

pub const CRATE_NAME: &str = "palert-web";

const VERSION: &str = env!("CARGO_PKG_VERSION");

const API_KEY_HEADER: &str = "x-api-key";
const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub api_keys: Vec<String>,
    pub rules: Arc<dyn RuleStore>,
    pub users: Arc<dyn UserStore>,
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route(
            "/api/v1/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/api/v1/users", axum::routing::post(register_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/api/v1/health", get(health))
        .merge(protected)
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "api server listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    status: u16,
}

fn json_response<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(ApiResponse {
            data: Some(data),
            error: None,
            status: status.as_u16(),
        }),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            data: None,
            error: Some(message.into()),
            status: status.as_u16(),
        }),
    )
        .into_response()
}

fn store_error_response(context: &str, err: StoreError) -> Response {
    error!(error = %err, "{context}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if state.api_keys.iter().any(|k| k == key) => next.run(request).await,
        _ => error_response(StatusCode::UNAUTHORIZED, "Invalid or missing API key"),
    }
}

fn user_id_from_headers(headers: &HeaderMap) -> Result<Uuid, Response> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "X-User-ID header is required and must be a UUID",
            )
        })
}

async fn health() -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({ "status": "ok", "version": VERSION }),
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    /// Omit for an all-categories rule.
    #[serde(default)]
    pub category: Option<Category>,
    pub club_ids: Vec<String>,
    #[serde(default)]
    pub min_ranking: Option<f64>,
    #[serde(default)]
    pub max_ranking: Option<f64>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: String,
    #[serde(default)]
    pub category: Option<Category>,
    pub club_ids: Vec<String>,
    #[serde(default)]
    pub min_ranking: Option<f64>,
    #[serde(default)]
    pub max_ranking: Option<f64>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title_contains: Option<String>,
    /// Omit to keep the current active flag.
    #[serde(default)]
    pub active: Option<bool>,
}

fn validate_name_and_clubs(name: &str, club_ids: &[String]) -> Result<(), Response> {
    if name.trim().is_empty() || club_ids.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Name and club_ids are required",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterUserRequest>,
) -> Response {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return error_response(StatusCode::BAD_REQUEST, "A valid email is required");
    }

    match state.users.get_user_by_email(&request.email).await {
        Ok(Some(_)) => {
            return error_response(StatusCode::CONFLICT, "A user with this email already exists");
        }
        Ok(None) => {}
        Err(err) => return store_error_response("Failed to look up user", err),
    }

    let now = Utc::now();
    let user = palert_core::User {
        id: Uuid::new_v4(),
        email: request.email,
        name: request.name,
        created_at: now,
        updated_at: now,
    };

    match state.users.create_user(&user).await {
        Ok(()) => json_response(StatusCode::CREATED, user),
        Err(err) => store_error_response("Failed to create user", err),
    }
}

async fn list_rules(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.rules.list_rules(user_id).await {
        Ok(rules) => json_response(StatusCode::OK, rules),
        Err(err) => store_error_response("Failed to list rules", err),
    }
}

async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateRuleRequest>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = validate_name_and_clubs(&request.name, &request.club_ids) {
        return response;
    }

    let now = Utc::now();
    let rule = Rule {
        id: Uuid::new_v4(),
        user_id,
        name: request.name,
        category: request.category,
        club_ids: request.club_ids,
        min_ranking: request.min_ranking,
        max_ranking: request.max_ranking,
        start_date: request.start_date,
        end_date: request.end_date,
        title_contains: request.title_contains,
        active: true,
        last_checked: None,
        last_notification: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = state.rules.create_rule(&rule).await {
        return store_error_response("Failed to create rule", err);
    }

    // Schedule for immediate evaluation; a failure here only delays the
    // first check, so it is logged rather than surfaced.
    if let Err(err) = state.rules.schedule_rule(rule.id, now).await {
        error!(rule_id = %rule.id, error = %err, "failed to schedule new rule");
    }

    json_response(StatusCode::CREATED, rule)
}

async fn get_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.rules.get_rule(id).await {
        Ok(Some(rule)) if rule.user_id == user_id => json_response(StatusCode::OK, rule),
        Ok(Some(_)) => error_response(StatusCode::FORBIDDEN, "Not authorized to access this rule"),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Rule not found"),
        Err(err) => store_error_response("Failed to get rule", err),
    }
}

async fn update_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRuleRequest>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = validate_name_and_clubs(&request.name, &request.club_ids) {
        return response;
    }

    let mut rule = match state.rules.get_rule(id).await {
        Ok(Some(rule)) => rule,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Rule not found"),
        Err(err) => return store_error_response("Failed to get rule", err),
    };
    if rule.user_id != user_id {
        return error_response(StatusCode::FORBIDDEN, "Not authorized to update this rule");
    }

    rule.name = request.name;
    rule.category = request.category;
    rule.club_ids = request.club_ids;
    rule.min_ranking = request.min_ranking;
    rule.max_ranking = request.max_ranking;
    rule.start_date = request.start_date;
    rule.end_date = request.end_date;
    rule.title_contains = request.title_contains;
    if let Some(active) = request.active {
        rule.active = active;
    }
    rule.updated_at = Utc::now();

    match state.rules.update_rule(&rule).await {
        Ok(()) => json_response(StatusCode::OK, rule),
        Err(StoreError::NotFound { .. }) => error_response(StatusCode::NOT_FOUND, "Rule not found"),
        Err(err) => store_error_response("Failed to update rule", err),
    }
}

async fn delete_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.rules.get_rule(id).await {
        Ok(Some(rule)) if rule.user_id != user_id => {
            return error_response(StatusCode::FORBIDDEN, "Not authorized to delete this rule");
        }
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Rule not found"),
        Err(err) => return store_error_response("Failed to get rule", err),
    }

    match state.rules.delete_rule(id).await {
        Ok(()) => json_response(StatusCode::OK, serde_json::json!({ "message": "Rule deleted" })),
        Err(StoreError::NotFound { .. }) => error_response(StatusCode::NOT_FOUND, "Rule not found"),
        Err(err) => store_error_response("Failed to delete rule", err),
    }
}
