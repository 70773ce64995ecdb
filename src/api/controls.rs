use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;
use crate::subcontrols::{Subcontrol, queries};
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateControlRequest {
    pub title: String,
    pub description: Option<String>,
    pub order_no: Option<i32>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ControlResponse {
    pub id: i32,
    pub order_no: Option<i32>,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ControlDetailResponse {
    #[serde(flatten)]
    pub control: ControlResponse,
    pub subcontrols: Vec<Subcontrol>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/controls", get(list_controls).post(create_control))
        .route(
            "/api/controls/{id}",
            get(get_control).delete(delete_control),
        )
}

/// 404 unless control `id` exists.
pub async fn require_control(state: &AppState, id: i32) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM controls WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("control".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_controls(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<ControlResponse>>, ApiError> {
    let rows = sqlx::query_as::<_, ControlResponse>(
        "SELECT id, order_no, title, description, created_at
         FROM controls ORDER BY order_no NULLS LAST, id",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

async fn get_control(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<ControlDetailResponse>, ApiError> {
    let control = sqlx::query_as::<_, ControlResponse>(
        "SELECT id, order_no, title, description, created_at FROM controls WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("control".into()))?;

    let subcontrols = queries::list_by_control(&state.pool, id).await?;

    Ok(Json(ControlDetailResponse {
        control,
        subcontrols,
    }))
}

#[tracing::instrument(skip(state, body), fields(title = %body.title), err)]
async fn create_control(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateControlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::check_title(&body.title)?;
    if let Some(ref description) = body.description {
        validation::check_length("description", description, 0, validation::MAX_TEXT_LEN)?;
    }

    let control = sqlx::query_as::<_, ControlResponse>(
        "INSERT INTO controls (order_no, title, description)
         VALUES ($1, $2, $3)
         RETURNING id, order_no, title, description, created_at",
    )
    .bind(body.order_no)
    .bind(body.title.trim())
    .bind(&body.description)
    .fetch_one(&state.pool)
    .await?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "control.create",
            resource: "control",
            resource_id: Some(control.id),
            detail: Some(serde_json::json!({ "title": control.title })),
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(control)))
}

/// Deleting a control cascades to its subcontrols.
#[tracing::instrument(skip(state), fields(%id), err)]
async fn delete_control(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<ControlResponse>, ApiError> {
    let control = sqlx::query_as::<_, ControlResponse>(
        "DELETE FROM controls WHERE id = $1
         RETURNING id, order_no, title, description, created_at",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("control".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "control.delete",
            resource: "control",
            resource_id: Some(id),
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(control))
}
