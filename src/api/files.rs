use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/files/{id}", get(download_file).delete(delete_file))
}

/// Quote a filename for `Content-Disposition`, dropping characters that
/// would break the header.
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

async fn download_file(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let (record, data) = state
        .files
        .download(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("file".into()))?;

    Ok((
        [
            (CONTENT_TYPE, record.content_type),
            (CONTENT_DISPOSITION, content_disposition(&record.filename)),
        ],
        data,
    ))
}

/// Removes the blob. Rows that still reference the id keep a dangling
/// `{id, fileName}` entry.
#[tracing::instrument(skip(state), fields(%id), err)]
async fn delete_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.files.remove(id).await? {
        return Err(ApiError::NotFound("file".into()));
    }

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "file.delete",
            resource: "file",
            resource_id: Some(id),
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(serde_json::json!({ "ok": true })))
}
