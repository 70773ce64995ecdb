use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::controls::require_control;
use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::files::UploadedFile;
use crate::store::AppState;
use crate::subcontrols::{Subcontrol, SubcontrolFields, SubcontrolRecord, queries};
use crate::validation;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/subcontrols", get(list_subcontrols))
        .route(
            "/api/subcontrols/{id}",
            get(get_subcontrol)
                .put(update_subcontrol)
                .delete(delete_subcontrol),
        )
        .route(
            "/api/controls/{control_id}/subcontrols",
            get(list_control_subcontrols).post(create_subcontrol),
        )
}

// ---------------------------------------------------------------------------
// Multipart form
// ---------------------------------------------------------------------------

const EVIDENCE_FILES_FIELD: &str = "evidenceFiles";
const FEEDBACK_FILES_FIELD: &str = "feedbackFiles";

#[derive(Debug, Default)]
struct SubcontrolForm {
    fields: SubcontrolFields,
    evidence_files: Vec<UploadedFile>,
    feedback_files: Vec<UploadedFile>,
}

/// Store one text part of the create form. Accepts both snake_case and the
/// camelCase names the dashboard sends.
fn assign_field(fields: &mut SubcontrolFields, name: &str, value: String) -> Result<(), ApiError> {
    let value = Some(value).filter(|v| !v.is_empty());
    match name {
        "status" => fields.status = value,
        "approver" => fields.approver = value,
        "risk_review" | "riskReview" => fields.risk_review = value,
        "owner" => fields.owner = value,
        "reviewer" => fields.reviewer = value,
        "due_date" | "dueDate" => {
            fields.due_date = value
                .map(|v| parse_due_date(&v))
                .transpose()?;
        }
        "implementation_details" | "implementationDetails" => {
            fields.implementation_details = value;
        }
        "evidence" => fields.evidence = value,
        "feedback" => fields.feedback = value,
        other => tracing::debug!(field = other, "ignoring unknown form field"),
    }
    Ok(())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part kept).
fn parse_due_date(value: &str) -> Result<chrono::NaiveDate, ApiError> {
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| ApiError::BadRequest("due_date must be YYYY-MM-DD or RFC 3339".into()))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<SubcontrolForm, ApiError> {
    let mut form = SubcontrolForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        let target = match name.as_str() {
            EVIDENCE_FILES_FIELD => Some(&mut form.evidence_files),
            FEEDBACK_FILES_FIELD => Some(&mut form.feedback_files),
            _ => None,
        };

        if let Some(target) = target {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let content_type = field.content_type().map(str::to_owned);
            let data = field.bytes().await.map_err(multipart_error)?;
            target.push(UploadedFile {
                file_name,
                content_type,
                data,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            assign_field(&mut form.fields, &name, value)?;
        }
    }

    Ok(form)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_subcontrols(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Subcontrol>>, ApiError> {
    Ok(Json(queries::list_all(&state.pool).await?))
}

async fn list_control_subcontrols(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(control_id): Path<i32>,
) -> Result<Json<Vec<Subcontrol>>, ApiError> {
    require_control(&state, control_id).await?;
    let rows = queries::list_by_control(&state.pool, control_id).await?;
    Ok(Json(rows))
}

async fn get_subcontrol(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<Subcontrol>, ApiError> {
    let subcontrol = queries::get_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("subcontrol".into()))?;
    Ok(Json(subcontrol))
}

#[tracing::instrument(skip(state, multipart), fields(%control_id), err)]
async fn create_subcontrol(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(control_id): Path<i32>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    validation::check_id("control_id", control_id)?;
    require_control(&state, control_id).await?;

    let form = read_form(multipart).await?;
    form.fields.validate()?;

    let subcontrol = queries::create(
        &state.pool,
        &state.files,
        control_id,
        &form.fields,
        form.evidence_files,
        form.feedback_files,
    )
    .await?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "subcontrol.create",
            resource: "subcontrol",
            resource_id: Some(subcontrol.id),
            detail: Some(serde_json::json!({
                "control_id": control_id,
                "evidence_files": subcontrol.evidence_files.len(),
                "feedback_files": subcontrol.feedback_files.len(),
            })),
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(subcontrol)))
}

#[tracing::instrument(skip(state, body), fields(%id), err)]
async fn update_subcontrol(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(body): Json<SubcontrolRecord>,
) -> Result<Json<Subcontrol>, ApiError> {
    body.validate()?;

    let subcontrol = queries::update(&state.pool, id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound("subcontrol".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "subcontrol.update",
            resource: "subcontrol",
            resource_id: Some(id),
            detail: Some(serde_json::json!({ "status": subcontrol.status })),
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(subcontrol))
}

#[tracing::instrument(skip(state), fields(%id), err)]
async fn delete_subcontrol(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<Subcontrol>, ApiError> {
    let subcontrol = queries::delete_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("subcontrol".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "subcontrol.delete",
            resource: "subcontrol",
            resource_id: Some(id),
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(subcontrol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_field_accepts_camel_case() {
        let mut fields = SubcontrolFields::default();
        assign_field(&mut fields, "riskReview", "low".into()).unwrap();
        assign_field(&mut fields, "implementationDetails", "done via CI".into()).unwrap();
        assert_eq!(fields.risk_review.as_deref(), Some("low"));
        assert_eq!(
            fields.implementation_details.as_deref(),
            Some("done via CI")
        );
    }

    #[test]
    fn assign_field_empty_string_is_none() {
        let mut fields = SubcontrolFields::default();
        assign_field(&mut fields, "owner", String::new()).unwrap();
        assert!(fields.owner.is_none());
    }

    #[test]
    fn assign_field_ignores_unknown() {
        let mut fields = SubcontrolFields::default();
        assign_field(&mut fields, "colour", "blue".into()).unwrap();
        assert_eq!(fields, SubcontrolFields::default());
    }

    #[test]
    fn due_date_plain_and_timestamp() {
        let d = parse_due_date("2025-06-30").unwrap();
        assert_eq!(d.to_string(), "2025-06-30");
        let d = parse_due_date("2025-06-30T12:00:00Z").unwrap();
        assert_eq!(d.to_string(), "2025-06-30");
    }

    #[test]
    fn due_date_garbage_rejected() {
        let err = parse_due_date("next week").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
