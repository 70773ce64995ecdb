use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateVendorRequest {
    pub vendor_name: String,
    pub vendor_provides: Option<String>,
    pub assignee: Option<String>,
    pub website: Option<String>,
    pub vendor_contact_person: Option<String>,
    pub review_result: Option<String>,
    pub review_status: Option<String>,
    pub reviewer: Option<String>,
    pub risk_status: Option<String>,
    pub review_date: Option<NaiveDate>,
}

/// Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateVendorRequest {
    pub vendor_name: Option<String>,
    pub vendor_provides: Option<String>,
    pub assignee: Option<String>,
    pub website: Option<String>,
    pub vendor_contact_person: Option<String>,
    pub review_result: Option<String>,
    pub review_status: Option<String>,
    pub reviewer: Option<String>,
    pub risk_status: Option<String>,
    pub review_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VendorResponse {
    pub id: i32,
    pub vendor_name: String,
    pub vendor_provides: Option<String>,
    pub assignee: Option<String>,
    pub website: Option<String>,
    pub vendor_contact_person: Option<String>,
    pub review_result: Option<String>,
    pub review_status: Option<String>,
    pub reviewer: Option<String>,
    pub risk_status: Option<String>,
    pub review_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

const VENDOR_COLUMNS: &str = "id, vendor_name, vendor_provides, assignee, website, \
     vendor_contact_person, review_result, review_status, reviewer, risk_status, review_date, \
     created_at";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/vendors", get(list_vendors).post(create_vendor))
        .route(
            "/api/vendors/{id}",
            get(get_vendor).put(update_vendor).delete(delete_vendor),
        )
}

fn check_vendor_fields(
    vendor_name: Option<&str>,
    website: Option<&str>,
    review_status: Option<&str>,
    risk_status: Option<&str>,
) -> Result<(), ApiError> {
    if let Some(name) = vendor_name {
        validation::check_length("vendor_name", name.trim(), 1, 255)?;
    }
    if let Some(url) = website {
        validation::check_url(url)?;
    }
    if let Some(status) = review_status {
        validation::check_label("review_status", status)?;
    }
    if let Some(risk) = risk_status {
        validation::check_label("risk_status", risk)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_vendors(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<VendorResponse>>, ApiError> {
    let rows = sqlx::query_as::<_, VendorResponse>(&format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors ORDER BY id"
    ))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

async fn get_vendor(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<VendorResponse>, ApiError> {
    let row = sqlx::query_as::<_, VendorResponse>(&format!(
        "SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("vendor".into()))?;
    Ok(Json(row))
}

#[tracing::instrument(skip(state, body), fields(vendor_name = %body.vendor_name), err)]
async fn create_vendor(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateVendorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_vendor_fields(
        Some(&body.vendor_name),
        body.website.as_deref(),
        body.review_status.as_deref(),
        body.risk_status.as_deref(),
    )?;

    let vendor = sqlx::query_as::<_, VendorResponse>(&format!(
        "INSERT INTO vendors (
            vendor_name, vendor_provides, assignee, website, vendor_contact_person,
            review_result, review_status, reviewer, risk_status, review_date
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {VENDOR_COLUMNS}"
    ))
    .bind(body.vendor_name.trim())
    .bind(&body.vendor_provides)
    .bind(&body.assignee)
    .bind(&body.website)
    .bind(&body.vendor_contact_person)
    .bind(&body.review_result)
    .bind(&body.review_status)
    .bind(&body.reviewer)
    .bind(&body.risk_status)
    .bind(body.review_date)
    .fetch_one(&state.pool)
    .await?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "vendor.create",
            resource: "vendor",
            resource_id: Some(vendor.id),
            detail: Some(serde_json::json!({ "vendor_name": vendor.vendor_name })),
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(vendor)))
}

#[tracing::instrument(skip(state, body), fields(%id), err)]
async fn update_vendor(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(body): Json<UpdateVendorRequest>,
) -> Result<Json<VendorResponse>, ApiError> {
    check_vendor_fields(
        body.vendor_name.as_deref(),
        body.website.as_deref(),
        body.review_status.as_deref(),
        body.risk_status.as_deref(),
    )?;

    let vendor = sqlx::query_as::<_, VendorResponse>(&format!(
        "UPDATE vendors SET
            vendor_name = COALESCE($2, vendor_name),
            vendor_provides = COALESCE($3, vendor_provides),
            assignee = COALESCE($4, assignee),
            website = COALESCE($5, website),
            vendor_contact_person = COALESCE($6, vendor_contact_person),
            review_result = COALESCE($7, review_result),
            review_status = COALESCE($8, review_status),
            reviewer = COALESCE($9, reviewer),
            risk_status = COALESCE($10, risk_status),
            review_date = COALESCE($11, review_date)
         WHERE id = $1
         RETURNING {VENDOR_COLUMNS}"
    ))
    .bind(id)
    .bind(body.vendor_name.as_deref().map(str::trim))
    .bind(&body.vendor_provides)
    .bind(&body.assignee)
    .bind(&body.website)
    .bind(&body.vendor_contact_person)
    .bind(&body.review_result)
    .bind(&body.review_status)
    .bind(&body.reviewer)
    .bind(&body.risk_status)
    .bind(body.review_date)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("vendor".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "vendor.update",
            resource: "vendor",
            resource_id: Some(id),
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(vendor))
}

/// Responds `202 Accepted` with the removed row; the vendors page keys its
/// success toast on that status.
#[tracing::instrument(skip(state), fields(%id), err)]
async fn delete_vendor(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = sqlx::query_as::<_, VendorResponse>(&format!(
        "DELETE FROM vendors WHERE id = $1 RETURNING {VENDOR_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("vendor".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "vendor.delete",
            resource: "vendor",
            resource_id: Some(id),
            detail: Some(serde_json::json!({ "vendor_name": vendor.vendor_name })),
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok((StatusCode::ACCEPTED, Json(vendor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_fields_all_absent_ok() {
        assert!(check_vendor_fields(None, None, None, None).is_ok());
    }

    #[test]
    fn vendor_name_blank_rejected() {
        assert!(check_vendor_fields(Some("   "), None, None, None).is_err());
    }

    #[test]
    fn vendor_free_text_risk_accepted() {
        let result = check_vendor_fields(Some("Acme"), None, Some("Pending"), Some("extreme"));
        assert!(result.is_ok());
    }

    #[test]
    fn vendor_overlong_risk_rejected() {
        let risk = "r".repeat(256);
        let err = check_vendor_fields(Some("Acme"), None, None, Some(&risk)).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("risk_status")));
    }

    #[test]
    fn update_request_defaults_to_no_changes() {
        let req: UpdateVendorRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(req.vendor_name.is_none() && req.review_date.is_none());
    }
}
