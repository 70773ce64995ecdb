use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json as JsonColumn;

use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::files::FileRef;
use crate::store::AppState;
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnswerInput {
    pub question: String,
    pub answer: Option<String>,
    #[serde(default, rename = "evidenceFiles")]
    pub evidence_files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAssessmentRequest {
    pub project_id: i32,
    #[serde(default)]
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssessmentRequest {
    pub project_id: i32,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AssessmentResponse {
    pub id: i32,
    pub project_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AnswerResponse {
    pub id: i32,
    pub assessment_id: i32,
    pub question: String,
    pub answer: Option<String>,
    #[sqlx(json)]
    #[serde(rename = "evidenceFiles")]
    pub evidence_files: Vec<FileRef>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes are registered unconditionally; whether they need a token is
/// decided by `AuthUser` from `Config::auth_mode`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/assessments",
            get(list_assessments).post(create_assessment),
        )
        .route("/api/assessments/getAnswers/{id}", get(get_answers))
        .route(
            "/api/assessments/{id}",
            get(get_assessment)
                .put(update_assessment)
                .delete(delete_assessment),
        )
}

fn validate_answers(answers: &[AnswerInput]) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    for (i, a) in answers.iter().enumerate() {
        if validation::check_length("question", a.question.trim(), 1, validation::MAX_TEXT_LEN)
            .is_err()
        {
            errors.push(format!("answers[{i}].question"));
        }
        if let Some(ref answer) = a.answer
            && validation::check_length("answer", answer, 0, validation::MAX_TEXT_LEN).is_err()
        {
            errors.push(format!("answers[{i}].answer"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// 400 unless every file referenced by an answer exists.
async fn check_file_refs(pool: &PgPool, answers: &[AnswerInput]) -> Result<(), ApiError> {
    let mut ids: Vec<i32> = answers
        .iter()
        .flat_map(|a| a.evidence_files.iter().map(|f| f.id))
        .collect();
    if ids.is_empty() {
        return Ok(());
    }
    ids.sort_unstable();
    ids.dedup();

    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(pool)
        .await?;
    if usize::try_from(found).ok() != Some(ids.len()) {
        return Err(ApiError::BadRequest(
            "answer evidence references an unknown file".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_assessments(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<AssessmentResponse>>, ApiError> {
    let rows = sqlx::query_as::<_, AssessmentResponse>(
        "SELECT id, project_id, created_at, updated_at FROM assessments ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

async fn get_assessment(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<AssessmentResponse>, ApiError> {
    let row = sqlx::query_as::<_, AssessmentResponse>(
        "SELECT id, project_id, created_at, updated_at FROM assessments WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("assessment".into()))?;
    Ok(Json(row))
}

async fn get_answers(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<Vec<AnswerResponse>>, ApiError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM assessments WHERE id = $1)")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;
    if !exists {
        return Err(ApiError::NotFound("assessment".into()));
    }

    let rows = sqlx::query_as::<_, AnswerResponse>(
        "SELECT id, assessment_id, question, answer, evidence_files, created_at
         FROM answers WHERE assessment_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

/// Creates the assessment and its initial answers in one transaction.
#[tracing::instrument(
    skip(state, body),
    fields(project_id = body.project_id, answers = body.answers.len()),
    err
)]
async fn create_assessment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateAssessmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::check_id("project_id", body.project_id)?;
    validate_answers(&body.answers)?;
    check_file_refs(&state.pool, &body.answers).await?;

    let mut tx = state.pool.begin().await?;

    let assessment = sqlx::query_as::<_, AssessmentResponse>(
        "INSERT INTO assessments (project_id) VALUES ($1)
         RETURNING id, project_id, created_at, updated_at",
    )
    .bind(body.project_id)
    .fetch_one(&mut *tx)
    .await?;

    for a in &body.answers {
        sqlx::query(
            "INSERT INTO answers (assessment_id, question, answer, evidence_files)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(assessment.id)
        .bind(a.question.trim())
        .bind(&a.answer)
        .bind(JsonColumn(&a.evidence_files))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "assessment.create",
            resource: "assessment",
            resource_id: Some(assessment.id),
            detail: Some(serde_json::json!({
                "project_id": body.project_id,
                "answers": body.answers.len(),
            })),
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(assessment)))
}

#[tracing::instrument(skip(state, body), fields(%id), err)]
async fn update_assessment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(body): Json<UpdateAssessmentRequest>,
) -> Result<Json<AssessmentResponse>, ApiError> {
    validation::check_id("project_id", body.project_id)?;

    let row = sqlx::query_as::<_, AssessmentResponse>(
        "UPDATE assessments SET project_id = $1, updated_at = now()
         WHERE id = $2
         RETURNING id, project_id, created_at, updated_at",
    )
    .bind(body.project_id)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("assessment".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "assessment.update",
            resource: "assessment",
            resource_id: Some(id),
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok(Json(row))
}

/// Responds `202 Accepted` with the removed row; answers cascade.
#[tracing::instrument(skip(state), fields(%id), err)]
async fn delete_assessment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let row = sqlx::query_as::<_, AssessmentResponse>(
        "DELETE FROM assessments WHERE id = $1
         RETURNING id, project_id, created_at, updated_at",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("assessment".into()))?;

    write_audit(
        &state.pool,
        &AuditEntry {
            actor: &auth.actor,
            action: "assessment.delete",
            resource: "assessment",
            resource_id: Some(id),
            detail: None,
            ip_addr: auth.ip_addr.as_deref(),
        },
    )
    .await;

    Ok((StatusCode::ACCEPTED, Json(row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_question_reported_with_index() {
        let answers = vec![
            AnswerInput {
                question: "Is there a DPIA?".into(),
                answer: Some("Yes".into()),
                evidence_files: vec![],
            },
            AnswerInput {
                question: "  ".into(),
                answer: None,
                evidence_files: vec![],
            },
        ];
        let err = validate_answers(&answers).unwrap_err();
        assert!(
            matches!(err, ApiError::Validation(ref f) if f == &["answers[1].question".to_owned()])
        );
    }

    #[test]
    fn no_answers_is_valid() {
        assert!(validate_answers(&[]).is_ok());
    }

    #[test]
    fn create_request_answers_default_empty() {
        let req: CreateAssessmentRequest =
            serde_json::from_value(serde_json::json!({ "project_id": 4 })).unwrap();
        assert!(req.answers.is_empty());
    }
}
