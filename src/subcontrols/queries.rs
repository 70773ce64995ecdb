//! Data access for the `subcontrols` table.
//!
//! Not-found is `Ok(None)`, never an error. Listing is ordered by id so
//! callers see a stable order across requests.

use futures_util::future::join_all;
use sqlx::PgPool;
use sqlx::types::Json;

use super::{Subcontrol, SubcontrolError, SubcontrolFields, SubcontrolRecord};
use crate::files::{FileError, FileRef, FileStore, StoredFile, UploadedFile};

const COLUMNS: &str = "id, control_id, status, approver, owner, reviewer, risk_review, due_date, \
     implementation_details, evidence, feedback, evidence_files, feedback_files, attachment";

pub async fn list_all(pool: &PgPool) -> Result<Vec<Subcontrol>, sqlx::Error> {
    sqlx::query_as::<_, Subcontrol>(&format!("SELECT {COLUMNS} FROM subcontrols ORDER BY id"))
        .fetch_all(pool)
        .await
}

pub async fn list_by_control(
    pool: &PgPool,
    control_id: i32,
) -> Result<Vec<Subcontrol>, sqlx::Error> {
    sqlx::query_as::<_, Subcontrol>(&format!(
        "SELECT {COLUMNS} FROM subcontrols WHERE control_id = $1 ORDER BY id"
    ))
    .bind(control_id)
    .fetch_all(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: i32) -> Result<Option<Subcontrol>, sqlx::Error> {
    sqlx::query_as::<_, Subcontrol>(&format!("SELECT {COLUMNS} FROM subcontrols WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Upload the attachments and insert a new subcontrol under `control_id`.
///
/// Evidence and feedback files are uploaded concurrently. If any upload or
/// the insert itself fails, every file this call managed to store is removed
/// before the error is returned. A process crash between upload and insert
/// can still leave unreferenced files behind.
#[tracing::instrument(
    skip(pool, files, fields, evidence_files, feedback_files),
    fields(evidence = evidence_files.len(), feedback = feedback_files.len()),
    err
)]
pub async fn create(
    pool: &PgPool,
    files: &FileStore,
    control_id: i32,
    fields: &SubcontrolFields,
    evidence_files: Vec<UploadedFile>,
    feedback_files: Vec<UploadedFile>,
) -> Result<Subcontrol, SubcontrolError> {
    let (evidence_results, feedback_results) = futures_util::join!(
        join_all(evidence_files.iter().map(|f| files.upload(f))),
        join_all(feedback_files.iter().map(|f| files.upload(f))),
    );

    let (evidence, evidence_err) = split_uploads(evidence_results);
    let (feedback, feedback_err) = split_uploads(feedback_results);

    if let Some(err) = evidence_err.or(feedback_err) {
        discard_uploads(files, evidence.iter().chain(&feedback)).await;
        return Err(err.into());
    }

    let evidence_refs: Vec<FileRef> = evidence.iter().cloned().map(FileRef::from).collect();
    let feedback_refs: Vec<FileRef> = feedback.iter().cloned().map(FileRef::from).collect();

    let inserted = sqlx::query_as::<_, Subcontrol>(&format!(
        "INSERT INTO subcontrols (
            control_id, status, approver, risk_review, owner, reviewer, due_date,
            implementation_details, evidence, feedback, evidence_files, feedback_files
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {COLUMNS}"
    ))
    .bind(control_id)
    .bind(&fields.status)
    .bind(&fields.approver)
    .bind(&fields.risk_review)
    .bind(&fields.owner)
    .bind(&fields.reviewer)
    .bind(fields.due_date)
    .bind(&fields.implementation_details)
    .bind(&fields.evidence)
    .bind(&fields.feedback)
    .bind(Json(&evidence_refs))
    .bind(Json(&feedback_refs))
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(row) => {
            tracing::info!(subcontrol_id = row.id, control_id, "subcontrol created");
            Ok(row)
        }
        Err(e) => {
            discard_uploads(files, evidence.iter().chain(&feedback)).await;
            Err(e.into())
        }
    }
}

/// Overwrite every mutable column of subcontrol `id` with `record`.
///
/// Attachment lists are left as they are.
#[tracing::instrument(skip(pool, record), err)]
pub async fn update(
    pool: &PgPool,
    id: i32,
    record: &SubcontrolRecord,
) -> Result<Option<Subcontrol>, sqlx::Error> {
    sqlx::query_as::<_, Subcontrol>(&format!(
        "UPDATE subcontrols SET
            control_id = $1, status = $2, approver = $3, risk_review = $4, owner = $5,
            reviewer = $6, due_date = $7, implementation_details = $8, evidence = $9,
            attachment = $10, feedback = $11
         WHERE id = $12
         RETURNING {COLUMNS}"
    ))
    .bind(record.control_id)
    .bind(&record.status)
    .bind(&record.approver)
    .bind(&record.risk_review)
    .bind(&record.owner)
    .bind(&record.reviewer)
    .bind(record.due_date)
    .bind(&record.implementation_details)
    .bind(&record.evidence)
    .bind(&record.attachment)
    .bind(&record.feedback)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Delete subcontrol `id` and return the removed row. Referenced files stay.
#[tracing::instrument(skip(pool), err)]
pub async fn delete_by_id(pool: &PgPool, id: i32) -> Result<Option<Subcontrol>, sqlx::Error> {
    sqlx::query_as::<_, Subcontrol>(&format!(
        "DELETE FROM subcontrols WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Keep successful uploads in input order and the first failure, if any.
fn split_uploads(
    results: Vec<Result<StoredFile, FileError>>,
) -> (Vec<StoredFile>, Option<FileError>) {
    let mut stored = Vec::with_capacity(results.len());
    let mut first_err = None;
    for result in results {
        match result {
            Ok(file) => stored.push(file),
            Err(e) if first_err.is_none() => first_err = Some(e),
            Err(e) => tracing::debug!(error = %e, "additional upload failure"),
        }
    }
    (stored, first_err)
}

async fn discard_uploads<'a>(files: &FileStore, stored: impl Iterator<Item = &'a StoredFile>) {
    for file in stored {
        if let Err(e) = files.remove(file.id).await {
            tracing::warn!(error = %e, file_id = file.id, "failed to discard orphaned upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: i32) -> StoredFile {
        StoredFile {
            id,
            filename: format!("f{id}"),
        }
    }

    #[test]
    fn split_uploads_all_ok_keeps_order() {
        let (ok, err) = split_uploads(vec![Ok(stored(3)), Ok(stored(1)), Ok(stored(2))]);
        assert!(err.is_none());
        assert_eq!(ok.iter().map(|f| f.id).collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn split_uploads_empty_is_noop() {
        let (ok, err) = split_uploads(vec![]);
        assert!(ok.is_empty());
        assert!(err.is_none());
    }

    #[test]
    fn split_uploads_keeps_successes_next_to_failure() {
        let (ok, err) = split_uploads(vec![
            Ok(stored(1)),
            Err(FileError::Invalid("first".into())),
            Ok(stored(2)),
            Err(FileError::Invalid("second".into())),
        ]);
        assert_eq!(ok.len(), 2);
        assert!(matches!(err, Some(FileError::Invalid(ref m)) if m == "first"));
    }
}
