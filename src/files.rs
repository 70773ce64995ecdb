//! Attachment uploads.
//!
//! Blob bytes go to the object store under `attachments/{id}`; the numeric id
//! and metadata live in the `files` table. Rows that reference a file (for
//! example a subcontrol's evidence list) hold `{id, fileName}` pairs and do not
//! own the blob.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::error::ApiError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("invalid upload: {0}")]
    Invalid(String),

    #[error("upload of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Storage(#[from] opendal::Error),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Invalid(msg) => Self::BadRequest(msg),
            FileError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            FileError::Storage(e) => Self::from(e),
            FileError::Db(e) => Self::from(e),
        }
    }
}

/// A raw file received from a client, not yet persisted.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Identifier and name of a persisted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: i32,
    pub filename: String,
}

/// Reference to a stored file as embedded in other rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: i32,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

impl From<StoredFile> for FileRef {
    fn from(f: StoredFile) -> Self {
        Self {
            id: f.id,
            file_name: f.filename,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i32,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

fn storage_key(id: i32) -> String {
    format!("attachments/{id}")
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn check_upload(file: &UploadedFile, limit: usize) -> Result<(), FileError> {
    let name = file.file_name.trim();
    if name.is_empty() {
        return Err(FileError::Invalid("file name must not be empty".into()));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(FileError::Invalid(format!(
            "file name must be at most {MAX_FILE_NAME_LEN} characters"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(FileError::Invalid(
            "file name must not contain path separators or null bytes".into(),
        ));
    }
    if file.data.len() > limit {
        return Err(FileError::TooLarge {
            size: file.data.len(),
            limit,
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct FileStore {
    pool: PgPool,
    blobs: Operator,
    max_bytes: usize,
}

impl FileStore {
    pub fn new(pool: PgPool, blobs: Operator, max_bytes: usize) -> Self {
        Self {
            pool,
            blobs,
            max_bytes,
        }
    }

    /// Persist one file and return its store-assigned id.
    ///
    /// The metadata row is inserted first so the blob key can use the id; if
    /// the blob write fails the row is removed again before returning.
    #[tracing::instrument(
        skip(self, file),
        fields(file_name = %file.file_name, size = file.data.len()),
        err
    )]
    pub async fn upload(&self, file: &UploadedFile) -> Result<StoredFile, FileError> {
        check_upload(file, self.max_bytes)?;

        let filename = file.file_name.trim().to_owned();
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
        let size = i64::try_from(file.data.len())
            .map_err(|_| FileError::Invalid("file size out of range".into()))?;

        let id: i32 = sqlx::query_scalar(
            "INSERT INTO files (filename, content_type, size_bytes, sha256)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(&filename)
        .bind(&content_type)
        .bind(size)
        .bind(sha256_hex(&file.data))
        .fetch_one(&self.pool)
        .await?;

        if let Err(e) = self.blobs.write(&storage_key(id), file.data.clone()).await {
            if let Err(cleanup) = sqlx::query("DELETE FROM files WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
            {
                tracing::warn!(
                    error = %cleanup,
                    file_id = id,
                    "failed to remove metadata for unwritten blob"
                );
            }
            return Err(e.into());
        }

        tracing::debug!(file_id = id, "file stored");
        Ok(StoredFile { id, filename })
    }

    pub async fn get(&self, id: i32) -> Result<Option<FileRecord>, FileError> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT id, filename, content_type, size_bytes, sha256, uploaded_at
             FROM files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn download(&self, id: i32) -> Result<Option<(FileRecord, Bytes)>, FileError> {
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };
        let data = self.blobs.read(&storage_key(id)).await?.to_bytes();
        Ok(Some((record, data)))
    }

    /// Delete a file's metadata and blob. Returns `false` if no such file.
    #[tracing::instrument(skip(self), err)]
    pub async fn remove(&self, id: i32) -> Result<bool, FileError> {
        let deleted: Option<i32> =
            sqlx::query_scalar("DELETE FROM files WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        if deleted.is_none() {
            return Ok(false);
        }
        self.blobs.delete(&storage_key(id)).await?;
        Ok(true)
    }
}
