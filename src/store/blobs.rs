use opendal::Operator;

use crate::config::{BlobBackend, Config};

/// Build the object-store operator attachment blobs are written to.
pub fn operator(cfg: &Config) -> anyhow::Result<Operator> {
    let op = match cfg.blob_backend {
        BlobBackend::S3 => {
            let builder = opendal::services::S3::default()
                .endpoint(&cfg.s3_endpoint)
                .access_key_id(&cfg.s3_access_key)
                .secret_access_key(&cfg.s3_secret_key)
                .bucket(&cfg.s3_bucket)
                .region("us-east-1");
            Operator::new(builder)?.finish()
        }
        BlobBackend::Fs => {
            let root = cfg.blob_root.to_string_lossy();
            let builder = opendal::services::Fs::default().root(&root);
            Operator::new(builder)?.finish()
        }
        BlobBackend::Memory => {
            tracing::warn!("using in-memory blob storage; attachments are lost on restart");
            Operator::new(opendal::services::Memory::default())?.finish()
        }
    };

    tracing::info!(backend = ?cfg.blob_backend, "blob operator created");
    Ok(op)
}
