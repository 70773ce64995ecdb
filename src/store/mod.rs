pub mod blobs;
pub mod bootstrap;
pub mod pool;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::files::FileStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub files: FileStore,
    pub config: Arc<Config>,
}
