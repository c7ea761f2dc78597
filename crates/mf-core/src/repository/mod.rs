//! The durable state store (spec.md §4.1 "State Store"). Each entity gets
//! its own Diesel-backed repository, following the teacher's
//! `DieselSourceRepository` shape: a `Clone` struct wrapping a [`DbPool`],
//! `TryFrom<Record> for DomainModel` for the read path, and plain structs
//! for the write path.

mod downloads;
mod encoder;
mod executions;
mod migrations;
mod pool;
mod processing_items;
mod records;
mod requests;
mod templates;

pub use downloads::DownloadRepository;
pub use encoder::EncoderRepository;
pub use executions::ExecutionRepository;
pub use pool::{build_pool, run_migrations, DbPool, PooledConn};
pub use processing_items::ProcessingItemRepository;
pub use requests::RequestRepository;
pub use templates::{Template, TemplateRepository};

/// Every repository bundled together, handed to callers that need the
/// full state store (mirrors the teacher's top-level `Repository` facade
/// in `foia/src/repository/mod.rs`).
#[derive(Clone)]
pub struct StateStore {
    pub requests: RequestRepository,
    pub templates: TemplateRepository,
    pub executions: ExecutionRepository,
    pub processing_items: ProcessingItemRepository,
    pub downloads: DownloadRepository,
    pub encoders: EncoderRepository,
    pool: DbPool,
}

impl StateStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            requests: RequestRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            executions: ExecutionRepository::new(pool.clone()),
            processing_items: ProcessingItemRepository::new(pool.clone()),
            downloads: DownloadRepository::new(pool.clone()),
            encoders: EncoderRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to `database_url`, applying pending migrations first.
    pub async fn connect(database_url: &str) -> crate::error::CoreResult<Self> {
        run_migrations(database_url).await?;
        let pool = build_pool(database_url)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A fresh migrated SQLite database backed by a temp file (in-memory
    /// SQLite doesn't survive pool checkout/checkin across connections, so
    /// the teacher's tests use a tempdir too).
    pub async fn test_pool() -> (DbPool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = db_path.to_str().unwrap().to_string();

        run_migrations(&url).await.unwrap();
        let pool = build_pool(&url).unwrap();
        (pool, dir)
    }
}
