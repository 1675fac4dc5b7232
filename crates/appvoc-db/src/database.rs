use appvoc_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::cursor_repository::CursorRepository;
use crate::item_repository::{AppRepository, RatingRepository, ReviewRepository};
use crate::job_repository::JobRepository;
use crate::project_repository::ProjectRepository;

/// Central database facade: owns the connection pool, runs migrations,
/// and vends repository instances.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// App listings. Each call returns a repository with its own staging area.
    pub fn app_repo(&self) -> AppRepository {
        AppRepository::new(self.pool.clone())
    }

    pub fn rating_repo(&self) -> RatingRepository {
        RatingRepository::new(self.pool.clone())
    }

    pub fn review_repo(&self) -> ReviewRepository {
        ReviewRepository::new(self.pool.clone())
    }

    pub fn job_repo(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    pub fn project_repo(&self) -> ProjectRepository {
        ProjectRepository::new(self.pool.clone())
    }

    /// Per-app review progress.
    pub fn cursor_repo(&self) -> CursorRepository {
        CursorRepository::new(self.pool.clone())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
