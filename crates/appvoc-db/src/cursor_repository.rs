use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use appvoc_core::error::AppError;
use appvoc_core::models::ReviewCursor;
use appvoc_core::traits::CursorStore;

/// PostgreSQL-backed review cursors, one row per app.
#[derive(Clone)]
pub struct CursorRepository {
    pool: Pool<Postgres>,
}

impl CursorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    app_id: i64,
    category_id: i64,
    last_index: i64,
    exhausted: bool,
    updated: DateTime<Utc>,
}

impl From<CursorRow> for ReviewCursor {
    fn from(row: CursorRow) -> Self {
        ReviewCursor {
            app_id: row.app_id,
            category_id: row.category_id,
            last_index: row.last_index.max(0) as u64,
            exhausted: row.exhausted,
            updated: row.updated,
        }
    }
}

impl CursorStore for CursorRepository {
    async fn get_cursors(&self, category_id: i64) -> Result<Vec<ReviewCursor>, AppError> {
        let rows = sqlx::query_as::<_, CursorRow>(
            "SELECT * FROM review_cursor WHERE category_id = $1 ORDER BY app_id ASC",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_cursor(&self, cursor: &ReviewCursor) -> Result<(), AppError> {
        let last_index = i64::try_from(cursor.last_index).map_err(|_| {
            AppError::DatabaseError(format!(
                "Review index {} out of range for app {}",
                cursor.last_index, cursor.app_id
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO review_cursor (app_id, category_id, last_index, exhausted, updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (app_id) DO UPDATE
            SET category_id = EXCLUDED.category_id, last_index = EXCLUDED.last_index,
                exhausted = EXCLUDED.exhausted, updated = EXCLUDED.updated
            "#,
        )
        .bind(cursor.app_id)
        .bind(cursor.category_id)
        .bind(last_index)
        .bind(cursor.exhausted)
        .bind(cursor.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
