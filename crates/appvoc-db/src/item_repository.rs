//! Repositories for harvested records.
//!
//! Each repository stages items in memory on `load`/`replace` and writes them
//! in one transaction on `save`. A failed commit puts the items back so the
//! next `save` retries them.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres, Transaction};

use appvoc_core::error::AppError;
use appvoc_core::models::{App, Rating, Review};
use appvoc_core::traits::ItemStore;

use crate::staging::{Staging, WriteMode};

async fn begin(pool: &PgPool) -> Result<Transaction<'static, Postgres>, AppError> {
    pool.begin()
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Apps
// ---------------------------------------------------------------------------

const INSERT_APP: &str = r#"
    INSERT INTO app (id, name, description, category_id, category, price,
                     developer_id, developer, rating, ratings, released)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
"#;

const UPDATE_APP: &str = "name = EXCLUDED.name, description = EXCLUDED.description, \
    category_id = EXCLUDED.category_id, category = EXCLUDED.category, price = EXCLUDED.price, \
    developer_id = EXCLUDED.developer_id, developer = EXCLUDED.developer, \
    rating = EXCLUDED.rating, ratings = EXCLUDED.ratings, released = EXCLUDED.released";

/// PostgreSQL store for app listings.
#[derive(Clone)]
pub struct AppRepository {
    pool: Pool<Postgres>,
    staging: Staging<App>,
}

impl AppRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            staging: Staging::default(),
        }
    }

    /// Items waiting for the next `save`.
    pub fn staged(&self) -> usize {
        self.staging.len()
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM app")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn write(&self, staged: &[(WriteMode, App)]) -> Result<u64, AppError> {
        let mut tx = begin(&self.pool).await?;
        let mut written = 0;

        for (mode, app) in staged {
            let sql = format!("{INSERT_APP} {}", mode.conflict_clause(UPDATE_APP));
            let result = sqlx::query(&sql)
                .bind(app.id)
                .bind(&app.name)
                .bind(&app.description)
                .bind(app.category_id)
                .bind(&app.category)
                .bind(app.price)
                .bind(app.developer_id)
                .bind(&app.developer)
                .bind(app.rating)
                .bind(app.ratings)
                .bind(app.released)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            written += result.rows_affected();
        }

        commit(tx).await?;
        Ok(written)
    }
}

#[derive(sqlx::FromRow)]
struct AppRow {
    id: i64,
    name: String,
    description: String,
    category_id: i64,
    category: String,
    price: f64,
    developer_id: i64,
    developer: String,
    rating: f64,
    ratings: i64,
    released: Option<DateTime<Utc>>,
}

impl From<AppRow> for App {
    fn from(row: AppRow) -> Self {
        App {
            id: row.id,
            name: row.name,
            description: row.description,
            category_id: row.category_id,
            category: row.category,
            price: row.price,
            developer_id: row.developer_id,
            developer: row.developer,
            rating: row.rating,
            ratings: row.ratings,
            released: row.released,
        }
    }
}

impl ItemStore<App> for AppRepository {
    async fn load(&self, items: Vec<App>) -> Result<(), AppError> {
        self.staging.push(WriteMode::Insert, items);
        Ok(())
    }

    async fn replace(&self, items: Vec<App>) -> Result<(), AppError> {
        self.staging.push(WriteMode::Upsert, items);
        Ok(())
    }

    async fn get_by_category(&self, category_id: i64) -> Result<Vec<App>, AppError> {
        let rows = sqlx::query_as::<_, AppRow>(
            r#"
            SELECT id, name, description, category_id, category, price,
                   developer_id, developer, rating, ratings, released
            FROM app
            WHERE category_id = $1
            ORDER BY id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn exists(&self, id: &i64) -> Result<bool, AppError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM app WHERE id = $1)")
            .bind(*id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        self.staging.clear();
        let result = sqlx::query("DELETE FROM app")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn save(&self) -> Result<u64, AppError> {
        let staged = self.staging.take();
        if staged.is_empty() {
            return Ok(0);
        }
        match self.write(&staged).await {
            Ok(written) => {
                tracing::debug!(table = "app", staged = staged.len(), written, "Saved");
                Ok(written)
            }
            Err(e) => {
                self.staging.restore(staged);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ratings
// ---------------------------------------------------------------------------

const INSERT_RATING: &str = r#"
    INSERT INTO rating (id, name, category_id, category, rating, reviews, ratings,
                        onestar, twostar, threestar, fourstar, fivestar)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
"#;

const UPDATE_RATING: &str = "name = EXCLUDED.name, category_id = EXCLUDED.category_id, \
    category = EXCLUDED.category, rating = EXCLUDED.rating, reviews = EXCLUDED.reviews, \
    ratings = EXCLUDED.ratings, onestar = EXCLUDED.onestar, twostar = EXCLUDED.twostar, \
    threestar = EXCLUDED.threestar, fourstar = EXCLUDED.fourstar, fivestar = EXCLUDED.fivestar";

/// PostgreSQL store for rating histograms.
#[derive(Clone)]
pub struct RatingRepository {
    pool: Pool<Postgres>,
    staging: Staging<Rating>,
}

impl RatingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            staging: Staging::default(),
        }
    }

    async fn write(&self, staged: &[(WriteMode, Rating)]) -> Result<u64, AppError> {
        let mut tx = begin(&self.pool).await?;
        let mut written = 0;

        for (mode, rating) in staged {
            let sql = format!("{INSERT_RATING} {}", mode.conflict_clause(UPDATE_RATING));
            let result = sqlx::query(&sql)
                .bind(rating.id)
                .bind(&rating.name)
                .bind(rating.category_id)
                .bind(&rating.category)
                .bind(rating.rating)
                .bind(rating.reviews)
                .bind(rating.ratings)
                .bind(rating.onestar)
                .bind(rating.twostar)
                .bind(rating.threestar)
                .bind(rating.fourstar)
                .bind(rating.fivestar)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            written += result.rows_affected();
        }

        commit(tx).await?;
        Ok(written)
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: i64,
    name: String,
    category_id: i64,
    category: String,
    rating: f64,
    reviews: i64,
    ratings: i64,
    onestar: i64,
    twostar: i64,
    threestar: i64,
    fourstar: i64,
    fivestar: i64,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            id: row.id,
            name: row.name,
            category_id: row.category_id,
            category: row.category,
            rating: row.rating,
            reviews: row.reviews,
            ratings: row.ratings,
            onestar: row.onestar,
            twostar: row.twostar,
            threestar: row.threestar,
            fourstar: row.fourstar,
            fivestar: row.fivestar,
        }
    }
}

impl ItemStore<Rating> for RatingRepository {
    async fn load(&self, items: Vec<Rating>) -> Result<(), AppError> {
        self.staging.push(WriteMode::Insert, items);
        Ok(())
    }

    async fn replace(&self, items: Vec<Rating>) -> Result<(), AppError> {
        self.staging.push(WriteMode::Upsert, items);
        Ok(())
    }

    async fn get_by_category(&self, category_id: i64) -> Result<Vec<Rating>, AppError> {
        let rows = sqlx::query_as::<_, RatingRow>(
            r#"
            SELECT id, name, category_id, category, rating, reviews, ratings,
                   onestar, twostar, threestar, fourstar, fivestar
            FROM rating
            WHERE category_id = $1
            ORDER BY id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn exists(&self, id: &i64) -> Result<bool, AppError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM rating WHERE id = $1)")
            .bind(*id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        self.staging.clear();
        let result = sqlx::query("DELETE FROM rating")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn save(&self) -> Result<u64, AppError> {
        let staged = self.staging.take();
        if staged.is_empty() {
            return Ok(0);
        }
        match self.write(&staged).await {
            Ok(written) => {
                tracing::debug!(table = "rating", staged = staged.len(), written, "Saved");
                Ok(written)
            }
            Err(e) => {
                self.staging.restore(staged);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

const INSERT_REVIEW: &str = r#"
    INSERT INTO review (id, app_id, app_name, category_id, category, author, rating,
                        title, content, review_length, vote_sum, vote_count, date)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

const UPDATE_REVIEW: &str = "app_id = EXCLUDED.app_id, app_name = EXCLUDED.app_name, \
    category_id = EXCLUDED.category_id, category = EXCLUDED.category, author = EXCLUDED.author, \
    rating = EXCLUDED.rating, title = EXCLUDED.title, content = EXCLUDED.content, \
    review_length = EXCLUDED.review_length, vote_sum = EXCLUDED.vote_sum, \
    vote_count = EXCLUDED.vote_count, date = EXCLUDED.date";

/// PostgreSQL store for user reviews.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: Pool<Postgres>,
    staging: Staging<Review>,
}

impl ReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            staging: Staging::default(),
        }
    }

    /// Reviews already stored for one app.
    pub async fn count_for_app(&self, app_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM review WHERE app_id = $1")
            .bind(app_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn write(&self, staged: &[(WriteMode, Review)]) -> Result<u64, AppError> {
        let mut tx = begin(&self.pool).await?;
        let mut written = 0;

        for (mode, review) in staged {
            let sql = format!("{INSERT_REVIEW} {}", mode.conflict_clause(UPDATE_REVIEW));
            let result = sqlx::query(&sql)
                .bind(&review.id)
                .bind(review.app_id)
                .bind(&review.app_name)
                .bind(review.category_id)
                .bind(&review.category)
                .bind(&review.author)
                .bind(review.rating)
                .bind(&review.title)
                .bind(&review.content)
                .bind(review.review_length)
                .bind(review.vote_sum)
                .bind(review.vote_count)
                .bind(review.date)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            written += result.rows_affected();
        }

        commit(tx).await?;
        Ok(written)
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: String,
    app_id: i64,
    app_name: String,
    category_id: i64,
    category: String,
    author: String,
    rating: i64,
    title: String,
    content: String,
    review_length: i64,
    vote_sum: i64,
    vote_count: i64,
    date: Option<DateTime<Utc>>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            app_id: row.app_id,
            app_name: row.app_name,
            category_id: row.category_id,
            category: row.category,
            author: row.author,
            rating: row.rating,
            title: row.title,
            content: row.content,
            review_length: row.review_length,
            vote_sum: row.vote_sum,
            vote_count: row.vote_count,
            date: row.date,
        }
    }
}

impl ItemStore<Review> for ReviewRepository {
    async fn load(&self, items: Vec<Review>) -> Result<(), AppError> {
        self.staging.push(WriteMode::Insert, items);
        Ok(())
    }

    async fn replace(&self, items: Vec<Review>) -> Result<(), AppError> {
        self.staging.push(WriteMode::Upsert, items);
        Ok(())
    }

    async fn get_by_category(&self, category_id: i64) -> Result<Vec<Review>, AppError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT id, app_id, app_name, category_id, category, author, rating,
                   title, content, review_length, vote_sum, vote_count, date
            FROM review
            WHERE category_id = $1
            ORDER BY app_id, id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn exists(&self, id: &String) -> Result<bool, AppError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM review WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        self.staging.clear();
        let result = sqlx::query("DELETE FROM review")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn save(&self) -> Result<u64, AppError> {
        let staged = self.staging.take();
        if staged.is_empty() {
            return Ok(0);
        }
        match self.write(&staged).await {
            Ok(written) => {
                tracing::debug!(table = "review", staged = staged.len(), written, "Saved");
                Ok(written)
            }
            Err(e) => {
                self.staging.restore(staged);
                Err(e)
            }
        }
    }
}
