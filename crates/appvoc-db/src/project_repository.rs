use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use appvoc_core::error::AppError;
use appvoc_core::job::ControllerKind;
use appvoc_core::project::{Project, ProjectStatus};
use appvoc_core::traits::ProjectStore;

/// PostgreSQL-backed project storage, one row per (controller, term).
#[derive(Clone)]
pub struct ProjectRepository {
    pool: Pool<Postgres>,
}

impl ProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_projects(&self, controller: ControllerKind) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM project WHERE controller = $1 ORDER BY term ASC",
        )
        .bind(controller.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    controller: String,
    term: String,
    status: String,
    page_size: i64,
    pages: i64,
    vpages: i64,
    apps: i64,
    started: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = AppError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id,
            controller: row.controller.parse().map_err(AppError::DatabaseError)?,
            term: row.term,
            status: row.status.parse().unwrap_or(ProjectStatus::Ready),
            page_size: row.page_size,
            pages: row.pages,
            vpages: row.vpages,
            apps: row.apps,
            started: row.started,
            updated: row.updated,
            completed: row.completed,
        })
    }
}

impl ProjectStore for ProjectRepository {
    async fn get_project(
        &self,
        controller: ControllerKind,
        term: &str,
    ) -> Result<Option<Project>, AppError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM project WHERE controller = $1 AND term = $2",
        )
        .bind(controller.as_str())
        .bind(term)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn add_project(&self, project: &Project) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO project (id, controller, term, status, page_size, pages, vpages, apps,
                                 started, updated, completed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(project.id)
        .bind(project.controller.as_str())
        .bind(&project.term)
        .bind(project.status.as_str())
        .bind(project.page_size)
        .bind(project.pages)
        .bind(project.vpages)
        .bind(project.apps)
        .bind(project.started)
        .bind(project.updated)
        .bind(project.completed)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn update_project(&self, project: &Project) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE project
            SET status = $2, page_size = $3, pages = $4, vpages = $5, apps = $6,
                started = $7, updated = $8, completed = $9
            WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(project.status.as_str())
        .bind(project.page_size)
        .bind(project.pages)
        .bind(project.vpages)
        .bind(project.apps)
        .bind(project.started)
        .bind(project.updated)
        .bind(project.completed)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseError(format!(
                "Project '{}' not found",
                project.term
            )));
        }
        Ok(())
    }
}
