pub mod config;
pub mod cursor_repository;
pub mod database;
pub mod item_repository;
pub mod job_repository;
pub mod project_repository;
mod staging;

pub use config::DatabaseConfig;
pub use cursor_repository::CursorRepository;
pub use database::Database;
pub use item_repository::{AppRepository, RatingRepository, ReviewRepository};
pub use job_repository::JobRepository;
pub use project_repository::ProjectRepository;
