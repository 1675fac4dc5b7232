use appvoc_core::models::{App, Rating, Review};
use appvoc_db::Database;
use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Spins up a PostgreSQL container, runs the workspace migrations, and
/// returns a connected pool.
///
/// The `ContainerAsync` must be kept in scope for the test duration;
/// dropping it stops the container.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "appvoc_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/appvoc_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    Database::from_pool(pool.clone())
        .migrate()
        .await
        .expect("Failed to run migrations");

    (pool, container)
}

pub fn app(id: i64, category_id: i64, ratings: i64) -> App {
    App {
        id,
        name: format!("App {id}"),
        description: "Keeps notes.".into(),
        category_id,
        category: "Business".into(),
        price: 0.99,
        developer_id: 900 + id,
        developer: "Acme".into(),
        rating: 4.5,
        ratings,
        released: Some(Utc.with_ymd_and_hms(2021, 3, 14, 9, 0, 0).unwrap()),
    }
}

pub fn rating(id: i64, category_id: i64) -> Rating {
    Rating {
        id,
        name: format!("App {id}"),
        category_id,
        category: "Business".into(),
        rating: 4.2,
        reviews: 40,
        ratings: 150,
        onestar: 10,
        twostar: 10,
        threestar: 20,
        fourstar: 50,
        fivestar: 60,
    }
}

pub fn review(id: &str, app_id: i64, category_id: i64) -> Review {
    Review {
        id: id.to_string(),
        app_id,
        app_name: format!("App {app_id}"),
        category_id,
        category: "Business".into(),
        author: "reader".into(),
        rating: 5,
        title: "Great".into(),
        content: "Does what it says".into(),
        review_length: 4,
        vote_sum: 2,
        vote_count: 3,
        date: Some(Utc.with_ymd_and_hms(2022, 1, 2, 3, 4, 5).unwrap()),
    }
}
