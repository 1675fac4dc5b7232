use appvoc_core::traits::ItemStore;
use appvoc_db::{AppRepository, RatingRepository, ReviewRepository};

use crate::integration::common::{app, rating, review, setup_test_db};

#[tokio::test]
async fn load_is_not_durable_until_save() {
    let (pool, _container) = setup_test_db().await;
    let repo = AppRepository::new(pool);

    repo.load(vec![app(1, 6000, 10), app(2, 6000, 20)])
        .await
        .unwrap();
    assert_eq!(repo.staged(), 2);
    assert!(!repo.exists(&1).await.unwrap());

    let written = repo.save().await.unwrap();
    assert_eq!(written, 2);
    assert_eq!(repo.staged(), 0);
    assert!(repo.exists(&1).await.unwrap());
    assert_eq!(repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn load_ignores_existing_ids() {
    let (pool, _container) = setup_test_db().await;
    let repo = AppRepository::new(pool);

    repo.load(vec![app(1, 6000, 10)]).await.unwrap();
    repo.save().await.unwrap();

    let mut changed = app(1, 6000, 999);
    changed.name = "Renamed".into();
    repo.load(vec![changed, app(2, 6000, 5)]).await.unwrap();
    let written = repo.save().await.unwrap();

    assert_eq!(written, 1);
    let apps = repo.get_by_category(6000).await.unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0].name, "App 1");
    assert_eq!(apps[0].ratings, 10);
}

#[tokio::test]
async fn replace_overwrites_existing_rows() {
    let (pool, _container) = setup_test_db().await;
    let repo = AppRepository::new(pool);

    repo.load(vec![app(1, 6000, 10)]).await.unwrap();
    repo.save().await.unwrap();

    let mut changed = app(1, 6000, 999);
    changed.name = "Renamed".into();
    repo.replace(vec![changed]).await.unwrap();
    repo.save().await.unwrap();

    let apps = repo.get_by_category(6000).await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "Renamed");
    assert_eq!(apps[0].ratings, 999);
}

#[tokio::test]
async fn app_round_trip_preserves_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = AppRepository::new(pool);

    let original = app(42, 6014, 77);
    repo.load(vec![original.clone()]).await.unwrap();
    repo.save().await.unwrap();

    let stored = repo.get_by_category(6014).await.unwrap();
    assert_eq!(stored, vec![original]);
    assert!(repo.get_by_category(6000).await.unwrap().is_empty());
}

#[tokio::test]
async fn save_with_nothing_staged_writes_nothing() {
    let (pool, _container) = setup_test_db().await;
    let repo = RatingRepository::new(pool);
    assert_eq!(repo.save().await.unwrap(), 0);
}

#[tokio::test]
async fn clones_share_staged_items() {
    let (pool, _container) = setup_test_db().await;
    let repo = RatingRepository::new(pool);
    let clone = repo.clone();

    clone.load(vec![rating(7, 6000)]).await.unwrap();
    assert_eq!(repo.save().await.unwrap(), 1);
    assert!(clone.exists(&7).await.unwrap());
}

#[tokio::test]
async fn rating_round_trip_and_delete_all() {
    let (pool, _container) = setup_test_db().await;
    let repo = RatingRepository::new(pool);

    repo.load(vec![rating(1, 6000), rating(2, 6000), rating(3, 6018)])
        .await
        .unwrap();
    repo.save().await.unwrap();

    let business = repo.get_by_category(6000).await.unwrap();
    assert_eq!(business, vec![rating(1, 6000), rating(2, 6000)]);

    assert_eq!(repo.delete_all().await.unwrap(), 3);
    assert!(!repo.exists(&3).await.unwrap());
}

#[tokio::test]
async fn reviews_keyed_by_string_id() {
    let (pool, _container) = setup_test_db().await;
    let repo = ReviewRepository::new(pool);

    repo.load(vec![
        review("r-1", 10, 6000),
        review("r-2", 10, 6000),
        review("r-3", 11, 6000),
    ])
    .await
    .unwrap();
    repo.save().await.unwrap();

    assert!(repo.exists(&"r-2".to_string()).await.unwrap());
    assert!(!repo.exists(&"r-9".to_string()).await.unwrap());
    assert_eq!(repo.count_for_app(10).await.unwrap(), 2);

    let stored = repo.get_by_category(6000).await.unwrap();
    let ids: Vec<&str> = stored.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r-1", "r-2", "r-3"]);
    assert_eq!(stored[0], review("r-1", 10, 6000));
}

#[tokio::test]
async fn failed_save_keeps_items_staged() {
    let (pool, _container) = setup_test_db().await;
    let repo = AppRepository::new(pool.clone());

    sqlx::query("DROP TABLE app").execute(&pool).await.unwrap();
    repo.load(vec![app(1, 6000, 1)]).await.unwrap();

    let result = repo.save().await;
    assert!(matches!(
        result,
        Err(appvoc_core::AppError::DatabaseError(_))
    ));
    assert_eq!(repo.staged(), 1);
}
