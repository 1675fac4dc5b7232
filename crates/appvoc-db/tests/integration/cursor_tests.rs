use appvoc_core::models::{AppRef, ReviewCursor};
use appvoc_core::traits::CursorStore;
use appvoc_db::CursorRepository;

use crate::integration::common::setup_test_db;

fn app_ref(id: i64, category_id: i64) -> AppRef {
    AppRef {
        id,
        name: format!("App {id}"),
        category_id,
        category: "Books".into(),
    }
}

#[tokio::test]
async fn upsert_moves_cursor_forward() {
    let (pool, _container) = setup_test_db().await;
    let repo = CursorRepository::new(pool);

    let mut cursor = ReviewCursor::new(&app_ref(1, 6018));
    cursor.advance(400);
    repo.upsert_cursor(&cursor).await.unwrap();

    cursor.advance(800);
    cursor.exhaust();
    repo.upsert_cursor(&cursor).await.unwrap();

    let stored = repo.get_cursors(6018).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].app_id, 1);
    assert_eq!(stored[0].last_index, 800);
    assert!(stored[0].exhausted);
}

#[tokio::test]
async fn cursors_are_listed_per_category() {
    let (pool, _container) = setup_test_db().await;
    let repo = CursorRepository::new(pool);

    for (id, category) in [(1, 6018), (2, 6018), (3, 6000)] {
        repo.upsert_cursor(&ReviewCursor::new(&app_ref(id, category)))
            .await
            .unwrap();
    }

    let books: Vec<i64> = repo
        .get_cursors(6018)
        .await
        .unwrap()
        .iter()
        .map(|c| c.app_id)
        .collect();
    assert_eq!(books, vec![1, 2]);
    assert!(repo.get_cursors(6014).await.unwrap().is_empty());
}
