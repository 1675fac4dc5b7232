use appvoc_core::job::ControllerKind;
use appvoc_core::project::{Project, ProjectStatus};
use appvoc_core::traits::ProjectStore;
use appvoc_db::ProjectRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn add_and_get_project() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProjectRepository::new(pool);

    let mut project = Project::new(ControllerKind::AppData, "notes", 200);
    project.start().unwrap();
    repo.add_project(&project).await.unwrap();

    let stored = repo
        .get_project(ControllerKind::AppData, "notes")
        .await
        .unwrap()
        .expect("project exists");
    assert_eq!(stored.id, project.id);
    assert_eq!(stored.status, ProjectStatus::InProgress);
    assert_eq!(stored.page_size, 200);
    assert_eq!(stored.apps, 0);

    assert!(
        repo.get_project(ControllerKind::AppData, "weather")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn progress_persists_for_resumption() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProjectRepository::new(pool);

    let mut project = Project::new(ControllerKind::AppData, "notes", 200);
    project.start().unwrap();
    repo.add_project(&project).await.unwrap();

    project.update(200);
    project.update(200);
    project.update(150);
    repo.update_project(&project).await.unwrap();

    let stored = repo
        .get_project(ControllerKind::AppData, "notes")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.pages, 3);
    assert_eq!(stored.apps, 550);
    assert_eq!(stored.start_page(), 2);

    project.complete().unwrap();
    repo.update_project(&project).await.unwrap();
    let stored = repo
        .get_project(ControllerKind::AppData, "notes")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_complete());
    assert!(stored.completed.is_some());

    let listed = repo.list_projects(ControllerKind::AppData).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn term_is_unique_per_controller() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProjectRepository::new(pool);

    repo.add_project(&Project::new(ControllerKind::AppData, "notes", 200))
        .await
        .unwrap();
    let result = repo
        .add_project(&Project::new(ControllerKind::AppData, "notes", 200))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn update_missing_project_fails() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProjectRepository::new(pool);
    let project = Project::new(ControllerKind::AppData, "ghost", 200);
    assert!(repo.update_project(&project).await.is_err());
}
