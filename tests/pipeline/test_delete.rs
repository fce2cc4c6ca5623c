//! Delete: best-effort schema and folder removal, mandatory catalog delete.

use sitedock_lib::error::AppError;
use uuid::Uuid;

use super::helpers::*;

#[actix_rt::test]
async fn test_delete_removes_everything() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    env.services
        .delete(project.id, Some(env.user_id))
        .await
        .unwrap();

    assert!(env.pool.get_project(project.id).await.unwrap().is_none());
    assert!(env.pool.get_project_logs(project.id).await.unwrap().is_empty());
    assert!(!env.engine.has_schema("demo_db"));
    assert!(!env.web_root().join("demo").exists());
}

#[actix_rt::test]
async fn test_failed_schema_drop_does_not_block_delete() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    env.engine.fail_drops();

    env.services
        .delete(project.id, Some(env.user_id))
        .await
        .unwrap();

    assert!(env.pool.get_project(project.id).await.unwrap().is_none());
    assert!(!env.web_root().join("demo").exists());
    // Logged and left behind
    assert!(env.engine.has_schema("demo_db"));
}

#[actix_rt::test]
async fn test_missing_folder_does_not_block_delete() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    std::fs::remove_dir_all(env.web_root().join("demo")).unwrap();

    env.services
        .delete(project.id, Some(env.user_id))
        .await
        .unwrap();

    assert!(env.pool.get_project(project.id).await.unwrap().is_none());
    assert!(!env.engine.has_schema("demo_db"));
}

#[actix_rt::test]
async fn test_delete_by_non_owner_is_forbidden_and_harmless() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    let err = env
        .services
        .delete(project.id, Some(Uuid::now_v7()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)), "{:?}", err);
    assert!(env.pool.get_project(project.id).await.unwrap().is_some());
    assert!(env.engine.has_schema("demo_db"));
    assert!(env.web_root().join("demo").is_dir());
}

#[actix_rt::test]
async fn test_admin_delete_skips_ownership() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    env.services.delete(project.id, None).await.unwrap();

    assert!(env.pool.get_project(project.id).await.unwrap().is_none());
}

#[actix_rt::test]
async fn test_delete_unknown_project_is_not_found() {
    let env = TestEnv::new().await;

    let err = env.services.delete(Uuid::now_v7(), None).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)), "{:?}", err);
}

#[actix_rt::test]
async fn test_deleted_name_can_be_ingested_again() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    env.services.delete(project.id, None).await.unwrap();

    let again = env.ingest_demo().await;

    assert_ne!(again.id, project.id);
    assert_eq!(again.url, "demo");
    assert_eq!(env.engine.rows("demo_db", "users").len(), 2);
}
