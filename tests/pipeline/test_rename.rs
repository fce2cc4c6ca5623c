//! Rename: catalog update with folder move and schema copy compensation.

use sitedock_lib::error::AppError;
use sitedock_lib::models::{ProjectInfo, UpdateProjectRequest};
use sitedock_lib::services::deployment::PROJECT_INFO_FILE;
use uuid::Uuid;

use super::helpers::*;

fn request(name: Option<&str>, description: Option<&str>, database: Option<&str>) -> UpdateProjectRequest {
    UpdateProjectRequest {
        name: name.map(str::to_string),
        description: description.map(str::to_string),
        database_name: database.map(str::to_string),
    }
}

fn read_info(dir: &std::path::Path) -> ProjectInfo {
    serde_json::from_str(&std::fs::read_to_string(dir.join(PROJECT_INFO_FILE)).unwrap()).unwrap()
}

/// (C) Description only: catalog update, nothing moved or copied.
#[actix_rt::test]
async fn test_description_only_rename_touches_catalog_only() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    let statements_before = env.engine.executed("demo_db").len();

    let updated = env
        .services
        .rename(env.user_id, project.id, request(None, Some("A new description"), None))
        .await
        .unwrap();

    assert_eq!(updated.description.as_deref(), Some("A new description"));
    assert_eq!(updated.url, project.url);
    assert_eq!(updated.upload_path, project.upload_path);
    assert_eq!(updated.database_name, "demo_db");

    assert_eq!(env.engine.schema_names(), vec!["demo_db".to_string()]);
    assert_eq!(env.engine.executed("demo_db").len(), statements_before);
    assert!(env.web_root().join("demo").is_dir());

    let stored = env.pool.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(stored.description.as_deref(), Some("A new description"));
}

/// (D) Target schema exists: rejected before any copy.
#[actix_rt::test]
async fn test_rename_to_existing_schema_is_rejected_before_copy() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    env.engine.seed_schema("taken_db");

    let err = env
        .services
        .rename(env.user_id, project.id, request(None, None, Some("taken_db")))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "{:?}", err);
    assert!(env.engine.table_names("taken_db").is_empty());
    assert_eq!(env.engine.rows("demo_db", "users").len(), 2);
    assert!(env.web_root().join("demo").is_dir());

    let stored = env.pool.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(stored.database_name, "demo_db");
}

#[actix_rt::test]
async fn test_rename_moves_folder_and_refreshes_sidecar() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    let updated = env
        .services
        .rename(env.user_id, project.id, request(Some("Demo Shop"), None, None))
        .await
        .unwrap();

    let new_dir = env.web_root().join("demo-shop");
    assert_eq!(updated.name, "Demo Shop");
    assert_eq!(updated.url, "demo-shop");
    assert_eq!(updated.upload_path, new_dir.to_string_lossy());
    assert!(new_dir.join("index.php").is_file());
    assert!(!env.web_root().join("demo").exists());

    let info = read_info(&new_dir);
    assert_eq!(info.name, "Demo Shop");
    assert_eq!(info.url, "demo-shop");
    assert_eq!(info.project_type, "basic");
}

#[actix_rt::test]
async fn test_rename_database_copies_schema_and_drops_old() {
    let env = TestEnv::new().await;
    let settings_dump = "\
CREATE TABLE `settings` (`id` int NOT NULL, `db_name` varchar(64), `theme` varchar(64));
INSERT INTO `settings` (`id`, `db_name`, `theme`) VALUES (1, 'demo_db', 'dark');
CREATE TABLE `orders` (
  `id` int NOT NULL,
  `user_id` int NOT NULL,
  PRIMARY KEY (`id`),
  CONSTRAINT `fk_orders_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)
);
INSERT INTO `orders` (`id`, `user_id`) VALUES (1, 1);
";
    let config = "<?php\n$config['database'] = 'demo_db';\n";
    let project = env
        .ingest(
            "Demo",
            "demo_db",
            &[
                ("index.php", "<?php"),
                ("sql/01_users.sql", USERS_DUMP),
                ("sql/02_settings.sql", settings_dump),
                ("app/settings.json", "{\"database\": \"demo_db\"}"),
                ("app/notes.txt", "demo_db"),
                ("config.php", config),
            ],
        )
        .await
        .unwrap()
        .project;
    assert_eq!(project.status, "deployed");

    let updated = env
        .services
        .rename(env.user_id, project.id, request(None, None, Some("demo_copy")))
        .await
        .unwrap();

    assert_eq!(updated.database_name, "demo_copy");
    assert_eq!(env.engine.schema_names(), vec!["demo_copy".to_string()]);
    assert_eq!(env.engine.rows("demo_copy", "users").len(), 2);
    assert_eq!(env.engine.rows("demo_copy", "orders").len(), 1);

    // Tables without foreign keys are created first
    let creates: Vec<String> = env
        .engine
        .executed("demo_copy")
        .into_iter()
        .filter(|sql| sql.starts_with("CREATE TABLE"))
        .collect();
    assert_eq!(creates.len(), 3);
    assert!(creates[2].contains("`orders`"), "{:?}", creates);

    let settings = env.engine.rows("demo_copy", "settings");
    assert!(settings[0].contains("demo_copy"), "{:?}", settings);

    let dir = env.web_root().join("demo");
    let json = std::fs::read_to_string(dir.join("app/settings.json")).unwrap();
    assert!(json.contains("demo_copy"));
    // Only config-like extensions are rewritten
    let notes = std::fs::read_to_string(dir.join("app/notes.txt")).unwrap();
    assert_eq!(notes, "demo_db");
    assert_eq!(read_info(&dir).database, "demo_copy");
}

#[actix_rt::test]
async fn test_failed_copy_keeps_old_folder_and_schema() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    env.engine.fail_copy_of("users");

    let err = env
        .services
        .rename(
            env.user_id,
            project.id,
            request(Some("Renamed"), None, Some("renamed_db")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Lifecycle(_)), "{:?}", err);

    // Old resources are authoritative, new ones are gone
    assert_eq!(env.engine.schema_names(), vec!["demo_db".to_string()]);
    assert_eq!(env.engine.rows("demo_db", "users").len(), 2);
    assert!(env.web_root().join("demo/index.php").is_file());
    assert!(!env.web_root().join("renamed").exists());

    let stored = env.pool.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Demo");
    assert_eq!(stored.url, "demo");
    assert_eq!(stored.database_name, "demo_db");
    assert_eq!(read_info(&env.web_root().join("demo")).url, "demo");
}

#[actix_rt::test]
async fn test_rename_to_taken_slug_is_a_conflict() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;
    env.ingest("Other", "other_db", &[("index.html", "<h1>other</h1>")])
        .await
        .unwrap();

    let err = env
        .services
        .rename(env.user_id, project.id, request(Some("other"), None, None))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "{:?}", err);
    assert!(env.web_root().join("demo").is_dir());
    assert!(env.web_root().join("other").is_dir());
}

#[actix_rt::test]
async fn test_rename_without_changes_is_rejected() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    let err = env
        .services
        .rename(env.user_id, project.id, request(Some("Demo"), None, Some("demo_db")))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
}

#[actix_rt::test]
async fn test_rename_with_invalid_database_name_is_rejected() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    let err = env
        .services
        .rename(env.user_id, project.id, request(None, None, Some("bad name")))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
    assert_eq!(env.engine.schema_names(), vec!["demo_db".to_string()]);
}

#[actix_rt::test]
async fn test_rename_requires_ownership() {
    let env = TestEnv::new().await;
    let project = env.ingest_demo().await;

    let err = env
        .services
        .rename(Uuid::now_v7(), project.id, request(Some("Stolen"), None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{:?}", err);

    let err = env
        .services
        .rename(env.user_id, Uuid::now_v7(), request(Some("Ghost"), None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "{:?}", err);
}
