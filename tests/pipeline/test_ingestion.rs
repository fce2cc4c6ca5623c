//! Ingestion: archive intake, replay, deployment and catalog record.

use sea_orm::ConnectionTrait;
use sitedock_lib::error::AppError;
use sitedock_lib::models::{DEPLOY_SUCCESS_MESSAGE, ProjectInfo, ProjectStatus};
use sitedock_lib::services::deployment::{PROJECT_INFO_FILE, REWRITE_FILE};

use super::helpers::*;

/// (A) One dump, one table, two rows → deployed with a single success log.
#[actix_rt::test]
async fn test_clean_dump_deploys() {
    let env = TestEnv::new().await;
    let outcome = env
        .ingest(
            "Demo",
            "demo_db",
            &[("index.php", "<?php echo 'hi';"), ("db/users.sql", USERS_DUMP)],
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), ProjectStatus::Deployed);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.successful_files, vec!["db/users.sql".to_string()]);

    let project = outcome.project;
    assert_eq!(project.status, "deployed");
    assert_eq!(project.url, "demo");
    assert_eq!(project.database_name, "demo_db");
    assert_eq!(project.description.as_deref(), Some("Project database: demo_db"));
    assert!(project.error_log.is_none());

    let logs = env.pool.get_project_logs(project.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].log_message, DEPLOY_SUCCESS_MESSAGE);

    assert_eq!(env.engine.schema_names(), vec!["demo_db".to_string()]);
    assert_eq!(env.engine.rows("demo_db", "users").len(), 2);
    assert_eq!(env.engine.primary_key("demo_db", "users"), vec!["id".to_string()]);
    assert!(env.engine.is_auto_increment("demo_db", "users", "id"));

    let dir = env.web_root().join("demo");
    assert_eq!(project.upload_path, dir.to_string_lossy());
    assert!(dir.join("index.php").is_file());
    assert!(dir.join(REWRITE_FILE).is_file());
    assert!(env.scratch_is_empty(), "scratch tree must be removed");
}

/// (B) An INSERT naming a missing column is skipped and recorded; the table
/// created earlier in the file survives.
#[actix_rt::test]
async fn test_insert_with_unknown_column_marks_project_failed() {
    let env = TestEnv::new().await;
    let dump = "\
CREATE TABLE `users` (
  `id` int(11) NOT NULL,
  `name` varchar(255) NOT NULL
) ENGINE=InnoDB;

INSERT INTO `users` (`id`, `name`, `phone`) VALUES (1, 'Alice', '555-0100'), (2, 'Bob', '555-0101');
";
    let outcome = env
        .ingest("Demo", "demo_db", &[("users.sql", dump)])
        .await
        .unwrap();

    assert_eq!(outcome.status(), ProjectStatus::Failed);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("users.sql"), "{}", outcome.errors[0]);
    assert!(outcome.errors[0].contains("phone"), "{}", outcome.errors[0]);
    assert!(outcome.successful_files.is_empty());

    let project = env.pool.get_project(outcome.project.id).await.unwrap().unwrap();
    assert_eq!(project.status, "failed");
    assert!(project.error_log.unwrap().contains("phone"));

    let logs = env.pool.get_project_logs(project.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].log_message.contains("phone"));

    assert!(env.engine.has_schema("demo_db"));
    assert_eq!(env.engine.table_names("demo_db"), vec!["users".to_string()]);
    assert!(env.engine.rows("demo_db", "users").is_empty());
}

#[actix_rt::test]
async fn test_engine_error_stops_file_but_not_later_files() {
    let env = TestEnv::new().await;
    env.engine.fail_statements_containing("broken_table");

    let first = "\
CREATE TABLE `alpha` (`id` int NOT NULL);
CREATE TABLE `broken_table` (`id` int NOT NULL);
CREATE TABLE `beta` (`id` int NOT NULL);
";
    let second = "CREATE TABLE `gamma` (`id` int NOT NULL);\n";

    let outcome = env
        .ingest("Shop", "shop_db", &[("02_more.sql", second), ("01_schema.sql", first)])
        .await
        .unwrap();

    assert_eq!(outcome.status(), ProjectStatus::Failed);
    assert_eq!(outcome.errors.len(), 1);
    assert!(
        outcome.errors[0].starts_with("Failed to execute SQL file: 01_schema.sql:"),
        "{}",
        outcome.errors[0]
    );
    assert_eq!(outcome.successful_files, vec!["02_more.sql".to_string()]);
    assert_eq!(
        env.engine.table_names("shop_db"),
        vec!["alpha".to_string(), "gamma".to_string()]
    );

    let logs = env.pool.get_project_logs(outcome.project.id).await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[actix_rt::test]
async fn test_foreign_key_to_missing_table_is_skipped() {
    let env = TestEnv::new().await;
    let dump = "\
CREATE TABLE `orders` (
  `id` int NOT NULL,
  `user_id` int NOT NULL,
  PRIMARY KEY (`id`),
  CONSTRAINT `fk_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)
);
CREATE TABLE `items` (`id` int NOT NULL);
";
    let outcome = env
        .ingest("Orders", "orders_db", &[("dump.sql", dump)])
        .await
        .unwrap();

    assert_eq!(outcome.status(), ProjectStatus::Deployed);
    assert_eq!(env.engine.table_names("orders_db"), vec!["items".to_string()]);
}

#[actix_rt::test]
async fn test_invalid_database_name_has_no_side_effects() {
    let env = TestEnv::new().await;
    let err = env
        .ingest("Demo", "demo-db; DROP", &[("index.html", "<h1>hi</h1>")])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
    assert!(env.engine.schema_names().is_empty());
    assert!(std::fs::read_dir(env.web_root()).unwrap().next().is_none());
    assert!(env.scratch_is_empty());
}

#[actix_rt::test]
async fn test_existing_schema_is_a_conflict() {
    let env = TestEnv::new().await;
    env.engine.seed_schema("taken_db");

    let err = env
        .ingest("Demo", "taken_db", &[("index.html", "<h1>hi</h1>")])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "{:?}", err);
    assert_eq!(env.engine.schema_names(), vec!["taken_db".to_string()]);
    assert!(!env.web_root().join("demo").exists());
}

#[actix_rt::test]
async fn test_slug_collision_is_a_conflict() {
    let env = TestEnv::new().await;
    env.ingest_demo().await;

    let err = env
        .ingest("  DEMO ", "other_db", &[("index.html", "<h1>again</h1>")])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "{:?}", err);
    assert!(!env.engine.has_schema("other_db"));
}

#[actix_rt::test]
async fn test_existing_folder_is_a_deployment_error() {
    let env = TestEnv::new().await;
    std::fs::create_dir_all(env.web_root().join("demo")).unwrap();

    let err = env
        .ingest("Demo", "demo_db", &[("index.html", "<h1>hi</h1>")])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Deployment(_)), "{:?}", err);
    assert!(!env.engine.has_schema("demo_db"));
}

#[actix_rt::test]
async fn test_catalog_failure_leaves_no_orphans() {
    let env = TestEnv::new().await;
    env.pool
        .connection()
        .execute_unprepared("DROP TABLE deployment_logs")
        .await
        .unwrap();

    let err = env
        .ingest("Demo", "demo_db", &[("users.sql", USERS_DUMP)])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Database(_)), "{:?}", err);
    assert!(!env.engine.has_schema("demo_db"), "schema must be discarded");
    assert!(!env.web_root().join("demo").exists(), "folder must be removed");
    assert!(env.pool.list_all_projects().await.unwrap().is_empty());
    assert!(env.scratch_is_empty());
}

#[actix_rt::test]
async fn test_corrupt_archive_is_rejected_before_schema_creation() {
    let env = TestEnv::new().await;
    let archive = env.archive(&[]);
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    let err = env
        .services
        .ingest(sitedock_lib::services::IngestionRequest {
            user_id: env.user_id,
            name: "Demo".to_string(),
            database_name: "demo_db".to_string(),
            description: None,
            archive,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Archive(_)), "{:?}", err);
    assert!(env.engine.schema_names().is_empty());
    assert!(env.scratch_is_empty());
}

#[actix_rt::test]
async fn test_single_wrapping_directory_is_unwrapped() {
    let env = TestEnv::new().await;
    let outcome = env
        .ingest(
            "Landing Page",
            "landing",
            &[
                ("landing-page/index.html", "<h1>Landing</h1>"),
                ("landing-page/css/site.css", "body {}"),
            ],
        )
        .await
        .unwrap();

    let dir = env.web_root().join("landing-page");
    assert_eq!(outcome.project.url, "landing-page");
    assert!(dir.join("index.html").is_file());
    assert!(dir.join("css/site.css").is_file());
    assert!(!dir.join("landing-page").exists());
}

#[actix_rt::test]
async fn test_basic_project_without_index_gets_generated_page() {
    let env = TestEnv::new().await;
    env.ingest("Docs <b>", "docs_db", &[("guide/readme.txt", "read me"), ("notes.txt", "n")])
        .await
        .unwrap();

    let page = std::fs::read_to_string(env.web_root().join("docs-b/index.html")).unwrap();
    assert!(page.contains("Docs &lt;b&gt;"));
    assert!(page.contains("notes.txt"));
    assert!(!page.contains("{{"));
}

#[actix_rt::test]
async fn test_laravel_project_gets_front_controller_and_rewritten_config() {
    let env = TestEnv::new().await;
    let config = "<?php\nreturn [\n    'database' => 'homestead',\n    'username' => 'homestead',\n    'password' => 'secret',\n];\n";
    let outcome = env
        .ingest(
            "Laravel App",
            "laravel_db",
            &[
                ("artisan", "#!/usr/bin/env php"),
                ("public/index.php", "<?php"),
                ("config/database.php", config),
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcome.project_type.as_str(), "laravel");

    let dir = env.web_root().join("laravel-app");
    let rules = std::fs::read_to_string(dir.join(REWRITE_FILE)).unwrap();
    assert!(rules.contains("RewriteBase /projects/laravel-app/"));
    assert!(rules.contains("public/index.php"));

    let patched = std::fs::read_to_string(dir.join("config/database.php")).unwrap();
    assert!(patched.contains("'database' => 'laravel_db'"));
    assert!(patched.contains("'username' => 'deployer'"));
    assert!(patched.contains("'password' => 'deploy-pass'"));

    let info: ProjectInfo =
        serde_json::from_str(&std::fs::read_to_string(dir.join(PROJECT_INFO_FILE)).unwrap())
            .unwrap();
    assert_eq!(info.id, outcome.project.id);
    assert_eq!(info.project_type, "laravel");
    assert_eq!(info.database, "laravel_db");
    assert_eq!(info.status, "deployed");
}
