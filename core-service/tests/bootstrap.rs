//! Bootstrap and lifecycle tests for the core service façade.

use core_runtime::config::EngineConfig;
use core_service::{CoreDependencies, CoreError, CoreService};
use core_sync::{CreateJobRequest, SyncError};
use serde_json::json;
use std::path::Path;

fn config(root: &Path) -> EngineConfig {
    EngineConfig::builder()
        .database_url(format!("sqlite:{}", root.join("catalog.db").display()))
        .json_root(root.join("json"))
        .download_root(root.join("downloads"))
        .build()
        .unwrap()
}

fn request(name: &str) -> CreateJobRequest {
    CreateJobRequest {
        job_name: name.to_string(),
        connector_type: "S3".to_string(),
        schedule: "daily".to_string(),
        connector_config: json!({ "bucket_name": "media", "prefix": "raw/" })
            .as_object()
            .cloned()
            .unwrap(),
    }
}

#[tokio::test]
async fn test_bootstrap_creates_catalog_and_manages_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let core = CoreService::start(config(dir.path())).await.unwrap();

    assert!(dir.path().join("catalog.db").exists());
    assert_eq!(core.config().worker_pool_size, 2);

    let jobs = core.jobs();
    let job_id = jobs.create_job(request("media mirror")).await.unwrap();
    let job = jobs.get_job(&job_id.to_string()).await.unwrap();
    assert_eq!(job.job_name, "media mirror");
    assert_eq!(jobs.list_jobs().await.unwrap().len(), 1);

    let page = jobs.list_work_items(&job_id.to_string(), 0, 10).await.unwrap();
    assert_eq!(page.total_objects, 0);

    core.shutdown().await;
}

#[tokio::test]
async fn test_restart_restores_schedules() {
    let dir = tempfile::tempdir().unwrap();

    let first = CoreService::start(config(dir.path())).await.unwrap();
    let job_id = first.jobs().create_job(request("media mirror")).await.unwrap();
    first.shutdown().await;

    let restarted = CoreService::start(config(dir.path())).await.unwrap();
    let status = restarted
        .jobs()
        .trigger_status(&job_id.to_string())
        .await
        .unwrap();
    assert!(status.is_some());

    restarted.jobs().delete_job(&job_id.to_string()).await.unwrap();
    assert!(restarted
        .jobs()
        .trigger_status(&job_id.to_string())
        .await
        .unwrap()
        .is_none());

    restarted.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.chunk_size = 0;

    let deps = CoreDependencies::desktop(&config);
    let result = CoreService::bootstrap(config, deps).await;

    assert!(matches!(result, Err(CoreError::Runtime(_))));
}

#[tokio::test]
async fn test_unopenable_catalog_fails_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.database_url = format!(
        "sqlite:{}",
        dir.path().join("missing/dir/catalog.db").display()
    );

    let result = CoreService::start(config).await;

    assert!(matches!(result, Err(CoreError::Sync(SyncError::Database(_)))));
}
