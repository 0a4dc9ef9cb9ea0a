mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use gsmgr::app::state::AppState;
use gsmgr::server::serve::router;
use gsmgr::server::state::ServerState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use common::{artifact_url, options, RecordingLauncher};

fn app_for(state: &AppState) -> Router {
    router(Arc::new(ServerState::new(
        state.instances.clone(),
        state.backups.clone(),
        state.users.clone(),
    )))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        (status, Value::Null)
    } else {
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

#[tokio::test]
async fn test_provision_configure_backup_restore() {
    let tmp = TempDir::new().unwrap();
    let options = options(tmp.path());
    let launcher = Arc::new(RecordingLauncher::default());
    let (state, workers) = AppState::init(&options, launcher.clone()).await.unwrap();
    let app = app_for(&state);

    // create
    let (status, instance) = call(
        &app,
        "POST",
        "/instances",
        Some(json!({
            "name": "survival",
            "description": "integration world",
            "target_version": "1.21.1",
            "artifact_url": artifact_url().await,
            "allocated_ram_mb": 2048,
            "port": 25564,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = instance["id"].as_str().unwrap().to_string();

    // starting before provisioning fails on the missing directory
    let (status, _) = call(&app, "POST", &format!("/instances/{}/start", id), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // provision and poll the job
    let (status, body) = call(&app, "POST", &format!("/instances/{}/provision", id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_url = format!("/jobs/{}", body["job_id"].as_str().unwrap());

    let mut job = Value::Null;
    for _ in 0..500 {
        let (_, body) = call(&app, "GET", &job_url, None).await;
        job = body;
        if job["state"] != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(job["state"], "success", "job: {}", job);
    let messages: Vec<&str> = job["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages.last(), Some(&"Provisioning complete"));
    assert!(messages.contains(&"Accepting license"));

    let (status, _) = call(&app, "POST", &format!("/instances/{}/provision", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // visible properties exclude the managed keys
    let (_, properties) = call(&app, "GET", &format!("/instances/{}/properties", id), None).await;
    let properties = properties.as_array().unwrap().clone();
    let keys: Vec<&str> = properties
        .iter()
        .map(|p| p["key"].as_str().unwrap())
        .collect();
    assert!(keys.contains(&"motd"));
    assert!(keys.contains(&"difficulty"));
    assert!(!keys.contains(&"server-port"));
    assert!(!keys.contains(&"rcon.password"));

    let motd = properties.iter().find(|p| p["key"] == "motd").unwrap();
    let (status, _) = call(
        &app,
        "PUT",
        &format!("/instances/{}/properties/{}", id, motd["id"].as_str().unwrap()),
        Some(json!({ "value": "edited" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "POST", &format!("/instances/{}/properties/write", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let paths = options.layout.instance(id.parse().unwrap());
    let written = paths.properties_file().read_string().await.unwrap();
    assert!(written.contains("motd=edited\n"));
    assert!(written.contains("server-port=25564\n"));
    assert!(written.contains("rcon.port=25565\n"));
    assert!(written.contains("enable-rcon=true\n"));
    assert_eq!(
        paths.license_file().read_string().await.unwrap().trim(),
        "eula=true"
    );

    // start in a session and back up while stopped
    let (status, _) = call(&app, "POST", &format!("/instances/{}/start", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(launcher.sessions.lock().unwrap().contains(&id));
    launcher.sessions.lock().unwrap().clear();

    let (_, user) = call(&app, "POST", "/users", Some(json!({ "username": "steve" }))).await;
    let (status, backup) = call(
        &app,
        "POST",
        &format!("/instances/{}/backups", id),
        Some(json!({ "actor_id": user["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let backup_id = backup["id"].as_str().unwrap().to_string();

    // lose the configuration, then restore it
    paths.properties_file().delete().await.unwrap();
    let (status, _) = call(
        &app,
        "POST",
        &format!("/instances/{}/backups/{}/restore", id, backup_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(paths
        .properties_file()
        .read_string()
        .await
        .unwrap()
        .contains("motd=edited\n"));

    state.shutdown();
    for worker in workers {
        worker.await.unwrap();
    }

    // records survive a restart
    let (state, workers) = AppState::init(&options, launcher.clone()).await.unwrap();
    let app = app_for(&state);
    let (status, instance) = call(&app, "GET", &format!("/instances/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["license_accepted"], true);
    let (_, backups) = call(&app, "GET", &format!("/instances/{}/backups", id), None).await;
    assert_eq!(backups.as_array().unwrap().len(), 1);

    state.shutdown();
    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test]
async fn test_failed_provisioning_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let options = options(tmp.path());
    let (state, workers) = AppState::init(&options, Arc::new(RecordingLauncher::default()))
        .await
        .unwrap();
    let app = app_for(&state);

    let (_, instance) = call(
        &app,
        "POST",
        "/instances",
        Some(json!({
            "name": "broken",
            "target_version": "1.21.1",
            "artifact_url": "http://127.0.0.1:1/server.jar",
            "allocated_ram_mb": 1024,
            "port": 25600,
        })),
    )
    .await;
    let id = instance["id"].as_str().unwrap().to_string();

    let (_, body) = call(&app, "POST", &format!("/instances/{}/provision", id), None).await;
    let job_url = format!("/jobs/{}", body["job_id"].as_str().unwrap());

    let mut job = Value::Null;
    for _ in 0..500 {
        let (_, body) = call(&app, "GET", &job_url, None).await;
        job = body;
        if job["state"] != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(job["state"], "error");
    let last = job["logs"].as_array().unwrap().last().unwrap()["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(last.starts_with("Error: "), "{}", last);

    assert!(!options.layout.instance(id.parse().unwrap()).root().exists().await);
    let (_, instance) = call(&app, "GET", &format!("/instances/{}", id), None).await;
    assert_eq!(instance["license_accepted"], false);

    state.shutdown();
    for worker in workers {
        worker.await.unwrap();
    }
}
