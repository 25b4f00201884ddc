use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer};
use knnclass::ClassifierConfig;
use reqwest::Client;
use serde_json::{json, Value};
use std::net::TcpListener;
use tempfile::TempDir;
use tokio::time::{sleep, Duration};

/// Find a free port by binding to port 0
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on a free port and return its handle and base URL
async fn start_server(models_dir: &TempDir) -> (ServerHandle, String) {
    let port = free_port();
    let config = ClassifierConfig {
        num_classes: 3,
        dimension: 3,
        top_k: 5,
        models_dir: models_dir.path().to_path_buf(),
        ..ClassifierConfig::default()
    };
    let state = knnclass::server::app_state(&config);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(knnclass::server::config))
        .bind(format!("127.0.0.1:{}", port))
        .unwrap()
        .run();
    let handle = server.handle();
    tokio::spawn(server);
    sleep(Duration::from_millis(200)).await;

    (handle, format!("http://127.0.0.1:{}", port))
}

async fn post(client: &Client, url: String, body: Value) -> Value {
    let resp = client.post(url).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

/// Last event of the given kind
fn find_event<'a>(body: &'a Value, kind: &str) -> Option<&'a Value> {
    body["events"].as_array().unwrap()
        .iter()
        .rev()
        .find(|e| e["event"] == kind)
}

#[actix_web::test]
async fn test_train_and_classify() {
    let temp_dir = TempDir::new().unwrap();
    let (handle, base) = start_server(&temp_dir).await;
    let client = Client::new();

    // --- Teach cat and dog, 5 frames each ---
    post(&client, format!("{}/train", base), json!({"label": "cat"})).await;
    for _ in 0..5 {
        post(&client, format!("{}/frame", base), json!({"embedding": [1.0, 0.0, 0.0]})).await;
    }
    post(&client, format!("{}/train", base), json!({"label": "dog"})).await;
    for _ in 0..5 {
        post(&client, format!("{}/frame", base), json!({"embedding": [0.0, 1.0, 0.0]})).await;
    }
    post(&client, format!("{}/stop", base), json!({})).await;

    // --- Classify a cat-like embedding ---
    let body = post(&client, format!("{}/frame", base), json!({"embedding": [0.9, 0.1, 0.0]})).await;

    let counts = find_event(&body, "sample_counts").unwrap();
    assert_eq!(counts["labels"], json!(["cat", "dog"]));
    assert_eq!(counts["counts"], json!([5, 5]));

    let confidences = find_event(&body, "confidences").unwrap();
    assert_eq!(confidences["confidences"], json!([1.0, 0.0]));

    let classification = find_event(&body, "classification").unwrap();
    assert_eq!(classification["label"], "cat");

    // --- Status reflects the session ---
    let resp = client.get(format!("{}/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["ready"], true);
    assert!(status["training"].is_null());
    assert_eq!(status["classification"], "cat");
    assert_eq!(status["free_slots"], 1);

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_errors_are_events() {
    let temp_dir = TempDir::new().unwrap();
    let (handle, base) = start_server(&temp_dir).await;
    let client = Client::new();

    // --- Clearing an unknown label ---
    let body = post(&client, format!("{}/clear", base), json!({"label": "ghost"})).await;
    let error = find_event(&body, "error").unwrap();
    assert_eq!(error["code"], "unknown_label");

    // --- Running out of slots ---
    for label in ["a", "b", "c"] {
        post(&client, format!("{}/train", base), json!({"label": label})).await;
    }
    let body = post(&client, format!("{}/train", base), json!({"label": "d"})).await;
    let error = find_event(&body, "error").unwrap();
    assert_eq!(error["code"], "capacity_exceeded");
    assert!(error["message"].as_str().unwrap().contains("'d'"));

    // --- Frame with no examples anywhere emits nothing ---
    post(&client, format!("{}/stop", base), json!({})).await;
    let body = post(&client, format!("{}/frame", base), json!({"embedding": [1.0, 0.0, 0.0]})).await;
    assert!(body["events"].as_array().unwrap().is_empty());

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_clear_top_choice() {
    let temp_dir = TempDir::new().unwrap();
    let (handle, base) = start_server(&temp_dir).await;
    let client = Client::new();

    post(&client, format!("{}/train", base), json!({"label": "cat"})).await;
    post(&client, format!("{}/frame", base), json!({"embedding": [1.0, 0.0, 0.0]})).await;
    post(&client, format!("{}/stop", base), json!({})).await;

    let body = post(&client, format!("{}/clear", base), json!({"label": "cat"})).await;
    let classification = find_event(&body, "classification").unwrap();
    assert_eq!(classification["label"], "");

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_save_and_load_model() {
    let temp_dir = TempDir::new().unwrap();
    let (handle, base) = start_server(&temp_dir).await;
    let client = Client::new();

    post(&client, format!("{}/train", base), json!({"label": "cat"})).await;
    for _ in 0..3 {
        post(&client, format!("{}/frame", base), json!({"embedding": [1.0, 0.0, 0.0]})).await;
    }
    post(&client, format!("{}/stop", base), json!({})).await;

    let body = post(&client, format!("{}/save", base), json!({"name": "pets.model"})).await;
    assert_eq!(find_event(&body, "model_saved").unwrap()["name"], "pets.model");
    assert!(temp_dir.path().join("pets.model").exists());

    post(&client, format!("{}/clear", base), json!({"label": "cat"})).await;

    let body = post(&client, format!("{}/load", base), json!({"name": "pets.model"})).await;
    assert_eq!(find_event(&body, "model_loaded").unwrap()["name"], "pets.model");
    let counts = find_event(&body, "sample_counts").unwrap();
    assert_eq!(counts["labels"], json!(["cat"]));
    assert_eq!(counts["counts"], json!([3]));

    // --- Missing model file ---
    let body = post(&client, format!("{}/load", base), json!({"name": "missing.model"})).await;
    assert_eq!(find_event(&body, "error").unwrap()["code"], "io");

    // --- Names must stay inside the models directory ---
    let resp = client
        .post(format!("{}/save", base))
        .json(&json!({"name": "../escape.model"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    handle.stop(true).await;
}
