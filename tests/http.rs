use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use codebridge::backend::Judge0Client;
use codebridge::executor::Executor;
use codebridge::http_server;
use codebridge::state::AppState;
use codebridge::store::{FileStore, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";
const BOUNDARY: &str = "codebridge-test-boundary";

fn app(backend_url: &str) -> (Router, Arc<dyn FileStore>) {
    let store: Arc<dyn FileStore> = Arc::new(MemoryStore::new(
        Duration::from_secs(600),
        Duration::from_secs(600),
    ));
    let client = Judge0Client::new(backend_url, None, Duration::from_secs(5)).unwrap();
    let executor = Executor::new(client, store.clone());
    let state = AppState::new(store.clone(), executor, Some(API_KEY.to_string()));
    (http_server::router(state, 1024 * 1024), store)
}

fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn upload_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header("x-api-key", API_KEY)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_list_and_download_round_trip() {
    let (app, _store) = app("http://127.0.0.1:9");

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body(&[(
            "file",
            Some("data.csv"),
            "a,b\n1,2\n",
        )])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded = json_body(response).await;
    let session_id = uploaded["session_id"].as_str().unwrap().to_string();
    let file_id = uploaded["files"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(uploaded["files"][0]["name"], "data.csv");
    assert_eq!(uploaded["files"][0]["size"], 8);

    let response = app
        .clone()
        .oneshot(get(&format!("/files/{session_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], file_id.as_str());
    assert!(listed[0]["lastModified"].is_string());

    let response = app
        .oneshot(get(&format!("/download/{session_id}/{file_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"data.csv\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"a,b\n1,2\n");
}

#[tokio::test]
async fn upload_honours_display_name_and_existing_session() {
    let (app, store) = app("http://127.0.0.1:9");
    let session_id = store.create_session().await.unwrap();

    let response = app
        .oneshot(upload_request(multipart_body(&[
            ("session_id", None, session_id.as_str()),
            ("name", None, "Quarterly Report.txt"),
            ("file", Some("upload.tmp"), "numbers"),
        ])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded = json_body(response).await;
    assert_eq!(uploaded["session_id"], session_id.as_str());
    assert_eq!(uploaded["files"][0]["name"], "Quarterly Report.txt");

    let files = store.list_files(&session_id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "Quarterly Report.txt");
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let (app, _store) = app("http://127.0.0.1:9");
    let response = app
        .oneshot(upload_request(multipart_body(&[("name", None, "x")])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_session_lists_empty_and_download_is_404() {
    let (app, _store) = app("http://127.0.0.1:9");

    let response = app.clone().oneshot(get("/files/unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));

    let response = app.oneshot(get("/download/unknown/file")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_or_wrong_api_key_is_unauthorized() {
    let (app, _store) = app("http://127.0.0.1:9");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stats")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn exec_validates_language_and_code() {
    let (app, _store) = app("http://127.0.0.1:9");

    let response = app
        .clone()
        .oneshot(post_json("/exec", json!({"lang": "cobol", "code": "DISPLAY 'HI'."})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/exec", json!({"lang": "py", "code": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exec_returns_normalized_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "stdout": "NDIK",
            "status": {"id": 3, "description": "Accepted"}
        })))
        .mount(&server)
        .await;

    let (app, _store) = app(&server.uri());
    let response = app
        .oneshot(post_json("/exec", json!({"lang": "py", "code": "print(42)"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["stdout"], "42\n");
    assert_eq!(body["stderr"], "");
    assert!(body["session_id"].is_string());
    assert!(body.get("files").is_none());
}

#[tokio::test]
async fn exec_with_unreachable_backend_still_succeeds() {
    let (app, _store) = app("http://127.0.0.1:9");
    let response = app
        .oneshot(post_json("/exec", json!({"lang": "py", "code": "print(1)"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["stderr"]
        .as_str()
        .unwrap()
        .starts_with("Execution backend unavailable"));
}

#[tokio::test]
async fn health_is_public_and_reports_store_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1.13.1"})))
        .mount(&server)
        .await;

    let (app, store) = app(&server.uri());
    let session = store.create_session().await.unwrap();
    store.add_file(&session, "a", vec![1, 2, 3]).await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"]["version"], "1.13.1");
    assert_eq!(body["store"]["sessionCount"], 1);
    assert_eq!(body["store"]["totalFiles"], 1);
    assert_eq!(body["store"]["totalSize"], 3);
}
