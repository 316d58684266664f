#![cfg(feature = "web")]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use std::sync::{Arc, Mutex};
use synthai::app::{self, AnswerResponse, AppState, NO_DOCUMENT, UploadResponse};
use synthai::config::AppConfig;
use synthai::llm::{LlmClient, LlmError};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "synthai-test-boundary";

struct EchoLlm {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmClient for EchoLlm {
    async fn generate(&self, messages: &[String]) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().extend(messages.iter().cloned());
        Ok("réponse du modèle".to_string())
    }
}

struct TestApp {
    router: Router,
    llm: Arc<EchoLlm>,
    _dir: TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        upload_dir: dir.path().join("uploads"),
        database_dir: dir.path().join("database"),
        ..AppConfig::default()
    };
    let llm = Arc::new(EchoLlm {
        prompts: Mutex::new(Vec::new()),
    });
    let state = AppState::new(config, llm.clone()).unwrap();

    TestApp {
        router: app::router(Arc::new(state)),
        llm,
        _dir: dir,
    }
}

fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn upload_request(filename: &str, contents: &[u8], cookie: Option<&str>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Registers and logs in, returning the `session_id=...` cookie pair.
async fn sign_in(app: &TestApp, username: &str) -> String {
    let body = format!("username={username}&password=motdepasse");

    let response = app.router.clone().oneshot(form("/register", &body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app.router.clone().oneshot(form("/login", &body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/app");

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn login_page_is_served() {
    let app = test_app();
    let response = app.router.clone().oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(!html.contains("{error}"));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = test_app();
    sign_in(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(form("/login", "username=alice&password=nope", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("Identifiants incorrects"));
}

#[tokio::test]
async fn taken_username_rerenders_register_page() {
    let app = test_app();
    sign_in(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(form("/register", "username=alice&password=autre", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("Nom d&#39;utilisateur déjà utilisé"));
}

#[tokio::test]
async fn dashboard_requires_session() {
    let app = test_app();

    let response = app.router.clone().oneshot(get("/app", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let cookie = sign_in(&app, "alice").await;
    let response = app.router.clone().oneshot(get("/app", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("<strong>alice</strong>"));
}

#[tokio::test]
async fn upload_without_session_is_unauthorized() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(upload_request("data.csv", b"a,b\n1,2\n", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "Non authentifié");
}

#[tokio::test]
async fn unsupported_upload_is_bad_request() {
    let app = test_app();
    let cookie = sign_in(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(upload_request("report.pdf", b"%PDF-1.4", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "Format non supporté (.pdf)");
}

#[tokio::test]
async fn csv_upload_then_download_and_ask() {
    let app = test_app();
    let cookie = sign_in(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(form("/ask", "question=quoi", Some(&cookie)))
        .await
        .unwrap();
    let answer: AnswerResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(answer.answer, NO_DOCUMENT);

    let csv = b"name,amount\nwidget,\"1,5\"\ngadget,\nwidget,\"1,5\"\n";
    let response = app
        .router
        .clone()
        .oneshot(upload_request("orders.csv", csv, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let upload: UploadResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(upload.summary, "réponse du modèle");
    assert!(upload.preview.contains("widget"));
    assert!(upload.suggestions.starts_with("1 cellule(s) vide(s) ; 1 ligne(s) en double"));
    assert!(upload.chart_base64.is_none());
    assert!(upload.corrected_file.starts_with("alice_"));
    assert!(upload.corrected_file.ends_with("_corr.xlsx"));

    let response = app
        .router
        .clone()
        .oneshot(get(
            &format!("/download_corrected/{}", upload.corrected_file),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.starts_with(b"PK"));

    let response = app
        .router
        .clone()
        .oneshot(form("/ask", "question=combien+de+lignes", Some(&cookie)))
        .await
        .unwrap();
    let answer: AnswerResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(answer.answer, "réponse du modèle");

    let prompts = app.llm.prompts.lock().unwrap();
    assert!(prompts.last().unwrap().ends_with("Réponds à cette question : combien de lignes"));
}

#[tokio::test]
async fn text_upload_produces_corrected_document() {
    let app = test_app();
    let cookie = sign_in(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(upload_request("notes.txt", "bonjour\nau revoir".as_bytes(), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let upload: UploadResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(upload.preview, "bonjour\nau revoir");
    assert_eq!(upload.suggestions, "");
    assert!(upload.corrected_file.ends_with("_corr.docx"));

    let prompts = app.llm.prompts.lock().unwrap();
    assert!(prompts.iter().any(|p| p == "Corrige ce texte sans changer la structure :\nbonjour"));
}

#[tokio::test]
async fn downloads_are_scoped_to_the_owner() {
    let app = test_app();
    let cookie = sign_in(&app, "alice").await;

    let response = app
        .router
        .clone()
        .oneshot(get("/download_corrected/bob_1_corr.xlsx", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(get("/download_corrected/bob_1_corr.xlsx", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router
        .clone()
        .oneshot(get("/download_corrected/alice_missing_corr.xlsx", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = test_app();
    let cookie = sign_in(&app, "alice").await;

    let response = app.router.clone().oneshot(get("/logout", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .router
        .clone()
        .oneshot(form("/ask", "question=encore", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn path_like_username_cannot_register() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(form("/register", "username=..%2Fescape&password=motdepasse", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("Nom d&#39;utilisateur invalide"));

    let response = app
        .router
        .clone()
        .oneshot(form("/login", "username=..%2Fescape&password=motdepasse", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let root = app._dir.path();
    let stray: Vec<_> = std::fs::read_dir(root)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("escape_"))
        .collect();
    assert!(stray.is_empty(), "files written outside uploads: {stray:?}");
}
