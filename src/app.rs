#![cfg(feature = "web")]

use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::anomaly;
use crate::config::AppConfig;
use crate::corrector;
use crate::document;
use crate::error::{AppError, StoreError};
use crate::graph;
use crate::llm::{self, LlmClient};
use crate::loader::{self, FileKind};
use crate::login::{self, SessionStore, UserStore, html_escape};
use crate::saving;
use crate::table::Table;

/// Answer given to a question asked before any upload.
pub const NO_DOCUMENT: &str = "Aucun document n'a encore été envoyé.";

const DASHBOARD_HTML: &str = include_str!("./static/dashboard.html");

pub struct AppState {
    pub config: AppConfig,
    pub users: UserStore,
    pub sessions: SessionStore,
    pub llm: Arc<dyn LlmClient>,
}

impl AppState {
    /// Opens the user store and makes sure the upload directory exists.
    pub fn new(config: AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.upload_dir)?;
        let users = UserStore::open(&config.database_dir)?;

        Ok(AppState {
            config,
            users,
            sessions: SessionStore::default(),
            llm,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub preview: String,
    pub summary: String,
    pub suggestions: String,
    pub chart_base64: Option<String>,
    pub corrected_file: String,
}

#[derive(Debug, Deserialize)]
pub struct Question {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

/// Builds the application router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(login::serve_login_page))
        .route(
            "/register",
            get(login::serve_register_page).post(login::handle_register),
        )
        .route("/login", post(login::handle_login))
        .route("/logout", get(login::handle_logout))
        .route("/app", get(serve_dashboard))
        .route("/upload", post(upload))
        .route("/download_corrected/:filename", get(download_corrected))
        .route("/ask", post(ask))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: AppConfig, llm: Arc<dyn LlmClient>) -> Result<(), Box<dyn std::error::Error>> {
    let address = config.bind_address();
    let state = Arc::new(AppState::new(config, llm)?);
    let app = router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("listening on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    match login::current_session(&state, &jar) {
        Some((_, session)) => {
            Html(DASHBOARD_HTML.replace("{username}", &html_escape(&session.username)))
                .into_response()
        }
        None => Redirect::to("/").into_response(),
    }
}

/// Everything derived from an uploaded table.
struct TableAnalysis {
    table: Table,
    text: String,
    preview: String,
    suggestions: String,
    chart: Option<Vec<u8>>,
    corrected: PathBuf,
}

fn analyze_table(path: &Path, destination: &Path) -> Result<TableAnalysis, AppError> {
    let table = loader::load_table(path)?;

    let chart = match graph::chart_for(&table) {
        Ok(chart) => chart,
        Err(e) => {
            warn!("chart rendering failed for {}: {}", path.display(), e);
            None
        }
    };

    let suggestions = anomaly::detect(Some(&table));
    let correction = corrector::correct(&table, destination)?;

    Ok(TableAnalysis {
        text: table.render(),
        preview: loader::table_preview(&table),
        suggestions,
        chart,
        corrected: correction.saved_path,
        table,
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Paths of an upload and of its corrected copy (extension added later):
/// `<upload_dir>/<username>_<uuid>.<ext>` and `<upload_dir>/<username>_<uuid>_corr`.
///
/// Fails with [`AppError::Forbidden`] if the username would place either
/// file outside `upload_dir`.
fn upload_paths(
    upload_dir: &Path,
    username: &str,
    extension: &str,
) -> Result<(PathBuf, PathBuf), AppError> {
    if !login::is_valid_username(username) {
        warn!("refusing upload path for username {:?}", username);
        return Err(AppError::Forbidden);
    }

    let stem = format!("{}_{}", username, Uuid::new_v4());
    let upload_path = upload_dir.join(format!("{}.{}", stem, extension));
    let corrected_stem = upload_dir.join(format!("{}_corr", stem));

    for path in [&upload_path, &corrected_stem] {
        if path.parent() != Some(upload_dir) {
            warn!("refusing upload path {}", path.display());
            return Err(AppError::Forbidden);
        }
    }

    Ok((upload_path, corrected_stem))
}

/// Handle a file upload
///
/// Stores the file as `<username>_<uuid><ext>`, then analyses it:
/// tables get a preview, an anomaly report, a status chart and a corrected
/// `.xlsx`; documents get a paragraph-by-paragraph corrected `.docx`.
/// Both get a summary from the language model.
async fn upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let (session_id, session) = login::require_session(&state, &jar)?;

    let mut received = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            received = Some((filename, bytes));
        }
    }

    let (filename, bytes) =
        received.ok_or_else(|| AppError::BadRequest("Aucun fichier reçu".to_string()))?;
    if filename.is_empty() {
        return Err(AppError::BadRequest("Aucun fichier reçu".to_string()));
    }

    let extension = Path::new(&filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let kind = FileKind::from_extension(&extension)?;

    let (upload_path, corrected_stem) =
        upload_paths(&state.config.upload_dir, &session.username, &extension)?;

    {
        let path = upload_path.clone();
        tokio::task::spawn_blocking(move || saving::write_file(&path, &bytes)).await??;
    }
    info!(
        "{} uploaded {} as {}",
        session.username,
        filename,
        upload_path.display()
    );

    let (text, table, preview, suggestions, chart, corrected) = if kind.is_tabular() {
        let path = upload_path.clone();
        let analysis =
            tokio::task::spawn_blocking(move || analyze_table(&path, &corrected_stem)).await??;
        (
            analysis.text,
            Some(analysis.table),
            analysis.preview,
            analysis.suggestions,
            analysis.chart,
            analysis.corrected,
        )
    } else {
        let path = upload_path.clone();
        let (text, paragraphs) = tokio::task::spawn_blocking(move || {
            if kind == FileKind::Docx {
                let paragraphs = loader::docx_paragraphs(&path)?;
                Ok::<_, AppError>((paragraphs.join("\n"), paragraphs))
            } else {
                let text = loader::extract_text(&path)?;
                let paragraphs = document::text_paragraphs(&text);
                Ok((text, paragraphs))
            }
        })
        .await??;

        let corrected =
            document::correct_document(state.llm.as_ref(), &paragraphs, &corrected_stem).await?;
        let preview = loader::text_preview(&text);
        (text, None, preview, String::new(), None, corrected)
    };

    let summary = llm::summarize(state.llm.as_ref(), &text).await;
    let corrected_file = file_name_of(&corrected);

    let stored_file = corrected_file.clone();
    let updated = state.sessions.update(&session_id, move |data| {
        data.last_uploaded_text = text;
        data.last_uploaded_table = table;
        data.last_corrected_file = Some(stored_file);
    });
    if !updated {
        warn!(
            "session of {} ended during upload, results not kept",
            session.username
        );
    }

    Ok(Json(UploadResponse {
        preview,
        summary,
        suggestions,
        chart_base64: chart.map(|png| BASE64.encode(png)),
        corrected_file,
    }))
}

/// A corrected file may only be fetched by the user whose name prefixes it.
fn is_owned_by(filename: &str, username: &str) -> bool {
    filename.starts_with(&format!("{}_", username))
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains("..")
}

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else {
        "application/octet-stream"
    }
}

async fn download_corrected(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, AppError> {
    let (_, session) = login::require_session(&state, &jar)?;
    if !is_owned_by(&filename, &session.username) {
        warn!("{} was refused access to {}", session.username, filename);
        return Err(AppError::Forbidden);
    }

    let path = state.config.upload_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(AppError::NotFound),
        Err(e) => return Err(e.into()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn ask(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(question): Form<Question>,
) -> Result<Json<AnswerResponse>, AppError> {
    let (_, session) = login::require_session(&state, &jar)?;

    let text = session.data.last_uploaded_text;
    let answer = if text.is_empty() {
        NO_DOCUMENT.to_string()
    } else {
        llm::answer(state.llm.as_ref(), &text, &question.question).await
    };

    Ok(Json(AnswerResponse { answer }))
}
