#![cfg(feature = "web")]

use crate::app::AppState;
use crate::error::{AppError, StoreError};
use crate::table::Table;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";

/// Lifetime of a session.
pub const SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

const USERS_FILE: &str = "users.json";

/// Registered application user
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,
}

/// Credential data for login and registration
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// JSON-backed user table
///
/// Maps usernames to password hashes in `<database_dir>/users.json`.
/// Writes go through a mutex so concurrent registrations cannot overwrite
/// each other.
pub struct UserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserStore {
    /// Opens the store, creating the directory and an empty users file if needed.
    pub fn open(database_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = database_dir.as_ref();
        create_dir_all(dir)?;

        let path = dir.join(USERS_FILE);
        if !path.exists() {
            let mut file = File::create(&path)?;
            file.write_all(b"{}")?;
        }

        Ok(UserStore {
            path,
            write_lock: Mutex::new(()),
        })
    }

    fn load(&self) -> Result<HashMap<String, User>, StoreError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, users: &HashMap<String, User>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(users)?;
        crate::saving::write_file(&self.path, json.as_bytes())?;
        Ok(())
    }

    /// Register a new user
    ///
    /// # Errors
    /// * [`StoreError::EmptyField`] if the username or password is empty
    /// * [`StoreError::InvalidUsername`] if the username is not a safe file name prefix
    /// * [`StoreError::UsernameTaken`] if the username is already registered
    pub fn register(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::EmptyField);
        }
        if !is_valid_username(username) {
            return Err(StoreError::InvalidUsername);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users = self.load()?;
        if users.contains_key(username) {
            return Err(StoreError::UsernameTaken);
        }

        let password_hash = hash_password(password)?;
        users.insert(
            username.to_string(),
            User {
                username: username.to_string(),
                password_hash,
            },
        );
        self.save(&users)?;

        info!("registered user {}", username);
        Ok(())
    }

    /// Checks a username and password against the stored hash.
    /// Unknown users simply fail verification.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let users = self.load()?;
        match users.get(username.trim()) {
            Some(user) => Ok(verify_password(password, &user.password_hash)),
            None => Ok(false),
        }
    }
}

/// Usernames prefix uploaded file names, so they are limited to letters,
/// digits, `_`, `-` and `.`, must not start with a dot and must not contain `..`.
pub fn is_valid_username(username: &str) -> bool {
    !username.starts_with('.')
        && !username.contains("..")
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| StoreError::Hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => {
            warn!("stored password hash has an invalid format");
            false
        }
    }
}

/// Per-session upload state.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub last_uploaded_text: String,
    pub last_uploaded_table: Option<Table>,
    pub last_corrected_file: Option<String>,
}

/// Authenticated user session
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub expires_at: SystemTime,
    pub data: SessionData,
}

/// Keyed store of live sessions
///
/// Requests work on a [`snapshot`](SessionStore::snapshot) taken when they
/// start. Results are written back with [`update`](SessionStore::update),
/// which does nothing if the session was removed in the meantime.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new(SESSION_DURATION)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Opens a session for `username` and returns its id.
    pub fn create(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: SystemTime::now() + self.ttl,
            data: SessionData::default(),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > SystemTime::now());
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// Copy of a live session; `None` if unknown or expired.
    pub fn snapshot(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > SystemTime::now())
            .cloned()
    }

    /// Applies `f` to the session data if the session still exists.
    pub fn update<F>(&self, session_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut SessionData),
    {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(session_id) {
            Some(session) => {
                f(&mut session.data);
                true
            }
            None => false,
        }
    }

    /// Tears a session down, returning it if it existed.
    pub fn remove(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session id from the cookie jar together with a snapshot of its session.
pub fn current_session(state: &AppState, jar: &CookieJar) -> Option<(String, Session)> {
    let session_id = jar.get(SESSION_COOKIE)?.value().to_string();
    let session = state.sessions.snapshot(&session_id)?;
    Some((session_id, session))
}

/// Like [`current_session`] but fails with [`AppError::Unauthorized`].
pub fn require_session(state: &AppState, jar: &CookieJar) -> Result<(String, Session), AppError> {
    current_session(state, jar).ok_or(AppError::Unauthorized)
}

fn render_form(template: &str, error: &str) -> Html<String> {
    Html(template.replace("{error}", &html_escape(error)))
}

/// Escapes text for insertion into HTML.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

const LOGIN_HTML: &str = include_str!("./static/login.html");
const REGISTER_HTML: &str = include_str!("./static/register.html");

/// Serve the login page HTML
pub async fn serve_login_page() -> Html<String> {
    render_form(LOGIN_HTML, "")
}

/// Serve the registration page HTML
pub async fn serve_register_page() -> Html<String> {
    render_form(REGISTER_HTML, "")
}

/// Handle user login requests
///
/// Valid credentials open a session, set the session cookie and redirect to
/// the dashboard. Invalid ones re-render the login page with an error.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let store = state.clone();
    let username = credentials.username.clone();
    let verified = tokio::task::spawn_blocking(move || {
        store.users.verify(&credentials.username, &credentials.password)
    })
    .await;

    match verified {
        Ok(Ok(true)) => {
            let username = username.trim();
            let session_id = state.sessions.create(username);
            info!("user {} logged in", username);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Redirect::to("/app")).into_response()
        }
        Ok(Ok(false)) => (
            StatusCode::UNAUTHORIZED,
            render_form(LOGIN_HTML, "Identifiants incorrects"),
        )
            .into_response(),
        Ok(Err(e)) => AppError::from(e).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Handle user registration
///
/// Redirects to the login page on success, or re-renders the form with the
/// reason it failed.
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let store = state.clone();
    let registered = tokio::task::spawn_blocking(move || {
        store
            .users
            .register(&credentials.username, &credentials.password)
    })
    .await;

    match registered {
        Ok(Ok(())) => Redirect::to("/").into_response(),
        Ok(Err(
            e @ (StoreError::UsernameTaken | StoreError::EmptyField | StoreError::InvalidUsername),
        )) => (
            StatusCode::BAD_REQUEST,
            render_form(REGISTER_HTML, &e.to_string()),
        )
            .into_response(),
        Ok(Err(e)) => AppError::from(e).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Handle user logout
///
/// Tears the session down, clears the cookie and redirects to the login page.
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(session) = state.sessions.remove(cookie.value()) {
            info!("user {} logged out", session.username);
        }
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();

        store.register("alice", "s3cret").unwrap();

        assert!(store.verify("alice", "s3cret").unwrap());
        assert!(!store.verify("alice", "wrong").unwrap());
        assert!(!store.verify("bob", "s3cret").unwrap());
    }

    #[test]
    fn passwords_are_salted() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();
        store.register("a", "same").unwrap();
        store.register("b", "same").unwrap();

        let users = store.load().unwrap();
        assert_ne!(users["a"].password_hash, users["b"].password_hash);
        assert!(!users["a"].password_hash.contains("same"));
    }

    #[test]
    fn duplicate_and_empty_registrations_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();
        store.register("alice", "pw").unwrap();

        assert!(matches!(store.register("alice", "other"), Err(StoreError::UsernameTaken)));
        assert!(matches!(store.register("", "pw"), Err(StoreError::EmptyField)));
        assert!(matches!(store.register("carol", ""), Err(StoreError::EmptyField)));
    }

    #[test]
    fn path_like_usernames_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path()).unwrap();

        for name in ["../escape", "a/b", "a\\b", "..", ".hidden", "a..b", "tab\tname"] {
            assert!(
                matches!(store.register(name, "pw"), Err(StoreError::InvalidUsername)),
                "{name:?} was accepted"
            );
        }
        assert!(store.load().unwrap().is_empty());

        store.register("jean-luc.picard_2", "pw").unwrap();
        store.register("élodie", "pw").unwrap();
    }

    #[test]
    fn users_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        UserStore::open(dir.path()).unwrap().register("alice", "pw").unwrap();

        let reopened = UserStore::open(dir.path()).unwrap();
        assert!(reopened.verify("alice", "pw").unwrap());
    }

    #[test]
    fn session_lifecycle() {
        let sessions = SessionStore::default();
        let id = sessions.create("alice");

        let snapshot = sessions.snapshot(&id).unwrap();
        assert_eq!(snapshot.username, "alice");
        assert!(snapshot.data.last_uploaded_text.is_empty());

        assert!(sessions.update(&id, |data| data.last_uploaded_text = "doc".into()));
        assert_eq!(sessions.snapshot(&id).unwrap().data.last_uploaded_text, "doc");
        // earlier snapshot is unaffected
        assert!(snapshot.data.last_uploaded_text.is_empty());

        assert!(sessions.remove(&id).is_some());
        assert!(sessions.snapshot(&id).is_none());
        assert!(!sessions.update(&id, |data| data.last_uploaded_text = "late".into()));
    }

    #[test]
    fn expired_sessions_are_invisible() {
        let sessions = SessionStore::new(Duration::ZERO);
        let id = sessions.create("alice");
        assert!(sessions.snapshot(&id).is_none());
    }

    #[test]
    fn escape_html() {
        assert_eq!(html_escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }
}
