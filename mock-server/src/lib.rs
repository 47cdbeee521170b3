//! In-memory stand-in for the hosted backend: a REST table of job
//! applications and an email/password identity service.
//!
//! Mail the identity service would send (confirmation and reset links) is
//! kept in an outbox that tests can read.

use std::{collections::HashMap, sync::Arc};

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

mod auth;
mod rest;

pub use auth::{Mail, MailKind};
pub use rest::ApplicationRow;

pub const DEFAULT_ANON_KEY: &str = "mock-anon-key";

#[derive(Default)]
struct Store {
    rows: std::collections::BTreeMap<i64, ApplicationRow>,
    next_id: i64,
    users: HashMap<String, auth::UserRecord>,
    tokens: HashMap<String, auth::Grant>,
    confirmations: HashMap<String, String>,
    outbox: Vec<Mail>,
}

/// Shared backend state behind the router.
#[derive(Clone)]
pub struct Backend {
    state: Arc<RwLock<Store>>,
    anon_key: Arc<str>,
    autoconfirm: bool,
}

impl Default for Backend {
    fn default() -> Self {
        Self::new(DEFAULT_ANON_KEY)
    }
}

impl Backend {
    pub fn new(anon_key: &str) -> Self {
        Self {
            state: Arc::new(RwLock::new(Store::default())),
            anon_key: Arc::from(anon_key),
            autoconfirm: false,
        }
    }

    /// Sign-ups get a session immediately instead of a confirmation mail.
    pub fn with_autoconfirm(mut self) -> Self {
        self.autoconfirm = true;
        self
    }

    /// Everything the identity service has "sent", oldest first.
    pub async fn outbox(&self) -> Vec<Mail> {
        self.state.read().await.outbox.clone()
    }

    /// Most recent mail of `kind` addressed to `to`.
    pub async fn last_mail(&self, to: &str, kind: MailKind) -> Option<Mail> {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .rev()
            .find(|m| m.to == to && m.kind == kind)
            .cloned()
    }

    pub async fn row_count(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Checks the `apikey` header, then that the bearer is the public key or
    /// a live access token.
    async fn authorize(&self, headers: &HeaderMap) -> Result<(), Reject> {
        let api_key = headers.get("apikey").and_then(|v| v.to_str().ok());
        if api_key != Some(&*self.anon_key) {
            return Err(Reject::new(
                StatusCode::UNAUTHORIZED,
                json!({ "message": "Invalid API key" }),
            ));
        }
        let Some(token) = bearer(headers) else {
            return Ok(());
        };
        if token == &*self.anon_key || self.state.read().await.tokens.contains_key(token) {
            return Ok(());
        }
        Err(Reject::new(
            StatusCode::UNAUTHORIZED,
            json!({ "code": "PGRST301", "message": "JWT is invalid", "details": null, "hint": null }),
        ))
    }
}

pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
}

/// An error response with a JSON body.
#[derive(Debug)]
pub(crate) struct Reject {
    status: StatusCode,
    body: Value,
}

impl Reject {
    pub(crate) fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn app() -> Router {
    router(Backend::default())
}

pub fn router(backend: Backend) -> Router {
    Router::new()
        .route(
            "/rest/v1/job_applications",
            get(rest::select)
                .post(rest::insert)
                .patch(rest::update)
                .delete(rest::delete),
        )
        .route("/auth/v1/signup", post(auth::signup))
        .route("/auth/v1/verify", get(auth::verify))
        .route("/auth/v1/token", post(auth::token))
        .route("/auth/v1/recover", post(auth::recover))
        .route("/auth/v1/user", put(auth::update_user).get(auth::current_user))
        .route("/auth/v1/logout", post(auth::logout))
        .with_state(backend)
}

pub async fn serve(listener: TcpListener, backend: Backend) -> Result<(), std::io::Error> {
    axum::serve(listener, router(backend)).await
}
