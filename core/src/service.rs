//! Async record and session services over a `Transport`.
//!
//! # Design
//! Each method is one build → execute → parse round-trip. Failures are
//! logged with the operation name and returned unchanged; nothing is retried
//! and no local copy of the table is kept. Session state is passed in
//! explicitly by the caller.

use chrono::Utc;
use tracing::{debug, error};

use crate::config::Settings;
use crate::error::{ApiError, ApiResult, ValidationError};
use crate::form::ApplicationFormData;
use crate::http::{HttpRequest, HttpResponse};
use crate::records::ApplicationClient;
use crate::session::{AuthClient, Credentials, PasswordChange, Session, SessionState, SignUpOutcome, User};
use crate::transport::Transport;
use crate::types::{ApplicationPatch, ApplicationStats, ApplicationStatus, JobApplication, NewApplication};

/// Number of recent applications the dashboard shows.
pub const DASHBOARD_RECENT: usize = 5;

/// Most recent applications plus the status summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub recent: Vec<JobApplication>,
    pub stats: ApplicationStats,
}

async fn send<T: Transport>(transport: &T, operation: &'static str, request: HttpRequest) -> ApiResult<HttpResponse> {
    debug!(operation, method = request.method.as_str(), path = %request.path, "sending request");
    transport.execute(request).await
}

fn logged<V>(operation: &'static str, id: Option<i64>, result: ApiResult<V>) -> ApiResult<V> {
    if let Err(err) = &result {
        match err {
            ApiError::NotFound => debug!(operation, ?id, "no matching record"),
            ApiError::Validation(reason) => debug!(operation, %reason, "rejected before submission"),
            _ => error!(operation, ?id, error = %err, "request failed"),
        }
    }
    result
}

/// CRUD and aggregation over job applications.
pub struct ApplicationService<T> {
    transport: T,
    client: ApplicationClient,
}

impl<T: Transport> ApplicationService<T> {
    /// Requests carry the session's token when signed in, the public key otherwise.
    pub fn new(transport: T, settings: &Settings, session: &SessionState) -> Self {
        let client = match session.access_token() {
            Some(token) => ApplicationClient::new(settings).with_access_token(token),
            None => ApplicationClient::new(settings),
        };
        Self { transport, client }
    }

    pub async fn list(&self) -> ApiResult<Vec<JobApplication>> {
        let result = async {
            let response = send(&self.transport, "list", self.client.build_list()).await?;
            self.client.parse_list(response)
        }
        .await;
        logged("list", None, result)
    }

    pub async fn list_by_status(&self, status: ApplicationStatus) -> ApiResult<Vec<JobApplication>> {
        let result = async {
            let request = self.client.build_list_by_status(status);
            let response = send(&self.transport, "list_by_status", request).await?;
            self.client.parse_list(response)
        }
        .await;
        logged("list_by_status", None, result)
    }

    /// `Ok(None)` when no record has this id.
    pub async fn get_by_id(&self, id: i64) -> ApiResult<Option<JobApplication>> {
        let result = async {
            let response = send(&self.transport, "get_by_id", self.client.build_get(id)).await?;
            self.client.parse_get(response)
        }
        .await;
        match logged("get_by_id", Some(id), result) {
            Ok(app) => Ok(Some(app)),
            Err(ApiError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn create(&self, input: &NewApplication) -> ApiResult<JobApplication> {
        let result = async {
            input.validate()?;
            let request = self.client.build_create(input, Utc::now())?;
            let response = send(&self.transport, "create", request).await?;
            self.client.parse_create(response)
        }
        .await;
        logged("create", None, result)
    }

    /// Only the fields set in `patch` change.
    pub async fn update(&self, id: i64, patch: &ApplicationPatch) -> ApiResult<JobApplication> {
        let result = async {
            patch.validate()?;
            let request = self.client.build_update(id, patch, Utc::now())?;
            let response = send(&self.transport, "update", request).await?;
            self.client.parse_update(response)
        }
        .await;
        logged("update", Some(id), result)
    }

    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        let result = async {
            let response = send(&self.transport, "delete", self.client.build_delete(id)).await?;
            self.client.parse_delete(response)
        }
        .await;
        logged("delete", Some(id), result)
    }

    /// Delete, then re-read the list from the store.
    pub async fn delete_and_refresh(&self, id: i64) -> ApiResult<Vec<JobApplication>> {
        self.delete(id).await?;
        self.list().await
    }

    pub async fn stats(&self) -> ApiResult<ApplicationStats> {
        let records = self.list().await?;
        Ok(ApplicationStats::from_records(&records))
    }

    /// Issues `list` and `stats` concurrently and keeps the `limit` most recent.
    pub async fn dashboard(&self, limit: usize) -> ApiResult<Dashboard> {
        let (mut recent, stats) = futures::try_join!(self.list(), self.stats())?;
        recent.truncate(limit);
        Ok(Dashboard { recent, stats })
    }

    /// Validate a new-application form and create it.
    pub async fn create_from_form(&self, form: &ApplicationFormData) -> ApiResult<JobApplication> {
        let input = logged("create", None, form.validate().map_err(ApiError::from))?;
        self.create(&input).await
    }

    /// Validate an edit form and write every field back.
    pub async fn update_from_form(&self, id: i64, form: ApplicationFormData) -> ApiResult<JobApplication> {
        let patch = logged("update", Some(id), form.into_patch().map_err(ApiError::from))?;
        self.update(id, &patch).await
    }
}

/// Sign-up, sign-in, password recovery and sign-out.
pub struct SessionService<T> {
    transport: T,
    client: AuthClient,
}

impl<T: Transport> SessionService<T> {
    pub fn new(transport: T, settings: &Settings) -> Self {
        Self {
            transport,
            client: AuthClient::new(settings),
        }
    }

    /// A directly issued session moves `state` to `Authenticated`; otherwise
    /// the account awaits confirmation and `state` is untouched.
    pub async fn sign_up(&self, state: &mut SessionState, credentials: &Credentials) -> ApiResult<SignUpOutcome> {
        logged("sign_up", None, credentials.validate().map_err(ApiError::from))?;
        if !matches!(state, SessionState::Anonymous) {
            return Err(ApiError::InvalidState {
                operation: "sign up",
                state: state.name(),
            });
        }
        let result = async {
            let request = self.client.build_sign_up(credentials)?;
            let response = send(&self.transport, "sign_up", request).await?;
            self.client.parse_sign_up(response)
        }
        .await;
        let outcome = logged("sign_up", None, result)?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            state.begin_sign_in()?;
            state.complete_sign_in(&Ok(session.clone()))?;
        }
        Ok(outcome)
    }

    pub async fn sign_in(&self, state: &mut SessionState, credentials: &Credentials) -> ApiResult<Session> {
        logged("sign_in", None, credentials.validate().map_err(ApiError::from))?;
        state.begin_sign_in()?;
        let result = async {
            let request = self.client.build_sign_in(credentials)?;
            let response = send(&self.transport, "sign_in", request).await?;
            self.client.parse_sign_in(response)
        }
        .await;
        state.complete_sign_in(&result)?;
        logged("sign_in", None, result)
    }

    /// Success means the service accepted the request, not that mail was read.
    pub async fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        if email.trim().is_empty() {
            return logged("request_password_reset", None, Err(ValidationError::MissingEmail.into()));
        }
        let result = async {
            let request = self.client.build_password_reset(email)?;
            let response = send(&self.transport, "request_password_reset", request).await?;
            self.client.parse_password_reset(response)
        }
        .await;
        logged("request_password_reset", None, result)
    }

    /// Requires a recovery session in `state`. The password pair is checked
    /// before anything is sent.
    pub async fn update_password(&self, state: &mut SessionState, change: &PasswordChange) -> ApiResult<User> {
        logged("update_password", None, change.validate().map_err(ApiError::from))?;
        let recovery = state.recovery().cloned().ok_or(ApiError::InvalidState {
            operation: "update password",
            state: state.name(),
        })?;
        let result = async {
            let request = self.client.build_update_password(&recovery, change)?;
            let response = send(&self.transport, "update_password", request).await?;
            self.client.parse_update_password(response)
        }
        .await;
        state.complete_password_update(&result)?;
        logged("update_password", None, result)
    }

    /// Revokes the session and returns `state` to `Anonymous`.
    pub async fn sign_out(&self, state: &mut SessionState) -> ApiResult<()> {
        let session = match &*state {
            SessionState::Authenticated(session) => session.clone(),
            other => {
                return Err(ApiError::InvalidState {
                    operation: "sign out",
                    state: other.name(),
                })
            }
        };
        let result = async {
            let response = send(&self.transport, "sign_out", self.client.build_sign_out(&session)).await?;
            self.client.parse_sign_out(response)
        }
        .await;
        logged("sign_out", None, result)?;
        state.sign_out();
        Ok(())
    }
}
