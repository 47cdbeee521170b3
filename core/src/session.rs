//! Identity-service requests and the client-visible session state.
//!
//! # Design
//! `AuthClient` follows the same build/parse split as the record client.
//! `SessionState` is a plain value owned by the caller; every transition
//! consumes an identity-service outcome, so success is never assumed locally.
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated
//! Anonymous -> Resetting -> PasswordUpdated -> Anonymous
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{ApiError, ValidationError};
use crate::http::{decode, from_value, json_content_type, HttpMethod, HttpRequest, HttpResponse};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<String>,
}

/// An established identity-service session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: User,
}

/// Result of a sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account exists but must be confirmed out-of-band before sign-in.
    ConfirmationRequired(User),
    /// The identity service issued a session straight away.
    SignedIn(Session),
}

/// Short-lived session permitting a password update, taken from the
/// fragment of a reset link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySession {
    pub access_token: String,
}

impl RecoverySession {
    /// Parse `#access_token=...&type=recovery`. Returns `None` unless the
    /// fragment carries the recovery marker and a token.
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        let mut token = None;
        let mut is_recovery = false;
        for (key, value) in Url::parse(&format!("http://fragment/?{fragment}"))
            .ok()?
            .query_pairs()
        {
            match key.as_ref() {
                "access_token" if !value.is_empty() => token = Some(value.into_owned()),
                "type" => is_recovery = value == "recovery",
                _ => {}
            }
        }
        match (is_recovery, token) {
            (true, Some(access_token)) => Some(Self { access_token }),
            _ => None,
        }
    }
}

/// Email and password as typed by the user.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(())
    }
}

/// A new password and its confirmation, checked before submission.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn new(password: impl Into<String>, confirm_password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            confirm_password: confirm_password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.password.is_empty() || self.confirm_password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
        }
        Ok(())
    }
}

/// Client-visible session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated(Session),
    Resetting(RecoverySession),
    PasswordUpdated,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Resetting(_) => "resetting",
            SessionState::PasswordUpdated => "password-updated",
        }
    }

    /// Bearer token for record access, if signed in.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated(session) => Some(&session.access_token),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn begin_sign_in(&mut self) -> Result<(), ApiError> {
        let allowed = matches!(self, SessionState::Anonymous);
        self.require(allowed, "sign in")?;
        *self = SessionState::Authenticating;
        Ok(())
    }

    /// Failure drops back to `Anonymous`.
    pub fn complete_sign_in(&mut self, outcome: &Result<Session, ApiError>) -> Result<(), ApiError> {
        let allowed = matches!(self, SessionState::Authenticating);
        self.require(allowed, "complete sign in")?;
        *self = match outcome {
            Ok(session) => SessionState::Authenticated(session.clone()),
            Err(_) => SessionState::Anonymous,
        };
        Ok(())
    }

    /// Enter the reset flow from the fragment the reset link arrived with.
    pub fn enter_recovery(&mut self, fragment: &str) -> Result<(), ApiError> {
        let allowed = matches!(self, SessionState::Anonymous | SessionState::Resetting(_));
        self.require(allowed, "start password recovery")?;
        let recovery =
            RecoverySession::from_fragment(fragment).ok_or(ValidationError::InvalidResetLink)?;
        *self = SessionState::Resetting(recovery);
        Ok(())
    }

    pub fn recovery(&self) -> Option<&RecoverySession> {
        match self {
            SessionState::Resetting(recovery) => Some(recovery),
            _ => None,
        }
    }

    /// Failure keeps the recovery session so the user can try again.
    pub fn complete_password_update(&mut self, outcome: &Result<User, ApiError>) -> Result<(), ApiError> {
        let allowed = matches!(self, SessionState::Resetting(_));
        self.require(allowed, "update password")?;
        if outcome.is_ok() {
            *self = SessionState::PasswordUpdated;
        }
        Ok(())
    }

    /// After a password update the user must sign in again.
    pub fn finish_reset(&mut self) -> Result<(), ApiError> {
        let allowed = matches!(self, SessionState::PasswordUpdated);
        self.require(allowed, "finish password reset")?;
        *self = SessionState::Anonymous;
        Ok(())
    }

    pub fn sign_out(&mut self) {
        *self = SessionState::Anonymous;
    }

    fn require(&self, allowed: bool, operation: &'static str) -> Result<(), ApiError> {
        if allowed {
            Ok(())
        } else {
            Err(ApiError::InvalidState {
                operation,
                state: self.name(),
            })
        }
    }
}

/// Identity-service error bodies come in a few shapes depending on endpoint.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct EmailPassword<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct EmailOnly<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct NewPassword<'a> {
    password: &'a str,
}

/// Stateless client for the identity service.
#[derive(Debug, Clone)]
pub struct AuthClient {
    base_url: String,
    api_key: String,
    reset_redirect: String,
}

impl AuthClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.supabase_url.trim_end_matches('/').to_string(),
            api_key: settings.supabase_anon_key.clone(),
            reset_redirect: settings.reset_redirect_url(),
        }
    }

    pub fn build_sign_up(&self, credentials: &Credentials) -> Result<HttpRequest, ApiError> {
        self.post_json(
            self.url("signup", &[]),
            &EmailPassword {
                email: credentials.email.trim(),
                password: &credentials.password,
            },
        )
    }

    pub fn build_sign_in(&self, credentials: &Credentials) -> Result<HttpRequest, ApiError> {
        self.post_json(
            self.url("token", &[("grant_type", "password")]),
            &EmailPassword {
                email: credentials.email.trim(),
                password: &credentials.password,
            },
        )
    }

    pub fn build_password_reset(&self, email: &str) -> Result<HttpRequest, ApiError> {
        self.post_json(
            self.url("recover", &[("redirect_to", self.reset_redirect.as_str())]),
            &EmailOnly { email: email.trim() },
        )
    }

    pub fn build_update_password(
        &self,
        recovery: &RecoverySession,
        change: &PasswordChange,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&NewPassword {
            password: &change.password,
        })
        .map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut headers = self.headers(Some(&recovery.access_token));
        headers.push(json_content_type());
        Ok(HttpRequest {
            method: HttpMethod::Put,
            path: self.url("user", &[]),
            headers,
            body: Some(body),
        })
    }

    pub fn build_sign_out(&self, session: &Session) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            path: self.url("logout", &[]),
            headers: self.headers(Some(&session.access_token)),
            body: None,
        }
    }

    /// A response carrying `access_token` means the service signed the user in
    /// directly; otherwise it is the bare user awaiting confirmation.
    pub fn parse_sign_up(&self, response: HttpResponse) -> Result<SignUpOutcome, ApiError> {
        check_status(&response)?;
        let value: serde_json::Value = decode(&response.body)?;
        if value.get("access_token").is_some() {
            return Ok(SignUpOutcome::SignedIn(from_value(value)?));
        }
        Ok(SignUpOutcome::ConfirmationRequired(from_value(value)?))
    }

    pub fn parse_sign_in(&self, response: HttpResponse) -> Result<Session, ApiError> {
        check_status(&response)?;
        decode(&response.body)
    }

    pub fn parse_password_reset(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    pub fn parse_update_password(&self, response: HttpResponse) -> Result<User, ApiError> {
        check_status(&response)?;
        decode(&response.body)
    }

    pub fn parse_sign_out(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    fn url(&self, endpoint: &str, query: &[(&str, &str)]) -> String {
        let base = format!("{}/auth/v1/{endpoint}", self.base_url);
        match Url::parse(&base) {
            Ok(mut url) => {
                if !query.is_empty() {
                    url.query_pairs_mut().extend_pairs(query);
                }
                url.to_string()
            }
            Err(_) => base,
        }
    }

    fn headers(&self, bearer: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![("apikey".to_string(), self.api_key.clone())];
        if let Some(token) = bearer {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }

    fn post_json<T: Serialize>(&self, path: String, body: &T) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut headers = self.headers(None);
        headers.push(json_content_type());
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path,
            headers,
            body: Some(body),
        })
    }
}

fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let body: AuthErrorBody = serde_json::from_str(&response.body).unwrap_or_default();
    let message = body
        .msg
        .or(body.error_description)
        .or(body.message)
        .or(body.error)
        .unwrap_or_else(|| response.body.clone());
    Err(ApiError::Auth {
        status: response.status,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AuthClient {
        AuthClient::new(&Settings::new("http://localhost:54321", "anon", "http://localhost:3000"))
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn session() -> Session {
        Session {
            access_token: "tok".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            user: User {
                id: "u1".to_string(),
                email: Some("dev@example.com".to_string()),
                confirmed_at: None,
            },
        }
    }

    #[test]
    fn build_sign_in_uses_password_grant() {
        let req = client()
            .build_sign_in(&Credentials::new(" dev@example.com ", "secret1"))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:54321/auth/v1/token?grant_type=password");
        assert_eq!(req.header("apikey"), Some("anon"));
        assert!(req.header("authorization").is_none());
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "email": "dev@example.com", "password": "secret1" }));
    }

    #[test]
    fn build_password_reset_carries_redirect() {
        let req = client().build_password_reset("dev@example.com").unwrap();
        assert_eq!(
            req.path,
            "http://localhost:54321/auth/v1/recover?redirect_to=http%3A%2F%2Flocalhost%3A3000%2Freset-password"
        );
    }

    #[test]
    fn build_update_password_uses_recovery_token() {
        let recovery = RecoverySession {
            access_token: "rec".to_string(),
        };
        let req = client()
            .build_update_password(&recovery, &PasswordChange::new("newpass", "newpass"))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.path, "http://localhost:54321/auth/v1/user");
        assert_eq!(req.header("authorization"), Some("Bearer rec"));
    }

    #[test]
    fn parse_sign_up_without_session_requires_confirmation() {
        let body = r#"{"id":"u1","email":"dev@example.com","confirmation_sent_at":"2024-01-01T00:00:00Z"}"#;
        let outcome = client().parse_sign_up(response(200, body)).unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired(ref user) if user.id == "u1"));
    }

    #[test]
    fn parse_sign_up_with_session_signs_in() {
        let body = serde_json::to_string(&session()).unwrap();
        let outcome = client().parse_sign_up(response(200, &body)).unwrap();
        assert_eq!(outcome, SignUpOutcome::SignedIn(session()));
    }

    #[test]
    fn auth_errors_surface_service_message() {
        let err = client()
            .parse_sign_in(response(
                400,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth { status: 400, ref message } if message == "Invalid login credentials"));

        let err = client()
            .parse_sign_up(response(422, r#"{"code":422,"msg":"User already registered"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth { status: 422, ref message } if message == "User already registered"));
    }

    #[test]
    fn recovery_fragment_requires_marker_and_token() {
        let rec = RecoverySession::from_fragment("#access_token=abc&expires_in=3600&type=recovery").unwrap();
        assert_eq!(rec.access_token, "abc");
        assert!(RecoverySession::from_fragment("#access_token=abc&type=signup").is_none());
        assert!(RecoverySession::from_fragment("type=recovery").is_none());
        assert!(RecoverySession::from_fragment("").is_none());
    }

    #[test]
    fn password_change_checks_run_in_order() {
        assert_eq!(
            PasswordChange::new("", "abc").validate(),
            Err(ValidationError::MissingPassword)
        );
        assert_eq!(
            PasswordChange::new("abc", "abd").validate(),
            Err(ValidationError::PasswordMismatch)
        );
        assert_eq!(
            PasswordChange::new("abc", "abc").validate(),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        assert_eq!(PasswordChange::new("abcdef", "abcdef").validate(), Ok(()));
    }

    #[test]
    fn credentials_need_email_and_password() {
        assert!(Credentials::new("  ", "secret1").validate().is_err());
        assert!(Credentials::new("dev@example.com", "").validate().is_err());
        assert!(Credentials::new("dev@example.com", "x").validate().is_ok());
    }

    #[test]
    fn sign_in_transitions() {
        let mut state = SessionState::default();
        state.begin_sign_in().unwrap();
        assert_eq!(state, SessionState::Authenticating);
        state.complete_sign_in(&Ok(session())).unwrap();
        assert_eq!(state.access_token(), Some("tok"));

        let err = state.begin_sign_in().unwrap_err();
        assert!(matches!(err, ApiError::InvalidState { state: "authenticated", .. }));

        state.sign_out();
        state.begin_sign_in().unwrap();
        state.complete_sign_in(&Err(ApiError::NotFound)).unwrap();
        assert_eq!(state, SessionState::Anonymous);
    }

    #[test]
    fn reset_transitions_force_new_sign_in() {
        let mut state = SessionState::Anonymous;
        assert!(state.enter_recovery("#type=signup&access_token=x").is_err());
        assert_eq!(state, SessionState::Anonymous);

        state.enter_recovery("#access_token=rec&type=recovery").unwrap();
        assert_eq!(state.recovery().map(|r| r.access_token.as_str()), Some("rec"));

        state
            .complete_password_update(&Err(ApiError::Transport("offline".to_string())))
            .unwrap();
        assert!(state.recovery().is_some());

        let user = session().user;
        state.complete_password_update(&Ok(user)).unwrap();
        assert_eq!(state, SessionState::PasswordUpdated);
        assert!(!state.is_authenticated());

        state.finish_reset().unwrap();
        assert_eq!(state, SessionState::Anonymous);
    }
}
