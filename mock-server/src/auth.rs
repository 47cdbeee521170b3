//! Email/password identity endpoints with GoTrue-shaped payloads.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{bearer, Backend, Reject};

const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_TTL_SECS: u64 = 3600;

#[derive(Clone, Debug)]
pub(crate) struct UserRecord {
    id: Uuid,
    email: String,
    password: String,
    confirmed_at: Option<String>,
}

impl UserRecord {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "aud": "authenticated",
            "email": self.email,
            "confirmed_at": self.confirmed_at,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GrantKind {
    Access,
    Recovery,
}

#[derive(Clone, Debug)]
pub(crate) struct Grant {
    email: String,
    kind: GrantKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailKind {
    Confirmation,
    Recovery,
}

/// A message the identity service would have emailed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub kind: MailKind,
    pub link: String,
}

impl Mail {
    /// The part of a recovery link after `#`.
    pub fn fragment(&self) -> Option<&str> {
        self.link.split_once('#').map(|(_, fragment)| fragment)
    }

    /// Value of `token=` in a confirmation link.
    pub fn token(&self) -> Option<&str> {
        let (_, query) = self.link.split_once('?')?;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
    }
}

#[derive(Deserialize)]
pub(crate) struct EmailPassword {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub(crate) struct EmailOnly {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
pub(crate) struct PasswordUpdate {
    password: Option<String>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn unprocessable(error_code: &str, msg: &str) -> Reject {
    Reject::new(
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "code": 422, "error_code": error_code, "msg": msg }),
    )
}

fn invalid_grant(description: &str) -> Reject {
    Reject::new(
        StatusCode::BAD_REQUEST,
        json!({ "error": "invalid_grant", "error_description": description }),
    )
}

fn unauthorized() -> Reject {
    Reject::new(
        StatusCode::UNAUTHORIZED,
        json!({ "code": 401, "error_code": "bad_jwt", "msg": "invalid JWT" }),
    )
}

fn check_signup_input(input: &EmailPassword) -> Result<String, Reject> {
    let email = input.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(unprocessable(
            "validation_failed",
            "Unable to validate email address: invalid format",
        ));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(unprocessable(
            "weak_password",
            "Password should be at least 6 characters.",
        ));
    }
    Ok(email)
}

/// Issue an access token and return the session body.
fn issue_session(state: &mut crate::Store, user: &UserRecord) -> Value {
    let access_token = Uuid::new_v4().to_string();
    state.tokens.insert(
        access_token.clone(),
        Grant {
            email: user.email.clone(),
            kind: GrantKind::Access,
        },
    );
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": TOKEN_TTL_SECS,
        "refresh_token": Uuid::new_v4().simple().to_string(),
        "user": user.to_json(),
    })
}

pub(crate) async fn signup(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(input): Json<EmailPassword>,
) -> Result<Json<Value>, Reject> {
    backend.authorize(&headers).await?;
    let email = check_signup_input(&input)?;
    let mut state = backend.state.write().await;
    if state.users.contains_key(&email) {
        return Err(unprocessable("user_already_exists", "User already registered"));
    }
    let mut user = UserRecord {
        id: Uuid::new_v4(),
        email: email.clone(),
        password: input.password,
        confirmed_at: None,
    };
    if backend.autoconfirm {
        user.confirmed_at = Some(now());
        state.users.insert(email, user.clone());
        return Ok(Json(issue_session(&mut state, &user)));
    }

    let token = Uuid::new_v4().simple().to_string();
    state.confirmations.insert(token.clone(), email.clone());
    state.outbox.push(Mail {
        to: email.clone(),
        kind: MailKind::Confirmation,
        link: format!("/auth/v1/verify?token={token}&type=signup"),
    });
    tracing::debug!(%email, "sign-up awaiting confirmation");
    let mut body = user.to_json();
    body["confirmation_sent_at"] = json!(now());
    state.users.insert(email, user);
    Ok(Json(body))
}

pub(crate) async fn verify(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, Reject> {
    let mut state = backend.state.write().await;
    let email = params
        .get("token")
        .and_then(|token| state.confirmations.remove(token))
        .ok_or_else(|| {
            Reject::new(
                StatusCode::FORBIDDEN,
                json!({ "code": 403, "error_code": "otp_expired", "msg": "Email link is invalid or has expired" }),
            )
        })?;
    let user = state
        .users
        .get_mut(&email)
        .ok_or_else(|| invalid_grant("User not found"))?;
    user.confirmed_at = Some(now());
    Ok(Json(user.to_json()))
}

pub(crate) async fn token(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(input): Json<EmailPassword>,
) -> Result<Json<Value>, Reject> {
    backend.authorize(&headers).await?;
    if params.get("grant_type").map(String::as_str) != Some("password") {
        return Err(Reject::new(
            StatusCode::BAD_REQUEST,
            json!({ "error": "unsupported_grant_type", "error_description": "unsupported grant type" }),
        ));
    }
    let email = input.email.trim().to_lowercase();
    let mut state = backend.state.write().await;
    let user = match state.users.get(&email) {
        Some(user) if user.password == input.password => user.clone(),
        _ => return Err(invalid_grant("Invalid login credentials")),
    };
    if user.confirmed_at.is_none() {
        return Err(invalid_grant("Email not confirmed"));
    }
    Ok(Json(issue_session(&mut state, &user)))
}

/// Always answers 200 so the response does not reveal whether an account exists.
pub(crate) async fn recover(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(input): Json<EmailOnly>,
) -> Result<Json<Value>, Reject> {
    backend.authorize(&headers).await?;
    let email = input.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(unprocessable("validation_failed", "Password recovery requires an email"));
    }
    let redirect = params.get("redirect_to").cloned().unwrap_or_default();
    let mut state = backend.state.write().await;
    if state.users.contains_key(&email) {
        let token = Uuid::new_v4().to_string();
        state.tokens.insert(
            token.clone(),
            Grant {
                email: email.clone(),
                kind: GrantKind::Recovery,
            },
        );
        state.outbox.push(Mail {
            to: email,
            kind: MailKind::Recovery,
            link: format!(
                "{redirect}#access_token={token}&expires_in={TOKEN_TTL_SECS}&token_type=bearer&type=recovery"
            ),
        });
    }
    Ok(Json(json!({})))
}

pub(crate) async fn current_user(
    State(backend): State<Backend>,
    headers: HeaderMap,
) -> Result<Json<Value>, Reject> {
    backend.authorize(&headers).await?;
    let token = bearer(&headers).ok_or_else(unauthorized)?;
    let state = backend.state.read().await;
    let grant = state.tokens.get(token).ok_or_else(unauthorized)?;
    let user = state.users.get(&grant.email).ok_or_else(unauthorized)?;
    Ok(Json(user.to_json()))
}

/// Password change. A recovery token is spent by a successful update.
pub(crate) async fn update_user(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(input): Json<PasswordUpdate>,
) -> Result<Json<Value>, Reject> {
    backend.authorize(&headers).await?;
    let token = bearer(&headers).ok_or_else(unauthorized)?.to_string();
    let mut state = backend.state.write().await;
    let grant = state.tokens.get(&token).cloned().ok_or_else(unauthorized)?;
    let password = input.password.unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(unprocessable(
            "weak_password",
            "Password should be at least 6 characters.",
        ));
    }
    let user = state.users.get_mut(&grant.email).ok_or_else(unauthorized)?;
    user.password = password;
    // Following the reset link proves control of the mailbox.
    if user.confirmed_at.is_none() {
        user.confirmed_at = Some(now());
    }
    let body = user.to_json();
    if grant.kind == GrantKind::Recovery {
        state.tokens.remove(&token);
    }
    Ok(Json(body))
}

pub(crate) async fn logout(
    State(backend): State<Backend>,
    headers: HeaderMap,
) -> Result<StatusCode, Reject> {
    backend.authorize(&headers).await?;
    let token = bearer(&headers).ok_or_else(unauthorized)?;
    let mut state = backend.state.write().await;
    match state.tokens.remove(token) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(unauthorized()),
    }
}
