//! Client core for the job application tracker.
//!
//! # Overview
//! Talks to a managed backend: a REST table of job applications and an
//! identity service. Request building and response parsing are pure
//! (host-does-IO); a `Transport` performs the round-trip, and the services in
//! [`service`] wire the two together with logging.
//!
//! # Design
//! - `ApplicationClient` and `AuthClient` are stateless apart from endpoint
//!   and credentials. Each operation is a `build_*` / `parse_*` pair.
//! - Session state is an explicit `SessionState` value owned by the caller.
//! - Types are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod config;
pub mod error;
pub mod form;
pub mod http;
pub mod records;
pub mod service;
pub mod session;
pub mod transport;
pub mod types;

pub use config::Settings;
pub use error::{ApiError, ApiResult, ValidationError};
pub use form::ApplicationFormData;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use records::ApplicationClient;
pub use service::{ApplicationService, Dashboard, SessionService, DASHBOARD_RECENT};
pub use session::{
    AuthClient, Credentials, PasswordChange, RecoverySession, Session, SessionState, SignUpOutcome, User,
};
pub use transport::{ReqwestTransport, Transport};
pub use types::{ApplicationPatch, ApplicationStats, ApplicationStatus, JobApplication, NewApplication};
