//! Backend endpoint settings, read from the environment at startup.
//!
//! ```text
//! JOBTRACK_SUPABASE_URL       store and identity service base URL (required)
//! JOBTRACK_SUPABASE_ANON_KEY  public access key (required)
//! JOBTRACK_SITE_URL           where reset links send the user back to
//! ```

use std::collections::HashMap;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "JOBTRACK";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub site_url: String,
}

impl Settings {
    pub fn new(
        supabase_url: impl Into<String>,
        supabase_anon_key: impl Into<String>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            supabase_anon_key: supabase_anon_key.into(),
            site_url: site_url.into(),
        }
        .normalized()
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load(source: Environment) -> Result<Self, ConfigError> {
        let conf = Config::builder()
            .set_default("site_url", DEFAULT_SITE_URL)?
            .add_source(source)
            .build()?;
        let settings: Settings = conf.try_deserialize()?;
        if settings.supabase_url.trim().is_empty() {
            return Err(ConfigError::NotFound("supabase_url".into()));
        }
        if settings.supabase_anon_key.trim().is_empty() {
            return Err(ConfigError::NotFound("supabase_anon_key".into()));
        }
        Ok(settings.normalized())
    }

    fn normalized(mut self) -> Self {
        self.supabase_url = self.supabase_url.trim_end_matches('/').to_string();
        self.site_url = self.site_url.trim_end_matches('/').to_string();
        self
    }

    /// Redirect target handed to the identity service with reset requests.
    pub fn reset_redirect_url(&self) -> String {
        format!("{}/reset-password", self.site_url)
    }
}
