//! Staging area for user input before it becomes a create or update payload.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::{ApplicationPatch, ApplicationStatus, JobApplication, NewApplication};

/// Every field as the user typed it. Nothing here is persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationFormData {
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    pub application_date: String,
    pub resume_version: String,
    pub cover_letter_version: String,
    pub status: String,
    pub credentials_used: String,
    pub notes: String,
}

impl ApplicationFormData {
    /// A blank form dated `today` with status Draft.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            company_name: String::new(),
            job_title: String::new(),
            job_description: String::new(),
            application_date: today.format("%Y-%m-%d").to_string(),
            resume_version: String::new(),
            cover_letter_version: String::new(),
            status: ApplicationStatus::Draft.label().to_string(),
            credentials_used: String::new(),
            notes: String::new(),
        }
    }

    /// Prefill for editing an existing record.
    pub fn from_record(record: &JobApplication) -> Self {
        Self {
            company_name: record.company_name.clone(),
            job_title: record.job_title.clone(),
            job_description: record.job_description.clone(),
            application_date: record.application_date.format("%Y-%m-%d").to_string(),
            resume_version: record.resume_version.clone(),
            cover_letter_version: record.cover_letter_version.clone(),
            status: record.status.label().to_string(),
            credentials_used: record.credentials_used.clone(),
            notes: record.notes.clone(),
        }
    }

    pub fn validate(&self) -> Result<NewApplication, ValidationError> {
        let company_name = required(&self.company_name, "company name")?;
        let job_title = required(&self.job_title, "job title")?;
        let date = self.application_date.trim();
        if date.is_empty() {
            return Err(ValidationError::MissingField("application date"));
        }
        let application_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDate(date.to_string()))?;
        let status = self.status.parse::<ApplicationStatus>()?;

        Ok(NewApplication {
            company_name,
            job_title,
            job_description: self.job_description.clone(),
            application_date,
            resume_version: self.resume_version.clone(),
            cover_letter_version: self.cover_letter_version.clone(),
            status,
            credentials_used: self.credentials_used.clone(),
            notes: self.notes.clone(),
        })
    }

    /// Edit-mode submission: every field is sent.
    pub fn into_patch(self) -> Result<ApplicationPatch, ValidationError> {
        let app = self.validate()?;
        Ok(ApplicationPatch {
            company_name: Some(app.company_name),
            job_title: Some(app.job_title),
            job_description: Some(app.job_description),
            application_date: Some(app.application_date),
            resume_version: Some(app.resume_version),
            cover_letter_version: Some(app.cover_letter_version),
            status: Some(app.status),
            credentials_used: Some(app.credentials_used),
            notes: Some(app.notes),
        })
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}
