//! Domain types for the `job_applications` table.
//!
//! # Design
//! These types mirror the store's row schema but are defined independently
//! of the mock-server crate; integration tests catch schema drift. The create
//! and update payloads are separate types so the compiler keeps callers from
//! supplying `id` or `last_updated`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Pipeline stage of an application. Serialized as its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Draft,
    Applied,
    #[serde(rename = "In Progress")]
    InProgress,
    Interview,
    Offer,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Applied,
        ApplicationStatus::InProgress,
        ApplicationStatus::Interview,
        ApplicationStatus::Offer,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "Draft",
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::InProgress => "In Progress",
            ApplicationStatus::Interview => "Interview",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Withdrawn => "Withdrawn",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.label() == s)
            .ok_or_else(|| ValidationError::InvalidStatus(s.to_string()))
    }
}

/// A stored job application row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub company_name: String,
    pub job_title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub job_description: String,
    #[serde(deserialize_with = "iso_date")]
    pub application_date: NaiveDate,
    #[serde(default, deserialize_with = "nullable_string")]
    pub resume_version: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub cover_letter_version: String,
    pub status: ApplicationStatus,
    #[serde(default, deserialize_with = "nullable_string")]
    pub credentials_used: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Payload for creating an application. The store assigns `id`; the record
/// layer stamps `last_updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub company_name: String,
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
    pub application_date: NaiveDate,
    #[serde(default)]
    pub resume_version: String,
    #[serde(default)]
    pub cover_letter_version: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub credentials_used: String,
    #[serde(default)]
    pub notes: String,
}

impl NewApplication {
    /// A minimal application with the optional text fields left empty.
    pub fn new(
        company_name: impl Into<String>,
        job_title: impl Into<String>,
        application_date: NaiveDate,
        status: ApplicationStatus,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            job_title: job_title.into(),
            job_description: String::new(),
            application_date,
            resume_version: String::new(),
            cover_letter_version: String::new(),
            status,
            credentials_used: String::new(),
            notes: String::new(),
        }
    }

    /// Company and title must be non-blank. The store only rejects nulls.
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_blank(&self.company_name, "company name")?;
        non_blank(&self.job_title, "job title")
    }
}

/// Sparse update payload. Only the fields that are `Some` are sent, so the
/// store leaves every other column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ApplicationPatch {
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A supplied company or title must be non-blank; absent ones are left alone.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(company_name) = &self.company_name {
            non_blank(company_name, "company name")?;
        }
        if let Some(job_title) = &self.job_title {
            non_blank(job_title, "job title")?;
        }
        Ok(())
    }
}

fn non_blank(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Dashboard counts. Only five statuses are tallied, so the per-status counts
/// may sum to less than `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub total: usize,
    pub applied: usize,
    pub interview: usize,
    pub offer: usize,
    pub rejected: usize,
    pub accepted: usize,
}

impl ApplicationStats {
    pub fn from_records(records: &[JobApplication]) -> Self {
        let count = |status: ApplicationStatus| records.iter().filter(|r| r.status == status).count();
        Self {
            total: records.len(),
            applied: count(ApplicationStatus::Applied),
            interview: count(ApplicationStatus::Interview),
            offer: count(ApplicationStatus::Offer),
            rejected: count(ApplicationStatus::Rejected),
            accepted: count(ApplicationStatus::Accepted),
        }
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `YYYY-MM-DD`, or a timestamp whose date part is kept.
fn iso_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let date_part = raw.split('T').next().unwrap_or_default();
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ApplicationStatus) -> JobApplication {
        JobApplication {
            id: Some(1),
            company_name: "Acme".to_string(),
            job_title: "Engine Dev".to_string(),
            job_description: String::new(),
            application_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            resume_version: String::new(),
            cover_letter_version: String::new(),
            status,
            credentials_used: String::new(),
            notes: String::new(),
            last_updated: None,
        }
    }

    #[test]
    fn status_uses_display_labels_on_the_wire() {
        let json = serde_json::to_string(&ApplicationStatus::InProgress).unwrap();
        assert_eq!(json, r#""In Progress""#);
        let back: ApplicationStatus = serde_json::from_str(r#""Withdrawn""#).unwrap();
        assert_eq!(back, ApplicationStatus::Withdrawn);
    }

    #[test]
    fn status_from_str_rejects_unknown_labels() {
        assert_eq!("In Progress".parse::<ApplicationStatus>(), Ok(ApplicationStatus::InProgress));
        assert_eq!(
            "in progress".parse::<ApplicationStatus>(),
            Err(ValidationError::InvalidStatus("in progress".to_string()))
        );
    }

    #[test]
    fn unknown_status_fails_decoding() {
        let raw = r#"{"id":1,"company_name":"A","job_title":"B","application_date":"2024-01-10","status":"Ghosted"}"#;
        assert!(serde_json::from_str::<JobApplication>(raw).is_err());
    }

    #[test]
    fn null_text_columns_decode_as_empty() {
        let raw = r#"{
            "id": 7,
            "company_name": "Acme",
            "job_title": "Engine Dev",
            "job_description": null,
            "application_date": "2024-01-10",
            "status": "Applied",
            "notes": null,
            "last_updated": "2024-01-11T09:30:00.123+00:00"
        }"#;
        let app: JobApplication = serde_json::from_str(raw).unwrap();
        assert_eq!(app.id, Some(7));
        assert_eq!(app.job_description, "");
        assert_eq!(app.notes, "");
        assert_eq!(app.resume_version, "");
        assert!(app.last_updated.is_some());
    }

    #[test]
    fn timestamp_application_date_keeps_date_part() {
        let raw = r#"{"company_name":"A","job_title":"B","application_date":"2024-03-05T00:00:00","status":"Draft"}"#;
        let app: JobApplication = serde_json::from_str(raw).unwrap();
        assert_eq!(app.application_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(app.id, None);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = ApplicationPatch::status(ApplicationStatus::Interview);
        let body = serde_json::to_value(&patch).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "Interview" }));
    }

    #[test]
    fn blank_names_fail_validation() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let input = NewApplication::new("", "Engine Dev", date, ApplicationStatus::Applied);
        assert_eq!(input.validate(), Err(ValidationError::MissingField("company name")));
        let input = NewApplication::new("Acme", "  ", date, ApplicationStatus::Applied);
        assert_eq!(input.validate(), Err(ValidationError::MissingField("job title")));
        assert!(NewApplication::new("Acme", "Engine Dev", date, ApplicationStatus::Applied)
            .validate()
            .is_ok());
    }

    #[test]
    fn patch_validation_checks_only_supplied_names() {
        assert!(ApplicationPatch::status(ApplicationStatus::Offer).validate().is_ok());
        let patch = ApplicationPatch {
            job_title: Some(" ".to_string()),
            ..ApplicationPatch::default()
        };
        assert_eq!(patch.validate(), Err(ValidationError::MissingField("job title")));
    }

    #[test]
    fn stats_count_each_tallied_status() {
        let records = vec![
            record(ApplicationStatus::Applied),
            record(ApplicationStatus::Applied),
            record(ApplicationStatus::Interview),
            record(ApplicationStatus::Offer),
            record(ApplicationStatus::Rejected),
            record(ApplicationStatus::Accepted),
            record(ApplicationStatus::Draft),
            record(ApplicationStatus::InProgress),
            record(ApplicationStatus::Withdrawn),
        ];
        let stats = ApplicationStats::from_records(&records);
        assert_eq!(
            stats,
            ApplicationStats {
                total: 9,
                applied: 2,
                interview: 1,
                offer: 1,
                rejected: 1,
                accepted: 1,
            }
        );
        let tallied = stats.applied + stats.interview + stats.offer + stats.rejected + stats.accepted;
        assert!(tallied <= stats.total);
    }

    #[test]
    fn stats_of_empty_set_are_zero() {
        assert_eq!(ApplicationStats::from_records(&[]), ApplicationStats::default());
    }
}
