//! Request builder and response parser for the `job_applications` table.
//!
//! # Design
//! `ApplicationClient` holds the store endpoint and the bearer token and
//! carries no other state. Each operation is split into a `build_*` method
//! that produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. Mutations take the stamp time as an argument so the
//! builders stay deterministic.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::ApiError;
use crate::http::{decode, json_content_type, HttpMethod, HttpRequest, HttpResponse};
use crate::types::{ApplicationPatch, ApplicationStatus, JobApplication, NewApplication};

pub const TABLE: &str = "job_applications";

/// Stateless client for the store's REST interface.
#[derive(Debug, Clone)]
pub struct ApplicationClient {
    base_url: String,
    api_key: String,
    bearer: String,
}

/// A payload with `last_updated` stamped alongside its own fields.
#[derive(Serialize)]
struct Stamped<'a, T> {
    #[serde(flatten)]
    fields: &'a T,
    last_updated: DateTime<Utc>,
}

/// Error body returned by the store.
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl ApplicationClient {
    /// Client for the unauthenticated preview: the public key doubles as bearer.
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.supabase_url.trim_end_matches('/').to_string(),
            api_key: settings.supabase_anon_key.clone(),
            bearer: settings.supabase_anon_key.clone(),
        }
    }

    /// Client acting on behalf of a signed-in identity.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.bearer = token.into();
        self
    }

    pub fn build_list(&self) -> HttpRequest {
        self.get(&[("select", "*"), ("order", "application_date.desc")])
    }

    pub fn build_list_by_status(&self, status: ApplicationStatus) -> HttpRequest {
        let filter = format!("eq.{}", status.label());
        self.get(&[
            ("select", "*"),
            ("status", filter.as_str()),
            ("order", "application_date.desc"),
        ])
    }

    pub fn build_get(&self, id: i64) -> HttpRequest {
        let filter = format!("eq.{id}");
        self.get(&[("select", "*"), ("id", filter.as_str())])
    }

    pub fn build_create(&self, input: &NewApplication, now: DateTime<Utc>) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&[Stamped {
            fields: input,
            last_updated: now,
        }])
        .map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut headers = self.headers();
        headers.push(json_content_type());
        headers.push(("prefer".to_string(), "return=representation".to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: self.table_url(&[]),
            headers,
            body: Some(body),
        })
    }

    pub fn build_update(
        &self,
        id: i64,
        input: &ApplicationPatch,
        now: DateTime<Utc>,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&Stamped {
            fields: input,
            last_updated: now,
        })
        .map_err(|e| ApiError::Serialization(e.to_string()))?;
        let filter = format!("eq.{id}");
        let mut headers = self.headers();
        headers.push(json_content_type());
        headers.push(("prefer".to_string(), "return=representation".to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Patch,
            path: self.table_url(&[("id", filter.as_str())]),
            headers,
            body: Some(body),
        })
    }

    pub fn build_delete(&self, id: i64) -> HttpRequest {
        let filter = format!("eq.{id}");
        HttpRequest {
            method: HttpMethod::Delete,
            path: self.table_url(&[("id", filter.as_str())]),
            headers: self.headers(),
            body: None,
        }
    }

    /// Rows ordered by `application_date`, most recent first.
    pub fn parse_list(&self, response: HttpResponse) -> Result<Vec<JobApplication>, ApiError> {
        check_status(&response, &[200])?;
        let mut rows: Vec<JobApplication> = decode(&response.body)?;
        rows.sort_by(|a, b| b.application_date.cmp(&a.application_date));
        Ok(rows)
    }

    pub fn parse_get(&self, response: HttpResponse) -> Result<JobApplication, ApiError> {
        check_status(&response, &[200])?;
        single_row(decode(&response.body)?)
    }

    pub fn parse_create(&self, response: HttpResponse) -> Result<JobApplication, ApiError> {
        check_status(&response, &[200, 201])?;
        let created = single_row(decode(&response.body)?)?;
        if created.id.is_none() {
            return Err(ApiError::Deserialization("created row has no id".to_string()));
        }
        Ok(created)
    }

    /// An update that matched no row is reported as `NotFound`.
    pub fn parse_update(&self, response: HttpResponse) -> Result<JobApplication, ApiError> {
        check_status(&response, &[200])?;
        single_row(decode(&response.body)?)
    }

    pub fn parse_delete(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, &[200, 204])
    }

    fn get(&self, query: &[(&str, &str)]) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.table_url(query),
            headers: self.headers(),
            body: None,
        }
    }

    fn table_url(&self, query: &[(&str, &str)]) -> String {
        let base = format!("{}/rest/v1/{TABLE}", self.base_url);
        match Url::parse(&base) {
            Ok(mut url) => {
                if !query.is_empty() {
                    url.query_pairs_mut().extend_pairs(query);
                }
                url.to_string()
            }
            // Leave malformed bases for the transport to reject.
            Err(_) => base,
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("apikey".to_string(), self.api_key.clone()),
            ("authorization".to_string(), format!("Bearer {}", self.bearer)),
        ]
    }
}

/// Zero rows is `NotFound`; the store enforces id uniqueness, so more than
/// one row means the response is not what was asked for.
fn single_row(mut rows: Vec<JobApplication>) -> Result<JobApplication, ApiError> {
    match rows.len() {
        0 => Err(ApiError::NotFound),
        1 => Ok(rows.remove(0)),
        n => Err(ApiError::Deserialization(format!("expected one row, got {n}"))),
    }
}

/// Map non-success status codes to `ApiError::Store`, keeping the store's message.
fn check_status(response: &HttpResponse, expected: &[u16]) -> Result<(), ApiError> {
    if expected.contains(&response.status) {
        return Ok(());
    }
    let (code, message) = match serde_json::from_str::<StoreErrorBody>(&response.body) {
        Ok(StoreErrorBody {
            code,
            message: Some(message),
            details,
        }) => {
            let message = match details {
                Some(details) => format!("{message} ({details})"),
                None => message,
            };
            (code, message)
        }
        _ => (None, response.body.clone()),
    };
    Err(ApiError::Store {
        status: response.status,
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn client() -> ApplicationClient {
        ApplicationClient::new(&Settings::new("http://localhost:54321/", "anon", "http://localhost:3000"))
    }

    fn ok(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    const ROW: &str = r#"{"id":1,"company_name":"Acme","job_title":"Engine Dev","application_date":"2024-01-10","status":"Applied","last_updated":"2024-01-10T12:00:00Z"}"#;

    #[test]
    fn build_list_orders_by_date_descending() {
        let req = client().build_list();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.path,
            "http://localhost:54321/rest/v1/job_applications?select=*&order=application_date.desc"
        );
        assert_eq!(req.header("apikey"), Some("anon"));
        assert_eq!(req.header("Authorization"), Some("Bearer anon"));
        assert!(req.body.is_none());
    }

    #[test]
    fn build_list_by_status_encodes_label() {
        let req = client().build_list_by_status(ApplicationStatus::InProgress);
        assert_eq!(
            req.path,
            "http://localhost:54321/rest/v1/job_applications?select=*&status=eq.In+Progress&order=application_date.desc"
        );
    }

    #[test]
    fn build_get_filters_on_id() {
        let req = client().build_get(42);
        assert_eq!(req.path, "http://localhost:54321/rest/v1/job_applications?select=*&id=eq.42");
    }

    #[test]
    fn access_token_replaces_bearer_but_not_api_key() {
        let req = client().with_access_token("user-token").build_delete(3);
        assert_eq!(req.header("apikey"), Some("anon"));
        assert_eq!(req.header("authorization"), Some("Bearer user-token"));
    }

    #[test]
    fn build_create_stamps_last_updated() {
        let input = NewApplication::new(
            "Acme",
            "Engine Dev",
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            ApplicationStatus::Applied,
        );
        let req = client().build_create(&input, now()).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:54321/rest/v1/job_applications");
        assert_eq!(req.header("prefer"), Some("return=representation"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        let row = &body[0];
        assert_eq!(row["company_name"], "Acme");
        assert_eq!(row["application_date"], "2024-01-10");
        assert_eq!(row["status"], "Applied");
        assert_eq!(row["last_updated"], "2024-01-10T12:00:00Z");
        assert!(row.get("id").is_none());
    }

    #[test]
    fn build_update_sends_only_supplied_fields() {
        let patch = ApplicationPatch::status(ApplicationStatus::Interview);
        let req = client().build_update(5, &patch, now()).unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert_eq!(req.path, "http://localhost:54321/rest/v1/job_applications?id=eq.5");
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "status": "Interview", "last_updated": "2024-01-10T12:00:00Z" })
        );
    }

    #[test]
    fn build_delete_has_no_body() {
        let req = client().build_delete(9);
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.path, "http://localhost:54321/rest/v1/job_applications?id=eq.9");
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_list_sorts_descending_regardless_of_row_order() {
        let body = r#"[
            {"id":1,"company_name":"A","job_title":"t","application_date":"2023-05-01","status":"Draft"},
            {"id":2,"company_name":"B","job_title":"t","application_date":"2024-02-01","status":"Applied"},
            {"id":3,"company_name":"C","job_title":"t","application_date":"2023-12-24","status":"Offer"}
        ]"#;
        let rows = client().parse_list(ok(200, body)).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn parse_list_empty_is_not_an_error() {
        assert!(client().parse_list(ok(200, "[]")).unwrap().is_empty());
    }

    #[test]
    fn parse_get_zero_rows_is_not_found() {
        let err = client().parse_get(ok(200, "[]")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn parse_get_single_row() {
        let app = client().parse_get(ok(200, &format!("[{ROW}]"))).unwrap();
        assert_eq!(app.id, Some(1));
        assert_eq!(app.company_name, "Acme");
    }

    #[test]
    fn parse_create_requires_assigned_id() {
        let body = r#"[{"company_name":"A","job_title":"t","application_date":"2024-01-10","status":"Draft"}]"#;
        let err = client().parse_create(ok(201, body)).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
        assert!(client().parse_create(ok(201, &format!("[{ROW}]"))).is_ok());
    }

    #[test]
    fn parse_update_zero_rows_is_not_found() {
        let err = client().parse_update(ok(200, "[]")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn store_error_keeps_code_and_message() {
        let body = r#"{"code":"23502","message":"null value in column \"company_name\"","details":null,"hint":null}"#;
        let err = client().parse_create(ok(400, body)).unwrap_err();
        match err {
            ApiError::Store { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("23502"));
                assert!(message.contains("company_name"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_is_kept_verbatim() {
        let err = client().parse_list(ok(502, "bad gateway")).unwrap_err();
        assert!(matches!(err, ApiError::Store { status: 502, code: None, ref message } if message == "bad gateway"));
    }

    #[test]
    fn parse_delete_accepts_no_content() {
        assert!(client().parse_delete(ok(204, "")).is_ok());
    }

    #[test]
    fn parse_list_bad_json() {
        let err = client().parse_list(ok(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
