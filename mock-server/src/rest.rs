//! The `job_applications` table, served with PostgREST conventions:
//! `col=eq.value` filters, `order=col.asc|desc`, and
//! `Prefer: return=representation` to echo affected rows.

use std::{cmp::Ordering, collections::HashMap};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{Backend, Reject};

const STATUSES: [&str; 8] = [
    "Draft",
    "Applied",
    "In Progress",
    "Interview",
    "Offer",
    "Accepted",
    "Rejected",
    "Withdrawn",
];

/// NOT NULL columns. Like Postgres, an empty string satisfies the constraint;
/// blank names are the client's to reject.
const REQUIRED: [&str; 4] = ["company_name", "job_title", "application_date", "status"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRow {
    pub id: i64,
    pub company_name: String,
    pub job_title: String,
    pub job_description: Option<String>,
    pub application_date: String,
    pub resume_version: Option<String>,
    pub cover_letter_version: Option<String>,
    pub status: String,
    pub credentials_used: Option<String>,
    pub notes: Option<String>,
    pub last_updated: Option<String>,
}

fn wants_representation(headers: &HeaderMap) -> bool {
    headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("return=representation"))
}

fn bad_request(code: &str, message: String) -> Reject {
    Reject::new(
        StatusCode::BAD_REQUEST,
        json!({ "code": code, "message": message, "details": null, "hint": null }),
    )
}

/// Validate a column map against the table's constraints and build a row.
fn to_row(id: i64, mut fields: Map<String, Value>) -> Result<ApplicationRow, Reject> {
    for column in REQUIRED {
        if fields.get(column).map_or(true, Value::is_null) {
            return Err(bad_request(
                "23502",
                format!("null value in column \"{column}\" of relation \"job_applications\" violates not-null constraint"),
            ));
        }
    }
    if let Some(status) = fields.get("status").and_then(Value::as_str) {
        if !STATUSES.contains(&status) {
            return Err(bad_request(
                "23514",
                "new row for relation \"job_applications\" violates check constraint \"job_applications_status_check\"".to_string(),
            ));
        }
    }
    fields.insert("id".to_string(), json!(id));
    serde_json::from_value(Value::Object(fields)).map_err(|e| bad_request("22P02", e.to_string()))
}

/// Apply every `col=eq.value` pair in the query string.
fn matches_filters(row: &ApplicationRow, params: &HashMap<String, String>) -> bool {
    let row = match serde_json::to_value(row) {
        Ok(Value::Object(map)) => map,
        _ => return false,
    };
    params
        .iter()
        .filter(|(key, _)| key.as_str() != "select" && key.as_str() != "order")
        .all(|(column, expr)| {
            let Some(expected) = expr.strip_prefix("eq.") else {
                return false;
            };
            match row.get(column) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => n.to_string() == expected,
                _ => false,
            }
        })
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn apply_order(rows: &mut [ApplicationRow], order: Option<&String>) {
    let Some(order) = order else {
        return;
    };
    let (column, descending) = match order.rsplit_once('.') {
        Some((column, "desc")) => (column, true),
        Some((column, "asc")) => (column, false),
        _ => (order.as_str(), false),
    };
    rows.sort_by(|a, b| {
        let a = serde_json::to_value(a).unwrap_or_default();
        let b = serde_json::to_value(b).unwrap_or_default();
        let ordering = compare(&a[column], &b[column]);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn selected(backend_rows: impl Iterator<Item = ApplicationRow>, params: &HashMap<String, String>) -> Vec<ApplicationRow> {
    backend_rows.filter(|row| matches_filters(row, params)).collect()
}

pub(crate) async fn select(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ApplicationRow>>, Reject> {
    backend.authorize(&headers).await?;
    let state = backend.state.read().await;
    let mut rows = selected(state.rows.values().cloned(), &params);
    apply_order(&mut rows, params.get("order"));
    Ok(Json(rows))
}

/// Accepts a single object or an array of objects; all rows are validated
/// before any is stored.
pub(crate) async fn insert(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, Reject> {
    backend.authorize(&headers).await?;
    let objects = match body {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut state = backend.state.write().await;
    let mut created = Vec::with_capacity(objects.len());
    for (offset, object) in objects.into_iter().enumerate() {
        let Value::Object(fields) = object else {
            return Err(bad_request("PGRST102", "All object keys must match".to_string()));
        };
        created.push(to_row(state.next_id + 1 + offset as i64, fields)?);
    }
    for row in &created {
        state.next_id = state.next_id.max(row.id);
        state.rows.insert(row.id, row.clone());
    }
    tracing::debug!(count = created.len(), "inserted rows");
    if wants_representation(&headers) {
        Ok((StatusCode::CREATED, Json(created)).into_response())
    } else {
        Ok(StatusCode::CREATED.into_response())
    }
}

/// Merges the supplied columns into every matching row; other columns keep
/// their values.
pub(crate) async fn update(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Map<String, Value>>,
) -> Result<Response, Reject> {
    backend.authorize(&headers).await?;
    let mut state = backend.state.write().await;
    let targets: Vec<i64> = selected(state.rows.values().cloned(), &params)
        .into_iter()
        .map(|row| row.id)
        .collect();

    let mut updated = Vec::with_capacity(targets.len());
    for id in targets {
        let Some(current) = state.rows.get(&id) else {
            continue;
        };
        let Ok(Value::Object(mut fields)) = serde_json::to_value(current) else {
            continue;
        };
        for (column, value) in &body {
            if column == "id" {
                continue;
            }
            if !fields.contains_key(column) {
                return Err(bad_request(
                    "PGRST204",
                    format!("Could not find the '{column}' column of 'job_applications' in the schema cache"),
                ));
            }
            fields.insert(column.clone(), value.clone());
        }
        updated.push(to_row(id, fields)?);
    }
    for row in &updated {
        state.rows.insert(row.id, row.clone());
    }
    if wants_representation(&headers) {
        Ok(Json(updated).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

pub(crate) async fn delete(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, Reject> {
    backend.authorize(&headers).await?;
    let mut state = backend.state.write().await;
    let removed: Vec<ApplicationRow> = selected(state.rows.values().cloned(), &params)
        .into_iter()
        .filter_map(|row| state.rows.remove(&row.id))
        .collect();
    if wants_representation(&headers) {
        Ok(Json(removed).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, date: &str, status: &str) -> ApplicationRow {
        ApplicationRow {
            id,
            company_name: "Acme".to_string(),
            job_title: "Engine Dev".to_string(),
            job_description: None,
            application_date: date.to_string(),
            resume_version: None,
            cover_letter_version: None,
            status: status.to_string(),
            credentials_used: None,
            notes: None,
            last_updated: None,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn filters_on_equality() {
        let r = row(4, "2024-01-01", "In Progress");
        assert!(matches_filters(&r, &params(&[("select", "*"), ("id", "eq.4")])));
        assert!(matches_filters(&r, &params(&[("status", "eq.In Progress")])));
        assert!(!matches_filters(&r, &params(&[("id", "eq.5")])));
        assert!(!matches_filters(&r, &params(&[("id", "gt.1")])));
    }

    #[test]
    fn orders_descending_by_column() {
        let mut rows = vec![
            row(1, "2024-01-01", "Draft"),
            row(2, "2024-03-01", "Draft"),
            row(3, "2023-12-31", "Draft"),
        ];
        apply_order(&mut rows, Some(&"application_date.desc".to_string()));
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn missing_required_column_is_not_null_violation() {
        let fields = json!({ "job_title": "x", "application_date": "2024-01-01", "status": "Draft" });
        let Value::Object(fields) = fields else { unreachable!() };
        let err = to_row(1, fields).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body["code"], "23502");
    }

    #[test]
    fn unknown_status_violates_check() {
        let fields = json!({
            "company_name": "a", "job_title": "x", "application_date": "2024-01-01", "status": "Ghosted"
        });
        let Value::Object(fields) = fields else { unreachable!() };
        assert_eq!(to_row(1, fields).unwrap_err().body["code"], "23514");
    }
}
