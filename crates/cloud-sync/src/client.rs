//! REST client for the cloud relational store (PostgREST-flavored surface).
//!
//! Rows travel snake_case; every response is classified into the closed
//! `StoreError` taxonomy before it reaches a caller.

use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use matchops_core::config::{cloud_endpoint, cloud_public_key};
use matchops_core::{Result, StoreError};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Postgres serialization-failure class; the sole trigger for `CONFLICT`.
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// Postgres unique-violation; surfaces as `ALREADY_EXISTS`.
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

pub(crate) fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after_secs: Option<u64>,
) -> StoreError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let sqlstate = parsed.as_ref().and_then(|b| b.code.clone());
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone().or_else(|| b.details.clone()))
        .unwrap_or_else(|| body.chars().take(MAX_LOG_BODY_CHARS).collect());

    match sqlstate.as_deref() {
        Some(SQLSTATE_SERIALIZATION_FAILURE) => {
            return StoreError::conflict(String::new(), None);
        }
        Some(SQLSTATE_UNIQUE_VIOLATION) => {
            return StoreError::already_exists("record", message);
        }
        _ => {}
    }

    match status.as_u16() {
        401 | 403 => StoreError::Auth(message),
        409 => StoreError::already_exists("record", message),
        429 => StoreError::RateLimited {
            retry_after_secs: retry_after_secs.or(Some(1)),
        },
        408 | 500..=599 => StoreError::Network(format!("server error ({status}): {message}")),
        _ => StoreError::Backend(format!("unexpected response ({status}): {message}")),
    }
}

fn classify_transport(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        StoreError::Network(format!("transport error: {err}"))
    } else {
        StoreError::Backend(format!("http error: {err}"))
    }
}

fn log_response(status: StatusCode, body: &str) {
    if status.is_success() {
        debug!("API response status: {}", status);
        return;
    }
    let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    debug!("API response error ({}): {}", status, preview);
}

/// Client for the cloud REST surface.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CloudClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Build from `CLOUD_ENDPOINT` / `CLOUD_PUBLIC_KEY`.
    pub fn from_env() -> Result<Self> {
        let endpoint = cloud_endpoint()
            .ok_or_else(|| StoreError::Validation("CLOUD_ENDPOINT is not configured".into()))?;
        let key = cloud_public_key()
            .ok_or_else(|| StoreError::Validation("CLOUD_PUBLIC_KEY is not configured".into()))?;
        Ok(Self::new(&endpoint, &key))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self, token: &str, prefer: Option<&'static str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| StoreError::Auth("invalid API key format".into()))?,
        );
        let auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| StoreError::Auth("invalid access token format".into()))?;
        headers.insert(AUTHORIZATION, auth_value);
        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer));
        }
        Ok(headers)
    }

    async fn parse_rows<T: DeserializeOwned>(response: reqwest::Response) -> Result<Vec<T>> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.map_err(classify_transport)?;
        log_response(status, &body);

        if !status.is_success() {
            return Err(classify_status(status, &body, retry_after));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|err| {
            StoreError::Backend(format!("failed to parse response rows: {err}"))
        })
    }

    /// `GET /rest/v1/{table}?{query}`
    pub async fn select<T: DeserializeOwned>(
        &self,
        token: &str,
        table: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .http
            .get(self.table_url(table))
            .headers(self.headers(token, None)?)
            .query(query)
            .send()
            .await
            .map_err(classify_transport)?;
        Self::parse_rows(response).await
    }

    /// `POST /rest/v1/{table}` returning the inserted row.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        token: &str,
        table: &str,
        row: &T,
    ) -> Result<R> {
        let response = self
            .http
            .post(self.table_url(table))
            .headers(self.headers(token, Some("return=representation"))?)
            .json(row)
            .send()
            .await
            .map_err(classify_transport)?;
        let mut rows: Vec<R> = Self::parse_rows(response).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Backend("insert returned no representation".into()))
    }

    /// `POST /rest/v1/{table}` with an array body; returns the inserted rows.
    pub async fn insert_many<T: Serialize, R: DeserializeOwned>(
        &self,
        token: &str,
        table: &str,
        rows: &[T],
    ) -> Result<Vec<R>> {
        let response = self
            .http
            .post(self.table_url(table))
            .headers(self.headers(token, Some("return=representation"))?)
            .json(rows)
            .send()
            .await
            .map_err(classify_transport)?;
        Self::parse_rows(response).await
    }

    /// `POST /rest/v1/{table}` with merge-duplicates resolution.
    pub async fn upsert<T: Serialize, R: DeserializeOwned>(
        &self,
        token: &str,
        table: &str,
        row: &T,
    ) -> Result<R> {
        let response = self
            .http
            .post(self.table_url(table))
            .headers(self.headers(
                token,
                Some("resolution=merge-duplicates,return=representation"),
            )?)
            .json(row)
            .send()
            .await
            .map_err(classify_transport)?;
        let mut rows: Vec<R> = Self::parse_rows(response).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Backend("upsert returned no representation".into()))
    }

    /// `PATCH /rest/v1/{table}?{query}` returning the affected rows.
    /// An empty result means the filter matched nothing.
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        token: &str,
        table: &str,
        query: &[(String, String)],
        patch: &T,
    ) -> Result<Vec<R>> {
        let response = self
            .http
            .patch(self.table_url(table))
            .headers(self.headers(token, Some("return=representation"))?)
            .query(query)
            .json(patch)
            .send()
            .await
            .map_err(classify_transport)?;
        Self::parse_rows(response).await
    }

    /// `DELETE /rest/v1/{table}?{query}`; returns how many rows went away.
    pub async fn delete(
        &self,
        token: &str,
        table: &str,
        query: &[(String, String)],
    ) -> Result<usize> {
        let response = self
            .http
            .delete(self.table_url(table))
            .headers(self.headers(token, Some("return=representation"))?)
            .query(query)
            .send()
            .await
            .map_err(classify_transport)?;
        let rows: Vec<serde_json::Value> = Self::parse_rows(response).await?;
        Ok(rows.len())
    }

    /// `POST /rest/v1/rpc/{function}` for server-side procedures.
    pub async fn rpc(
        &self,
        token: &str,
        function: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let response = self
            .http
            .post(url)
            .headers(self.headers(token, None)?)
            .json(args)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        log_response(status, &body);
        if !status.is_success() {
            return Err(classify_status(status, &body, None));
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|err| StoreError::Backend(format!("failed to parse rpc response: {err}")))
    }
}

/// `eq.` filter helper for query strings.
pub(crate) fn eq(column: &str, value: &str) -> (String, String) {
    (column.to_string(), format!("eq.{value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_failure_class_maps_to_conflict() {
        let err = classify_status(
            StatusCode::CONFLICT,
            r#"{"code":"40001","message":"could not serialize access"}"#,
            None,
        );
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn unique_violation_maps_to_already_exists() {
        let err = classify_status(
            StatusCode::CONFLICT,
            r#"{"code":"23505","message":"duplicate key value"}"#,
            None,
        );
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[test]
    fn auth_statuses_map_to_auth() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "{}", None);
        assert_eq!(err.code(), "AUTH");
        let err = classify_status(StatusCode::FORBIDDEN, "{}", None);
        assert_eq!(err.code(), "AUTH");
    }

    #[test]
    fn throttle_keeps_server_hint() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "{}", Some(12));
        match err {
            StoreError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(12));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom", None);
        assert_eq!(err.code(), "NETWORK");
        assert!(err.is_transient());
    }

    #[test]
    fn unrecognized_statuses_fall_back_to_backend() {
        let err = classify_status(StatusCode::IM_A_TEAPOT, "{}", None);
        assert_eq!(err.code(), "BACKEND");
    }
}
