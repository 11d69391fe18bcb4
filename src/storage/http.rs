// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! REST adapter for the hosted store.
//!
//! ## Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | select | `GET  {base}/rest/v1/{table}?{key}=eq.{value}&select=*` |
//! | upsert | `POST {base}/rest/v1/{table}?on_conflict={key}` |
//! | sign | `POST {base}/storage/v1/object/sign/{bucket}/{path}` |
//! | upload | `POST {base}/storage/v1/object/{bucket}/{path}` |
//! | public | `{base}/storage/v1/object/public/{bucket}/{path}` |
//!
//! The `reqwest::Client` comes from the session layer, already configured
//! for the current user.

use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::repository::{BlobRepository, SignedUrl};
use super::{expiry_after, RemoteError, RemoteResult, RemoteTable, Row};

const API_KEY_HEADER: &str = "apikey";
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";
const MAX_ERROR_BODY: usize = 200;

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// HTTP client for the table and storage endpoints.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base: Url,
    api_key: String,
    access_token: Option<String>,
}

impl HttpStore {
    pub fn new(client: Client, base: Url, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base,
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Authorize requests as the signed-in user.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("invalid base URL {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_endpoint(&self, route: &[&str], bucket: &str, path: &str) -> RemoteResult<Url> {
        let segments = route
            .iter()
            .copied()
            .chain(std::iter::once(bucket))
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }

    pub(crate) fn select_url(&self, table: &str, key: &str, value: &str) -> RemoteResult<Url> {
        let mut url = self.endpoint(["rest", "v1", table])?;
        url.query_pairs_mut()
            .append_pair(key, &format!("eq.{value}"))
            .append_pair("select", "*");
        Ok(url)
    }

    pub(crate) fn upsert_url(&self, table: &str, key: &str) -> RemoteResult<Url> {
        let mut url = self.endpoint(["rest", "v1", table])?;
        url.query_pairs_mut().append_pair("on_conflict", key);
        Ok(url)
    }

    pub(crate) fn sign_url(&self, bucket: &str, path: &str) -> RemoteResult<Url> {
        self.object_endpoint(&["storage", "v1", "object", "sign"], bucket, path)
    }

    pub(crate) fn upload_url(&self, bucket: &str, path: &str) -> RemoteResult<Url> {
        self.object_endpoint(&["storage", "v1", "object"], bucket, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(API_KEY_HEADER, &self.api_key);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request.bearer_auth(&self.api_key),
        }
    }

    /// Absolute URL for the relative `signedURL` the storage API returns.
    fn absolute_signed_url(&self, relative: &str) -> String {
        format!(
            "{}/storage/v1/{}",
            self.base.as_str().trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Map a failed storage response, keeping "missing" and "refused" apart.
pub(crate) fn classify_storage_status(code: u16, body: &str, path: &str) -> RemoteError {
    match code {
        401 | 403 => RemoteError::Denied(path.to_string()),
        404 => RemoteError::NotFound(path.to_string()),
        // The storage API reports missing objects as 400 with a message.
        400 if body.to_ascii_lowercase().contains("not found") => {
            RemoteError::NotFound(path.to_string())
        }
        _ => RemoteError::Status {
            code,
            message: truncate(body),
        },
    }
}

async fn error_body(response: Response) -> (u16, String) {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (code, body)
}

async fn check_table(response: Response) -> RemoteResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let (code, body) = error_body(response).await;
    Err(RemoteError::Status {
        code,
        message: truncate(&body),
    })
}

async fn check_storage(response: Response, path: &str) -> RemoteResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let (code, body) = error_body(response).await;
    Err(classify_storage_status(code, &body, path))
}

impl RemoteTable for HttpStore {
    async fn select_one(&self, table: &str, key: &str, value: &str) -> RemoteResult<Option<Row>> {
        let url = self.select_url(table, key, value)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;
        let rows: Vec<Row> = check_table(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, table: &str, key: &str, row: Row) -> RemoteResult<()> {
        let url = self.upsert_url(table, key)?;
        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&[row])
            .send()
            .await
            .map_err(transport)?;
        check_table(response).await?;
        Ok(())
    }
}

impl BlobRepository for HttpStore {
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> RemoteResult<SignedUrl> {
        let url = self.sign_url(bucket, path)?;
        let requested_at = Utc::now();
        let response = self
            .authorize(self.client.post(url))
            .json(&json!({ "expiresIn": ttl_secs }))
            .send()
            .await
            .map_err(transport)?;
        let signed: SignResponse = check_storage(response, path)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(SignedUrl {
            url: self.absolute_signed_url(&signed.signed_url),
            // Counted from before the request so we never overstate the window.
            expires_at: expiry_after(requested_at, ttl_secs),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.object_endpoint(&["storage", "v1", "object", "public"], bucket, path)
            .map(String::from)
            .unwrap_or_else(|_| {
                format!(
                    "{}/storage/v1/object/public/{bucket}/{path}",
                    self.base.as_str().trim_end_matches('/')
                )
            })
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> RemoteResult<()> {
        let url = self.upload_url(bucket, path)?;
        let response = self
            .authorize(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::CONFLICT {
            return Err(RemoteError::Status {
                code: StatusCode::CONFLICT.as_u16(),
                message: format!("{path} already exists"),
            });
        }
        check_storage(response, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpStore {
        HttpStore::new(
            Client::new(),
            Url::parse("https://project.example.co").unwrap(),
            "anon-key",
        )
    }

    #[test]
    fn select_url_filters_by_key() {
        let url = store().select_url("profiles", "id", "user 1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/profiles?id=eq.user+1&select=*"
        );
    }

    #[test]
    fn upsert_url_names_conflict_column() {
        let url = store().upsert_url("profiles", "id").unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/profiles?on_conflict=id"
        );
    }

    #[test]
    fn object_urls_keep_folders_and_encode_segments() {
        let url = store()
            .sign_url("voy_secure_docs", "u123/tarjeta sanitaria.pdf")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/storage/v1/object/sign/voy_secure_docs/u123/tarjeta%20sanitaria.pdf"
        );
    }

    #[test]
    fn base_path_prefix_is_preserved() {
        let store = HttpStore::new(
            Client::new(),
            Url::parse("https://gateway.example.com/store/").unwrap(),
            "k",
        );
        assert_eq!(
            store.upload_url("voy_documents", "a.png").unwrap().as_str(),
            "https://gateway.example.com/store/storage/v1/object/voy_documents/a.png"
        );
    }

    #[test]
    fn public_url_uses_public_route() {
        assert_eq!(
            store().public_url("voy_documents", "u1/a.png"),
            "https://project.example.co/storage/v1/object/public/voy_documents/u1/a.png"
        );
    }

    #[test]
    fn relative_signed_url_is_made_absolute() {
        assert_eq!(
            store().absolute_signed_url("/object/sign/voy_secure_docs/a.pdf?token=t"),
            "https://project.example.co/storage/v1/object/sign/voy_secure_docs/a.pdf?token=t"
        );
    }

    #[test]
    fn storage_statuses_keep_missing_and_denied_apart() {
        assert_eq!(
            classify_storage_status(404, "", "a.pdf"),
            RemoteError::NotFound("a.pdf".to_string())
        );
        assert_eq!(
            classify_storage_status(400, r#"{"error":"Object not found"}"#, "a.pdf"),
            RemoteError::NotFound("a.pdf".to_string())
        );
        assert_eq!(
            classify_storage_status(403, "", "a.pdf"),
            RemoteError::Denied("a.pdf".to_string())
        );
        assert!(matches!(
            classify_storage_status(500, "oops", "a.pdf"),
            RemoteError::Status { code: 500, .. }
        ));
    }
}
