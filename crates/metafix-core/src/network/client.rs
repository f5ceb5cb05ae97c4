//! HTTP client for the DHIS2 Web API.
//!
//! Implements [`RemoteStore`] over three endpoints:
//! - `GET /api/metadata.json?filter=...` for the candidate scan
//! - `GET /api/<type>.json?filter=<field>:eq:<value>&filter=id:!eq:<id>` for collision lookups
//! - `PATCH /api/<type>/<id>` with a JSON-Patch body for repairs

use crate::config::{CollectionType, Credentials, NetworkConfig, ScanConfig, ServerConfig};
use crate::error::{MetafixError, Result};
use crate::model::{Field, ObjectRef, PatchOperation};
use crate::store::{RemoteStore, ScanQuery};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

/// Client for one DHIS2 instance.
pub struct Dhis2Client {
    config: ServerConfig,
    client: Client,
}

impl Dhis2Client {
    /// Create a client for the configured server.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| MetafixError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { config, client })
    }

    /// URL of one scan query.
    pub fn scan_url(&self, query: &ScanQuery) -> String {
        format!(
            "{}/api/metadata.json?filter={}&fields={}",
            self.config.base(),
            query.filter(),
            ScanConfig::FIELDS_PARAM
        )
    }

    /// URL of an equality lookup excluding the record itself.
    pub fn lookup_url(
        &self,
        kind: CollectionType,
        field: Field,
        value: &str,
        exclude_id: &str,
    ) -> String {
        format!(
            "{}/api/{}.json?filter={}:eq:{}&filter=id:!eq:{}&fields=id,{}",
            self.config.base(),
            kind.as_str(),
            field.as_str(),
            urlencoding::encode(value),
            urlencoding::encode(exclude_id),
            field.as_str()
        )
    }

    /// URL of a single record.
    pub fn object_url(&self, kind: CollectionType, id: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.config.base(),
            kind.as_str(),
            urlencoding::encode(id)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Token(token) => {
                request.header(header::AUTHORIZATION, format!("ApiToken {}", token))
            }
        }
    }

    fn send_error(&self, method: &str, url: &str, err: reqwest::Error) -> MetafixError {
        if err.is_timeout() {
            return MetafixError::Timeout(self.config.request_timeout);
        }
        MetafixError::Network {
            message: format!("{} {} failed: {}", method, url, err),
            source: Some(err),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(url))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.send_error("GET", url, e))?;

        let response = check_status("GET", url, response).await?;
        response.json().await.map_err(|e| MetafixError::Json {
            message: format!("Failed to parse response from {}: {}", url, e),
            source: None,
        })
    }
}

#[async_trait]
impl RemoteStore for Dhis2Client {
    async fn scan(&self, query: &ScanQuery) -> Result<Value> {
        self.get_json(&self.scan_url(query)).await
    }

    async fn find_matching(
        &self,
        kind: CollectionType,
        field: Field,
        value: &str,
        exclude_id: &str,
    ) -> Result<Vec<ObjectRef>> {
        let url = self.lookup_url(kind, field, value, exclude_id);
        let body = self.get_json(&url).await?;

        let Some(records) = body.get(kind.as_str()) else {
            return Ok(Vec::new());
        };
        let matches: Vec<ObjectRef> = serde_json::from_value(records.clone())?;
        Ok(matches)
    }

    async fn patch(
        &self,
        kind: CollectionType,
        id: &str,
        operations: &[PatchOperation],
    ) -> Result<()> {
        let url = self.object_url(kind, id);
        debug!("PATCH {} ({} operations)", url, operations.len());

        let body = serde_json::to_vec(operations)?;
        let response = self
            .authorize(self.client.patch(&url))
            .header(header::CONTENT_TYPE, NetworkConfig::PATCH_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| self.send_error("PATCH", &url, e))?;

        check_status("PATCH", &url, response).await?;
        Ok(())
    }
}

async fn check_status(method: &'static str, url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(MetafixError::HttpStatus {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
