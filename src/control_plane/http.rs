//! # HTTP control-plane client.
//!
//! ## Contract
//! ```text
//! GET  {base}{server_info}  → { "server_scaling_required": bool }
//! POST {base}{create}       { "serverKey": secret }   → { username, email, password, deleteToken }
//! POST {base}{delete}       { "deleteToken": token }  → (ignored)
//! ```
//! Any non-2xx answer is a [`ControlPlaneError::Status`]; transport failures are
//! [`ControlPlaneError::Network`]. Both are retried by the orchestrator on its next tick.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ControlPlane, Credential};
use crate::error::ControlPlaneError;

const SERVER_INFO: &str = "serverInfo";
const CREATE: &str = "create";
const DELETE: &str = "delete";

/// Endpoint paths, relative to the base URL.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub server_info: String,
    pub create: String,
    pub delete: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            server_info: "/bettermomentum/matchmaker/serverInfo".into(),
            create: "/bettermomentum/serveraccount/create".into(),
            delete: "/bettermomentum/serveraccount/delete".into(),
        }
    }
}

#[derive(Deserialize)]
struct ServerInfo {
    server_scaling_required: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    server_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    delete_token: &'a str,
}

/// [`ControlPlane`] over HTTP/JSON.
#[derive(Clone, Debug)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
    secret: String,
    endpoints: Endpoints,
}

impl HttpControlPlane {
    /// Creates a client with a per-request `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ControlPlaneError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlPlaneError::Network {
                endpoint: "client",
                error: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            endpoints: Endpoints::default(),
        })
    }

    /// Overrides the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(
        endpoint: &'static str,
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, ControlPlaneError> {
        let resp = resp.map_err(|e| ControlPlaneError::Network {
            endpoint,
            error: e.to_string(),
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ControlPlaneError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        endpoint: &'static str,
        resp: reqwest::Response,
    ) -> Result<T, ControlPlaneError> {
        let bytes = resp.bytes().await.map_err(|e| ControlPlaneError::Network {
            endpoint,
            error: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ControlPlaneError::Decode {
            endpoint,
            error: e.to_string(),
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn poll_demand(&self) -> Result<bool, ControlPlaneError> {
        let resp = self
            .client
            .get(self.url(&self.endpoints.server_info))
            .send()
            .await;
        let resp = Self::check(SERVER_INFO, resp).await?;
        let info: ServerInfo = Self::decode(SERVER_INFO, resp).await?;
        debug!(required = info.server_scaling_required, "demand polled");
        Ok(info.server_scaling_required)
    }

    async fn provision_credential(&self) -> Result<Credential, ControlPlaneError> {
        let resp = self
            .client
            .post(self.url(&self.endpoints.create))
            .json(&CreateRequest {
                server_key: &self.secret,
            })
            .send()
            .await;
        let resp = Self::check(CREATE, resp).await?;
        Self::decode(CREATE, resp).await
    }

    async fn revoke_credential(&self, credential: Credential) -> Result<(), ControlPlaneError> {
        let resp = self
            .client
            .post(self.url(&self.endpoints.delete))
            .json(&DeleteRequest {
                delete_token: &credential.delete_token,
            })
            .send()
            .await;
        Self::check(DELETE, resp).await.map(|_| ())
    }
}
