//! HTTP client for the GARM REST API

use crate::error::{ClientError, Result};
use crate::traits::{InstanceClient, PoolClient};
use async_trait::async_trait;
use garm_types::{CreatePoolParams, GarmPool, Instance, UpdatePoolParams};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for [`HttpGarmClient`]
#[derive(Debug, Clone)]
pub struct GarmClientConfig {
    /// Base URL, e.g. `http://garm:9997`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Pre-issued JWT; skips the login call when set
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Error body returned by the backend
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    details: String,
}

/// Authenticated client for the backend
pub struct HttpGarmClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpGarmClient {
    /// Create a client around an existing bearer token
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(ClientError::Config("empty GARM server URL".into()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Log in with username/password unless a token is configured
    pub async fn connect(config: &GarmClientConfig) -> Result<Self> {
        if let Some(token) = &config.token {
            return Self::new(&config.base_url, token.clone(), config.timeout);
        }

        let mut client = Self::new(&config.base_url, String::new(), config.timeout)?;
        let response: LoginResponse = client
            .post(
                "/api/v1/auth/login",
                &LoginRequest {
                    username: &config.username,
                    password: &config.password,
                },
            )
            .await?;
        client.token = response.token;

        tracing::info!(url = %client.base_url, "Authenticated against GARM");
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========== Internal HTTP helpers ==========

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = self.check(path, response).await?;
        Ok(response.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let response = self.check(path, response).await?;
        Ok(response.json().await?)
    }

    async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let response = self.check(path, response).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        self.check(path, response).await?;
        Ok(())
    }

    async fn check(&self, path: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) if !body.details.is_empty() => body.details,
            Ok(body) if !body.error.is_empty() => body.error,
            _ => text,
        };

        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(format!("{}: {}", path, message))),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized(message)),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait]
impl PoolClient for HttpGarmClient {
    async fn list_pools(&self) -> Result<Vec<GarmPool>> {
        self.get("/api/v1/pools").await
    }

    async fn get_pool(&self, pool_id: &str) -> Result<GarmPool> {
        self.get(&format!("/api/v1/pools/{}", pool_id)).await
    }

    async fn create_enterprise_pool(
        &self,
        enterprise_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.post(&format!("/api/v1/enterprises/{}/pools", enterprise_id), params)
            .await
    }

    async fn create_organization_pool(
        &self,
        organization_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.post(
            &format!("/api/v1/organizations/{}/pools", organization_id),
            params,
        )
        .await
    }

    async fn create_repository_pool(
        &self,
        repository_id: &str,
        params: &CreatePoolParams,
    ) -> Result<GarmPool> {
        self.post(&format!("/api/v1/repositories/{}/pools", repository_id), params)
            .await
    }

    async fn update_pool(&self, pool_id: &str, params: &UpdatePoolParams) -> Result<GarmPool> {
        self.put(&format!("/api/v1/pools/{}", pool_id), params).await
    }

    async fn delete_pool(&self, pool_id: &str) -> Result<()> {
        self.delete(&format!("/api/v1/pools/{}", pool_id)).await
    }
}

#[async_trait]
impl InstanceClient for HttpGarmClient {
    async fn list_pool_instances(&self, pool_id: &str) -> Result<Vec<Instance>> {
        self.get(&format!("/api/v1/pools/{}/instances", pool_id))
            .await
    }

    async fn get_instance_by_name(&self, name: &str) -> Result<Instance> {
        self.get(&format!("/api/v1/instances/{}", name)).await
    }

    async fn delete_instance(&self, name: &str) -> Result<()> {
        self.delete(&format!("/api/v1/instances/{}", name)).await
    }
}
