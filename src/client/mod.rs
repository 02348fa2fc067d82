//! Service endpoint REST client
//!
//! [`ServiceEndpointApi`] is the seam between the resource lifecycle and the
//! remote platform; [`HttpServiceEndpointClient`] implements it over
//! `reqwest` with personal access token authentication.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::RemoteSettings;
use crate::models::service_endpoint::{ServiceEndpoint, ServiceEndpointList};
use crate::secrets::SecretString;

const ENDPOINTS_PATH: &str = "_apis/serviceendpoint/endpoints";
const MAX_BODY_SNIPPET_CHARS: usize = 200;

/// Errors raised while talking to the remote API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("service endpoint not found")]
    NotFound,

    #[error("API request failed with status {status}: {body_snippet}")]
    Http { status: u16, body_snippet: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON serialization/deserialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}

/// Truncate an upstream body to at most 200 characters (not bytes).
pub fn body_snippet(body: &str) -> String {
    if body.chars().count() > MAX_BODY_SNIPPET_CHARS {
        let truncated: String = body.chars().take(MAX_BODY_SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

/// Generic service endpoint CRUD surface.
#[async_trait]
pub trait ServiceEndpointApi: Send + Sync {
    async fn create(&self, endpoint: &ServiceEndpoint) -> Result<ServiceEndpoint, ClientError>;

    /// `Ok(None)` when the endpoint does not exist in the project.
    async fn get(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Option<ServiceEndpoint>, ClientError>;

    /// Look up an endpoint by display name within a project.
    async fn find_by_name(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Option<ServiceEndpoint>, ClientError>;

    async fn update(
        &self,
        endpoint_id: Uuid,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ClientError>;

    /// Fails with [`ClientError::NotFound`] when nothing was deleted.
    async fn delete(&self, project_id: Uuid, endpoint_id: Uuid) -> Result<(), ClientError>;
}

/// HTTP implementation of [`ServiceEndpointApi`].
#[derive(Clone)]
pub struct HttpServiceEndpointClient {
    http: reqwest::Client,
    org_url: Url,
    personal_access_token: SecretString,
    api_version: String,
}

impl HttpServiceEndpointClient {
    pub fn new(
        org_service_url: &str,
        personal_access_token: SecretString,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            org_url: Url::parse(org_service_url)?,
            personal_access_token,
            api_version: api_version.to_string(),
        })
    }

    pub fn from_settings(settings: &RemoteSettings) -> Result<Self, ClientError> {
        Self::new(
            &settings.org_service_url,
            settings.personal_access_token.clone(),
            &settings.api_version,
            settings.request_timeout,
        )
    }

    /// `{org}[/{project}]/_apis/serviceendpoint/endpoints[/{id}]?api-version=...`
    fn endpoints_url(
        &self,
        project_id: Option<Uuid>,
        endpoint_id: Option<Uuid>,
    ) -> Result<Url, ClientError> {
        let mut path = self.org_url.path().trim_end_matches('/').to_string();
        if let Some(project_id) = project_id {
            path.push('/');
            path.push_str(&project_id.to_string());
        }
        path.push('/');
        path.push_str(ENDPOINTS_PATH);
        if let Some(endpoint_id) = endpoint_id {
            path.push('/');
            path.push_str(&endpoint_id.to_string());
        }

        let mut url = self.org_url.clone();
        url.set_path(&path);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth("", Some(self.personal_access_token.expose()))
            .header("accept", "application/json")
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body_snippet: body_snippet(&body),
            });
        }
        Ok(response)
    }

    /// Parse a body that may legitimately be empty or `null`.
    async fn optional_endpoint(response: Response) -> Result<Option<ServiceEndpoint>, ClientError> {
        let body = response.text().await?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }
        let endpoint: ServiceEndpoint = serde_json::from_str(trimmed)?;
        Ok(endpoint.id.map(|_| endpoint))
    }
}

#[async_trait]
impl ServiceEndpointApi for HttpServiceEndpointClient {
    async fn create(&self, endpoint: &ServiceEndpoint) -> Result<ServiceEndpoint, ClientError> {
        let url = self.endpoints_url(None, None)?;
        debug!(%url, name = ?endpoint.name, "creating service endpoint");

        let response = self
            .authorized(self.http.post(url))
            .json(endpoint)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn get(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Option<ServiceEndpoint>, ClientError> {
        let url = self.endpoints_url(Some(project_id), Some(endpoint_id))?;
        debug!(%url, "reading service endpoint");

        let response = self.authorized(self.http.get(url)).send().await?;
        match Self::check(response).await {
            Ok(response) => Self::optional_endpoint(response).await,
            Err(ClientError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn find_by_name(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Option<ServiceEndpoint>, ClientError> {
        let mut url = self.endpoints_url(Some(project_id), None)?;
        url.query_pairs_mut().append_pair("endpointNames", name);
        debug!(%url, "looking up service endpoint by name");

        let response = self.authorized(self.http.get(url)).send().await?;
        let response = match Self::check(response).await {
            Ok(response) => response,
            Err(ClientError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };
        let list: ServiceEndpointList = response.json().await?;
        Ok(list.value.into_iter().find(|endpoint| {
            endpoint
                .name
                .as_deref()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
        }))
    }

    async fn update(
        &self,
        endpoint_id: Uuid,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ClientError> {
        let url = self.endpoints_url(None, Some(endpoint_id))?;
        debug!(%url, "updating service endpoint");

        let response = self
            .authorized(self.http.put(url))
            .json(endpoint)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, project_id: Uuid, endpoint_id: Uuid) -> Result<(), ClientError> {
        let mut url = self.endpoints_url(None, Some(endpoint_id))?;
        url.query_pairs_mut()
            .append_pair("projectIds", &project_id.to_string());
        debug!(%url, "deleting service endpoint");

        let response = self.authorized(self.http.delete(url)).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
