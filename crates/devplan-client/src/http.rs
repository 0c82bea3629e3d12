//! [`ServiceClient`] over HTTPS with reqwest.

use crate::api::{ServiceClient, TokenProvider};
use crate::error::{ClientError, Result};
use crate::types::{
    DocumentResponse, GitRepository, GroupResponse, IntegrationResponse, ProjectsResponse,
    RepoSummariesResponse, SelfResponse, SubmitWorklogRequest, TaskSpecsResponse,
    UploadSpecRequest, WorklogItem,
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const API_PATH: &str = "api/v1";
pub const VERSION_HEADER: &str = "x-devplan-cli-version";
pub const ENV_API_URL: &str = "DEVPLAN_API_URL";
pub const ENV_API_DOMAIN: &str = "DEVPLAN_API_DOMAIN";
pub const DEFAULT_BASE_URL: &str = "https://app.devplan.com";
pub const BETA_BASE_URL: &str = "https://beta.devplan.com";
pub const LOCAL_BASE_URL: &str = "http://localhost:3000";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Base URL
// ---------------------------------------------------------------------------

/// Pick the service root: an explicit URL wins, then `api_url`, then the
/// named domain.
pub fn base_url_for(explicit: Option<&str>, api_url: Option<&str>, domain: Option<&str>) -> String {
    let chosen = [explicit, api_url]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty());
    let url = match chosen {
        Some(url) => url,
        None => match domain.map(str::trim) {
            Some("beta") => BETA_BASE_URL,
            Some("local") => LOCAL_BASE_URL,
            _ => DEFAULT_BASE_URL,
        },
    };
    url.trim_end_matches('/').to_string()
}

/// [`base_url_for`] with the fallbacks read from the environment.
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    let api_url = std::env::var(ENV_API_URL).ok();
    let domain = std::env::var(ENV_API_DOMAIN).ok();
    base_url_for(explicit, api_url.as_deref(), domain.as_deref())
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

fn self_path() -> String {
    format!("{API_PATH}/user")
}

fn company_path(company_id: i64) -> String {
    format!("{API_PATH}/company/{company_id}")
}

fn projects_path(company_id: i64) -> String {
    format!("{}/projects", company_path(company_id))
}

fn group_path(company_id: i64, group_id: &str) -> String {
    format!("{}/groups/{group_id}", company_path(company_id))
}

fn document_path(company_id: i64, document_id: &str) -> String {
    format!("{}/documents/{document_id}", company_path(company_id))
}

fn integration_path(company_id: i64, provider: &str) -> String {
    format!("{}/integration/{provider}", company_path(company_id))
}

fn repo_summaries_path(company_id: i64) -> String {
    format!("{}/repo-summaries", company_path(company_id))
}

fn task_specs_path(company_id: i64, task_id: &str) -> String {
    format!("{}/dev/task/{task_id}/specs", company_path(company_id))
}

fn worklog_path(company_id: i64) -> String {
    format!("{}/dev/worklog", company_path(company_id))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HttpClient {
    base_url: String,
    version: String,
    token: Arc<dyn TokenProvider>,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, token: Arc<dyn TokenProvider>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::ServiceUnavailable {
                url: base_url.clone(),
                detail: "failed to build HTTP client".into(),
                source: Some(e),
            })?;
        Ok(Self {
            base_url,
            version: env!("CARGO_PKG_VERSION").to_string(),
            token,
            http,
        })
    }

    /// Version reported in the `x-devplan-cli-version` header.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.token()?;
        Ok(req.bearer_auth(token).header(VERSION_HEADER, &self.version))
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<Vec<u8>> {
        let resp = self.authorize(req)?.send().await.map_err(|e| {
            ClientError::ServiceUnavailable {
                url: url.to_string(),
                detail: e.to_string(),
                source: Some(e),
            }
        })?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| ClientError::ServiceUnavailable {
            url: url.to_string(),
            detail: e.to_string(),
            source: Some(e),
        })?;
        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "response");
        check_status(url, status, &body)?;
        Ok(body.to_vec())
    }

    async fn get_parsed<T: DeserializeOwned + Send>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let body = self.send(&url, self.http.get(&url)).await?;
        decode(&url, &body)
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, payload: &B) -> Result<Vec<u8>> {
        let url = self.url(path);
        self.send(&url, self.http.post(&url).json(payload)).await
    }
}

fn check_status(url: &str, status: StatusCode, body: &[u8]) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if status.is_server_error() {
        return Err(ClientError::ServiceUnavailable {
            url: url.to_string(),
            detail: format!("HTTP {}", status.as_u16()),
            source: None,
        });
    }
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).trim().to_string(),
    })
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

#[async_trait]
impl ServiceClient for HttpClient {
    async fn get_self(&self) -> Result<SelfResponse> {
        self.get_parsed(&self_path()).await
    }

    async fn get_all_repos(&self, company_id: i64) -> Result<Vec<GitRepository>> {
        let github: IntegrationResponse = self
            .get_parsed(&integration_path(company_id, "github"))
            .await?;
        let bitbucket: IntegrationResponse = self
            .get_parsed(&integration_path(company_id, "bitbucket"))
            .await?;
        let mut repos = github.repositories();
        repos.extend(bitbucket.repositories());
        Ok(repos)
    }

    async fn get_repo_summaries(&self, company_id: i64) -> Result<RepoSummariesResponse> {
        self.get_parsed(&repo_summaries_path(company_id)).await
    }

    async fn get_company_projects(&self, company_id: i64) -> Result<ProjectsResponse> {
        self.get_parsed(&projects_path(company_id)).await
    }

    async fn get_group(&self, company_id: i64, group_id: &str) -> Result<GroupResponse> {
        self.get_parsed(&group_path(company_id, group_id)).await
    }

    async fn get_document(&self, company_id: i64, document_id: &str) -> Result<DocumentResponse> {
        self.get_parsed(&document_path(company_id, document_id)).await
    }

    async fn get_task_specs(&self, company_id: i64, task_id: &str) -> Result<TaskSpecsResponse> {
        self.get_parsed(&task_specs_path(company_id, task_id)).await
    }

    async fn upload_task_spec(
        &self,
        company_id: i64,
        task_id: &str,
        req: &UploadSpecRequest,
    ) -> Result<()> {
        self.post(&task_specs_path(company_id, task_id), req).await?;
        Ok(())
    }

    async fn submit_worklog(&self, item: &WorklogItem) -> Result<()> {
        self.post(&worklog_path(item.company_id), &SubmitWorklogRequest { item })
            .await?;
        Ok(())
    }
}
