use crate::error::{ClientError, Result};
use crate::types::{
    DocumentResponse, GitRepository, GroupResponse, ProjectsResponse, RepoSummariesResponse,
    SelfResponse, TaskSpecsResponse, UploadSpecRequest, WorklogItem,
};
use async_trait::async_trait;

/// Everything the CLI needs from the devplan service. [`crate::http::HttpClient`]
/// talks to the real API; [`crate::memory::InMemoryService`] backs tests.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn get_self(&self) -> Result<SelfResponse>;

    /// GitHub and Bitbucket repositories of the company, merged.
    async fn get_all_repos(&self, company_id: i64) -> Result<Vec<GitRepository>>;

    async fn get_repo_summaries(&self, company_id: i64) -> Result<RepoSummariesResponse>;

    async fn get_company_projects(&self, company_id: i64) -> Result<ProjectsResponse>;

    async fn get_group(&self, company_id: i64, group_id: &str) -> Result<GroupResponse>;

    async fn get_document(&self, company_id: i64, document_id: &str) -> Result<DocumentResponse>;

    async fn get_task_specs(&self, company_id: i64, task_id: &str) -> Result<TaskSpecsResponse>;

    async fn upload_task_spec(
        &self,
        company_id: i64,
        task_id: &str,
        req: &UploadSpecRequest,
    ) -> Result<()>;

    async fn submit_worklog(&self, item: &WorklogItem) -> Result<()>;
}

/// Source of the bearer token, asked once per request.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<String>;
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Result<String> {
        if self.0.trim().is_empty() {
            return Err(ClientError::Token("API key is empty".into()));
        }
        Ok(self.0.clone())
    }
}
