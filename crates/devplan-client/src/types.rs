//! Wire types for the devplan service. Field names follow the service's
//! camelCase JSON; unknown fields are ignored and missing ones default.

use devplan_core::types::DocRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// User and companies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelfResponse {
    pub owner: Option<User>,
    pub companies: Vec<Company>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub project_id: String,
    pub parent_id: String,
    pub numeric_id: Option<i64>,
    /// JSON-encoded [`DocumentDetails`], possibly empty.
    pub details: String,
    /// Markdown body.
    pub content: String,
}

/// The parts of a document's details the CLI cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentDetails {
    pub repo_name: String,
    pub repo_names: Vec<String>,
    pub status: String,
}

pub const DOC_TYPE_FEATURE: &str = "FEATURE";

impl Document {
    pub fn parsed_details(&self) -> Result<DocumentDetails, serde_json::Error> {
        if self.details.trim().is_empty() {
            return Ok(DocumentDetails::default());
        }
        serde_json::from_str(&self.details)
    }

    pub fn doc_ref(&self) -> DocRef {
        let r = DocRef::new(&self.id, &self.title);
        match self.numeric_id {
            Some(n) => r.with_numeric_id(n),
            None => r,
        }
    }

    pub fn is_feature(&self) -> bool {
        self.doc_type == DOC_TYPE_FEATURE
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentResponse {
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectWithDocs {
    pub project: Document,
    pub docs: Vec<Document>,
}

impl ProjectWithDocs {
    pub fn find_doc(&self, id: &str) -> Option<&Document> {
        self.docs.iter().find(|d| d.id == id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectsResponse {
    pub projects: Vec<ProjectWithDocs>,
}

impl ProjectsResponse {
    pub fn find_project(&self, id: &str) -> Option<&ProjectWithDocs> {
        self.projects.iter().find(|p| p.project.id == id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Group {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupResponse {
    pub group: Option<Group>,
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitRepository {
    pub full_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationResponse {
    pub info: IntegrationInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationInfo {
    pub github: Option<GithubInfo>,
    pub bit_bucket: Option<BitbucketInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubInfo {
    pub repositories: Vec<GitRepository>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BitbucketInfo {
    pub integrations: Vec<BitbucketIntegration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BitbucketIntegration {
    pub repositories: Vec<GitRepository>,
}

impl IntegrationResponse {
    /// Every repository the integration advertises, GitHub first.
    pub fn repositories(self) -> Vec<GitRepository> {
        let mut out = self.info.github.map(|g| g.repositories).unwrap_or_default();
        if let Some(bb) = self.info.bit_bucket {
            out.extend(bb.integrations.into_iter().flat_map(|i| i.repositories));
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoSummary {
    pub repo_name: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoSummariesResponse {
    pub summaries: Vec<RepoSummary>,
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecDetails {
    pub name: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSpecsResponse {
    pub specs: Vec<SpecDetails>,
    pub paths_info: PathsInfo,
}

impl TaskSpecsResponse {
    /// Workspace-relative directory the service keeps `task_id`'s specs in.
    pub fn task_dir(&self, task_id: &str) -> Option<&str> {
        self.paths_info
            .task_paths
            .get(task_id)
            .map(|p| p.task_dir.as_str())
            .filter(|d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathsInfo {
    pub task_paths: HashMap<String, TaskPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPaths {
    pub task_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSpecRequest {
    pub name: String,
    pub content: String,
    pub checksum: String,
}

// ---------------------------------------------------------------------------
// Worklog
// ---------------------------------------------------------------------------

pub const WORKLOG_TYPES: &[&str] = &[
    "full_workflow",
    "research",
    "planning",
    "coding",
    "review",
    "address_review",
    "analysis",
    "commit",
    "finalize",
];

pub const WORKLOG_STAGES: &[&str] = &["started", "running", "ended", "error"];

pub const WORKLOG_TYPE_UNSPECIFIED: &str = "WORK_LOG_TYPE_UNSPECIFIED";

/// What a worklog item is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorklogScope {
    Task(String),
    Feature(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogItem {
    pub message: String,
    pub company_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stage: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action_description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,
}

impl WorklogItem {
    pub fn new(company_id: i64, scope: WorklogScope, message: impl Into<String>) -> Self {
        let mut item = Self {
            message: message.into(),
            company_id,
            ..Default::default()
        };
        match scope {
            WorklogScope::Task(id) => item.task_id = id,
            WorklogScope::Feature(id) => item.feature_id = id,
        }
        item
    }

    /// Known types go out as the upper-case enum name; anything else is sent
    /// as `customType` with an unspecified type.
    pub fn with_type(mut self, kind: &str) -> Self {
        let kind = kind.trim();
        if kind.is_empty() {
            return self;
        }
        let lower = kind.to_ascii_lowercase();
        if WORKLOG_TYPES.contains(&lower.as_str()) {
            self.kind = lower.to_ascii_uppercase();
            self.custom_type.clear();
        } else {
            self.kind = WORKLOG_TYPE_UNSPECIFIED.to_string();
            self.custom_type = kind.to_string();
        }
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_description = action.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent_name = agent.into();
        self
    }

    pub fn scope(&self) -> WorklogScope {
        if self.task_id.is_empty() {
            WorklogScope::Feature(self.feature_id.clone())
        } else {
            WorklogScope::Task(self.task_id.clone())
        }
    }

    /// The id recent activity is recorded under.
    pub fn activity_id(&self) -> &str {
        if self.task_id.is_empty() {
            &self.feature_id
        } else {
            &self.task_id
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWorklogRequest<'a> {
    pub item: &'a WorklogItem,
}
