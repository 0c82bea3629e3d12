//! In-process [`ServiceClient`] used by tests and offline runs.

use crate::api::ServiceClient;
use crate::error::{ClientError, Result};
use crate::types::{
    Document, DocumentResponse, GitRepository, Group, GroupResponse, ProjectsResponse,
    PathsInfo, RepoSummariesResponse, SelfResponse, SpecDetails, TaskPaths, TaskSpecsResponse,
    UploadSpecRequest, WorklogItem,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Everything the fake serves, plus what it has received.
#[derive(Debug, Default)]
pub struct MemoryState {
    pub self_response: SelfResponse,
    pub repos: Vec<GitRepository>,
    pub summaries: RepoSummariesResponse,
    pub projects: ProjectsResponse,
    pub groups: HashMap<String, Group>,
    pub documents: HashMap<String, Document>,
    /// Server-side manifest per task id. Successful uploads update it.
    pub specs: HashMap<String, Vec<SpecDetails>>,
    /// Workspace-relative spec directory per task id.
    pub task_dirs: HashMap<String, String>,
    pub uploads: Vec<(String, UploadSpecRequest)>,
    pub worklogs: Vec<WorklogItem>,
    pub fail_manifest: bool,
    /// Spec names whose upload fails.
    pub failing_uploads: HashSet<String>,
    pub fail_worklog: bool,
}

#[derive(Default)]
pub struct InMemoryService {
    state: Mutex<MemoryState>,
    upload_delay: Option<Duration>,
    upload_gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload sleeps this long while counted as in flight.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Uploads block until [`release_uploads`](Self::release_uploads).
    pub fn with_blocked_uploads(mut self) -> Self {
        self.upload_gate = Some(Semaphore::new(0));
        self
    }

    pub fn release_uploads(&self) {
        if let Some(gate) = &self.upload_gate {
            gate.close();
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_state(self, f: impl FnOnce(&mut MemoryState)) -> Self {
        f(&mut self.state());
        self
    }

    pub fn upload_count(&self) -> usize {
        self.state().uploads.len()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.state().uploads.iter().map(|(_, u)| u.name.clone()).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of uploads observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceClient for InMemoryService {
    async fn get_self(&self) -> Result<SelfResponse> {
        Ok(self.state().self_response.clone())
    }

    async fn get_all_repos(&self, _company_id: i64) -> Result<Vec<GitRepository>> {
        Ok(self.state().repos.clone())
    }

    async fn get_repo_summaries(&self, _company_id: i64) -> Result<RepoSummariesResponse> {
        Ok(self.state().summaries.clone())
    }

    async fn get_company_projects(&self, _company_id: i64) -> Result<ProjectsResponse> {
        Ok(self.state().projects.clone())
    }

    async fn get_group(&self, _company_id: i64, group_id: &str) -> Result<GroupResponse> {
        let group = self
            .state()
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("group {group_id}")))?;
        Ok(GroupResponse { group: Some(group) })
    }

    async fn get_document(&self, _company_id: i64, document_id: &str) -> Result<DocumentResponse> {
        let document = self
            .state()
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("document {document_id}")))?;
        Ok(DocumentResponse {
            document: Some(document),
        })
    }

    async fn get_task_specs(&self, _company_id: i64, task_id: &str) -> Result<TaskSpecsResponse> {
        let state = self.state();
        if state.fail_manifest {
            return Err(ClientError::ServiceUnavailable {
                url: format!("memory://specs/{task_id}"),
                detail: "manifest unavailable".into(),
                source: None,
            });
        }
        let task_paths = state
            .task_dirs
            .get(task_id)
            .map(|dir| {
                let paths = TaskPaths {
                    task_dir: dir.clone(),
                };
                HashMap::from([(task_id.to_string(), paths)])
            })
            .unwrap_or_default();
        Ok(TaskSpecsResponse {
            specs: state.specs.get(task_id).cloned().unwrap_or_default(),
            paths_info: PathsInfo { task_paths },
        })
    }

    async fn upload_task_spec(
        &self,
        _company_id: i64,
        task_id: &str,
        req: &UploadSpecRequest,
    ) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.upload_gate {
            // Closed means released.
            gate.acquire().await.ok();
        }
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let mut state = self.state();
            if state.failing_uploads.contains(&req.name) {
                Err(ClientError::Status {
                    url: format!("memory://specs/{task_id}"),
                    status: 400,
                    body: format!("rejected {}", req.name),
                })
            } else {
                state.uploads.push((task_id.to_string(), req.clone()));
                let manifest = state.specs.entry(task_id.to_string()).or_default();
                manifest.retain(|s| s.name != req.name);
                manifest.push(SpecDetails {
                    name: req.name.clone(),
                    checksum: req.checksum.clone(),
                });
                Ok(())
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn submit_worklog(&self, item: &WorklogItem) -> Result<()> {
        let mut state = self.state();
        if state.fail_worklog {
            return Err(ClientError::Unauthorized { status: 401 });
        }
        state.worklogs.push(item.clone());
        Ok(())
    }
}
