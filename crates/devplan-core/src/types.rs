use crate::error::{Error, Result};
use crate::prefs::GitProtocol;
use crate::remote_url;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Project,
    Feature,
    Task,
}

/// A planning document as seen by the workspace code: id, title and the
/// service's numeric id when it has one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<i64>,
}

impl DocRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            numeric_id: None,
        }
    }

    pub fn with_numeric_id(mut self, numeric_id: i64) -> Self {
        self.numeric_id = Some(numeric_id);
        self
    }
}

/// What the user wants to work on. Immutable for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub company_id: i64,
    pub project: DocRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<DocRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<DocRef>,
}

impl Target {
    pub fn project(company_id: i64, project: DocRef) -> Self {
        Self {
            kind: TargetKind::Project,
            company_id,
            project,
            feature: None,
            task: None,
        }
    }

    pub fn feature(company_id: i64, project: DocRef, feature: DocRef) -> Self {
        Self {
            kind: TargetKind::Feature,
            company_id,
            project,
            feature: Some(feature),
            task: None,
        }
    }

    pub fn task(company_id: i64, project: DocRef, feature: Option<DocRef>, task: DocRef) -> Self {
        Self {
            kind: TargetKind::Task,
            company_id,
            project,
            feature,
            task: Some(task),
        }
    }

    /// Most specific title: task, then feature, then project.
    pub fn display_title(&self) -> &str {
        self.task
            .as_ref()
            .or(self.feature.as_ref())
            .map(|d| d.title.as_str())
            .unwrap_or(&self.project.title)
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostClass {
    Github,
    Bitbucket,
    Other,
}

impl HostClass {
    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host == "github.com" || host.ends_with(".github.com") {
            HostClass::Github
        } else if host == "bitbucket.org" || host.ends_with(".bitbucket.org") {
            HostClass::Bitbucket
        } else {
            HostClass::Other
        }
    }
}

/// One logical repository and the URLs it can be cloned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub full_name: String,
    pub urls: Vec<String>,
    pub host: HostClass,
}

impl RepoRef {
    pub fn github(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            urls: vec![github_https_url(&full_name), github_ssh_url(&full_name)],
            full_name,
            host: HostClass::Github,
        }
    }

    pub fn bitbucket(full_name: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            full_name: full_name.into(),
            urls,
            host: HostClass::Bitbucket,
        }
    }

    /// Build a ref from a single user-supplied URL.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::from_urls(vec![url.trim().to_string()])
    }

    /// Build a ref from remote URLs, e.g. those of an existing clone. The
    /// first URL determines the name and host.
    pub fn from_urls(urls: Vec<String>) -> Result<Self> {
        let first = urls
            .first()
            .ok_or_else(|| Error::InvalidRemoteUrl(String::new()))?;
        let full_name = remote_url::full_name_from_url(first)?;
        let host = HostClass::from_host(&remote_url::host_from_url(first)?);
        Ok(Self {
            full_name,
            urls,
            host,
        })
    }

    pub fn slug(&self) -> &str {
        crate::paths::repo_slug(&self.full_name)
    }

    /// The URL actually recorded as provenance: the first advertised one.
    pub fn primary_url(&self) -> &str {
        self.urls.first().map(String::as_str).unwrap_or_default()
    }
}

pub fn github_https_url(full_name: &str) -> String {
    format!("https://github.com/{full_name}")
}

pub fn github_ssh_url(full_name: &str) -> String {
    format!("git@github.com:{full_name}.git")
}

pub fn github_url(full_name: &str, protocol: GitProtocol) -> String {
    match protocol {
        GitProtocol::Https => github_https_url(full_name),
        GitProtocol::Ssh => github_ssh_url(full_name),
    }
}
