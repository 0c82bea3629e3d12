//! Turn repository names from documents or the command line into
//! [`RepoRef`]s the orchestrator can clone.

use crate::error::{ClientError, Result};
use crate::types::GitRepository;
use devplan_core::remote_url::{host_from_url, is_url};
use devplan_core::types::{HostClass, RepoRef};
use tracing::warn;

/// The clone transport follows the advertised URL's host.
pub fn repo_ref(repo: &GitRepository) -> RepoRef {
    let host = host_from_url(&repo.url)
        .map(|h| HostClass::from_host(&h))
        .unwrap_or(HostClass::Other);
    match host {
        HostClass::Github => RepoRef::github(&repo.full_name),
        HostClass::Bitbucket => RepoRef::bitbucket(&repo.full_name, vec![repo.url.clone()]),
        HostClass::Other => RepoRef {
            full_name: repo.full_name.clone(),
            urls: vec![repo.url.clone()],
            host,
        },
    }
}

fn find_by_name<'a>(name: &str, repos: &'a [GitRepository]) -> Option<&'a GitRepository> {
    if let Some(exact) = repos.iter().find(|r| r.full_name == name) {
        return Some(exact);
    }
    let needle = name.to_lowercase();
    let matches: Vec<&GitRepository> = repos
        .iter()
        .filter(|r| r.full_name.to_lowercase().contains(&needle))
        .collect();
    if matches.len() > 1 {
        let names: Vec<&str> = matches.iter().map(|r| r.full_name.as_str()).collect();
        warn!(name = %name, ?names, "ambiguous repository name, using first match");
    }
    matches.first().copied()
}

/// Resolve every name: exact full-name match first, then case-insensitive
/// substring. Fails listing all names that matched nothing.
pub fn resolve_repos(names: &[String], repos: &[GitRepository]) -> Result<Vec<RepoRef>> {
    let mut resolved = Vec::with_capacity(names.len());
    let mut unresolved = Vec::new();
    for name in names {
        match find_by_name(name, repos) {
            Some(repo) => resolved.push(repo_ref(repo)),
            None => unresolved.push(name.clone()),
        }
    }
    if !unresolved.is_empty() {
        return Err(ClientError::UnresolvedRepos(unresolved));
    }
    Ok(resolved)
}

/// Pick the repository for a single-repo workspace. A URL hint is used as
/// is; a name hint is matched against the company's repositories and then
/// against URLs the user added before. An empty hint only works when there
/// is exactly one candidate.
pub fn select_repo(hint: &str, repos: &[GitRepository], extra_urls: &[String]) -> Result<RepoRef> {
    let hint = hint.trim();
    if is_url(hint) {
        return Ok(RepoRef::from_url(hint)?);
    }

    let extra: Vec<RepoRef> = extra_urls
        .iter()
        .filter_map(|u| RepoRef::from_url(u).ok())
        .filter(|r| !repos.iter().any(|known| known.full_name == r.full_name))
        .collect();

    if hint.is_empty() {
        return match (repos, extra.as_slice()) {
            ([only], []) => Ok(repo_ref(only)),
            ([], [only]) => Ok(only.clone()),
            _ => Err(ClientError::NotFound(
                "no repository given and more than one candidate; pass --repo".into(),
            )),
        };
    }

    if let Some(repo) = find_by_name(hint, repos) {
        return Ok(repo_ref(repo));
    }
    let needle = hint.to_lowercase();
    extra
        .into_iter()
        .find(|r| r.full_name.to_lowercase().contains(&needle))
        .ok_or_else(|| ClientError::UnresolvedRepos(vec![hint.to_string()]))
}
