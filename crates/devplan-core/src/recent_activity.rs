//! Bounded most-recently-used journal of task activity in
//! `<config-dir>/recent-activity.json`.
//!
//! Every update rewrites the whole file through a temp file and rename, so
//! readers in other processes see either the old or the new journal. Writers
//! sharing one [`RecentActivityStore`] are serialized; across processes the
//! last rename wins.

use crate::error::{Error, Result};
use crate::io;
use crate::listing::ClonedWorkspace;
use crate::metadata::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub const ACTIVITY_FILE: &str = "recent-activity.json";
pub const MAX_ENTRIES: usize = 20;

pub const SOURCE_SPEC_START: &str = "spec_start";
pub const SOURCE_SWITCH: &str = "switch";
pub const SOURCE_WORKLOG: &str = "worklog";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Task,
    Project,
    #[default]
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    #[serde(rename = "type", default)]
    pub kind: ActivityType,
    #[serde(default)]
    pub task_id: String,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
}

impl ActivityEntry {
    fn is_task(&self, task_id: &str) -> bool {
        matches!(self.kind, ActivityType::Task | ActivityType::Unspecified) && self.task_id == task_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentActivity {
    /// Newest first.
    pub entries: Vec<ActivityEntry>,
}

// Entries are decoded one at a time so a single malformed record is dropped
// instead of failing the whole journal.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    List(Vec<serde_json::Value>),
    Wrapped { entries: Vec<serde_json::Value> },
}

impl RecentActivity {
    fn parse(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw = match serde_json::from_str(data)? {
            OnDisk::List(raw) | OnDisk::Wrapped { entries: raw } => raw,
        };
        let entries = raw
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<ActivityEntry>(v) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping malformed activity entry");
                    None
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// Latest activity per task id, task-scoped entries only.
    pub fn task_index(&self) -> HashMap<&str, DateTime<Utc>> {
        let mut index: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for e in &self.entries {
            if !matches!(e.kind, ActivityType::Task | ActivityType::Unspecified) || e.task_id.is_empty() {
                continue;
            }
            index
                .entry(e.task_id.as_str())
                .and_modify(|t| *t = (*t).max(e.last_activity))
                .or_insert(e.last_activity);
        }
        index
    }
}

#[derive(Debug)]
pub struct RecentActivityStore {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl RecentActivityStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(ACTIVITY_FILE),
            max_entries: MAX_ENTRIES,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or whitespace-only files read as an empty journal.
    pub fn load(&self) -> Result<RecentActivity> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => RecentActivity::parse(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecentActivity::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn record_task_activity(&self, task_id: &str, source: &str) -> Result<()> {
        self.record_task_activity_at(task_id, Utc::now(), source)
    }

    pub fn record_task_activity_at(&self, task_id: &str, at: DateTime<Utc>, source: &str) -> Result<()> {
        if task_id.is_empty() {
            return Err(Error::EmptyTaskId);
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut activity = self.load()?;
        activity.entries.retain(|e| !e.is_task(task_id));
        activity.entries.push(ActivityEntry {
            kind: ActivityType::Task,
            task_id: task_id.to_string(),
            last_activity: at,
            source: source.to_string(),
        });
        activity
            .entries
            .sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        activity.entries.truncate(self.max_entries);

        let data = serde_json::to_vec_pretty(&activity.entries)?;
        io::atomic_replace(&self.path, &data)?;
        debug!(task_id, source, "recorded activity");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sorting workspaces
// ---------------------------------------------------------------------------

fn meta_activity(meta: &Metadata, index: &HashMap<&str, DateTime<Utc>>) -> Option<DateTime<Utc>> {
    [meta.task_id.as_str(), meta.story_id.as_str()]
        .into_iter()
        .filter(|id| !id.is_empty())
        .find_map(|id| index.get(id).copied())
}

/// Newest activity recorded for a workspace or any of its repositories.
pub fn workspace_activity(
    ws: &ClonedWorkspace,
    index: &HashMap<&str, DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let own = ws.metadata.iter();
    let repos = ws
        .repos
        .iter()
        .filter(|_| ws.is_feature_workspace)
        .filter_map(|r| r.metadata.as_ref());
    own.chain(repos)
        .filter_map(|m| meta_activity(m, index))
        .max()
}

/// Stable sort: workspaces with recorded activity first, newest first; the
/// rest keep their input order.
pub fn sort_workspaces(workspaces: &mut [ClonedWorkspace], activity: &RecentActivity) {
    let index = activity.task_index();
    let mut keyed: Vec<(Option<DateTime<Utc>>, usize)> = workspaces
        .iter()
        .enumerate()
        .map(|(i, w)| (workspace_activity(w, &index), i))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    let order: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    let sorted: Vec<ClonedWorkspace> = order.iter().map(|&i| workspaces[i].clone()).collect();
    for (slot, ws) in workspaces.iter_mut().zip(sorted) {
        *slot = ws;
    }
}

/// [`sort_workspaces`] with the journal loaded from `store`. An unreadable
/// journal leaves the order untouched.
pub fn sort_by_activity(workspaces: &mut [ClonedWorkspace], store: &RecentActivityStore) {
    match store.load() {
        Ok(activity) => sort_workspaces(workspaces, &activity),
        Err(e) => debug!(error = %e, "failed to load recent activity"),
    }
}
