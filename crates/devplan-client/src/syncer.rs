//! Keeps the service's copy of a task's generated specs in step with the
//! task directory.
//!
//! One run at a time per [`Syncer`]: a trigger that finds a run in progress
//! returns [`SyncResult::skipped_concurrent`] instead of queueing. Uploads of
//! the same spec name are serialized through a per-name lock.

use crate::api::ServiceClient;
use crate::error::{ClientError, SyncError};
use crate::specs::{discover_task_specs, should_upload, Spec};
use crate::types::UploadSpecRequest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
pub struct SyncResult {
    pub uploaded: usize,
    /// Unchanged specs, or `-1` when another run was already in progress.
    pub skipped: i64,
    pub failed: usize,
    pub errors: Vec<SyncError>,
}

impl SyncResult {
    pub fn skipped_concurrent() -> Self {
        Self {
            skipped: -1,
            ..Default::default()
        }
    }

    pub fn is_skipped_concurrent(&self) -> bool {
        self.skipped < 0
    }
}

pub struct Syncer {
    client: Arc<dyn ServiceClient>,
    company_id: i64,
    task_id: String,
    task_dir: PathBuf,
    interval: Duration,
    run_guard: Arc<tokio::sync::Mutex<()>>,
    // Grows with the distinct spec names seen; never evicted.
    spec_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Syncer {
    /// A zero `interval` means [`DEFAULT_SYNC_INTERVAL`].
    pub fn new(
        client: Arc<dyn ServiceClient>,
        company_id: i64,
        task_id: impl Into<String>,
        task_dir: impl Into<PathBuf>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            company_id,
            task_id: task_id.into(),
            task_dir: task_dir.into(),
            interval: if interval.is_zero() {
                DEFAULT_SYNC_INTERVAL
            } else {
                interval
            },
            run_guard: Arc::new(tokio::sync::Mutex::new(())),
            spec_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    /// Run one sync. The run happens on its own task, so dropping the
    /// returned future does not stop it.
    pub async fn trigger_once(self: &Arc<Self>) -> SyncResult {
        let Ok(guard) = Arc::clone(&self.run_guard).try_lock_owned() else {
            debug!(task = %self.task_id, "spec sync already running");
            return SyncResult::skipped_concurrent();
        };
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            this.run().await
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(task = %self.task_id, error = %e, "spec sync task failed");
                SyncResult {
                    failed: 1,
                    errors: vec![SyncError::Interrupted(e)],
                    ..Default::default()
                }
            }
        }
    }

    /// Sync every interval until `cancel` fires. The first run happens one
    /// interval after the call; ticks missed during a slow run are dropped.
    pub async fn run_background(self: Arc<Self>, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        debug!(task = %self.task_id, interval_ms, "spec sync started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let result = self.trigger_once().await;
                    if result.uploaded > 0 {
                        info!(task = %self.task_id, uploaded = result.uploaded, "specs synced");
                    }
                }
            }
        }
        debug!(task = %self.task_id, "spec sync stopped");
    }

    fn spec_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.spec_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Upload one spec, serialized with other uploads of the same name.
    pub async fn upload_spec(&self, spec: &Spec) -> Result<(), ClientError> {
        let lock = self.spec_lock(&spec.name);
        let _held = lock.lock().await;
        let req = UploadSpecRequest {
            name: spec.name.clone(),
            content: String::from_utf8_lossy(&spec.content).into_owned(),
            checksum: spec.checksum.clone(),
        };
        self.client
            .upload_task_spec(self.company_id, &self.task_id, &req)
            .await
    }

    async fn run(&self) -> SyncResult {
        let result = self.run_inner().await;
        for e in &result.errors {
            error!(task = %self.task_id, error = %e, "spec sync error");
        }
        debug!(
            task = %self.task_id,
            uploaded = result.uploaded,
            skipped = result.skipped,
            failed = result.failed,
            "spec sync run finished"
        );
        result
    }

    async fn run_inner(&self) -> SyncResult {
        let mut result = SyncResult::default();

        let specs = match discover_task_specs(&self.task_dir) {
            Ok(specs) => specs,
            Err(source) => {
                result.failed = 1;
                result.errors.push(SyncError::Discover {
                    dir: self.task_dir.clone(),
                    source,
                });
                return result;
            }
        };
        if specs.is_empty() {
            return result;
        }

        let manifest = match self.client.get_task_specs(self.company_id, &self.task_id).await {
            Ok(resp) => resp.specs,
            Err(e) => {
                result.failed = specs.len();
                result.errors.push(SyncError::Manifest(e));
                return result;
            }
        };

        let (pending, unchanged): (Vec<&Spec>, Vec<&Spec>) =
            specs.iter().partition(|s| should_upload(s, &manifest));
        result.skipped = i64::try_from(unchanged.len()).unwrap_or(i64::MAX);

        let outcomes = futures::future::join_all(pending.iter().map(|s| self.upload_spec(s))).await;
        for (spec, outcome) in pending.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    info!(task = %self.task_id, spec = %spec.name, "uploaded spec");
                    result.uploaded += 1;
                }
                Err(source) => {
                    result.failed += 1;
                    result.errors.push(SyncError::Transport {
                        name: spec.name.clone(),
                        source,
                    });
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryService;
    use crate::specs::checksum_bytes;
    use crate::types::SpecDetails;
    use tempfile::TempDir;

    const TASK: &str = "task-123";

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn syncer(service: &Arc<InMemoryService>, dir: &Path, interval: Duration) -> Arc<Syncer> {
        let client: Arc<dyn ServiceClient> = service.clone();
        Arc::new(Syncer::new(client, 1, TASK, dir, interval))
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn zero_interval_means_default() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(InMemoryService::new());
        let s = syncer(&service, dir.path(), Duration::ZERO);
        assert_eq!(s.interval(), DEFAULT_SYNC_INTERVAL);
    }

    #[tokio::test]
    async fn uploads_only_the_diff() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plan.md", "# plan");
        write(dir.path(), "code.md", "# code");
        write(dir.path(), "design.md", "# design");
        write(dir.path(), "prd.md", "# prd");
        let service = Arc::new(InMemoryService::new().with_state(|s| {
            s.specs.insert(
                TASK.into(),
                vec![SpecDetails {
                    name: "design.md".into(),
                    checksum: checksum_bytes(b"# design"),
                }],
            );
        }));

        let result = syncer(&service, dir.path(), Duration::from_secs(1))
            .trigger_once()
            .await;
        assert_eq!((result.uploaded, result.skipped, result.failed), (2, 1, 0));
        let mut names = service.uploaded_names();
        names.sort();
        assert_eq!(names, vec!["code.md", "plan.md"]);
        let state = service.state();
        let plan = state.uploads.iter().find(|(_, u)| u.name == "plan.md").unwrap();
        assert_eq!(plan.0, TASK);
        assert_eq!(plan.1.content, "# plan");
        assert_eq!(plan.1.checksum, checksum_bytes(b"# plan"));
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plan.md", "# plan");
        let service = Arc::new(InMemoryService::new());
        let s = syncer(&service, dir.path(), Duration::from_secs(1));

        assert_eq!(s.trigger_once().await.uploaded, 1);
        let again = s.trigger_once().await;
        assert_eq!((again.uploaded, again.skipped), (0, 1));
        assert_eq!(service.upload_count(), 1);
    }

    #[tokio::test]
    async fn upload_failures_do_not_abort_the_run() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "bad.md", "x");
        write(dir.path(), "good.md", "y");
        let service = Arc::new(InMemoryService::new().with_state(|s| {
            s.failing_uploads.insert("bad.md".into());
        }));

        let result = syncer(&service, dir.path(), Duration::from_secs(1))
            .trigger_once()
            .await;
        assert_eq!((result.uploaded, result.failed), (1, 1));
        assert!(matches!(
            &result.errors[..],
            [SyncError::Transport { name, .. }] if name == "bad.md"
        ));
    }

    #[tokio::test]
    async fn manifest_failure_fails_every_spec() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "a");
        write(dir.path(), "b.md", "b");
        let service = Arc::new(InMemoryService::new().with_state(|s| s.fail_manifest = true));

        let result = syncer(&service, dir.path(), Duration::from_secs(1))
            .trigger_once()
            .await;
        assert_eq!((result.uploaded, result.failed), (0, 2));
        assert!(matches!(&result.errors[..], [SyncError::Manifest(_)]));
        assert_eq!(service.upload_count(), 0);
    }

    #[tokio::test]
    async fn missing_dir_is_one_failure() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(InMemoryService::new());
        let result = syncer(&service, &dir.path().join("gone"), Duration::from_secs(1))
            .trigger_once()
            .await;
        assert_eq!(result.failed, 1);
        assert!(matches!(&result.errors[..], [SyncError::Discover { .. }]));
    }

    #[tokio::test]
    async fn empty_dir_does_not_contact_the_service() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(InMemoryService::new().with_state(|s| s.fail_manifest = true));
        let result = syncer(&service, dir.path(), Duration::from_secs(1))
            .trigger_once()
            .await;
        assert_eq!((result.uploaded, result.skipped, result.failed), (0, 0, 0));
        assert!(result.errors.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_run_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plan.md", "# plan");
        let service = Arc::new(InMemoryService::new().with_blocked_uploads());
        let s = syncer(&service, dir.path(), Duration::from_secs(1));

        let first = tokio::spawn({
            let s = Arc::clone(&s);
            async move { s.trigger_once().await }
        });
        wait_for(|| service.in_flight() == 1).await;

        let others = futures::future::join_all((0..4).map(|_| s.trigger_once())).await;
        assert!(others.iter().all(SyncResult::is_skipped_concurrent));

        service.release_uploads();
        let result = first.await.unwrap();
        assert_eq!(result.uploaded, 1);
        assert!(!result.is_skipped_concurrent());
        assert_eq!(service.upload_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dropped_trigger_still_completes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plan.md", "# plan");
        let service = Arc::new(InMemoryService::new().with_upload_delay(Duration::from_millis(50)));
        let s = syncer(&service, dir.path(), Duration::from_secs(1));

        let _ = tokio::time::timeout(Duration::from_millis(10), s.trigger_once()).await;
        wait_for(|| service.upload_count() == 1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_name_uploads_are_serialized() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(InMemoryService::new().with_upload_delay(Duration::from_millis(20)));
        let s = syncer(&service, dir.path(), Duration::from_secs(1));
        let spec = Spec {
            name: "plan.md".into(),
            path: dir.path().join("plan.md"),
            checksum: checksum_bytes(b"x"),
            content: b"x".to_vec(),
        };

        let n = 5;
        let results = futures::future::join_all((0..n).map(|_| s.upload_spec(&spec))).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(service.upload_count(), n);
        assert_eq!(service.max_in_flight(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_loop_uploads_until_cancelled() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plan.md", "v1");
        let service = Arc::new(InMemoryService::new());
        let s = syncer(&service, dir.path(), Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&s).run_background(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(service.upload_count() >= 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
        let after_cancel = service.upload_count();

        write(dir.path(), "plan.md", "v2");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(service.upload_count(), after_cancel);
    }
}
