use crate::api::ServiceClient;
use crate::error::Result;
use crate::types::WorklogItem;
use devplan_core::recent_activity::{RecentActivityStore, SOURCE_WORKLOG};
use std::sync::Arc;
use tracing::debug;

/// Submits worklog items and marks the task or feature as recently active.
pub struct WorklogReporter {
    client: Arc<dyn ServiceClient>,
    store: Arc<RecentActivityStore>,
}

impl WorklogReporter {
    pub fn new(client: Arc<dyn ServiceClient>, store: Arc<RecentActivityStore>) -> Self {
        Self { client, store }
    }

    /// Activity is only recorded after the service accepted the item, and a
    /// failure to record it is not an error.
    pub async fn report(&self, item: &WorklogItem) -> Result<()> {
        self.client.submit_worklog(item).await?;
        let id = item.activity_id();
        if let Err(e) = self.store.record_task_activity(id, SOURCE_WORKLOG) {
            debug!(id = %id, error = %e, "failed to record worklog activity");
        }
        Ok(())
    }
}
