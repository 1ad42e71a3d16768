//! Restores authority in groups that lost every authority-holder outside the
//! succession engine, e.g. when an account-removal cascade deleted the rows.

use std::sync::Arc;

use domain::services::{EventSink, SuccessionEngine};
use domain::store::MembershipStore;
use domain::DomainError;
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::scheduler::{Job, JobFrequency};

/// Counts from one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub scanned: usize,
    /// A member was promoted.
    pub repaired: usize,
    /// Nothing to do by the time the group was locked.
    pub unchanged: usize,
    pub failed: usize,
}

pub struct SuccessionRepairJob<S> {
    store: S,
    engine: SuccessionEngine<S>,
    batch_size: i64,
    frequency: JobFrequency,
}

impl<S> SuccessionRepairJob<S>
where
    S: MembershipStore + Clone,
{
    pub fn new(
        store: S,
        events: Arc<dyn EventSink>,
        batch_size: i64,
        frequency: JobFrequency,
    ) -> Self {
        Self {
            engine: SuccessionEngine::new(store.clone(), events),
            store,
            batch_size,
            frequency,
        }
    }

    /// Scans up to `batch_size` groups without authority and repairs each one.
    ///
    /// A failure on one group does not stop the pass; only the scan itself
    /// can fail.
    pub async fn run_pass(&self) -> Result<RepairReport, DomainError> {
        let groups = self.store.groups_without_authority(self.batch_size).await?;
        let mut report = RepairReport {
            scanned: groups.len(),
            ..RepairReport::default()
        };

        for group_id in groups {
            match self.repair(group_id).await {
                Ok(true) => report.repaired += 1,
                Ok(false) => report.unchanged += 1,
                Err(_) => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn repair(&self, group_id: Uuid) -> Result<bool, DomainError> {
        match self.engine.restore_authority(group_id).await {
            Ok(outcome) => match outcome.successor {
                Some(successor) => {
                    counter!("succession_repairs_total", "outcome" => "repaired").increment(1);
                    info!(
                        group_id = %group_id,
                        successor_user_id = %successor,
                        "Restored group authority"
                    );
                    Ok(true)
                }
                None => {
                    counter!("succession_repairs_total", "outcome" => "unchanged").increment(1);
                    debug!(group_id = %group_id, "Group no longer needs repair");
                    Ok(false)
                }
            },
            Err(err) => {
                counter!("succession_repairs_total", "outcome" => "failed").increment(1);
                warn!(group_id = %group_id, error = %err, "Authority repair failed");
                Err(err)
            }
        }
    }
}

#[async_trait::async_trait]
impl<S> Job for SuccessionRepairJob<S>
where
    S: MembershipStore + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "succession_repair"
    }

    fn frequency(&self) -> JobFrequency {
        self.frequency
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .run_pass()
            .await
            .map_err(|e| format!("Failed to list groups without authority: {e}"))?;

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                repaired = report.repaired,
                unchanged = report.unchanged,
                failed = report.failed,
                "Authority repair pass finished"
            );
        }

        if report.failed > 0 {
            return Err(format!(
                "{} of {} groups could not be repaired",
                report.failed, report.scanned
            ));
        }
        Ok(())
    }
}
