//! Reconciliation of local records against the fabric.
//!
//! Records whose deployment the fabric no longer knows are removed. The
//! sweep runs on its own task and races freely with request and event
//! paths; deleting a record that is already gone is not an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_core::InstanceId;
use fleet_store::Store;

use crate::callbacks::CreateOutcome;
use crate::error::Result;
use crate::service::FleetService;

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Deployments known to the fabric.
    pub known: usize,
    /// Records found locally.
    pub local: usize,
    /// Records removed by this sweep.
    pub removed: Vec<InstanceId>,
}

impl<S: Store> FleetService<S> {
    /// Remove local records for deployments the fabric no longer knows.
    ///
    /// Records younger than the configured grace period are kept, since the
    /// fabric may not list a deployment it has only just accepted. A
    /// pending create callback of a removed record is resolved with an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if either listing fails or a delete fails. Records
    /// removed before the failure stay removed.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let known: HashSet<String> = self
            .provisioner
            .list_deployments()
            .await?
            .into_iter()
            .map(|d| d.request_id)
            .collect();
        let local = self.store.list_all_instances()?;

        let grace = chrono::Duration::from_std(self.config.sweep_grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - grace;

        let mut report = SweepReport {
            known: known.len(),
            local: local.len(),
            removed: Vec::new(),
        };

        for instance in local {
            if known.contains(instance.id.as_str()) {
                continue;
            }
            if instance.create_time > cutoff {
                tracing::debug!(instance_id = %instance.id, "Skipping recent instance");
                continue;
            }

            if self.store.delete_instance(&instance.id)? {
                tracing::info!(instance_id = %instance.id, "Removed orphaned instance");
                self.callbacks.resolve(
                    &instance.reservation.callback_id,
                    CreateOutcome::Error("deployment no longer exists".to_string()),
                );
                report.removed.push(instance.id);
            }
        }

        Ok(report)
    }
}

/// Run the sweep immediately and then every `interval`, forever.
pub async fn run_sweeper<S: Store + 'static>(service: Arc<FleetService<S>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match service.sweep().await {
            Ok(report) if report.removed.is_empty() => {
                tracing::debug!(known = report.known, local = report.local, "Sweep found nothing to remove");
            }
            Ok(report) => {
                tracing::info!(
                    known = report.known,
                    local = report.local,
                    removed = report.removed.len(),
                    "Sweep removed orphaned instances"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sweep failed");
            }
        }
    }
}
