//! The sync orchestrator — one reconciliation cycle at a time.
//!
//! A single atomic flag enforces at most one in-flight cycle. A request
//! arriving while a cycle is RUNNING sets the rerun flag and returns a
//! no-op success immediately; when the active cycle completes, exactly one
//! rerun executes. Reruns are serialized, never concurrent.
//!
//! A cycle aborts at the first unrecoverable remote failure: commands
//! already acknowledged stay removed, undrained commands stay queued for
//! the next attempt — no duplication, no silent loss.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use skiff_core::{Command, CommandKind, SyncMarker};
use skiff_remote::{RemoteAuthority, TaskRow};
use skiff_store::{FolderCache, RecordStore};

use crate::errors::Result;
use crate::report::SyncReport;

/// Orchestrates drain → submit → reconcile → pull → refresh → checkpoint.
pub struct SyncOrchestrator {
    user_id: String,
    store: Arc<RecordStore>,
    cache: Arc<FolderCache>,
    remote: Arc<dyn RemoteAuthority>,
    batch_size: usize,
    running: AtomicBool,
    rerun_requested: AtomicBool,
}

impl SyncOrchestrator {
    /// Build an orchestrator for one user session.
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<RecordStore>,
        cache: Arc<FolderCache>,
        remote: Arc<dyn RemoteAuthority>,
        batch_size: usize,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            cache,
            remote,
            batch_size: batch_size.max(1),
            running: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
        }
    }

    /// Whether a cycle is currently executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a sync. Coalesces into the active cycle if one is running.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn run(&self) -> Result<SyncReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rerun_requested.store(true, Ordering::SeqCst);
            debug!("cycle already running, coalescing into one rerun");
            return Ok(SyncReport::coalesced());
        }

        let mut report = SyncReport::coalesced();
        let result = loop {
            match self.cycle().await {
                Ok(cycle) => {
                    report.absorb(&cycle);
                    if self.rerun_requested.swap(false, Ordering::SeqCst) {
                        debug!("rerun was requested mid-cycle, running again");
                        continue;
                    }
                    break Ok(report);
                }
                Err(error) => {
                    counter!("skiff_sync_cycle_failures_total").increment(1);
                    warn!(%error, "sync cycle aborted, pending commands remain queued");
                    break Err(error);
                }
            }
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// One full reconciliation cycle.
    async fn cycle(&self) -> Result<SyncReport> {
        let started_at = Utc::now();
        let mut report = SyncReport::started(started_at);
        report.cycles_run = 1;
        counter!("skiff_sync_cycles_total").increment(1);

        // 1 + 2: drain the queue in batches, reconciling each result.
        self.drain_queue(&mut report).await?;

        // 3: incremental pull since the checkpoint (None = full fetch).
        let checkpoint = self.store.checkpoint();
        let rows = self
            .remote
            .pull_changes(&self.user_id, checkpoint)
            .await?;
        let pulled = rows.len();
        for row in &rows {
            self.apply_row(row, &mut report);
        }

        // 4: drain out-of-band notifications and acknowledge them.
        self.drain_notifications(&mut report).await?;

        // 5: refresh the folder cache when its version is unknown or stale.
        self.refresh_folders().await;

        // 6: bootstrap fallback — a brand-new second device must not stay
        // empty just because the incremental window had nothing in it.
        if pulled == 0 && self.store.is_empty() {
            info!("incremental pull empty and store empty, running bootstrap fetch");
            let full = self.remote.pull_changes(&self.user_id, None).await?;
            for row in &full {
                self.apply_row(row, &mut report);
            }
            report.bootstrap_performed = true;
        }

        // 7: advance the checkpoint to the *start* of this cycle so edits
        // made while it ran are picked up by the next pull.
        self.store.advance_checkpoint(started_at);

        info!(
            acknowledged = report.commands_acknowledged,
            conflicts = report.conflicts_resolved,
            rows = report.rows_applied,
            "sync cycle completed"
        );
        Ok(report)
    }

    /// Submit queued commands in fixed-size batches and apply the results.
    async fn drain_queue(&self, report: &mut SyncReport) -> Result<()> {
        loop {
            let batch: Vec<Command> = self
                .store
                .pending_commands()
                .into_iter()
                .take(self.batch_size)
                .collect();
            if batch.is_empty() {
                return Ok(());
            }

            let by_id: HashMap<String, &Command> =
                batch.iter().map(|c| (c.command_id.clone(), c)).collect();
            report.commands_submitted += batch.len();
            let response = self.remote.submit_commands(&self.user_id, &batch).await?;

            let mut settled: HashSet<String> = HashSet::new();

            for ack in &response.succeeded {
                let Some(command) = by_id.get(&ack.command_id) else {
                    warn!(command_id = %ack.command_id, "authority acked unknown command");
                    continue;
                };
                match &command.kind {
                    CommandKind::Create { .. } | CommandKind::Update { .. } => {
                        // Echo fetch: close the window where server-assigned
                        // fields could diverge from the optimistic copy.
                        if let Some(row) =
                            self.remote.fetch_task(&self.user_id, &ack.entity_id).await?
                        {
                            self.apply_row(&row, report);
                        }
                    }
                    CommandKind::Delete { .. } => {
                        if self.store.remove_by_id(&ack.entity_id) {
                            report.rows_removed += 1;
                        }
                    }
                }
                let _ = settled.insert(ack.command_id.clone());
            }

            // Server-wins: the conflicting command is settled (it will not
            // be retried) and the authoritative row overwrites any local
            // pending edit for that entity.
            for conflict in &response.conflicts {
                warn!(
                    entity_id = %conflict.entity_id,
                    fields = ?conflict.conflicting_fields,
                    "conflict resolved server-wins"
                );
                counter!("skiff_sync_conflicts_total").increment(1);
                self.apply_row(&conflict.server_row, report);
                if let Some(command_id) = &conflict.command_id {
                    let _ = settled.insert(command_id.clone());
                }
                report.conflicts_resolved += 1;
            }

            for row in &response.server_changes {
                self.apply_row(row, report);
            }

            if settled.is_empty() {
                // Nothing settled: leave the batch queued for the next
                // cycle rather than spinning on it.
                warn!(batch = batch.len(), "authority settled no commands, stopping drain");
                return Ok(());
            }
            report.commands_acknowledged += settled.len();
            counter!("skiff_sync_commands_acked_total").increment(settled.len() as u64);
            self.store.remove_commands(&settled);
        }
    }

    /// Pull, surface, and acknowledge change notifications.
    async fn drain_notifications(&self, report: &mut SyncReport) -> Result<()> {
        let since = self.store.checkpoint();
        let notifications = self.remote.pull_notifications(&self.user_id, since).await?;
        if notifications.is_empty() {
            return Ok(());
        }
        for notification in &notifications {
            info!(
                notification_id = %notification.notification_id,
                event_type = %notification.event_type,
                entity_id = %notification.entity_id,
                "change notification received"
            );
        }
        let ids: Vec<String> = notifications
            .iter()
            .map(|n| n.notification_id.clone())
            .collect();
        self.remote
            .acknowledge_notifications(&self.user_id, &ids)
            .await?;
        report.notifications_acknowledged += ids.len();
        Ok(())
    }

    /// Refresh the folder cache; listing failures are swallowed so a
    /// folder outage never aborts a cycle that already synced task data.
    async fn refresh_folders(&self) {
        if self.cache.version().is_some() && !self.cache.is_stale() {
            return;
        }
        match self.remote.list_folders(&self.user_id).await {
            Ok(listing) => {
                if let Some(version) = listing.version.as_deref() {
                    if self.cache.has_version(version) {
                        debug!(version, "folder listing unchanged");
                        return;
                    }
                }
                if let Err(error) = self
                    .cache
                    .update(listing.folders.clone(), listing.version.clone())
                {
                    warn!(%error, "failed to persist refreshed folder cache");
                }
                self.store.set_folders(listing.folders);
            }
            Err(error) => warn!(%error, "folder refresh failed, keeping stale cache"),
        }
    }

    /// Apply one authoritative row: upsert, or hard-remove when flagged
    /// deleted. Rows that fail entity validation are skipped with a
    /// warning — a single bad row must not abort the cycle.
    fn apply_row(&self, row: &TaskRow, report: &mut SyncReport) {
        if row.deleted {
            if self.store.remove_by_id(&row.id) {
                report.rows_removed += 1;
            }
            return;
        }
        match row.to_task() {
            Ok(task) => {
                if self.store.upsert(task.with_sync_marker(SyncMarker::Cloud)) {
                    report.rows_applied += 1;
                }
            }
            Err(error) => warn!(row_id = %row.id, %error, "skipping undecodable remote row"),
        }
    }
}
