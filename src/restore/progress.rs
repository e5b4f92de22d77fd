//! Restore progress as a whole, with a focus on media restore
//!
//! [`ArchiveRestoreProgress`] owns the persisted [`RestoreState`] and derives a
//! [`RestoreStatus`] for display. State only moves through the named
//! transitions; every transition and every change signal recomputes the
//! snapshot returned by [`ArchiveRestoreProgress::state`].
//!
//! While a media operation is in progress the machine listens to its
//! [`SignalSource`]s (attachment table changes, connectivity, battery) and
//! detaches otherwise, so repeated restore attempts never stack observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{debug, info, warn};

use crate::environment::{Clock, Environment, SignalSource};
use crate::error::{ArchiveError, ArchiveResult};
use crate::kv::BackupValues;
use crate::models::{MessageId, RestoreState};
use crate::storage::{messages, Database};

/// What a user should be told about the restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreStatus {
    #[default]
    None,
    Restoring,
    LowBattery,
    WaitingForInternet,
    WaitingForWifi,
    NotEnoughDiskSpace,
    Finished,
}

/// Immutable snapshot of restore progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRestoreProgressState {
    pub restore_state: RestoreState,
    /// Bytes of attachments still waiting to be downloaded
    pub remaining_bytes: u64,
    /// Persisted size of the current media restore
    pub total_bytes: u64,
    pub has_actively_restored_this_run: bool,
    pub total_to_restore_this_run: u64,
    pub restore_status: RestoreStatus,
}

impl ArchiveRestoreProgressState {
    /// Bytes downloaded so far in this run
    pub fn restored_bytes(&self) -> u64 {
        self.total_to_restore_this_run
            .saturating_sub(self.remaining_bytes)
    }
}

/// How [`ArchiveRestoreProgress::all_media_restored`] ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRestoreOutcome {
    Completed,
    Canceled,
    /// Nothing was in progress
    NoOp,
}

#[derive(Debug, Clone, Copy)]
struct DownloadDetails {
    start_ms: i64,
    network_finish_ms: i64,
    total_bytes: u64,
}

#[derive(Default)]
struct DownloadStats {
    process_start_ms: AtomicI64,
    total_attachments: AtomicU64,
    total_bytes: AtomicU64,
    in_flight: Mutex<HashMap<MessageId, DownloadDetails>>,
}

fn rate(bytes: u64, elapsed_ms: i64) -> u64 {
    if elapsed_ms <= 0 {
        return 0;
    }
    bytes.saturating_mul(1000) / elapsed_ms as u64
}

pub struct ArchiveRestoreProgress {
    db: Arc<Database>,
    backup: BackupValues,
    environment: Arc<dyn Environment>,
    signals: Vec<Arc<dyn SignalSource>>,
    clock: Arc<dyn Clock>,
    state: RwLock<Arc<ArchiveRestoreProgressState>>,
    update_lock: Mutex<()>,
    listeners_registered: Mutex<bool>,
    stats: DownloadStats,
    this: Weak<ArchiveRestoreProgress>,
}

impl ArchiveRestoreProgress {
    /// Build the machine from persisted state and compute the first status
    pub fn new(
        db: Arc<Database>,
        backup: BackupValues,
        environment: Arc<dyn Environment>,
        signals: Vec<Arc<dyn SignalSource>>,
        clock: Arc<dyn Clock>,
    ) -> ArchiveResult<Arc<Self>> {
        let total = backup.total_restoring_attachment_size()?;
        let initial = ArchiveRestoreProgressState {
            restore_state: backup.restore_state()?,
            remaining_bytes: total,
            total_bytes: total,
            has_actively_restored_this_run: total > 0,
            total_to_restore_this_run: total,
            restore_status: RestoreStatus::None,
        };

        let progress = Arc::new_cyclic(|this| Self {
            db,
            backup,
            environment,
            signals,
            clock,
            state: RwLock::new(Arc::new(initial)),
            update_lock: Mutex::new(()),
            listeners_registered: Mutex::new(false),
            stats: DownloadStats::default(),
            this: this.clone(),
        });
        progress.update()?;
        Ok(progress)
    }

    /// Current snapshot
    pub fn state(&self) -> Arc<ArchiveRestoreProgressState> {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn listeners_registered(&self) -> bool {
        self.listeners_registered
            .lock()
            .map(|registered| *registered)
            .unwrap_or(false)
    }

    fn pending_bytes(&self) -> ArchiveResult<u64> {
        let conn = self.db.lock()?;
        messages::pending_restore_bytes(&conn)
    }

    pub fn on_restore_pending(&self) -> ArchiveResult<()> {
        info!("Restore pending");
        self.backup.set_restore_state(RestoreState::Pending)?;
        self.update()
    }

    /// Any failure along the restore path returns the machine to `None`
    pub fn on_restore_failed(&self) -> ArchiveResult<()> {
        info!("Restore failed");
        self.backup.set_restore_state(RestoreState::None)?;
        self.update()
    }

    pub fn on_start_media_restore(&self) -> ArchiveResult<()> {
        info!("Starting media restore");
        self.backup.set_restore_state(RestoreState::CalculatingMedia)?;
        self.backup
            .set_total_restoring_attachment_size(self.pending_bytes()?)?;
        self.stats
            .process_start_ms
            .store(self.clock.now_ms(), Ordering::SeqCst);
        self.update()
    }

    pub fn on_restoring_media(&self) -> ArchiveResult<()> {
        info!("Restoring media");
        self.backup.set_restore_state(RestoreState::RestoringMedia)?;
        self.backup
            .set_total_restoring_attachment_size(self.pending_bytes()?)?;
        self.update()
    }

    pub fn on_restoring_db(&self) -> ArchiveResult<()> {
        info!("Restoring database");
        self.backup.set_restore_state(RestoreState::RestoringDb)?;
        self.update()
    }

    pub fn on_cancel_media_restore(&self) -> ArchiveResult<()> {
        info!("Canceling media restore");
        self.backup.set_restore_state(RestoreState::CancelingMedia)?;
        self.update()
    }

    /// End the media run; calling it again from `None` does nothing
    pub fn all_media_restored(&self) -> ArchiveResult<MediaRestoreOutcome> {
        let outcome = match self.backup.restore_state()? {
            RestoreState::None => return Ok(MediaRestoreOutcome::NoOp),
            RestoreState::CancelingMedia => {
                info!("All media canceled");
                self.replace_state(|state| {
                    if state.restore_state == RestoreState::CancelingMedia {
                        ArchiveRestoreProgressState {
                            has_actively_restored_this_run: false,
                            total_to_restore_this_run: 0,
                            ..state.clone()
                        }
                    } else {
                        state.clone()
                    }
                });
                MediaRestoreOutcome::Canceled
            }
            _ => {
                info!("All media restored");
                MediaRestoreOutcome::Completed
            }
        };

        self.backup.set_total_restoring_attachment_size(0)?;
        self.backup.set_restore_state(RestoreState::None)?;
        self.update()?;
        self.log_process_summary();
        Ok(outcome)
    }

    /// Recompute status without a state change
    pub fn force_update(&self) -> ArchiveResult<()> {
        self.update()
    }

    /// Acknowledge a finished restore so the status goes back to `None`
    pub fn clear_finished_status(&self) {
        self.replace_state(|state| {
            if state.restore_status == RestoreStatus::Finished {
                ArchiveRestoreProgressState {
                    restore_status: RestoreStatus::None,
                    has_actively_restored_this_run: false,
                    total_to_restore_this_run: 0,
                    ..state.clone()
                }
            } else {
                state.clone()
            }
        });
    }

    fn replace_state<F>(&self, f: F)
    where
        F: FnOnce(&ArchiveRestoreProgressState) -> ArchiveRestoreProgressState,
    {
        let mut slot = match self.state.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = f(&slot);
        *slot = Arc::new(next);
    }

    fn status_for(
        &self,
        restore_state: RestoreState,
        remaining: u64,
        previous: &ArchiveRestoreProgressState,
    ) -> ArchiveResult<RestoreStatus> {
        let env = &self.environment;
        let status = if !env.is_wifi_available() && !self.backup.restore_with_cellular()? {
            RestoreStatus::WaitingForWifi
        } else if !env.is_network_available() {
            RestoreStatus::WaitingForInternet
        } else if !env.is_battery_ok() {
            RestoreStatus::LowBattery
        } else if !env.is_disk_space_ok() {
            RestoreStatus::NotEnoughDiskSpace
        } else if restore_state == RestoreState::None {
            if previous.has_actively_restored_this_run {
                RestoreStatus::Finished
            } else {
                RestoreStatus::None
            }
        } else if remaining > env.available_disk_bytes() {
            RestoreStatus::NotEnoughDiskSpace
        } else {
            RestoreStatus::Restoring
        };
        Ok(status)
    }

    fn update(&self) -> ArchiveResult<()> {
        let _guard = self
            .update_lock
            .lock()
            .map_err(|e| ArchiveError::Storage(format!("Restore progress lock poisoned: {}", e)))?;

        let remaining = self.pending_bytes()?;
        let mut restore_state = self.backup.restore_state()?;

        if restore_state.is_media_restore_operation() {
            if remaining == 0 && self.backup.total_restoring_attachment_size()? == 0 {
                debug!(?restore_state, "Nothing left to restore");
                restore_state = RestoreState::None;
                self.backup.set_restore_state(restore_state)?;
                self.unregister_listeners();
            } else {
                self.register_listeners();
            }
        } else {
            self.unregister_listeners();
        }

        let previous = self.state();
        let status = self.status_for(restore_state, remaining, &previous)?;
        let total = self.backup.total_restoring_attachment_size()?;

        self.replace_state(|state| ArchiveRestoreProgressState {
            restore_state,
            remaining_bytes: remaining,
            total_bytes: total,
            has_actively_restored_this_run: state.has_actively_restored_this_run || total > 0,
            total_to_restore_this_run: if total > 0 {
                total
            } else {
                state.total_to_restore_this_run
            },
            restore_status: status,
        });
        Ok(())
    }

    fn register_listeners(&self) {
        let Ok(mut registered) = self.listeners_registered.lock() else {
            return;
        };
        if *registered {
            return;
        }
        info!(sources = self.signals.len(), "Registering restore progress listeners");
        for source in &self.signals {
            let this = self.this.clone();
            source.attach(Arc::new(move || {
                if let Some(progress) = this.upgrade() {
                    if let Err(e) = progress.update() {
                        warn!(error = %e, "Failed to refresh restore progress");
                    }
                }
            }));
        }
        *registered = true;
    }

    fn unregister_listeners(&self) {
        let Ok(mut registered) = self.listeners_registered.lock() else {
            return;
        };
        if !*registered {
            return;
        }
        info!("Unregistering restore progress listeners");
        for source in &self.signals {
            source.detach();
        }
        *registered = false;
    }

    // Download statistics, logged once per media run

    pub fn on_download_start(&self, message_id: MessageId) {
        if let Ok(mut in_flight) = self.stats.in_flight.lock() {
            in_flight.insert(
                message_id,
                DownloadDetails {
                    start_ms: self.clock.now_ms(),
                    network_finish_ms: 0,
                    total_bytes: 0,
                },
            );
        }
    }

    pub fn on_download_end(&self, message_id: MessageId, total_bytes: u64) {
        if let Ok(mut in_flight) = self.stats.in_flight.lock() {
            if let Some(details) = in_flight.get_mut(&message_id) {
                details.network_finish_ms = self.clock.now_ms();
                details.total_bytes = total_bytes;
            }
        }
    }

    /// Count a finished download and mark its attachments restored
    pub fn on_write_to_disk_end(&self, message_id: MessageId) -> ArchiveResult<()> {
        let details = self
            .stats
            .in_flight
            .lock()
            .ok()
            .and_then(|mut in_flight| in_flight.remove(&message_id));

        {
            let conn = self.db.lock()?;
            messages::mark_restored(&conn, message_id)?;
        }

        if let Some(details) = details {
            self.stats.total_attachments.fetch_add(1, Ordering::SeqCst);
            self.stats
                .total_bytes
                .fetch_add(details.total_bytes, Ordering::SeqCst);
            let now = self.clock.now_ms();
            debug!(
                %message_id,
                duration_ms = now - details.start_ms,
                total_bytes = details.total_bytes,
                network_rate = rate(details.total_bytes, details.network_finish_ms - details.start_ms),
                disk_rate = rate(details.total_bytes, now - details.network_finish_ms),
                "Attachment restored"
            );
        }
        Ok(())
    }

    /// (attachments, bytes) downloaded since the media run started
    pub fn download_totals(&self) -> (u64, u64) {
        (
            self.stats.total_attachments.load(Ordering::SeqCst),
            self.stats.total_bytes.load(Ordering::SeqCst),
        )
    }

    fn log_process_summary(&self) {
        let start = self.stats.process_start_ms.load(Ordering::SeqCst);
        let (attachments, bytes) = self.download_totals();
        if start <= 0 || attachments == 0 || bytes == 0 {
            warn!("Insufficient data to report download stats");
            return;
        }
        let elapsed = self.clock.now_ms() - start;
        info!(
            attachments,
            bytes,
            bytes_per_sec = rate(bytes, elapsed),
            "Restore finished"
        );
    }
}
