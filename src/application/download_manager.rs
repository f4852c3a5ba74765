//! The download manager: a per-identifier state machine over the transfer
//! primitives, with de-duplication, progress propagation, and timed cleanup
//! of terminal entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{DownloadError, TransferState, TransferStatus, TransferTarget};
use crate::transfer::{TransferClient, TransferStrategy, DEFAULT_STRATEGIES};
use crate::validation::{
    sanitize_file_name, validate_declared_type, validate_target_url, DEFAULT_MAX_FILE_SIZE,
};

pub type ProgressHook = Arc<dyn Fn(u8) + Send + Sync>;
pub type SuccessHook = Arc<dyn Fn(Bytes) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&DownloadError) + Send + Sync>;

/// Caller notification hooks. Invoked at the matching transition points;
/// they never influence manager state.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    pub on_progress: Option<ProgressHook>,
    /// Receives the downloaded bytes on completion.
    pub on_success: Option<SuccessHook>,
    pub on_error: Option<ErrorHook>,
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Base for resolving site-relative target URLs.
    pub base_origin: String,
    /// Upper bound on declared and actual body size, in bytes.
    pub max_file_size: u64,
    /// How long a completed (or cancelled) entry stays visible.
    pub completed_retention: Duration,
    /// How long a failed entry stays visible.
    pub failed_retention: Duration,
    /// Transfer mechanisms, tried in order.
    pub strategies: Vec<TransferStrategy>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_origin: "http://localhost:8080/".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            completed_retention: Duration::from_secs(3),
            failed_retention: Duration::from_secs(8),
            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }
}

struct Entry {
    state: TransferState,
    cancel: CancellationToken,
    /// Identifies which start() owns this entry. A stale pipeline or
    /// eviction task whose epoch no longer matches must not touch it.
    epoch: u64,
}

struct ManagerInner {
    client: TransferClient,
    config: DownloadConfig,
    entries: Mutex<HashMap<String, Entry>>,
    next_epoch: AtomicU64,
}

/// Tracks every in-flight download by an opaque caller-chosen identifier.
///
/// Cheap to clone; all clones share the same state map.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new(DownloadConfig::default())
    }
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                client: TransferClient::new(),
                config,
                entries: Mutex::new(HashMap::new()),
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Begin a download for `identifier`.
    ///
    /// Returns `false` without creating anything if a download for the same
    /// identifier is still preparing or downloading. Otherwise the entry is
    /// registered synchronously and the pipeline runs on a spawned task, so
    /// this must be called from within a tokio runtime.
    pub fn start(
        &self,
        identifier: impl Into<String>,
        target: TransferTarget,
        options: DownloadOptions,
    ) -> bool {
        let identifier = identifier.into();
        let cancel = CancellationToken::new();
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.inner.entries.lock();
            if let Some(existing) = entries.get(&identifier) {
                if existing.state.status.is_active() {
                    debug!(identifier = %identifier, "start rejected: already active");
                    return false;
                }
            }
            // Replacing a terminal entry that has not been evicted yet is
            // fine; the epoch guard turns its pending eviction into a no-op.
            entries.insert(
                identifier.clone(),
                Entry {
                    state: TransferState::new(identifier.clone(), &target),
                    cancel: cancel.clone(),
                    epoch,
                },
            );
        }

        info!(identifier = %identifier, url = %target.url, "download started");
        let manager = self.clone();
        tokio::spawn(async move {
            manager
                .run_pipeline(identifier, epoch, target, options, cancel)
                .await;
        });
        true
    }

    /// Force an active download into the error state with the fixed
    /// cancellation message and schedule its prompt removal.
    ///
    /// The in-flight transfer is told to abort through its cancellation
    /// token and stops at its next suspension point. No-op for unknown or
    /// already-terminal identifiers.
    pub fn cancel(&self, identifier: &str) {
        let cancelled = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(identifier) {
                Some(entry) if entry.state.status.is_active() => {
                    entry.cancel.cancel();
                    entry.state.fail(&DownloadError::Cancelled);
                    Some(entry.epoch)
                }
                _ => None,
            }
        };

        if let Some(epoch) = cancelled {
            info!(identifier = %identifier, "download cancelled");
            self.schedule_removal(
                identifier.to_string(),
                epoch,
                self.inner.config.completed_retention,
            );
        }
    }

    /// Read-only snapshot of one entry.
    pub fn get(&self, identifier: &str) -> Option<TransferState> {
        self.inner
            .entries
            .lock()
            .get(identifier)
            .map(|entry| entry.state.clone())
    }

    /// True iff the identifier is currently preparing or downloading.
    pub fn is_active(&self, identifier: &str) -> bool {
        self.inner
            .entries
            .lock()
            .get(identifier)
            .map(|entry| entry.state.status.is_active())
            .unwrap_or(false)
    }

    /// Snapshot of every tracked entry, in no particular order.
    pub fn list(&self) -> Vec<TransferState> {
        self.inner
            .entries
            .lock()
            .values()
            .map(|entry| entry.state.clone())
            .collect()
    }

    async fn run_pipeline(
        &self,
        identifier: String,
        epoch: u64,
        target: TransferTarget,
        options: DownloadOptions,
        cancel: CancellationToken,
    ) {
        let display_name = sanitize_file_name(&target.suggested_name);
        self.update_active(&identifier, epoch, |state| {
            state.display_name = display_name.clone();
        });

        let url = match validate_target_url(&target.url, &self.inner.config.base_origin) {
            Ok(url) => url,
            Err(e) => return self.finish_error(&identifier, epoch, e, &options),
        };

        if let Err(e) = validate_declared_type(
            &display_name,
            target.declared_type.as_deref(),
            target.declared_size,
            self.inner.config.max_file_size,
        ) {
            return self.finish_error(&identifier, epoch, e, &options);
        }

        let entered_download = self.update_active(&identifier, epoch, |state| {
            state.status = TransferStatus::Downloading;
            state.progress = 0;
        });
        if !entered_download {
            // Cancelled or replaced before any network work began.
            return;
        }

        let mut last_error = DownloadError::Network("no transfer strategy configured".to_string());
        for (attempt, strategy) in self.inner.config.strategies.iter().enumerate() {
            if attempt > 0 {
                debug!(identifier = %identifier, ?strategy, "falling back to next strategy");
            }

            let manager = self.clone();
            let id = identifier.clone();
            let progress_hook = options.on_progress.clone();
            let result = self
                .inner
                .client
                .transfer(
                    *strategy,
                    &url,
                    self.inner.config.max_file_size,
                    &cancel,
                    move |percent| {
                        manager.update_active(&id, epoch, |state| state.progress = percent);
                        if let Some(hook) = &progress_hook {
                            hook(percent);
                        }
                    },
                )
                .await;

            match result {
                Ok(bytes) => return self.finish_success(&identifier, epoch, bytes, &options),
                Err(e) => {
                    warn!(identifier = %identifier, ?strategy, error = %e, "transfer attempt failed");
                    let fatal = e.is_fatal_for_fallback();
                    last_error = e;
                    if fatal {
                        break;
                    }
                }
            }
        }

        self.finish_error(&identifier, epoch, last_error, &options);
    }

    fn finish_success(&self, identifier: &str, epoch: u64, bytes: Bytes, options: &DownloadOptions) {
        let committed = self.update_active(identifier, epoch, |state| {
            state.status = TransferStatus::Completed;
            state.progress = 100;
        });
        if !committed {
            // Cancelled between the last chunk and the commit.
            return;
        }

        info!(identifier = %identifier, bytes = bytes.len(), "download completed");
        if let Some(hook) = &options.on_success {
            hook(bytes);
        }
        self.schedule_removal(
            identifier.to_string(),
            epoch,
            self.inner.config.completed_retention,
        );
    }

    fn finish_error(
        &self,
        identifier: &str,
        epoch: u64,
        error: DownloadError,
        options: &DownloadOptions,
    ) {
        let committed = self.update_active(identifier, epoch, |state| state.fail(&error));

        if let Some(hook) = &options.on_error {
            hook(&error);
        }

        // When cancel() already moved the entry to the error state, it also
        // scheduled the removal; nothing more to do here.
        if committed {
            warn!(identifier = %identifier, error = %error, "download failed");
            self.schedule_removal(
                identifier.to_string(),
                epoch,
                self.inner.config.failed_retention,
            );
        }
    }

    /// Apply `f` iff the entry still belongs to this pipeline's epoch and
    /// has not reached a terminal state. Returns whether it applied.
    fn update_active<F>(&self, identifier: &str, epoch: u64, f: F) -> bool
    where
        F: FnOnce(&mut TransferState),
    {
        let mut entries = self.inner.entries.lock();
        match entries.get_mut(identifier) {
            Some(entry) if entry.epoch == epoch && entry.state.status.is_active() => {
                f(&mut entry.state);
                true
            }
            _ => false,
        }
    }

    fn schedule_removal(&self, identifier: String, epoch: u64, delay: Duration) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut entries = inner.entries.lock();
            let still_ours = entries
                .get(&identifier)
                .map(|entry| entry.epoch == epoch)
                .unwrap_or(false);
            if still_ours {
                entries.remove(&identifier);
                debug!(identifier = %identifier, "entry evicted");
            }
        });
    }
}
