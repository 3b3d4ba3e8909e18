//! Synchronization engine.
//!
//! Orchestrates the two remote operations of the permission document:
//! load (remote → cache → table) and save (table → cache → remote,
//! backup first). Operations are fire-and-forget and never retried
//! automatically; completion and failure are reported on the per-call
//! event channel, so the caller stays responsive while a transfer runs.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::EventSender;
use crate::remote::{HttpRemoteStore, RemoteStore, TransferCallback};
use crate::table::PermissionTable;

/// Engine-wide operation slot. Only one remote operation may be
/// outstanding at a time: load and save both write the cache path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
pub enum SyncState {
    Idle,
    Loading,
    Saving,
}

pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    bucket: String,
    cache: LocalCache,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>, bucket: impl Into<String>, cache: LocalCache) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            cache,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// Wire up the HTTP store and cache path from a configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let store = HttpRemoteStore::new(config)?;
        let cache = LocalCache::new(config.resolve_cache_path()?);
        Ok(Self::new(Arc::new(store), config.bucket.clone(), cache))
    }

    pub fn state(&self) -> SyncState {
        *self.state_lock()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Pull the canonical object into the cache and parse it.
    ///
    /// The downloaded bytes are validated before the cache file is
    /// replaced, so a failed or malformed download leaves the previous
    /// good cache untouched.
    pub async fn load(&self, key: &str, events: &EventSender) -> Result<PermissionTable> {
        let result = self.load_inner(key, events).await;
        match &result {
            Ok(table) => {
                tracing::info!(key, records = table.len(), "permission document loaded");
                events.completed();
            }
            Err(error) => {
                tracing::warn!(key, %error, "load failed");
                events.failed(error);
            }
        }
        result
    }

    async fn load_inner(&self, key: &str, events: &EventSender) -> Result<PermissionTable> {
        let _in_flight = self.begin(SyncState::Loading)?;

        self.cache.ensure_parent()?;
        events.indeterminate();

        let bytes = self
            .store
            .fetch_object(&self.bucket, key, Some(scaled_callback(events.clone(), 0.0, 1.0)))
            .await?;

        // Validate before touching the cache file.
        let table = PermissionTable::from_slice(&bytes)?;
        self.cache.write_bytes_atomic(&bytes)?;
        Ok(table)
    }

    /// Commit the table: serialize into the cache, upload the pre-save
    /// cache content to the backup slot, then overwrite the canonical
    /// object.
    ///
    /// The backup upload is a hard precondition for the canonical one,
    /// so the canonical object is unchanged whenever this fails. The
    /// cache, however, already holds the new content: a failed save is
    /// "local draft updated, remote unchanged" and may be retried
    /// whole.
    pub async fn save(
        &self,
        table: &PermissionTable,
        backup_key: &str,
        canonical_key: &str,
        events: &EventSender,
    ) -> Result<()> {
        let result = self
            .save_inner(table, backup_key, canonical_key, events)
            .await;
        match &result {
            Ok(()) => {
                tracing::info!(canonical_key, backup_key, "permission document saved");
                events.completed();
            }
            Err(error) => {
                tracing::warn!(canonical_key, %error, "save failed");
                events.failed(error);
            }
        }
        result
    }

    async fn save_inner(
        &self,
        table: &PermissionTable,
        backup_key: &str,
        canonical_key: &str,
        events: &EventSender,
    ) -> Result<()> {
        let _in_flight = self.begin(SyncState::Saving)?;

        // Last known good before this save; goes to the backup slot
        // before the canonical object is overwritten.
        let previous = self.cache.read_bytes()?;

        let bytes = table.to_json_bytes()?;
        self.cache.write_bytes_atomic(&bytes)?;

        self.store
            .put_object(
                &self.bucket,
                backup_key,
                previous,
                Some(scaled_callback(events.clone(), 0.0, 0.5)),
            )
            .await?;

        self.store
            .put_object(
                &self.bucket,
                canonical_key,
                bytes,
                Some(scaled_callback(events.clone(), 0.5, 0.5)),
            )
            .await?;

        Ok(())
    }

    fn state_lock(&self) -> MutexGuard<'_, SyncState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Claim the operation slot, or fail Busy. The returned guard puts
    // the engine back to Idle on every exit path.
    fn begin(&self, next: SyncState) -> Result<impl Drop + '_> {
        let mut state = self.state_lock();
        if *state != SyncState::Idle {
            return Err(SyncError::Busy(state.to_string()));
        }
        *state = next;
        drop(state);

        tracing::debug!(%next, "sync operation started");
        Ok(scopeguard::guard((), move |_| {
            *self.state_lock() = SyncState::Idle;
        }))
    }
}

// Map a transfer's byte counts into the operation's progress window.
fn scaled_callback(events: EventSender, base: f64, span: f64) -> TransferCallback {
    Arc::new(move |transferred, total| match total {
        Some(total) if total > 0 => {
            events.fraction(base + span * (transferred as f64 / total as f64));
        }
        _ => events.indeterminate(),
    })
}
