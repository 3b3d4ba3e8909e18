//! Edit session over the permission table.
//!
//! The session owns the in-memory table and tracks whether it is in
//! step with the cache (`Clean`), carries unsaved edits (`Dirty`) or is
//! mid-commit (`Committing`). A presentation shell drives it with one
//! method per user action and subscribes to the per-call event channel
//! for progress and terminal outcomes.

use std::sync::Arc;

use crate::config::BackupSlot;
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::events::EventSender;
use crate::roles::{self, RoleChoices};
use crate::table::PermissionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
pub enum Phase {
    Clean,
    Dirty,
    Committing,
}

pub struct EditSession {
    engine: Arc<SyncEngine>,
    canonical_key: String,
    backup: BackupSlot,
    table: Option<PermissionTable>,
    phase: Phase,
}

impl EditSession {
    pub fn new(
        engine: Arc<SyncEngine>,
        canonical_key: impl Into<String>,
        backup: BackupSlot,
    ) -> Self {
        Self {
            engine,
            canonical_key: canonical_key.into(),
            backup,
            table: None,
            phase: Phase::Clean,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// The current table. Shared references only: the table is owned by
    /// the session and mutated exclusively through [`Self::edit`].
    pub fn table(&self) -> Option<&PermissionTable> {
        self.table.as_ref()
    }

    /// Pull the canonical document and replace the in-memory table.
    ///
    /// A failed load leaves a previously loaded table untouched. When
    /// no table existed yet the failure surfaces as `Unloaded`; only an
    /// externally triggered retry recovers from that.
    pub async fn load(&mut self, events: &EventSender) -> Result<()> {
        match self.phase {
            Phase::Committing => return Err(SyncError::Busy("commit".to_string())),
            Phase::Dirty => {
                return Err(SyncError::Validation(
                    "Unsaved edits present; save or cancel first".to_string(),
                ))
            }
            Phase::Clean => {}
        }

        match self.engine.load(&self.canonical_key, events).await {
            Ok(table) => {
                self.table = Some(table);
                self.phase = Phase::Clean;
                Ok(())
            }
            Err(error) if self.table.is_some() => Err(error),
            Err(error) => Err(SyncError::Unloaded(error.to_string())),
        }
    }

    /// Replace one record's default value and role set wholesale. The
    /// record name is the immutable key and must already exist.
    pub fn edit(&mut self, name: &str, default_value: bool, allowed_roles: Vec<String>) -> Result<()> {
        if self.phase == Phase::Committing {
            return Err(SyncError::Busy("commit".to_string()));
        }
        if name.trim().is_empty() {
            return Err(SyncError::Validation(
                "Permission name must not be empty".to_string(),
            ));
        }
        let table = self.table.as_mut().ok_or_else(|| {
            SyncError::Unloaded("load the permission table before editing".to_string())
        })?;

        table.replace(name, default_value, allowed_roles)?;
        self.phase = Phase::Dirty;
        tracing::debug!(name, default_value, "permission record edited");
        Ok(())
    }

    /// Commit pending edits through the engine's backup-then-overwrite
    /// sequence. Success returns the session to `Clean`; failure keeps
    /// the edits and the `Dirty` phase so the caller may retry or
    /// cancel.
    pub async fn save(&mut self, events: &EventSender) -> Result<()> {
        match self.phase {
            Phase::Committing => return Err(SyncError::Busy("commit".to_string())),
            Phase::Clean => {
                tracing::debug!("save requested with no pending edits");
                return Ok(());
            }
            Phase::Dirty => {}
        }
        let Some(table) = self.table.as_ref() else {
            return Err(SyncError::Unloaded(
                "no permission table to save".to_string(),
            ));
        };

        self.phase = Phase::Committing;
        let backup_key = self.backup.resolve();
        let result = self
            .engine
            .save(table, &backup_key, &self.canonical_key, events)
            .await;
        self.phase = if result.is_ok() {
            Phase::Clean
        } else {
            Phase::Dirty
        };
        result
    }

    /// Discard unsaved edits and restore the table from the local
    /// cache. A local revert only: the remote store is never touched.
    pub fn cancel(&mut self) -> Result<()> {
        match self.phase {
            Phase::Committing => return Err(SyncError::Busy("commit".to_string())),
            Phase::Clean => return Ok(()),
            Phase::Dirty => {}
        }

        let restored = self.engine.cache().read()?;
        self.table = Some(restored);
        self.phase = Phase::Clean;
        tracing::info!("edits discarded, table restored from local cache");
        Ok(())
    }

    /// Assigned/available role split for one record's edit dialog.
    /// Roles outside the vocabulary stay on the assigned side.
    pub fn role_choices(&self, name: &str) -> Result<RoleChoices> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| SyncError::Unloaded("no permission table loaded".to_string()))?;
        let record = table
            .get(name)
            .ok_or_else(|| SyncError::Validation(format!("Permission not found: {}", name)))?;
        Ok(roles::partition(record.allowed_roles()))
    }
}
