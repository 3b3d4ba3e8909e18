//! Synchronization core of a permission-table editor.
//!
//! The source of truth is a single JSON object in a remote object
//! store, mirrored into a local on-disk cache. [`SyncEngine`] moves the
//! document between store, cache and memory; [`EditSession`] tracks the
//! Clean/Dirty/Committing lifecycle of in-memory edits; saving backs up
//! the previous canonical object before overwriting it. A presentation
//! shell (table window, edit dialog, progress overlay) sits on top and
//! drives the session, observing progress through per-call event
//! channels.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod remote;
pub mod roles;
pub mod session;
pub mod table;

pub use cache::LocalCache;
pub use config::{BackupSlot, SyncConfig, DEFAULT_BACKUP_KEY, DEFAULT_CANONICAL_KEY};
pub use engine::{SyncEngine, SyncState};
pub use error::{Result, SyncError};
pub use events::{EventSender, OperationKind, SyncEvent, TransferProgress};
pub use remote::{HttpRemoteStore, RemoteStore, TransferCallback};
pub use roles::{Role, RoleChoices};
pub use session::{EditSession, Phase};
pub use table::{PermissionRecord, PermissionTable};
