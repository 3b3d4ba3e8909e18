//! Progress and outcome events for sync operations.
//!
//! Every load/save call gets its own channel: the consumer (a UI shell
//! or a test) subscribes per call and owns how it reacts. Events carry
//! a monotonically non-decreasing fraction in [0, 1] (or an
//! indeterminate marker before the first measurable chunk) and exactly
//! one terminal event per operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::error::SyncError;

/// Which remote operation an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OperationKind {
    Load,
    Save,
}

/// Transfer progress for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum TransferProgress {
    /// Transfer started but the total size is not known yet.
    Indeterminate,
    /// Fraction of the operation completed, in [0, 1].
    Fraction(f64),
}

/// Event stream of a single load or save operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum SyncEvent {
    Progress(TransferProgress),
    Completed(OperationKind),
    Failed { kind: OperationKind, reason: String },
}

struct SenderInner {
    kind: OperationKind,
    tx: mpsc::UnboundedSender<SyncEvent>,
    // Last fraction emitted; None until the first one.
    last_fraction: Mutex<Option<f64>>,
    terminal_sent: AtomicBool,
}

/// Per-operation event emitter handed to the sync engine.
///
/// Clamps fractions into [0, 1], drops regressing updates and
/// suppresses everything after the terminal event.
#[derive(Clone)]
pub struct EventSender {
    inner: Option<Arc<SenderInner>>,
    kind: OperationKind,
}

impl EventSender {
    /// Create a sender/receiver pair for one operation.
    pub fn channel(kind: OperationKind) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self {
            inner: Some(Arc::new(SenderInner {
                kind,
                tx,
                last_fraction: Mutex::new(None),
                terminal_sent: AtomicBool::new(false),
            })),
            kind,
        };
        (sender, rx)
    }

    /// A sender that discards every event, for callers that do not
    /// observe progress.
    pub fn disabled(kind: OperationKind) -> Self {
        Self { inner: None, kind }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    fn last_fraction(inner: &SenderInner) -> MutexGuard<'_, Option<f64>> {
        inner
            .last_fraction
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emit the indeterminate marker. Only delivered before the first
    /// fraction and before the terminal event.
    pub fn indeterminate(&self) {
        let Some(inner) = &self.inner else { return };
        if inner.terminal_sent.load(Ordering::SeqCst) {
            return;
        }
        let last = Self::last_fraction(inner);
        if last.is_none() {
            let _ = inner
                .tx
                .send(SyncEvent::Progress(TransferProgress::Indeterminate));
        }
    }

    /// Emit a progress fraction. Values are clamped into [0, 1];
    /// regressions against the previous fraction are dropped.
    pub fn fraction(&self, fraction: f64) {
        let Some(inner) = &self.inner else { return };
        if inner.terminal_sent.load(Ordering::SeqCst) {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let mut last = Self::last_fraction(inner);
        if last.is_some_and(|previous| fraction < previous) {
            return;
        }
        *last = Some(fraction);
        let _ = inner
            .tx
            .send(SyncEvent::Progress(TransferProgress::Fraction(fraction)));
    }

    /// Emit the successful terminal event. At most one terminal event
    /// is ever delivered per operation.
    pub(crate) fn completed(&self) {
        let Some(inner) = &self.inner else { return };
        if inner.terminal_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = inner.tx.send(SyncEvent::Completed(inner.kind));
    }

    /// Emit the failed terminal event.
    pub(crate) fn failed(&self, error: &SyncError) {
        let Some(inner) = &self.inner else { return };
        if inner.terminal_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = inner.tx.send(SyncEvent::Failed {
            kind: inner.kind,
            reason: error.to_string(),
        });
    }
}
