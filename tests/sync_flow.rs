//! End-to-end lifecycle of the sync core against an in-memory store:
//! load → edit → save → cancel, plus the failure paths a shell has to
//! survive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use permsync::{
    BackupSlot, EditSession, EventSender, LocalCache, OperationKind, Phase, RemoteStore, Result,
    SyncEngine, SyncError, SyncEvent, TransferCallback, TransferProgress,
};

const BUCKET: &str = "perm-bucket";
const CANONICAL: &str = "InHouseTool/permissions.json";
const BACKUP: &str = "InHouseTool/backup/permissions.json";

const DOC: &str = r#"{
    "Permissions": {
        "Upload": {"DefaultValue": false, "AllowedRoles": ["SW", "HW"]}
    }
}"#;

#[derive(Default)]
struct InMemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_next_put: AtomicBool,
}

impl InMemoryStore {
    fn seed(&self, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", BUCKET, key), bytes.to_vec());
    }

    fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", BUCKET, key))
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        progress: Option<TransferCallback>,
    ) -> Result<Vec<u8>> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, key))
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("{}/{}", bucket, key)))?;
        if let Some(callback) = &progress {
            let total = bytes.len() as u64;
            callback(total / 2, Some(total));
            callback(total, Some(total));
        }
        Ok(bytes)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        progress: Option<TransferCallback>,
    ) -> Result<()> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(SyncError::Network("simulated outage".to_string()));
        }
        if let Some(callback) = &progress {
            let total = bytes.len() as u64;
            callback(total, Some(total));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, key), bytes);
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    session: EditSession,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryStore::default());
    store.seed(CANONICAL, DOC.as_bytes());

    let dir = tempfile::tempdir().unwrap();
    let cache = LocalCache::new(dir.path().join("cache").join("permissions.json"));
    let engine = Arc::new(SyncEngine::new(store.clone(), BUCKET, cache));
    let session = EditSession::new(
        engine,
        CANONICAL,
        BackupSlot::Fixed {
            key: BACKUP.to_string(),
        },
    );
    Harness {
        store,
        session,
        _dir: dir,
    }
}

fn assert_well_formed_event_stream(events: &[SyncEvent]) {
    let terminals = events
        .iter()
        .filter(|event| matches!(event, SyncEvent::Completed(_) | SyncEvent::Failed { .. }))
        .count();
    assert_eq!(terminals, 1, "exactly one terminal event: {:?}", events);
    assert!(
        matches!(
            events.last(),
            Some(SyncEvent::Completed(_) | SyncEvent::Failed { .. })
        ),
        "terminal event comes last: {:?}",
        events
    );

    let mut previous = 0.0_f64;
    let mut saw_fraction = false;
    for event in events {
        match event {
            SyncEvent::Progress(TransferProgress::Fraction(fraction)) => {
                assert!(*fraction >= previous, "regressing fraction in {:?}", events);
                assert!((0.0..=1.0).contains(fraction));
                previous = *fraction;
                saw_fraction = true;
            }
            SyncEvent::Progress(TransferProgress::Indeterminate) => {
                assert!(!saw_fraction, "indeterminate after a fraction: {:?}", events);
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn full_edit_lifecycle() {
    let mut hx = harness();

    // Load pulls the canonical document and settles Clean.
    let (events, mut rx) = EventSender::channel(OperationKind::Load);
    hx.session.load(&events).await.unwrap();
    assert_eq!(hx.session.phase(), Phase::Clean);
    assert_eq!(hx.session.table().unwrap().len(), 1);

    let mut load_events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        load_events.push(event);
    }
    assert_well_formed_event_stream(&load_events);
    assert_eq!(
        load_events.last(),
        Some(&SyncEvent::Completed(OperationKind::Load))
    );

    // One edit makes the session Dirty.
    hx.session
        .edit("Upload", true, vec!["SW".to_string()])
        .unwrap();
    assert_eq!(hx.session.phase(), Phase::Dirty);

    // Save publishes the new document and snapshots the old one.
    let (events, mut rx) = EventSender::channel(OperationKind::Save);
    hx.session.save(&events).await.unwrap();
    assert_eq!(hx.session.phase(), Phase::Clean);

    let mut save_events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        save_events.push(event);
    }
    assert_well_formed_event_stream(&save_events);

    let published: serde_json::Value =
        serde_json::from_slice(&hx.store.object(CANONICAL).unwrap()).unwrap();
    assert_eq!(
        published,
        serde_json::json!({
            "Permissions": {
                "Upload": {"DefaultValue": true, "AllowedRoles": ["SW"]}
            }
        })
    );
    assert_eq!(hx.store.object(BACKUP), Some(DOC.as_bytes().to_vec()));

    // A further edit cancelled reverts to the committed state.
    hx.session
        .edit("Upload", false, vec!["HW".to_string()])
        .unwrap();
    hx.session.cancel().unwrap();
    assert_eq!(hx.session.phase(), Phase::Clean);
    let record = hx.session.table().unwrap().get("Upload").unwrap();
    assert!(record.default_value());
    assert_eq!(record.allowed_roles(), ["SW".to_string()]);
}

#[tokio::test]
async fn failed_save_keeps_edits_and_a_retry_succeeds() {
    let mut hx = harness();
    hx.session
        .load(&EventSender::disabled(OperationKind::Load))
        .await
        .unwrap();
    hx.session
        .edit("Upload", true, vec!["SW".to_string()])
        .unwrap();

    // First save attempt dies on the backup upload.
    hx.store.fail_next_put.store(true, Ordering::SeqCst);
    let err = hx
        .session
        .save(&EventSender::disabled(OperationKind::Save))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
    assert_eq!(hx.session.phase(), Phase::Dirty);
    // Remote canonical unchanged by the failed attempt.
    assert_eq!(hx.store.object(CANONICAL), Some(DOC.as_bytes().to_vec()));

    // Retrying the whole save goes through.
    hx.session
        .save(&EventSender::disabled(OperationKind::Save))
        .await
        .unwrap();
    assert_eq!(hx.session.phase(), Phase::Clean);

    let published: serde_json::Value =
        serde_json::from_slice(&hx.store.object(CANONICAL).unwrap()).unwrap();
    assert_eq!(
        published["Permissions"]["Upload"]["DefaultValue"],
        serde_json::Value::Bool(true)
    );
}

#[tokio::test]
async fn load_failure_never_corrupts_the_cache_or_table() {
    let mut hx = harness();
    hx.session
        .load(&EventSender::disabled(OperationKind::Load))
        .await
        .unwrap();
    let loaded = hx.session.table().unwrap().clone();

    // The remote object turns into garbage; a reload must fail without
    // touching the table or the cached copy.
    hx.store.seed(CANONICAL, b"not json at all");
    let err = hx
        .session
        .load(&EventSender::disabled(OperationKind::Load))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Parse(_)));
    assert_eq!(hx.session.table().unwrap(), &loaded);

    // Cancel still reverts from the intact cache.
    hx.session
        .edit("Upload", true, vec!["SW".to_string()])
        .unwrap();
    hx.session.cancel().unwrap();
    assert_eq!(hx.session.table().unwrap(), &loaded);
}
