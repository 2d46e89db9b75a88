//! Intake rules: validation, idempotency, cancel legality, batch limits.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use courier_core::{
    storage::MemoryStore, CoreError, CreateNotificationRequest, ListFilter, NotificationId,
    NotificationStore, Status,
};
use courier_dispatch::{NotificationService, PriorityQueue};

fn request() -> CreateNotificationRequest {
    CreateNotificationRequest {
        channel: "sms".to_string(),
        recipient: "+905551234567".to_string(),
        content: "Hello".to_string(),
        priority: "normal".to_string(),
        scheduled_at: None,
    }
}

struct Setup {
    store: Arc<MemoryStore>,
    queue: Arc<PriorityQueue>,
    service: NotificationService,
}

fn setup() -> Setup {
    setup_with_capacity(1000)
}

fn setup_with_capacity(capacity: usize) -> Setup {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(PriorityQueue::with_capacities(capacity, capacity, capacity));
    let service = NotificationService::new(store.clone(), queue.clone());
    Setup { store, queue, service }
}

#[tokio::test]
async fn create_persists_and_enqueues() {
    let env = setup();

    let (n, duplicate) = env.service.create(request(), None).await.expect("create");
    assert!(!duplicate);
    assert_eq!(n.status, Status::Queued);
    assert_eq!(n.max_retries, 3);
    assert_eq!(n.retry_count, 0);
    assert_eq!(env.queue.depths(), (0, 1, 0));

    let row = env.store.get_by_id(n.id).await.expect("row persisted");
    assert_eq!(row.status, Status::Queued);
}

#[tokio::test]
async fn create_rejects_invalid_requests() {
    let env = setup();

    let mut bad_recipient = request();
    bad_recipient.recipient.clear();
    assert!(matches!(
        env.service.create(bad_recipient, None).await,
        Err(CoreError::InvalidRecipient)
    ));

    let mut bad_content = request();
    bad_content.content = "x".repeat(4097);
    assert!(matches!(
        env.service.create(bad_content, None).await,
        Err(CoreError::InvalidContent)
    ));

    let mut bad_channel = request();
    bad_channel.channel = "fax".to_string();
    assert!(matches!(
        env.service.create(bad_channel, None).await,
        Err(CoreError::InvalidChannel)
    ));

    let mut bad_priority = request();
    bad_priority.priority = "urgent".to_string();
    assert!(matches!(
        env.service.create(bad_priority, None).await,
        Err(CoreError::InvalidPriority)
    ));

    // Nothing was persisted or enqueued.
    let (_, total) =
        env.store.list(&ListFilter { page: 1, limit: 10, ..Default::default() }).await.unwrap();
    assert_eq!(total, 0);
    assert_eq!(env.queue.depths(), (0, 0, 0));
}

#[tokio::test]
async fn repeated_idempotency_key_returns_existing_row() {
    let env = setup();

    let (first, duplicate) =
        env.service.create(request(), Some("order-42")).await.expect("first create");
    assert!(!duplicate);

    let (second, duplicate) =
        env.service.create(request(), Some("order-42")).await.expect("replay");
    assert!(duplicate);
    assert_eq!(second.id, first.id);

    // Exactly one row exists.
    let (_, total) =
        env.store.list(&ListFilter { page: 1, limit: 10, ..Default::default() }).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn empty_idempotency_key_is_no_key() {
    let env = setup();

    let (first, _) = env.service.create(request(), Some("")).await.expect("create");
    let (second, duplicate) = env.service.create(request(), Some("")).await.expect("create");
    assert!(!duplicate);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn scheduled_request_bypasses_the_queue() {
    let env = setup();

    let mut deferred = request();
    deferred.scheduled_at = Some(Utc::now() + ChronoDuration::seconds(60));
    let (n, _) = env.service.create(deferred, None).await.expect("create");

    assert_eq!(n.status, Status::Scheduled);
    assert_eq!(env.queue.depths(), (0, 0, 0));
}

#[tokio::test]
async fn queue_full_leaves_row_pending() {
    let env = setup_with_capacity(1);

    let (first, _) = env.service.create(request(), None).await.expect("fills the tier");
    assert_eq!(first.status, Status::Queued);

    let (second, _) = env.service.create(request(), None).await.expect("still created");
    assert_eq!(second.status, Status::Pending);

    let row = env.store.get_by_id(second.id).await.expect("row persisted");
    assert_eq!(row.status, Status::Pending);
}

#[tokio::test]
async fn cancel_legality_follows_the_state_machine() {
    let env = setup();

    let (n, _) = env.service.create(request(), None).await.expect("create");
    env.service.cancel(n.id).await.expect("queued rows are cancellable");

    assert!(matches!(
        env.service.cancel(n.id).await,
        Err(CoreError::AlreadyCancelled)
    ));

    let (processing, _) = env.service.create(request(), None).await.expect("create");
    env.store.update_status(processing.id, Status::Processing).await.unwrap();
    assert!(matches!(
        env.service.cancel(processing.id).await,
        Err(CoreError::NotCancellable)
    ));

    let (sent, _) = env.service.create(request(), None).await.expect("create");
    env.store.mark_sent(sent.id, "msg-1", Utc::now()).await.unwrap();
    assert!(matches!(env.service.cancel(sent.id).await, Err(CoreError::NotCancellable)));

    let (failed, _) = env.service.create(request(), None).await.expect("create");
    env.store
        .schedule_retry(failed.id, 1, Utc::now() + ChronoDuration::seconds(5), "boom")
        .await
        .unwrap();
    env.service.cancel(failed.id).await.expect("failed rows awaiting retry are cancellable");

    assert!(matches!(
        env.service.cancel(NotificationId::new()).await,
        Err(CoreError::NotFound)
    ));
}

#[tokio::test]
async fn batch_rejects_empty_and_oversized() {
    let env = setup();

    assert!(matches!(
        env.service.create_batch(Vec::new()).await,
        Err(CoreError::BatchEmpty)
    ));

    let oversized = vec![request(); 1001];
    assert!(matches!(
        env.service.create_batch(oversized).await,
        Err(CoreError::BatchTooLarge)
    ));
}

#[tokio::test]
async fn invalid_item_aborts_whole_batch() {
    let env = setup();

    let mut bad = request();
    bad.content.clear();
    let err = env.service.create_batch(vec![request(), bad, request()]).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidContent));

    let (_, total) =
        env.store.list(&ListFilter { page: 1, limit: 10, ..Default::default() }).await.unwrap();
    assert_eq!(total, 0, "no child may be persisted when any item is invalid");
}

#[tokio::test]
async fn batch_creates_children_and_enqueues_immediate_ones() {
    let env = setup();

    let mut deferred = request();
    deferred.scheduled_at = Some(Utc::now() + ChronoDuration::seconds(60));
    let batch = env
        .service
        .create_batch(vec![request(), request(), deferred])
        .await
        .expect("batch create");

    assert_eq!(batch.total, 3);
    assert_eq!(batch.pending, 3);
    assert_eq!(batch.sent, 0);

    // Two immediate children on the queue; the deferred one waits for the
    // scheduled scheduler.
    assert_eq!(env.queue.depths(), (0, 2, 0));

    let (fetched, children) = env.service.get_batch(batch.id).await.expect("get batch");
    assert_eq!(fetched.total, 3);
    assert_eq!(children.len(), 3);
    assert_eq!(
        children.iter().filter(|c| c.status == Status::Queued).count(),
        2
    );
    assert_eq!(
        children.iter().filter(|c| c.status == Status::Scheduled).count(),
        1
    );
    assert!(children.iter().all(|c| c.batch_id == Some(batch.id)));
}
