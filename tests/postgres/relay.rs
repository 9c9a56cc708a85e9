use futures::StreamExt;
use sqlx::{Pool, Postgres};

use txoutbox::relay::{OutboxRelay, RelayConfig};
use txoutbox::store::postgres::{PgOutboxStore, PgOutboxStoreBuilder};
use txoutbox::store::OutboxStore;
use txoutbox::{DeliveryState, OutboxMessage, Session, UnitOfWork};

use crate::hr::{handlers, registry, Employee, EmployeeHired, RecordingBus};

async fn store(pool: &Pool<Postgres>) -> PgOutboxStore {
    PgOutboxStoreBuilder::new(pool.clone())
        .with_name("hr")
        .try_build()
        .await
        .unwrap()
}

async fn hire(store: &PgOutboxStore, name: &str) -> Employee {
    let mut employee = Employee::hire(name);
    UnitOfWork::new(store.begin().await.unwrap(), handlers())
        .commit(&mut [&mut employee])
        .await
        .unwrap();
    employee
}

#[sqlx::test]
async fn relay_marks_published_messages_as_processed_test(pool: Pool<Postgres>) {
    let store = store(&pool).await;
    let bus = RecordingBus::new();
    let relay = OutboxRelay::new(store.clone(), bus.clone(), registry(), RelayConfig::default()).unwrap();

    let _ = hire(&store, "Ada").await;
    let _ = hire(&store, "Grace").await;
    let stale: Vec<OutboxMessage> = store.fetch_pending(10, 5).await.unwrap();

    let report = relay.tick().await.unwrap();
    assert_eq!(report.processed, 2);
    assert!(relay.tick().await.unwrap().is_idle());

    // Writing back the pending copies must not reset the processed rows.
    assert_eq!(store.record_outcomes(&stale).await.unwrap(), 0);

    for message in stale {
        let stored = store.find(message.id()).await.unwrap().unwrap();
        assert!(matches!(stored.state(5), DeliveryState::Processed { .. }));
    }

    assert_eq!(
        store
            .delete_processed_before(chrono::Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap(),
        2
    );
}

#[sqlx::test]
async fn dead_letters_are_listed_and_streamed_test(pool: Pool<Postgres>) {
    let store = store(&pool).await;
    let bus = RecordingBus::failing(usize::MAX);
    let config = RelayConfig::builder().max_attempts(2).build();
    let relay = OutboxRelay::new(store.clone(), bus.clone(), registry(), config).unwrap();

    let _ = hire(&store, "Ada").await;
    let mut session = store.begin().await.unwrap();
    session
        .stage(OutboxMessage::new("hr.employee_fired", "{}"))
        .await
        .unwrap();
    session.commit().await.unwrap();

    let report = relay.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.dead_lettered, 1);

    let report = relay.tick().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert!(relay.tick().await.unwrap().is_idle());

    let dead_letters: Vec<OutboxMessage> = store.dead_letters(2, 10).await.unwrap();
    assert_eq!(dead_letters.len(), 2);
    assert!(dead_letters
        .iter()
        .all(|message| message.error().is_some() && message.attempt_count() == 2));

    let streamed: Vec<OutboxMessage> = store
        .stream_dead_letters(2)
        .map(|message| message.unwrap())
        .collect()
        .await;
    assert_eq!(streamed, dead_letters);

    assert_eq!(store.dead_letters(2, 1).await.unwrap().len(), 1);
}

#[sqlx::test]
async fn mixed_batch_outcomes_are_written_together_test(pool: Pool<Postgres>) {
    let store = store(&pool).await;
    let bus = RecordingBus::failing(1);
    let relay = OutboxRelay::new(store.clone(), bus.clone(), registry(), RelayConfig::default()).unwrap();

    let ada = hire(&store, "Ada").await;
    let _ = hire(&store, "Grace").await;
    let _ = hire(&store, "Barbara").await;

    let poisoned = OutboxMessage::new("hr.employee_fired", "{}");
    let mut session = store.begin().await.unwrap();
    session.stage(poisoned.clone()).await.unwrap();
    session.commit().await.unwrap();

    let report = relay.tick().await.unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 2);
    assert_eq!(report.dead_lettered, 1);

    let pending: Vec<OutboxMessage> = store.fetch_pending(10, 5).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state(5), DeliveryState::Pending { attempts: 1 });
    assert_eq!(pending[0].error(), Some("broker unavailable"));
    assert_eq!(
        pending[0].decode::<EmployeeHired>().unwrap().employee_id,
        ada.id
    );

    let poisoned = store.find(poisoned.id()).await.unwrap().unwrap();
    assert_eq!(poisoned.state(5), DeliveryState::DeadLetter { attempts: 5 });
    assert!(poisoned.error().unwrap().contains("hr.employee_fired"));

    assert_eq!(
        store
            .delete_processed_before(chrono::Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap(),
        2
    );
}
