use std::sync::Arc;

use chrono::Utc;
use sqlx::{Pool, Postgres};

use txoutbox::store::postgres::{PgOutboxStore, PgOutboxStoreBuilder, PgSession};
use txoutbox::store::OutboxStore;
use txoutbox::{OutboxMessage, ReactionHandlers, Session, UnitOfWork};

use crate::hr::{handlers, Employee, EmployeeEvent};
use crate::postgres::{count_employees, create_employees_table};

async fn store(pool: &Pool<Postgres>) -> PgOutboxStore {
    PgOutboxStoreBuilder::new(pool.clone())
        .with_name("hr")
        .try_build()
        .await
        .unwrap()
}

async fn insert_employee(session: &mut PgSession, employee: &Employee) -> Result<u64, txoutbox::PersistenceError> {
    session
        .execute(
            sqlx::query("INSERT INTO employees (id, name, role) VALUES ($1, $2, $3)")
                .bind(employee.id)
                .bind(employee.name.clone())
                .bind(employee.role.clone()),
        )
        .await
}

#[sqlx::test]
async fn commit_writes_business_rows_and_messages_together_test(pool: Pool<Postgres>) {
    create_employees_table(&pool).await;
    let store = store(&pool).await;
    let handlers: Arc<ReactionHandlers<EmployeeEvent, PgSession>> = Arc::new(handlers());
    let mut employee = Employee::hire("Ada");

    let mut uow = UnitOfWork::new(store.begin().await.unwrap(), handlers);
    insert_employee(uow.session_mut(), &employee).await.unwrap();

    let count = uow.commit(&mut [&mut employee]).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(count_employees(&pool).await, 1);

    let pending: Vec<OutboxMessage> = store.fetch_pending(10, 5).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_type(), "hr.employee_hired");
    assert_eq!(store.find(pending[0].id()).await.unwrap(), Some(pending[0].clone()));
}

#[sqlx::test]
async fn dropped_session_rolls_back_test(pool: Pool<Postgres>) {
    create_employees_table(&pool).await;
    let store = store(&pool).await;
    let employee = Employee::hire("Ada");

    {
        let mut session = store.begin().await.unwrap();
        insert_employee(&mut session, &employee).await.unwrap();
        session.stage(OutboxMessage::new("hr.employee_hired", "{}")).await.unwrap();
    }

    assert_eq!(count_employees(&pool).await, 0);
    assert!(store.fetch_pending(10, 5).await.unwrap().is_empty());
}

#[sqlx::test]
async fn duplicate_business_rows_are_conflicts_test(pool: Pool<Postgres>) {
    create_employees_table(&pool).await;
    let store = store(&pool).await;
    let mut employee = Employee::hire("Ada");

    let mut uow = UnitOfWork::new(store.begin().await.unwrap(), handlers());
    insert_employee(uow.session_mut(), &employee).await.unwrap();
    uow.commit(&mut [&mut employee]).await.unwrap();

    let mut session = store.begin().await.unwrap();
    let error = insert_employee(&mut session, &employee).await.unwrap_err();

    assert!(error.is_conflict());
}

#[sqlx::test]
async fn pending_messages_are_fetched_oldest_first_test(pool: Pool<Postgres>) {
    let store = store(&pool).await;
    let now = Utc::now();

    let newest = OutboxMessage::with_occurred_on("hr.employee_hired", "{}", now);
    let oldest = OutboxMessage::with_occurred_on("hr.employee_hired", "{}", now - chrono::Duration::minutes(2));
    let middle = OutboxMessage::with_occurred_on("hr.employee_hired", "{}", now - chrono::Duration::minutes(1));

    let mut session = store.begin().await.unwrap();
    for message in [newest.clone(), oldest.clone(), middle.clone()] {
        session.stage(message).await.unwrap();
    }
    assert_eq!(session.commit().await.unwrap(), 3);

    let ids: Vec<_> = store
        .fetch_pending(10, 5)
        .await
        .unwrap()
        .iter()
        .map(OutboxMessage::id)
        .collect();
    assert_eq!(ids, vec![oldest.id(), middle.id(), newest.id()]);

    let ids: Vec<_> = store
        .fetch_pending(2, 5)
        .await
        .unwrap()
        .iter()
        .map(OutboxMessage::id)
        .collect();
    assert_eq!(ids, vec![oldest.id(), middle.id()]);
}

#[sqlx::test]
async fn retention_deletes_processed_messages_only_test(pool: Pool<Postgres>) {
    let store = store(&pool).await;

    let mut session = store.begin().await.unwrap();
    session.stage(OutboxMessage::new("hr.employee_hired", "{}")).await.unwrap();
    session.commit().await.unwrap();

    let deleted = store
        .delete_processed_before(Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();

    assert_eq!(deleted, 0);
    assert_eq!(store.fetch_pending(10, 5).await.unwrap().len(), 1);
}
