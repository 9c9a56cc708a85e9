use sqlx::{Pool, Postgres};

use txoutbox::store::postgres::{PgOutboxStore, PgOutboxStoreBuilder};

#[sqlx::test]
async fn builder_can_skip_migrations_test(pool: Pool<Postgres>) {
    let store: PgOutboxStore = PgOutboxStoreBuilder::new(pool.clone())
        .with_name("hr")
        .without_running_migrations()
        .try_build()
        .await
        .unwrap();

    assert_eq!(store.table_name(), "hr_outbox_messages");
    assert!(!table_exists(store.table_name(), &pool).await);
}

#[sqlx::test]
async fn builder_run_migrations_test(pool: Pool<Postgres>) {
    assert!(!table_exists("hr_outbox_messages", &pool).await);

    let _: PgOutboxStore = PgOutboxStoreBuilder::new(pool.clone())
        .with_name("hr")
        .try_build()
        .await
        .unwrap();

    assert!(table_exists("hr_outbox_messages", &pool).await);

    // Migrations can run again at every startup.
    let _: PgOutboxStore = PgOutboxStoreBuilder::new(pool.clone())
        .with_name("hr")
        .try_build()
        .await
        .unwrap();
}

#[sqlx::test]
async fn builder_rejects_invalid_names_test(pool: Pool<Postgres>) {
    let result = PgOutboxStoreBuilder::new(pool)
        .with_name("hr; DROP TABLE employees")
        .try_build()
        .await;

    assert!(matches!(result, Err(sqlx::Error::Configuration(_))));
}

async fn table_exists(table_name: &str, pool: &Pool<Postgres>) -> bool {
    !sqlx::query("SELECT table_name FROM information_schema.columns WHERE table_name = $1")
        .bind(table_name)
        .fetch_all(pool)
        .await
        .unwrap()
        .is_empty()
}
