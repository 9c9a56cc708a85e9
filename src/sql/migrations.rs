use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::{Database, Error, Pool, Postgres, Transaction};

/// Trait used to handle current code migrations.
#[async_trait]
pub trait MigrationsHandler<D>
where
    D: Database,
{
    async fn run(pool: &Pool<D>, table_name: &str) -> Result<(), Error>;
}

pub struct Migrations;

#[async_trait]
impl MigrationsHandler<Postgres> for Migrations {
    async fn run(pool: &Pool<Postgres>, table_name: &str) -> Result<(), Error> {
        let mut transaction: Transaction<Postgres> = pool.begin().await?;

        let migrations: Vec<String> = vec![
            format!(include_str!("postgres/migrations/01_create_table.sql"), table_name),
            format!(include_str!("postgres/migrations/02_create_pending_index.sql"), table_name),
        ];

        for migration in migrations {
            let _: PgQueryResult = sqlx::query(migration.as_str()).execute(&mut *transaction).await?;
        }

        transaction.commit().await
    }
}
