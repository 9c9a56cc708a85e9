use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::sql::migrations::{Migrations, MigrationsHandler};
use crate::sql::statements::Statements;

use super::{InnerPgOutboxStore, PgOutboxStore};

/// Struct used to build a brand new [`PgOutboxStore`].
pub struct PgOutboxStoreBuilder {
    pool: Pool<Postgres>,
    name: String,
    run_migrations: bool,
}

impl PgOutboxStoreBuilder {
    /// Creates a new instance of a [`PgOutboxStoreBuilder`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            name: "outbox".to_string(),
            run_migrations: true,
        }
    }

    /// Set the name of the module owning the store. Every module gets its own table, named
    /// `{name}_outbox_messages`, and its own relay. Only ascii alphanumerics and underscores are
    /// allowed.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Calling this function the caller avoid running migrations. It is recommend to run migrations
    /// at least once per store per startup.
    pub fn without_running_migrations(mut self) -> Self {
        self.run_migrations = false;
        self
    }

    /// This function runs all the needed [`Migrations`], atomically setting up the database if
    /// `run_migrations` isn't explicitly set to false. [`Migrations`] should be run only at application
    /// startup due to avoid performance issues.
    ///
    /// Eventually returns an instance of PgOutboxStore.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if the name is not a valid identifier or if there's an error running
    /// [`Migrations`].
    pub async fn try_build(self) -> Result<PgOutboxStore, sqlx::Error> {
        let valid_name: bool = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_name {
            return Err(sqlx::Error::Configuration(
                format!("invalid outbox store name `{}`", self.name).into(),
            ));
        }

        let statements: Statements = Statements::new(&format!("{}_outbox_messages", self.name));

        if self.run_migrations {
            Migrations::run(&self.pool, statements.table_name()).await?;
        }

        Ok(PgOutboxStore {
            inner: Arc::new(InnerPgOutboxStore {
                pool: self.pool,
                statements,
            }),
        })
    }
}
