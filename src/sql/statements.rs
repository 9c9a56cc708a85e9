/// The SQL statements of an outbox table, formatted once with the table name.
#[derive(Clone, Debug)]
pub struct Statements {
    table_name: String,
    insert: String,
    select_pending: String,
    select_by_id: String,
    select_dead_letters: String,
    update_outcome: String,
    delete_processed_before: String,
}

impl Statements {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            insert: format!(include_str!("postgres/statements/insert.sql"), table_name),
            select_pending: format!(include_str!("postgres/statements/select_pending.sql"), table_name),
            select_by_id: format!(include_str!("postgres/statements/select_by_id.sql"), table_name),
            select_dead_letters: format!(include_str!("postgres/statements/select_dead_letters.sql"), table_name),
            update_outcome: format!(include_str!("postgres/statements/update_outcome.sql"), table_name),
            delete_processed_before: format!(
                include_str!("postgres/statements/delete_processed_before.sql"),
                table_name
            ),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }

    pub fn select_pending(&self) -> &str {
        &self.select_pending
    }

    pub fn select_by_id(&self) -> &str {
        &self.select_by_id
    }

    pub fn select_dead_letters(&self) -> &str {
        &self.select_dead_letters
    }

    pub fn update_outcome(&self) -> &str {
        &self.update_outcome
    }

    pub fn delete_processed_before(&self) -> &str {
        &self.delete_processed_before
    }
}
