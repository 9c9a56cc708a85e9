use sqlx::{Pool, Postgres};

mod builder;
mod relay;
mod store;

async fn create_employees_table(pool: &Pool<Postgres>) {
    let _ = sqlx::query("CREATE TABLE employees (id uuid PRIMARY KEY, name TEXT NOT NULL, role TEXT NOT NULL)")
        .execute(pool)
        .await
        .unwrap();
}

async fn count_employees(pool: &Pool<Postgres>) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM employees")
        .fetch_one(pool)
        .await
        .unwrap()
}
