//! PostgreSQL-backed sink

use crate::error::SinkResult;
use crate::{validate_name, Person, Sink, StoredPerson};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgPool, Row};
use tracing::{debug, info};

/// Role label for this sink's pool checkouts
const CHECKOUT_ROLE: &str = "sink";

/// Sink writing to the `people` table
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_person(row: &PgRow) -> Result<StoredPerson, sqlx::Error> {
        Ok(StoredPerson {
            name: row.try_get("name")?,
            age: row.try_get("age")?,
            comment: row.try_get("description")?,
            creation_time: row.try_get("creation_time")?,
        })
    }
}

#[async_trait]
impl Sink for PgSink {
    async fn upsert(&self, entry: &Person) -> SinkResult<()> {
        entry.validate()?;

        // Dropping the transaction on an error path rolls it back
        let mut conn = db_pool::acquire(&self.pool, CHECKOUT_ROLE).await?;
        let mut tx = conn.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO people (name, age, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET age = EXCLUDED.age,
                description = EXCLUDED.description
            "#,
        )
        .bind(&entry.name)
        .bind(entry.age)
        .bind(&entry.comment)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            name = %entry.name,
            age = entry.age,
            rows_affected = result.rows_affected(),
            "Person upserted"
        );

        Ok(())
    }

    async fn delete(&self, name: &str) -> SinkResult<bool> {
        validate_name(name)?;

        let mut conn = db_pool::acquire(&self.pool, CHECKOUT_ROLE).await?;
        let mut tx = conn.begin().await?;

        let result = sqlx::query("DELETE FROM people WHERE name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!(name = %name, "Person removed");
        } else {
            debug!(name = %name, "No person to remove");
        }

        Ok(removed)
    }

    async fn get(&self, name: &str) -> SinkResult<Option<StoredPerson>> {
        validate_name(name)?;

        let row = sqlx::query(
            r#"
            SELECT name, age, description, creation_time
            FROM people
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_person(&row)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> SinkResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM people")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("total")?)
    }

    async fn ensure_schema(&self) -> SinkResult<()> {
        sqlx::raw_sql(include_str!("../migrations/001_create_people_table.sql"))
            .execute(&self.pool)
            .await?;

        info!("People table ready");
        Ok(())
    }
}
