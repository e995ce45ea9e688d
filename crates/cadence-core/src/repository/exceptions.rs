use crate::error::CoreError;
use crate::models::{EventException, ExceptionKind, OccurrenceChanges};
use crate::recurrence::ExceptionCarryPolicy;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::ExceptionRepository for SqliteRepository {
    async fn find_exceptions(&self, template_id: Uuid) -> Result<Vec<EventException>, CoreError> {
        let exceptions = sqlx::query_as(
            "SELECT * FROM event_exceptions WHERE template_id = $1 ORDER BY occurrence_date",
        )
        .bind(template_id)
        .fetch_all(self.pool())
        .await?;
        Ok(exceptions)
    }

    async fn find_exception(
        &self,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<EventException>, CoreError> {
        let exception = sqlx::query_as(
            "SELECT * FROM event_exceptions WHERE template_id = $1 AND occurrence_date = $2",
        )
        .bind(template_id)
        .bind(date)
        .fetch_optional(self.pool())
        .await?;
        Ok(exception)
    }
}

impl SqliteRepository {
    pub(crate) async fn exceptions_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
    ) -> Result<Vec<EventException>, CoreError> {
        let exceptions = sqlx::query_as(
            "SELECT * FROM event_exceptions WHERE template_id = $1 ORDER BY occurrence_date",
        )
        .bind(template_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(exceptions)
    }

    pub(crate) async fn find_exception_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<EventException>, CoreError> {
        let exception = sqlx::query_as(
            "SELECT * FROM event_exceptions WHERE template_id = $1 AND occurrence_date = $2",
        )
        .bind(template_id)
        .bind(date)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(exception)
    }

    /// Records a `modified` exception for the date. Overrides already stored
    /// for the date are kept unless `changes` replaces them; a cancelled
    /// exception becomes modified.
    pub(crate) async fn upsert_modified_exception(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        date: NaiveDate,
        changes: &OccurrenceChanges,
    ) -> Result<EventException, CoreError> {
        let existing = Self::find_exception_in_transaction(tx, template_id, date).await?;
        let merged = merge_overrides(existing.as_ref().map(|e| e.overrides()), changes);
        let now = Utc::now();

        let exception = sqlx::query_as(
            r#"INSERT INTO event_exceptions (template_id, occurrence_date, kind, title, description,
                location, start_time, end_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (template_id, occurrence_date) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                updated_at = excluded.updated_at
            RETURNING *"#,
        )
        .bind(template_id)
        .bind(date)
        .bind(ExceptionKind::Modified)
        .bind(&merged.title)
        .bind(&merged.description)
        .bind(&merged.location)
        .bind(merged.start_time)
        .bind(merged.end_time)
        .bind(now)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exception)
    }

    /// Records a `cancelled` exception for the date. Stored overrides are
    /// left as they are.
    pub(crate) async fn upsert_cancelled_exception(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<EventException, CoreError> {
        let now = Utc::now();
        let exception = sqlx::query_as(
            r#"INSERT INTO event_exceptions (template_id, occurrence_date, kind, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (template_id, occurrence_date) DO UPDATE SET
                kind = excluded.kind,
                updated_at = excluded.updated_at
            RETURNING *"#,
        )
        .bind(template_id)
        .bind(date)
        .bind(ExceptionKind::Cancelled)
        .bind(now)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exception)
    }

    /// Cancels every stored instance of the template on or after `pivot`.
    pub(crate) async fn cancel_from_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        pivot: NaiveDate,
    ) -> Result<u64, CoreError> {
        // The WHERE clause lets SQLite parse ON CONFLICT after INSERT ... SELECT.
        let result = sqlx::query(
            r#"INSERT INTO event_exceptions (template_id, occurrence_date, kind, created_at, updated_at)
            SELECT template_id, occurrence_date, $3, $4, $4 FROM event_instances
            WHERE template_id = $1 AND occurrence_date >= $2
            ON CONFLICT (template_id, occurrence_date) DO UPDATE SET
                kind = excluded.kind,
                updated_at = excluded.updated_at"#,
        )
        .bind(template_id)
        .bind(pivot)
        .bind(ExceptionKind::Cancelled)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    pub(crate) async fn remove_exception_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            "DELETE FROM event_exceptions WHERE template_id = $1 AND occurrence_date = $2",
        )
        .bind(template_id)
        .bind(date)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "No exception for template {} on {}",
                template_id, date
            )));
        }
        Ok(())
    }

    /// Applies `policy` to the exceptions of `from` dated on or after `pivot`
    /// when the series is split into `to`.
    pub(crate) async fn carry_exceptions_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        from: Uuid,
        to: Uuid,
        pivot: NaiveDate,
        policy: ExceptionCarryPolicy,
    ) -> Result<u64, CoreError> {
        let result = match policy {
            ExceptionCarryPolicy::MoveWithInstances => {
                sqlx::query(
                    r#"UPDATE event_exceptions SET template_id = $1
                    WHERE template_id = $2 AND occurrence_date >= $3"#,
                )
                .bind(to)
                .bind(from)
                .bind(pivot)
                .execute(&mut **tx)
                .await?
            }
            ExceptionCarryPolicy::Discard => {
                sqlx::query("DELETE FROM event_exceptions WHERE template_id = $1 AND occurrence_date >= $2")
                    .bind(from)
                    .bind(pivot)
                    .execute(&mut **tx)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}

/// Layers `changes` over previously stored overrides.
fn merge_overrides(existing: Option<OccurrenceChanges>, changes: &OccurrenceChanges) -> OccurrenceChanges {
    let base = existing.unwrap_or_default();
    OccurrenceChanges {
        title: changes.title.clone().or(base.title),
        description: changes.description.clone().or(base.description),
        location: changes.location.clone().or(base.location),
        start_time: changes.start_time.or(base.start_time),
        end_time: changes.end_time.or(base.end_time),
    }
}
