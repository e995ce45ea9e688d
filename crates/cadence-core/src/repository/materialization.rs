//! Transaction-scoped building blocks shared by the scoped mutations:
//! template locking and persistence, and the (template, date) keyed diff
//! that brings stored instances in line with the rule and exceptions.

use crate::error::CoreError;
use crate::models::{EventException, EventInstance, EventTemplate, InstanceDiff};
use crate::overlay::{self, ResolvedOccurrence};
use crate::recurrence::Occurrence;
use crate::repository::SqliteRepository;
use chrono::{NaiveDate, Utc};
use sqlx::{Sqlite, Transaction};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

impl SqliteRepository {
    /// Locks the template row for the rest of the transaction and returns it.
    ///
    /// The revision bump is a write, so SQLite takes its write lock here,
    /// before any instance row is read. A missing template is `NotFound`.
    pub(crate) async fn lock_template(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<EventTemplate, CoreError> {
        sqlx::query_as(
            "UPDATE event_templates SET revision = revision + 1 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Template with id {} not found", id)))
    }

    pub(crate) async fn insert_template_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO event_templates (id, title, description, location, anchor_start, anchor_end,
                frequency, repeat_interval, occurrence_count, until_date, by_day, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(template.id)
        .bind(&template.title)
        .bind(&template.description)
        .bind(&template.location)
        .bind(template.anchor_start)
        .bind(template.anchor_end)
        .bind(template.rule.frequency)
        .bind(i64::from(template.rule.interval))
        .bind(template.rule.count().map(i64::from))
        .bind(template.rule.until())
        .bind(template.rule.by_day_text())
        .bind(template.revision)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| match CoreError::from(e) {
            CoreError::Conflict(_) => {
                CoreError::Conflict(format!("Template with id {} already exists", template.id))
            }
            other => other,
        })?;
        Ok(())
    }

    /// Writes every mutable column of `template` and returns the stored row.
    pub(crate) async fn save_template_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
    ) -> Result<EventTemplate, CoreError> {
        sqlx::query_as(
            r#"UPDATE event_templates SET title = $1, description = $2, location = $3,
                anchor_start = $4, anchor_end = $5, frequency = $6, repeat_interval = $7,
                occurrence_count = $8, until_date = $9, by_day = $10, updated_at = $11
            WHERE id = $12
            RETURNING *"#,
        )
        .bind(&template.title)
        .bind(&template.description)
        .bind(&template.location)
        .bind(template.anchor_start)
        .bind(template.anchor_end)
        .bind(template.rule.frequency)
        .bind(i64::from(template.rule.interval))
        .bind(template.rule.count().map(i64::from))
        .bind(template.rule.until())
        .bind(template.rule.by_day_text())
        .bind(Utc::now())
        .bind(template.id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Template with id {} not found", template.id)))
    }

    pub(crate) async fn instances_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
    ) -> Result<Vec<EventInstance>, CoreError> {
        let instances = sqlx::query_as(
            "SELECT * FROM event_instances WHERE template_id = $1 ORDER BY occurrence_date",
        )
        .bind(template_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(instances)
    }

    pub(crate) async fn find_instance_on_date_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<EventInstance, CoreError> {
        sqlx::query_as("SELECT * FROM event_instances WHERE template_id = $1 AND occurrence_date = $2")
            .bind(template_id)
            .bind(date)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "No occurrence of template {} on {}",
                    template_id, date
                ))
            })
    }

    /// Regenerates a template's instances as an upsert diff keyed by date.
    ///
    /// # Behavior
    /// - Dates produced by the rule get a row; existing rows keep their id and
    ///   are only written when their resolved values changed
    /// - Rows for dates the rule no longer produces are deleted unless an
    ///   exception exists for the date, in which case they are kept and
    ///   resolved with that exception
    /// - Applying the same rule twice reports no inserts, updates or deletes
    pub(crate) async fn reconcile_instances(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
    ) -> Result<InstanceDiff, CoreError> {
        let occurrences = self.materialization_manager().materialize(template);
        let exceptions = Self::exceptions_in_transaction(tx, template.id).await?;
        let existing = Self::instances_in_transaction(tx, template.id).await?;

        let resolved = overlay::apply(&occurrences, &exceptions, template);
        let exceptions_by_date: HashMap<NaiveDate, &EventException> =
            exceptions.iter().map(|e| (e.occurrence_date, e)).collect();
        let mut existing_by_date: HashMap<NaiveDate, EventInstance> =
            existing.into_iter().map(|i| (i.occurrence_date, i)).collect();

        let mut diff = InstanceDiff::default();

        for occurrence in &resolved {
            match existing_by_date.remove(&occurrence.date) {
                Some(row) if row_matches(&row, occurrence) => diff.unchanged += 1,
                Some(row) => {
                    Self::write_instance_row(tx, row.id, occurrence).await?;
                    diff.updated += 1;
                }
                None => {
                    Self::upsert_instance_row(tx, template.id, occurrence).await?;
                    diff.inserted += 1;
                }
            }
        }

        let mut retained = Vec::new();
        for (date, row) in existing_by_date {
            match exceptions_by_date.get(&date).copied() {
                Some(exception) => {
                    retained.push(date);
                    let stale = overlay::resolve(
                        &Occurrence::on(date, template.anchor_start, template.anchor_end),
                        template,
                        Some(exception),
                    );
                    if row_matches(&row, &stale) {
                        diff.unchanged += 1;
                    } else {
                        Self::write_instance_row(tx, row.id, &stale).await?;
                        diff.updated += 1;
                    }
                }
                None => {
                    sqlx::query("DELETE FROM event_instances WHERE id = $1")
                        .bind(row.id)
                        .execute(&mut **tx)
                        .await?;
                    diff.deleted += 1;
                }
            }
        }

        if !retained.is_empty() {
            debug!(template_id = %template.id, retained = retained.len(), "kept excepted instances outside the rule");
        }
        let orphaned = exceptions
            .iter()
            .filter(|e| {
                !retained.contains(&e.occurrence_date)
                    && !resolved.iter().any(|r| r.date == e.occurrence_date)
            })
            .count();
        if orphaned > 0 {
            warn!(template_id = %template.id, orphaned, "exceptions without a matching instance were ignored");
        }

        debug!(
            template_id = %template.id,
            inserted = diff.inserted,
            updated = diff.updated,
            deleted = diff.deleted,
            unchanged = diff.unchanged,
            "reconciled instances"
        );
        Ok(diff)
    }

    /// Re-resolves the single instance on `date` from the template and its
    /// exception, leaving every other instance alone.
    pub(crate) async fn refresh_occurrence(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
        date: NaiveDate,
    ) -> Result<(EventInstance, bool), CoreError> {
        let row = Self::find_instance_on_date_in_transaction(tx, template.id, date).await?;
        let exception = Self::find_exception_in_transaction(tx, template.id, date).await?;
        let resolved = overlay::resolve(
            &Occurrence::on(date, template.anchor_start, template.anchor_end),
            template,
            exception.as_ref(),
        );

        if row_matches(&row, &resolved) {
            return Ok((row, false));
        }
        let updated = Self::write_instance_row(tx, row.id, &resolved).await?;
        Ok((updated, true))
    }

    async fn write_instance_row(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        occurrence: &ResolvedOccurrence,
    ) -> Result<EventInstance, CoreError> {
        let instance = sqlx::query_as(
            r#"UPDATE event_instances SET starts_at = $1, ends_at = $2, title = $3, description = $4,
                location = $5, cancelled = $6, updated_at = $7
            WHERE id = $8
            RETURNING *"#,
        )
        .bind(occurrence.starts_at)
        .bind(occurrence.ends_at)
        .bind(&occurrence.title)
        .bind(&occurrence.description)
        .bind(&occurrence.location)
        .bind(occurrence.cancelled)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(instance)
    }

    /// Inserts a new instance row. A row that already exists for the same
    /// (template, date) is updated in place instead, keeping its id.
    async fn upsert_instance_row(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        occurrence: &ResolvedOccurrence,
    ) -> Result<(), CoreError> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO event_instances (id, template_id, occurrence_date, starts_at, ends_at,
                title, description, location, cancelled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (template_id, occurrence_date) DO UPDATE SET
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                cancelled = excluded.cancelled,
                updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::now_v7())
        .bind(template_id)
        .bind(occurrence.date)
        .bind(occurrence.starts_at)
        .bind(occurrence.ends_at)
        .bind(&occurrence.title)
        .bind(&occurrence.description)
        .bind(&occurrence.location)
        .bind(occurrence.cancelled)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn row_matches(row: &EventInstance, occurrence: &ResolvedOccurrence) -> bool {
    row.starts_at == occurrence.starts_at
        && row.ends_at == occurrence.ends_at
        && row.title == occurrence.title
        && row.description == occurrence.description
        && row.location == occurrence.location
        && row.cancelled == occurrence.cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn row() -> EventInstance {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let start = date.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        EventInstance {
            id: Uuid::now_v7(),
            template_id: Uuid::now_v7(),
            occurrence_date: date,
            starts_at: start,
            ends_at: start,
            title: "Standup".to_string(),
            description: None,
            location: None,
            cancelled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn resolved_from(row: &EventInstance) -> ResolvedOccurrence {
        ResolvedOccurrence {
            date: row.occurrence_date,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            title: row.title.clone(),
            description: row.description.clone(),
            location: row.location.clone(),
            cancelled: row.cancelled,
            is_exception: false,
        }
    }

    #[test]
    fn test_row_matches_ignores_identity_and_timestamps() {
        let a = row();
        let mut b = row();
        b.updated_at = Utc::now();
        assert!(row_matches(&b, &resolved_from(&a)));
    }

    #[test]
    fn test_row_matches_detects_value_changes() {
        let stored = row();
        let mut occurrence = resolved_from(&stored);
        occurrence.cancelled = true;
        assert!(!row_matches(&stored, &occurrence));
    }
}
