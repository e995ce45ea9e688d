use crate::error::CoreError;
use crate::models::{EventInstance, EventTemplate, OccurrenceChanges};
use crate::repository::{short_id_pattern, InstanceDetails, InstanceQuery, SqliteRepository};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::info;
use uuid::Uuid;

const DETAILS_SELECT: &str = r#"SELECT i.id, i.template_id, i.occurrence_date, i.starts_at, i.ends_at,
    i.title, i.description, i.location, i.cancelled,
    (e.kind IS NOT NULL) AS is_exception, e.kind AS exception_kind
FROM event_instances i
LEFT JOIN event_exceptions e
    ON e.template_id = i.template_id AND e.occurrence_date = i.occurrence_date"#;

#[async_trait]
impl super::InstanceRepository for SqliteRepository {
    async fn get_instances(&self, template_id: Uuid) -> Result<Vec<InstanceDetails>, CoreError> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM event_templates WHERE id = $1")
            .bind(template_id)
            .fetch_optional(self.pool())
            .await?;
        if exists.is_none() {
            return Err(CoreError::NotFound(format!("Template with id {} not found", template_id)));
        }

        let instances = sqlx::query_as(&format!(
            "{} WHERE i.template_id = $1 ORDER BY i.occurrence_date",
            DETAILS_SELECT
        ))
        .bind(template_id)
        .fetch_all(self.pool())
        .await?;
        Ok(instances)
    }

    async fn find_instance_by_id(&self, id: Uuid) -> Result<Option<InstanceDetails>, CoreError> {
        let instance = sqlx::query_as(&format!("{} WHERE i.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(instance)
    }

    async fn find_instances_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<InstanceDetails>, CoreError> {
        let instances = sqlx::query_as(&format!(
            "{} WHERE lower(hex(i.id)) LIKE $1 ORDER BY i.occurrence_date",
            DETAILS_SELECT
        ))
        .bind(short_id_pattern(short_id))
        .fetch_all(self.pool())
        .await?;
        Ok(instances)
    }

    async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<InstanceDetails>, CoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(DETAILS_SELECT);
        builder.push(" WHERE 1 = 1");

        if let Some(template_id) = query.template_id {
            builder.push(" AND i.template_id = ").push_bind(template_id);
        }
        if let Some(from) = query.from {
            builder.push(" AND i.occurrence_date >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            builder.push(" AND i.occurrence_date <= ").push_bind(to);
        }
        if !query.include_cancelled {
            builder.push(" AND i.cancelled = 0");
        }

        builder.push(" ORDER BY i.starts_at, i.template_id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let instances = builder.build_query_as().fetch_all(self.pool()).await?;
        Ok(instances)
    }

    async fn update_instance(&self, id: Uuid, changes: OccurrenceChanges) -> Result<InstanceDetails, CoreError> {
        let mut tx = self.pool().begin().await?;
        let (template, instance) = Self::lock_instance(&mut tx, id).await?;
        Self::modify_occurrence(&mut tx, &template, instance.occurrence_date, &changes).await?;
        let details = Self::instance_details_in_transaction(&mut tx, id).await?;
        tx.commit().await?;

        info!(instance_id = %id, template_id = %template.id, date = %details.occurrence_date, "modified occurrence");
        Ok(details)
    }

    async fn cancel_instance(&self, id: Uuid) -> Result<InstanceDetails, CoreError> {
        let mut tx = self.pool().begin().await?;
        let (template, instance) = Self::lock_instance(&mut tx, id).await?;
        Self::cancel_occurrence(&mut tx, &template, instance.occurrence_date).await?;
        let details = Self::instance_details_in_transaction(&mut tx, id).await?;
        tx.commit().await?;

        info!(instance_id = %id, template_id = %template.id, date = %details.occurrence_date, "cancelled occurrence");
        Ok(details)
    }

    async fn restore_instance(&self, id: Uuid) -> Result<InstanceDetails, CoreError> {
        let mut tx = self.pool().begin().await?;
        let (template, instance) = Self::lock_instance(&mut tx, id).await?;
        let date = instance.occurrence_date;

        // A kept row outside the rule exists only because of its exception;
        // removing the exception would leave nothing to restore to.
        let generated = self
            .materialization_manager()
            .materialize(&template)
            .iter()
            .any(|o| o.date == date);
        if !generated {
            return Err(CoreError::InvalidInput(format!(
                "{} is no longer an occurrence of rule {}",
                date, template.rule
            )));
        }

        Self::remove_exception_in_transaction(&mut tx, template.id, date).await?;
        Self::refresh_occurrence(&mut tx, &template, date).await?;
        let details = Self::instance_details_in_transaction(&mut tx, id).await?;
        tx.commit().await?;

        info!(instance_id = %id, template_id = %template.id, %date, "restored occurrence");
        Ok(details)
    }
}

impl SqliteRepository {
    /// Locks the template owning an instance, then reads the instance. The
    /// lock must stay the transaction's first statement.
    async fn lock_instance(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<(EventTemplate, EventInstance), CoreError> {
        let template: EventTemplate = sqlx::query_as(
            r#"UPDATE event_templates SET revision = revision + 1
            WHERE id = (SELECT template_id FROM event_instances WHERE id = $1)
            RETURNING *"#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Instance with id {} not found", id)))?;

        let instance: EventInstance = sqlx::query_as("SELECT * FROM event_instances WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Instance with id {} not found", id)))?;
        Ok((template, instance))
    }

    async fn instance_details_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<InstanceDetails, CoreError> {
        sqlx::query_as(&format!("{} WHERE i.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Instance with id {} not found", id)))
    }
}
