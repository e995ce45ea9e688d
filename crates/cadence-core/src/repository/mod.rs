use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    CreatedTemplate, DeletionResult, EditScope, EventException, EventTemplate, ExceptionKind,
    NewTemplateData, OccurrenceChanges, TemplateChanges, UpdateOutcome,
};
use crate::overlay::ResolvedOccurrence;
use crate::recurrence::MaterializationManager;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

// Re-export domain modules
pub mod exceptions;
pub mod instances;
pub mod materialization;
pub mod templates;

// Traits are defined in this module and implemented in respective domain modules

/// An instance row joined with its exception, as returned by instance queries.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct InstanceDetails {
    pub id: Uuid,
    pub template_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cancelled: bool,
    pub is_exception: bool,
    pub exception_kind: Option<ExceptionKind>,
}

/// Filter for [`InstanceRepository::list_instances`].
#[derive(Debug, Clone, Default)]
pub struct InstanceQuery {
    pub template_id: Option<Uuid>,
    /// Inclusive lower bound on the occurrence date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the occurrence date
    pub to: Option<NaiveDate>,
    pub include_cancelled: bool,
    pub limit: Option<u32>,
}

/// Domain-specific trait for template operations
#[async_trait]
pub trait TemplateRepository {
    async fn create_template(&self, data: NewTemplateData) -> Result<CreatedTemplate, CoreError>;
    async fn find_template_by_id(&self, id: Uuid) -> Result<Option<EventTemplate>, CoreError>;
    async fn find_templates(&self) -> Result<Vec<EventTemplate>, CoreError>;
    async fn find_templates_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<EventTemplate>, CoreError>;
    async fn update_template(
        &self,
        id: Uuid,
        changes: TemplateChanges,
        scope: EditScope,
        pivot: Option<NaiveDate>,
    ) -> Result<UpdateOutcome, CoreError>;
    async fn delete_template(
        &self,
        id: Uuid,
        scope: EditScope,
        pivot: Option<NaiveDate>,
    ) -> Result<DeletionResult, CoreError>;
    async fn preview_template(&self, id: Uuid, limit: usize) -> Result<Vec<ResolvedOccurrence>, CoreError>;
}

/// Domain-specific trait for instance operations
#[async_trait]
pub trait InstanceRepository {
    async fn get_instances(&self, template_id: Uuid) -> Result<Vec<InstanceDetails>, CoreError>;
    async fn find_instance_by_id(&self, id: Uuid) -> Result<Option<InstanceDetails>, CoreError>;
    async fn find_instances_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<InstanceDetails>, CoreError>;
    async fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<InstanceDetails>, CoreError>;
    async fn update_instance(&self, id: Uuid, changes: OccurrenceChanges) -> Result<InstanceDetails, CoreError>;
    async fn cancel_instance(&self, id: Uuid) -> Result<InstanceDetails, CoreError>;
    /// Drops the exception on the instance's date and reverts the row to the
    /// template's values. `NotFound` when the date has no exception.
    ///
    /// Only dates the current rule still generates can be restored. Rows
    /// kept solely by their exception, such as the cancelled tail left by a
    /// `ThisAndFuture` delete, fail with `InvalidInput`.
    async fn restore_instance(&self, id: Uuid) -> Result<InstanceDetails, CoreError>;
}

/// Domain-specific trait for exception operations
#[async_trait]
pub trait ExceptionRepository {
    async fn find_exceptions(&self, template_id: Uuid) -> Result<Vec<EventException>, CoreError>;
    async fn find_exception(&self, template_id: Uuid, date: NaiveDate) -> Result<Option<EventException>, CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository: TemplateRepository + InstanceRepository + ExceptionRepository {}

/// SQLite implementation of the repository pattern
pub struct SqliteRepository {
    pool: DbPool,
    materialization_manager: MaterializationManager,
}

impl SqliteRepository {
    pub fn new(pool: DbPool, materialization_manager: MaterializationManager) -> Self {
        Self { pool, materialization_manager }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get a reference to the materialization manager for internal use
    pub(crate) fn materialization_manager(&self) -> &MaterializationManager {
        &self.materialization_manager
    }
}

impl Repository for SqliteRepository {}

/// `LIKE` pattern matching UUIDs whose hex form starts with `short_id`.
pub(crate) fn short_id_pattern(short_id: &str) -> String {
    format!("{}%", short_id.replace('-', "").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_pattern_strips_hyphens() {
        assert_eq!(short_id_pattern("0192AB-3c"), "0192ab3c%");
    }
}
