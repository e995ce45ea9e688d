use crate::error::CoreError;
use crate::models::{
    CreatedTemplate, DeletionResult, EditScope, EventInstance, EventTemplate, InstanceDiff,
    NewTemplateData, OccurrenceChanges, TemplateChanges, UpdateOutcome,
};
use crate::overlay::{self, retime, ResolvedOccurrence};
use crate::recurrence::{MaterializationLimits, Occurrence};
use crate::repository::{short_id_pattern, SqliteRepository};
use crate::rule::{RecurrenceBound, Rule};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
impl super::TemplateRepository for SqliteRepository {
    async fn create_template(&self, data: NewTemplateData) -> Result<CreatedTemplate, CoreError> {
        let title = validate_title(&data.title)?;
        let rule = Rule::parse(&data.rule)?;
        let anchor_end = data.ends_at.unwrap_or(data.starts_at);
        if anchor_end < data.starts_at {
            return Err(CoreError::InvalidInput(format!(
                "End {} is before start {}",
                anchor_end, data.starts_at
            )));
        }

        let now = Utc::now();
        let template = EventTemplate {
            id: data.id.unwrap_or_else(Uuid::now_v7),
            title,
            description: data.description,
            location: data.location,
            anchor_start: data.starts_at,
            anchor_end,
            rule,
            revision: 0,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;
        Self::insert_template_in_transaction(&mut tx, &template).await?;
        let diff = self.reconcile_instances(&mut tx, &template).await?;
        let instances = Self::instances_in_transaction(&mut tx, template.id).await?;
        tx.commit().await?;

        info!(template_id = %template.id, rule = %template.rule, instances = diff.inserted, "created template");
        Ok(CreatedTemplate { template, instances })
    }

    async fn find_template_by_id(&self, id: Uuid) -> Result<Option<EventTemplate>, CoreError> {
        let template = sqlx::query_as("SELECT * FROM event_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(template)
    }

    async fn find_templates(&self) -> Result<Vec<EventTemplate>, CoreError> {
        let templates = sqlx::query_as("SELECT * FROM event_templates ORDER BY anchor_start, created_at")
            .fetch_all(self.pool())
            .await?;
        Ok(templates)
    }

    async fn find_templates_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<EventTemplate>, CoreError> {
        let templates = sqlx::query_as("SELECT * FROM event_templates WHERE lower(hex(id)) LIKE $1")
            .bind(short_id_pattern(short_id))
            .fetch_all(self.pool())
            .await?;
        Ok(templates)
    }

    async fn update_template(
        &self,
        id: Uuid,
        changes: TemplateChanges,
        scope: EditScope,
        pivot: Option<NaiveDate>,
    ) -> Result<UpdateOutcome, CoreError> {
        // Everything that can be rejected without reading storage is checked
        // before the transaction starts.
        let new_rule = changes.rule.as_deref().map(Rule::parse).transpose()?;
        if let Some(title) = &changes.title {
            validate_title(title)?;
        }

        let outcome = match scope {
            EditScope::EntireSeries => {
                let mut tx = self.pool().begin().await?;
                let current = Self::lock_template(&mut tx, id).await?;
                let outcome = self.update_series(&mut tx, &current, &changes, new_rule).await?;
                tx.commit().await?;
                outcome
            }
            EditScope::ThisOccurrence => {
                let pivot = require_pivot(scope, pivot)?;
                if new_rule.is_some() {
                    return Err(CoreError::InvalidInput(
                        "The recurrence rule cannot be changed for a single occurrence".to_string(),
                    ));
                }
                let overrides = occurrence_changes(&changes)?;

                let mut tx = self.pool().begin().await?;
                let template = Self::lock_template(&mut tx, id).await?;
                let (_, changed) = Self::modify_occurrence(&mut tx, &template, pivot, &overrides).await?;
                tx.commit().await?;

                UpdateOutcome {
                    template,
                    truncated: None,
                    diff: single_row_diff(changed),
                }
            }
            EditScope::ThisAndFuture => {
                let pivot = require_pivot(scope, pivot)?;
                let mut tx = self.pool().begin().await?;
                let current = Self::lock_template(&mut tx, id).await?;
                let outcome = self.split_series(&mut tx, &current, &changes, new_rule, pivot).await?;
                tx.commit().await?;
                outcome
            }
        };

        info!(
            template_id = %outcome.template.id,
            %scope,
            split_from = ?outcome.truncated.as_ref().map(|t| t.id),
            inserted = outcome.diff.inserted,
            updated = outcome.diff.updated,
            deleted = outcome.diff.deleted,
            "updated template"
        );
        Ok(outcome)
    }

    async fn delete_template(
        &self,
        id: Uuid,
        scope: EditScope,
        pivot: Option<NaiveDate>,
    ) -> Result<DeletionResult, CoreError> {
        let result = match scope {
            EditScope::EntireSeries => {
                let mut tx = self.pool().begin().await?;
                Self::lock_template(&mut tx, id).await?;

                let (instances_removed,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM event_instances WHERE template_id = $1")
                        .bind(id)
                        .fetch_one(&mut *tx)
                        .await?;
                let (exceptions_removed,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM event_exceptions WHERE template_id = $1")
                        .bind(id)
                        .fetch_one(&mut *tx)
                        .await?;

                // Instances and exceptions go with the template (ON DELETE CASCADE).
                sqlx::query("DELETE FROM event_templates WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;

                DeletionResult::Series {
                    template_id: id,
                    instances_removed: instances_removed as u64,
                    exceptions_removed: exceptions_removed as u64,
                }
            }
            EditScope::ThisOccurrence => {
                let pivot = require_pivot(scope, pivot)?;
                let mut tx = self.pool().begin().await?;
                let template = Self::lock_template(&mut tx, id).await?;
                let instance = Self::cancel_occurrence(&mut tx, &template, pivot).await?;
                tx.commit().await?;

                DeletionResult::Occurrence { instance }
            }
            EditScope::ThisAndFuture => {
                let pivot = require_pivot(scope, pivot)?;
                let mut tx = self.pool().begin().await?;
                let template = Self::lock_template(&mut tx, id).await?;
                let result = self.cancel_future(&mut tx, &template, pivot).await?;
                tx.commit().await?;
                result
            }
        };

        info!(template_id = %id, %scope, "deleted from template");
        Ok(result)
    }

    async fn preview_template(&self, id: Uuid, limit: usize) -> Result<Vec<ResolvedOccurrence>, CoreError> {
        let template = self
            .find_template_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Template with id {} not found", id)))?;
        let exceptions: Vec<_> = sqlx::query_as("SELECT * FROM event_exceptions WHERE template_id = $1")
            .bind(id)
            .fetch_all(self.pool())
            .await?;

        let occurrences = self.materialization_manager().materialize(&template);
        let mut resolved = overlay::apply(&occurrences, &exceptions, &template);
        resolved.truncate(limit);
        Ok(resolved)
    }
}

impl SqliteRepository {
    /// Scope `all`: rewrites the template in place and regenerates its instances.
    async fn update_series(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        current: &EventTemplate,
        changes: &TemplateChanges,
        new_rule: Option<Rule>,
    ) -> Result<UpdateOutcome, CoreError> {
        let updated = apply_changes(current, changes, new_rule);
        let saved = if updated == *current {
            current.clone()
        } else {
            Self::save_template_in_transaction(tx, &updated).await?
        };
        let diff = self.reconcile_instances(tx, &saved).await?;

        Ok(UpdateOutcome {
            template: saved,
            truncated: None,
            diff,
        })
    }

    /// Scope `thisAndFuture` for updates: ends the current template just
    /// before `pivot` and continues the series from `pivot` as a new template
    /// that takes over the later instances.
    async fn split_series(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        current: &EventTemplate,
        changes: &TemplateChanges,
        new_rule: Option<Rule>,
        pivot: NaiveDate,
    ) -> Result<UpdateOutcome, CoreError> {
        Self::find_instance_on_date_in_transaction(tx, current.id, pivot).await?;

        let occurrences = self.materialization_manager().materialize(current);
        let before_pivot = occurrences
            .iter()
            .position(|o| o.date == pivot)
            .ok_or_else(|| {
                CoreError::InvalidInput(format!(
                    "{} is not an occurrence of the current rule {}",
                    pivot, current.rule
                ))
            })?;

        if before_pivot == 0 {
            debug!(template_id = %current.id, %pivot, "pivot is the first occurrence, updating the whole series");
            return self.update_series(tx, current, changes, new_rule).await;
        }

        let successor_rule = match new_rule {
            Some(rule) => rule,
            None => {
                let limits = self.materialization_manager().limits_for(current.anchor_date());
                continuation_rule(&current.rule, before_pivot, occurrences.len(), &limits)
            }
        };

        let now = Utc::now();
        let mut successor = apply_changes(current, changes, Some(successor_rule));
        let anchored = Occurrence::on(pivot, successor.anchor_start, successor.anchor_end);
        successor.id = Uuid::now_v7();
        successor.anchor_start = anchored.starts_at;
        successor.anchor_end = anchored.ends_at;
        successor.revision = 0;
        successor.created_at = now;
        successor.updated_at = now;
        Self::insert_template_in_transaction(tx, &successor).await?;

        let truncated = Self::save_template_in_transaction(tx, &truncate_before(current, pivot)?).await?;

        let carried = Self::carry_exceptions_in_transaction(
            tx,
            current.id,
            successor.id,
            pivot,
            self.materialization_manager().config().exception_carry,
        )
        .await?;
        let moved = sqlx::query(
            "UPDATE event_instances SET template_id = $1 WHERE template_id = $2 AND occurrence_date >= $3",
        )
        .bind(successor.id)
        .bind(current.id)
        .bind(pivot)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        debug!(
            from = %current.id,
            to = %successor.id,
            %pivot,
            moved,
            carried,
            "split template"
        );

        let diff = self.reconcile_instances(tx, &successor).await?;
        Ok(UpdateOutcome {
            template: successor,
            truncated: Some(truncated),
            diff,
        })
    }

    /// Scope `this` for updates: stores the overrides as a `modified`
    /// exception and refreshes only that date's instance.
    pub(crate) async fn modify_occurrence(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
        date: NaiveDate,
        changes: &OccurrenceChanges,
    ) -> Result<(EventInstance, bool), CoreError> {
        if changes.is_empty() {
            return Err(CoreError::InvalidInput("No changes given for the occurrence".to_string()));
        }
        if let Some(title) = &changes.title {
            validate_title(title)?;
        }
        Self::find_instance_on_date_in_transaction(tx, template.id, date).await?;
        Self::upsert_modified_exception(tx, template.id, date, changes).await?;
        Self::refresh_occurrence(tx, template, date).await
    }

    /// Scope `this` for deletes: flags the instance cancelled through a
    /// `cancelled` exception. The instance row stays.
    pub(crate) async fn cancel_occurrence(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
        date: NaiveDate,
    ) -> Result<EventInstance, CoreError> {
        Self::find_instance_on_date_in_transaction(tx, template.id, date).await?;
        Self::upsert_cancelled_exception(tx, template.id, date).await?;
        let (instance, _) = Self::refresh_occurrence(tx, template, date).await?;
        Ok(instance)
    }

    /// Scope `thisAndFuture` for deletes: cancels every instance from `pivot`
    /// on and ends the rule the day before.
    async fn cancel_future(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
        pivot: NaiveDate,
    ) -> Result<DeletionResult, CoreError> {
        Self::find_instance_on_date_in_transaction(tx, template.id, pivot).await?;

        let cancelled = Self::cancel_from_in_transaction(tx, template.id, pivot).await?;
        let truncated = Self::save_template_in_transaction(tx, &truncate_before(template, pivot)?).await?;
        self.reconcile_instances(tx, &truncated).await?;

        let instances: Vec<EventInstance> = sqlx::query_as(
            r#"SELECT * FROM event_instances
            WHERE template_id = $1 AND occurrence_date >= $2
            ORDER BY occurrence_date"#,
        )
        .bind(template.id)
        .bind(pivot)
        .fetch_all(&mut **tx)
        .await?;

        debug!(template_id = %template.id, %pivot, cancelled, "cancelled future occurrences");
        Ok(DeletionResult::Future {
            template: truncated,
            cancelled: instances,
        })
    }
}

fn validate_title(title: &str) -> Result<String, CoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::InvalidInput("Title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

fn require_pivot(scope: EditScope, pivot: Option<NaiveDate>) -> Result<NaiveDate, CoreError> {
    pivot.ok_or_else(|| {
        CoreError::InvalidInput(format!("Scope '{}' requires the date of an occurrence", scope))
    })
}

fn single_row_diff(changed: bool) -> InstanceDiff {
    if changed {
        InstanceDiff { updated: 1, ..Default::default() }
    } else {
        InstanceDiff { unchanged: 1, ..Default::default() }
    }
}

/// Template changes restricted to what a single occurrence can override.
fn occurrence_changes(changes: &TemplateChanges) -> Result<OccurrenceChanges, CoreError> {
    let cleared = |field: &Option<Option<String>>| matches!(field, Some(None));
    if cleared(&changes.description) || cleared(&changes.location) {
        return Err(CoreError::InvalidInput(
            "Fields cannot be cleared for a single occurrence".to_string(),
        ));
    }
    Ok(OccurrenceChanges {
        title: changes.title.as_ref().map(|t| t.trim().to_string()),
        description: changes.description.clone().flatten(),
        location: changes.location.clone().flatten(),
        start_time: changes.start_time,
        end_time: changes.end_time,
    })
}

/// The template with `changes` applied. Time changes keep the anchor date.
fn apply_changes(current: &EventTemplate, changes: &TemplateChanges, rule: Option<Rule>) -> EventTemplate {
    let mut updated = current.clone();
    if let Some(title) = &changes.title {
        updated.title = title.trim().to_string();
    }
    if let Some(description) = &changes.description {
        updated.description = description.clone();
    }
    if let Some(location) = &changes.location {
        updated.location = location.clone();
    }
    let (anchor_start, anchor_end) = retime(
        current.anchor_date(),
        current.anchor_start,
        current.anchor_end,
        changes.start_time,
        changes.end_time,
    );
    updated.anchor_start = anchor_start;
    updated.anchor_end = anchor_end;
    if let Some(rule) = rule {
        updated.rule = rule;
    }
    updated
}

/// Rule for the part of a series from the pivot on, when the caller keeps
/// the existing pattern. The successor produces exactly the dates the
/// original materialized from the pivot on: a count becomes the number of
/// those dates, and an until date carries over unless the horizon or the
/// occurrence cap cut the original short of it.
fn continuation_rule(
    rule: &Rule,
    before_pivot: usize,
    materialized: usize,
    limits: &MaterializationLimits,
) -> Rule {
    if let Some(until) = rule.until() {
        if until <= limits.horizon && materialized < limits.max_occurrences {
            return rule.clone();
        }
    }
    let remaining = materialized.saturating_sub(before_pivot).max(1);
    let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);
    rule.with_bound(Some(RecurrenceBound::Count(remaining)))
}

/// The template with its rule ending the day before `pivot`.
fn truncate_before(template: &EventTemplate, pivot: NaiveDate) -> Result<EventTemplate, CoreError> {
    let last = pivot
        .pred_opt()
        .ok_or_else(|| CoreError::InvalidInput(format!("Cannot end a series before {}", pivot)))?;
    let mut truncated = template.clone();
    truncated.rule = template.rule.with_bound(Some(RecurrenceBound::Until(last)));
    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::MaterializationManager;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(rule: &str) -> EventTemplate {
        let anchor = date(2024, 1, 1);
        EventTemplate {
            id: Uuid::now_v7(),
            title: "Choir".to_string(),
            description: None,
            location: Some("Chapel".to_string()),
            anchor_start: anchor.and_time(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
            anchor_end: anchor.and_time(NaiveTime::from_hms_opt(21, 0, 0).unwrap()),
            rule: Rule::parse(rule).unwrap(),
            revision: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn limits() -> MaterializationLimits {
        MaterializationManager::with_defaults().limits_for(date(2024, 1, 1))
    }

    #[test]
    fn test_continuation_of_count_rule_keeps_total() {
        let rule = Rule::parse("FREQ=WEEKLY;COUNT=8").unwrap();
        assert_eq!(continuation_rule(&rule, 3, 8, &limits()).count(), Some(5));
    }

    #[test]
    fn test_continuation_of_unbounded_rule_uses_materialized_total() {
        let rule = Rule::parse("FREQ=DAILY").unwrap();
        assert_eq!(continuation_rule(&rule, 4, 10, &limits()).count(), Some(6));
    }

    #[test]
    fn test_continuation_of_until_rule_is_unchanged() {
        let rule = Rule::parse("FREQ=DAILY;UNTIL=2024-02-01").unwrap();
        assert_eq!(continuation_rule(&rule, 4, 32, &limits()), rule);
    }

    #[test]
    fn test_continuation_stops_where_the_horizon_stopped_the_original() {
        // 105 weekly dates fit in the default horizon out of COUNT=200.
        let rule = Rule::parse("FREQ=WEEKLY;COUNT=200").unwrap();
        assert_eq!(continuation_rule(&rule, 10, 105, &limits()).count(), Some(95));

        let until = Rule::parse("FREQ=WEEKLY;UNTIL=2030-01-01").unwrap();
        let continued = continuation_rule(&until, 10, 105, &limits());
        assert_eq!(continued.until(), None);
        assert_eq!(continued.count(), Some(95));
    }

    #[test]
    fn test_truncate_before_sets_until() {
        let truncated = truncate_before(&template("FREQ=DAILY;COUNT=10"), date(2024, 1, 5)).unwrap();
        assert_eq!(truncated.rule.until(), Some(date(2024, 1, 4)));
        assert_eq!(truncated.rule.count(), None);
    }

    #[test]
    fn test_apply_changes_retimes_on_anchor_date() {
        let current = template("FREQ=DAILY;COUNT=10");
        let changes = TemplateChanges {
            start_time: NaiveTime::from_hms_opt(18, 0, 0),
            location: Some(None),
            ..Default::default()
        };
        let updated = apply_changes(&current, &changes, None);
        assert_eq!(updated.anchor_start, date(2024, 1, 1).and_time(NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
        assert_eq!(updated.anchor_end, date(2024, 1, 1).and_time(NaiveTime::from_hms_opt(20, 0, 0).unwrap()));
        assert_eq!(updated.location, None);
        assert_eq!(updated.rule, current.rule);
    }

    #[test]
    fn test_empty_changes_leave_template_equal() {
        let current = template("FREQ=DAILY;COUNT=10");
        assert_eq!(apply_changes(&current, &TemplateChanges::default(), None), current);
    }

    #[test]
    fn test_occurrence_changes_reject_clearing() {
        let changes = TemplateChanges { description: Some(None), ..Default::default() };
        assert!(matches!(occurrence_changes(&changes), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_pivot_is_required_outside_all_scope() {
        assert!(require_pivot(EditScope::ThisAndFuture, None).is_err());
        assert_eq!(require_pivot(EditScope::ThisOccurrence, Some(date(2024, 1, 2))).unwrap(), date(2024, 1, 2));
    }
}
