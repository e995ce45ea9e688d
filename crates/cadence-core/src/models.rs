use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::rule::{parse_by_day, RecurrenceBound, Rule};

// ============================================================================
// Templates
// ============================================================================

/// A recurring event definition: content, anchor time range and rule.
///
/// The anchor start fixes the first possible occurrence date and the
/// start time-of-day; `anchor_end - anchor_start` is the duration every
/// occurrence inherits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub anchor_start: NaiveDateTime,
    pub anchor_end: NaiveDateTime,
    pub rule: Rule,
    /// Bumped by every mutation that locks the template row.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventTemplate {
    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor_start.date()
    }

    pub fn start_time(&self) -> NaiveTime {
        self.anchor_start.time()
    }

    pub fn duration(&self) -> Duration {
        self.anchor_end - self.anchor_start
    }
}

impl<'r> FromRow<'r, SqliteRow> for EventTemplate {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let interval: i64 = row.try_get("repeat_interval")?;
        let count: Option<i64> = row.try_get("occurrence_count")?;
        let until: Option<NaiveDate> = row.try_get("until_date")?;
        let by_day: Option<String> = row.try_get("by_day")?;

        let interval = u32::try_from(interval)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| column_error("repeat_interval", "interval must be positive"))?;

        let bound = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(column_error(
                    "occurrence_count",
                    "template has both a count and an until bound",
                ))
            }
            (Some(n), None) => Some(RecurrenceBound::Count(
                u32::try_from(n).map_err(|_| column_error("occurrence_count", "count out of range"))?,
            )),
            (None, Some(date)) => Some(RecurrenceBound::Until(date)),
            (None, None) => None,
        };

        let by_day = match by_day.as_deref() {
            Some(text) if !text.is_empty() => {
                parse_by_day(text).map_err(|e| column_error("by_day", &e.to_string()))?
            }
            _ => Vec::new(),
        };

        Ok(EventTemplate {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            location: row.try_get("location")?,
            anchor_start: row.try_get("anchor_start")?,
            anchor_end: row.try_get("anchor_end")?,
            rule: Rule {
                frequency: row.try_get("frequency")?,
                interval,
                bound,
                by_day,
            },
            revision: row.try_get("revision")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn column_error(column: &str, message: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.to_string().into(),
    }
}

#[derive(Debug, Default, Clone)]
pub struct NewTemplateData {
    /// Caller-chosen identifier. A second create with the same id is a conflict.
    pub id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: NaiveDateTime,
    /// Defaults to `starts_at` (zero-length occurrences).
    pub ends_at: Option<NaiveDateTime>,
    pub rule: String,
}

/// Field changes for a scoped template update.
///
/// `Option<Option<T>>` fields distinguish "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Default, Clone)]
pub struct TemplateChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub rule: Option<String>,
}

impl TemplateChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.rule.is_none()
    }
}

/// Per-occurrence overrides. Unset fields keep following the template.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl OccurrenceChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

// ============================================================================
// Instances and exceptions
// ============================================================================

/// One materialized occurrence as stored, with effective values applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExceptionKind {
    Cancelled,
    Modified,
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionKind::Cancelled => write!(f, "cancelled"),
            ExceptionKind::Modified => write!(f, "modified"),
        }
    }
}

impl FromStr for ExceptionKind {
    type Err = ParseExceptionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cancelled" | "canceled" => Ok(ExceptionKind::Cancelled),
            "modified" => Ok(ExceptionKind::Modified),
            _ => Err(ParseExceptionKindError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid exception kind: {0}")]
pub struct ParseExceptionKindError(String);

/// A durable per-date deviation from the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventException {
    pub template_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub kind: ExceptionKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventException {
    pub fn is_cancelled(&self) -> bool {
        self.kind == ExceptionKind::Cancelled
    }

    pub fn overrides(&self) -> OccurrenceChanges {
        OccurrenceChanges {
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

// ============================================================================
// Scopes and mutation results
// ============================================================================

/// Breadth of a template mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditScope {
    /// Only the occurrence at the pivot date
    ThisOccurrence,
    /// The pivot occurrence and every later one
    ThisAndFuture,
    /// The whole series
    EntireSeries,
}

impl std::fmt::Display for EditScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditScope::ThisOccurrence => write!(f, "this"),
            EditScope::ThisAndFuture => write!(f, "future"),
            EditScope::EntireSeries => write!(f, "all"),
        }
    }
}

impl FromStr for EditScope {
    type Err = ParseEditScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "this" | "occurrence" => Ok(EditScope::ThisOccurrence),
            "future" | "this_and_future" | "thisandfuture" => Ok(EditScope::ThisAndFuture),
            "all" | "series" | "entire" => Ok(EditScope::EntireSeries),
            _ => Err(ParseEditScopeError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid edit scope: {0}")]
pub struct ParseEditScopeError(String);

/// Row-level effect of one regeneration pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDiff {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl InstanceDiff {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }

    pub fn absorb(&mut self, other: InstanceDiff) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTemplate {
    pub template: EventTemplate,
    pub instances: Vec<EventInstance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// The template now governing the edited occurrences. For a split this
    /// is the newly created template.
    pub template: EventTemplate,
    /// The original template after truncation, when the update split it.
    pub truncated: Option<EventTemplate>,
    pub diff: InstanceDiff,
}

#[derive(Debug, Clone, Serialize)]
pub enum DeletionResult {
    /// The template and all of its rows were removed.
    Series {
        template_id: Uuid,
        instances_removed: u64,
        exceptions_removed: u64,
    },
    /// A single occurrence was cancelled.
    Occurrence { instance: EventInstance },
    /// The series was truncated and the occurrences from the pivot onward cancelled.
    Future {
        template: EventTemplate,
        cancelled: Vec<EventInstance>,
    },
}
