//! Folds per-date exceptions onto materialized occurrences.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::models::{EventException, EventTemplate};
use crate::recurrence::Occurrence;

/// An occurrence with template values and any exception applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOccurrence {
    pub date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cancelled: bool,
    pub is_exception: bool,
}

/// Resolves every occurrence against the exceptions recorded for its date.
///
/// Cancelled occurrences stay in the output with `cancelled = true`.
/// Exceptions whose date is not among `occurrences` are left out.
pub fn apply(
    occurrences: &[Occurrence],
    exceptions: &[EventException],
    template: &EventTemplate,
) -> Vec<ResolvedOccurrence> {
    let by_date: HashMap<NaiveDate, &EventException> =
        exceptions.iter().map(|e| (e.occurrence_date, e)).collect();

    let resolved: Vec<ResolvedOccurrence> = occurrences
        .iter()
        .map(|occurrence| resolve(occurrence, template, by_date.get(&occurrence.date).copied()))
        .collect();

    let applied = resolved.iter().filter(|r| r.is_exception).count();
    if applied < exceptions.len() {
        debug!(
            template_id = %template.id,
            stale = exceptions.len() - applied,
            "exceptions outside the materialized set were not applied"
        );
    }

    resolved
}

/// Resolves a single occurrence.
pub fn resolve(
    occurrence: &Occurrence,
    template: &EventTemplate,
    exception: Option<&EventException>,
) -> ResolvedOccurrence {
    let mut resolved = ResolvedOccurrence {
        date: occurrence.date,
        starts_at: occurrence.starts_at,
        ends_at: occurrence.ends_at,
        title: template.title.clone(),
        description: template.description.clone(),
        location: template.location.clone(),
        cancelled: false,
        is_exception: false,
    };

    let Some(exception) = exception else {
        return resolved;
    };

    resolved.is_exception = true;
    resolved.cancelled = exception.is_cancelled();

    if let Some(title) = &exception.title {
        resolved.title = title.clone();
    }
    if let Some(description) = &exception.description {
        resolved.description = Some(description.clone());
    }
    if let Some(location) = &exception.location {
        resolved.location = Some(location.clone());
    }

    let (starts_at, ends_at) = retime(
        occurrence.date,
        occurrence.starts_at,
        occurrence.ends_at,
        exception.start_time,
        exception.end_time,
    );
    resolved.starts_at = starts_at;
    resolved.ends_at = ends_at;

    resolved
}

/// Places a time range on `date`, optionally replacing its start and end
/// time-of-day. Without a new end the original duration is kept; an end
/// earlier than the start falls on the following day.
pub fn retime(
    date: NaiveDate,
    starts_at: NaiveDateTime,
    ends_at: NaiveDateTime,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(start_time.unwrap_or(starts_at.time()));
    let end = match end_time {
        Some(end_time) => {
            let end = date.and_time(end_time);
            if end < start {
                end.checked_add_signed(Duration::days(1)).unwrap_or(NaiveDateTime::MAX)
            } else {
                end
            }
        }
        None => start
            .checked_add_signed(ends_at - starts_at)
            .unwrap_or(NaiveDateTime::MAX),
    };
    (start, end)
}
