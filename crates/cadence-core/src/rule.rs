//! Typed recurrence rules.
//!
//! A [`Rule`] is parsed from the `KEY=value;KEY=value` subset of RFC 5545
//! RRULE text that the engine supports: `FREQ`, `INTERVAL`, `COUNT`, `UNTIL`
//! and `BYDAY`. Everything else is rejected rather than silently ignored.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::CoreError;

/// Recurrence frequency. Stored lowercase in the `frequency` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_rrule(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

/// Generation bound. COUNT and UNTIL are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceBound {
    Count(u32),
    /// Inclusive last date.
    Until(NaiveDate),
}

/// A validated recurrence rule.
///
/// `bound == None` means the rule text carried neither COUNT nor UNTIL; the
/// materializer then applies the configured default count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rule {
    pub frequency: Frequency,
    pub interval: u32,
    pub bound: Option<RecurrenceBound>,
    /// Monday-first, deduplicated. Only honoured for weekly rules.
    pub by_day: Vec<Weekday>,
}

impl Rule {
    /// Parses rule text such as `FREQ=WEEKLY;INTERVAL=2;COUNT=6;BYDAY=MO,WE`.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidRule` when FREQ is missing or unknown, when
    /// COUNT and UNTIL are both present, when a key is repeated or
    /// unsupported, or when any value (including a BYDAY token) is malformed.
    pub fn parse(text: &str) -> Result<Rule, CoreError> {
        let body = text.trim();
        let body = body
            .strip_prefix("RRULE:")
            .or_else(|| body.strip_prefix("rrule:"))
            .unwrap_or(body);

        let mut seen = HashSet::new();
        let mut frequency = None;
        let mut interval = None;
        let mut count = None;
        let mut until = None;
        let mut by_day = None;

        for segment in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| invalid(format!("expected KEY=value, got '{}'", segment)))?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();

            if !seen.insert(key.clone()) {
                return Err(invalid(format!("{} is given more than once", key)));
            }
            if value.is_empty() {
                return Err(invalid(format!("{} has an empty value", key)));
            }

            match key.as_str() {
                "FREQ" => {
                    frequency = Some(
                        value
                            .parse::<Frequency>()
                            .map_err(|_| invalid(format!("unrecognized FREQ '{}'", value)))?,
                    )
                }
                "INTERVAL" => interval = Some(parse_positive("INTERVAL", value)?),
                "COUNT" => count = Some(parse_positive("COUNT", value)?),
                "UNTIL" => until = Some(parse_until(value)?),
                "BYDAY" => by_day = Some(parse_by_day(value)?),
                other => return Err(invalid(format!("unsupported key '{}'", other))),
            }
        }

        let frequency = frequency.ok_or_else(|| invalid("FREQ is required".to_string()))?;

        let bound = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(invalid("COUNT and UNTIL are mutually exclusive".to_string()))
            }
            (Some(n), None) => Some(RecurrenceBound::Count(n)),
            (None, Some(date)) => Some(RecurrenceBound::Until(date)),
            (None, None) => None,
        };

        Ok(Rule {
            frequency,
            interval: interval.unwrap_or(1),
            bound,
            by_day: by_day.unwrap_or_default(),
        })
    }

    /// Occurrence count bound, if the rule has one.
    pub fn count(&self) -> Option<u32> {
        match self.bound {
            Some(RecurrenceBound::Count(n)) => Some(n),
            _ => None,
        }
    }

    /// Inclusive end date, if the rule has one.
    pub fn until(&self) -> Option<NaiveDate> {
        match self.bound {
            Some(RecurrenceBound::Until(date)) => Some(date),
            _ => None,
        }
    }

    /// The same rule with a different bound.
    pub fn with_bound(&self, bound: Option<RecurrenceBound>) -> Rule {
        Rule { bound, ..self.clone() }
    }

    /// BYDAY list in its stored form, e.g. `MO,WE`. `None` when empty.
    pub fn by_day_text(&self) -> Option<String> {
        if self.by_day.is_empty() {
            None
        } else {
            Some(
                self.by_day
                    .iter()
                    .map(|d| weekday_code(*d))
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency.as_rrule())?;
        if self.interval > 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        match self.bound {
            Some(RecurrenceBound::Count(n)) => write!(f, ";COUNT={}", n)?,
            Some(RecurrenceBound::Until(date)) => write!(f, ";UNTIL={}", date.format("%Y-%m-%d"))?,
            None => {}
        }
        if let Some(days) = self.by_day_text() {
            write!(f, ";BYDAY={}", days)?;
        }
        Ok(())
    }
}

impl FromStr for Rule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::parse(s)
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.to_string()
    }
}

impl TryFrom<String> for Rule {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rule::parse(&value)
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::InvalidRule(message)
}

fn parse_positive(key: &str, value: &str) -> Result<u32, CoreError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}

fn parse_until(value: &str) -> Result<NaiveDate, CoreError> {
    // Accept ISO dates and the RFC 5545 basic forms; keep only the date part.
    let date_part = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y%m%d"))
        .map_err(|_| invalid(format!("UNTIL must be a date, got '{}'", value)))
}

/// Parses a BYDAY list into a Monday-first, deduplicated weekday set.
pub fn parse_by_day(value: &str) -> Result<Vec<Weekday>, CoreError> {
    let mut days = Vec::new();
    for token in value.split(',').map(str::trim) {
        let day = match token.to_ascii_uppercase().as_str() {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            _ => return Err(invalid(format!("unrecognized BYDAY token '{}'", token))),
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    Ok(days)
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}
