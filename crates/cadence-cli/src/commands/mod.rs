// Each subcommand lives in its own module.

pub mod create;
pub mod delete;
pub mod instance;
pub mod instances;
pub mod list;
pub mod preview;
pub mod show;
pub mod update;

use anyhow::{anyhow, Result};
use cadence_core::datetime::parse_time;
use cadence_core::error::CoreError;
use cadence_core::models::{OccurrenceChanges, TemplateChanges};

use crate::cli::FieldArgs;

fn clearable(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

pub(crate) fn template_changes(fields: FieldArgs, rule: Option<String>) -> Result<TemplateChanges> {
    Ok(TemplateChanges {
        title: fields.title,
        description: clearable(fields.description, fields.description_clear),
        location: clearable(fields.location, fields.location_clear),
        start_time: fields.start_time.as_deref().map(parse_time).transpose()?,
        end_time: fields.end_time.as_deref().map(parse_time).transpose()?,
        rule,
    })
}

pub(crate) fn occurrence_changes(fields: FieldArgs) -> Result<OccurrenceChanges> {
    if fields.description_clear || fields.location_clear {
        return Err(anyhow!(CoreError::InvalidInput(
            "Fields cannot be cleared for a single occurrence; restore it instead".to_string()
        )));
    }
    Ok(OccurrenceChanges {
        title: fields.title,
        description: fields.description,
        location: fields.location,
        start_time: fields.start_time.as_deref().map(parse_time).transpose()?,
        end_time: fields.end_time.as_deref().map(parse_time).transpose()?,
    })
}
