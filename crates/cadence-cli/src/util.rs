use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::repository::Repository;
use uuid::Uuid;

pub async fn resolve_template_id(repo: &impl Repository, short_id: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(short_id) {
        return Ok(id);
    }
    check_length(short_id)?;

    let templates = repo.find_templates_by_short_id_prefix(short_id).await?;
    match templates.len() {
        1 => Ok(templates[0].id),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No event found with ID prefix '{}'",
            short_id
        )))),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            templates.into_iter().map(|t| (t.id.to_string(), t.title)).collect()
        ))),
    }
}

pub async fn resolve_instance_id(repo: &impl Repository, short_id: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(short_id) {
        return Ok(id);
    }
    check_length(short_id)?;

    let instances = repo.find_instances_by_short_id_prefix(short_id).await?;
    match instances.len() {
        1 => Ok(instances[0].id),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No occurrence found with ID prefix '{}'",
            short_id
        )))),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            instances
                .into_iter()
                .map(|i| (i.id.to_string(), format!("{} on {}", i.title, i.occurrence_date)))
                .collect()
        ))),
    }
}

fn check_length(short_id: &str) -> Result<()> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    Ok(())
}
