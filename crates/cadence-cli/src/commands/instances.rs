use anyhow::Result;
use cadence_core::datetime::parse_date;
use cadence_core::repository::{InstanceQuery, Repository};

use crate::cli::InstancesCommand;
use crate::util::resolve_template_id;
use crate::views::table::display_instances;

pub async fn list_instances(repo: &impl Repository, command: InstancesCommand) -> Result<()> {
    let template_id = match &command.template {
        Some(template) => Some(resolve_template_id(repo, template).await?),
        None => None,
    };

    let query = InstanceQuery {
        template_id,
        from: command.from.as_deref().map(parse_date).transpose()?,
        to: command.to.as_deref().map(parse_date).transpose()?,
        include_cancelled: command.include_cancelled,
        limit: command.limit,
    };
    let instances = repo.list_instances(&query).await?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
    } else {
        display_instances(&instances);
    }
    Ok(())
}
