use anyhow::Result;
use cadence_core::models::EventTemplate;
use cadence_core::repository::{InstanceDetails, Repository};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::cli::ShowCommand;
use crate::util::resolve_template_id;
use crate::views::table::display_instances;

#[derive(Serialize)]
struct TemplateWithInstances<'a> {
    template: &'a EventTemplate,
    instances: &'a [InstanceDetails],
}

pub async fn show_template(repo: &impl Repository, command: ShowCommand) -> Result<()> {
    let template_id = resolve_template_id(repo, &command.template).await?;
    let template = repo
        .find_template_by_id(template_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Event with ID '{}' not found", template_id))?;
    let instances = repo.get_instances(template_id).await?;

    if command.json {
        let view = TemplateWithInstances {
            template: &template,
            instances: &instances,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{} {}", "↻".cyan(), template.title.bold());
    println!("  {} {}", "ID:".dimmed(), template.id);
    println!(
        "  {} {} to {}",
        "First:".dimmed(),
        template.anchor_start.format("%Y-%m-%d %H:%M"),
        template.anchor_end.format("%Y-%m-%d %H:%M")
    );
    println!("  {} {}", "Rule:".dimmed(), template.rule);
    if let Some(description) = &template.description {
        println!("  {} {}", "Description:".dimmed(), description);
    }
    if let Some(location) = &template.location {
        println!("  {} {}", "Location:".dimmed(), location);
    }
    println!();

    display_instances(&instances);
    Ok(())
}
