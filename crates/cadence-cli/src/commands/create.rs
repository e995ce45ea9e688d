use anyhow::Result;
use cadence_core::datetime::parse_datetime;
use cadence_core::models::NewTemplateData;
use cadence_core::repository::Repository;
use owo_colors::{OwoColorize, Style};

use crate::cli::CreateCommand;

pub async fn create_template(repo: &impl Repository, command: CreateCommand) -> Result<()> {
    let starts_at = parse_datetime(&command.start)?;
    let ends_at = command.end.as_deref().map(parse_datetime).transpose()?;

    let created = repo
        .create_template(NewTemplateData {
            id: None,
            title: command.title,
            description: command.description,
            location: command.location,
            starts_at,
            ends_at,
            rule: command.rule,
        })
        .await?;

    let success_style = Style::new().green().bold();
    let template = &created.template;
    println!(
        "{} Created event '{}' ({})",
        "✓".style(success_style),
        template.title.bold(),
        template.id
    );
    println!("  {} {}", "Rule:".dimmed(), template.rule);

    match (created.instances.first(), created.instances.last()) {
        (Some(first), Some(last)) => println!(
            "  {} {} occurrences from {} to {}",
            "Materialized:".dimmed(),
            created.instances.len(),
            first.occurrence_date,
            last.occurrence_date
        ),
        _ => println!(
            "  {} the rule produces no occurrences within the horizon",
            "Note:".yellow()
        ),
    }

    Ok(())
}
