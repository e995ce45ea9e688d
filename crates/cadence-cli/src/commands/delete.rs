use anyhow::Result;
use cadence_core::datetime::parse_date;
use cadence_core::models::{DeletionResult, EditScope};
use cadence_core::repository::Repository;
use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};

use crate::cli::DeleteCommand;
use crate::util::resolve_template_id;

pub async fn delete_template(repo: &impl Repository, command: DeleteCommand) -> Result<()> {
    let template_id = resolve_template_id(repo, &command.template).await?;
    let pivot = command.on.as_deref().map(parse_date).transpose()?;

    if command.scope == EditScope::EntireSeries && !command.force {
        let template = repo
            .find_template_by_id(template_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Event with ID '{}' not found", template_id))?;

        let confirmation = Confirm::new()
            .with_prompt(format!(
                "Delete '{}' and all of its occurrences?",
                template.title
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    let result = repo.delete_template(template_id, command.scope, pivot).await?;

    let success_style = Style::new().green().bold();
    match result {
        DeletionResult::Series {
            template_id,
            instances_removed,
            exceptions_removed,
        } => println!(
            "{} Deleted event {} ({} occurrences, {} exceptions)",
            "✓".style(success_style),
            template_id,
            instances_removed,
            exceptions_removed
        ),
        DeletionResult::Occurrence { instance } => println!(
            "{} Cancelled '{}' on {}",
            "✓".style(success_style),
            instance.title,
            instance.occurrence_date
        ),
        DeletionResult::Future { template, cancelled } => {
            println!(
                "{} Cancelled {} occurrences of '{}' from {}",
                "✓".style(success_style),
                cancelled.len(),
                template.title,
                pivot.map(|d| d.to_string()).unwrap_or_default()
            );
            println!("  {} {}", "Rule is now:".dimmed(), template.rule);
        }
    }
    Ok(())
}
