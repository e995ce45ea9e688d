use anyhow::Result;
use cadence_core::datetime::parse_date;
use cadence_core::models::EditScope;
use cadence_core::repository::Repository;
use owo_colors::{OwoColorize, Style};

use crate::cli::UpdateCommand;
use crate::commands::template_changes;
use crate::util::resolve_template_id;

pub async fn update_template(repo: &impl Repository, command: UpdateCommand) -> Result<()> {
    let template_id = resolve_template_id(repo, &command.template).await?;
    let pivot = command.on.as_deref().map(parse_date).transpose()?;
    let changes = template_changes(command.fields, command.rule)?;

    if changes.is_empty() && command.scope != EditScope::EntireSeries {
        println!("No changes specified.");
        return Ok(());
    }

    let outcome = repo
        .update_template(template_id, changes, command.scope, pivot)
        .await?;

    let success_style = Style::new().green().bold();
    match (&outcome.truncated, command.scope) {
        (Some(original), _) => {
            println!(
                "{} Split '{}': the original now ends with rule {}",
                "✓".style(success_style),
                original.title,
                original.rule
            );
            println!(
                "  {} {} ({}), rule {}",
                "Continues as".dimmed(),
                outcome.template.title.bold(),
                outcome.template.id,
                outcome.template.rule
            );
        }
        (None, EditScope::ThisOccurrence) => {
            println!(
                "{} Updated the occurrence of '{}' on {}",
                "✓".style(success_style),
                outcome.template.title,
                pivot.map(|d| d.to_string()).unwrap_or_default()
            );
        }
        (None, _) => {
            println!(
                "{} Updated '{}' ({})",
                "✓".style(success_style),
                outcome.template.title.bold(),
                outcome.template.id
            );
        }
    }

    let diff = outcome.diff;
    if diff.is_noop() {
        println!("  {} no occurrences changed", "Occurrences:".dimmed());
    } else {
        println!(
            "  {} {} added, {} updated, {} removed, {} unchanged",
            "Occurrences:".dimmed(),
            diff.inserted,
            diff.updated,
            diff.deleted,
            diff.unchanged
        );
    }
    Ok(())
}
