use anyhow::Result;
use cadence_core::repository::{InstanceDetails, Repository};
use owo_colors::{OwoColorize, Style};

use crate::cli::{InstanceAction, InstanceCommand};
use crate::commands::occurrence_changes;
use crate::util::resolve_instance_id;

pub async fn instance_command(repo: &impl Repository, command: InstanceCommand) -> Result<()> {
    let (verb, details) = match command.action {
        InstanceAction::Edit(edit) => {
            let instance_id = resolve_instance_id(repo, &edit.instance).await?;
            let changes = occurrence_changes(edit.fields)?;
            ("Updated", repo.update_instance(instance_id, changes).await?)
        }
        InstanceAction::Cancel(arg) => {
            let instance_id = resolve_instance_id(repo, &arg.instance).await?;
            ("Cancelled", repo.cancel_instance(instance_id).await?)
        }
        InstanceAction::Restore(arg) => {
            let instance_id = resolve_instance_id(repo, &arg.instance).await?;
            ("Restored", repo.restore_instance(instance_id).await?)
        }
    };

    print_instance(verb, &details);
    Ok(())
}

fn print_instance(verb: &str, instance: &InstanceDetails) {
    let success_style = Style::new().green().bold();
    println!(
        "{} {} '{}' on {}",
        "✓".style(success_style),
        verb,
        instance.title,
        instance.occurrence_date
    );
    println!(
        "  {} {} to {}",
        "Time:".dimmed(),
        instance.starts_at.format("%Y-%m-%d %H:%M"),
        instance.ends_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(location) = &instance.location {
        println!("  {} {}", "Location:".dimmed(), location);
    }
    if instance.cancelled {
        println!("  {} cancelled", "Status:".dimmed());
    }
}
