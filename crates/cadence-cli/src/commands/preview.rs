use anyhow::Result;
use cadence_core::repository::Repository;

use crate::cli::PreviewCommand;
use crate::util::resolve_template_id;
use crate::views::table::display_preview;

pub async fn preview_template(repo: &impl Repository, command: PreviewCommand) -> Result<()> {
    let template_id = resolve_template_id(repo, &command.template).await?;
    let occurrences = repo.preview_template(template_id, command.limit).await?;
    display_preview(&occurrences);
    Ok(())
}
