use anyhow::Result;
use cadence_core::repository::Repository;

use crate::views::table::display_templates;

pub async fn list_templates(repo: &impl Repository) -> Result<()> {
    let templates = repo.find_templates().await?;
    display_templates(&templates);
    Ok(())
}
