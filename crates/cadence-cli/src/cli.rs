use cadence_core::models::EditScope;
use clap::{Args, Parser, Subcommand};

/// Recurring events with per-occurrence exceptions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a recurring event
    Create(CreateCommand),
    /// List recurring events
    List,
    /// Show an event and its stored occurrences
    Show(ShowCommand),
    /// Update an event for one occurrence, this and future ones, or all
    Update(UpdateCommand),
    /// Delete one occurrence, this and future ones, or the whole event
    Delete(DeleteCommand),
    /// Work with a single occurrence by its instance ID
    Instance(InstanceCommand),
    /// List stored occurrences across events
    Instances(InstancesCommand),
    /// Compute occurrences without storing anything
    Preview(PreviewCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct CreateCommand {
    /// The title of the event
    pub title: String,
    /// Start of the first occurrence (e.g. '2024-01-01T09:00')
    #[arg(long)]
    pub start: String,
    /// End of the first occurrence; defaults to the start
    #[arg(long)]
    pub end: Option<String>,
    /// Recurrence rule (e.g. 'FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10')
    #[arg(long)]
    pub rule: String,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(short, long)]
    pub location: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// Event ID or unique prefix
    pub template: String,
    /// Print JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

/// Field changes shared by event updates and occurrence edits.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, conflicts_with = "description")]
    pub description_clear: bool,

    #[arg(long)]
    pub location: Option<String>,
    #[arg(long, conflicts_with = "location")]
    pub location_clear: bool,

    /// New start time of day (HH:MM)
    #[arg(long)]
    pub start_time: Option<String>,
    /// New end time of day (HH:MM); before the start means the next day
    #[arg(long)]
    pub end_time: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct UpdateCommand {
    /// Event ID or unique prefix
    pub template: String,

    /// How far the change reaches (this|future|all)
    #[arg(long)]
    pub scope: EditScope,

    /// Date of the occurrence the change starts at; required unless scope is 'all'
    #[arg(long)]
    pub on: Option<String>,

    #[command(flatten)]
    pub fields: FieldArgs,

    /// New recurrence rule
    #[arg(long)]
    pub rule: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// Event ID or unique prefix
    pub template: String,

    /// How far the deletion reaches (this|future|all)
    #[arg(long)]
    pub scope: EditScope,

    /// Date of the occurrence the deletion starts at; required unless scope is 'all'
    #[arg(long)]
    pub on: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct InstanceCommand {
    #[command(subcommand)]
    pub action: InstanceAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum InstanceAction {
    /// Override fields of one occurrence
    Edit(InstanceEditCommand),
    /// Cancel one occurrence
    Cancel(InstanceIdArg),
    /// Drop the exception of one occurrence so it follows the event again
    Restore(InstanceIdArg),
}

#[derive(Parser, Debug, Clone)]
pub struct InstanceEditCommand {
    /// Instance ID or unique prefix
    pub instance: String,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct InstanceIdArg {
    /// Instance ID or unique prefix
    pub instance: String,
}

#[derive(Parser, Debug, Clone)]
pub struct InstancesCommand {
    /// Only occurrences of this event
    #[arg(long)]
    pub template: Option<String>,
    /// First date to include
    #[arg(long)]
    pub from: Option<String>,
    /// Last date to include
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub include_cancelled: bool,
    #[arg(long)]
    pub limit: Option<u32>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PreviewCommand {
    /// Event ID or unique prefix
    pub template: String,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
