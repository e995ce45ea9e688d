//! # Cadence Core Library
//!
//! Recurring events stored as a template plus a recurrence rule, expanded
//! into concrete instance rows, with per-date exceptions layered on top.
//!
//! ## Features
//!
//! - **Rule Parsing**: `FREQ`/`INTERVAL`/`COUNT`/`UNTIL`/`BYDAY` rules parsed
//!   into a typed [`rule::Rule`]
//! - **Bounded Materialization**: rules without an end are cut off by a
//!   default count and a horizon, so expansion always terminates
//! - **Exception Overlay**: cancelled and modified occurrences survive
//!   regeneration
//! - **Scoped Edits**: `this`, `thisAndFuture` and `all` updates and deletes,
//!   each applied in a single transaction
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`rule`]: Recurrence rule parsing and formatting
//! - [`recurrence`]: Rule expansion into dated occurrences
//! - [`overlay`]: Exception resolution over occurrences
//! - [`models`]: Core data structures and transfer objects
//! - [`repository`]: Data access layer with the scoped mutation operations
//! - [`datetime`]: Date and time input parsing
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     datetime::parse_datetime,
//!     db,
//!     models::{EditScope, NewTemplateData, TemplateChanges},
//!     recurrence::{MaterializationConfig, MaterializationManager},
//!     repository::{SqliteRepository, TemplateRepository},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("events.db").await?;
//!     let repo = SqliteRepository::new(pool, MaterializationManager::new(MaterializationConfig::default()));
//!
//!     let created = repo
//!         .create_template(NewTemplateData {
//!             title: "Daily Meeting".to_string(),
//!             starts_at: parse_datetime("2024-01-01T09:00:00")?,
//!             ends_at: Some(parse_datetime("2024-01-01T09:30:00")?),
//!             rule: "FREQ=DAILY;COUNT=5".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Created {} instances", created.instances.len());
//!
//!     // Move the meeting to a new room from the third day on.
//!     let changes = TemplateChanges {
//!         location: Some(Some("Room 4".to_string())),
//!         ..Default::default()
//!     };
//!     let pivot = created.instances[2].occurrence_date;
//!     repo.update_template(created.template.id, changes, EditScope::ThisAndFuture, Some(pivot))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod datetime;
pub mod db;
pub mod error;
pub mod models;
pub mod overlay;
pub mod recurrence;
pub mod repository;
pub mod rule;
