//! Subcommands and their dispatch onto the engine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bidrec_analytics::PackageFilter;
use bidrec_core::{Basis, BidEventId, BidId, BidderId, PackageId, PersistenceGateway, ProjectId, SnapshotId};
use bidrec_engine::Engine;
use bidrec_ingestion::{BidderDecision, NewPackage, NewProject, ProjectUpdate, UploadRow};
use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, edit, list and delete projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Import an upload (JSON array of package rows) as a new bid event
    Import {
        project_id: ProjectId,
        /// Rows file
        file: PathBuf,
        /// Source label; defaults to the file name
        #[arg(long)]
        source: Option<String>,
    },

    /// Show the bidder review of a bid event
    Review { bid_event_id: BidEventId },

    /// Apply a JSON array of bidder decisions to a bid event
    Decide {
        bid_event_id: BidEventId,
        file: PathBuf,
    },

    /// Maintain the bidder directory
    #[command(subcommand)]
    Bidders(BidderCommand),

    /// Add and edit packages
    #[command(subcommand)]
    Package(PackageCommand),

    /// Low/median/high/average of a list of amounts
    Stats { amounts: Vec<f64> },

    /// Cost per SF by CSI division
    Aggregates {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum)]
        basis: Option<BasisArg>,
    },

    /// Cost per SF by month
    Timeseries {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum)]
        basis: Option<BasisArg>,
    },

    /// Per-project totals and grand totals
    Portfolio {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Record a validation snapshot of a project
    Validate {
        project_id: ProjectId,
        /// Who signs off
        #[arg(long = "by")]
        validated_by: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Validation state of a project, with drift against the latest snapshot
    Status { project_id: ProjectId },

    /// Validation snapshots of a project, newest first
    History { project_id: ProjectId },

    /// Delete one validation snapshot
    #[command(name = "delete-snapshot")]
    DeleteSnapshot { snapshot_id: SnapshotId },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Create {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        fields: ProjectFields,
    },
    Update {
        id: ProjectId,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ProjectFields,
        /// Fields to empty; may be repeated
        #[arg(long, value_enum)]
        clear: Vec<ProjectField>,
    },
    List,
    Totals { id: ProjectId },
    /// Delete a project with everything it owns
    Delete { id: ProjectId },
}

#[derive(Args, Debug, Default)]
pub struct ProjectFields {
    /// Project date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    county: Option<String>,
    /// Gross building square footage
    #[arg(long)]
    sf: Option<f64>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectField {
    Date,
    County,
    Sf,
    Notes,
}

/// `Some(None)` for a cleared field, otherwise the given value if any.
fn set_or_clear<T>(value: Option<T>, field: ProjectField, clear: &[ProjectField]) -> Option<Option<T>> {
    if clear.contains(&field) {
        Some(None)
    } else {
        value.map(Some)
    }
}

#[derive(Subcommand, Debug)]
pub enum BidderCommand {
    List,
    Create { name: String },
    Rename { id: BidderId, name: String },
    Alias { id: BidderId, alias: String },
    Delete { id: BidderId },
    /// Fold `merge_id` into `keep_id`
    Merge { keep_id: BidderId, merge_id: BidderId },
}

#[derive(Subcommand, Debug)]
pub enum PackageCommand {
    /// Add a package without bids
    Add {
        project_id: ProjectId,
        #[arg(long)]
        code: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        division: Option<String>,
        #[arg(long)]
        gmp: Option<f64>,
        #[arg(long)]
        estimate: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    Show { id: PackageId },
    Select { id: PackageId, bid_id: BidId },
    /// Set the selected amount by hand
    Override {
        id: PackageId,
        amount: f64,
        #[arg(long)]
        notes: Option<String>,
    },
    Clear { id: PackageId },
    Delete { id: PackageId },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BasisArg {
    Median,
    Selected,
}

impl From<BasisArg> for Basis {
    fn from(arg: BasisArg) -> Self {
        match arg {
            BasisArg::Median => Basis::MedianBid,
            BasisArg::Selected => Basis::SelectedAmount,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Restrict to a project id (repeatable)
    #[arg(long = "project")]
    projects: Vec<ProjectId>,
    /// Earliest project date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Latest project date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    county: Option<String>,
    #[arg(long)]
    min_sf: Option<f64>,
    #[arg(long)]
    max_sf: Option<f64>,
    #[arg(long)]
    exclude_unclassified: bool,
}

impl FilterArgs {
    fn to_filter(&self) -> PackageFilter {
        PackageFilter {
            project_ids: (!self.projects.is_empty())
                .then(|| self.projects.iter().copied().collect()),
            date_from: self.from,
            date_to: self.to,
            county: self.county.clone(),
            min_sf: self.min_sf,
            max_sf: self.max_sf,
            exclude_unclassified: self.exclude_unclassified,
        }
    }
}

fn json<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Run one command and return its JSON output.
pub fn execute<G: PersistenceGateway>(engine: &mut Engine<G>, command: Command) -> Result<Value> {
    match command {
        Command::Project(cmd) => project(engine, cmd),
        Command::Import {
            project_id,
            file,
            source,
        } => {
            let rows: Vec<UploadRow> = read_json(&file)?;
            let source = source.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string())
            });
            json(engine.import_bid_event(project_id, &source, &rows)?)
        }
        Command::Review { bid_event_id } => json(engine.resolve_bidder_review(bid_event_id)?),
        Command::Decide { bid_event_id, file } => {
            let decisions: Vec<BidderDecision> = read_json(&file)?;
            json(engine.apply_bidder_decisions(bid_event_id, &decisions)?)
        }
        Command::Bidders(cmd) => bidders(engine, cmd),
        Command::Package(cmd) => package(engine, cmd),
        Command::Stats { amounts } => json(engine.compute_package_stats(&amounts)),
        Command::Aggregates { filter, basis } => {
            json(engine.compute_aggregates(&filter.to_filter(), basis.map(Basis::from)))
        }
        Command::Timeseries { filter, basis } => {
            json(engine.compute_time_series(&filter.to_filter(), basis.map(Basis::from)))
        }
        Command::Portfolio { filter } => json(engine.portfolio(&filter.to_filter())),
        Command::Validate {
            project_id,
            validated_by,
            notes,
        } => json(engine.create_validation_snapshot(project_id, &validated_by, notes)?),
        Command::Status { project_id } => json(engine.validation_report(project_id)?),
        Command::History { project_id } => json(engine.snapshot_history(project_id)?),
        Command::DeleteSnapshot { snapshot_id } => {
            engine.delete_snapshot(snapshot_id)?;
            json(serde_json::json!({ "deleted": snapshot_id }))
        }
    }
}

fn project<G: PersistenceGateway>(engine: &mut Engine<G>, cmd: ProjectCommand) -> Result<Value> {
    match cmd {
        ProjectCommand::Create { name, fields } => {
            let id = engine.create_project(NewProject {
                name,
                project_date: fields.date,
                county: fields.county,
                building_sf: fields.sf,
                notes: fields.notes,
            })?;
            json(engine.store().project(id)?)
        }
        ProjectCommand::Update {
            id,
            name,
            fields,
            clear,
        } => {
            engine.update_project(
                id,
                ProjectUpdate {
                    name,
                    project_date: set_or_clear(fields.date, ProjectField::Date, &clear),
                    county: set_or_clear(fields.county, ProjectField::County, &clear),
                    building_sf: set_or_clear(fields.sf, ProjectField::Sf, &clear),
                    notes: set_or_clear(fields.notes, ProjectField::Notes, &clear),
                },
            )?;
            json(engine.store().project(id)?)
        }
        ProjectCommand::List => json(engine.store().projects.values().collect::<Vec<_>>()),
        ProjectCommand::Totals { id } => json(engine.project_totals(id)?),
        ProjectCommand::Delete { id } => json(engine.delete_project(id)?),
    }
}

fn bidders<G: PersistenceGateway>(engine: &mut Engine<G>, cmd: BidderCommand) -> Result<Value> {
    match cmd {
        BidderCommand::List => json(engine.list_bidders()),
        BidderCommand::Create { name } => {
            let id = engine.create_bidder(&name)?;
            json(engine.store().bidder(id)?)
        }
        BidderCommand::Rename { id, name } => {
            engine.rename_bidder(id, &name)?;
            json(engine.store().bidder(id)?)
        }
        BidderCommand::Alias { id, alias } => {
            let added = engine.add_alias(id, &alias)?;
            json(serde_json::json!({ "bidder": engine.store().bidder(id)?, "added": added }))
        }
        BidderCommand::Delete { id } => {
            engine.delete_bidder(id)?;
            json(serde_json::json!({ "deleted": id }))
        }
        BidderCommand::Merge { keep_id, merge_id } => json(engine.merge_bidders(keep_id, merge_id)?),
    }
}

fn package<G: PersistenceGateway>(engine: &mut Engine<G>, cmd: PackageCommand) -> Result<Value> {
    let id = match cmd {
        PackageCommand::Add {
            project_id,
            code,
            name,
            division,
            gmp,
            estimate,
            notes,
        } => engine.add_package(
            project_id,
            NewPackage {
                code,
                name,
                csi_division: division,
                gmp_amount: gmp,
                estimate,
                notes,
            },
        )?,
        PackageCommand::Show { id } => id,
        PackageCommand::Select { id, bid_id } => {
            engine.select_bid(id, bid_id)?;
            id
        }
        PackageCommand::Override { id, amount, notes } => {
            engine.override_package(id, amount, notes)?;
            id
        }
        PackageCommand::Clear { id } => {
            engine.clear_override(id)?;
            id
        }
        PackageCommand::Delete { id } => {
            engine.delete_package(id)?;
            return json(serde_json::json!({ "deleted": id }));
        }
    };
    json(engine.package_view(id)?)
}
