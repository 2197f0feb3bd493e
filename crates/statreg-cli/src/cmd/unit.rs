//! `sreg unit ...`: unit lifecycle, history and listing.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use statreg_core::{
    LinkService, RegisterError, UnitService,
    classification::{self, ClassificationLabel, PathResolver},
    history::{self, ChainReport, ChangedField},
    link::{self, LinkPair},
    model::{ChangeReason, ClassificationTree, NewUnit, StatUnit, UnitEdit, UnitRef, UnitType},
    search::{self, RegionRollup, UnitFilter},
};
use std::io::{self, Write};

use super::Context;
use crate::output::{format_micros, pretty_kv, pretty_section, render, render_mode};

#[derive(Subcommand, Debug)]
pub enum UnitCommand {
    #[command(
        about = "Create a unit",
        after_help = "EXAMPLES:\n    sreg unit create legal_unit --name \"Acme Ltd\" --parent enterprise_unit:3"
    )]
    Create(CreateArgs),

    #[command(about = "Show the live version of a unit")]
    Show(ShowArgs),

    #[command(
        about = "Edit a unit's attributes",
        after_help = "EXAMPLES:\n    sreg unit edit le:4 --name \"Acme Limited\" --correction --comment typo"
    )]
    Edit(EditArgs),

    #[command(about = "Soft-delete a unit")]
    Delete(UnitArgs),

    #[command(about = "Restore a soft-deleted unit")]
    Undelete(UnitArgs),

    #[command(about = "List every version of a unit, newest first")]
    History(UnitArgs),

    #[command(about = "Fields changed by one version")]
    Diff(DiffArgs),

    #[command(about = "Check the unit's version chain for gaps and overlaps")]
    Verify(UnitArgs),

    #[command(about = "List live units")]
    List(ListArgs),

    #[command(about = "Count units per region ancestor")]
    Rollup(RollupArgs),
}

#[derive(Args, Debug)]
pub struct UnitArgs {
    /// Unit reference, e.g. `legal_unit:12` or `le:12`.
    pub unit: UnitRef,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unit type: local_unit, legal_unit, enterprise_unit or enterprise_group.
    pub unit_type: UnitType,

    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub stat_id: Option<String>,

    /// Region node id.
    #[arg(long)]
    pub region: Option<i64>,

    /// Activity category node id.
    #[arg(long)]
    pub activity: Option<i64>,

    /// Sector code node id.
    #[arg(long)]
    pub sector: Option<i64>,

    /// Parent unit; repeat for several parents of different types.
    #[arg(long = "parent")]
    pub parents: Vec<UnitRef>,

    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub unit: UnitRef,

    /// Show the unit even if it is deleted.
    #[arg(long)]
    pub include_deleted: bool,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub unit: UnitRef,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, conflicts_with = "clear_stat_id")]
    pub stat_id: Option<String>,
    #[arg(long)]
    pub clear_stat_id: bool,

    #[arg(long, conflicts_with = "clear_region")]
    pub region: Option<i64>,
    #[arg(long)]
    pub clear_region: bool,

    #[arg(long, conflicts_with = "clear_activity")]
    pub activity: Option<i64>,
    #[arg(long)]
    pub clear_activity: bool,

    #[arg(long, conflicts_with = "clear_sector")]
    pub sector: Option<i64>,
    #[arg(long)]
    pub clear_sector: bool,

    /// Record the change as a correction instead of a regular edit.
    #[arg(long)]
    pub correction: bool,

    #[arg(long)]
    pub comment: Option<String>,
}

fn field_edit<T: Clone>(value: Option<&T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.cloned().map(Some)
    }
}

impl EditArgs {
    fn to_edit(&self) -> UnitEdit {
        UnitEdit {
            name: self.name.clone(),
            stat_id: field_edit(self.stat_id.as_ref(), self.clear_stat_id),
            region_id: field_edit(self.region.as_ref(), self.clear_region),
            activity_category_id: field_edit(self.activity.as_ref(), self.clear_activity),
            sector_code_id: field_edit(self.sector.as_ref(), self.clear_sector),
        }
    }
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    pub unit: UnitRef,

    /// Row id of the version to inspect; defaults to the live version.
    #[arg(long)]
    pub row: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long = "type")]
    pub unit_type: Option<UnitType>,

    /// Case-insensitive name substring.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub stat_id: Option<String>,

    /// Region node; its whole subtree matches.
    #[arg(long)]
    pub region: Option<i64>,

    /// Activity category node; its whole subtree matches.
    #[arg(long)]
    pub activity: Option<i64>,

    #[arg(long)]
    pub include_deleted: bool,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RollupArgs {
    #[arg(long = "type", default_value = "local_unit")]
    pub unit_type: UnitType,

    /// Region tree level to group by (0 = roots).
    #[arg(long, default_value_t = 0)]
    pub level: usize,
}

/// A unit row with its reference spelled out for scripts.
#[derive(Debug, Serialize)]
pub struct UnitView {
    #[serde(rename = "ref")]
    pub unit: String,
    #[serde(flatten)]
    pub row: StatUnit,
}

impl From<StatUnit> for UnitView {
    fn from(row: StatUnit) -> Self {
        Self {
            unit: row.unit_ref().to_string(),
            row,
        }
    }
}

fn write_unit_pretty(unit: &UnitView, w: &mut dyn Write) -> io::Result<()> {
    let row = &unit.row;
    pretty_section(w, &format!("{} {}", unit.unit, row.name))?;
    pretty_kv(w, "stat id", row.stat_id.as_deref().unwrap_or("-"))?;
    pretty_kv(w, "deleted", row.is_deleted.to_string())?;
    pretty_kv(w, "reason", row.change_reason.as_str())?;
    pretty_kv(w, "user", &row.user_id)?;
    pretty_kv(w, "valid from", format_micros(row.valid_from_us))?;
    pretty_kv(w, "valid to", format_micros(row.valid_to_us))?;
    if let Some(comment) = &row.edit_comment {
        pretty_kv(w, "comment", comment)?;
    }
    for edge in link::parent_edges(row.unit_type()) {
        let value = edge
            .parent_id(row)
            .map_or_else(|| "-".to_string(), |id| UnitRef::new(edge.parent, id).to_string());
        pretty_kv(w, edge.column, value)?;
    }
    Ok(())
}

fn write_unit_text(unit: &UnitView, w: &mut dyn Write) -> io::Result<()> {
    let row = &unit.row;
    writeln!(
        w,
        "{}  {}  {}{}",
        unit.unit,
        row.change_reason,
        row.name,
        if row.is_deleted { "  [deleted]" } else { "" }
    )
}

/// Execute `sreg unit <command>`.
///
/// # Errors
///
/// Returns domain errors from the register services, or I/O errors.
pub fn run_unit(command: &UnitCommand, ctx: &Context) -> Result<()> {
    match command {
        UnitCommand::Create(args) => run_create(args, ctx),
        UnitCommand::Show(args) => run_show(args, ctx),
        UnitCommand::Edit(args) => run_edit(args, ctx),
        UnitCommand::Delete(args) => run_delete(args.unit, true, ctx),
        UnitCommand::Undelete(args) => run_delete(args.unit, false, ctx),
        UnitCommand::History(args) => run_history(args, ctx),
        UnitCommand::Diff(args) => run_diff(args, ctx),
        UnitCommand::Verify(args) => run_verify(args, ctx),
        UnitCommand::List(args) => run_list(args, ctx),
        UnitCommand::Rollup(args) => run_rollup(args, ctx),
    }
}

fn run_create(args: &CreateArgs, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;
    let mut new = NewUnit::new(args.unit_type, args.name.clone());
    new.stat_id.clone_from(&args.stat_id);
    new.region_id = args.region;
    new.activity_category_id = args.activity;
    new.sector_code_id = args.sector;
    new.comment.clone_from(&args.comment);
    for parent in &args.parents {
        let edge = link::edge(args.unit_type, parent.unit_type).ok_or(
            RegisterError::InvalidLinkType {
                first: args.unit_type,
                second: parent.unit_type,
            },
        )?;
        edge.set_pointer(&mut new.links, Some(parent.id));
    }

    let created = UnitService::new(&conn, ctx.actor.clone())
        .with_config(config)
        .create_unit(&new)?;
    let view = UnitView::from(created);
    render_mode(ctx.output, &view, write_unit_text, |v, w| {
        writeln!(w, "✓ created {}", v.unit)?;
        write_unit_pretty(v, w)
    })
}

#[derive(Debug, Serialize)]
struct ShowReport {
    #[serde(flatten)]
    unit: UnitView,
    classifications: Vec<ClassificationLabel>,
    links: Vec<LinkPair>,
}

fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;
    let row = UnitService::new(&conn, ctx.actor.clone()).get_unit(args.unit, args.include_deleted)?;

    let resolver = classification::resolver_for(&conn, &config.classification);
    let level = config.classification.display_level;
    let mut classifications = Vec::new();
    for (tree, node) in [
        (ClassificationTree::Region, row.region_id),
        (ClassificationTree::ActivityCategory, row.activity_category_id),
        (ClassificationTree::SectorCode, row.sector_code_id),
    ] {
        if let Some(node_id) = node {
            classifications.push(classification::describe(resolver.as_ref(), tree, node_id, level)?);
        }
    }

    let links = LinkService::new(&conn, ctx.actor.clone())
        .with_config(config)
        .links_list(args.unit)?;

    let report = ShowReport {
        unit: UnitView::from(row),
        classifications,
        links,
    };
    render_mode(
        ctx.output,
        &report,
        |r, w| write_unit_text(&r.unit, w),
        |r, w| {
            write_unit_pretty(&r.unit, w)?;
            for label in &r.classifications {
                let ancestor = label
                    .ancestor
                    .as_ref()
                    .map(|a| format!(" (in {} {})", a.code, a.name))
                    .unwrap_or_default();
                pretty_kv(
                    w,
                    label.tree.as_str(),
                    format!("{} {}{ancestor}", label.node.code, label.node.name),
                )?;
            }
            for pair in &r.links {
                pretty_kv(w, "link", format!("{} -> {}", pair.child.unit, pair.parent.unit))?;
            }
            Ok(())
        },
    )
}

fn run_edit(args: &EditArgs, ctx: &Context) -> Result<()> {
    let edit = args.to_edit();
    if edit.is_empty() {
        bail!("nothing to edit; pass at least one field flag");
    }
    let reason = if args.correction {
        ChangeReason::Correction
    } else {
        ChangeReason::Edit
    };

    let (conn, config) = ctx.open()?;
    let units = UnitService::new(&conn, ctx.actor.clone()).with_config(config);
    units.edit_unit(args.unit, &edit, reason, args.comment.as_deref())?;
    let view = UnitView::from(units.get_unit(args.unit, false)?);
    render_mode(ctx.output, &view, write_unit_text, |v, w| {
        writeln!(w, "✓ updated {}", v.unit)?;
        write_unit_pretty(v, w)
    })
}

#[derive(Debug, Serialize)]
struct DeleteReport {
    #[serde(rename = "ref")]
    unit: String,
    is_deleted: bool,
    changed: bool,
}

fn run_delete(unit: UnitRef, to_delete: bool, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;
    let changed = UnitService::new(&conn, ctx.actor.clone())
        .with_config(config)
        .delete_undelete_unit(unit, to_delete)?;
    let report = DeleteReport {
        unit: unit.to_string(),
        is_deleted: to_delete,
        changed,
    };
    render(ctx.output, &report, |r, w| {
        let state = if r.is_deleted { "deleted" } else { "live" };
        if r.changed {
            writeln!(w, "✓ {} is now {state}", r.unit)
        } else {
            writeln!(w, "{} was already {state}", r.unit)
        }
    })
}

fn run_history(args: &UnitArgs, ctx: &Context) -> Result<()> {
    let (conn, _config) = ctx.open()?;
    let versions: Vec<UnitView> = history::unit_history(&conn, args.unit)?
        .into_iter()
        .map(UnitView::from)
        .collect();
    render_mode(
        ctx.output,
        &versions,
        |vs, w| {
            for v in vs {
                writeln!(
                    w,
                    "{}  {}  {}  {}  {}",
                    v.row.id,
                    v.row.change_reason,
                    v.row.valid_from_us,
                    v.row.user_id,
                    v.row.name
                )?;
            }
            Ok(())
        },
        |vs, w| {
            pretty_section(w, &format!("History of {}", args.unit))?;
            for v in vs {
                let marker = if v.row.is_live() { "live" } else { "    " };
                writeln!(
                    w,
                    "{marker} row {:<6} {:<10} {} .. {}  by {}",
                    v.row.id,
                    v.row.change_reason.as_str(),
                    format_micros(v.row.valid_from_us),
                    format_micros(v.row.valid_to_us),
                    v.row.user_id
                )?;
                if let Some(comment) = &v.row.edit_comment {
                    writeln!(w, "       {comment}")?;
                }
            }
            Ok(())
        },
    )
}

fn run_diff(args: &DiffArgs, ctx: &Context) -> Result<()> {
    let (conn, _config) = ctx.open()?;
    let row_id = args.row.unwrap_or(args.unit.id);
    let changes: Vec<ChangedField> = history::history_changes(&conn, args.unit, row_id)?;
    render(ctx.output, &changes, |cs, w| {
        if cs.is_empty() {
            return writeln!(w, "no field changes (creating version)");
        }
        for change in cs {
            writeln!(
                w,
                "{}: {} -> {}",
                change.field,
                change.before.as_deref().unwrap_or("null"),
                change.after.as_deref().unwrap_or("null")
            )?;
        }
        Ok(())
    })
}

fn run_verify(args: &UnitArgs, ctx: &Context) -> Result<()> {
    let (conn, _config) = ctx.open()?;
    let report: ChainReport = history::verify_history_chain(&conn, args.unit)?;
    render(ctx.output, &report, |r, w| {
        if r.is_intact() {
            return writeln!(w, "✓ {} versions of {}, chain intact", r.versions, r.unit);
        }
        writeln!(w, "✗ {} violations in {}", r.violations.len(), r.unit)?;
        for violation in &r.violations {
            writeln!(w, "  {violation}")?;
        }
        Ok(())
    })?;
    if !report.is_intact() {
        bail!(
            "history chain of {} has {} violations",
            report.unit,
            report.violations.len()
        );
    }
    Ok(())
}

fn run_list(args: &ListArgs, ctx: &Context) -> Result<()> {
    let (conn, _config) = ctx.open()?;
    let filter = UnitFilter {
        unit_type: args.unit_type,
        name_contains: args.name.clone(),
        stat_id: args.stat_id.clone(),
        region_subtree: args.region,
        activity_subtree: args.activity,
        include_deleted: args.include_deleted,
        limit: args.limit,
    };
    let units: Vec<UnitView> = search::list_units(&conn, &filter)?
        .into_iter()
        .map(UnitView::from)
        .collect();
    render(ctx.output, &units, |us, w| {
        for unit in us {
            write_unit_text(unit, w)?;
        }
        Ok(())
    })
}

fn run_rollup(args: &RollupArgs, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;
    let resolver: Box<dyn PathResolver + '_> =
        classification::resolver_for(&conn, &config.classification);
    let rollup: RegionRollup =
        search::region_rollup(&conn, resolver.as_ref(), args.unit_type, args.level)?;
    render(ctx.output, &rollup, |r, w| {
        for (region, count) in &r.counts {
            writeln!(w, "region {region}: {count}")?;
        }
        writeln!(w, "unassigned: {}", r.unassigned)
    })
}
