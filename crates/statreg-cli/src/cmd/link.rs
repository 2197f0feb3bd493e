//! `sreg link ...`: create, delete, check and list parent/child links.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use statreg_core::{LinkService, link, model::UnitRef};
use std::io::Write;

use super::Context;
use crate::output::{pretty_section, render, render_mode};

#[derive(Subcommand, Debug)]
pub enum LinkCommand {
    #[command(
        about = "Link two units",
        long_about = "Point the child's parent column at the parent. Arguments may be given in either order.",
        after_help = "EXAMPLES:\n    sreg link create legal_unit:4 enterprise_unit:2 --comment \"acquired\""
    )]
    Create(PairArgs),

    #[command(about = "Remove the link between two units")]
    Delete(PairArgs),

    #[command(about = "Report whether two units are or could be linked")]
    Check(PairArgs),

    #[command(about = "List a unit's parents and children")]
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct PairArgs {
    pub first: UnitRef,
    pub second: UnitRef,

    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    pub unit: UnitRef,
}

#[derive(Debug, Serialize)]
struct LinkReport {
    child: String,
    parent: String,
    linked: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    child: String,
    parent: String,
    /// The child's pointer for this edge.
    column: &'static str,
    exists: bool,
    can_link: bool,
}

/// Execute `sreg link <command>`.
///
/// # Errors
///
/// Returns domain errors from the link service, or I/O errors.
pub fn run_link(command: &LinkCommand, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;
    let links = LinkService::new(&conn, ctx.actor.clone()).with_config(config);

    match command {
        LinkCommand::Create(args) | LinkCommand::Delete(args) => {
            let create = matches!(command, LinkCommand::Create(_));
            let resolved = link::resolve(args.first, args.second)?;
            if create {
                links.create_link(args.first, args.second, args.comment.as_deref())?;
            } else {
                links.delete_link(args.first, args.second, args.comment.as_deref())?;
            }
            let report = LinkReport {
                child: resolved.child.to_string(),
                parent: resolved.parent.to_string(),
                linked: create,
            };
            render(ctx.output, &report, |r, w| {
                if r.linked {
                    writeln!(w, "✓ linked {} -> {}", r.child, r.parent)
                } else {
                    writeln!(w, "✓ unlinked {} -> {}", r.child, r.parent)
                }
            })
        }
        LinkCommand::Check(args) => {
            let resolved = link::resolve(args.first, args.second)?;
            let report = CheckReport {
                child: resolved.child.to_string(),
                parent: resolved.parent.to_string(),
                column: resolved.edge.column,
                exists: links.link_exists(args.first, args.second)?,
                can_link: links.can_link(args.first, args.second)?,
            };
            render(ctx.output, &report, |r, w| {
                writeln!(
                    w,
                    "{} -> {} ({}): exists={} can_link={}",
                    r.child, r.parent, r.column, r.exists, r.can_link
                )
            })
        }
        LinkCommand::List(args) => {
            let pairs = links.links_list(args.unit)?;
            let unit = args.unit;
            render_mode(
                ctx.output,
                &pairs,
                |ps, w| {
                    for pair in ps {
                        writeln!(w, "{} -> {}", pair.child.unit, pair.parent.unit)?;
                    }
                    Ok(())
                },
                |ps, w| {
                    pretty_section(w, &format!("Links of {unit}"))?;
                    if ps.is_empty() {
                        return writeln!(w, "(none)");
                    }
                    for pair in ps {
                        let (role, other) = if pair.child.unit == unit {
                            ("parent", &pair.parent)
                        } else {
                            ("child ", &pair.child)
                        };
                        writeln!(w, "{role}  {}  {}", other.unit, other.name)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
