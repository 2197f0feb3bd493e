//! `sreg graph`: print the hierarchy above one or more units.

use anyhow::Result;
use clap::Args;
use statreg_core::{LinkService, link::GraphNode, model::UnitRef};
use std::io::{self, Write};

use super::Context;
use crate::output::render_mode;

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Units to start from; they are highlighted in the output.
    #[arg(required = true)]
    pub units: Vec<UnitRef>,
}

fn write_tree(w: &mut dyn Write, node: &GraphNode, prefix: &str, last: bool, root: bool) -> io::Result<()> {
    let (branch, next_prefix) = if root {
        (String::new(), String::new())
    } else if last {
        (format!("{prefix}└── "), format!("{prefix}    "))
    } else {
        (format!("{prefix}├── "), format!("{prefix}│   "))
    };
    writeln!(
        w,
        "{branch}{}{} {}{}",
        if node.highlighted { "* " } else { "" },
        node.unit,
        node.name,
        if node.is_deleted { " (deleted)" } else { "" }
    )?;
    for (i, child) in node.children.iter().enumerate() {
        write_tree(w, child, &next_prefix, i + 1 == node.children.len(), false)?;
    }
    Ok(())
}

/// One line per node: depth, unit, highlighted, deleted, name.
fn write_flat(w: &mut dyn Write, node: &GraphNode, depth: usize) -> io::Result<()> {
    writeln!(
        w,
        "{depth}\t{}\t{}\t{}\t{}",
        node.unit,
        u8::from(node.highlighted),
        u8::from(node.is_deleted),
        node.name
    )?;
    for child in &node.children {
        write_flat(w, child, depth + 1)?;
    }
    Ok(())
}

/// Execute `sreg graph <unit>...`.
///
/// # Errors
///
/// Returns `UnitNotFound` for a missing start unit, `GraphTooDeep` when a
/// chain exceeds `[graph] max_hops`, or I/O errors.
pub fn run_graph(args: &GraphArgs, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;
    let forest = LinkService::new(&conn, ctx.actor.clone())
        .with_config(config)
        .build_graph(&args.units)?;
    render_mode(
        ctx.output,
        &forest,
        |roots, w| {
            for root in roots {
                write_flat(w, root, 0)?;
            }
            Ok(())
        },
        |roots, w| {
            for root in roots {
                write_tree(w, root, "", true, true)?;
            }
            Ok(())
        },
    )
}
