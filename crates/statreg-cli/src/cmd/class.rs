//! `sreg class ...`: classification tree import and lookups.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use statreg_core::{
    classification::{self, PathResolver, SqlResolver},
    model::{ClassificationNode, ClassificationTree, FieldValue, NodeField},
};
use std::{collections::BTreeSet, io::Write, path::PathBuf};

use super::Context;
use crate::output::{pretty_section, render, render_mode};

#[derive(Subcommand, Debug)]
pub enum ClassCommand {
    #[command(
        about = "Import nodes from a JSON file",
        long_about = "Insert or update nodes from a JSON array of {id, code, name, parent_id, level}. The whole file is applied in one transaction.",
        after_help = "EXAMPLES:\n    sreg class import region regions.json"
    )]
    Import(ImportArgs),

    #[command(
        about = "Ancestor of a node at a level",
        after_help = "EXAMPLES:\n    # Province (level 1) of district 1203\n    sreg class ancestor region 1203 1\n\n    # Only its code\n    sreg class ancestor region 1203 1 --field code"
    )]
    Ancestor(AncestorArgs),

    #[command(about = "A node and all of its descendants")]
    Subtree(NodeArgs),

    #[command(about = "Path from the root down to a node")]
    Path(NodeArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// region, activity_category or sector_code.
    pub tree: ClassificationTree,
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct NodeArgs {
    pub tree: ClassificationTree,
    pub node: i64,
}

#[derive(Args, Debug)]
pub struct AncestorArgs {
    pub tree: ClassificationTree,
    pub node: i64,
    /// Depth of the ancestor; 0 is the root.
    pub level: usize,

    /// Print one attribute (id, code, name, level) instead of the node.
    #[arg(long)]
    pub field: Option<NodeField>,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    tree: ClassificationTree,
    imported: usize,
}

#[derive(Debug, Serialize)]
struct FieldReport {
    tree: ClassificationTree,
    node: i64,
    level: usize,
    value: FieldValue,
}

#[derive(Debug, Serialize)]
struct SubtreeReport {
    tree: ClassificationTree,
    root: i64,
    ids: BTreeSet<i64>,
}

fn write_node(w: &mut dyn Write, node: &ClassificationNode) -> std::io::Result<()> {
    writeln!(w, "{}\t{}\t{}", node.id, node.code, node.name)
}

/// Execute `sreg class <command>`.
///
/// # Errors
///
/// Returns `ClassificationNodeNotFound`, `LevelOutOfRange` or
/// `ClassificationCycle` from the resolver, file and parse errors from
/// import, or I/O errors.
pub fn run_class(command: &ClassCommand, ctx: &Context) -> Result<()> {
    let (conn, config) = ctx.open()?;

    match command {
        ClassCommand::Import(args) => {
            let nodes = classification::load_nodes_file(&args.file)?;
            let imported = classification::import_nodes(&conn, args.tree, &nodes)?;
            let report = ImportReport {
                tree: args.tree,
                imported,
            };
            render(ctx.output, &report, |r, w| {
                writeln!(w, "✓ imported {} {} nodes", r.imported, r.tree)
            })
        }
        ClassCommand::Ancestor(args) => {
            let resolver = classification::resolver_for(&conn, &config.classification);
            if let Some(field) = args.field {
                let report = FieldReport {
                    tree: args.tree,
                    node: args.node,
                    level: args.level,
                    value: resolver.field_of_ancestor(args.tree, args.node, args.level, field)?,
                };
                return render(ctx.output, &report, |r, w| writeln!(w, "{}", r.value));
            }
            let ancestor = resolver.ancestor_node_at_level(args.tree, args.node, args.level)?;
            render(ctx.output, &ancestor, |node, w| write_node(w, node))
        }
        ClassCommand::Subtree(args) => {
            let report = SubtreeReport {
                tree: args.tree,
                root: args.node,
                ids: SqlResolver::new(&conn).subtree_ids(args.tree, args.node)?,
            };
            render(ctx.output, &report, |r, w| {
                for id in &r.ids {
                    writeln!(w, "{id}")?;
                }
                Ok(())
            })
        }
        ClassCommand::Path(args) => {
            let resolver = classification::resolver_for(&conn, &config.classification);
            let path = resolver.root_path(args.tree, args.node)?;
            let (tree, node) = (args.tree, args.node);
            render_mode(
                ctx.output,
                &path,
                |nodes, w| {
                    for node in nodes {
                        write_node(w, node)?;
                    }
                    Ok(())
                },
                |nodes, w| {
                    pretty_section(w, &format!("{tree} {node}"))?;
                    for (depth, n) in nodes.iter().enumerate() {
                        writeln!(w, "{}{} {} (level {depth})", "  ".repeat(depth), n.code, n.name)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
