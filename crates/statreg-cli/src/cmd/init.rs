//! `sreg init`: create the register database and a default `config.toml`.

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use statreg_core::{
    config::{CONFIG_FILE_NAME, RegisterConfig},
    db::{self, migrations},
};
use std::io::Write;

use super::Context;
use crate::output::{pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing `config.toml` with the defaults.
    #[arg(long)]
    pub force_config: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    db: String,
    config: String,
    schema_version: u32,
    created: bool,
    config_written: bool,
}

/// Execute `sreg init`. Safe to re-run: an existing database is migrated in
/// place and an existing config is kept unless `--force-config` is given.
///
/// # Errors
///
/// Returns an error if the database cannot be created or migrated, or the
/// config file cannot be written.
pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let created = !ctx.db_path.exists();
    let conn = db::open_register(&ctx.db_path)?;
    let schema_version = migrations::current_schema_version(&conn)?;

    let config_path = ctx.data_dir().join(CONFIG_FILE_NAME);
    let config_written = args.force_config || !config_path.exists();
    if config_written {
        let body = toml::to_string_pretty(&RegisterConfig::default())
            .context("serialize default config")?;
        std::fs::write(&config_path, body)
            .with_context(|| format!("write {}", config_path.display()))?;
    }

    tracing::info!(
        db = %ctx.db_path.display(),
        schema_version,
        created,
        config_written,
        "register initialised"
    );

    let report = InitReport {
        db: ctx.db_path.display().to_string(),
        config: config_path.display().to_string(),
        schema_version,
        created,
        config_written,
    };
    render(ctx.output, &report, |r, w| {
        if r.created {
            writeln!(w, "✓ created register")?;
        } else {
            writeln!(w, "✓ register already initialised")?;
        }
        pretty_kv(w, "database", &r.db)?;
        pretty_kv(w, "config", &r.config)?;
        pretty_kv(w, "schema", r.schema_version.to_string())
    })
}
