//! Command handlers. Each handler receives its parsed args and the shared
//! [`Context`] built from the global flags.

pub mod class;
pub mod graph;
pub mod init;
pub mod link;
pub mod unit;

use anyhow::{Context as _, Result};
use rusqlite::Connection;
use statreg_core::{
    ErrorCode,
    config::{RegisterConfig, load_config},
    db,
    model::{Actor, WritableFields},
};
use std::path::{Path, PathBuf};

use crate::output::{CodedError, OutputMode};

/// Database file name under the platform data directory.
const DEFAULT_DB_RELATIVE: &str = "statreg/register.sqlite3";

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub actor: Actor,
    pub output: OutputMode,
}

impl Context {
    /// Directory holding the database and its `config.toml`.
    pub fn data_dir(&self) -> &Path {
        match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Open an initialised register and load its config.
    ///
    /// # Errors
    ///
    /// `NotInitialized` when the database file is missing,
    /// `ConfigParseError` when `config.toml` is unreadable, or any error
    /// from opening the database.
    pub fn open(&self) -> Result<(Connection, RegisterConfig)> {
        if !self.db_path.exists() {
            return Err(CodedError::new(
                ErrorCode::NotInitialized,
                format!("no register database at {}", self.db_path.display()),
            )
            .into());
        }
        let conn = db::open_existing(&self.db_path)?;
        let config = load_config(self.data_dir()).map_err(|err| {
            anyhow::Error::new(CodedError::new(ErrorCode::ConfigParseError, format!("{err:#}")))
        })?;
        Ok((conn, config))
    }
}

/// Resolve the database path: `--db` / `SREG_DB` first, then the platform
/// data directory.
///
/// # Errors
///
/// Returns an error when no path was given and the platform has no data
/// directory.
pub fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    dirs::data_dir()
        .map(|dir| dir.join(DEFAULT_DB_RELATIVE))
        .context("no data directory on this platform; pass --db or set SREG_DB")
}

/// Build the acting user from `--user` and the optional `--writable` list.
pub fn actor(user: &str, writable: &[String]) -> Actor {
    let actor = Actor::new(user);
    if writable.is_empty() {
        actor
    } else {
        actor.with_writable(WritableFields::only(writable.iter().map(String::as_str)))
    }
}
