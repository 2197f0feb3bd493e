//! statreg-core library.
//!
//! Core of a statistical business register: the four-level unit hierarchy
//! (local unit, legal unit, enterprise unit, enterprise group), append-only
//! version history for every unit, and resolution over the region, activity
//! and sector classification trees.
//!
//! # Conventions
//!
//! - **Errors**: domain operations return [`error::RegisterError`];
//!   file and bootstrap helpers return `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).
//! - **Transactions**: every mutation runs in one `BEGIN IMMEDIATE`
//!   transaction on the caller's connection.

pub mod classification;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod link;
pub mod model;
pub mod search;
pub mod unit;

pub use error::{ErrorCode, RegisterError};
pub use link::LinkService;
pub use unit::UnitService;
