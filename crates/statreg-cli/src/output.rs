//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde::Serialize;
use statreg_core::{ErrorCode, RegisterError, model::ParseEnumError};
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// Format a microsecond timestamp in local time; the open end of a validity
/// window prints as `open`.
pub fn format_micros(us: i64) -> String {
    if us == i64::MAX {
        return "open".to_string();
    }
    DateTime::<Utc>::from_timestamp_micros(us)
        .map(|ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string()
        })
        .unwrap_or_else(|| us.to_string())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned fields).
    Pretty,
    /// Compact plain text for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }
    if json_flag {
        return OutputMode::Json;
    }
    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {}
        }
    }
    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// Render a serializable value with explicit pretty/text renderers.
///
/// # Errors
///
/// Returns an error if writing to stdout or JSON serialization fails.
pub fn render_mode<T: Serialize + ?Sized>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render a serializable value; pretty and text share `human_fn`.
///
/// # Errors
///
/// Returns an error if writing to stdout or JSON serialization fails.
pub fn render<T: Serialize + ?Sized>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A CLI-level failure that carries one of the register error codes but has
/// no [`RegisterError`] counterpart, e.g. a missing database.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable code, e.g. `E2003`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Whether re-running the same command may succeed.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl CliError {
    fn coded(code: ErrorCode, message: String) -> Self {
        Self {
            message,
            suggestion: code.hint().map(str::to_owned),
            error_code: Some(code.code().to_string()),
            retryable: false,
        }
    }

    /// Map a command failure, keeping the code of the first coded error in
    /// the chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(register) = cause.downcast_ref::<RegisterError>() {
                return Self::from(register);
            }
            if let Some(coded) = cause.downcast_ref::<CodedError>() {
                return Self::coded(coded.code, format!("{err:#}"));
            }
            if cause.downcast_ref::<ParseEnumError>().is_some() {
                return Self::coded(ErrorCode::InvalidEnumValue, format!("{err:#}"));
            }
        }
        Self::coded(ErrorCode::InternalUnexpected, format!("{err:#}"))
    }
}

impl From<&RegisterError> for CliError {
    fn from(err: &RegisterError) -> Self {
        let code = err.code();
        Self {
            message: err.to_string(),
            suggestion: code.hint().map(str::to_owned),
            error_code: Some(code.code().to_string()),
            retryable: err.is_retryable(),
        }
    }
}

/// Render an error to stderr in the requested format.
///
/// # Errors
///
/// Returns an error if writing to stderr fails.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use statreg_core::model::{UnitRef, UnitType};

    #[test]
    fn format_flag_wins_over_json_and_env() {
        let mode = resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn json_flag_wins_over_env() {
        let mode = resolve_output_mode_inner(None, true, Some("text"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn env_is_case_insensitive() {
        let mode = resolve_output_mode_inner(None, false, Some("JSON"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn unknown_env_falls_back_to_tty_detection() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("yaml"), true),
            OutputMode::Pretty
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, None, false),
            OutputMode::Text
        );
    }

    #[test]
    fn register_error_keeps_code_and_hint() {
        let err = RegisterError::LinkAlreadyExists {
            child: UnitRef::new(UnitType::LegalUnit, 1),
            parent: UnitRef::new(UnitType::EnterpriseUnit, 2),
        };
        let cli = CliError::from(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E2003"));
        assert!(cli.suggestion.is_some());
        assert!(!cli.retryable);
    }

    #[test]
    fn anyhow_chain_is_searched_for_domain_errors() {
        let err = anyhow::Error::new(RegisterError::ConcurrentModification {
            unit: UnitRef::new(UnitType::EnterpriseGroup, 4),
        })
        .context("edit unit");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E3001"));
        assert!(cli.retryable);

        let plain = CliError::from_anyhow(&anyhow::anyhow!("disk full"));
        assert_eq!(plain.error_code.as_deref(), Some("E9001"));
        assert_eq!(plain.message, "disk full");

        let missing = anyhow::Error::new(CodedError::new(
            ErrorCode::NotInitialized,
            "no register at /tmp/x",
        ));
        let cli = CliError::from_anyhow(&missing);
        assert_eq!(cli.error_code.as_deref(), Some("E1001"));
        assert!(cli.suggestion.unwrap().contains("sreg init"));
    }

    #[test]
    fn open_window_formats_as_open() {
        assert_eq!(format_micros(i64::MAX), "open");
        assert!(format_micros(1_700_000_000_000_000).starts_with("20"));
    }

    #[test]
    fn cli_error_json_skips_empty_fields() {
        let error = CliError {
            message: "boom".into(),
            suggestion: None,
            error_code: None,
            retryable: false,
        };
        let value = serde_json::to_value(error).unwrap();
        assert_eq!(value, serde_json::json!({ "message": "boom" }));
    }
}
