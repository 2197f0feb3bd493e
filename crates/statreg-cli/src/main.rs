#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use std::{env, path::PathBuf, process::ExitCode};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "sreg: statistical business register",
    long_about = None
)]
struct Cli {
    /// Register database file. Defaults to the platform data directory.
    #[arg(long, global = true, env = "SREG_DB")]
    db: Option<PathBuf>,

    /// User recorded on every version written by this command.
    #[arg(long, global = true, env = "SREG_USER", default_value = "operator")]
    user: String,

    /// Restrict writes to these `<unit_type>.<column>` fields.
    #[arg(long, global = true, value_delimiter = ',', env = "SREG_WRITABLE")]
    writable: Vec<String>,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create the register database",
        long_about = "Create (or migrate) the register database and write a default config.toml next to it.",
        after_help = "EXAMPLES:\n    sreg --db ./register.sqlite3 init\n\n    # Emit machine-readable output\n    sreg init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Units", about = "Create, edit and inspect units")]
    Unit {
        #[command(subcommand)]
        command: cmd::unit::UnitCommand,
    },

    #[command(next_help_heading = "Units", about = "Manage parent/child links")]
    Link {
        #[command(subcommand)]
        command: cmd::link::LinkCommand,
    },

    #[command(
        next_help_heading = "Units",
        about = "Show the hierarchy above units",
        after_help = "EXAMPLES:\n    # Everything above a local unit\n    sreg graph local_unit:7\n\n    # Two legal units with a shared enterprise\n    sreg graph le:3 le:4 --json"
    )]
    Graph(cmd::graph::GraphArgs),

    #[command(next_help_heading = "Classifications", about = "Import and query classification trees")]
    Class {
        #[command(subcommand)]
        command: cmd::class::ClassCommand,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SREG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "statreg=debug,info"
        } else {
            "statreg=info,warn"
        })
    });

    let format = env::var("SREG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output, so logs go to stderr.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    let ctx = cmd::Context {
        db_path: cmd::resolve_db_path(cli.db)?,
        actor: cmd::actor(&cli.user, &cli.writable),
        output,
    };
    tracing::debug!(db = %ctx.db_path.display(), user = %ctx.actor.user_id, "resolved context");

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &ctx),
        Commands::Unit { command } => cmd::unit::run_unit(command, &ctx),
        Commands::Link { command } => cmd::link::run_link(command, &ctx),
        Commands::Graph(args) => cmd::graph::run_graph(args, &ctx),
        Commands::Class { command } => cmd::class::run_class(command, &ctx),
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();

    match run(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error = CliError::from_anyhow(&err);
            tracing::debug!(error = %format!("{err:#}"), code = ?error.error_code, "command failed");
            if let Err(render_err) = output::render_error(output, &error) {
                eprintln!("error: {err:#} ({render_err})");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["sreg", "graph", "le:1", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Graph(_)));
    }

    #[test]
    fn format_flag_parses_before_subcommand() {
        let cli = Cli::parse_from(["sreg", "--format", "text", "init"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn db_and_user_flags_are_global() {
        let cli = Cli::parse_from([
            "sreg",
            "unit",
            "show",
            "legal_unit:4",
            "--db",
            "/tmp/r.sqlite3",
            "--user",
            "alice",
        ]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/r.sqlite3")));
        assert_eq!(cli.user, "alice");
    }

    #[test]
    fn writable_list_is_comma_separated() {
        let cli = Cli::parse_from([
            "sreg",
            "--writable",
            "legal_unit.name,legal_unit.stat_id",
            "init",
        ]);
        assert_eq!(cli.writable, vec!["legal_unit.name", "legal_unit.stat_id"]);
    }

    #[test]
    fn bad_unit_reference_is_rejected() {
        assert!(Cli::try_parse_from(["sreg", "graph", "shop:1"]).is_err());
        assert!(Cli::try_parse_from(["sreg", "graph", "legal_unit:x"]).is_err());
        assert!(Cli::try_parse_from(["sreg", "graph"]).is_err());
    }

    #[test]
    fn all_subcommands_parse() {
        let subcommands = [
            vec!["sreg", "init"],
            vec!["sreg", "unit", "create", "legal_unit", "--name", "Acme"],
            vec!["sreg", "unit", "create", "lu", "--name", "Shop", "--parent", "le:1", "--parent", "eu:2"],
            vec!["sreg", "unit", "show", "le:1"],
            vec!["sreg", "unit", "edit", "le:1", "--name", "Acme 2", "--correction"],
            vec!["sreg", "unit", "edit", "le:1", "--clear-region"],
            vec!["sreg", "unit", "delete", "le:1"],
            vec!["sreg", "unit", "undelete", "le:1"],
            vec!["sreg", "unit", "history", "le:1"],
            vec!["sreg", "unit", "diff", "le:1", "--row", "7"],
            vec!["sreg", "unit", "verify", "le:1"],
            vec!["sreg", "unit", "list", "--type", "legal_unit", "--region", "3"],
            vec!["sreg", "unit", "rollup", "--level", "1"],
            vec!["sreg", "link", "create", "le:1", "eu:2"],
            vec!["sreg", "link", "delete", "eu:2", "le:1", "--comment", "split"],
            vec!["sreg", "link", "check", "le:1", "eu:2"],
            vec!["sreg", "link", "list", "eu:2"],
            vec!["sreg", "graph", "lu:1", "lu:2"],
            vec!["sreg", "class", "import", "region", "regions.json"],
            vec!["sreg", "class", "ancestor", "region", "12", "1", "--field", "code"],
            vec!["sreg", "class", "subtree", "activity", "3"],
            vec!["sreg", "class", "path", "sector_code", "4"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn conflicting_edit_flags_are_rejected() {
        assert!(
            Cli::try_parse_from(["sreg", "unit", "edit", "le:1", "--region", "3", "--clear-region"])
                .is_err()
        );
    }
}
