//! Binary entry point for the Penumbra administrative CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::thread;

use clap::{Args, Parser, Subcommand, ValueEnum};
use penumbra::admin::{
    check_snapshot, check_snapshot_with_sink, create_ids, inspect_ids, rebuild_ids, recover_ids,
    ConsistencyCheckMode, ConsistencyReport, IdFileReport, IdRecoveryReport,
};
use penumbra::check::{ChannelSink, CheckOptions, Finding};
use penumbra::storage::StoreSnapshot;
use penumbra::types::StoreKind;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::CliConfig;
use ui::{Theme, Ui};

const DEFAULT_MAX_FINDINGS: usize = 32;
const EXIT_INCONSISTENT: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "penumbra",
    version,
    about = "Consistency checking and identifier file maintenance for Penumbra stores",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "PENUMBRA_CONFIG",
        help = "CLI config file (defaults to <config dir>/penumbra/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ThemeArg::Auto,
        help = "Color theme for text output"
    )]
    theme: ThemeArg,

    #[arg(short, long, global = true, help = "Print bare lines without decoration")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[arg(value_name = "SNAPSHOT", help = "JSON store snapshot to check")]
    snapshot: PathBuf,

    #[arg(
        long,
        default_value = "full",
        value_parser = parse_mode,
        help = "Consistency check mode (none, full)"
    )]
    mode: ConsistencyCheckMode,

    #[arg(long, help = "Worker threads")]
    threads: Option<usize>,

    #[arg(long, value_name = "IDS", help = "Entity ids per work unit")]
    shard_size: Option<u64>,

    #[arg(long, value_name = "RECORDS", help = "Chain length reported as too long")]
    max_chain_length: Option<usize>,

    #[arg(long, help = "Do not cross-check schema indexes")]
    skip_indexes: bool,

    #[arg(long, help = "Do not report property chain defects")]
    skip_chains: bool,

    #[arg(long, help = "Do not scan the relationship store")]
    skip_relationships: bool,

    #[arg(long, value_name = "N", help = "Findings listed in text output")]
    max_findings: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum IdsCommand {
    #[command(about = "Create a clean identifier file")]
    Create {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, default_value_t = 0, help = "Initial high id")]
        high_id: u64,
    },

    #[command(about = "Print an identifier file header")]
    Inspect {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    #[command(about = "Recover an identifier file after an unclean shutdown")]
    Recover {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, help = "High id reported by the record store")]
        store_high_id: Option<u64>,
    },

    #[command(about = "Rebuild a free list from a store snapshot")]
    Rebuild {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, value_name = "SNAPSHOT", required = true)]
        snapshot: PathBuf,

        #[arg(long, value_enum, help = "Store the identifier file belongs to")]
        store: StoreArg,
    },
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Check a store snapshot for inconsistencies")]
    Check(CheckCmd),

    #[command(subcommand, about = "Identifier file maintenance")]
    Ids(IdsCommand),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StoreArg {
    Node,
    Relationship,
    Property,
}

impl From<StoreArg> for StoreKind {
    fn from(store: StoreArg) -> Self {
        match store {
            StoreArg::Node => StoreKind::Node,
            StoreArg::Relationship => StoreKind::Relationship,
            StoreArg::Property => StoreKind::Property,
        }
    }
}

fn parse_mode(raw: &str) -> Result<ConsistencyCheckMode, String> {
    raw.parse().map_err(|err: penumbra::admin::AdminError| err.to_string())
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PENUMBRA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, Box<dyn Error>> {
    let config = CliConfig::load(cli.config.clone())?;
    if let Some(path) = config.path() {
        tracing::debug!(path = %path.display(), "cli.config");
    }
    let ui = Ui::new(cli.theme.into(), cli.quiet);

    match cli.command {
        Command::Check(cmd) => {
            let options = build_check_options(&config, &cmd);
            let report = match cli.format {
                OutputFormat::Json => {
                    let (report, findings) = check_snapshot(&cmd.snapshot, &options, cmd.mode)?;
                    let output = CheckOutput {
                        report: &report,
                        findings: &findings,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                    report
                }
                OutputFormat::Text => {
                    let limit = cmd
                        .max_findings
                        .or_else(|| config.max_findings())
                        .unwrap_or(DEFAULT_MAX_FINDINGS);
                    let report = stream_check(&ui, &cmd, &options, limit)?;
                    print_check_text(&ui, &report);
                    report
                }
            };
            if !report.success {
                return Ok(EXIT_INCONSISTENT);
            }
        }
        Command::Ids(IdsCommand::Create { path, high_id }) => {
            let report = create_ids(&path, high_id)?;
            emit(cli.format, &report, || print_id_file_text(&ui, &report))?;
        }
        Command::Ids(IdsCommand::Inspect { path }) => {
            let report = inspect_ids(&path)?;
            emit(cli.format, &report, || print_id_file_text(&ui, &report))?;
        }
        Command::Ids(IdsCommand::Recover {
            path,
            store_high_id,
        }) => {
            let report = recover_ids(&path, store_high_id)?;
            emit(cli.format, &report, || print_recovery_text(&ui, &report))?;
        }
        Command::Ids(IdsCommand::Rebuild {
            path,
            snapshot,
            store,
        }) => {
            let (records, _) = StoreSnapshot::load(&snapshot)?.into_parts()?;
            let report = rebuild_ids(&path, &records, store.into())?;
            emit(cli.format, &report, || print_recovery_text(&ui, &report))?;
        }
    }

    Ok(0)
}

fn build_check_options(config: &CliConfig, cmd: &CheckCmd) -> CheckOptions {
    let mut opts = config.check_options();
    if let Some(threads) = cmd.threads {
        opts = opts.threads(threads);
    }
    if let Some(shard_size) = cmd.shard_size {
        opts = opts.shard_size(shard_size);
    }
    if let Some(max_chain_length) = cmd.max_chain_length {
        opts = opts.max_chain_length(max_chain_length);
    }
    if cmd.skip_indexes {
        opts = opts.check_indexes(false);
    }
    if cmd.skip_chains {
        opts = opts.check_property_chains(false);
    }
    if cmd.skip_relationships {
        opts = opts.check_relationships(false);
    }
    opts
}

/// Runs the check while a second thread prints findings as they arrive.
fn stream_check(
    ui: &Ui,
    cmd: &CheckCmd,
    options: &CheckOptions,
    limit: usize,
) -> Result<ConsistencyReport, Box<dyn Error>> {
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| -> Result<ConsistencyReport, Box<dyn Error>> {
        let printer = scope.spawn(move || ui.stream_findings("Findings", rx, limit));
        // The sink owns the only sender; dropping it ends the printer.
        let checked =
            check_snapshot_with_sink(&cmd.snapshot, options, cmd.mode, &ChannelSink::new(tx));
        let printed = printer.join().map_err(|_| "finding printer panicked")?;
        let report = checked?;
        printed?;
        Ok(report)
    })
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    report: &'a ConsistencyReport,
    findings: &'a [Finding],
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_check_text(ui: &Ui, report: &ConsistencyReport) {
    let summary = &report.summary;
    ui.section(
        "Consistency check",
        [
            ("mode", report.mode.to_string()),
            ("nodes checked", summary.nodes_checked.to_string()),
            ("relationships checked", summary.relationships_checked.to_string()),
            ("index checks", summary.index_checks.to_string()),
            ("slots skipped", summary.slots_skipped.to_string()),
            ("findings", report.findings.total().to_string()),
            ("unchecked entities", summary.errors.len().to_string()),
        ],
    );
    ui.section(
        "Findings by kind",
        report
            .findings
            .by_kind
            .iter()
            .map(|(kind, count)| (kind.as_str(), *count)),
    );
    ui.list(
        "Unchecked entities",
        summary
            .errors
            .iter()
            .map(|err| format!("{}: {}", err.entity, err.message)),
    );
    if summary.cancelled {
        ui.warn("check cancelled before every entity was visited");
    }
    if report.success {
        ui.success("store is consistent");
    } else {
        ui.warn("inconsistencies found");
    }
}

fn print_id_file_text(ui: &Ui, report: &IdFileReport) {
    ui.section(
        "Identifier file",
        [
            ("path", report.path.display().to_string()),
            ("format version", report.format_version.to_string()),
            ("sticky", report.sticky.to_string()),
            ("high id", report.high_id.to_string()),
            ("free ids", report.free_count.to_string()),
        ],
    );
    if report.sticky {
        ui.warn("sticky marker set: the file was not closed cleanly; run `ids recover`");
    }
}

fn print_recovery_text(ui: &Ui, report: &IdRecoveryReport) {
    ui.section(
        "Identifier recovery",
        [
            ("path", report.path.display().to_string()),
            ("was clean", report.was_clean.to_string()),
            ("discarded free ids", report.discarded.to_string()),
            ("high id", report.high_id.to_string()),
            ("free ids", report.free_count.to_string()),
        ],
    );
    ui.success("identifier file closed cleanly");
}
