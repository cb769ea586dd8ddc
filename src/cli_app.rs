//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(feature = "probe")]
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use model_migration_assessor::core::config::Config;
use model_migration_assessor::core::errors::MmaError;
use model_migration_assessor::juju::remote::SshRemote;
use model_migration_assessor::juju::runner::CliRunner;
use model_migration_assessor::logger::jsonl::JsonlConfig;
use model_migration_assessor::logger::recorder::{Echo, Recorder};
use model_migration_assessor::migration::oracle::HttpProbe;
#[cfg(feature = "probe")]
use model_migration_assessor::migration::oracle::ReqwestProbe;
#[cfg(not(feature = "probe"))]
use model_migration_assessor::migration::oracle::UnavailableProbe;
use model_migration_assessor::scenarios::{
    Harness, HarnessParts, Outcome, RunReport, Scenario, ScenarioRunner,
};
use model_migration_assessor::wait::clock::SystemClock;

/// Model Migration Assessor: acceptance harness for live model migration.
#[derive(Debug, Parser)]
#[command(
    name = "mma",
    author,
    version,
    about = "Model Migration Assessor - live migration acceptance harness",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity (echo every command and poll).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the migration scenarios against the configured controllers.
    Run(RunArgs),
    /// List the scenarios a run would execute.
    Scenarios(ScenariosArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Include scenarios that need development-branch controllers.
    #[arg(long)]
    use_develop: bool,
    /// Restrict the run to these scenarios (comma separated or repeated).
    #[arg(long, value_enum, value_delimiter = ',')]
    only: Vec<Scenario>,
}

#[derive(Debug, Clone, Args, Default)]
struct ScenariosArgs {
    /// Include scenarios that need development-branch controllers.
    #[arg(long)]
    use_develop: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// At least one scenario failed.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<MmaError> for CliError {
    fn from(err: MmaError) -> Self {
        if err.code().starts_with("MMA-1") {
            Self::User(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_scenarios(cli, args),
        Command::Scenarios(args) => list_scenarios(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── run ────────────────────

fn run_scenarios(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let recorder = Recorder::open(
        JsonlConfig {
            path: config.paths.jsonl_log.clone(),
            ..JsonlConfig::default()
        },
        echo_level(cli),
    );

    let parts = HarnessParts {
        runner: Arc::new(CliRunner::new(
            config.controllers.juju_bin.clone(),
            config.controllers.feature_flags.clone(),
        )),
        remote: Arc::new(SshRemote::new(config.remote.clone())),
        probe: build_probe(&config)?,
        clock: Arc::new(SystemClock::new()),
        recorder: recorder.clone(),
    };
    let harness = Harness::assemble(&config, parts).inspect_err(|e| recorder.error(e))?;

    let runner = ScenarioRunner::new(harness, args.use_develop, &args.only);
    if runner.plan().is_empty() {
        return Err(CliError::User(
            "no scenarios selected (develop-only scenarios need --use-develop)".to_string(),
        ));
    }
    let report = runner.run();

    match output_mode(cli) {
        OutputMode::Human => print_report_human(&report),
        OutputMode::Json => {
            let payload = json!({
                "command": "run",
                "success": report.success(),
                "passed": report.passed(),
                "failed": report.failed(),
                "skipped": report.skipped(),
                "report": serde_json::to_value(&report)?,
            });
            write_json_line(&payload)?;
        }
    }

    if report.success() {
        Ok(())
    } else {
        Err(CliError::Partial(format!(
            "{} of {} scenarios failed",
            report.failed(),
            report.scenarios.len()
        )))
    }
}

#[cfg(feature = "probe")]
fn build_probe(config: &Config) -> Result<Arc<dyn HttpProbe>, CliError> {
    let timeout = Duration::from_secs(config.probe.http_timeout_secs);
    Ok(Arc::new(ReqwestProbe::new(timeout)?))
}

#[cfg(not(feature = "probe"))]
fn build_probe(_config: &Config) -> Result<Arc<dyn HttpProbe>, CliError> {
    Ok(Arc::new(UnavailableProbe))
}

fn echo_level(cli: &Cli) -> Echo {
    if cli.quiet {
        Echo::Quiet
    } else if cli.verbose {
        Echo::Verbose
    } else {
        Echo::Normal
    }
}

fn print_report_human(report: &RunReport) {
    println!(
        "{} {} -> {} (client {})",
        "Migration run:".bold(),
        report.source,
        report.destination,
        report.version
    );
    for entry in &report.scenarios {
        let label = match entry.outcome {
            Outcome::Passed => "PASS".green().bold(),
            Outcome::Failed => "FAIL".red().bold(),
            Outcome::Skipped => "SKIP".yellow(),
        };
        print!("  {label}  {:<32}", entry.scenario.name());
        if entry.outcome == Outcome::Skipped {
            println!();
        } else {
            println!(" {:>8} ms", entry.duration_ms);
        }
        if let Some(message) = &entry.message {
            println!("        {}", message.dimmed());
        }
    }
    let summary = format!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );
    if report.success() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
}

// ──────────────────── scenarios ────────────────────

fn list_scenarios(cli: &Cli, args: &ScenariosArgs) -> Result<(), CliError> {
    let plan = Scenario::plan(args.use_develop, &[]);
    match output_mode(cli) {
        OutputMode::Human => {
            for scenario in Scenario::ALL {
                let selected = plan.contains(&scenario);
                let marker = if selected { "*".green() } else { " ".normal() };
                let develop = if scenario.requires_develop() {
                    " [develop]".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "{marker} {:<32} {}{develop}",
                    scenario.name(),
                    scenario.description()
                );
            }
        }
        OutputMode::Json => {
            let scenarios: Vec<Value> = Scenario::ALL
                .iter()
                .map(|scenario| {
                    json!({
                        "name": scenario.name(),
                        "description": scenario.description(),
                        "requires_develop": scenario.requires_develop(),
                        "selected": plan.contains(scenario),
                    })
                })
                .collect();
            write_json_line(&json!({
                "command": "scenarios",
                "use_develop": args.use_develop,
                "scenarios": scenarios,
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!(
                            "  Controllers: {} -> {}",
                            config.controllers.source, config.controllers.destination
                        );
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        }))?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        }))?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("MMA_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
