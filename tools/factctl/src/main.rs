//! factctl - command-line driver for the facts rules engine
//!
//! Loads rule definitions from YAML or JSON, asserts facts against them and
//! prints the resulting events and fact store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::LogConfig;
use facts_rules::{EngineConfig, EngineEvent, EventKind, RuleFileDef, RuleSet, RulesEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "factctl")]
#[command(about = "Drive the facts rules engine from rule files")]
#[command(long_about = "Drive the facts rules engine from rule files

Commands:
  run         Seed facts, apply assignments and print every event
  check       Validate a rule file and list its rules

Examples:
  factctl run -r rules.yaml -s x=3          # Assert x = 3
  factctl run -r rules.yaml -s 'd={\"e\":1}'  # Values are parsed as JSON
  factctl check -r rules.json               # List rules and dependencies

Use 'factctl <command> --help' for more information on a specific command.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed facts, apply assignments and print every event
    Run {
        /// Rule file (.yaml, .yml or .json)
        #[arg(short, long)]
        rules: PathBuf,

        /// Fact assignment PATH=VALUE, applied in order after seeding
        #[arg(short, long = "set", value_name = "PATH=VALUE")]
        set: Vec<String>,

        /// Settings file (.toml, .yaml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only print the final fact store
        #[arg(short, long)]
        quiet: bool,
    },

    /// Validate a rule file and list its rules
    Check {
        /// Rule file (.yaml, .yml or .json)
        #[arg(short, long)]
        rules: PathBuf,
    },
}

/// Settings loaded from `--config` and `FACTS_*` environment variables
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    engine: EngineConfig,
    log: LogConfig,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Configure colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config_path = match &cli.command {
        Commands::Run { config, .. } => config.as_deref(),
        Commands::Check { .. } => None,
    };
    let mut config: CliConfig = common::config_loader::load_layered(config_path)
        .context("Failed to load settings")?;

    if cli.verbose {
        config.log.level = "debug".to_string();
    }
    if cli.no_color {
        config.log.ansi = false;
    }
    common::logging::init_logging(&config.log)?;
    debug!(?config, "Settings loaded");

    match cli.command {
        Commands::Run {
            rules, set, quiet, ..
        } => run(&rules, &set, config.engine, quiet),
        Commands::Check { rules } => check(&rules),
    }
    .map(|succeeded| {
        if succeeded {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    })
}

fn load_rules(path: &Path) -> Result<(RuleSet, Vec<(String, Value)>)> {
    let parts = RuleFileDef::load(path)
        .and_then(RuleFileDef::into_parts)
        .with_context(|| format!("Failed to load rules from {}", path.display()))?;
    info!("Loaded {} rules from {}", parts.0.len(), path.display());
    Ok(parts)
}

/// Returns `false` when an assertion failed and was rolled back
fn run(
    path: &Path,
    assignments: &[String],
    engine_config: EngineConfig,
    quiet: bool,
) -> Result<bool> {
    let assignments = assignments
        .iter()
        .map(String::as_str)
        .map(parse_assignment)
        .collect::<Result<Vec<_>>>()?;
    let (rules, facts) = load_rules(path)?;

    let mut engine =
        RulesEngine::with_config(rules, Vec::<(String, Value)>::new(), engine_config)?;
    if !quiet {
        print_events(&mut engine);
    }

    for (fact_path, value) in facts.into_iter().chain(assignments) {
        if let Err(e) = engine.set_fact(&fact_path, value) {
            eprintln!("{} {}", "ERROR".red(), e);
            print_facts(&engine)?;
            return Ok(false);
        }
    }

    let stats = engine.statistics();
    debug!(
        passes = stats.passes,
        evaluations = stats.rule_evaluations,
        skips = stats.rule_skips,
        fires = stats.rule_fires,
        "Run complete"
    );
    print_facts(&engine)?;
    Ok(true)
}

fn check(path: &Path) -> Result<bool> {
    let (rules, facts) = load_rules(path)?;
    println!(
        "{} {} rules, {} seed facts",
        "OK".green(),
        rules.len(),
        facts.len()
    );
    for rule in rules.iter() {
        let deps = match rule.condition().deps() {
            Some(deps) => deps.join(", "),
            None => "every change".to_string(),
        };
        println!("  #{} {} [{}]", rule.id(), rule.name().bold(), deps.dimmed());
    }
    Ok(true)
}

/// Split `PATH=VALUE`; the value is JSON when it parses, a string otherwise
fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (path, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected PATH=VALUE, got '{}'", raw))?;
    if path.is_empty() {
        anyhow::bail!("Empty fact path in '{}'", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.to_string(), value))
}

fn print_events(engine: &mut RulesEngine) {
    for kind in [EventKind::Change, EventKind::Process, EventKind::Fire] {
        engine.add_event_listener(kind, |_, event| {
            match event {
                EngineEvent::Change(changes) => {
                    for (path, value) in changes.iter() {
                        println!("{} {} = {}", "change ".cyan(), path, value);
                    }
                },
                EngineEvent::Process(rule) => {
                    println!("{} #{} {}", "process".dimmed(), rule.id(), rule.name());
                },
                EngineEvent::Fire(rule) => {
                    println!("{} #{} {}", "fire   ".green().bold(), rule.id(), rule.name());
                },
            }
            Ok(())
        });
    }
}

fn print_facts(engine: &RulesEngine) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(engine.facts())?);
    Ok(())
}
