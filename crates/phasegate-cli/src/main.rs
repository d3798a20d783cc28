//! PhaseGate CLI
//!
//! The `phasegate` command evaluates quality gates outside a running
//! pipeline: against recorded metrics, recorded agent artifacts or recorded
//! scanner output.
//!
//! ## Commands
//!
//! - `evaluate`: Evaluate a metrics file against a threshold table
//! - `score`: Score recorded artifacts for a built-in phase
//! - `security`: Merge scanner reports and apply the security gate
//! - `validate-config`: Load and check a phase configuration file
//! - `show-report`: Print a persisted gate report after verifying its digest

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, Level};

use phasegate_core::scoring::phase::PhaseScores;
use phasegate_core::scoring::{beta, qa};
use phasegate_core::security::{self, SecurityReport};
use phasegate_core::{
    build_hints, evaluate_gate, read_gate_report, render_gate_report_md, write_gate_report,
    write_gate_report_md, Artifact, ConfigError, GateDecision, GateEvaluationInput,
    GateInputBuilder, GateReport, GateTable, MetricMap, PhaseGateConfig, ScanReport,
    ScoredPhase,
};

#[derive(Parser)]
#[command(name = "phasegate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Phase coordination and quality gates", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a metrics file against a threshold table
    ///
    /// Exits non-zero when the gate fails.
    Evaluate {
        /// Threshold table (TOML or JSON, `[[metrics]]` rows)
        #[arg(short, long)]
        table: PathBuf,

        /// Metrics file (JSON object of metric name to number or boolean)
        #[arg(short, long)]
        metrics: PathBuf,

        /// Phase name recorded in the report
        #[arg(short, long, default_value = "gate")]
        phase: String,

        /// Run ID recorded in the report
        #[arg(long, default_value = "adhoc")]
        run_id: String,

        /// Composite score to report alongside the decision
        #[arg(long, default_value = "0")]
        overall_score: u32,

        /// Persist the report under <dir>/<run_id>/<phase>-gate.json
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Also write a markdown rendering of the report
        #[arg(long)]
        markdown: Option<PathBuf>,
    },

    /// Score recorded artifacts for a built-in phase
    Score {
        /// Built-in phase
        #[arg(value_enum)]
        phase: Phase,

        /// Artifacts file (JSON array of `{type, content, metadata}`)
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Also evaluate the phase's default gate
        #[arg(long)]
        gate: bool,
    },

    /// Merge scanner reports and apply the default security gate
    ///
    /// Exits non-zero when the gate fails.
    Security {
        /// Reports file (JSON array of scanner reports)
        #[arg(short, long)]
        reports: PathBuf,

        /// Run ID recorded in the report
        #[arg(long, default_value = "adhoc")]
        run_id: String,
    },

    /// Load and check a phase configuration file
    ValidateConfig {
        /// Config file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print a persisted gate report after verifying its digest
    ShowReport {
        /// Run ID of the report
        #[arg(long)]
        run_id: String,

        /// Phase of the report
        #[arg(short, long)]
        phase: String,

        /// Root directory of persisted reports (default: .phasegate/reports)
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Print markdown instead of JSON
        #[arg(long)]
        markdown: bool,
    },
}

/// Built-in phases with their own scoring tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Phase {
    Beta,
    Qa,
}

impl Phase {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            beta::PHASE => Some(Self::Beta),
            qa::PHASE => Some(Self::Qa),
            _ => None,
        }
    }

    fn scored_phase(self) -> Result<ScoredPhase, ConfigError> {
        match self {
            Self::Beta => beta::scored_phase(),
            Self::Qa => qa::scored_phase(),
        }
    }

    fn default_gate_table(self) -> Result<GateTable, ConfigError> {
        match self {
            Self::Beta => beta::default_gate_table(),
            Self::Qa => qa::default_gate_table(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    phasegate_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Evaluate {
            table,
            metrics,
            phase,
            run_id,
            overall_score,
            report_dir,
            markdown,
        } => cmd_evaluate(
            &table,
            &metrics,
            &phase,
            &run_id,
            overall_score,
            report_dir.as_deref(),
            markdown.as_deref(),
        ),
        Commands::Score {
            phase,
            artifacts,
            gate,
        } => cmd_score(phase, &artifacts, gate),
        Commands::Security { reports, run_id } => cmd_security(&reports, &run_id),
        Commands::ValidateConfig { config } => cmd_validate_config(&config),
        Commands::ShowReport {
            run_id,
            phase,
            report_dir,
            markdown,
        } => cmd_show_report(&run_id, &phase, report_dir.as_deref(), markdown),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn load_table(path: &Path) -> Result<GateTable> {
    let text = read_text(path)?;
    let table: GateTable = if is_json(path) {
        serde_json::from_str(&text).with_context(|| format!("Invalid threshold table {:?}", path))?
    } else {
        toml::from_str(&text).with_context(|| format!("Invalid threshold table {:?}", path))?
    };
    Ok(table)
}

fn load_config(path: &Path) -> Result<PhaseGateConfig> {
    let text = read_text(path)?;
    let config = if is_json(path) {
        PhaseGateConfig::from_json_str(&text)
    } else {
        PhaseGateConfig::from_toml_str(&text)
    };
    config.with_context(|| format!("Invalid config {:?}", path))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid {} file {:?}", what, path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_decision(decision: &GateDecision) {
    println!(
        "Gate: {} (score {})",
        decision.decision, decision.overall_score
    );
    for failed in &decision.failed_metrics {
        println!("  FAIL {}", failed);
    }
    for warning in &decision.warnings {
        println!("  WARN {}", warning);
    }
    let hints = build_hints(decision);
    if !hints.is_empty() {
        println!("Hints:");
        for hint in hints {
            println!("  - {}", hint);
        }
    }
}

/// Evaluate a recorded metrics file.
fn cmd_evaluate(
    table_path: &Path,
    metrics_path: &Path,
    phase: &str,
    run_id: &str,
    overall_score: u32,
    report_dir: Option<&Path>,
    markdown: Option<&Path>,
) -> Result<()> {
    let table = load_table(table_path)?;
    let metrics: MetricMap = load_json(metrics_path, "metrics")?;

    let decision = evaluate_gate(
        &table,
        &GateEvaluationInput {
            run_id: run_id.to_string(),
            phase: phase.to_string(),
            artifacts: Vec::new(),
            metrics,
            overall_score,
        },
    );
    info!(run_id, phase, decision = %decision.decision, "gate evaluated");
    print_decision(&decision);

    let report = GateReport::new(run_id, phase, decision.clone());
    if let Some(dir) = report_dir {
        let path = write_gate_report(&report, dir)
            .with_context(|| format!("Failed to persist report under {:?}", dir))?;
        println!("Report written to {:?}", path);
    }
    if let Some(path) = markdown {
        write_gate_report_md(path, &report)?;
        println!("Markdown written to {:?}", path);
    }

    if !decision.passed() {
        anyhow::bail!(
            "Gate failed for {} with {} blocking metric(s)",
            phase,
            decision.failed_metrics.len()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ScoreOutput<'a> {
    phase: &'a str,
    composite: u32,
    status: String,
    dimensions: &'a std::collections::BTreeMap<String, u32>,
    gate_metrics: MetricMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    gate: Option<GateDecision>,
}

fn score_artifacts(
    phase: Phase,
    artifacts: &[Artifact],
) -> Result<(ScoredPhase, PhaseScores, MetricMap)> {
    let scored = phase.scored_phase()?;
    let scores = scored.score(artifacts);
    let metrics = scored.gate_metrics(&scores);
    Ok((scored, scores, metrics))
}

/// Score recorded artifacts and optionally gate them.
fn cmd_score(phase: Phase, artifacts_path: &Path, with_gate: bool) -> Result<()> {
    let artifacts: Vec<Artifact> = load_json(artifacts_path, "artifacts")?;
    let (scored, scores, metrics) = score_artifacts(phase, &artifacts)?;

    let gate = if with_gate {
        let table = phase.default_gate_table()?;
        Some(evaluate_gate(
            &table,
            &GateEvaluationInput {
                run_id: "adhoc".to_string(),
                phase: scored.phase().to_string(),
                artifacts,
                metrics: metrics.clone(),
                overall_score: scores.composite,
            },
        ))
    } else {
        None
    };

    print_json(&ScoreOutput {
        phase: scored.phase(),
        composite: scores.composite,
        status: scores.status.to_string(),
        dimensions: &scores.dimensions,
        gate_metrics: metrics,
        gate,
    })
}

fn merge_reports(reports: &[ScanReport], run_id: &str) -> Result<(SecurityReport, GateDecision)> {
    let report = SecurityReport::from_reports(reports);
    let table = security::default_gate_table()?;
    let artifact = Artifact::from_agent(
        "phasegate-cli",
        phasegate_core::ArtifactContent::SecurityReport(report.clone()),
    );
    let decision = evaluate_gate(&table, &security::gate_input(run_id, &report, &artifact));
    Ok((report, decision))
}

/// Merge recorded scanner reports and apply the security gate.
fn cmd_security(reports_path: &Path, run_id: &str) -> Result<()> {
    let reports: Vec<ScanReport> = load_json(reports_path, "scan reports")?;
    let (report, decision) = merge_reports(&reports, run_id)?;

    let s = &report.summary;
    println!(
        "Findings: {} critical, {} high, {} medium, {} low{}",
        s.critical_count,
        s.high_count,
        s.medium_count,
        s.low_count,
        if s.secrets_found { ", secrets found" } else { "" }
    );
    println!("Status: {:?}", report.status);
    print_decision(&decision);

    if !decision.passed() {
        anyhow::bail!("Security gate failed for run {}", run_id);
    }
    Ok(())
}

/// Load a config and, for built-in phases, check its table against the
/// phase's metrics.
fn cmd_validate_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let name = config.phase.phase_name.as_str();

    if let Some(phase) = Phase::from_name(name) {
        let scored = phase.scored_phase()?;
        let required = scored.required_metrics();
        config
            .gate
            .require_metrics(name, required.iter().map(String::as_str))?;
        let produced = scored.produced_metrics();
        config
            .gate
            .check_known(name, produced.iter().map(String::as_str))?;
    }

    println!("Config OK: {:?}", path);
    println!(
        "  phase: {} (min agents {}, concurrency {})",
        name, config.phase.min_required_agents, config.phase.max_concurrency
    );
    println!(
        "  retry: {} attempt(s)",
        config.retry.max_attempts()
    );
    println!(
        "  gate: {} rule(s){}",
        config.gate.rules().len(),
        if config.gate.has_advisory_rules() {
            ", with advisory rules"
        } else {
            ""
        }
    );
    Ok(())
}

/// Print a persisted gate report after verifying its digest.
fn cmd_show_report(
    run_id: &str,
    phase: &str,
    report_dir: Option<&Path>,
    markdown: bool,
) -> Result<()> {
    let root = report_dir
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".phasegate/reports"));
    let report = read_gate_report(run_id, phase, &root)
        .with_context(|| format!("Failed to load report for run {} phase {}", run_id, phase))?;

    if markdown {
        print!("{}", render_gate_report_md(&report.decision));
    } else {
        print_json(&report)?;
    }
    Ok(())
}
