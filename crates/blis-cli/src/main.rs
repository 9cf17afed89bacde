// blis-cli/src/main.rs
// ============================================================================
// Module: BLIS CLI Entry Point
// Description: Loads a run configuration, assembles and runs the cluster
//              simulation, and prints its results as JSON.
// Purpose: `spec.md` §6's exit surface: invalid input exits 2, an invariant
//          violation exits 1, normal completion exits 0 with `Results` JSON
//          on stdout.
// Dependencies: blis_cluster, blis_config, clap, serde_json, thiserror,
//               tracing, tracing_subscriber
// ============================================================================

//! ## Overview
//! `blis` is a single-command binary, not a subcommand dispatcher like the
//! teacher's `decision-gate` CLI: one run configuration in, one `Results`
//! document out. `CliError` composes `blis_config::ConfigError` (exit 2)
//! and `blis_cluster::ClusterError` (exit 1) the same way the teacher's
//! `CliError` wraps its own localized messages, but without the i18n
//! catalog — `spec.md` names no localization requirement for this tool.

use std::path::PathBuf;
use std::process::ExitCode;

use blis_cluster::ClusterError;
use blis_config::ConfigError;
use blis_config::RequestSourceYaml;
use blis_config::RunConfigYaml;
use blis_config::SimulationBuilder;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "blis", about = "Discrete-event simulator for LLM inference cluster capacity planning")]
struct Cli {
    /// Path to the run configuration YAML file.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
    /// Overrides the run configuration's workload-spec source with a path
    /// to a workload-spec YAML file.
    #[arg(long, value_name = "PATH")]
    workload: Option<PathBuf>,
    /// Overrides the run configuration's and workload spec's seed.
    #[arg(long)]
    seed: Option<u64>,
}

/// Top-level CLI error, unifying every crate boundary's own error type
/// into the exit-code surface `spec.md` §6/§7 specifies.
#[derive(Debug, Error)]
enum CliError {
    /// Invalid configuration input: exit 2.
    #[error("{0}")]
    Config(#[from] ConfigError),
    /// A simulator invariant was violated during the run: exit 1.
    #[error("{0}")]
    Cluster(#[from] ClusterError),
    /// Trace summary requested but unavailable: exit 2, the summary was
    /// misconfigured (trace level set without ever routing), not a
    /// simulator bug.
    #[error("{0}")]
    Trace(#[from] blis_trace::TraceError),
    /// The run configuration file could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Exit code for an invariant violation (`spec.md` §6: "invariant
/// violation -> exit 1").
const EXIT_INVARIANT_VIOLATION: u8 = 1;
/// Exit code for invalid configuration input (`spec.md` §6: "invalid
/// input -> exit 2").
const EXIT_INVALID_INPUT: u8 = 2;

impl CliError {
    /// The raw exit code `spec.md` §6 assigns to this failure. A plain
    /// integer, not an [`ExitCode`] itself, since [`ExitCode`] has no
    /// `PartialEq` to assert against in tests.
    const fn exit_code_value(&self) -> u8 {
        match self {
            Self::Cluster(_) => EXIT_INVARIANT_VIOLATION,
            Self::Config(_) | Self::Trace(_) | Self::Io { .. } => EXIT_INVALID_INPUT,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            ExitCode::from(err.exit_code_value())
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let text = std::fs::read_to_string(&cli.config).map_err(|source| CliError::Io { path: cli.config.clone(), source })?;
    let mut config = RunConfigYaml::from_yaml_str(&text)?;

    if let Some(workload_path) = cli.workload {
        config.request_source = RequestSourceYaml::WorkloadSpecPath { path: workload_path };
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }

    let workload_spec = SimulationBuilder::load_workload(&config)?;
    let (mut simulator, recorder) = SimulationBuilder::build(&config, workload_spec)?;

    tracing::info!(instance_count = config.instance_count, horizon_us = config.horizon_us, "starting simulation run");
    let cluster_results = simulator.run()?;
    let results = recorder.build_results(&cluster_results)?;

    let json = serde_json::to_string_pretty(&results).expect("Results serialization is infallible: every field is a plain number, string, or map of them");
    println!("{json}");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use blis_core::InvariantViolation;
    use blis_core::Microseconds;

    use super::*;

    #[test]
    fn cluster_invariant_violation_exits_failure() {
        let err = CliError::Cluster(ClusterError::Invariant(InvariantViolation::EventInPast { attempted: Microseconds::ZERO, clock: Microseconds::ZERO }));
        assert_eq!(err.exit_code_value(), EXIT_INVARIANT_VIOLATION);
    }

    #[test]
    fn bad_config_exits_invalid_input() {
        let err = CliError::Config(ConfigError::Invalid("bad".to_owned()));
        assert_eq!(err.exit_code_value(), EXIT_INVALID_INPUT);
    }

    #[test]
    fn missing_config_file_exits_invalid_input() {
        let err = CliError::Io { path: PathBuf::from("missing.yaml"), source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found") };
        assert_eq!(err.exit_code_value(), EXIT_INVALID_INPUT);
    }
}
