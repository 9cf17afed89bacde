// system-tests/tests/support/mod.rs
// ============================================================================
// Module: System Test Support
// Description: Shared helper that parses a run-config and a workload-spec
//              YAML document, assembles the simulation via
//              `blis_config::SimulationBuilder`, and runs it to completion.
// Purpose: Every scenario and property test drives the simulator the same
//          way an operator would: two YAML documents in, `blis_trace::
//          Results` out. Mirrors the teacher's `tests/helpers/mod.rs`
//          pattern of one small shared module included by every test file
//          via `mod support;`.
// ============================================================================

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code, reason = "shared fixtures for tests that are never run outside `cargo test`")]

use blis_cluster::ClusterResults;
use blis_config::RequestSourceYaml;
use blis_config::RunConfigYaml;
use blis_config::SimulationBuilder;
use blis_config::WorkloadSpecYaml;
use blis_trace::Results;

/// The outcome of one end-to-end run: the raw cluster results (for
/// conservation-style assertions) alongside the built trace `Results`
/// document (for metrics/fairness assertions).
pub struct RunOutcome {
    pub cluster: ClusterResults,
    pub results: Results,
}

/// Parses `run_yaml` and `workload_yaml`, wires the workload in as the
/// run's inline request source, builds the simulation, and runs it.
///
/// # Errors
/// Returns whatever boxed error the parse, build, or run step produced,
/// so a caller can assert on failure as easily as on success.
pub fn run_scenario(run_yaml: &str, workload_yaml: &str) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let mut config = RunConfigYaml::from_yaml_str(run_yaml)?;
    let workload_doc = WorkloadSpecYaml::from_yaml_str(workload_yaml)?;
    config.request_source = RequestSourceYaml::Inline { workload: workload_doc };

    let workload_spec = SimulationBuilder::load_workload(&config)?;
    let (mut simulator, recorder) = SimulationBuilder::build(&config, workload_spec)?;
    let cluster = simulator.run()?;
    let results = recorder.build_results(&cluster)?;
    Ok(RunOutcome { cluster, results })
}

/// The single coefficient row every scenario shares: the same
/// `demo-7b`/`a100`/`tp=1` fixture `blis-latency::blackbox` itself tests
/// against, so every scenario's latency numbers are grounded in an
/// already-exercised coefficient set rather than an invented one.
pub const DEMO_MODEL_HEADER: &str = "model_id: demo-7b\nhardware: a100\ntp: 1\n";

/// YAML block for [`DEMO_MODEL_HEADER`]'s matching coefficient row.
pub const DEMO_COEFFICIENTS: &str = r"
coefficients:
  - model: demo-7b
    hardware: a100
    tp: 1
    beta0: 500.0
    beta1: 10.0
    beta2: 25.0
    alpha0: 100.0
    alpha1: 0.5
    alpha2_const: 50.0
";
