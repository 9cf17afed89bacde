// system-tests/tests/scenarios.rs
// ============================================================================
// Module: End-to-End Scenario Tests
// Description: The six end-to-end scenarios named in `spec.md` §8, each
//              driving the full `blis-config` -> `blis-cluster` ->
//              `blis-trace` pipeline from two YAML documents the way an
//              operator would.
// Purpose: `spec.md` §8: "results are qualitative — directional and
//          order-of-magnitude." Each assertion below picks the parameter
//          that is either exactly deterministic (cold-start cascade, tie-
//          broken routing) or structurally guaranteed by the simulator's
//          own internal conservation check, rather than a numeric
//          threshold this file would have to have run once to calibrate.
// ============================================================================

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "system tests assert directly on run output")]

mod support;

use support::run_scenario;

/// Scenario 1 (`spec.md` §8): weighted-composite routing scored solely on
/// prefix affinity starts with every instance tied at score 0.0 (no
/// instance has seen any block yet). `WeightedCompositeRouter::route`
/// breaks ties by keeping the first-seen (lowest-`InstanceId`) candidate,
/// so the very first request always lands on instance 0 — and once it has,
/// `PrefixAffinityScorer` rewards instance 0 with a perfect match on every
/// subsequent request sharing the same prefix group, cascading all traffic
/// onto it. This is exact, not statistical: Jain fairness over 4 instances
/// with all traffic on one is `1^2 / (4 * 1^2) = 0.25` to the bit.
#[test]
fn cold_start_cascade_onto_one_instance() {
    let run_yaml = r"
model_id: demo-7b
hardware: a100
tp: 1
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
instance_count: 4
prefix_block_size: 16
cache:
  kind: single_tier
  gpu_blocks: 4000
routing:
  kind: weighted_composite
  scorers:
    - name: prefix-affinity
      weight: 1.0
scheduler: fcfs
priority:
  kind: age_only
  age_weight: 0.0
admission:
  kind: always_admit
snapshot_refresh_interval_us: 1000
step_token_budget: 4096
max_running_requests: 64
seed: 42
trace_level: summary
counterfactual_k: 3
horizon_us: 2000000
request_source:
  kind: workload_spec_path
  path: placeholder.yaml
";
    let workload_yaml = r"
version: 1
seed: 42
category: cold-start-cascade
aggregate_rate: 100.0
clients:
  - id: 0
    tenant_id: tenant-a
    slo_class: interactive
    rate_fraction: 1.0
    prefix_group: shared
    prefix_length: 64
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 64
    output_distribution:
      type: constant
      params:
        value: 32
";
    let outcome = run_scenario(run_yaml, workload_yaml).expect("run succeeds");
    let trace = outcome.results.trace.expect("summary trace level was requested");

    let total_injected = outcome.cluster.total_injected;
    assert!(total_injected > 0, "workload should have generated at least one arrival");
    assert_eq!(*trace.target_distribution.get(&0).expect("instance 0 tracked"), total_injected, "every request should cascade onto instance 0");
    for instance in 1..4 {
        assert_eq!(*trace.target_distribution.get(&instance).expect("instance tracked even if idle"), 0, "instance {instance} should never receive traffic");
    }
    assert!((trace.jain_fairness_index - 0.25).abs() < 1e-9, "jain fairness should be exactly 0.25 when all traffic lands on one of four instances");
}

/// Scenario 2 (`spec.md` §8): SJF orders the wait-queue by ascending
/// *input* token length (`blis_policy::scheduler::Sjf`), so under overload
/// it should markedly improve TTFT for the short-input (`interactive`)
/// class relative to FCFS, at some cost to the long-input (`batch`)
/// class's TTFT. Same seed, same workload, only the scheduler differs, so
/// any difference is attributable to the scheduling policy alone.
#[test]
fn sjf_improves_short_job_ttft_under_overload() {
    let run_yaml_template = r"
model_id: demo-7b
hardware: a100
tp: 1
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
instance_count: 1
prefix_block_size: 16
cache:
  kind: single_tier
  gpu_blocks: 8000
routing:
  kind: round_robin
scheduler: __SCHEDULER__
priority:
  kind: age_only
  age_weight: 0.0
admission:
  kind: always_admit
snapshot_refresh_interval_us: 1000
step_token_budget: 2048
max_running_requests: 16
seed: 7
trace_level: summary
counterfactual_k: 3
horizon_us: 1000000
request_source:
  kind: workload_spec_path
  path: placeholder.yaml
";
    let workload_yaml = r"
version: 1
seed: 7
category: bimodal-overload
aggregate_rate: 60.0
clients:
  - id: 0
    tenant_id: tenant-short
    slo_class: interactive
    rate_fraction: 0.5
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 32
    output_distribution:
      type: constant
      params:
        value: 256
  - id: 1
    tenant_id: tenant-long
    slo_class: batch
    rate_fraction: 0.5
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 2048
    output_distribution:
      type: constant
      params:
        value: 64
";

    let fcfs_yaml = run_yaml_template.replace("__SCHEDULER__", "fcfs");
    let sjf_yaml = run_yaml_template.replace("__SCHEDULER__", "sjf");

    let fcfs = run_scenario(&fcfs_yaml, workload_yaml).expect("fcfs run succeeds");
    let sjf = run_scenario(&sjf_yaml, workload_yaml).expect("sjf run succeeds");

    let fcfs_short_ttft = fcfs.results.per_slo_class.iter().find(|class| class.slo_class == "interactive").expect("interactive class present").metrics.ttft_mean_ms;
    let sjf_short_ttft = sjf.results.per_slo_class.iter().find(|class| class.slo_class == "interactive").expect("interactive class present").metrics.ttft_mean_ms;

    assert!(sjf_short_ttft < fcfs_short_ttft, "SJF ({sjf_short_ttft}ms) should reduce short-input TTFT relative to FCFS ({fcfs_short_ttft}ms) under overload");
}

/// Scenario 3 (`spec.md` §8): sweeping KV block capacity at a fixed,
/// heavily-loaded workload should show a cliff — ample capacity means no
/// preemptions, a small cache forces them as concurrently-running requests
/// contend for blocks.
#[test]
fn kv_capacity_sweep_shows_a_preemption_cliff() {
    let run_yaml_template = r"
model_id: demo-7b
hardware: a100
tp: 1
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
instance_count: 1
prefix_block_size: 16
cache:
  kind: single_tier
  gpu_blocks: __BLOCKS__
routing:
  kind: round_robin
scheduler: fcfs
priority:
  kind: age_only
  age_weight: 0.0
admission:
  kind: always_admit
snapshot_refresh_interval_us: 1000
step_token_budget: 2048
max_running_requests: 32
seed: 99
trace_level: summary
counterfactual_k: 3
horizon_us: 1000000
request_source:
  kind: workload_spec_path
  path: placeholder.yaml
";
    let workload_yaml = r"
version: 1
seed: 99
category: kv-pressure
aggregate_rate: 80.0
clients:
  - id: 0
    tenant_id: tenant-a
    slo_class: interactive
    rate_fraction: 1.0
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 512
    output_distribution:
      type: constant
      params:
        value: 256
";

    let tight_yaml = run_yaml_template.replace("__BLOCKS__", "8");
    let ample_yaml = run_yaml_template.replace("__BLOCKS__", "4000");

    let tight = run_scenario(&tight_yaml, workload_yaml).expect("tight-cache run succeeds");
    let ample = run_scenario(&ample_yaml, workload_yaml).expect("ample-cache run succeeds");

    let tight_preemptions: u64 = tight.cluster.instances.iter().map(|instance| instance.preemption_count).sum();
    let ample_preemptions: u64 = ample.cluster.instances.iter().map(|instance| instance.preemption_count).sum();

    assert_eq!(ample_preemptions, 0, "an ample KV cache should never need to preempt a running request");
    assert!(tight_preemptions > ample_preemptions, "a tight KV cache ({tight_preemptions} preemptions) should preempt markedly more than an ample one ({ample_preemptions})");
}

/// Scenario 4 (`spec.md` §8): `AlwaysBusiest` is a pathological routing
/// template (`spec.md` §9) that argmaxes effective load, concentrating
/// traffic on whichever instance is already busiest. Compared against
/// `LeastLoaded` on the same overloaded workload, it should show both
/// concentrated routing and a markedly worse tail latency.
#[test]
fn always_busiest_routing_is_pathological() {
    let run_yaml_template = r"
model_id: demo-7b
hardware: a100
tp: 1
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
instance_count: 4
prefix_block_size: 16
cache:
  kind: single_tier
  gpu_blocks: 4000
routing:
  kind: __ROUTING__
scheduler: fcfs
priority:
  kind: age_only
  age_weight: 0.0
admission:
  kind: always_admit
snapshot_refresh_interval_us: 1000
step_token_budget: 4096
max_running_requests: 64
seed: 17
trace_level: summary
counterfactual_k: 3
horizon_us: 1000000
request_source:
  kind: workload_spec_path
  path: placeholder.yaml
";
    let workload_yaml = r"
version: 1
seed: 17
category: pathological-routing
aggregate_rate: 200.0
clients:
  - id: 0
    tenant_id: tenant-a
    slo_class: interactive
    rate_fraction: 1.0
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 256
    output_distribution:
      type: constant
      params:
        value: 128
";

    let busiest_yaml = run_yaml_template.replace("__ROUTING__", "always_busiest");
    let least_loaded_yaml = run_yaml_template.replace("__ROUTING__", "least_loaded");

    let busiest = run_scenario(&busiest_yaml, workload_yaml).expect("always-busiest run succeeds");
    let least_loaded = run_scenario(&least_loaded_yaml, workload_yaml).expect("least-loaded run succeeds");

    let busiest_trace = busiest.results.trace.expect("summary trace present");
    let least_loaded_trace = least_loaded.results.trace.expect("summary trace present");

    // Both runs generate the same workload arrivals (generation is
    // independent of the routing policy), so comparing raw counts is
    // equivalent to comparing shares of an identical total.
    let busiest_max_share = *busiest_trace.target_distribution.values().max().expect("at least one instance");
    let least_loaded_max_share = *least_loaded_trace.target_distribution.values().max().expect("at least one instance");

    assert!(
        busiest_max_share > least_loaded_max_share,
        "always-busiest's busiest instance ({busiest_max_share} requests) should receive far more traffic than least-loaded's busiest instance ({least_loaded_max_share} requests)"
    );
    assert!(
        busiest.results.cluster.e2e_p99_ms > least_loaded.results.cluster.e2e_p99_ms,
        "always-busiest's tail latency ({}ms) should be markedly worse than least-loaded's ({}ms)",
        busiest.results.cluster.e2e_p99_ms,
        least_loaded.results.cluster.e2e_p99_ms
    );
}

/// Scenario 5 (`spec.md` §8): counterfactual regret. A score-based router
/// always routes to its own argmax, so `blis_trace::regret::decision_regret`
/// is structurally zero for every decision it makes — `mean_regret` should
/// be exactly `0.0`. Round-robin ignores load entirely, so on a workload
/// whose service times create uneven effective load across instances it
/// should show positive mean regret.
#[test]
fn score_based_routing_has_zero_regret_round_robin_does_not() {
    let run_yaml_template = r"
model_id: demo-7b
hardware: a100
tp: 1
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
instance_count: 4
prefix_block_size: 16
cache:
  kind: single_tier
  gpu_blocks: 4000
routing:
  __ROUTING__
scheduler: fcfs
priority:
  kind: age_only
  age_weight: 0.0
admission:
  kind: always_admit
snapshot_refresh_interval_us: 1000
step_token_budget: 4096
max_running_requests: 64
seed: 31
trace_level: summary
counterfactual_k: 3
horizon_us: 1000000
request_source:
  kind: workload_spec_path
  path: placeholder.yaml
";
    let workload_yaml = r"
version: 1
seed: 31
category: regret-check
aggregate_rate: 150.0
clients:
  - id: 0
    tenant_id: tenant-a
    slo_class: interactive
    rate_fraction: 0.5
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 128
    output_distribution:
      type: constant
      params:
        value: 512
  - id: 1
    tenant_id: tenant-b
    slo_class: batch
    rate_fraction: 0.5
    arrival:
      process: poisson
    input_distribution:
      type: constant
      params:
        value: 1024
    output_distribution:
      type: constant
      params:
        value: 32
";

    let weighted_yaml = run_yaml_template.replace(
        "__ROUTING__",
        "kind: weighted_composite\n  scorers:\n    - name: queue-depth\n      weight: 1.0",
    );
    let round_robin_yaml = run_yaml_template.replace("__ROUTING__", "kind: round_robin");

    let weighted = run_scenario(&weighted_yaml, workload_yaml).expect("weighted-composite run succeeds");
    let round_robin = run_scenario(&round_robin_yaml, workload_yaml).expect("round-robin run succeeds");

    let weighted_trace = weighted.results.trace.expect("summary trace present");
    let round_robin_trace = round_robin.results.trace.expect("summary trace present");

    assert_eq!(weighted_trace.mean_regret, 0.0, "a score-based router always picks its own argmax, so mean regret is structurally zero");
    assert!(round_robin_trace.mean_regret > 0.0, "round-robin ignores load, so it should show positive regret against an uneven workload");
}

/// Scenario 6 (`spec.md` §8): conservation holds under maximum stress.
/// `ClusterSimulator::run` already enforces `injected == completed + queued
/// + running + rejected` internally (`check_conservation`) and returns an
/// error if it does not hold, so asserting `run` succeeds across several
/// seeds at combined overload and KV pressure directly verifies the
/// invariant rather than recomputing it redundantly here.
#[test]
fn conservation_holds_under_combined_overload_and_kv_pressure() {
    let run_yaml_template = r"
model_id: demo-7b
hardware: a100
tp: 1
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
instance_count: 2
prefix_block_size: 16
cache:
  kind: single_tier
  gpu_blocks: 24
routing:
  kind: least_loaded
scheduler: fcfs
priority:
  kind: age_only
  age_weight: 0.0
admission:
  kind: always_admit
snapshot_refresh_interval_us: 1000
step_token_budget: 2048
max_running_requests: 16
seed: __SEED__
trace_level: summary
counterfactual_k: 3
horizon_us: 500000
request_source:
  kind: workload_spec_path
  path: placeholder.yaml
";
    let workload_yaml_template = r"
version: 1
seed: __SEED__
category: max-stress
aggregate_rate: 1000.0
clients:
  - id: 0
    tenant_id: tenant-a
    slo_class: interactive
    rate_fraction: 1.0
    arrival:
      process: gamma
      cv: 1.5
    input_distribution:
      type: constant
      params:
        value: 512
    output_distribution:
      type: constant
      params:
        value: 256
";

    for seed in ["42", "123", "456"] {
        let run_yaml = run_yaml_template.replace("__SEED__", seed);
        let workload_yaml = workload_yaml_template.replace("__SEED__", seed);
        let outcome = run_scenario(&run_yaml, &workload_yaml);
        assert!(outcome.is_ok(), "seed {seed}: run should conserve requests under combined overload and KV pressure, got {:?}", outcome.err());
    }
}
