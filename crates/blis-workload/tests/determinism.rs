// blis-workload/tests/determinism.rs
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests assert directly on fixture data"
)]

use blis_core::Microseconds;
use blis_workload::ArrivalProcess;
use blis_workload::ClientSpec;
use blis_workload::LengthDistribution;
use blis_workload::WorkloadGenerator;
use blis_workload::WorkloadSpec;

fn fixture_spec() -> WorkloadSpec {
    WorkloadSpec {
        aggregate_rate: 50.0,
        seed: 42,
        clients: vec![
            ClientSpec {
                id: 0,
                tenant: blis_core::ids::TenantId("tenant-a".to_owned()),
                slo_class: blis_core::ids::SloClass::Interactive,
                rate_fraction: 0.6,
                arrival_process: ArrivalProcess::Poisson,
                input_length: LengthDistribution::Constant { value: 64 },
                output_length: LengthDistribution::Constant { value: 32 },
                prefix_group: None,
                multi_turn: None,
            },
            ClientSpec {
                id: 1,
                tenant: blis_core::ids::TenantId("tenant-b".to_owned()),
                slo_class: blis_core::ids::SloClass::Batch,
                rate_fraction: 0.4,
                arrival_process: ArrivalProcess::Gamma { cv: 1.5 },
                input_length: LengthDistribution::Gaussian { mean: 200.0, std: 40.0, min: 16, max: 512 },
                output_length: LengthDistribution::Exponential { mean: 64.0, min: 1, max: 256 },
                prefix_group: None,
                multi_turn: None,
            },
        ],
    }
}

#[test]
fn same_seed_yields_identical_arrival_stream() {
    let spec = fixture_spec();
    let horizon = Microseconds::new(5_000_000);

    let mut first = WorkloadGenerator::new(spec.clone(), 42);
    let first_arrivals = first.generate_arrivals(horizon);

    let mut second = WorkloadGenerator::new(spec, 42);
    let second_arrivals = second.generate_arrivals(horizon);

    assert_eq!(first_arrivals.len(), second_arrivals.len());
    for (a, b) in first_arrivals.iter().zip(second_arrivals.iter()) {
        assert_eq!(a.arrival_time, b.arrival_time);
        assert_eq!(a.request.input_tokens, b.request.input_tokens);
        assert_eq!(a.request.planned_output_tokens, b.request.planned_output_tokens);
    }
}

#[test]
fn different_seeds_diverge() {
    let spec = fixture_spec();
    let horizon = Microseconds::new(2_000_000);

    let mut a = WorkloadGenerator::new(spec.clone(), 1);
    let arrivals_a = a.generate_arrivals(horizon);

    let mut b = WorkloadGenerator::new(spec, 2);
    let arrivals_b = b.generate_arrivals(horizon);

    assert_ne!(
        arrivals_a.iter().map(|arrival| arrival.arrival_time).collect::<Vec<_>>(),
        arrivals_b.iter().map(|arrival| arrival.arrival_time).collect::<Vec<_>>()
    );
}

#[test]
fn arrivals_are_sorted_ascending() {
    let spec = fixture_spec();
    let mut generator = WorkloadGenerator::new(spec, 7);
    let arrivals = generator.generate_arrivals(Microseconds::new(1_000_000));
    let mut previous = Microseconds::ZERO;
    for arrival in &arrivals {
        assert!(arrival.arrival_time >= previous);
        previous = arrival.arrival_time;
    }
}
