// blis-config/src/workload_yaml.rs
// ============================================================================
// Module: Workload Spec YAML
// Description: Strict wire-format DTOs for `spec.md` §6's workload-spec
//              YAML schema, and their resolution into `blis-workload`'s
//              internal `WorkloadSpec`/`ClientSpec`.
// Purpose: Keep the external YAML field names (`tenant_id`,
//          `input_distribution.type`, `reasoning.multi_turn`, ...) separate
//          from the internal Rust-native model `blis-workload` actually
//          runs on, the way the teacher's `decision-gate-config` keeps its
//          TOML-facing structs separate from `decision-gate-core`'s
//          runtime types.
// Dependencies: blis_core, blis_workload, serde
// ============================================================================

//! ## Overview
//! `spec.md` §6: "Unknown fields MUST be rejected (strict parse)." Every
//! DTO here carries `#[serde(deny_unknown_fields)]`; [`WorkloadSpecYaml::resolve`]
//! is the one fallible conversion into a [`blis_workload::WorkloadSpec`]
//! the generator actually runs on. `version`, `category`, and a client's
//! `streaming` flag are part of the wire contract but carry no behavioral
//! weight in the current simulator (streaming vs. non-streaming responses
//! are not yet modeled distinctly) — they round-trip through this DTO and
//! are then dropped, not silently misread as something else.

use std::collections::HashSet;

use blis_core::PrefixGroupId;
use blis_core::SloClass;
use blis_core::TenantId;
use blis_workload::ArrivalProcess;
use blis_workload::ClientSpec;
use blis_workload::ContextGrowth;
use blis_workload::LengthDistribution;
use blis_workload::MultiTurnSpec;
use blis_workload::PrefixGroupSpec;
use blis_workload::WorkloadSpec;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level workload-spec document (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadSpecYaml {
    /// Schema version, for forward compatibility; not otherwise
    /// interpreted.
    pub version: u32,
    /// Master seed, overridden by a CLI-supplied seed when one is given.
    pub seed: u64,
    /// Free-form workload category label, carried for operator bookkeeping
    /// only.
    pub category: String,
    /// Aggregate arrival rate across all clients, requests/second.
    pub aggregate_rate: f64,
    /// Optional fixed request-count budget; when absent the run stops at
    /// `horizon` instead.
    #[serde(default)]
    pub num_requests: Option<u64>,
    /// The client roster.
    pub clients: Vec<ClientYaml>,
}

/// One client (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientYaml {
    /// Stable client identifier.
    pub id: u64,
    /// Owning tenant.
    pub tenant_id: String,
    /// Service-level-objective class.
    pub slo_class: SloClass,
    /// This client's share of `aggregate_rate`.
    pub rate_fraction: f64,
    /// Whether responses stream token-by-token. Not yet distinctly
    /// modeled; accepted and ignored.
    #[serde(default)]
    pub streaming: bool,
    /// Shared-prefix group label. Must be given together with
    /// `prefix_length` or not at all.
    #[serde(default)]
    pub prefix_group: Option<String>,
    /// Leading-token count drawn from the shared prefix stream.
    #[serde(default)]
    pub prefix_length: Option<u32>,
    /// Inter-arrival process.
    pub arrival: ArrivalYaml,
    /// Input (prompt) token-length distribution.
    pub input_distribution: DistributionYaml,
    /// Output token-length distribution.
    pub output_distribution: DistributionYaml,
    /// Optional multi-turn session behavior.
    #[serde(default)]
    pub reasoning: Option<ReasoningYaml>,
}

/// `arrival.process` plus its parameters (`spec.md` §6: "gamma with `cv`
/// or `shape`").
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrivalYaml {
    /// `poisson` or `gamma`.
    pub process: String,
    /// Gamma coefficient of variation, if given directly.
    #[serde(default)]
    pub cv: Option<f64>,
    /// Gamma shape parameter, convertible to `cv` via `cv = 1/sqrt(shape)`
    /// when `cv` is absent.
    #[serde(default)]
    pub shape: Option<f64>,
}

impl ArrivalYaml {
    fn resolve(&self) -> Result<ArrivalProcess, ConfigError> {
        match self.process.as_str() {
            "poisson" => Ok(ArrivalProcess::Poisson),
            "gamma" => {
                let cv = self
                    .cv
                    .or_else(|| self.shape.filter(|shape| *shape > 0.0).map(|shape| 1.0 / shape.sqrt()))
                    .ok_or_else(|| ConfigError::Invalid("arrival.process 'gamma' requires 'cv' or a positive 'shape'".to_owned()))?;
                Ok(ArrivalProcess::Gamma { cv })
            }
            other => Err(ConfigError::Invalid(format!("unknown arrival.process {other:?}"))),
        }
    }
}

/// `{input,output}_distribution.type` plus its `params` (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionYaml {
    /// `constant` | `gaussian` | `exponential` | `pareto_lognormal`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The distribution's numeric parameters.
    pub params: DistributionParamsYaml,
}

/// Distribution parameters. Every field is optional here; [`DistributionYaml::resolve`]
/// reports which ones a given `kind` actually requires.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionParamsYaml {
    /// Fixed value, for `constant`.
    #[serde(default)]
    pub value: Option<u32>,
    /// Mean (or lognormal body mean, for `pareto_lognormal`).
    #[serde(default)]
    pub mean: Option<f64>,
    /// Standard deviation (or lognormal body standard deviation, for
    /// `pareto_lognormal`).
    #[serde(default)]
    pub std_dev: Option<f64>,
    /// Lower clamp bound.
    #[serde(default)]
    pub min: Option<u32>,
    /// Upper clamp bound.
    #[serde(default)]
    pub max: Option<u32>,
    /// Pareto tail shape parameter, for `pareto_lognormal`. Not named in
    /// `spec.md` §6's literal param list; this crate extends `params` with
    /// it since §4.5 names pareto-lognormal as a supported family and it
    /// cannot be configured without one.
    #[serde(default)]
    pub tail_shape: Option<f64>,
    /// Fraction of draws taken from the Pareto tail rather than the
    /// lognormal body, for `pareto_lognormal`. Same extension rationale as
    /// `tail_shape`.
    #[serde(default)]
    pub tail_fraction: Option<f64>,
}

impl DistributionYaml {
    fn resolve(&self, field: &'static str) -> Result<LengthDistribution, ConfigError> {
        let missing = |param: &str| ConfigError::Invalid(format!("{field}.params.{param} is required for type {:?}", self.kind));
        match self.kind.as_str() {
            "constant" => Ok(LengthDistribution::Constant { value: self.params.value.ok_or_else(|| missing("value"))? }),
            "gaussian" => Ok(LengthDistribution::Gaussian {
                mean: self.params.mean.ok_or_else(|| missing("mean"))?,
                std: self.params.std_dev.ok_or_else(|| missing("std_dev"))?,
                min: self.params.min.ok_or_else(|| missing("min"))?,
                max: self.params.max.ok_or_else(|| missing("max"))?,
            }),
            "exponential" => Ok(LengthDistribution::Exponential {
                mean: self.params.mean.ok_or_else(|| missing("mean"))?,
                min: self.params.min.ok_or_else(|| missing("min"))?,
                max: self.params.max.ok_or_else(|| missing("max"))?,
            }),
            "pareto_lognormal" => Ok(LengthDistribution::ParetoLogNormal {
                body_mean: self.params.mean.ok_or_else(|| missing("mean"))?,
                body_std: self.params.std_dev.ok_or_else(|| missing("std_dev"))?,
                tail_shape: self.params.tail_shape.ok_or_else(|| missing("tail_shape"))?,
                tail_fraction: self.params.tail_fraction.ok_or_else(|| missing("tail_fraction"))?,
                min: self.params.min.ok_or_else(|| missing("min"))?,
                max: self.params.max.ok_or_else(|| missing("max"))?,
            }),
            other => Err(ConfigError::Invalid(format!("unknown {field}.type {other:?}"))),
        }
    }
}

/// `reasoning.multi_turn` (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasoningYaml {
    /// Multi-turn session behavior, if any.
    #[serde(default)]
    pub multi_turn: Option<MultiTurnYaml>,
}

/// Multi-turn session parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiTurnYaml {
    /// Maximum rounds before a session ends.
    pub max_rounds: u32,
    /// Think time between a round's completion and the next arrival,
    /// microseconds.
    pub think_time_us: u64,
    /// `accumulate` or `fresh`.
    pub context_growth: String,
}

impl MultiTurnYaml {
    fn resolve(&self) -> Result<MultiTurnSpec, ConfigError> {
        let growth = match self.context_growth.as_str() {
            "accumulate" => ContextGrowth::Accumulate,
            "fresh" => ContextGrowth::Fresh,
            other => return Err(ConfigError::Invalid(format!("unknown reasoning.multi_turn.context_growth {other:?}"))),
        };
        Ok(MultiTurnSpec { max_rounds: self.max_rounds, think_time_us: self.think_time_us, growth })
    }
}

impl ClientYaml {
    fn resolve(&self) -> Result<ClientSpec, ConfigError> {
        let prefix_group = match (&self.prefix_group, self.prefix_length) {
            (Some(group), Some(prefix_length)) => Some(PrefixGroupSpec { group: PrefixGroupId(group.clone()), prefix_length }),
            (None, None) => None,
            _ => return Err(ConfigError::Invalid(format!("client {}: prefix_group and prefix_length must be given together", self.id))),
        };
        let multi_turn = self.reasoning.as_ref().and_then(|reasoning| reasoning.multi_turn.as_ref()).map(MultiTurnYaml::resolve).transpose()?;
        Ok(ClientSpec {
            id: self.id,
            tenant: TenantId(self.tenant_id.clone()),
            slo_class: self.slo_class.clone(),
            rate_fraction: self.rate_fraction,
            arrival_process: self.arrival.resolve()?,
            input_length: self.input_distribution.resolve("input_distribution")?,
            output_length: self.output_distribution.resolve("output_distribution")?,
            prefix_group,
            multi_turn,
        })
    }
}

impl WorkloadSpecYaml {
    /// Parses a workload-spec document from YAML text.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed or unknown-field YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Resolves this document into the internal [`WorkloadSpec`] the
    /// generator runs on, then runs its own structural validation.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for a malformed client, or
    /// [`ConfigError::Workload`] if the resolved spec fails
    /// `WorkloadSpec::validate`.
    pub fn resolve(&self) -> Result<WorkloadSpec, ConfigError> {
        let mut seen_ids = HashSet::new();
        for client in &self.clients {
            if !seen_ids.insert(client.id) {
                return Err(ConfigError::Invalid(format!("duplicate client id {}", client.id)));
            }
        }
        let clients = self.clients.iter().map(ClientYaml::resolve).collect::<Result<Vec<_>, _>>()?;
        let spec = WorkloadSpec { aggregate_rate: self.aggregate_rate, seed: self.seed, clients };
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests assert directly on fixture data")]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
version: 1
seed: 42
category: smoke
aggregate_rate: 10.0
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
        value: 128
    output_distribution:
      type: constant
      params:
        value: 64
";

    #[test]
    fn minimal_spec_resolves() {
        let doc = WorkloadSpecYaml::from_yaml_str(MINIMAL).expect("parses");
        let spec = doc.resolve().expect("resolves");
        assert_eq!(spec.clients.len(), 1);
        assert_eq!(spec.seed, 42);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let text = format!("{MINIMAL}\nbogus_field: true");
        assert!(matches!(WorkloadSpecYaml::from_yaml_str(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn gamma_without_cv_or_shape_is_rejected() {
        let text = MINIMAL.replace("process: poisson", "process: gamma");
        let doc = WorkloadSpecYaml::from_yaml_str(&text).expect("parses");
        assert!(matches!(doc.resolve(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn duplicate_client_ids_are_rejected() {
        let mut doc = WorkloadSpecYaml::from_yaml_str(MINIMAL).expect("parses");
        let mut second = doc.clients[0].clone();
        second.id = 0;
        doc.clients.push(second);
        assert!(matches!(doc.resolve(), Err(ConfigError::Invalid(_))));
    }
}
