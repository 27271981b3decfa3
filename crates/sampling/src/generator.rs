//! Scenario generation with monotonic ids.

use crate::sampler::DistributionSampler;
use montecarlo_metrics as metrics;
use montecarlo_types::{Model, Scenario, ScenarioId};
use rand::Rng;
use tracing::warn;

/// Produces one [`Scenario`] per call, with ids `1, 2, 3, ...`.
///
/// A variable whose sample fails (unknown kind, bad parameters) is recorded
/// as absent and the scenario is still produced.
pub struct ScenarioGenerator<'m, R> {
    model: &'m Model,
    sampler: DistributionSampler<R>,
    next_id: ScenarioId,
}

impl<'m, R: Rng> ScenarioGenerator<'m, R> {
    pub fn new(model: &'m Model, rng: R) -> Self {
        Self {
            model,
            sampler: DistributionSampler::new(rng),
            next_id: ScenarioId::FIRST,
        }
    }

    /// Id the next generated scenario will carry.
    pub fn next_id(&self) -> ScenarioId {
        self.next_id
    }

    pub fn next_scenario(&mut self) -> Scenario {
        let id = self.next_id;
        self.next_id = id.next();

        let mut scenario = Scenario::new(id);
        for (name, spec) in &self.model.distributions {
            let value = match self.sampler.sample(spec) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(scenario = id.get(), variable = %name, spec = %spec, error = %e,
                        "Sampling failed, recording absent value");
                    metrics::record_sampling_failure();
                    None
                }
            };
            scenario.variables.insert(name.clone(), value);
        }
        scenario
    }
}

impl<R: Rng> Iterator for ScenarioGenerator<'_, R> {
    type Item = Scenario;

    fn next(&mut self) -> Option<Scenario> {
        Some(self.next_scenario())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montecarlo_types::DistributionSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tracing_test::traced_test;

    fn model() -> Model {
        Model::new("x + k")
            .with_variable("x", DistributionSpec::Uniform { min: 0.0, max: 1.0 })
            .with_variable("k", DistributionSpec::Poisson { lambda: 2.0 })
    }

    #[test]
    fn test_ids_are_contiguous_from_one() {
        let model = model();
        let generator = ScenarioGenerator::new(&model, ChaCha8Rng::seed_from_u64(7));
        let ids: Vec<u64> = generator.take(250).map(|s| s.id.get()).collect();
        assert_eq!(ids, (1..=250).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_variable_is_sampled_in_model_order() {
        let model = model();
        let mut generator = ScenarioGenerator::new(&model, ChaCha8Rng::seed_from_u64(7));
        let scenario = generator.next_scenario();
        let names: Vec<&str> = scenario.variables.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["x", "k"]);
        assert!(scenario.variables.values().all(Option::is_some));
        assert_eq!(generator.next_id(), ScenarioId(2));
    }

    #[traced_test]
    #[test]
    fn test_sampling_failure_records_absent_value() {
        let model = model().with_variable(
            "z",
            DistributionSpec::Unknown {
                raw: "zipf(s=1)".into(),
            },
        );
        let mut generator = ScenarioGenerator::new(&model, ChaCha8Rng::seed_from_u64(1));
        let scenario = generator.next_scenario();

        assert_eq!(scenario.id, ScenarioId(1));
        assert_eq!(scenario.variables["z"], None);
        assert!(scenario.variables["x"].is_some());
        assert!(logs_contain("Sampling failed"));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let model = model();
        let a: Vec<Scenario> = ScenarioGenerator::new(&model, ChaCha8Rng::seed_from_u64(3))
            .take(20)
            .collect();
        let b: Vec<Scenario> = ScenarioGenerator::new(&model, ChaCha8Rng::seed_from_u64(3))
            .take(20)
            .collect();
        assert_eq!(a, b);
    }
}
