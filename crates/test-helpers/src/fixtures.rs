//! Models and RNGs shared by tests.

use montecarlo_types::{DistributionSpec, Model};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Model file text for `x + y` over two unit uniforms.
pub const SUM_MODEL_TEXT: &str = "\
# Sum of two unit uniforms
FUNCTION: x + y
x: uniform(min=0,max=1)
y: uniform(min=0,max=1)
";

/// `x + y` with `x, y ~ uniform(0, 1)`.
pub fn sum_model() -> Model {
    Model::new("x + y")
        .with_variable("x", DistributionSpec::Uniform { min: 0.0, max: 1.0 })
        .with_variable("y", DistributionSpec::Uniform { min: 0.0, max: 1.0 })
}

/// A model that uses every distribution kind and whitelisted function.
pub fn mixed_model() -> Model {
    Model::new("exp(a) * sqrt(b) + log(c + 1)")
        .with_variable("a", DistributionSpec::Normal { mu: 0.0, sigma: 0.1 })
        .with_variable("b", DistributionSpec::Uniform { min: 1.0, max: 4.0 })
        .with_variable("c", DistributionSpec::Poisson { lambda: 3.0 })
}

/// A model whose only variable has a kind no sampler understands.
pub fn unknown_kind_model() -> Model {
    Model::new("z * 2").with_variable(
        "z",
        DistributionSpec::Unknown {
            raw: "cauchy(x0=0,gamma=1)".to_string(),
        },
    )
}

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
