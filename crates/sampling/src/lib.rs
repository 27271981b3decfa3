//! Distribution sampling and scenario generation.
//!
//! - [`DistributionSampler`] draws one value from a [`DistributionSpec`]
//! - [`ScenarioGenerator`] draws one value per model variable and tags the
//!   result with the next scenario id
//!
//! Both are driven by a caller-supplied RNG. Seeding with
//! [`ChaCha8Rng`](rand_chacha::ChaCha8Rng) makes a whole run reproducible.
//!
//! [`DistributionSpec`]: montecarlo_types::DistributionSpec

mod generator;
mod sampler;

pub use generator::ScenarioGenerator;
pub use sampler::{DistributionSampler, SampleError};
