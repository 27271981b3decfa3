//! Single-value sampling from a typed distribution spec.

use montecarlo_types::DistributionSpec;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson, Uniform};
use thiserror::Error;

/// Errors from drawing a sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("unknown distribution kind `{0}`")]
    UnknownDistributionKind(String),

    #[error("invalid {kind} parameters: {reason}")]
    InvalidParameters { kind: &'static str, reason: String },
}

/// Draws values from distribution specs using an owned RNG.
#[derive(Debug)]
pub struct DistributionSampler<R> {
    rng: R,
}

impl<R: Rng> DistributionSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Draw one value.
    ///
    /// Uniform is continuous over the closed range `[min, max]`; Normal is
    /// parameterized by mean and standard deviation; Poisson yields a
    /// non-negative integer (returned as `f64`).
    pub fn sample(&mut self, spec: &DistributionSpec) -> Result<f64, SampleError> {
        match spec {
            DistributionSpec::Uniform { min, max } => {
                // rand scales the width up slightly and panics if that overflows.
                if !(min <= max && ((max - min) * 2.0).is_finite()) {
                    return Err(invalid("uniform", format!("range [{}, {}]", min, max)));
                }
                Ok(Uniform::new_inclusive(*min, *max).sample(&mut self.rng))
            }
            DistributionSpec::Normal { mu, sigma } => {
                // rand_distr accepts a negative sigma and mirrors the law.
                if *sigma < 0.0 {
                    return Err(invalid("normal", format!("sigma ({}) is negative", sigma)));
                }
                Normal::new(*mu, *sigma)
                    .map(|d| d.sample(&mut self.rng))
                    .map_err(|e| invalid("normal", e.to_string()))
            }
            DistributionSpec::Poisson { lambda } => {
                // rand_distr rejects a zero rate; the degenerate law is constant 0.
                if *lambda == 0.0 {
                    return Ok(0.0);
                }
                Poisson::new(*lambda)
                    .map(|d| d.sample(&mut self.rng))
                    .map_err(|e| invalid("poisson", e.to_string()))
            }
            DistributionSpec::Unknown { .. } => {
                Err(SampleError::UnknownDistributionKind(spec.kind().to_string()))
            }
        }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

impl DistributionSampler<ChaCha8Rng> {
    /// Sampler seeded from OS entropy, for runs that need no reproducibility.
    pub fn from_entropy() -> Self {
        Self::new(ChaCha8Rng::from_entropy())
    }
}

fn invalid(kind: &'static str, reason: String) -> SampleError {
    SampleError::InvalidParameters { kind, reason }
}
