//! The context-scoped random number generator and the sampling
//! distributions the policies draw from.
//!
//! Every stochastic decision in a simulation routes through one seeded
//! [`SimRng`], which is what makes runs reproducible: identical inputs and
//! seed give an identical draw sequence.

use mfs_core::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Geometric, Normal};

/// The simulation's random number generator, seeded from the input.
#[derive(Debug)]
pub struct SimRng {
    inner: StdRng,
}

impl SimRng {
    /// A generator seeded deterministically.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Access the underlying generator for direct sampling.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.inner
    }

    /// A uniform integer in `[min, max]`.
    pub fn uniform_int(&mut self, min: i32, max: i32) -> i32 {
        self.inner.random_range(min..=max)
    }

    /// A uniform double in `[min, max)`.
    pub fn uniform_double(&mut self, min: f64, max: f64) -> f64 {
        self.inner.random_range(min..max)
    }

    /// A normal draw truncated to `[min, max]` by resampling, with a clamp
    /// fallback when the window is far in the tail.
    pub fn normal_double(&mut self, mean: f64, std: f64, min: f64, max: f64) -> f64 {
        if std <= 0.0 {
            return mean.clamp(min, max);
        }
        let dist = match Normal::new(mean, std) {
            Ok(dist) => dist,
            Err(_) => return mean.clamp(min, max),
        };
        for _ in 0..100 {
            let draw = dist.sample(&mut self.inner);
            if draw >= min && draw <= max {
                return draw;
            }
        }
        dist.sample(&mut self.inner).clamp(min, max)
    }

    /// A normal draw truncated to integer bounds, rounded.
    pub fn normal_int(&mut self, mean: f64, std: f64, min: i32, max: i32) -> i32 {
        self.normal_double(mean, std, f64::from(min), f64::from(max))
            .round() as i32
    }

    /// The number of trials up to and including the first success, with
    /// per-trial success probability `p` (a one-success negative binomial).
    pub fn negative_binomial_int(&mut self, p: f64) -> i32 {
        let p = p.clamp(f64::MIN_POSITIVE, 1.0);
        let dist = match Geometric::new(p) {
            Ok(dist) => dist,
            Err(_) => return 1,
        };
        // Geometric counts failures before the first success.
        (dist.sample(&mut self.inner).min(i32::MAX as u64 - 1) + 1) as i32
    }

    /// A Bernoulli trial.
    pub fn chance(&mut self, p: f64) -> bool {
        self.inner.random_bool(p.clamp(0.0, 1.0))
    }
}

/// An integer-valued sampling distribution for cycle lengths.
///
/// Parameter combinations are validated at construction, so sampling never
/// fails.
#[derive(Clone, Debug)]
pub enum IntDist {
    /// Always the same value.
    Fixed(i32),
    /// Uniform over `[min, max]`.
    Uniform {
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },
    /// Normal, truncated to `[min, max]` and rounded.
    Normal {
        /// Mean of the untruncated normal.
        mean: f64,
        /// Standard deviation of the untruncated normal.
        std: f64,
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },
    /// Number of steps until a per-step end probability fires.
    NegativeBinomial {
        /// Per-step termination probability, in `[0, 1]`.
        end_probability: f64,
    },
    /// A fixed length, except each cycle has a chance of a disrupted length
    /// instead.
    FixedWithDisruption {
        /// The nominal cycle length.
        nominal: i32,
        /// The length used when a disruption fires.
        disrupted: i32,
        /// Per-cycle disruption probability, in `[0, 1]`.
        disruption_probability: f64,
    },
}

impl IntDist {
    /// A constant distribution.
    pub fn fixed(value: i32) -> Self {
        IntDist::Fixed(value)
    }

    /// A validated uniform distribution over `[min, max]`.
    pub fn uniform(min: i32, max: i32) -> Result<Self> {
        if min > max {
            return Err(Error::Value(format!(
                "uniform min {min} larger than max {max}"
            )));
        }
        Ok(IntDist::Uniform { min, max })
    }

    /// A validated truncated normal.
    pub fn normal(mean: f64, std: f64, min: i32, max: i32) -> Result<Self> {
        if min > max {
            return Err(Error::Value(format!(
                "normal min {min} larger than max {max}"
            )));
        }
        if !mean.is_finite() || !std.is_finite() || std < 0.0 {
            return Err(Error::Value(format!(
                "invalid normal parameters mean={mean} std={std}"
            )));
        }
        Ok(IntDist::Normal {
            mean,
            std,
            min,
            max,
        })
    }

    /// A validated one-success negative binomial.
    pub fn negative_binomial(end_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&end_probability) {
            return Err(Error::Value(format!(
                "end probability {end_probability} must be between 0 and 1"
            )));
        }
        Ok(IntDist::NegativeBinomial { end_probability })
    }

    /// A validated fixed-with-disruption distribution.
    pub fn fixed_with_disruption(
        nominal: i32,
        disrupted: i32,
        disruption_probability: f64,
    ) -> Result<Self> {
        if disrupted < 0 {
            return Err(Error::Value(
                "disrupted length must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&disruption_probability) {
            return Err(Error::Value(format!(
                "disruption probability {disruption_probability} must be between 0 and 1"
            )));
        }
        Ok(IntDist::FixedWithDisruption {
            nominal,
            disrupted,
            disruption_probability,
        })
    }

    /// Draw a value.
    pub fn sample(&self, rng: &mut SimRng) -> i32 {
        match *self {
            IntDist::Fixed(value) => value,
            IntDist::Uniform { min, max } => rng.uniform_int(min, max),
            IntDist::Normal {
                mean,
                std,
                min,
                max,
            } => rng.normal_int(mean, std, min, max),
            IntDist::NegativeBinomial { end_probability } => {
                rng.negative_binomial_int(end_probability)
            }
            IntDist::FixedWithDisruption {
                nominal,
                disrupted,
                disruption_probability,
            } => {
                if rng.chance(disruption_probability) {
                    disrupted
                } else {
                    nominal
                }
            }
        }
    }
}

/// A double-valued sampling distribution for request size fractions.
#[derive(Clone, Debug)]
pub enum DoubleDist {
    /// Always the same value.
    Fixed(f64),
    /// Uniform over `[min, max)`.
    Uniform {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Normal, truncated to `[min, max]`.
    Normal {
        /// Mean of the untruncated normal.
        mean: f64,
        /// Standard deviation of the untruncated normal.
        std: f64,
        /// Lower truncation bound.
        min: f64,
        /// Upper truncation bound.
        max: f64,
    },
}

impl DoubleDist {
    /// A constant distribution.
    pub fn fixed(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::Value(format!("fixed value {value} must be finite")));
        }
        Ok(DoubleDist::Fixed(value))
    }

    /// A validated uniform distribution.
    pub fn uniform(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(Error::Value(format!(
                "invalid uniform range [{min}, {max}]"
            )));
        }
        Ok(DoubleDist::Uniform { min, max })
    }

    /// A validated truncated normal.
    pub fn normal(mean: f64, std: f64, min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(Error::Value(format!(
                "invalid normal range [{min}, {max}]"
            )));
        }
        if !mean.is_finite() || !std.is_finite() || std < 0.0 {
            return Err(Error::Value(format!(
                "invalid normal parameters mean={mean} std={std}"
            )));
        }
        Ok(DoubleDist::Normal {
            mean,
            std,
            min,
            max,
        })
    }

    /// Draw a value.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match *self {
            DoubleDist::Fixed(value) => value,
            DoubleDist::Uniform { min, max } => {
                if min == max {
                    min
                } else {
                    rng.uniform_double(min, max)
                }
            }
            DoubleDist::Normal {
                mean,
                std,
                min,
                max,
            } => rng.normal_double(mean, std, min, max),
        }
    }
}
