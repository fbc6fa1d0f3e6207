use crate::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Name of the pre-registered identity package.
///
/// Every resource starts out under this package; it admits any quantity and
/// packaging under it is a no-op split.
pub const UNPACKAGED: &str = "unpackaged";

/// How a package chooses its per-draw target mass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    /// Fill packages to the maximum, one after another.
    First,
    /// Split the available quantity into equal full packages when possible.
    Equal,
    /// Draw the target uniformly from `[fill_min, fill_max]`.
    Uniform,
    /// Draw the target from a normal centered in the fill window, truncated
    /// to it.
    Normal,
}

/// A fill specification governing how bulk quantity is subdivided.
#[derive(Clone, Debug)]
pub struct Package {
    name: String,
    fill_min: f64,
    fill_max: f64,
    strategy: FillStrategy,
}

impl Package {
    /// Create a validated package definition.
    pub fn new(
        name: impl Into<String>,
        fill_min: f64,
        fill_max: f64,
        strategy: FillStrategy,
    ) -> Result<Self> {
        let name = name.into();
        if fill_min.is_nan() || fill_max.is_nan() || fill_min < 0.0 || fill_min > fill_max {
            return Err(Error::Value(format!(
                "invalid fill window [{fill_min}, {fill_max}] for package '{name}'"
            )));
        }
        // The sampled strategies draw from the window, so it must be bounded.
        if matches!(strategy, FillStrategy::Uniform | FillStrategy::Normal)
            && !fill_max.is_finite()
        {
            return Err(Error::Value(format!(
                "package '{name}' cannot sample from an unbounded fill window"
            )));
        }
        Ok(Self {
            name,
            fill_min,
            fill_max,
            strategy,
        })
    }

    /// The identity package: `[0, inf]`, first-fit.
    pub fn unpackaged() -> Self {
        Self {
            name: UNPACKAGED.to_string(),
            fill_min: 0.0,
            fill_max: f64::INFINITY,
            strategy: FillStrategy::First,
        }
    }

    /// The unique package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smallest admissible package mass.
    pub fn fill_min(&self) -> f64 {
        self.fill_min
    }

    /// Largest admissible package mass.
    pub fn fill_max(&self) -> f64 {
        self.fill_max
    }

    /// The fill strategy.
    pub fn strategy(&self) -> FillStrategy {
        self.strategy
    }

    /// The per-package target mass for a packaging run over `available`.
    ///
    /// Returns zero when `available` is below the fill minimum, which ends
    /// the run.
    pub fn get_fill_mass<R: Rng>(&self, available: f64, rng: &mut R) -> f64 {
        if available < self.fill_min {
            return 0.0;
        }
        match self.strategy {
            FillStrategy::First => self.fill_max,
            FillStrategy::Equal => {
                let num_min_fill = if self.fill_min > 0.0 {
                    (available / self.fill_min).floor()
                } else {
                    f64::INFINITY
                };
                let num_max_fill = (available / self.fill_max).ceil().max(1.0);
                if num_min_fill >= num_max_fill {
                    // Everything fits into full-ish packages of equal mass.
                    available / num_max_fill
                } else {
                    // Some residual will remain; fill maximal packages.
                    self.fill_max
                }
            }
            FillStrategy::Uniform => rng.random_range(self.fill_min..=self.fill_max),
            FillStrategy::Normal => {
                let mean = (self.fill_min + self.fill_max) / 2.0;
                let std = (self.fill_max - self.fill_min) / 6.0;
                if std <= 0.0 {
                    return mean;
                }
                // Normal::new only fails on non-finite/negative sigma.
                let dist = match Normal::new(mean, std) {
                    Ok(dist) => dist,
                    Err(_) => return mean,
                };
                for _ in 0..100 {
                    let draw = dist.sample(rng);
                    if draw >= self.fill_min && draw <= self.fill_max {
                        return draw;
                    }
                }
                mean
            }
        }
    }
}
