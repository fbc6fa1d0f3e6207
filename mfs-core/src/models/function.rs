use crate::{Error, Result};

/// A symbolic demand curve over simulation time.
///
/// These are the closed-form functions a region can declare for commodity
/// demand; the growth machinery evaluates them at each time step and compares
/// against aggregated producer capacity.
#[derive(Clone, Debug)]
pub enum SymFunction {
    /// `f(x) = slope * x + intercept`
    Linear {
        /// The slope.
        slope: f64,
        /// The intercept.
        intercept: f64,
    },
    /// `f(x) = constant * exp(exponent * x) + intercept`
    Exponential {
        /// The leading constant.
        constant: f64,
        /// The exponent multiplier.
        exponent: f64,
        /// The intercept.
        intercept: f64,
    },
    /// A sequence of non-overlapping pieces; zero left of the first piece.
    Piecewise(Vec<Piece>),
}

/// One segment of a piecewise function: `inner(x - start) + yoff` for
/// `x >= start`, until the next piece takes over.
#[derive(Clone, Debug)]
pub struct Piece {
    start: f64,
    yoff: f64,
    inner: Box<SymFunction>,
}

impl SymFunction {
    /// A linear function through `intercept` with the given slope.
    pub fn linear(slope: f64, intercept: f64) -> Result<Self> {
        if !slope.is_finite() || !intercept.is_finite() {
            return Err(Error::Value("linear parameters must be finite".to_string()));
        }
        Ok(SymFunction::Linear { slope, intercept })
    }

    /// An exponential `constant * exp(exponent * x) + intercept`.
    pub fn exponential(constant: f64, exponent: f64, intercept: f64) -> Result<Self> {
        if !constant.is_finite() || !exponent.is_finite() || !intercept.is_finite() {
            return Err(Error::Value(
                "exponential parameters must be finite".to_string(),
            ));
        }
        Ok(SymFunction::Exponential {
            constant,
            exponent,
            intercept,
        })
    }

    /// Evaluate the function.
    pub fn value(&self, x: f64) -> f64 {
        match self {
            SymFunction::Linear { slope, intercept } => slope * x + intercept,
            SymFunction::Exponential {
                constant,
                exponent,
                intercept,
            } => constant * (exponent * x).exp() + intercept,
            SymFunction::Piecewise(pieces) => {
                let mut current: Option<&Piece> = None;
                for piece in pieces {
                    if x >= piece.start {
                        current = Some(piece);
                    } else {
                        break;
                    }
                }
                match current {
                    Some(piece) => piece.inner.value(x - piece.start) + piece.yoff,
                    None => 0.0,
                }
            }
        }
    }
}

/// Builds a piecewise function one piece at a time, enforcing ordered,
/// non-overlapping intervals and optional continuity at the joins.
#[derive(Clone, Debug, Default)]
pub struct PiecewiseBuilder {
    pieces: Vec<Piece>,
}

impl PiecewiseBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a piece taking effect at `start`.
    ///
    /// Starts must strictly increase. With `continuous`, the new piece is
    /// shifted vertically so its value at `start` matches the function built
    /// so far.
    pub fn add(mut self, inner: SymFunction, start: f64, continuous: bool) -> Result<Self> {
        if !start.is_finite() {
            return Err(Error::Value("piece start must be finite".to_string()));
        }
        if let Some(last) = self.pieces.last() {
            if start <= last.start {
                return Err(Error::Value(format!(
                    "piece at {start} does not extend the last piece at {}",
                    last.start
                )));
            }
        }
        let yoff = if continuous && !self.pieces.is_empty() {
            SymFunction::Piecewise(self.pieces.clone()).value(start) - inner.value(0.0)
        } else {
            0.0
        };
        self.pieces.push(Piece {
            start,
            yoff,
            inner: Box::new(inner),
        });
        Ok(self)
    }

    /// Finish the function. Fails when no piece was added.
    pub fn build(self) -> Result<SymFunction> {
        if self.pieces.is_empty() {
            return Err(Error::Value(
                "piecewise function needs at least one piece".to_string(),
            ));
        }
        Ok(SymFunction::Piecewise(self.pieces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_and_exponential_evaluate() {
        let lin = SymFunction::linear(2.0, 1.0).unwrap();
        assert_relative_eq!(lin.value(3.0), 7.0);

        let exp = SymFunction::exponential(2.0, 0.5, 1.0).unwrap();
        assert_relative_eq!(exp.value(0.0), 3.0);
        assert_relative_eq!(exp.value(2.0), 2.0 * 1.0f64.exp() + 1.0);
    }

    #[test]
    fn invalid_parameters_fail() {
        assert!(SymFunction::linear(f64::NAN, 0.0).is_err());
        assert!(SymFunction::exponential(1.0, f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn piecewise_is_zero_before_first_piece() {
        let f = PiecewiseBuilder::new()
            .add(SymFunction::linear(1.0, 0.0).unwrap(), 5.0, false)
            .unwrap()
            .build()
            .unwrap();
        assert_relative_eq!(f.value(4.9), 0.0);
        assert_relative_eq!(f.value(7.0), 2.0);
    }

    #[test]
    fn piecewise_rejects_overlap() {
        let builder = PiecewiseBuilder::new()
            .add(SymFunction::linear(1.0, 0.0).unwrap(), 0.0, false)
            .unwrap();
        assert!(builder
            .add(SymFunction::linear(1.0, 0.0).unwrap(), 0.0, false)
            .is_err());
    }

    #[test]
    fn continuity_shifts_the_next_piece() {
        // First piece climbs to 10 at x=10; the second would restart at 0
        // but continuity lifts it to meet the join.
        let f = PiecewiseBuilder::new()
            .add(SymFunction::linear(1.0, 0.0).unwrap(), 0.0, false)
            .unwrap()
            .add(SymFunction::linear(2.0, 0.0).unwrap(), 10.0, true)
            .unwrap()
            .build()
            .unwrap();
        assert_relative_eq!(f.value(10.0), 10.0);
        assert_relative_eq!(f.value(12.0), 14.0);
    }
}
