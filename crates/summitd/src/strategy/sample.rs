//! Uniform draws shared by the built-in strategies.

use rand::Rng;
use rand::distr::{Distribution, Uniform};

use super::StrategyError;

/// Draws a value from `[low, high]`.
///
/// Bounds that `rand` cannot sample from (non-finite, reversed, or too wide
/// for a finite scale) become [`StrategyError::Failed`].
pub(super) fn uniform<R>(
    rng: &mut R,
    algorithm: &str,
    low: f64,
    high: f64,
) -> Result<f64, StrategyError>
where
    R: Rng + ?Sized,
{
    Uniform::new_inclusive(low, high)
        .map(|distribution| distribution.sample(rng))
        .map_err(|error| StrategyError::Failed {
            algorithm: algorithm.to_owned(),
            message: format!("cannot sample from [{low}, {high}]: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    use super::*;

    #[test]
    fn draws_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let value = uniform(&mut rng, "RandomSearch", -2.0, 2.0).expect("sample");
            assert!((-2.0..=2.0).contains(&value));
        }
    }

    #[rstest]
    #[case(-1e308, 1e308)]
    #[case(0.0, f64::INFINITY)]
    #[case(1.0, 0.0)]
    fn unusable_bounds_are_reported(#[case] low: f64, #[case] high: f64) {
        let mut rng = StdRng::seed_from_u64(3);
        let error = uniform(&mut rng, "HillClimb", low, high).expect_err("unusable bounds");
        assert!(matches!(
            error,
            StrategyError::Failed { algorithm, .. } if algorithm == "HillClimb"
        ));
    }
}
