//! Per-feature centering and scaling applied before the decomposition.

use crate::pca::Orientation;
use crate::ThreadSafeStdError;
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Standard deviations below this are treated as constant features and left unscaled.
pub const SD_SANITIZATION_THRESHOLD: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardizationMethod {
    /// Leave the data untouched.
    None,
    /// Subtract the per-feature mean.
    Center,
    /// Subtract the per-feature mean and divide by the sample standard deviation.
    Scale,
}

/// The per-feature mean and scale that were removed from the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeanSd {
    pub method: StandardizationMethod,
    pub mean: Array1<f64>,
    /// Sanitized: always positive and finite.
    pub sd: Array1<f64>,
}

impl MeanSd {
    /// Re-applies a recorded standardization to new data in place.
    pub fn apply(&self, data: &mut Array2<f64>, orientation: Orientation) -> Result<(), ThreadSafeStdError> {
        let feature_axis = orientation.feature_lane_axis();
        let n_features = data.len_of(feature_axis);
        if n_features != self.mean.len() || n_features != self.sd.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Data has {} features but the recorded standardization has {}.",
                    n_features,
                    self.mean.len()
                ),
            )
            .into());
        }
        if self.method == StandardizationMethod::None {
            return Ok(());
        }
        let shifts: Vec<(f64, f64)> = self.mean.iter().copied().zip(self.sd.iter().copied()).collect();
        data.axis_iter_mut(feature_axis)
            .into_par_iter()
            .zip(shifts.into_par_iter())
            .for_each(|(mut lane, (mean, sd))| {
                lane.mapv_inplace(|v| (v - mean) / sd);
            });
        Ok(())
    }
}

/// Standardizes each feature of `data` in place.
///
/// With `SamplesInRows` features are columns; with `SamplesInColumns` they are rows.
/// Sample standard deviations use the `N - 1` divisor.
pub fn standardize(
    data: &mut Array2<f64>,
    method: StandardizationMethod,
    orientation: Orientation,
) -> Result<MeanSd, ThreadSafeStdError> {
    let feature_axis = orientation.feature_lane_axis();
    let n_features = data.len_of(feature_axis);
    let n_samples = data.len_of(Axis(1 - feature_axis.index()));

    info!(
        "Standardizing {} features over {} samples ({:?}, {:?}).",
        n_features, n_samples, method, orientation
    );

    if method == StandardizationMethod::None {
        return Ok(MeanSd {
            method,
            mean: Array1::zeros(n_features),
            sd: Array1::ones(n_features),
        });
    }
    if n_samples < 2 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Standardization needs at least 2 samples.",
        )
        .into());
    }

    // (mean, sd, was the sd sanitized)
    let per_feature: Vec<(f64, f64, bool)> = data
        .axis_iter_mut(feature_axis)
        .into_par_iter()
        .map(|mut lane| {
            let mean = lane.sum() / n_samples as f64;
            lane.mapv_inplace(|v| v - mean);
            if method == StandardizationMethod::Center {
                return (mean, 1.0, false);
            }
            let variance = lane.iter().map(|v| v * v).sum::<f64>() / (n_samples as f64 - 1.0);
            let sd = variance.sqrt();
            if sd.is_finite() && sd > SD_SANITIZATION_THRESHOLD {
                lane.mapv_inplace(|v| v / sd);
                (mean, sd, false)
            } else {
                (mean, 1.0, true)
            }
        })
        .collect();

    let constant_features = per_feature.iter().filter(|(_, _, sanitized)| *sanitized).count();
    if constant_features > 0 {
        debug!("{} feature(s) had (near-)zero variance and were only centered.", constant_features);
    }

    let (mean, sd): (Vec<f64>, Vec<f64>) = per_feature.into_iter().map(|(m, s, _)| (m, s)).unzip();
    Ok(MeanSd {
        method,
        mean: Array1::from(mean),
        sd: Array1::from(sd),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn scale_gives_zero_mean_unit_sd_columns() {
        let mut x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 60.0], [6.0, 30.0]];
        let meansd = standardize(&mut x, StandardizationMethod::Scale, Orientation::SamplesInRows).unwrap();
        assert_abs_diff_eq!(meansd.mean, array![3.0, 30.0], epsilon = 1e-12);
        for column in x.columns() {
            assert_abs_diff_eq!(column.sum(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(column.std(1.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn transposed_orientation_standardizes_rows() {
        let mut x = array![[1.0, 2.0, 3.0, 6.0], [5.0, 5.0, 5.0, 5.0]];
        let meansd = standardize(&mut x, StandardizationMethod::Scale, Orientation::SamplesInColumns).unwrap();
        assert_abs_diff_eq!(meansd.mean, array![3.0, 5.0], epsilon = 1e-12);
        // constant row is centered and left unscaled
        assert_abs_diff_eq!(meansd.sd[1], 1.0);
        assert_abs_diff_eq!(x.row(1).to_owned(), array![0.0, 0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(x.row(0).std(1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn center_only_keeps_spread() {
        let mut x = array![[1.0], [3.0]];
        let meansd = standardize(&mut x, StandardizationMethod::Center, Orientation::SamplesInRows).unwrap();
        assert_eq!(meansd.sd, array![1.0]);
        assert_eq!(x, array![[-1.0], [1.0]]);
    }

    #[test]
    fn none_is_identity() {
        let original = array![[1.0, 2.0], [3.0, 4.0]];
        let mut x = original.clone();
        let meansd = standardize(&mut x, StandardizationMethod::None, Orientation::SamplesInRows).unwrap();
        assert_eq!(x, original);
        assert_eq!(meansd.mean, array![0.0, 0.0]);
    }

    #[test]
    fn recorded_standardization_reapplies() {
        let raw = array![[1.0, 4.0], [2.0, 8.0], [6.0, 0.0]];
        let mut fitted = raw.clone();
        let meansd = standardize(&mut fitted, StandardizationMethod::Scale, Orientation::SamplesInRows).unwrap();
        let mut again = raw.clone();
        meansd.apply(&mut again, Orientation::SamplesInRows).unwrap();
        assert_abs_diff_eq!(again, fitted, epsilon = 1e-12);
    }

    #[test]
    fn reapply_rejects_feature_mismatch() {
        let mut fitted = array![[1.0, 4.0], [2.0, 8.0]];
        let meansd = standardize(&mut fitted, StandardizationMethod::Center, Orientation::SamplesInRows).unwrap();
        let mut wrong = array![[1.0, 2.0, 3.0]];
        assert!(meansd.apply(&mut wrong, Orientation::SamplesInRows).is_err());
    }

    #[test]
    fn single_sample_is_rejected() {
        let mut x = array![[1.0, 2.0, 3.0]];
        assert!(standardize(&mut x, StandardizationMethod::Scale, Orientation::SamplesInRows).is_err());
    }
}
