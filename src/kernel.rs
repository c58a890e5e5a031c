//! Kernel matrices (linear and RBF) and the median-distance bandwidth heuristic.

use crate::random::RandomSource;
use crate::ThreadSafeStdError;
use log::{debug, info, trace};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    /// `X Xᵗ / (N - 1)`
    Linear,
    /// Gaussian radial basis function of pairwise squared distances.
    Rbf,
}

impl KernelType {
    pub fn is_linear(self) -> bool {
        matches!(self, KernelType::Linear)
    }
}

/// Pairwise squared Euclidean distances between the rows of `x`,
/// computed as `||x_i||² + ||x_j||² - 2 x_i·x_j`.
pub fn pairwise_sq_distances(x: &ArrayView2<f64>) -> Array2<f64> {
    let row_sq_norms: Array1<f64> = x.map_axis(Axis(1), |row| row.dot(&row));
    let mut distances = x.dot(&x.t());
    distances.indexed_iter_mut().for_each(|((i, j), d)| {
        *d = row_sq_norms[i] + row_sq_norms[j] - 2.0 * *d;
    });
    distances
}

/// Median of the squared pairwise distances between (a subsample of) the rows of `x`.
///
/// When `sample_size < rows`, each row is kept with probability `sample_size / rows`
/// (one uniform draw per visited row) until `sample_size` rows are collected. This is
/// not an exact uniform sample, which is fine for a bandwidth heuristic. If fewer rows
/// are collected, only those are used.
///
/// The full `m x m` distance matrix, diagonal included, is sorted and its median returned
/// (mean of the two middle values when `m²` is even).
pub fn median_pairwise_sq_distance<S: RandomSource + ?Sized>(
    x: &ArrayView2<f64>,
    sample_size: usize,
    source: &mut S,
) -> Result<f64, ThreadSafeStdError> {
    let n_rows = x.nrows();
    info!("Computing median squared Euclidean distance ({} samples of {} rows).", sample_size, n_rows);

    let sample: Array2<f64> = if sample_size < n_rows {
        let inclusion_probability = sample_size as f64 / n_rows as f64;
        let mut chosen_rows: Vec<usize> = Vec::with_capacity(sample_size);
        for row_idx in 0..n_rows {
            if source.uniform() < inclusion_probability {
                chosen_rows.push(row_idx);
                if chosen_rows.len() == sample_size {
                    break;
                }
            }
        }
        if chosen_rows.len() < sample_size {
            debug!(
                "Bernoulli subsample collected {} of {} requested rows.",
                chosen_rows.len(),
                sample_size
            );
        }
        x.select(Axis(0), &chosen_rows)
    } else {
        x.to_owned()
    };

    if sample.nrows() == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "No rows available for the median distance estimate.",
        )
        .into());
    }

    let mut flattened: Vec<f64> = pairwise_sq_distances(&sample.view()).into_iter().collect();
    flattened.sort_by(|a, b| a.total_cmp(b));
    let m = flattened.len();
    let median = if m % 2 == 0 {
        (flattened[m / 2 - 1] + flattened[m / 2]) / 2.0
    } else {
        flattened[m / 2]
    };

    info!("Median squared Euclidean distance: {}", median);
    Ok(median)
}

/// `K = X Xᵗ / (N - 1)` where `N` is the sample count used for the degrees of freedom.
pub fn linear_kernel(x: &ArrayView2<f64>, n_samples: usize) -> Result<Array2<f64>, ThreadSafeStdError> {
    if n_samples < 2 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "The linear kernel needs at least 2 samples.",
        )
        .into());
    }
    let mut kernel = x.dot(&x.t());
    kernel /= (n_samples - 1) as f64;
    Ok(kernel)
}

/// `K_ij = exp(-||x_i - x_j||² / sigma²)`, optionally double-centered.
pub fn rbf_kernel(x: &ArrayView2<f64>, sigma: f64, center: bool) -> Result<Array2<f64>, ThreadSafeStdError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("RBF bandwidth must be positive and finite, got {}.", sigma),
        )
        .into());
    }
    let mut kernel = pairwise_sq_distances(x);
    let inv_sigma_sq = 1.0 / (sigma * sigma);
    kernel.par_mapv_inplace(|d| (-d * inv_sigma_sq).exp());

    if center {
        info!("Centering RBF kernel");
        center_kernel(&mut kernel);
    }
    Ok(kernel)
}

/// Double-centers a square kernel in place: `K <- (I - 11ᵗ/n) K (I - 11ᵗ/n)`.
///
/// Computed as `K_ij - mean_i(K) - mean_j(K) + mean(K)`, which is the same product
/// without forming the n x n centering matrix.
pub fn center_kernel(kernel: &mut Array2<f64>) {
    let n = kernel.nrows();
    if n == 0 {
        return;
    }
    let row_means = kernel.sum_axis(Axis(1)) / n as f64;
    let col_means = kernel.sum_axis(Axis(0)) / n as f64;
    let grand_mean = row_means.sum() / n as f64;
    kernel.indexed_iter_mut().for_each(|((i, j), k)| {
        *k = *k - row_means[i] - col_means[j] + grand_mean;
    });
}

/// Sum of the kernel diagonal, unnormalized.
pub fn kernel_trace(kernel: &Array2<f64>) -> f64 {
    kernel.diag().sum()
}

/// Builds the n x n kernel for the already-oriented data `x` (one sample per row).
///
/// `sigma` must already be resolved for RBF; the orchestrator runs the median
/// heuristic when the caller asked for automatic bandwidth. `center` only applies to RBF.
pub fn build_kernel(
    x: &ArrayView2<f64>,
    kernel_type: KernelType,
    sigma: f64,
    center: bool,
    n_samples: usize,
) -> Result<Array2<f64>, ThreadSafeStdError> {
    let kernel = match kernel_type {
        KernelType::Linear => {
            if center {
                debug!("Kernel centering only applies to the RBF kernel; ignoring it for the linear kernel.");
            }
            info!("Using linear kernel");
            linear_kernel(x, n_samples)?
        }
        KernelType::Rbf => {
            info!("Using RBF kernel with sigma={}", sigma);
            rbf_kernel(x, sigma, center)?
        }
    };
    trace!("dim(K): {:?}", kernel.dim());
    Ok(kernel)
}
