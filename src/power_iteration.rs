//! Randomized subspace iteration against a kernel matrix.
//!
//! Starting from a Gaussian sketch `Y = X R`, the engine repeatedly applies the
//! kernel (`Yn = K Y`), keeps the iterate well conditioned either by QR
//! re-orthogonalization or by column normalization, and stops once the mean squared
//! change between iterates drops below `tol` or the iteration budget runs out.
//! The final iterate is orthonormalized into the basis `Q` used for projection.

use crate::diagnostics::{compute_orthogonality_error, IterationDetail, PowerIterationDiagnostics};
use crate::linalg_backends::{BackendQR, LinAlgBackendProvider};
use crate::random::{make_gaussian, RandomSource};
use crate::ThreadSafeStdError;
use log::{debug, info, trace, warn};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerIterationState {
    Init,
    Iterating,
    /// The change between iterates fell below the tolerance.
    Converged,
    /// `maxiter` rounds ran without converging; the last iterate is still used.
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerIterationSettings {
    /// Sketch width, `ndim + nextra`.
    pub total_dim: usize,
    pub maxiter: usize,
    pub tol: f64,
    /// Re-orthogonalize with QR every round instead of normalizing columns.
    pub do_orth: bool,
}

#[derive(Debug, Clone)]
pub struct PowerIterationOutcome {
    /// Orthonormal basis, `rows(X) x total_dim`.
    pub basis: Array2<f64>,
    /// Terminal state, either `Converged` or `Exhausted`.
    pub state: PowerIterationState,
    pub iterations: usize,
    pub diagnostics: PowerIterationDiagnostics,
}

impl PowerIterationOutcome {
    pub fn converged(&self) -> bool {
        self.state == PowerIterationState::Converged
    }
}

/// Rescales every column of `matrix` to unit Euclidean norm, in place.
///
/// A column whose norm is zero or not finite is rejected with an error instead of
/// being turned into non-finite values.
pub fn normalize_columns(matrix: &mut Array2<f64>) -> Result<(), ThreadSafeStdError> {
    for (col_idx, mut column) in matrix.axis_iter_mut(Axis(1)).enumerate() {
        let norm = column.dot(&column).sqrt();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Column {} has norm {} and cannot be normalized.", col_idx, norm),
            )
            .into());
        }
        let inv_norm = 1.0 / norm;
        column.mapv_inplace(|v| v * inv_norm);
    }
    Ok(())
}

/// Mean squared elementwise difference, `||a - b||² / size(a)`.
fn mean_squared_change(previous: &Array2<f64>, next: &Array2<f64>) -> f64 {
    let sum_sq: f64 = previous
        .iter()
        .zip(next.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    sum_sq / previous.len() as f64
}

/// `Y = X R` with `R` Gaussian (`cols(X) x total_dim`), columns normalized.
pub fn initial_sketch<S: RandomSource + ?Sized>(
    x: &ArrayView2<f64>,
    total_dim: usize,
    source: &mut S,
) -> Result<Array2<f64>, ThreadSafeStdError> {
    let random_projection = make_gaussian(x.ncols(), total_dim, source);
    let mut sketch = x.dot(&random_projection);
    debug!("dim(Y): {:?}", sketch.dim());
    normalize_columns(&mut sketch).map_err(|e| format!("Initial sketch is degenerate: {}", e))?;
    Ok(sketch)
}

/// Runs the power iteration of `kernel` seeded by a sketch of `x`.
///
/// `kernel` must be square with as many rows as `x`.
pub fn run_power_iteration<S: RandomSource + ?Sized>(
    x: &ArrayView2<f64>,
    kernel: &ArrayView2<f64>,
    settings: PowerIterationSettings,
    source: &mut S,
) -> Result<PowerIterationOutcome, ThreadSafeStdError> {
    let n_rows = x.nrows();
    if kernel.nrows() != n_rows || kernel.ncols() != n_rows {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Kernel is {:?} but the data has {} rows; expected a square {}x{} kernel.",
                kernel.dim(),
                n_rows,
                n_rows,
                n_rows
            ),
        )
        .into());
    }
    if settings.total_dim == 0 || settings.total_dim > n_rows {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Sketch width {} must be between 1 and the number of rows ({}).",
                settings.total_dim, n_rows
            ),
        )
        .into());
    }

    let backend = LinAlgBackendProvider::new();
    let start_time = std::time::Instant::now();
    let mut state = PowerIterationState::Init;
    trace!("Power iteration state: {:?}", state);

    let mut current = initial_sketch(x, settings.total_dim, source)?;
    let mut diagnostics = PowerIterationDiagnostics::default();
    let mut iterations = 0;

    if settings.maxiter > 0 {
        state = PowerIterationState::Iterating;
    }
    while state == PowerIterationState::Iterating {
        let mut next = kernel.dot(&current);
        if settings.do_orth {
            next = backend
                .qr_q_factor(&next)
                .map_err(|e| format!("QR re-orthogonalization failed at iteration {}: {}", iterations, e))?;
        } else {
            normalize_columns(&mut next)
                .map_err(|e| format!("Normalization failed at iteration {}: {}", iterations, e))?;
        }

        let diff = mean_squared_change(&current, &next);
        debug!(
            "iter {}{} {}",
            iterations,
            if settings.do_orth { " (orthogonalising)" } else { "" },
            diff
        );
        diagnostics.per_iteration.push(IterationDetail {
            iteration: iterations,
            mean_squared_change: diff,
            orthogonalized: settings.do_orth,
            #[cfg(feature = "enable-randompca-diagnostics")]
            orthogonality_error: compute_orthogonality_error(&next.view()),
            #[cfg(not(feature = "enable-randompca-diagnostics"))]
            orthogonality_error: None,
        });

        current = next;
        iterations += 1;

        if diff < settings.tol {
            state = PowerIterationState::Converged;
        } else if iterations >= settings.maxiter {
            state = PowerIterationState::Exhausted;
        }
    }
    if state == PowerIterationState::Init {
        state = PowerIterationState::Exhausted;
    }

    match state {
        PowerIterationState::Converged => info!(
            "Power iteration converged after {} iteration(s) in {:?}",
            iterations,
            start_time.elapsed()
        ),
        _ if settings.maxiter > 0 => warn!(
            "Power iteration did not reach tol={} within {} iteration(s); using the last iterate.",
            settings.tol, settings.maxiter
        ),
        _ => debug!("maxiter is 0, skipping power iteration."),
    }

    info!("QR begin");
    let basis = backend
        .qr_q_factor(&current)
        .map_err(|e| format!("Final QR of the power-iteration subspace failed: {}", e))?;
    diagnostics.final_orthogonality_error = compute_orthogonality_error(&basis.view());
    info!("QR done, dim(Q): {:?}", basis.dim());

    Ok(PowerIterationOutcome {
        basis,
        state,
        iterations,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededSource;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    /// Kernel with a known spectrum: `V diag(values) Vᵗ` for an orthonormal `V`.
    fn kernel_with_spectrum(values: &[f64], seed: u64) -> Array2<f64> {
        let n = values.len();
        let raw = crate::random::make_gaussian_seeded(n, n, seed);
        let v = LinAlgBackendProvider::new().qr_q_factor(&raw).unwrap();
        let d = Array2::from_diag(&Array1::from(values.to_vec()));
        v.dot(&d).dot(&v.t())
    }

    #[test]
    fn normalized_columns_have_unit_norm() {
        let mut m = array![[3.0, 0.0, 1e-8], [4.0, -2.0, 1e-8], [0.0, 0.0, 0.0]];
        normalize_columns(&mut m).unwrap();
        for column in m.columns() {
            assert_abs_diff_eq!(column.dot(&column).sqrt(), 1.0, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(m[[0, 0]], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn zero_column_is_an_error() {
        let mut m = array![[1.0, 0.0], [1.0, 0.0]];
        assert!(normalize_columns(&mut m).is_err());
    }

    #[test]
    fn zero_maxiter_skips_straight_to_qr() {
        let x = crate::random::make_gaussian_seeded(12, 6, 1);
        let k = x.dot(&x.t());
        let settings = PowerIterationSettings { total_dim: 4, maxiter: 0, tol: 1e-6, do_orth: true };
        let outcome = run_power_iteration(&x.view(), &k.view(), settings, &mut SeededSource::new(2)).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.state, PowerIterationState::Exhausted);
        assert!(!outcome.converged());
        assert_eq!(outcome.basis.dim(), (12, 4));
        assert!(outcome.diagnostics.final_orthogonality_error.unwrap() < 1e-10);
    }

    #[test]
    fn basis_captures_dominant_subspace() {
        let spectrum = [50.0, 30.0, 1.0, 0.5, 0.2, 0.1, 0.05, 0.01];
        let k = kernel_with_spectrum(&spectrum, 4);
        let x = crate::random::make_gaussian_seeded(8, 8, 5);
        let settings = PowerIterationSettings { total_dim: 3, maxiter: 200, tol: 1e-14, do_orth: true };
        let outcome = run_power_iteration(&x.view(), &k.view(), settings, &mut SeededSource::new(6)).unwrap();

        // top-2 eigenvectors of K must lie in span(Q)
        let eig = crate::small_solver::solve_small(k.clone(), crate::small_solver::SmallSolverMethod::Eigen).unwrap();
        let q = &outcome.basis;
        for c in 0..2 {
            let v = eig.eigenvectors.column(c);
            let projected = q.dot(&q.t().dot(&v));
            assert_abs_diff_eq!(projected, v.to_owned(), epsilon = 1e-6);
        }
    }

    #[test]
    fn normalized_iteration_converges_and_diff_shrinks() {
        let spectrum = [10.0, 2.0, 1.0, 0.5, 0.25, 0.1];
        let k = kernel_with_spectrum(&spectrum, 7);
        let x = crate::random::make_gaussian_seeded(6, 6, 8);
        let settings = PowerIterationSettings { total_dim: 2, maxiter: 500, tol: 1e-12, do_orth: false };
        let outcome = run_power_iteration(&x.view(), &k.view(), settings, &mut SeededSource::new(9)).unwrap();
        assert!(outcome.converged());
        let diffs: Vec<f64> = outcome
            .diagnostics
            .per_iteration
            .iter()
            .map(|d| d.mean_squared_change)
            .collect();
        assert_eq!(diffs.len(), outcome.iterations);
        assert!(diffs.last().unwrap() < &1e-12);
        // geometric decay: late diffs are far below early ones
        assert!(diffs[diffs.len() - 1] < diffs[0] * 1e-6);
    }

    #[test]
    fn exhausted_budget_is_not_an_error() {
        let k = kernel_with_spectrum(&[3.0, 2.9, 2.8, 2.7, 2.6], 1);
        let x = crate::random::make_gaussian_seeded(5, 5, 2);
        let settings = PowerIterationSettings { total_dim: 2, maxiter: 2, tol: 0.0, do_orth: false };
        let outcome = run_power_iteration(&x.view(), &k.view(), settings, &mut SeededSource::new(3)).unwrap();
        assert_eq!(outcome.state, PowerIterationState::Exhausted);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.basis.ncols(), 2);
    }

    #[test]
    fn rejects_oversized_sketch_and_mismatched_kernel() {
        let x = crate::random::make_gaussian_seeded(4, 3, 2);
        let k = x.dot(&x.t());
        let too_wide = PowerIterationSettings { total_dim: 5, maxiter: 1, tol: 0.0, do_orth: true };
        assert!(run_power_iteration(&x.view(), &k.view(), too_wide, &mut SeededSource::new(1)).is_err());
        let ok = PowerIterationSettings { total_dim: 2, maxiter: 1, tol: 0.0, do_orth: true };
        let wrong_kernel = Array2::<f64>::eye(3);
        assert!(run_power_iteration(&x.view(), &wrong_kernel.view(), ok, &mut SeededSource::new(1)).is_err());
    }
}
