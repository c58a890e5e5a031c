// src/diagnostics.rs

//! Numerical health metrics collected while the power iteration runs.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// One round of the power iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationDetail {
    pub iteration: usize,
    /// `||Y - Yn||² / size(Y)`
    pub mean_squared_change: f64,
    pub orthogonalized: bool,
    /// `||I - YnᵗYn||_F`, only collected with the `enable-randompca-diagnostics` feature.
    pub orthogonality_error: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerIterationDiagnostics {
    pub per_iteration: Vec<IterationDetail>,
    /// `||I - QᵗQ||_F` of the returned basis.
    pub final_orthogonality_error: Option<f64>,
}

impl PowerIterationDiagnostics {
    pub fn diff_history(&self) -> Vec<f64> {
        self.per_iteration.iter().map(|d| d.mean_squared_change).collect()
    }

    pub fn last_diff(&self) -> Option<f64> {
        self.per_iteration.last().map(|d| d.mean_squared_change)
    }
}

/// Frobenius norm.
pub fn compute_frob_norm(matrix: &ArrayView2<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// `||I - QᵗQ||_F`; `None` for an empty matrix.
pub fn compute_orthogonality_error(q_matrix: &ArrayView2<f64>) -> Option<f64> {
    if q_matrix.nrows() == 0 || q_matrix.ncols() == 0 {
        return None;
    }
    let qtq = q_matrix.t().dot(q_matrix);
    let diff = Array2::<f64>::eye(qtq.nrows()) - qtq;
    Some(compute_frob_norm(&diff.view()))
}

/// `||A - U diag(s) Vᵗ||_F / ||A||_F`, with `vt` already transposed.
///
/// Returns `None` on a dimension mismatch, and `INFINITY` when `A` is zero but the
/// reconstruction is not.
pub fn compute_reconstruction_error(
    original_matrix: &ArrayView2<f64>,
    u: &ArrayView2<f64>,
    s_vec: &ArrayView1<f64>,
    vt: &ArrayView2<f64>,
) -> Option<f64> {
    if original_matrix.is_empty() {
        return None;
    }
    if u.ncols() != s_vec.len() || s_vec.len() != vt.nrows() {
        return None;
    }
    if u.nrows() != original_matrix.nrows() || vt.ncols() != original_matrix.ncols() {
        return None;
    }

    let reconstructed = u.dot(&Array2::from_diag(s_vec)).dot(vt);
    let norm_diff = compute_frob_norm(&(original_matrix - &reconstructed).view());
    let norm_original = compute_frob_norm(original_matrix);

    if norm_original < 1e-12 {
        if norm_diff < 1e-12 {
            Some(0.0)
        } else {
            Some(f64::INFINITY)
        }
    } else {
        Some(norm_diff / norm_original)
    }
}
