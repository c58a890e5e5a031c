//! Dense decomposition of the small projected matrix `B = Qᵗ X`.

use crate::linalg_backends::{BackendEigh, BackendSVD, LinAlgBackendProvider};
use crate::ThreadSafeStdError;
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmallSolverMethod {
    /// Thin SVD of `B`; eigenvalues are the squared singular values.
    Svd,
    /// Symmetric eigendecomposition of `B Bᵗ`.
    Eigen,
}

/// Eigenpairs of `B Bᵗ`, strictly ordered by descending eigenvalue.
#[derive(Debug, Clone)]
pub struct SmallSolveOutput {
    /// k x r, column i pairs with `eigenvalues[i]`.
    pub eigenvectors: Array2<f64>,
    pub eigenvalues: Array1<f64>,
}

/// Indices that sort `values` in descending order. NaNs go last; ties keep their order.
pub fn descending_order(values: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let (va, vb) = (values[a], values[b]);
        match (va.is_nan(), vb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => vb.total_cmp(&va),
        }
    });
    order
}

/// Reorders the columns of `matrix`; `order` indexes the original columns.
pub fn reorder_columns_owned(matrix: &Array2<f64>, order: &[usize]) -> Array2<f64> {
    if order.is_empty() {
        return Array2::zeros((matrix.nrows(), 0));
    }
    matrix.select(Axis(1), order)
}

/// Decomposes `b` (k x p) into left vectors and eigenvalues of `b bᵗ`.
pub fn solve_small(b: Array2<f64>, method: SmallSolverMethod) -> Result<SmallSolveOutput, ThreadSafeStdError> {
    let backend = LinAlgBackendProvider::new();
    let (eigenvectors, eigenvalues) = match method {
        SmallSolverMethod::Svd => {
            info!("SVD begin");
            let svd = backend
                .svd_into(b, true, false)
                .map_err(|e| format!("SVD of the projected matrix B failed: {}", e))?;
            let u = svd.u.ok_or("SVD of B did not return U")?;
            // thin: only the columns that carry a singular value
            let rank = svd.s.len().min(u.ncols());
            let u_thin = u.slice_axis(Axis(1), ndarray::Slice::from(0..rank)).to_owned();
            let squared = svd.s.slice_axis(Axis(0), ndarray::Slice::from(0..rank)).mapv(|s| s * s);
            info!("SVD done");
            (u_thin, squared)
        }
        SmallSolverMethod::Eigen => {
            info!("Eigen-decomposition begin");
            let bbt = b.dot(&b.t());
            debug!("dim(BBT): {:?}", bbt.dim());
            let eig = backend
                .eigh_upper(&bbt)
                .map_err(|e| format!("Eigendecomposition of B Bᵗ failed: {}", e))?;
            info!("Eigen-decomposition done");
            (eig.eigenvectors, eig.eigenvalues)
        }
    };

    // The symmetric solver returns ascending eigenvalues; both paths are put in
    // descending order here so downstream code never depends on solver conventions.
    let order = descending_order(&eigenvalues);
    let sorted_values = eigenvalues.select(Axis(0), &order);
    let sorted_vectors = reorder_columns_owned(&eigenvectors, &order);

    Ok(SmallSolveOutput {
        eigenvectors: sorted_vectors,
        eigenvalues: sorted_values,
    })
}
