// src/linalg_backends.rs

//! The single seam between the PCA core and the dense linear-algebra library.
//!
//! Every QR, SVD and symmetric eigendecomposition in the crate goes through
//! [`LinAlgBackendProvider`], which dispatches to `ndarray-linalg` (LAPACK) by
//! default or to `faer` when the `backend_faer` feature is enabled.

use crate::ThreadSafeStdError;
use ndarray::{Array1, Array2};

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues in the order returned by the solver (ascending for LAPACK and faer).
    pub eigenvalues: Array1<f64>,
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<f64>,
}

/// Symmetric eigendecomposition reading the upper triangle.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError>;
}

/// QR decomposition, keeping only the thin Q factor (rows x min(rows, cols)).
pub trait BackendQR {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError>;
}

/// Output of a Singular Value Decomposition. Singular values are descending.
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Option<Array2<f64>>,
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

pub trait BackendSVD {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, ThreadSafeStdError>;
}

// --- ndarray-linalg (LAPACK) ---

use ndarray_linalg::{Eigh as NdLinalgEigh, QR as NdLinalgQR, SVDInto as NdLinalgSVDInto, UPLO};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError> {
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendQR for NdarrayLinAlgBackend {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        let (q_factor, _r) = matrix.qr().map_err(to_dyn_error)?;
        Ok(q_factor)
    }
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, ThreadSafeStdError> {
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }
}

// --- faer ---

#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendEigh, BackendQR, BackendSVD, EighOutput, SVDOutput};
    use crate::ThreadSafeStdError;
    use faer::linalg::solvers::Svd as FaerSolverSvd;
    use faer::MatRef;
    use ndarray::{Array1, Array2, ArrayView2, ShapeBuilder};

    fn faer_error(msg: String) -> ThreadSafeStdError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    /// Borrows a contiguous ndarray matrix as a faer view without copying.
    fn as_faer_view<'a>(matrix: &'a ArrayView2<'a, f64>) -> Result<MatRef<'a, f64>, ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        let slice = matrix.as_slice_memory_order().ok_or_else(|| {
            faer_error(format!(
                "Matrix ({}x{}) is non-contiguous and cannot be viewed by faer.",
                nrows, ncols
            ))
        })?;
        if matrix.is_standard_layout() {
            Ok(MatRef::from_row_major_slice(slice, nrows, ncols))
        } else if matrix.t().is_standard_layout() {
            Ok(MatRef::from_column_major_slice(slice, nrows, ncols))
        } else {
            Err(faer_error(format!(
                "Matrix ({}x{}) has a strided layout faer cannot view.",
                nrows, ncols
            )))
        }
    }

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Array2<f64> {
        let nrows = faer_mat.nrows();
        let ncols = faer_mat.ncols();
        let mut column_major = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                column_major.push(unsafe { *faer_mat.get_unchecked(i, j) });
            }
        }
        Array2::from_shape_vec((nrows, ncols).f(), column_major)
            .unwrap_or_else(|_| Array2::zeros((nrows, ncols)))
    }

    fn faer_col_to_ndarray(faer_col: faer::ColRef<'_, f64>) -> Array1<f64> {
        (0..faer_col.nrows())
            .map(|i| unsafe { *faer_col.get_unchecked(i) })
            .collect()
    }

    impl BackendEigh for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError> {
            if matrix.nrows() != matrix.ncols() {
                return Err(faer_error("Matrix must be square for eigendecomposition.".to_string()));
            }
            if matrix.is_empty() {
                return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
            }
            let view = matrix.view();
            let eig = as_faer_view(&view)?
                .self_adjoint_eigen(faer::Side::Upper)
                .map_err(|e| faer_error(format!("Faer eigendecomposition failed: {:?}", e)))?;
            Ok(EighOutput {
                eigenvalues: faer_col_to_ndarray(eig.S().column_vector()),
                eigenvectors: faer_mat_to_ndarray(eig.U()),
            })
        }
    }

    impl BackendQR for FaerLinAlgBackend {
        fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            if nrows == 0 {
                return Ok(Array2::zeros((0, nrows.min(ncols))));
            }
            let view = matrix.view();
            let thin_q = as_faer_view(&view)?.qr().compute_thin_Q();
            Ok(faer_mat_to_ndarray(thin_q.as_ref()))
        }
    }

    impl BackendSVD for FaerLinAlgBackend {
        fn svd_into(
            &self,
            matrix: Array2<f64>,
            compute_u: bool,
            compute_v: bool,
        ) -> Result<SVDOutput, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            if matrix.is_empty() {
                let k = nrows.min(ncols);
                return Ok(SVDOutput {
                    u: compute_u.then(|| Array2::zeros((nrows, k))),
                    s: Array1::zeros(k),
                    vt: compute_v.then(|| Array2::zeros((k, ncols))),
                });
            }
            let view = matrix.view();
            let svd = FaerSolverSvd::new_thin(as_faer_view(&view)?)
                .map_err(|e| faer_error(format!("Faer SVD computation failed: {:?}", e)))?;
            let s = faer_col_to_ndarray(svd.S().column_vector());
            let u = compute_u.then(|| faer_mat_to_ndarray(svd.U().as_ref()));
            let vt = compute_v.then(|| faer_mat_to_ndarray(svd.V().as_ref()).t().into_owned());
            Ok(SVDOutput { u, s, vt })
        }
    }
}

// --- Compile-time dispatch ---

/// Dispatches to the backend selected by cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider;

impl LinAlgBackendProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BackendEigh for LinAlgBackendProvider {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eigh_upper(matrix)
        }
    }
}

impl BackendQR for LinAlgBackendProvider {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.qr_q_factor(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.qr_q_factor(matrix)
        }
    }
}

impl BackendSVD for LinAlgBackendProvider {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn qr_q_factor_is_thin_and_orthonormal() {
        let matrix = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0], [0.5, -1.0]];
        let q = LinAlgBackendProvider::new().qr_q_factor(&matrix).unwrap();
        assert_eq!(q.dim(), (4, 2));
        let qtq = q.t().dot(&q);
        assert_abs_diff_eq!(qtq, Array2::<f64>::eye(2), epsilon = 1e-10);
    }

    #[test]
    fn eigh_upper_returns_ascending_eigenvalues() {
        let matrix = array![[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 1.0]];
        let out = LinAlgBackendProvider::new().eigh_upper(&matrix).unwrap();
        assert_abs_diff_eq!(out.eigenvalues, array![1.0, 2.0, 5.0], epsilon = 1e-12);
    }

    #[test]
    fn svd_singular_values_descending() {
        let matrix = array![[3.0, 0.0], [0.0, -4.0], [0.0, 0.0]];
        let out = LinAlgBackendProvider::new().svd_into(matrix, true, false).unwrap();
        assert_abs_diff_eq!(out.s, array![4.0, 3.0], epsilon = 1e-12);
        assert!(out.u.is_some());
        assert!(out.vt.is_none());
    }
}
