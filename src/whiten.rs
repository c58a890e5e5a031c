//! ZCA whitening built from a finished PCA run.

use crate::pca::{Orientation, RandomPcaOutput};
use crate::ThreadSafeStdError;
use log::info;
use ndarray::Array2;

/// `U diag(1/d) Uᵗ`, square in the sample dimension.
pub fn whitening_matrix(output: &RandomPcaOutput) -> Result<Array2<f64>, ThreadSafeStdError> {
    if let Some(bad) = output.eigenvalues.iter().find(|d| !(d.is_finite() && **d > 0.0)) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Cannot whiten with a non-positive eigenvalue ({}).", bad),
        )
        .into());
    }
    let u = &output.left_vectors;
    let inverse_eigenvalues = output.eigenvalues.mapv(|d| 1.0 / d);
    Ok((u * &inverse_eigenvalues).dot(&u.t()))
}

/// ZCA-whitens `raw_data` with the components of `output`.
///
/// `raw_data` must have the same shape convention as the matrix given to the PCA run;
/// the recorded standardization is applied to it first. The result is
/// `U diag(1/d) Uᵗ X` when samples are rows and `U diag(1/d) Uᵗ Xᵗ` when samples are
/// columns, so it always has one row per sample.
pub fn zca_whiten(output: &RandomPcaOutput, mut raw_data: Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
    info!("Whitening begin");
    let n_samples = output.orientation.n_samples(&raw_data.view());
    if n_samples != output.left_vectors.nrows() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Data has {} samples but the PCA components were computed on {}.",
                n_samples,
                output.left_vectors.nrows()
            ),
        )
        .into());
    }
    output.mean_sd.apply(&mut raw_data, output.orientation)?;

    let transform = whitening_matrix(output)?;
    let whitened = match output.orientation {
        Orientation::SamplesInRows => transform.dot(&raw_data),
        Orientation::SamplesInColumns => transform.dot(&raw_data.t()),
    };
    info!("Whitening done ({:?})", whitened.dim());
    Ok(whitened)
}
