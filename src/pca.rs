// Randomized (kernel) principal component analysis

use crate::diagnostics::PowerIterationDiagnostics;
use crate::kernel::{build_kernel, kernel_trace, median_pairwise_sq_distance, KernelType};
use crate::persistence::save_text;
use crate::power_iteration::{run_power_iteration, PowerIterationSettings, PowerIterationState};
use crate::random::{RandomSource, SeededSource};
use crate::small_solver::{solve_small, SmallSolverMethod};
use crate::standardize::{standardize, MeanSd, StandardizationMethod};
use crate::ThreadSafeStdError;
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which axis of the input matrix holds the samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// n samples x p features; the kernel is n x n.
    SamplesInRows,
    /// p features x n samples ("transposed"); the linear kernel is p x p.
    SamplesInColumns,
}

impl Orientation {
    pub fn from_transpose(transpose: bool) -> Self {
        if transpose {
            Orientation::SamplesInColumns
        } else {
            Orientation::SamplesInRows
        }
    }

    pub fn is_transposed(self) -> bool {
        self == Orientation::SamplesInColumns
    }

    /// Axis to iterate over to visit one feature at a time.
    pub fn feature_lane_axis(self) -> Axis {
        match self {
            Orientation::SamplesInRows => Axis(1),
            Orientation::SamplesInColumns => Axis(0),
        }
    }

    /// `N`, the sample count used for degrees of freedom.
    pub fn n_samples(self, data: &ArrayView2<f64>) -> usize {
        match self {
            Orientation::SamplesInRows => data.nrows(),
            Orientation::SamplesInColumns => data.ncols(),
        }
    }
}

/// Parameters of one randomized PCA run.
#[derive(Clone, Debug)]
pub struct RandomPcaConfig {
    /// How the small projected problem is decomposed.
    pub method: SmallSolverMethod,
    /// Applied along the active orientation before anything else.
    pub standardization: StandardizationMethod,
    /// Samples are columns. Ignored (forced off) for non-linear kernels.
    pub transpose: bool,
    /// Number of components returned.
    pub ndim: usize,
    /// Oversampling columns added to the sketch and dropped at the end.
    pub nextra: usize,
    /// Power-iteration budget; 0 skips refinement.
    pub maxiter: usize,
    /// Convergence threshold on the mean squared change between iterates.
    pub tol: f64,
    pub seed: u64,
    pub kernel: KernelType,
    /// RBF bandwidth; 0 selects it with the median heuristic.
    pub sigma: f64,
    /// Double-center the RBF kernel.
    pub rbf_center: bool,
    /// Row cap for the median heuristic subsample.
    pub rbf_sample_size: usize,
    /// Dump the kernel matrix as text to this path before iterating.
    pub save_kernel: Option<PathBuf>,
    /// QR re-orthogonalize every power iteration instead of normalizing columns.
    pub do_orth: bool,
    /// Also compute loadings when samples are in rows.
    pub do_loadings: bool,
}

impl Default for RandomPcaConfig {
    fn default() -> Self {
        RandomPcaConfig {
            method: SmallSolverMethod::Eigen,
            standardization: StandardizationMethod::Scale,
            transpose: false,
            ndim: 10,
            nextra: 190,
            maxiter: 50,
            tol: 1e-4,
            seed: 1,
            kernel: KernelType::Linear,
            sigma: 0.0,
            rbf_center: true,
            rbf_sample_size: 1000,
            save_kernel: None,
            do_orth: true,
            do_loadings: false,
        }
    }
}

/// How the power iteration ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub state: PowerIterationState,
    pub converged: bool,
    pub iterations: usize,
    pub diagnostics: PowerIterationDiagnostics,
}

/// Everything a run produces. All matrices have `ndim` columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomPcaOutput {
    pub orientation: Orientation,
    pub kernel: KernelType,
    /// Resolved RBF bandwidth; `None` for the linear kernel.
    pub sigma: Option<f64>,
    /// `N`
    pub n_samples: usize,
    /// Eigenvalues divided by `N - 1`, descending.
    pub eigenvalues: Array1<f64>,
    /// `eigenvalues / trace`
    pub pve: Array1<f64>,
    /// Sum of the kernel diagonal.
    pub trace: f64,
    /// `P`, one row per sample.
    pub scores: Array2<f64>,
    /// `U`, unit-norm left vectors (samples when not transposed).
    pub left_vectors: Array2<f64>,
    /// `V`. Always present when transposed, otherwise only with `do_loadings`.
    pub loadings: Option<Array2<f64>>,
    pub mean_sd: MeanSd,
    pub convergence: ConvergenceReport,
}

/// Score, left-vector and loading matrices before packaging.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub scores: Array2<f64>,
    pub left_vectors: Array2<f64>,
    pub loadings: Option<Array2<f64>>,
}

/// `1 / (sqrt(d_i) * sqrt(N - 1))` for each component.
///
/// This is the single place the degrees-of-freedom divisor is undone when moving
/// between score and loading spaces.
pub fn inverse_singular_scaling(eigenvalues: &ArrayView1<f64>, n_samples: usize) -> Result<Array1<f64>, ThreadSafeStdError> {
    if let Some((idx, &value)) = eigenvalues
        .iter()
        .enumerate()
        .find(|(_, v)| !(v.is_finite() && **v > 0.0))
    {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Component {} has eigenvalue {}; the requested number of components exceeds the numerical rank.",
                idx, value
            ),
        )
        .into());
    }
    let sqrt_dof = ((n_samples - 1) as f64).sqrt();
    Ok(eigenvalues.mapv(|d| 1.0 / (d.sqrt() * sqrt_dof)))
}

/// Builds scores, left vectors and loadings from the basis and the small solve.
///
/// * `x` - standardized data in its active orientation.
/// * `basis_rotation` - `Q · U_small`, already truncated to the kept components.
/// * `eigenvalues` - kept eigenvalues, already divided by `N - 1`.
///
/// Samples in rows: `U = Q U_small`, `P = U diag(d)`, and with loadings
/// `V = Xᵗ U diag(1 / (sqrt(d) sqrt(N-1)))`.
/// Samples in columns: `V = Q U_small`, `P = Xᵗ V`, `U = P diag(1 / (sqrt(d) sqrt(N-1)))`.
pub fn reconstruct_components(
    x: &ArrayView2<f64>,
    basis_rotation: Array2<f64>,
    eigenvalues: &ArrayView1<f64>,
    orientation: Orientation,
    n_samples: usize,
    do_loadings: bool,
) -> Result<Reconstruction, ThreadSafeStdError> {
    match orientation {
        Orientation::SamplesInColumns => {
            let loadings = basis_rotation;
            let scores = x.t().dot(&loadings);
            let scale = inverse_singular_scaling(eigenvalues, n_samples)?;
            let left_vectors = &scores * &scale;
            Ok(Reconstruction {
                scores,
                left_vectors,
                loadings: Some(loadings),
            })
        }
        Orientation::SamplesInRows => {
            let left_vectors = basis_rotation;
            let scores = &left_vectors * eigenvalues;
            let loadings = if do_loadings {
                let scale = inverse_singular_scaling(eigenvalues, n_samples)?;
                Some(x.t().dot(&left_vectors) * &scale)
            } else {
                None
            };
            Ok(Reconstruction {
                scores,
                left_vectors,
                loadings,
            })
        }
    }
}

/// Randomized PCA runner. Holds only configuration; every `compute` call is independent.
#[derive(Debug, Clone, Default)]
pub struct RandomizedPca {
    config: RandomPcaConfig,
}

impl RandomizedPca {
    pub fn new(config: RandomPcaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RandomPcaConfig {
        &self.config
    }

    /// Runs randomized PCA on `data`, which is consumed and standardized in place.
    ///
    /// The sketch and the bandwidth subsample each get their own [`SeededSource`]
    /// seeded with `config.seed`.
    pub fn compute(&self, data: Array2<f64>) -> Result<RandomPcaOutput, ThreadSafeStdError> {
        let mut sketch_source = SeededSource::new(self.config.seed);
        let mut bandwidth_source = SeededSource::new(self.config.seed);
        self.compute_with_sources(data, &mut sketch_source, &mut bandwidth_source)
    }

    /// Same as [`compute`](Self::compute) with caller-provided random sources.
    ///
    /// # Errors
    /// Returns an error if the matrix is empty or has non-finite entries, if there are
    /// fewer than 2 samples, if `ndim` is 0, if `ndim + nextra` exceeds the smaller
    /// dimension of the data, if the RBF bandwidth resolves to a non-positive value,
    /// if the sketch or an iterate degenerates to a zero column, if a decomposition
    /// fails, or if writing the kernel dump fails.
    pub fn compute_with_sources<S1, S2>(
        &self,
        mut data: Array2<f64>,
        sketch_source: &mut S1,
        bandwidth_source: &mut S2,
    ) -> Result<RandomPcaOutput, ThreadSafeStdError>
    where
        S1: RandomSource + ?Sized,
        S2: RandomSource + ?Sized,
    {
        let cfg = &self.config;
        let overall_start_time = std::time::Instant::now();

        // --- 1. Input Validations ---
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(invalid_input("Input matrix has zero rows or zero columns."));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(invalid_input("Input matrix contains non-finite (NaN or infinity) values."));
        }
        if cfg.ndim == 0 {
            return Err(invalid_input("Number of requested components (ndim) must be greater than 0."));
        }

        // --- 2. Orientation ---
        let mut transpose = cfg.transpose;
        if !cfg.kernel.is_linear() && transpose {
            warn!("Kernel not linear, can't transpose; continuing with samples in rows.");
            transpose = false;
        }
        let orientation = Orientation::from_transpose(transpose);
        info!("Transpose: {}", if transpose { "yes" } else { "no" });

        let mean_sd = standardize(&mut data, cfg.standardization, orientation)?;
        let n_samples = orientation.n_samples(&data.view());
        if n_samples < 2 {
            return Err(invalid_input("At least 2 samples are required."));
        }

        let total_dim = cfg.ndim + cfg.nextra;
        let max_dim = data.nrows().min(data.ncols());
        if total_dim > max_dim {
            return Err(invalid_input(format!(
                "ndim + nextra = {} exceeds min(rows, cols) = {} of the {}x{} input.",
                total_dim,
                max_dim,
                data.nrows(),
                data.ncols()
            )));
        }
        debug!("dim(X): {:?}, N: {}, total_dim: {}", data.dim(), n_samples, total_dim);

        // --- 3. Kernel ---
        let sigma = match cfg.kernel {
            KernelType::Linear => None,
            KernelType::Rbf => Some(self.resolve_sigma(&data.view(), n_samples, bandwidth_source)?),
        };
        let kernel_start_time = std::time::Instant::now();
        let kernel = build_kernel(
            &data.view(),
            cfg.kernel,
            sigma.unwrap_or(0.0),
            cfg.rbf_center,
            n_samples,
        )?;
        let trace = kernel_trace(&kernel);
        info!(
            "Built kernel {:?} in {:?}. Trace(K): {} (N: {})",
            kernel.dim(),
            kernel_start_time.elapsed(),
            trace,
            n_samples
        );
        if !(trace.is_finite() && trace > 0.0) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Kernel trace is {}; the kernel carries no variance (are all samples identical?).",
                    trace
                ),
            )
            .into());
        }

        if let Some(path) = cfg.save_kernel.as_ref() {
            info!("Saving K to {:?}", path);
            save_text(path, &kernel.view())?;
        }

        // --- 4. Power iteration ---
        let settings = PowerIterationSettings {
            total_dim,
            maxiter: cfg.maxiter,
            tol: cfg.tol,
            do_orth: cfg.do_orth,
        };
        let outcome = run_power_iteration(&data.view(), &kernel.view(), settings, sketch_source)?;
        drop(kernel);

        // --- 5. Small solve on B = Qᵗ X ---
        let projected = outcome.basis.t().dot(&data);
        debug!("dim(B): {:?}", projected.dim());
        let small = solve_small(projected, cfg.method)?;
        debug!("dim(Et): {:?}", small.eigenvectors.dim());

        if small.eigenvalues.len() < cfg.ndim {
            return Err(format!(
                "The small solve produced {} components but {} were requested.",
                small.eigenvalues.len(),
                cfg.ndim
            )
            .into());
        }

        // --- 6. Rescale, then keep ndim components ---
        let rescaled = &small.eigenvalues / (n_samples - 1) as f64;
        let eigenvalues = rescaled.slice(s![..cfg.ndim]).to_owned();
        let kept_rotation = small.eigenvectors.slice(s![.., ..cfg.ndim]);
        let basis_rotation = outcome.basis.dot(&kept_rotation);

        let reconstruction = reconstruct_components(
            &data.view(),
            basis_rotation,
            &eigenvalues.view(),
            orientation,
            n_samples,
            cfg.do_loadings,
        )?;
        info!(
            "Reconstruction done. dim(P): {:?}, loadings: {}",
            reconstruction.scores.dim(),
            reconstruction.loadings.is_some()
        );

        let pve = &eigenvalues / trace;

        info!(
            "Randomized PCA completed in {:?}. Computed {} components.",
            overall_start_time.elapsed(),
            cfg.ndim
        );

        Ok(RandomPcaOutput {
            orientation,
            kernel: cfg.kernel,
            sigma,
            n_samples,
            eigenvalues,
            pve,
            trace,
            scores: reconstruction.scores,
            left_vectors: reconstruction.left_vectors,
            loadings: reconstruction.loadings,
            mean_sd,
            convergence: ConvergenceReport {
                state: outcome.state,
                converged: outcome.converged(),
                iterations: outcome.iterations,
                diagnostics: outcome.diagnostics,
            },
        })
    }

    /// Uses the configured bandwidth, or `sqrt(median squared distance)` when it is 0.
    fn resolve_sigma<S: RandomSource + ?Sized>(
        &self,
        data: &ArrayView2<f64>,
        n_samples: usize,
        source: &mut S,
    ) -> Result<f64, ThreadSafeStdError> {
        let sigma = if self.config.sigma == 0.0 {
            let sample_size = self.config.rbf_sample_size.min(n_samples);
            median_pairwise_sq_distance(data, sample_size, source)?.sqrt()
        } else {
            self.config.sigma
        };
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(invalid_input(format!(
                "RBF bandwidth resolved to {}; it must be positive (are all sampled rows identical?).",
                sigma
            )));
        }
        Ok(sigma)
    }
}

fn invalid_input(msg: impl Into<String>) -> ThreadSafeStdError {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, msg.into()).into()
}
