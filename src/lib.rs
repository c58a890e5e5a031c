// Randomized (kernel) principal component analysis

#![doc = include_str!("../README.md")]

pub mod diagnostics;
pub mod kernel;
pub mod linalg_backends;
pub mod pca;
pub mod persistence;
pub mod power_iteration;
pub mod random;
pub mod small_solver;
pub mod standardize;
pub mod whiten;

/// Error type returned by every fallible operation in the crate.
pub type ThreadSafeStdError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use kernel::KernelType;
pub use pca::{ConvergenceReport, Orientation, RandomPcaConfig, RandomPcaOutput, RandomizedPca};
pub use power_iteration::PowerIterationState;
pub use random::{RandomSource, SeededSource};
pub use small_solver::SmallSolverMethod;
pub use standardize::{MeanSd, StandardizationMethod};
pub use whiten::{whitening_matrix, zca_whiten};
