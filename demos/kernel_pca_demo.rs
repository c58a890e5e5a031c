use ndarray::Array2;
use randompca::random::{RandomSource, SeededSource};
use randompca::{zca_whiten, KernelType, RandomPcaConfig, RandomizedPca, StandardizationMethod};
use std::f64::consts::PI;

const N_FEATURES: usize = 5;

/// Two noisy concentric rings in the first two features; the rest is small noise.
fn rings(n_per_ring: usize, seed: u64) -> Array2<f64> {
    let mut source = SeededSource::new(seed);
    let mut data = Array2::zeros((2 * n_per_ring, N_FEATURES));
    for (i, mut row) in data.rows_mut().into_iter().enumerate() {
        let radius = if i < n_per_ring { 1.0 } else { 3.0 };
        let angle = 2.0 * PI * source.uniform();
        row[0] = radius * angle.cos() + 0.1 * source.standard_normal();
        row[1] = radius * angle.sin() + 0.1 * source.standard_normal();
        for j in 2..N_FEATURES {
            row[j] = 0.1 * source.standard_normal();
        }
    }
    data
}

fn main() {
    let data = rings(100, 7);

    let config = RandomPcaConfig {
        kernel: KernelType::Rbf,
        standardization: StandardizationMethod::Center,
        ndim: 2,
        nextra: 3,
        maxiter: 100,
        tol: 1e-10,
        ..Default::default()
    };
    let output = RandomizedPca::new(config)
        .compute(data.clone())
        .expect("kernel PCA failed");

    println!("RBF bandwidth: {:?}", output.sigma);
    println!("Eigenvalues: {}", output.eigenvalues);
    println!("Proportion of variance explained: {}", output.pve);
    println!(
        "Power iteration: {:?} after {} iteration(s)",
        output.convergence.state, output.convergence.iterations
    );

    // The first kernel component separates the rings
    let first = output.scores.column(0);
    let inner_mean = first.slice(ndarray::s![..100]).mean().unwrap_or(0.0);
    let outer_mean = first.slice(ndarray::s![100..]).mean().unwrap_or(0.0);
    println!("Mean first-component score: inner {:.4}, outer {:.4}", inner_mean, outer_mean);

    let linear = RandomizedPca::new(RandomPcaConfig {
        ndim: 2,
        nextra: 0,
        ..Default::default()
    })
    .compute(data.clone())
    .expect("linear PCA failed");
    let whitened = zca_whiten(&linear, data).expect("whitening failed");
    println!("Whitened data shape: {:?}", whitened.dim());
}
